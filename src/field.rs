//! Field-mode translation: copy single fields of a source document into
//! already existing language variants, translating them on the way.

use crate::document::require;
use crate::error::{Result, TranslateError};
use crate::path::FieldPath;
use crate::rate_limit::RateLimiter;
use crate::sanity::{document_id, fetch_by_slug, DocumentStore, Mutation, Patch};
use crate::translation::{validate_language, Translator};
use crate::tree::stringify_leaf;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

/// Source field → target field mapping
#[derive(Debug, Clone, Deserialize)]
pub struct MappingField {
    /// Path in the source document, dotted or bracket notation
    #[serde(rename = "JsonPath", alias = "sourcePath", alias = "jsonPath")]
    pub source_path: String,
    /// Sanity patch path in each target document
    #[serde(rename = "SanityPath", alias = "targetPath", alias = "sanityPath")]
    pub target_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FieldTranslationJob {
    #[serde(alias = "fromSlug")]
    pub from_slug: String,
    #[serde(alias = "fromLang")]
    pub from_lang: String,
    #[serde(alias = "toSlugs")]
    pub to_slugs: Vec<String>,
    #[serde(alias = "mappingFields")]
    pub mapping_fields: Vec<MappingField>,
}

impl FieldTranslationJob {
    pub fn validate(&self) -> Result<()> {
        require("FromSlug", &self.from_slug)?;
        validate_language(&self.from_lang)
            .map_err(|e| TranslateError::Input(format!("FromLang: {}", e)))?;
        if self.to_slugs.is_empty() {
            return Err(TranslateError::Input("ToSlugs must not be empty".to_string()));
        }
        for slug in &self.to_slugs {
            require("ToSlugs entry", slug)?;
        }
        if self.mapping_fields.is_empty() {
            return Err(TranslateError::Input(
                "MappingFields must not be empty".to_string(),
            ));
        }
        for mapping in &self.mapping_fields {
            require("JsonPath", &mapping.source_path)?;
            require("SanityPath", &mapping.target_path)?;
        }
        Ok(())
    }
}

/// Language of a target document: its `language` field, else the first
/// segment of its slug (`/it/about` → `it`).
pub fn infer_language(target: &Value, slug: &str) -> Result<String> {
    if let Some(lang) = target
        .get("language")
        .and_then(Value::as_str)
        .filter(|l| !l.is_empty())
    {
        return Ok(lang.to_string());
    }

    slug.split('/')
        .find(|segment| !segment.is_empty())
        .filter(|segment| validate_language(segment).is_ok())
        .map(str::to_string)
        .ok_or_else(|| {
            TranslateError::Input(format!("cannot infer target language from slug '{}'", slug))
        })
}

pub struct FieldTranslator<'a> {
    store: &'a dyn DocumentStore,
    translator: &'a dyn Translator,
    limiter: &'a RateLimiter,
}

impl<'a> FieldTranslator<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        translator: &'a dyn Translator,
        limiter: &'a RateLimiter,
    ) -> Self {
        Self {
            store,
            translator,
            limiter,
        }
    }

    /// Translate every mapping into every target. Stops at the first failure;
    /// patches already applied stay in place.
    pub async fn run(&self, job: &FieldTranslationJob) -> Result<()> {
        let source = fetch_by_slug(self.store, &job.from_slug).await?;

        for mapping in &job.mapping_fields {
            info!("Starting translation for field: {}", mapping.source_path);

            let value = FieldPath::parse(&mapping.source_path)
                .get(&source)
                .map(stringify_leaf)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    TranslateError::NotFound(format!(
                        "field '{}' not found in {}",
                        mapping.source_path, job.from_slug
                    ))
                })?;

            for to_slug in &job.to_slugs {
                self.translate_into(job, mapping, &value, to_slug).await?;
            }
        }

        Ok(())
    }

    async fn translate_into(
        &self,
        job: &FieldTranslationJob,
        mapping: &MappingField,
        value: &str,
        to_slug: &str,
    ) -> Result<()> {
        let target = fetch_by_slug(self.store, to_slug).await?;
        let target_id = document_id(&target)?;
        let to_lang = infer_language(&target, to_slug)?;

        info!("Translating {} into {} ({})", mapping.source_path, to_slug, to_lang);

        self.limiter.acquire(self.translator.provider_name()).await;
        let translated = self
            .translator
            .translate(value, &job.from_lang, &to_lang)
            .await?;

        let patch = Patch::set(
            target_id,
            &mapping.target_path,
            Value::String(translated.trim().to_string()),
        );
        self.store.mutate(&[Mutation::Patch(patch)]).await
    }
}
