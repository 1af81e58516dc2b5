use crate::error::{Result, TranslateError};
use crate::path::FieldPath;
use crate::sanity::document_id;
use crate::translation::validate_language;
use crate::tree::TranslatedField;
use serde::Deserialize;
use serde_json::Value;

/// Document-mode request: translate the whitelisted leaves of one document
/// into a new language variant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TranslationJob {
    #[serde(alias = "fromLang")]
    pub from_lang: String,
    #[serde(alias = "fromSlug")]
    pub from_slug: String,
    #[serde(alias = "toLang")]
    pub to_lang: String,
    #[serde(alias = "toSlug")]
    pub to_slug: String,
    /// Dotted paths of the leaves to translate, e.g. `body.0.children.0.text`
    #[serde(rename = "InputElements", alias = "inputPaths", alias = "inputElements")]
    pub input_paths: Vec<String>,
}

impl TranslationJob {
    pub fn validate(&self) -> Result<()> {
        require("FromSlug", &self.from_slug)?;
        require("ToSlug", &self.to_slug)?;
        validate_language(&self.from_lang)
            .map_err(|e| TranslateError::Input(format!("FromLang: {}", e)))?;
        validate_language(&self.to_lang)
            .map_err(|e| TranslateError::Input(format!("ToLang: {}", e)))?;
        if self.input_paths.is_empty() {
            return Err(TranslateError::Input(
                "InputElements must name at least one path".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TranslateError::Input(format!("{} is required", name)));
    }
    Ok(())
}

/// Builds the translated variant of a document.
pub struct DocumentMutator<'a> {
    to_lang: &'a str,
    to_slug: &'a str,
}

impl<'a> DocumentMutator<'a> {
    pub fn new(to_lang: &'a str, to_slug: &'a str) -> Self {
        Self { to_lang, to_slug }
    }

    /// Copy `before` with the identity fields of the new variant:
    /// `_id` gets a `_<lang>` suffix, `slug.current` and `language` are set.
    pub fn derive_identity(&self, before: &Value) -> Result<Value> {
        let new_id = format!("{}_{}", document_id(before)?, self.to_lang);

        let mut after = before.clone();
        FieldPath::parse("_id").set(&mut after, Value::String(new_id));
        FieldPath::parse("slug.current").set(&mut after, Value::String(self.to_slug.to_string()));
        FieldPath::parse("language").set(&mut after, Value::String(self.to_lang.to_string()));
        Ok(after)
    }

    /// Write every translated leaf back at the location the walk recorded.
    /// Later fields win when two share a location.
    pub fn apply_fields(&self, mut after: Value, fields: &[TranslatedField]) -> Value {
        for field in fields {
            field
                .location
                .set(&mut after, Value::String(field.translated_content.clone()));
        }
        after
    }
}
