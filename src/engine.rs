//! The two operations the HTTP layer exposes.

use crate::config::Config;
use crate::deepl::DeeplClient;
use crate::document::{DocumentMutator, TranslationJob};
use crate::error::{Result, TranslateError};
use crate::field::{FieldTranslationJob, FieldTranslator};
use crate::path::Whitelist;
use crate::rate_limit::RateLimiter;
use crate::registry::{family_id, FamilyLocks, MetadataRegistry, RegistrySync, SyncOutcome};
use crate::sanity::{document_id, fetch_by_slug, DocumentStore, Mutation, SanityClient};
use crate::translation::Translator;
use crate::tree::TreeTranslator;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// Long-lived handles shared by all requests: the store and backend clients,
/// the backend rate limiter and the per-family registry locks.
pub struct TranslationEngine {
    store: Arc<dyn DocumentStore>,
    translator: Arc<dyn Translator>,
    limiter: RateLimiter,
    family_locks: FamilyLocks,
}

/// Outcome of a document translation
#[derive(Debug, Clone)]
pub struct TranslatedDocument {
    pub document: Value,
    pub translated_fields: usize,
    pub registry: SyncOutcome,
}

impl TranslationEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        translator: Arc<dyn Translator>,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            store,
            translator,
            limiter,
            family_locks: FamilyLocks::new(),
        }
    }

    /// Wire the Sanity and DeepL clients described by `config`
    pub fn from_config(config: &Config) -> Self {
        let client = reqwest::Client::new();
        let limiter = RateLimiter::new(config.translation_interval);
        info!("Backend calls spaced at least {:?} apart", limiter.min_interval());
        Self::new(
            Arc::new(SanityClient::from_config(client.clone(), config)),
            Arc::new(DeeplClient::from_config(client, config)),
            limiter,
        )
    }

    /// Translate the document at `job.from_slug` into `job.to_lang`, upsert
    /// the result and register it in the family's translation metadata.
    ///
    /// If the upsert succeeds but the registry update fails, the new document
    /// stays in place and the error is returned.
    pub async fn translate_document(&self, job: &TranslationJob) -> Result<TranslatedDocument> {
        job.validate()?;
        info!("Translating from: {}", job.from_slug);

        let before = fetch_by_slug(self.store.as_ref(), &job.from_slug).await?;
        let before_id = document_id(&before)?.to_string();

        let mutator = DocumentMutator::new(&job.to_lang, &job.to_slug);
        let after = mutator.derive_identity(&before)?;

        let whitelist = Whitelist::new(&job.input_paths);
        let fields = TreeTranslator::new(
            self.translator.as_ref(),
            &self.limiter,
            &whitelist,
            &job.from_lang,
            &job.to_lang,
        )
        .translate(&before)
        .await?;
        info!("Translated {} field(s) of {}", fields.len(), before_id);

        let after = mutator.apply_fields(after, &fields);
        let after_id = document_id(&after)?.to_string();

        self.store
            .mutate(&[Mutation::CreateOrReplace(after.clone())])
            .await
            .map_err(|e| {
                error!("Failed pushing document {}: {}", after_id, e);
                TranslateError::Store(format!("failed pushing document {}: {}", after_id, e))
            })?;

        let registry = MetadataRegistry::new(self.store.as_ref(), &self.family_locks)
            .sync(&RegistrySync {
                from_slug: &job.from_slug,
                from_lang: &job.from_lang,
                to_lang: &job.to_lang,
                before_id: &before_id,
                after_id: &after_id,
            })
            .await
            .map_err(|e| {
                error!(
                    "Document {} was saved but translation metadata for family {} is stale: {}",
                    after_id,
                    family_id(&before_id),
                    e
                );
                e
            })?;

        info!("Translating to: {}", job.to_slug);

        Ok(TranslatedDocument {
            document: after,
            translated_fields: fields.len(),
            registry,
        })
    }

    /// Translate the mapped fields of `job.from_slug` into every target slug.
    pub async fn translate_field(&self, job: &FieldTranslationJob) -> Result<()> {
        job.validate()?;
        info!(
            "Translating {} field(s) from {} into {} document(s)",
            job.mapping_fields.len(),
            job.from_slug,
            job.to_slugs.len()
        );

        FieldTranslator::new(self.store.as_ref(), self.translator.as_ref(), &self.limiter)
            .run(job)
            .await
    }
}
