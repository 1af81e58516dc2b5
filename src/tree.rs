//! Recursive walk that finds whitelisted leaves and translates them.

use crate::error::Result;
use crate::path::{join, FieldPath, Segment, Whitelist};
use crate::rate_limit::RateLimiter;
use crate::translation::{preserve_padding, Translator};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// A translated leaf. `path` is the dotted form used for matching and logs;
/// `location` is the exact write-path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatedField {
    pub path: String,
    #[serde(skip)]
    pub location: FieldPath,
    pub original_content: String,
    pub translated_content: String,
}

/// Text sent to the backend for a scalar leaf. `null` yields the empty
/// string and is therefore never translated.
pub fn stringify_leaf(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub struct TreeTranslator<'a> {
    translator: &'a dyn Translator,
    limiter: &'a RateLimiter,
    whitelist: &'a Whitelist,
    from_lang: &'a str,
    to_lang: &'a str,
    fields: Vec<TranslatedField>,
}

impl<'a> TreeTranslator<'a> {
    pub fn new(
        translator: &'a dyn Translator,
        limiter: &'a RateLimiter,
        whitelist: &'a Whitelist,
        from_lang: &'a str,
        to_lang: &'a str,
    ) -> Self {
        Self {
            translator,
            limiter,
            whitelist,
            from_lang,
            to_lang,
            fields: Vec::new(),
        }
    }

    /// Walk `value` depth-first and return the translated leaves in traversal
    /// order. The first backend failure aborts the walk.
    pub async fn translate(mut self, value: &Value) -> Result<Vec<TranslatedField>> {
        self.walk(value, String::new(), FieldPath::root()).await?;
        Ok(self.fields)
    }

    fn walk<'s>(
        &'s mut self,
        value: &'s Value,
        current_path: String,
        location: FieldPath,
    ) -> BoxFuture<'s, Result<()>> {
        async move {
            match value {
                Value::Object(map) => {
                    for (key, child) in map {
                        let child_location = location.child(Segment::Key(key.clone()));
                        self.walk(child, join(&current_path, key), child_location)
                            .await?;
                    }
                }
                Value::Array(items) => {
                    for (i, child) in items.iter().enumerate() {
                        let child_location = location.child(Segment::Index(i));
                        self.walk(child, join(&current_path, &i.to_string()), child_location)
                            .await?;
                    }
                }
                leaf => self.visit_leaf(leaf, current_path, location).await?,
            }
            Ok(())
        }
        .boxed()
    }

    async fn visit_leaf(&mut self, leaf: &Value, path: String, location: FieldPath) -> Result<()> {
        if !self.whitelist.selects(&path) {
            return Ok(());
        }

        let text = stringify_leaf(leaf);
        if text.is_empty() {
            return Ok(());
        }

        self.limiter.acquire(self.translator.provider_name()).await;
        let translated = self
            .translator
            .translate(&text, self.from_lang, self.to_lang)
            .await?;
        let translated = preserve_padding(&text, &translated);

        debug!("Translated {} ({} -> {})", path, self.from_lang, self.to_lang);
        self.fields.push(TranslatedField {
            path,
            location,
            original_content: text,
            translated_content: translated,
        });
        Ok(())
    }
}
