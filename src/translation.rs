//! Translation backend abstraction.
//!
//! The engine only needs `translate(text, from, to)`. `DeeplClient` is the
//! production implementation; tests plug in their own.

use crate::error::Result;
use async_trait::async_trait;

/// A stateless machine translation backend.
///
/// Implementations may trim leading and trailing whitespace from their output;
/// callers restore it with [`preserve_padding`].
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, from_lang: &str, to_lang: &str) -> Result<String>;

    /// Name used in logs
    fn provider_name(&self) -> &str;
}

/// Put back a leading or trailing space the backend dropped.
pub fn preserve_padding(original: &str, translated: &str) -> String {
    let mut result = String::with_capacity(translated.len() + 2);
    if original.starts_with(' ') && !translated.starts_with(' ') {
        result.push(' ');
    }
    result.push_str(translated);
    if original.ends_with(' ') && !result.ends_with(' ') {
        result.push(' ');
    }
    result
}

/// Check that a language code is safe to embed in ids and API calls.
pub fn validate_language(code: &str) -> std::result::Result<(), String> {
    if code.is_empty() {
        return Err("language code is empty".to_string());
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(format!("invalid characters in language code: {}", code));
    }
    Ok(())
}
