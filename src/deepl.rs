use crate::config::Config;
use crate::error::{Result, TranslateError};
use crate::translation::Translator;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct DeeplResponse {
    translations: Vec<DeeplTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeeplTranslation {
    text: String,
}

/// DeepL REST API client
#[derive(Clone)]
pub struct DeeplClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl DeeplClient {
    pub fn new(client: reqwest::Client, api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self::new(client, &config.deepl_api_url, &config.deepl_api_key)
    }
}

#[async_trait]
impl Translator for DeeplClient {
    async fn translate(&self, text: &str, from_lang: &str, to_lang: &str) -> Result<String> {
        let source_lang = from_lang.to_uppercase();
        let target_lang = to_lang.to_uppercase();

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .form(&[
                ("text", text),
                ("source_lang", source_lang.as_str()),
                ("target_lang", target_lang.as_str()),
                ("preserve_formatting", "1"),
            ])
            .send()
            .await
            .map_err(|e| TranslateError::Backend(format!("failed to send request to DeepL: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            warn!("DeepL rejected translation {} -> {}: {}", from_lang, to_lang, status);
            return Err(TranslateError::Backend(format!(
                "DeepL API error ({}): {}",
                status, body
            )));
        }

        let parsed: DeeplResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::Backend(format!("failed to parse DeepL response: {}", e)))?;

        parsed
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| TranslateError::Backend("DeepL response contained no translations".to_string()))
    }

    fn provider_name(&self) -> &str {
        "DeepL"
    }
}
