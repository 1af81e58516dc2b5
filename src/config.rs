use anyhow::{Context, Result};
use std::time::Duration;

const DEFAULT_SANITY_VERSION: &str = "v2021-06-07";
const DEEPL_FREE_API_URL: &str = "https://api-free.deepl.com/v2/translate";
const DEEPL_PRO_API_URL: &str = "https://api.deepl.com/v2/translate";

#[derive(Debug, Clone)]
pub struct Config {
    // Runtime
    pub environment: String,
    pub port: u16,

    // Sanity
    pub sanity_project_id: String,
    pub sanity_token: String,
    pub sanity_version: String,
    pub sanity_dataset: String,
    pub sanity_api_url: String,

    // DeepL
    pub deepl_api_key: String,
    pub deepl_api_url: String,
    pub translation_interval: Duration,

    // HTTP surface
    pub allowed_origins: Vec<String>,
    pub api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let sanity_project_id =
            std::env::var("SANITY_PROJECT_ID").context("SANITY_PROJECT_ID not set")?;
        let sanity_version = std::env::var("SANITY_VERSION")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_SANITY_VERSION.to_string());

        // Overridable so tests and proxies can point at another host
        let sanity_api_url = std::env::var("SANITY_API_URL").unwrap_or_else(|_| {
            format!(
                "https://{}.api.sanity.io/{}",
                sanity_project_id, sanity_version
            )
        });

        let deepl_api_key = std::env::var("DEEPL_TOKEN").context("DEEPL_TOKEN not set")?;
        let deepl_api_url = std::env::var("DEEPL_API_URL")
            .unwrap_or_else(|_| default_deepl_url(&deepl_api_key).to_string());

        Ok(Self {
            environment: std::env::var("ENV").unwrap_or_else(|_| "development".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),

            sanity_token: std::env::var("SANITY_TOKEN").context("SANITY_TOKEN not set")?,
            sanity_dataset: std::env::var("SANITY_DATASET")
                .unwrap_or_else(|_| "production".to_string()),
            sanity_project_id,
            sanity_version,
            sanity_api_url,

            deepl_api_key,
            deepl_api_url,
            translation_interval: Duration::from_millis(
                std::env::var("TRANSLATION_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1000),
            ),

            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or_default(),
            api_key: std::env::var("API_KEY").ok().filter(|v| !v.is_empty()),
        })
    }
}

/// DeepL free-tier keys carry a `:fx` suffix and must use the free endpoint
fn default_deepl_url(api_key: &str) -> &'static str {
    if api_key.ends_with(":fx") {
        DEEPL_FREE_API_URL
    } else {
        DEEPL_PRO_API_URL
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
