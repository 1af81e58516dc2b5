//! Sanity document store client.
//!
//! Queries are GROQ expressions sent with `GET /data/query/{dataset}`; writes
//! are batches of mutations sent with `POST /data/mutate/{dataset}`. Query
//! parameters are passed as `$name` URL parameters holding JSON values, so
//! slugs never get spliced into the expression text.

use crate::config::Config;
use crate::error::{Result, TranslateError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// A GROQ query with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub expression: String,
    pub params: Vec<(String, Value)>,
}

impl Query {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            params: Vec::new(),
        }
    }

    /// Bind `$name` to `value`
    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    pub fn get_param(&self, name: &str) -> Option<&Value> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// One write operation in a mutation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mutation {
    Create(Value),
    CreateOrReplace(Value),
    Patch(Patch),
    Delete { id: String },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Patch {
    pub id: String,
    /// Reject the patch if the document changed since this revision was read
    #[serde(rename = "ifRevisionID", skip_serializing_if = "Option::is_none")]
    pub if_revision_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert: Option<Insert>,
}

impl Patch {
    /// Patch that sets a single field
    pub fn set(id: impl Into<String>, path: impl Into<String>, value: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(path.into(), value);
        Self {
            id: id.into(),
            set: Some(fields),
            ..Default::default()
        }
    }

    /// Patch that inserts `items` after the array element addressed by `marker`
    pub fn insert_after(id: impl Into<String>, marker: impl Into<String>, items: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            insert: Some(Insert {
                after: marker.into(),
                items,
            }),
            ..Default::default()
        }
    }

    pub fn if_revision(mut self, rev: Option<String>) -> Self {
        self.if_revision_id = rev;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub after: String,
    pub items: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct MutationRequest<'a> {
    mutations: &'a [Mutation],
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    result: Value,
}

/// Query/mutate access to a JSON document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Run a read-only query and return its `result` value
    async fn query(&self, query: &Query) -> Result<Value>;

    /// Apply a batch of mutations
    async fn mutate(&self, mutations: &[Mutation]) -> Result<()>;
}

/// Sanity HTTP API client
#[derive(Clone)]
pub struct SanityClient {
    client: reqwest::Client,
    api_url: String,
    dataset: String,
    token: String,
}

impl SanityClient {
    pub fn new(
        client: reqwest::Client,
        api_url: impl Into<String>,
        dataset: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            dataset: dataset.into(),
            token: token.into(),
        }
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self::new(
            client,
            &config.sanity_api_url,
            &config.sanity_dataset,
            &config.sanity_token,
        )
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/data/{}/{}", self.api_url, action, self.dataset)
    }
}

async fn check_status(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
    warn!("Sanity {} failed ({}): {}", action, status, body);
    Err(TranslateError::Store(format!(
        "Sanity {} error ({}): {}",
        action, status, body
    )))
}

#[async_trait]
impl DocumentStore for SanityClient {
    async fn query(&self, query: &Query) -> Result<Value> {
        let mut url_params: Vec<(String, String)> = Vec::with_capacity(query.params.len() + 1);
        url_params.push(("query".to_string(), query.expression.clone()));
        for (name, value) in &query.params {
            url_params.push((format!("${}", name), value.to_string()));
        }

        debug!("Sanity query: {}", query.expression);

        let response = self
            .client
            .get(self.endpoint("query"))
            .bearer_auth(&self.token)
            .query(&url_params)
            .send()
            .await
            .map_err(|e| TranslateError::Store(format!("failed to send Sanity query: {}", e)))?;

        let response = check_status(response, "query").await?;

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::Store(format!("failed to parse Sanity query response: {}", e)))?;

        Ok(parsed.result)
    }

    async fn mutate(&self, mutations: &[Mutation]) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint("mutate"))
            .bearer_auth(&self.token)
            .json(&MutationRequest { mutations })
            .send()
            .await
            .map_err(|e| TranslateError::Store(format!("failed to send Sanity mutation: {}", e)))?;

        check_status(response, "mutate").await?;
        debug!("Applied {} mutation(s)", mutations.len());
        Ok(())
    }
}

const DOCUMENT_BY_SLUG: &str = "*[slug.current == $slug][0]";

/// Fetch the document whose `slug.current` equals `slug`.
pub async fn fetch_by_slug(store: &dyn DocumentStore, slug: &str) -> Result<Value> {
    let query = Query::new(DOCUMENT_BY_SLUG).param("slug", slug);
    match store.query(&query).await? {
        Value::Null => Err(TranslateError::NotFound(format!(
            "no document with slug '{}'",
            slug
        ))),
        doc @ Value::Object(_) => Ok(doc),
        other => Err(TranslateError::Store(format!(
            "unexpected query result for slug '{}': {}",
            slug, other
        ))),
    }
}

/// Read the document's `_id`.
pub fn document_id(doc: &Value) -> Result<&str> {
    doc.get("_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| TranslateError::NotFound("document has no _id".to_string()))
}
