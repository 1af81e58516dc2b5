//! Shared fakes for integration tests.
//!
//! `MemoryStore` understands the two query shapes the engine issues (document
//! by slug, translation metadata referencing a slug's document) and applies
//! mutations the way Sanity does, including `ifRevisionID` checks.

#![allow(dead_code)]

use async_trait::async_trait;
use sanity_translator::path::FieldPath;
use sanity_translator::sanity::{DocumentStore, Mutation, Query};
use sanity_translator::translation::Translator;
use sanity_translator::{Result, TranslateError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct StoreState {
    docs: Vec<Value>,
    revision: u64,
}

impl StoreState {
    fn position(&self, id: &str) -> Option<usize> {
        self.docs.iter().position(|d| d["_id"] == id)
    }

    fn next_rev(&mut self) -> String {
        self.revision += 1;
        format!("rev-{}", self.revision)
    }

    fn apply(&mut self, mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::Create(doc) => {
                let id = doc["_id"].as_str().unwrap_or_default().to_string();
                if self.position(&id).is_some() {
                    return Err(TranslateError::Store(format!("document {} already exists", id)));
                }
                let mut doc = doc.clone();
                doc["_rev"] = json!(self.next_rev());
                self.docs.push(doc);
            }
            Mutation::CreateOrReplace(doc) => {
                let id = doc["_id"].as_str().unwrap_or_default().to_string();
                let mut doc = doc.clone();
                doc["_rev"] = json!(self.next_rev());
                match self.position(&id) {
                    Some(i) => self.docs[i] = doc,
                    None => self.docs.push(doc),
                }
            }
            Mutation::Patch(patch) => {
                let i = self
                    .position(&patch.id)
                    .ok_or_else(|| TranslateError::Store(format!("document {} not found", patch.id)))?;
                if let Some(expected) = &patch.if_revision_id {
                    if self.docs[i]["_rev"] != json!(expected) {
                        return Err(TranslateError::Store("revision mismatch".to_string()));
                    }
                }
                let rev = self.next_rev();
                let doc = &mut self.docs[i];
                if let Some(set) = &patch.set {
                    for (path, value) in set {
                        FieldPath::parse(path).set(doc, value.clone());
                    }
                }
                if let Some(insert) = &patch.insert {
                    // Only tail inserts (`field[-1]`) are supported
                    let field = insert.after.trim_end_matches("[-1]");
                    let array = doc[field]
                        .as_array_mut()
                        .ok_or_else(|| TranslateError::Store(format!("{} is not an array", field)))?;
                    array.extend(insert.items.iter().cloned());
                }
                doc["_rev"] = json!(rev);
            }
            Mutation::Delete { id } => {
                self.docs.retain(|d| d["_id"] != id.as_str());
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    mutations: Mutex<Vec<Mutation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(docs: Vec<Value>) -> Self {
        let store = Self::new();
        for doc in docs {
            store.insert(doc);
        }
        store
    }

    pub fn insert(&self, doc: Value) {
        let mut state = self.state.lock().unwrap();
        state
            .apply(&Mutation::CreateOrReplace(doc))
            .expect("seed document");
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state.position(id).map(|i| state.docs[i].clone())
    }

    /// Registry entries of `id` as `(language, reference)` pairs
    pub fn entries(&self, id: &str) -> Vec<(String, String)> {
        self.get(id)
            .and_then(|doc| doc["translations"].as_array().cloned())
            .unwrap_or_default()
            .iter()
            .map(|entry| {
                (
                    entry["_key"].as_str().unwrap_or_default().to_string(),
                    entry["value"]["_ref"].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().unwrap().clone()
    }
}

fn slug_of(doc: &Value) -> Option<&str> {
    doc["slug"]["current"].as_str()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query(&self, query: &Query) -> Result<Value> {
        // Round trips suspend, so concurrent jobs interleave like they do
        // against the real API
        tokio::task::yield_now().await;
        let slug = query
            .get_param("slug")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let state = self.state.lock().unwrap();

        if query.expression.contains("translation.metadata") {
            let rows = state
                .docs
                .iter()
                .filter(|d| slug_of(d) == Some(slug.as_str()))
                .map(|source| {
                    let records: Vec<Value> = state
                        .docs
                        .iter()
                        .filter(|d| d["_type"] == "translation.metadata")
                        .filter(|d| {
                            d["translations"]
                                .as_array()
                                .map(|entries| {
                                    entries.iter().any(|e| e["value"]["_ref"] == source["_id"])
                                })
                                .unwrap_or(false)
                        })
                        .map(|d| {
                            let keys: Vec<Value> = d["translations"]
                                .as_array()
                                .map(|entries| entries.iter().map(|e| e["_key"].clone()).collect())
                                .unwrap_or_default();
                            json!({"_id": d["_id"], "_rev": d["_rev"], "keys": keys})
                        })
                        .collect();
                    json!({ "translation": records })
                })
                .collect();
            return Ok(Value::Array(rows));
        }

        Ok(state
            .docs
            .iter()
            .find(|d| slug_of(d) == Some(slug.as_str()))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn mutate(&self, mutations: &[Mutation]) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        // Transactions are all-or-nothing
        let mut staged = StoreState {
            docs: state.docs.clone(),
            revision: state.revision,
        };
        for mutation in mutations {
            staged.apply(mutation)?;
        }
        *state = staged;
        self.mutations.lock().unwrap().extend_from_slice(mutations);
        Ok(())
    }
}

/// Trims its input and appends `_<lang>`, e.g. `" Hello "` → `"Hello_it"`.
#[derive(Default)]
pub struct SuffixTranslator {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl SuffixTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let translator = Self::default();
        translator.fail.store(true, Ordering::SeqCst);
        translator
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for SuffixTranslator {
    async fn translate(&self, text: &str, _from_lang: &str, to_lang: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(TranslateError::Backend("DeepL API error (503): unavailable".to_string()));
        }
        Ok(format!("{}_{}", text.trim(), to_lang))
    }

    fn provider_name(&self) -> &str {
        "Suffix"
    }
}

/// The source document used by most scenarios
pub fn source_document() -> Value {
    json!({
        "_id": "d1",
        "_type": "page",
        "language": "en",
        "slug": {"_type": "slug", "current": "/en/x"},
        "title": "Hello",
        "intro": " This is an example of text ",
        "portableText": [
            {
                "_key": "c6280f5ed117",
                "_type": "block",
                "children": [
                    {"_key": "e458c432651a", "_type": "span", "marks": [], "text": "First span"},
                    {"_key": "e458c432651b", "_type": "span", "marks": ["strong"], "text": ""}
                ],
                "markDefs": [],
                "style": "normal"
            },
            {
                "_key": "c6280f5ed118",
                "_type": "block",
                "children": [
                    {"_key": "e458c432651c", "_type": "span", "marks": [], "text": "Second block"}
                ],
                "markDefs": [],
                "style": "h2"
            }
        ],
        "testArray": ["First string", "Second string"]
    })
}
