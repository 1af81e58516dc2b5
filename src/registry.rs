//! Translation metadata registry.
//!
//! Each family of language variants shares one `translation.metadata`
//! document listing `{_key: <lang>, value: <reference>}` entries. The
//! registry creates that record on the first translation of a family and
//! appends one entry per new language after that. Entries are never removed,
//! reordered or duplicated.
//!
//! Read-then-append is serialized per family inside the process, and the
//! append carries `ifRevisionID` so a concurrent writer elsewhere makes it
//! fail instead of being silently overwritten.

use crate::error::{Result, TranslateError};
use crate::sanity::{DocumentStore, Mutation, Patch, Query};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub const METADATA_TYPE: &str = "translation.metadata";

const REGISTRY_BY_SOURCE_SLUG: &str = r#"*[slug.current == $slug]{
    "translation": *[_type == "translation.metadata" && references(^._id)]{
        _id,
        _rev,
        "keys": translations[]._key
    }
}"#;

/// Registry record id for a family whose original document is `original_id`
pub fn family_id(original_id: &str) -> String {
    format!("{}_base", original_id)
}

/// One `{language → document}` link in a registry record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub language_key: String,
    pub document_ref: String,
}

impl RegistryEntry {
    pub fn new(language_key: &str, document_ref: &str) -> Self {
        Self {
            language_key: language_key.to_string(),
            document_ref: document_ref.to_string(),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "_key": self.language_key,
            "value": {
                "_ref": self.document_ref,
                "_type": "reference"
            }
        })
    }
}

/// Build a new registry record document.
pub fn metadata_record(id: &str, entries: &[RegistryEntry]) -> Value {
    json!({
        "_id": id,
        "_type": METADATA_TYPE,
        "translations": entries.iter().map(RegistryEntry::to_value).collect::<Vec<_>>()
    })
}

/// What the store currently holds for a family, relative to the target language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryState {
    /// No registry record references the source document
    Absent,
    /// A record exists but lists no languages
    Empty { id: String },
    /// The target language is already registered
    Present { id: String },
    /// The record exists and the target language still has to be appended
    Missing { id: String, rev: Option<String> },
}

/// Classify a `REGISTRY_BY_SOURCE_SLUG` query result.
///
/// The result holds one row per matching source document, each with the
/// registry records referencing it. Rows are merged by record id; more than
/// one distinct record is an inconsistency.
pub fn resolve_state(result: &Value, to_lang: &str) -> Result<RegistryState> {
    let rows = match result {
        Value::Null => return Ok(RegistryState::Absent),
        Value::Array(rows) => rows,
        other => {
            return Err(TranslateError::Store(format!(
                "unexpected translation metadata query result: {}",
                other
            )))
        }
    };

    let mut records: Vec<&Value> = Vec::new();
    for record in rows
        .iter()
        .filter_map(|row| row.get("translation").and_then(Value::as_array))
        .flatten()
    {
        let id = record.get("_id").and_then(Value::as_str);
        if !records
            .iter()
            .any(|r| r.get("_id").and_then(Value::as_str) == id)
        {
            records.push(record);
        }
    }

    let record = match records.as_slice() {
        [] => return Ok(RegistryState::Absent),
        [record] => *record,
        many => {
            let ids: Vec<&str> = many
                .iter()
                .filter_map(|r| r.get("_id").and_then(Value::as_str))
                .collect();
            return Err(TranslateError::InconsistentState(format!(
                "{} translation metadata records reference the same document: {}",
                many.len(),
                ids.join(", ")
            )));
        }
    };

    let id = record
        .get("_id")
        .and_then(Value::as_str)
        .ok_or_else(|| TranslateError::Store("translation metadata record has no _id".to_string()))?
        .to_string();

    let keys: Vec<&str> = record
        .get("keys")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    if keys.is_empty() {
        Ok(RegistryState::Empty { id })
    } else if keys.contains(&to_lang) {
        Ok(RegistryState::Present { id })
    } else {
        let rev = record
            .get("_rev")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(RegistryState::Missing { id, rev })
    }
}

/// Id of the record a sync in `state` writes to (or would, for `Present`).
/// Absent and empty families are seeded under `seed_id`.
fn write_target<'s>(state: &'s RegistryState, seed_id: &'s str) -> &'s str {
    match state {
        RegistryState::Present { id } | RegistryState::Missing { id, .. } => id,
        RegistryState::Absent | RegistryState::Empty { .. } => seed_id,
    }
}

/// Result of a registry sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created { id: String },
    Appended { id: String },
    AlreadyPresent { id: String },
}

/// In-process per-family mutexes guarding read-then-write of a record.
///
/// An entry lives only while some task holds or waits for it; the last
/// guard to drop removes it.
#[derive(Debug, Default)]
pub struct FamilyLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FamilyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `family`
    pub async fn acquire(&self, family: &str) -> FamilyGuard<'_> {
        let guard = self.lock_for(family).lock_owned().await;
        FamilyGuard {
            locks: self,
            family: family.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of families currently tracked
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_for(&self, family: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.entries().entry(family.to_string()).or_default())
    }

    /// Drop the entry for `family` unless another task still references it.
    /// Clones are only taken under the map lock, so a count of one is final.
    fn prune(&self, family: &str) {
        let mut entries = self.entries();
        if entries
            .get(family)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            entries.remove(family);
        }
    }
}

/// Exclusive access to one family; released on drop.
pub struct FamilyGuard<'a> {
    locks: &'a FamilyLocks,
    family: String,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for FamilyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.prune(&self.family);
    }
}

/// Identity of one translation, as the registry needs it.
#[derive(Debug, Clone)]
pub struct RegistrySync<'a> {
    pub from_slug: &'a str,
    pub from_lang: &'a str,
    pub to_lang: &'a str,
    pub before_id: &'a str,
    pub after_id: &'a str,
}

pub struct MetadataRegistry<'a> {
    store: &'a dyn DocumentStore,
    locks: &'a FamilyLocks,
}

impl<'a> MetadataRegistry<'a> {
    pub fn new(store: &'a dyn DocumentStore, locks: &'a FamilyLocks) -> Self {
        Self { store, locks }
    }

    /// Register `req.after_id` under `req.to_lang` in the family's record.
    ///
    /// The lock is taken on the record id the write will target. That is
    /// only known after reading, so when the record found differs from the
    /// seed id (translating from a variant) the state is read again under
    /// the record's own lock.
    pub async fn sync(&self, req: &RegistrySync<'_>) -> Result<SyncOutcome> {
        let seed_id = family_id(req.before_id);

        let guard = self.locks.acquire(&seed_id).await;
        let state = self.current_state(req).await?;
        let target = write_target(&state, &seed_id).to_string();
        if target == seed_id {
            return self.apply(state, seed_id, req).await;
        }
        drop(guard);

        debug!("Translation metadata for {} lives in {}", req.from_slug, target);
        let _guard = self.locks.acquire(&target).await;
        let state = self.current_state(req).await?;
        self.apply(state, seed_id, req).await
    }

    async fn current_state(&self, req: &RegistrySync<'_>) -> Result<RegistryState> {
        let query = Query::new(REGISTRY_BY_SOURCE_SLUG).param("slug", req.from_slug);
        let result = self.store.query(&query).await?;
        resolve_state(&result, req.to_lang)
    }

    async fn apply(
        &self,
        state: RegistryState,
        seed_id: String,
        req: &RegistrySync<'_>,
    ) -> Result<SyncOutcome> {
        match state {
            RegistryState::Absent => {
                info!("No translation metadata for {}, creating {}", req.from_slug, seed_id);
                let record = self.seed_record(&seed_id, req);
                self.store.mutate(&[Mutation::Create(record)]).await?;
                Ok(SyncOutcome::Created { id: seed_id })
            }
            RegistryState::Empty { id } => {
                warn!(
                    "Translation metadata {} lists no languages, recreating as {}",
                    id, seed_id
                );
                let record = self.seed_record(&seed_id, req);
                self.store.mutate(&[Mutation::CreateOrReplace(record)]).await?;
                Ok(SyncOutcome::Created { id: seed_id })
            }
            RegistryState::Present { id } => {
                info!("Language {} already registered in {}", req.to_lang, id);
                Ok(SyncOutcome::AlreadyPresent { id })
            }
            RegistryState::Missing { id, rev } => {
                info!("Adding language {} to translation metadata {}", req.to_lang, id);
                let entry = RegistryEntry::new(req.to_lang, req.after_id);
                let patch = Patch::insert_after(&id, "translations[-1]", vec![entry.to_value()])
                    .if_revision(rev);
                self.store.mutate(&[Mutation::Patch(patch)]).await?;
                Ok(SyncOutcome::Appended { id })
            }
        }
    }

    fn seed_record(&self, id: &str, req: &RegistrySync<'_>) -> Value {
        metadata_record(
            id,
            &[
                RegistryEntry::new(req.from_lang, req.before_id),
                RegistryEntry::new(req.to_lang, req.after_id),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Returns a canned query result and records mutations
    struct FakeStore {
        result: Value,
        mutations: Mutex<Vec<Mutation>>,
    }

    impl FakeStore {
        fn new(result: Value) -> Self {
            Self {
                result,
                mutations: Mutex::new(Vec::new()),
            }
        }

        fn mutations(&self) -> Vec<Mutation> {
            self.mutations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DocumentStore for FakeStore {
        async fn query(&self, query: &Query) -> Result<Value> {
            assert_eq!(query.expression, REGISTRY_BY_SOURCE_SLUG);
            Ok(self.result.clone())
        }

        async fn mutate(&self, mutations: &[Mutation]) -> Result<()> {
            self.mutations.lock().unwrap().extend_from_slice(mutations);
            Ok(())
        }
    }

    fn sync_request<'a>(to_lang: &'a str, after_id: &'a str) -> RegistrySync<'a> {
        RegistrySync {
            from_slug: "/en/x",
            from_lang: "en",
            to_lang,
            before_id: "d1",
            after_id,
        }
    }

    fn row(records: Value) -> Value {
        json!([{ "translation": records }])
    }

    // ==================== resolve_state Tests ====================

    #[test]
    fn test_resolve_absent() {
        assert_eq!(resolve_state(&json!([]), "it").unwrap(), RegistryState::Absent);
        assert_eq!(resolve_state(&row(json!([])), "it").unwrap(), RegistryState::Absent);
        assert_eq!(resolve_state(&Value::Null, "it").unwrap(), RegistryState::Absent);
    }

    #[test]
    fn test_resolve_empty_record() {
        let result = row(json!([{"_id": "d1_base", "_rev": "r1", "keys": []}]));
        assert_eq!(
            resolve_state(&result, "it").unwrap(),
            RegistryState::Empty { id: "d1_base".to_string() }
        );

        let result = row(json!([{"_id": "d1_base", "keys": null}]));
        assert_eq!(
            resolve_state(&result, "it").unwrap(),
            RegistryState::Empty { id: "d1_base".to_string() }
        );
    }

    #[test]
    fn test_resolve_present() {
        let result = row(json!([{"_id": "d1_base", "_rev": "r1", "keys": ["en", "it"]}]));
        assert_eq!(
            resolve_state(&result, "it").unwrap(),
            RegistryState::Present { id: "d1_base".to_string() }
        );
    }

    #[test]
    fn test_resolve_missing_carries_revision() {
        let result = row(json!([{"_id": "d1_base", "_rev": "r1", "keys": ["en", "it"]}]));
        assert_eq!(
            resolve_state(&result, "fr").unwrap(),
            RegistryState::Missing {
                id: "d1_base".to_string(),
                rev: Some("r1".to_string())
            }
        );
    }

    #[test]
    fn test_resolve_merges_duplicate_rows() {
        let record = json!({"_id": "d1_base", "_rev": "r1", "keys": ["en"]});
        let result = json!([
            {"translation": [record.clone()]},
            {"translation": [record]}
        ]);
        assert!(matches!(
            resolve_state(&result, "it").unwrap(),
            RegistryState::Missing { .. }
        ));
    }

    #[test]
    fn test_resolve_multiple_records_is_inconsistent() {
        let result = row(json!([
            {"_id": "d1_base", "keys": ["en", "it"]},
            {"_id": "other_base", "keys": ["en", "fr"]}
        ]));
        let err = resolve_state(&result, "de").unwrap_err();
        assert!(matches!(err, TranslateError::InconsistentState(_)));
        assert!(err.to_string().contains("d1_base"));
        assert!(err.to_string().contains("other_base"));
    }

    #[test]
    fn test_resolve_unexpected_shape() {
        assert!(matches!(
            resolve_state(&json!({"oops": true}), "it"),
            Err(TranslateError::Store(_))
        ));
    }

    // ==================== sync Tests ====================

    #[tokio::test]
    async fn test_sync_creates_record_when_absent() {
        let store = FakeStore::new(row(json!([])));
        let locks = FamilyLocks::new();

        let outcome = MetadataRegistry::new(&store, &locks)
            .sync(&sync_request("it", "d1_it"))
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Created { id: "d1_base".to_string() });
        assert_eq!(
            store.mutations(),
            vec![Mutation::Create(json!({
                "_id": "d1_base",
                "_type": "translation.metadata",
                "translations": [
                    {"_key": "en", "value": {"_ref": "d1", "_type": "reference"}},
                    {"_key": "it", "value": {"_ref": "d1_it", "_type": "reference"}}
                ]
            }))]
        );
    }

    #[tokio::test]
    async fn test_sync_recreates_empty_record() {
        let store = FakeStore::new(row(json!([{"_id": "d1_base", "keys": []}])));
        let locks = FamilyLocks::new();

        let outcome = MetadataRegistry::new(&store, &locks)
            .sync(&sync_request("it", "d1_it"))
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Created { id: "d1_base".to_string() });
        let mutations = store.mutations();
        assert_eq!(mutations.len(), 1);
        match &mutations[0] {
            Mutation::CreateOrReplace(doc) => {
                assert_eq!(doc["translations"].as_array().unwrap().len(), 2);
            }
            other => panic!("Expected createOrReplace, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sync_is_idempotent_for_present_language() {
        let store = FakeStore::new(row(json!([{"_id": "d1_base", "keys": ["en", "it"]}])));
        let locks = FamilyLocks::new();

        let outcome = MetadataRegistry::new(&store, &locks)
            .sync(&sync_request("it", "d1_it"))
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::AlreadyPresent { id: "d1_base".to_string() });
        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_sync_appends_after_last_entry() {
        let store = FakeStore::new(row(json!([
            {"_id": "d1_base", "_rev": "r7", "keys": ["en", "it"]}
        ])));
        let locks = FamilyLocks::new();

        let outcome = MetadataRegistry::new(&store, &locks)
            .sync(&sync_request("fr", "d1_fr"))
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Appended { id: "d1_base".to_string() });
        assert_eq!(
            store.mutations(),
            vec![Mutation::Patch(Patch {
                id: "d1_base".to_string(),
                if_revision_id: Some("r7".to_string()),
                set: None,
                insert: Some(crate::sanity::Insert {
                    after: "translations[-1]".to_string(),
                    items: vec![json!({
                        "_key": "fr",
                        "value": {"_ref": "d1_fr", "_type": "reference"}
                    })],
                }),
            })]
        );
    }

    #[tokio::test]
    async fn test_sync_inconsistent_state_writes_nothing() {
        let store = FakeStore::new(row(json!([
            {"_id": "a_base", "keys": ["en"]},
            {"_id": "b_base", "keys": ["en"]}
        ])));
        let locks = FamilyLocks::new();

        let err = MetadataRegistry::new(&store, &locks)
            .sync(&sync_request("fr", "d1_fr"))
            .await
            .unwrap_err();

        assert!(matches!(err, TranslateError::InconsistentState(_)));
        assert!(store.mutations().is_empty());
    }

    #[test]
    fn test_family_locks_share_mutex_per_family() {
        let locks = FamilyLocks::new();
        let a = locks.lock_for("d1_base");
        let b = locks.lock_for("d1_base");
        let c = locks.lock_for("d2_base");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn test_family_locks_are_pruned_after_release() {
        let locks = FamilyLocks::new();

        let first = locks.acquire("d1_base").await;
        let other = locks.acquire("d2_base").await;
        assert_eq!(locks.len(), 2);

        drop(first);
        assert_eq!(locks.len(), 1);
        drop(other);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_family_lock_kept_while_another_task_waits() {
        let locks = Arc::new(FamilyLocks::new());
        let guard = locks.acquire("d1_base").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("d1_base").await;
            })
        };
        // Let the waiter register on the mutex
        tokio::task::yield_now().await;

        drop(guard);
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[test]
    fn test_write_target() {
        let missing = RegistryState::Missing {
            id: "d1_base".to_string(),
            rev: None,
        };
        assert_eq!(write_target(&missing, "d1_it_base"), "d1_base");
        assert_eq!(write_target(&RegistryState::Absent, "d1_it_base"), "d1_it_base");
        assert_eq!(
            write_target(&RegistryState::Empty { id: "x".to_string() }, "d1_it_base"),
            "d1_it_base"
        );
    }

    #[test]
    fn test_family_id() {
        assert_eq!(family_id("d1"), "d1_base");
    }
}
