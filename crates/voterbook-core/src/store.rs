//! Document store abstraction.
//!
//! `DocumentStore` is the seam between the repositories and the hosted
//! database. `api::StoreClient` implements it over REST; `MemoryStore`
//! implements it in-process for tests and offline fixtures.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use rand::Rng;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::api::ApiError;

/// Maximum number of writes the store accepts in one atomic commit.
pub const MAX_BATCH_WRITES: usize = 500;

const AUTO_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const AUTO_ID_LENGTH: usize = 20;

/// A random 20-character document id in the store's auto-id alphabet.
pub fn new_document_id() -> String {
    let mut rng = rand::thread_rng();
    (0..AUTO_ID_LENGTH)
        .map(|_| AUTO_ID_ALPHABET[rng.gen_range(0..AUTO_ID_ALPHABET.len())] as char)
        .collect()
}

/// A stored document: its id plus plain JSON fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    /// Serialize `value` into a document. Non-object values are rejected.
    pub fn from_typed<T: Serialize>(id: impl Into<String>, value: &T) -> Result<Self, ApiError> {
        match serde_json::to_value(value) {
            Ok(Value::Object(fields)) => Ok(Self { id: id.into(), fields }),
            Ok(other) => Err(ApiError::InvalidArgument(format!("expected an object, got {}", other))),
            Err(e) => Err(ApiError::InvalidArgument(e.to_string())),
        }
    }

    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        serde_json::from_value(Value::Object(self.fields))
            .map_err(|e| ApiError::InvalidResponse(format!("document {}: {}", self.id, e)))
    }
}

/// An equality constraint on a top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    fn matches(&self, fields: &Map<String, Value>) -> bool {
        fields.get(&self.field) == Some(&self.value)
    }
}

/// One write inside an atomic commit.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create a document that must not exist yet.
    Create {
        collection: String,
        id: String,
        fields: Map<String, Value>,
    },
    /// Overwrite the fields named in `mask` on an existing document.
    /// A masked field missing from `fields` is removed.
    Update {
        collection: String,
        id: String,
        fields: Map<String, Value>,
        mask: Vec<String>,
    },
    Delete {
        collection: String,
        id: String,
    },
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, ApiError>;

    /// All documents matching every filter. An empty filter list returns
    /// the whole collection.
    async fn query(&self, collection: &str, filters: &[FieldFilter]) -> Result<Vec<Document>, ApiError>;

    /// Create a document, returning its id. With `id = None` the store
    /// assigns one.
    async fn create(&self, collection: &str, id: Option<&str>, fields: Map<String, Value>) -> Result<String, ApiError>;

    /// Apply a masked update to an existing document.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
        mask: &[String],
    ) -> Result<(), ApiError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), ApiError>;

    /// Apply all writes atomically: either every write lands or none does.
    async fn commit(&self, writes: Vec<Write>) -> Result<(), ApiError>;
}

type Collections = BTreeMap<String, BTreeMap<String, Map<String, Value>>>;

/// In-process store with the same semantics as the hosted one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
    commits: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `commit` calls.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of individual writes applied through any method.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self, collection: &str) -> usize {
        self.read().get(collection).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Insert a document directly, bypassing write counters.
    pub fn seed<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> Result<(), ApiError> {
        let doc = Document::from_typed(id, value)?;
        self.write_lock()
            .entry(collection.to_string())
            .or_default()
            .insert(doc.id, doc.fields);
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Collections> {
        self.collections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, Collections> {
        self.collections.write().unwrap_or_else(|e| e.into_inner())
    }

    fn check(data: &Collections, write: &Write) -> Result<(), ApiError> {
        let exists = |collection: &str, id: &str| data.get(collection).is_some_and(|c| c.contains_key(id));
        match write {
            Write::Create { collection, id, .. } if exists(collection, id) => {
                Err(ApiError::AlreadyExists(format!("{}/{}", collection, id)))
            }
            Write::Update { collection, id, .. } if !exists(collection, id) => {
                Err(ApiError::NotFound(format!("{}/{}", collection, id)))
            }
            _ => Ok(()),
        }
    }

    fn apply(data: &mut Collections, write: Write) {
        match write {
            Write::Create { collection, id, fields } => {
                data.entry(collection).or_default().insert(id, fields);
            }
            Write::Update {
                collection,
                id,
                mut fields,
                mask,
            } => {
                if let Some(doc) = data.get_mut(&collection).and_then(|c| c.get_mut(&id)) {
                    for path in mask {
                        match fields.remove(&path) {
                            Some(value) => {
                                doc.insert(path, value);
                            }
                            None => {
                                doc.remove(&path);
                            }
                        }
                    }
                }
            }
            Write::Delete { collection, id } => {
                if let Some(c) = data.get_mut(&collection) {
                    c.remove(&id);
                }
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, ApiError> {
        Ok(self.read().get(collection).and_then(|c| c.get(id)).map(|fields| Document {
            id: id.to_string(),
            fields: fields.clone(),
        }))
    }

    async fn query(&self, collection: &str, filters: &[FieldFilter]) -> Result<Vec<Document>, ApiError> {
        let data = self.read();
        let Some(docs) = data.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, fields)| filters.iter().all(|f| f.matches(fields)))
            .map(|(id, fields)| Document {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect())
    }

    async fn create(&self, collection: &str, id: Option<&str>, fields: Map<String, Value>) -> Result<String, ApiError> {
        let id = id.map(str::to_string).unwrap_or_else(new_document_id);
        let write = Write::Create {
            collection: collection.to_string(),
            id: id.clone(),
            fields,
        };
        let mut data = self.write_lock();
        Self::check(&data, &write)?;
        Self::apply(&mut data, write);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
        mask: &[String],
    ) -> Result<(), ApiError> {
        let write = Write::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
            mask: mask.to_vec(),
        };
        let mut data = self.write_lock();
        Self::check(&data, &write)?;
        Self::apply(&mut data, write);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), ApiError> {
        let mut data = self.write_lock();
        Self::apply(
            &mut data,
            Write::Delete {
                collection: collection.to_string(),
                id: id.to_string(),
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<(), ApiError> {
        if writes.len() > MAX_BATCH_WRITES {
            return Err(ApiError::InvalidArgument(format!(
                "maximum {} writes allowed per request",
                MAX_BATCH_WRITES
            )));
        }
        let mut data = self.write_lock();
        // Validate against a scratch copy so a late failure leaves nothing behind
        let mut scratch = data.clone();
        for write in &writes {
            Self::check(&scratch, write)?;
            Self::apply(&mut scratch, write.clone());
        }
        let count = writes.len();
        *data = scratch;
        self.writes.fetch_add(count, Ordering::SeqCst);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_new_document_id_shape() {
        let id = new_document_id();
        assert_eq!(id.len(), 20);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, new_document_id());
    }

    #[tokio::test]
    async fn test_query_applies_all_filters() {
        let store = MemoryStore::new();
        store.create("voters", Some("a"), fields(json!({"district_id": "47", "upazila_id": "367"}))).await.unwrap();
        store.create("voters", Some("b"), fields(json!({"district_id": "47", "upazila_id": "368"}))).await.unwrap();
        store.create("voters", Some("c"), fields(json!({"district_id": "41"}))).await.unwrap();

        let all = store.query("voters", &[]).await.unwrap();
        assert_eq!(all.len(), 3);

        let hits = store
            .query("voters", &[FieldFilter::eq("district_id", "47"), FieldFilter::eq("upazila_id", "368")])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[tokio::test]
    async fn test_masked_update_removes_missing_fields() {
        let store = MemoryStore::new();
        store.create("voters", Some("a"), fields(json!({"voter_name": "A", "union_id": "3701", "age": 30}))).await.unwrap();
        store
            .update(
                "voters",
                "a",
                fields(json!({"age": 31})),
                &["age".to_string(), "union_id".to_string()],
            )
            .await
            .unwrap();
        let doc = store.get("voters", "a").await.unwrap().unwrap();
        assert_eq!(doc.fields, fields(json!({"voter_name": "A", "age": 31})));

        let missing = store.update("voters", "zzz", Map::new(), &[]).await;
        assert!(matches!(missing, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.create("voters", Some("taken"), Map::new()).await.unwrap();

        let writes = vec![
            Write::Create { collection: "voters".into(), id: "new".into(), fields: Map::new() },
            Write::Create { collection: "voters".into(), id: "taken".into(), fields: Map::new() },
        ];
        assert!(matches!(store.commit(writes).await, Err(ApiError::AlreadyExists(_))));
        assert_eq!(store.len("voters"), 1);
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_rejects_oversized_batch() {
        let store = MemoryStore::new();
        let writes = (0..=MAX_BATCH_WRITES)
            .map(|i| Write::Delete { collection: "voters".into(), id: i.to_string() })
            .collect();
        assert!(matches!(store.commit(writes).await, Err(ApiError::InvalidArgument(_))));
    }
}
