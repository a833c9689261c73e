//! In-process document store.
//!
//! Backs local development, the test suites and `--seed` runs. Documents are
//! kept per collection in id order, so sampling is deterministic and plans
//! are evaluated with the shared semantics in [`crate::query::plan`].

use super::{DocumentStore, StoreBackend, merge_fields};
use crate::Result;
use crate::error::FptError;
use crate::models::Document;
use crate::query::QueryPlan;
use crate::value::{Fields, Value};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

type Collection = BTreeMap<String, Fields>;

/// One line of an NDJSON seed file.
#[derive(Debug, Deserialize)]
struct SeedRecord {
    collection: String,
    id: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, Collection>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a document.
    pub fn insert(&self, collection: impl Into<String>, document: Document) {
        self.collections
            .write()
            .entry(collection.into())
            .or_default()
            .insert(document.id, document.data);
    }

    /// Builds a store from NDJSON text.
    ///
    /// Each non-blank line is `{"collection": …, "id": …, "data": {…}}`, with
    /// `data` in the marker-key encoding. Later lines replace earlier ones
    /// with the same identity.
    ///
    /// # Errors
    /// Returns a validation error naming the first malformed line.
    pub fn from_ndjson(text: &str) -> Result<Self> {
        let store = Self::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let line_no = index.saturating_add(1);
            let record: SeedRecord = serde_json::from_str(line).map_err(|e| {
                FptError::validation(format!("seed line {}", line_no), e.to_string())
            })?;
            let data = match Value::from_untyped(record.data) {
                Value::Map(fields) => fields,
                Value::Null => Fields::new(),
                other => {
                    return Err(FptError::validation(
                        format!("seed line {}", line_no),
                        format!("data must be an object, got {}", crate::schema::classify(&other)),
                    ));
                }
            };
            store.insert(record.collection, Document::new(record.id, data));
        }
        Ok(store)
    }

    /// Reads an NDJSON seed file.
    ///
    /// # Errors
    /// Fails when the file cannot be read or a line is malformed.
    pub async fn load_seed(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| FptError::Io {
                context: format!("Failed to read seed file {}", path.display()),
                source,
            })?;
        let store = Self::from_ndjson(&text)?;
        tracing::info!(
            path = %path.display(),
            documents = store.document_count(),
            "Loaded seed data"
        );
        Ok(store)
    }

    /// Total number of documents across all collections.
    pub fn document_count(&self) -> usize {
        self.collections.read().values().map(BTreeMap::len).sum()
    }

    fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        // Subcollection paths (`users/u1/orders`) are not root collections
        Ok(self
            .collections
            .read()
            .iter()
            .filter(|(name, docs)| !name.contains('/') && !docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn sample_documents(&self, collection: &str, limit: u32) -> Result<Vec<Document>> {
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut docs = self.snapshot(collection);
        docs.truncate(take);
        Ok(docs)
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn run_query(&self, plan: &QueryPlan) -> Result<Vec<Document>> {
        let docs = self.snapshot(&plan.collection);
        Ok(plan.evaluate(&docs))
    }

    async fn merge_document(&self, collection: &str, id: &str, data: Fields) -> Result<()> {
        let mut collections = self.collections.write();
        let target = collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        merge_fields(target, data);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        let mut collections = self.collections.write();
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
            if docs.is_empty() {
                collections.remove(collection);
            }
        }
        Ok(())
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Memory
    }
}
