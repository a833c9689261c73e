//! Document store capability trait and backend factory.
//!
//! The pipeline treats the store as a capability handed in at startup, never
//! owned: connection pooling, retries and credentials are the backend's
//! concern. Backends decode their wire values straight into
//! [`Value`](crate::Value) so nothing downstream has to sniff shapes.
//!
//! # Backends
//! - `memory`: in-process store, optionally seeded from an NDJSON file
//! - `mongodb`: MongoDB collections (feature `mongodb`)

pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongodb;

use crate::Result;
use crate::error::{FptError, redact_store_url};
use crate::models::Document;
use crate::query::QueryPlan;
use crate::value::{Fields, Value};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

pub use memory::MemoryStore;

/// Which backend a store talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    MongoDB,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::MongoDB => write!(f, "MongoDB"),
        }
    }
}

/// Capability interface over a schema-less document database.
///
/// # Object Safety
/// This trait is object-safe; the server holds it as
/// `Arc<dyn DocumentStore>` and shares it across in-flight requests.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Checks that the backend is reachable.
    async fn test_connection(&self) -> Result<()>;

    /// Lists collection names, sorted.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Returns up to `limit` documents in whatever order the backend yields
    /// them first.
    async fn sample_documents(&self, collection: &str, limit: u32) -> Result<Vec<Document>>;

    /// Fetches one document, `None` when it does not exist.
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Executes a resolved plan and returns at most `plan.limit` documents in
    /// the plan's ordering.
    async fn run_query(&self, plan: &QueryPlan) -> Result<Vec<Document>>;

    /// Merge-upserts `data` into the document, creating it when absent.
    ///
    /// Nested maps merge key by key; every other value replaces what was
    /// stored at its path.
    async fn merge_document(&self, collection: &str, id: &str, data: Fields) -> Result<()>;

    /// Deletes the document; deleting an absent document is not an error.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<()>;

    /// Backend kind, for logging.
    fn backend(&self) -> StoreBackend;
}

/// Deep-merges `patch` into `target`.
///
/// Maps present on both sides merge recursively; any other value replaces.
pub fn merge_fields(target: &mut Fields, patch: Fields) {
    for (key, incoming) in patch {
        match (target.get_mut(&key), incoming) {
            (Some(Value::Map(existing)), Value::Map(nested)) => merge_fields(existing, nested),
            (_, incoming) => {
                target.insert(key, incoming);
            }
        }
    }
}

/// How to reach the store.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Backend URL (`mongodb://…`, `mongodb+srv://…` or `memory://`)
    pub url: Option<String>,
    /// Project id; names the database when the URL does not
    pub project_id: String,
    /// NDJSON seed file for the memory backend
    pub seed: Option<PathBuf>,
}

/// Opens the store described by `options`.
///
/// No URL (or `memory://`) selects the in-memory backend.
///
/// # Errors
/// Returns a configuration error for unknown schemes or backends that were
/// not compiled in, and a store error when the backend cannot be reached.
pub async fn open_store(options: &StoreOptions) -> Result<Arc<dyn DocumentStore>> {
    let url = options.url.as_deref().filter(|u| !u.is_empty());
    tracing::info!(
        "Store: {}",
        url.map_or_else(|| "memory://".to_string(), redact_store_url)
    );

    match url {
        None => open_memory(options).await,
        Some(u) if u.starts_with("memory://") => open_memory(options).await,
        Some(u) if u.starts_with("mongodb://") || u.starts_with("mongodb+srv://") => {
            #[cfg(feature = "mongodb")]
            {
                let store = mongodb::MongoStore::new(u, &options.project_id).await?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "mongodb"))]
            {
                Err(FptError::configuration(
                    "MongoDB backend not available. Compile with --features mongodb",
                ))
            }
        }
        Some(u) => Err(FptError::configuration(format!(
            "Unsupported store URL scheme: {}",
            redact_store_url(u)
        ))),
    }
}

async fn open_memory(options: &StoreOptions) -> Result<Arc<dyn DocumentStore>> {
    let store = match &options.seed {
        Some(path) => MemoryStore::load_seed(path).await?,
        None => MemoryStore::new(),
    };
    Ok(Arc::new(store))
}
