//! MongoDB document store.
//!
//! # Module Structure
//! - `connection`: client construction and connection-string validation
//! - `conversion`: BSON to [`Value`](crate::Value) conversion, both ways
//! - `query`: plan lowering into filter and sort documents
//!
//! Document ids map onto `_id`: ids that parse as an ObjectId are looked up
//! as one, anything else as a string. Collections whose names start with
//! `system.` are never listed.

mod connection;
pub mod conversion;
pub mod query;

use super::{DocumentStore, StoreBackend};
use crate::Result;
use crate::error::FptError;
use crate::models::Document as FptDocument;
use crate::query::QueryPlan;
use crate::value::Fields;
use async_trait::async_trait;
use conversion::{ID_FIELD, flatten_merge_patch, id_to_bson, to_fpt_document};
use futures::TryStreamExt;
use mongodb::bson::{Document, doc};
use mongodb::{Client, Collection};

pub use connection::validate_connection_string;

/// Document store backed by one MongoDB database.
pub struct MongoStore {
    client: Client,
    database: String,
}

impl std::fmt::Debug for MongoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The client's options hold the connection string
        f.debug_struct("MongoStore")
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl MongoStore {
    /// Name of the database this store reads and writes.
    pub fn database_name(&self) -> &str {
        &self.database
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.client.database(&self.database).collection(name)
    }

    async fn collect(
        &self,
        collection: &str,
        cursor: mongodb::error::Result<mongodb::Cursor<Document>>,
    ) -> Result<Vec<FptDocument>> {
        let cursor = cursor.map_err(|e| {
            FptError::store_unavailable(format!("Failed to read collection '{}'", collection), e)
        })?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(|e| {
            FptError::store_unavailable(format!("Failed to read collection '{}'", collection), e)
        })?;
        Ok(documents.into_iter().map(to_fpt_document).collect())
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn test_connection(&self) -> Result<()> {
        self.ping().await
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names = self
            .client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(|e| FptError::store_unavailable("Failed to list collections", e))?;
        names.retain(|name| !name.starts_with("system."));
        names.sort();
        tracing::debug!(database = %self.database, count = names.len(), "Listed collections");
        Ok(names)
    }

    async fn sample_documents(&self, collection: &str, limit: u32) -> Result<Vec<FptDocument>> {
        let cursor = self
            .collection(collection)
            .find(doc! {})
            .limit(i64::from(limit))
            .await;
        self.collect(collection, cursor).await
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<FptDocument>> {
        let found = self
            .collection(collection)
            .find_one(doc! { ID_FIELD: id_to_bson(id) })
            .await
            .map_err(|e| {
                FptError::store_unavailable(
                    format!("Failed to fetch '{}/{}'", collection, id),
                    e,
                )
            })?;
        Ok(found.map(to_fpt_document))
    }

    async fn run_query(&self, plan: &QueryPlan) -> Result<Vec<FptDocument>> {
        let filter = query::filter_document(plan);
        let sort = query::sort_document(plan);
        tracing::trace!(collection = %plan.collection, %filter, %sort, "Lowered query plan");

        let cursor = self
            .collection(&plan.collection)
            .find(filter)
            .sort(sort)
            .limit(i64::from(plan.limit))
            .await;
        self.collect(&plan.collection, cursor).await
    }

    async fn merge_document(&self, collection: &str, id: &str, data: Fields) -> Result<()> {
        let filter = doc! { ID_FIELD: id_to_bson(id) };
        let set = flatten_merge_patch(&data);
        let coll = self.collection(collection);

        let outcome = if set.is_empty() {
            // An empty `$set` is rejected by the server
            coll.update_one(filter, doc! { "$setOnInsert": { ID_FIELD: id_to_bson(id) } })
                .upsert(true)
                .await
        } else {
            coll.update_one(filter, doc! { "$set": set })
                .upsert(true)
                .await
        };

        outcome.map_err(|e| {
            FptError::store_unavailable(format!("Failed to write '{}/{}'", collection, id), e)
        })?;
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        self.collection(collection)
            .delete_one(doc! { ID_FIELD: id_to_bson(id) })
            .await
            .map_err(|e| {
                FptError::store_unavailable(format!("Failed to delete '{}/{}'", collection, id), e)
            })?;
        Ok(())
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::MongoDB
    }
}
