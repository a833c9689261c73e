//! Observed-schema inference from sampled documents.
//!
//! Document databases are schemaless, so the only schema there is to report is
//! the one seen in data. The inferrer walks each sampled document, builds the
//! dotted path of every field it meets, and keeps a histogram of the kinds
//! observed at that path. Nested maps are recursed into; arrays are leaves and
//! their elements never produce paths.

use super::type_mapping::{TypeTag, classify};
use crate::Result;
use crate::error::FptError;
use crate::models::Document;
use crate::store::DocumentStore;
use crate::value::{Fields, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of documents sampled when the caller gives no limit.
pub const DEFAULT_SAMPLE_LIMIT: u32 = 200;

/// Largest accepted sample.
pub const MAX_SAMPLE_LIMIT: u32 = 5000;

/// Per-path statistics.
///
/// `types` values always sum to `present`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStats {
    /// Number of sampled documents in which the path appeared
    pub present: u64,
    /// Occurrences per observed kind
    pub types: BTreeMap<TypeTag, u64>,
}

impl FieldStats {
    fn bump(&mut self, tag: TypeTag) {
        self.present = self.present.saturating_add(1);
        let count = self.types.entry(tag).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Most frequently observed kind, ties broken by tag order.
    pub fn dominant_type(&self) -> Option<TypeTag> {
        self.types
            .iter()
            .max_by(|(ta, ca), (tb, cb)| ca.cmp(cb).then_with(|| tb.cmp(ta)))
            .map(|(tag, _)| *tag)
    }

    /// True when more than one kind was seen at this path.
    pub fn is_mixed(&self) -> bool {
        self.types.len() > 1
    }
}

/// Result of schema inference for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedSchema {
    /// Collection that was sampled
    pub collection: String,
    /// Number of documents actually returned by the store
    pub sample_size: u64,
    /// Statistics per dotted field path
    pub fields: BTreeMap<String, FieldStats>,
}

/// Incremental schema inferrer.
///
/// Feed documents with [`analyze_document`](Self::analyze_document) and call
/// [`finalize`](Self::finalize) once the sample is exhausted.
#[derive(Debug, Default)]
pub struct SchemaInferrer {
    fields: BTreeMap<String, FieldStats>,
    document_count: u64,
}

impl SchemaInferrer {
    /// Creates a new schema inferrer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyzes one document's top-level mapping.
    pub fn analyze_document(&mut self, data: &Fields) {
        self.document_count = self.document_count.saturating_add(1);
        self.walk("", data);
    }

    fn walk(&mut self, prefix: &str, fields: &Fields) {
        for (key, value) in fields {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };

            let tag = classify(value);
            self.fields.entry(path.clone()).or_default().bump(tag);

            // Arrays stay leaves: only maps contribute nested paths
            if let Value::Map(nested) = value {
                self.walk(&path, nested);
            }
        }
    }

    /// Number of documents analyzed so far.
    pub fn document_count(&self) -> u64 {
        self.document_count
    }

    /// Finalizes the inference and returns the observed schema.
    pub fn finalize(self, collection: impl Into<String>) -> ObservedSchema {
        ObservedSchema {
            collection: collection.into(),
            sample_size: self.document_count,
            fields: self.fields,
        }
    }
}

/// Checks a requested sample size against `1..=5000`.
pub fn validate_sample_limit(limit: u32) -> Result<u32> {
    if (1..=MAX_SAMPLE_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(FptError::validation(
            "limit",
            format!("must be between 1 and {}, got {}", MAX_SAMPLE_LIMIT, limit),
        ))
    }
}

/// Infers the observed schema of a collection from up to `sample_limit`
/// documents.
///
/// Sampling takes whatever the store returns first; no particular order is
/// requested, so two calls on a large collection may see different samples.
///
/// # Errors
/// Returns a validation error before touching the store when the collection
/// name is empty or the limit is outside `1..=5000`, and a store error when
/// the sample cannot be fetched.
pub async fn infer_schema(
    store: &dyn DocumentStore,
    collection: &str,
    sample_limit: u32,
) -> Result<ObservedSchema> {
    if collection.trim().is_empty() {
        return Err(FptError::validation("collection", "must not be empty"));
    }
    let limit = validate_sample_limit(sample_limit)?;

    tracing::debug!(collection, limit, "Sampling documents for schema inference");
    let documents: Vec<Document> = store.sample_documents(collection, limit).await?;

    let mut inferrer = SchemaInferrer::new();
    for document in &documents {
        inferrer.analyze_document(&document.data);
    }

    let schema = inferrer.finalize(collection);
    tracing::info!(
        collection,
        sample_size = schema.sample_size,
        paths = schema.fields.len(),
        "Schema inference completed"
    );
    Ok(schema)
}
