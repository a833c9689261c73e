//! Document snapshot types shared by every stage of the pipeline.

use crate::value::{Fields, Value};
use serde::{Deserialize, Serialize};

/// A document snapshot: id plus its top-level field mapping.
///
/// Identity is `(collection, id)`. Snapshots are fetched per request and never
/// cached across requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id, unique within its collection
    pub id: String,
    /// Top-level fields
    #[serde(default)]
    pub data: Fields,
}

impl Document {
    /// Creates a document snapshot.
    pub fn new(id: impl Into<String>, data: Fields) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Looks up a possibly dotted field path (`address.city`).
    ///
    /// Only maps are traversed; a path segment that lands on any other kind
    /// yields `None`.
    pub fn field(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.data.get(first)?;
        for segment in segments {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }
}

/// A row flowing through the export serializers.
pub type ExportRow = Document;
