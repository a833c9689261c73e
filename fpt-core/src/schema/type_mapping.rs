//! Value classification into the closed [`TypeTag`] vocabulary.
//!
//! Two entry points exist. [`classify`] works on decoded [`Value`]s and is an
//! exhaustive match. [`classify_untyped`] works on generic JSON handed over by
//! collaborators that cannot decode into [`Value`]; it applies the structural
//! checks in a fixed order because several compound shapes overlap.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Observed kind of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeTag {
    Null,
    Boolean,
    Number,
    String,
    Timestamp,
    Bytes,
    Reference,
    GeoPoint,
    Array,
    Map,
    Unknown,
}

impl TypeTag {
    /// Wire name of the tag, as it appears in JSON output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Timestamp => "timestamp",
            Self::Bytes => "bytes",
            Self::Reference => "reference",
            Self::GeoPoint => "geoPoint",
            Self::Array => "array",
            Self::Map => "map",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a decoded value.
///
/// # Example
/// ```rust
/// use fpt_core::schema::{TypeTag, classify};
/// use fpt_core::Value;
///
/// assert_eq!(classify(&Value::Integer(3)), TypeTag::Number);
/// assert_eq!(classify(&Value::Array(vec![])), TypeTag::Array);
/// ```
pub fn classify(value: &Value) -> TypeTag {
    match value {
        Value::Null => TypeTag::Null,
        Value::Boolean(_) => TypeTag::Boolean,
        Value::Integer(_) | Value::Double(_) => TypeTag::Number,
        Value::String(_) => TypeTag::String,
        Value::Timestamp(_) => TypeTag::Timestamp,
        Value::Bytes(_) => TypeTag::Bytes,
        Value::Reference { .. } => TypeTag::Reference,
        Value::GeoPoint { .. } => TypeTag::GeoPoint,
        Value::Array(_) => TypeTag::Array,
        Value::Map(_) => TypeTag::Map,
        Value::Unknown(_) => TypeTag::Unknown,
    }
}

/// Classifies generic JSON by structural checks. First match wins:
///
/// 1. `null`
/// 2. primitives: `boolean`, `number`, `string`
/// 3. objects: `toDate` ⇒ timestamp, `toBase64` ⇒ bytes, `path` + `id` ⇒
///    reference, `latitude` + `longitude` ⇒ geoPoint
/// 4. arrays
/// 5. any other object ⇒ map
///
/// The order is load-bearing: an object carrying both `toBase64` and
/// coordinates is `bytes`, never `geoPoint`.
pub fn classify_untyped(value: &JsonValue) -> TypeTag {
    match value {
        JsonValue::Null => TypeTag::Null,
        JsonValue::Bool(_) => TypeTag::Boolean,
        JsonValue::Number(_) => TypeTag::Number,
        JsonValue::String(_) => TypeTag::String,
        JsonValue::Object(obj) => {
            if obj.contains_key("toDate") {
                TypeTag::Timestamp
            } else if obj.contains_key("toBase64") {
                TypeTag::Bytes
            } else if obj.contains_key("path") && obj.contains_key("id") {
                TypeTag::Reference
            } else if obj.contains_key("latitude") && obj.contains_key("longitude") {
                TypeTag::GeoPoint
            } else {
                TypeTag::Map
            }
        }
        JsonValue::Array(_) => TypeTag::Array,
    }
}
