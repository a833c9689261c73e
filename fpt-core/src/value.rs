//! The closed value vocabulary a document database round-trips.
//!
//! Store backends decode their wire values straight into [`Value`], so the
//! rest of the pipeline never has to sniff shapes at runtime. Generic JSON
//! coming from request bodies or JSON-only collaborators goes through
//! [`Value::from_untyped`], which applies the precedence rules of
//! [`classify_untyped`](crate::schema::classify_untyped) once at the boundary.
//!
//! # Untyped wire encoding
//! Compound kinds that JSON cannot express natively use marker keys:
//!
//! | kind      | encoding                                         |
//! |-----------|--------------------------------------------------|
//! | timestamp | `{"toDate": "2024-01-02T03:04:05Z"}`             |
//! | bytes     | `{"toBase64": "AQID"}`                           |
//! | reference | `{"path": "users/alice", "id": "alice"}`         |
//! | geoPoint  | `{"latitude": 52.5, "longitude": 13.4}`          |
//!
//! Values serialize to this encoding, so anything the tool emits decodes back
//! to the same variant.

use crate::schema::{TypeTag, classify_untyped};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Top-level field mapping of a document.
pub type Fields = BTreeMap<String, Value>;

/// A decoded document field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null
    Null,
    /// Boolean
    Boolean(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// IEEE 754 double
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Binary blob
    Bytes(Vec<u8>),
    /// Point in time, always UTC
    Timestamp(DateTime<Utc>),
    /// Pointer to another document
    Reference {
        /// Collection path of the target document
        collection: String,
        /// Id of the target document
        id: String,
    },
    /// 2-D geographic point
    GeoPoint {
        /// Latitude in degrees
        latitude: f64,
        /// Longitude in degrees
        longitude: f64,
    },
    /// Ordered sequence
    Array(Vec<Value>),
    /// Nested mapping
    Map(Fields),
    /// Backend value outside the vocabulary, kept as its textual rendering
    Unknown(String),
}

impl Value {
    /// Decodes generic JSON, choosing the variant by sniffing precedence.
    ///
    /// Never fails: a marker object whose payload cannot be decoded (a bad
    /// date, invalid base64, non-numeric coordinates) is an ordinary object
    /// and stays a [`Value::Map`], so it round-trips unchanged.
    pub fn from_untyped(json: JsonValue) -> Self {
        let tag = classify_untyped(&json);
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Boolean(b),
            JsonValue::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Double))
                .unwrap_or_else(|| Self::Unknown(n.to_string())),
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_untyped).collect())
            }
            JsonValue::Object(obj) => match tag {
                TypeTag::Timestamp => decode_timestamp(obj),
                TypeTag::Bytes => decode_bytes(obj),
                TypeTag::Reference => decode_reference(obj),
                TypeTag::GeoPoint => decode_geo_point(obj),
                _ => plain_map(obj),
            },
        }
    }

    /// Encodes this value as generic JSON using the marker-key encoding.
    ///
    /// Non-finite doubles have no JSON form and encode as `null`.
    pub fn to_untyped(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Boolean(b) => JsonValue::Bool(*b),
            Self::Integer(i) => JsonValue::from(*i),
            Self::Double(d) => serde_json::Number::from_f64(*d)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Bytes(b) => single_entry("toBase64", JsonValue::String(STANDARD.encode(b))),
            Self::Timestamp(t) => single_entry("toDate", JsonValue::String(format_timestamp(t))),
            Self::Reference { collection, id } => {
                let mut obj = JsonMap::new();
                obj.insert(
                    "path".to_string(),
                    JsonValue::String(format!("{}/{}", collection, id)),
                );
                obj.insert("id".to_string(), JsonValue::String(id.clone()));
                JsonValue::Object(obj)
            }
            Self::GeoPoint {
                latitude,
                longitude,
            } => {
                let mut obj = JsonMap::new();
                obj.insert("latitude".to_string(), JsonValue::from(*latitude));
                obj.insert("longitude".to_string(), JsonValue::from(*longitude));
                JsonValue::Object(obj)
            }
            Self::Array(items) => JsonValue::Array(items.iter().map(Self::to_untyped).collect()),
            Self::Map(fields) => JsonValue::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_untyped()))
                    .collect(),
            ),
            Self::Unknown(repr) => JsonValue::String(repr.clone()),
        }
    }

    /// Returns the nested mapping if this value is a map.
    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Self::Map(fields) => Some(fields),
            _ => None,
        }
    }

    /// Returns true for null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Position of this value's kind in the cross-type sort order.
    ///
    /// null < boolean < number < timestamp < string < bytes < reference <
    /// geoPoint < array < map < unknown
    pub fn kind_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Integer(_) | Self::Double(_) => 2,
            Self::Timestamp(_) => 3,
            Self::String(_) => 4,
            Self::Bytes(_) => 5,
            Self::Reference { .. } => 6,
            Self::GeoPoint { .. } => 7,
            Self::Array(_) => 8,
            Self::Map(_) => 9,
            Self::Unknown(_) => 10,
        }
    }

    /// Total order over all values, used for sorting and range filters.
    ///
    /// Integers and doubles compare numerically with each other.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Integer(a), Self::Double(b)) => int_as_f64(*a).total_cmp(b),
            (Self::Double(a), Self::Integer(b)) => a.total_cmp(&int_as_f64(*b)),
            (Self::Double(a), Self::Double(b)) => a.total_cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            (
                Self::Reference {
                    collection: ca,
                    id: ia,
                },
                Self::Reference {
                    collection: cb,
                    id: ib,
                },
            ) => ca.cmp(cb).then_with(|| ia.cmp(ib)),
            (
                Self::GeoPoint {
                    latitude: la,
                    longitude: oa,
                },
                Self::GeoPoint {
                    latitude: lb,
                    longitude: ob,
                },
            ) => la.total_cmp(lb).then_with(|| oa.total_cmp(ob)),
            (Self::Array(a), Self::Array(b)) => {
                cmp_sequences(a.iter(), b.iter(), |x, y| x.total_cmp(y))
            }
            (Self::Map(a), Self::Map(b)) => cmp_sequences(a.iter(), b.iter(), |(ka, va), (kb, vb)| {
                ka.cmp(kb).then_with(|| va.total_cmp(vb))
            }),
            (Self::Unknown(a), Self::Unknown(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn int_as_f64(i: i64) -> f64 {
    i as f64
}

fn cmp_sequences<T, I, F>(mut a: I, mut b: I, mut cmp: F) -> Ordering
where
    I: Iterator<Item = T>,
    F: FnMut(&T, &T) -> Ordering,
{
    loop {
        match (a.next(), b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match cmp(&x, &y) {
                Ordering::Equal => {}
                other => return other,
            },
        }
    }
}

fn single_entry(key: &str, value: JsonValue) -> JsonValue {
    let mut obj = JsonMap::new();
    obj.insert(key.to_string(), value);
    JsonValue::Object(obj)
}

fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn plain_map(obj: JsonMap<String, JsonValue>) -> Value {
    Value::Map(
        obj.into_iter()
            .map(|(k, v)| (k, Value::from_untyped(v)))
            .collect(),
    )
}

fn decode_timestamp(obj: JsonMap<String, JsonValue>) -> Value {
    let parsed = obj
        .get("toDate")
        .and_then(JsonValue::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
    match parsed {
        Some(t) => Value::Timestamp(t.with_timezone(&Utc)),
        None => plain_map(obj),
    }
}

fn decode_bytes(obj: JsonMap<String, JsonValue>) -> Value {
    let decoded = obj
        .get("toBase64")
        .and_then(JsonValue::as_str)
        .and_then(|s| STANDARD.decode(s).ok());
    match decoded {
        Some(bytes) => Value::Bytes(bytes),
        None => plain_map(obj),
    }
}

fn decode_reference(obj: JsonMap<String, JsonValue>) -> Value {
    let parts = match (
        obj.get("path").and_then(JsonValue::as_str),
        obj.get("id").and_then(JsonValue::as_str),
    ) {
        (Some(path), Some(id)) => path
            .strip_suffix(id)
            .and_then(|rest| rest.strip_suffix('/'))
            .filter(|collection| !collection.is_empty())
            .map(|collection| (collection.to_string(), id.to_string())),
        _ => None,
    };
    match parts {
        Some((collection, id)) => Value::Reference { collection, id },
        None => plain_map(obj),
    }
}

fn decode_geo_point(obj: JsonMap<String, JsonValue>) -> Value {
    match (
        obj.get("latitude").and_then(JsonValue::as_f64),
        obj.get("longitude").and_then(JsonValue::as_f64),
    ) {
        (Some(latitude), Some(longitude)) => Value::GeoPoint {
            latitude,
            longitude,
        },
        _ => plain_map(obj),
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Double(d) if d.is_finite() => serializer.serialize_f64(*d),
            Self::Double(_) => serializer.serialize_unit(),
            Self::String(s) | Self::Unknown(s) => serializer.serialize_str(s),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Self::Bytes(_)
            | Self::Timestamp(_)
            | Self::Reference { .. }
            | Self::GeoPoint { .. } => self.to_untyped().serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(Self::from_untyped)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}
