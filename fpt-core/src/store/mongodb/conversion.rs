//! BSON to [`Value`] conversion, both ways.
//!
//! Decoding is closed: every BSON kind lands on exactly one variant, and
//! kinds with no counterpart (decimals, regexes, code, min/max keys) become
//! [`Value::Unknown`] carrying their textual rendering.
//!
//! Two document shapes are recognised structurally, mirroring the marker
//! encoding: a DBRef (`$ref` + `$id`) becomes a reference and a GeoJSON
//! `Point` becomes a geo point.

use crate::models::Document as FptDocument;
use crate::value::{Fields, Value};
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{Binary, Bson, Document, doc};

/// Document id field.
pub const ID_FIELD: &str = "_id";

/// Converts a BSON value into a [`Value`].
pub fn bson_to_value(bson: Bson) -> Value {
    match bson {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Boolean(b),
        Bson::Int32(i) => Value::Integer(i64::from(i)),
        Bson::Int64(i) => Value::Integer(i),
        Bson::Double(d) => Value::Double(d),
        Bson::String(s) | Bson::Symbol(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::Binary(binary) => Value::Bytes(binary.bytes),
        Bson::DateTime(dt) => millis_to_timestamp(dt.timestamp_millis())
            .unwrap_or_else(|| Value::Unknown(dt.to_string())),
        Bson::Timestamp(ts) => DateTime::<Utc>::from_timestamp(i64::from(ts.time), 0)
            .map(Value::Timestamp)
            .unwrap_or_else(|| Value::Unknown(Bson::Timestamp(ts).to_string())),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_value).collect()),
        Bson::Document(document) => document_to_value(document),
        other => Value::Unknown(other.to_string()),
    }
}

fn millis_to_timestamp(millis: i64) -> Option<Value> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(Value::Timestamp)
}

fn document_to_value(document: Document) -> Value {
    if let Some(reference) = decode_db_ref(&document) {
        return reference;
    }
    if let Some(point) = decode_geo_point(&document) {
        return point;
    }
    Value::Map(document_to_fields(document))
}

fn decode_db_ref(document: &Document) -> Option<Value> {
    let collection = document.get_str("$ref").ok()?;
    let id = match document.get("$id")? {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    };
    Some(Value::Reference {
        collection: collection.to_string(),
        id,
    })
}

fn decode_geo_point(document: &Document) -> Option<Value> {
    if document.get_str("type").ok()? != "Point" || document.len() != 2 {
        return None;
    }
    let coordinates = document.get_array("coordinates").ok()?;
    let [longitude, latitude] = coordinates.as_slice() else {
        return None;
    };
    Some(Value::GeoPoint {
        latitude: as_f64(latitude)?,
        longitude: as_f64(longitude)?,
    })
}

fn as_f64(bson: &Bson) -> Option<f64> {
    match bson {
        Bson::Double(d) => Some(*d),
        Bson::Int32(i) => Some(f64::from(*i)),
        // GeoJSON coordinates never approach the lossy range of i64 -> f64
        #[allow(clippy::cast_precision_loss)]
        Bson::Int64(i) => Some(*i as f64),
        _ => None,
    }
}

/// Converts a BSON document's fields, dropping nothing.
pub fn document_to_fields(document: Document) -> Fields {
    document
        .into_iter()
        .map(|(key, value)| (key, bson_to_value(value)))
        .collect()
}

/// Renders a stored `_id` as a document id string.
pub fn id_to_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        other => other.to_string(),
    }
}

/// Parses a document id string into the `_id` it is most likely stored as.
///
/// 24-character hex strings are taken to be ObjectIds.
pub fn id_to_bson(id: &str) -> Bson {
    ObjectId::parse_str(id)
        .map(Bson::ObjectId)
        .unwrap_or_else(|_| Bson::String(id.to_string()))
}

/// Splits a stored document into a snapshot, lifting `_id` out of the data.
pub fn to_fpt_document(mut document: Document) -> FptDocument {
    let id = document
        .remove(ID_FIELD)
        .map(|id| id_to_string(&id))
        .unwrap_or_default();
    FptDocument::new(id, document_to_fields(document))
}

/// Converts a [`Value`] into BSON for writes and filter operands.
pub fn value_to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Boolean(b) => Bson::Boolean(*b),
        Value::Integer(i) => Bson::Int64(*i),
        Value::Double(d) => Bson::Double(*d),
        Value::String(s) | Value::Unknown(s) => Bson::String(s.clone()),
        Value::Bytes(bytes) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: bytes.clone(),
        }),
        Value::Timestamp(t) => {
            Bson::DateTime(mongodb::bson::DateTime::from_millis(t.timestamp_millis()))
        }
        Value::Reference { collection, id } => Bson::Document(doc! {
            "$ref": collection.as_str(),
            "$id": id_to_bson(id),
        }),
        Value::GeoPoint {
            latitude,
            longitude,
        } => Bson::Document(doc! {
            "type": "Point",
            "coordinates": [*longitude, *latitude],
        }),
        Value::Array(items) => Bson::Array(items.iter().map(value_to_bson).collect()),
        Value::Map(fields) => Bson::Document(fields_to_document(fields)),
    }
}

/// Converts a field mapping into a BSON document.
pub fn fields_to_document(fields: &Fields) -> Document {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), value_to_bson(value)))
        .collect()
}

/// Flattens a merge patch into dotted `$set` paths.
///
/// Non-empty nested maps are descended into so sibling keys already stored
/// survive; everything else is set whole.
pub fn flatten_merge_patch(fields: &Fields) -> Document {
    let mut out = Document::new();
    flatten_into(&mut out, "", fields);
    out
}

fn flatten_into(out: &mut Document, prefix: &str, fields: &Fields) {
    for (key, value) in fields {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Map(nested) if !nested.is_empty() => flatten_into(out, &path, nested),
            other => {
                out.insert(path, value_to_bson(other));
            }
        }
    }
}
