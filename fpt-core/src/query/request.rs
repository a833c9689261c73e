//! Declarative query requests and their validation.

use crate::Result;
use crate::error::FptError;
use crate::value::Value;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Default page size for interactive queries.
pub const DEFAULT_QUERY_LIMIT: u32 = 25;

/// Hard ceiling for interactive queries.
pub const MAX_QUERY_LIMIT: u32 = 200;

/// Hard ceiling for exports.
pub const MAX_EXPORT_LIMIT: u32 = 5000;

/// Comparison operator of a `where` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "array-contains")]
    ArrayContains,
}

impl FilterOp {
    /// Parses the wire form of an operator.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "==" => Some(Self::Eq),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            "array-contains" => Some(Self::ArrayContains),
            _ => None,
        }
    }

    /// Wire form of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::ArrayContains => "array-contains",
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a `where` clause.
///
/// Only scalars and null are accepted; arrays and objects are rejected at the
/// boundary instead of being passed through untyped.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
}

impl FilterValue {
    /// Converts generic JSON, returning `None` for arrays and objects.
    pub fn from_json(json: &JsonValue) -> Option<Self> {
        match json {
            JsonValue::Null => Some(Self::Null),
            JsonValue::Bool(b) => Some(Self::Boolean(*b)),
            JsonValue::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Double)),
            JsonValue::String(s) => Some(Self::String(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }

    /// The equivalent document value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Boolean(b) => Value::Boolean(*b),
            Self::Integer(i) => Value::Integer(*i),
            Self::Double(d) => Value::Double(*d),
            Self::String(s) => Value::String(s.clone()),
        }
    }
}

impl Serialize for FilterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilterValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = JsonValue::deserialize(deserializer)?;
        Self::from_json(&json).ok_or_else(|| {
            serde::de::Error::custom("filter value must be null, a boolean, a number or a string")
        })
    }
}

/// One filter predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereClause {
    /// Dotted field path
    pub field: String,
    /// Comparison operator
    #[serde(alias = "operator")]
    pub op: FilterOp,
    /// Value compared against
    pub value: FilterValue,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Parses `asc` / `desc`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Explicit primary sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Dotted field path
    pub field: String,
    /// Direction, ascending unless stated
    #[serde(default)]
    pub direction: SortDirection,
}

fn default_limit() -> u32 {
    DEFAULT_QUERY_LIMIT
}

/// Filtered, ordered, paginated query over one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// Collection to query
    pub collection: String,
    /// Predicates, applied in the order given
    #[serde(default, rename = "where")]
    pub filters: Vec<WhereClause>,
    /// Primary sort key; document id order when absent
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    /// Page size
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Resume after this document id
    #[serde(default)]
    pub start_after_id: Option<String>,
}

impl QueryRequest {
    /// Creates a request with defaults for everything but the collection.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: DEFAULT_QUERY_LIMIT,
            start_after_id: None,
        }
    }

    /// Builder method to add a filter.
    pub fn with_filter(mut self, field: impl Into<String>, op: FilterOp, value: FilterValue) -> Self {
        self.filters.push(WhereClause {
            field: field.into(),
            op,
            value,
        });
        self
    }

    /// Builder method to set the primary sort key.
    pub fn with_order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Builder method to set the page size.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Builder method to set the cursor.
    pub fn with_start_after(mut self, id: impl Into<String>) -> Self {
        self.start_after_id = Some(id.into());
        self
    }

    /// Validates the request shape against a page-size ceiling.
    ///
    /// # Errors
    /// Returns a validation error naming the first offending field.
    pub fn validate(&self, max_limit: u32) -> Result<()> {
        validate_collection(&self.collection)?;

        for (index, clause) in self.filters.iter().enumerate() {
            validate_field_path(&clause.field, &format!("where[{}].field", index))?;
        }

        if let Some(order_by) = &self.order_by {
            validate_field_path(&order_by.field, "orderBy.field")?;
        }

        if !(1..=max_limit).contains(&self.limit) {
            return Err(FptError::validation(
                "limit",
                format!("must be between 1 and {}, got {}", max_limit, self.limit),
            ));
        }

        if self.start_after_id.as_deref().is_some_and(str::is_empty) {
            return Err(FptError::validation("startAfterId", "must not be empty"));
        }

        Ok(())
    }
}

/// Rejects empty collection names and names with empty path segments.
pub fn validate_collection(collection: &str) -> Result<()> {
    if collection.trim().is_empty() {
        return Err(FptError::validation("collection", "must not be empty"));
    }
    if collection.split('/').any(str::is_empty) {
        return Err(FptError::validation(
            "collection",
            format!("'{}' contains an empty path segment", collection),
        ));
    }
    Ok(())
}

fn validate_field_path(path: &str, name: &str) -> Result<()> {
    if path.is_empty() {
        return Err(FptError::validation(name, "must not be empty"));
    }
    if path.split('.').any(str::is_empty) {
        return Err(FptError::validation(
            name,
            format!("'{}' contains an empty path segment", path),
        ));
    }
    Ok(())
}

/// Parses the `where` parameter: a JSON array of `{field, op, value}`.
///
/// Errors name the element and key at fault (`where[1].op`).
pub fn parse_where(raw: &str) -> Result<Vec<WhereClause>> {
    let json: JsonValue = serde_json::from_str(raw)
        .map_err(|e| FptError::validation("where", format!("not valid JSON: {}", e)))?;

    let JsonValue::Array(items) = json else {
        return Err(FptError::validation("where", "must be a JSON array"));
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| -> Result<WhereClause> {
            let obj = item.as_object().ok_or_else(|| {
                FptError::validation(format!("where[{}]", index), "must be an object")
            })?;

            let field = obj
                .get("field")
                .and_then(JsonValue::as_str)
                .filter(|f| !f.is_empty())
                .ok_or_else(|| {
                    FptError::validation(
                        format!("where[{}].field", index),
                        "must be a non-empty string",
                    )
                })?;

            let op = obj
                .get("op")
                .or_else(|| obj.get("operator"))
                .and_then(JsonValue::as_str)
                .and_then(FilterOp::parse)
                .ok_or_else(|| {
                    FptError::validation(
                        format!("where[{}].op", index),
                        "must be one of ==, >, >=, <, <=, array-contains",
                    )
                })?;

            let value = obj
                .get("value")
                .map_or(Some(FilterValue::Null), FilterValue::from_json)
                .ok_or_else(|| {
                    FptError::validation(
                        format!("where[{}].value", index),
                        "must be null, a boolean, a number or a string",
                    )
                })?;

            Ok(WhereClause {
                field: field.to_string(),
                op,
                value,
            })
        })
        .collect()
}

/// Coerces an optional numeric query parameter.
///
/// Absent or blank input yields `default`; anything that is not an integer
/// in `1..=max` is rejected rather than clamped.
pub fn parse_limit(raw: Option<&str>, default: u32, max: u32, field: &str) -> Result<u32> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(default);
    };
    let limit: u32 = raw
        .parse()
        .map_err(|_| FptError::validation(field, format!("'{}' is not a positive integer", raw)))?;
    if (1..=max).contains(&limit) {
        Ok(limit)
    } else {
        Err(FptError::validation(
            field,
            format!("must be between 1 and {}, got {}", max, limit),
        ))
    }
}
