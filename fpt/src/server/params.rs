//! Query-string parameters and their lowering into core requests.
//!
//! Every parameter arrives as an optional string so coercion failures can be
//! reported against the parameter name instead of as a generic rejection.

use fpt_core::export::{DEFAULT_EXPORT_LIMIT, ExportFormat, ExportRequest, parse_columns};
use fpt_core::query::{
    DEFAULT_QUERY_LIMIT, MAX_EXPORT_LIMIT, MAX_QUERY_LIMIT, OrderBy, QueryRequest, SortDirection,
    parse_limit, parse_where, validate_collection,
};
use fpt_core::schema::{DEFAULT_SAMPLE_LIMIT, MAX_SAMPLE_LIMIT};
use fpt_core::{FptError, Result};
use serde::Deserialize;

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Extracts and validates the `collection` parameter.
pub fn required_collection(raw: Option<&str>) -> Result<String> {
    let collection =
        non_blank(raw).ok_or_else(|| FptError::validation("collection", "is required"))?;
    validate_collection(collection)?;
    Ok(collection.to_string())
}

/// `GET /schema/infer`
#[derive(Debug, Default, Deserialize)]
pub struct InferParams {
    pub collection: Option<String>,
    pub limit: Option<String>,
}

impl InferParams {
    /// Returns `(collection, sample_limit)`.
    pub fn resolve(&self) -> Result<(String, u32)> {
        let collection = required_collection(self.collection.as_deref())?;
        let limit = parse_limit(
            self.limit.as_deref(),
            DEFAULT_SAMPLE_LIMIT,
            MAX_SAMPLE_LIMIT,
            "limit",
        )?;
        Ok((collection, limit))
    }
}

/// `GET /query`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub collection: Option<String>,
    #[serde(rename = "where")]
    pub filters: Option<String>,
    pub order_by_field: Option<String>,
    pub order_by_dir: Option<String>,
    pub limit: Option<String>,
    pub start_after_id: Option<String>,
}

impl QueryParams {
    /// Builds the core query request.
    pub fn resolve(&self) -> Result<QueryRequest> {
        let collection = required_collection(self.collection.as_deref())?;
        let filters = match non_blank(self.filters.as_deref()) {
            Some(raw) => parse_where(raw)?,
            None => Vec::new(),
        };

        let order_by = match non_blank(self.order_by_field.as_deref()) {
            Some(field) => {
                let direction = match non_blank(self.order_by_dir.as_deref()) {
                    Some(raw) => SortDirection::parse(raw).ok_or_else(|| {
                        FptError::validation(
                            "orderByDir",
                            format!("must be 'asc' or 'desc', got '{}'", raw),
                        )
                    })?,
                    None => SortDirection::Asc,
                };
                Some(OrderBy {
                    field: field.to_string(),
                    direction,
                })
            }
            None => None,
        };

        let limit = parse_limit(
            self.limit.as_deref(),
            DEFAULT_QUERY_LIMIT,
            MAX_QUERY_LIMIT,
            "limit",
        )?;

        Ok(QueryRequest {
            collection,
            filters,
            order_by,
            limit,
            start_after_id: non_blank(self.start_after_id.as_deref()).map(str::to_string),
        })
    }
}

/// `GET /docs`: plain browsing in document-id order.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocsParams {
    pub collection: Option<String>,
    pub limit: Option<String>,
    pub start_after: Option<String>,
}

impl DocsParams {
    /// Builds an unfiltered, id-ordered query request.
    pub fn resolve(&self) -> Result<QueryRequest> {
        let collection = required_collection(self.collection.as_deref())?;
        let limit = parse_limit(
            self.limit.as_deref(),
            DEFAULT_QUERY_LIMIT,
            MAX_QUERY_LIMIT,
            "limit",
        )?;
        let mut request = QueryRequest::new(collection).with_limit(limit);
        if let Some(id) = non_blank(self.start_after.as_deref()) {
            request = request.with_start_after(id);
        }
        Ok(request)
    }
}

/// `GET|PATCH|DELETE /doc`
#[derive(Debug, Default, Deserialize)]
pub struct DocParams {
    pub collection: Option<String>,
    pub id: Option<String>,
}

impl DocParams {
    /// Returns `(collection, id)`.
    pub fn resolve(&self) -> Result<(String, String)> {
        let collection = required_collection(self.collection.as_deref())?;
        let id = non_blank(self.id.as_deref())
            .ok_or_else(|| FptError::validation("id", "is required"))?;
        if id.contains('/') {
            return Err(FptError::validation("id", "must not contain '/'"));
        }
        Ok((collection, id.to_string()))
    }
}

/// `GET /export`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportParams {
    pub collection: Option<String>,
    pub format: Option<String>,
    pub limit: Option<String>,
    pub start_after: Option<String>,
    pub columns: Option<String>,
}

impl ExportParams {
    /// Builds the core export request; `format` defaults to `jsonl`.
    pub fn resolve(&self) -> Result<ExportRequest> {
        let collection = required_collection(self.collection.as_deref())?;
        let format = match non_blank(self.format.as_deref()) {
            Some(raw) => ExportFormat::parse(raw)?,
            None => ExportFormat::Jsonl,
        };
        let limit = parse_limit(
            self.limit.as_deref(),
            DEFAULT_EXPORT_LIMIT,
            MAX_EXPORT_LIMIT,
            "limit",
        )?;

        let mut request = ExportRequest::new(collection, format).with_limit(limit);
        if let Some(id) = non_blank(self.start_after.as_deref()) {
            request = request.with_start_after(id);
        }
        if let Some(columns) = parse_columns(self.columns.as_deref()) {
            request = request.with_columns(columns);
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(err: FptError) -> String {
        match err {
            FptError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_query_params_defaults() {
        let params = QueryParams {
            collection: Some("users".to_string()),
            ..QueryParams::default()
        };
        let request = params.resolve().unwrap();
        assert_eq!(request.limit, 25);
        assert!(request.filters.is_empty());
        assert!(request.order_by.is_none());
        assert!(request.start_after_id.is_none());
    }

    #[test]
    fn test_docs_params_browse_in_id_order() {
        let params = DocsParams {
            collection: Some("users".to_string()),
            limit: Some("10".to_string()),
            start_after: Some("u3".to_string()),
        };
        let request = params.resolve().unwrap();
        assert_eq!(request.limit, 10);
        assert!(request.filters.is_empty());
        assert!(request.order_by.is_none());
        assert_eq!(request.start_after_id.as_deref(), Some("u3"));

        let too_many = DocsParams {
            collection: Some("users".to_string()),
            limit: Some("500".to_string()),
            ..DocsParams::default()
        };
        assert_eq!(field(too_many.resolve().unwrap_err()), "limit");
    }

    #[test]
    fn test_query_params_full() {
        let params = QueryParams {
            collection: Some("users".to_string()),
            filters: Some(r#"[{"field":"age","op":">=","value":18}]"#.to_string()),
            order_by_field: Some("age".to_string()),
            order_by_dir: Some("desc".to_string()),
            limit: Some("50".to_string()),
            start_after_id: Some("u9".to_string()),
        };
        let request = params.resolve().unwrap();
        assert_eq!(request.filters.len(), 1);
        assert_eq!(request.order_by.unwrap().direction, SortDirection::Desc);
        assert_eq!(request.limit, 50);
        assert_eq!(request.start_after_id.as_deref(), Some("u9"));
    }

    #[test]
    fn test_query_params_fail_closed() {
        let base = || QueryParams {
            collection: Some("users".to_string()),
            ..QueryParams::default()
        };
        assert_eq!(field(QueryParams::default().resolve().unwrap_err()), "collection");
        let bad_limit = QueryParams {
            limit: Some("ten".to_string()),
            ..base()
        };
        assert_eq!(field(bad_limit.resolve().unwrap_err()), "limit");
        let too_big = QueryParams {
            limit: Some("201".to_string()),
            ..base()
        };
        assert_eq!(field(too_big.resolve().unwrap_err()), "limit");
        let bad_dir = QueryParams {
            order_by_field: Some("age".to_string()),
            order_by_dir: Some("up".to_string()),
            ..base()
        };
        assert_eq!(field(bad_dir.resolve().unwrap_err()), "orderByDir");
    }

    #[test]
    fn test_doc_params() {
        let params = DocParams {
            collection: Some("users".to_string()),
            id: Some("u1".to_string()),
        };
        assert_eq!(params.resolve().unwrap(), ("users".to_string(), "u1".to_string()));

        let missing = DocParams {
            collection: Some("users".to_string()),
            id: None,
        };
        assert_eq!(field(missing.resolve().unwrap_err()), "id");
    }

    #[test]
    fn test_export_params() {
        let params = ExportParams {
            collection: Some("users".to_string()),
            format: Some("csv".to_string()),
            columns: Some("name, age".to_string()),
            ..ExportParams::default()
        };
        let request = params.resolve().unwrap();
        assert_eq!(request.format, ExportFormat::Csv);
        assert_eq!(request.limit, 1000);
        assert_eq!(request.columns, Some(vec!["name".to_string(), "age".to_string()]));

        let bad = ExportParams {
            collection: Some("users".to_string()),
            format: Some("xml".to_string()),
            ..ExportParams::default()
        };
        assert_eq!(field(bad.resolve().unwrap_err()), "format");
    }

    #[test]
    fn test_infer_params() {
        let params = InferParams {
            collection: Some("users".to_string()),
            limit: None,
        };
        assert_eq!(params.resolve().unwrap(), ("users".to_string(), 200));
        let bad = InferParams {
            collection: Some("users".to_string()),
            limit: Some("5001".to_string()),
        };
        assert_eq!(field(bad.resolve().unwrap_err()), "limit");
    }
}
