//! HTTP request handlers and application state.

use super::errors::ApiError;
use super::params::{DocParams, DocsParams, ExportParams, InferParams, QueryParams};
use axum::Json;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use fpt_core::security::WRITE_TOKEN_HEADER;
use fpt_core::{
    Document, DocumentStore, FptError, ObservedSchema, QueryResponse, Value, WriteCredential,
    assert_write_allowed, export_stream, infer_schema, run_query,
};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Backing document store
    pub store: Arc<dyn DocumentStore>,
    /// Write gate credential
    pub write: Arc<WriteCredential>,
    /// Rows per store round trip during export
    pub export_page_size: u32,
}

/// `GET /health`
pub async fn health() -> Json<JsonValue> {
    Json(json!({ "ok": true }))
}

/// `GET /collections`
pub async fn list_collections(State(state): State<AppState>) -> Result<Json<JsonValue>, ApiError> {
    let collections = state.store.list_collections().await?;
    Ok(Json(json!({ "collections": collections })))
}

/// `GET /schema/infer`
pub async fn infer(
    State(state): State<AppState>,
    Query(params): Query<InferParams>,
) -> Result<Json<ObservedSchema>, ApiError> {
    let (collection, limit) = params.resolve()?;
    let schema = infer_schema(state.store.as_ref(), &collection, limit).await?;
    Ok(Json(schema))
}

/// `GET /query`
pub async fn query(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResponse>, ApiError> {
    let request = params.resolve()?;
    let response = run_query(state.store.as_ref(), &request).await?;
    Ok(Json(response))
}

/// `GET /docs`
pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<DocsParams>,
) -> Result<Json<QueryResponse>, ApiError> {
    let request = params.resolve()?;
    let response = run_query(state.store.as_ref(), &request).await?;
    Ok(Json(response))
}

/// `GET /doc`
pub async fn get_document(
    State(state): State<AppState>,
    Query(params): Query<DocParams>,
) -> Result<Json<Document>, ApiError> {
    let (collection, id) = params.resolve()?;
    let document = state
        .store
        .get_document(&collection, &id)
        .await?
        .ok_or_else(|| FptError::not_found(format!("{}/{}", collection, id)))?;
    Ok(Json(document))
}

/// Body of `PATCH /doc`.
#[derive(Debug, Deserialize)]
pub struct PatchBody {
    /// Fields to merge, in the marker-key encoding
    pub data: JsonValue,
}

fn provided_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(WRITE_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
}

/// `PATCH /doc`: token-gated merge-upsert.
pub async fn patch_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<DocParams>,
    body: Result<Json<PatchBody>, JsonRejection>,
) -> Result<Json<JsonValue>, ApiError> {
    assert_write_allowed(&state.write, provided_token(&headers))?;
    let (collection, id) = params.resolve()?;
    let Json(body) = body?;

    let Value::Map(data) = Value::from_untyped(body.data) else {
        return Err(FptError::validation("data", "must be an object").into());
    };

    state.store.merge_document(&collection, &id, data).await?;
    tracing::info!(collection = %collection, id = %id, "Merged document");
    Ok(Json(json!({ "ok": true })))
}

/// `DELETE /doc`: token-gated delete.
pub async fn delete_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<DocParams>,
) -> Result<Json<JsonValue>, ApiError> {
    assert_write_allowed(&state.write, provided_token(&headers))?;
    let (collection, id) = params.resolve()?;

    state.store.delete_document(&collection, &id).await?;
    tracing::info!(collection = %collection, id = %id, "Deleted document");
    Ok(Json(json!({ "ok": true })))
}

/// `GET /export`: streamed attachment.
pub async fn export(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let request = params.resolve()?;
    let filename = request.filename();
    let content_type = request.format.content_type();

    let stream = export_stream(state.store.clone(), request, state.export_page_size)?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .map_err(|_| FptError::validation("collection", "cannot be used in a file name"))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
