//! Lowering of query requests into store operations.
//!
//! A query becomes at most two store calls: one single-document fetch to
//! resolve `startAfterId`, then one plan execution. Filters are lowered one to
//! one and in order; the builder never reorders or merges them.

use super::plan::{Cursor, Filter, PlanOrder, QueryPlan, SortKey};
use super::request::{MAX_QUERY_LIMIT, QueryRequest, SortDirection};
use crate::Result;
use crate::models::Document;
use crate::store::DocumentStore;
use serde::{Deserialize, Serialize};

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// Collection that was queried
    pub collection: String,
    /// Documents on this page, in the active ordering
    pub docs: Vec<Document>,
    /// Id of the last document on the page, `None` for an empty page
    ///
    /// A full final page still carries a token; the next request then
    /// comes back empty.
    pub next_page_token: Option<String>,
}

fn plan_order(request: &QueryRequest) -> PlanOrder {
    match &request.order_by {
        Some(order_by) => PlanOrder {
            key: SortKey::Field(order_by.field.clone()),
            direction: order_by.direction,
        },
        None => PlanOrder {
            key: SortKey::DocumentId,
            direction: SortDirection::Asc,
        },
    }
}

/// Resolves a `startAfterId` into a keyset cursor.
///
/// A missing document yields `None`: the query then runs from the start, so a
/// deleted cursor document never breaks pagination. The same applies when
/// the document lacks the active sort field, since such a document can never
/// have been the last row of a page in that ordering.
pub async fn resolve_cursor(
    store: &dyn DocumentStore,
    collection: &str,
    start_after_id: &str,
    order: &PlanOrder,
) -> Result<Option<Cursor>> {
    let Some(document) = store.get_document(collection, start_after_id).await? else {
        tracing::debug!(
            collection,
            start_after_id,
            "Cursor document not found, starting from the beginning"
        );
        return Ok(None);
    };

    match order.sort_value(&document) {
        Some(value) => Ok(Some(Cursor {
            id: document.id.clone(),
            sort_value: value.cloned(),
        })),
        None => {
            tracing::warn!(
                collection,
                start_after_id,
                "Cursor document lacks the sort field, starting from the beginning"
            );
            Ok(None)
        }
    }
}

/// Validates a request and lowers it into a plan, resolving its cursor.
///
/// # Errors
/// Validation errors are raised before the store is touched.
pub async fn build_plan(
    store: &dyn DocumentStore,
    request: &QueryRequest,
    max_limit: u32,
) -> Result<QueryPlan> {
    request.validate(max_limit)?;

    let order = plan_order(request);
    let filters = request
        .filters
        .iter()
        .map(|clause| Filter {
            field: clause.field.clone(),
            op: clause.op,
            value: clause.value.to_value(),
        })
        .collect();

    let start_after = match request.start_after_id.as_deref() {
        Some(id) => resolve_cursor(store, &request.collection, id, &order).await?,
        None => None,
    };

    Ok(QueryPlan {
        collection: request.collection.clone(),
        filters,
        order,
        start_after,
        limit: request.limit,
    })
}

/// Runs one page of an interactive query.
///
/// # Errors
/// Returns a validation error for malformed requests (limit above 200
/// included) and a store error when the backend fails.
pub async fn run_query(store: &dyn DocumentStore, request: &QueryRequest) -> Result<QueryResponse> {
    let plan = build_plan(store, request, MAX_QUERY_LIMIT).await?;

    tracing::debug!(
        collection = %plan.collection,
        filters = plan.filters.len(),
        ordered_by = ?plan.order.key,
        resumed = plan.start_after.is_some(),
        limit = plan.limit,
        "Running query"
    );

    let docs = store.run_query(&plan).await?;
    let next_page_token = docs.last().map(|doc| doc.id.clone());

    Ok(QueryResponse {
        collection: request.collection.clone(),
        docs,
        next_page_token,
    })
}
