//! Filtered, ordered, keyset-paginated queries.
//!
//! # Module Structure
//! - `request`: the declarative request, its validation and parameter parsing
//! - `plan`: store-agnostic plans and in-memory evaluation semantics
//! - `builder`: request to plan lowering, cursor resolution, page execution
//!
//! # Ordering Guarantee
//! Without an explicit `orderBy` every query is ordered by document id, so a
//! page boundary is always well defined and `startAfterId` can resume it.

pub mod builder;
pub mod plan;
pub mod request;

pub use builder::{QueryResponse, build_plan, resolve_cursor, run_query};
pub use plan::{Cursor, Filter, PlanOrder, QueryPlan, SortKey};
pub use request::{
    DEFAULT_QUERY_LIMIT, FilterOp, FilterValue, MAX_EXPORT_LIMIT, MAX_QUERY_LIMIT, OrderBy,
    QueryRequest, SortDirection, WhereClause, parse_limit, parse_where, validate_collection,
};
