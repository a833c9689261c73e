//! Lowering of [`QueryPlan`]s into MongoDB filter and sort documents.
//!
//! Every clause lands in one top-level `$and`, in caller order. Ordering by a
//! field adds an `$exists` clause so documents lacking the field drop out,
//! and keyset resumption becomes an `$or` over `(field, _id)`.
//!
//! `$gt`/`$lt` only compare within one BSON type bracket, while `sort` orders
//! across brackets. The cursor clause therefore carries a third branch
//! selecting every value whose bracket sorts after the cursor's (before it,
//! descending), so a field holding numbers and strings pages through both.
//! Array-valued sort fields sort by their extreme element in MongoDB and
//! are not resumed exactly.

use super::conversion::{ID_FIELD, id_to_bson, value_to_bson};
use crate::query::{Cursor, Filter, FilterOp, QueryPlan, SortDirection, SortKey};
use mongodb::bson::{Bson, Document, doc};

fn comparison(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "$gt",
        SortDirection::Desc => "$lt",
    }
}

/// MongoDB's cross-type sort order, as `$type` aliases per bracket.
const SORT_BRACKETS: [&[&str]; 13] = [
    &["minKey"],
    &["null"],
    &["double", "int", "long", "decimal"],
    &["symbol", "string"],
    &["object"],
    &["array"],
    &["binData"],
    &["objectId"],
    &["bool"],
    &["date"],
    &["timestamp"],
    &["regex"],
    &["maxKey"],
];

fn sort_bracket(value: &Bson) -> Option<usize> {
    let bracket = match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Decimal128(_) => 2,
        Bson::Symbol(_) | Bson::String(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 12,
        _ => return None,
    };
    Some(bracket)
}

/// `$type` aliases of the brackets that sort strictly after `value` in
/// `direction`.
fn brackets_past(value: &Bson, direction: SortDirection) -> Vec<Bson> {
    let Some(bracket) = sort_bracket(value) else {
        return Vec::new();
    };
    let past: &[&[&str]] = match direction {
        SortDirection::Asc => SORT_BRACKETS.get(bracket.saturating_add(1)..),
        SortDirection::Desc => SORT_BRACKETS.get(..bracket),
    }
    .unwrap_or_default();
    past.iter()
        .flat_map(|aliases| aliases.iter())
        .map(|alias| Bson::String((*alias).to_string()))
        .collect()
}

fn sort_sign(direction: SortDirection) -> i32 {
    match direction {
        SortDirection::Asc => 1,
        SortDirection::Desc => -1,
    }
}

/// Lowers one filter into its MongoDB clause.
pub fn filter_clause(filter: &Filter) -> Document {
    let operand = value_to_bson(&filter.value);
    let field = filter.field.as_str();
    match filter.op {
        FilterOp::Eq => doc! { field: { "$eq": operand } },
        FilterOp::Gt => doc! { field: { "$gt": operand } },
        FilterOp::Ge => doc! { field: { "$gte": operand } },
        FilterOp::Lt => doc! { field: { "$lt": operand } },
        FilterOp::Le => doc! { field: { "$lte": operand } },
        FilterOp::ArrayContains => doc! { field: { "$elemMatch": { "$eq": operand } } },
    }
}

/// Lowers a cursor into the clause selecting documents strictly after it.
pub fn cursor_clause(plan: &QueryPlan, cursor: &Cursor) -> Document {
    let op = comparison(plan.order.direction);
    let id = id_to_bson(&cursor.id);
    match (&plan.order.key, &cursor.sort_value) {
        (SortKey::Field(field), Some(value)) => {
            let field = field.as_str();
            let value = value_to_bson(value);
            let past = brackets_past(&value, plan.order.direction);
            let mut branches = vec![
                Bson::Document(doc! { field: { op: value.clone() } }),
                Bson::Document(doc! { field: value, ID_FIELD: { op: id } }),
            ];
            if !past.is_empty() {
                branches.push(Bson::Document(doc! { field: { "$type": past } }));
            }
            doc! { "$or": branches }
        }
        _ => doc! { ID_FIELD: { op: id } },
    }
}

/// Builds the complete filter document for a plan.
pub fn filter_document(plan: &QueryPlan) -> Document {
    let mut clauses: Vec<Bson> = plan
        .filters
        .iter()
        .map(|filter| Bson::Document(filter_clause(filter)))
        .collect();

    if let SortKey::Field(field) = &plan.order.key {
        let field = field.as_str();
        clauses.push(Bson::Document(doc! { field: { "$exists": true } }));
    }
    if let Some(cursor) = &plan.start_after {
        clauses.push(Bson::Document(cursor_clause(plan, cursor)));
    }

    if clauses.is_empty() {
        Document::new()
    } else {
        doc! { "$and": clauses }
    }
}

/// Builds the sort document for a plan; `_id` always breaks ties.
pub fn sort_document(plan: &QueryPlan) -> Document {
    let sign = sort_sign(plan.order.direction);
    match &plan.order.key {
        SortKey::DocumentId => doc! { ID_FIELD: sign },
        SortKey::Field(field) => {
            let field = field.as_str();
            doc! { field: sign, ID_FIELD: sign }
        }
    }
}
