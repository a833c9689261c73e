//! Store-agnostic query plans.
//!
//! The builder lowers a validated [`QueryRequest`](super::QueryRequest) into a
//! [`QueryPlan`]; each backend turns the plan into its own native operations.
//! Backends that evaluate plans themselves (the in-memory store) use the
//! matching and ordering helpers defined here, which follow document-database
//! semantics:
//!
//! - range operators only match values of the same kind as the filter value
//! - `array-contains` matches arrays holding an element equal to the value
//! - ordering by a field excludes documents that lack the field
//! - document id is always the final tiebreaker, in the sort direction

use super::request::{FilterOp, SortDirection};
use crate::models::Document;
use crate::value::Value;
use std::cmp::Ordering;

/// A lowered filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Dotted field path
    pub field: String,
    /// Operator
    pub op: FilterOp,
    /// Comparison operand
    pub value: Value,
}

impl Filter {
    /// Evaluates the predicate against a document.
    pub fn matches(&self, document: &Document) -> bool {
        let Some(actual) = document.field(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => actual.total_cmp(&self.value) == Ordering::Equal,
            FilterOp::ArrayContains => match actual {
                Value::Array(items) => items
                    .iter()
                    .any(|item| item.total_cmp(&self.value) == Ordering::Equal),
                _ => false,
            },
            FilterOp::Gt | FilterOp::Ge | FilterOp::Lt | FilterOp::Le => {
                if actual.kind_rank() != self.value.kind_rank() {
                    return false;
                }
                let ordering = actual.total_cmp(&self.value);
                match self.op {
                    FilterOp::Gt => ordering == Ordering::Greater,
                    FilterOp::Ge => ordering != Ordering::Less,
                    FilterOp::Lt => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                }
            }
        }
    }
}

/// What a plan sorts by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    /// Document id only
    DocumentId,
    /// A field, with document id as tiebreaker
    Field(String),
}

/// Active ordering of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOrder {
    /// Primary key
    pub key: SortKey,
    /// Direction applied to the primary key and the id tiebreaker
    pub direction: SortDirection,
}

impl Default for PlanOrder {
    fn default() -> Self {
        Self {
            key: SortKey::DocumentId,
            direction: SortDirection::Asc,
        }
    }
}

impl PlanOrder {
    /// Sort value of a document under this ordering.
    ///
    /// `None` means the document cannot take part in this ordering.
    pub fn sort_value<'a>(&self, document: &'a Document) -> Option<Option<&'a Value>> {
        match &self.key {
            SortKey::DocumentId => Some(None),
            SortKey::Field(path) => document.field(path).map(Some),
        }
    }

    /// Compares two `(sort value, id)` positions in this ordering.
    pub fn compare_positions(
        &self,
        a: (Option<&Value>, &str),
        b: (Option<&Value>, &str),
    ) -> Ordering {
        let primary = match (a.0, b.0) {
            (Some(va), Some(vb)) => va.total_cmp(vb),
            _ => Ordering::Equal,
        };
        let ascending = primary.then_with(|| a.1.cmp(b.1));
        match self.direction {
            SortDirection::Asc => ascending,
            SortDirection::Desc => ascending.reverse(),
        }
    }

    /// Compares two documents in this ordering.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let va = self.sort_value(a).flatten();
        let vb = self.sort_value(b).flatten();
        self.compare_positions((va, &a.id), (vb, &b.id))
    }
}

/// Keyset position to resume after.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    /// Id of the cursor document
    pub id: String,
    /// Its value for the active sort field (`None` under id ordering)
    pub sort_value: Option<Value>,
}

impl Cursor {
    /// True when `document` sorts strictly after this cursor.
    pub fn precedes(&self, order: &PlanOrder, document: &Document) -> bool {
        let Some(value) = order.sort_value(document) else {
            return false;
        };
        order.compare_positions((value, &document.id), (self.sort_value.as_ref(), &self.id))
            == Ordering::Greater
    }
}

/// A fully resolved query: everything a backend needs, nothing it must look up.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Collection to read
    pub collection: String,
    /// Predicates in caller order
    pub filters: Vec<Filter>,
    /// Active ordering
    pub order: PlanOrder,
    /// Resume position, if the requested cursor document exists
    pub start_after: Option<Cursor>,
    /// Maximum number of documents to return
    pub limit: u32,
}

impl QueryPlan {
    /// Plan that pages through a whole collection in id order.
    pub fn scan(collection: impl Into<String>, limit: u32) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order: PlanOrder::default(),
            start_after: None,
            limit,
        }
    }

    /// True when the document passes every filter and can take part in
    /// the ordering.
    pub fn admits(&self, document: &Document) -> bool {
        self.order.sort_value(document).is_some()
            && self.filters.iter().all(|filter| filter.matches(document))
    }

    /// Evaluates the plan over an in-memory set of documents.
    pub fn evaluate<'a, I>(&self, documents: I) -> Vec<Document>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut selected: Vec<&Document> = documents
            .into_iter()
            .filter(|doc| self.admits(doc))
            .filter(|doc| {
                self.start_after
                    .as_ref()
                    .is_none_or(|cursor| cursor.precedes(&self.order, doc))
            })
            .collect();
        selected.sort_by(|a, b| self.order.compare(a, b));
        selected
            .into_iter()
            .take(usize::try_from(self.limit).unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}
