//! The external document store the engine reads from and writes to.
//!
//! The engine only needs equality-filtered listing plus single-document CRUD;
//! each write is one atomic document call, so a failed write never leaves a
//! half-applied change behind.

mod documents;
mod memory;

pub use documents::{
    booking_from_document, booking_to_document, resource_from_document, resource_to_document,
    schedule_from_value, schedule_to_value, service_from_document, service_to_document,
    special_day_from_document, special_day_to_document,
};
pub use memory::MemoryStore;

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};
use ulid::Ulid;

pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Services,
    ServiceResources,
    Bookings,
    SpecialDays,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Services => "services",
            Collection::ServiceResources => "service_resources",
            Collection::Bookings => "bookings",
            Collection::SpecialDays => "special_days",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: Ulid,
    pub fields: Fields,
}

impl Document {
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Equality filters with optional ordering, limit and field selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Order)>,
    pub limit: Option<usize>,
    pub select: Option<Vec<String>>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, order: Order) -> Self {
        self.order_by = Some((field.to_string(), order));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        self.filters
            .iter()
            .all(|(name, value)| fields.get(name) == Some(value))
    }

    /// Apply ordering, limit and selection to an already-filtered result set.
    /// Without an explicit order, documents come back in id (creation) order.
    pub fn finish(&self, mut docs: Vec<Document>) -> Vec<Document> {
        docs.sort_by_key(|d| d.id);
        if let Some((field, order)) = &self.order_by {
            docs.sort_by(|a, b| {
                let ord = compare_values(a.fields.get(field), b.fields.get(field));
                match order {
                    Order::Asc => ord,
                    Order::Desc => ord.reverse(),
                }
            });
        }
        if let Some(n) = self.limit {
            docs.truncate(n);
        }
        if let Some(select) = &self.select {
            for doc in &mut docs {
                doc.fields.retain(|k, _| select.iter().any(|s| s == k));
            }
        }
        docs
    }
}

/// Total order over the JSON scalars we sort by. Missing fields sort first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound { collection: Collection, id: Ulid },
    AlreadyExists { collection: Collection, id: Ulid },
    InvalidBody(String),
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { collection, id } => write!(f, "{collection}/{id} not found"),
            StoreError::AlreadyExists { collection, id } => {
                write!(f, "{collection}/{id} already exists")
            }
            StoreError::InvalidBody(msg) => write!(f, "invalid document body: {msg}"),
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_documents(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError>;

    async fn get_document(
        &self,
        collection: Collection,
        id: Ulid,
    ) -> Result<Option<Document>, StoreError>;

    async fn create_document(
        &self,
        collection: Collection,
        id: Ulid,
        body: Fields,
    ) -> Result<Document, StoreError>;

    /// Shallow-merge `patch` into the stored document.
    async fn update_document(
        &self,
        collection: Collection,
        id: Ulid,
        patch: Fields,
    ) -> Result<Document, StoreError>;

    async fn delete_document(&self, collection: Collection, id: Ulid) -> Result<(), StoreError>;
}
