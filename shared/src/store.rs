//! Document-store port shared by the DynamoDB and in-memory adapters.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Hard cap on every list query.
pub const MAX_PAGE_SIZE: usize = 1000;

pub type Document = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Subjects,
    Marks,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Subjects => "subjects",
            Collection::Marks => "marks",
        }
    }

    /// Key prefix used by adapters that share one keyspace between collections.
    pub fn key_prefix(self) -> &'static str {
        match self {
            Collection::Users => "USER",
            Collection::Subjects => "SUBJECT",
            Collection::Marks => "MARKS",
        }
    }

    /// Fields whose combined values must be unique within the collection.
    pub fn unique_fields(self) -> &'static [&'static str] {
        match self {
            Collection::Marks => &["student_id", "subject_id"],
            Collection::Users | Collection::Subjects => &[],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate {collection} record for {key}")]
    Duplicate {
        collection: &'static str,
        key: String,
    },

    #[error("malformed {collection} document: {reason}")]
    Malformed {
        collection: &'static str,
        reason: String,
    },

    #[error("{remaining} writes still unprocessed after retries")]
    Incomplete { remaining: usize },

    #[error("document encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("store backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

/// Conjunction of top-level field equalities. An empty filter matches all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    pub fn and(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push((field.to_string(), value.into()));
        self
    }

    /// Adds the clause only when a value is present.
    pub fn and_opt<V: Into<Value>>(self, field: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.and(field, v),
            None => self,
        }
    }

    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| document.get(field).is_some_and(|v| values_equal(v, value)))
    }
}

/// Numbers compare by value so that `1` and `1.0` are the same semester.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

pub fn to_document<T: Serialize>(record: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Malformed {
            collection: "record",
            reason: format!("expected an object, got {}", other),
        }),
    }
}

/// Decodes a stored document, refusing shapes that do not match the record.
pub fn from_document<T: DeserializeOwned>(
    collection: Collection,
    document: Document,
) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(document)).map_err(|e| StoreError::Malformed {
        collection: collection.name(),
        reason: e.to_string(),
    })
}

pub fn from_documents<T: DeserializeOwned>(
    collection: Collection,
    documents: Vec<Document>,
) -> Result<Vec<T>, StoreError> {
    documents
        .into_iter()
        .map(|document| from_document(collection, document))
        .collect()
}

/// Reads the `id` field every stored document carries.
pub fn document_id(document: &Document) -> Option<&str> {
    document.get("id").and_then(Value::as_str)
}

/// The collection's unique-field values encoded as a JSON array, or `None`
/// when it has none. The array form keeps separators inside values from
/// colliding with the boundary between fields.
pub fn unique_key(collection: Collection, document: &Document) -> Option<String> {
    let fields = collection.unique_fields();
    if fields.is_empty() {
        return None;
    }
    let parts: Vec<Value> = fields
        .iter()
        .map(|field| document.get(*field).cloned().unwrap_or(Value::Null))
        .collect();
    Some(Value::Array(parts).to_string())
}

/// Persistence operations the record service needs. Implementations must be
/// shareable across concurrent requests.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new document. Fails with [`StoreError::Duplicate`] if another
    /// document already holds the same unique-field values.
    async fn insert(&self, collection: Collection, document: Document) -> Result<(), StoreError>;

    /// Up to `limit` documents matching `filter`, in store order.
    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError>;

    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.find(collection, filter, 1).await?.pop())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        self.find_one(collection, &Filter::eq("id", id)).await
    }

    /// Overwrite `fields` on the document with `id` and return the result,
    /// or `None` if no such document exists.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Document,
    ) -> Result<Option<Document>, StoreError>;

    /// Returns whether a document was removed.
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError>;

    /// Returns the number of documents removed.
    async fn delete_many(&self, collection: Collection, filter: &Filter)
        -> Result<u64, StoreError>;

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError>;
}
