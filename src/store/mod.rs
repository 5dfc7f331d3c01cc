use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

pub mod dynamo;
pub mod memory;
pub mod schema;

pub use dynamo::DynamoStore;
pub use memory::{MemoryStore, StoreOp};
pub use schema::{Catalog, Field, IndexDef, TableDef, TableSchema};

/// Document
///
/// A record as the application sees it: a JSON object keyed by logical field
/// names. Adapters translate to their own encoding through the table's
/// field-mapping table.
pub type Document = serde_json::Map<String, Value>;

/// StoreError
///
/// Any failure surfaced by a store adapter. Handlers turn these into a 500
/// response; nothing in the request path retries them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{operation} on {table} failed: {message}")]
    Request {
        operation: &'static str,
        table: String,
        message: String,
    },
    #[error("item in {table} could not be decoded: {source}")]
    Decode {
        table: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("record for {table} could not be encoded: {message}")]
    Encode { table: String, message: String },
    #[error("{table} has no index named {index}")]
    UnknownIndex { table: String, index: String },
    #[error("key for {table} is missing attribute {attribute}")]
    MissingKey { table: String, attribute: String },
}

/// KeyCondition
///
/// Equality on the partition key of the table or of the queried index. Range
/// conditions on the sort key are not needed by any listing.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    pub field: String,
    pub value: Value,
}

impl KeyCondition {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Query
///
/// A range query. `descending` is the explicit sort direction requested from
/// the store; callers pass the returned order through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub index: Option<&'static str>,
    pub condition: KeyCondition,
    pub descending: bool,
}

impl Query {
    pub fn on_table(condition: KeyCondition) -> Self {
        Self {
            index: None,
            condition,
            descending: false,
        }
    }

    pub fn on_index(index: &'static str, condition: KeyCondition) -> Self {
        Self {
            index: Some(index),
            condition,
            descending: false,
        }
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }
}

/// Store
///
/// The narrow contract the rest of the service depends on. Keys and items are
/// [`Document`]s with logical field names.
///
/// `batch_get` may return fewer items than keys requested, in any order;
/// missing keys are not an error. Keys the backend declined to read (DynamoDB
/// throttling leaves them unprocessed) are indistinguishable from missing ones.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, table: &TableDef, key: Document) -> Result<Option<Document>, StoreError>;

    async fn put(&self, table: &TableDef, item: Document) -> Result<(), StoreError>;

    async fn query(&self, table: &TableDef, query: Query) -> Result<Vec<Document>, StoreError>;

    async fn batch_get(
        &self,
        table: &TableDef,
        keys: Vec<Document>,
    ) -> Result<Vec<Document>, StoreError>;
}

/// StoreState
///
/// Shared handle to whichever adapter was built at startup.
pub type StoreState = Arc<dyn Store>;

/// Builds a key document from `(field, value)` pairs.
pub fn key<const N: usize>(pairs: [(&str, &str); N]) -> Document {
    pairs
        .into_iter()
        .map(|(field, value)| (field.to_string(), Value::String(value.to_string())))
        .collect()
}

pub fn to_document<T: Serialize>(table: &TableDef, record: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(other) => Err(StoreError::Encode {
            table: table.name.clone(),
            message: format!("expected an object, got {other}"),
        }),
        Err(e) => Err(StoreError::Encode {
            table: table.name.clone(),
            message: e.to_string(),
        }),
    }
}

pub fn from_document<T: DeserializeOwned>(table: &TableDef, doc: Document) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(doc)).map_err(|source| StoreError::Decode {
        table: table.name.clone(),
        source,
    })
}

pub fn from_documents<T: DeserializeOwned>(
    table: &TableDef,
    docs: Vec<Document>,
) -> Result<Vec<T>, StoreError> {
    docs.into_iter().map(|doc| from_document(table, doc)).collect()
}
