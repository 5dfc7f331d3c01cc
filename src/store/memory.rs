use super::{Document, Query, Store, StoreError, TableDef, to_document};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use tokio::sync::RwLock;

/// The four adapter operations, used to count calls and inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    Put,
    Query,
    BatchGet,
}

impl StoreOp {
    const ALL: usize = 4;

    fn index(self) -> usize {
        match self {
            StoreOp::Get => 0,
            StoreOp::Put => 1,
            StoreOp::Query => 2,
            StoreOp::BatchGet => 3,
        }
    }

    fn name(self) -> &'static str {
        match self {
            StoreOp::Get => "get",
            StoreOp::Put => "put",
            StoreOp::Query => "query",
            StoreOp::BatchGet => "batch_get",
        }
    }
}

/// MemoryStore
///
/// In-process implementation of [`Store`] used for local runs and tests.
/// Items are kept in their encoded (attribute) form so that the field-mapping
/// tables apply exactly as they do against DynamoDB: unmapped fields vanish on
/// `put`, queries order by the table or index sort key, and index queries skip
/// items that lack the index key.
///
/// Every call is counted per operation, and any operation can be switched to
/// fail, which lets handler tests assert on store traffic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Document>>>,
    calls: [AtomicUsize; StoreOp::ALL],
    failing: [AtomicBool; StoreOp::ALL],
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts records without counting them as calls.
    pub async fn seed<T: Serialize>(&self, table: &TableDef, records: &[T]) -> Result<(), StoreError> {
        for record in records {
            let doc = to_document(table, record)?;
            self.insert(table, doc).await?;
        }
        Ok(())
    }

    /// Makes every later call of `op` return a [`StoreError::Request`].
    pub fn fail(&self, op: StoreOp) {
        self.failing[op.index()].store(true, AtomicOrdering::SeqCst);
    }

    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls[op.index()].load(AtomicOrdering::SeqCst)
    }

    /// Number of items currently held for `table`.
    pub async fn len(&self, table: &TableDef) -> usize {
        self.tables
            .read()
            .await
            .get(&table.name)
            .map_or(0, Vec::len)
    }

    fn enter(&self, op: StoreOp, table: &TableDef) -> Result<(), StoreError> {
        self.calls[op.index()].fetch_add(1, AtomicOrdering::SeqCst);
        if self.failing[op.index()].load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Request {
                operation: op.name(),
                table: table.name.clone(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    async fn insert(&self, table: &TableDef, doc: Document) -> Result<(), StoreError> {
        let key = table.schema.encode(&table.schema.primary_key(&table.name, &doc)?);
        let item = table.schema.encode(&doc);

        let mut tables = self.tables.write().await;
        let items = tables.entry(table.name.clone()).or_default();
        match items.iter_mut().find(|existing| matches_key(existing, &key)) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
        Ok(())
    }
}

fn matches_key(item: &Document, key: &Document) -> bool {
    key.iter().all(|(attr, value)| item.get(attr) == Some(value))
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, table: &TableDef, key: Document) -> Result<Option<Document>, StoreError> {
        self.enter(StoreOp::Get, table)?;
        let key = table.schema.encode(&key);
        let tables = self.tables.read().await;
        Ok(tables
            .get(&table.name)
            .and_then(|items| items.iter().find(|item| matches_key(item, &key)))
            .map(|item| table.schema.decode(item)))
    }

    async fn put(&self, table: &TableDef, item: Document) -> Result<(), StoreError> {
        self.enter(StoreOp::Put, table)?;
        self.insert(table, item).await
    }

    async fn query(&self, table: &TableDef, query: Query) -> Result<Vec<Document>, StoreError> {
        self.enter(StoreOp::Query, table)?;
        let (partition, sort) = table.schema.key_for(&table.name, query.index)?;
        let attr = |name: &str| table.schema.attribute(name).unwrap_or(name).to_string();
        let condition_attr = attr(&query.condition.field);
        let partition_attr = attr(partition);
        let sort_attr = sort.map(attr);

        let tables = self.tables.read().await;
        let mut hits: Vec<&Document> = tables
            .get(&table.name)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.get(&condition_attr) == Some(&query.condition.value))
                    .filter(|item| {
                        query.index.is_none()
                            || (item.contains_key(&partition_attr)
                                && sort_attr.as_ref().is_none_or(|s| item.contains_key(s)))
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some(sort_attr) = &sort_attr {
            hits.sort_by(|a, b| compare(a.get(sort_attr), b.get(sort_attr)));
        }
        if query.descending {
            hits.reverse();
        }
        Ok(hits.into_iter().map(|item| table.schema.decode(item)).collect())
    }

    async fn batch_get(
        &self,
        table: &TableDef,
        keys: Vec<Document>,
    ) -> Result<Vec<Document>, StoreError> {
        self.enter(StoreOp::BatchGet, table)?;
        let keys: Vec<Document> = keys.iter().map(|k| table.schema.encode(k)).collect();
        let tables = self.tables.read().await;
        Ok(tables
            .get(&table.name)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| keys.iter().any(|key| matches_key(item, key)))
                    .map(|item| table.schema.decode(item))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Catalog, KeyCondition, key, schema::EXPENSES_BY_DATE_INDEX};
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn put_replaces_item_with_same_primary_key() {
        let store = MemoryStore::new();
        let members = Catalog::default().group_members;
        for name in ["Trip", "Trip 2024"] {
            store
                .put(&members, doc(json!({"userId": "u1", "groupId": "g1", "groupName": name})))
                .await
                .unwrap();
        }
        assert_eq!(store.len(&members).await, 1);
        let got = store
            .get(&members, key([("userId", "u1"), ("groupId", "g1")]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got["groupName"], json!("Trip 2024"));
        assert_eq!(store.calls(StoreOp::Put), 2);
        assert_eq!(store.calls(StoreOp::Get), 1);
    }

    #[tokio::test]
    async fn query_orders_by_index_sort_key_in_requested_direction() {
        let store = MemoryStore::new();
        let expenses = Catalog::default().expenses;
        store
            .seed(
                &expenses,
                &[
                    json!({"groupId": "g1", "expenseId": "b", "dateTime": "2023-01-02T00:00:00Z"}),
                    json!({"groupId": "g1", "expenseId": "a", "dateTime": "2023-01-01T00:00:00Z"}),
                    json!({"groupId": "g2", "expenseId": "c", "dateTime": "2023-01-03T00:00:00Z"}),
                    json!({"groupId": "g1", "expenseId": "undated"}),
                ],
            )
            .await
            .unwrap();

        let by_date = |descending| {
            let q = Query::on_index(EXPENSES_BY_DATE_INDEX, KeyCondition::eq("groupId", "g1"));
            if descending { q.descending() } else { q }
        };
        let ids = |docs: Vec<Document>| -> Vec<String> {
            docs.iter()
                .map(|d| d["expenseId"].as_str().unwrap().to_string())
                .collect()
        };

        let asc = store.query(&expenses, by_date(false)).await.unwrap();
        assert_eq!(ids(asc), ["a", "b"]);
        let desc = store.query(&expenses, by_date(true)).await.unwrap();
        assert_eq!(ids(desc), ["b", "a"]);
    }

    #[tokio::test]
    async fn batch_get_returns_only_existing_items() {
        let store = MemoryStore::new();
        let users = Catalog::default().users;
        store
            .seed(&users, &[json!({"userId": "u1", "showableName": "One"})])
            .await
            .unwrap();
        let found = store
            .batch_get(&users, vec![key([("userId", "u1")]), key([("userId", "ghost")])])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["showableName"], json!("One"));
        assert_eq!(store.calls(StoreOp::BatchGet), 1);
    }

    #[tokio::test]
    async fn injected_failure_is_reported_and_counted() {
        let store = MemoryStore::new();
        let users = Catalog::default().users;
        store.fail(StoreOp::BatchGet);
        let err = store
            .batch_get(&users, vec![key([("userId", "u1")])])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Request { operation: "batch_get", .. }));
        assert_eq!(store.calls(StoreOp::BatchGet), 1);
    }
}
