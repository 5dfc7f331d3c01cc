use super::{Document, Query, Store, StoreError, TableDef};
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    Client,
    config::Region,
    error::DisplayErrorContext,
    operation::batch_get_item::BatchGetItemOutput,
    types::{AttributeValue, KeysAndAttributes},
};
use serde_json::{Number, Value};
use std::collections::HashMap;

/// BatchGetItem accepts at most this many keys per request.
const BATCH_GET_LIMIT: usize = 100;

type Item = HashMap<String, AttributeValue>;

/// DynamoStore
///
/// [`Store`] backed by Amazon DynamoDB. Documents are translated through the
/// table's field-mapping table and then into `AttributeValue`s.
#[derive(Clone)]
pub struct DynamoStore {
    client: Client,
}

impl DynamoStore {
    /// Builds a client from the default AWS credential chain. `endpoint`
    /// points the client at DynamoDB Local or another compatible service.
    pub async fn connect(region: &str, endpoint: Option<&str>) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(url) = endpoint {
            builder = builder.endpoint_url(url);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

/// Keys of `table` DynamoDB declined to read in this round (throttling or the
/// response size cap).
fn unprocessed_keys(output: &BatchGetItemOutput, table: &str) -> usize {
    output
        .unprocessed_keys()
        .and_then(|u| u.get(table))
        .map_or(0, |k| k.keys().len())
}

fn request_error(
    operation: &'static str,
    table: &TableDef,
    err: impl std::error::Error,
) -> StoreError {
    StoreError::Request {
        operation,
        table: table.name.clone(),
        message: DisplayErrorContext(err).to_string(),
    }
}

fn to_item(table: &TableDef, doc: &Document) -> Item {
    table
        .schema
        .encode(doc)
        .into_iter()
        .map(|(attr, value)| (attr, to_attribute(value)))
        .collect()
}

fn from_item(table: &TableDef, item: &Item) -> Document {
    let raw: Document = item
        .iter()
        .map(|(attr, value)| (attr.clone(), from_attribute(value)))
        .collect();
    table.schema.decode(&raw)
}

pub fn to_attribute(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s),
        Value::Array(items) => AttributeValue::L(items.into_iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.into_iter()
                .map(|(k, v)| (k, to_attribute(v)))
                .collect(),
        ),
    }
}

fn number(raw: &str) -> Value {
    raw.parse::<Number>()
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn from_attribute(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => number(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::L(items) => Value::Array(items.iter().map(from_attribute).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_attribute(v)))
                .collect(),
        ),
        AttributeValue::Ss(items) => {
            Value::Array(items.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(items) => Value::Array(items.iter().map(|n| number(n)).collect()),
        // Binary attributes and NULL carry nothing the API exposes.
        _ => Value::Null,
    }
}

#[async_trait]
impl Store for DynamoStore {
    async fn get(&self, table: &TableDef, key: Document) -> Result<Option<Document>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&table.name)
            .set_key(Some(to_item(table, &key)))
            .send()
            .await
            .map_err(|e| request_error("get", table, e))?;

        Ok(output.item().map(|item| from_item(table, item)))
    }

    async fn put(&self, table: &TableDef, item: Document) -> Result<(), StoreError> {
        // Reject records without a complete primary key before the round trip.
        table.schema.primary_key(&table.name, &item)?;
        self.client
            .put_item()
            .table_name(&table.name)
            .set_item(Some(to_item(table, &item)))
            .send()
            .await
            .map_err(|e| request_error("put", table, e))?;
        Ok(())
    }

    async fn query(&self, table: &TableDef, query: Query) -> Result<Vec<Document>, StoreError> {
        // Validates the index name against the schema.
        table.schema.key_for(&table.name, query.index)?;
        let attribute = table
            .schema
            .attribute(&query.condition.field)
            .unwrap_or(&query.condition.field)
            .to_string();

        let output = self
            .client
            .query()
            .table_name(&table.name)
            .set_index_name(query.index.map(str::to_string))
            .key_condition_expression("#pk = :pk")
            .expression_attribute_names("#pk", attribute)
            .expression_attribute_values(":pk", to_attribute(query.condition.value))
            .scan_index_forward(!query.descending)
            .send()
            .await
            .map_err(|e| request_error("query", table, e))?;

        Ok(output
            .items()
            .iter()
            .map(|item| from_item(table, item))
            .collect())
    }

    async fn batch_get(
        &self,
        table: &TableDef,
        keys: Vec<Document>,
    ) -> Result<Vec<Document>, StoreError> {
        let keys: Vec<Item> = keys.iter().map(|k| to_item(table, k)).collect();
        let mut found = Vec::with_capacity(keys.len());
        let mut unprocessed = 0;

        for chunk in keys.chunks(BATCH_GET_LIMIT) {
            let request = KeysAndAttributes::builder()
                .set_keys(Some(chunk.to_vec()))
                .build()
                .map_err(|e| StoreError::Encode {
                    table: table.name.clone(),
                    message: e.to_string(),
                })?;

            let output = self
                .client
                .batch_get_item()
                .request_items(&table.name, request)
                .send()
                .await
                .map_err(|e| request_error("batch_get", table, e))?;

            if let Some(items) = output.responses().and_then(|r| r.get(&table.name)) {
                found.extend(items.iter().map(|item| from_item(table, item)));
            }

            unprocessed += unprocessed_keys(&output, &table.name);
        }

        if unprocessed > 0 {
            tracing::warn!(
                table = %table.name,
                requested = keys.len(),
                unprocessed,
                "batch get left keys unprocessed; those ids resolve as missing"
            );
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_values_map_onto_attribute_values() {
        let value = json!({
            "title": "Dinner",
            "amount": 42.5,
            "settled": false,
            "note": null,
            "participants": [{"userId": "u1", "share": 50}]
        });
        let attr = to_attribute(value.clone());

        let AttributeValue::M(map) = &attr else {
            panic!("expected a map, got {attr:?}");
        };
        assert_eq!(map["title"], AttributeValue::S("Dinner".into()));
        assert_eq!(map["amount"], AttributeValue::N("42.5".into()));
        assert_eq!(map["settled"], AttributeValue::Bool(false));
        assert_eq!(map["note"], AttributeValue::Null(true));

        assert_eq!(from_attribute(&attr), value);
    }

    #[test]
    fn string_sets_and_unparseable_numbers_decode_leniently() {
        let set = AttributeValue::Ss(vec!["a".into(), "b".into()]);
        assert_eq!(from_attribute(&set), json!(["a", "b"]));
        assert_eq!(from_attribute(&AttributeValue::N("1e".into())), json!("1e"));
    }

    #[test]
    fn unprocessed_keys_are_counted_per_table() {
        let pending = |ids: &[&str]| {
            KeysAndAttributes::builder()
                .set_keys(Some(
                    ids.iter()
                        .map(|id| HashMap::from([("userId".to_string(), AttributeValue::S(id.to_string()))]))
                        .collect(),
                ))
                .build()
                .unwrap()
        };
        let output = BatchGetItemOutput::builder()
            .unprocessed_keys("users", pending(&["u1", "u2"]))
            .unprocessed_keys("other", pending(&["x"]))
            .build();

        assert_eq!(unprocessed_keys(&output, "users"), 2);
        assert_eq!(unprocessed_keys(&output, "missing"), 0);
        assert_eq!(unprocessed_keys(&BatchGetItemOutput::builder().build(), "users"), 0);
    }
}
