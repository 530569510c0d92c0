//! DynamoDB adapter. All three collections share one table:
//! `PK = SK = <PREFIX>#<id>` plus an `entity` attribute naming the collection.
//! Unique-field sets are enforced with guard items written in the same
//! transaction as the document.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::DisplayErrorContext,
    types::{
        AttributeValue, Delete, DeleteRequest, Put, ReturnValue, Select, TransactWriteItem,
        WriteRequest,
    },
    Client as DynamoClient,
};
use serde_json::Value;

use crate::store::{
    document_id, unique_key, Collection, Document, Filter, RecordStore, StoreError,
};

pub type Item = HashMap<String, AttributeValue>;

/// Attributes owned by the adapter rather than the document.
const RESERVED: [&str; 3] = ["PK", "SK", "entity"];

/// DynamoDB allows max 25 items per batch write.
const BATCH_SIZE: usize = 25;
const MAX_BATCH_ATTEMPTS: u64 = 5;

pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Build a client against `endpoint_url`, taking credentials and region
    /// from the environment.
    pub async fn connect(endpoint_url: &str, table_name: &str) -> Self {
        let config = aws_config::load_from_env().await;
        let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&config)
            .endpoint_url(endpoint_url)
            .build();
        Self::new(DynamoClient::from_conf(dynamo_config), table_name)
    }

    fn document_item(&self, collection: Collection, document: &Document) -> Result<Item, StoreError> {
        let id = document_id(document).ok_or_else(|| StoreError::Malformed {
            collection: collection.name(),
            reason: "missing id".to_string(),
        })?;

        let mut item: Item = document
            .iter()
            .map(|(k, v)| (k.clone(), to_attribute(v)))
            .collect();
        item.extend(key_item(&record_key(collection, id)));
        item.insert(
            "entity".to_string(),
            AttributeValue::S(collection.name().to_string()),
        );
        Ok(item)
    }

    async fn scan_items(
        &self,
        collection: Collection,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<Item>, StoreError> {
        let scan_filter = ScanFilter::new(collection, filter);
        let mut items = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression(&scan_filter.expression)
                .set_expression_attribute_names(Some(scan_filter.names.clone()))
                .set_expression_attribute_values(Some(scan_filter.values.clone()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(StoreError::backend)?;

            let remaining = limit.saturating_sub(items.len());
            items.extend(output.items().iter().take(remaining).cloned());

            start_key = output.last_evaluated_key().cloned();
            if items.len() >= limit || start_key.is_none() {
                break;
            }
        }

        Ok(items)
    }

    async fn batch_delete(&self, keys: Vec<Item>) -> Result<(), StoreError> {
        for chunk in keys.chunks(BATCH_SIZE) {
            let delete_requests = chunk
                .iter()
                .map(|key| {
                    DeleteRequest::builder()
                        .set_key(Some(key.clone()))
                        .build()
                        .map(|request| WriteRequest::builder().delete_request(request).build())
                        .map_err(StoreError::backend)
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut attempts = 0;
            let mut pending = delete_requests;

            loop {
                attempts += 1;
                let result = self
                    .client
                    .batch_write_item()
                    .request_items(&self.table_name, pending)
                    .send()
                    .await
                    .map_err(StoreError::backend)?;

                pending = result
                    .unprocessed_items()
                    .and_then(|items| items.get(&self.table_name))
                    .cloned()
                    .unwrap_or_default();

                if !retry_unprocessed(attempts, pending.len())? {
                    break;
                }
                tracing::info!(
                    "Retrying {} unprocessed deletes (attempt {})",
                    pending.len(),
                    attempts
                );
                tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempts)).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for DynamoStore {
    async fn insert(&self, collection: Collection, document: Document) -> Result<(), StoreError> {
        let item = self.document_item(collection, &document)?;

        let Some(unique) = unique_key(collection, &document) else {
            self.client
                .put_item()
                .table_name(&self.table_name)
                .set_item(Some(item))
                .send()
                .await
                .map_err(StoreError::backend)?;
            return Ok(());
        };

        let mut guard = key_item(&guard_key(collection, &unique));
        guard.insert("entity".to_string(), AttributeValue::S("guard".to_string()));
        if let Some(id) = document_id(&document) {
            guard.insert("owner".to_string(), AttributeValue::S(id.to_string()));
        }

        let put_document = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .build()
            .map_err(StoreError::backend)?;
        let put_guard = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(guard))
            .condition_expression("attribute_not_exists(PK)")
            .build()
            .map_err(StoreError::backend)?;

        let result = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(put_document).build())
            .transact_items(TransactWriteItem::builder().put(put_guard).build())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_transaction_canceled_exception()) =>
            {
                tracing::warn!("Unique guard rejected insert: {}", DisplayErrorContext(&err));
                Err(StoreError::Duplicate {
                    collection: collection.name(),
                    key: unique,
                })
            }
            Err(err) => Err(StoreError::backend(err)),
        }
    }

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let items = self.scan_items(collection, filter, limit).await?;
        Ok(items.iter().map(document_from).collect())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(key_item(&record_key(collection, id))))
            .send()
            .await
            .map_err(StoreError::backend)?;

        Ok(result.item().map(document_from))
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Document,
    ) -> Result<Option<Document>, StoreError> {
        if let Some(field) = fields.keys().find(|field| {
            field.as_str() == "id"
                || RESERVED.contains(&field.as_str())
                || collection.unique_fields().contains(&field.as_str())
        }) {
            return Err(StoreError::Malformed {
                collection: collection.name(),
                reason: format!("field {} cannot be updated", field),
            });
        }

        if fields.is_empty() {
            return self.get(collection, id).await;
        }

        let mut assignments = Vec::with_capacity(fields.len());
        let mut builder = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(key_item(&record_key(collection, id))))
            .condition_expression("attribute_exists(PK)")
            .return_values(ReturnValue::AllNew);

        for (i, (field, value)) in fields.iter().enumerate() {
            assignments.push(format!("#f{i} = :v{i}"));
            builder = builder
                .expression_attribute_names(format!("#f{i}"), field.clone())
                .expression_attribute_values(format!(":v{i}"), to_attribute(value));
        }

        let result = builder
            .update_expression(format!("SET {}", assignments.join(", ")))
            .send()
            .await;

        match result {
            Ok(output) => Ok(output.attributes().map(document_from)),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Ok(None)
            }
            Err(err) => Err(StoreError::backend(err)),
        }
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let Some(current) = self.get(collection, id).await? else {
            return Ok(false);
        };
        let Some(unique) = unique_key(collection, &current) else {
            let result = self
                .client
                .delete_item()
                .table_name(&self.table_name)
                .set_key(Some(key_item(&record_key(collection, id))))
                .return_values(ReturnValue::AllOld)
                .send()
                .await
                .map_err(StoreError::backend)?;
            return Ok(result.attributes().is_some());
        };

        let [delete_document, delete_guard] =
            delete_with_guard(&self.table_name, collection, id, &unique)?;
        let result = self
            .client
            .transact_write_items()
            .transact_items(delete_document)
            .transact_items(delete_guard)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_transaction_canceled_exception()) =>
            {
                tracing::info!(
                    "{} {} already gone: {}",
                    collection.name(),
                    id,
                    DisplayErrorContext(&err)
                );
                Ok(false)
            }
            Err(err) => Err(StoreError::backend(err)),
        }
    }

    async fn delete_many(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        let items = self.scan_items(collection, filter, usize::MAX).await?;

        let mut keys = Vec::with_capacity(items.len() * 2);
        for item in &items {
            let document = document_from(item);
            if let Some(id) = document_id(&document) {
                keys.push(key_item(&record_key(collection, id)));
            }
            if let Some(unique) = unique_key(collection, &document) {
                keys.push(key_item(&guard_key(collection, &unique)));
            }
        }

        tracing::info!(
            "Deleting {} {} records ({} keys)",
            items.len(),
            collection.name(),
            keys.len()
        );
        self.batch_delete(keys).await?;
        Ok(items.len() as u64)
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        let scan_filter = ScanFilter::new(collection, filter);
        let mut total: u64 = 0;
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.table_name)
                .select(Select::Count)
                .filter_expression(&scan_filter.expression)
                .set_expression_attribute_names(Some(scan_filter.names.clone()))
                .set_expression_attribute_values(Some(scan_filter.values.clone()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(StoreError::backend)?;

            total += u64::try_from(output.count()).unwrap_or(0);
            start_key = output.last_evaluated_key().cloned();
            if start_key.is_none() {
                break;
            }
        }

        Ok(total)
    }
}

/// Filter expression restricting a scan to one collection plus the equalities.
struct ScanFilter {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl ScanFilter {
    fn new(collection: Collection, filter: &Filter) -> Self {
        let mut conditions = vec!["#entity = :entity".to_string()];
        let mut names = HashMap::from([("#entity".to_string(), "entity".to_string())]);
        let mut values = HashMap::from([(
            ":entity".to_string(),
            AttributeValue::S(collection.name().to_string()),
        )]);

        for (i, (field, value)) in filter.clauses().iter().enumerate() {
            conditions.push(format!("#f{i} = :v{i}"));
            names.insert(format!("#f{i}"), field.clone());
            values.insert(format!(":v{i}"), to_attribute(value));
        }

        Self {
            expression: conditions.join(" AND "),
            names,
            values,
        }
    }
}

/// One transaction removing a document and its unique guard together. The
/// document must still exist, so a lost race cancels the whole transaction.
fn delete_with_guard(
    table_name: &str,
    collection: Collection,
    id: &str,
    unique: &str,
) -> Result<[TransactWriteItem; 2], StoreError> {
    let delete_document = Delete::builder()
        .table_name(table_name)
        .set_key(Some(key_item(&record_key(collection, id))))
        .condition_expression("attribute_exists(PK)")
        .build()
        .map_err(StoreError::backend)?;
    let delete_guard = Delete::builder()
        .table_name(table_name)
        .set_key(Some(key_item(&guard_key(collection, unique))))
        .build()
        .map_err(StoreError::backend)?;

    Ok([
        TransactWriteItem::builder().delete(delete_document).build(),
        TransactWriteItem::builder().delete(delete_guard).build(),
    ])
}

/// Whether a batch with `remaining` unprocessed writes gets another attempt.
/// Fails once the attempt budget is spent with writes still pending.
fn retry_unprocessed(attempts: u64, remaining: usize) -> Result<bool, StoreError> {
    if remaining == 0 {
        return Ok(false);
    }
    if attempts >= MAX_BATCH_ATTEMPTS {
        tracing::error!(
            "Max retry attempts reached, {} deletes left unprocessed",
            remaining
        );
        return Err(StoreError::Incomplete { remaining });
    }
    Ok(true)
}

fn record_key(collection: Collection, id: &str) -> String {
    format!("{}#{}", collection.key_prefix(), id)
}

fn guard_key(collection: Collection, unique: &str) -> String {
    format!("UNIQUE#{}#{}", collection.name(), unique)
}

fn key_item(key: &str) -> Item {
    HashMap::from([
        ("PK".to_string(), AttributeValue::S(key.to_string())),
        ("SK".to_string(), AttributeValue::S(key.to_string())),
    ])
}

pub fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute(v)))
                .collect(),
        ),
    }
}

pub fn from_attribute(attribute: &AttributeValue) -> Value {
    match attribute {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => parse_number(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::L(items) => Value::Array(items.iter().map(from_attribute).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_attribute(v)))
                .collect(),
        ),
        AttributeValue::Ss(set) => Value::Array(set.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(set) => Value::Array(set.iter().map(|n| parse_number(n)).collect()),
        _ => Value::Null,
    }
}

/// Integers stay integers so they decode into integer fields.
fn parse_number(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::from(i);
    }
    n.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn document_from(item: &Item) -> Document {
    item.iter()
        .filter(|(k, _)| !RESERVED.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), from_attribute(v)))
        .collect()
}
