//! In-process [`DocumentStore`] used by tests and local tooling.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::store::{CollectionRef, DOCUMENT_ID_FIELD, Document, DocumentRef, Fields, Query, WriteBatch};
use crate::{DocumentStore, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    docs: Mutex<BTreeMap<DocumentRef, Fields>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents directly inside `collection`.
    pub async fn count(&self, collection: &CollectionRef) -> usize {
        let docs = self.docs.lock().await;
        docs.keys().filter(|doc| collection.contains(doc)).count()
    }

    pub async fn contains(&self, doc: &DocumentRef) -> bool {
        self.docs.lock().await.contains_key(doc)
    }
}

/// Firestore cross-type ordering: null, bool, number, string, array, map.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(a, b)| compare_values(a, b))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn sort_key(doc: &DocumentRef, fields: &Fields, order_by: &str) -> Option<Value> {
    if order_by == DOCUMENT_ID_FIELD {
        return Some(Value::String(doc.path().to_string()));
    }
    fields.get(order_by).cloned()
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        let docs = self.docs.lock().await;
        Ok(docs.get(doc).map(|fields| Document {
            reference: doc.clone(),
            fields: fields.clone(),
        }))
    }

    async fn set(&self, doc: &DocumentRef, fields: Fields) -> Result<(), StoreError> {
        self.docs.lock().await.insert(doc.clone(), fields);
        Ok(())
    }

    async fn update(&self, doc: &DocumentRef, fields: Fields) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().await;
        let existing = docs
            .get_mut(doc)
            .ok_or_else(|| StoreError::NotFound(doc.to_string()))?;
        existing.extend(fields);
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let docs = self.docs.lock().await;
        let mut rows: Vec<(Option<Value>, Document)> = docs
            .iter()
            .filter(|(doc, _)| query.collection.contains(doc))
            .filter(|(_, fields)| query.filters.iter().all(|f| f.matches(fields)))
            .map(|(doc, fields)| {
                let key = query
                    .order_by
                    .as_deref()
                    .and_then(|field| sort_key(doc, fields, field));
                let document = Document {
                    reference: doc.clone(),
                    fields: fields.clone(),
                };
                (key, document)
            })
            .collect();

        // Ordering on a field drops documents that lack it.
        if query.order_by.is_some() {
            rows.retain(|(key, _)| key.is_some());
            rows.sort_by(|(ka, da), (kb, db)| {
                let by_key = match (ka, kb) {
                    (Some(a), Some(b)) => compare_values(a, b),
                    _ => Ordering::Equal,
                };
                by_key.then_with(|| da.reference.cmp(&db.reference))
            });
        }

        let limit = query.limit.map_or(usize::MAX, |n| n as usize);
        Ok(rows.into_iter().take(limit).map(|(_, doc)| doc).collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().await;
        for doc in batch.deletes() {
            docs.remove(doc);
        }
        Ok(())
    }

    async fn delete(&self, doc: &DocumentRef) -> Result<(), StoreError> {
        self.docs.lock().await.remove(doc);
        Ok(())
    }
}
