//! HTTP client implementation for the Cloud Firestore REST API (v1).
//!
//! This module provides a reqwest-based implementation of the
//! [`DocumentStore`](crate::DocumentStore) trait. Plain JSON field maps are
//! translated to and from Firestore's typed value encoding at this boundary.

use crate::config::Config;
use crate::store::{CollectionRef, Document, DocumentRef, Fields, FieldFilter, FilterOp, Query, WriteBatch};
use crate::{DocumentStore, StoreError};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

/// Client for one Firestore database using reqwest.
#[derive(Clone, Debug)]
pub struct ReqwestFirestoreClient {
    base_url: String,
    database_name: String,
    token: SecretString,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Option<serde_json::Map<String, Value>>,
}

#[derive(Deserialize)]
struct RunQueryResponse {
    #[serde(default)]
    document: Option<FirestoreDocument>,
}

impl ReqwestFirestoreClient {
    /// Create a new client instance.
    ///
    /// # Arguments
    /// * `base_url` - API host, e.g. "https://firestore.googleapis.com" or an emulator URL
    /// * `project_id` - Google Cloud project owning the database
    /// * `database` - Database id, usually "(default)"
    /// * `token` - OAuth2 bearer token
    pub fn new(base_url: &str, project_id: &str, database: &str, token: SecretString) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            database_name: format!("projects/{project_id}/databases/{database}"),
            token,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            &cfg.base_url,
            &cfg.project_id,
            &cfg.database,
            cfg.token.clone(),
        )
    }

    fn documents_root(&self) -> String {
        format!("{}/documents", self.database_name)
    }

    fn document_name(&self, doc: &DocumentRef) -> String {
        format!("{}/{}", self.documents_root(), doc.path())
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/v1/{}", self.base_url, resource)
    }

    fn request(&self, method: reqwest::Method, resource: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(resource))
            .bearer_auth(self.token.expose_secret())
    }

    /// Execute a request and expect a JSON response.
    async fn execute_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, StoreError> {
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(self.error_from_response(resp).await);
        }
        Ok(resp.json::<T>().await?)
    }

    /// Execute a request with no expected response body.
    async fn execute_empty(&self, request: reqwest::RequestBuilder) -> Result<(), StoreError> {
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(self.error_from_response(resp).await);
        }
        Ok(())
    }

    /// Extract error information from a failed response.
    async fn error_from_response(&self, resp: reqwest::Response) -> StoreError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let body_snippet: String = body.chars().take(256).collect();
        StoreError::from_status(status, body_snippet)
    }

    fn decode_document(&self, raw: FirestoreDocument) -> Result<Document, StoreError> {
        let prefix = format!("{}/", self.documents_root());
        let path = raw
            .name
            .strip_prefix(&prefix)
            .ok_or_else(|| StoreError::Decode(format!("unexpected document name {}", raw.name)))?;
        let reference =
            DocumentRef::parse(path).map_err(|e| StoreError::Decode(e.to_string()))?;
        let fields = match raw.fields {
            Some(fields) => decode_fields(&fields)?,
            None => Fields::new(),
        };
        Ok(Document { reference, fields })
    }

    fn query_parent(&self, collection: &CollectionRef) -> String {
        match collection.parent() {
            Some(parent) => self.document_name(&parent),
            None => self.documents_root(),
        }
    }
}

fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect(),
    )
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

fn decode_fields(fields: &serde_json::Map<String, Value>) -> Result<Fields, StoreError> {
    fields
        .iter()
        .map(|(k, v)| decode_value(v).map(|v| (k.clone(), v)))
        .collect()
}

fn decode_value(value: &Value) -> Result<Value, StoreError> {
    let (kind, inner) = value
        .as_object()
        .and_then(|obj| obj.iter().next())
        .ok_or_else(|| StoreError::Decode(format!("not a firestore value: {value}")))?;
    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" | "doubleValue" | "geoPointValue" => Ok(inner.clone()),
        "integerValue" => match inner {
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| StoreError::Decode(format!("integerValue {s:?}: {e}"))),
            other => Ok(other.clone()),
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => Ok(inner.clone()),
        "arrayValue" => {
            let items = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Array(items))
        }
        "mapValue" => {
            let fields = inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Object(fields))
        }
        other => Err(StoreError::Decode(format!("unsupported value type {other}"))),
    }
}

/// Quote a field name for use in a Firestore field path when needed.
fn field_path(name: &str) -> String {
    let simple = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

fn encode_filter(filter: &FieldFilter) -> Value {
    let op = match filter.op {
        FilterOp::Equal => "EQUAL",
        FilterOp::ArrayContains => "ARRAY_CONTAINS",
    };
    json!({
        "fieldFilter": {
            "field": { "fieldPath": field_path(&filter.field) },
            "op": op,
            "value": encode_value(&filter.value),
        }
    })
}

fn structured_query(query: &Query) -> Value {
    let mut sq = serde_json::Map::new();
    sq.insert(
        "from".into(),
        json!([{ "collectionId": query.collection.id() }]),
    );
    match query.filters.as_slice() {
        [] => {}
        [single] => {
            sq.insert("where".into(), encode_filter(single));
        }
        many => {
            sq.insert(
                "where".into(),
                json!({
                    "compositeFilter": {
                        "op": "AND",
                        "filters": many.iter().map(encode_filter).collect::<Vec<_>>(),
                    }
                }),
            );
        }
    }
    if let Some(field) = &query.order_by {
        sq.insert(
            "orderBy".into(),
            json!([{ "field": { "fieldPath": field_path(field) }, "direction": "ASCENDING" }]),
        );
    }
    if let Some(limit) = query.limit {
        sq.insert("limit".into(), json!(limit));
    }
    json!({ "structuredQuery": Value::Object(sq) })
}

#[async_trait]
impl DocumentStore for ReqwestFirestoreClient {
    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        let resp = self
            .request(reqwest::Method::GET, &self.document_name(doc))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(self.error_from_response(resp).await);
        }
        let raw: FirestoreDocument = resp.json().await?;
        self.decode_document(raw).map(Some)
    }

    async fn set(&self, doc: &DocumentRef, fields: Fields) -> Result<(), StoreError> {
        tracing::debug!(path = %doc, "firestore set");
        let body = json!({ "fields": encode_fields(&fields) });
        self.execute_empty(
            self.request(reqwest::Method::PATCH, &self.document_name(doc))
                .json(&body),
        )
        .await
    }

    async fn update(&self, doc: &DocumentRef, fields: Fields) -> Result<(), StoreError> {
        tracing::debug!(path = %doc, fields = fields.len(), "firestore update");
        let mut qp: Vec<(&str, String)> = fields
            .keys()
            .map(|k| ("updateMask.fieldPaths", field_path(k)))
            .collect();
        qp.push(("currentDocument.exists", "true".to_string()));
        let body = json!({ "fields": encode_fields(&fields) });
        self.execute_empty(
            self.request(reqwest::Method::PATCH, &self.document_name(doc))
                .query(&qp)
                .json(&body),
        )
        .await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let resource = format!("{}:runQuery", self.query_parent(&query.collection));
        let rows: Vec<RunQueryResponse> = self
            .execute_json(
                self.request(reqwest::Method::POST, &resource)
                    .json(&structured_query(query)),
            )
            .await?;
        rows.into_iter()
            .filter_map(|row| row.document)
            .map(|raw| self.decode_document(raw))
            .collect()
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let writes: Vec<Value> = batch
            .deletes()
            .iter()
            .map(|doc| json!({ "delete": self.document_name(doc) }))
            .collect();
        let resource = format!("{}:commit", self.documents_root());
        let _: Value = self
            .execute_json(
                self.request(reqwest::Method::POST, &resource)
                    .json(&json!({ "writes": writes })),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, doc: &DocumentRef) -> Result<(), StoreError> {
        tracing::debug!(path = %doc, "firestore delete");
        self.execute_empty(self.request(reqwest::Method::DELETE, &self.document_name(doc)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_new_trims_trailing_slash() {
        let client = ReqwestFirestoreClient::new(
            "http://localhost:8080/",
            "proj",
            "(default)",
            SecretString::new("tok".into()),
        );
        let doc = CollectionRef::root("trips").doc("t1");
        assert_eq!(
            client.url(&client.document_name(&doc)),
            "http://localhost:8080/v1/projects/proj/databases/(default)/documents/trips/t1"
        );
    }

    #[test]
    fn values_round_trip_through_firestore_encoding() {
        let original = json!({
            "name": "Lisbon",
            "start_time": 1_601_734_744_023_i64,
            "rating": 4.5,
            "done": false,
            "note": null,
            "collaborators": ["u1", "u2"],
            "meta": { "nested": [1, 2] },
        });
        let fields = original.as_object().unwrap().clone();
        let encoded = encode_fields(&fields);
        assert_eq!(encoded["start_time"], json!({ "integerValue": "1601734744023" }));
        assert_eq!(encoded["name"], json!({ "stringValue": "Lisbon" }));
        let decoded = decode_fields(encoded.as_object().unwrap()).unwrap();
        assert_eq!(Value::Object(decoded), original);
    }

    #[test]
    fn decode_handles_empty_array_and_map() {
        let raw = json!({ "arrayValue": {} });
        assert_eq!(decode_value(&raw).unwrap(), json!([]));
        let raw = json!({ "mapValue": {} });
        assert_eq!(decode_value(&raw).unwrap(), json!({}));
        assert!(decode_value(&json!({ "weirdValue": 1 })).is_err());
    }

    #[test]
    fn structured_query_includes_order_and_limit() {
        let q = Query::new(CollectionRef::root("trips").doc("t1").collection("activities"))
            .order_by("title")
            .limit(5);
        let body = structured_query(&q);
        assert_eq!(
            body["structuredQuery"]["from"],
            json!([{ "collectionId": "activities" }])
        );
        assert_eq!(
            body["structuredQuery"]["orderBy"][0]["field"]["fieldPath"],
            "title"
        );
        assert_eq!(body["structuredQuery"]["limit"], 5);
        assert!(body["structuredQuery"].get("where").is_none());
    }

    #[test]
    fn structured_query_combines_filters() {
        let q = Query::new(CollectionRef::root("trips"))
            .where_field("collaborators", FilterOp::ArrayContains, "u1")
            .where_field("destination", FilterOp::Equal, "Lisbon");
        let body = structured_query(&q);
        let filters = &body["structuredQuery"]["where"]["compositeFilter"]["filters"];
        assert_eq!(filters.as_array().unwrap().len(), 2);
        assert_eq!(filters[0]["fieldFilter"]["op"], "ARRAY_CONTAINS");
    }

    #[test]
    fn field_path_quotes_non_identifiers() {
        assert_eq!(field_path("start_time"), "start_time");
        assert_eq!(field_path("start-time"), "`start-time`");
        assert_eq!(field_path("1st"), "`1st`");
    }
}
