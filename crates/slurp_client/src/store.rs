//! Path, query and batch types shared by every `DocumentStore` backend.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{SlurpError, StoreError};

/// Pseudo-field that orders by document name. Every document has it.
pub const DOCUMENT_ID_FIELD: &str = "__name__";

/// Field map of a stored document.
pub type Fields = serde_json::Map<String, Value>;

/// Reject ids that would change the depth of a path.
pub fn validate_segment(id: &str) -> Result<(), SlurpError> {
    if id.is_empty() || id.contains('/') {
        return Err(SlurpError::InvalidInput(format!(
            "invalid document or collection id: {id:?}"
        )));
    }
    Ok(())
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// A collection path, e.g. `trips` or `trips/abc/activities`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionRef {
    path: String,
}

impl CollectionRef {
    pub fn root(collection_id: &str) -> Self {
        Self {
            path: collection_id.to_string(),
        }
    }

    pub fn doc(&self, doc_id: &str) -> DocumentRef {
        DocumentRef {
            path: format!("{}/{}", self.path, doc_id),
        }
    }

    /// Reference to a not-yet-written document with a fresh random id.
    pub fn new_doc(&self) -> DocumentRef {
        self.doc(&uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn id(&self) -> &str {
        last_segment(&self.path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The document this collection hangs off, `None` for top-level collections.
    pub fn parent(&self) -> Option<DocumentRef> {
        self.path.rsplit_once('/').map(|(parent, _)| DocumentRef {
            path: parent.to_string(),
        })
    }

    /// Whether `doc` lives directly in this collection (not in a nested subcollection).
    pub fn contains(&self, doc: &DocumentRef) -> bool {
        doc.parent() == *self
    }
}

/// A document path, e.g. `trips/abc`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentRef {
    path: String,
}

impl DocumentRef {
    /// Parse a slash separated document path (even number of non-empty segments).
    pub fn parse(path: &str) -> Result<Self, SlurpError> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() % 2 != 0 || segments.iter().any(|s| s.is_empty()) {
            return Err(SlurpError::InvalidInput(format!(
                "not a document path: {path:?}"
            )));
        }
        Ok(Self {
            path: path.to_string(),
        })
    }

    pub fn collection(&self, collection_id: &str) -> CollectionRef {
        CollectionRef {
            path: format!("{}/{}", self.path, collection_id),
        }
    }

    pub fn id(&self) -> &str {
        last_segment(&self.path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parent(&self) -> CollectionRef {
        let parent = self
            .path
            .rsplit_once('/')
            .map(|(parent, _)| parent)
            .unwrap_or_default();
        CollectionRef {
            path: parent.to_string(),
        }
    }

    /// Whether this document is `ancestor` itself or nested anywhere below it.
    pub fn is_within(&self, ancestor: &DocumentRef) -> bool {
        self.path == ancestor.path
            || self
                .path
                .strip_prefix(ancestor.path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl std::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}

impl std::fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}

/// A document as read back from the store.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub reference: DocumentRef,
    pub fields: Fields,
}

impl Document {
    pub fn id(&self) -> &str {
        self.reference.id()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Decode the fields into a model type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|e| {
            StoreError::Decode(format!("decoding {}: {}", self.reference, e))
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    ArrayContains,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl FieldFilter {
    pub fn matches(&self, fields: &Fields) -> bool {
        let Some(actual) = fields.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Equal => *actual == self.value,
            FilterOp::ArrayContains => actual
                .as_array()
                .is_some_and(|items| items.contains(&self.value)),
        }
    }
}

/// A query over the documents directly inside one collection.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub collection: CollectionRef,
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<String>,
    pub limit: Option<u32>,
}

impl Query {
    pub fn new(collection: CollectionRef) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_field(mut self, field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    /// Ascending order on `field`.
    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by = Some(field.to_string());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Deletes committed together by [`DocumentStore::commit`](crate::DocumentStore::commit).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    deletes: Vec<DocumentRef>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delete(&mut self, doc: DocumentRef) -> &mut Self {
        self.deletes.push(doc);
        self
    }

    pub fn len(&self) -> usize {
        self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty()
    }

    pub fn deletes(&self) -> &[DocumentRef] {
        &self.deletes
    }
}
