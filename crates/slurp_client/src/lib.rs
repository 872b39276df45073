//! Data utilities behind the trip planner: timezone-aware time handling,
//! form input cleanup, and a `DocumentStore` trait with Firestore and
//! in-memory backends.

use async_trait::async_trait;
use thiserror::Error;

pub mod cascade;
pub mod catalog;
pub mod config;
pub mod http_client;
pub mod input;
pub mod memory;
pub mod models;
pub mod store;
pub mod time;
pub mod trips;
pub mod users;

pub use store::{CollectionRef, Document, DocumentRef, Fields, FieldFilter, FilterOp, Query, WriteBatch};
pub use time::{Instant, TimezoneId, TimezoneLabel};

#[derive(Debug, Error)]
pub enum SlurpError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("deletion already in progress for {0}")]
    DeleteInProgress(String),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Failures reported by a [`DocumentStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            404 => StoreError::NotFound(body),
            401 | 403 => StoreError::PermissionDenied(body),
            _ => StoreError::Status { status, body },
        }
    }
}

/// Minimal document database contract the rest of the crate is written against.
///
/// Every call is independent; implementations must not assume a process-wide
/// handle. Callers pass the store they want to use explicitly.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetch a single document, `Ok(None)` when it does not exist.
    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError>;

    /// Create or fully replace a document.
    async fn set(&self, doc: &DocumentRef, fields: Fields) -> Result<(), StoreError>;

    /// Merge `fields` into an existing document. Fails with
    /// [`StoreError::NotFound`] when the document is missing.
    async fn update(&self, doc: &DocumentRef, fields: Fields) -> Result<(), StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Apply every write in the batch atomically.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    async fn delete(&self, doc: &DocumentRef) -> Result<(), StoreError>;
}
