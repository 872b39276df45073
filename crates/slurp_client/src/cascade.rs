//! Batched deletion of a subcollection, then its parent.
//!
//! Firestore does not delete child collections together with their parent
//! document. [`delete_subcollection`] pages through the children in bounded
//! batches, committing each page atomically, until a query comes back empty.
//! Earlier pages stay deleted if a later one fails; nothing is rolled back
//! and nothing is retried.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::store::{CollectionRef, DocumentRef, Query, WriteBatch};
use crate::{DocumentStore, SlurpError};

pub const DEFAULT_DELETE_BATCH_SIZE: u32 = 5;

/// Outcome of a completed subcollection deletion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Non-empty pages deleted.
    pub rounds: u32,
    pub deleted: usize,
}

/// Delete every document directly inside `collection`.
///
/// `order_by` must be a field present on every child, otherwise documents
/// without it are never selected. [`DOCUMENT_ID_FIELD`](crate::store::DOCUMENT_ID_FIELD) works for any
/// collection.
pub async fn delete_subcollection(
    store: &dyn DocumentStore,
    collection: &CollectionRef,
    order_by: &str,
    batch_size: u32,
) -> Result<DeleteReport, SlurpError> {
    if batch_size == 0 {
        return Err(SlurpError::InvalidInput("batch size must be positive".into()));
    }
    let query = Query::new(collection.clone())
        .order_by(order_by)
        .limit(batch_size);
    let mut report = DeleteReport::default();

    loop {
        let page = store.query(&query).await?;
        if page.is_empty() {
            tracing::info!(
                collection = %collection,
                rounds = report.rounds,
                deleted = report.deleted,
                "subcollection deleted"
            );
            return Ok(report);
        }

        let mut batch = WriteBatch::new();
        for doc in page {
            batch.delete(doc.reference);
        }
        let size = batch.len();
        if let Err(e) = store.commit(batch).await {
            tracing::warn!(
                collection = %collection,
                deleted = report.deleted,
                error = %e,
                "batch delete failed, earlier batches remain deleted"
            );
            return Err(e.into());
        }
        report.rounds += 1;
        report.deleted += size;
        tracing::debug!(collection = %collection, round = report.rounds, size, "batch deleted");

        tokio::task::yield_now().await;
    }
}

/// Delete the `subcollection` under `parent`, then `parent` itself.
///
/// When the children cannot all be deleted the parent is left in place, so
/// a parent never disappears while children survive. The reverse (a parent
/// with a partially emptied subcollection) is possible and is logged.
pub async fn delete_with_children(
    store: &dyn DocumentStore,
    parent: &DocumentRef,
    subcollection: &str,
    order_by: &str,
    batch_size: u32,
) -> Result<DeleteReport, SlurpError> {
    let children = parent.collection(subcollection);
    let report = match delete_subcollection(store, &children, order_by, batch_size).await {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(parent = %parent, error = %e, "keeping parent after failed child deletion");
            return Err(e);
        }
    };
    store.delete(parent).await?;
    tracing::info!(parent = %parent, children = report.deleted, "document deleted with children");
    Ok(report)
}

/// Rejects a second deletion of a parent while one is still running.
#[derive(Debug, Default)]
pub struct DeletionGuard {
    in_flight: Mutex<HashSet<DocumentRef>>,
}

impl DeletionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `parent` for deletion. The claim is released when the returned
    /// permit is dropped.
    pub fn try_acquire(&self, parent: &DocumentRef) -> Result<DeletionPermit<'_>, SlurpError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(parent.clone()) {
            return Err(SlurpError::DeleteInProgress(parent.to_string()));
        }
        Ok(DeletionPermit {
            guard: self,
            parent: parent.clone(),
        })
    }

    pub fn is_deleting(&self, parent: &DocumentRef) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(parent)
    }
}

#[must_use = "the claim is released as soon as the permit is dropped"]
#[derive(Debug)]
pub struct DeletionPermit<'a> {
    guard: &'a DeletionGuard,
    parent: DocumentRef,
}

impl Drop for DeletionPermit<'_> {
    fn drop(&mut self) {
        self.guard
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.parent);
    }
}
