use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::json;
use slurp_client::cascade::{DeleteReport, delete_subcollection, delete_with_children};
use slurp_client::memory::InMemoryStore;
use slurp_client::store::DOCUMENT_ID_FIELD;
use slurp_client::trips::TripRepository;
use slurp_client::{
    CollectionRef, Document, DocumentRef, DocumentStore, Fields, Query, SlurpError, StoreError,
    WriteBatch,
};
use tokio::sync::{Mutex, Notify};

/// Wraps the in-memory store, records commit sizes and can fail or stall
/// a chosen round.
#[derive(Default)]
struct RecordingStore {
    inner: InMemoryStore,
    commits: Mutex<Vec<usize>>,
    queries: AtomicU32,
    fail_commit_round: Option<usize>,
    fail_queries: bool,
    stall: Option<Arc<Notify>>,
}

impl RecordingStore {
    async fn commit_sizes(&self) -> Vec<usize> {
        self.commits.lock().await.clone()
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        self.inner.get(doc).await
    }

    async fn set(&self, doc: &DocumentRef, fields: Fields) -> Result<(), StoreError> {
        self.inner.set(doc, fields).await
    }

    async fn update(&self, doc: &DocumentRef, fields: Fields) -> Result<(), StoreError> {
        self.inner.update(doc, fields).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries {
            return Err(StoreError::Unavailable("query rejected".into()));
        }
        self.inner.query(query).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if let Some(stall) = &self.stall {
            stall.notified().await;
        }
        let round = self.commits.lock().await.len() + 1;
        if self.fail_commit_round == Some(round) {
            return Err(StoreError::Unavailable(format!("commit {round} rejected")));
        }
        self.commits.lock().await.push(batch.len());
        self.inner.commit(batch).await
    }

    async fn delete(&self, doc: &DocumentRef) -> Result<(), StoreError> {
        self.inner.delete(doc).await
    }
}

fn trip() -> DocumentRef {
    CollectionRef::root("trips").doc("t1")
}

async fn seed(store: &dyn DocumentStore, n: usize) -> CollectionRef {
    let parent = trip();
    store
        .set(&parent, json!({"name": "Lisbon"}).as_object().cloned().unwrap())
        .await
        .unwrap();
    let activities = parent.collection("activities");
    for i in 0..n {
        let mut fields = Fields::new();
        // Every third activity has no title; deletion must still find it.
        if i % 3 != 0 {
            fields.insert("title".into(), json!(format!("activity {i}")));
        }
        store
            .set(&activities.doc(&format!("a{i:03}")), fields)
            .await
            .unwrap();
    }
    activities
}

#[tokio::test]
async fn deletes_in_batches_of_five() {
    let store = RecordingStore::default();
    let activities = seed(&store, 12).await;

    let report = delete_with_children(&store, &trip(), "activities", DOCUMENT_ID_FIELD, 5)
        .await
        .unwrap();

    assert_eq!(report, DeleteReport { rounds: 3, deleted: 12 });
    assert_eq!(store.commit_sizes().await, [5, 5, 2]);
    // Three non-empty pages plus the terminating empty one.
    assert_eq!(store.queries.load(Ordering::SeqCst), 4);
    assert_eq!(store.inner.count(&activities).await, 0);
    assert!(!store.inner.contains(&trip()).await);
}

#[tokio::test]
async fn empty_subcollection_deletes_only_the_parent() {
    let store = RecordingStore::default();
    seed(&store, 0).await;

    let report = delete_with_children(&store, &trip(), "activities", DOCUMENT_ID_FIELD, 5)
        .await
        .unwrap();

    assert_eq!(report, DeleteReport::default());
    assert!(store.commit_sizes().await.is_empty());
    assert!(!store.inner.contains(&trip()).await);
}

#[tokio::test]
async fn exact_multiple_of_batch_size() {
    let store = RecordingStore::default();
    let activities = seed(&store, 10).await;

    let report = delete_subcollection(&store, &activities, DOCUMENT_ID_FIELD, 5)
        .await
        .unwrap();

    assert_eq!(report.rounds, 2);
    assert_eq!(store.commit_sizes().await, [5, 5]);
}

#[tokio::test]
async fn failed_round_keeps_earlier_deletes_and_the_parent() {
    let store = RecordingStore {
        fail_commit_round: Some(2),
        ..Default::default()
    };
    let activities = seed(&store, 12).await;

    let err = delete_with_children(&store, &trip(), "activities", DOCUMENT_ID_FIELD, 5)
        .await
        .unwrap_err();

    assert!(matches!(err, SlurpError::Store(StoreError::Unavailable(_))));
    assert_eq!(store.commit_sizes().await, [5]);
    assert_eq!(store.inner.count(&activities).await, 7);
    assert!(store.inner.contains(&trip()).await);
}

#[tokio::test]
async fn query_failure_is_reported() {
    let store = RecordingStore {
        fail_queries: true,
        ..Default::default()
    };
    let activities = seed(&store, 3).await;

    let err = delete_subcollection(&store, &activities, DOCUMENT_ID_FIELD, 5)
        .await
        .unwrap_err();

    assert!(matches!(err, SlurpError::Store(_)));
    assert_eq!(store.inner.count(&activities).await, 3);
}

#[tokio::test]
async fn ordering_on_a_sparse_field_misses_documents() {
    let store = RecordingStore::default();
    let activities = seed(&store, 6).await;

    delete_subcollection(&store, &activities, "title", 5).await.unwrap();

    // a000 and a003 have no title and are never selected.
    assert_eq!(store.inner.count(&activities).await, 2);
}

#[tokio::test]
async fn nested_subcollections_are_left_alone() {
    let store = RecordingStore::default();
    let activities = seed(&store, 2).await;
    let nested = activities.doc("a000").collection("photos").doc("p1");
    store.set(&nested, Fields::new()).await.unwrap();

    delete_subcollection(&store, &activities, DOCUMENT_ID_FIELD, 5)
        .await
        .unwrap();

    assert_eq!(store.inner.count(&activities).await, 0);
    assert!(store.inner.contains(&nested).await);
}

#[tokio::test]
async fn batch_size_one_takes_a_round_per_document() {
    let store = RecordingStore::default();
    let activities = seed(&store, 25).await;

    let report = delete_subcollection(&store, &activities, DOCUMENT_ID_FIELD, 1)
        .await
        .unwrap();

    assert_eq!(report, DeleteReport { rounds: 25, deleted: 25 });
    assert!(store.commit_sizes().await.iter().all(|&n| n == 1));
}

#[tokio::test]
async fn duplicate_trip_delete_is_rejected_while_running() {
    let stall = Arc::new(Notify::new());
    let store = Arc::new(RecordingStore {
        stall: Some(stall.clone()),
        ..Default::default()
    });
    seed(store.as_ref(), 3).await;
    let repo = Arc::new(TripRepository::new(store.clone()));

    let first = tokio::spawn({
        let repo = repo.clone();
        async move { repo.delete_trip("t1").await }
    });
    // Wait until the first deletion is parked on its commit.
    while store.queries.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    let second = repo.delete_trip("t1").await;
    assert!(matches!(second, Err(SlurpError::DeleteInProgress(_))));

    stall.notify_one();
    let report = first.await.unwrap().unwrap();
    assert_eq!(report.deleted, 3);
    assert!(!store.inner.contains(&trip()).await);

    // Released once finished.
    assert!(repo.delete_trip("t1").await.is_ok());
}
