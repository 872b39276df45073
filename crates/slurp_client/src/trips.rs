//! Trip and activity persistence on top of a [`DocumentStore`].

use std::sync::Arc;

use crate::cascade::{DEFAULT_DELETE_BATCH_SIZE, DeleteReport, DeletionGuard, delete_with_children};
use crate::models::{
    COLLECTION_ACTIVITIES, COLLECTION_TRIPS, TRIPS_COLLABORATORS, Activity,
    Trip, to_fields,
};
use crate::store::{
    CollectionRef, DOCUMENT_ID_FIELD, DocumentRef, Fields, FilterOp, Query, validate_segment,
};
use crate::time::Instant;
use crate::{DocumentStore, SlurpError};

pub struct TripRepository {
    store: Arc<dyn DocumentStore>,
    deletions: DeletionGuard,
    delete_batch_size: u32,
}

impl TripRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            deletions: DeletionGuard::new(),
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
        }
    }

    /// Page size used when deleting a trip's activities. Must be positive.
    pub fn with_delete_batch_size(mut self, batch_size: u32) -> Self {
        self.delete_batch_size = batch_size;
        self
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    fn trips() -> CollectionRef {
        CollectionRef::root(COLLECTION_TRIPS)
    }

    fn trip_ref(trip_id: &str) -> Result<DocumentRef, SlurpError> {
        validate_segment(trip_id)?;
        Ok(Self::trips().doc(trip_id))
    }

    fn activity_ref(trip_id: &str, activity_id: &str) -> Result<DocumentRef, SlurpError> {
        validate_segment(activity_id)?;
        Ok(Self::trip_ref(trip_id)?
            .collection(COLLECTION_ACTIVITIES)
            .doc(activity_id))
    }

    /// Store a new trip under a generated id and return that id.
    pub async fn add_trip(&self, trip: &Trip) -> Result<String, SlurpError> {
        let doc = Self::trips().new_doc();
        self.store.set(&doc, to_fields(trip)?).await?;
        tracing::info!(trip = %doc, "trip created");
        Ok(doc.id().to_string())
    }

    /// Replace the stored trip with `trip`.
    pub async fn update_trip(&self, trip_id: &str, trip: &Trip) -> Result<(), SlurpError> {
        let doc = Self::trip_ref(trip_id)?;
        self.store.set(&doc, to_fields(trip)?).await?;
        Ok(())
    }

    pub async fn get_trip(&self, trip_id: &str) -> Result<Option<Trip>, SlurpError> {
        let doc = Self::trip_ref(trip_id)?;
        match self.store.get(&doc).await? {
            Some(found) => Ok(Some(found.decode()?)),
            None => Ok(None),
        }
    }

    /// The trip, if it exists and `uid` is one of its collaborators.
    pub async fn trip_for_viewer(&self, trip_id: &str, uid: &str) -> Result<Option<Trip>, SlurpError> {
        let trip = self.get_trip(trip_id).await?;
        Ok(trip.filter(|t| can_view(t, uid)))
    }

    /// Every trip `uid` collaborates on, keyed by trip id.
    pub async fn trips_for_user(&self, uid: &str) -> Result<Vec<(String, Trip)>, SlurpError> {
        let query = Query::new(Self::trips()).where_field(TRIPS_COLLABORATORS, FilterOp::ArrayContains, uid);
        let docs = self.store.query(&query).await?;
        let mut trips = Vec::with_capacity(docs.len());
        for doc in docs {
            trips.push((doc.id().to_string(), doc.decode()?));
        }
        Ok(trips)
    }

    /// Write a placeholder activity for the edit form to fill in.
    pub async fn create_empty_activity(&self, trip_id: &str, now: Instant) -> Result<Activity, SlurpError> {
        let doc = Self::trip_ref(trip_id)?
            .collection(COLLECTION_ACTIVITIES)
            .new_doc();
        let activity = Activity::empty(doc.id(), trip_id, now);
        self.store.set(&doc, to_fields(&activity)?).await?;
        tracing::debug!(activity = %doc, "empty activity created");
        Ok(activity)
    }

    /// Merge an edit into an existing activity. Returns `false` without
    /// touching the store when `fields` is empty.
    pub async fn write_activity(
        &self,
        trip_id: &str,
        activity_id: &str,
        fields: Fields,
    ) -> Result<bool, SlurpError> {
        let doc = Self::activity_ref(trip_id, activity_id)?;
        if fields.is_empty() {
            return Ok(false);
        }
        self.store.update(&doc, fields).await?;
        Ok(true)
    }

    pub async fn get_activity(
        &self,
        trip_id: &str,
        activity_id: &str,
    ) -> Result<Option<Activity>, SlurpError> {
        let doc = Self::activity_ref(trip_id, activity_id)?;
        match self.store.get(&doc).await? {
            Some(found) => Ok(Some(found.decode()?)),
            None => Ok(None),
        }
    }

    /// Drop a single activity, e.g. one abandoned right after creation.
    pub async fn delete_activity(&self, trip_id: &str, activity_id: &str) -> Result<(), SlurpError> {
        let doc = Self::activity_ref(trip_id, activity_id)?;
        self.store.delete(&doc).await?;
        Ok(())
    }

    /// Activities of a trip, earliest start first. Activities without a start
    /// time come last, in id order.
    pub async fn activities(&self, trip_id: &str) -> Result<Vec<Activity>, SlurpError> {
        let collection = Self::trip_ref(trip_id)?.collection(COLLECTION_ACTIVITIES);
        let docs = self.store.query(&Query::new(collection)).await?;
        let mut activities = docs
            .iter()
            .map(|doc| doc.decode::<Activity>())
            .collect::<Result<Vec<_>, _>>()?;
        activities.sort_by(|a, b| match (a.start_time, b.start_time) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.id.cmp(&b.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
        Ok(activities)
    }

    /// Delete a trip's activities in batches, then the trip.
    ///
    /// A second call for the same trip while one is running fails with
    /// [`SlurpError::DeleteInProgress`].
    pub async fn delete_trip(&self, trip_id: &str) -> Result<DeleteReport, SlurpError> {
        let trip = Self::trip_ref(trip_id)?;
        let _permit = self.deletions.try_acquire(&trip)?;
        delete_with_children(
            self.store.as_ref(),
            &trip,
            COLLECTION_ACTIVITIES,
            DOCUMENT_ID_FIELD,
            self.delete_batch_size,
        )
        .await
    }
}

/// Only collaborators may view a trip and its activities.
pub fn can_view(trip: &Trip, uid: &str) -> bool {
    trip.has_collaborator(uid)
}
