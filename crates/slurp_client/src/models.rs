//! Stored document shapes and their collection/field names.

use serde::{Deserialize, Serialize};

use crate::StoreError;
use crate::store::Fields;
use crate::time::{Instant, TimezoneId, timestamp_to_formatted};

pub const COLLECTION_TRIPS: &str = "trips";
pub const COLLECTION_ACTIVITIES: &str = "activities";

pub const TRIPS_NAME: &str = "name";
pub const TRIPS_DESCRIPTION: &str = "description";
pub const TRIPS_DESTINATION: &str = "destination";
pub const TRIPS_START_DATE: &str = "start_date";
pub const TRIPS_END_DATE: &str = "end_date";
pub const TRIPS_COLLABORATORS: &str = "collaborators";
pub const TRIPS_UPDATED_AT: &str = "updated_at";

pub const ACTIVITIES_ID: &str = "id";
pub const ACTIVITIES_TRIP_ID: &str = "trip_id";
pub const ACTIVITIES_TITLE: &str = "title";
pub const ACTIVITIES_DESCRIPTION: &str = "description";
pub const ACTIVITIES_START_TIME: &str = "start_time";
pub const ACTIVITIES_END_TIME: &str = "end_time";
pub const ACTIVITIES_START_COUNTRY: &str = "start_country";
pub const ACTIVITIES_END_COUNTRY: &str = "end_country";
pub const ACTIVITIES_START_TZ: &str = "start_tz";
pub const ACTIVITIES_END_TZ: &str = "end_tz";
pub const ACTIVITIES_CREATED_AT: &str = "created_at";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub destination: String,
    /// `YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// Collaborator uids, creator first.
    #[serde(default)]
    pub collaborators: Vec<String>,
    pub updated_at: Instant,
}

impl Trip {
    pub fn has_collaborator(&self, uid: &str) -> bool {
        self.collaborators.iter().any(|c| c == uid)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: String,
    pub trip_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Instant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Instant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_tz: Option<TimezoneId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_tz: Option<TimezoneId>,
    pub created_at: Instant,
}

impl Activity {
    /// A placeholder activity the edit form fills in.
    pub fn empty(id: &str, trip_id: &str, created_at: Instant) -> Self {
        Self {
            id: id.to_string(),
            trip_id: trip_id.to_string(),
            title: None,
            description: None,
            start_time: None,
            end_time: None,
            start_country: None,
            end_country: None,
            start_tz: None,
            end_tz: None,
            created_at,
        }
    }

    /// Start rendered in the activity's own start timezone.
    pub fn start_formatted(&self) -> Option<String> {
        let tz = self.start_tz.unwrap_or_default();
        self.start_time.map(|t| timestamp_to_formatted(t, &tz))
    }

    pub fn end_formatted(&self) -> Option<String> {
        let tz = self.end_tz.unwrap_or_default();
        self.end_time.map(|t| timestamp_to_formatted(t, &tz))
    }
}

/// Encode a model as a document field map.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(StoreError::Decode(format!("expected an object, got {other}"))),
        Err(e) => Err(StoreError::Decode(format!("encoding document: {e}"))),
    }
}
