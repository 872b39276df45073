//! Cleanup of raw form values before they are written to the store.
//!
//! Forms submit every field as a string. Blank strings mean "keep the
//! default" on create and "no change" on edit.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;

use crate::SlurpError;
use crate::models::{
    ACTIVITIES_DESCRIPTION, ACTIVITIES_END_COUNTRY, ACTIVITIES_END_TIME, ACTIVITIES_END_TZ,
    ACTIVITIES_START_COUNTRY, ACTIVITIES_START_TIME, ACTIVITIES_START_TZ, ACTIVITIES_TITLE,
    Activity, Trip,
};
use crate::store::Fields;
use crate::time::{
    Instant, TimezoneId, date_string_from_instant, instant_from_parts, time_string_from_instant,
};
use crate::users::UserDirectory;

pub const DEFAULT_TRIP_NAME: &str = "Untitled Trip";

/// Country dropdown entry meaning "leave the stored value alone".
pub const NO_CHANGE: &str = "No Change";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

fn is_blank(raw: &str) -> bool {
    raw.trim().is_empty()
}

/// `default` when `raw` is blank, otherwise `raw` as typed.
pub fn cleaned_text_input(raw: &str, default: &str) -> String {
    if is_blank(raw) {
        default.to_string()
    } else {
        raw.to_string()
    }
}

/// Trim, drop blank entries and repeats (case-insensitive), and check each
/// address looks like an email. Order of first appearance is kept.
pub fn cleaned_emails(raw: &[String]) -> Result<Vec<String>, SlurpError> {
    let mut seen = HashSet::new();
    let mut emails = Vec::new();
    for entry in raw {
        let email = entry.trim();
        if email.is_empty() {
            continue;
        }
        if !EMAIL_RE.is_match(email) {
            return Err(SlurpError::InvalidInput(format!("not an email address: {email}")));
        }
        if seen.insert(email.to_lowercase()) {
            emails.push(email.to_string());
        }
    }
    Ok(emails)
}

/// Uids for a trip's collaborator list: the current user first, then every
/// distinct collaborator entered in the form.
pub async fn collaborator_uids(
    emails: &[String],
    directory: &dyn UserDirectory,
) -> Result<Vec<String>, SlurpError> {
    let current_email = directory.current_user_email().await?.to_lowercase();
    let mut uids = vec![directory.current_user_uid().await?];
    for email in cleaned_emails(emails)? {
        if email.to_lowercase() == current_email {
            continue;
        }
        let uid = directory.uid_for_email(&email).await?;
        if !uids.contains(&uid) {
            uids.push(uid);
        }
    }
    Ok(uids)
}

fn optional_date(raw: &str, field: &str) -> Result<Option<String>, SlurpError> {
    if is_blank(raw) {
        return Ok(None);
    }
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| SlurpError::Parse(format!("{field} {raw:?}: {e}")))?;
    Ok(Some(date.format("%Y-%m-%d").to_string()))
}

/// Raw values from the add/edit trip form.
#[derive(Clone, Debug, Default)]
pub struct TripForm {
    pub name: String,
    pub description: String,
    pub destination: String,
    pub start_date: String,
    pub end_date: String,
    pub collaborator_emails: Vec<String>,
}

/// Build the trip document saved by the add and edit trip forms.
pub async fn format_trip_data(
    form: &TripForm,
    directory: &dyn UserDirectory,
    now: Instant,
) -> Result<Trip, SlurpError> {
    let start_date = optional_date(&form.start_date, "start date")?;
    let end_date = optional_date(&form.end_date, "end date")?;
    if let (Some(start), Some(end)) = (&start_date, &end_date) {
        // ISO dates compare correctly as strings.
        if end < start {
            return Err(SlurpError::InvalidInput(format!(
                "end date {end} is before start date {start}"
            )));
        }
    }
    Ok(Trip {
        name: cleaned_text_input(&form.name, DEFAULT_TRIP_NAME),
        description: cleaned_text_input(&form.description, ""),
        destination: cleaned_text_input(&form.destination, ""),
        start_date,
        end_date,
        collaborators: collaborator_uids(&form.collaborator_emails, directory).await?,
        updated_at: now,
    })
}

/// Raw values from the activity editor. Timezones are canonical ids.
#[derive(Clone, Debug, Default)]
pub struct ActivityForm {
    pub title: String,
    pub description: String,
    pub start_country: String,
    pub end_country: String,
    pub start_date: String,
    pub start_time: String,
    pub start_tz: String,
    pub end_date: String,
    pub end_time: String,
    pub end_tz: String,
}

impl ActivityForm {
    /// Prefill the editor from a stored activity, times shown in the
    /// activity's own timezones.
    pub fn from_activity(activity: &Activity) -> Self {
        let mut form = Self {
            title: activity.title.clone().unwrap_or_default(),
            description: activity.description.clone().unwrap_or_default(),
            start_country: activity.start_country.clone().unwrap_or_else(|| NO_CHANGE.into()),
            end_country: activity.end_country.clone().unwrap_or_else(|| NO_CHANGE.into()),
            ..Self::default()
        };
        if let Some(start) = activity.start_time {
            let tz = activity.start_tz.unwrap_or_default();
            form.start_date = date_string_from_instant(start, &tz);
            form.start_time = time_string_from_instant(start, &tz);
            form.start_tz = tz.to_string();
        }
        if let Some(end) = activity.end_time {
            let tz = activity.end_tz.unwrap_or_default();
            form.end_date = date_string_from_instant(end, &tz);
            form.end_time = time_string_from_instant(end, &tz);
            form.end_tz = tz.to_string();
        }
        form
    }
}

fn timezone_or_default(raw: &str) -> Result<TimezoneId, SlurpError> {
    if is_blank(raw) {
        Ok(TimezoneId::default())
    } else {
        raw.parse()
    }
}

fn insert_time(
    fields: &mut Fields,
    (date, time, tz): (&str, &str, &str),
    (time_field, tz_field): (&str, &str),
) -> Result<(), SlurpError> {
    if is_blank(date) || is_blank(time) {
        return Ok(());
    }
    let tz = timezone_or_default(tz)?;
    let instant = instant_from_parts(date, time, &tz)?;
    fields.insert(time_field.into(), Value::from(instant.millis()));
    fields.insert(tz_field.into(), Value::from(tz.as_str()));
    Ok(())
}

/// Fields changed by an activity edit. An empty map means nothing to write.
pub fn activity_update_fields(form: &ActivityForm) -> Result<Fields, SlurpError> {
    let mut fields = Fields::new();
    if !is_blank(&form.title) {
        fields.insert(ACTIVITIES_TITLE.into(), Value::from(form.title.as_str()));
    }
    if !is_blank(&form.description) {
        fields.insert(
            ACTIVITIES_DESCRIPTION.into(),
            Value::from(form.description.as_str()),
        );
    }
    for (raw, field) in [
        (&form.start_country, ACTIVITIES_START_COUNTRY),
        (&form.end_country, ACTIVITIES_END_COUNTRY),
    ] {
        if !is_blank(raw) && raw.as_str() != NO_CHANGE {
            fields.insert(field.into(), Value::from(raw.as_str()));
        }
    }
    insert_time(
        &mut fields,
        (form.start_date.as_str(), form.start_time.as_str(), form.start_tz.as_str()),
        (ACTIVITIES_START_TIME, ACTIVITIES_START_TZ),
    )?;
    insert_time(
        &mut fields,
        (form.end_date.as_str(), form.end_time.as_str(), form.end_tz.as_str()),
        (ACTIVITIES_END_TIME, ACTIVITIES_END_TZ),
    )?;
    Ok(fields)
}
