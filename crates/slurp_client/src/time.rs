//! Conversions between form-entered wall-clock values and stored instants.
//!
//! Forms hand us a `YYYY-MM-DD` date, an `HH:MM` time and a timezone name.
//! The database only ever sees [`Instant`]s (epoch milliseconds). Display
//! strings are produced per timezone with English month and weekday names.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, SubsecRound,
    TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::SlurpError;

pub use crate::catalog::{timezone_ids_for_country, timezones_for_country};

/// Timezone used when the caller does not pick one.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::New_York;

const TIME_FORMATS: [&str; 3] = ["%H:%M", "%H:%M:%S", "%H:%M:%S%.f"];

/// An absolute point in time with millisecond precision.
///
/// Serialized as integer milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Instant(DateTime<Utc>);

impl Instant {
    pub fn from_millis(millis: i64) -> Result<Self, SlurpError> {
        DateTime::from_timestamp_millis(millis)
            .map(Self)
            .ok_or_else(|| SlurpError::Parse(format!("timestamp out of range: {millis}")))
    }

    pub fn now() -> Self {
        Self(Utc::now().trunc_subsecs(3))
    }

    pub fn millis(self) -> i64 {
        self.0.timestamp_millis()
    }

    pub fn in_timezone(self, tz: &TimezoneId) -> DateTime<Tz> {
        self.0.with_timezone(&tz.0)
    }
}

impl TryFrom<i64> for Instant {
    type Error = SlurpError;

    fn try_from(millis: i64) -> Result<Self, Self::Error> {
        Self::from_millis(millis)
    }
}

impl From<Instant> for i64 {
    fn from(instant: Instant) -> Self {
        instant.millis()
    }
}

/// Canonical tz database identifier such as `America/New_York`.
///
/// This is the only form accepted by the conversion functions. Use
/// [`TimezoneId::label`] for anything shown to a user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimezoneId(Tz);

impl TimezoneId {
    pub fn as_str(&self) -> &'static str {
        self.0.name()
    }

    pub fn tz(&self) -> Tz {
        self.0
    }

    pub fn label(&self) -> TimezoneLabel {
        TimezoneLabel(self.as_str().replace('_', " "))
    }
}

impl Default for TimezoneId {
    fn default() -> Self {
        Self(DEFAULT_TIMEZONE)
    }
}

impl From<Tz> for TimezoneId {
    fn from(tz: Tz) -> Self {
        Self(tz)
    }
}

impl FromStr for TimezoneId {
    type Err = SlurpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Tz>()
            .map(Self)
            .map_err(|_| SlurpError::UnknownTimezone(s.to_string()))
    }
}

impl TryFrom<String> for TimezoneId {
    type Error = SlurpError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimezoneId> for String {
    fn from(id: TimezoneId) -> Self {
        id.as_str().to_string()
    }
}

impl fmt::Display for TimezoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display-only rendering of a timezone (`America/New York`).
///
/// There is intentionally no way to parse a label back into a [`TimezoneId`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TimezoneLabel(String);

impl TimezoneLabel {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&TimezoneId> for TimezoneLabel {
    fn from(id: &TimezoneId) -> Self {
        id.label()
    }
}

impl fmt::Display for TimezoneLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_date(date: &str) -> Result<NaiveDate, SlurpError> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| SlurpError::Parse(format!("invalid date {date:?}: {e}")))
}

fn parse_time(time: &str) -> Result<NaiveTime, SlurpError> {
    let trimmed = time.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| SlurpError::Parse(format!("invalid time {time:?}")))
}

/// Map a wall-clock value in `tz` to UTC.
///
/// Repeated wall times resolve to the earlier instant. Skipped wall times
/// are pushed forward by the length of the gap.
fn resolve_local(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>, SlurpError> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            let out_of_range = || SlurpError::Parse(format!("date out of range: {naive}"));
            let day_before = naive
                .checked_sub_signed(Duration::days(1))
                .ok_or_else(out_of_range)?;
            let before = tz.offset_from_utc_datetime(&day_before).fix();
            let utc = naive
                .checked_sub_signed(Duration::seconds(i64::from(before.local_minus_utc())))
                .ok_or_else(out_of_range)?;
            Ok(Utc.from_utc_datetime(&utc))
        }
    }
}

/// Interpret `date` + `time` as wall-clock time in `tz`.
///
/// `date` is `YYYY-MM-DD`; `time` is `HH:MM`, `HH:MM:SS` or `HH:MM:SS.fff`.
/// Blank inputs mean "no change" and must be filtered out by the caller.
pub fn instant_from_parts(date: &str, time: &str, tz: &TimezoneId) -> Result<Instant, SlurpError> {
    let naive = NaiveDateTime::new(parse_date(date)?, parse_time(time)?);
    Instant::from_millis(resolve_local(naive, tz.0)?.timestamp_millis())
}

/// `YYYY-MM-DD` in `tz`, suitable for a date input.
pub fn date_string_from_instant(instant: Instant, tz: &TimezoneId) -> String {
    instant.in_timezone(tz).format("%Y-%m-%d").to_string()
}

/// Time of day in `tz`, suitable for a time input.
///
/// Seconds and milliseconds are included only when non-zero so the result
/// always converts back to the same instant.
pub fn time_string_from_instant(instant: Instant, tz: &TimezoneId) -> String {
    let local = instant.in_timezone(tz);
    let fmt = if local.nanosecond() != 0 {
        "%H:%M:%S%.3f"
    } else if local.second() != 0 {
        "%H:%M:%S"
    } else {
        "%H:%M"
    };
    local.format(fmt).to_string()
}

/// Long date such as `Saturday, October 3, 2020`.
pub fn timestamp_to_date_formatted(instant: Instant, tz: &TimezoneId) -> String {
    instant.in_timezone(tz).format("%A, %B %-d, %Y").to_string()
}

/// Short 12-hour time such as `10:19 AM`.
pub fn timestamp_to_time_formatted(instant: Instant, tz: &TimezoneId) -> String {
    instant.in_timezone(tz).format("%-I:%M %p").to_string()
}

/// Long date and short time, e.g. `Saturday, October 3, 2020, 10:19 AM`.
pub fn timestamp_to_formatted(instant: Instant, tz: &TimezoneId) -> String {
    format!(
        "{}, {}",
        timestamp_to_date_formatted(instant, tz),
        timestamp_to_time_formatted(instant, tz)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc_millis(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, ms: u32) -> Instant {
        let dt = Utc
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .expect("valid utc datetime");
        Instant::from_millis(dt.timestamp_millis() + i64::from(ms)).expect("in range")
    }

    fn tz(name: &str) -> TimezoneId {
        name.parse().expect("known timezone")
    }

    #[test]
    fn new_york_date_and_time_format() {
        let instant = utc_millis(2020, 10, 3, 14, 19, 4, 23);
        let ny = TimezoneId::default();
        assert_eq!(
            timestamp_to_date_formatted(instant, &ny),
            "Saturday, October 3, 2020"
        );
        assert_eq!(timestamp_to_time_formatted(instant, &ny), "10:19 AM");
        assert_eq!(
            timestamp_to_formatted(instant, &ny),
            "Saturday, October 3, 2020, 10:19 AM"
        );
    }

    #[test]
    fn date_crosses_calendar_boundary_between_zones() {
        let instant = utc_millis(2020, 8, 23, 2, 3, 2, 4);
        let chicago = tz("America/Chicago");
        let singapore = tz("Asia/Singapore");
        assert_eq!(
            timestamp_to_date_formatted(instant, &chicago),
            "Saturday, August 22, 2020"
        );
        assert_eq!(timestamp_to_time_formatted(instant, &chicago), "9:03 PM");
        assert_eq!(
            timestamp_to_date_formatted(instant, &singapore),
            "Sunday, August 23, 2020"
        );
        assert_eq!(timestamp_to_time_formatted(instant, &singapore), "10:03 AM");
    }

    #[test]
    fn parts_round_trip_through_instant() {
        let zones = [
            "America/New_York",
            "Asia/Kolkata",
            "Asia/Kathmandu",
            "America/St_Johns",
            "Australia/Lord_Howe",
            "Pacific/Chatham",
            "UTC",
        ];
        let cases = [
            ("2020-01-01", "00:00"),
            ("2020-03-08", "12:45"),
            ("2020-07-04", "23:59"),
            ("2021-11-07", "09:05"),
            ("1999-12-31", "18:30:15"),
            ("2024-02-29", "06:07:08.009"),
        ];
        for zone in zones {
            let id = tz(zone);
            for (date, time) in cases {
                let instant = instant_from_parts(date, time, &id).expect("valid parts");
                assert_eq!(date_string_from_instant(instant, &id), date, "{zone} {date}");
                assert_eq!(time_string_from_instant(instant, &id), time, "{zone} {time}");
            }
        }
    }

    #[test]
    fn instant_round_trips_through_parts() {
        let id = tz("Asia/Kolkata");
        for millis in [0_i64, 1_601_734_744_023, 1_598_148_182_004, -86_400_000] {
            let instant = Instant::from_millis(millis).unwrap();
            let back = instant_from_parts(
                &date_string_from_instant(instant, &id),
                &time_string_from_instant(instant, &id),
                &id,
            )
            .unwrap();
            assert_eq!(back, instant);
        }
    }

    #[test]
    fn wall_time_uses_offset_in_effect_on_that_date() {
        let ny = TimezoneId::default();
        let winter = instant_from_parts("2020-01-15", "12:00", &ny).unwrap();
        let summer = instant_from_parts("2020-07-15", "12:00", &ny).unwrap();
        assert_eq!(winter, utc_millis(2020, 1, 15, 17, 0, 0, 0));
        assert_eq!(summer, utc_millis(2020, 7, 15, 16, 0, 0, 0));
    }

    #[test]
    fn repeated_wall_time_resolves_to_earlier_instant() {
        let ny = TimezoneId::default();
        let instant = instant_from_parts("2021-11-07", "01:30", &ny).unwrap();
        assert_eq!(instant, utc_millis(2021, 11, 7, 5, 30, 0, 0));

        // 01:30 EST, the second 01:30 of the night, comes back as 01:30 EDT.
        let second = Instant::from_millis(1_636_266_600_000).unwrap();
        let back = instant_from_parts(
            &date_string_from_instant(second, &ny),
            &time_string_from_instant(second, &ny),
            &ny,
        )
        .unwrap();
        assert_eq!(back.millis(), 1_636_263_000_000);
    }

    #[test]
    fn skipped_wall_time_moves_forward_by_gap() {
        let ny = TimezoneId::default();
        let instant = instant_from_parts("2021-03-14", "02:30", &ny).unwrap();
        assert_eq!(instant, utc_millis(2021, 3, 14, 7, 30, 0, 0));
        assert_eq!(time_string_from_instant(instant, &ny), "03:30");
    }

    #[test]
    fn malformed_parts_are_parse_errors() {
        let ny = TimezoneId::default();
        assert!(matches!(
            instant_from_parts("10/03/2020", "10:19", &ny),
            Err(SlurpError::Parse(_))
        ));
        assert!(matches!(
            instant_from_parts("2020-10-03", "25:00", &ny),
            Err(SlurpError::Parse(_))
        ));
        assert!(matches!(
            instant_from_parts("2020-02-30", "10:00", &ny),
            Err(SlurpError::Parse(_))
        ));
    }

    #[test]
    fn dates_at_the_edge_of_the_calendar_are_parse_errors() {
        let ny = TimezoneId::default();
        let err = instant_from_parts("+262142-12-31", "23:59", &ny).unwrap_err();
        assert!(matches!(err, SlurpError::Parse(_)), "{err}");
    }

    #[test]
    fn labels_are_not_timezone_ids() {
        let id = tz("America/New_York");
        assert_eq!(id.label().as_str(), "America/New York");
        let err = id.label().as_str().parse::<TimezoneId>().unwrap_err();
        assert!(matches!(err, SlurpError::UnknownTimezone(_)));
        assert!(matches!(
            "Mars/Olympus_Mons".parse::<TimezoneId>(),
            Err(SlurpError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn instant_serializes_as_millis() {
        let instant = Instant::from_millis(1_601_734_744_023).unwrap();
        assert_eq!(serde_json::to_value(instant).unwrap(), 1_601_734_744_023_i64);
        let back: Instant = serde_json::from_value(serde_json::json!(1_601_734_744_023_i64)).unwrap();
        assert_eq!(back, instant);
        assert!(serde_json::from_value::<Instant>(serde_json::json!(i64::MAX)).is_err());
    }

    #[test]
    fn timezone_id_serializes_as_canonical_name() {
        let id = tz("Asia/Ho_Chi_Minh");
        assert_eq!(serde_json::to_value(id).unwrap(), "Asia/Ho_Chi_Minh");
        assert!(serde_json::from_value::<TimezoneId>(serde_json::json!("Asia/Ho Chi Minh")).is_err());
    }
}
