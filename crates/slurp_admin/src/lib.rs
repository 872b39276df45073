//! Command line surface of `slurp-admin`.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use slurp_client::cascade::DeleteReport;
use slurp_client::config::Config;
use slurp_client::http_client::ReqwestFirestoreClient;
use slurp_client::time::{self, Instant, TimezoneId};
use slurp_client::trips::TripRepository;

#[derive(Debug, Parser)]
#[command(name = "slurp-admin")]
#[command(about = "Maintenance tasks for the trip planner's Firestore data", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Delete a trip and every activity under it
    DeleteTrip {
        trip_id: String,
    },
    /// List the timezones of a country (all zones if the country is unknown)
    Timezones {
        country: String,
    },
    /// Render an epoch-millisecond timestamp
    Format {
        millis: i64,
        /// IANA timezone id
        #[arg(long, default_value = "America/New_York")]
        tz: String,
    },
    /// Convert a wall-clock date and time to epoch milliseconds
    ToInstant {
        /// YYYY-MM-DD
        date: String,
        /// HH:MM, HH:MM:SS or HH:MM:SS.mmm
        time: String,
        #[arg(long, default_value = "America/New_York")]
        tz: String,
    },
}

pub fn timezones(country: &str) -> Vec<String> {
    time::timezones_for_country(country)
        .into_iter()
        .map(|label| label.to_string())
        .collect()
}

pub fn format(millis: i64, tz: &str) -> anyhow::Result<String> {
    let tz: TimezoneId = tz.parse()?;
    let instant = Instant::from_millis(millis)?;
    Ok(time::timestamp_to_formatted(instant, &tz))
}

pub fn to_instant(date: &str, time_of_day: &str, tz: &str) -> anyhow::Result<i64> {
    let tz: TimezoneId = tz.parse()?;
    Ok(time::instant_from_parts(date, time_of_day, &tz)?.millis())
}

pub async fn delete_trip(cfg: &Config, trip_id: &str) -> anyhow::Result<DeleteReport> {
    let client = ReqwestFirestoreClient::from_config(cfg);
    let repo = TripRepository::new(Arc::new(client)).with_delete_batch_size(cfg.delete_batch_size);
    repo.delete_trip(trip_id)
        .await
        .with_context(|| format!("deleting trip {trip_id}"))
}

/// Execute one command and return the lines to print.
pub async fn run(command: Command) -> anyhow::Result<Vec<String>> {
    match command {
        Command::DeleteTrip { trip_id } => {
            let cfg = Config::from_env()?;
            let report = delete_trip(&cfg, &trip_id).await?;
            Ok(vec![format!(
                "deleted trip {trip_id}: {} activities in {} rounds",
                report.deleted, report.rounds
            )])
        }
        Command::Timezones { country } => Ok(timezones(&country)),
        Command::Format { millis, tz } => Ok(vec![format(millis, &tz)?]),
        Command::ToInstant { date, time, tz } => Ok(vec![to_instant(&date, &time, &tz)?.to_string()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["slurp-admin", "delete-trip", "t1"]).unwrap();
        assert!(matches!(cli.command, Command::DeleteTrip { ref trip_id } if trip_id == "t1"));

        let cli = Cli::try_parse_from([
            "slurp-admin",
            "to-instant",
            "2020-10-03",
            "10:19:04.023",
            "--tz",
            "Asia/Singapore",
        ])
        .unwrap();
        match cli.command {
            Command::ToInstant { date, time, tz } => {
                assert_eq!(date, "2020-10-03");
                assert_eq!(time, "10:19:04.023");
                assert_eq!(tz, "Asia/Singapore");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn format_defaults_to_new_york() {
        let cli = Cli::try_parse_from(["slurp-admin", "format", "1601734744023"]).unwrap();
        let Command::Format { millis, tz } = cli.command else {
            panic!("expected format");
        };
        assert_eq!(
            format(millis, &tz).unwrap(),
            "Saturday, October 3, 2020, 10:19 AM"
        );
    }

    #[test]
    fn missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["slurp-admin"]).is_err());
    }
}
