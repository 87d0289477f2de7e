//! Subcommand implementations

pub mod analyze;
pub mod export;
pub mod parse;
pub mod search;
pub mod triage;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use alertscope_cloudwatch::{
    CloudWatchSource, FilterLogEventsPage, FilterLogEventsRequest, LogEventSource, ReplaySource,
    SourceError, current_hostname, expired_token_remediation,
};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::Config;

/// Parse `2024-07-20 18:29:00+0800` or RFC 3339
pub fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%z"))
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%z"))
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            format!(
                "invalid time '{}', expected e.g. 2024-07-20 18:29:00+0800",
                value
            )
        })
}

/// Where log events are read from
#[derive(Clone)]
pub enum LogSource {
    Replay(Arc<ReplaySource>),
    CloudWatch(CloudWatchSource),
}

impl LogSource {
    /// Replay files when a directory is given by flag or config, CloudWatch otherwise
    pub async fn open(replay: Option<PathBuf>, config: &Config, region: &str, prod: bool) -> Self {
        match replay.or_else(|| config.replay_dir.clone()) {
            Some(dir) => Self::Replay(Arc::new(replay_source(&dir, region))),
            None => {
                let profile = aws_profile(config, region, prod);
                info!(region, profile = profile.as_deref(), "reading logs from CloudWatch");
                Self::CloudWatch(CloudWatchSource::connect(region, profile.as_deref()).await)
            }
        }
    }
}

impl LogEventSource for LogSource {
    async fn filter_log_events(
        &self,
        request: &FilterLogEventsRequest,
    ) -> Result<FilterLogEventsPage, SourceError> {
        match self {
            Self::Replay(source) => source.filter_log_events(request).await,
            Self::CloudWatch(source) => source.filter_log_events(request).await,
        }
    }
}

/// Named profile of this machine for a region; `None` uses the default credential chain
pub fn aws_profile(config: &Config, region: &str, prod: bool) -> Option<String> {
    config
        .profiles_for(&current_hostname())
        .map(|profiles| profiles.select(region, prod).to_string())
        .filter(|profile| !profile.is_empty())
}

/// Replay source of a region: `<dir>/<region>` when present, else `<dir>`
pub fn replay_source(dir: &Path, region: &str) -> ReplaySource {
    let regional = dir.join(region);
    if regional.is_dir() {
        ReplaySource::new(regional)
    } else {
        ReplaySource::new(dir)
    }
}

/// Print how to refresh expired credentials for a region
pub fn print_remediation(config: &Config, region: &str, prod: bool) {
    let host = current_hostname();
    match config.profiles_for(&host) {
        Some(profiles) => {
            println!("Credentials expired, refresh with:");
            println!(
                "{}",
                expired_token_remediation(region, profiles.select(region, prod))
            );
        }
        None => println!(
            "Credentials expired and no profiles are configured for host '{}'",
            host
        ),
    }
}
