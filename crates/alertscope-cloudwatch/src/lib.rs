//! CloudWatch Logs access for alertscope
//!
//! This crate provides the log event source abstraction, the paginated fetcher,
//! the SDK-backed and offline replay sources, console deep links, profile
//! resolution and log-group export.

mod aws;
mod error;
mod export;
mod fetcher;
mod pattern;
mod profile;
mod replay;
mod source;
pub mod urls;

pub use aws::{AwsExportBackend, CloudWatchSource, load_sdk_config};
pub use error::{ExportError, ProfileError, SourceError};
pub use export::{
    DEFAULT_POLL_INTERVAL, ExportBackend, ExportOutcome, ExportPlan, ExportRequest,
    ExportTaskState, ExportTaskStatus, LogGroupInfo, bucket_policy, run_export,
};
pub use fetcher::{
    FetchQuery, LogEventFetcher, MAX_FILTER_PATTERN_LEN, TimeWindow, correlation_id_patterns,
};
pub use pattern::FilterPattern;
pub use profile::{AccountIds, ProfileSet, current_hostname, expired_token_remediation};
pub use replay::ReplaySource;
pub use source::{FilterLogEventsPage, FilterLogEventsRequest, LogEventSource};

// Re-export types used in our public API
pub use alertscope_types::RawLogEvent;
