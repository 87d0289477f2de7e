//! Log triage for alertscope
//!
//! This crate turns raw log events into per-request timelines, classifies
//! failed requests and renders the triage report. It also hosts the alert
//! payload parser, the CSV codec, the multi-region search fan-out and the
//! game client log timing report.

mod aggregate;
mod alert;
mod classify;
mod client_log;
mod csv_io;
mod error;
mod extract;
mod report;
mod rules;
mod search;
mod triage;

pub use aggregate::{RequestAggregator, RequestSet, group_by_request, is_duplicate_trace};
pub use alert::parse_alert;
pub use classify::{Classification, ErrorClassifier};
pub use client_log::{
    ClientLog, LambdaResponse, LambdaTarget, LogMessage, StageBlock, log_time_from_file_name,
    parse_client_log, read_client_log, split_messages, write_guid_csv, write_stage_csv,
};
pub use csv_io::{format_csv_datetime, parse_csv_datetime, read_records, write_records};
pub use error::{AlertError, ClientLogError, CsvError, SearchError, TriageError};
pub use extract::LogExtractor;
pub use report::AnalysisReport;
pub use rules::{DetailExtractor, Matcher, Rule, rules_for};
pub use search::{
    DEFAULT_REFRESH, SearchHit, SearchManager, SearchOutcome, SearchRequest, SearchSnapshot,
    SearchTarget, SearchUpdate, SortOrder, WorkerState, WorkerStatus,
};
pub use triage::{ERROR_PATTERN, TriageOutcome, TriagePipeline, TriageSettings};

// Re-export types used in our public API
pub use alertscope_types::{AlertDetail, ErrorCategory, LogRecord, RequestDetail, Subsystem};
