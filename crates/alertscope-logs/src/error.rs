use std::path::PathBuf;

use alertscope_cloudwatch::SourceError;
use thiserror::Error;

/// Errors raised while parsing an alert payload
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AlertError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Invalid alarm time: {0}")]
    InvalidTime(String),
}

/// Errors raised by the CSV codec
#[derive(Error, Debug)]
pub enum CsvError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid DateTime '{value}' in {path}")]
    InvalidDateTime { path: PathBuf, value: String },
}

/// Errors raised by the triage pipeline
#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Fetch failed: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Csv(#[from] CsvError),
}

/// Errors raised by the search fan-out
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Nothing to search: no log groups or regions given")]
    NoTargets,

    #[error("Search worker panicked: {0}")]
    Join(String),
}

/// Errors raised while reading a game client log
#[derive(Error, Debug)]
pub enum ClientLogError {
    #[error("File name does not start with a log time (e.g. 2025-01-16_03-44-23-143): {0}")]
    MissingLogTime(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] CsvError),
}
