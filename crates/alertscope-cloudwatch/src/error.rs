use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading log events
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Expired token: {0}")]
    ExpiredToken(String),

    #[error("Throttled: {0}")]
    Throttled(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid pagination token: {0}")]
    InvalidToken(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SourceError {
    /// Map a provider error message onto the matching variant
    pub fn from_service_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("security token included in the request is expired")
            || message.contains("ExpiredToken")
        {
            Self::ExpiredToken(message)
        } else if message.contains("ThrottlingException") || lower.contains("rate exceeded") {
            Self::Throttled(message)
        } else if lower.contains("timed out") || lower.contains("timeout") {
            Self::Timeout(message)
        } else {
            Self::Service(message)
        }
    }

    pub fn is_expired_token(&self) -> bool {
        matches!(self, Self::ExpiredToken(_))
    }
}

/// Errors raised while resolving credentials profiles
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Need to set up the profiles for host '{0}'")]
    UnknownHost(String),
}

/// Errors raised by the log-group export workflow
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Log group not found: {log_group} ({region})")]
    LogGroupNotFound { log_group: String, region: String },

    #[error("Export task was not created for {0}")]
    TaskNotCreated(String),

    #[error("Export cancelled while task {0} was running")]
    Cancelled(String),

    #[error("Backend error: {0}")]
    Backend(String),
}
