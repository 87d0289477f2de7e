//! CSV codec for saved log records
//!
//! Files carry a `DateTime,Msg,Url` header. `Msg` holds the correlation id and the
//! message joined by ` ⚕ ` so the id survives messages that do not start with it.

use std::fs;
use std::path::Path;

use alertscope_types::LogRecord;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CsvError;

const ID_SEPARATOR: &str = " ⚕ ";

/// Rows with this marker are noise and never read back
const IDEMPOTENT_MARKER: &str = "check idempotent failed";

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "DateTime")]
    date_time: String,
    #[serde(rename = "Msg")]
    msg: String,
    #[serde(rename = "Url")]
    url: String,
}

/// RFC 3339 in UTC with millisecond precision
pub fn format_csv_datetime(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Accepts RFC 3339 or a naive `YYYY-MM-DD HH:MM:SS[.fff]` taken as UTC
pub fn parse_csv_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Write records, replacing any existing file
pub fn write_records(path: &Path, records: &[LogRecord]) -> Result<(), CsvError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CsvError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let csv_err = |source| CsvError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for record in records {
        writer
            .serialize(CsvRow {
                date_time: format_csv_datetime(&record.timestamp),
                msg: format!("{}{}{}", record.correlation_id, ID_SEPARATOR, record.message),
                url: record.source_link.clone(),
            })
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| CsvError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), rows = records.len(), "wrote log records");
    Ok(())
}

/// Read records back, optionally only the first `top_n` rows
pub fn read_records(path: &Path, top_n: Option<usize>) -> Result<Vec<LogRecord>, CsvError> {
    let csv_err = |source| CsvError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;

    let mut records = Vec::new();
    for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
        if top_n.is_some_and(|n| i >= n) {
            break;
        }
        let row = row.map_err(csv_err)?;
        if row.msg.contains(IDEMPOTENT_MARKER) {
            debug!(row = i, "skipping idempotency noise");
            continue;
        }

        let timestamp =
            parse_csv_datetime(&row.date_time).ok_or_else(|| CsvError::InvalidDateTime {
                path: path.to_path_buf(),
                value: row.date_time.clone(),
            })?;
        let (id, message) = match row.msg.split_once(ID_SEPARATOR) {
            Some((id, message)) => (id.to_string(), message.to_string()),
            None => (
                row.msg.split(' ').next().unwrap_or_default().to_string(),
                row.msg.clone(),
            ),
        };
        records.push(LogRecord::new(timestamp, id, message, row.url));
    }
    Ok(records)
}
