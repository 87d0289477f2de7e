use std::path::PathBuf;

use alertscope_cloudwatch::{FetchQuery, LogEventFetcher, LogEventSource, TimeWindow};
use alertscope_types::{AlertDetail, LogRecord};
use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregate::{RequestAggregator, group_by_request};
use crate::classify::{Classification, ErrorClassifier};
use crate::csv_io::write_records;
use crate::error::TriageError;
use crate::extract::LogExtractor;

/// Filter pattern selecting error-level lines
pub const ERROR_PATTERN: &str = r"%\[ERROR\]%";

const FILE_TIME_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Knobs of a triage run
#[derive(Clone, Debug)]
pub struct TriageSettings {
    /// Where the CSV files go
    pub data_dir: PathBuf,

    /// Span searched before the alarm when no start is given
    pub window: Duration,

    pub verbose: bool,
}

impl Default for TriageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            window: Duration::minutes(5),
            verbose: false,
        }
    }
}

/// What a triage run found and where it saved it
#[derive(Clone, Debug)]
pub struct TriageOutcome {
    pub window: TimeWindow,
    pub error_count: usize,
    pub error_csv: PathBuf,
    pub full_count: usize,
    pub full_csv: Option<PathBuf>,
    pub classification: Option<Classification>,
}

/// Alert to report: fetch error lines, then the complete logs of the failing requests
pub struct TriagePipeline<S> {
    fetcher: LogEventFetcher<S>,
    settings: TriageSettings,
}

impl<S: LogEventSource> TriagePipeline<S> {
    pub fn new(source: S, settings: TriageSettings) -> Self {
        Self {
            fetcher: LogEventFetcher::new(source),
            settings,
        }
    }

    pub fn settings(&self) -> &TriageSettings {
        &self.settings
    }

    /// Search window for an alert; explicit bounds win over the alarm time
    pub fn window_for(
        &self,
        alert: &AlertDetail,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> TimeWindow {
        let end = end.unwrap_or_else(|| alert.alarm_time.with_timezone(&Utc));
        let start = start.unwrap_or(end - self.settings.window);
        TimeWindow::new(Some(start), Some(end))
    }

    pub async fn run(
        &self,
        alert: &AlertDetail,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<TriageOutcome, TriageError> {
        let window = self.window_for(alert, start, end);
        let log_group = alert.log_group();
        let extractor =
            LogExtractor::new(&log_group, &alert.region).verbose(self.settings.verbose);

        info!(
            log_group = %log_group,
            region = %alert.region,
            start = ?window.start,
            end = ?window.end,
            "searching error lines"
        );
        let query = FetchQuery::new(&log_group)
            .with_pattern(ERROR_PATTERN)
            .with_window(window);
        let error_records = extractor.extract_all(self.fetcher.fetch_all(&query, cancel).await?);

        let error_csv = self.csv_path(alert, &window, "ERROR");
        write_records(&error_csv, &error_records)?;

        let ids: Vec<&str> = error_records
            .iter()
            .map(|r| r.correlation_id.as_str())
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            warn!(log_group = %log_group, "no request ids in error lines, skipping full logs");
            return Ok(TriageOutcome {
                window,
                error_count: error_records.len(),
                error_csv,
                full_count: 0,
                full_csv: None,
                classification: None,
            });
        }

        let full_events = self
            .fetcher
            .fetch_by_correlation_ids(&log_group, ids, window, cancel)
            .await?;
        let full_records = group_by_request(extractor.extract_all(full_events));
        let full_csv = self.csv_path(alert, &window, "FULL");
        write_records(&full_csv, &full_records)?;

        let classification = alert.subsystem().map(|subsystem| {
            let input: &[LogRecord] = if subsystem.uses_full_log() {
                &full_records
            } else {
                &error_records
            };
            let mut requests = RequestAggregator::aggregate(input.iter().cloned());
            requests.sort_records();
            ErrorClassifier::new(subsystem).classify(&mut requests)
        });

        Ok(TriageOutcome {
            window,
            error_count: error_records.len(),
            error_csv,
            full_count: full_records.len(),
            full_csv: Some(full_csv),
            classification,
        })
    }

    fn csv_path(&self, alert: &AlertDetail, window: &TimeWindow, kind: &str) -> PathBuf {
        let stamp = |t: Option<DateTime<Utc>>| {
            t.map(|t| t.format(FILE_TIME_FORMAT).to_string())
                .unwrap_or_default()
        };
        self.settings.data_dir.join(format!(
            "{}_{}_{}_{}_{}.csv",
            alert.function_name,
            alert.region,
            stamp(window.start),
            stamp(window.end),
            kind
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_io::read_records;
    use alertscope_cloudwatch::ReplaySource;
    use alertscope_types::StoreError;
    use chrono::TimeZone;
    use std::fs;

    fn alert(function: &str) -> AlertDetail {
        let alarm = Utc
            .with_ymd_and_hms(2024, 7, 20, 10, 30, 0)
            .unwrap()
            .fixed_offset();
        AlertDetail::new(function, alarm, "us-east-1")
    }

    fn ms(minute: u32, second: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 7, 20, 10, minute, second)
            .unwrap()
            .timestamp_millis()
    }

    fn replay_dir(function: &str, events: serde_json::Value) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let name = format!("$aws$lambda${}.json", function);
        fs::write(dir.path().join(name), events.to_string()).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_store_alert_end_to_end() {
        let function = "Env--1-StoreFunction";
        let replay = replay_dir(
            function,
            serde_json::json!({ "events": [
                { "timestamp": ms(26, 0), "message": "R1 ---START STORE LOGIC, body/event is {}", "logStreamName": "s" },
                { "timestamp": ms(26, 1), "message": "R1 [ERROR] Steam code: 9", "logStreamName": "s" },
                { "timestamp": ms(27, 0), "message": "R2 [INFO] fine", "logStreamName": "s" },
                { "timestamp": ms(28, 0), "message": "R3 [ERROR] mystery\r", "logStreamName": "s" },
                { "timestamp": ms(28, 5), "message": "R3 trailing info", "logStreamName": "s" },
                { "timestamp": ms(31, 0), "message": "R4 [ERROR] after the alarm", "logStreamName": "s" }
            ]}),
        );
        let data = tempfile::tempdir().unwrap();
        let settings = TriageSettings {
            data_dir: data.path().to_path_buf(),
            ..Default::default()
        };
        let pipeline = TriagePipeline::new(ReplaySource::new(replay.path()), settings);

        let outcome = pipeline
            .run(&alert(function), None, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.error_count, 2);
        assert_eq!(outcome.full_count, 4);
        assert_eq!(
            outcome.error_csv.file_name().unwrap().to_str().unwrap(),
            "Env--1-StoreFunction_us-east-1_20240720-102500_20240720-103000_ERROR.csv"
        );
        let full = read_records(outcome.full_csv.as_ref().unwrap(), None).unwrap();
        let ids: Vec<_> = full.iter().map(|r| r.correlation_id.as_str()).collect();
        assert_eq!(ids, vec!["R1", "R1", "R3", "R3"]);

        let result = outcome.classification.unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.count(StoreError::SteamCode9), 1);
        assert_eq!(result.count(StoreError::Unknown), 1);
    }

    #[tokio::test]
    async fn test_no_error_lines_skips_full_logs() {
        let function = "Env--1-LoginFunction";
        let replay = replay_dir(
            function,
            serde_json::json!([{ "timestamp": ms(28, 0), "message": "A [INFO] ok", "logStreamName": "s" }]),
        );
        let data = tempfile::tempdir().unwrap();
        let settings = TriageSettings {
            data_dir: data.path().to_path_buf(),
            ..Default::default()
        };
        let pipeline = TriagePipeline::new(ReplaySource::new(replay.path()), settings);

        let outcome = pipeline
            .run(&alert(function), None, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.error_count, 0);
        assert_eq!(outcome.full_count, 0);
        assert!(outcome.full_csv.is_none());
        assert!(outcome.classification.is_none());
        assert!(outcome.error_csv.exists());
    }

    #[tokio::test]
    async fn test_explicit_window_overrides_alarm() {
        let pipeline = TriagePipeline::new(
            ReplaySource::new("/nonexistent"),
            TriageSettings::default(),
        );
        let start = Utc.with_ymd_and_hms(2024, 7, 20, 9, 0, 0).unwrap();
        let window = pipeline.window_for(&alert("F"), Some(start), None);
        assert_eq!(window.start, Some(start));
        assert_eq!(
            window.end,
            Some(Utc.with_ymd_and_hms(2024, 7, 20, 10, 30, 0).unwrap())
        );

        let window = pipeline.window_for(&alert("F"), None, None);
        assert_eq!(
            window.start,
            Some(Utc.with_ymd_and_hms(2024, 7, 20, 10, 25, 0).unwrap())
        );
    }
}
