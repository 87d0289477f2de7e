//! Offline log event source
//!
//! Serves events captured with `aws logs filter-log-events --output json`.
//! Each `*.json` file under the directory is either a full response
//! (`{"events": [...]}`) or a bare array of events. The log group comes from the
//! response's `logGroupName` field when present, otherwise from the file stem with
//! `$` standing for `/` and anything after `@` ignored
//! (`$aws$lambda$Fn@part2.json` -> `/aws/lambda/Fn`).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use alertscope_types::{RawLogEvent, complete_log_group_name};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::SourceError;
use crate::pattern::FilterPattern;
use crate::source::{FilterLogEventsPage, FilterLogEventsRequest, LogEventSource};

type EventIndex = HashMap<String, Vec<RawLogEvent>>;

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplayFile {
    Response {
        #[serde(rename = "logGroupName", default)]
        log_group_name: Option<String>,
        events: Vec<RawLogEvent>,
    },
    Events(Vec<RawLogEvent>),
}

/// Log event source backed by captured JSON files
pub struct ReplaySource {
    dir: PathBuf,
    page_size: usize,

    /// Loaded on first query, shared by all concurrent readers
    index: RwLock<Option<Arc<EventIndex>>>,
}

impl ReplaySource {
    pub const DEFAULT_PAGE_SIZE: usize = 1000;

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            page_size: Self::DEFAULT_PAGE_SIZE,
            index: RwLock::new(None),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every log group with captured events
    pub fn log_groups(&self) -> Result<Vec<String>, SourceError> {
        let mut groups: Vec<String> = self.index()?.keys().cloned().collect();
        groups.sort();
        Ok(groups)
    }

    fn index(&self) -> Result<Arc<EventIndex>, SourceError> {
        if let Some(index) = self.index.read().as_ref() {
            return Ok(Arc::clone(index));
        }

        let mut slot = self.index.write();
        if let Some(index) = slot.as_ref() {
            return Ok(Arc::clone(index));
        }
        let loaded = Arc::new(load_dir(&self.dir)?);
        *slot = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    fn query(&self, request: &FilterLogEventsRequest) -> Result<FilterLogEventsPage, SourceError> {
        let index = self.index()?;
        let log_group = complete_log_group_name(&request.log_group_name);
        let events = index.get(&log_group).ok_or_else(|| {
            SourceError::Service(format!(
                "ResourceNotFoundException: The specified log group does not exist: {}",
                log_group
            ))
        })?;

        let pattern = FilterPattern::parse(request.filter_pattern.as_deref().unwrap_or(""))?;
        let offset = match request.next_token.as_deref() {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| SourceError::InvalidToken(token.to_string()))?,
            None => 0,
        };

        let matching: Vec<&RawLogEvent> = events
            .iter()
            .filter(|e| request.start_time.is_none_or(|start| e.timestamp >= start))
            .filter(|e| request.end_time.is_none_or(|end| e.timestamp < end))
            .filter(|e| pattern.matches(&e.message))
            .collect();

        let page: Vec<RawLogEvent> = matching
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|e| (*e).clone())
            .collect();
        let consumed = offset + page.len();
        let next_token = (consumed < matching.len()).then(|| consumed.to_string());

        debug!(
            log_group = %log_group,
            offset,
            returned = page.len(),
            total = matching.len(),
            "replay page"
        );

        Ok(FilterLogEventsPage {
            events: page,
            next_token,
        })
    }
}

impl LogEventSource for ReplaySource {
    async fn filter_log_events(
        &self,
        request: &FilterLogEventsRequest,
    ) -> Result<FilterLogEventsPage, SourceError> {
        self.query(request)
    }
}

/// Log group for a file stem (`$aws$lambda$Fn@2` -> `/aws/lambda/Fn`)
fn log_group_from_stem(stem: &str) -> String {
    let name = stem.split('@').next().unwrap_or(stem).replace('$', "/");
    complete_log_group_name(&name)
}

fn load_dir(dir: &Path) -> Result<EventIndex, SourceError> {
    let io_err = |source| SourceError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_err)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut index = EventIndex::new();
    for path in &paths {
        let content = fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        let file: ReplayFile =
            serde_json::from_str(&content).map_err(|source| SourceError::Json {
                path: path.clone(),
                source,
            })?;

        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let (log_group, events) = match file {
            ReplayFile::Response {
                log_group_name: Some(name),
                events,
            } => (complete_log_group_name(&name), events),
            ReplayFile::Response { events, .. } | ReplayFile::Events(events) => {
                (log_group_from_stem(stem), events)
            }
        };
        index.entry(log_group).or_default().extend(events);
    }

    for events in index.values_mut() {
        events.sort_by_key(|e| e.timestamp);
    }

    info!(
        dir = %dir.display(),
        files = paths.len(),
        log_groups = index.len(),
        "loaded replay captures"
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{FetchQuery, LogEventFetcher, TimeWindow};
    use chrono::DateTime;
    use tokio_util::sync::CancellationToken;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    fn sample_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "$aws$lambda$Env--1-StoreFunction.json",
            r#"{"events": [
                {"logStreamName": "s1", "timestamp": 3000, "message": "B [ERROR] two", "eventId": "e3"},
                {"logStreamName": "s1", "timestamp": 1000, "message": "A [ERROR] one", "eventId": "e1"}
            ], "searchedLogStreams": []}"#,
        );
        write(
            dir.path(),
            "$aws$lambda$Env--1-StoreFunction@2.json",
            r#"[{"logStreamName": "s2", "timestamp": 2000, "message": "A [INFO] mid"}]"#,
        );
        write(
            dir.path(),
            "other.json",
            r#"{"logGroupName": "/aws/lambda/Env--1-LoginFunction",
                "events": [{"timestamp": 5, "message": "L hello"}]}"#,
        );
        write(dir.path(), "notes.txt", "ignored");
        dir
    }

    #[test]
    fn test_log_group_from_stem() {
        assert_eq!(log_group_from_stem("$aws$lambda$Fn@x"), "/aws/lambda/Fn");
        assert_eq!(log_group_from_stem("Fn"), "/aws/lambda/Fn");
        assert_eq!(log_group_from_stem("$ecs$svc"), "/ecs/svc");
    }

    #[test]
    fn test_loads_groups_from_stems_and_fields() {
        let dir = sample_dir();
        let source = ReplaySource::new(dir.path());
        assert_eq!(
            source.log_groups().unwrap(),
            vec![
                "/aws/lambda/Env--1-LoginFunction".to_string(),
                "/aws/lambda/Env--1-StoreFunction".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_window_pattern_and_order() {
        let dir = sample_dir();
        let fetcher = LogEventFetcher::new(ReplaySource::new(dir.path()));
        let window = TimeWindow::new(
            DateTime::from_timestamp_millis(1000),
            DateTime::from_timestamp_millis(3000),
        );
        let query = FetchQuery::new("Env--1-StoreFunction").with_window(window);
        let events = fetcher
            .fetch_all(&query, &CancellationToken::new())
            .await
            .unwrap();
        let ts: Vec<_> = events.iter().map(|e| e.timestamp).collect();
        assert_eq!(ts, vec![1000, 2000]);

        let query = FetchQuery::new("Env--1-StoreFunction").with_pattern(r"%\[ERROR\]%");
        let events = fetcher
            .fetch_all(&query, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_id.as_deref(), Some("e3"));
    }

    #[tokio::test]
    async fn test_pagination_returns_each_event_once() {
        let dir = tempfile::tempdir().unwrap();
        let events: Vec<String> = (0..25)
            .map(|i| format!(r#"{{"timestamp": {}, "message": "id{} x"}}"#, i, i))
            .collect();
        write(dir.path(), "Fn.json", &format!("[{}]", events.join(",")));

        let fetcher = LogEventFetcher::new(ReplaySource::new(dir.path()).with_page_size(7));
        let mut pages = 0;
        let events = fetcher
            .fetch_with_progress(&FetchQuery::new("Fn"), &CancellationToken::new(), |_| {
                pages += 1
            })
            .await
            .unwrap();
        assert_eq!(pages, 4);
        let ts: Vec<_> = events.iter().map(|e| e.timestamp).collect();
        assert_eq!(ts, (0..25).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_unknown_group_and_bad_token() {
        let dir = sample_dir();
        let source = ReplaySource::new(dir.path());
        let missing = FilterLogEventsRequest {
            log_group_name: "Nope".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            source.filter_log_events(&missing).await,
            Err(SourceError::Service(_))
        ));

        let bad = FilterLogEventsRequest {
            log_group_name: "Env--1-LoginFunction".to_string(),
            next_token: Some("abc".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            source.filter_log_events(&bad).await,
            Err(SourceError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_missing_dir_is_io_error() {
        let source = ReplaySource::new("/definitely/not/here");
        assert!(matches!(source.log_groups(), Err(SourceError::Io { .. })));
    }
}
