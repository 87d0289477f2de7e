use std::collections::BTreeSet;

use alertscope_types::{RawLogEvent, complete_log_group_name};
use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::source::{FilterLogEventsRequest, LogEventSource};

/// Upper bound on the length of one filter pattern accepted by the query API
pub const MAX_FILTER_PATTERN_LEN: usize = 1024;

/// Time bounds of a query; `[start, end)`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// No bounds at all
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// The `span` leading up to `end`
    pub fn ending_at(end: DateTime<Utc>, span: Duration) -> Self {
        Self {
            start: Some(end - span),
            end: Some(end),
        }
    }

    pub fn start_ms(&self) -> Option<i64> {
        self.start.map(|t| t.timestamp_millis())
    }

    pub fn end_ms(&self) -> Option<i64> {
        self.end.map(|t| t.timestamp_millis())
    }
}

/// What to fetch
#[derive(Clone, Debug)]
pub struct FetchQuery {
    pub log_group: String,
    pub filter_pattern: Option<String>,
    pub window: TimeWindow,

    /// Stop after the first page that carries events
    pub stop_on_first_match: bool,
}

impl FetchQuery {
    /// Create a query; bare function names get the Lambda log group prefix
    pub fn new(log_group: &str) -> Self {
        Self {
            log_group: complete_log_group_name(log_group),
            filter_pattern: None,
            window: TimeWindow::unbounded(),
            stop_on_first_match: false,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        self.filter_pattern = if pattern.is_empty() {
            None
        } else {
            Some(pattern)
        };
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn stop_on_first_match(mut self, stop: bool) -> Self {
        self.stop_on_first_match = stop;
        self
    }

    fn request(&self, next_token: Option<String>) -> FilterLogEventsRequest {
        FilterLogEventsRequest {
            log_group_name: self.log_group.clone(),
            filter_pattern: self.filter_pattern.clone(),
            start_time: self.window.start_ms(),
            end_time: self.window.end_ms(),
            next_token,
        }
    }
}

/// Paginates filter queries against a log event source
pub struct LogEventFetcher<S> {
    source: S,
}

impl<S: LogEventSource> LogEventFetcher<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch every matching event, following pagination tokens
    pub async fn fetch_all(
        &self,
        query: &FetchQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawLogEvent>, SourceError> {
        self.fetch_with_progress(query, cancel, |_| {}).await
    }

    /// Like `fetch_all`, reporting each page as it arrives
    pub async fn fetch_with_progress<F>(
        &self,
        query: &FetchQuery,
        cancel: &CancellationToken,
        mut on_page: F,
    ) -> Result<Vec<RawLogEvent>, SourceError>
    where
        F: FnMut(&[RawLogEvent]) + Send,
    {
        let mut events = Vec::new();
        self.for_each_page(query, cancel, |page| {
            on_page(page.as_slice());
            events.extend(page);
        })
        .await?;
        Ok(events)
    }

    /// Hand every page to `on_page` without keeping it; returns the number of events seen
    pub async fn for_each_page<F>(
        &self,
        query: &FetchQuery,
        cancel: &CancellationToken,
        mut on_page: F,
    ) -> Result<usize, SourceError>
    where
        F: FnMut(Vec<RawLogEvent>) + Send,
    {
        let mut seen = 0usize;
        let mut next_token = None;
        let mut pages = 0usize;

        loop {
            if cancel.is_cancelled() {
                debug!(log_group = %query.log_group, pages, "fetch cancelled");
                break;
            }

            let page = self
                .source
                .filter_log_events(&query.request(next_token.take()))
                .await?;
            pages += 1;
            debug!(
                log_group = %query.log_group,
                page = pages,
                events = page.events.len(),
                "fetched page"
            );

            let has_events = !page.events.is_empty();
            seen += page.events.len();
            on_page(page.events);

            if query.stop_on_first_match && has_events {
                break;
            }
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        Ok(seen)
    }

    /// Fetch the complete logs of the given requests, one query per id batch
    pub async fn fetch_by_correlation_ids<I, T>(
        &self,
        log_group: &str,
        ids: I,
        window: TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawLogEvent>, SourceError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let patterns = correlation_id_patterns(ids);
        info!(log_group, batches = patterns.len(), "fetching full request logs");

        let mut events = Vec::new();
        for pattern in patterns {
            let query = FetchQuery::new(log_group)
                .with_pattern(pattern)
                .with_window(window);
            events.extend(self.fetch_all(&query, cancel).await?);
        }
        Ok(events)
    }
}

/// Batch correlation ids into `%a|b|c%` regex filter patterns within the length limit
pub fn correlation_id_patterns<I, T>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    // Room left for the surrounding `%` pair
    let limit = MAX_FILTER_PATTERN_LEN - 2;

    let unique: BTreeSet<String> = ids
        .into_iter()
        .map(|id| id.as_ref().to_string())
        .filter(|id| !id.is_empty())
        .collect();

    let mut batches = Vec::new();
    let mut current = String::new();
    for id in unique {
        let escaped = regex::escape(&id);
        if escaped.len() >= limit {
            warn!(len = escaped.len(), "correlation id too long for a filter pattern, skipped");
            continue;
        }
        if current.is_empty() {
            current = escaped;
        } else if current.len() + escaped.len() + 1 < limit {
            current.push('|');
            current.push_str(&escaped);
        } else {
            batches.push(std::mem::replace(&mut current, escaped));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }

    batches.into_iter().map(|b| format!("%{}%", b)).collect()
}
