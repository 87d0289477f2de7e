//! Multi-region log search
//!
//! One tokio task per (log group, region) pair. Every worker owns the sending
//! half of its own channel; a single aggregator merges all channels, keeps the
//! latest status of each worker and renders snapshots on a fixed interval.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use alertscope_cloudwatch::{FetchQuery, LogEventFetcher, LogEventSource, SourceError, TimeWindow};
use alertscope_types::{LogRecord, RawLogEvent, complete_log_group_name, region_abbr};
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use unicode_width::UnicodeWidthStr;

use crate::error::SearchError;
use crate::extract::LogExtractor;

/// Default interval between progress snapshots
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(10);

/// Order of the merged results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            other => Err(format!("unknown sort order '{}', expected asc or desc", other)),
        }
    }
}

/// One log group in one region
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SearchTarget {
    pub log_group: String,
    pub region: String,
}

impl SearchTarget {
    pub fn new(log_group: &str, region: impl Into<String>) -> Self {
        Self {
            log_group: complete_log_group_name(log_group),
            region: region.into(),
        }
    }

    /// `<log group> <region abbreviation>`
    pub fn key(&self) -> String {
        format!(
            "{} {}",
            self.log_group,
            region_abbr(&self.region).unwrap_or(&self.region)
        )
    }
}

/// Parameters of one search run
#[derive(Clone, Debug)]
pub struct SearchRequest {
    pub targets: Vec<SearchTarget>,
    pub pattern: Option<String>,
    pub window: TimeWindow,
    pub stop_on_first_match: bool,
    pub sort_order: SortOrder,

    /// Run workers one after another instead of all at once
    pub sequential: bool,

    /// Interval between progress snapshots
    pub refresh: Duration,
}

impl SearchRequest {
    /// Every log group in every region; duplicates are dropped
    pub fn new<G, R>(log_groups: G, regions: R) -> Self
    where
        G: IntoIterator,
        G::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        let regions: Vec<String> = regions
            .into_iter()
            .map(|r| r.as_ref().to_string())
            .collect();

        let mut seen = BTreeSet::new();
        let mut targets = Vec::new();
        for group in log_groups {
            for region in &regions {
                let target = SearchTarget::new(group.as_ref(), region.as_str());
                if seen.insert(target.key()) {
                    targets.push(target);
                }
            }
        }

        Self {
            targets,
            pattern: None,
            window: TimeWindow::unbounded(),
            stop_on_first_match: false,
            sort_order: SortOrder::Ascending,
            sequential: false,
            refresh: DEFAULT_REFRESH,
        }
    }

    pub fn with_pattern(mut self, pattern: Option<String>) -> Self {
        self.pattern = pattern.filter(|p| !p.is_empty());
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

    pub fn with_sort_order(mut self, order: SortOrder) -> Self {
        self.sort_order = order;
        self
    }

    pub fn sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh.max(Duration::from_millis(1));
        self
    }

    fn query(&self, target: &SearchTarget) -> FetchQuery {
        FetchQuery::new(&target.log_group)
            .with_pattern(self.pattern.clone().unwrap_or_default())
            .with_window(self.window)
            .stop_on_first_match(self.stop_on_first_match)
    }
}

/// Message from a worker to the aggregator
#[derive(Clone, Debug)]
pub enum SearchUpdate {
    Started {
        key: String,
    },
    Page {
        key: String,
        events: Vec<RawLogEvent>,
    },
    Finished {
        key: String,
    },
    Failed {
        key: String,
        error: String,
        expired_token: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Pending,
    Running,
    Done,
    Failed(String),
}

/// Latest known progress of one worker
#[derive(Clone, Debug)]
pub struct WorkerStatus {
    pub key: String,
    pub state: WorkerState,
    pub pages: usize,
    pub hits: usize,
    started: Option<Instant>,
    pub elapsed: Option<Duration>,
}

impl WorkerStatus {
    fn new(key: String) -> Self {
        Self {
            key,
            state: WorkerState::Pending,
            pages: 0,
            hits: 0,
            started: None,
            elapsed: None,
        }
    }

    fn stop_clock(&mut self) {
        self.elapsed = self.started.map(|t| t.elapsed());
    }

    fn describe(&self) -> String {
        match &self.state {
            WorkerState::Pending => "等待".to_string(),
            WorkerState::Running if self.pages == 0 => "开始".to_string(),
            WorkerState::Running => format!("进行中 页数：{} 命中：{}", self.pages, self.hits),
            WorkerState::Done => format!(
                "完成。耗时：{:.1}s 命中：{}",
                self.elapsed.unwrap_or_default().as_secs_f64(),
                self.hits
            ),
            WorkerState::Failed(error) => format!("失败 {}", error),
        }
    }
}

/// Point-in-time view of every worker, in target order
#[derive(Clone, Debug)]
pub struct SearchSnapshot {
    pub statuses: Vec<WorkerStatus>,
}

impl SearchSnapshot {
    pub fn is_complete(&self) -> bool {
        self.statuses
            .iter()
            .all(|s| matches!(s.state, WorkerState::Done | WorkerState::Failed(_)))
    }

    pub fn total_hits(&self) -> usize {
        self.statuses.iter().map(|s| s.hits).sum()
    }
}

impl fmt::Display for SearchSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .statuses
            .iter()
            .map(|s| s.key.width())
            .max()
            .unwrap_or(0);
        for status in &self.statuses {
            let pad = width.saturating_sub(status.key.width());
            writeln!(f, "{}:{} {}", status.key, " ".repeat(pad), status.describe())?;
        }
        Ok(())
    }
}

/// One matching log line
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub key: String,
    pub target: SearchTarget,
    pub record: LogRecord,
}

/// Everything a finished search produced
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    /// Hits ordered by timestamp per the requested sort order
    pub hits: Vec<SearchHit>,
    pub statuses: Vec<WorkerStatus>,

    /// Regions whose credentials need refreshing
    pub expired_regions: Vec<String>,
}

impl SearchOutcome {
    pub fn failed(&self) -> impl Iterator<Item = &WorkerStatus> {
        self.statuses
            .iter()
            .filter(|s| matches!(s.state, WorkerState::Failed(_)))
    }
}

/// Aggregator-owned state; the only place worker progress is written
struct Progress {
    statuses: Vec<WorkerStatus>,
    index: HashMap<String, usize>,
    targets: HashMap<String, (SearchTarget, LogExtractor)>,
    hits: Vec<SearchHit>,
    expired_regions: BTreeSet<String>,
}

impl Progress {
    fn new(targets: &[SearchTarget]) -> Self {
        let mut progress = Self {
            statuses: Vec::with_capacity(targets.len()),
            index: HashMap::new(),
            targets: HashMap::new(),
            hits: Vec::new(),
            expired_regions: BTreeSet::new(),
        };
        for target in targets {
            let key = target.key();
            progress.index.insert(key.clone(), progress.statuses.len());
            progress.statuses.push(WorkerStatus::new(key.clone()));
            let extractor = LogExtractor::new(&target.log_group, &target.region);
            progress.targets.insert(key, (target.clone(), extractor));
        }
        progress
    }

    fn status_mut(&mut self, key: &str) -> Option<&mut WorkerStatus> {
        self.index.get(key).map(|&i| &mut self.statuses[i])
    }

    fn apply(&mut self, update: SearchUpdate) {
        match update {
            SearchUpdate::Started { key } => {
                if let Some(status) = self.status_mut(&key) {
                    status.state = WorkerState::Running;
                    status.started = Some(Instant::now());
                }
            }
            SearchUpdate::Page { key, events } => {
                let count = events.len();
                if let Some((target, extractor)) = self.targets.get(&key) {
                    self.hits.extend(events.into_iter().map(|event| SearchHit {
                        key: key.clone(),
                        target: target.clone(),
                        record: extractor.extract(event),
                    }));
                }
                if let Some(status) = self.status_mut(&key) {
                    status.pages += 1;
                    status.hits += count;
                }
            }
            SearchUpdate::Finished { key } => {
                if let Some(status) = self.status_mut(&key) {
                    status.state = WorkerState::Done;
                    status.stop_clock();
                    info!(key = %key, hits = status.hits, "search worker finished");
                }
            }
            SearchUpdate::Failed {
                key,
                error,
                expired_token,
            } => {
                if expired_token {
                    if let Some((target, _)) = self.targets.get(&key) {
                        self.expired_regions.insert(target.region.clone());
                    }
                }
                if let Some(status) = self.status_mut(&key) {
                    status.state = WorkerState::Failed(error);
                    status.stop_clock();
                }
            }
        }
    }

    fn snapshot(&self) -> SearchSnapshot {
        SearchSnapshot {
            statuses: self.statuses.clone(),
        }
    }

    /// Merge the worker channels until every sender is gone
    async fn drain<P>(
        &mut self,
        receivers: Vec<mpsc::UnboundedReceiver<SearchUpdate>>,
        refresh: Duration,
        on_snapshot: &mut P,
    ) where
        P: FnMut(&SearchSnapshot),
    {
        let mut updates = stream::select_all(receivers.into_iter().map(|rx| {
            Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|update| (update, rx))
            }))
        }));

        let mut ticker = tokio::time::interval(refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                update = updates.next() => match update {
                    Some(update) => self.apply(update),
                    None => break,
                },
                _ = ticker.tick() => on_snapshot(&self.snapshot()),
            }
        }
    }

    fn finish(self, order: SortOrder) -> SearchOutcome {
        let mut hits = self.hits;
        match order {
            SortOrder::Ascending => hits.sort_by_key(|h| h.record.timestamp),
            SortOrder::Descending => {
                hits.sort_by(|a, b| b.record.timestamp.cmp(&a.record.timestamp))
            }
        }
        SearchOutcome {
            hits,
            statuses: self.statuses,
            expired_regions: self.expired_regions.into_iter().collect(),
        }
    }
}

/// Runs searches across log groups and regions
pub struct SearchManager {
    cancel: CancellationToken,
}

impl SearchManager {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops every worker at its next page boundary
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Search every target, calling `on_snapshot` on each refresh and once at the end
    ///
    /// `connect` builds the source for a target; a failure marks that worker failed.
    pub async fn run<S, F, P>(
        &self,
        request: &SearchRequest,
        connect: F,
        mut on_snapshot: P,
    ) -> Result<SearchOutcome, SearchError>
    where
        S: LogEventSource + 'static,
        F: Fn(&SearchTarget) -> Result<S, SourceError>,
        P: FnMut(&SearchSnapshot),
    {
        if request.targets.is_empty() {
            return Err(SearchError::NoTargets);
        }

        let mut progress = Progress::new(&request.targets);
        if request.sequential {
            for target in &request.targets {
                let (handle, rx) = self.spawn_worker(request, target, &connect);
                progress
                    .drain(vec![rx], request.refresh, &mut on_snapshot)
                    .await;
                join(handle).await?;
            }
        } else {
            let (handles, receivers): (Vec<_>, Vec<_>) = request
                .targets
                .iter()
                .map(|target| self.spawn_worker(request, target, &connect))
                .unzip();
            progress
                .drain(receivers, request.refresh, &mut on_snapshot)
                .await;
            for handle in handles {
                join(handle).await?;
            }
        }

        on_snapshot(&progress.snapshot());
        Ok(progress.finish(request.sort_order))
    }

    fn spawn_worker<S, F>(
        &self,
        request: &SearchRequest,
        target: &SearchTarget,
        connect: &F,
    ) -> (Option<JoinHandle<()>>, mpsc::UnboundedReceiver<SearchUpdate>)
    where
        S: LogEventSource + 'static,
        F: Fn(&SearchTarget) -> Result<S, SourceError>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = target.key();

        let source = match connect(target) {
            Ok(source) => source,
            Err(e) => {
                warn!(key = %key, error = %e, "could not create log source");
                let _ = tx.send(SearchUpdate::Failed {
                    key,
                    expired_token: e.is_expired_token(),
                    error: e.to_string(),
                });
                return (None, rx);
            }
        };

        let query = request.query(target);
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let _ = tx.send(SearchUpdate::Started { key: key.clone() });

            let fetcher = LogEventFetcher::new(source);
            let result = fetcher
                .for_each_page(&query, &cancel, |events| {
                    let _ = tx.send(SearchUpdate::Page {
                        key: key.clone(),
                        events,
                    });
                })
                .await;

            let update = match result {
                Ok(_) => SearchUpdate::Finished { key },
                Err(e) => {
                    warn!(key = %key, error = %e, "search worker failed");
                    SearchUpdate::Failed {
                        key,
                        expired_token: e.is_expired_token(),
                        error: e.to_string(),
                    }
                }
            };
            let _ = tx.send(update);
        });
        debug!(key = %target.key(), "spawned search worker");

        (Some(handle), rx)
    }
}

impl Default for SearchManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn join(handle: Option<JoinHandle<()>>) -> Result<(), SearchError> {
    match handle {
        Some(handle) => handle.await.map_err(|e| SearchError::Join(e.to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertscope_cloudwatch::{FilterLogEventsPage, FilterLogEventsRequest};

    /// One event per page; fails when built with an error message
    struct MemorySource {
        events: Vec<RawLogEvent>,
        error: Option<String>,
    }

    impl LogEventSource for MemorySource {
        async fn filter_log_events(
            &self,
            request: &FilterLogEventsRequest,
        ) -> Result<FilterLogEventsPage, SourceError> {
            if let Some(message) = &self.error {
                return Err(SourceError::from_service_message(message.clone()));
            }
            let index: usize = request
                .next_token
                .as_deref()
                .map(|t| t.parse().unwrap())
                .unwrap_or(0);
            let next_token = (index + 1 < self.events.len()).then(|| (index + 1).to_string());
            Ok(FilterLogEventsPage {
                events: self.events.get(index).cloned().into_iter().collect(),
                next_token,
            })
        }
    }

    fn connect(target: &SearchTarget) -> Result<MemorySource, SourceError> {
        let base = if target.region == "us-east-1" { 100 } else { 200 };
        Ok(MemorySource {
            events: (0..3)
                .map(|i| RawLogEvent::new(base + i * 10, format!("{} hit {}", target.region, i)))
                .collect(),
            error: None,
        })
    }

    fn request() -> SearchRequest {
        SearchRequest::new(["Env--1-StoreFunction"], ["us-east-1", "ap-northeast-1"])
            .with_refresh(Duration::from_millis(5))
    }

    #[test]
    fn test_targets_and_keys() {
        let request = SearchRequest::new(
            ["A", "/aws/lambda/A", "B"],
            ["cn-northwest-1", "eu-west-3"],
        );
        let keys: Vec<_> = request.targets.iter().map(|t| t.key()).collect();
        assert_eq!(
            keys,
            vec![
                "/aws/lambda/A NX",
                "/aws/lambda/A eu-west-3",
                "/aws/lambda/B NX",
                "/aws/lambda/B eu-west-3",
            ]
        );
    }

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!("asc".parse::<SortOrder>(), Ok(SortOrder::Ascending));
        assert_eq!("DESC".parse::<SortOrder>(), Ok(SortOrder::Descending));
        assert!("up".parse::<SortOrder>().is_err());
    }

    #[tokio::test]
    async fn test_parallel_search_merges_all_workers() {
        let manager = SearchManager::new();
        let mut snapshots = Vec::new();
        let outcome = manager
            .run(&request(), connect, |s| snapshots.push(s.clone()))
            .await
            .unwrap();

        let ts: Vec<_> = outcome
            .hits
            .iter()
            .map(|h| h.record.timestamp.timestamp_millis())
            .collect();
        assert_eq!(ts, vec![100, 110, 120, 200, 210, 220]);
        assert!(outcome.statuses.iter().all(|s| s.state == WorkerState::Done));
        assert!(outcome.statuses.iter().all(|s| s.pages == 3 && s.hits == 3));
        assert_eq!(outcome.hits[0].key, "/aws/lambda/Env--1-StoreFunction US");

        let last = snapshots.last().unwrap();
        assert!(last.is_complete());
        assert_eq!(last.total_hits(), 6);
    }

    #[tokio::test]
    async fn test_descending_and_sequential() {
        let manager = SearchManager::new();
        let request = request()
            .with_sort_order(SortOrder::Descending)
            .sequential(true);
        let outcome = manager.run(&request, connect, |_| {}).await.unwrap();
        let ts: Vec<_> = outcome
            .hits
            .iter()
            .map(|h| h.record.timestamp.timestamp_millis())
            .collect();
        assert_eq!(ts, vec![220, 210, 200, 120, 110, 100]);
    }

    #[tokio::test]
    async fn test_stop_on_first_match() {
        let manager = SearchManager::new();
        let request = request().stop_on_first_match(true);
        let outcome = manager.run(&request, connect, |_| {}).await.unwrap();
        assert_eq!(outcome.hits.len(), 2);
        assert!(outcome.statuses.iter().all(|s| s.pages == 1));
    }

    #[tokio::test]
    async fn test_failures_are_per_worker() {
        let manager = SearchManager::new();
        let outcome = manager
            .run(
                &request(),
                |target: &SearchTarget| {
                    if target.region == "ap-northeast-1" {
                        Ok(MemorySource {
                            events: Vec::new(),
                            error: Some("The security token included in the request is expired".into()),
                        })
                    } else {
                        connect(target)
                    }
                },
                |_| {},
            )
            .await
            .unwrap();

        assert_eq!(outcome.hits.len(), 3);
        assert_eq!(outcome.expired_regions, vec!["ap-northeast-1".to_string()]);
        assert_eq!(outcome.failed().count(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_marks_worker_failed() {
        let manager = SearchManager::new();
        let outcome = manager
            .run(
                &request(),
                |_: &SearchTarget| -> Result<MemorySource, SourceError> {
                    Err(SourceError::Service("no credentials".into()))
                },
                |_| {},
            )
            .await
            .unwrap();
        assert!(outcome.hits.is_empty());
        assert_eq!(outcome.failed().count(), 2);
        assert!(outcome.expired_regions.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let manager = SearchManager::new();
        manager.cancel();
        let outcome = manager.run(&request(), connect, |_| {}).await.unwrap();
        assert!(outcome.hits.is_empty());
        assert!(outcome.statuses.iter().all(|s| s.state == WorkerState::Done));
    }

    #[tokio::test]
    async fn test_no_targets() {
        let manager = SearchManager::new();
        let request = SearchRequest::new(Vec::<String>::new(), ["us-east-1"]);
        assert!(matches!(
            manager.run(&request, connect, |_| {}).await,
            Err(SearchError::NoTargets)
        ));
    }

    #[test]
    fn test_snapshot_rendering() {
        let mut progress = Progress::new(&[
            SearchTarget::new("Fn", "us-east-1"),
            SearchTarget::new("LongerFn", "eu-west-3"),
        ]);
        progress.apply(SearchUpdate::Started {
            key: "/aws/lambda/Fn US".into(),
        });
        progress.apply(SearchUpdate::Page {
            key: "/aws/lambda/Fn US".into(),
            events: vec![RawLogEvent::new(1, "a"), RawLogEvent::new(2, "b")],
        });
        progress.apply(SearchUpdate::Failed {
            key: "/aws/lambda/LongerFn eu-west-3".into(),
            error: "boom".into(),
            expired_token: false,
        });

        let text = progress.snapshot().to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[0],
            format!("/aws/lambda/Fn US:{} 进行中 页数：1 命中：2", " ".repeat(13))
        );
        assert_eq!(lines[1], "/aws/lambda/LongerFn eu-west-3: 失败 boom");
    }
}
