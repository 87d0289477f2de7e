use std::collections::HashMap;
use std::sync::LazyLock;

use alertscope_types::{LogRecord, RequestDetail};
use regex::Regex;

static CALLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__CallerId': '(.*?)'").expect("caller regex"));

static BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)START .*? LOGIC.*?body/event is (.*)$").expect("body regex")
});

/// Echo of a GraphQL error already logged by the same request
pub fn is_duplicate_trace(message: &str) -> bool {
    message.contains("graphql_manager_base") && message.contains("Errors Trace back")
}

/// Requests keyed by correlation id, in first-seen order
#[derive(Clone, Debug, Default)]
pub struct RequestSet {
    requests: Vec<RequestDetail>,
    index: HashMap<String, usize>,
}

impl RequestSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RequestDetail> {
        self.index.get(id).map(|&i| &self.requests[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequestDetail> {
        self.requests.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RequestDetail> {
        self.requests.iter_mut()
    }

    /// Correlation ids in first-seen order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.requests.iter().map(|r| r.id.as_str())
    }

    /// Every record of every request
    pub fn records(&self) -> impl Iterator<Item = &LogRecord> {
        self.requests.iter().flat_map(|r| r.records.iter())
    }

    /// Put each request's records in chronological order
    pub fn sort_records(&mut self) {
        for request in &mut self.requests {
            request.sort_records();
        }
    }

    pub fn into_vec(self) -> Vec<RequestDetail> {
        self.requests
    }

    fn entry(&mut self, record: &LogRecord) -> &mut RequestDetail {
        let next = self.requests.len();
        let i = *self
            .index
            .entry(record.correlation_id.clone())
            .or_insert(next);
        if i == next {
            self.requests
                .push(RequestDetail::new(record.correlation_id.clone(), record.timestamp));
        }
        &mut self.requests[i]
    }
}

/// Folds log records into request timelines
pub struct RequestAggregator;

impl RequestAggregator {
    /// Group records by correlation id
    pub fn aggregate<I>(records: I) -> RequestSet
    where
        I: IntoIterator<Item = LogRecord>,
    {
        let mut set = RequestSet::new();
        for record in records {
            Self::fold(&mut set, record);
        }
        set
    }

    /// Fold one record into its request
    pub fn fold(set: &mut RequestSet, record: LogRecord) {
        if is_duplicate_trace(&record.message) {
            return;
        }

        let caller = CALLER_RE
            .captures(&record.message)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        let body = BODY_RE
            .captures(&record.message)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        let request = set.entry(&record);
        if request.caller.is_none() {
            request.caller = caller;
        }
        if body.is_some() {
            request.body = body;
        }
        request.push(record);
    }
}

/// Order records into per-request chronological blocks
///
/// Blocks follow the first appearance of each correlation id in time order.
pub fn group_by_request(mut records: Vec<LogRecord>) -> Vec<LogRecord> {
    records.sort_by_key(|r| r.timestamp);

    let mut first_seen: HashMap<String, usize> = HashMap::new();
    for record in &records {
        let next = first_seen.len();
        first_seen.entry(record.correlation_id.clone()).or_insert(next);
    }

    records.sort_by_key(|r| (first_seen[&r.correlation_id], r.timestamp));
    records
}
