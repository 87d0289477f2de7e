use std::future::Future;
use std::sync::Arc;

use alertscope_types::RawLogEvent;

use crate::error::SourceError;

/// Parameters of one `FilterLogEvents` call
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterLogEventsRequest {
    pub log_group_name: String,
    pub filter_pattern: Option<String>,

    /// Inclusive lower bound in ms since the epoch
    pub start_time: Option<i64>,

    /// Exclusive upper bound in ms since the epoch
    pub end_time: Option<i64>,

    pub next_token: Option<String>,
}

/// One page of results
#[derive(Clone, Debug, Default)]
pub struct FilterLogEventsPage {
    pub events: Vec<RawLogEvent>,
    pub next_token: Option<String>,
}

/// Backend able to answer log filter queries
pub trait LogEventSource: Send + Sync {
    fn filter_log_events(
        &self,
        request: &FilterLogEventsRequest,
    ) -> impl Future<Output = Result<FilterLogEventsPage, SourceError>> + Send;
}

impl<S: LogEventSource> LogEventSource for Arc<S> {
    fn filter_log_events(
        &self,
        request: &FilterLogEventsRequest,
    ) -> impl Future<Output = Result<FilterLogEventsPage, SourceError>> + Send {
        self.as_ref().filter_log_events(request)
    }
}
