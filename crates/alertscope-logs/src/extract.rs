use alertscope_cloudwatch::urls::log_event_url;
use alertscope_types::{LogRecord, RawLogEvent};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Normalizes raw events of one log group into log records
#[derive(Clone, Debug)]
pub struct LogExtractor {
    log_group: String,
    region: String,

    /// Log each message before and after normalization
    verbose: bool,
}

impl LogExtractor {
    pub fn new(log_group: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            log_group: log_group.into(),
            region: region.into(),
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Convert one event
    pub fn extract(&self, event: RawLogEvent) -> LogRecord {
        let unfolded = event.message.replace('\r', " ");
        let correlation_id = unfolded.split(' ').next().unwrap_or_default().to_string();
        let message = unfolded.trim().to_string();

        if self.verbose {
            debug!(before = %event.message.trim(), after = %message, "normalized message");
        }

        let timestamp = DateTime::<Utc>::from_timestamp_millis(event.timestamp).unwrap_or_default();
        let source_link = log_event_url(&self.region, &self.log_group, &event);

        LogRecord::new(timestamp, correlation_id, message, source_link).with_raw(event)
    }

    /// Convert a batch, keeping order
    pub fn extract_all(&self, events: Vec<RawLogEvent>) -> Vec<LogRecord> {
        events.into_iter().map(|e| self.extract(e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> LogExtractor {
        LogExtractor::new("/aws/lambda/Env--1-StoreFunction", "us-east-1")
    }

    #[test]
    fn test_extract_basic() {
        let event = RawLogEvent::new(1721471340123, "ABC123 [ERROR] boom\r\n").with_stream("s");
        let record = extractor().extract(event);

        assert_eq!(record.correlation_id, "ABC123");
        assert_eq!(record.message, "ABC123 [ERROR] boom");
        assert_eq!(record.timestamp.timestamp_millis(), 1721471340123);
        assert!(record.source_link.contains("/log-events/s$3Fstart$3D1721471340123"));
        assert!(record.raw.is_some());
        assert!(record.is_error());
    }

    #[test]
    fn test_carriage_returns_become_spaces() {
        let record = extractor().extract(RawLogEvent::new(0, "X1\rline two\rline three"));
        assert_eq!(record.correlation_id, "X1");
        assert_eq!(record.message, "X1 line two line three");
    }

    #[test]
    fn test_degenerate_messages() {
        let record = extractor().extract(RawLogEvent::new(0, ""));
        assert_eq!(record.correlation_id, "");
        assert_eq!(record.message, "");

        // The id is taken before trimming
        let record = extractor().extract(RawLogEvent::new(0, " leading space"));
        assert_eq!(record.correlation_id, "");
        assert_eq!(record.message, "leading space");
    }

    #[test]
    fn test_out_of_range_timestamp_falls_back_to_epoch() {
        let record = extractor().extract(RawLogEvent::new(i64::MAX, "A x"));
        assert_eq!(record.timestamp.timestamp_millis(), 0);
    }
}
