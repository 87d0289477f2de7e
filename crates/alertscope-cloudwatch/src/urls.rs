//! AWS console links

use alertscope_types::{RawLogEvent, complete_log_group_name, is_china_region};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// `https://<region>.console.<domain>` for the region's partition
pub fn console_base(region: &str) -> String {
    if is_china_region(region) {
        format!("https://{}.console.amazonaws.cn", region)
    } else {
        format!("https://{}.console.aws.amazon.com", region)
    }
}

/// Deep link to one event inside its log stream
pub fn log_event_url(region: &str, log_group: &str, event: &RawLogEvent) -> String {
    let log_group = complete_log_group_name(log_group);
    let mut url = format!(
        "{}/cloudwatch/home?region={}#logsV2:log-groups/log-group/{}/log-events/{}$3Fstart$3D{}",
        console_base(region),
        region,
        console_fragment_encode(&log_group),
        console_fragment_encode(&event.log_stream_name),
        event.timestamp,
    );
    if let Some(event_id) = &event.event_id {
        url.push_str("$26refEventId$3D");
        url.push_str(event_id);
    }
    url
}

/// Link to a log group's overview page
pub fn log_group_url(region: &str, log_group: &str) -> String {
    format!(
        "{}/cloudwatch/home?region={}#logsV2:log-groups/log-group/{}",
        console_base(region),
        region,
        console_fragment_encode(&complete_log_group_name(log_group)),
    )
}

/// Every event of a log group, optionally bounded in time (ms since the epoch)
pub fn log_group_events_url(
    region: &str,
    log_group: &str,
    start_ms: Option<i64>,
    end_ms: Option<i64>,
) -> String {
    let mut url = format!("{}/log-events", log_group_url(region, log_group));
    let mut sep = "$3F";
    if let Some(start) = start_ms {
        url.push_str(&format!("{}start$3D{}", sep, start));
        sep = "$26";
    }
    if let Some(end) = end_ms {
        url.push_str(&format!("{}end$3D{}", sep, end));
    }
    url
}

pub fn lambda_function_url(region: &str, function_name: &str) -> String {
    format!(
        "{}/lambda/home?region={}#/functions/{}",
        console_base(region),
        region,
        function_name
    )
}

pub fn s3_bucket_url(region: &str, bucket_name: &str) -> String {
    format!(
        "{}/s3/buckets/{}?region={}",
        console_base(region),
        bucket_name,
        region
    )
}

/// Everything but unreserved characters
const CONSOLE_RESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode twice, then write `%` as `$`, the way the console fragment expects
fn console_fragment_encode(value: &str) -> String {
    let once = utf8_percent_encode(value, CONSOLE_RESERVED).to_string();
    utf8_percent_encode(&once, CONSOLE_RESERVED)
        .to_string()
        .replace('%', "$")
}
