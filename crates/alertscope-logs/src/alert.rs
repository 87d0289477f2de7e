use std::sync::LazyLock;

use alertscope_types::{AlertDetail, resolve_region};
use chrono::DateTime;
use regex::Regex;

use crate::error::AlertError;

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| field_regex("函数"));
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| field_regex("时间"));
static REGION_RE: LazyLock<Regex> = LazyLock::new(|| field_regex("区域"));

fn field_regex(label: &str) -> Regex {
    Regex::new(&format!(r"{}[:：][ \t]*([^\r\n]*)", label)).expect("alert field regex")
}

/// First non-empty value of a labeled field
fn field<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .find(|v| !v.is_empty())
}

/// Parse a pasted alarm notification
///
/// ```text
/// Lambda Log 告警
/// 区域: cn-northwest-1
/// 函数: PartyAnimals--1-StoreFunction
/// 告警时间: 2024-07-20T18:29:00.000+0800
/// ```
pub fn parse_alert(text: &str) -> Result<AlertDetail, AlertError> {
    let function = field(&FUNCTION_RE, text);
    let time = field(&TIME_RE, text);
    let region = field(&REGION_RE, text);

    let missing: Vec<&'static str> = [
        ("function", function.is_none()),
        ("time", time.is_none()),
        ("region", region.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();

    let (Some(function), Some(time), Some(region)) = (function, time, region) else {
        return Err(AlertError::MissingFields(missing));
    };

    let alarm_time = DateTime::parse_from_rfc3339(time)
        .or_else(|_| DateTime::parse_from_str(time, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map_err(|_| AlertError::InvalidTime(time.to_string()))?;
    let region = resolve_region(region).unwrap_or(region);

    Ok(AlertDetail::new(function, alarm_time, region))
}
