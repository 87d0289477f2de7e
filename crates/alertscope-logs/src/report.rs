use std::fmt;

use crate::classify::Classification;

const HEADER_WIDTH: usize = 40;

/// Human-facing summary of one classification run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnalysisReport {
    pub header: String,

    /// `[ERROR]` lines nobody recognised
    pub unknown_messages: Vec<String>,

    /// Banner, count lines and summary lines
    pub body: Vec<String>,

    /// Non-empty detail maps as (name, compact JSON)
    pub details: Vec<(String, String)>,
}

impl AnalysisReport {
    pub fn from_classification(result: &Classification) -> Self {
        let title = format!("{} {}", result.subsystem.name(), "=".repeat(HEADER_WIDTH));
        let header = format!(
            "Extra Analysis: {}",
            title.chars().take(HEADER_WIDTH).collect::<String>()
        );

        let mut body = Vec::new();
        if result.has_other_errors() {
            let others = result.total.saturating_sub(result.known_total());
            body.push(format!("********** 有其他错误({}) **********", others));
            body.push(format!(
                "总错误：{}\t已知错误：{}",
                result.total,
                result.known_total()
            ));
        }
        body.extend(
            result
                .counts
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(category, count)| format!("{} 数量：{}", category.label(), count)),
        );
        body.extend(result.summary.iter().cloned());

        let details = result
            .details
            .iter()
            .filter(|(_, map)| !map.is_empty())
            .map(|(name, map)| (name.to_string(), map.to_string()))
            .collect();

        Self {
            header,
            unknown_messages: result.unknown_messages.clone(),
            body,
            details,
        }
    }

    pub fn has_findings(&self) -> bool {
        !self.body.is_empty() || !self.details.is_empty()
    }

    /// Text handed to the clipboard
    pub fn clipboard_text(&self) -> String {
        self.body.join("\n")
    }

    /// Contents of the report file: body then detail maps
    pub fn file_contents(&self) -> String {
        let mut lines = self.body.clone();
        lines.extend(self.details.iter().map(|(name, json)| format!("{}: {}", name, json)));
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        if !self.unknown_messages.is_empty() {
            for message in &self.unknown_messages {
                writeln!(f, "{}", message)?;
            }
            writeln!(f)?;
        }
        if self.has_findings() {
            writeln!(f, "report: {}", "-".repeat(HEADER_WIDTH))?;
        }
        for line in &self.body {
            writeln!(f, "{}", line)?;
        }
        for (name, json) in &self.details {
            writeln!(f, "{}: {}", name, json)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::RequestAggregator;
    use crate::classify::ErrorClassifier;
    use alertscope_types::{LogRecord, Subsystem};
    use chrono::{TimeZone, Utc};

    fn report(subsystem: Subsystem, messages: &[&str]) -> AnalysisReport {
        let records = messages.iter().enumerate().map(|(i, m)| {
            let id = m.split(' ').next().unwrap_or_default();
            LogRecord::new(Utc.timestamp_millis_opt(i as i64).unwrap(), id, *m, "")
        });
        let mut set = RequestAggregator::aggregate(records);
        let result = ErrorClassifier::new(subsystem).classify(&mut set);
        AnalysisReport::from_classification(&result)
    }

    #[test]
    fn test_header_is_truncated() {
        let r = report(Subsystem::Store, &[]);
        assert_eq!(
            r.header,
            format!("Extra Analysis: store {}", "=".repeat(34))
        );
        assert!(!r.has_findings());
    }

    #[test]
    fn test_other_errors_banner() {
        let r = report(
            Subsystem::Store,
            &["X1 Steam InitTxn exception: read operation timed out", "X2 [ERROR] mystery"],
        );
        assert_eq!(r.body[0], "********** 有其他错误(1) **********");
        assert_eq!(r.body[1], "总错误：2\t已知错误：1");
        assert!(r.body.contains(&"Unknown 数量：1".to_string()));
        assert_eq!(r.unknown_messages, vec!["X2 [ERROR] mystery".to_string()]);

        let text = r.to_string();
        assert!(text.contains("X2 [ERROR] mystery\n\nreport: "));
        assert!(text.contains("Unknown 数量：1"));
    }

    #[test]
    fn test_all_known_has_no_banner() {
        let r = report(Subsystem::Login, &["A queue_manager.is_overload"]);
        assert!(!r.body.iter().any(|l| l.contains("有其他错误")));
        assert!(r.body[0].ends_with(" 数量：1"));
        assert!(r.unknown_messages.is_empty());
    }

    #[test]
    fn test_detail_maps_in_file_contents() {
        let r = report(
            Subsystem::Store,
            &["C1 No CdKey12Model found for ('KEY1',)"],
        );
        assert_eq!(r.details, vec![("bad_cd_key".to_string(), r#"{"":{"KEY1":1}}"#.to_string())]);
        let contents = r.file_contents();
        assert!(contents.ends_with("bad_cd_key: {\"\":{\"KEY1\":1}}\n"));
        assert!(!r.clipboard_text().contains("bad_cd_key"));
    }
}
