use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use alertscope_types::{ConfigCenterError, ErrorCategory, ErrorDetailMap, LogRecord, Subsystem};
use regex::Regex;
use tracing::debug;

use crate::aggregate::RequestSet;
use crate::rules::{Rule, rules_for};

static PLATFORM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"platformId\D*(\d+)").expect("platform id regex"));

/// Result of classifying one batch of requests
#[derive(Clone, Debug)]
pub struct Classification {
    pub subsystem: Subsystem,

    /// Number of requests classified
    pub total: usize,

    /// Requests per category, in priority order
    pub counts: BTreeMap<ErrorCategory, usize>,

    /// Detail maps by name
    pub details: BTreeMap<&'static str, ErrorDetailMap>,

    /// `[ERROR]` lines of requests no rule matched
    pub unknown_messages: Vec<String>,

    /// Subsystem-specific summary lines
    pub summary: Vec<String>,
}

impl Classification {
    fn new(subsystem: Subsystem, total: usize) -> Self {
        Self {
            subsystem,
            total,
            counts: BTreeMap::new(),
            details: BTreeMap::new(),
            unknown_messages: Vec::new(),
            summary: Vec::new(),
        }
    }

    pub fn count(&self, category: impl Into<ErrorCategory>) -> usize {
        self.counts.get(&category.into()).copied().unwrap_or(0)
    }

    /// Requests attributed to a known cause
    pub fn known_total(&self) -> usize {
        self.counts
            .iter()
            .filter(|(c, _)| !c.is_unknown())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn unknown_count(&self) -> usize {
        self.count(self.subsystem.unknown())
    }

    pub fn has_other_errors(&self) -> bool {
        self.total != self.known_total()
    }

    pub fn detail(&self, name: &str) -> Option<&ErrorDetailMap> {
        self.details.get(name)
    }
}

/// Applies a subsystem's rule table to requests
pub struct ErrorClassifier {
    subsystem: Subsystem,
    rules: &'static [Rule],
}

impl ErrorClassifier {
    pub fn new(subsystem: Subsystem) -> Self {
        Self {
            subsystem,
            rules: rules_for(subsystem),
        }
    }

    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    /// Classify every request, marking the ones with a known cause
    pub fn classify(&self, requests: &mut RequestSet) -> Classification {
        let mut result = Classification::new(self.subsystem, requests.len());

        for request in requests.iter_mut() {
            request.known = false;

            let hit = request.records.iter().find_map(|record| {
                self.rules
                    .iter()
                    .find(|rule| rule.matcher.matches(record, request))
                    .map(|rule| (rule, record))
            });

            match hit {
                Some((rule, record)) => {
                    *result.counts.entry(rule.category).or_default() += 1;
                    if let Some(extractor) = &rule.detail {
                        let map = result.details.entry(extractor.map_name()).or_default();
                        if let Some((secondary, tertiary)) = extractor.extract(record, request) {
                            map.record(&secondary, &tertiary);
                        }
                    }
                    request.known = true;
                }
                None => {
                    *result.counts.entry(self.subsystem.unknown()).or_default() += 1;
                    for record in request.records.iter().filter(|r| r.is_error()) {
                        debug!(request = %request.id, "unclassified error: {}", record.message);
                        result.unknown_messages.push(record.message.clone());
                    }
                }
            }
        }

        result.summary = match self.subsystem {
            Subsystem::Login => login_summary(requests.records()),
            Subsystem::ConfigCenter => steam_auth_summary(requests.records()),
            _ => Vec::new(),
        };
        result
    }
}

/// Players whose login failed
fn login_summary<'a>(records: impl Iterator<Item = &'a LogRecord>) -> Vec<String> {
    let players: BTreeSet<&str> = records
        .filter(|r| r.message.contains("---START LOGIN LOGIC, body/event"))
        .filter_map(|r| PLATFORM_ID_RE.captures(&r.message))
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    if players.is_empty() {
        return vec!["affected players: 0".to_string()];
    }
    vec![format!(
        "affected players: {} ({})",
        players.len(),
        players.into_iter().collect::<Vec<_>>().join(", ")
    )]
}

/// Share of Steam auth failures among config-center errors, plus a verdict
fn steam_auth_summary<'a>(records: impl Iterator<Item = &'a LogRecord>) -> Vec<String> {
    let (mut errors, mut unstable, mut bad_gateway) = (0usize, 0usize, 0usize);
    for record in records {
        let msg = &record.message;
        if msg.contains("[ERROR] ") {
            errors += 1;
        }
        if msg.contains(r#"GraphQLError: {"code": "9015""#) && msg.contains(r#""message": "Timeout:"#) {
            unstable += 1;
        }
        if msg.contains("SteamUnknownErr: code=502") || msg.contains("Bad Gateway") {
            bad_gateway += 1;
        }
    }

    let all_steam = errors == unstable + bad_gateway;
    let verdict = if errors == 0 {
        ConfigCenterError::Unknown.label().to_string()
    } else if bad_gateway == errors {
        ConfigCenterError::SteamBadGateway.label().to_string()
    } else if unstable == errors {
        ConfigCenterError::SteamAuthUnstable.label().to_string()
    } else if all_steam {
        format!(
            "{} + 502",
            ConfigCenterError::SteamAuthUnstable.label()
        )
    } else {
        ConfigCenterError::Unknown.label().to_string()
    };

    vec![
        format!(
            "ConfigCenter: steam_err%={}/{}, steam_502%={}/{}, all steam: {}",
            unstable, errors, bad_gateway, errors, all_steam
        ),
        verdict,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::RequestAggregator;
    use alertscope_types::{AccountInfoError, MissionError, StoreError};
    use chrono::{TimeZone, Utc};

    fn rec(ms: i64, message: &str) -> LogRecord {
        let id = message.split(' ').next().unwrap_or_default();
        LogRecord::new(Utc.timestamp_millis_opt(ms).unwrap(), id, message, "")
    }

    fn classify(subsystem: Subsystem, records: Vec<LogRecord>) -> (RequestSet, Classification) {
        let mut set = RequestAggregator::aggregate(records);
        let result = ErrorClassifier::new(subsystem).classify(&mut set);
        (set, result)
    }

    #[test]
    fn test_account_info_ps_timeout() {
        let (set, result) = classify(
            Subsystem::AccountInfo,
            vec![rec(1, "ABC123 blah s2s.np.playstation.net', port=443): Read timed out")],
        );
        assert_eq!(result.total, 1);
        assert_eq!(result.count(AccountInfoError::PsTimeout), 1);
        assert_eq!(result.known_total(), 1);
        assert!(!result.has_other_errors());
        assert!(set.get("ABC123").unwrap().known);
    }

    #[test]
    fn test_unknown_request_echoes_error_lines() {
        let (set, result) = classify(
            Subsystem::Store,
            vec![rec(1, "Z9 [INFO] start"), rec(2, "Z9 [ERROR] something new")],
        );
        assert_eq!(result.count(StoreError::Unknown), 1);
        assert_eq!(result.unknown_count(), 1);
        assert_eq!(result.unknown_messages, vec!["Z9 [ERROR] something new".to_string()]);
        assert!(!set.get("Z9").unwrap().known);
        assert!(result.has_other_errors());
    }

    #[test]
    fn test_first_matching_record_wins_over_priority() {
        // The request's first record matches a lower-priority rule
        let (_, result) = classify(
            Subsystem::Store,
            vec![
                rec(1, "R1 [ERROR] Steam code: 9"),
                rec(2, "R1 Steam finalize transaction: The read operation timed out"),
            ],
        );
        assert_eq!(result.count(StoreError::SteamCode9), 1);
        assert_eq!(result.count(StoreError::SteamTxnTimeout), 0);
    }

    #[test]
    fn test_priority_within_one_record() {
        // One message satisfying both rule 1 and rule 10
        let (_, result) = classify(
            Subsystem::Store,
            vec![rec(
                1,
                "R1 Steam InitTxn exception read operation timed out Steam code: 9",
            )],
        );
        assert_eq!(result.count(StoreError::SteamTxnTimeout), 1);
        assert_eq!(result.count(StoreError::SteamCode9), 0);
    }

    #[test]
    fn test_kth_rule_assigned_despite_later_matches() {
        let (_, result) = classify(
            Subsystem::AccountInfo,
            vec![
                rec(1, "K1 play_station_manager request failed! 503"),
                rec(2, "K1 play_station_manager request failed! 500"),
            ],
        );
        assert_eq!(result.count(AccountInfoError::Ps503), 1);
        assert_eq!(result.count(AccountInfoError::Ps500), 0);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let mut set = RequestAggregator::aggregate(vec![
            rec(1, "X1 Steam code: 9"),
            rec(2, "X2 [ERROR] mystery"),
            rec(3, "X3 No CdKey12Model found for ('K1',)"),
        ]);
        let classifier = ErrorClassifier::new(Subsystem::Store);
        let first = classifier.classify(&mut set);
        let second = classifier.classify(&mut set);
        assert_eq!(first.counts, second.counts);
        assert_eq!(first.details, second.details);
        assert_eq!(first.unknown_messages, second.unknown_messages);
    }

    #[test]
    fn test_mission_detail_map() {
        let (_, result) = classify(
            Subsystem::MissionSystem,
            vec![
                rec(1, "M1 [ERROR] failed on table (Missions)\nwhen calling the TransactWriteItems operation: Transaction is ongoing"),
                rec(2, "M2 [ERROR] FAILED ON TABLE (Missions) calling the TransactWriteItems operation: transaction is ongoing"),
                rec(3, "M3 ---START MISSION LOGIC, body/event is finishTutorial3 {}"),
                rec(4, "M3 check_idempotent failed"),
            ],
        );
        assert_eq!(result.count(MissionError::DbTransactionOngoing), 2);
        assert_eq!(result.count(MissionError::Tutorial3Idempotent), 1);
        let map = result.detail("transaction_ongoing").unwrap();
        assert_eq!(map.get("Missions", "TransactWriteItems"), 2);
    }

    #[test]
    fn test_bad_cd_key_keyed_by_caller() {
        let (_, result) = classify(
            Subsystem::Store,
            vec![
                rec(1, "C1 {'__CallerId': 'P7'}"),
                rec(2, "C1 No CdKey12Model found for ('AAAA',)"),
                rec(3, "C2 No CdKey12Model found for ('BBBB',)"),
            ],
        );
        let map = result.detail("bad_cd_key").unwrap();
        assert_eq!(map.get("P7", "AAAA"), 1);
        assert_eq!(map.get("", "BBBB"), 1);
    }

    #[test]
    fn test_login_summary_counts_players() {
        let (_, result) = classify(
            Subsystem::Login,
            vec![
                rec(1, "L1 ---START LOGIN LOGIC, body/event is {'platformId': 1001}"),
                rec(2, "L2 ---START LOGIN LOGIC, body/event is {'platformId': 1002}"),
                rec(3, "L3 ---START LOGIN LOGIC, body/event is {'platformId': 1001}"),
                rec(4, "L1 queue_manager.is_overload"),
            ],
        );
        assert_eq!(result.summary, vec!["affected players: 2 (1001, 1002)".to_string()]);
        assert_eq!(result.count(alertscope_types::LoginError::LoginQueue), 1);
    }

    #[test]
    fn test_steam_auth_verdicts() {
        let unstable = r#"[ERROR] GraphQLError: {"code": "9015", "message": "Timeout: steam"}"#;
        let gateway = "[ERROR] SteamUnknownErr: code=502";

        let (_, result) = classify(
            Subsystem::ConfigCenter,
            vec![rec(1, &format!("A {}", gateway)), rec(2, &format!("B {}", gateway))],
        );
        assert_eq!(result.summary[1], "steam 鉴权 502");

        let (_, result) = classify(
            Subsystem::ConfigCenter,
            vec![rec(1, &format!("A {}", unstable)), rec(2, &format!("B {}", gateway))],
        );
        assert_eq!(
            result.summary[0],
            "ConfigCenter: steam_err%=1/2, steam_502%=1/2, all steam: true"
        );
        assert_eq!(result.summary[1], "steam 鉴权不稳定 + 502");

        let (_, result) = classify(
            Subsystem::ConfigCenter,
            vec![rec(1, &format!("A {}", unstable)), rec(2, "B [ERROR] other")],
        );
        assert_eq!(result.summary[1], "Unknown");
    }
}
