//! Classification rule tables
//!
//! Each subsystem owns an ordered list of rules; the first rule that matches
//! a record of a request decides the request's category.

use std::sync::LazyLock;

use alertscope_types::{
    AccountInfoError, ConfigCenterError, ErrorCategory, LogRecord, LoginError, MatchingError,
    MissionError, RequestDetail, StoreError, Subsystem,
};
use regex::Regex;

use Matcher::{BodyContains as body, Contains as has, LinkContains as link};

/// Predicate over one record in the context of its request
#[derive(Clone, Debug)]
pub enum Matcher {
    /// Substring of the message
    Contains(&'static str),

    /// Substring of the record's source link
    LinkContains(&'static str),

    /// Substring of the request body
    BodyContains(&'static str),

    Regex(Regex),
    All(Vec<Matcher>),
    Any(Vec<Matcher>),
}

impl Matcher {
    pub fn matches(&self, record: &LogRecord, request: &RequestDetail) -> bool {
        match self {
            Self::Contains(text) => record.message.contains(text),
            Self::LinkContains(text) => record.source_link.contains(text),
            Self::BodyContains(text) => request.body_str().contains(text),
            Self::Regex(re) => re.is_match(&record.message),
            Self::All(all) => all.iter().all(|m| m.matches(record, request)),
            Self::Any(any) => any.iter().any(|m| m.matches(record, request)),
        }
    }
}

/// Pulls (secondary, tertiary) detail keys out of a matched record
#[derive(Clone, Debug)]
pub enum DetailExtractor {
    /// Capture groups 1 and 2
    Captures { map: &'static str, regex: Regex },

    /// The request's caller and capture group 1
    CallerAndCapture { map: &'static str, regex: Regex },
}

impl DetailExtractor {
    /// Name of the detail map this extractor feeds
    pub fn map_name(&self) -> &'static str {
        match self {
            Self::Captures { map, .. } | Self::CallerAndCapture { map, .. } => map,
        }
    }

    pub fn extract(&self, record: &LogRecord, request: &RequestDetail) -> Option<(String, String)> {
        match self {
            Self::Captures { regex, .. } => {
                let caps = regex.captures(&record.message)?;
                Some((
                    caps.get(1)?.as_str().to_string(),
                    caps.get(2)?.as_str().to_string(),
                ))
            }
            Self::CallerAndCapture { regex, .. } => {
                let caps = regex.captures(&record.message)?;
                Some((
                    request.caller_str().to_string(),
                    caps.get(1)?.as_str().to_string(),
                ))
            }
        }
    }
}

/// One entry of a subsystem's priority list
#[derive(Clone, Debug)]
pub struct Rule {
    pub category: ErrorCategory,
    pub matcher: Matcher,
    pub detail: Option<DetailExtractor>,
}

impl Rule {
    fn new(category: impl Into<ErrorCategory>, matcher: Matcher) -> Self {
        Self {
            category: category.into(),
            matcher,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: DetailExtractor) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Priority-ordered rules of a subsystem
pub fn rules_for(subsystem: Subsystem) -> &'static [Rule] {
    match subsystem {
        Subsystem::Login => LOGIN_RULES.as_slice(),
        Subsystem::Matching => MATCHING_RULES.as_slice(),
        Subsystem::Store => STORE_RULES.as_slice(),
        Subsystem::MissionSystem => MISSION_RULES.as_slice(),
        Subsystem::AccountInfo => ACCOUNT_INFO_RULES.as_slice(),
        Subsystem::ConfigCenter => CONFIG_CENTER_RULES.as_slice(),
    }
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("rule regex is valid")
}

fn all(matchers: impl IntoIterator<Item = Matcher>) -> Matcher {
    Matcher::All(matchers.into_iter().collect())
}

fn any(matchers: impl IntoIterator<Item = Matcher>) -> Matcher {
    Matcher::Any(matchers.into_iter().collect())
}

static ACCOUNT_INFO_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use AccountInfoError::*;
    vec![
        Rule::new(
            PsTimeout,
            has("s2s.np.playstation.net', port=443): Read timed out"),
        ),
        Rule::new(
            PsReqConnection,
            all([has("exceptions.ConnectionError"), has("Connection aborted")]),
        ),
        Rule::new(
            PsTooManyReq,
            all([has("play_station_manager"), has("Too Many Requests")]),
        ),
        Rule::new(
            Ps401,
            all([
                has("play_station_manager"),
                has("failed! 401"),
                has("Invalid token"),
            ]),
        ),
        Rule::new(
            Ps503,
            all([has("play_station_manager"), has("failed! 503")]),
        ),
        Rule::new(
            Ps500,
            all([has("play_station_manager"), has("failed! 500")]),
        ),
    ]
});

static LOGIN_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use LoginError::*;
    vec![
        // The FP DLC has no production AppId yet; harmless for login
        Rule::new(SteamAppId999998, has("Bad Steam AppId: 999998")),
        Rule::new(LoginQueue, has("queue_manager.is_overload")),
    ]
});

static MATCHING_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use MatchingError::*;
    let db_table_op = r"table \((.*?)\).*?calling the (.*?) operation";
    vec![
        Rule::new(
            DisbandLobbyLocalPlayer,
            all([
                has("No AccountStateModel found"),
                Matcher::Regex(re(r"_P\d_D\d_J\d")),
            ]),
        ),
        Rule::new(
            DbInternalServerErr,
            all([
                has("pynamodb.exception"),
                has("Internal server error"),
                Matcher::Regex(re(db_table_op)),
            ]),
        )
        .with_detail(DetailExtractor::Captures {
            map: "db_internal_error",
            regex: re(db_table_op),
        }),
        Rule::new(
            PsIndexOutOfRange,
            all([
                has("graphql_manager_base.py:36"),
                has("error msg:list index out of range"),
            ]),
        ),
        Rule::new(
            PsWait125Ver,
            all([
                has("[ERROR]"),
                any([
                    has("NoneType' object has no attribute 'items"),
                    has("play_station_manager.py:493 ⫸ leave_player_session: no access token"),
                    has("play_station_manager.py:325 ⫸ get_player_session: no access token"),
                    has("play_station_manager.py:387 ⫸ change_player_session_leader: no access token"),
                    has("play_station_manager.py:444 ⫸ put_player_sessions_non_psn_leader: no access token"),
                ]),
            ]),
        ),
        Rule::new(
            PsTimeout,
            all([has("exceptions.ReadTimeout"), has("s2s.np.playstation.net")]),
        ),
        Rule::new(
            PsReqConnection,
            all([has("Connection aborted"), has("Connection reset by peer")]),
        ),
        Rule::new(
            Ps503,
            all([has("play_station_manager"), has("failed! 503")]),
        ),
    ]
});

static STORE_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use StoreError::*;
    vec![
        Rule::new(
            SteamTxnTimeout,
            all([
                any([
                    has("Steam InitTxn exception"),
                    has("Steam finalize transaction"),
                ]),
                has("read operation timed out"),
            ]),
        ),
        Rule::new(
            SteamGetUserInfoTimeout,
            has("Steam get user info : Exception is The read operation timed out"),
        ),
        Rule::new(
            CdKeyOldEnv,
            any([
                all([has("cd_key_manager"), has("@1.6"), link("115570")]),
                // Branch builds fall back to the trunk table, suffixed 1.9
                all([has("VA0470@1.9 does not exist"), link("154790")]),
            ]),
        ),
        Rule::new(CdKeyBadKey, has("No CdKey12Model found")).with_detail(
            DetailExtractor::CallerAndCapture {
                map: "bad_cd_key",
                regex: re(r"No CdKey12Model found for \('([^']*)'"),
            },
        ),
        Rule::new(OrderNotExist, has("orm.order_model.OrderModel.DoesNotExist")),
        Rule::new(CheckIdempotentError, has("CheckIdempotentError")),
        Rule::new(
            PsTimeout,
            all([
                has("requests.exceptions.ReadTimeout"),
                has("s2s.np.playstation.net"),
            ]),
        ),
        Rule::new(
            SteamInternalServerError,
            all([
                has("steam_get_user_info("),
                has(") Internal Server Error"),
            ]),
        ),
        Rule::new(SteamCode9, has("Steam code: 9")),
        Rule::new(
            CondCheckFailBpLoginReward,
            all([
                has("(ConditionalCheckFailedException)"),
                has("table (HeoPartyAnimalsBpLoginReward)"),
            ]),
        ),
    ]
});

static MISSION_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use MissionError::*;
    let txn_ongoing =
        r"(?is)on table \((.*?)\).*?calling the (.*?) operation: Transaction is ongoing";
    vec![
        Rule::new(
            Tutorial2Idempotent,
            all([has("check_idempotent failed"), body("finishTutorial2 ")]),
        ),
        Rule::new(
            Tutorial3Idempotent,
            all([has("check_idempotent failed"), body("finishTutorial3 ")]),
        ),
        Rule::new(
            TutorialIdempotent,
            all([has("check_idempotent failed"), body("finishTutorial ")]),
        ),
        Rule::new(DbTransactionOngoing, Matcher::Regex(re(txn_ongoing))).with_detail(
            DetailExtractor::Captures {
                map: "transaction_ongoing",
                regex: re(txn_ongoing),
            },
        ),
    ]
});

static CONFIG_CENTER_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use ConfigCenterError::*;
    vec![
        Rule::new(
            SteamAuthUnstable,
            all([
                has(r#"GraphQLError: {"code": "9015""#),
                has(r#""message": "Timeout:"#),
            ]),
        ),
        Rule::new(
            SteamBadGateway,
            any([has("SteamUnknownErr: code=502"), has("Bad Gateway")]),
        ),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(message: &str) -> LogRecord {
        LogRecord::new(Utc.timestamp_millis_opt(0).unwrap(), "R", message, "")
    }

    #[test]
    fn test_every_subsystem_has_rules_in_declaration_order() {
        for subsystem in Subsystem::ALL {
            let rules = rules_for(subsystem);
            assert!(!rules.is_empty());
            for pair in rules.windows(2) {
                assert!(pair[0].category < pair[1].category);
            }
            assert!(rules.iter().all(|r| r.category.subsystem() == subsystem));
            assert!(rules.iter().all(|r| !r.category.is_unknown()));
        }
    }

    #[test]
    fn test_body_and_link_matchers() {
        let mut request = RequestDetail::new("R", Utc.timestamp_millis_opt(0).unwrap());
        request.body = Some("Operation finishTutorial2 {..}".to_string());

        let rec = record("R check_idempotent failed");
        let rules = rules_for(Subsystem::MissionSystem);
        assert!(rules[0].matcher.matches(&rec, &request));
        assert!(!rules[1].matcher.matches(&rec, &request));

        let mut rec = record("R VA0470@1.9 does not exist");
        let cd_key_old = &rules_for(Subsystem::Store)[2];
        assert!(!cd_key_old.matcher.matches(&rec, &request));
        rec.source_link = "https://x/log-group/$252Faws$252Flambda$252FPartyAnimals--154790-StoreFunction".to_string();
        assert!(cd_key_old.matcher.matches(&rec, &request));
    }

    #[test]
    fn test_detail_extractors() {
        let request = RequestDetail::new("R", Utc.timestamp_millis_opt(0).unwrap());
        let rule = &rules_for(Subsystem::Matching)[1];
        let rec = record(
            "R pynamodb.exceptions.PutError: Internal server error on table (Accounts) when calling the PutItem operation",
        );
        assert!(rule.matcher.matches(&rec, &request));
        let detail = rule.detail.as_ref().unwrap();
        assert_eq!(detail.map_name(), "db_internal_error");
        assert_eq!(
            detail.extract(&rec, &request),
            Some(("Accounts".to_string(), "PutItem".to_string()))
        );

        let mut request = request;
        request.caller = Some("P42".to_string());
        let rule = &rules_for(Subsystem::Store)[3];
        let rec = record("R No CdKey12Model found for ('ABCD-EFGH', 'x')");
        assert_eq!(
            rule.detail.as_ref().unwrap().extract(&rec, &request),
            Some(("P42".to_string(), "ABCD-EFGH".to_string()))
        );
    }
}
