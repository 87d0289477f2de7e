//! Shared types for alertscope
//!
//! This crate contains data structures used across multiple alertscope crates.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Environment & Region Types
// ============================================================================

/// Prefix of every Lambda log group
pub const LAMBDA_LOG_GROUP_PREFIX: &str = "/aws/lambda/";

/// Region abbreviations accepted on the command line
pub const REGION_ABBREVIATIONS: &[(&str, &str)] = &[
    ("BJ", "cn-north-1"),
    ("NX", "cn-northwest-1"),
    ("JP", "ap-northeast-1"),
    ("AP", "ap-northeast-1"),
    ("EU", "eu-central-1"),
    ("US", "us-east-1"),
];

/// Resolve a region given either its full name or its abbreviation
pub fn resolve_region(input: &str) -> Option<&'static str> {
    REGION_ABBREVIATIONS
        .iter()
        .find(|(abbr, full)| *abbr == input || *full == input)
        .map(|(_, full)| *full)
}

/// Short code for a region (first abbreviation wins)
pub fn region_abbr(region: &str) -> Option<&'static str> {
    REGION_ABBREVIATIONS
        .iter()
        .find(|(_, full)| *full == region)
        .map(|(abbr, _)| *abbr)
}

/// Display names used in client log reports
pub const REGION_LABELS: &[(&str, &str)] = &[
    ("cn-north-1", "北京"),
    ("cn-northwest-1", "宁夏"),
    ("ap-northeast-1", "日本"),
    ("eu-central-1", "欧洲"),
    ("us-east-1", "美国"),
];

/// Display name of a region, `??` when unknown
pub fn region_label(region: &str) -> &'static str {
    REGION_LABELS
        .iter()
        .find(|(full, _)| *full == region)
        .map(|(_, label)| *label)
        .unwrap_or("??")
}

/// China regions live in a separate partition
pub fn is_china_region(region: &str) -> bool {
    region.to_lowercase().starts_with("cn")
}

/// Prepend the Lambda prefix to a bare function name
pub fn complete_log_group_name(name: &str) -> String {
    if name.starts_with(LAMBDA_LOG_GROUP_PREFIX) {
        name.to_string()
    } else {
        format!("{}{}", LAMBDA_LOG_GROUP_PREFIX, name)
    }
}

/// Environment name encoded in a function name (`Env--123-StoreFunction` -> `Env`)
pub fn env_name_from_function(function_name: &str) -> &str {
    function_name.split("--").next().unwrap_or(function_name)
}

/// A deployment environment of the game backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,

    /// Whether the environment runs in the production AWS accounts
    #[serde(default)]
    pub prod: bool,
}

impl Environment {
    pub fn new(name: impl Into<String>, prod: bool) -> Self {
        Self {
            name: name.into(),
            prod,
        }
    }
}

/// Known environments, looked up by name
#[derive(Clone, Debug)]
pub struct EnvironmentRegistry {
    environments: Vec<Environment>,
}

impl EnvironmentRegistry {
    pub fn new(environments: Vec<Environment>) -> Self {
        Self { environments }
    }

    /// Exact name lookup
    pub fn by_name(&self, name: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.name == name)
    }

    /// Resolve the environment a Lambda log group belongs to
    pub fn from_log_group(&self, log_group: &str) -> Option<&Environment> {
        let function_name = log_group.rsplit('/').next().unwrap_or(log_group);
        self.by_name(env_name_from_function(function_name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Environment> {
        self.environments.iter()
    }
}

impl Default for EnvironmentRegistry {
    fn default() -> Self {
        Self::new(vec![
            Environment::new("NemoDev-cand", false),
            Environment::new("NemoDev-maprefine", false),
            Environment::new("NemoDev-trunk", false),
            Environment::new("NemoTest-comedy", false),
            Environment::new("NemoTest-test-lb", false),
            Environment::new("NemoTest-valve", false),
            Environment::new("Standalone", false),
            Environment::new("Standalone-cand", false),
            Environment::new("PartyAnimals", true),
            Environment::new("PartyAnimals-interal", true),
        ])
    }
}

// ============================================================================
// Log Types
// ============================================================================

/// One event as returned by the log filter API
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogEvent {
    #[serde(default)]
    pub log_stream_name: String,

    /// Milliseconds since the epoch
    pub timestamp: i64,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_time: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl RawLogEvent {
    pub fn new(timestamp: i64, message: impl Into<String>) -> Self {
        Self {
            log_stream_name: String::new(),
            timestamp,
            message: message.into(),
            ingestion_time: None,
            event_id: None,
        }
    }

    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.log_stream_name = stream.into();
        self
    }
}

/// One normalized log line
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    /// Event time (UTC, millisecond precision)
    pub timestamp: DateTime<Utc>,

    /// First whitespace-delimited token of the message
    pub correlation_id: String,

    /// Normalized message text
    pub message: String,

    /// Deep link to the originating log stream position
    pub source_link: String,

    /// Provider payload the record was built from
    pub raw: Option<RawLogEvent>,
}

impl LogRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        correlation_id: impl Into<String>,
        message: impl Into<String>,
        source_link: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            correlation_id: correlation_id.into(),
            message: message.into(),
            source_link: source_link.into(),
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: RawLogEvent) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Whether the line was logged at error level
    pub fn is_error(&self) -> bool {
        self.message.contains("[ERROR]")
    }
}

/// All log lines of one logical request
#[derive(Clone, Debug)]
pub struct RequestDetail {
    pub id: String,

    /// Caller identity (first match wins)
    pub caller: Option<String>,

    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,

    /// Request body (last match wins)
    pub body: Option<String>,

    /// Constituent records in fetch order until sorted
    pub records: Vec<LogRecord>,

    /// Set by the classifier when a known cause matched
    pub known: bool,
}

impl RequestDetail {
    pub fn new(id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            caller: None,
            started_at: at,
            ended_at: at,
            body: None,
            records: Vec::new(),
            known: false,
        }
    }

    /// Fold a record into the request, widening its time span
    pub fn push(&mut self, record: LogRecord) {
        if record.timestamp < self.started_at {
            self.started_at = record.timestamp;
        }
        if record.timestamp > self.ended_at {
            self.ended_at = record.timestamp;
        }
        self.records.push(record);
    }

    /// Put records in chronological order (stable for equal timestamps)
    pub fn sort_records(&mut self) {
        self.records.sort_by_key(|r| r.timestamp);
    }

    pub fn body_str(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    pub fn caller_str(&self) -> &str {
        self.caller.as_deref().unwrap_or("")
    }
}

impl fmt::Display for RequestDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} {}", self.id, self.started_at, self.ended_at)?;
        writeln!(f, "{}", self.body_str())?;
        for record in &self.records {
            writeln!(f, "{}|{}", record.timestamp, record.message)?;
        }
        Ok(())
    }
}

// ============================================================================
// Classification Types
// ============================================================================

/// Backend subsystem an alerting function belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subsystem {
    Login,
    Matching,
    Store,
    MissionSystem,
    AccountInfo,
    ConfigCenter,
}

impl Subsystem {
    pub const ALL: [Subsystem; 6] = [
        Self::Login,
        Self::Matching,
        Self::Store,
        Self::MissionSystem,
        Self::AccountInfo,
        Self::ConfigCenter,
    ];

    /// Detect the subsystem from a Lambda function name
    pub fn from_function_name(function_name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| function_name.contains(s.function_suffix()))
    }

    /// Function name suffix identifying the subsystem
    pub fn function_suffix(&self) -> &'static str {
        match self {
            Self::Login => "-LoginFunction",
            Self::Matching => "-MatchingFunction",
            Self::Store => "-StoreFunction",
            Self::MissionSystem => "-MissionSystemFunction",
            Self::AccountInfo => "-AccountInfoFunction",
            Self::ConfigCenter => "-ConfigCenterFunction",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Matching => "matching",
            Self::Store => "store",
            Self::MissionSystem => "mission-system",
            Self::AccountInfo => "account-info",
            Self::ConfigCenter => "config-center",
        }
    }

    /// Whether classification runs on full request logs or on error lines only
    pub fn uses_full_log(&self) -> bool {
        !matches!(self, Self::AccountInfo | Self::ConfigCenter)
    }

    /// The catch-all category of this subsystem
    pub fn unknown(&self) -> ErrorCategory {
        match self {
            Self::Login => LoginError::Unknown.into(),
            Self::Matching => MatchingError::Unknown.into(),
            Self::Store => StoreError::Unknown.into(),
            Self::MissionSystem => MissionError::Unknown.into(),
            Self::AccountInfo => AccountInfoError::Unknown.into(),
            Self::ConfigCenter => ConfigCenterError::Unknown.into(),
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Subsystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['_', ' '], "-");
        Self::ALL
            .into_iter()
            .find(|sub| {
                sub.name() == wanted
                    || sub.function_suffix().trim_start_matches('-').to_lowercase() == wanted
            })
            .ok_or_else(|| format!("unknown subsystem: {}", s))
    }
}

/// Catch-all label shared by every subsystem
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LoginError {
    SteamAppId999998,
    LoginQueue,
    Unknown,
}

impl LoginError {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SteamAppId999998 => "FP DLC 不影响登录",
            Self::LoginQueue => "登录排队",
            Self::Unknown => UNKNOWN_LABEL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccountInfoError {
    PsTimeout,
    PsReqConnection,
    PsTooManyReq,
    Ps401,
    Ps503,
    Ps500,
    Unknown,
}

impl AccountInfoError {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PsTimeout => "PS 请求超时",
            Self::PsReqConnection => "PS 请求连接断开",
            Self::PsTooManyReq => "PS Too Many Requests",
            Self::Ps401 => "PS 请求 401, 157330 之后的网关出现需 @马丁",
            Self::Ps503 => "PS 请求 503",
            Self::Ps500 => "PS 服务 internal server error",
            Self::Unknown => UNKNOWN_LABEL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchingError {
    DisbandLobbyLocalPlayer,
    DbInternalServerErr,
    PsIndexOutOfRange,
    PsWait125Ver,
    PsTimeout,
    PsReqConnection,
    Ps503,
    Unknown,
}

impl MatchingError {
    pub fn label(&self) -> &'static str {
        match self {
            Self::DisbandLobbyLocalPlayer => {
                "马丁：应该在抛异常前拦截下，等我节后处理，现在抛错的逻辑是对的"
            }
            Self::DbInternalServerErr => "DB Internal Server Error",
            Self::PsIndexOutOfRange => "1.10.x 马丁：1/24 合并的分线，1/25 发版会好",
            Self::PsWait125Ver => "1.10.x PS 相关，等 1/25 发版",
            Self::PsTimeout => "PS 请求超时",
            Self::PsReqConnection => "PS 请求连接断开",
            Self::Ps503 => "PS 请求 503",
            Self::Unknown => UNKNOWN_LABEL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreError {
    SteamTxnTimeout,
    SteamGetUserInfoTimeout,
    CdKeyOldEnv,
    CdKeyBadKey,
    OrderNotExist,
    CheckIdempotentError,
    PsTimeout,
    SteamInternalServerError,
    SteamCode9,
    CondCheckFailBpLoginReward,
    Unknown,
}

impl StoreError {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SteamTxnTimeout => "Steam Transaction 服务超时",
            Self::SteamGetUserInfoTimeout => "Steam GetUserInfo 超时",
            Self::CdKeyOldEnv => "CdKey 客户端需要升级",
            Self::CdKeyBadKey => "玩家用不存在的 CdKey 兑换",
            Self::OrderNotExist => "OrderModel.DoesNotExist",
            Self::CheckIdempotentError => "1.10.x 累登 CheckIdempotentError",
            Self::PsTimeout => "PS 请求超时",
            Self::SteamInternalServerError => "Steam Internal Server Error",
            Self::SteamCode9 => "Steam Code 9",
            Self::CondCheckFailBpLoginReward => {
                "BpLoginReward ConditionalCheckFailed 等 20250220 版本网关"
            }
            Self::Unknown => UNKNOWN_LABEL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MissionError {
    Tutorial2Idempotent,
    Tutorial3Idempotent,
    TutorialIdempotent,
    DbTransactionOngoing,
    Unknown,
}

impl MissionError {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Tutorial2Idempotent => "教2 结算 多次结算导致幂等问题（已知，RT）",
            Self::Tutorial3Idempotent => "教3 结算 多次结算导致幂等问题（已知，RT）",
            Self::TutorialIdempotent => "教1 结算 多次结算导致幂等问题（已知，RT）",
            Self::DbTransactionOngoing => "数据库 Transaction is ongoing",
            Self::Unknown => UNKNOWN_LABEL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigCenterError {
    SteamAuthUnstable,
    SteamBadGateway,
    Unknown,
}

impl ConfigCenterError {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SteamAuthUnstable => "steam 鉴权不稳定",
            Self::SteamBadGateway => "steam 鉴权 502",
            Self::Unknown => UNKNOWN_LABEL,
        }
    }
}

/// Classification label for a failed request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCategory {
    Login(LoginError),
    Matching(MatchingError),
    Store(StoreError),
    Mission(MissionError),
    AccountInfo(AccountInfoError),
    ConfigCenter(ConfigCenterError),
}

impl ErrorCategory {
    /// Human-readable description used in reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Login(e) => e.label(),
            Self::Matching(e) => e.label(),
            Self::Store(e) => e.label(),
            Self::Mission(e) => e.label(),
            Self::AccountInfo(e) => e.label(),
            Self::ConfigCenter(e) => e.label(),
        }
    }

    pub fn subsystem(&self) -> Subsystem {
        match self {
            Self::Login(_) => Subsystem::Login,
            Self::Matching(_) => Subsystem::Matching,
            Self::Store(_) => Subsystem::Store,
            Self::Mission(_) => Subsystem::MissionSystem,
            Self::AccountInfo(_) => Subsystem::AccountInfo,
            Self::ConfigCenter(_) => Subsystem::ConfigCenter,
        }
    }

    pub fn is_unknown(&self) -> bool {
        *self == self.subsystem().unknown()
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<LoginError> for ErrorCategory {
    fn from(e: LoginError) -> Self {
        Self::Login(e)
    }
}

impl From<MatchingError> for ErrorCategory {
    fn from(e: MatchingError) -> Self {
        Self::Matching(e)
    }
}

impl From<StoreError> for ErrorCategory {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<MissionError> for ErrorCategory {
    fn from(e: MissionError) -> Self {
        Self::Mission(e)
    }
}

impl From<AccountInfoError> for ErrorCategory {
    fn from(e: AccountInfoError) -> Self {
        Self::AccountInfo(e)
    }
}

impl From<ConfigCenterError> for ErrorCategory {
    fn from(e: ConfigCenterError) -> Self {
        Self::ConfigCenter(e)
    }
}

/// Nested occurrence counts: secondary key -> tertiary key -> count
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorDetailMap(BTreeMap<String, BTreeMap<String, usize>>);

impl ErrorDetailMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence
    pub fn record(&mut self, secondary: &str, tertiary: &str) {
        *self
            .0
            .entry(secondary.to_string())
            .or_default()
            .entry(tertiary.to_string())
            .or_default() += 1;
    }

    pub fn get(&self, secondary: &str, tertiary: &str) -> usize {
        self.0
            .get(secondary)
            .and_then(|inner| inner.get(tertiary))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all counts
    pub fn total(&self) -> usize {
        self.0.values().flat_map(|inner| inner.values()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, usize>)> {
        self.0.iter()
    }
}

impl fmt::Display for ErrorDetailMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

// ============================================================================
// Alert Types
// ============================================================================

/// The fields of an alarm notification needed to locate its logs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertDetail {
    pub function_name: String,
    pub alarm_time: DateTime<FixedOffset>,
    pub region: String,
}

impl AlertDetail {
    pub fn new(
        function_name: impl Into<String>,
        alarm_time: DateTime<FixedOffset>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            alarm_time,
            region: region.into(),
        }
    }

    pub fn log_group(&self) -> String {
        complete_log_group_name(&self.function_name)
    }

    pub fn environment_name(&self) -> &str {
        env_name_from_function(&self.function_name)
    }

    pub fn subsystem(&self) -> Option<Subsystem> {
        Subsystem::from_function_name(&self.function_name)
    }
}

impl fmt::Display for AlertDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        writeln!(f, "\t\"function_name\": \"{}\"", self.function_name)?;
        writeln!(f, "\t\"alarm_time\": \"{}\"", self.alarm_time.to_rfc3339())?;
        writeln!(f, "\t\"region\": \"{}\"", self.region)?;
        writeln!(f, "\t\"log_group\": \"{}\"", self.log_group())?;
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_resolve_region_accepts_both_forms() {
        assert_eq!(resolve_region("NX"), Some("cn-northwest-1"));
        assert_eq!(resolve_region("us-east-1"), Some("us-east-1"));
        assert_eq!(resolve_region("AP"), Some("ap-northeast-1"));
        assert_eq!(resolve_region("mars-1"), None);
        assert_eq!(region_abbr("ap-northeast-1"), Some("JP"));
    }

    #[test]
    fn test_region_label() {
        assert_eq!(region_label("cn-northwest-1"), "宁夏");
        assert_eq!(region_label("us-east-1"), "美国");
        assert_eq!(region_label("sa-east-1"), "??");
    }

    #[test]
    fn test_environment_from_log_group() {
        let registry = EnvironmentRegistry::default();
        let env = registry
            .from_log_group("/aws/lambda/PartyAnimals--160950-LoginFunction")
            .unwrap();
        assert_eq!(env.name, "PartyAnimals");
        assert!(env.prod);

        let env = registry.from_log_group("Standalone-cand-StoreFunction");
        assert!(env.is_none());
        let env = registry.from_log_group("Standalone-cand--1-StoreFunction").unwrap();
        assert!(!env.prod);
    }

    #[test]
    fn test_request_span_tracks_min_and_max() {
        let mut req = RequestDetail::new("A", at(2_000));
        req.push(LogRecord::new(at(2_000), "A", "A second", ""));
        req.push(LogRecord::new(at(1_000), "A", "A first", ""));
        req.push(LogRecord::new(at(3_000), "A", "A third", ""));
        assert_eq!(req.started_at, at(1_000));
        assert_eq!(req.ended_at, at(3_000));

        req.sort_records();
        let order: Vec<_> = req.records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(order, vec!["A first", "A second", "A third"]);
    }

    #[test]
    fn test_subsystem_detection() {
        assert_eq!(
            Subsystem::from_function_name("PartyAnimals--1-StoreFunction"),
            Some(Subsystem::Store)
        );
        assert_eq!(
            Subsystem::from_function_name("PartyAnimals-AccountInfoFunction"),
            Some(Subsystem::AccountInfo)
        );
        assert_eq!(Subsystem::from_function_name("PartyAnimals-Feishu"), None);
        assert_eq!("mission-system".parse::<Subsystem>(), Ok(Subsystem::MissionSystem));
        assert_eq!("StoreFunction".parse::<Subsystem>(), Ok(Subsystem::Store));
        assert!(!Subsystem::AccountInfo.uses_full_log());
    }

    #[test]
    fn test_category_order_and_unknown() {
        let first: ErrorCategory = StoreError::SteamTxnTimeout.into();
        let unknown = Subsystem::Store.unknown();
        assert!(first < unknown);
        assert!(unknown.is_unknown());
        assert!(!first.is_unknown());
        assert_eq!(unknown.label(), "Unknown");
    }

    #[test]
    fn test_error_detail_map_counts() {
        let mut map = ErrorDetailMap::new();
        map.record("Orders", "PutItem");
        map.record("Orders", "PutItem");
        map.record("Orders", "Query");
        assert_eq!(map.get("Orders", "PutItem"), 2);
        assert_eq!(map.total(), 3);
        assert_eq!(map.to_string(), r#"{"Orders":{"PutItem":2,"Query":1}}"#);
    }
}
