//! Game client log timing
//!
//! Client logs carry month and day but no year, and one message can span
//! several lines followed by an `at ...` stack trace. The file name starts with
//! the time the log was created, which dates every line and anchors the stage
//! offsets. Gateway requests are paired with their responses by GUID.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use alertscope_cloudwatch::urls::log_group_events_url;
use alertscope_types::{EnvironmentRegistry, LAMBDA_LOG_GROUP_PREFIX, region_label};
use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ClientLogError, CsvError};

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<dt>\d\d-\d\d \d\d:\d\d:\d\d:\d\d\d) \[.*?\] \[.*?\] \[(?P<thread>\d*)\]")
        .expect("header regex")
});

static GUID_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*? \[.*?\] \[.*?\] \[.*?\].*?Guid = (?P<guid>.*?),.*?uri = (?P<uri>.*?),")
        .expect("guid uri regex")
});

static GUID_RESPONSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*? \[.*?\] \[.*?\] \[.*?\].*?Guid = (?P<guid>.*?),.*?code =")
        .expect("guid response regex")
});

static GUID_TIMEOUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*? \[.*?\] \[.*?\] \[.*?\].*?time out.*?Guid = (?P<guid>.*?)$")
        .expect("guid timeout regex")
});

static INTERRUPTION_REQUEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^.*? \[.*?\] \[.*?\] \[\d*\] \[.*?\]\s*?\[MenuSceneLoader\] <RequestInterruption> (?P<name>.*?),",
    )
    .expect("interruption request regex")
});

static INTERRUPTION_DROP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^.*? \[.*?\] \[.*?\] \[\d*\] \[.*?\]\s*?\[MenuSceneLoader\] <DrawInterruption> (?P<name>.*?),",
    )
    .expect("interruption drop regex")
});

pub const STAGE_LOG_FILE: &str = "生成日志文件";
pub const STAGE_CLIENT_INIT: &str = "开始初始化客户端";
pub const STAGE_LOGIN_START: &str = "登录开始";
pub const STAGE_LOGIN_POPUP: &str = "登录弹窗";
pub const STAGE_MAIN_MENU: &str = "进入主菜单";
pub const STAGE_LOGIN_REQUEST: &str = "登录请求";
pub const STAGE_LOGIN: &str = "登录";
pub const STAGE_NETWORK_REQUEST: &str = "网络请求";

const MAGIC_CODE: &str = "幻数";
const MAGIC_CODE_OVERSEAS: &str = "外区_幻数";
const MAGIC_CODE_CHINA: &str = "国区_幻数";
const LOGIN_REGION_DESC: &str = "获取地区";
const MAGIC_CODE_DESC: &str = "取得幻数";

const GATEWAY_DOMAINS: [&str; 2] = ["api.recreategames.com.cn", "api.partyanimalsgame.com"];

const LOGIN_PATHS: [&str; 5] = [
    "/login-rec",
    "/config-center",
    "/login",
    "/login-alert",
    "/mystery",
];

/// Link window for a request that never got an answer
const UNANSWERED_WINDOW_MS: i64 = 15_000;

const FULL_CONTENT_MARKER: &str = "full content is : ";
const SERVER_ERROR_MARKER: &str = "Request finished Successfully, but the server sent an error";
const CONTENT_NULL_MARKER: &str = "content null?";

/// One message: its first line, continuation lines and stack trace
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogMessage {
    pub lines: Vec<String>,
    pub trace: Vec<String>,
}

impl LogMessage {
    pub fn header(&self) -> &str {
        self.lines.first().map(String::as_str).unwrap_or_default()
    }
}

/// Group raw lines into messages
pub fn split_messages(text: &str) -> Vec<LogMessage> {
    let mut messages: Vec<LogMessage> = Vec::new();
    for raw in text.lines() {
        let line = raw.trim_start_matches('\u{feff}').trim();
        if line.is_empty() {
            continue;
        }
        if HEADER_RE.is_match(line) {
            messages.push(LogMessage {
                lines: vec![line.to_string()],
                trace: Vec::new(),
            });
            continue;
        }

        let Some(last) = messages.last_mut() else {
            debug!(line, "skipping text before the first message");
            continue;
        };
        if line.starts_with("at ") {
            last.trace.push(line.to_string());
        } else if last.trace.is_empty() {
            last.lines.push(line.to_string());
        } else if line != "Log stream is closed" {
            debug!(line, "unhandled line after a stack trace");
        }
    }
    messages
}

/// Creation time encoded in a name like `2025-01-16_03-44-23-143-RECREATE06.log`
pub fn log_time_from_file_name(file_name: &str) -> Option<DateTime<Utc>> {
    let stamp = file_name.get(..23)?;
    let (seconds, millis) = (stamp.get(..19)?, stamp.get(19..)?);
    let millis: i64 = millis.strip_prefix('-')?.parse().ok()?;
    let naive = NaiveDateTime::parse_from_str(seconds, "%Y-%m-%d_%H-%M-%S").ok()?;
    Some(naive.and_utc() + chrono::Duration::milliseconds(millis))
}

/// `MM-DD HH:MM:SS:fff` in the given year
fn parse_line_time(year: i32, stamp: &str) -> Option<DateTime<Utc>> {
    let (seconds, millis) = stamp.rsplit_once(':')?;
    let value = format!("{}-{}.{}", year, seconds, millis);
    NaiveDateTime::parse_from_str(&value, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Lambda behind a gateway URI like
/// `https://cn-northwest-1.PartyAnimals.api.recreategames.com.cn/160950/login-rec`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LambdaTarget {
    pub region: String,
    pub region_label: &'static str,
    pub environment: String,
    pub sub_env: Option<u32>,
    pub path: String,
    pub function_name: String,
}

impl LambdaTarget {
    pub fn from_uri(uri: &str, registry: &EnvironmentRegistry) -> Option<Self> {
        if !GATEWAY_DOMAINS.iter().any(|domain| uri.contains(domain)) {
            return None;
        }

        let host_and_path = uri
            .trim()
            .replace("https://", "")
            .replace("http://", "")
            .replace("cdn.", "");
        let host = host_and_path.split('/').next().unwrap_or_default();
        let mut tokens = host.split('.');
        let region = tokens.next()?.to_string();
        let env_token = tokens.next()?;
        let environment = registry
            .iter()
            .find(|env| env.name.eq_ignore_ascii_case(env_token))
            .map(|env| env.name.clone())
            .unwrap_or_else(|| env_token.to_string());

        let mut segments = uri.rsplit('/');
        let path = segments.next().unwrap_or_default().to_string();
        let sub_env = segments
            .next()
            .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s.parse().ok());

        let function_name = match sub_env {
            Some(sub_env) => format!("{}--{}-{}", environment, sub_env, function_for_path(&path)),
            None => format!("{}-{}", environment, function_for_path(&path)),
        };
        Some(Self {
            region_label: region_label(&region),
            region,
            environment,
            sub_env,
            path,
            function_name,
        })
    }

    pub fn log_group(&self) -> String {
        format!("{}{}", LAMBDA_LOG_GROUP_PREFIX, self.function_name)
    }
}

/// `login-rec` -> `LoginRecFunction`
fn function_for_path(path: &str) -> String {
    let mut name: String = path
        .split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        })
        .collect();
    name.push_str("Function");
    name
}

/// What a gateway answered
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LambdaResponse {
    pub body: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
    pub result: Option<String>,
}

impl LambdaResponse {
    /// Pull code, message and result out of a JSON body, or make do with the text
    pub fn from_body(body: &str) -> Self {
        let mut response = Self {
            body: Some(body.to_string()),
            ..Self::default()
        };
        let content_null = body
            .rsplit(CONTENT_NULL_MARKER)
            .next()
            .filter(|_| body.contains(CONTENT_NULL_MARKER))
            .map(|tail| format!("{} {}", CONTENT_NULL_MARKER, tail));

        match serde_json::from_str::<Value>(body) {
            Ok(json) => {
                response.code = json.get("code").and_then(json_text);
                response.message = json.get("message").and_then(json_text);
                response.result = json.get("result").and_then(json_text);
                if content_null.is_some() {
                    response.message = content_null;
                }
                if response.code.is_none() && response.message.is_none() && response.result.is_none()
                {
                    response.message = Some(body.to_string());
                }
            }
            Err(_) => {
                if let Some((_, tail)) = body.rsplit_once("code =") {
                    response.code = tail.split(',').next().map(str::to_string);
                }
                response.message =
                    content_null.or_else(|| Some(body.chars().take(20).collect::<String>()));
            }
        }
        response
    }
}

/// Text of a JSON field, `None` for null and empty values
fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(false) => None,
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// A timed stage of the client's start-up or one gateway request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageBlock {
    pub stage: String,
    pub desc: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub thread_start: Option<u32>,
    pub thread_end: Option<u32>,
    pub guid: Option<String>,
    pub lambda: Option<LambdaTarget>,
    pub response: LambdaResponse,
}

impl StageBlock {
    pub fn new(stage: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            stage: stage.into(),
            desc: String::new(),
            start,
            end: None,
            thread_start: None,
            thread_end: None,
            guid: None,
            lambda: None,
            response: LambdaResponse::default(),
        }
    }

    fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    fn with_thread(mut self, thread: Option<u32>) -> Self {
        self.thread_start = thread;
        self
    }

    fn close(&mut self, at: DateTime<Utc>, thread: Option<u32>) {
        self.end = Some(at);
        self.thread_end = thread;
    }

    /// End minus start; 1 ms for stages that never ended
    pub fn duration_ms(&self) -> i64 {
        self.end
            .map(|end| (end - self.start).num_milliseconds())
            .unwrap_or(1)
    }

    /// Console link to the Lambda's events around the request
    pub fn log_group_link(&self) -> Option<String> {
        let target = self.lambda.as_ref()?;
        let start_ms = self.start.timestamp_millis();
        let end_ms = self
            .end
            .map(|end| end.timestamp_millis())
            .unwrap_or(start_ms + UNANSWERED_WINDOW_MS);
        Some(log_group_events_url(
            &target.region,
            &target.log_group(),
            Some(start_ms),
            Some(end_ms),
        ))
    }

    fn set_response(&mut self, body: &str) {
        let body = body.trim();
        if body.is_empty() {
            return;
        }
        if self.lambda.is_some() {
            self.response = LambdaResponse::from_body(body);
        } else if self.desc.contains(MAGIC_CODE) {
            self.response.message = Some(body.to_string());
        }
    }
}

/// A parsed client log
#[derive(Clone, Debug)]
pub struct ClientLog {
    pub file_name: String,
    pub log_time: DateTime<Utc>,
    pub build: Option<String>,
    pub blocks: Vec<StageBlock>,
}

impl ClientLog {
    /// Seconds from log creation to `at`
    pub fn offset_ms(&self, at: DateTime<Utc>) -> i64 {
        (at - self.log_time).num_milliseconds()
    }

    /// Blocks that carry a gateway GUID
    pub fn requests(&self) -> impl Iterator<Item = &StageBlock> {
        self.blocks.iter().filter(|b| b.guid.is_some())
    }

    fn output_stem(&self) -> String {
        let stem = self.file_name.split('.').next().unwrap_or_default();
        format!("{}_{}", self.build.as_deref().unwrap_or("NoBuild"), stem)
    }

    pub fn guid_csv_name(&self) -> String {
        format!("{}_GUID.csv", self.output_stem())
    }

    pub fn stage_csv_name(&self) -> String {
        format!("{}.csv", self.output_stem())
    }

    fn find_block(&mut self, pred: impl Fn(&StageBlock) -> bool) -> Option<&mut StageBlock> {
        self.blocks.iter_mut().find(|b| pred(b))
    }

    fn apply(
        &mut self,
        message: &LogMessage,
        at: DateTime<Utc>,
        thread: Option<u32>,
        registry: &EnvironmentRegistry,
    ) {
        let header = message.header();

        if self.build.is_none() {
            if let Some(build) = header
                .split_once("(Build-")
                .and_then(|(_, rest)| rest.strip_suffix(')'))
            {
                self.build = Some(format!("Build-{}", build));
                return;
            }
        }
        if header.contains("[MenuSceneLoader] <StartAsync> frameCount") {
            self.blocks.push(StageBlock::new(STAGE_CLIENT_INIT, at));
            return;
        }
        if header.contains("[TrailBlazer] <StartAsync> manualSelectWorld=") {
            self.blocks.push(StageBlock::new(STAGE_LOGIN_START, at));
            return;
        }
        if let Some(caps) = INTERRUPTION_REQUEST_RE.captures(header) {
            self.blocks.push(
                StageBlock::new(STAGE_LOGIN_POPUP, at)
                    .with_desc(&caps["name"])
                    .with_thread(thread),
            );
            return;
        }
        if let Some(caps) = INTERRUPTION_DROP_RE.captures(header) {
            let name = &caps["name"];
            if let Some(block) = self.find_block(|b| {
                b.stage == STAGE_LOGIN_POPUP && b.desc == name && b.end.is_none()
            }) {
                block.close(at, thread);
            }
            return;
        }
        if header.contains("[StaticGameInfo] <ActiveSceneChanged>")
            && header.contains("new=HallScene")
        {
            self.blocks.push(StageBlock::new(STAGE_MAIN_MENU, at));
            return;
        }
        if header.contains("[MagicCodeRetriever](GetEncryptedMagicCode) s is null:") {
            let mut block = StageBlock::new(STAGE_LOGIN_REQUEST, self.log_time)
                .with_desc(MAGIC_CODE_DESC);
            block.end = Some(at);
            self.blocks.push(block);
            return;
        }
        if header.contains("[LoginRegionManager] <GetLastLoginRgnFromDbNoOverseaData> start") {
            self.blocks.push(
                StageBlock::new(STAGE_LOGIN, at)
                    .with_desc(LOGIN_REGION_DESC)
                    .with_thread(thread),
            );
            return;
        }
        if header.contains("[LoginRegionManager] <GetLastLoginRgnFromDbNoOverseaData> cn: ") {
            if let Some(block) =
                self.find_block(|b| b.stage == STAGE_LOGIN && b.desc == LOGIN_REGION_DESC)
            {
                block.close(at, thread);
            }
            return;
        }

        let has_guid = header.contains("Guid =");

        if let Some(caps) = GUID_URI_RE.captures(header) {
            let block = request_block(message, &caps["guid"], &caps["uri"], at, thread, registry);
            self.blocks.push(block);
            return;
        }
        if has_guid && header.contains("uri =") {
            warn!(line = header, "request line could not be parsed");
        }

        if let Some(caps) = GUID_RESPONSE_RE.captures(header) {
            let guid = &caps["guid"];
            if let Some(block) = self.find_block(|b| b.guid.as_deref() == Some(guid)) {
                block.close(at, thread);
                if let Some((_, body)) = header.rsplit_once(FULL_CONTENT_MARKER) {
                    block.set_response(body);
                } else if header.contains(SERVER_ERROR_MARKER) {
                    let message = header.rsplit("message = ").next().unwrap_or_default();
                    block.set_response(message);
                    block.response.code = header
                        .rsplit("http code = ")
                        .next()
                        .and_then(|tail| tail.split(',').next())
                        .map(str::to_string);
                    block.response.message = Some(message.to_string());
                } else {
                    block.set_response(header);
                }
            }
            return;
        }
        if has_guid && header.contains("code =") {
            warn!(line = header, "response line could not be parsed");
        }

        if let Some(caps) = GUID_TIMEOUT_RE.captures(header) {
            let guid = &caps["guid"];
            if let Some(block) = self.find_block(|b| b.guid.as_deref() == Some(guid)) {
                block.close(at, thread);
            }
            return;
        }
        if has_guid {
            debug!(line = header, "unhandled request line");
        }
    }
}

fn request_block(
    message: &LogMessage,
    guid: &str,
    uri: &str,
    at: DateTime<Utc>,
    thread: Option<u32>,
    registry: &EnvironmentRegistry,
) -> StageBlock {
    let uri = uri.trim();
    let uri = if uri.contains("/init_code") || uri.contains("mageUs") {
        MAGIC_CODE_OVERSEAS
    } else if uri.contains("mage") {
        MAGIC_CODE_CHINA
    } else {
        uri
    };

    let is_login = uri.contains(MAGIC_CODE)
        || LOGIN_PATHS.iter().any(|path| uri.ends_with(path))
        || (uri.ends_with("/account-info")
            && message
                .trace
                .iter()
                .any(|line| line.contains(".LoginManagerAsync.")));
    let stage = if is_login {
        STAGE_LOGIN_REQUEST
    } else {
        STAGE_NETWORK_REQUEST
    };

    let lambda = LambdaTarget::from_uri(uri, registry);
    let desc = match &lambda {
        Some(target) => format!("{}_{}", target.path, target.region_label),
        None => uri.to_string(),
    };
    let mut block = StageBlock::new(stage, at).with_desc(desc).with_thread(thread);
    block.guid = Some(guid.to_string());
    block.lambda = lambda;
    block
}

/// Parse the text of a client log named `file_name`
pub fn parse_client_log(
    file_name: &str,
    text: &str,
    registry: &EnvironmentRegistry,
) -> Result<ClientLog, ClientLogError> {
    let log_time = log_time_from_file_name(file_name)
        .ok_or_else(|| ClientLogError::MissingLogTime(file_name.to_string()))?;

    let mut log = ClientLog {
        file_name: file_name.to_string(),
        log_time,
        build: None,
        blocks: vec![StageBlock::new(STAGE_LOG_FILE, log_time)],
    };

    let messages = split_messages(text);
    let mut year = log_time.year();
    let mut rolled_over = false;
    let mut prev_stamp: Option<String> = None;
    for message in &messages {
        let Some(caps) = HEADER_RE.captures(message.header()) else {
            continue;
        };
        let stamp = &caps["dt"];
        let thread = caps["thread"].parse().ok();

        if !rolled_over
            && prev_stamp.as_deref().is_some_and(|p| p.starts_with("12"))
            && stamp.starts_with("01")
        {
            year += 1;
            rolled_over = true;
            info!(year, "log crosses into a new year");
        }
        prev_stamp = Some(stamp.to_string());

        let Some(at) = parse_line_time(year, stamp) else {
            warn!(stamp, "invalid message time");
            continue;
        };
        log.apply(message, at, thread, registry);
    }

    info!(
        file = file_name,
        messages = messages.len(),
        stages = log.blocks.len(),
        requests = log.requests().count(),
        "parsed client log"
    );
    Ok(log)
}

/// Read and parse a client log file
pub fn read_client_log(
    path: &Path,
    registry: &EnvironmentRegistry,
) -> Result<ClientLog, ClientLogError> {
    let text = fs::read_to_string(path).map_err(|source| ClientLogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    parse_client_log(file_name, &text, registry)
}

fn format_secs(ms: i64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

#[derive(Serialize)]
struct GuidRow<'a> {
    #[serde(rename = "DtStart")]
    start: String,
    #[serde(rename = "MsDuration")]
    duration: String,
    #[serde(rename = "GUID")]
    guid: &'a str,
    #[serde(rename = "StageDesc")]
    desc: &'a str,
    #[serde(rename = "LambdaRgn")]
    region_label: &'a str,
    #[serde(rename = "LambdaRespCode")]
    code: Option<&'a str>,
    #[serde(rename = "LambdaRespMessage")]
    message: Option<&'a str>,
    #[serde(rename = "LambdaRespResult")]
    result: Option<&'a str>,
    #[serde(rename = "LogGroupUri")]
    link: Option<String>,
    #[serde(rename = "LambdaResp")]
    body: Option<&'a str>,
}

#[derive(Serialize)]
struct StageRow<'a> {
    #[serde(rename = "Build")]
    build: Option<&'a str>,
    #[serde(rename = "LogDt")]
    log_time: String,
    #[serde(rename = "StageName")]
    stage: &'a str,
    #[serde(rename = "StageDesc")]
    desc: &'a str,
    #[serde(rename = "DtStart")]
    start: String,
    #[serde(rename = "DtEnd")]
    end: Option<String>,
    #[serde(rename = "MsStart")]
    offset_start: String,
    #[serde(rename = "MsEnd")]
    offset_end: Option<String>,
    #[serde(rename = "MsDuration")]
    duration: String,
    #[serde(rename = "GapSec")]
    gap: String,
    #[serde(rename = "ThreadStart")]
    thread_start: Option<u32>,
    #[serde(rename = "ThreadEnd")]
    thread_end: Option<u32>,
    #[serde(rename = "GUID")]
    guid: Option<&'a str>,
    #[serde(rename = "Lambda")]
    lambda: Option<&'a str>,
    #[serde(rename = "LambdaRgn")]
    region_label: Option<&'a str>,
}

fn tab_writer(path: &Path) -> Result<csv::Writer<fs::File>, CsvError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CsvError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|source| CsvError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

fn finish(path: &Path, mut writer: csv::Writer<fs::File>, rows: usize) -> Result<(), CsvError> {
    writer.flush().map_err(|source| CsvError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), rows, "wrote client log report");
    Ok(())
}

/// One tab-separated row per gateway request
pub fn write_guid_csv(path: &Path, log: &ClientLog) -> Result<(), CsvError> {
    let mut writer = tab_writer(path)?;
    let mut rows = 0;
    for block in log.requests() {
        writer
            .serialize(GuidRow {
                start: format_time(&block.start),
                duration: format_secs(block.duration_ms()),
                guid: block.guid.as_deref().unwrap_or_default(),
                desc: &block.desc,
                region_label: block.lambda.as_ref().map(|t| t.region_label).unwrap_or_default(),
                code: block.response.code.as_deref(),
                message: block.response.message.as_deref(),
                result: block.response.result.as_deref(),
                link: block.log_group_link(),
                body: block.response.body.as_deref(),
            })
            .map_err(|source| CsvError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
        rows += 1;
    }
    finish(path, writer, rows)
}

/// One tab-separated row per stage, with the gap to the previous stage
pub fn write_stage_csv(path: &Path, log: &ClientLog) -> Result<(), CsvError> {
    let mut writer = tab_writer(path)?;
    let log_time = format_time(&log.log_time);
    let mut prev_start: Option<DateTime<Utc>> = None;
    for block in &log.blocks {
        let gap_ms = prev_start
            .map(|prev| (block.start - prev).num_milliseconds())
            .unwrap_or(0);
        prev_start = Some(block.start);

        writer
            .serialize(StageRow {
                build: log.build.as_deref(),
                log_time: log_time.clone(),
                stage: &block.stage,
                desc: &block.desc,
                start: format_time(&block.start),
                end: block.end.as_ref().map(format_time),
                offset_start: format_secs(log.offset_ms(block.start)),
                offset_end: block.end.map(|end| format_secs(log.offset_ms(end))),
                duration: format_secs(block.duration_ms()),
                gap: format_secs(gap_ms),
                thread_start: block.thread_start,
                thread_end: block.thread_end,
                guid: block.guid.as_deref(),
                lambda: block.lambda.as_ref().map(|t| t.path.as_str()),
                region_label: block.lambda.as_ref().map(|t| t.region_label),
            })
            .map_err(|source| CsvError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
    }
    finish(path, writer, log.blocks.len())
}
