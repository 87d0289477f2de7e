//! Log group export to S3
//!
//! Plans and drives a CloudWatch `CreateExportTask` into a per-region bucket.
//! The calls themselves go through [`ExportBackend`].

use std::future::Future;
use std::time::Duration;

use alertscope_types::{Environment, is_china_region};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ExportError;
use crate::profile::AccountIds;
use crate::urls::s3_bucket_url;

/// Default poll interval for export task status
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// User input for an export
#[derive(Clone, Debug)]
pub struct ExportRequest {
    pub environment: Environment,
    pub region: String,
    pub log_group: String,
    pub bucket_prefix: String,
    pub s3_prefix: Option<String>,
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
}

/// Everything decided before any backend call
#[derive(Clone, Debug, PartialEq)]
pub struct ExportPlan {
    pub region: String,
    pub log_group: String,
    pub bucket_name: String,
    pub s3_prefix: String,
    pub account_id: String,
    pub policy: Value,
    pub task_name: String,

    /// `None` means the log group's creation time
    pub start_ms: Option<i64>,
    pub end_ms: i64,
}

impl ExportPlan {
    pub fn new(request: &ExportRequest, accounts: &AccountIds, now: DateTime<Utc>) -> Self {
        let bucket_name = format!("{}-{}", request.bucket_prefix, request.region);
        let s3_prefix = request
            .s3_prefix
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| default_s3_prefix(&request.log_group));
        let account_id = accounts
            .select(&request.region, request.environment.prod)
            .to_string();
        let now_ms = now.timestamp_millis();

        Self {
            policy: bucket_policy(&request.region, &bucket_name, &account_id),
            region: request.region.clone(),
            log_group: request.log_group.clone(),
            bucket_name,
            s3_prefix,
            account_id,
            task_name: format!("{}-{}", request.log_group, now_ms),
            start_ms: request.start_ms,
            end_ms: request.end_ms.unwrap_or(now_ms),
        }
    }

    pub fn bucket_url(&self) -> String {
        s3_bucket_url(&self.region, &self.bucket_name)
    }

    /// S3 key under which the task writes its objects
    pub fn download_key(&self, task_id: &str) -> String {
        format!("{}/{}", self.s3_prefix, task_id)
    }
}

/// Last non-empty segment of a log group name
fn default_s3_prefix(log_group: &str) -> String {
    log_group
        .split('/')
        .filter(|s| !s.is_empty())
        .next_back()
        .unwrap_or_default()
        .to_string()
}

/// Bucket policy letting the regional logs service write exports
pub fn bucket_policy(region: &str, bucket_name: &str, account_id: &str) -> Value {
    let (service, partition) = if is_china_region(region) {
        (format!("logs.{}.amazonaws.com.cn", region), "aws-cn")
    } else {
        (format!("logs.{}.amazonaws.com", region), "aws")
    };
    let resource_root = format!("arn:{}:s3:::{}", partition, bucket_name);
    let source_arn = format!("arn:{}:logs:{}:{}:*", partition, region, account_id);

    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Sid": "AllowGetBucketAclForLogsService",
                "Effect": "Allow",
                "Principal": { "Service": service },
                "Action": "s3:GetBucketAcl",
                "Resource": resource_root
            },
            {
                "Sid": "AllowPutObjectForLogsService",
                "Effect": "Allow",
                "Principal": { "Service": service },
                "Action": "s3:PutObject",
                "Resource": format!("{}/*", resource_root),
                "Condition": {
                    "StringEquals": {
                        "s3:x-amz-acl": "bucket-owner-full-control",
                        "aws:SourceAccount": account_id
                    },
                    "ArnLike": { "aws:SourceArn": source_arn }
                }
            }
        ]
    })
}

/// A log group as described by the backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogGroupInfo {
    pub name: String,
    pub creation_time_ms: i64,
}

/// Status code of an export task
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportTaskState {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
    PendingCancel,
    Other(String),
}

impl ExportTaskState {
    pub fn from_code(code: &str) -> Self {
        match code {
            "PENDING" => Self::Pending,
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Completed,
            "CANCELLED" => Self::Cancelled,
            "FAILED" => Self::Failed,
            "PENDING_CANCEL" => Self::PendingCancel,
            other => Self::Other(other.to_string()),
        }
    }

    /// Still pending or running
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// Snapshot of a task returned by `DescribeExportTasks`
#[derive(Clone, Debug)]
pub struct ExportTaskStatus {
    pub state: ExportTaskState,
    pub creation_time_ms: Option<i64>,
    pub completion_time_ms: Option<i64>,
}

/// Backend calls needed by an export
pub trait ExportBackend: Send + Sync {
    fn bucket_exists(
        &self,
        region: &str,
        bucket: &str,
    ) -> impl Future<Output = Result<bool, ExportError>> + Send;

    fn create_bucket(
        &self,
        region: &str,
        bucket: &str,
    ) -> impl Future<Output = Result<(), ExportError>> + Send;

    fn bucket_policy(
        &self,
        region: &str,
        bucket: &str,
    ) -> impl Future<Output = Result<Option<String>, ExportError>> + Send;

    fn put_bucket_policy(
        &self,
        region: &str,
        bucket: &str,
        policy: &str,
    ) -> impl Future<Output = Result<(), ExportError>> + Send;

    fn describe_log_groups(
        &self,
        region: &str,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<LogGroupInfo>, ExportError>> + Send;

    /// Returns the task id, if one was assigned
    fn create_export_task(
        &self,
        plan: &ExportPlan,
        from_ms: i64,
        to_ms: i64,
    ) -> impl Future<Output = Result<Option<String>, ExportError>> + Send;

    fn describe_export_task(
        &self,
        region: &str,
        task_id: &str,
    ) -> impl Future<Output = Result<ExportTaskStatus, ExportError>> + Send;
}

/// Result of a finished export task
#[derive(Clone, Debug)]
pub struct ExportOutcome {
    pub task_id: String,
    pub state: ExportTaskState,

    /// Completion minus creation time, when both are known
    pub span_ms: Option<i64>,
    pub download_key: String,
}

/// Prepare the bucket, start the export task and wait for it to settle
pub async fn run_export<B: ExportBackend>(
    backend: &B,
    plan: &ExportPlan,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Result<ExportOutcome, ExportError> {
    info!(
        log_group = %plan.log_group,
        bucket = %plan.bucket_name,
        s3_prefix = %plan.s3_prefix,
        "starting export"
    );

    if !backend.bucket_exists(&plan.region, &plan.bucket_name).await? {
        info!(bucket = %plan.bucket_name, "creating bucket");
        backend.create_bucket(&plan.region, &plan.bucket_name).await?;
    }

    let current = backend
        .bucket_policy(&plan.region, &plan.bucket_name)
        .await?
        .and_then(|p| serde_json::from_str::<Value>(&p).ok());
    if current.as_ref() != Some(&plan.policy) {
        info!(bucket = %plan.bucket_name, "updating bucket policy");
        backend
            .put_bucket_policy(&plan.region, &plan.bucket_name, &plan.policy.to_string())
            .await?;
    }

    let log_group = backend
        .describe_log_groups(&plan.region, &plan.log_group)
        .await?
        .into_iter()
        .find(|g| g.name == plan.log_group)
        .ok_or_else(|| ExportError::LogGroupNotFound {
            log_group: plan.log_group.clone(),
            region: plan.region.clone(),
        })?;

    let from_ms = plan.start_ms.unwrap_or(log_group.creation_time_ms);
    let task_id = backend
        .create_export_task(plan, from_ms, plan.end_ms)
        .await?
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ExportError::TaskNotCreated(plan.task_name.clone()))?;
    debug!(%task_id, bucket_url = %plan.bucket_url(), "export task created");

    let status = loop {
        let status = backend.describe_export_task(&plan.region, &task_id).await?;
        if !status.state.is_active() {
            break status;
        }
        debug!(%task_id, state = ?status.state, "export task in progress");

        tokio::select! {
            _ = cancel.cancelled() => return Err(ExportError::Cancelled(task_id)),
            _ = tokio::time::sleep(poll_interval) => {}
        }
    };

    let span_ms = match (status.creation_time_ms, status.completion_time_ms) {
        (Some(created), Some(completed)) => Some(completed - created),
        _ => None,
    };
    info!(%task_id, state = ?status.state, span_ms, "export task finished");

    Ok(ExportOutcome {
        download_key: plan.download_key(&task_id),
        task_id,
        state: status.state,
        span_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use parking_lot::Mutex;

    fn accounts() -> AccountIds {
        AccountIds {
            dev_cn: "111".to_string(),
            dev_us: "222".to_string(),
            prod_cn: "333".to_string(),
            prod_us: "444".to_string(),
        }
    }

    fn request(region: &str, prod: bool) -> ExportRequest {
        ExportRequest {
            environment: Environment::new("Standalone", prod),
            region: region.to_string(),
            log_group: "/aws/lambda/Audit2022-ConfigCenterFunction".to_string(),
            bucket_prefix: "lambda-log-export".to_string(),
            s3_prefix: None,
            start_ms: None,
            end_ms: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_plan_defaults() {
        let plan = ExportPlan::new(&request("cn-northwest-1", false), &accounts(), now());
        assert_eq!(plan.bucket_name, "lambda-log-export-cn-northwest-1");
        assert_eq!(plan.s3_prefix, "Audit2022-ConfigCenterFunction");
        assert_eq!(plan.account_id, "111");
        assert_eq!(
            plan.task_name,
            "/aws/lambda/Audit2022-ConfigCenterFunction-1700000000000"
        );
        assert_eq!(plan.start_ms, None);
        assert_eq!(plan.end_ms, 1_700_000_000_000);
        assert_eq!(
            plan.download_key("t-1"),
            "Audit2022-ConfigCenterFunction/t-1"
        );
    }

    #[test]
    fn test_policy_uses_china_partition() {
        let plan = ExportPlan::new(&request("cn-northwest-1", true), &accounts(), now());
        let statements = plan.policy["Statement"].as_array().unwrap();
        assert_eq!(
            statements[0]["Principal"]["Service"],
            "logs.cn-northwest-1.amazonaws.com.cn"
        );
        assert_eq!(
            statements[0]["Resource"],
            "arn:aws-cn:s3:::lambda-log-export-cn-northwest-1"
        );
        assert_eq!(
            statements[1]["Condition"]["ArnLike"]["aws:SourceArn"],
            "arn:aws-cn:logs:cn-northwest-1:333:*"
        );

        let plan = ExportPlan::new(&request("us-east-1", true), &accounts(), now());
        assert_eq!(
            plan.policy["Statement"][1]["Condition"]["StringEquals"]["aws:SourceAccount"],
            "444"
        );
        assert_eq!(
            plan.policy["Statement"][1]["Resource"],
            "arn:aws:s3:::lambda-log-export-us-east-1/*"
        );
    }

    /// In-memory backend recording calls
    #[derive(Default)]
    struct FakeBackend {
        bucket_exists: bool,
        policy: Option<String>,
        groups: Vec<LogGroupInfo>,
        states: Mutex<Vec<&'static str>>,
        calls: Mutex<Vec<String>>,
    }

    impl ExportBackend for FakeBackend {
        async fn bucket_exists(&self, _region: &str, _bucket: &str) -> Result<bool, ExportError> {
            Ok(self.bucket_exists)
        }

        async fn create_bucket(&self, _region: &str, bucket: &str) -> Result<(), ExportError> {
            self.calls.lock().push(format!("create_bucket {}", bucket));
            Ok(())
        }

        async fn bucket_policy(
            &self,
            _region: &str,
            _bucket: &str,
        ) -> Result<Option<String>, ExportError> {
            Ok(self.policy.clone())
        }

        async fn put_bucket_policy(
            &self,
            _region: &str,
            _bucket: &str,
            _policy: &str,
        ) -> Result<(), ExportError> {
            self.calls.lock().push("put_policy".to_string());
            Ok(())
        }

        async fn describe_log_groups(
            &self,
            _region: &str,
            _prefix: &str,
        ) -> Result<Vec<LogGroupInfo>, ExportError> {
            Ok(self.groups.clone())
        }

        async fn create_export_task(
            &self,
            _plan: &ExportPlan,
            from_ms: i64,
            to_ms: i64,
        ) -> Result<Option<String>, ExportError> {
            self.calls
                .lock()
                .push(format!("create_task {} {}", from_ms, to_ms));
            Ok(Some("task-9".to_string()))
        }

        async fn describe_export_task(
            &self,
            _region: &str,
            _task_id: &str,
        ) -> Result<ExportTaskStatus, ExportError> {
            let mut states = self.states.lock();
            let code = if states.len() > 1 {
                states.remove(0)
            } else {
                states[0]
            };
            Ok(ExportTaskStatus {
                state: ExportTaskState::from_code(code),
                creation_time_ms: Some(100),
                completion_time_ms: Some(350),
            })
        }
    }

    #[tokio::test]
    async fn test_run_export_polls_until_done() {
        let plan = ExportPlan::new(&request("us-east-1", false), &accounts(), now());
        let backend = FakeBackend {
            groups: vec![
                LogGroupInfo {
                    name: "/aws/lambda/Audit2022-ConfigCenterFunction-Other".to_string(),
                    creation_time_ms: 1,
                },
                LogGroupInfo {
                    name: plan.log_group.clone(),
                    creation_time_ms: 42,
                },
            ],
            states: Mutex::new(vec!["PENDING", "RUNNING", "COMPLETED"]),
            ..Default::default()
        };

        let outcome = run_export(&backend, &plan, Duration::from_millis(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.task_id, "task-9");
        assert_eq!(outcome.state, ExportTaskState::Completed);
        assert_eq!(outcome.span_ms, Some(250));
        assert_eq!(outcome.download_key, "Audit2022-ConfigCenterFunction/task-9");

        let calls = backend.calls.lock();
        assert_eq!(calls[0], "create_bucket lambda-log-export-us-east-1");
        assert_eq!(calls[1], "put_policy");
        assert_eq!(calls[2], "create_task 42 1700000000000");
    }

    #[tokio::test]
    async fn test_run_export_skips_matching_policy_and_reports_missing_group() {
        let plan = ExportPlan::new(&request("us-east-1", false), &accounts(), now());
        let backend = FakeBackend {
            bucket_exists: true,
            policy: Some(plan.policy.to_string()),
            states: Mutex::new(vec!["COMPLETED"]),
            ..Default::default()
        };

        let err = run_export(&backend, &plan, Duration::from_millis(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::LogGroupNotFound { .. }));
        assert!(backend.calls.lock().is_empty());
    }
}
