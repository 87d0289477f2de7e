//! Live AWS backends
//!
//! [`CloudWatchSource`] answers filter queries with `FilterLogEvents`;
//! [`AwsExportBackend`] drives bucket setup and `CreateExportTask`. Both are
//! bound to the region of the [`SdkConfig`] they were built from.

use alertscope_types::RawLogEvent;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_cloudwatchlogs::types::FilteredLogEvent;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use tracing::debug;

use crate::error::{ExportError, SourceError};
use crate::export::{ExportBackend, ExportPlan, ExportTaskState, ExportTaskStatus, LogGroupInfo};
use crate::source::{FilterLogEventsPage, FilterLogEventsRequest, LogEventSource};

/// Region whose buckets take no location constraint
const S3_DEFAULT_REGION: &str = "us-east-1";

/// SDK configuration for a region, with a named profile when one is given
pub async fn load_sdk_config(region: &str, profile: Option<&str>) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
    if let Some(profile) = profile.filter(|p| !p.is_empty()) {
        loader = loader.profile_name(profile);
    }
    debug!(region, profile, "loading AWS configuration");
    loader.load().await
}

/// CloudWatch Logs reached through the AWS SDK
#[derive(Clone, Debug)]
pub struct CloudWatchSource {
    client: aws_sdk_cloudwatchlogs::Client,
}

impl CloudWatchSource {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_cloudwatchlogs::Client::new(config),
        }
    }

    pub async fn connect(region: &str, profile: Option<&str>) -> Self {
        Self::new(&load_sdk_config(region, profile).await)
    }
}

impl LogEventSource for CloudWatchSource {
    async fn filter_log_events(
        &self,
        request: &FilterLogEventsRequest,
    ) -> Result<FilterLogEventsPage, SourceError> {
        let output = self
            .client
            .filter_log_events()
            .log_group_name(request.log_group_name.as_str())
            .set_filter_pattern(request.filter_pattern.clone())
            .set_start_time(request.start_time)
            .set_end_time(request.end_time)
            .set_next_token(request.next_token.clone())
            .send()
            .await
            .map_err(|e| SourceError::from_service_message(DisplayErrorContext(e).to_string()))?;

        Ok(FilterLogEventsPage {
            events: output.events().iter().map(raw_event).collect(),
            next_token: output.next_token().map(str::to_string),
        })
    }
}

fn raw_event(event: &FilteredLogEvent) -> RawLogEvent {
    RawLogEvent {
        log_stream_name: event.log_stream_name().unwrap_or_default().to_string(),
        timestamp: event.timestamp().unwrap_or_default(),
        message: event.message().unwrap_or_default().to_string(),
        ingestion_time: event.ingestion_time(),
        event_id: event.event_id().map(str::to_string),
    }
}

/// S3 and CloudWatch Logs clients for one region
#[derive(Clone, Debug)]
pub struct AwsExportBackend {
    logs: aws_sdk_cloudwatchlogs::Client,
    s3: aws_sdk_s3::Client,
}

impl AwsExportBackend {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            logs: aws_sdk_cloudwatchlogs::Client::new(config),
            s3: aws_sdk_s3::Client::new(config),
        }
    }

    pub async fn connect(region: &str, profile: Option<&str>) -> Self {
        Self::new(&load_sdk_config(region, profile).await)
    }
}

fn backend_error<E: std::error::Error>(error: E) -> ExportError {
    ExportError::Backend(DisplayErrorContext(error).to_string())
}

impl ExportBackend for AwsExportBackend {
    async fn bucket_exists(&self, _region: &str, bucket: &str) -> Result<bool, ExportError> {
        match self.s3.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(backend_error(e)),
        }
    }

    async fn create_bucket(&self, region: &str, bucket: &str) -> Result<(), ExportError> {
        let mut call = self.s3.create_bucket().bucket(bucket);
        if region != S3_DEFAULT_REGION {
            call = call.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        call.send().await.map(|_| ()).map_err(backend_error)
    }

    async fn bucket_policy(
        &self,
        _region: &str,
        bucket: &str,
    ) -> Result<Option<String>, ExportError> {
        match self.s3.get_bucket_policy().bucket(bucket).send().await {
            Ok(output) => Ok(output.policy().map(str::to_string)),
            Err(e)
                if e.as_service_error().and_then(|se| se.code()) == Some("NoSuchBucketPolicy") =>
            {
                Ok(None)
            }
            Err(e) => Err(backend_error(e)),
        }
    }

    async fn put_bucket_policy(
        &self,
        _region: &str,
        bucket: &str,
        policy: &str,
    ) -> Result<(), ExportError> {
        self.s3
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .map(|_| ())
            .map_err(backend_error)
    }

    async fn describe_log_groups(
        &self,
        _region: &str,
        prefix: &str,
    ) -> Result<Vec<LogGroupInfo>, ExportError> {
        let mut groups = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .logs
                .describe_log_groups()
                .log_group_name_prefix(prefix)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(backend_error)?;

            groups.extend(output.log_groups().iter().map(|group| LogGroupInfo {
                name: group.log_group_name().unwrap_or_default().to_string(),
                creation_time_ms: group.creation_time().unwrap_or_default(),
            }));
            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(groups)
    }

    async fn create_export_task(
        &self,
        plan: &ExportPlan,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Option<String>, ExportError> {
        let output = self
            .logs
            .create_export_task()
            .task_name(plan.task_name.as_str())
            .log_group_name(plan.log_group.as_str())
            .from(from_ms)
            .to(to_ms)
            .destination(plan.bucket_name.as_str())
            .destination_prefix(plan.s3_prefix.as_str())
            .send()
            .await
            .map_err(backend_error)?;
        Ok(output.task_id().map(str::to_string))
    }

    async fn describe_export_task(
        &self,
        _region: &str,
        task_id: &str,
    ) -> Result<ExportTaskStatus, ExportError> {
        let output = self
            .logs
            .describe_export_tasks()
            .task_id(task_id)
            .send()
            .await
            .map_err(backend_error)?;
        let task = output
            .export_tasks()
            .first()
            .ok_or_else(|| ExportError::Backend(format!("export task {} not found", task_id)))?;

        let state = task
            .status()
            .and_then(|status| status.code())
            .map(|code| ExportTaskState::from_code(code.as_str()))
            .unwrap_or_else(|| ExportTaskState::Other("UNKNOWN".to_string()));
        let info = task.execution_info();
        Ok(ExportTaskStatus {
            state,
            creation_time_ms: info.and_then(|i| i.creation_time()),
            completion_time_ms: info.and_then(|i| i.completion_time()),
        })
    }
}
