use alertscope_cloudwatch::{
    AwsExportBackend, DEFAULT_POLL_INTERVAL, ExportPlan, ExportRequest, run_export,
};
use alertscope_types::{complete_log_group_name, resolve_region};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use tokio_util::sync::CancellationToken;

use super::aws_profile;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Environment the log group belongs to
    #[arg(long = "environment-name", visible_alias = "en")]
    environment_name: String,

    #[arg(long, visible_alias = "rgn")]
    region: String,

    /// Log group or function name
    #[arg(long = "log-group-name", visible_alias = "lg")]
    log_group_name: String,

    /// Bucket name prefix; the region is appended
    #[arg(
        long = "s3-bucket-name-prefix",
        visible_alias = "bp",
        default_value = "lambda-log-export"
    )]
    bucket_prefix: String,

    /// Key prefix inside the bucket (default: last segment of the log group)
    #[arg(long = "s3-prefix", visible_alias = "sp")]
    s3_prefix: Option<String>,

    /// Export from this time, ms since the epoch (default: log group creation)
    #[arg(long = "start-ts-ms", visible_alias = "st")]
    start_ms: Option<i64>,

    /// Export up to this time, ms since the epoch (default: now)
    #[arg(long = "end-ts-ms", visible_alias = "et")]
    end_ms: Option<i64>,

    /// Print the plan without calling AWS
    #[arg(long)]
    dry_run: bool,
}

pub async fn run(args: ExportArgs, config: &Config) -> Result<()> {
    let plan = plan(&args, config, Utc::now())?;
    print_plan(&plan)?;
    if args.dry_run {
        return Ok(());
    }

    let prod = config
        .registry()
        .by_name(&args.environment_name)
        .is_some_and(|env| env.prod);
    let profile = aws_profile(config, &plan.region, prod);
    let backend = AwsExportBackend::connect(&plan.region, profile.as_deref()).await;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = run_export(&backend, &plan, DEFAULT_POLL_INTERVAL, &cancel)
        .await
        .context("Export failed")?;

    println!();
    println!("任务: {} {:?}", outcome.task_id, outcome.state);
    if let Some(span_ms) = outcome.span_ms {
        println!("耗时: {:.1}s", span_ms as f64 / 1000.0);
    }
    println!("S3 key: {}", outcome.download_key);
    Ok(())
}

fn print_plan(plan: &ExportPlan) -> Result<()> {
    println!("Export plan: {}", "-".repeat(40));
    println!("日志组: {}", plan.log_group);
    println!("地区: {}", plan.region);
    println!("Bucket: {}", plan.bucket_name);
    println!("S3 prefix: {}", plan.s3_prefix);
    println!("Task: {}", plan.task_name);
    match plan.start_ms {
        Some(start) => println!("From: {} ms", start),
        None => println!("From: log group creation"),
    }
    println!("To: {} ms", plan.end_ms);
    println!("Bucket policy:");
    println!(
        "{}",
        serde_json::to_string_pretty(&plan.policy).context("Failed to render bucket policy")?
    );
    println!();
    println!("{}", plan.bucket_url());
    Ok(())
}

fn plan(args: &ExportArgs, config: &Config, now: DateTime<Utc>) -> Result<ExportPlan> {
    let region = resolve_region(&args.region)
        .with_context(|| format!("Unsupported region: {}", args.region))?;
    let environment = config
        .registry()
        .by_name(&args.environment_name)
        .cloned()
        .with_context(|| format!("Unknown environment: {}", args.environment_name))?;

    let request = ExportRequest {
        environment,
        region: region.to_string(),
        log_group: complete_log_group_name(&args.log_group_name),
        bucket_prefix: args.bucket_prefix.clone(),
        s3_prefix: args.s3_prefix.clone(),
        start_ms: args.start_ms,
        end_ms: args.end_ms,
    };
    Ok(ExportPlan::new(&request, &config.accounts, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        export: ExportArgs,
    }

    fn parse(args: &[&str]) -> ExportArgs {
        let mut argv = vec!["export"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().export
    }

    #[test]
    fn test_required_flags() {
        assert!(Cli::try_parse_from(["export", "--en", "PartyAnimals"]).is_err());
    }

    #[test]
    fn test_plan_from_flags() {
        let args = parse(&[
            "--en",
            "PartyAnimals",
            "--rgn",
            "NX",
            "--lg",
            "PartyAnimals--1-StoreFunction",
            "--st",
            "1000",
        ]);
        let mut config = Config::default();
        config.accounts.prod_cn = "333".to_string();
        let now = DateTime::from_timestamp_millis(5_000).unwrap();

        let plan = plan(&args, &config, now).unwrap();
        assert_eq!(plan.region, "cn-northwest-1");
        assert_eq!(plan.log_group, "/aws/lambda/PartyAnimals--1-StoreFunction");
        assert_eq!(plan.bucket_name, "lambda-log-export-cn-northwest-1");
        assert_eq!(plan.s3_prefix, "PartyAnimals--1-StoreFunction");
        assert_eq!(plan.account_id, "333");
        assert_eq!(plan.start_ms, Some(1000));
        assert_eq!(plan.end_ms, 5_000);
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_calls() {
        let args = parse(&["--en", "PartyAnimals", "--rgn", "US", "--lg", "Fn", "--dry-run"]);
        assert!(args.dry_run);
        run(args, &Config::default()).await.unwrap();
    }

    #[test]
    fn test_unknown_environment() {
        let args = parse(&["--en", "Nowhere", "--rgn", "US", "--lg", "Fn"]);
        let err = plan(&args, &Config::default(), Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "Unknown environment: Nowhere");
    }
}
