use std::fs;
use std::io::Read;
use std::path::PathBuf;

use alertscope_cloudwatch::urls::lambda_function_url;
use alertscope_logs::{
    AnalysisReport, TriageError, TriagePipeline, TriageSettings, parse_alert,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{LogSource, parse_time, print_remediation};
use crate::config::Config;
use crate::output::publish_report;

/// Alert lines echoed before searching
const ALERT_PREVIEW_LINES: usize = 8;

#[derive(Args, Debug)]
pub struct TriageArgs {
    /// Pasted alert; defaults to <data_dir>/input.txt, then stdin
    #[arg(long, value_name = "FILE")]
    alert_file: Option<PathBuf>,

    /// Search from this time instead of the window before the alarm
    #[arg(long, value_parser = parse_time)]
    start: Option<DateTime<Utc>>,

    /// Search up to this time instead of the alarm time
    #[arg(long, value_parser = parse_time)]
    end: Option<DateTime<Utc>>,

    /// Read captured filter-log-events responses instead of CloudWatch
    #[arg(long, value_name = "DIR")]
    replay: Option<PathBuf>,
}

pub async fn run(args: TriageArgs, config: &Config, verbose: bool) -> Result<()> {
    let (text, origin) = read_alert(args.alert_file.as_ref(), config)?;
    println!("告警信息来源：{}", origin);
    println!("告警信息: {}", "-".repeat(53));
    for line in text.trim().lines().take(ALERT_PREVIEW_LINES) {
        println!("{}", line);
    }
    println!();

    let alert = parse_alert(&text).context("Invalid alert payload")?;
    let prod = config
        .registry()
        .by_name(alert.environment_name())
        .is_some_and(|env| env.prod);

    let source = LogSource::open(args.replay, config, &alert.region, prod).await;
    let settings = TriageSettings {
        data_dir: config.data_dir.clone(),
        window: config.window(),
        verbose,
    };
    let pipeline = TriagePipeline::new(source, settings);

    let window = pipeline.window_for(&alert, args.start, args.end);
    println!("搜索: {}", "-".repeat(57));
    println!("日志组: {}", alert.log_group());
    println!("地区: {}", alert.region);
    if let (Some(start), Some(end)) = (window.start, window.end) {
        println!("开始时间：{}", start);
        println!("结束时间：{}", end);
    }
    println!();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = match pipeline.run(&alert, args.start, args.end, &cancel).await {
        Ok(outcome) => outcome,
        Err(TriageError::Source(e)) if e.is_expired_token() => {
            print_remediation(config, &alert.region, prod);
            return Err(e).context("Log fetch failed");
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "Error 日志：{} 条 -> {}",
        outcome.error_count,
        outcome.error_csv.display()
    );
    match &outcome.full_csv {
        Some(path) => println!("完整日志：{} 条 -> {}", outcome.full_count, path.display()),
        None => println!("请求 ID 集为空，没法获取完整日志"),
    }
    println!();

    match &outcome.classification {
        Some(classification) => {
            publish_report(&AnalysisReport::from_classification(classification), config)?
        }
        None => info!(function = %alert.function_name, "nothing to classify"),
    }

    println!();
    println!("{}", lambda_function_url(&alert.region, &alert.function_name));
    Ok(())
}

/// Alert text and where it came from
fn read_alert(file: Option<&PathBuf>, config: &Config) -> Result<(String, String)> {
    if let Some(path) = file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read alert {}", path.display()))?;
        return Ok((text, path.display().to_string()));
    }

    let input = config.data_dir.join("input.txt");
    if let Ok(text) = fs::read_to_string(&input) {
        if !text.trim().is_empty() {
            return Ok((text, input.display().to_string()));
        }
    }

    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read alert from stdin")?;
    Ok((text, "stdin".to_string()))
}
