use std::collections::HashMap;
use std::path::PathBuf;

use alertscope_cloudwatch::{SourceError, TimeWindow};
use alertscope_logs::{
    SearchManager, SearchRequest, SearchTarget, SortOrder, format_csv_datetime,
};
use alertscope_types::{complete_log_group_name, resolve_region};
use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use clap::{ArgGroup, Args};

use super::{LogSource, parse_time, print_remediation};
use crate::config::Config;

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("sort_order")
        .args(["ascending", "descending", "order", "orderby", "sort"])
        .multiple(false)
))]
pub struct SearchArgs {
    /// Log group or function names
    #[arg(value_name = "LOG_GROUP", required = true)]
    log_groups: Vec<String>,

    /// Stop searching a log group at its first hit
    #[arg(long, visible_alias = "f1")]
    find_first: bool,

    /// Regions (BJ, NX, JP, AP, EU, US or full names)
    #[arg(long, visible_alias = "rgn", num_args = 1.., value_name = "REGION")]
    regions: Vec<String>,

    /// Start time, e.g. 2024-07-20 18:29:00+0800
    #[arg(long, visible_alias = "utc-s", value_parser = parse_time)]
    utc_start: Option<DateTime<Utc>>,

    /// End time, e.g. 2024-07-20 18:29:00+0800
    #[arg(long, visible_alias = "utc-e", value_parser = parse_time)]
    utc_end: Option<DateTime<Utc>>,

    /// Oldest first (default)
    #[arg(long, visible_alias = "asc")]
    ascending: bool,

    /// Newest first
    #[arg(long, visible_alias = "desc")]
    descending: bool,

    #[arg(long, value_parser = ["asc", "desc"])]
    order: Option<String>,

    #[arg(long, value_parser = ["asc", "desc"])]
    orderby: Option<String>,

    #[arg(long, value_parser = ["asc", "desc"])]
    sort: Option<String>,

    /// Filter pattern: `%regex%`, `"phrase"` or space-separated terms
    #[arg(long)]
    pattern: Option<String>,

    /// Search one log group and region at a time
    #[arg(long)]
    sequential: bool,

    /// Read captured filter-log-events responses instead of CloudWatch
    #[arg(long, value_name = "DIR")]
    replay: Option<PathBuf>,
}

impl SearchArgs {
    fn sort_order(&self) -> Result<SortOrder> {
        if self.descending {
            return Ok(SortOrder::Descending);
        }
        match self.order.as_ref().or(self.orderby.as_ref()).or(self.sort.as_ref()) {
            Some(value) => value.parse().map_err(anyhow::Error::msg),
            None => Ok(SortOrder::Ascending),
        }
    }
}

/// Full region names, sorted; every unsupported entry is reported at once
fn resolve_regions(requested: &[String], defaults: &[String]) -> Result<Vec<String>> {
    let requested = if requested.is_empty() { defaults } else { requested };

    let bad: Vec<&str> = requested
        .iter()
        .map(String::as_str)
        .filter(|r| resolve_region(r).is_none())
        .collect();
    if !bad.is_empty() {
        anyhow::bail!("Unsupported regions: {}", bad.join(", "));
    }

    let mut regions: Vec<String> = requested
        .iter()
        .filter_map(|r| resolve_region(r))
        .map(str::to_string)
        .collect();
    regions.sort();
    regions.dedup();
    Ok(regions)
}

pub async fn run(args: SearchArgs, config: &Config) -> Result<()> {
    let regions = resolve_regions(&args.regions, &config.default_regions)?;
    let order = args.sort_order()?;
    let registry = config.registry();
    let prod = args.log_groups.iter().any(|group| {
        registry
            .from_log_group(&complete_log_group_name(group))
            .is_some_and(|env| env.prod)
    });

    // One source per region so concurrent workers share its client or cache
    let mut sources: HashMap<String, LogSource> = HashMap::new();
    for region in &regions {
        let source = LogSource::open(args.replay.clone(), config, region, prod).await;
        sources.insert(region.clone(), source);
    }

    let request = SearchRequest::new(&args.log_groups, &regions)
        .with_pattern(args.pattern.clone())
        .with_window(TimeWindow::new(args.utc_start, args.utc_end))
        .stop_on_first_match(args.find_first)
        .with_sort_order(order)
        .sequential(args.sequential)
        .with_refresh(config.refresh());

    let manager = SearchManager::new();
    let cancel = manager.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Keyboard Interrupted");
            cancel.cancel();
        }
    });

    let connect = |target: &SearchTarget| -> Result<LogSource, SourceError> {
        sources
            .get(&target.region)
            .cloned()
            .ok_or_else(|| SourceError::Service(format!("no source for {}", target.region)))
    };
    let outcome = manager
        .run(&request, connect, |snapshot| {
            println!("{} >", Local::now().format("%Y-%m-%d %H:%M:%S"));
            print!("{}", snapshot);
        })
        .await?;

    println!();
    for hit in &outcome.hits {
        println!(
            "{}\t{}\t{}",
            format_csv_datetime(&hit.record.timestamp),
            hit.key,
            hit.record.message
        );
        println!("{}", hit.record.source_link);
    }
    println!("命中：{}", outcome.hits.len());

    if !outcome.expired_regions.is_empty() {
        for region in &outcome.expired_regions {
            print_remediation(config, region, prod);
        }
        anyhow::bail!(
            "Credentials expired for {}",
            outcome.expired_regions.join(", ")
        );
    }
    Ok(())
}
