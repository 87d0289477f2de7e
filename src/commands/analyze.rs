use std::path::{Path, PathBuf};

use alertscope_logs::{
    AnalysisReport, ErrorClassifier, RequestAggregator, Subsystem, read_records,
};
use anyhow::{Context, Result};
use clap::Args;

use crate::config::Config;
use crate::output::publish_report;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// CSV written by `triage` (…_FULL.csv or …_ERROR.csv)
    #[arg(long, value_name = "FILE")]
    csv: PathBuf,

    /// Subsystem rules to apply; detected from the file name when omitted
    #[arg(long)]
    subsystem: Option<Subsystem>,

    /// Only read the first N rows
    #[arg(long, value_name = "N")]
    top: Option<usize>,
}

pub fn run(args: AnalyzeArgs, config: &Config) -> Result<()> {
    let subsystem = match args.subsystem {
        Some(subsystem) => subsystem,
        None => detect_subsystem(&args.csv).with_context(|| {
            format!(
                "Cannot tell the subsystem from {}, pass --subsystem",
                args.csv.display()
            )
        })?,
    };

    let records = read_records(&args.csv, args.top)?;
    let mut requests = RequestAggregator::aggregate(records);
    requests.sort_records();
    let classification = ErrorClassifier::new(subsystem).classify(&mut requests);

    publish_report(&AnalysisReport::from_classification(&classification), config)
}

fn detect_subsystem(path: &Path) -> Option<Subsystem> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(Subsystem::from_function_name)
}
