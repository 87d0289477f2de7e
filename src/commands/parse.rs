use std::path::{Path, PathBuf};

use alertscope_logs::{ClientLog, read_client_log, write_guid_csv, write_stage_csv};
use anyhow::{Context, Result};
use clap::Args;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Client log files named like 2025-01-16_03-44-23-143-RECREATE06.log
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Write reports here instead of next to each log
    #[arg(long = "out-dir", visible_alias = "od", value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Also write the per-stage report
    #[arg(long)]
    stages: bool,
}

pub fn run(args: ParseArgs, config: &Config) -> Result<()> {
    let registry = config.registry();
    for file in &args.files {
        let log = read_client_log(file, &registry)
            .with_context(|| format!("Failed to parse {}", file.display()))?;
        let dir = output_dir(args.out_dir.as_deref(), file);

        let guid_path = dir.join(log.guid_csv_name());
        write_guid_csv(&guid_path, &log)?;
        println!("{} -> {}", file.display(), guid_path.display());
        if args.stages {
            let stage_path = dir.join(log.stage_csv_name());
            write_stage_csv(&stage_path, &log)?;
            println!("{} -> {}", file.display(), stage_path.display());
        }
        print_summary(&log);
    }
    Ok(())
}

fn output_dir(out_dir: Option<&Path>, file: &Path) -> PathBuf {
    out_dir
        .map(Path::to_path_buf)
        .or_else(|| file.parent().map(Path::to_path_buf))
        .unwrap_or_default()
}

/// Slowest requests first
fn print_summary(log: &ClientLog) {
    let mut requests: Vec<_> = log.requests().collect();
    requests.sort_by_key(|b| std::cmp::Reverse(b.duration_ms()));

    println!(
        "{}  {} requests",
        log.build.as_deref().unwrap_or("NoBuild"),
        requests.len()
    );
    for block in requests.iter().take(10) {
        println!(
            "  {:>8.3}s  {}  {}",
            block.duration_ms() as f64 / 1000.0,
            block.desc,
            block.response.code.as_deref().unwrap_or("-")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_output_dir_defaults_to_log_dir() {
        assert_eq!(
            output_dir(None, Path::new("/logs/a.log")),
            PathBuf::from("/logs")
        );
        assert_eq!(
            output_dir(Some(Path::new("/out")), Path::new("/logs/a.log")),
            PathBuf::from("/out")
        );
        assert_eq!(output_dir(None, Path::new("a.log")), PathBuf::from(""));
    }

    #[test]
    fn test_parse_writes_reports() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("2025-01-16_03-44-23-143-RECREATE06.log");
        fs::write(
            &log,
            "01-16 03:44:23:500 [Info] [Main] [1] [Boot] Client (Build-7)\n\
             01-16 03:44:25:100 [Info] [Net] [2] [Http] Send, Guid = g, uri = https://x/login, m = POST\n\
             01-16 03:44:25:300 [Info] [Net] [2] [Http] Done, Guid = g, code = 200, ok\n",
        )
        .unwrap();
        let out = dir.path().join("reports");

        let args = ParseArgs {
            files: vec![log],
            out_dir: Some(out.clone()),
            stages: true,
        };
        run(args, &Config::default()).unwrap();

        let guid = fs::read_to_string(
            out.join("Build-7_2025-01-16_03-44-23-143-RECREATE06_GUID.csv"),
        )
        .unwrap();
        assert_eq!(guid.lines().count(), 2);
        assert!(guid.lines().nth(1).unwrap().contains("\t0.200\tg\thttps://x/login\t"));
        assert!(out.join("Build-7_2025-01-16_03-44-23-143-RECREATE06.csv").exists());
    }

    #[test]
    fn test_bad_file_name_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("client.log");
        fs::write(&log, "").unwrap();
        let args = ParseArgs {
            files: vec![log],
            out_dir: None,
            stages: false,
        };
        let err = run(args, &Config::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("does not start with a log time"));
    }
}
