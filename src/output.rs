//! Report sinks: stdout, the report file and the operator's clipboard

use std::fs;
use std::io::Write;
use std::process::{Command, Stdio};

use alertscope_cloudwatch::current_hostname;
use alertscope_logs::AnalysisReport;
use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::config::Config;

/// Clipboard commands tried in order
const CLIPBOARD_COMMANDS: &[(&str, &[&str])] = &[
    ("pbcopy", &[]),
    ("clip", &[]),
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
];

/// Print the report, overwrite the report file, and copy to the clipboard on the operator host
pub fn publish_report(report: &AnalysisReport, config: &Config) -> Result<()> {
    print!("{}", report);

    let path = config.report_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&path, report.file_contents())
        .with_context(|| format!("Failed to write report {}", path.display()))?;
    debug!(path = %path.display(), "wrote report file");

    if is_operator_host(config, &current_hostname()) {
        if let Err(e) = copy_to_clipboard(&report.clipboard_text()) {
            warn!("Clipboard copy failed: {:#}", e);
        }
    }
    Ok(())
}

fn is_operator_host(config: &Config, host: &str) -> bool {
    config
        .operator_host
        .as_deref()
        .is_some_and(|operator| operator == host)
}

fn copy_to_clipboard(text: &str) -> Result<()> {
    for (program, args) in CLIPBOARD_COMMANDS {
        let child = Command::new(program)
            .args(*args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        let Ok(mut child) = child else {
            continue;
        };

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(text.as_bytes())
                .with_context(|| format!("Failed to write to {}", program))?;
        }
        let status = child
            .wait()
            .with_context(|| format!("Failed to wait for {}", program))?;
        if status.success() {
            debug!(program, "copied report to clipboard");
            return Ok(());
        }
    }
    anyhow::bail!("no clipboard command available")
}
