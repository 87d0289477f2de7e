//! Configuration file handling
//!
//! Loaded from `~/.alertscope/config.toml` unless `--config` points elsewhere.
//! A missing file means defaults.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use alertscope_cloudwatch::{AccountIds, ProfileSet};
use alertscope_types::{Environment, EnvironmentRegistry};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CONFIG_DIR: &str = ".alertscope";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where CSV files, `input.txt` and the report file live
    pub data_dir: PathBuf,

    /// Report file name inside `data_dir`, overwritten on each run
    pub report_file: String,

    /// The one machine whose clipboard receives the report
    pub operator_host: Option<String>,

    /// Minutes searched before the alarm time
    pub window_minutes: i64,

    /// Regions searched when none are given on the command line
    pub default_regions: Vec<String>,

    /// Directory of captured `filter-log-events` responses
    pub replay_dir: Option<PathBuf>,

    /// Seconds between search progress snapshots
    pub refresh_secs: u64,

    /// Replaces the built-in environment list when non-empty
    pub environments: Vec<Environment>,

    /// Credential profiles by hostname
    pub profiles: HashMap<String, ProfileSet>,

    pub accounts: AccountIds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: Self::config_dir()
                .map(|dir| dir.join("data"))
                .unwrap_or_else(|| PathBuf::from(".")),
            report_file: "report.txt".to_string(),
            operator_host: None,
            window_minutes: 5,
            default_regions: vec!["cn-northwest-1".to_string(), "us-east-1".to_string()],
            replay_dir: None,
            refresh_secs: 10,
            environments: Vec::new(),
            profiles: HashMap::new(),
            accounts: AccountIds::default(),
        }
    }
}

impl Config {
    /// `~/.alertscope`
    pub fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_DIR))
    }

    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Load from `path`, or the default location when `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn report_path(&self) -> PathBuf {
        self.data_dir.join(&self.report_file)
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.window_minutes.max(1))
    }

    pub fn refresh(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_secs.max(1))
    }

    pub fn registry(&self) -> EnvironmentRegistry {
        if self.environments.is_empty() {
            EnvironmentRegistry::default()
        } else {
            EnvironmentRegistry::new(self.environments.clone())
        }
    }

    /// Profiles of this machine, if configured
    pub fn profiles_for(&self, host: &str) -> Option<&ProfileSet> {
        ProfileSet::for_host(&self.profiles, host).ok()
    }
}
