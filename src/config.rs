use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "wrapped";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HistoryPolicy {
    /// Missing or unreadable streaming history aborts the run.
    #[default]
    Required,
    /// Missing streaming history yields an empty play table.
    Optional,
}

impl HistoryPolicy {
    pub fn label(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Optional => "optional",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_streaming_dir")]
    pub streaming_dir: String,
    #[serde(default = "default_account_dir")]
    pub account_dir: String,
    #[serde(default = "default_streaming_pattern")]
    pub streaming_pattern: String,
    #[serde(default = "default_playlist_pattern")]
    pub playlist_pattern: String,
    #[serde(default = "default_search_file")]
    pub search_file: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub history_policy: HistoryPolicy,
    #[serde(default)]
    pub year: Option<i32>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("..").join("data")
}

fn default_streaming_dir() -> String {
    String::from("streaming-history")
}

fn default_account_dir() -> String {
    String::from("account-data")
}

fn default_streaming_pattern() -> String {
    String::from("Streaming_History*.json")
}

fn default_playlist_pattern() -> String {
    String::from("Playlist*.json")
}

fn default_search_file() -> String {
    String::from("SearchQueries.json")
}

fn default_top_k() -> usize {
    10
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            streaming_dir: default_streaming_dir(),
            account_dir: default_account_dir(),
            streaming_pattern: default_streaming_pattern(),
            playlist_pattern: default_playlist_pattern(),
            search_file: default_search_file(),
            top_k: default_top_k(),
            history_policy: HistoryPolicy::default(),
            year: None,
        }
    }
}

impl ReportConfig {
    pub fn streaming_path(&self) -> PathBuf {
        self.data_dir.join(&self.streaming_dir)
    }

    pub fn account_path(&self) -> PathBuf {
        self.data_dir.join(&self.account_dir)
    }

    pub fn search_path(&self) -> PathBuf {
        self.account_path().join(&self.search_file)
    }
}

pub fn config_root() -> Result<PathBuf> {
    if let Ok(override_dir) = env::var("WRAPPED_CONFIG_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .context("neither HOME nor USERPROFILE is set")?;
    Ok(PathBuf::from(home).join(".config").join(APP_DIR))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_root()?.join(CONFIG_FILE))
}

pub fn load_config() -> Result<ReportConfig> {
    let path = config_path()?;
    let mut config = load_config_from_path(&path)?;
    apply_env_overrides(
        &mut config,
        env::var("WRAPPED_DATA_DIR").ok(),
        env::var("WRAPPED_YEAR").ok(),
    )?;
    Ok(config)
}

fn load_config_from_path(path: &Path) -> Result<ReportConfig> {
    if !path.exists() {
        return Ok(ReportConfig::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: ReportConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

fn apply_env_overrides(
    config: &mut ReportConfig,
    data_dir: Option<String>,
    year: Option<String>,
) -> Result<()> {
    if let Some(dir) = data_dir.filter(|dir| !dir.trim().is_empty()) {
        config.data_dir = PathBuf::from(dir.trim());
    }
    if let Some(year) = year.filter(|year| !year.trim().is_empty()) {
        let parsed = year
            .trim()
            .parse::<i32>()
            .with_context(|| format!("WRAPPED_YEAR is not a year: {year}"))?;
        config.year = Some(parsed);
    }
    Ok(())
}
