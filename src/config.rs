use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::llm::classifier::GroupKey;
use crate::llm::config::LlmConfig;
use crate::llm::memory::MemoryConfig;
use crate::logs::cursor::DEFAULT_BATCH_SIZE;

/// Hard ceiling on records read for a periodic summary
pub const MAX_SUMMARY_LINES: usize = 10_000;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Access-log input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// CSV file to read; the CLI `--file` flag overrides it
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Records per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Field each batch is grouped by before classification
    #[serde(default)]
    pub group_by: GroupKey,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: None,
            batch_size: default_batch_size(),
            group_by: GroupKey::default(),
        }
    }
}

/// Continuous processing loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between batches
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

/// Periodic summary report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Records read from the start of the file
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    /// Records handed to the model
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            sample_size: default_sample_size(),
        }
    }
}

impl SummaryConfig {
    /// `max_lines` clamped to [`MAX_SUMMARY_LINES`]
    pub fn effective_max_lines(&self) -> usize {
        self.max_lines.min(MAX_SUMMARY_LINES)
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load config from default locations or create default
    pub fn load_or_default() -> Result<Self> {
        let paths = [
            PathBuf::from("/etc/weblog-triage/config.toml"),
            dirs_next::config_dir()
                .map(|p| p.join("weblog-triage/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_interval() -> u64 {
    30
}

fn default_max_lines() -> usize {
    1000
}

fn default_sample_size() -> usize {
    500
}
