use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use screen_context_core::GateConfig;

use crate::scheduler::CaptureCadence;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default)]
    pub random_interval: bool,
    #[serde(default = "default_min_interval_seconds")]
    pub min_interval_seconds: u64,
    #[serde(default = "default_max_interval_seconds")]
    pub max_interval_seconds: u64,
    /// Start the scheduler as soon as `sctx serve` comes up.
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default = "default_true")]
    pub deduplicate: bool,
    #[serde(default = "default_hash_threshold")]
    pub hash_threshold: u32,
    /// Number of recent fingerprints the dedup gate remembers.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub history_max_age_secs: Option<u64>,
    /// Seed the gate from the newest stored screenshots on startup.
    #[serde(default = "default_true")]
    pub warm_start: bool,
    #[serde(default)]
    pub source: SourceConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            random_interval: false,
            min_interval_seconds: default_min_interval_seconds(),
            max_interval_seconds: default_max_interval_seconds(),
            auto_start: false,
            deduplicate: true,
            hash_threshold: default_hash_threshold(),
            history_capacity: default_history_capacity(),
            history_max_age_secs: None,
            warm_start: true,
            source: SourceConfig::default(),
        }
    }
}

fn default_interval_seconds() -> u64 {
    40
}
fn default_min_interval_seconds() -> u64 {
    20
}
fn default_max_interval_seconds() -> u64 {
    60
}
fn default_hash_threshold() -> u32 {
    5
}
fn default_history_capacity() -> usize {
    500
}
fn default_true() -> bool {
    true
}

impl CaptureConfig {
    pub fn cadence(&self) -> CaptureCadence {
        if self.random_interval {
            CaptureCadence::Random {
                min_secs: self.min_interval_seconds,
                max_secs: self.max_interval_seconds,
            }
        } else {
            CaptureCadence::Fixed {
                interval_secs: self.interval_seconds,
            }
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            threshold: self.hash_threshold,
            capacity: self.history_capacity,
            max_age: self.history_max_age_secs.map(Duration::from_secs),
            enabled: self.deduplicate,
        }
    }
}

/// Where frames come from.
///
/// ```toml
/// [capture.source]
/// kind = "command"
/// command = ["grim", "-"]
/// ```
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Run a program that writes a PNG/JPEG screenshot to stdout.
    Command {
        command: Vec<String>,
        /// The program is killed and the cycle skipped after this long.
        #[serde(default = "default_command_timeout_secs")]
        timeout_secs: u64,
    },
    /// Grab a monitor directly (requires the `screen-capture` feature).
    Screen {
        #[serde(default)]
        monitor: usize,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Command {
            command: vec!["grim".to_string(), "-".to_string()],
            timeout_secs: default_command_timeout_secs(),
        }
    }
}

fn default_command_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Oldest screenshots beyond this count are deleted after each save.
    #[serde(default = "default_max_screenshots")]
    pub max_screenshots: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            screenshot_dir: default_screenshot_dir(),
            jpeg_quality: default_jpeg_quality(),
            max_screenshots: default_max_screenshots(),
        }
    }
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("./screenshots")
}
fn default_jpeg_quality() -> u8 {
    85
}
fn default_max_screenshots() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let capture = &config.capture;

    if capture.interval_seconds == 0 {
        anyhow::bail!("capture.interval_seconds must be > 0");
    }
    if capture.random_interval {
        if capture.min_interval_seconds == 0 {
            anyhow::bail!("capture.min_interval_seconds must be > 0");
        }
        if capture.min_interval_seconds > capture.max_interval_seconds {
            anyhow::bail!("capture.min_interval_seconds must be <= capture.max_interval_seconds");
        }
    }
    if capture.hash_threshold > 64 {
        anyhow::bail!("capture.hash_threshold must be in [0, 64]");
    }
    if capture.history_capacity == 0 {
        anyhow::bail!("capture.history_capacity must be >= 1");
    }
    if capture.history_max_age_secs == Some(0) {
        anyhow::bail!("capture.history_max_age_secs must be > 0 when set");
    }

    match &capture.source {
        SourceConfig::Command { command, .. } if command.is_empty() => {
            anyhow::bail!("capture.source.command must name a program");
        }
        SourceConfig::Command { timeout_secs: 0, .. } => {
            anyhow::bail!("capture.source.timeout_secs must be > 0");
        }
        SourceConfig::Screen { .. } if !cfg!(feature = "screen-capture") => {
            anyhow::bail!(
                "capture.source kind 'screen' requires building with the `screen-capture` feature"
            );
        }
        _ => {}
    }

    if !(1..=100).contains(&config.storage.jpeg_quality) {
        anyhow::bail!("storage.jpeg_quality must be in [1, 100]");
    }
    if config.storage.max_screenshots == 0 {
        anyhow::bail!("storage.max_screenshots must be >= 1");
    }

    Ok(())
}
