//! Configuration loading from TOML files
//!
//! Config file is selected via the `--config <path>` argument of each binary
//! (default: config/dev.toml). A missing or unparsable file falls back to
//! defaults. Scoring thresholds and weights are not configurable.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Countdown length before each shot (one tick per second)
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u32,
    /// Countdown tick period in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_countdown_secs() -> u32 {
    15
}

fn default_tick_ms() -> u64 {
    1000
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { countdown_secs: default_countdown_secs(), tick_ms: default_tick_ms() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Longest side of the raster handed to the detector (pixels)
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    /// Joints below this confidence are treated as not detected
    #[serde(default = "default_min_joint_confidence")]
    pub min_joint_confidence: f64,
}

fn default_max_dimension() -> u32 {
    1024
}

fn default_min_joint_confidence() -> f64 {
    0.3
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            min_joint_confidence: default_min_joint_confidence(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DetectorConfig {
    /// External keypoint detector program (reads a PNG path, prints JSON)
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_width")]
    pub width: u32,
    #[serde(default = "default_report_height")]
    pub height: u32,
    /// TrueType/OpenType font used for report text (text is omitted without it)
    #[serde(default)]
    pub font_path: Option<String>,
}

fn default_report_width() -> u32 {
    1080
}

fn default_report_height() -> u32 {
    1920
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { width: default_report_width(), height: default_report_height(), font_path: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_enabled")]
    pub enabled: bool,
    /// JSONL file receiving one record per completed session
    #[serde(default = "default_history_file")]
    pub file: String,
}

fn default_history_enabled() -> bool {
    true
}

fn default_history_file() -> String {
    "posture_history.jsonl".to_string()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { enabled: default_history_enabled(), file: default_history_file() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    countdown_secs: u32,
    tick_ms: u64,
    max_dimension: u32,
    min_joint_confidence: f64,
    detector_command: Option<String>,
    detector_args: Vec<String>,
    report_width: u32,
    report_height: u32,
    report_font_path: Option<String>,
    history_enabled: bool,
    history_file: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            countdown_secs: toml_config.capture.countdown_secs,
            tick_ms: toml_config.capture.tick_ms,
            max_dimension: toml_config.analysis.max_dimension,
            min_joint_confidence: toml_config.analysis.min_joint_confidence,
            detector_command: toml_config.detector.command,
            detector_args: toml_config.detector.args,
            report_width: toml_config.report.width,
            report_height: toml_config.report.height,
            report_font_path: toml_config.report.font_path,
            history_enabled: toml_config.history.enabled,
            history_file: toml_config.history.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: config_file.to_string(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        if toml_config.capture.countdown_secs == 0 {
            anyhow::bail!("capture.countdown_secs must be at least 1 in {}", path.display());
        }
        if toml_config.analysis.max_dimension == 0 {
            anyhow::bail!("analysis.max_dimension must be at least 1 in {}", path.display());
        }

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn countdown_secs(&self) -> u32 {
        self.countdown_secs
    }

    pub fn tick_ms(&self) -> u64 {
        self.tick_ms
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    pub fn min_joint_confidence(&self) -> f64 {
        self.min_joint_confidence
    }

    pub fn detector_command(&self) -> Option<&str> {
        self.detector_command.as_deref()
    }

    pub fn detector_args(&self) -> &[String] {
        &self.detector_args
    }

    pub fn report_width(&self) -> u32 {
        self.report_width
    }

    pub fn report_height(&self) -> u32 {
        self.report_height
    }

    pub fn report_font_path(&self) -> Option<&str> {
        self.report_font_path.as_deref()
    }

    pub fn history_enabled(&self) -> bool {
        self.history_enabled
    }

    pub fn history_file(&self) -> &str {
        &self.history_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to override the countdown (also used by tests)
    pub fn with_countdown_secs(mut self, secs: u32) -> Self {
        self.countdown_secs = secs.max(1);
        self
    }

    /// Builder method to override the tick period
    pub fn with_tick_ms(mut self, ms: u64) -> Self {
        self.tick_ms = ms;
        self
    }

    /// Builder method for tests to point history at a temp file
    #[cfg(test)]
    pub fn with_history_file(mut self, file: &str) -> Self {
        self.history_file = file.to_string();
        self
    }
}
