//! Project configuration: persisted as JSON next to the case data.
//!
//! Values are consumed by the pipeline as-is after `validate()`; the caller
//! decides where the file lives and when to reload it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "SteinLine";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// How files the deconstructor cannot handle are reported.
///
/// A forensic audit trail may require skipped files to be recorded with a
/// reason rather than silently producing empty text; which one applies is a
/// per-case decision, so it is configuration rather than a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SkipPolicy {
    /// Unsupported files yield empty text and are dropped without trace.
    Silent,
    /// Unsupported files produce a typed, logged skip event.
    #[default]
    Recorded,
}

/// Unified project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub project_name: String,
    /// Root of the evidence tree to scan.
    pub source_root: PathBuf,
    /// Single database holding registry + intelligence tables.
    pub database_path: PathBuf,

    // Windowing
    pub window_size: usize,
    pub window_stride: usize,

    // Scheduling
    /// Maximum windows per inference batch.
    pub max_batch_windows: usize,
    /// Parallel extraction / hashing workers.
    pub cpu_workers: usize,
    /// Used-memory fraction above which batch admission blocks.
    pub memory_ceiling: f64,
    /// Seconds between memory polls while throttled.
    pub memory_poll_secs: u64,

    // Inference
    pub ollama_url: String,
    pub model_name: String,
    pub inference_timeout_secs: u64,
    /// Fraction of accelerator memory the engine may claim. Advisory:
    /// forwarded to engines that accept a per-request limit; the Ollama
    /// API has none, so there it only documents the provisioning budget.
    pub vram_fraction: f64,
    /// Model context length bound, in tokens.
    pub context_length: usize,

    // Failure policy
    pub max_batch_retries: u32,
    pub retry_backoff_secs: u64,
    pub max_consecutive_failures: u32,

    // Extraction
    /// Files larger than this are skipped outright.
    pub max_file_bytes: u64,
    pub skip_policy: SkipPolicy,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            project_name: "New Investigation".to_string(),
            source_root: PathBuf::new(),
            database_path: app_data_dir().join("stein_intelligence.db"),
            window_size: 20_000,
            window_stride: 18_000,
            max_batch_windows: 24,
            cpu_workers: 4,
            memory_ceiling: 0.85,
            memory_poll_secs: 5,
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "qwen2.5:7b-instruct".to_string(),
            inference_timeout_secs: 600,
            vram_fraction: 0.45,
            context_length: 16_384,
            max_batch_retries: 3,
            retry_backoff_secs: 10,
            max_consecutive_failures: 5,
            max_file_bytes: 2 * 1024 * 1024 * 1024,
            skip_policy: SkipPolicy::Recorded,
        }
    }
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Set worker count from the host's available parallelism.
    pub fn auto_tune(&mut self) {
        self.cpu_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::Invalid("window_size must be > 0".into()));
        }
        if self.window_stride == 0 || self.window_stride > self.window_size {
            return Err(ConfigError::Invalid(format!(
                "window_stride must satisfy 0 < stride <= window_size (got {} / {})",
                self.window_stride, self.window_size
            )));
        }
        if self.max_batch_windows == 0 {
            return Err(ConfigError::Invalid("max_batch_windows must be > 0".into()));
        }
        if self.cpu_workers == 0 {
            return Err(ConfigError::Invalid("cpu_workers must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.memory_ceiling) {
            return Err(ConfigError::Invalid(format!(
                "memory_ceiling must be within [0, 1], got {}",
                self.memory_ceiling
            )));
        }
        if !(0.0..=1.0).contains(&self.vram_fraction) {
            return Err(ConfigError::Invalid(format!(
                "vram_fraction must be within [0, 1], got {}",
                self.vram_fraction
            )));
        }
        Ok(())
    }
}

/// Application data directory: ~/SteinLine/ (user-visible by design).
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default EnvFilter directive for the binary.
pub fn default_log_filter() -> &'static str {
    "info,steinline=debug"
}
