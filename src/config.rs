//! Configuration loading for intake.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Get the intake home directory (~/.intake).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".intake"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.intake/settings.json
pub fn load_settings() -> Result<Settings> {
    let path = get_settings_path()?;

    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}. Run 'intake config --init' first.",
            path.display()
        )));
    }

    load_settings_from(&path)
}

/// Load and validate settings from an explicit path.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;

    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Load settings or return default if not found.
pub fn load_settings_or_default() -> Settings {
    load_settings().unwrap_or_else(|e| {
        tracing::warn!("Failed to load settings: {}, using defaults", e);
        Settings::default()
    })
}

/// Write default settings to ~/.intake/settings.json, refusing to overwrite.
pub fn init_settings() -> Result<PathBuf> {
    let path = get_settings_path()?;
    if path.exists() {
        return Err(Error::Config(format!(
            "Settings file already exists at {}",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, serde_json::to_string_pretty(&Settings::default())?)?;
    tracing::info!("Wrote default settings to {}", path.display());
    Ok(path)
}

fn validate_settings(settings: &Settings) -> Result<()> {
    let windows = [
        ("queue.debounce_window_secs", settings.queue.debounce_window_secs),
        ("queue.burst_window_secs", settings.queue.burst_window_secs),
        ("queue.hash_ttl_secs", settings.queue.hash_ttl_secs),
        ("worker.poll_interval_secs", settings.worker.poll_interval_secs),
        ("worker.cleanup_interval_secs", settings.worker.cleanup_interval_secs),
    ];
    let timeout = settings
        .processor
        .timeout_secs
        .map(|secs| ("processor.timeout_secs", secs));
    for (name, value) in windows.into_iter().chain(timeout) {
        if !value.is_finite() || value <= 0.0 {
            return Err(Error::Config(format!(
                "{} must be a positive number of seconds, got {}",
                name, value
            )));
        }
    }

    if settings.queue.max_queue_size == 0 {
        return Err(Error::Config(
            "queue.max_queue_size must be greater than zero".to_string(),
        ));
    }

    if settings.processor.kind == ProcessorKind::Command && settings.processor.command.is_none() {
        return Err(Error::Config(
            "processor.command is required when processor.kind is \"command\"".to_string(),
        ));
    }

    Ok(())
}

/// How duplicate-content hashes are keyed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DedupScope {
    /// Identical text is a duplicate regardless of who sent it.
    #[default]
    Global,
    /// Identical text from different customers is not a duplicate.
    Customer,
}

/// Queue engine configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QueueSettings {
    #[serde(default = "default_debounce_window_secs")]
    pub debounce_window_secs: f64,
    #[serde(default = "default_burst_window_secs")]
    pub burst_window_secs: f64,
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_hash_ttl_secs")]
    pub hash_ttl_secs: f64,
    #[serde(default)]
    pub dedup_scope: DedupScope,
    #[serde(default = "default_evict_idle_customers")]
    pub evict_idle_customers: bool,
}

fn default_debounce_window_secs() -> f64 {
    2.0
}

fn default_burst_window_secs() -> f64 {
    5.0
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_hash_ttl_secs() -> f64 {
    300.0
}

fn default_evict_idle_customers() -> bool {
    true
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            debounce_window_secs: default_debounce_window_secs(),
            burst_window_secs: default_burst_window_secs(),
            max_queue_size: default_max_queue_size(),
            hash_ttl_secs: default_hash_ttl_secs(),
            dedup_scope: DedupScope::default(),
            evict_idle_customers: default_evict_idle_customers(),
        }
    }
}

impl QueueSettings {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs_f64(self.debounce_window_secs)
    }

    pub fn burst_window(&self) -> Duration {
        Duration::from_secs_f64(self.burst_window_secs)
    }

    pub fn hash_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.hash_ttl_secs)
    }
}

/// Background worker configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WorkerSettings {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: f64,
}

fn default_poll_interval_secs() -> f64 {
    0.5
}

fn default_cleanup_interval_secs() -> f64 {
    60.0
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl WorkerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs_f64(self.cleanup_interval_secs)
    }
}

/// HTTP intake configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WebSettings {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    8088
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
        }
    }
}

/// Which processor handles ready messages.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorKind {
    #[default]
    Echo,
    Command,
    Ollama,
}

impl std::str::FromStr for ProcessorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "echo" => Ok(ProcessorKind::Echo),
            "command" => Ok(ProcessorKind::Command),
            "ollama" => Ok(ProcessorKind::Ollama),
            _ => Err(format!("Unknown processor kind: {}", s)),
        }
    }
}

/// Processor configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProcessorSettings {
    #[serde(default)]
    pub kind: ProcessorKind,
    /// Executable for the command processor; the message is passed as the last argument.
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Request timeout for HTTP processors.
    pub timeout_secs: Option<f64>,
}

impl ProcessorSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs_f64)
    }
}

/// intake settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub worker: WorkerSettings,

    #[serde(default)]
    pub web: WebSettings,

    #[serde(default)]
    pub processor: ProcessorSettings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = Settings::default();

        assert_eq!(settings.queue.debounce_window(), Duration::from_secs(2));
        assert_eq!(settings.queue.burst_window(), Duration::from_secs(5));
        assert_eq!(settings.queue.max_queue_size, 1000);
        assert_eq!(settings.queue.hash_ttl(), Duration::from_secs(300));
        assert_eq!(settings.worker.poll_interval(), Duration::from_millis(500));
        assert_eq!(settings.worker.cleanup_interval(), Duration::from_secs(60));
        assert_eq!(settings.queue.dedup_scope, DedupScope::Global);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"queue": {"max_queue_size": 5, "dedup_scope": "customer"}, "processor": {"kind": "ollama"}}"#,
        )
        .unwrap();

        let settings = load_settings_from(&path).unwrap();

        assert_eq!(settings.queue.max_queue_size, 5);
        assert_eq!(settings.queue.dedup_scope, DedupScope::Customer);
        assert_eq!(settings.queue.debounce_window_secs, 2.0);
        assert_eq!(settings.processor.kind, ProcessorKind::Ollama);
        assert_eq!(settings.web.port, 8088);
    }

    #[test]
    fn test_rejects_invalid_windows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{"queue": {"debounce_window_secs": 0}}"#).unwrap();

        let err = load_settings_from(&path).unwrap_err();
        assert!(err.to_string().contains("debounce_window_secs"));
    }

    #[test]
    fn test_processor_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");

        std::fs::write(&path, r#"{"processor": {"kind": "ollama", "timeout_secs": 1.5}}"#).unwrap();
        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.processor.timeout(), Some(Duration::from_millis(1500)));

        std::fs::write(&path, r#"{"processor": {"timeout_secs": -1}}"#).unwrap();
        let err = load_settings_from(&path).unwrap_err();
        assert!(err.to_string().contains("processor.timeout_secs"));
    }

    #[test]
    fn test_command_processor_requires_command() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{"processor": {"kind": "command"}}"#).unwrap();

        assert!(load_settings_from(&path).is_err());
    }

    #[test]
    fn test_processor_kind_from_str() {
        assert_eq!("Echo".parse::<ProcessorKind>(), Ok(ProcessorKind::Echo));
        assert_eq!("command".parse::<ProcessorKind>(), Ok(ProcessorKind::Command));
        assert!("gpt".parse::<ProcessorKind>().is_err());
    }
}
