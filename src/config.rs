use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    pub gemini_api_key: Option<String>,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub generation: GenerationSettings,

    #[serde(default)]
    pub worker: WorkerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_secs: 60 * 60,
            max_requests: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackendKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub backend: QueueBackendKind,
    pub name: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            backend: QueueBackendKind::Sqlite,
            name: "summary-queue".to_string(),
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub summary_model: String,
    pub report_model: String,
    pub summary_timeout_secs: u64,
    pub report_timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            summary_model: "gemini-2.5-flash".to_string(),
            report_model: "gemini-2.5-pro".to_string(),
            summary_timeout_secs: 15,
            report_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub visibility_timeout_secs: u64,
    pub max_deliveries: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 1000,
            visibility_timeout_secs: 60,
            max_deliveries: 5,
        }
    }
}

impl WorkerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("learnlog");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("learnlog.db").to_string_lossy().to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind_addr: default_bind_addr(),
            gemini_api_key: None,
            rate_limit: RateLimitSettings::default(),
            queue: QueueSettings::default(),
            generation: GenerationSettings::default(),
            worker: WorkerSettings::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Reads the file at `path`, writing defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("learnlog")
            .join("config.toml")
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.trim().is_empty() {
                self.gemini_api_key = Some(key);
            }
        }
        if let Ok(path) = std::env::var("LEARNLOG_DB_PATH") {
            self.db_path = path;
        }
        if let Ok(addr) = std::env::var("LEARNLOG_BIND_ADDR") {
            self.bind_addr = addr;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            return Err(AppError::Config(
                "rate_limit.window_secs and rate_limit.max_requests must be positive".to_string(),
            ));
        }
        if self.queue.max_attempts == 0 {
            return Err(AppError::Config("queue.max_attempts must be at least 1".to_string()));
        }
        if self.worker.concurrency == 0 {
            return Err(AppError::Config("worker.concurrency must be at least 1".to_string()));
        }
        Ok(())
    }
}
