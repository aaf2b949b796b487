use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use crate::errors::{AppError, AppResult};
use crate::job_scheduling::CompletionGating;
use defaults::*;
use duration_serde::{duration, parse_default};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub epg: EpgConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of job bodies running at once
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// How often the timer loop checks for due triggers
    #[serde(default = "default_poll_interval", with = "duration")]
    pub poll_interval: Duration,
    /// Upper bound on a single job body
    #[serde(default = "default_job_timeout", with = "duration")]
    pub job_timeout: Duration,
    /// How long shutdown waits for running jobs
    #[serde(default = "default_shutdown_grace", with = "duration")]
    pub shutdown_grace: Duration,
    /// Whether failed parents still release their dependents
    #[serde(default)]
    pub completion_gating: CompletionGating,
}

fn default_worker_pool_size() -> usize {
    DEFAULT_WORKER_POOL_SIZE
}

fn default_poll_interval() -> Duration {
    parse_default(DEFAULT_POLL_INTERVAL)
}

fn default_job_timeout() -> Duration {
    parse_default(DEFAULT_JOB_TIMEOUT)
}

fn default_shutdown_grace() -> Duration {
    parse_default(DEFAULT_SHUTDOWN_GRACE)
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            poll_interval: default_poll_interval(),
            job_timeout: default_job_timeout(),
            shutdown_grace: default_shutdown_grace(),
            completion_gating: CompletionGating::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout", with = "duration")]
    pub request_timeout: Duration,
    #[serde(default = "default_languages_interval_minutes")]
    pub languages_interval_minutes: u32,
    #[serde(default = "default_categories_interval_minutes")]
    pub categories_interval_minutes: u32,
    /// Delay between languages completing and countries running
    #[serde(default = "default_countries_offset_minutes")]
    pub countries_offset_minutes: u32,
    /// Delay between countries and categories completing and channels running
    #[serde(default = "default_channels_offset_minutes")]
    pub channels_offset_minutes: u32,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout() -> Duration {
    parse_default(DEFAULT_REQUEST_TIMEOUT)
}

fn default_languages_interval_minutes() -> u32 {
    DEFAULT_LANGUAGES_INTERVAL_MINUTES
}

fn default_categories_interval_minutes() -> u32 {
    DEFAULT_CATEGORIES_INTERVAL_MINUTES
}

fn default_countries_offset_minutes() -> u32 {
    DEFAULT_COUNTRIES_OFFSET_MINUTES
}

fn default_channels_offset_minutes() -> u32 {
    DEFAULT_CHANNELS_OFFSET_MINUTES
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout: default_request_timeout(),
            languages_interval_minutes: default_languages_interval_minutes(),
            categories_interval_minutes: default_categories_interval_minutes(),
            countries_offset_minutes: default_countries_offset_minutes(),
            channels_offset_minutes: default_channels_offset_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpgConfig {
    #[serde(default = "default_epg_enabled")]
    pub enabled: bool,
    #[serde(default = "default_grabber_command")]
    pub grabber_command: String,
    /// Arguments placed before `--config/--channels/--output`
    #[serde(default = "default_grabber_args")]
    pub grabber_args: Vec<String>,
    /// Directory holding per-site `<site>.config.js` / `<site>.channels.xml`
    /// inputs and the `<site>.xml` guides written by the grabber
    #[serde(default = "default_epg_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_epg_timeout", with = "duration")]
    pub timeout: Duration,
    /// One grab job is registered per site
    #[serde(default)]
    pub sites: Vec<String>,
    #[serde(default = "default_epg_offset_minutes")]
    pub offset_minutes: u32,
}

fn default_epg_enabled() -> bool {
    DEFAULT_EPG_ENABLED
}

fn default_grabber_command() -> String {
    DEFAULT_GRABBER_COMMAND.to_string()
}

fn default_grabber_args() -> Vec<String> {
    DEFAULT_GRABBER_ARGS.iter().map(|arg| arg.to_string()).collect()
}

fn default_epg_work_dir() -> PathBuf {
    PathBuf::from(DEFAULT_EPG_WORK_DIR)
}

fn default_epg_timeout() -> Duration {
    parse_default(DEFAULT_EPG_TIMEOUT)
}

fn default_epg_offset_minutes() -> u32 {
    DEFAULT_EPG_OFFSET_MINUTES
}

impl Default for EpgConfig {
    fn default() -> Self {
        Self {
            enabled: default_epg_enabled(),
            grabber_command: default_grabber_command(),
            grabber_args: default_grabber_args(),
            work_dir: default_epg_work_dir(),
            timeout: default_epg_timeout(),
            sites: Vec::new(),
            offset_minutes: default_epg_offset_minutes(),
        }
    }
}

impl Config {
    /// Load from `$CONFIG_FILE`, falling back to `config.toml`
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        let config = Self::load_from_file(&config_file)?;
        info!("Configuration loaded from: {}", config_file);
        Ok(config)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let config: Self = if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            toml::from_str(&contents)?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            default_config
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if self.scheduler.worker_pool_size == 0 {
            return Err(AppError::configuration(
                "scheduler.worker_pool_size must be at least 1",
            ));
        }
        if self.scheduler.poll_interval.is_zero() {
            return Err(AppError::configuration(
                "scheduler.poll_interval must be greater than zero",
            ));
        }
        if self.ingestion.languages_interval_minutes == 0
            || self.ingestion.categories_interval_minutes == 0
        {
            return Err(AppError::configuration(
                "ingestion intervals must be at least one minute",
            ));
        }
        if self.epg.enabled && self.epg.grabber_command.trim().is_empty() {
            return Err(AppError::configuration(
                "epg.grabber_command must be set when EPG grabbing is enabled",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();

        let config = Config::load_from_file(path).unwrap();

        assert_eq!(config.scheduler.worker_pool_size, DEFAULT_WORKER_POOL_SIZE);
        assert_eq!(config.scheduler.job_timeout, Duration::from_secs(3600));
        assert!(std::path::Path::new(path).exists());

        let reloaded = Config::load_from_file(path).unwrap();
        assert_eq!(reloaded.ingestion.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_partial_file_uses_defaults_for_the_rest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[scheduler]
worker_pool_size = 2
job_timeout = "90m"
completion_gating = "unconditional"

[epg]
sites = ["example.com", "tv.example.org"]
"#,
        )
        .unwrap();

        let config = Config::load_from_file(path.to_str().unwrap()).unwrap();

        assert_eq!(config.scheduler.worker_pool_size, 2);
        assert_eq!(config.scheduler.job_timeout, Duration::from_secs(5400));
        assert_eq!(config.scheduler.poll_interval, Duration::from_secs(1));
        assert_eq!(config.scheduler.completion_gating, CompletionGating::Unconditional);
        assert_eq!(config.ingestion.countries_offset_minutes, 2);
        assert_eq!(config.epg.sites.len(), 2);
        assert_eq!(config.epg.timeout, Duration::from_secs(3600));
    }

    #[test]
    fn test_load_reads_config_file_env() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ingest.toml");
        std::fs::write(&path, "[scheduler]\nworker_pool_size = 7\n").unwrap();

        std::env::set_var("CONFIG_FILE", &path);
        let config = Config::load();
        std::env::remove_var("CONFIG_FILE");

        assert_eq!(config.unwrap().scheduler.worker_pool_size, 7);
    }

    #[test]
    fn test_zero_worker_pool_is_rejected() {
        let mut config = Config::default();
        config.scheduler.worker_pool_size = 0;
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration { .. })
        ));
    }
}
