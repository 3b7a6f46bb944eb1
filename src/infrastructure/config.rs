//! Configuration infrastructure
//!
//! Contains configuration loading and management for studbook scraping.
//!
//! Configuration is organized into four sections:
//! 1. Target site (urls, login form, credentials)
//! 2. Scraper behaviour (pacing, workers, retries, timeouts)
//! 3. Storage locations (database, session file, snapshots)
//! 4. Logging

#![allow(clippy::uninlined_format_args)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::domain::services::LoginConfig;
use crate::domain::value_objects::StudbookId;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub scraper: ScraperConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Target registry site
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,

    /// Relative detail page path; `{id}` is replaced with the studbook id
    pub detail_path: String,

    pub login_path: String,
    pub user_field: String,
    pub password_field: String,
    pub submit_field: String,

    /// Overridden by `STUDBOOK_USER_ID`
    pub user_id: String,

    /// Overridden by `STUDBOOK_PASSWORD`; never logged
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,

    pub user_agent: String,

    /// Text inside an `h1` that marks a site-level error page
    pub server_error_marker: String,
}

/// Worker loop behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Pause after every unit of work
    pub delay_ms: u64,
    pub num_browsers: usize,
    pub navigation_attempts: u32,
    pub retry_backoff_ms: u64,
    pub navigation_timeout_seconds: u64,
    /// Per browser session ceiling enforced by the rate limiter
    pub max_requests_per_second: u32,
    /// Emit a progress line every N completed units
    pub progress_every: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
    pub session_file: PathBuf,
    /// Scratch directory for page snapshots before upload
    pub snapshot_dir: PathBuf,
    /// Root of the file-system object store
    pub archive_dir: PathBuf,
    pub archive_snapshots: bool,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    pub log_dir: PathBuf,
    /// Number of log files to keep (older files will be deleted)
    pub max_files: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: studbook::BASE_URL.to_string(),
            detail_path: studbook::DETAIL_PATH.to_string(),
            login_path: studbook::LOGIN_PATH.to_string(),
            user_field: studbook::USER_FIELD.to_string(),
            password_field: studbook::PASSWORD_FIELD.to_string(),
            submit_field: studbook::SUBMIT_FIELD.to_string(),
            user_id: String::new(),
            password: String::new(),
            user_agent: defaults::USER_AGENT.to_string(),
            server_error_marker: studbook::SERVER_ERROR_MARKER.to_string(),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            delay_ms: defaults::DELAY_MS,
            num_browsers: defaults::NUM_BROWSERS,
            navigation_attempts: defaults::NAVIGATION_ATTEMPTS,
            retry_backoff_ms: defaults::RETRY_BACKOFF_MS,
            navigation_timeout_seconds: defaults::NAVIGATION_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            progress_every: defaults::PROGRESS_EVERY,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: defaults::DATABASE_URL.to_string(),
            session_file: PathBuf::from(defaults::SESSION_FILE),
            snapshot_dir: PathBuf::from(defaults::SNAPSHOT_DIR),
            archive_dir: PathBuf::from(defaults::ARCHIVE_DIR),
            archive_snapshots: defaults::ARCHIVE_SNAPSHOTS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: PathBuf::from(defaults::LOG_DIR),
            max_files: defaults::LOG_MAX_FILES,
        }
    }
}

impl SiteConfig {
    /// Detail page url of one studbook id
    #[must_use]
    pub fn detail_url(&self, studbook_id: StudbookId) -> String {
        let path = self.detail_path.replace("{id}", &studbook_id.to_string());
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    #[must_use]
    pub fn login_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.login_path.trim_start_matches('/')
        )
    }

    /// Host used to key saved sessions
    #[must_use]
    pub fn site_key(&self) -> String {
        url::Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.base_url.clone())
    }

    #[must_use]
    pub fn login_config(&self) -> LoginConfig {
        LoginConfig {
            site: self.site_key(),
            login_url: self.login_url(),
            user_field: self.user_field.clone(),
            password_field: self.password_field.clone(),
            submit_field: self.submit_field.clone(),
            user_id: self.user_id.clone(),
            password: self.password.clone(),
        }
    }
}

impl ScraperConfig {
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    #[must_use]
    pub const fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_seconds)
    }
}

impl AppConfig {
    /// Credentials from the environment win over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(user_id) = std::env::var(env::USER_ID) {
            self.site.user_id = user_id;
        }
        if let Ok(password) = std::env::var(env::PASSWORD) {
            self.site.password = password;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.site.base_url)
            .map_err(|e| ConfigError::invalid("site.base_url", e.to_string()))?;
        if !self.site.detail_path.contains("{id}") {
            return Err(ConfigError::invalid("site.detail_path", "must contain {id}"));
        }
        if self.scraper.num_browsers == 0 {
            return Err(ConfigError::invalid("scraper.num_browsers", "must be at least 1"));
        }
        if self.scraper.navigation_attempts == 0 {
            return Err(ConfigError::invalid("scraper.navigation_attempts", "must be at least 1"));
        }
        if self.scraper.navigation_timeout_seconds == 0 {
            return Err(ConfigError::invalid("scraper.navigation_timeout_seconds", "must be positive"));
        }
        if self.scraper.max_requests_per_second == 0 {
            return Err(ConfigError::invalid("scraper.max_requests_per_second", "must be positive"));
        }
        Ok(())
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(config_dir)
    }

    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join(defaults::CONFIG_FILE_NAME);
        Ok(Self { config_path })
    }

    #[must_use]
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !fs::try_exists(&self.config_path).await.unwrap_or(false) {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("⚠️  Configuration file unreadable: {}", parse_error);

                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }

                let default_config = AppConfig::default();
                self.save_config(&default_config)
                    .await
                    .context("Failed to save default configuration")?;

                info!("✅ Reset to default configuration");
                Ok(default_config)
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Get the configuration file path
    #[must_use]
    pub const fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}

/// Studbook registry urls and page markers
pub mod studbook {
    pub const BASE_URL: &str = "https://www.studbook.org.au";

    /// Detail page of one horse
    pub const DETAIL_PATH: &str = "Horse.aspx?hid={id}";

    pub const LOGIN_PATH: &str = "Default.aspx";

    pub const USER_FIELD: &str = "txtUserId";
    pub const PASSWORD_FIELD: &str = "txtPassword";
    pub const SUBMIT_FIELD: &str = "btnLogin";

    pub const SERVER_ERROR_MARKER: &str = "Server Error";
}

/// Environment variable names
pub mod env {
    pub const USER_ID: &str = "STUDBOOK_USER_ID";
    pub const PASSWORD: &str = "STUDBOOK_PASSWORD";
}

/// Default scraping configuration values
pub mod defaults {
    pub const APP_DIR_NAME: &str = "studbook-scraper";
    pub const CONFIG_FILE_NAME: &str = "config.json";

    /// Pause after every unit of work
    pub const DELAY_MS: u64 = 2000;

    pub const NUM_BROWSERS: usize = 1;

    /// Navigation attempts per id before a NAVIGATION_ERROR is recorded
    pub const NAVIGATION_ATTEMPTS: u32 = 3;

    pub const RETRY_BACKOFF_MS: u64 = 5000;

    pub const NAVIGATION_TIMEOUT_SECONDS: u64 = 60;

    pub const MAX_REQUESTS_PER_SECOND: u32 = 2;

    pub const PROGRESS_EVERY: u64 = 1;

    pub const USER_AGENT: &str =
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

    pub const DATABASE_URL: &str = "sqlite:studbook.db";
    pub const SESSION_FILE: &str = "data/cookies.json";
    pub const SNAPSHOT_DIR: &str = "data/snapshots";
    pub const ARCHIVE_DIR: &str = "data/archive";
    pub const ARCHIVE_SNAPSHOTS: bool = false;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = true;
    pub const LOG_DIR: &str = "logs";
    pub const LOG_MAX_FILES: usize = 7;
}
