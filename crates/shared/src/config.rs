//! Application configuration for SiteWatch.
//!
//! User config lives at `~/.sitewatch/sitewatch.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteWatchError};
use crate::types::WatchUrl;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sitewatch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sitewatch";

// ---------------------------------------------------------------------------
// Config structs (matching sitewatch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Watch pipeline settings.
    #[serde(default)]
    pub watcher: WatcherSection,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageSection,

    /// SMTP settings for the digest mailer.
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Watch targets seeded into storage at startup.
    #[serde(default)]
    pub targets: Vec<TargetEntry>,
}

/// `[watcher]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherSection {
    /// Number of concurrent fetch workers.
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Seconds between discovery ticks.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            tick_secs: default_tick_secs(),
        }
    }
}

fn default_workers() -> u32 {
    5
}
fn default_tick_secs() -> u64 {
    600
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// Path to the libSQL database file. A leading `~` is expanded.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.sitewatch/sitewatch.db".into()
}

/// `[smtp]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// SMTP relay host.
    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// SMTP submission port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Account user name.
    #[serde(default)]
    pub username: String,

    /// Name of the env var holding the password (never store the secret itself).
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Sender address for digest mail.
    #[serde(default)]
    pub from: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: String::new(),
            password_env: default_password_env(),
            from: String::new(),
        }
    }
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".into()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_password_env() -> String {
    "SITEWATCH_SMTP_PASSWORD".into()
}

/// `[[targets]]` entry — a watch target seeded into storage on `run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEntry {
    /// Human-readable name.
    pub name: String,
    /// URL to monitor.
    pub url: WatchUrl,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Watcher config (runtime, derived from the file config)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Worker pool size.
    pub workers: usize,
    /// Pace between discovery ticks.
    pub tick: Duration,
}

impl From<&AppConfig> for WatcherConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            workers: config.watcher.workers as usize,
            tick: Duration::from_secs(config.watcher.tick_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sitewatch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SiteWatchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sitewatch/sitewatch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SiteWatchError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SiteWatchError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SiteWatchError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SiteWatchError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SiteWatchError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` in a configured path to the user's home directory.
pub fn expand_path(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| SiteWatchError::config("could not determine home directory"))?;
        Ok(home.join(rest))
    } else {
        Ok(PathBuf::from(path))
    }
}

/// Read the SMTP password from the env var named in config.
pub fn smtp_password(config: &AppConfig) -> Result<String> {
    let var_name = &config.smtp.password_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(SiteWatchError::config(format!(
            "SMTP password not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("workers"));
        assert!(toml_str.contains("SITEWATCH_SMTP_PASSWORD"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.watcher.workers, 5);
        assert_eq!(parsed.watcher.tick_secs, 600);
        assert_eq!(parsed.smtp.port, 587);
    }

    #[test]
    fn config_with_targets() {
        let toml_str = r#"
[watcher]
workers = 3
tick_secs = 30

[[targets]]
name = "Paul Graham"
url = "http://www.paulgraham.com/articles.html"
description = "Essays"

[[targets]]
name = "Joel Spolsky"
url = "https://www.joelonsoftware.com/"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.targets[0].name, "Paul Graham");
        assert_eq!(
            config.targets[1].url.as_str(),
            "https://www.joelonsoftware.com/"
        );
        assert!(config.targets[1].description.is_none());
    }

    #[test]
    fn watcher_config_from_app_config() {
        let app = AppConfig::default();
        let watcher = WatcherConfig::from(&app);
        assert_eq!(watcher.workers, 5);
        assert_eq!(watcher.tick, Duration::from_secs(600));
    }

    #[test]
    fn smtp_password_missing_env() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.smtp.password_env = "SW_TEST_NONEXISTENT_PASSWORD_12345".into();
        let result = smtp_password(&config);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("SMTP password not found")
        );
    }

    #[test]
    fn expand_path_home_prefix() {
        let expanded = expand_path("~/.sitewatch/sitewatch.db").expect("expand");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with(".sitewatch/sitewatch.db"));

        let absolute = expand_path("/tmp/sitewatch.db").expect("expand absolute");
        assert_eq!(absolute, PathBuf::from("/tmp/sitewatch.db"));
    }
}
