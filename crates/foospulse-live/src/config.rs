//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/foospulse/config.toml)
//! 3. Environment variables (FOOSPULSE_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "FOOSPULSE";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the FoosPulse API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Delay before reconnecting a dropped stream or retrying a snapshot
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Silence on the stream longer than this counts as a dead connection
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,

    /// TCP/TLS connect timeout for both endpoints
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Total timeout for a snapshot request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Refetch the snapshot on every reconnect instead of trusting the stream
    #[serde(default)]
    pub resync_on_reconnect: bool,

    /// Log file for the CLI (stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            resync_on_reconnect: false,
            log_file: None,
        }
    }
}

/// Timing and policy knobs for a sync controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Fixed delay between reconnect / refetch attempts
    pub reconnect_delay: Duration,
    /// Application-level liveness window for the stream
    pub heartbeat_timeout: Duration,
    /// Refetch the snapshot whenever the stream is reopened
    pub resync_on_reconnect: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(default_reconnect_delay_ms()),
            heartbeat_timeout: Duration::from_secs(default_heartbeat_timeout_secs()),
            resync_on_reconnect: false,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (FOOSPULSE_API_URL, FOOSPULSE_RECONNECT_DELAY_MS, ...)
    /// 2. Config file (~/.config/foospulse/config.toml or FOOSPULSE_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit path from the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // FOOSPULSE_API_URL
        if let Ok(val) = std::env::var(format!("{}_API_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.api_url = val;
            }
        }

        // FOOSPULSE_RECONNECT_DELAY_MS
        if let Some(val) = env_u64("RECONNECT_DELAY_MS") {
            self.reconnect_delay_ms = val;
        }

        // FOOSPULSE_HEARTBEAT_TIMEOUT_SECS
        if let Some(val) = env_u64("HEARTBEAT_TIMEOUT_SECS") {
            self.heartbeat_timeout_secs = val;
        }

        // FOOSPULSE_CONNECT_TIMEOUT_SECS
        if let Some(val) = env_u64("CONNECT_TIMEOUT_SECS") {
            self.connect_timeout_secs = val;
        }

        // FOOSPULSE_REQUEST_TIMEOUT_SECS
        if let Some(val) = env_u64("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = val;
        }

        // FOOSPULSE_RESYNC_ON_RECONNECT
        if let Ok(val) = std::env::var(format!("{}_RESYNC_ON_RECONNECT", ENV_PREFIX)) {
            self.resync_on_reconnect = val.eq_ignore_ascii_case("true") || val == "1";
        }

        // FOOSPULSE_LOG_FILE
        if let Ok(val) = std::env::var(format!("{}_LOG_FILE", ENV_PREFIX)) {
            self.log_file = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            bail!("api_url must start with http:// or https:// (got '{}')", self.api_url);
        }
        if self.heartbeat_timeout_secs == 0 {
            bail!("heartbeat_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Set a single key from its string form (used by `config set`)
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "api_url" => self.api_url = value.trim_end_matches('/').to_string(),
            "reconnect_delay_ms" => {
                self.reconnect_delay_ms = value
                    .parse()
                    .with_context(|| format!("Invalid number for {}: {}", key, value))?
            }
            "heartbeat_timeout_secs" => {
                self.heartbeat_timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid number for {}: {}", key, value))?
            }
            "connect_timeout_secs" => {
                self.connect_timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid number for {}: {}", key, value))?
            }
            "request_timeout_secs" => {
                self.request_timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid number for {}: {}", key, value))?
            }
            "resync_on_reconnect" => {
                self.resync_on_reconnect = value.eq_ignore_ascii_case("true") || value == "1"
            }
            "log_file" => {
                self.log_file = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            _ => bail!(
                "Unknown config key '{}'. Valid keys: api_url, reconnect_delay_ms, \
                 heartbeat_timeout_secs, connect_timeout_secs, request_timeout_secs, \
                 resync_on_reconnect, log_file",
                key
            ),
        }
        self.validate()
    }

    /// Save configuration to a file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with FOOSPULSE_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("foospulse")
            .join("config.toml")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Controller settings derived from this configuration
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs),
            resync_on_reconnect: self.resync_on_reconnect,
        }
    }
}

fn env_u64(suffix: &str) -> Option<u64> {
    let name = format!("{}_{}", ENV_PREFIX, suffix);
    let val = std::env::var(&name).ok()?;
    match val.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(var = %name, value = %val, "Ignoring non-numeric environment override");
            None
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_heartbeat_timeout_secs() -> u64 {
    45
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    15
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "FOOSPULSE_API_URL",
        "FOOSPULSE_RECONNECT_DELAY_MS",
        "FOOSPULSE_HEARTBEAT_TIMEOUT_SECS",
        "FOOSPULSE_CONNECT_TIMEOUT_SECS",
        "FOOSPULSE_REQUEST_TIMEOUT_SECS",
        "FOOSPULSE_RESYNC_ON_RECONNECT",
        "FOOSPULSE_LOG_FILE",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.reconnect_delay_ms, 3000);
        assert!(!config.resync_on_reconnect);

        let settings = config.sync_settings();
        assert_eq!(settings, SyncSettings::default());
        assert_eq!(settings.reconnect_delay, Duration::from_secs(3));
    }

    #[test]
    fn test_env_override_api_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("FOOSPULSE_API_URL", "https://pulse.example.com");
        config.apply_env_overrides();
        assert_eq!(config.api_url, "https://pulse.example.com");
    }

    #[test]
    fn test_env_override_numbers() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("FOOSPULSE_RECONNECT_DELAY_MS", "250");
        env::set_var("FOOSPULSE_HEARTBEAT_TIMEOUT_SECS", "not-a-number");
        config.apply_env_overrides();

        assert_eq!(config.reconnect_delay_ms, 250);
        assert_eq!(config.heartbeat_timeout_secs, 45);
    }

    #[test]
    fn test_env_override_timeouts() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("FOOSPULSE_CONNECT_TIMEOUT_SECS", "4");
        env::set_var("FOOSPULSE_REQUEST_TIMEOUT_SECS", "30");
        config.apply_env_overrides();

        assert_eq!(config.connect_timeout_secs, 4);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_env_override_resync() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("FOOSPULSE_RESYNC_ON_RECONNECT", "1");
        config.apply_env_overrides();
        assert!(config.resync_on_reconnect);

        env::set_var("FOOSPULSE_RESYNC_ON_RECONNECT", "false");
        config.apply_env_overrides();
        assert!(!config.resync_on_reconnect);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            api_url = "https://pulse.example.com"
            reconnect_delay_ms = 500
            resync_on_reconnect = true
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.api_url, "https://pulse.example.com");
        assert_eq!(config.reconnect_delay_ms, 500);
        assert!(config.resync_on_reconnect);
        assert_eq!(config.heartbeat_timeout_secs, 45);
    }

    #[test]
    fn test_load_rejects_bad_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let err = Config::load_from_str(r#"api_url = "ftp://nope""#).unwrap_err();
        assert!(err.to_string().contains("api_url"));
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.api_url, "http://localhost:8000");
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set_value("api_url", "https://pulse.example.com/").unwrap();
        config.set_value("reconnect_delay_ms", "1200").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.api_url, "https://pulse.example.com");
        assert_eq!(loaded.reconnect_delay_ms, 1200);
    }

    #[test]
    fn test_set_value_unknown_key() {
        let mut config = Config::default();
        assert!(config.set_value("favorite_color", "blue").is_err());
        assert!(config.set_value("reconnect_delay_ms", "soon").is_err());
    }
}
