//! Mirror configuration
//!
//! Loaded once from a TOML file at startup. Every key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::catalog::Credentials;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the remote gallery
    pub server_url: Url,
    /// Directory holding the placeholders
    pub data_dir: PathBuf,
    /// Idle time after which a materialized file is evicted
    pub expire_seconds: u64,
    /// How long one wait for filesystem events may block
    pub poll_interval_ms: u64,
    /// Re-list the catalog at this cadence to pick up new files
    pub refresh_seconds: Option<u64>,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn default_server_url() -> Url {
    Url::parse("http://127.0.0.1:9090").expect("static URL is valid")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            data_dir: PathBuf::from("./lora_mount"),
            expire_seconds: 60,
            poll_interval_ms: 1000,
            refresh_seconds: None,
            username: None,
            password: None,
        }
    }
}

impl Config {
    /// Parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Load `path` if given, otherwise `./config.toml` if it exists, otherwise
    /// defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    tracing::info!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.expire_seconds == 0 {
            return Err(ConfigError::Invalid("expire_seconds must be positive"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive"));
        }
        if self.refresh_seconds == Some(0) {
            return Err(ConfigError::Invalid("refresh_seconds must be positive"));
        }
        Ok(())
    }

    /// Login credentials, present only when both fields are non-empty.
    pub fn credentials(&self) -> Option<Credentials> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some(Credentials::new(user, pass))
            }
            _ => None,
        }
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expire_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_seconds.map(Duration::from_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server_url.as_str(), "http://127.0.0.1:9090/");
        assert_eq!(config.data_dir, PathBuf::from("./lora_mount"));
        assert_eq!(config.expiry(), Duration::from_secs(60));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.refresh_interval(), None);
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
server_url = "https://gallery.example.com/lora/"
data_dir = "/srv/models"
expire_seconds = 600
poll_interval_ms = 250
refresh_seconds = 300
username = "alice"
password = "secret"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.server_url.path(), "/lora/");
        assert_eq!(config.data_dir, PathBuf::from("/srv/models"));
        assert_eq!(config.expiry(), Duration::from_secs(600));
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.refresh_interval(), Some(Duration::from_secs(300)));
        assert_eq!(
            config.credentials(),
            Some(Credentials::new("alice", "secret"))
        );
    }

    #[test]
    fn test_empty_credentials_are_absent() {
        let config = Config::from_toml("username = \"alice\"\npassword = \"\"").unwrap();
        assert!(config.credentials().is_none());

        let config = Config::from_toml("username = \"alice\"").unwrap();
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_rejects_zero_durations() {
        assert!(matches!(
            Config::from_toml("expire_seconds = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("poll_interval_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("refresh_seconds = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_bad_url_and_unknown_keys() {
        assert!(matches!(
            Config::from_toml("server_url = \"not a url\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::from_toml("expire = 5"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "expire_seconds = 5\n").unwrap();

        let config = Config::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.expire_seconds, 5);

        let missing = Config::load(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
