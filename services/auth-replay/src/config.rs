//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The bearer token is read from the AUTH_TOKEN env var or from
//! `client.token_file`, never from the TOML itself.

use common::Secret;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub transports: Vec<TransportConfig>,
}

/// Settings shared by every transport
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// File holding the bearer token used to confirm re-authentication
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            token_file: None,
            event_capacity: default_event_capacity(),
        }
    }
}

/// One named upstream
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    pub name: String,
    pub base_url: String,
    /// Overrides `client.timeout_secs` for this transport
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_timeout() -> u64 {
    30
}

fn default_event_capacity() -> usize {
    64
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.transports.is_empty() {
            return Err(common::Error::Config(
                "at least one [[transports]] entry is required".into(),
            ));
        }

        if self.client.timeout_secs == 0 {
            return Err(common::Error::Config(
                "client.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.client.event_capacity == 0 {
            return Err(common::Error::Config(
                "client.event_capacity must be greater than 0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for transport in &self.transports {
            if transport.name.is_empty() {
                return Err(common::Error::Config("transport name must not be empty".into()));
            }
            if !seen.insert(transport.name.as_str()) {
                return Err(common::Error::Config(format!(
                    "transport {} is defined more than once",
                    transport.name
                )));
            }
            if !transport.base_url.starts_with("http://")
                && !transport.base_url.starts_with("https://")
            {
                return Err(common::Error::Config(format!(
                    "base_url for {} must start with http:// or https://, got: {}",
                    transport.name, transport.base_url
                )));
            }
            if transport.timeout_secs == Some(0) {
                return Err(common::Error::Config(format!(
                    "timeout_secs for {} must be greater than 0",
                    transport.name
                )));
            }
        }

        Ok(())
    }

    /// Effective timeout for a transport entry, in seconds.
    pub fn timeout_for(&self, transport: &TransportConfig) -> u64 {
        transport.timeout_secs.unwrap_or(self.client.timeout_secs)
    }

    /// Resolve the re-authentication token.
    ///
    /// Resolution order:
    /// 1. AUTH_TOKEN env var
    /// 2. client.token_file
    ///
    /// Returns `None` when neither is set; requests that need
    /// re-authentication are then cancelled.
    pub fn resolve_token(&self) -> common::Result<Option<Secret<String>>> {
        if let Ok(token) = std::env::var("AUTH_TOKEN") {
            let token = token.trim().to_owned();
            if !token.is_empty() {
                return Ok(Some(Secret::new(token)));
            }
        }
        match &self.client.token_file {
            Some(path) => Secret::from_file(path).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("auth-replay.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that mutate environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("auth-replay.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn valid_toml() -> &'static str {
        r#"
[client]
timeout_secs = 15

[[transports]]
name = "api"
base_url = "https://api.example.com"

[[transports]]
name = "billing"
base_url = "http://billing.internal:8080"
timeout_secs = 5
"#
    }

    #[test]
    fn load_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&write_config(&dir, valid_toml())).unwrap();

        assert_eq!(config.client.timeout_secs, 15);
        assert_eq!(config.client.event_capacity, 64);
        assert!(config.client.token_file.is_none());
        assert_eq!(config.transports.len(), 2);
        assert_eq!(config.transports[0].name, "api");
        assert_eq!(config.timeout_for(&config.transports[0]), 15);
        assert_eq!(config.timeout_for(&config.transports[1]), 5);
    }

    #[test]
    fn client_section_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[[transports]]
name = "api"
base_url = "https://api.example.com"
"#,
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.client.timeout_secs, 30);
    }

    #[test]
    fn load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/auth-replay.toml"));
        assert!(matches!(result, Err(common::Error::Io(_))));
    }

    #[test]
    fn load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&write_config(&dir, "not valid {{{{ toml"));
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn rejects_empty_transport_list() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&write_config(&dir, "[client]\ntimeout_secs = 5\n"));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("[[transports]]"), "got: {err}");
    }

    #[test]
    fn rejects_duplicate_transport_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[[transports]]
name = "api"
base_url = "https://a.example.com"

[[transports]]
name = "api"
base_url = "https://b.example.com"
"#,
        );
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("more than once"), "got: {err}");
    }

    #[test]
    fn rejects_non_http_base_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[[transports]]
name = "api"
base_url = "ftp://api.example.com"
"#,
        );
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("http://"), "got: {err}");
    }

    #[test]
    fn rejects_zero_timeouts() {
        let dir = tempfile::tempdir().unwrap();
        let global = write_config(
            &dir,
            r#"
[client]
timeout_secs = 0

[[transports]]
name = "api"
base_url = "https://api.example.com"
"#,
        );
        assert!(Config::load(&global).is_err());

        let per_transport = write_config(
            &dir,
            r#"
[[transports]]
name = "api"
base_url = "https://api.example.com"
timeout_secs = 0
"#,
        );
        let err = Config::load(&per_transport).unwrap_err();
        assert!(err.to_string().contains("api"), "got: {err}");
    }

    #[test]
    fn token_from_env_takes_precedence_over_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token");
        std::fs::write(&token_path, "from-file\n").unwrap();

        let mut config = Config::load(&write_config(&dir, valid_toml())).unwrap();
        config.client.token_file = Some(token_path);

        unsafe { set_env("AUTH_TOKEN", "from-env") };
        let token = config.resolve_token().unwrap().unwrap();
        assert_eq!(token.expose(), "from-env");

        unsafe { remove_env("AUTH_TOKEN") };
        let token = config.resolve_token().unwrap().unwrap();
        assert_eq!(token.expose(), "from-file");
    }

    #[test]
    fn no_token_source_resolves_to_none() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("AUTH_TOKEN") };
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&write_config(&dir, valid_toml())).unwrap();
        assert!(config.resolve_token().unwrap().is_none());
    }

    #[test]
    fn unreadable_token_file_is_an_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("AUTH_TOKEN") };
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::load(&write_config(&dir, valid_toml())).unwrap();
        config.client.token_file = Some(PathBuf::from("/nonexistent/token"));
        assert!(matches!(
            config.resolve_token(),
            Err(common::Error::Credential(_))
        ));
    }

    #[test]
    fn resolve_path_prefers_cli() {
        assert_eq!(
            Config::resolve_path(Some("/etc/auth-replay.toml")),
            PathBuf::from("/etc/auth-replay.toml")
        );
    }

    #[test]
    fn resolve_path_uses_env_then_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/tmp/from-env.toml") };
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from("/tmp/from-env.toml")
        );
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("auth-replay.toml"));
    }
}
