//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults.
//! The login password is read from PORTFOLIO_PASSWORD or stdin, never from
//! the TOML file.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use portfolio_auth::OidcConfig;
use portfolio_session::DEFAULT_BASE_URL;
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "portfolio.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub keycloak: OidcConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Backend REST API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Where the session tokens are persisted between runs
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_timeout() -> u64 {
    10
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("portfolio-session.json")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.finish()
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> common::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Config::default().finish()
        }
    }

    fn finish(mut self) -> common::Result<Self> {
        self.apply_env();
        self.validate()?;
        Ok(self)
    }

    fn apply_env(&mut self) {
        let overlay = |key: &str, target: &mut String| {
            if let Ok(value) = std::env::var(key)
                && !value.trim().is_empty()
            {
                *target = value.trim().to_owned();
            }
        };
        overlay("KEYCLOAK_URL", &mut self.keycloak.url);
        overlay("KEYCLOAK_REALM", &mut self.keycloak.realm);
        overlay("KEYCLOAK_CLIENT_ID", &mut self.keycloak.client_id);
        overlay("API_URL", &mut self.api.base_url);
    }

    fn validate(&self) -> common::Result<()> {
        for (field, url) in [
            ("keycloak.url", &self.keycloak.url),
            ("keycloak.redirect_uri", &self.keycloak.redirect_uri),
            ("api.base_url", &self.api.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{field} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.keycloak.realm.trim().is_empty() {
            return Err(common::Error::Config("keycloak.realm must not be empty".into()));
        }
        if self.keycloak.client_id.trim().is_empty() {
            return Err(common::Error::Config(
                "keycloak.client_id must not be empty".into(),
            ));
        }
        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "api.timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    /// The flag is true when the path was asked for explicitly.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from(DEFAULT_CONFIG_FILE), false)
    }
}

/// Password for a credential login: PORTFOLIO_PASSWORD, else the first line
/// of `input`.
pub fn read_password(mut input: impl BufRead) -> common::Result<Secret<String>> {
    if let Ok(password) = std::env::var("PORTFOLIO_PASSWORD") {
        return Ok(Secret::new(password));
    }
    let mut line = String::new();
    input.read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_owned();
    if password.is_empty() {
        return Err(common::Error::Config(
            "no password given (set PORTFOLIO_PASSWORD or pipe it on stdin)".into(),
        ));
    }
    Ok(Secret::new(password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_KEYS: [&str; 6] = [
        "KEYCLOAK_URL",
        "KEYCLOAK_REALM",
        "KEYCLOAK_CLIENT_ID",
        "API_URL",
        "CONFIG_PATH",
        "PORTFOLIO_PASSWORD",
    ];

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn clear_env() {
        for key in ENV_KEYS {
            unsafe { remove_env(key) };
        }
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("portfolio.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn valid_toml() -> &'static str {
        r#"
[keycloak]
url = "https://sso.example.com"
realm = "PortfolioRealm"
client_id = "portfolio-cli"

[api]
base_url = "https://portfolio.example.com/api"
timeout_secs = 30

[storage]
path = "/var/lib/portfolio/session.json"
"#
    }

    #[test]
    fn test_load_valid_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        let config = Config::load(&path).unwrap();
        assert_eq!(config.keycloak.url, "https://sso.example.com");
        assert_eq!(config.keycloak.client_id, "portfolio-cli");
        assert_eq!(config.keycloak.redirect_uri, "http://localhost:5173/");
        assert_eq!(config.api.base_url, "https://portfolio.example.com/api");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(
            config.storage.path,
            PathBuf::from("/var/lib/portfolio/session.json")
        );
    }

    #[test]
    fn test_missing_default_file_yields_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();

        let config = Config::load_or_default(&dir.path().join("portfolio.toml")).unwrap();
        assert_eq!(config.keycloak, OidcConfig::default());
        assert_eq!(config.api.base_url, "http://localhost:9090/api");
        assert_eq!(config.api.timeout_secs, 10);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/portfolio.toml"));
        assert!(matches!(result, Err(common::Error::Io(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(matches!(Config::load(&path), Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe {
            set_env("KEYCLOAK_URL", "http://keycloak:8080");
            set_env("KEYCLOAK_REALM", "Staging");
            set_env("API_URL", "http://backend:9090/api");
        }
        let config = Config::load(&path).unwrap();
        assert_eq!(config.keycloak.url, "http://keycloak:8080");
        assert_eq!(config.keycloak.realm, "Staging");
        assert_eq!(config.keycloak.client_id, "portfolio-cli");
        assert_eq!(config.api.base_url, "http://backend:9090/api");
        clear_env();
    }

    #[test]
    fn test_invalid_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[api]
base_url = "portfolio.example.com/api"
"#,
        );

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(
            err.contains("api.base_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[api]\ntimeout_secs = 0\n");
        assert!(Config::load(&path).is_err(), "timeout_secs = 0 must be rejected");
    }

    #[test]
    fn test_empty_realm_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[keycloak]\nrealm = \"  \"\n");
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("keycloak.realm"), "got: {err}");
    }

    #[test]
    fn test_resolve_path_precedence() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        assert_eq!(
            Config::resolve_path(None),
            (PathBuf::from("portfolio.toml"), false)
        );

        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        assert_eq!(
            Config::resolve_path(None),
            (PathBuf::from("/env/path.toml"), true)
        );
        assert_eq!(
            Config::resolve_path(Some("/cli/wins.toml")),
            (PathBuf::from("/cli/wins.toml"), true),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        clear_env();
    }

    #[test]
    fn test_password_from_env_then_stdin() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        let from_stdin = read_password("hunter2\n".as_bytes()).unwrap();
        assert_eq!(from_stdin.expose(), "hunter2");

        assert!(read_password("".as_bytes()).is_err());

        unsafe { set_env("PORTFOLIO_PASSWORD", "from-env") };
        let from_env = read_password("ignored\n".as_bytes()).unwrap();
        assert_eq!(from_env.expose(), "from-env");
        clear_env();
    }
}
