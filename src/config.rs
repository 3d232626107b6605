use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const APP_NAME: &str = "spotify-console-token";
pub const DEFAULT_CONSOLE_URL: &str = "https://developer.spotify.com/console/get-playlist-tracks/";
pub const DEFAULT_API_BASE: &str = "https://api.spotify.com";

const USERNAME_ENV: &str = "SPOTIFY_USERNAME";
const PASSWORD_ENV: &str = "SPOTIFY_PASSWORD";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub credentials: Option<CredentialsConfig>,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub selectors: ConsoleSelectors,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Deserialize, Clone, Default)]
pub struct CredentialsConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConsoleConfig {
    pub url: String,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub no_sandbox: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CONSOLE_URL.to_string(),
            headless: true,
            chrome_executable: None,
            no_sandbox: false,
        }
    }
}

/// Readiness bounds for the console routine, in milliseconds.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimeoutConfig {
    pub element_ms: u64,
    pub token_ms: u64,
    pub poll_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            element_ms: 10_000,
            token_ms: 15_000,
            poll_ms: 100,
        }
    }
}

impl TimeoutConfig {
    pub fn element(&self) -> Duration {
        Duration::from_millis(self.element_ms)
    }

    pub fn token(&self) -> Duration {
        Duration::from_millis(self.token_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }
}

/// CSS selectors for every control the console routine touches.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ConsoleSelectors {
    pub header_button: String,
    pub scope_read_private: String,
    pub scope_read_collaborative: String,
    pub request_token: String,
    pub username: String,
    pub password: String,
    pub login_button: String,
    pub token_field: String,
}

impl Default for ConsoleSelectors {
    fn default() -> Self {
        Self {
            header_button: "#console-form > div.form-group.header-params > div > span > button"
                .to_string(),
            scope_read_private: "#scope-playlist-read-private".to_string(),
            scope_read_collaborative: "#scope-playlist-read-collaborative".to_string(),
            request_token: "#oauthRequestToken".to_string(),
            username: "#login-username".to_string(),
            password: "#login-password".to_string(),
            login_button: "#login-button".to_string(),
            token_field: "#oauth-input".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub file_log: Option<bool>,
    pub log_dir: Option<String>,
    pub log_file: Option<String>,
}

/// Username/password pair typed into the console's sign-in form.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Outcome of searching the default config locations.
///
/// Nothing is logged while searching: the search runs before logging is set
/// up, so the caller reports `source` and `skipped` once it is.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: AppConfig,
    /// The file the config came from, `None` when defaults are in use.
    pub source: Option<PathBuf>,
    /// Files that exist but could not be read or parsed.
    pub skipped: Vec<ConfigError>,
}

impl AppConfig {
    /// Searches the default locations; unreadable or malformed files are skipped.
    pub fn load() -> LoadedConfig {
        Self::load_from(&Self::search_paths())
    }

    /// Uses the first of `paths` that exists and parses.
    pub fn load_from(paths: &[PathBuf]) -> LoadedConfig {
        let mut skipped = Vec::new();
        for path in paths.iter().filter(|p| p.exists()) {
            match Self::from_path(path) {
                Ok(config) => {
                    return LoadedConfig {
                        config,
                        source: Some(path.clone()),
                        skipped,
                    }
                }
                Err(e) => skipped.push(e),
            }
        }

        LoadedConfig {
            config: Self::default(),
            source: None,
            skipped,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn search_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from("console-token.toml"),
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_NAME)
                .join("config.toml"),
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(format!(".{}", APP_NAME))
                .join("config.toml"),
        ]
    }

    /// Credentials from the config file, falling back to the environment per field.
    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials_with(|key| std::env::var(key).ok())
    }

    fn credentials_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<Credentials> {
        let file = self.credentials.clone().unwrap_or_default();
        let username = file
            .username
            .filter(|s| !s.is_empty())
            .or_else(|| env(USERNAME_ENV))
            .filter(|s| !s.is_empty())?;
        let password = file
            .password
            .filter(|s| !s.is_empty())
            .or_else(|| env(PASSWORD_ENV))
            .filter(|s| !s.is_empty())?;
        Some(Credentials::new(username, password))
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache.path.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join(APP_NAME)
                .join("bearer.token")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_point_at_live_console() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.console.url, DEFAULT_CONSOLE_URL);
        assert!(config.console.headless);
        assert_eq!(config.selectors.token_field, "#oauth-input");
        assert_eq!(config.api.base_url, DEFAULT_API_BASE);
        assert!(config.cache.enabled);
        assert_eq!(config.timeouts.poll(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_sections_keep_remaining_defaults() {
        let config = AppConfig::parse(
            r##"
            [console]
            url = "http://127.0.0.1:8080/console"

            [selectors]
            login_button = "#sign-in"

            [timeouts]
            token_ms = 500
            "##,
        )
        .unwrap();

        assert_eq!(config.console.url, "http://127.0.0.1:8080/console");
        assert!(config.console.headless);
        assert_eq!(config.selectors.login_button, "#sign-in");
        assert_eq!(config.selectors.username, "#login-username");
        assert_eq!(config.timeouts.token_ms, 500);
        assert_eq!(config.timeouts.element_ms, 10_000);
    }

    #[test]
    fn test_credentials_from_file_win_over_env() {
        let config = AppConfig::parse(
            r#"
            [credentials]
            username = "alice"
            password = "secret"
            "#,
        )
        .unwrap();

        let creds = config
            .credentials_with(|_| Some("from-env".to_string()))
            .unwrap();
        assert_eq!(creds, Credentials::new("alice", "secret"));
    }

    #[test]
    fn test_credentials_fall_back_to_env_per_field() {
        let config = AppConfig::parse(
            r#"
            [credentials]
            username = "alice"
            "#,
        )
        .unwrap();

        let creds = config
            .credentials_with(|key| (key == PASSWORD_ENV).then(|| "hunter2".to_string()))
            .unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "hunter2");
    }

    #[test]
    fn test_credentials_require_both_fields() {
        let config = AppConfig::default();
        assert!(config.credentials_with(|_| None).is_none());

        let config = AppConfig::parse("[credentials]\nusername = \"alice\"\npassword = \"\"").unwrap();
        assert!(config.credentials_with(|_| None).is_none());
    }

    #[test]
    fn test_debug_output_redacts_password() {
        let creds = Credentials::new("alice", "secret");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_from_path_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[console\nurl = 1").unwrap();

        let err = AppConfig::from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_skips_malformed_file_and_reports_it() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("console-token.toml");
        let fallback = dir.path().join("config.toml");
        std::fs::write(&broken, "[console\nurl = 1").unwrap();
        std::fs::write(&fallback, "[credentials]\nusername = \"alice\"").unwrap();

        let loaded = AppConfig::load_from(&[
            broken.clone(),
            dir.path().join("missing.toml"),
            fallback.clone(),
        ]);

        assert_eq!(loaded.source, Some(fallback));
        assert_eq!(
            loaded.config.credentials.and_then(|c| c.username).as_deref(),
            Some("alice")
        );
        assert_eq!(loaded.skipped.len(), 1);
        match &loaded.skipped[0] {
            ConfigError::Parse { path, .. } => assert_eq!(path, &broken),
            other => panic!("expected Parse, got {:?}", other),
        }
    }

    #[test]
    fn test_load_with_only_malformed_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("console-token.toml");
        std::fs::write(&broken, "[console\nurl = 1").unwrap();

        let loaded = AppConfig::load_from(&[broken]);

        assert!(loaded.source.is_none());
        assert_eq!(loaded.config.console.url, DEFAULT_CONSOLE_URL);
        assert_eq!(loaded.skipped.len(), 1);
        assert!(loaded.skipped[0].to_string().starts_with("Failed to parse config at"));
    }
}
