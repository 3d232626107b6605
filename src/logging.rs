use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSection;

/// Directives used by `--verbose`.
pub const VERBOSE_DIRECTIVES: &str = "warn,spotify_console_token=debug";

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Set by `--verbose`; takes precedence over `RUST_LOG` and the level below.
    pub verbose: bool,
    pub log_level: Option<String>,
    pub file_log: Option<bool>,
    pub log_dir: Option<String>,
    pub log_file: Option<String>,
}

impl From<&LoggingSection> for LoggingConfig {
    fn from(section: &LoggingSection) -> Self {
        Self {
            verbose: false,
            log_level: section.level.clone(),
            file_log: section.file_log,
            log_dir: section.log_dir.clone(),
            log_file: section.log_file.clone(),
        }
    }
}

/// Installs the global subscriber. The console layer writes to stderr so that
/// stdout only ever carries the token.
pub fn init_logging(
    config: LoggingConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let directives = filter_directives(&config, std::env::var(EnvFilter::DEFAULT_ENV).ok());
    let filter = EnvFilter::try_new(directives)
        .or_else(|_| EnvFilter::try_new(resolve_level(&config)))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let enable_file = config.file_log.unwrap_or_else(|| {
        std::env::var("CONSOLE_TOKEN_FILE_LOG")
            .map(|v| v != "0")
            .unwrap_or(false)
    });

    if !enable_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
        return Ok(None);
    }

    let log_dir = config
        .log_dir
        .or_else(|| std::env::var("CONSOLE_TOKEN_LOG_DIR").ok())
        .unwrap_or_else(|| "logs".to_string());
    let log_file = config
        .log_file
        .or_else(|| std::env::var("CONSOLE_TOKEN_LOG_FILE").ok())
        .unwrap_or_else(|| "spotify-console-token.log".to_string());
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking)
                .with_target(true),
        )
        .try_init()?;

    Ok(Some(guard))
}

/// `--verbose` first, then `RUST_LOG`, then the configured level.
fn filter_directives(config: &LoggingConfig, rust_log: Option<String>) -> String {
    if config.verbose {
        return VERBOSE_DIRECTIVES.to_string();
    }
    rust_log
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| resolve_level(config))
}

fn resolve_level(config: &LoggingConfig) -> String {
    config
        .log_level
        .clone()
        .or_else(|| std::env::var("CONSOLE_TOKEN_LOG_LEVEL").ok())
        .unwrap_or_else(|| "warn".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_level_wins() {
        let config = LoggingConfig {
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_level(&config), "debug");
    }

    #[test]
    fn test_verbose_beats_rust_log() {
        let config = LoggingConfig {
            verbose: true,
            log_level: Some("error".to_string()),
            ..Default::default()
        };
        assert_eq!(
            filter_directives(&config, Some("info".to_string())),
            VERBOSE_DIRECTIVES
        );
    }

    #[test]
    fn test_rust_log_beats_configured_level() {
        let config = LoggingConfig {
            log_level: Some("error".to_string()),
            ..Default::default()
        };
        assert_eq!(filter_directives(&config, Some("info".to_string())), "info");
        assert_eq!(filter_directives(&config, Some(" ".to_string())), "error");
        assert_eq!(filter_directives(&config, None), "error");
    }

    #[test]
    fn test_section_conversion() {
        let section = LoggingSection {
            level: Some("trace".to_string()),
            file_log: Some(true),
            log_dir: Some("/tmp/logs".to_string()),
            log_file: None,
        };
        let config = LoggingConfig::from(&section);
        assert_eq!(config.log_level.as_deref(), Some("trace"));
        assert_eq!(config.file_log, Some(true));
        assert_eq!(config.log_dir.as_deref(), Some("/tmp/logs"));
        assert!(config.log_file.is_none());
        assert!(!config.verbose);
    }
}
