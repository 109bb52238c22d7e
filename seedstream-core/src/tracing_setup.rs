//! Log output for the `seedstream` binary
//!
//! Two layers share one registry. The console shows Seedstream's own crates
//! at the chosen level and everything else at `warn`; HTTP request spans
//! from `tower_http` appear only when debugging. Every command also writes
//! a trace file `seedstream-<command>.log` under the configured logs
//! directory, filtered by [`LoggingConfig::file_directives`].

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::LoggingConfig;

/// Crate targets that follow the console level.
const WORKSPACE_TARGETS: &[&str] = &[
    "seedstream",
    "seedstream_core",
    "seedstream_search",
    "seedstream_web",
];

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("Tracing already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Console filter directives for a level.
pub fn console_directives(level: Level) -> String {
    let level = level.to_string().to_ascii_lowercase();
    let http_level = if matches!(level.as_str(), "debug" | "trace") {
        "debug"
    } else {
        "warn"
    };

    let mut directives = vec!["warn".to_string()];
    directives.extend(
        WORKSPACE_TARGETS
            .iter()
            .map(|target| format!("{target}={level}")),
    );
    directives.push(format!("tower_http={http_level}"));
    directives.join(",")
}

/// Trace file used by one CLI command.
pub fn log_file_path(logs_dir: &Path, command: &str) -> PathBuf {
    logs_dir.join(format!("seedstream-{command}.log"))
}

/// Installs console and file logging for `command`.
///
/// `RUST_LOG` replaces the console directives when set. Returns the path of
/// the trace file, which is truncated on every run.
///
/// # Errors
///
/// - `TracingError::LogFile` - Logs directory or file could not be created
/// - `TracingError::Filter` - File directives do not parse
/// - `TracingError::AlreadyInitialized` - A global subscriber is already set
pub fn init_tracing(
    console_level: Level,
    logging: &LoggingConfig,
    command: &str,
) -> Result<PathBuf, TracingError> {
    let log_file_path = log_file_path(&logging.logs_dir, command);
    let log_file = std::fs::create_dir_all(&logging.logs_dir)
        .and_then(|()| File::create(&log_file_path))
        .map_err(|source| TracingError::LogFile {
            path: log_file_path.clone(),
            source,
        })?;

    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(console_directives(console_level))?,
    };
    let file_filter = EnvFilter::try_new(&logging.file_directives)?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::debug!(
        "Logging {} at {} to console, trace file {}",
        command,
        console_level,
        log_file_path.display()
    );
    Ok(log_file_path)
}

/// Console level picked on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CliLogLevel {
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_directives_scope_level_to_workspace() {
        assert_eq!(
            console_directives(Level::INFO),
            "warn,seedstream=info,seedstream_core=info,seedstream_search=info,\
             seedstream_web=info,tower_http=warn"
        );
        assert!(console_directives(Level::DEBUG).ends_with("seedstream_web=debug,tower_http=debug"));
        assert!(console_directives(CliLogLevel::Trace.as_tracing_level()).contains("seedstream_core=trace"));
    }

    #[test]
    fn test_directives_parse() {
        for level in [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE] {
            assert!(EnvFilter::try_new(console_directives(level)).is_ok(), "{level}");
        }
        assert!(EnvFilter::try_new(LoggingConfig::default().file_directives).is_ok());
    }

    #[test]
    fn test_log_file_per_command() {
        assert_eq!(
            log_file_path(Path::new("/var/lib/seedstream/logs"), "serve"),
            PathBuf::from("/var/lib/seedstream/logs/seedstream-serve.log")
        );
    }

    #[test]
    fn test_init_rejects_bad_file_directives() {
        let temp_dir = tempfile::tempdir().unwrap();
        let logging = LoggingConfig {
            logs_dir: temp_dir.path().join("logs"),
            file_directives: "seedstream=loud".to_string(),
        };

        let result = init_tracing(Level::INFO, &logging, "search");
        assert!(matches!(result, Err(TracingError::Filter(_))));
        assert!(temp_dir.path().join("logs/seedstream-search.log").exists());
    }
}
