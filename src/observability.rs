//! Logging and observability helpers.
//!
//! The library only emits `tracing` events; binaries and tests that want to
//! see them call [`init_tracing`] once at startup.

use std::fs;
use std::path::PathBuf;

use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "dbconnector.log";
const DEFAULT_FILTER: &str = "dbconnector=info";

/// Where log lines go
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogTarget {
    #[default]
    Stderr,
    /// Daily-rolling files in this directory
    Directory(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub target: LogTarget,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    pub ansi: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            target: LogTarget::Stderr,
            default_filter: DEFAULT_FILTER.to_string(),
            ansi: true,
        }
    }
}

impl LogSettings {
    /// Files under `~/.dbconnector/logs` (`%APPDATA%\DbConnector\logs` on
    /// Windows), no colors.
    pub fn file() -> Self {
        Self {
            target: LogTarget::Directory(log_directory()),
            ansi: false,
            ..Self::default()
        }
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Installs the global subscriber. Returns `false` when one was already set.
pub fn init_tracing(settings: &LogSettings) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.env_filter())
        .with_ansi(settings.ansi)
        .with_span_events(FmtSpan::CLOSE);

    match &settings.target {
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init().is_ok(),
        LogTarget::Directory(dir) => {
            let _ = fs::create_dir_all(dir);
            let file_appender: RollingFileAppender =
                tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            builder.with_writer(file_appender).try_init().is_ok()
        }
    }
}

fn log_directory() -> PathBuf {
    if cfg!(windows) {
        let appdata = std::env::var_os("APPDATA")
            .unwrap_or_else(|| std::env::var_os("USERPROFILE").unwrap_or_default());
        let mut path = PathBuf::from(appdata);
        path.push("DbConnector");
        path.push("logs");
        path
    } else {
        let home = std::env::var_os("HOME").unwrap_or_default();
        let mut path = PathBuf::from(home);
        path.push(".dbconnector");
        path.push("logs");
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_settings_point_at_a_logs_directory() {
        let settings = LogSettings::file();
        match settings.target {
            LogTarget::Directory(dir) => assert!(dir.ends_with("logs")),
            LogTarget::Stderr => panic!("expected a directory target"),
        }
        assert!(!settings.ansi);
        assert_eq!(settings.default_filter, "dbconnector=info");
    }

    #[test]
    fn second_init_reports_existing_subscriber() {
        let settings = LogSettings::default().with_default_filter("dbconnector=debug");
        init_tracing(&settings);
        assert!(!init_tracing(&settings));
    }
}
