//! Logging bootstrap for FireSense tools
//!
//! Console output uses the bracketed `timestamp [LEVEL] message` format (or
//! JSON lines). When a log directory is configured, a daily file named
//! `{service}.log.{YYYY-MM-DD}` receives the same events through a
//! non-blocking writer.

use std::path::PathBuf;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use parking_lot::Mutex;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter: `2024-03-15T14:30:15.000000Z [INFO] Loaded 2 channels`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

// Keeps file writers flushing until process exit
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as the log file prefix
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Directory for daily log files; console only when `None`
    pub log_dir: Option<PathBuf>,
    /// JSON lines instead of the bracketed format
    pub enable_json: bool,
    /// Colored console levels
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "firesense".to_string(),
            level: "info".to_string(),
            log_dir: None,
            enable_json: false,
            ansi: true,
        }
    }
}

impl LogConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn with_json(mut self, enable: bool) -> Self {
        self.enable_json = enable;
        self
    }
}

/// `RUST_LOG` when set, otherwise the configured level
pub fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    match std::env::var("RUST_LOG") {
        Ok(env) if !env.trim().is_empty() => EnvFilter::try_new(&env)
            .map_err(|e| Error::Logging(format!("Invalid RUST_LOG '{}': {}", env, e))),
        _ => EnvFilter::try_new(&config.level)
            .map_err(|e| Error::Logging(format!("Invalid log level '{}': {}", config.level, e))),
    }
}

/// Initialize logging system with configuration
///
/// Fails when a global subscriber is already installed.
pub fn init_with_config(config: LogConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    let console_layer = if config.enable_json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer()
            .with_ansi(config.ansi)
            .event_format(BracketedLevelFormat)
            .boxed()
    };

    let file_layer = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender =
                tracing_appender::rolling::daily(dir, format!("{}.log", config.service_name));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            GUARDS.get_or_init(|| Mutex::new(Vec::new())).lock().push(guard);

            let layer = if config.enable_json {
                fmt::layer().json().with_writer(writer).boxed()
            } else {
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .event_format(BracketedLevelFormat)
                    .boxed()
            };
            Some(layer)
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

/// Console-only logging at `level`
pub fn init(level: &str) -> Result<()> {
    init_with_config(LogConfig::default().with_level(level))
}
