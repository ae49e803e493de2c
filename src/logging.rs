//! Logging infrastructure for argv-bridge
//!
//! Structured logging through `tracing`, with subscriber setup for the
//! binary and the Python extension, plus the per-event helpers the
//! marshaller calls on its hot path.

use crate::errors::MarshalError;
use std::os::raw::c_int;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

// Re-export tracing macros for use throughout the crate
pub use tracing::{debug, error, info, trace, warn};

/// Line format for bridge logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

/// Where bridge logs go. Stdout is left to the embedded runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    /// Daily-rotated files named `<prefix>.<date>` under `directory`
    RollingFile { directory: PathBuf, prefix: String },
}

/// Subscriber settings for the bridge.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Extra `EnvFilter` directives, e.g. "marshal=trace,runtime=debug"
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::stderr(Level::INFO)
    }
}

impl LogConfig {
    /// Compact lines on stderr at `level`.
    pub fn stderr(level: Level) -> Self {
        Self {
            level,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            filter: None,
        }
    }

    /// JSON lines in daily files under `directory`, prefixed `argv-bridge`.
    pub fn rolling(level: Level, directory: impl Into<PathBuf>) -> Self {
        Self {
            level,
            format: LogFormat::Json,
            output: LogOutput::RollingFile {
                directory: directory.into(),
                prefix: "argv-bridge".to_string(),
            },
            filter: None,
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Install the global subscriber described by `config`.
///
/// Keep the returned guard alive until exit so buffered lines are flushed.
/// Returns `None`, leaving the existing subscriber in place, if one is
/// already installed.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let (layer, guard) = match &config.output {
        LogOutput::Stderr => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
            (fmt_layer(writer, config.format), guard)
        }
        LogOutput::RollingFile { directory, prefix } => {
            let (writer, guard) = tracing_appender::non_blocking(rolling::daily(directory, prefix));
            (fmt_layer(writer, config.format), guard)
        }
    };

    let filter = build_filter(&config);
    match tracing_subscriber::registry().with(layer.with_filter(filter)).try_init() {
        Ok(()) => Some(guard),
        Err(_) => None,
    }
}

fn fmt_layer<W>(writer: W, format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_target(true);
    match format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

// `RUST_LOG` first, then the configured level, then the configured directives.
fn build_filter(config: &LogConfig) -> EnvFilter {
    let directives = config.filter.as_deref().unwrap_or("");
    directives
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .fold(
            EnvFilter::from_default_env().add_directive(config.level.into()),
            |filter, directive| match directive.parse() {
                Ok(d) => filter.add_directive(d),
                Err(_) => {
                    warn!(directive, "ignoring invalid log filter directive");
                    filter
                }
            },
        )
}

// Guard for subscribers installed on behalf of foreign callers, which have
// nowhere to keep it.
static GLOBAL_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

/// Install a subscriber and keep its guard in a process-wide slot.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_global_logging(config: LogConfig) -> bool {
    match init_logging(config) {
        Some(guard) => {
            *GLOBAL_GUARD.lock().unwrap_or_else(|e| e.into_inner()) = Some(guard);
            true
        }
        None => false,
    }
}

/// Drop the process-wide guard, flushing buffered log lines.
pub fn flush_global_logging() {
    GLOBAL_GUARD.lock().unwrap_or_else(|e| e.into_inner()).take();
}

/// Log a packed buffer allocation
#[inline]
pub fn log_buffer_allocated(size: usize, ptr: *const u8) {
    trace!(target: "marshal", size, ptr = ?ptr, "argument buffer allocated");
}

/// Log a packed buffer release
#[inline]
pub fn log_buffer_released(size: usize, ptr: *const u8) {
    trace!(target: "marshal", size, ptr = ?ptr, "argument buffer released");
}

/// Log the hand-off to the runtime entry point
#[inline]
pub fn log_runtime_call(argc: c_int) {
    debug!(target: "runtime", argc, "starting embedded runtime");
}

/// Log the runtime's exit code. Non-zero codes belong to the runtime, not to us.
#[inline]
pub fn log_runtime_return(exit_code: c_int) {
    if exit_code == 0 {
        info!(target: "runtime", exit_code, "embedded runtime exited");
    } else {
        warn!(target: "runtime", exit_code, "embedded runtime reported failure");
    }
}

/// Log a marshalling failure
#[inline]
pub fn log_marshal_error(err: &MarshalError) {
    error!(target: "marshal", error = %err, sentinel = err.exit_code(), "marshalling aborted");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConversionError;

    #[test]
    fn test_stderr_and_rolling_presets() {
        let config = LogConfig::stderr(Level::DEBUG).with_filter("marshal=trace");
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.output, LogOutput::Stderr);
        assert_eq!(config.filter.as_deref(), Some("marshal=trace"));

        let config = LogConfig::rolling(Level::WARN, "/var/log/bridge").with_format(LogFormat::Pretty);
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(
            config.output,
            LogOutput::RollingFile {
                directory: PathBuf::from("/var/log/bridge"),
                prefix: "argv-bridge".to_string(),
            }
        );
    }

    #[test]
    fn test_bad_directive_is_skipped() {
        let config = LogConfig::default().with_filter("marshal=trace,,=oops=");
        // Must not panic.
        let _ = build_filter(&config);
    }

    #[test]
    fn test_rolling_output_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let Some(guard) = init_logging(LogConfig::rolling(Level::INFO, dir.path())) else {
            // Another subscriber owns this process.
            return;
        };
        log_runtime_return(3);
        drop(guard);

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(!files.is_empty());
        assert!(!init_global_logging(LogConfig::default()));
    }

    #[test]
    fn test_logging_helpers() {
        log_buffer_allocated(16, std::ptr::null());
        log_buffer_released(16, std::ptr::null());
        log_runtime_call(2);
        log_runtime_return(0);
        log_runtime_return(1);
        log_marshal_error(&ConversionError::NullElement { index: 0 }.into());
    }
}
