use crate::logging::{LogConfig, LogFormat};
use crate::marshal::Limits;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;

/// Environment variable naming a config file for [`BridgeConfig::discover`].
pub const CONFIG_ENV: &str = "ARGV_BRIDGE_CONFIG";

/// Entry symbol looked up when none is configured.
pub const DEFAULT_ENTRY_SYMBOL: &str = "node_start";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Shared library exporting the entry point.
    #[serde(default)]
    pub library: Option<PathBuf>,

    /// Exported `int (*)(int, char**)` to call.
    #[serde(default = "default_symbol")]
    pub symbol: String,
}

/// Opt-in caps. Unset means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default)]
    pub max_total_bytes: Option<usize>,

    #[serde(default)]
    pub max_arguments: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormatConfig,

    /// When set, logs go to daily-rotated files in this directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatConfig {
    Pretty,
    #[default]
    Compact,
    Json,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            limits: LimitsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            library: None,
            symbol: default_symbol(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormatConfig::default(),
            directory: None,
            filter: None,
        }
    }
}

fn default_symbol() -> String {
    DEFAULT_ENTRY_SYMBOL.to_string()
}

fn default_level() -> String {
    "info".to_string()
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: Some(path.to_path_buf()),
                reason,
            },
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: None,
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `$ARGV_BRIDGE_CONFIG` if set, else defaults.
    pub fn discover() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(PathBuf::from(path)),
            _ => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.symbol.is_empty() {
            return Err(ConfigError::Invalid("runtime.symbol must not be empty".into()));
        }
        if self.runtime.symbol.contains('\0') {
            return Err(ConfigError::Invalid("runtime.symbol must not contain NUL".into()));
        }
        parse_level(&self.logging.level)?;
        Ok(())
    }

    pub fn limits(&self) -> Limits {
        let unbounded = Limits::unbounded();
        Limits {
            max_total_bytes: self.limits.max_total_bytes.unwrap_or(unbounded.max_total_bytes),
            max_arguments: self.limits.max_arguments.unwrap_or(unbounded.max_arguments),
        }
    }

    pub fn log_config(&self) -> Result<LogConfig, ConfigError> {
        let format = match self.logging.format {
            LogFormatConfig::Pretty => LogFormat::Pretty,
            LogFormatConfig::Compact => LogFormat::Compact,
            LogFormatConfig::Json => LogFormat::Json,
        };
        let level = parse_level(&self.logging.level)?;
        let base = match &self.logging.directory {
            Some(dir) => LogConfig::rolling(level, dir.clone()),
            None => LogConfig::stderr(level),
        };

        let mut config = base.with_format(format);
        if let Some(filter) = &self.logging.filter {
            config = config.with_filter(filter.clone());
        }
        Ok(config)
    }

    /// Pretty JSON rendering for diagnostics.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

fn parse_level(level: &str) -> Result<Level, ConfigError> {
    level
        .parse::<Level>()
        .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", level)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io { path: PathBuf, reason: String },
    Parse { path: Option<PathBuf>, reason: String },
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, reason } => {
                write!(f, "cannot read config {}: {}", path.display(), reason)
            }
            Self::Parse { path: Some(path), reason } => {
                write!(f, "invalid config {}: {}", path.display(), reason)
            }
            Self::Parse { path: None, reason } => write!(f, "invalid config: {}", reason),
            Self::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogOutput;
    use std::io::Write;

    #[test]
    fn defaults_when_empty() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.runtime.symbol, DEFAULT_ENTRY_SYMBOL);
        assert_eq!(config.limits(), Limits::unbounded());
    }

    #[test]
    fn limits_apply_only_when_set() {
        let config = BridgeConfig::from_toml_str("[limits]\nmax_arguments = 2").unwrap();
        assert_eq!(config.limits().max_arguments, 2);
        assert_eq!(config.limits().max_total_bytes, usize::MAX);
    }

    #[test]
    fn parses_all_sections() {
        let config = BridgeConfig::from_toml_str(
            r#"
            [runtime]
            library = "/opt/node/libnode.so"
            symbol = "embedded_main"

            [limits]
            max_total_bytes = 4096
            max_arguments = 8

            [logging]
            level = "debug"
            format = "json"
            filter = "marshal=trace"
            "#,
        )
        .unwrap();

        assert_eq!(config.runtime.library, Some(PathBuf::from("/opt/node/libnode.so")));
        assert_eq!(config.runtime.symbol, "embedded_main");
        assert_eq!(config.limits().max_total_bytes, 4096);
        assert_eq!(config.limits().max_arguments, 8);

        let log = config.log_config().unwrap();
        assert_eq!(log.level, Level::DEBUG);
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(log.output, LogOutput::Stderr);
        assert_eq!(log.filter.as_deref(), Some("marshal=trace"));
    }

    #[test]
    fn rejects_unknown_level_and_empty_symbol() {
        let err = BridgeConfig::from_toml_str("[logging]\nlevel = \"loud\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = BridgeConfig::from_toml_str("[runtime]\nsymbol = \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_reports_path_on_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limits]\nmax_arguments = \"many\"").unwrap();

        match BridgeConfig::load(file.path()).unwrap_err() {
            ConfigError::Parse { path, .. } => assert_eq!(path.as_deref(), Some(file.path())),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn load_from_file_with_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");
        fs::write(&path, format!("[logging]\ndirectory = {:?}\n", dir.path().display().to_string()))
            .unwrap();

        let config = BridgeConfig::load(&path).unwrap();
        match config.log_config().unwrap().output {
            LogOutput::RollingFile { directory, prefix } => {
                assert_eq!(directory, dir.path());
                assert_eq!(prefix, "argv-bridge");
            }
            other => panic!("expected file output, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = BridgeConfig::load("/nonexistent/argv-bridge.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn json_dump_contains_symbol() {
        let json = BridgeConfig::default().to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["runtime"]["symbol"], DEFAULT_ENTRY_SYMBOL);
    }
}
