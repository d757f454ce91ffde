//! Search backend configuration model and defaults.

use std::path::{Path, PathBuf};

use log::{info, warn};

/// Environment variable overriding `database.path`.
pub const DB_FILE_ENV: &str = "QUASAR_DBFILE";
/// Environment variable pointing at an alternate config file.
pub const CONFIG_FILE_ENV: &str = "QUASAR_CONFIG";
/// Environment variable overriding `logging.level`.
pub const LOG_LEVEL_ENV: &str = "QUASAR_LOG";

/// Root configuration read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct Config {
    /// Track index location.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Operator-facing diagnostics.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Response framing.
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct OutputConfig {
    /// Emit the CGI `Content-type` header before the JSON document.
    #[serde(default = "default_true")]
    pub cgi_header: bool,
}

/// Log verbosity written to stderr.
#[derive(Debug, Clone, Copy, serde::Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Some(LogLevel::Off),
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn as_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            cgi_header: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_database_path() -> PathBuf {
    PathBuf::from("quasar.db")
}

/// `$QUASAR_CONFIG`, else `<config dir>/quasar/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_FILE_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("quasar").join("config.toml"))
}

/// Reads a config file. A missing file is not an error.
pub fn read_config_file(path: &Path) -> Result<Option<Config>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str::<Config>(&content)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Applies environment overrides on top of file settings.
pub fn apply_env_overrides(
    mut config: Config,
    db_file: Option<String>,
    log_level: Option<String>,
) -> Config {
    if let Some(db_file) = db_file.filter(|value| !value.is_empty()) {
        config.database.path = PathBuf::from(db_file);
    }
    if let Some(raw_level) = log_level {
        match LogLevel::parse(&raw_level) {
            Some(level) => config.logging.level = level,
            None => warn!("Ignoring unknown log level {:?} from {}", raw_level, LOG_LEVEL_ENV),
        }
    }
    config
}

/// Loads the effective configuration. Unreadable or malformed files fall back
/// to defaults with a warning.
pub fn load() -> Config {
    let from_file = match config_file_path() {
        Some(path) => match read_config_file(&path) {
            Ok(Some(config)) => {
                info!("Loaded config. path={}", path.display());
                config
            }
            Ok(None) => Config::default(),
            Err(err) => {
                warn!("{}; using defaults", err);
                Config::default()
            }
        },
        None => Config::default(),
    };
    apply_env_overrides(
        from_file,
        std::env::var(DB_FILE_ENV).ok(),
        std::env::var(LOG_LEVEL_ENV).ok(),
    )
}
