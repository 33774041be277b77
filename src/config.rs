//! Configuration types for the capability bridge.

use crate::error::{BridgeError, Result};
use crate::facade::FacadeKind;
use crate::facade::data::{DEFAULT_PATH, DEFAULT_SCHEME, NotificationFilter};
use crate::facade::location::LocationSource;
use crate::facade::sensor::SensorKind;
use crate::reading::CacheKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Diagnostic logging.
    pub logging: LoggingConfig,
    /// Sensor facade.
    pub sensors: SensorsConfig,
    /// Location facade.
    pub location: LocationConfig,
    /// Speech facade.
    pub speech: SpeechConfig,
    /// Data channel facade.
    pub data_channel: DataChannelConfig,
    /// Output relay.
    pub output: OutputConfig,
    /// Interpreter lifecycle manager.
    pub interpreter: InterpreterConfig,
}

/// Diagnostic (tracing) log settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Also write a daily rolling log file.
    pub file: bool,
    /// Directory for the rolling file (None = `bridge_dirs::logs_dir()`).
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file: false,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    /// Kinds `start()` registers (when present on the device).
    pub enabled: Vec<SensorKind>,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            enabled: SensorKind::all().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub gps: bool,
    pub network: bool,
    /// Platform fused provider; off by default since not every host has one.
    pub fused: bool,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            gps: true,
            network: true,
            fused: false,
        }
    }
}

impl LocationConfig {
    /// Enabled providers in a fixed order.
    #[must_use]
    pub fn sources(&self) -> Vec<LocationSource> {
        [
            (self.gps, LocationSource::Gps),
            (self.network, LocationSource::Network),
            (self.fused, LocationSource::Fused),
        ]
        .into_iter()
        .filter_map(|(on, source)| on.then_some(source))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Longest message the engine accepts in one utterance.
    pub max_message_chars: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 4_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataChannelConfig {
    pub scheme: String,
    pub path: String,
}

impl Default for DataChannelConfig {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_owned(),
            path: DEFAULT_PATH.to_owned(),
        }
    }
}

impl DataChannelConfig {
    #[must_use]
    pub fn filter(&self) -> NotificationFilter {
        NotificationFilter::new(self.scheme.clone(), self.path.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Tag prefixed to durable log lines.
    pub tag: String,
    /// Write durable lines to a daily file instead of the tracing log.
    pub log_file: bool,
    /// Directory for the durable log file (None = `bridge_dirs::logs_dir()`).
    pub log_dir: Option<PathBuf>,
    /// Show transient notices when a UI is attached.
    pub notices: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            tag: "capbridge".to_owned(),
            log_file: false,
            log_dir: None,
            notices: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Interpreter executable used by the subprocess entry.
    pub program: PathBuf,
    /// Environment variable that receives the home directory.
    pub home_env: String,
    /// Number of anonymous roles `start_in_idle_slot` chooses from.
    pub pool_size: usize,
    /// Facades constructed and started before each run.
    pub preload: Vec<FacadeKind>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("python3"),
            home_env: "PYTHONHOME".to_owned(),
            pool_size: 10,
            preload: vec![
                FacadeKind::Sensor,
                FacadeKind::Location,
                FacadeKind::Battery,
                FacadeKind::Network,
            ],
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// [`validate`](Self::validate).
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| BridgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| BridgeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Loads the default config file, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_config_path();
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// `~/.config/capbridge/config.toml` unless overridden.
    pub fn default_config_path() -> PathBuf {
        crate::bridge_dirs::config_file()
    }

    /// Rejects settings the bridge cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.data_channel.scheme.trim().is_empty() {
            return Err(BridgeError::Config("data_channel.scheme is empty".to_owned()));
        }
        if self.data_channel.path.trim_matches('/').is_empty() {
            return Err(BridgeError::Config("data_channel.path is empty".to_owned()));
        }
        if self.interpreter.pool_size == 0 {
            return Err(BridgeError::Config("interpreter.pool_size must be > 0".to_owned()));
        }
        if self.interpreter.program.as_os_str().is_empty() {
            return Err(BridgeError::Config("interpreter.program is empty".to_owned()));
        }
        if self.speech.max_message_chars == 0 {
            return Err(BridgeError::Config(
                "speech.max_message_chars must be > 0".to_owned(),
            ));
        }
        Ok(())
    }
}
