use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use techdocs_core::{EntityRefDefaults, BUILDING_DELAY};

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Namespace for entity refs that don't name one
    pub default_namespace: ConfigValue<String>,
    /// Kind for entity refs that don't name one
    pub default_kind: ConfigValue<String>,
    /// How long a sync runs before the build is shown
    pub building_delay_ms: ConfigValue<u64>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    default_namespace: Option<String>,
    default_kind: Option<String>,
    building_delay_ms: Option<u64>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let defaults = EntityRefDefaults::default();

        // Start with defaults
        let mut default_namespace = ConfigValue::new(defaults.namespace, ConfigSource::Default);
        let mut default_kind = ConfigValue::new("component".to_string(), ConfigSource::Default);
        let mut building_delay_ms = ConfigValue::new(
            BUILDING_DELAY.as_millis() as u64,
            ConfigSource::Default,
        );
        let mut config_file = None;

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(namespace) = file_config.default_namespace {
                default_namespace = ConfigValue::new(namespace, ConfigSource::File);
            }
            if let Some(kind) = file_config.default_kind {
                default_kind = ConfigValue::new(kind, ConfigSource::File);
            }
            if let Some(delay) = file_config.building_delay_ms {
                building_delay_ms = ConfigValue::new(delay, ConfigSource::File);
            }
        }

        let mut config = Self {
            default_namespace,
            default_kind,
            building_delay_ms,
            config_file,
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply environment variable overrides, looked up through `lookup`
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(namespace) = lookup("TECHDOCS_DEFAULT_NAMESPACE") {
            self.default_namespace = ConfigValue::new(namespace, ConfigSource::Environment);
        }
        if let Some(kind) = lookup("TECHDOCS_DEFAULT_KIND") {
            self.default_kind = ConfigValue::new(kind, ConfigSource::Environment);
        }
        if let Some(delay) = lookup("TECHDOCS_BUILDING_DELAY_MS") {
            let parsed = delay.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "TECHDOCS_BUILDING_DELAY_MS",
                value: delay.clone(),
            })?;
            self.building_delay_ms = ConfigValue::new(parsed, ConfigSource::Environment);
        }
        Ok(())
    }

    /// Defaults used to complete partial entity refs.
    pub fn entity_defaults(&self) -> EntityRefDefaults {
        EntityRefDefaults {
            namespace: self.default_namespace.value.clone(),
            kind: Some(self.default_kind.value.clone()),
        }
    }

    pub fn building_delay(&self) -> Duration {
        Duration::from_millis(self.building_delay_ms.value)
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/techdocs/
    /// - macOS: ~/Library/Application Support/techdocs/
    /// - Windows: %APPDATA%/techdocs/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("techdocs")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidEnv { name: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidEnv { name, value } => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
