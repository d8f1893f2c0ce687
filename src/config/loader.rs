//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered in order,
//! later sources overriding earlier ones:
//!
//! 1. [`BatchConfig::default`]
//! 2. `<config_dir>/batch-executor.toml` (or an explicit file, which is then required)
//! 3. `<config_dir>/batch-executor.<environment>.toml`
//! 4. `BATCH_EXECUTOR__*` environment variables (e.g. `BATCH_EXECUTOR__MAX_BATCH_SIZE=25`)

use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::BatchConfig;

const BASE_FILE_STEM: &str = "batch-executor";
const ENV_PREFIX: &str = "BATCH_EXECUTOR";
const ENV_SEPARATOR: &str = "__";

/// Layered loader producing a validated [`BatchConfig`]
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_directory: PathBuf,
    explicit_file: Option<PathBuf>,
    environment: String,
    /// Replaces the process environment as the variable source when set
    environment_variables: Option<HashMap<String, String>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader rooted at `./config` with the environment auto-detected
    pub fn new() -> Self {
        Self {
            config_directory: PathBuf::from("config"),
            explicit_file: None,
            environment: Self::detect_environment(),
            environment_variables: None,
        }
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_directory = dir.into();
        self
    }

    /// Use an explicit base file instead of `<config_dir>/batch-executor.toml`
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Read overrides from this map instead of the process environment
    pub fn with_environment_variables(mut self, vars: HashMap<String, String>) -> Self {
        self.environment_variables = Some(vars);
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Detect the current environment
    ///
    /// `BATCH_EXECUTOR_ENV || APP_ENV || 'development'`
    pub fn detect_environment() -> String {
        env::var("BATCH_EXECUTOR_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    /// Load, merge, and validate the configuration
    pub fn load(&self) -> ConfigResult<BatchConfig> {
        let defaults = Config::try_from(&BatchConfig::default())
            .map_err(|e| ConfigurationError::load("defaults", e))?;

        let base_file = match &self.explicit_file {
            Some(path) => File::from(path.clone())
                .format(FileFormat::Toml)
                .required(true),
            None => File::from(self.config_directory.join(format!("{BASE_FILE_STEM}.toml")))
                .format(FileFormat::Toml)
                .required(false),
        };

        let environment_file = File::from(
            self.config_directory
                .join(format!("{BASE_FILE_STEM}.{}.toml", self.environment)),
        )
        .format(FileFormat::Toml)
        .required(false);

        let environment_source = Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(self.environment_variables.clone());

        debug!(
            environment = %self.environment,
            config_directory = %self.config_directory.display(),
            explicit_file = ?self.explicit_file,
            "Loading batch executor configuration"
        );

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(base_file)
            .add_source(environment_file)
            .add_source(environment_source)
            .build()
            .map_err(|e| ConfigurationError::load(self.describe_sources(), e))?;

        let config: BatchConfig = merged
            .try_deserialize()
            .map_err(|e| ConfigurationError::load(self.describe_sources(), e))?;

        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string(&config).unwrap_or_else(|_| "[serialization error]".to_string())
        );

        Ok(config)
    }

    fn describe_sources(&self) -> String {
        match &self.explicit_file {
            Some(path) => format!("{} (environment '{}')", path.display(), self.environment),
            None => format!(
                "{} (environment '{}')",
                self.config_directory.display(),
                self.environment
            ),
        }
    }
}
