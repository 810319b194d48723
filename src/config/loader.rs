//! Configuration Loader
//!
//! Layers defaults, an optional TOML file and prefixed environment variables
//! with the `config` crate, then validates the result.

use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::CoordinatorConfig;

/// Environment prefix read by [`ConfigLoader::new`].
pub const ENV_PREFIX: &str = "SESSION_COORDINATOR";

/// Builder for a [`CoordinatorConfig`].
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// TOML file layered over the defaults. A missing file is an error.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load, merge and validate.
    pub fn load(&self) -> ConfigResult<CoordinatorConfig> {
        let mut builder = Config::builder();

        if let Some(path) = &self.file {
            if !path.is_file() {
                return Err(ConfigurationError::config_file_not_found(path));
            }
            debug!("Loading configuration file: {}", path.display());
            builder = builder.add_source(
                File::new(&path.to_string_lossy(), FileFormat::Toml).required(true),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let source_name = self
            .file
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "environment".to_string());

        let config: CoordinatorConfig = builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| ConfigurationError::invalid_source(&source_name, e))?;

        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            config.to_json_pretty()
        );

        Ok(config)
    }
}
