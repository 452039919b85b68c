//! Configuration file loading for Polyjudge
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use reqwest::Url;

use crate::config::{
    Config, ConfigError, ENV_PREFIX, EXAMPLE_CONFIG, NativeConfig, PYTHON_TIMEOUT_MS,
};
use crate::types::Language;

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file (or the embedded example) with
    /// environment overrides layered on top
    ///
    /// Overrides use the `POLYJUDGE` prefix and `__` as separator, e.g.
    /// `POLYJUDGE__JAVA__REQUEST_TIMEOUT_MS=20000`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = match path {
            Some(path) => ConfigBuilder::builder().add_source(File::from(path)),
            None => ConfigBuilder::builder()
                .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml)),
        };
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        for language in Language::ALL {
            if self.limits_for(language).timeout_ms == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "{language} timeout must be greater than zero"
                )));
            }
        }

        let python_timeout = self.limits_for(Language::Python).timeout_ms;
        if python_timeout.is_some_and(|ms| ms < PYTHON_TIMEOUT_MS) {
            return Err(ConfigError::Invalid(format!(
                "python timeout must be at least {PYTHON_TIMEOUT_MS} ms (interpreter startup is slow)"
            )));
        }
        if self.python.module.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "python has empty module path".to_string(),
            ));
        }

        validate_native("c", &self.c)?;
        validate_native("cpp", &self.cpp)?;

        if self.java.endpoints.is_empty() {
            return Err(ConfigError::Invalid(
                "java has no endpoints configured".to_string(),
            ));
        }
        for endpoint in &self.java.endpoints {
            validate_url("java endpoint", endpoint)?;
        }

        Ok(())
    }
}

fn validate_native(id: &str, native: &NativeConfig) -> Result<(), ConfigError> {
    if native.args.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "{id} has empty interpreter args"
        )));
    }
    if !native.args.iter().any(|arg| arg.contains("{source}")) {
        return Err(ConfigError::Invalid(format!(
            "{id} interpreter args must contain a {{source}} placeholder"
        )));
    }
    if native.source_name.is_empty() || native.source_name.contains('/') {
        return Err(ConfigError::Invalid(format!(
            "{id} source_name must be a plain file name"
        )));
    }
    if let Some(ref url) = native.compile_service {
        validate_url(&format!("{id} compile_service"), url)?;
    }
    Ok(())
}

fn validate_url(what: &str, url: &str) -> Result<(), ConfigError> {
    Url::parse(url)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid(format!("{what} '{url}' is not a valid URL: {e}")))
}
