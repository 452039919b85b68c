use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::runtime::{
    JAVA_REQUEST_TIMEOUT_MS, JAVASCRIPT_TIMEOUT_MS, JavaConfig, JavaScriptConfig,
    NATIVE_TIMEOUT_MS, NativeConfig, PYTHON_TIMEOUT_MS, PythonConfig,
};
use crate::types::{Language, ResourceLimits};

mod loader;
pub mod runtime;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../polyjudge.example.toml");

/// Prefix for environment overrides (`POLYJUDGE__SECTION__KEY`)
pub const ENV_PREFIX: &str = "POLYJUDGE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Polyjudge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Memory and output caps applied to every runtime.
    /// Wall clock caps come from each language section.
    #[serde(default)]
    pub default_limits: ResourceLimits,

    #[serde(default)]
    pub javascript: JavaScriptConfig,

    #[serde(default)]
    pub python: PythonConfig,

    #[serde(default)]
    pub c: NativeConfig,

    #[serde(default = "default_cpp")]
    pub cpp: NativeConfig,

    #[serde(default)]
    pub java: JavaConfig,
}

impl Config {
    /// Create a new config from the embedded example
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config from built-in defaults only
    pub fn empty() -> Self {
        Self {
            default_limits: ResourceLimits::default(),
            javascript: JavaScriptConfig::default(),
            python: PythonConfig::default(),
            c: NativeConfig::default(),
            cpp: default_cpp(),
            java: JavaConfig::default(),
        }
    }

    /// Settings for the C or C++ runtime
    pub fn native(&self, language: Language) -> Option<&NativeConfig> {
        match language {
            Language::C => Some(&self.c),
            Language::Cpp => Some(&self.cpp),
            _ => None,
        }
    }

    /// Effective limits for a language
    ///
    /// Layers, lowest first: `default_limits`, the language's built-in wall
    /// clock cap, the language section's own `limits`.
    pub fn limits_for(&self, language: Language) -> ResourceLimits {
        let (timeout_ms, configured) = match language {
            Language::JavaScript => (JAVASCRIPT_TIMEOUT_MS, self.javascript.limits.as_ref()),
            Language::Python => (PYTHON_TIMEOUT_MS, self.python.limits.as_ref()),
            Language::C => (NATIVE_TIMEOUT_MS, self.c.limits.as_ref()),
            Language::Cpp => (NATIVE_TIMEOUT_MS, self.cpp.limits.as_ref()),
            Language::Java => (self.java.request_timeout_ms, None),
        };

        let limits = self
            .default_limits
            .with_overrides(&ResourceLimits::unset().with_timeout_ms(timeout_ms));
        match configured {
            Some(overrides) => limits.with_overrides(overrides),
            None => limits,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_cpp() -> NativeConfig {
    NativeConfig {
        source_name: "main.cpp".to_string(),
        ..NativeConfig::default()
    }
}
