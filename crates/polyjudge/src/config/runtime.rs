use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{MountConfig, ResourceLimits};

/// Default wall clock cap for JavaScript runs, in milliseconds
pub const JAVASCRIPT_TIMEOUT_MS: u64 = 5_000;

/// Default wall clock cap for Python runs; also the lowest accepted value
pub const PYTHON_TIMEOUT_MS: u64 = 15_000;

/// Default wall clock cap for C and C++ runs, in milliseconds
pub const NATIVE_TIMEOUT_MS: u64 = 10_000;

/// Default per-request timeout for the Java service, in milliseconds
pub const JAVA_REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Embedded QuickJS settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JavaScriptConfig {
    /// Resource limits for JavaScript runs (overrides defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

/// Python-on-WASI settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonConfig {
    /// Path to a WASI build of the Python interpreter
    #[serde(default = "default_python_module")]
    pub module: PathBuf,

    /// Directories preopened for the interpreter (usually the stdlib)
    #[serde(default)]
    pub mounts: Vec<MountConfig>,

    /// Environment variables visible to the interpreter
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Resource limits for Python runs (overrides defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            module: default_python_module(),
            mounts: Vec::new(),
            env: HashMap::new(),
            limits: None,
        }
    }
}

/// Settings shared by the C and C++ runtimes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeConfig {
    /// Path to a WASI build of the C interpreter
    #[serde(default = "default_interpreter_module")]
    pub interpreter: PathBuf,

    /// Interpreter argv with placeholders
    /// Placeholders: {source}
    #[serde(default = "default_interpreter_args")]
    pub args: Vec<String>,

    /// Source file name inside the guest's `/src` directory
    #[serde(default = "default_source_name")]
    pub source_name: String,

    /// Additional directories preopened for the interpreter
    #[serde(default)]
    pub mounts: Vec<MountConfig>,

    /// Base URL of the compile service; unset disables the compiled path
    #[serde(default)]
    pub compile_service: Option<String>,

    /// Resource limits for native runs (overrides defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

impl NativeConfig {
    /// Expand placeholders in the interpreter argv
    pub fn expand_args(&self, source: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace("{source}", source))
            .collect()
    }
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter_module(),
            args: default_interpreter_args(),
            source_name: default_source_name(),
            mounts: Vec::new(),
            compile_service: None,
            limits: None,
        }
    }
}

/// Remote Java service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JavaConfig {
    /// Candidate endpoints, tried in order
    #[serde(default = "default_java_endpoints")]
    pub endpoints: Vec<String>,

    /// Timeout for each request, in milliseconds
    #[serde(default = "default_java_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for JavaConfig {
    fn default() -> Self {
        Self {
            endpoints: default_java_endpoints(),
            request_timeout_ms: JAVA_REQUEST_TIMEOUT_MS,
        }
    }
}

fn default_python_module() -> PathBuf {
    PathBuf::from("runtimes/python.wasm")
}

fn default_interpreter_module() -> PathBuf {
    PathBuf::from("runtimes/picoc.wasm")
}

fn default_interpreter_args() -> Vec<String> {
    vec!["picoc".to_string(), "{source}".to_string()]
}

fn default_source_name() -> String {
    "main.c".to_string()
}

fn default_java_endpoints() -> Vec<String> {
    vec![
        "http://localhost:3000/api/execute/java".to_string(),
        "http://localhost:8080/api/execute/java".to_string(),
    ]
}

fn default_java_request_timeout() -> u64 {
    JAVA_REQUEST_TIMEOUT_MS
}
