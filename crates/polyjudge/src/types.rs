use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall clock cap for one whole run, in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Linear memory cap for WASM-backed runtimes, in kilobytes
    #[serde(default)]
    pub memory_limit: Option<u64>,

    /// Maximum captured stdout/stderr per run, in kilobytes
    #[serde(default)]
    pub max_output: Option<u64>,
}

impl ResourceLimits {
    /// 1 kilobyte in kilobytes
    pub const KB: u64 = 1;
    /// 1 megabyte in kilobytes
    pub const MB: u64 = 1024;

    /// Create new resource limits with the default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits with every field unset, useful as an override layer
    pub fn unset() -> Self {
        Self {
            timeout_ms: None,
            memory_limit: None,
            max_output: None,
        }
    }

    /// Set the wall clock cap in milliseconds
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Set the memory limit in kilobytes
    pub fn with_memory_limit(mut self, kb: u64) -> Self {
        self.memory_limit = Some(kb);
        self
    }

    /// Set the maximum output size in kilobytes
    pub fn with_max_output(mut self, kb: u64) -> Self {
        self.max_output = Some(kb);
        self
    }

    /// Apply overrides from another ResourceLimits, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            timeout_ms: overrides.timeout_ms.or(self.timeout_ms),
            memory_limit: overrides.memory_limit.or(self.memory_limit),
            max_output: overrides.max_output.or(self.max_output),
        }
    }

    /// The wall clock cap as a [`Duration`]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Memory limit in bytes
    pub fn memory_bytes(&self) -> Option<usize> {
        self.memory_limit.map(|kb| (kb as usize).saturating_mul(1024))
    }

    /// Output cap in bytes
    pub fn output_bytes(&self) -> Option<usize> {
        self.max_output.map(|kb| (kb as usize).saturating_mul(1024))
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout_ms: Some(5_000),
            memory_limit: Some(262_144), // 256 MB
            max_output: Some(1_024),     // 1 MB
        }
    }
}

/// Languages the dispatcher knows how to route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    Python,
    Cpp,
    C,
    Java,
}

impl Language {
    /// Every language in routing order
    pub const ALL: [Language; 5] = [
        Language::JavaScript,
        Language::Python,
        Language::Cpp,
        Language::C,
        Language::Java,
    ];

    /// Canonical identifier used on the wire
    pub fn id(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Cpp => "cpp",
            Language::C => "c",
            Language::Java => "java",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unsupported language '{0}'")]
pub struct ParseLanguageError(pub String);

impl FromStr for Language {
    type Err = ParseLanguageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" => Ok(Language::JavaScript),
            "python" | "py" => Ok(Language::Python),
            "cpp" | "c++" => Ok(Language::Cpp),
            "c" => Ok(Language::C),
            "java" => Ok(Language::Java),
            _ => Err(ParseLanguageError(s.to_string())),
        }
    }
}

/// A single input/expected-output pair
///
/// Both sides are free text. How the input is interpreted is decided by
/// each runtime at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_hidden: bool,
}

impl TestCase {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            is_hidden: false,
        }
    }
}

/// Worked example attached to a question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Example {
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// The slice of a question the core cares about
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default)]
    pub examples: Vec<Example>,

    /// Name of the function the author expects to be called
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
}

impl Question {
    /// Test cases derived from the question's examples, in order
    pub fn test_cases(&self) -> Vec<TestCase> {
        self.examples
            .iter()
            .map(|example| TestCase::new(&example.input, &example.output))
            .collect()
    }
}

/// Final verdict of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Every test case passed, or the run was free-form
    Accepted,

    /// Ran to completion but at least one case mismatched
    #[serde(rename = "Wrong Answer")]
    WrongAnswer,

    /// The wall clock cap was hit and the run was terminated
    #[serde(rename = "Time Limit Exceeded")]
    TimeLimitExceeded,

    /// User code crashed or the runtime itself failed
    #[serde(rename = "Runtime Error")]
    RuntimeError,

    /// The source was rejected before it could run
    #[serde(rename = "Compilation Error")]
    CompilationError,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Accepted => "Accepted",
            ExecutionStatus::WrongAnswer => "Wrong Answer",
            ExecutionStatus::TimeLimitExceeded => "Time Limit Exceeded",
            ExecutionStatus::RuntimeError => "Runtime Error",
            ExecutionStatus::CompilationError => "Compilation Error",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResult {
    pub passed: bool,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub expected_output: String,
    #[serde(default)]
    pub actual_output: String,
    /// Milliseconds spent on this case
    #[serde(default)]
    pub execution_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one submission run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub status: ExecutionStatus,

    /// Everything the program printed, across all cases
    #[serde(default)]
    pub output: String,

    /// Milliseconds spent running
    #[serde(default)]
    pub execution_time: f64,

    /// `None` for free-form runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case_results: Option<Vec<TestCaseResult>>,
}

impl ExecutionResult {
    /// Grade a completed batch: `Accepted` only if every case passed
    pub fn graded(results: Vec<TestCaseResult>, output: String, elapsed: Duration) -> Self {
        let status = if results.iter().all(|r| r.passed) {
            ExecutionStatus::Accepted
        } else {
            ExecutionStatus::WrongAnswer
        };
        Self {
            status,
            output,
            execution_time: millis(elapsed),
            test_case_results: Some(results),
        }
    }

    /// A run with no test cases: captured output is the whole result
    pub fn free_form(output: String, elapsed: Duration) -> Self {
        Self {
            status: ExecutionStatus::Accepted,
            output,
            execution_time: millis(elapsed),
            test_case_results: None,
        }
    }

    pub fn runtime_error(message: impl Into<String>, elapsed: Duration) -> Self {
        Self::failure(ExecutionStatus::RuntimeError, message, elapsed)
    }

    pub fn compilation_error(message: impl Into<String>, elapsed: Duration) -> Self {
        Self::failure(ExecutionStatus::CompilationError, message, elapsed)
    }

    /// The run was cut off at `cap`; the reported time is the cap itself
    pub fn time_limit_exceeded(cap: Duration) -> Self {
        Self::failure(
            ExecutionStatus::TimeLimitExceeded,
            format!(
                "Time limit exceeded: execution took longer than {:.1} seconds and was stopped",
                cap.as_secs_f64()
            ),
            cap,
        )
    }

    fn failure(status: ExecutionStatus, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            status,
            output: message.into(),
            execution_time: millis(elapsed),
            test_case_results: None,
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.status == ExecutionStatus::Accepted
    }
}

/// Borrowed request handed to a runtime adapter
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    /// User source code
    pub code: &'a str,
    /// Cases to run, in order; empty means free-form
    pub test_cases: &'a [TestCase],
    /// Name of the callable to prefer, for runtimes that resolve one
    pub entry_hint: Option<&'a str>,
}

impl<'a> ExecutionRequest<'a> {
    pub fn new(code: &'a str, test_cases: &'a [TestCase]) -> Self {
        Self {
            code,
            test_cases,
            entry_hint: None,
        }
    }

    pub fn with_entry_hint(mut self, hint: Option<&'a str>) -> Self {
        self.entry_hint = hint;
        self
    }

    pub fn is_free_form(&self) -> bool {
        self.test_cases.is_empty()
    }
}

/// Configuration for a directory made visible to a WASI guest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Source path on the host
    pub source: String,

    /// Path the guest sees
    pub target: String,

    /// Whether the mount is read-write (default: read-only)
    #[serde(default)]
    pub writable: bool,

    /// Whether this mount is optional (skipped if the source doesn't exist)
    #[serde(default)]
    pub optional: bool,
}

/// Duration in fractional milliseconds
pub fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
