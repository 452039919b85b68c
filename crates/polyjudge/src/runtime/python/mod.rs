//! Python on a WASI build of CPython
//!
//! The interpreter module is compiled once per adapter, on first use. Every
//! run instantiates it afresh and executes an embedded driver that loads the
//! user's module, calls `Solution` for each case and prints a single
//! marker-prefixed JSON report on stdout. Grading happens on this side.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use wasmtime::Module;

use crate::config::{Config, PYTHON_TIMEOUT_MS, PythonConfig};
use crate::normalize;
use crate::runtime::{RuntimeAdapter, grade, run_in_worker};
use crate::types::{ExecutionRequest, ExecutionResult, Language, ResourceLimits, TestCase};
use crate::wasm::{Invocation, LazyModule, WasmError, WasmHost};
use crate::worker::{WorkerMessage, WorkerRequest};

/// Driver program passed to the interpreter with `-c`
pub const DRIVER: &str = include_str!("driver.py");

/// Prefix of the stdout line carrying the driver's report
pub const REPORT_MARKER: &str = "__POLYJUDGE_REPORT__";

/// What the driver reads on stdin
#[derive(Debug, Serialize)]
struct DriverInput<'a> {
    code: &'a str,
    cases: Vec<DriverCase>,
}

#[derive(Debug, Serialize)]
struct DriverCase {
    args: Vec<Value>,
}

/// What the driver prints after the marker
#[derive(Debug, Deserialize)]
pub struct DriverReport {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub cases: Vec<CaseReport>,
    #[serde(default)]
    pub logs: String,
}

#[derive(Debug, Deserialize)]
pub struct CaseReport {
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Milliseconds
    #[serde(default)]
    pub time: f64,
}

impl DriverReport {
    /// Find and parse the report line in the interpreter's stdout
    pub fn from_stdout(stdout: &str) -> Option<Self> {
        stdout
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix(REPORT_MARKER))
            .and_then(|json| serde_json::from_str(json).ok())
    }

    /// Grade the report against the cases that were sent
    pub fn into_message(self, cases: &[TestCase]) -> WorkerMessage {
        if !self.ok {
            let error = self
                .error
                .unwrap_or_else(|| "Python driver reported an unknown failure".to_string());
            return WorkerMessage::error(error, self.logs);
        }

        let mut reports = self.cases.into_iter();
        let results = cases
            .iter()
            .map(|case| match reports.next() {
                Some(report) => {
                    let elapsed = Duration::from_secs_f64(report.time.max(0.0) / 1000.0);
                    let actual = match (report.output, report.error) {
                        (_, Some(error)) => Err(error),
                        (Some(output), None) => Ok(output),
                        (None, None) => Ok("null".to_string()),
                    };
                    grade(case, actual, elapsed)
                }
                None => grade(case, Err("no result reported".to_string()), Duration::ZERO),
            })
            .collect();

        WorkerMessage::Success {
            results,
            logs: self.logs,
        }
    }
}

/// Python adapter
pub struct PythonRuntime {
    config: PythonConfig,
    limits: ResourceLimits,
    host: Arc<WasmHost>,
    module: LazyModule,
}

impl PythonRuntime {
    pub fn new(config: PythonConfig, limits: ResourceLimits, host: Arc<WasmHost>) -> Self {
        Self {
            module: LazyModule::new(&config.module),
            config,
            limits,
            host,
        }
    }

    pub fn from_config(config: &Config, host: Arc<WasmHost>) -> Self {
        Self::new(
            config.python.clone(),
            config.limits_for(Language::Python),
            host,
        )
    }

    fn timeout(&self) -> Duration {
        self.limits
            .timeout()
            .unwrap_or(Duration::from_millis(PYTHON_TIMEOUT_MS))
    }

    fn invocation(&self, request: &ExecutionRequest<'_>) -> Result<Invocation, String> {
        let input = DriverInput {
            code: request.code,
            cases: request
                .test_cases
                .iter()
                .map(|case| DriverCase {
                    args: normalize::to_arguments(&case.input),
                })
                .collect(),
        };
        let stdin = serde_json::to_vec(&input).map_err(|e| e.to_string())?;

        let mut invocation = Invocation::new("python")
            .arg("-c")
            .arg(DRIVER)
            .stdin(stdin)
            .memory_limit(self.limits.memory_bytes())
            .output_limit(self.limits.output_bytes());
        for (key, value) in &self.config.env {
            invocation = invocation.env(key, value);
        }
        for mount in &self.config.mounts {
            invocation = invocation.mount(mount.clone());
        }
        Ok(invocation)
    }
}

#[async_trait]
impl RuntimeAdapter for PythonRuntime {
    fn language(&self) -> Language {
        Language::Python
    }

    #[instrument(skip_all, fields(cases = request.test_cases.len()))]
    async fn execute(&self, request: ExecutionRequest<'_>) -> ExecutionResult {
        let started = std::time::Instant::now();
        let module = match self.module.get(&self.host).await {
            Ok(module) => module,
            Err(error) => {
                warn!(%error, "python interpreter unavailable");
                return ExecutionResult::runtime_error(
                    format!("Python runtime unavailable: {error}"),
                    started.elapsed(),
                );
            }
        };
        let invocation = match self.invocation(&request) {
            Ok(invocation) => invocation,
            Err(error) => return ExecutionResult::runtime_error(error, started.elapsed()),
        };

        let host = self.host.clone();
        run_in_worker("polyjudge-python", &request, self.timeout(), move |request, cancel| {
            run_session(&host, &module, &invocation, &request, &cancel)
        })
        .await
    }
}

/// Body of a Python worker thread
fn run_session(
    host: &WasmHost,
    module: &Module,
    invocation: &Invocation,
    request: &WorkerRequest,
    cancel: &CancellationToken,
) -> WorkerMessage {
    let output = match host.run(module, invocation, cancel) {
        Ok(output) => output,
        Err(WasmError::Interrupted) => return WorkerMessage::error("execution was interrupted", ""),
        Err(e) => return WorkerMessage::error(format!("Python runtime error: {e}"), ""),
    };
    debug!(exit_code = output.exit_code, "python interpreter finished");

    match DriverReport::from_stdout(&output.stdout) {
        Some(report) => report.into_message(&request.test_cases),
        None => {
            let detail = output.trap.unwrap_or_else(|| format!("exit code {}", output.exit_code));
            WorkerMessage::error(
                format!("Python interpreter exited without a report ({detail})"),
                [output.stdout, output.stderr]
                    .into_iter()
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        }
    }
}
