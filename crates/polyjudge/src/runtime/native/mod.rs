//! C and C++
//!
//! Two execution paths share one adapter:
//!
//! - **compiled**: when a compile service is configured and healthy, the
//!   source is compiled remotely to WebAssembly and the module runs once
//!   per test case.
//! - **interpreted**: a WASI build of a C interpreter runs the source from
//!   a read-only `/src` directory, once per test case.
//!
//! The compiled path is an upgrade only. Any service failure other than a
//! rejected source falls back to the interpreter.

use std::borrow::Cow;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use wasmtime::Module;

use crate::compare;
use crate::config::{Config, NATIVE_TIMEOUT_MS, NativeConfig};
use crate::normalize;
use crate::runtime::{RuntimeAdapter, append_log, run_in_worker};
use crate::types::{
    ExecutionRequest, ExecutionResult, Language, MountConfig, ResourceLimits, TestCase,
    TestCaseResult, millis,
};
use crate::wasm::{Invocation, LazyModule, RunOutput, WasmError, WasmHost};
use crate::worker::{WorkerMessage, WorkerRequest};

pub use compile_service::{CompileClient, CompileServiceError};

pub mod compile_service;

/// Directory the staged source is mounted at inside the guest
pub const SOURCE_MOUNT: &str = "/src";

static MAIN_FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bint\s+main\s*\(").expect("main pattern is valid"));

const STDIO_INCLUDE: &str = "#include <stdio.h>";

const WRAPPER_MAIN: &str = "\n\nint main() {\n    printf(\"No main() function found. \
Add an `int main()` that reads the input from stdin and prints the answer.\\n\");\n    return 0;\n}\n";

/// Make a fragment runnable by giving it a `main` if it has none
pub fn prepare_source(code: &str) -> Cow<'_, str> {
    if MAIN_FUNCTION.is_match(code) {
        return Cow::Borrowed(code);
    }

    let mut source = String::with_capacity(code.len() + WRAPPER_MAIN.len() + STDIO_INCLUDE.len() + 1);
    if !code.contains(STDIO_INCLUDE) {
        source.push_str(STDIO_INCLUDE);
        source.push('\n');
    }
    source.push_str(code);
    source.push_str(WRAPPER_MAIN);
    Cow::Owned(source)
}

/// C or C++ adapter
pub struct NativeRuntime {
    language: Language,
    config: NativeConfig,
    limits: ResourceLimits,
    host: Arc<WasmHost>,
    interpreter: LazyModule,
    compiler: Option<CompileClient>,
}

impl NativeRuntime {
    pub fn new(
        language: Language,
        config: NativeConfig,
        limits: ResourceLimits,
        host: Arc<WasmHost>,
    ) -> Self {
        let compiler = config
            .compile_service
            .as_deref()
            .and_then(|url| match CompileClient::new(url) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!(error = %e, "compile service disabled");
                    None
                }
            });

        Self {
            language,
            interpreter: LazyModule::new(&config.interpreter),
            config,
            limits,
            host,
            compiler,
        }
    }

    /// Build the adapter for `language` (C or C++)
    pub fn from_config(config: &Config, language: Language, host: Arc<WasmHost>) -> Self {
        let native = config.native(language).cloned().unwrap_or_default();
        Self::new(language, native, config.limits_for(language), host)
    }

    fn timeout(&self) -> Duration {
        self.limits
            .timeout()
            .unwrap_or(Duration::from_millis(NATIVE_TIMEOUT_MS))
    }

    fn base_invocation(&self) -> Invocation {
        Invocation::default()
            .memory_limit(self.limits.memory_bytes())
            .output_limit(self.limits.output_bytes())
    }

    /// Compile remotely, load the result and check it can be instantiated
    async fn compile(&self, client: &CompileClient, code: &str) -> Result<Module, CompileServiceError> {
        client.health().await?;
        let bytes = client.compile(code, self.language).await?;

        let host = self.host.clone();
        tokio::task::spawn_blocking(move || {
            let module = host.compile(&bytes)?;
            host.check(&module)?;
            Ok::<_, WasmError>(module)
        })
        .await
        .map_err(|e| CompileServiceError::InvalidModule(e.to_string()))?
        .map_err(|e| CompileServiceError::InvalidModule(e.to_string()))
    }

    async fn run_compiled(&self, module: Module, request: &ExecutionRequest<'_>) -> ExecutionResult {
        let host = self.host.clone();
        let invocation = self.base_invocation().arg("main");
        run_in_worker("polyjudge-native", request, self.timeout(), move |request, cancel| {
            run_session(&host, &module, &invocation, &request, &cancel, Capture::Stdout)
        })
        .await
    }

    async fn run_interpreted(&self, request: &ExecutionRequest<'_>) -> ExecutionResult {
        let started = Instant::now();
        let module = match self.interpreter.get(&self.host).await {
            Ok(module) => module,
            Err(e) => {
                warn!(error = %e, "interpreter unavailable");
                return ExecutionResult::runtime_error(
                    format!("{} interpreter unavailable: {e}", self.language),
                    started.elapsed(),
                );
            }
        };

        let source = prepare_source(request.code);
        let staged = match stage_source(&self.config.source_name, &source) {
            Ok(staged) => staged,
            Err(e) => {
                return ExecutionResult::runtime_error(
                    format!("Failed to stage source: {e}"),
                    started.elapsed(),
                );
            }
        };

        let guest_path = format!("{SOURCE_MOUNT}/{}", self.config.source_name);
        let mut invocation = self
            .base_invocation()
            .args(self.config.expand_args(&guest_path))
            .mount(MountConfig {
                source: staged.path().to_string_lossy().into_owned(),
                target: SOURCE_MOUNT.to_string(),
                writable: false,
                optional: false,
            });
        for mount in &self.config.mounts {
            invocation = invocation.mount(mount.clone());
        }

        let host = self.host.clone();
        run_in_worker("polyjudge-native", request, self.timeout(), move |request, cancel| {
            let message =
                run_session(&host, &module, &invocation, &request, &cancel, Capture::Combined);
            drop(staged);
            message
        })
        .await
    }
}

#[async_trait]
impl RuntimeAdapter for NativeRuntime {
    fn language(&self) -> Language {
        self.language
    }

    #[instrument(skip_all, fields(language = %self.language, cases = request.test_cases.len()))]
    async fn execute(&self, request: ExecutionRequest<'_>) -> ExecutionResult {
        if let Some(client) = &self.compiler {
            let started = Instant::now();
            match self.compile(client, request.code).await {
                Ok(module) => {
                    debug!("running compiled module");
                    return self.run_compiled(module, &request).await;
                }
                Err(e) if e.is_user_error() => {
                    return ExecutionResult::compilation_error(e.to_string(), started.elapsed());
                }
                Err(e) => warn!(error = %e, "compile service unavailable, using interpreter"),
            }
        }

        self.run_interpreted(&request).await
    }
}

/// Write the source into a fresh directory
fn stage_source(name: &str, source: &str) -> std::io::Result<TempDir> {
    let dir = tempfile::Builder::new().prefix("polyjudge-src-").tempdir()?;
    std::fs::write(dir.path().join(Path::new(name)), source)?;
    Ok(dir)
}

/// Which streams make up a case's output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    /// stdout is the answer; stderr only goes to the log
    Stdout,
    /// stdout followed by stderr
    Combined,
}

/// Body of a native worker thread
///
/// Each case (or the single free-form run) gets a fresh instance with the
/// case's stream-form input on stdin.
fn run_session(
    host: &WasmHost,
    module: &Module,
    invocation: &Invocation,
    request: &WorkerRequest,
    cancel: &CancellationToken,
    capture: Capture,
) -> WorkerMessage {
    let mut logs = String::new();

    if request.test_cases.is_empty() {
        return match host.run(module, invocation, cancel) {
            Ok(output) => {
                append_log(&mut logs, &output.stdout);
                append_log(&mut logs, &output.stderr);
                match failure(&output) {
                    Some(error) => WorkerMessage::error(error, logs),
                    None => WorkerMessage::Success {
                        results: Vec::new(),
                        logs,
                    },
                }
            }
            Err(e) => WorkerMessage::error(run_error(e), logs),
        };
    }

    let mut results = Vec::with_capacity(request.test_cases.len());
    for case in &request.test_cases {
        let invocation = invocation.clone().stdin(normalize::to_stream(&case.input));

        let started = Instant::now();
        let output = match host.run(module, &invocation, cancel) {
            Ok(output) => output,
            Err(e) => return WorkerMessage::error(run_error(e), logs),
        };
        let elapsed = started.elapsed();

        append_log(&mut logs, &output.stdout);
        append_log(&mut logs, &output.stderr);

        let actual = match capture {
            Capture::Stdout => output.stdout.clone(),
            Capture::Combined => format!("{}{}", output.stdout, output.stderr),
        };
        results.push(program_result(case, &actual, failure(&output), elapsed));
    }

    WorkerMessage::Success { results, logs }
}

fn run_error(err: WasmError) -> String {
    match err {
        WasmError::Interrupted => "execution was interrupted".to_string(),
        other => format!("Runtime error: {other}"),
    }
}

/// Why a finished run counts as failed, if it does
fn failure(output: &RunOutput) -> Option<String> {
    if let Some(ref trap) = output.trap {
        return Some(format!("Runtime error: {trap}"));
    }
    if output.exit_code != 0 {
        return Some(format!("Program exited with code {}", output.exit_code));
    }
    None
}

fn program_result(
    case: &TestCase,
    output: &str,
    failure: Option<String>,
    elapsed: Duration,
) -> TestCaseResult {
    let actual = output.trim();
    TestCaseResult {
        passed: failure.is_none() && compare::equal(actual, case.output.trim()),
        input: case.input.clone(),
        expected_output: case.output.clone(),
        actual_output: actual.to_string(),
        execution_time: millis(elapsed),
        error: failure,
    }
}
