//! Runtime adapters
//!
//! Every language is served by one [`RuntimeAdapter`]. Adapters never fail:
//! whatever goes wrong is folded into an [`ExecutionResult`] with a status
//! from the fixed taxonomy and a message that keeps the original error text.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::compare;
use crate::types::{ExecutionRequest, ExecutionResult, Language, TestCase, TestCaseResult};
use crate::worker::{Worker, WorkerMessage, WorkerRequest};

pub use java::JavaRuntime;
pub use javascript::JavaScriptRuntime;
pub use native::{CompileClient, CompileServiceError, NativeRuntime};
pub use python::PythonRuntime;

pub mod java;
pub mod javascript;
pub mod native;
pub mod python;

/// One execution backend behind the uniform contract
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// The language this adapter serves
    fn language(&self) -> Language;

    /// Run `request.code` against every test case, or free-form if there
    /// are none
    async fn execute(&self, request: ExecutionRequest<'_>) -> ExecutionResult;
}

impl From<&ExecutionRequest<'_>> for WorkerRequest {
    fn from(request: &ExecutionRequest<'_>) -> Self {
        WorkerRequest {
            code: request.code.to_string(),
            test_cases: request.test_cases.to_vec(),
            entry_hint: request.entry_hint.map(str::to_string),
        }
    }
}

/// Run `job` on a fresh worker thread capped at `cap`
///
/// Spawn failures and engine crashes become `Runtime Error`; hitting the
/// cap becomes `Time Limit Exceeded` with the cap as the reported time.
pub(crate) async fn run_in_worker<F>(
    name: &str,
    request: &ExecutionRequest<'_>,
    cap: Duration,
    job: F,
) -> ExecutionResult
where
    F: FnOnce(WorkerRequest, CancellationToken) -> WorkerMessage + Send + 'static,
{
    let started = Instant::now();
    let worker = match Worker::spawn(name, WorkerRequest::from(request), job) {
        Ok(worker) => worker,
        Err(e) => {
            return ExecutionResult::runtime_error(format!("Worker error: {e}"), started.elapsed());
        }
    };

    worker
        .run(cap)
        .await
        .into_execution_result(request.is_free_form(), started.elapsed(), cap)
}

/// Grade one case from the program's output
pub(crate) fn grade(
    case: &TestCase,
    actual: Result<String, String>,
    elapsed: Duration,
) -> TestCaseResult {
    let (passed, actual_output, error) = match actual {
        Ok(output) => (compare::equal(&output, &case.output), output, None),
        Err(error) => (false, String::new(), Some(error)),
    };
    TestCaseResult {
        passed,
        input: case.input.clone(),
        expected_output: case.output.clone(),
        actual_output,
        execution_time: crate::types::millis(elapsed),
        error,
    }
}

/// Append a non-empty chunk to a cumulative log
pub(crate) fn append_log(log: &mut String, chunk: &str) {
    if chunk.is_empty() {
        return;
    }
    if !log.is_empty() && !log.ends_with('\n') {
        log.push('\n');
    }
    log.push_str(chunk);
}
