//! Language routing
//!
//! The [`Dispatcher`] is the single entry point the surrounding application
//! calls. It validates the request, picks the adapter for the language and
//! reports one telemetry event per invocation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::runtime::{
    JavaRuntime, JavaScriptRuntime, NativeRuntime, PythonRuntime, RuntimeAdapter,
};
use crate::types::{ExecutionRequest, ExecutionResult, ExecutionStatus, Language, Question};
use crate::wasm::{WasmError, WasmHost};

/// One finished invocation, as reported to telemetry
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionEvent {
    /// The language as requested, even if unsupported
    pub language: String,
    pub duration: Duration,
    pub status: ExecutionStatus,
    pub code_length: usize,
    pub test_case_count: usize,
}

/// Receiver of execution events
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &ExecutionEvent);
}

/// Logs every event as a structured `info` record
#[derive(Debug, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, event: &ExecutionEvent) {
        info!(
            language = %event.language,
            duration_ms = event.duration.as_millis() as u64,
            status = %event.status,
            code_length = event.code_length,
            test_case_count = event.test_case_count,
            "code execution"
        );
    }
}

/// Routes execution requests to the adapter for their language
pub struct Dispatcher {
    adapters: HashMap<Language, Arc<dyn RuntimeAdapter>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Dispatcher {
    /// A dispatcher with no adapters
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            telemetry: Arc::new(TracingTelemetry),
        }
    }

    /// A dispatcher with every built-in adapter, configured from `config`
    pub fn from_config(config: &Config) -> Result<Self, WasmError> {
        let host = Arc::new(WasmHost::new()?);
        Ok(Self::new()
            .with_adapter(Arc::new(JavaScriptRuntime::from_config(config)))
            .with_adapter(Arc::new(PythonRuntime::from_config(config, host.clone())))
            .with_adapter(Arc::new(NativeRuntime::from_config(
                config,
                Language::Cpp,
                host.clone(),
            )))
            .with_adapter(Arc::new(NativeRuntime::from_config(config, Language::C, host)))
            .with_adapter(Arc::new(JavaRuntime::from_config(config))))
    }

    /// Register `adapter` for its language, replacing any previous one
    pub fn with_adapter(mut self, adapter: Arc<dyn RuntimeAdapter>) -> Self {
        self.adapters.insert(adapter.language(), adapter);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Languages with a registered adapter, in routing order
    pub fn supported_languages(&self) -> Vec<Language> {
        Language::ALL
            .into_iter()
            .filter(|language| self.adapters.contains_key(language))
            .collect()
    }

    /// Run `code` in `language` against the question's examples
    ///
    /// Never fails: every problem is reported through the result's status.
    #[instrument(skip(self, code, question), fields(code_length = code.len()))]
    pub async fn execute_code(
        &self,
        language: &str,
        code: &str,
        question: &Question,
    ) -> ExecutionResult {
        let started = Instant::now();
        let test_cases = question.test_cases();

        let result = self.route(language, code, question, &test_cases).await;

        self.telemetry.record(&ExecutionEvent {
            language: language.to_string(),
            duration: started.elapsed(),
            status: result.status,
            code_length: code.len(),
            test_case_count: test_cases.len(),
        });
        result
    }

    async fn route(
        &self,
        language: &str,
        code: &str,
        question: &Question,
        test_cases: &[crate::types::TestCase],
    ) -> ExecutionResult {
        if code.trim().is_empty() {
            return ExecutionResult::runtime_error("No code provided", Duration::ZERO);
        }

        let adapter = language
            .parse::<Language>()
            .ok()
            .and_then(|language| self.adapters.get(&language));
        let Some(adapter) = adapter else {
            return ExecutionResult::runtime_error(
                format!(
                    "Unsupported language: {language}. Supported languages: {}",
                    self.supported_list()
                ),
                Duration::ZERO,
            );
        };

        debug!(language = %adapter.language(), cases = test_cases.len(), "dispatching");
        let request = ExecutionRequest::new(code, test_cases)
            .with_entry_hint(question.function_name.as_deref());
        adapter.execute(request).await
    }

    fn supported_list(&self) -> String {
        self.supported_languages()
            .iter()
            .map(Language::id)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
