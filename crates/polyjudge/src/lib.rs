//! A library for judging code submissions in several languages.
//!
//! Polyjudge runs a submission against a question's examples and grades the
//! output. Every run happens inside an isolated worker that can be cut off
//! at its time limit, so a runaway submission never takes the host down.
//!
//! # Features
//!
//! - **JavaScript**: Embedded QuickJS with entry-point detection.
//! - **Python**: CPython compiled to WASI, driven by an embedded harness.
//! - **C and C++**: Remote compilation to WebAssembly, or a WASI interpreter.
//! - **Java**: Forwarded to a remote execution service.
//! - **Forgiving comparison**: JSON-aware output matching.
//! - **TOML configuration**: Per-language limits, modules and endpoints.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG};
pub use dispatch::{Dispatcher, ExecutionEvent, TelemetrySink, TracingTelemetry};
pub use runtime::{
    CompileClient, CompileServiceError, JavaRuntime, JavaScriptRuntime, NativeRuntime,
    PythonRuntime, RuntimeAdapter,
};
pub use types::{
    Example, ExecutionRequest, ExecutionResult, ExecutionStatus, Language, MountConfig,
    ParseLanguageError, Question, ResourceLimits, TestCase, TestCaseResult,
};
pub use wasm::{WasmError, WasmHost};
pub use worker::{Worker, WorkerError, WorkerOutcome};

pub mod compare;
pub mod config;
pub mod dispatch;
pub mod normalize;
pub mod runtime;
pub mod types;
pub mod wasm;
pub mod worker;
