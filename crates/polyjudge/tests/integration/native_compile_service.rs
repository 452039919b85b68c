use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use polyjudge::config::NativeConfig;
use polyjudge::{
    Config, Dispatcher, ExecutionStatus, Language, NativeRuntime, ResourceLimits, WasmHost,
};
use serde_json::{Value, json};
use tempfile::TempDir;

use super::{FIRST_LINE, PRINT_PAIR, closed_port, question, serve, write_module};

#[derive(Clone, Default)]
struct Counters {
    compiles: Arc<AtomicUsize>,
}

async fn healthy() -> StatusCode {
    StatusCode::OK
}

async fn unhealthy() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn compile_ok(State(counters): State<Counters>, Json(body): Json<Value>) -> impl IntoResponse {
    counters.compiles.fetch_add(1, Ordering::SeqCst);
    assert_eq!(body["language"], "cpp");
    ([(header::CONTENT_TYPE, "application/wasm")], PRINT_PAIR)
}

async fn compile_rejected(Json(_body): Json<Value>) -> impl IntoResponse {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": "main.cpp:1:1: error: unknown type name 'itn'" })),
    )
}

async fn compile_crashed(Json(_body): Json<Value>) -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn compile_throttled(Json(_body): Json<Value>) -> (StatusCode, &'static str) {
    (StatusCode::TOO_MANY_REQUESTS, "slow down")
}

async fn compile_unlinkable(Json(_body): Json<Value>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/wasm")],
        r#"(module (import "env" "emscripten_notify" (func $n)) (func (export "_start") (call $n)))"#,
    )
}

async fn missing_toolchain() -> Json<Value> {
    Json(json!({ "status": "degraded", "hasDependencies": false, "port": 4000 }))
}

async fn ready() -> Json<Value> {
    Json(json!({ "status": "ok", "hasDependencies": true, "port": 4000 }))
}

/// A C++ runtime whose interpreter echoes the first stdin line
fn runtime(service: String) -> (Dispatcher, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = NativeConfig {
        interpreter: write_module(dir.path(), "first_line.wat", FIRST_LINE),
        source_name: "main.cpp".to_string(),
        compile_service: Some(service),
        ..NativeConfig::default()
    };
    let host = Arc::new(WasmHost::new().expect("Failed to create wasm host"));
    let runtime = NativeRuntime::new(
        Language::Cpp,
        config,
        ResourceLimits::default().with_timeout_ms(5_000),
        host,
    );
    (Dispatcher::new().with_adapter(Arc::new(runtime)), dir)
}

#[tokio::test]
async fn test_compiled_module_runs_per_case() {
    let counters = Counters::default();
    let addr = serve(
        Router::new()
            .route("/health", get(healthy))
            .route("/compile", post(compile_ok))
            .with_state(counters.clone()),
    )
    .await;
    let (dispatcher, _dir) = runtime(format!("http://{addr}"));

    let q = question(
        &[
            ("nums = [2,7,11,15], target = 9", "[0,1]"),
            ("nums = [3,3], target = 6", "[0, 1]"),
        ],
        None,
    );
    let result = dispatcher.execute_code("cpp", "int main() {}", &q).await;

    assert_eq!(result.status, ExecutionStatus::Accepted);
    assert_eq!(counters.compiles.load(Ordering::SeqCst), 1);
    let cases = result.test_case_results.expect("graded run has case results");
    assert_eq!(cases.len(), 2);
    assert!(cases.iter().all(|case| case.actual_output == "[0,1]"));
}

#[tokio::test]
async fn test_rejected_source_is_a_compilation_error() {
    let addr = serve(
        Router::new()
            .route("/health", get(healthy))
            .route("/compile", post(compile_rejected)),
    )
    .await;
    let (dispatcher, _dir) = runtime(format!("http://{addr}"));

    let result = dispatcher
        .execute_code("cpp", "itn main() {}", &question(&[("1", "1")], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::CompilationError);
    assert!(result.output.contains("unknown type name 'itn'"));
}

#[tokio::test]
async fn test_service_failure_falls_back_to_interpreter() {
    let addr = serve(
        Router::new()
            .route("/health", get(healthy))
            .route("/compile", post(compile_crashed)),
    )
    .await;
    let (dispatcher, _dir) = runtime(format!("http://{addr}"));

    // The interpreter echoes the first stream line: the list's length
    let result = dispatcher
        .execute_code("cpp", "int main() {}", &question(&[("nums = [1,2,3]", "3")], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::Accepted);
}

#[tokio::test]
async fn test_missing_compile_route_falls_back_to_interpreter() {
    let addr = serve(Router::new().route("/health", get(healthy))).await;
    let (dispatcher, _dir) = runtime(format!("http://{addr}"));

    let result = dispatcher
        .execute_code("cpp", "int main() {}", &question(&[("7", "7")], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::Accepted);
}

#[tokio::test]
async fn test_client_error_without_error_body_falls_back_to_interpreter() {
    let addr = serve(
        Router::new()
            .route("/health", get(healthy))
            .route("/compile", post(compile_throttled)),
    )
    .await;
    let (dispatcher, _dir) = runtime(format!("http://{addr}"));

    let result = dispatcher
        .execute_code("cpp", "int main() {}", &question(&[("7", "7")], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::Accepted);
}

#[tokio::test]
async fn test_unlinkable_module_falls_back_to_interpreter() {
    let addr = serve(
        Router::new()
            .route("/health", get(ready))
            .route("/compile", post(compile_unlinkable)),
    )
    .await;
    let (dispatcher, _dir) = runtime(format!("http://{addr}"));

    let result = dispatcher
        .execute_code("cpp", "int main() {}", &question(&[("7", "7")], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::Accepted);
}

#[tokio::test]
async fn test_missing_toolchain_skips_compilation() {
    let counters = Counters::default();
    let addr = serve(
        Router::new()
            .route("/health", get(missing_toolchain))
            .route("/compile", post(compile_ok))
            .with_state(counters.clone()),
    )
    .await;
    let (dispatcher, _dir) = runtime(format!("http://{addr}"));

    let result = dispatcher
        .execute_code("cpp", "int main() {}", &question(&[("7", "7")], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::Accepted);
    assert_eq!(counters.compiles.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unhealthy_service_falls_back_to_interpreter() {
    let addr = serve(
        Router::new()
            .route("/health", get(unhealthy))
            .route("/compile", post(compile_crashed)),
    )
    .await;
    let (dispatcher, _dir) = runtime(format!("http://{addr}"));

    let result = dispatcher
        .execute_code("cpp", "int main() {}", &question(&[("7", "7")], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::Accepted);
}

#[tokio::test]
async fn test_unreachable_service_falls_back_to_interpreter() {
    let (dispatcher, _dir) = runtime(format!("http://127.0.0.1:{}", closed_port()));

    let result = dispatcher
        .execute_code("cpp", "int main() {}", &question(&[("5", "4")], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::WrongAnswer);
    let cases = result.test_case_results.expect("graded run has case results");
    assert_eq!(cases[0].actual_output, "5");
}

#[tokio::test]
async fn test_c_uses_its_own_section() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = Config::empty();
    config.c.interpreter = write_module(dir.path(), "first_line.wat", FIRST_LINE);

    let dispatcher = Dispatcher::from_config(&config).expect("Failed to build dispatcher");
    let result = dispatcher
        .execute_code("c", "int main(void) { return 0; }", &question(&[("[]", "0")], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::Accepted);
}
