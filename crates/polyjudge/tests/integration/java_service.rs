use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use polyjudge::config::JavaConfig;
use polyjudge::{Dispatcher, ExecutionStatus, JavaRuntime};
use serde_json::{Value, json};

use super::{closed_port, question, serve};

const PATH: &str = "/api/execute/java";

type Received = Arc<Mutex<Vec<Value>>>;

async fn accept(State(received): State<Received>, Json(body): Json<Value>) -> Json<Value> {
    received.lock().unwrap().push(body);
    Json(json!({
        "status": "Accepted",
        "output": "",
        "executionTime": 12.5,
        "testCaseResults": [{
            "passed": true,
            "input": "n = 1",
            "expectedOutput": "1",
            "actualOutput": "1",
            "executionTime": 1.0
        }]
    }))
}

async fn reject(Json(_body): Json<Value>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Main.java:3: error: ';' expected" })),
    )
}

async fn broken(Json(_body): Json<Value>) -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

fn dispatcher(endpoints: Vec<String>) -> Dispatcher {
    let config = JavaConfig {
        endpoints,
        request_timeout_ms: 5_000,
    };
    Dispatcher::new().with_adapter(Arc::new(JavaRuntime::new(&config)))
}

#[tokio::test]
async fn test_service_result_is_passed_through() {
    let received = Received::default();
    let addr = serve(
        Router::new()
            .route(PATH, post(accept))
            .with_state(received.clone()),
    )
    .await;

    let result = dispatcher(vec![format!("http://{addr}{PATH}")])
        .execute_code("java", "class Solution {}", &question(&[("n = 1", "1")], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::Accepted);
    assert_eq!(result.execution_time, 12.5);
    assert_eq!(result.test_case_results.map(|cases| cases.len()), Some(1));

    let bodies = received.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["code"], "class Solution {}");
    assert_eq!(bodies[0]["testCases"][0]["input"], "n = 1");
    assert_eq!(bodies[0]["testCases"][0]["output"], "1");
}

#[tokio::test]
async fn test_bad_request_is_a_compilation_error() {
    let addr = serve(Router::new().route(PATH, post(reject))).await;

    let result = dispatcher(vec![format!("http://{addr}{PATH}")])
        .execute_code("java", "class Solution {", &question(&[], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::CompilationError);
    assert_eq!(result.output, "Main.java:3: error: ';' expected");
}

#[tokio::test]
async fn test_failed_endpoint_falls_through_to_the_next() {
    let received = Received::default();
    let broken_addr = serve(Router::new().route(PATH, post(broken))).await;
    let good_addr = serve(
        Router::new()
            .route(PATH, post(accept))
            .with_state(received.clone()),
    )
    .await;

    let result = dispatcher(vec![
        format!("http://127.0.0.1:{}{PATH}", closed_port()),
        format!("http://{broken_addr}{PATH}"),
        format!("http://{good_addr}{PATH}"),
    ])
    .execute_code("java", "class Solution {}", &question(&[("n = 1", "1")], None))
    .await;

    assert_eq!(result.status, ExecutionStatus::Accepted);
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_no_reachable_endpoint_explains_how_to_start_the_service() {
    let result = dispatcher(vec![format!("http://127.0.0.1:{}{PATH}", closed_port())])
        .execute_code("java", "class Solution {}", &question(&[], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    assert!(result.output.contains("Java execution service is not available"));
}
