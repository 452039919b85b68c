//! Java through a remote execution service
//!
//! The service takes `{ code, testCases }` and answers with a complete
//! execution result. Candidate endpoints are tried in order; the first one
//! that answers wins.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::{Config, JavaConfig};
use crate::runtime::RuntimeAdapter;
use crate::types::{ExecutionRequest, ExecutionResult, Language, TestCase};

const UNAVAILABLE: &str = "Java execution service is not available. Start it locally \
(it listens on port 3000 or 8080 at /api/execute/java) and try again.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JavaRequest<'a> {
    code: &'a str,
    test_cases: &'a [TestCase],
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// How one candidate endpoint answered
enum Attempt {
    Done(ExecutionResult),
    Failed(String),
}

/// Java adapter
pub struct JavaRuntime {
    endpoints: Vec<String>,
    client: Client,
}

impl JavaRuntime {
    pub fn new(config: &JavaConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "falling back to a default HTTP client");
                Client::new()
            });
        Self {
            endpoints: config.endpoints.clone(),
            client,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.java)
    }

    async fn attempt(&self, endpoint: &str, body: &JavaRequest<'_>, started: Instant) -> Attempt {
        let response = match self.client.post(endpoint).json(body).send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Failed(e.to_string()),
        };

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            return Attempt::Done(ExecutionResult::compilation_error(message, started.elapsed()));
        }
        if !status.is_success() {
            return Attempt::Failed(format!("HTTP {status}"));
        }

        match response.json::<ExecutionResult>().await {
            Ok(result) => Attempt::Done(result),
            Err(e) => Attempt::Failed(format!("invalid response: {e}")),
        }
    }
}

#[async_trait]
impl RuntimeAdapter for JavaRuntime {
    fn language(&self) -> Language {
        Language::Java
    }

    #[instrument(skip_all, fields(cases = request.test_cases.len()))]
    async fn execute(&self, request: ExecutionRequest<'_>) -> ExecutionResult {
        let started = Instant::now();
        let body = JavaRequest {
            code: request.code,
            test_cases: request.test_cases,
        };

        let mut failures = Vec::new();
        for endpoint in &self.endpoints {
            match self.attempt(endpoint, &body, started).await {
                Attempt::Done(result) => {
                    debug!(%endpoint, status = %result.status, "java service answered");
                    return result;
                }
                Attempt::Failed(reason) => {
                    warn!(%endpoint, %reason, "java endpoint failed");
                    failures.push(format!("{endpoint}: {reason}"));
                }
            }
        }

        ExecutionResult::runtime_error(
            format!("{UNAVAILABLE}\n{}", failures.join("\n")),
            started.elapsed(),
        )
    }
}
