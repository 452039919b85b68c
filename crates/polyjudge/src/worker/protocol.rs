//! Messages exchanged between the host and a worker thread

use serde::{Deserialize, Serialize};

use crate::types::{TestCase, TestCaseResult};

/// The one request a worker receives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub code: String,
    pub test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_hint: Option<String>,
}

/// The one reply a worker sends back
///
/// `Error` is a business failure (the source could not be evaluated, a
/// required construct is missing). Engine failures never reach this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    Success {
        results: Vec<TestCaseResult>,
        logs: String,
    },
    Error {
        error: String,
        logs: String,
    },
}

impl WorkerMessage {
    pub fn error(error: impl Into<String>, logs: impl Into<String>) -> Self {
        WorkerMessage::Error {
            error: error.into(),
            logs: logs.into(),
        }
    }
}
