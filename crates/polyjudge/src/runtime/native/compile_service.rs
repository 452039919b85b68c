//! Client for the C/C++ compile service
//!
//! The service exposes `GET /health` and `POST /compile` taking
//! `{ code, language }`. A successful compile answers with an
//! `application/wasm` body; a rejected source answers 4xx with
//! `{ "error": "..." }`. Any other 4xx means the service itself is not
//! usable. Health answers `{ status, hasDependencies, port }`.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::types::Language;

/// Default timeout for a compile request
pub const COMPILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the health probe
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum CompileServiceError {
    #[error("invalid compile service URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("compile service unreachable: {0}")]
    Unavailable(String),

    #[error("compile service is unhealthy: {0}")]
    Unhealthy(String),

    /// The service understood the request and rejected the source
    #[error("{0}")]
    Rejected(String),

    #[error("compile service returned an unusable module: {0}")]
    InvalidModule(String),
}

impl CompileServiceError {
    /// Whether the failure is the user's source, not the service
    pub fn is_user_error(&self) -> bool {
        matches!(self, CompileServiceError::Rejected(_))
    }
}

#[derive(Debug, Serialize)]
struct CompileRequest<'a> {
    code: &'a str,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    has_dependencies: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct CompileClient {
    base: Url,
    client: Client,
}

impl CompileClient {
    pub fn new(base_url: &str) -> Result<Self, CompileServiceError> {
        let invalid = |message: String| CompileServiceError::InvalidUrl {
            url: base_url.to_string(),
            message,
        };

        let mut base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(COMPILE_TIMEOUT)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self { base, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CompileServiceError> {
        self.base
            .join(path)
            .map_err(|e| CompileServiceError::InvalidUrl {
                url: self.base.to_string(),
                message: e.to_string(),
            })
    }

    /// Probe `GET /health`
    #[instrument(skip(self), fields(base = %self.base))]
    pub async fn health(&self) -> Result<(), CompileServiceError> {
        let response = self
            .client
            .get(self.endpoint("health")?)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| CompileServiceError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CompileServiceError::Unhealthy(format!("HTTP {status}")));
        }

        // A body that isn't the health document still counts as a plain 200
        let body = response.text().await.unwrap_or_default();
        if let Ok(health) = serde_json::from_str::<HealthBody>(&body)
            && health.has_dependencies == Some(false)
        {
            return Err(CompileServiceError::Unhealthy(format!(
                "toolchain missing (status {})",
                health.status.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(())
    }

    /// Compile `code` to a WebAssembly module
    #[instrument(skip(self, code), fields(base = %self.base, len = code.len()))]
    pub async fn compile(
        &self,
        code: &str,
        language: Language,
    ) -> Result<Vec<u8>, CompileServiceError> {
        let response = self
            .client
            .post(self.endpoint("compile")?)
            .json(&CompileRequest {
                code,
                language: language.id(),
            })
            .send()
            .await
            .map_err(|e| CompileServiceError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| CompileServiceError::Unavailable(e.to_string()))?;
            debug!(size = bytes.len(), "module received");
            return Ok(bytes.to_vec());
        }

        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(rejection) = serde_json::from_str::<ErrorBody>(&body) {
                return Err(CompileServiceError::Rejected(rejection.error));
            }
        }

        Err(CompileServiceError::Unavailable(format!(
            "compile service answered HTTP {status}"
        )))
    }
}
