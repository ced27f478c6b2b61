use crate::http::build_client;
use reqwest::Client;
use serde::Deserialize;
use std::{future::Future, time::Duration};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("missing oracle endpoint")]
    MissingEndpoint,
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),
    #[error("oracle task aborted: {0}")]
    Aborted(String),
}

/// Remote categorization capability. Replies are free text and are never
/// trusted to be well formed.
pub trait Oracle: Send + Sync + 'static {
    fn propose(&self, prompt: String) -> impl Future<Output = Result<String, OracleError>> + Send;
}

/// Runs one proposal under a hard deadline.
pub async fn propose_with_timeout<O: Oracle>(
    oracle: &O,
    prompt: String,
    timeout: Duration,
) -> Result<String, OracleError> {
    match tokio::time::timeout(timeout, oracle.propose(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(OracleError::Timeout(timeout)),
    }
}

/// Oracle served over HTTP: `GET {endpoint}?prompt=...` answering
/// `{"response": "..."}`.
pub struct HttpOracle {
    http: Client,
    config: OracleConfig,
}

impl HttpOracle {
    pub fn new(config: OracleConfig) -> Self {
        Self {
            http: build_client(config.timeout),
            config,
        }
    }
}

impl Oracle for HttpOracle {
    async fn propose(&self, prompt: String) -> Result<String, OracleError> {
        let endpoint = self.config.endpoint.trim();
        if endpoint.is_empty() {
            return Err(OracleError::MissingEndpoint);
        }

        let response = self
            .http
            .get(endpoint)
            .query(&[("prompt", prompt.as_str())])
            .send()
            .await
            .map_err(|err| OracleError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::Http(format!("HTTP {}", response.status())));
        }

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|err| OracleError::InvalidResponse(err.to_string()))?;

        Ok(payload.response.trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}
