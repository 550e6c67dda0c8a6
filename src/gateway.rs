//! Dispatch of punch events to the remote attendance collector.
//!
//! The scheduler hands punches to a [`Dispatcher`] one at a time. A dispatcher
//! makes exactly one delivery attempt per call; retrying is the caller's job.

use crate::device::RawPunch;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default request timeout for the collector.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(50);

/// Remote collector configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Endpoint receiving individual punch events
    pub url: String,
    /// Value of the `x-api-key` header
    pub api_key: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Payload sent for each punch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunchEvent {
    pub user_id: String,
    /// ISO-8601 timestamp including the UTC offset
    pub timestamp: String,
}

impl From<&RawPunch> for PunchEvent {
    fn from(punch: &RawPunch) -> Self {
        Self {
            user_id: punch.user_id.clone(),
            timestamp: punch.timestamp.to_rfc3339(),
        }
    }
}

/// Acknowledgement of a delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReceipt {
    /// HTTP-style status code returned by the collector
    pub status: u16,
}

/// Dispatch error types.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("collector config error: {0}")]
    Config(String),

    #[error("collector network error: {0}")]
    Network(String),

    #[error("collector rejected event ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("collector serialization error: {0}")]
    Serialization(String),
}

impl DispatchError {
    /// Status code when the collector answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            DispatchError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Delivers one punch event to the remote collector.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, event: &PunchEvent) -> Result<DispatchReceipt, DispatchError>;
}

/// Dispatcher posting JSON events over HTTP.
#[cfg(feature = "gateway")]
pub struct HttpDispatcher {
    config: GatewayConfig,
    client: reqwest::Client,
}

#[cfg(feature = "gateway")]
impl HttpDispatcher {
    /// Create a new HTTP dispatcher.
    pub fn new(config: GatewayConfig) -> Result<Self, DispatchError> {
        if config.url.trim().is_empty() {
            return Err(DispatchError::Config("collector URL is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DispatchError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[cfg(feature = "gateway")]
#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn send(&self, event: &PunchEvent) -> Result<DispatchReceipt, DispatchError> {
        let response = self
            .client
            .post(&self.config.url)
            .header("x-api-key", &self.config.api_key)
            .header("Content-Type", "application/json")
            .json(event)
            .send()
            .await
            .map_err(|e| DispatchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DispatchError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(DispatchReceipt {
            status: status.as_u16(),
        })
    }
}
