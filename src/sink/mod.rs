//! Result delivery
//!
//! Confirmed values leave the scanner through a `ResultSink`. Submission is
//! always an explicit call; the scanner itself never posts anything.

pub mod webhook;

use async_trait::async_trait;
use thiserror::Error;

pub use webhook::WebhookSink;

/// Successful submission
#[derive(Debug, Clone, PartialEq)]
pub struct SinkReceipt {
    /// The submitted value
    pub value: String,
    /// HTTP status of the response
    pub status: u16,
    /// Parsed response body, when it was JSON
    pub response: Option<serde_json::Value>,
}

/// Submission failures
#[derive(Debug, Error)]
pub enum SinkError {
    /// Nothing to submit
    #[error("no value to submit")]
    EmptyValue,
    /// No endpoint configured
    #[error("no submission endpoint configured")]
    NotConfigured,
    /// Endpoint URL could not be parsed
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),
    /// Transport failure
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The endpoint answered but refused the value
    #[error("endpoint rejected the value (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
}

/// A destination for confirmed values
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Deliver one value
    async fn submit(&self, value: &str) -> Result<SinkReceipt, SinkError>;
}
