//! HTTP webhook sink
//!
//! Posts `{"<payload_key>": "<value>"}` to the configured endpoint. Script
//! endpoints that reject CORS preflights get the JSON body labelled
//! `text/plain`. A response counts as a rejection when the status is not 2xx
//! or its JSON body carries `"ok": false`.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ResultSink, SinkError, SinkReceipt};
use crate::config::{SinkContentType, SinkSettings};

/// Webhook result sink
#[derive(Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    payload_key: String,
    content_type: SinkContentType,
    bearer_token: Option<String>,
}

#[derive(Deserialize)]
struct EndpointReply {
    ok: Option<bool>,
    error: Option<String>,
}

impl WebhookSink {
    /// Build a sink from settings
    pub fn new(settings: &SinkSettings) -> Result<Self, SinkError> {
        let endpoint = settings
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or(SinkError::NotConfigured)?;
        let endpoint = reqwest::Url::parse(endpoint.trim())
            .map_err(|_| SinkError::InvalidEndpoint(endpoint.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            payload_key: settings.payload_key.clone(),
            content_type: settings.content_type,
            bearer_token: settings.bearer_token.clone(),
        })
    }

    /// Request body for a value
    fn body(&self, value: &str) -> String {
        let mut payload = serde_json::Map::new();
        payload.insert(
            self.payload_key.clone(),
            serde_json::Value::String(value.to_string()),
        );
        serde_json::Value::Object(payload).to_string()
    }

    fn request(&self, value: &str) -> reqwest::RequestBuilder {
        let content_type = match self.content_type {
            SinkContentType::PlainText => "text/plain;charset=utf-8",
            SinkContentType::Json => "application/json",
        };

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, content_type)
            .body(self.body(value));
        if let Some(token) = &self.bearer_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        request
    }
}

#[async_trait]
impl ResultSink for WebhookSink {
    async fn submit(&self, value: &str) -> Result<SinkReceipt, SinkError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(SinkError::EmptyValue);
        }

        debug!("Submitting {} to {}", value, self.endpoint);
        let response = self.request(value).send().await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await?;

        match interpret_response(status, &content_type, &body) {
            Ok(parsed) => {
                info!("Submitted {} (HTTP {})", value, status);
                Ok(SinkReceipt {
                    value: value.to_string(),
                    status,
                    response: parsed,
                })
            }
            Err(e) => {
                warn!("Submission of {} failed: {}", value, e);
                Err(e)
            }
        }
    }
}

/// Decide whether an endpoint response accepted the value
///
/// JSON bodies are returned parsed. Rejection messages prefer the body's
/// `error` field, then the raw body text.
pub fn interpret_response(
    status: u16,
    content_type: &str,
    body: &str,
) -> Result<Option<serde_json::Value>, SinkError> {
    let parsed = if content_type.contains("application/json") {
        serde_json::from_str::<serde_json::Value>(body).ok()
    } else {
        None
    };
    let reply = parsed
        .as_ref()
        .and_then(|v| EndpointReply::deserialize(v).ok());

    let refused = reply.as_ref().and_then(|r| r.ok) == Some(false);
    if (200..300).contains(&status) && !refused {
        return Ok(parsed);
    }

    let message = reply
        .and_then(|r| r.error)
        .or_else(|| {
            let raw = body.trim();
            (!raw.is_empty()).then(|| raw.to_string())
        })
        .unwrap_or_else(|| "request failed".to_string());

    Err(SinkError::Rejected { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SinkSettings {
        SinkSettings {
            endpoint: Some("https://script.example.com/exec".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_requires_endpoint() {
        let missing = SinkSettings::default();
        assert!(matches!(WebhookSink::new(&missing), Err(SinkError::NotConfigured)));

        let bad = SinkSettings {
            endpoint: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(matches!(WebhookSink::new(&bad), Err(SinkError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_plain_text_request() {
        let sink = WebhookSink::new(&settings()).unwrap();
        let request = sink.request("020123").build().unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "https://script.example.com/exec");
        assert_eq!(
            request.headers()[CONTENT_TYPE],
            "text/plain;charset=utf-8"
        );
        assert!(request.headers().get(AUTHORIZATION).is_none());

        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json, serde_json::json!({ "peaNumber": "020123" }));
    }

    #[test]
    fn test_json_request_with_token() {
        let sink = WebhookSink::new(&SinkSettings {
            content_type: SinkContentType::Json,
            payload_key: "reading".to_string(),
            bearer_token: Some("secret".to_string()),
            ..settings()
        })
        .unwrap();
        let request = sink.request("42").build().unwrap();

        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer secret");
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, br#"{"reading":"42"}"#);
    }

    #[tokio::test]
    async fn test_empty_value_not_sent() {
        let sink = WebhookSink::new(&settings()).unwrap();
        assert!(matches!(sink.submit("   ").await, Err(SinkError::EmptyValue)));
    }

    #[test]
    fn test_interpret_success() {
        let parsed = interpret_response(200, "application/json; charset=utf-8", r#"{"ok":true,"row":7}"#)
            .unwrap()
            .unwrap();
        assert_eq!(parsed["row"], 7);

        assert_eq!(interpret_response(200, "text/html", "done").unwrap(), None);
    }

    #[test]
    fn test_interpret_refusal() {
        let err = interpret_response(200, "application/json", r#"{"ok":false,"error":"sheet locked"}"#)
            .unwrap_err();
        match err {
            SinkError::Rejected { status, message } => {
                assert_eq!(status, 200);
                assert_eq!(message, "sheet locked");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_interpret_http_failure() {
        match interpret_response(500, "text/plain", "  boom ").unwrap_err() {
            SinkError::Rejected { message, .. } => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {:?}", other),
        }
        match interpret_response(404, "application/json", "").unwrap_err() {
            SinkError::Rejected { message, .. } => assert_eq!(message, "request failed"),
            other => panic!("unexpected error: {:?}", other),
        }
        match interpret_response(403, "application/json", r#"{"ok":false}"#).unwrap_err() {
            SinkError::Rejected { message, .. } => assert_eq!(message, r#"{"ok":false}"#),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
