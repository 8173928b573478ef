//! Shipping payloads to the collector.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE, USER_AGENT};

use crate::config::VERSION;
use crate::error::TransportError;
use crate::model::{MetricPayload, ServerResponse};

/// Delivers one payload and returns the collector's reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: &MetricPayload) -> Result<ServerResponse, TransportError>;

    /// Release resources. Later sends fail with [`TransportError::Closed`].
    fn close(&self);
}

/// JSON over HTTP POST, gzip-compressed, with bearer-token auth.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    closed: AtomicBool,
}

impl HttpTransport {
    pub fn new(
        url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            token,
            closed: AtomicBool::new(false),
        })
    }

    fn request(&self, body: Vec<u8>) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .header(USER_AGENT, format!("hostwatch/{VERSION}"))
            .header("X-Agent-Version", VERSION)
            .body(body);
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        request
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &MetricPayload) -> Result<ServerResponse, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let json = serde_json::to_vec(payload)?;
        let body = gzip(&json)?;
        tracing::trace!(raw = json.len(), compressed = body.len(), "sending payload");

        let resp = self.request(body).send().await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        interpret(status, &text)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Map the collector's status and body to a result. A success with an
/// unreadable body still counts as delivered.
fn interpret(status: StatusCode, body: &str) -> Result<ServerResponse, TransportError> {
    match status {
        s if s.is_success() => Ok(serde_json::from_str(body).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "collector reply was not JSON");
            ServerResponse::default()
        })),
        StatusCode::UNAUTHORIZED => Err(TransportError::Unauthorized),
        StatusCode::BAD_REQUEST => Err(TransportError::BadRequest(body.to_string())),
        StatusCode::TOO_MANY_REQUESTS => Err(TransportError::RateLimited),
        s => Err(TransportError::UnexpectedStatus {
            status: s.as_u16(),
            body: body.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use chrono::Utc;
    use flate2::read::GzDecoder;

    use super::*;
    use crate::model::DynamicMetrics;

    fn transport(token: Option<&str>) -> HttpTransport {
        HttpTransport::new(
            "http://127.0.0.1:9/metrics",
            token.map(str::to_string),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn status_mapping() {
        let body = r#"{"status":"success","commands":[{"command":"uninstall"}]}"#;
        let ok = interpret(StatusCode::OK, body).unwrap();
        assert_eq!(ok.commands[0].command, "uninstall");

        let garbled = interpret(StatusCode::ACCEPTED, "<html>").unwrap();
        assert!(garbled.commands.is_empty());

        assert!(matches!(
            interpret(StatusCode::UNAUTHORIZED, ""),
            Err(TransportError::Unauthorized)
        ));
        assert!(matches!(
            interpret(StatusCode::BAD_REQUEST, "missing hostname"),
            Err(TransportError::BadRequest(msg)) if msg == "missing hostname"
        ));
        assert!(matches!(
            interpret(StatusCode::TOO_MANY_REQUESTS, ""),
            Err(TransportError::RateLimited)
        ));
        assert!(matches!(
            interpret(StatusCode::BAD_GATEWAY, "upstream"),
            Err(TransportError::UnexpectedStatus { status: 502, .. })
        ));
    }

    #[test]
    fn request_carries_agent_headers() {
        let req = transport(Some("s3cret")).request(b"{}".to_vec()).build().unwrap();
        let headers = req.headers();
        assert_eq!(req.method(), reqwest::Method::POST);
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[CONTENT_ENCODING], "gzip");
        assert_eq!(headers[AUTHORIZATION], "Bearer s3cret");
        assert_eq!(headers["X-Agent-Version"], VERSION);
        assert_eq!(headers[USER_AGENT], format!("hostwatch/{VERSION}").as_str());
    }

    #[test]
    fn no_token_means_no_authorization_header() {
        let req = transport(None).request(Vec::new()).build().unwrap();
        assert!(req.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn gzip_body_decompresses_to_the_json() {
        let payload = MetricPayload {
            hostname: "h".into(),
            timestamp: Utc::now(),
            static_metrics: None,
            dynamic_metrics: DynamicMetrics::default(),
        };
        let json = serde_json::to_vec(&payload).unwrap();
        let compressed = gzip(&json).unwrap();
        let mut out = Vec::new();
        GzDecoder::new(compressed.as_slice()).read_to_end(&mut out).unwrap();
        assert_eq!(out, json);
    }

    #[tokio::test]
    async fn closed_transport_refuses_to_send() {
        let t = transport(Some("tok"));
        t.close();
        let payload = MetricPayload {
            hostname: "h".into(),
            timestamp: Utc::now(),
            static_metrics: None,
            dynamic_metrics: DynamicMetrics::default(),
        };
        assert!(matches!(t.send(&payload).await, Err(TransportError::Closed)));
    }
}
