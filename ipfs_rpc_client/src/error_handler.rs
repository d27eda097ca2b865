//! Turning non-2xx daemon responses into typed errors.

use async_trait::async_trait;
use ipfs_rpc_core::Error;
use serde_json::Value;
use tracing::debug;

use crate::response::Response;

/// Daemon messages that mean a deadline ran out on the daemon side.
const TIMEOUT_MARKERS: &[&str] = &[
    "deadline has elapsed",
    "context deadline exceeded",
    "request timed out",
];

/// Hook invoked with every non-2xx response before the call fails.
#[async_trait]
pub trait ErrorHandler: Send + Sync + 'static {
    /// Consumes the failed response and returns the error to surface.
    /// Must not fail itself; whatever cannot be read is left out.
    async fn handle(&self, response: Response) -> Error;
}

/// Reads the daemon's `{"Message": .., "Code": ..}` (or plain-text) error
/// body and classifies it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DaemonErrorHandler;

#[async_trait]
impl ErrorHandler for DaemonErrorHandler {
    async fn handle(&self, response: Response) -> Error {
        let status = response.status();
        let is_json = response
            .content_type()
            .is_some_and(|ct| ct.starts_with("application/json"));

        let (message, code) = if is_json {
            match response.json::<Value>().await {
                Ok(body) => {
                    debug!(%status, "daemon error body: {body}");
                    let message = body
                        .get("Message")
                        .or_else(|| body.get("message"))
                        .and_then(Value::as_str)
                        .map(str::to_owned);
                    let code = body.get("Code").and_then(Value::as_i64);
                    (message, code)
                }
                Err(err) => {
                    debug!(%status, "failed to parse error response: {err}");
                    (Some(err.to_string()), None)
                }
            }
        } else {
            match response.text().await {
                Ok(text) => (Some(text.trim().to_owned()), None),
                Err(err) => {
                    debug!(%status, "failed to read error response: {err}");
                    (Some(err.to_string()), None)
                }
            }
        };

        classify(status.as_u16(), message, code)
    }
}

/// Maps a status and salvaged message to the error kind callers see.
pub fn classify(status: u16, message: Option<String>, code: Option<i64>) -> Error {
    let message = message.filter(|m| !m.is_empty());
    if let Some(msg) = &message
        && TIMEOUT_MARKERS.iter().any(|marker| msg.contains(marker))
    {
        return Error::Timeout;
    }
    let message = message.unwrap_or_else(|| {
        reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("HTTP error")
            .to_owned()
    });
    Error::Http {
        status,
        message,
        code,
    }
}
