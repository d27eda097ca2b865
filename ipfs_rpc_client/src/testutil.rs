//! A scripted in-memory daemon for tests of RPC callers.
//!
//! Enable with:
//!
//! ```toml
//! [dev-dependencies]
//! ipfs_rpc_client = { workspace = true, features = ["testutil"] }
//! ```
//!
//! Replies are queued per endpoint path and handed out in order. Every
//! request is recorded, body included, so tests can assert on exactly what
//! reached the wire. Unscripted paths answer like the daemon does for an
//! unknown command: `404 page not found`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::stream::{self, StreamExt, TryStreamExt};
use ipfs_rpc_core::{Error, Result};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use url::Url;

use crate::backend::{HttpBackend, PostRequest, RawResponse};

/// One scripted answer.
pub enum Reply {
    /// `200` with a JSON body.
    Json(Value),
    /// Any status with a body of the given content type.
    Status {
        status: u16,
        content_type: &'static str,
        body: String,
    },
    /// `200` with one JSON value per line.
    Ndjson(Vec<Value>),
    /// `200` with these raw chunks.
    Chunks(Vec<Bytes>),
    /// `200` whose body is fed through a [`StreamFeed`].
    Feed(mpsc::UnboundedReceiver<Result<Bytes>>),
    /// Never answers.
    Hang,
    /// Fails before a response arrives, like a refused connection.
    Fail(String),
}

impl Reply {
    pub fn error(status: u16, message: &str) -> Self {
        Reply::Status {
            status,
            content_type: "application/json",
            body: serde_json::json!({"Message": message, "Code": 0, "Type": "error"}).to_string(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Reply::Status {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }
}

/// The sending side of a [`Reply::Feed`] body.
#[derive(Clone)]
pub struct StreamFeed {
    tx: mpsc::UnboundedSender<Result<Bytes>>,
}

impl StreamFeed {
    pub fn send_line(&self, line: &Value) -> bool {
        self.send(Bytes::from(format!("{line}\n")))
    }

    pub fn send(&self, chunk: Bytes) -> bool {
        self.tx.unbounded_send(Ok(chunk)).is_ok()
    }

    pub fn fail(&self, err: Error) -> bool {
        self.tx.unbounded_send(Err(err)).is_ok()
    }

    /// Ends the body.
    pub fn finish(&self) {
        self.tx.close_channel();
    }

    /// True once the client dropped the body, e.g. because it was aborted.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A request as the mock received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    /// The endpoint path below `/api/v0/`.
    pub fn endpoint(&self) -> &str {
        let path = self.url.path();
        path.split_once("/api/v0/").map_or(path, |(_, rest)| rest)
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url.query_pairs().into_owned().collect()
    }

    pub fn query_values(&self, key: &str) -> Vec<String> {
        self.url
            .query_pairs()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .collect()
    }
}

#[derive(Default)]
struct Script {
    replies: HashMap<String, VecDeque<Reply>>,
    requests: Vec<RecordedRequest>,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    script: Arc<Mutex<Script>>,
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend").finish_non_exhaustive()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `reply` for the next call to `endpoint` (e.g. `"pubsub/sub"`).
    pub fn on(&self, endpoint: &str, reply: Reply) -> &Self {
        self.lock()
            .replies
            .entry(endpoint.trim_matches('/').to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Queues a body the test feeds by hand.
    pub fn feed(&self, endpoint: &str) -> StreamFeed {
        let (tx, rx) = mpsc::unbounded();
        self.on(endpoint, Reply::Feed(rx));
        StreamFeed { tx }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn requests_to(&self, endpoint: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.endpoint() == endpoint)
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        // A panicking test thread must not hide the script from the others.
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl HttpBackend for MockBackend {
    async fn post(&self, request: PostRequest) -> Result<RawResponse> {
        let body = match request.body {
            Some(body) => {
                let chunks: Vec<Bytes> = body.into_stream().try_collect().await?;
                Bytes::from(chunks.concat())
            }
            None => Bytes::new(),
        };
        let recorded = RecordedRequest {
            url: request.url,
            headers: request.headers,
            body,
        };
        let endpoint = recorded.endpoint().to_string();

        let reply = {
            let mut script = self.lock();
            script.requests.push(recorded);
            script
                .replies
                .get_mut(&endpoint)
                .and_then(VecDeque::pop_front)
        };

        match reply.unwrap_or_else(|| Reply::text(404, "404 page not found\n")) {
            Reply::Json(value) => Ok(respond(200, "application/json", vec![Bytes::from(value.to_string())])),
            Reply::Status {
                status,
                content_type,
                body,
            } => Ok(respond(status, content_type, vec![Bytes::from(body)])),
            Reply::Ndjson(values) => {
                let lines = values
                    .iter()
                    .map(|v| Bytes::from(format!("{v}\n")))
                    .collect();
                Ok(respond(200, "application/json", lines))
            }
            Reply::Chunks(chunks) => Ok(respond(200, "application/octet-stream", chunks)),
            Reply::Feed(rx) => {
                let mut response = respond(200, "application/json", Vec::new());
                response.body = rx.boxed();
                Ok(response)
            }
            Reply::Hang => futures::future::pending().await,
            Reply::Fail(message) => Err(Error::Network(message.into())),
        }
    }
}

fn respond(status: u16, content_type: &'static str, chunks: Vec<Bytes>) -> RawResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    RawResponse {
        status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        headers,
        body: stream::iter(chunks.into_iter().map(Ok)).boxed(),
    }
}
