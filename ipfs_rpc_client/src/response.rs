use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt, TryStreamExt};
use ipfs_rpc_core::{AnySignal, Error, Result};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use serde::de::DeserializeOwned;

use crate::backend::{BodyStream, RawResponse};
use crate::ndjson::NdjsonStream;

/// A successful RPC response whose body has not been consumed yet.
///
/// The body can be drained exactly once, so every consumption method takes
/// `self`: buffered (`bytes`, `text`, `json`), line-delimited JSON
/// (`ndjson`), or raw chunks (`into_stream`).
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: BodyStream,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Response {
    pub(crate) fn new(raw: RawResponse, signal: AnySignal) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers,
            body: abortable(raw.body, signal),
        }
    }

    /// Wraps a response without tying its body to any signal.
    pub fn from_raw(raw: RawResponse) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers,
            body: raw.body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub async fn bytes(self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        let mut body = self.body;
        while let Some(chunk) = body.try_next().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// The body as UTF-8, with invalid sequences replaced.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|err| Error::protocol(format!("invalid JSON response: {err}")))
    }

    pub fn ndjson<T: DeserializeOwned>(self) -> NdjsonStream<T> {
        NdjsonStream::new(self.body)
    }

    /// Raw body chunks as they arrive.
    pub fn into_stream(self) -> BodyStream {
        self.body
    }
}

/// Ends `body` with `Error::Aborted` once `signal` fires.
///
/// The signal guard lives inside the stream, so its watcher is released
/// when the body is finished or dropped. Either way the underlying body is
/// dropped, which releases the connection.
fn abortable(body: BodyStream, signal: AnySignal) -> BodyStream {
    stream::unfold(Some((body, signal)), |state| async move {
        let (mut body, signal) = state?;
        let token = signal.token().clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => Some((Err(Error::Aborted), None)),
            chunk = body.next() => chunk.map(|chunk| (chunk, Some((body, signal)))),
        }
    })
    .boxed()
}
