//! The HTTP capability the transport runs on.
//!
//! The RPC surface is POST-only, so [`HttpBackend`] exposes nothing else.
//! Which backend to use is decided once, when the [`crate::Transport`] is
//! built; shared logic never inspects the environment.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use ipfs_rpc_core::{ByteStream, Error, Result};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use url::Url;

/// Response body as received, chunk by chunk.
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// Outgoing request body.
pub enum RequestBody {
    Bytes(Bytes),
    Stream(ByteStream),
}

impl RequestBody {
    pub fn known_len(&self) -> Option<u64> {
        match self {
            RequestBody::Bytes(bytes) => Some(bytes.len() as u64),
            RequestBody::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> ByteStream {
        match self {
            RequestBody::Bytes(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            RequestBody::Stream(stream) => stream,
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            RequestBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(bytes.into())
    }
}

#[derive(Debug)]
pub struct PostRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

/// A response whose body has not been read yet.
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait HttpBackend: fmt::Debug + Send + Sync + 'static {
    /// Issues a POST and resolves once the response head has arrived.
    ///
    /// Dropping the returned future (or the response body) must release the
    /// underlying connection.
    async fn post(&self, request: PostRequest) -> Result<RawResponse>;
}

/// [`HttpBackend`] over a pooled `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured client, e.g. one with custom pool or TLS settings.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn post(&self, request: PostRequest) -> Result<RawResponse> {
        let mut builder = self.client.post(request.url).headers(request.headers);
        if let Some(body) = request.body {
            builder = match body {
                RequestBody::Bytes(bytes) => builder.body(bytes),
                RequestBody::Stream(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
            };
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
            .boxed();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout
    } else {
        Error::Network(Box::new(err))
    }
}
