//! One POST per RPC call, with timeout and abort handling.

use std::sync::Arc;
use std::time::Duration;

use ipfs_rpc_core::{AnySignal, CancellationToken, Error, Result, SearchParams};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tracing::debug;
use url::Url;

use crate::backend::{HttpBackend, PostRequest, RequestBody, ReqwestBackend};
use crate::config::ClientConfig;
use crate::error_handler::{DaemonErrorHandler, ErrorHandler};
use crate::multipart::MultipartBody;
use crate::progress::{ProgressFn, track_upload};
use crate::response::Response;

/// Per-call request options.
#[derive(Default)]
pub struct RequestOptions {
    pub params: SearchParams,
    /// Merged over the configured defaults; values set here win.
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    /// Any of these firing aborts the call and its response body.
    pub signals: Vec<CancellationToken>,
    /// Overrides the configured default timeout. Also forwarded to the
    /// daemon as the `timeout` parameter.
    pub timeout: Option<Duration>,
    pub on_upload_progress: Option<ProgressFn>,
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("signals", &self.signals.len())
            .field("timeout", &self.timeout)
            .field("on_upload_progress", &self.on_upload_progress.is_some())
            .finish()
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, params: SearchParams) -> Self {
        self.params = params;
        self
    }

    /// Adds a header value. Repeating a name sends every value, and any
    /// configured default for that name is left out.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sends `body` with its `multipart/form-data` content type.
    pub fn multipart(mut self, body: MultipartBody) -> Result<Self> {
        let content_type = HeaderValue::from_str(&body.content_type())
            .map_err(|err| Error::InvalidInput(format!("multipart boundary: {err}")))?;
        self.headers.insert(CONTENT_TYPE, content_type);
        self.body = Some(RequestBody::Stream(body.into_stream()));
        Ok(self)
    }

    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signals.push(signal);
        self
    }

    pub fn signal_opt(self, signal: Option<CancellationToken>) -> Self {
        match signal {
            Some(signal) => self.signal(signal),
            None => self,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_upload_progress(mut self, f: ProgressFn) -> Self {
        self.on_upload_progress = Some(f);
        self
    }
}

/// Issues RPC calls against one daemon.
///
/// Cheap to clone; clones share the backend and its connection pool.
#[derive(Clone)]
pub struct Transport {
    base: Url,
    headers: HeaderMap,
    timeout: Option<Duration>,
    backend: Arc<dyn HttpBackend>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base", &self.base.as_str())
            .field("timeout", &self.timeout)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Transport over a pooled `reqwest` client.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Self::with_backend(config, ReqwestBackend::new())
    }

    pub fn with_backend(config: &ClientConfig, backend: impl HttpBackend) -> Result<Self> {
        Ok(Self {
            base: config.base_url()?,
            headers: config.header_map()?,
            timeout: config.timeout(),
            backend: Arc::new(backend),
            error_handler: Arc::new(DaemonErrorHandler),
        })
    }

    /// Replaces the hook that turns non-2xx responses into errors.
    pub fn with_error_handler(mut self, handler: impl ErrorHandler) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Builds the full URL for `path` with the wire form of `params`.
    pub fn url_for(&self, path: &str, params: &SearchParams) -> Result<Url> {
        let mut url = self.base.join(path.trim_start_matches('/'))?;
        let query = params.to_query_string();
        url.set_query((!query.is_empty()).then_some(query.as_str()));
        Ok(url)
    }

    /// POSTs to `path` and resolves once the response head has arrived.
    ///
    /// Non-2xx responses are handed to the error handler and returned as
    /// its error. A fired timeout yields [`Error::Timeout`]; a fired caller
    /// signal yields [`Error::Aborted`]. Both keep governing the returned
    /// response's body.
    pub async fn post(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let RequestOptions {
            mut params,
            headers,
            body,
            signals,
            timeout,
            on_upload_progress,
        } = options;

        if let Some(timeout) = timeout {
            params = params.timeout(timeout);
        }
        let url = self.url_for(path, &params)?;

        let mut merged = self.headers.clone();
        for name in headers.keys() {
            merged.remove(name);
        }
        for (name, value) in headers.iter() {
            merged.append(name.clone(), value.clone());
        }

        let body = match (body, on_upload_progress) {
            (Some(body), Some(f)) => Some(track_upload(body, f)),
            (body, _) => body,
        };

        let controller = CancellationToken::new();
        let signal = AnySignal::new(signals.into_iter().chain(std::iter::once(controller.clone())));
        if signal.is_cancelled() {
            return Err(Error::Aborted);
        }

        debug!(%url, "rpc request");
        let request = PostRequest {
            url,
            headers: merged,
            body,
        };

        let deadline = timeout.or(self.timeout);
        let fired = signal.token().clone();
        let send = async {
            match deadline {
                Some(deadline) => match tokio::time::timeout(deadline, self.backend.post(request)).await {
                    Ok(result) => result,
                    Err(_) => {
                        controller.cancel();
                        Err(Error::Timeout)
                    }
                },
                None => self.backend.post(request).await,
            }
        };

        let raw = tokio::select! {
            biased;
            _ = fired.cancelled() => {
                return Err(if controller.is_cancelled() { Error::Timeout } else { Error::Aborted });
            }
            result = send => result,
        };
        let raw = match raw {
            Ok(raw) => raw,
            Err(err) => {
                debug!(path, "rpc request failed: {err}");
                return Err(err);
            }
        };

        debug!(path, status = %raw.status, "rpc response");
        if !raw.status.is_success() {
            return Err(self.error_handler.handle(Response::from_raw(raw)).await);
        }
        Ok(Response::new(raw, signal))
    }
}
