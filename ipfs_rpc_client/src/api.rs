//! Representative endpoint callers built on [`Transport`].
//!
//! Each one only marshals: it builds query parameters, picks one of the
//! three response consumption modes and re-hydrates the decoded JSON.

use std::time::Duration;

use cid::Cid;
use futures::stream::{BoxStream, StreamExt};
use ipfs_rpc_core::normalize::{camel_keys, to_cid, to_multiaddrs};
use ipfs_rpc_core::{CancellationToken, Error, ImportSource, Mode, Mtime, Result, SearchParams};
use multiaddr::Multiaddr;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::backend::BodyStream;
use crate::config::ClientConfig;
use crate::multipart::multipart_request;
use crate::progress::ProgressFn;
use crate::transport::{RequestOptions, Transport};

/// Signal and timeout accepted by every call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub signal: Option<CancellationToken>,
    pub timeout: Option<Duration>,
}

impl CallOptions {
    /// Adds the signal and timeout to `options`.
    pub fn apply(self, options: RequestOptions) -> RequestOptions {
        let options = options.signal_opt(self.signal);
        match self.timeout {
            Some(timeout) => options.timeout(timeout),
            None => options,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub golang: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub id: String,
    pub public_key: Option<String>,
    pub addresses: Vec<Multiaddr>,
    pub agent_version: Option<String>,
    pub protocols: Vec<String>,
}

#[derive(Default)]
pub struct AddOptions {
    pub cid_version: Option<u32>,
    pub hash_alg: Option<String>,
    pub pin: Option<bool>,
    pub raw_leaves: Option<bool>,
    pub wrap_with_directory: bool,
    pub call: CallOptions,
    pub on_upload_progress: Option<ProgressFn>,
}

impl AddOptions {
    fn search_params(&self) -> SearchParams {
        SearchParams::new()
            .with("streamChannels", true)
            .with_opt("cidVersion", self.cid_version)
            .with_opt("pin", self.pin)
            .with_opt("rawLeaves", self.raw_leaves)
            .with_opt("wrapWithDirectory", self.wrap_with_directory.then_some(true))
            .with_opt("hash", self.hash_alg.as_deref())
    }
}

/// One imported file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddResult {
    pub path: String,
    pub cid: Cid,
    pub size: u64,
    pub mode: Option<Mode>,
    pub mtime: Option<Mtime>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddLine {
    #[serde(default)]
    name: String,
    hash: Option<String>,
    size: Option<String>,
    bytes: Option<u64>,
    mode: Option<String>,
    mtime: Option<i64>,
    mtime_nsecs: Option<u32>,
}

impl AddLine {
    fn into_result(self) -> Result<AddResult> {
        let hash = self
            .hash
            .ok_or_else(|| Error::protocol(format!("add result for {:?} without a hash", self.name)))?;
        let size = match self.size {
            Some(size) => size
                .parse()
                .map_err(|_| Error::protocol(format!("invalid size {size:?}")))?,
            None => 0,
        };
        Ok(AddResult {
            path: self.name,
            cid: to_cid(&Value::String(hash))?,
            size,
            mode: self.mode.as_deref().map(str::parse::<Mode>).transpose()?,
            mtime: self.mtime.map(|secs| Mtime::new(secs, self.mtime_nsecs)),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct CatOptions {
    pub offset: Option<u64>,
    pub length: Option<u64>,
    pub call: CallOptions,
}

/// Entry point for calling the daemon.
#[derive(Debug, Clone)]
pub struct Client {
    transport: Transport,
}

impl Client {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self::from_transport(Transport::new(config)?))
    }

    pub fn from_transport(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub async fn version(&self, options: CallOptions) -> Result<VersionInfo> {
        self.transport
            .post("version", options.apply(RequestOptions::new()))
            .await?
            .json()
            .await
    }

    /// Identity of the daemon's node, or of `peer` when given.
    pub async fn id(&self, peer: Option<&str>, options: CallOptions) -> Result<PeerIdentity> {
        let params = SearchParams::new().args(peer);
        let value: Value = self
            .transport
            .post("id", options.apply(RequestOptions::new().params(params)))
            .await?
            .json()
            .await?;
        let value = camel_keys(value);
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_owned);

        Ok(PeerIdentity {
            id: text("id").ok_or_else(|| Error::protocol("id response without an ID"))?,
            public_key: text("publicKey"),
            addresses: to_multiaddrs(value.get("addresses").unwrap_or(&Value::Null))?,
            agent_version: text("agentVersion"),
            protocols: value
                .get("protocols")
                .and_then(Value::as_array)
                .map(|list| list.iter().filter_map(Value::as_str).map(str::to_owned).collect())
                .unwrap_or_default(),
        })
    }

    /// Imports `source` and streams one result per file or directory.
    ///
    /// Progress lines the daemon interleaves are skipped.
    pub async fn add_all(
        &self,
        source: impl Into<ImportSource>,
        options: AddOptions,
    ) -> Result<BoxStream<'static, Result<AddResult>>> {
        let abort = CancellationToken::new();
        let body = multipart_request(source.into(), abort.clone()).await?;
        let failure = body.failure();

        let mut request = RequestOptions::new()
            .params(options.search_params())
            .multipart(body)?
            .signal(abort);
        if let Some(f) = options.on_upload_progress {
            request = request.on_upload_progress(f);
        }
        let request = options.call.apply(request);

        let lines = self
            .transport
            .post("add", request)
            .await
            .map_err(|err| failure.explain(err))?
            .ndjson::<AddLine>();
        Ok(lines
            .filter_map(move |line| {
                let failure = failure.clone();
                async move {
                    match line {
                        Ok(line) if line.hash.is_none() && line.bytes.is_some() => {
                            debug!(name = %line.name, bytes = ?line.bytes, "add progress");
                            None
                        }
                        Ok(line) => Some(line.into_result()),
                        Err(err) => Some(Err(failure.explain(err))),
                    }
                }
            })
            .boxed())
    }

    /// Imports a single file and returns its result.
    pub async fn add(&self, source: impl Into<ImportSource>, options: AddOptions) -> Result<AddResult> {
        let mut results = self.add_all(source, options).await?;
        let mut last = None;
        while let Some(result) = results.next().await {
            last = Some(result?);
        }
        last.ok_or_else(|| Error::protocol("add returned no results"))
    }

    /// Raw content of the file at `path`, as it arrives.
    pub async fn cat(&self, path: &str, options: CatOptions) -> Result<BodyStream> {
        let params = SearchParams::new()
            .arg(path)
            .with_opt("offset", options.offset)
            .with_opt("length", options.length);
        let response = self
            .transport
            .post("cat", options.call.apply(RequestOptions::new().params(params)))
            .await?;
        Ok(response.into_stream())
    }
}
