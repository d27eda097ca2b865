use std::collections::BTreeMap;
use std::time::Duration;

use ipfs_rpc_core::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_PROTOCOL: &str = "http";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_API_PATH: &str = "/api/v0";

/// Where the daemon's RPC API lives and how to talk to it.
///
/// Either set `url` directly or let it be assembled from `protocol`, `host`,
/// `port` and `api_path`. A URL without a path (or with just `/`) gets the
/// api path appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub url: Option<String>,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub api_path: String,
    /// Headers sent with every request. Per-call headers win.
    pub headers: BTreeMap<String, String>,
    /// Default per-call timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            protocol: DEFAULT_PROTOCOL.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            api_path: DEFAULT_API_PATH.to_string(),
            headers: BTreeMap::new(),
            timeout_ms: None,
        }
    }
}

impl ClientConfig {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The resolved API base. Always ends in `/` so endpoint paths can be
    /// joined onto it.
    pub fn base_url(&self) -> Result<Url> {
        let mut url = match &self.url {
            Some(url) => Url::parse(url)?,
            None => Url::parse(&format!("{}://{}:{}", self.protocol, self.host, self.port))?,
        };
        if url.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!("{url} cannot be used as a base URL")));
        }
        if url.path().is_empty() || url.path() == "/" {
            url.set_path(&self.api_path);
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| Error::InvalidConfig(format!("header name {name:?}: {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| Error::InvalidConfig(format!("header value for {name}: {err}")))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}
