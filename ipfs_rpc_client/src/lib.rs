//! HTTP transport for the IPFS daemon's RPC API.
//!
//! Every call is a POST against `<base>/api/v0/<path>` with its arguments on
//! the query string. [`Transport::post`] enforces timeouts and cancellation,
//! classifies daemon errors, and hands back a single-use [`Response`] that is
//! consumed buffered, as newline-delimited JSON, or as raw chunks.
//!
//! ```ignore
//! use ipfs_rpc_client::{CallOptions, Client, ClientConfig};
//!
//! let client = Client::new(&ClientConfig::from_url("http://127.0.0.1:5001"))?;
//! let version = client.version(CallOptions::default()).await?;
//! println!("daemon {}", version.version);
//! ```

mod api;
mod backend;
mod config;
mod error_handler;
mod multipart;
mod ndjson;
mod progress;
mod response;
mod transport;

#[cfg(feature = "testutil")]
pub mod testutil;

pub use api::{AddOptions, AddResult, CallOptions, CatOptions, Client, PeerIdentity, VersionInfo};
pub use backend::{BodyStream, HttpBackend, PostRequest, RawResponse, RequestBody, ReqwestBackend};
pub use config::ClientConfig;
pub use error_handler::{DaemonErrorHandler, ErrorHandler, classify};
pub use multipart::{MultipartBody, SourceFailure, field_name, multipart_request, multipart_request_with_boundary, new_boundary};
pub use ndjson::NdjsonStream;
pub use progress::{ProgressFn, UploadProgress, track_upload};
pub use response::Response;
pub use transport::{RequestOptions, Transport};

pub use ipfs_rpc_core::{CancellationToken, Error, Result, SearchParams};
