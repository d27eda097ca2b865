//! Shared types for the IPFS HTTP RPC client crates.
//!
//! Nothing in this crate talks to the network. It holds the pieces every
//! RPC caller needs regardless of how requests are transported:
//!
//! - The error type (`Error`) callers branch on: timeout vs. abort vs.
//!   daemon failure.
//! - Signal composition (`signal::AnySignal`), merging a caller's
//!   cancellation token with internally created ones.
//! - The wire codec (`wire`) for multibase-wrapped binary fields.
//! - Query-string parameters (`params::SearchParams`) and their kebab-case
//!   wire transform.
//! - Upload inputs (`input`), normalized into a lazy entry stream.
//! - Re-hydration helpers (`normalize`) for CIDs, multiaddrs and key casing.

pub mod error;
pub mod input;
pub mod normalize;
pub mod params;
pub mod signal;
pub mod wire;

pub use error::{Error, Result};
pub use input::{ByteStream, Content, Entry, EntryStream, FileEntry, ImportSource, Mode, Mtime};
pub use params::SearchParams;
pub use signal::AnySignal;

// Re-exported so callers need not depend on tokio-util directly.
pub use tokio_util::sync::CancellationToken;
