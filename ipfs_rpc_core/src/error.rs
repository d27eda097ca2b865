use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the RPC client crates.
///
/// Callers are expected to branch on the kind (timeout vs. abort vs. daemon
/// failure) rather than on raw HTTP status codes.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The daemon answered with a non-2xx status.
    #[error("daemon returned HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        /// The daemon's numeric error code, when the body was JSON.
        code: Option<i64>,
    },

    /// A client-side timeout fired, or the daemon reported a deadline.
    #[error("request timed out")]
    Timeout,

    /// The caller's cancellation token fired before completion.
    #[error("the operation was aborted")]
    Aborted,

    /// A line or field the daemon sent could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("already subscribed to {topic} with this handler")]
    DuplicateSubscription { topic: String },

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Reading an upload's entries or content failed mid-request, which
    /// cancelled the request carrying it.
    #[error("reading the upload source failed: {0}")]
    UploadSource(#[source] Box<Error>),

    /// Connection-level failure reported by the HTTP backend.
    #[error("network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Multibase(#[from] multibase::Error),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    /// True when the error is the expected result of a caller-initiated
    /// cancellation, including I/O errors raised by an aborted body stream.
    pub fn is_abort(&self) -> bool {
        match self {
            Error::Aborted => true,
            Error::Io(err) => err.kind() == std::io::ErrorKind::Interrupted,
            _ => false,
        }
    }

    /// Status code for daemon-reported failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
