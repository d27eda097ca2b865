//! Streaming `multipart/form-data` bodies for uploads.
//!
//! Each entry becomes one part. File metadata the daemon understands
//! (`mode`, `mtime`, `mtime-nsecs`) travels as a query string appended to the
//! part's field name:
//!
//! ```text
//! --<boundary>
//! Content-Disposition: form-data; name="file-1?mode=0644"; filename="docs%2Fa.txt"
//! Content-Type: application/octet-stream
//!
//! <content bytes>
//! ```
//!
//! The body is produced lazily while the HTTP client pulls it, so a slow
//! connection throttles how fast the sources are read.

use std::pin::Pin;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::stream::{self, Peekable, StreamExt};
use ipfs_rpc_core::{ByteStream, CancellationToken, Entry, EntryStream, Error, ImportSource, Result};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::warn;

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub struct MultipartBody {
    boundary: String,
    stream: ByteStream,
    failure: SourceFailure,
}

/// Holds the error that made a multipart body cancel its request.
///
/// The request itself only sees the cancellation, so callers pass the
/// abort they got through [`SourceFailure::explain`] to recover the cause.
#[derive(Clone, Default)]
pub struct SourceFailure(Arc<Mutex<Option<Error>>>);

impl SourceFailure {
    fn record(&self, err: Error) {
        self.slot().get_or_insert(err);
    }

    /// Replaces an abort caused by a failing source with
    /// [`Error::UploadSource`]. Any other error is returned unchanged.
    pub fn explain(&self, err: Error) -> Error {
        if !err.is_abort() {
            return err;
        }
        match self.slot().take() {
            Some(source) => Error::UploadSource(Box::new(source)),
            None => err,
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Error>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for SourceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SourceFailure").field(&self.slot().is_some()).finish()
    }
}

impl std::fmt::Debug for MultipartBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartBody")
            .field("boundary", &self.boundary)
            .finish_non_exhaustive()
    }
}

impl MultipartBody {
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Handle on the error that made this body cancel its request, if any.
    pub fn failure(&self) -> SourceFailure {
        self.failure.clone()
    }

    pub fn into_stream(self) -> ByteStream {
        self.stream
    }
}

pub fn new_boundary() -> String {
    format!("-----------------------------{}", uuid::Uuid::new_v4().simple())
}

/// Builds a multipart body from `source`.
///
/// The first entry is peeked before the body exists, so malformed input
/// fails here rather than mid-upload; the peeked entry is still written.
/// If a later entry or content chunk fails, `abort` is cancelled so the
/// request carrying this body fails visibly instead of hanging, and the
/// body is closed off. The failure itself is kept on
/// [`MultipartBody::failure`].
pub async fn multipart_request(
    source: ImportSource,
    abort: CancellationToken,
) -> Result<MultipartBody> {
    multipart_request_with_boundary(source, abort, new_boundary()).await
}

pub async fn multipart_request_with_boundary(
    source: ImportSource,
    abort: CancellationToken,
    boundary: String,
) -> Result<MultipartBody> {
    let mut entries = ipfs_rpc_core::input::normalize(source).peekable();

    let first_failed = matches!(Pin::new(&mut entries).peek().await, Some(Err(_)));
    if first_failed && let Some(Err(err)) = entries.next().await {
        return Err(err);
    }

    let failure = SourceFailure::default();
    let writer = PartWriter {
        entries,
        boundary: boundary.clone(),
        abort,
        failure: failure.clone(),
        state: State::NextEntry { index: 0 },
    };

    Ok(MultipartBody {
        boundary,
        stream: writer.into_stream(),
        failure,
    })
}

enum State {
    NextEntry { index: usize },
    Content { index: usize, content: ByteStream },
    Closing,
    Done,
}

struct PartWriter {
    entries: Peekable<EntryStream>,
    boundary: String,
    abort: CancellationToken,
    failure: SourceFailure,
    state: State,
}

impl PartWriter {
    fn into_stream(self) -> ByteStream {
        stream::unfold(self, |mut writer| async move {
            let chunk = writer.next_chunk().await?;
            Some((Ok(chunk), writer))
        })
        .boxed()
    }

    async fn next_chunk(&mut self) -> Option<Bytes> {
        loop {
            match std::mem::replace(&mut self.state, State::Done) {
                State::NextEntry { index } => match self.entries.next().await {
                    Some(Ok(entry)) => {
                        let head = part_head(&self.boundary, index, &entry);
                        self.state = match entry.content {
                            Some(content) => State::Content { index, content },
                            None => State::NextEntry { index: index + 1 },
                        };
                        return Some(head);
                    }
                    Some(Err(err)) => {
                        warn!("multipart: reading upload source failed: {err}");
                        self.fail(err);
                    }
                    None => self.state = State::Closing,
                },
                State::Content { index, mut content } => match content.next().await {
                    Some(Ok(chunk)) => {
                        self.state = State::Content { index, content };
                        if !chunk.is_empty() {
                            return Some(chunk);
                        }
                    }
                    Some(Err(err)) => {
                        warn!("multipart: reading content of part {index} failed: {err}");
                        self.fail(err.into());
                    }
                    None => self.state = State::NextEntry { index: index + 1 },
                },
                State::Closing => {
                    return Some(Bytes::from(format!("\r\n--{}--\r\n", self.boundary)));
                }
                State::Done => return None,
            }
        }
    }

    /// Records `err` before cancelling, so whoever sees the abort can find it.
    fn fail(&mut self, err: Error) {
        self.failure.record(err);
        self.abort.cancel();
        self.state = State::Closing;
    }
}

/// Field name for the part at `index`: `file`/`dir`, `-N` for every part
/// after the first, then the metadata query if any.
pub fn field_name(index: usize, entry: &Entry) -> String {
    let mut name = String::from(if entry.is_dir() { "dir" } else { "file" });
    if index > 0 {
        name.push_str(&format!("-{index}"));
    }

    let mut query = Vec::new();
    if let Some(mode) = entry.mode {
        query.push(format!("mode={}", mode.to_octal_string()));
    }
    if let Some(mtime) = entry.mtime {
        query.push(format!("mtime={}", mtime.secs));
        if let Some(nsecs) = mtime.nsecs {
            query.push(format!("mtime-nsecs={nsecs}"));
        }
    }
    if !query.is_empty() {
        name.push('?');
        name.push_str(&query.join("&"));
    }
    name
}

fn part_head(boundary: &str, index: usize, entry: &Entry) -> Bytes {
    let separator = if index > 0 { "\r\n" } else { "" };
    let content_type = if entry.is_dir() {
        "application/x-directory"
    } else {
        "application/octet-stream"
    };
    Bytes::from(format!(
        "{separator}--{boundary}\r\n\
         Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
         Content-Type: {content_type}\r\n\
         \r\n",
        field_name(index, entry),
        utf8_percent_encode(&entry.path, URI_COMPONENT),
    ))
}
