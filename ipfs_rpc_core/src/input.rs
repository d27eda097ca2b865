//! Upload inputs.
//!
//! Everything that can be sent as file content is described by an explicit
//! tagged union, [`ImportSource`], chosen once at the API boundary. Each
//! shape has a single normalization path into a stream of [`Entry`] values
//! that the multipart builder consumes lazily.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{Error, Result};

/// A lazily produced sequence of content chunks.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// A lazily produced sequence of normalized entries.
pub type EntryStream = BoxStream<'static, Result<Entry>>;

/// POSIX permission bits (including setuid/setgid/sticky).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode(u32);

impl Mode {
    pub fn new(bits: u32) -> Self {
        Self(bits & 0o7777)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Octal representation, zero padded to four digits (`0644`).
    pub fn to_octal_string(&self) -> String {
        format!("{:04o}", self.0)
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mode({})", self.to_octal_string())
    }
}

impl From<u32> for Mode {
    fn from(bits: u32) -> Self {
        Mode::new(bits)
    }
}

impl FromStr for Mode {
    type Err = Error;

    /// Parses an octal string such as `"644"` or `"0o755"`.
    fn from_str(s: &str) -> Result<Self> {
        let digits = s.trim().trim_start_matches("0o");
        u32::from_str_radix(digits, 8)
            .map(Mode::new)
            .map_err(|_| Error::InvalidInput(format!("invalid octal mode: {s:?}")))
    }
}

/// Modification time as seconds (possibly negative) plus optional nanoseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Mtime {
    pub secs: i64,
    pub nsecs: Option<u32>,
}

impl Mtime {
    pub fn new(secs: i64, nsecs: Option<u32>) -> Self {
        Self { secs, nsecs }
    }
}

impl From<SystemTime> for Mtime {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since) => Mtime::from(since),
            Err(err) => {
                // Before the epoch: floor the seconds, keep nanos positive.
                let before = err.duration();
                let mut secs = -(before.as_secs() as i64);
                let mut nsecs = before.subsec_nanos();
                if nsecs > 0 {
                    secs -= 1;
                    nsecs = 1_000_000_000 - nsecs;
                }
                Mtime::new(secs, Some(nsecs))
            }
        }
    }
}

impl From<Duration> for Mtime {
    fn from(since_epoch: Duration) -> Self {
        Mtime::new(
            since_epoch.as_secs() as i64,
            Some(since_epoch.subsec_nanos()),
        )
    }
}

impl From<(i64, u32)> for Mtime {
    fn from((secs, nsecs): (i64, u32)) -> Self {
        Mtime::new(secs, Some(nsecs))
    }
}

/// File content in one of the supported shapes.
pub enum Content {
    Bytes(Bytes),
    Text(String),
    /// A finite, already materialized sequence of chunks.
    Chunks(Vec<Bytes>),
    Stream(ByteStream),
}

impl Content {
    pub fn into_stream(self) -> ByteStream {
        match self {
            Content::Bytes(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            Content::Text(text) => {
                let bytes = Bytes::from(text);
                stream::once(async move { Ok(bytes) }).boxed()
            }
            Content::Chunks(chunks) => stream::iter(chunks.into_iter().map(Ok)).boxed(),
            Content::Stream(stream) => stream,
        }
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Content::Text(t) => f.debug_tuple("Text").field(&t.len()).finish(),
            Content::Chunks(c) => f.debug_tuple("Chunks").field(&c.len()).finish(),
            Content::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for Content {
    fn from(bytes: Bytes) -> Self {
        Content::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::Bytes(bytes.into())
    }
}

impl From<&'static [u8]> for Content {
    fn from(bytes: &'static [u8]) -> Self {
        Content::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_owned())
    }
}

/// One file or directory to upload.
#[derive(Debug)]
pub struct FileEntry {
    pub path: String,
    /// `None` marks a directory.
    pub content: Option<Content>,
    pub mode: Option<Mode>,
    pub mtime: Option<Mtime>,
}

impl FileEntry {
    pub fn file(path: impl Into<String>, content: impl Into<Content>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
            mode: None,
            mtime: None,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
            mode: None,
            mtime: None,
        }
    }

    pub fn with_mode(mut self, mode: impl Into<Mode>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_mtime(mut self, mtime: impl Into<Mtime>) -> Self {
        self.mtime = Some(mtime.into());
        self
    }

    fn normalize(self) -> Entry {
        Entry {
            path: self.path,
            mode: self.mode,
            mtime: self.mtime,
            content: self.content.map(Content::into_stream),
        }
    }
}

/// The accepted upload input shapes.
pub enum ImportSource {
    /// A single unnamed file.
    Content(Content),
    Entry(FileEntry),
    Entries(Vec<FileEntry>),
    /// Entries produced lazily, e.g. while walking a directory tree.
    EntryStream(BoxStream<'static, Result<FileEntry>>),
}

impl fmt::Debug for ImportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportSource::Content(c) => f.debug_tuple("Content").field(c).finish(),
            ImportSource::Entry(e) => f.debug_tuple("Entry").field(e).finish(),
            ImportSource::Entries(e) => f.debug_tuple("Entries").field(&e.len()).finish(),
            ImportSource::EntryStream(_) => f.write_str("EntryStream(..)"),
        }
    }
}

impl From<Content> for ImportSource {
    fn from(content: Content) -> Self {
        ImportSource::Content(content)
    }
}

impl From<FileEntry> for ImportSource {
    fn from(entry: FileEntry) -> Self {
        ImportSource::Entry(entry)
    }
}

impl From<Vec<FileEntry>> for ImportSource {
    fn from(entries: Vec<FileEntry>) -> Self {
        ImportSource::Entries(entries)
    }
}

/// A normalized entry, ready to be written as one multipart part.
pub struct Entry {
    pub path: String,
    pub mode: Option<Mode>,
    pub mtime: Option<Mtime>,
    pub content: Option<ByteStream>,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.content.is_none()
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("mtime", &self.mtime)
            .field("dir", &self.is_dir())
            .finish()
    }
}

/// Turns any supported input shape into a lazy entry stream.
pub fn normalize(source: ImportSource) -> EntryStream {
    match source {
        ImportSource::Content(content) => {
            let entry = FileEntry::file("", content).normalize();
            stream::once(async move { Ok(entry) }).boxed()
        }
        ImportSource::Entry(entry) => {
            let entry = entry.normalize();
            stream::once(async move { Ok(entry) }).boxed()
        }
        ImportSource::Entries(entries) => {
            stream::iter(entries.into_iter().map(|e| Ok(e.normalize()))).boxed()
        }
        ImportSource::EntryStream(entries) => entries
            .map(|entry| entry.map(FileEntry::normalize))
            .boxed(),
    }
}
