//! Newline-delimited JSON decoding.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use ipfs_rpc_core::{Error, Result};
use serde::de::DeserializeOwned;

use crate::backend::BodyStream;

/// Lazily decodes one JSON value per line of a body stream.
///
/// Lines are split on `\n` (a trailing `\r` is dropped) at the byte level,
/// so multi-byte characters spanning chunk boundaries are reassembled
/// before decoding. A trailing line without a newline is decoded when the
/// body ends. Blank lines are skipped.
///
/// A line that fails to decode yields `Err(Error::Protocol)` and decoding
/// continues with the next line. An error from the body itself is yielded
/// once and ends the stream.
pub struct NdjsonStream<T> {
    body: Option<BodyStream>,
    buffer: BytesMut,
    lines: VecDeque<Bytes>,
    _item: PhantomData<fn() -> T>,
}

impl<T> NdjsonStream<T> {
    pub fn new(body: BodyStream) -> Self {
        Self {
            body: Some(body),
            buffer: BytesMut::new(),
            lines: VecDeque::new(),
            _item: PhantomData,
        }
    }

    fn split_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line = self.buffer.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            if !is_blank(&line) {
                self.lines.push_back(line.freeze());
            }
        }
    }

    fn flush_remainder(&mut self) {
        let rest = self.buffer.split();
        if !is_blank(&rest) {
            self.lines.push_back(rest.freeze());
        }
    }
}

impl<T: DeserializeOwned> Stream for NdjsonStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(line) = this.lines.pop_front() {
                return Poll::Ready(Some(decode_line(&line)));
            }
            let Some(body) = this.body.as_mut() else {
                return Poll::Ready(None);
            };
            match body.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    this.buffer.extend_from_slice(&chunk);
                    this.split_lines();
                }
                Poll::Ready(Some(Err(err))) => {
                    this.body = None;
                    this.buffer.clear();
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.body = None;
                    this.flush_remainder();
                }
            }
        }
    }
}

fn decode_line<T: DeserializeOwned>(line: &[u8]) -> Result<T> {
    serde_json::from_slice(line).map_err(|err| {
        Error::protocol(format!(
            "invalid ndjson line {:?}: {err}",
            String::from_utf8_lossy(line)
        ))
    })
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}
