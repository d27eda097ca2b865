//! The long-lived `pubsub/sub` stream behind one subscription.
//!
//! A subscription moves through registering, opening the stream, streaming
//! and ended. Registering fails fast on a duplicate `(topic, handler)`
//! pair before any request is made. Whatever ends the stream (unsubscribe,
//! an external signal, the daemon closing it, a fatal error) the pair is
//! removed from the tracker exactly once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use ipfs_rpc_client::{RequestOptions, Response, Transport};
use ipfs_rpc_core::wire::encode_text;
use ipfs_rpc_core::{CancellationToken, Error, Result, SearchParams};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::handler::SubscriptionHandler;
use crate::message::PubsubMessage;
use crate::tracker::SubscriptionTracker;

/// Whether a reported error ended the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A single line was skipped; the stream continues.
    NotFatal,
    /// The stream ended because of this error.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::NotFatal => "not fatal",
            Severity::Fatal => "fatal",
        })
    }
}

pub type ErrorCallback = Arc<dyn Fn(&Error, Severity) + Send + Sync>;

#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// Cancelling this unsubscribes the handler.
    pub signal: Option<CancellationToken>,
    /// Receives per-line decode errors and stream failures. Defaults to
    /// logging them.
    pub on_error: Option<ErrorCallback>,
    /// If set and the stream has not opened within this period, `subscribe`
    /// returns `Ok` anyway and the stream keeps opening in the background.
    /// Failures after that point only reach `on_error`.
    pub grace_period: Option<Duration>,
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("signal", &self.signal)
            .field("on_error", &self.on_error.is_some())
            .field("grace_period", &self.grace_period)
            .finish()
    }
}

fn log_error(err: &Error, severity: Severity) {
    match severity {
        Severity::NotFatal => warn!("pubsub: {err} ({severity})"),
        Severity::Fatal => error!("pubsub: {err} ({severity})"),
    }
}

/// Removes the registration when the stream task ends, however it ends.
struct Cleanup {
    tracker: SubscriptionTracker,
    topic: String,
    id: u64,
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        if self.tracker.remove(&self.topic, self.id) {
            debug!(topic = %self.topic, id = self.id, "subscription stream ended");
        }
    }
}

/// Subscribes `handler` to `topic` and resolves once the stream is open
/// (or the grace period passed).
pub(crate) async fn subscribe(
    transport: &Transport,
    tracker: &SubscriptionTracker,
    topic: &str,
    handler: SubscriptionHandler,
    options: SubscribeOptions,
) -> Result<()> {
    let registration = tracker.subscribe(topic, &handler, options.signal)?;
    let on_error: ErrorCallback = match options.on_error {
        Some(on_error) => on_error,
        None => Arc::new(log_error),
    };

    let cleanup = Cleanup {
        tracker: tracker.clone(),
        topic: topic.to_string(),
        id: registration.id,
    };
    let request = RequestOptions::new()
        .params(SearchParams::new().arg(encode_text(topic)))
        .signal(registration.token);
    let transport = transport.clone();
    let (opened_tx, opened_rx) = oneshot::channel();

    tokio::spawn(async move {
        let response = match transport.post("pubsub/sub", request).await {
            Ok(response) => response,
            Err(err) => {
                drop(cleanup);
                if let Err(Err(err)) = opened_tx.send(Err(err)) {
                    // Nobody is waiting any more; report it like a stream failure.
                    if !err.is_abort() {
                        on_error(&err, Severity::Fatal);
                    }
                }
                return;
            }
        };
        let _ = opened_tx.send(Ok(()));
        read_messages(response, &handler, &on_error).await;
        drop(cleanup);
    });

    let opened = match options.grace_period {
        Some(grace) => match tokio::time::timeout(grace, opened_rx).await {
            Ok(opened) => opened,
            Err(_) => {
                debug!(topic, "stream not open after {grace:?}; assuming subscribed");
                return Ok(());
            }
        },
        None => opened_rx.await,
    };
    opened.unwrap_or_else(|_| Err(Error::protocol("subscription task ended before the stream opened")))
}

async fn read_messages(response: Response, handler: &SubscriptionHandler, on_error: &ErrorCallback) {
    let mut lines = response.ndjson::<Value>();
    while let Some(line) = lines.next().await {
        match line {
            Ok(value) => {
                if value.get("from").is_none_or(Value::is_null) {
                    continue;
                }
                match PubsubMessage::from_json(value) {
                    Ok(message) => handler.handle(message),
                    Err(err) => on_error(&err, Severity::NotFatal),
                }
            }
            Err(err) if err.is_abort() => break,
            Err(err @ Error::Protocol(_)) => on_error(&err, Severity::NotFatal),
            Err(err) => {
                on_error(&err, Severity::Fatal);
                break;
            }
        }
    }
}
