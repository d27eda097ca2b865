use bytes::Bytes;
use ipfs_rpc_client::{CallOptions, RequestOptions, Transport, multipart_request};
use ipfs_rpc_core::wire::{decode_text_array, encode_text};
use ipfs_rpc_core::{CancellationToken, Content, ImportSource, Result, SearchParams};
use serde::Deserialize;

use crate::handler::SubscriptionHandler;
use crate::subscribe::{SubscribeOptions, subscribe};
use crate::tracker::SubscriptionTracker;

#[derive(Deserialize)]
struct StringList {
    #[serde(rename = "Strings", default)]
    strings: Option<Vec<String>>,
}

/// The daemon's `pubsub/*` commands.
///
/// Clones share the same subscriptions.
#[derive(Debug, Clone)]
pub struct PubsubApi {
    transport: Transport,
    tracker: SubscriptionTracker,
}

impl PubsubApi {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            tracker: SubscriptionTracker::new(),
        }
    }

    pub fn tracker(&self) -> &SubscriptionTracker {
        &self.tracker
    }

    /// Delivers every message published to `topic` to `handler` until it is
    /// unsubscribed, `options.signal` fires, or the daemon ends the stream.
    ///
    /// Subscribing the same handler to the same topic twice fails with
    /// [`ipfs_rpc_core::Error::DuplicateSubscription`].
    pub async fn subscribe(
        &self,
        topic: &str,
        handler: SubscriptionHandler,
        options: SubscribeOptions,
    ) -> Result<()> {
        subscribe(&self.transport, &self.tracker, topic, handler, options).await
    }

    /// Stops `handler`'s subscription to `topic`, or every subscription to
    /// it when `handler` is `None`.
    pub fn unsubscribe(&self, topic: &str, handler: Option<&SubscriptionHandler>) {
        self.tracker.unsubscribe(topic, handler)
    }

    pub async fn publish(&self, topic: &str, data: impl Into<Bytes>, options: CallOptions) -> Result<()> {
        let abort = CancellationToken::new();
        let body = multipart_request(ImportSource::Content(Content::Bytes(data.into())), abort.clone()).await?;
        let request = RequestOptions::new()
            .params(SearchParams::new().arg(encode_text(topic)))
            .multipart(body)?
            .signal(abort);

        self.transport
            .post("pubsub/pub", options.apply(request))
            .await?
            .bytes()
            .await?;
        Ok(())
    }

    /// Topics the daemon's node is subscribed to.
    pub async fn ls(&self, options: CallOptions) -> Result<Vec<String>> {
        let list: StringList = self
            .transport
            .post("pubsub/ls", options.apply(RequestOptions::new()))
            .await?
            .json()
            .await?;
        decode_text_array(&list.strings.unwrap_or_default())
    }

    /// Peers we are connected to that share `topic`, or any topic.
    pub async fn peers(&self, topic: Option<&str>, options: CallOptions) -> Result<Vec<String>> {
        let params = SearchParams::new().args(topic.map(encode_text));
        let list: StringList = self
            .transport
            .post("pubsub/peers", options.apply(RequestOptions::new().params(params)))
            .await?
            .json()
            .await?;
        Ok(list.strings.unwrap_or_default())
    }
}
