//! Which topics are subscribed, by which handlers, and how to stop them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use ipfs_rpc_core::{CancellationToken, Error, Result};
use tracing::debug;

use crate::handler::SubscriptionHandler;

struct Subscription {
    id: u64,
    handler: SubscriptionHandler,
    token: CancellationToken,
}

/// A fresh registration returned by [`SubscriptionTracker::subscribe`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub(crate) id: u64,
    /// Cancelled when this `(topic, handler)` pair is unsubscribed. Pass it
    /// as the signal of the request that carries the subscription.
    pub token: CancellationToken,
}

/// Registry of active subscriptions, keyed by topic.
///
/// Holds at most one entry per `(topic, handler)`. A topic whose last
/// entry is removed disappears from the map. Clones share state.
#[derive(Clone, Default)]
pub struct SubscriptionTracker {
    topics: Arc<DashMap<String, Vec<Subscription>>>,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for SubscriptionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionTracker")
            .field("topics", &self.topics())
            .finish()
    }
}

impl SubscriptionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `topic`.
    ///
    /// Fails with [`Error::DuplicateSubscription`] if the pair is already
    /// registered. When `external` is given, cancelling it unsubscribes this
    /// registration (and only this one); that link runs on the current
    /// tokio runtime.
    pub fn subscribe(
        &self,
        topic: &str,
        handler: &SubscriptionHandler,
        external: Option<CancellationToken>,
    ) -> Result<Registration> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        {
            let mut entries = self.topics.entry(topic.to_string()).or_default();
            if entries.iter().any(|s| s.handler == *handler) {
                return Err(Error::DuplicateSubscription {
                    topic: topic.to_string(),
                });
            }
            entries.insert(
                0,
                Subscription {
                    id,
                    handler: handler.clone(),
                    token: token.clone(),
                },
            );
        }
        debug!(topic, id, "subscription registered");

        if let Some(external) = external {
            let tracker = self.clone();
            let topic = topic.to_string();
            let own = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = external.cancelled() => {
                        debug!(%topic, id, "external signal fired");
                        tracker.remove(&topic, id);
                    }
                    _ = own.cancelled() => {}
                }
            });
        }

        Ok(Registration { id, token })
    }

    /// Removes the entries for `topic` that match `handler`, or all of them
    /// when `handler` is `None`, and cancels each one. Unknown topics are a
    /// no-op.
    pub fn unsubscribe(&self, topic: &str, handler: Option<&SubscriptionHandler>) {
        let removed = self.take(topic, |s| handler.is_none_or(|h| s.handler == *h));
        if !removed.is_empty() {
            debug!(topic, count = removed.len(), "unsubscribed");
        }
        for subscription in removed {
            subscription.token.cancel();
        }
    }

    /// Removes and cancels a single registration. Returns whether it was
    /// still present.
    pub(crate) fn remove(&self, topic: &str, id: u64) -> bool {
        let removed = self.take(topic, |s| s.id == id);
        for subscription in &removed {
            subscription.token.cancel();
        }
        !removed.is_empty()
    }

    fn take(&self, topic: &str, matches: impl Fn(&Subscription) -> bool) -> Vec<Subscription> {
        let removed = match self.topics.get_mut(topic) {
            Some(mut entries) => {
                let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *entries)
                    .into_iter()
                    .partition(|s| matches(s));
                *entries = kept;
                taken
            }
            None => Vec::new(),
        };
        self.topics.remove_if(topic, |_, entries| entries.is_empty());
        removed
    }

    pub fn is_subscribed(&self, topic: &str, handler: &SubscriptionHandler) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|entries| entries.iter().any(|s| s.handler == *handler))
    }

    /// Topics with at least one subscription.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.iter().map(|e| e.key().clone()).collect();
        topics.sort();
        topics
    }

    /// Number of handlers subscribed to `topic`.
    pub fn handler_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |entries| entries.len())
    }
}
