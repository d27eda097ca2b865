//! Composition of cancellation signals.
//!
//! A request is typically governed by more than one signal: the caller's own
//! token and an internal one the transport fires when its timeout elapses.
//! [`AnySignal`] merges them into a single [`CancellationToken`] that fires
//! on the first upstream trigger.

use futures::future::select_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A token that is cancelled as soon as any upstream token is cancelled.
///
/// Merging two or more upstream tokens spawns a small watcher task on the
/// current tokio runtime. The watcher is released by [`AnySignal::clear`] or
/// when the `AnySignal` is dropped, so long-lived processes do not
/// accumulate listeners on tokens that outlive the operation.
#[derive(Debug)]
pub struct AnySignal {
    token: CancellationToken,
    watcher: Option<JoinHandle<()>>,
}

impl AnySignal {
    pub fn new<I>(signals: I) -> Self
    where
        I: IntoIterator<Item = CancellationToken>,
    {
        let upstream: Vec<CancellationToken> = signals.into_iter().collect();

        if upstream.iter().any(CancellationToken::is_cancelled) {
            let token = CancellationToken::new();
            token.cancel();
            return Self {
                token,
                watcher: None,
            };
        }

        match upstream.len() {
            0 => Self {
                token: CancellationToken::new(),
                watcher: None,
            },
            // A child token already follows its single parent.
            1 => Self {
                token: upstream[0].child_token(),
                watcher: None,
            },
            _ => {
                let token = CancellationToken::new();
                let fired = token.clone();
                let watcher = tokio::spawn(async move {
                    let waits = upstream.iter().map(|s| Box::pin(s.cancelled()));
                    select_all(waits).await;
                    fired.cancel();
                });
                Self {
                    token,
                    watcher: Some(watcher),
                }
            }
        }
    }

    /// Composes `signal` (if any) with `extra`.
    pub fn with_optional(signal: Option<CancellationToken>, extra: CancellationToken) -> Self {
        Self::new(signal.into_iter().chain(std::iter::once(extra)))
    }

    /// The composed token. Clones observe the same cancellation state.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stops following the upstream tokens.
    ///
    /// The composed token keeps whatever state it has; later upstream
    /// cancellations no longer reach it.
    pub fn clear(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl Drop for AnySignal {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn fired(token: &CancellationToken) -> bool {
        tokio::time::timeout(Duration::from_millis(200), token.cancelled())
            .await
            .is_ok()
    }

    #[tokio::test]
    async fn fires_on_first_upstream() {
        let user = CancellationToken::new();
        let internal = CancellationToken::new();
        let any = AnySignal::new([user.clone(), internal.clone()]);
        assert!(!any.is_cancelled());

        internal.cancel();
        assert!(fired(any.token()).await);
        assert!(!user.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_upstream_fires_immediately() {
        let user = CancellationToken::new();
        user.cancel();
        let any = AnySignal::new([user, CancellationToken::new()]);
        assert!(any.is_cancelled());
    }

    #[tokio::test]
    async fn single_upstream_is_followed() {
        let user = CancellationToken::new();
        let any = AnySignal::with_optional(None, user.clone());
        user.cancel();
        assert!(any.is_cancelled());
    }

    #[tokio::test]
    async fn cancelling_composed_does_not_touch_upstream() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        let any = AnySignal::new([a.clone(), b.clone()]);
        any.token().cancel();
        assert!(!a.is_cancelled());
        assert!(!b.is_cancelled());
    }

    #[tokio::test]
    async fn cleared_signal_ignores_upstream() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        let mut any = AnySignal::new([a.clone(), b.clone()]);
        any.clear();
        // Let the aborted watcher unwind.
        tokio::task::yield_now().await;
        a.cancel();
        assert!(!fired(any.token()).await);
    }
}
