use std::fmt;
use std::sync::Arc;

use crate::message::PubsubMessage;

/// Receives the messages of one subscription.
///
/// Implemented for every `Fn(PubsubMessage)`, so a closure works as well as
/// a type with its own state.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle_message(&self, message: PubsubMessage);
}

impl<F> MessageHandler for F
where
    F: Fn(PubsubMessage) + Send + Sync + 'static,
{
    fn handle_message(&self, message: PubsubMessage) {
        self(message)
    }
}

/// A shared handler with identity semantics.
///
/// Two `SubscriptionHandler`s are equal only if they are clones of the
/// same handle, which is what makes `(topic, handler)` a usable key for
/// subscribe and unsubscribe.
#[derive(Clone)]
pub struct SubscriptionHandler(Arc<dyn MessageHandler>);

impl SubscriptionHandler {
    pub fn new(handler: impl MessageHandler) -> Self {
        Self(Arc::new(handler))
    }

    pub fn from_arc(handler: Arc<dyn MessageHandler>) -> Self {
        Self(handler)
    }

    pub fn handle(&self, message: PubsubMessage) {
        self.0.handle_message(message)
    }
}

impl PartialEq for SubscriptionHandler {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl Eq for SubscriptionHandler {}

impl fmt::Debug for SubscriptionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionHandler({:p})", Arc::as_ptr(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::UnsignedMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl MessageHandler for Counter {
        fn handle_message(&self, _message: PubsubMessage) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn identity_not_structure() {
        let a = SubscriptionHandler::new(|_m: PubsubMessage| {});
        let b = SubscriptionHandler::new(|_m: PubsubMessage| {});
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn stateful_handlers() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let handler = SubscriptionHandler::from_arc(counter.clone());
        handler.handle(PubsubMessage::Unsigned(UnsignedMessage {
            data: vec![],
            topic: "t".into(),
        }));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
