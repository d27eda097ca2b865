//! Pub/sub over the IPFS daemon's RPC API.
//!
//! Each subscription is one long-lived `pubsub/sub` request whose
//! newline-delimited body carries the topic's messages. The
//! [`SubscriptionTracker`] maps topics to their `(handler, cancellation
//! token)` pairs so that [`PubsubApi::unsubscribe`] can tear down exactly
//! the streams it names.
//!
//! ```ignore
//! use ipfs_rpc_pubsub::{PubsubApi, PubsubMessage, SubscribeOptions, SubscriptionHandler};
//!
//! let pubsub = PubsubApi::new(transport);
//! let handler = SubscriptionHandler::new(|msg: PubsubMessage| println!("{:?}", msg.data()));
//! pubsub.subscribe("news", handler.clone(), SubscribeOptions::default()).await?;
//! pubsub.publish("news", "hello", Default::default()).await?;
//! pubsub.unsubscribe("news", Some(&handler));
//! ```

mod api;
mod handler;
mod message;
mod subscribe;
mod tracker;

pub use api::PubsubApi;
pub use handler::{MessageHandler, SubscriptionHandler};
pub use message::{PubsubMessage, SignedMessage, UnsignedMessage};
pub use subscribe::{ErrorCallback, Severity, SubscribeOptions};
pub use tracker::{Registration, SubscriptionTracker};
