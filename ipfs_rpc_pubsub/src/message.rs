//! Decoding of the daemon's pub/sub message lines.
//!
//! Every binary field arrives multibase-wrapped (see [`ipfs_rpc_core::wire`]):
//!
//! ```json
//! {"from":"12D3Koo...","data":"uaGVsbG8","seqno":"uF2Ht_xxxxw","topicIDs":["udA"],
//!  "key":"u...","signature":"u..."}
//! ```

use ipfs_rpc_core::wire::{decode_big_uint, decode_bytes, decode_text};
use ipfs_rpc_core::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    /// Peer id of the publisher.
    pub from: String,
    pub data: Vec<u8>,
    pub sequence_number: u64,
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedMessage {
    pub data: Vec<u8>,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubsubMessage {
    Signed(SignedMessage),
    Unsigned(UnsignedMessage),
}

impl PubsubMessage {
    pub fn data(&self) -> &[u8] {
        match self {
            PubsubMessage::Signed(m) => &m.data,
            PubsubMessage::Unsigned(m) => &m.data,
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            PubsubMessage::Signed(m) => &m.topic,
            PubsubMessage::Unsigned(m) => &m.topic,
        }
    }

    /// Decodes one line of a `pubsub/sub` stream.
    ///
    /// Lines carrying both `from` and `seqno` are signed messages; everything
    /// else is treated as unsigned.
    pub fn from_json(value: Value) -> Result<Self> {
        let raw: RawMessage = serde_json::from_value(value)
            .map_err(|err| Error::protocol(format!("malformed pubsub message: {err}")))?;
        raw.decode()
    }
}

#[derive(Deserialize)]
struct RawMessage {
    from: Option<String>,
    data: Option<String>,
    seqno: Option<String>,
    #[serde(rename = "topicIDs", alias = "topics", default)]
    topic_ids: Vec<String>,
    key: Option<String>,
    signature: Option<String>,
}

impl RawMessage {
    fn decode(self) -> Result<PubsubMessage> {
        let topic = match self.topic_ids.first() {
            Some(topic) => decode_text(topic)?,
            None => return Err(Error::protocol("pubsub message without a topic")),
        };
        let data = match &self.data {
            Some(data) => decode_bytes(data)?,
            None => Vec::new(),
        };

        let (Some(from), Some(seqno)) = (self.from, self.seqno) else {
            return Ok(PubsubMessage::Unsigned(UnsignedMessage { data, topic }));
        };

        Ok(PubsubMessage::Signed(SignedMessage {
            sequence_number: decode_big_uint(&seqno)?,
            key: self.key.as_deref().map(decode_bytes).transpose()?,
            signature: decode_bytes(self.signature.as_deref().unwrap_or("u"))?,
            from,
            data,
            topic,
        }))
    }
}
