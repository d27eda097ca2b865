//! Re-hydration of decoded daemon JSON into richer values.
//!
//! The daemon answers with PascalCase keys, CIDs either as plain strings or
//! as `{"/": "<cid>"}` link objects, and multiaddrs as strings.

use cid::Cid;
use multiaddr::Multiaddr;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Lowercases the leading run of uppercase letters: `Hash` -> `hash`,
/// `CID` -> `cid`, `PublicKey` -> `publicKey`.
pub fn camel_key(key: &str) -> String {
    let upper_run = key
        .char_indices()
        .find(|(_, c)| !c.is_ascii_uppercase())
        .map(|(i, _)| i)
        .unwrap_or(key.len());
    let mut out = key[..upper_run].to_ascii_lowercase();
    out.push_str(&key[upper_run..]);
    out
}

/// Rewrites the top-level keys of a JSON object with [`camel_key`].
///
/// Non-object values are returned unchanged; nested objects keep their keys.
pub fn camel_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (camel_key(&k), v))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

/// Parses a CID from a string or a `{"/": "<cid>"}` link object.
pub fn to_cid(value: &Value) -> Result<Cid> {
    let text = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map
            .get("/")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol("link object without a \"/\" field"))?,
        other => return Err(Error::protocol(format!("expected a CID, got {other}"))),
    };
    text.parse::<Cid>()
        .map_err(|err| Error::protocol(format!("invalid CID {text:?}: {err}")))
}

pub fn to_multiaddr(text: &str) -> Result<Multiaddr> {
    text.parse::<Multiaddr>()
        .map_err(|err| Error::protocol(format!("invalid multiaddr {text:?}: {err}")))
}

/// Parses every string in `value`, which must be a JSON array (or null,
/// which the daemon sends for empty lists).
pub fn to_multiaddrs(value: &Value) -> Result<Vec<Multiaddr>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| Error::protocol("multiaddr entry is not a string"))
                    .and_then(to_multiaddr)
            })
            .collect(),
        other => Err(Error::protocol(format!("expected multiaddr list, got {other}"))),
    }
}
