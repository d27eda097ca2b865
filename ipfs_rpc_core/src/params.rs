//! Query-string parameters for RPC calls.
//!
//! The daemon takes every argument on the query string: positional values as
//! repeated `arg` keys (order matters) and flags under kebab-case names.
//! Callers build a [`SearchParams`] with camelCase keys; the transform into
//! wire form happens once, in [`SearchParams::to_wire_pairs`].

use std::time::Duration;

use url::form_urlencoded;

use crate::input::{Mode, Mtime};

/// Keys that carry transport-level concerns and never reach the daemon
/// under their own name.
const SIGNAL_KEY: &str = "signal";
const TIMEOUT_KEY: &str = "timeout";

/// Ordered multimap of query parameters. Repeated keys are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    pairs: Vec<(String, String)>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pair. Existing pairs with the same key are kept.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.append(key, value.to_string());
        self
    }

    /// Appends `key` only when `value` is present.
    pub fn with_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    /// Appends one positional argument.
    pub fn arg(self, value: impl Into<String>) -> Self {
        self.with("arg", value.into())
    }

    /// Appends positional arguments in iteration order.
    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.append("arg", value);
        }
        self
    }

    /// The daemon calls the hash algorithm flag `hash`.
    pub fn hash_alg(self, alg: impl Into<String>) -> Self {
        self.with("hash", alg.into())
    }

    pub fn mode(self, mode: Mode) -> Self {
        self.with("mode", mode.to_octal_string())
    }

    pub fn mtime(self, mtime: Mtime) -> Self {
        self.with("mtime", mtime.secs)
            .with_opt("mtimeNsecs", mtime.nsecs)
    }

    /// Daemon-side timeout for the call, in milliseconds.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.with(TIMEOUT_KEY, timeout.as_millis())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.iter().filter(move |(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Pairs as they go on the wire.
    ///
    /// Keys become kebab-case, `signal` is dropped, and `timeout` survives
    /// only as a numeric value rewritten to `"<n>ms"`. Values spelled
    /// `undefined`/`null` are dropped.
    pub fn to_wire_pairs(&self) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(self.pairs.len());
        for (key, value) in &self.pairs {
            if key == SIGNAL_KEY || value == "undefined" || value == "null" {
                continue;
            }
            if key == TIMEOUT_KEY {
                if let Some(ms) = numeric_timeout(value) {
                    out.push((TIMEOUT_KEY.to_string(), format!("{ms}ms")));
                }
                continue;
            }
            out.push((kebab_case(key), value.clone()));
        }
        out
    }

    /// Wire pairs serialized as `application/x-www-form-urlencoded`.
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.to_wire_pairs() {
            serializer.append_pair(&key, &value);
        }
        serializer.finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SearchParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = SearchParams::new();
        for (k, v) in iter {
            params.append(k, v);
        }
        params
    }
}

fn numeric_timeout(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let parsed: f64 = trimmed.parse().ok()?;
    if !parsed.is_finite() || parsed < 0.0 {
        return None;
    }
    Some(trimmed.to_string())
}

/// `cidVersion` -> `cid-version`. Keys that are already kebab-case pass
/// through unchanged.
pub fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kebab_case_conversion() {
        assert_eq!(kebab_case("cidVersion"), "cid-version");
        assert_eq!(kebab_case("rawLeaves"), "raw-leaves");
        assert_eq!(kebab_case("mtimeNsecs"), "mtime-nsecs");
        assert_eq!(kebab_case("wrap-with-directory"), "wrap-with-directory");
        assert_eq!(kebab_case("arg"), "arg");
        assert_eq!(kebab_case("Quiet"), "quiet");
    }

    #[test]
    fn keys_are_rewritten_and_signal_is_dropped() {
        let params = SearchParams::new()
            .with("cidVersion", 1)
            .with("signal", "[object AbortSignal]")
            .with("rawLeaves", true);
        let wire = params.to_wire_pairs();
        assert_eq!(
            wire,
            vec![
                ("cid-version".to_string(), "1".to_string()),
                ("raw-leaves".to_string(), "true".to_string()),
            ]
        );
        assert!(!params.to_query_string().contains("signal"));
    }

    #[test]
    fn numeric_timeout_becomes_milliseconds() {
        let params = SearchParams::new().timeout(Duration::from_secs(2));
        assert_eq!(params.to_query_string(), "timeout=2000ms");

        let params = SearchParams::new().with("timeout", "soon");
        assert_eq!(params.to_query_string(), "");
    }

    #[test]
    fn args_are_appended_in_order() {
        let params = SearchParams::new()
            .arg("QmFirst")
            .with("recursive", true)
            .args(["QmSecond", "QmThird"]);
        assert_eq!(
            params.get_all("arg").collect::<Vec<_>>(),
            vec!["QmFirst", "QmSecond", "QmThird"]
        );
        assert_eq!(
            params.to_query_string(),
            "arg=QmFirst&recursive=true&arg=QmSecond&arg=QmThird"
        );
    }

    #[test]
    fn empty_args_produce_no_entries() {
        let params = SearchParams::new().args(Vec::<String>::new());
        assert_eq!(params.get_all("arg").count(), 0);
        assert_eq!(params.to_query_string(), "");
    }

    #[test]
    fn null_like_values_are_dropped() {
        let params = SearchParams::new().with("pin", "undefined").with("progress", "null");
        assert!(params.to_wire_pairs().is_empty());
    }

    #[test]
    fn mode_mtime_and_hash_are_expanded() {
        let params = SearchParams::new()
            .mode(Mode::new(0o644))
            .mtime(Mtime::new(5, Some(7)))
            .hash_alg("sha2-512");
        assert_eq!(
            params.to_query_string(),
            "mode=0644&mtime=5&mtime-nsecs=7&hash=sha2-512"
        );
    }
}
