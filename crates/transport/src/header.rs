//! HTTP header map.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Header map with case-insensitive keys and redaction support.
///
/// Keys are stored lowercase, which is also the form request signing needs.
/// Keys marked redacted render as `<redacted>` when the map is formatted for
/// an error message or log line; the values themselves stay intact for the
/// wire.
#[derive(Clone, Debug, Default)]
pub struct HttpHeader {
    values: BTreeMap<String, String>,
    redact: BTreeSet<String>,
}

impl HttpHeader {
    /// Creates an empty header map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing any existing value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Returns a header value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// Marks a key as sensitive for rendering.
    pub fn redact(&mut self, key: impl Into<String>) -> &mut Self {
        self.redact.insert(key.into().to_ascii_lowercase());
        self
    }

    /// Iterates headers in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Sorted keys, as used for signed-header lists.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    /// True when no headers are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for HttpHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;

        for (key, value) in &self.values {
            if !first {
                writeln!(f)?;
            }
            first = false;

            if self.redact.contains(key) {
                write!(f, "{key}: <redacted>")?;
            } else {
                write!(f, "{key}: {value}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_case_insensitive() {
        let mut header = HttpHeader::new();
        header.put("Content-Length", "42");

        assert_eq!(header.get("content-length"), Some("42"));
        assert_eq!(header.get("CONTENT-LENGTH"), Some("42"));
        assert_eq!(header.keys(), vec!["content-length"]);
    }

    #[test]
    fn redacted_keys_hide_values_in_display() {
        let mut header = HttpHeader::new();
        header.put("host", "bucket.s3.amazonaws.com");
        header.put("authorization", "AWS4-HMAC-SHA256 secret");
        header.redact("Authorization");

        let rendered = header.to_string();
        assert!(rendered.contains("authorization: <redacted>"));
        assert!(rendered.contains("host: bucket.s3.amazonaws.com"));
        assert!(!rendered.contains("secret"));

        // The wire value is untouched
        assert_eq!(header.get("authorization"), Some("AWS4-HMAC-SHA256 secret"));
    }
}
