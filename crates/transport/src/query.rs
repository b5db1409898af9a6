//! Query string construction.

use std::collections::BTreeMap;
use std::fmt;

/// Characters that survive URI encoding unescaped.
fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

/// Percent-encodes `input` for use in a URI.
///
/// With `path` set, `/` is left unescaped so object keys keep their shape in
/// the request line.
#[must_use]
pub fn uri_encode(input: &str, path: bool) -> String {
    let mut encoded = String::with_capacity(input.len());

    for &byte in input.as_bytes() {
        if is_unreserved(byte) || (path && byte == b'/') {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    encoded
}

/// Query parameters rendered in sorted key order.
///
/// Sorted rendering is what request signing requires; it also makes request
/// logs stable.
#[derive(Clone, Debug, Default)]
pub struct HttpQuery {
    values: BTreeMap<String, String>,
}

impl HttpQuery {
    /// Creates an empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing any existing value for the key.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Returns a parameter value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// True when no parameters are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Renders `key=value&...` with both sides URI-encoded, sorted by key.
    #[must_use]
    pub fn render(&self) -> String {
        let mut rendered = String::new();

        for (key, value) in &self.values {
            if !rendered.is_empty() {
                rendered.push('&');
            }

            rendered.push_str(&uri_encode(key, false));
            rendered.push('=');
            rendered.push_str(&uri_encode(value, false));
        }

        rendered
    }
}

impl fmt::Display for HttpQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_sorted_and_encoded() {
        let mut query = HttpQuery::new();
        query.put("list-type", "2");
        query.put("prefix", "path/to/");
        query.put("delimiter", "/");

        assert_eq!(
            query.render(),
            "delimiter=%2F&list-type=2&prefix=path%2Fto%2F"
        );
    }

    #[test]
    fn encodes_reserved_bytes() {
        assert_eq!(uri_encode("a b&c=d", false), "a%20b%26c%3Dd");
        assert_eq!(uri_encode("path/to/file.txt", true), "path/to/file.txt");
        assert_eq!(uri_encode("path/to/file.txt", false), "path%2Fto%2Ffile.txt");
        assert_eq!(uri_encode("fi&le.txt", true), "fi%26le.txt");
    }

    #[test]
    fn empty_query_renders_empty() {
        assert_eq!(HttpQuery::new().render(), "");
        assert!(HttpQuery::new().is_empty());
    }
}
