//! Minimal XML element tree.
//!
//! Object-store responses are small XML documents; callers need element
//! lookup and text extraction, nothing more. No namespaces, no XPath, no DTD
//! validation. The tree is built with `quick-xml` and invalid input raises
//! `FormatError`.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};

/// Parsed XML document.
#[derive(Clone, Debug)]
pub struct XmlDocument {
    root: XmlNode,
}

/// Element node: name, attributes, child elements, and text content.
#[derive(Clone, Debug, Default)]
pub struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
    text: String,
}

impl XmlDocument {
    /// Parses a document from raw bytes.
    pub fn from_bytes(content: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(content);
        let mut stack: Vec<XmlNode> = Vec::new();
        let mut buffer = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buffer)
                .map_err(|error| Error::format(format!("invalid xml: {error}")))?;

            match event {
                Event::Start(start) => {
                    let mut node = XmlNode {
                        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
                        ..XmlNode::default()
                    };

                    for attribute in start.attributes() {
                        let attribute = attribute
                            .map_err(|error| Error::format(format!("invalid xml attribute: {error}")))?;
                        let value = attribute
                            .unescape_value()
                            .map_err(|error| Error::format(format!("invalid xml attribute: {error}")))?;

                        node.attributes.push((
                            String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned(),
                            value.into_owned(),
                        ));
                    }

                    stack.push(node);
                }
                Event::Empty(start) => {
                    let node = XmlNode {
                        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
                        ..XmlNode::default()
                    };

                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => return Ok(Self { root: node }),
                    }
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| Error::format("unbalanced xml end tag"))?;

                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => return Ok(Self { root: node }),
                    }
                }
                Event::Text(text) => {
                    if let Some(node) = stack.last_mut() {
                        let text = text
                            .unescape()
                            .map_err(|error| Error::format(format!("invalid xml text: {error}")))?;
                        node.text.push_str(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => {
                    return Err(Error::format("xml document has no root element"));
                }
                // Declarations, comments, and processing instructions are skipped
                _ => {}
            }

            buffer.clear();
        }
    }

    /// Returns the root element.
    #[must_use]
    pub const fn root(&self) -> &XmlNode {
        &self.root
    }
}

impl XmlNode {
    /// Element name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All child elements named `name`, in document order.
    #[must_use]
    pub fn children(&self, name: &str) -> Vec<&XmlNode> {
        self.children.iter().filter(|child| child.name == name).collect()
    }

    /// First child element named `name`.
    ///
    /// With `required` set, a missing child is a `FormatError`.
    pub fn child(&self, name: &str, required: bool) -> Result<Option<&XmlNode>> {
        let child = self.children.iter().find(|child| child.name == name);

        if required && child.is_none() {
            return Err(Error::format(format!(
                "unable to find child '{name}' in element '{}'",
                self.name
            )));
        }

        Ok(child)
    }

    /// Attribute value by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Concatenated text content of this element.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>repo</Name>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>path/to/test1.txt</Key><Size>787</Size></Contents>
  <Contents><Key>path/to/test2.txt</Key><Size>11</Size></Contents>
  <CommonPrefixes><Prefix>path/to/sub/</Prefix></CommonPrefixes>
</ListBucketResult>"#;

    #[test]
    fn parses_element_tree() {
        let document = XmlDocument::from_bytes(LIST_RESPONSE.as_bytes()).expect("parse");
        let root = document.root();

        assert_eq!(root.name(), "ListBucketResult");
        assert_eq!(root.children("Contents").len(), 2);
        assert_eq!(
            root.children("Contents")[0]
                .child("Key", true)
                .expect("key present")
                .expect("key node")
                .text(),
            "path/to/test1.txt"
        );
        assert_eq!(
            root.child("IsTruncated", true)
                .expect("present")
                .expect("node")
                .text(),
            "false"
        );
    }

    #[test]
    fn required_child_missing_is_format_error() {
        let document = XmlDocument::from_bytes(b"<a><b/></a>").expect("parse");

        assert!(document.root().child("b", true).expect("present").is_some());
        let error = document.root().child("c", true).expect_err("missing");
        assert_eq!(error.kind(), crate::ErrorKind::Format);
        assert!(document.root().child("c", false).expect("optional").is_none());
    }

    #[test]
    fn text_is_unescaped() {
        let document =
            XmlDocument::from_bytes(b"<Key>path&amp;name</Key>").expect("parse");
        assert_eq!(document.root().text(), "path&name");
    }

    #[test]
    fn attributes_are_available() {
        let document =
            XmlDocument::from_bytes(br#"<Error code="AccessDenied">denied</Error>"#).expect("parse");
        assert_eq!(document.root().attribute("code"), Some("AccessDenied"));
        assert_eq!(document.root().attribute("other"), None);
    }

    #[test]
    fn invalid_xml_is_format_error() {
        let error = XmlDocument::from_bytes(b"<a><b></a>").expect_err("mismatched tags");
        assert_eq!(error.kind(), crate::ErrorKind::Format);

        let error = XmlDocument::from_bytes(b"").expect_err("empty");
        assert_eq!(error.kind(), crate::ErrorKind::Format);
    }
}
