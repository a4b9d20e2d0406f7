//! Core card types shared by the reader, rewriter and writers

use serde::Serialize;
use std::fmt;
use std::path::Path;

/// A markup element kept verbatim from the raw export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    /// Tag name
    pub name: String,
    /// Attributes in document order (unescaped values)
    pub attributes: Vec<(String, String)>,
    /// Child nodes in document order
    pub children: Vec<Node>,
}

impl Element {
    /// Create an element with no attributes or children
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style helper to add a text child
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Builder-style helper to add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Concatenated text of direct text children
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Find an attribute value, ignoring ASCII case of the key
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing key that matches ignoring ASCII case
    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    /// Direct child elements
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First direct child element with the given name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }
}

/// A child node of an [`Element`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// One card as read from the raw export
///
/// Immutable once read. The rewriter derives a [`RewrittenRecord`] from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardRecord {
    /// Human-readable card name, may contain any Unicode
    pub display_name: String,
    /// Image filename as emitted by the raw exporter
    pub raw_image_ref: String,
    /// Every other child element of the card, in document order
    pub metadata: Vec<Element>,
}

impl CardRecord {
    /// Create a record
    pub fn new(
        display_name: impl Into<String>,
        raw_image_ref: impl Into<String>,
        metadata: Vec<Element>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            raw_image_ref: raw_image_ref.into(),
            metadata,
        }
    }

    /// Extension of the raw image reference, without the dot
    pub fn image_extension(&self) -> Option<&str> {
        Path::new(&self.raw_image_ref)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
    }
}

/// A filesystem- and attribute-safe name derived from a display name
///
/// Only [`crate::sanitize::sanitize`] constructs these, so a `SafeToken` is
/// never empty and only contains `[A-Za-z0-9 _-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SafeToken(String);

impl SafeToken {
    pub(crate) fn new_unchecked(token: String) -> Self {
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filename for this token with the given extension
    pub fn file_name(&self, extension: Option<&str>) -> String {
        match extension {
            Some(ext) => format!("{}.{}", self.0, ext),
            None => self.0.clone(),
        }
    }
}

impl AsRef<str> for SafeToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SafeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A card record with its safe token assigned
#[derive(Debug, Clone, Serialize)]
pub struct RewrittenRecord {
    /// The record as read
    pub record: CardRecord,
    /// Token derived from the display name
    pub safe_token: SafeToken,
    /// Destination image filename (`safe_token` plus the raw extension)
    pub image_file: String,
}

impl RewrittenRecord {
    pub fn display_name(&self) -> &str {
        &self.record.display_name
    }
}

/// Document-level information carried from the export to the output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetHeader {
    /// `version` attribute of the export's root element
    pub schema_version: Option<String>,
    /// `<set>` definitions from the export's `<sets>` block
    pub set_definitions: Vec<Element>,
}

impl SetHeader {
    /// Code of the first set definition, if any
    pub fn primary_set_code(&self) -> Option<String> {
        self.set_definitions
            .first()
            .and_then(|s| s.child("name"))
            .map(|n| n.text().trim().to_string())
            .filter(|code| !code.is_empty())
    }
}

/// The ordered cards of one export plus its header
#[derive(Debug, Clone, Default)]
pub struct CardSet {
    pub header: SetHeader,
    /// Cards in export order
    pub records: Vec<CardRecord>,
}

impl CardSet {
    /// Get the number of cards
    pub fn card_count(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extension() {
        let card = CardRecord::new("Bolt", "Bolt.full.png", Vec::new());
        assert_eq!(card.image_extension(), Some("png"));

        let card = CardRecord::new("Bolt", "Bolt", Vec::new());
        assert_eq!(card.image_extension(), None);

        let card = CardRecord::new("Mr. Smith", "Mr. Smith", Vec::new());
        assert_eq!(card.image_extension(), None);
    }

    #[test]
    fn test_attribute_lookup_ignores_case() {
        let mut set = Element::new("set").with_attribute("picURL", "a.jpg");
        assert_eq!(set.attribute("picurl"), Some("a.jpg"));

        set.set_attribute("picurl", "b.jpg");
        assert_eq!(set.attributes, vec![("picURL".to_string(), "b.jpg".to_string())]);
    }

    #[test]
    fn test_element_text_skips_children() {
        let mut prop = Element::new("prop").with_text("a");
        prop.children.push(Node::Element(Element::new("type").with_text("x")));
        prop.children.push(Node::Text("b".to_string()));
        assert_eq!(prop.text(), "ab");
        assert_eq!(prop.child("type").map(|t| t.text()), Some("x".to_string()));
    }

    #[test]
    fn test_primary_set_code() {
        let header = SetHeader {
            schema_version: None,
            set_definitions: vec![Element::new("set")],
        };
        assert_eq!(header.primary_set_code(), None);

        let mut def = Element::new("set");
        def.children.push(Node::Element(Element::new("name").with_text(" CHB ")));
        let header = SetHeader {
            schema_version: Some("3".to_string()),
            set_definitions: vec![def],
        };
        assert_eq!(header.primary_set_code(), Some("CHB".to_string()));
    }
}
