//! Reader for the raw set export produced by the set editor
//!
//! The export is a markup document with an optional `<sets>` block and a
//! repeating `<card>` element. Cards are streamed, so large sets are never
//! held in memory as a document tree.

use crate::card::{CardRecord, CardSet, Element, Node, SetHeader};
use crate::error::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::{Path, PathBuf};

/// Extension assumed when the export names no image for a card
pub const DEFAULT_IMAGE_EXTENSION: &str = "jpg";

enum Source {
    File,
    Text(String),
}

/// Reader over one raw export document
///
/// Every call to [`ExportReader::records`] starts a fresh pass over the
/// document, so the record sequence can be consumed more than once.
pub struct ExportReader {
    path: PathBuf,
    source: Source,
    default_extension: String,
}

impl ExportReader {
    /// Read an export from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            source: Source::File,
            default_extension: DEFAULT_IMAGE_EXTENSION.to_string(),
        }
    }

    /// Read an export from a string (useful for testing)
    pub fn from_str(content: &str, source_name: &str) -> Self {
        Self {
            path: PathBuf::from(source_name),
            source: Source::Text(content.to_string()),
            default_extension: DEFAULT_IMAGE_EXTENSION.to_string(),
        }
    }

    /// Extension used when a card's image name must be derived from its display name
    pub fn with_default_extension(mut self, extension: impl Into<String>) -> Self {
        self.default_extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a lazy pass over the cards in document order
    pub fn records(&self) -> Result<CardRecords> {
        Ok(CardRecords {
            reader: self.markup_reader()?,
            buf: Vec::new(),
            path: self.path.clone(),
            default_extension: self.default_extension.clone(),
            index: 0,
            depth: 0,
            seen_root: false,
            done: false,
        })
    }

    /// Root schema version and the `<set>` definitions of the `<sets>` block
    pub fn header(&self) -> Result<SetHeader> {
        let mut reader = self.markup_reader()?;
        let mut buf = Vec::new();
        let mut header = SetHeader::default();
        let mut seen_root = false;

        loop {
            buf.clear();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) if e.name().as_ref() == b"sets" => {
                    let start = e.into_owned();
                    let sets = read_subtree(&mut reader, &start, &mut buf, &self.path)?;
                    header.set_definitions = sets.child_elements().cloned().collect();
                    return Ok(header);
                }
                Ok(Event::Start(e)) if !seen_root => {
                    seen_root = true;
                    let root = element_from_start(&reader, &e, &self.path)?;
                    header.schema_version = root.attribute("version").map(str::to_string);
                }
                Ok(Event::Eof) => return Ok(header),
                Ok(_) => {}
                Err(e) => return Err(malformed(&self.path, reader.error_position() as u64, e)),
            }
        }
    }

    /// Read the whole export into a [`CardSet`]
    pub fn read_set(&self) -> Result<CardSet> {
        let header = self.header()?;
        let records = self.records()?.collect::<Result<Vec<_>>>()?;

        log::info!(
            "read {} card(s) and {} set definition(s) from {}",
            records.len(),
            header.set_definitions.len(),
            self.path.display()
        );

        Ok(CardSet { header, records })
    }

    fn markup_reader(&self) -> Result<Reader<Box<dyn BufRead>>> {
        let input: Box<dyn BufRead> = match &self.source {
            Source::File => {
                let file = File::open(&self.path).map_err(|e| Error::FileRead {
                    path: self.path.clone(),
                    source: e,
                })?;
                Box::new(BufReader::new(file))
            }
            Source::Text(text) => Box::new(Cursor::new(text.clone().into_bytes())),
        };

        // Field text is kept verbatim; layout whitespace is dropped per element
        Ok(Reader::from_reader(input))
    }
}

/// Lazy iterator over the cards of an export
///
/// A card without a name yields [`Error::MissingField`] and the pass goes on
/// with the next card. Any other error ends the pass.
pub struct CardRecords {
    reader: Reader<Box<dyn BufRead>>,
    buf: Vec<u8>,
    path: PathBuf,
    default_extension: String,
    index: usize,
    depth: usize,
    seen_root: bool,
    done: bool,
}

impl CardRecords {
    fn next_record(&mut self) -> Result<Option<CardRecord>> {
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|e| malformed(&self.path, self.reader.error_position() as u64, e))?;

            match event {
                Event::Start(e) if e.name().as_ref() == b"card" => {
                    let start = e.into_owned();
                    self.seen_root = true;
                    self.index += 1;
                    let element = read_subtree(&mut self.reader, &start, &mut self.buf, &self.path)?;
                    return self.to_record(element).map(Some);
                }
                Event::Empty(e) if e.name().as_ref() == b"card" => {
                    self.index += 1;
                    return Err(Error::MissingField {
                        path: self.path.clone(),
                        index: self.index,
                        field: "name".to_string(),
                    });
                }
                Event::Start(_) => {
                    self.seen_root = true;
                    self.depth += 1;
                }
                Event::Empty(_) => self.seen_root = true,
                Event::End(_) => self.depth = self.depth.saturating_sub(1),
                Event::Eof => {
                    if !self.seen_root {
                        return Err(malformed(
                            &self.path,
                            self.reader.buffer_position() as u64,
                            "document has no root element",
                        ));
                    }
                    if self.depth != 0 {
                        return Err(malformed(
                            &self.path,
                            self.reader.buffer_position() as u64,
                            "unexpected end of document",
                        ));
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }

    fn to_record(&self, card: Element) -> Result<CardRecord> {
        let mut display_name = None;
        let mut metadata = Vec::new();

        for node in card.children {
            match node {
                Node::Element(e) if e.name == "name" => {
                    if display_name.is_none() {
                        display_name = Some(e.text().trim().to_string());
                    } else {
                        log::warn!(
                            "card #{} has more than one <name>, keeping the first",
                            self.index
                        );
                    }
                }
                Node::Element(e) => metadata.push(e),
                Node::Text(_) => {}
            }
        }

        let display_name = display_name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::MissingField {
                path: self.path.clone(),
                index: self.index,
                field: "name".to_string(),
            })?;

        let raw_image_ref = image_reference(&metadata).unwrap_or_else(|| {
            if self.default_extension.is_empty() {
                display_name.clone()
            } else {
                format!("{}.{}", display_name, self.default_extension)
            }
        });

        log::debug!("card #{} '{}' -> image '{}'", self.index, display_name, raw_image_ref);

        Ok(CardRecord {
            display_name,
            raw_image_ref,
            metadata,
        })
    }
}

impl Iterator for CardRecords {
    type Item = Result<CardRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = !matches!(e, Error::MissingField { .. });
                Some(Err(e))
            }
        }
    }
}

/// Image named by a `<set picURL="...">` child, else by a `<picture>` child
fn image_reference(metadata: &[Element]) -> Option<String> {
    let from_set = metadata
        .iter()
        .filter(|e| e.name == "set")
        .find_map(|s| s.attribute("picurl"))
        .map(str::to_string);

    let from_picture = || {
        metadata
            .iter()
            .find(|e| e.name == "picture")
            .map(|p| p.text())
    };

    from_set
        .or_else(from_picture)
        .map(|r| file_part(r.trim()).to_string())
        .filter(|r| !r.is_empty())
}

/// Last path segment of a URL, or the reference unchanged
fn file_part(reference: &str) -> &str {
    if reference.contains("://") {
        reference.rsplit('/').next().unwrap_or(reference)
    } else {
        reference
    }
}

/// Read the element opened by `start` up to its matching end tag
fn read_subtree<R: BufRead>(
    reader: &mut Reader<R>,
    start: &BytesStart<'_>,
    buf: &mut Vec<u8>,
    path: &Path,
) -> Result<Element> {
    let mut stack = vec![element_from_start(reader, start, path)?];

    loop {
        buf.clear();
        let event = reader
            .read_event_into(buf)
            .map_err(|e| malformed(path, reader.error_position() as u64, e))?;
        let position = reader.buffer_position() as u64;

        match event {
            Event::Start(e) => {
                let element = element_from_start(reader, &e, path)?;
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = element_from_start(reader, &e, path)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Element(element));
                }
            }
            Event::End(_) => {
                let Some(mut finished) = stack.pop() else {
                    return Err(malformed(path, position, "unbalanced end tag"));
                };
                drop_layout_whitespace(&mut finished);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(finished)),
                    None => return Ok(finished),
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape_with(resolve_entity)
                    .map_err(|e| malformed(path, position, e))?;
                push_text(&mut stack, &text);
            }
            Event::CData(c) => {
                let text = String::from_utf8(c.into_inner().into_owned())
                    .map_err(|e| malformed(path, position, e))?;
                push_text(&mut stack, &text);
            }
            Event::Eof => {
                return Err(malformed(path, position, "unexpected end of document"));
            }
            _ => {}
        }
    }
}

fn push_text(stack: &mut [Element], text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(top) = stack.last_mut() {
        match top.children.last_mut() {
            Some(Node::Text(existing)) => existing.push_str(text),
            _ => top.children.push(Node::Text(text.to_string())),
        }
    }
}

/// Remove indentation between child elements
///
/// Whitespace-only runs spanning a line break are layout when the element
/// holds no other text. Mixed content and whitespace inside a field stay.
fn drop_layout_whitespace(element: &mut Element) {
    let has_text = element
        .children
        .iter()
        .any(|n| matches!(n, Node::Text(t) if !t.trim().is_empty()));
    let has_elements = element.children.iter().any(|n| matches!(n, Node::Element(_)));

    if has_elements && !has_text {
        element.children.retain(|n| match n {
            Node::Text(t) => !t.contains('\n'),
            Node::Element(_) => true,
        });
    }
}

fn element_from_start<R>(reader: &Reader<R>, start: &BytesStart<'_>, path: &Path) -> Result<Element> {
    let position = reader.buffer_position() as u64;
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| malformed(path, position, e))?
        .to_string();

    let mut element = Element::new(name);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| malformed(path, position, e))?;
        let key = std::str::from_utf8(attribute.key.as_ref())
            .map_err(|e| malformed(path, position, e))?
            .to_string();
        let value = attribute
            .unescape_value_with(resolve_entity)
            .map_err(|e| malformed(path, position, e))?
            .into_owned();
        element.attributes.push((key, value));
    }

    Ok(element)
}

/// XML's predefined entities plus the HTML ones export templates commonly emit
fn resolve_entity(entity: &str) -> Option<&'static str> {
    let resolved = match entity {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "apos" => "'",
        "quot" => "\"",
        "nbsp" => "\u{a0}",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "hellip" => "\u{2026}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        _ => return None,
    };
    Some(resolved)
}

fn malformed(path: &Path, position: u64, message: impl std::fmt::Display) -> Error {
    Error::MalformedExport {
        path: path.to_path_buf(),
        position,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<cockatrice_carddatabase version="3">
  <sets>
    <set>
      <name>CHB</name>
      <longname>Chaos Brawl</longname>
    </set>
  </sets>
  <cards>
    <card>
      <name>Æther Vial, the Fae's Gift</name>
      <set picURL="Æther Vial, the Fae's Gift.png" rarity="rare">CHB</set>
      <manacost>1U</manacost>
      <type>Artifact</type>
      <text>Draw a card &amp; scry 1.</text>
    </card>
    <card>
      <name>Bolt</name>
      <set>CHB</set>
      <text><![CDATA[Deal 3 <damage>.]]></text>
    </card>
    <card>
      <name>Ach! Hans&nbsp;Run</name>
      <picture>hans.jpg</picture>
    </card>
  </cards>
</cockatrice_carddatabase>
"#;

    #[test]
    fn test_read_records_in_order() {
        let reader = ExportReader::from_str(EXPORT, "export.xml");
        let records: Vec<CardRecord> = reader.records().unwrap().map(|r| r.unwrap()).collect();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].display_name, "Æther Vial, the Fae's Gift");
        assert_eq!(records[0].raw_image_ref, "Æther Vial, the Fae's Gift.png");
        assert_eq!(records[1].display_name, "Bolt");
        assert_eq!(records[2].display_name, "Ach! Hans\u{a0}Run");
    }

    #[test]
    fn test_metadata_passes_through() {
        let reader = ExportReader::from_str(EXPORT, "export.xml");
        let first = reader.records().unwrap().next().unwrap().unwrap();

        let names: Vec<&str> = first.metadata.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["set", "manacost", "type", "text"]);
        assert_eq!(first.metadata[3].text(), "Draw a card & scry 1.");
        assert_eq!(first.metadata[0].attribute("rarity"), Some("rare"));
    }

    #[test]
    fn test_field_whitespace_is_kept() {
        let xml = "<db>\n  <card>\n    <name> Bolt </name>\n    <text>Deal <i>3</i> damage to any target.</text>\n    <flavor>  indented</flavor>\n  </card>\n</db>";
        let reader = ExportReader::from_str(xml, "export.xml");
        let card = reader.records().unwrap().next().unwrap().unwrap();

        assert_eq!(card.display_name, "Bolt");
        let names: Vec<&str> = card.metadata.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["text", "flavor"]);
        assert_eq!(
            card.metadata[0].children,
            vec![
                Node::Text("Deal ".to_string()),
                Node::Element(Element::new("i").with_text("3")),
                Node::Text(" damage to any target.".to_string()),
            ]
        );
        assert_eq!(card.metadata[1].text(), "  indented");
    }

    #[test]
    fn test_set_definitions_drop_indentation() {
        let header = ExportReader::from_str(EXPORT, "export.xml").header().unwrap();
        let set = &header.set_definitions[0];
        assert!(set.children.iter().all(|n| matches!(n, Node::Element(_))));
        assert_eq!(set.child("longname").unwrap().text(), "Chaos Brawl");
    }

    #[test]
    fn test_extra_name_is_discarded() {
        let xml = "<db><card><name>Bolt!</name><name>Bolt!</name><type>Instant</type></card></db>";
        let reader = ExportReader::from_str(xml, "export.xml");
        let card = reader.records().unwrap().next().unwrap().unwrap();

        assert_eq!(card.display_name, "Bolt!");
        assert!(card.metadata.iter().all(|e| e.name != "name"));
        assert_eq!(card.metadata.len(), 1);
    }

    #[test]
    fn test_cdata_text() {
        let reader = ExportReader::from_str(EXPORT, "export.xml");
        let bolt = reader.records().unwrap().nth(1).unwrap().unwrap();
        assert_eq!(bolt.metadata[1].text(), "Deal 3 <damage>.");
    }

    #[test]
    fn test_image_reference_fallbacks() {
        let reader = ExportReader::from_str(EXPORT, "export.xml").with_default_extension(".png");
        let records: Vec<CardRecord> = reader.records().unwrap().map(|r| r.unwrap()).collect();

        assert_eq!(records[1].raw_image_ref, "Bolt.png");
        assert_eq!(records[2].raw_image_ref, "hans.jpg");
    }

    #[test]
    fn test_url_image_reference() {
        let xml = r#"<db><card><name>Bolt</name><set picURL="https://example.org/img/Bolt.jpg">X</set></card></db>"#;
        let reader = ExportReader::from_str(xml, "export.xml");
        let card = reader.records().unwrap().next().unwrap().unwrap();
        assert_eq!(card.raw_image_ref, "Bolt.jpg");
    }

    #[test]
    fn test_records_restartable() {
        let reader = ExportReader::from_str(EXPORT, "export.xml");
        let first: Vec<String> = reader
            .records()
            .unwrap()
            .map(|r| r.unwrap().display_name)
            .collect();
        let second: Vec<String> = reader
            .records()
            .unwrap()
            .map(|r| r.unwrap().display_name)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_header() {
        let reader = ExportReader::from_str(EXPORT, "export.xml");
        let set = reader.read_set().unwrap();

        assert_eq!(set.header.schema_version.as_deref(), Some("3"));
        assert_eq!(set.header.set_definitions.len(), 1);
        assert_eq!(set.header.primary_set_code(), Some("CHB".to_string()));
        assert_eq!(set.card_count(), 3);
    }

    #[test]
    fn test_header_without_sets() {
        let xml = "<db version=\"4\"><card><name>Bolt</name></card></db>";
        let header = ExportReader::from_str(xml, "export.xml").header().unwrap();
        assert_eq!(header.schema_version.as_deref(), Some("4"));
        assert!(header.set_definitions.is_empty());
    }

    #[test]
    fn test_missing_name() {
        let xml = "<db><card><name>Ok</name></card><card><text>no name</text></card></db>";
        let reader = ExportReader::from_str(xml, "export.xml");
        let results: Vec<Result<CardRecord>> = reader.records().unwrap().collect();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(Error::MissingField { index, field, .. }) => {
                assert_eq!(*index, 2);
                assert_eq!(field, "name");
            }
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_pass_continues_after_missing_name() {
        let xml = "<db><card><text>no name</text></card><card/><card><name>Bolt</name></card></db>";
        let results: Vec<Result<CardRecord>> =
            ExportReader::from_str(xml, "export.xml").records().unwrap().collect();

        assert_eq!(results.len(), 3);
        assert!(matches!(results[0], Err(Error::MissingField { index: 1, .. })));
        assert!(matches!(results[1], Err(Error::MissingField { index: 2, .. })));
        assert_eq!(results[2].as_ref().unwrap().display_name, "Bolt");
    }

    #[test]
    fn test_blank_name_is_missing() {
        let xml = "<db><card><name>   </name></card></db>";
        let reader = ExportReader::from_str(xml, "export.xml");
        assert!(matches!(
            reader.read_set(),
            Err(Error::MissingField { .. })
        ));
    }

    #[test]
    fn test_malformed_export() {
        for xml in [
            "<db><card><name>Bolt</card></db>",
            "<db><card><name>Bolt</name></card>",
            "<db><card><name>Caf&eacute;</name></card></db>",
            "",
        ] {
            let reader = ExportReader::from_str(xml, "broken.xml");
            match reader.read_set() {
                Err(Error::MalformedExport { path, .. }) => {
                    assert_eq!(path, PathBuf::from("broken.xml"))
                }
                other => panic!("expected MalformedExport for {:?}, got {:?}", xml, other),
            }
        }
    }

    #[test]
    fn test_missing_file() {
        let reader = ExportReader::open("/definitely/not/here.xml");
        assert!(matches!(reader.records(), Err(Error::FileRead { .. })));
    }
}
