//! Writer for the simulator's custom-set document

use crate::card::{Element, Node, RewrittenRecord, SetHeader};
use crate::error::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Root element of the custom-set schema
pub const ROOT_ELEMENT: &str = "cockatrice_carddatabase";

/// Schema version written when the export does not carry one
pub const DEFAULT_SCHEMA_VERSION: &str = "4";

/// Attribute on a card's `<set>` element that names its image
pub const IMAGE_ATTRIBUTE: &str = "picURL";

/// Settings for the output document
#[derive(Debug, Clone, Default)]
pub struct SerializerOptions {
    /// Set code for cards without a `<set>` element, and for a synthesized
    /// set definition when the export has none
    pub set_code: Option<String>,
    /// Long name for a synthesized set definition
    pub set_name: Option<String>,
}

impl SerializerOptions {
    fn default_set_code(&self, header: &SetHeader) -> Option<String> {
        self.set_code
            .clone()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| header.primary_set_code())
    }
}

/// Render the set document into memory
pub fn render_set_document(
    header: &SetHeader,
    records: &[RewrittenRecord],
    options: &SerializerOptions,
) -> Result<Vec<u8>> {
    let default_code = options.default_set_code(header);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
        ROOT_ELEMENT,
    )?;

    let version = header
        .schema_version
        .as_deref()
        .unwrap_or(DEFAULT_SCHEMA_VERSION);
    let mut root = BytesStart::new(ROOT_ELEMENT);
    root.push_attribute(("version", version));
    emit(&mut writer, Event::Start(root), ROOT_ELEMENT)?;

    emit(&mut writer, Event::Start(BytesStart::new("sets")), ROOT_ELEMENT)?;
    if header.set_definitions.is_empty() {
        if let Some(code) = &default_code {
            let name = options.set_name.as_deref().unwrap_or(code);
            let definition = synthesized_set(code, name);
            write_element(&mut writer, &definition, code)?;
        }
    } else {
        for definition in &header.set_definitions {
            check_element(definition, "sets")?;
            write_element(&mut writer, definition, "sets")?;
        }
    }
    emit(&mut writer, Event::End(BytesEnd::new("sets")), ROOT_ELEMENT)?;

    emit(&mut writer, Event::Start(BytesStart::new("cards")), ROOT_ELEMENT)?;
    for record in records {
        let card = card_element(record, default_code.as_deref())?;
        check_element(&card, record.display_name())?;
        write_element(&mut writer, &card, record.display_name())?;
    }
    emit(&mut writer, Event::End(BytesEnd::new("cards")), ROOT_ELEMENT)?;

    emit(&mut writer, Event::End(BytesEnd::new(ROOT_ELEMENT)), ROOT_ELEMENT)?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write a rendered document to `path`, replacing any existing file
pub fn write_document<P: AsRef<Path>>(path: P, document: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, document)?;

    log::info!("wrote set document {}", path.display());
    Ok(())
}

/// The output `<card>`: safe token as name, metadata verbatim, image rewritten
fn card_element(record: &RewrittenRecord, default_code: Option<&str>) -> Result<Element> {
    let mut card = Element::new("card");
    card.children.push(Node::Element(
        Element::new("name").with_text(record.safe_token.as_str()),
    ));

    let mut has_set = false;
    // The token is the card's only identifier
    for field in record.record.metadata.iter().filter(|f| f.name != "name") {
        let mut field = field.clone();
        if field.name == "set" {
            field.set_attribute(IMAGE_ATTRIBUTE, record.image_file.as_str());
            has_set = true;
        }
        card.children.push(Node::Element(field));
    }

    if !has_set {
        let code = default_code.ok_or_else(|| Error::Serialization {
            card: record.display_name().to_string(),
            message: "card has no <set> and no default set code is known".to_string(),
        })?;
        card.children.push(Node::Element(
            Element::new("set")
                .with_attribute(IMAGE_ATTRIBUTE, record.image_file.as_str())
                .with_text(code),
        ));
    }

    Ok(card)
}

fn synthesized_set(code: &str, name: &str) -> Element {
    let mut set = Element::new("set");
    for (field, value) in [("name", code), ("longname", name), ("settype", "Custom")] {
        set.children
            .push(Node::Element(Element::new(field).with_text(value)));
    }
    set
}

fn write_element<W: Write>(writer: &mut Writer<W>, element: &Element, card: &str) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        return emit(writer, Event::Empty(start), card);
    }

    emit(writer, Event::Start(start), card)?;
    for child in &element.children {
        match child {
            Node::Text(text) => emit(writer, Event::Text(BytesText::new(text)), card)?,
            Node::Element(e) => write_element(writer, e, card)?,
        }
    }
    emit(writer, Event::End(BytesEnd::new(element.name.as_str())), card)
}

fn emit<W: Write>(writer: &mut Writer<W>, event: Event<'_>, card: &str) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::Serialization {
            card: card.to_string(),
            message: e.to_string(),
        })
}

/// Reject text no XML 1.0 document can carry, escaped or not
fn check_element(element: &Element, card: &str) -> Result<()> {
    for (key, value) in &element.attributes {
        check_text(value, card, &format!("{}@{}", element.name, key))?;
    }
    for child in &element.children {
        match child {
            Node::Text(text) => check_text(text, card, &element.name)?,
            Node::Element(e) => check_element(e, card)?,
        }
    }
    Ok(())
}

fn check_text(text: &str, card: &str, field: &str) -> Result<()> {
    match text.chars().find(|c| !is_xml_char(*c)) {
        Some(c) => Err(Error::Serialization {
            card: card.to_string(),
            message: format!(
                "field '{}' contains U+{:04X}, which XML cannot represent",
                field, c as u32
            ),
        }),
        None => Ok(()),
    }
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r')
        || ('\u{20}'..='\u{d7ff}').contains(&c)
        || ('\u{e000}'..='\u{fffd}').contains(&c)
        || ('\u{10000}'..='\u{10ffff}').contains(&c)
}
