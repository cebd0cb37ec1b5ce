//! XML utilities shared by the zip based decoders (.xlsx and .ods) and the xlsx writer
//! Provides the reader wrapper, attribute and text helpers, and OOXML `_xHHHH_` escaping

use crate::error::SheetError;
use quick_xml::escape::escape;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

/// Errors specific to XML parsing operations
#[derive(Error, Debug)]
pub(crate) enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntityError(String),

    #[error("Parse attribute value '{0}' failed")]
    ParseAttributeValueError(String),
}

/// XML reader wrapper configured for spreadsheet parts
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);

        let buffer = Vec::with_capacity(1024);
        XmlReader { reader, buffer }
    }

    /// Reads the next XML event, `None` at end of input
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, SheetError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(SheetError::XmlError(error)),
        }
    }
}

/// Helper trait for XML attributes providing value extraction and parsing
pub(crate) trait XmlAttributeHelper<'a> {
    fn get_value(&self) -> Result<Cow<'a, str>, SheetError>;

    fn parse_value<T: FromStr>(&self) -> Result<T, SheetError>;
}

impl<'a> XmlAttributeHelper<'a> for Attribute<'a> {
    fn get_value(&self) -> Result<Cow<'a, str>, SheetError> {
        Ok(self.decode_and_unescape_value(quick_xml::Reader::from_reader(&b""[..]).decoder())?)
    }

    fn parse_value<T: FromStr>(&self) -> Result<T, SheetError> {
        let value = self.get_value()?;
        value
            .trim()
            .parse()
            .map_err(|_| SheetError::XmlHelperError(XmlError::ParseAttributeValueError(value.to_string())))
    }
}

/// Helper trait for XML nodes providing attribute access by qualified name
pub(crate) trait XmlNodeHelper<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SheetError>;

    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, SheetError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SheetError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.get_value())
            .transpose()
    }

    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, SheetError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.parse_value())
            .transpose()
    }
}

/// Helper trait for building text content from XML events
pub(crate) trait XmlTextContextHelper {
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), SheetError>;

    /// Appends an entity or character reference
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SheetError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), SheetError> {
        self.push_str(&text.xml_content()?);
        Ok(())
    }

    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SheetError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = if let Some(hex) = number.strip_prefix('x') {
                u32::from_str_radix(hex, 16)?
            } else {
                number.parse::<u32>()?
            };
            if let Some(character) = std::char::from_u32(code) {
                self.push(character);
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::ParseEntityError(raw.to_string()))?;
        }

        Ok(())
    }
}

/// Decodes OOXML `_xHHHH_` escapes back into characters
pub(crate) fn unescape_ooxml(text: &str) -> Cow<'_, str> {
    if !text.contains("_x") {
        return Cow::Borrowed(text);
    }
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(position) = rest.find("_x") {
        result.push_str(&rest[..position]);
        let candidate = &rest[position..];
        match parse_ooxml_escape(candidate) {
            Some(character) => {
                result.push(character);
                rest = &candidate[7..];
            }
            None => {
                result.push_str("_x");
                rest = &candidate[2..];
            }
        }
    }
    result.push_str(rest);
    Cow::Owned(result)
}

/// Parses `_xHHHH_` at the start of `text`
fn parse_ooxml_escape(text: &str) -> Option<char> {
    let bytes = text.as_bytes();
    if bytes.len() < 7 || bytes[6] != b'_' || !bytes[2..6].iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    u32::from_str_radix(&text[2..6], 16).ok().and_then(char::from_u32)
}

/// Escapes text for an element body: XML markup plus `_xHHHH_` for
/// control characters and for literal sequences that would read back as escapes
pub(crate) fn escape_ooxml(text: &str) -> Cow<'_, str> {
    let needs_ooxml = text.chars().any(is_escaped_control) || text.contains("_x");
    if !needs_ooxml {
        return escape(text);
    }
    let mut result = String::with_capacity(text.len() + 8);
    let mut rest = text;
    while let Some(character) = rest.chars().next() {
        if is_escaped_control(character) {
            result.push_str(&format!("_x{:04X}_", character as u32));
        } else if character == '_' && parse_ooxml_escape(rest).is_some() {
            // The underscore itself is escaped so the sequence survives a round trip
            result.push_str("_x005F_");
        } else {
            result.push(character);
        }
        rest = &rest[character.len_utf8()..];
    }
    Cow::Owned(escape(&result).into_owned())
}

/// Control characters that are not allowed verbatim in XML 1.0
fn is_escaped_control(character: char) -> bool {
    matches!(character, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}')
}

#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}
