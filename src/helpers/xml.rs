//! XML reading utilities for the parts of an Office Open XML workbook.
//! Wraps the quick-xml pull reader and adds attribute and text helpers.

use crate::spreadsheet::SpreadsheetError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;
use thiserror::Error;

/// Errors raised while interpreting XML content.
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntityError(String),
}

/// Pull reader over one XML part, reusing a single event buffer.
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    /// Creates a reader that reports `<a/>` as a start/end pair and keeps whitespace.
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

    /// Reads the next event, `None` at end of document.
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, SpreadsheetError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(SpreadsheetError::XmlError(error)),
        }
    }
}

/// Attribute lookup on start tags, matching on the local name so that
/// prefixed attributes such as `r:id` are found under `id`.
pub(crate) trait XmlNodeHelper<'a> {
    /// Gets the unescaped value of the first attribute whose local name matches.
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SpreadsheetError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SpreadsheetError> {
        for result in self.attributes() {
            let attribute = result?;
            if attribute.key.local_name().as_ref() == name.as_bytes() {
                return Ok(Some(attribute.unescape_value()?));
            }
        }
        Ok(None)
    }
}

/// Appends entity and character references to a text buffer.
pub(crate) trait XmlTextContextHelper {
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SpreadsheetError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SpreadsheetError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = if let Some(hex) = number.strip_prefix('x') {
                u32::from_str_radix(hex, 16)?
            } else {
                number.parse::<u32>()?
            };
            if let Some(character) = char::from_u32(code) {
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

/// Loops over the events of an `XmlReader`, dispatching to the given match arms
/// and ignoring everything else.
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
