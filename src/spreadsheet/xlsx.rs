use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::resolve_number_formats;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use log::debug;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::BufRead;
use std::io::Cursor;
use zip::ZipArchive;

// Local names of the SpreadsheetML elements we read
const TAG_RELATIONSHIP: &[u8] = b"Relationship";
const TAG_CUSTOM_FORMATS: &[u8] = b"numFmts"; // Custom number formats container
const TAG_CUSTOM_FORMAT: &[u8] = b"numFmt"; // Individual custom number format
const TAG_FORMAT_INDEXES: &[u8] = b"cellXfs"; // Cell format indexes container
const TAG_FORMAT_INDEX: &[u8] = b"xf"; // Individual cell format index
const TAG_SHARED_STRING_ITEM: &[u8] = b"si"; // Shared string table item
const TAG_PHONETIC_TEXT: &[u8] = b"rPh"; // Phonetic text for Asian languages
const TAG_TEXT: &[u8] = b"t"; // Text content within strings
const TAG_WORKBOOK_PROPERTIES: &[u8] = b"workbookPr";
const TAG_SHEET: &[u8] = b"sheet";
const TAG_ROW: &[u8] = b"row";
const TAG_CELL: &[u8] = b"c";
const TAG_INLINE_STRING: &[u8] = b"is";
const TAG_VALUE: &[u8] = b"v";

const WORKBOOK_PATH: &str = "xl/workbook.xml";
const RELATIONSHIPS_PATH: &str = "xl/_rels/workbook.xml.rels";
const STYLES_PATH: &str = "xl/styles.xml";
const SHARED_STRINGS_PATH: &str = "xl/sharedStrings.xml";

type Archive = ZipArchive<Cursor<Vec<u8>>>;

/// An Office Open XML workbook (`.xlsx`, `.xlsm`) held in memory.
pub(crate) struct XlsxSpreadsheet {
    zip: Archive,
    /// Cell type per style index, used to spot date-formatted numbers
    number_formats: Vec<CellType>,
    shared_strings: Vec<String>,
    /// Worksheets as (name, zip_path) pairs in workbook order
    sheets: Vec<(String, String)>,
}

impl XlsxSpreadsheet {
    /// Parses the workbook structure, styles and shared strings. Worksheet
    /// contents are only read on demand.
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Result<XlsxSpreadsheet, SpreadsheetError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let (sheets, is_1904) = load_workbook(&mut zip)?;
        if sheets.is_empty() {
            Err(SpreadsheetError::EmptyWorkbookError)?
        }
        let number_formats = load_number_formats(&mut zip, is_1904)?;
        let shared_strings = load_shared_strings(&mut zip)?;
        debug!(
            "Opened workbook with {} sheets, {} styles, {} shared strings (1904 dates: {})",
            sheets.len(),
            number_formats.len(),
            shared_strings.len(),
            is_1904
        );
        Ok(XlsxSpreadsheet {
            zip,
            number_formats,
            shared_strings,
            sheets,
        })
    }
}

impl Spreadsheet for XlsxSpreadsheet {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    fn read_sheet(&mut self, sheet_name: &str) -> Result<Sheet, SpreadsheetError> {
        let zip_path = self
            .sheets
            .iter()
            .find(|(name, _)| name == sheet_name)
            .map(|(_, zip_path)| zip_path.to_owned())
            .ok_or_else(|| SpreadsheetError::SheetNotFound(sheet_name.to_owned()))?;

        let mut sheet = Sheet::new(sheet_name);
        let mut row = 0usize;
        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut cell = Cell::default();
        let mut reader = self
            .zip
            .xml_part(&zip_path)?
            .ok_or_else(|| SpreadsheetError::MissingPartError(zip_path.to_owned()))?;
        match_xml_events!(reader => {
            Event::Start(event) if event.local_name().as_ref() == TAG_ROW => {
                row = event.get_attribute_value("r")?
                    .and_then(|number| number.parse::<usize>().ok())
                    .and_then(|number| number.checked_sub(1))
                    .unwrap_or(row_count);
                col_count = 0;
            }
            Event::End(event) if event.local_name().as_ref() == TAG_ROW => {
                row_count = row + 1;
            }
            Event::Start(event) if event.local_name().as_ref() == TAG_CELL => {
                (cell.row, cell.col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row, col_count));
                col_count = cell.col + 1;
                cell.value.clear();
                cell.kind = event.get_attribute_value("t")?.map(|t| {
                    match &*t {
                        "inlineStr" | "str" => CellType::InlineString,
                        "s" => CellType::SharedString,
                        "d" => CellType::IsoDateTime,
                        "b" => CellType::Boolean,
                        "e" => CellType::Error,
                        _ => CellType::Number,
                    }
                }).unwrap_or(CellType::Number);
                if let Some(format_id) = event.get_attribute_value("s")? {
                    if cell.kind == CellType::Number && !format_id.is_empty() {
                        let index = format_id.parse::<usize>()?;
                        cell.kind = self.number_formats.get(index).copied().unwrap_or(CellType::Number);
                    }
                }
            }
            Event::Start(event) if cell.kind != CellType::Empty && event.local_name().as_ref() == TAG_INLINE_STRING => {
                cell.value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if cell.kind != CellType::Empty && event.local_name().as_ref() == TAG_VALUE => {
                cell.value = read_string_value(&mut reader, TAG_VALUE, true)?;
            }
            Event::End(event) if event.local_name().as_ref() == TAG_CELL => {
                if !cell.value.is_empty() {
                    if let Some(value) = cell.to_value(&self.shared_strings)? {
                        sheet.push(cell.row, cell.col, value);
                    }
                }
                cell.kind = CellType::Empty;
            }
        });
        sheet.finish();
        debug!("Read {} cells from sheet '{}' ({})", sheet.cells.len(), sheet.name, zip_path);
        Ok(sheet)
    }
}

/// Maps relationship IDs to worksheet paths inside the archive.
///
/// Relationships of other types (styles, themes, shared strings) are skipped;
/// a relationship without a `Type` is assumed to be a worksheet.
///
/// # Arguments
/// * `zip` - Workbook archive
///
/// # Returns
/// * `Result<HashMap<String, String>, SpreadsheetError>` - Zip path by relationship ID
fn load_relationships(zip: &mut Archive) -> Result<HashMap<String, String>, SpreadsheetError> {
    let mut reader = zip
        .xml_part(RELATIONSHIPS_PATH)?
        .ok_or_else(|| SpreadsheetError::MissingPartError(RELATIONSHIPS_PATH.to_owned()))?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(&target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Lists worksheets and detects the 1904 date system.
///
/// Sheets whose relationship ID does not resolve to a worksheet part (chart
/// sheets, dialog sheets) are left out.
///
/// # Arguments
/// * `zip` - Workbook archive
///
/// # Returns
/// * `Result<(Vec<(String, String)>, bool), SpreadsheetError>` - (name, zip_path) pairs in
///   workbook order, and whether dates count from 1904
fn load_workbook(zip: &mut Archive) -> Result<(Vec<(String, String)>, bool), SpreadsheetError> {
    let relationships = load_relationships(zip)?;
    let mut reader = zip
        .xml_part(WORKBOOK_PATH)?
        .ok_or_else(|| SpreadsheetError::MissingPartError(WORKBOOK_PATH.to_owned()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHEET => {
            let name = event.get_attribute_value("name")?;
            let id = event.get_attribute_value("id")?;
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(&*id) {
                    sheets.push((name.to_string(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Resolves the number format of every cell style (`cellXfs/xf`) into a cell type.
///
/// Custom formats are declared under `numFmts`; cell styles only refer to
/// them, or to a built-in format, by ID.
///
/// # Arguments
/// * `zip` - Workbook archive
/// * `is_1904` - Whether the workbook counts dates from 1904
///
/// # Returns
/// * `Result<Vec<CellType>, SpreadsheetError>` - Cell type per style index, empty without a styles part
fn load_number_formats(zip: &mut Archive, is_1904: bool) -> Result<Vec<CellType>, SpreadsheetError> {
    let mut reader = match zip.xml_part(STYLES_PATH)? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => custom_formats_context = true,
        Event::End(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => custom_formats_context = false,
        Event::Start(event) if custom_formats_context && event.local_name().as_ref() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, is_1904));
            }
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => format_indexes_context = true,
        Event::End(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => format_indexes_context = false,
        Event::Start(event) if format_indexes_context && event.local_name().as_ref() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?;
            format_indexes.push(id.map(|id| id.to_string()).unwrap_or_default());
        }
    });

    Ok(resolve_number_formats(&format_indexes, &custom_formats, is_1904))
}

/// Reads the workbook-wide shared string table.
///
/// # Arguments
/// * `zip` - Workbook archive
///
/// # Returns
/// * `Result<Vec<String>, SpreadsheetError>` - Strings in table order, empty without a shared strings part
fn load_shared_strings(zip: &mut Archive) -> Result<Vec<String>, SpreadsheetError> {
    let mut shared_strings = Vec::<String>::new();
    let mut reader = match zip.xml_part(SHARED_STRINGS_PATH)? {
        Some(reader) => reader,
        None => return Ok(shared_strings),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHARED_STRING_ITEM => {
            let text = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
            shared_strings.push(text);
        }
    });
    Ok(shared_strings)
}

/// Collects text up to the closing `end_tag`, joining rich text runs and
/// skipping phonetic annotations.
///
/// # Arguments
/// * `reader` - XML reader positioned just after the opening tag
/// * `end_tag` - Local name of the element being read
/// * `is_text_content` - The element holds its text directly (`<v>`) rather than in `<t>` children
///
/// # Returns
/// * `Result<String, SpreadsheetError>` - The concatenated text, entities resolved
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: &[u8],
    is_text_content: bool,
) -> Result<String, SpreadsheetError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.local_name().as_ref() == end_tag => break,
        Event::Start(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.local_name().as_ref() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.local_name().as_ref() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}

/// Normalizes a relationship target to a path inside the archive.
fn to_zip_path(target: &str) -> String {
    if let Some(path) = target.strip_prefix('/') {
        path.to_owned()
    } else if target.starts_with("xl/") {
        target.to_owned()
    } else {
        format!("xl/{target}")
    }
}
