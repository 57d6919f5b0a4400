use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_record;
use crate::spreadsheet::cell::resolve_number_formats;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use either::Either;
use log::debug;
use std::collections::HashMap;
use thiserror::Error;

// BIFF8 record types
const FORMULA: u16 = 6; // Cell formula with its cached result
const EOF: u16 = 10; // End of a substream
const DATE1904: u16 = 34; // Date system of the workbook
const FILE_PASS: u16 = 47; // Workbook is encrypted
const CODE_PAGE: u16 = 66; // Code page of 8-bit strings
const BOUND_SHEET8: u16 = 133; // Sheet name, type and stream offset
const MUL_RK: u16 = 189; // Run of RK numbers in one row
const XF: u16 = 224; // Cell style
const SST: u16 = 252; // Shared string table
const LABEL_SST: u16 = 253; // Cell referencing the shared string table
const NUMBER: u16 = 515; // Floating-point cell
const LABEL: u16 = 516; // Inline string cell
const BOOL_ERR: u16 = 517; // Boolean or error cell
const ARRAY: u16 = 545; // Array formula definition
const STRING: u16 = 519; // String result of the preceding formula
const TABLE: u16 = 566; // Data table definition
const RK: u16 = 638; // Compressed number cell
const SHR_FMLA: u16 = 1212; // Shared formula definition
const FORMAT: u16 = 1054; // Custom number format
const BOF: u16 = 2057; // Start of a substream

const WORKSHEET: u8 = 0;

const WORKBOOK_STREAM: &str = "Workbook";
const BOOK_STREAM: &str = "Book"; // Excel 5.0/95
const ENCRYPTED_PACKAGE: &str = "EncryptedPackage"; // Password protected Office Open XML

/// Errors specific to legacy Excel workbooks
#[derive(Error, Debug)]
pub enum XlsError {
    #[error("Unknown code page '{0}'")]
    CodePageError(u16),
    #[error("Invalid formula result '{0:#018x}'")]
    FormulaValueError(u64),
    #[error("No worksheet starts at stream offset {0}")]
    SheetOffsetError(usize),
}

/// An Excel 97-2003 workbook (`.xls`) held in memory.
pub(crate) struct XlsSpreadsheet {
    reader: Biff8Reader,
    shared_strings: Vec<String>,
    /// Cell type per XF index, used to spot date-formatted numbers
    number_formats: Vec<CellType>,
    /// Worksheets as (name, stream offset) pairs in workbook order
    sheets: Vec<(String, usize)>,
}

impl XlsSpreadsheet {
    /// Reads the workbook globals substream: date system, code page, number
    /// formats, cell styles, shared strings and the sheet directory.
    ///
    /// # Arguments
    ///
    /// * `bytes` - The compound file content
    ///
    /// # Returns
    ///
    /// * `Result<XlsSpreadsheet, SpreadsheetError>` - The workbook, or
    ///   `PasswordProtectedError` for encrypted files
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Result<XlsSpreadsheet, SpreadsheetError> {
        let cfb = Cfb::new(bytes)?;
        if cfb.contains(ENCRYPTED_PACKAGE) {
            Err(SpreadsheetError::PasswordProtectedError)?
        }
        let stream = match cfb.read(WORKBOOK_STREAM)? {
            Some(stream) => stream,
            None => cfb
                .read(BOOK_STREAM)?
                .ok_or_else(|| SpreadsheetError::MissingPartError(WORKBOOK_STREAM.to_owned()))?,
        };

        let mut reader = Biff8Reader::new(stream);
        let mut is_1904 = false;
        let mut custom_formats = HashMap::<String, String>::new();
        let mut format_indexes = Vec::<String>::new();
        let mut shared_strings = Vec::<String>::new();
        let mut sheets = Vec::<(String, usize)>::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => Err(SpreadsheetError::PasswordProtectedError)?,
            DATE1904 => is_1904 = reader.read_u16()? == 1,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                reader.encoding = codepage::to_encoding(code_page).ok_or(XlsError::CodePageError(code_page))?;
            }
            FORMAT => {
                let id = reader.read_u16()?;
                custom_formats.insert(id.to_string(), reader.read_xl_unicode_string()?);
            }
            XF => {
                reader.skip(2)?;
                format_indexes.push(reader.read_u16()?.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_u32()? as usize;
                reader.skip(1)?;
                let kind = reader.read_u8()?;
                let name = reader.read_short_xl_unicode_string()?;
                if kind == WORKSHEET {
                    sheets.push((name, pointer));
                }
            }
        });
        if sheets.is_empty() {
            Err(SpreadsheetError::EmptyWorkbookError)?
        }

        // Formats are resolved once the date system is known
        let custom_formats: HashMap<String, CellType> = custom_formats
            .into_iter()
            .map(|(id, format)| (id, CellType::parse_custom_number_format(&format, is_1904)))
            .collect();
        let number_formats = resolve_number_formats(&format_indexes, &custom_formats, is_1904);
        debug!(
            "Opened legacy workbook with {} sheets, {} styles, {} shared strings (1904 dates: {})",
            sheets.len(),
            number_formats.len(),
            shared_strings.len(),
            is_1904
        );
        Ok(XlsSpreadsheet {
            reader,
            shared_strings,
            number_formats,
            sheets,
        })
    }

    fn style(&self, index: usize) -> CellType {
        self.number_formats.get(index).copied().unwrap_or(CellType::Number)
    }

    fn push_cell(&self, sheet: &mut Sheet, cell: Cell) -> Result<(), SpreadsheetError> {
        if !cell.value.is_empty() {
            if let Some(value) = cell.to_value(&self.shared_strings)? {
                sheet.push(cell.row, cell.col, value);
            }
        }
        Ok(())
    }
}

impl Spreadsheet for XlsSpreadsheet {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    fn read_sheet(&mut self, sheet_name: &str) -> Result<Sheet, SpreadsheetError> {
        let pointer = self
            .sheets
            .iter()
            .find(|(name, _)| name == sheet_name)
            .map(|(_, pointer)| *pointer)
            .ok_or_else(|| SpreadsheetError::SheetNotFound(sheet_name.to_owned()))?;

        self.reader.goto(pointer);
        if self.reader.next()? != Some(BOF) {
            Err(XlsError::SheetOffsetError(pointer))?
        }

        let mut sheet = Sheet::new(sheet_name);
        while let Some(kind) = self.reader.next()? {
            match kind {
                BOF | EOF => break,
                MUL_RK => {
                    let row = self.reader.read_u16()? as usize;
                    let first = self.reader.read_u16()? as usize;
                    let last = self.reader.get_u16_back(2)? as usize;
                    for col in first..=last {
                        let index = self.reader.read_u16()? as usize;
                        let value = self.reader.read_rk_number()?;
                        let cell = Cell {
                            row,
                            col,
                            kind: self.style(index),
                            value: value.to_string(),
                        };
                        self.push_cell(&mut sheet, cell)?;
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = self.reader.read_u16()? as usize;
                    let col = self.reader.read_u16()? as usize;
                    let (kind, value) = match kind {
                        BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                        NUMBER => read_number_cell(&mut self.reader)?,
                        RK => read_rk_cell(&mut self.reader)?,
                        LABEL_SST => read_shared_string_cell(&mut self.reader)?,
                        LABEL => read_string_cell(&mut self.reader)?,
                        _ => read_formula_cell(&mut self.reader)?,
                    };
                    let kind = match kind {
                        Either::Left(kind) => kind,
                        Either::Right(index) => self.style(index),
                    };
                    self.push_cell(&mut sheet, Cell { row, col, kind, value })?;
                }
                _ => (),
            }
        }
        sheet.finish();
        debug!("Read {} cells from sheet '{}' (offset {})", sheet.cells.len(), sheet.name, pointer);
        Ok(sheet)
    }
}

/// Reads the shared string table, whose strings may continue across `CONTINUE` records.
fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, SpreadsheetError> {
    reader.skip(4)?; // Total references
    let count = reader.read_u32()? as usize;
    let mut shared_strings = Vec::with_capacity(count.min(u16::MAX as usize));
    for _ in 0..count {
        shared_strings.push(reader.read_xl_unicode_rich_extended_string()?);
    }
    Ok(shared_strings)
}

// Cell readers return the cell type, either fixed or as an XF index still to
// be resolved, and the raw value text.

fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SpreadsheetError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    if reader.read_u8()? == 0 {
        Ok((Either::Left(CellType::Boolean), value.to_string()))
    } else {
        Ok((Either::Left(CellType::Error), to_error_value(value).to_owned()))
    }
}

fn read_number_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SpreadsheetError> {
    let index = reader.read_u16()? as usize;
    Ok((Either::Right(index), reader.read_f64()?.to_string()))
}

fn read_rk_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SpreadsheetError> {
    let index = reader.read_u16()? as usize;
    Ok((Either::Right(index), reader.read_rk_number()?.to_string()))
}

fn read_shared_string_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SpreadsheetError> {
    reader.skip(2)?;
    Ok((Either::Left(CellType::SharedString), reader.read_u32()?.to_string()))
}

fn read_string_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SpreadsheetError> {
    reader.skip(2)?;
    Ok((Either::Left(CellType::InlineString), reader.read_xl_unicode_string()?))
}

/// Reads the cached result of a formula. A result whose top two bytes are
/// `0xFFFF` is tagged by its first byte; anything else is a double.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SpreadsheetError> {
    let index = reader.read_u16()? as usize;
    let result = reader.read_u64()?;
    if result >> 48 != 0xFFFF {
        return Ok((Either::Right(index), f64::from_bits(result).to_string()));
    }
    match result & 0xFF {
        0 => {
            // The string follows in a STRING record, possibly after the formula definitions
            while let Some(kind) = reader.next()? {
                match kind {
                    STRING => {
                        return Ok((Either::Left(CellType::InlineString), reader.read_xl_unicode_string()?));
                    }
                    SHR_FMLA | ARRAY | TABLE => (),
                    _ => break,
                }
            }
            Ok((Either::Left(CellType::Empty), String::new()))
        }
        1 => Ok((Either::Left(CellType::Boolean), ((result >> 16) & 0xFF).to_string())),
        2 => Ok((
            Either::Left(CellType::Error),
            to_error_value(((result >> 16) & 0xFF) as u8).to_owned(),
        )),
        3 => Ok((Either::Left(CellType::Empty), String::new())),
        _ => Err(XlsError::FormulaValueError(result).into()),
    }
}
