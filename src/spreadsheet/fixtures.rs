//! In-memory workbook builders for tests.
//!
//! Styles are fixed: index 0 is General, 1 is the built-in date format 14,
//! 2 is a custom `yyyy-mm-dd hh:mm` format, 3 is the built-in `0.00` and 4
//! is the built-in time format 21 (`h:mm:ss`). Legacy workbooks use the same
//! style indexes.

use std::io::Cursor;
use std::io::Write;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const WORKSHEET_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const STYLES_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy\-mm\-dd\ hh:mm"/></numFmts>
<cellStyleXfs count="1"><xf numFmtId="14"/></cellStyleXfs>
<cellXfs count="5"><xf numFmtId="0" xfId="0"/><xf numFmtId="14" xfId="0" applyNumberFormat="1"/><xf numFmtId="164" xfId="0" applyNumberFormat="1"/><xf numFmtId="2" xfId="0" applyNumberFormat="1"/><xf numFmtId="21" xfId="0" applyNumberFormat="1"/></cellXfs>
</styleSheet>"#;

/// Packs `(name, content)` parts into a zip archive.
pub(crate) fn zip_bytes(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in parts {
        writer
            .start_file(name.to_string(), SimpleFileOptions::default())
            .expect("start zip entry");
        writer.write_all(content.as_bytes()).expect("write zip entry");
    }
    writer.finish().expect("finish zip archive").into_inner()
}

/// Builds a workbook from `(sheet name, sheetData inner XML)` pairs and a
/// plain-text shared string table.
pub(crate) fn workbook_bytes(sheets: &[(&str, String)], shared_strings: &[&str], date1904: bool) -> Vec<u8> {
    let items: Vec<String> = shared_strings
        .iter()
        .map(|text| format!("<t>{text}</t>"))
        .collect();
    let items: Vec<&str> = items.iter().map(String::as_str).collect();
    workbook_bytes_with_raw_strings(sheets, &items, date1904)
}

/// Like `workbook_bytes`, with each shared string given as the raw inner XML of its `<si>`.
pub(crate) fn workbook_bytes_with_raw_strings(
    sheets: &[(&str, String)],
    shared_strings: &[&str],
    date1904: bool,
) -> Vec<u8> {
    let mut sheet_entries = String::new();
    let mut relationships = String::new();
    let mut parts: Vec<(String, String)> = Vec::new();
    for (index, (name, data)) in sheets.iter().enumerate() {
        let number = index + 1;
        sheet_entries.push_str(&format!(r#"<sheet name="{name}" sheetId="{number}" r:id="rId{number}"/>"#));
        relationships.push_str(&format!(
            r#"<Relationship Id="rId{number}" Type="{WORKSHEET_TYPE}" Target="worksheets/sheet{number}.xml"/>"#
        ));
        parts.push((
            format!("xl/worksheets/sheet{number}.xml"),
            format!(r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="{MAIN_NS}"><sheetData>{data}</sheetData></worksheet>"#),
        ));
    }
    relationships.push_str(&format!(
        r#"<Relationship Id="rIdStyles" Type="{STYLES_TYPE}" Target="styles.xml"/>"#
    ));

    let date1904 = if date1904 { "1" } else { "0" };
    parts.push((
        "xl/workbook.xml".to_owned(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><workbookPr date1904="{date1904}"/><sheets>{sheet_entries}</sheets></workbook>"#
        ),
    ));
    parts.push((
        "xl/_rels/workbook.xml.rels".to_owned(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{relationships}</Relationships>"#
        ),
    ));
    parts.push(("xl/styles.xml".to_owned(), STYLES.to_owned()));
    if !shared_strings.is_empty() {
        let items: String = shared_strings.iter().map(|item| format!("<si>{item}</si>")).collect();
        parts.push((
            "xl/sharedStrings.xml".to_owned(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><sst xmlns="{MAIN_NS}" count="{0}" uniqueCount="{0}">{items}</sst>"#,
                shared_strings.len()
            ),
        ));
    }

    let parts: Vec<(&str, &str)> = parts
        .iter()
        .map(|(name, content)| (name.as_str(), content.as_str()))
        .collect();
    zip_bytes(&parts)
}

/// A `<row>` element with the given 1-based row number.
pub(crate) fn row(number: usize, cells: &[String]) -> String {
    format!(r#"<row r="{number}">{}</row>"#, cells.concat())
}

/// An inline string cell; `text` is inserted as XML, so escape it.
pub(crate) fn inline_cell(reference: &str, text: &str) -> String {
    format!(r#"<c r="{reference}" t="inlineStr"><is><t>{text}</t></is></c>"#)
}

/// A cell referencing the shared string table.
pub(crate) fn shared_cell(reference: &str, index: usize) -> String {
    format!(r#"<c r="{reference}" t="s"><v>{index}</v></c>"#)
}

const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
const FREE_SECTOR: u32 = 0xFFFF_FFFF;
const FAT_SECTOR: u32 = 0xFFFF_FFFD;
const NO_STREAM: u32 = 0xFFFF_FFFF;

/// Appends `data` to `storage` as a chain of `size`-byte sectors and records
/// the chain in `table`. Returns the first sector id.
fn allocate_chain(storage: &mut Vec<u8>, table: &mut Vec<u32>, data: &[u8], size: usize) -> u32 {
    if data.is_empty() {
        return END_OF_CHAIN;
    }
    let start = table.len();
    let count = data.len().div_ceil(size);
    for index in 0..count {
        table.push(if index + 1 < count { (start + index + 1) as u32 } else { END_OF_CHAIN });
    }
    storage.extend_from_slice(data);
    storage.resize((start + count) * size, 0);
    start as u32
}

fn directory_entry(name: &str, kind: u8, child: u32, sibling: u32, start: u32, size: u64) -> Vec<u8> {
    let mut entry = vec![0u8; 128];
    let units: Vec<u16> = name.encode_utf16().collect();
    for (index, unit) in units.iter().enumerate() {
        entry[index * 2..index * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    entry[64..66].copy_from_slice(&(((units.len() + 1) * 2) as u16).to_le_bytes());
    entry[66] = kind;
    entry[67] = 1; // Black
    entry[68..72].copy_from_slice(&NO_STREAM.to_le_bytes());
    entry[72..76].copy_from_slice(&sibling.to_le_bytes());
    entry[76..80].copy_from_slice(&child.to_le_bytes());
    entry[116..120].copy_from_slice(&start.to_le_bytes());
    entry[120..128].copy_from_slice(&size.to_le_bytes());
    entry
}

/// Packs named streams into a version 3 compound file. Streams under 4096
/// bytes are stored in the mini stream.
pub(crate) fn compound_file_bytes(streams: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut sectors = Vec::<u8>::new();
    let mut fat = Vec::<u32>::new();
    let mut mini_stream = Vec::<u8>::new();
    let mut mini_fat = Vec::<u32>::new();

    let mut entries = Vec::new();
    for (name, data) in streams {
        let start = if data.len() >= 4096 {
            allocate_chain(&mut sectors, &mut fat, data, 512)
        } else {
            allocate_chain(&mut mini_stream, &mut mini_fat, data, 64)
        };
        entries.push((name, start, data.len() as u64));
    }
    let root_start = allocate_chain(&mut sectors, &mut fat, &mini_stream, 512);
    let mini_fat_bytes: Vec<u8> = mini_fat.iter().flat_map(|id| id.to_le_bytes()).collect();
    let mini_fat_start = allocate_chain(&mut sectors, &mut fat, &mini_fat_bytes, 512);

    let first_child = if entries.is_empty() { NO_STREAM } else { 1 };
    let mut directory = directory_entry("Root Entry", 5, first_child, NO_STREAM, root_start, mini_stream.len() as u64);
    for (index, (name, start, size)) in entries.iter().enumerate() {
        let sibling = if index + 1 < entries.len() { index as u32 + 2 } else { NO_STREAM };
        directory.extend(directory_entry(name, 2, NO_STREAM, sibling, *start, *size));
    }
    let directory_start = allocate_chain(&mut sectors, &mut fat, &directory, 512);

    // Each FAT sector holds 128 ids, including its own
    let data_sectors = fat.len();
    let fat_sectors = data_sectors.div_ceil(127);
    fat.extend(std::iter::repeat(FAT_SECTOR).take(fat_sectors));
    fat.resize(fat_sectors * 128, FREE_SECTOR);
    sectors.extend(fat.iter().flat_map(|id| id.to_le_bytes()));

    let mut header = vec![0u8; 512];
    let mut put = |offset: usize, bytes: &[u8]| header[offset..offset + bytes.len()].copy_from_slice(bytes);
    put(0, &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]);
    put(24, &0x003Eu16.to_le_bytes());
    put(26, &3u16.to_le_bytes());
    put(28, &0xFFFEu16.to_le_bytes());
    put(30, &9u16.to_le_bytes());
    put(32, &6u16.to_le_bytes());
    put(44, &(fat_sectors as u32).to_le_bytes());
    put(48, &directory_start.to_le_bytes());
    put(56, &4096u32.to_le_bytes());
    put(60, &mini_fat_start.to_le_bytes());
    put(64, &(mini_fat_bytes.len().div_ceil(512) as u32).to_le_bytes());
    put(68, &END_OF_CHAIN.to_le_bytes());
    for index in 0..109 {
        let id = if index < fat_sectors { (data_sectors + index) as u32 } else { FREE_SECTOR };
        put(76 + index * 4, &id.to_le_bytes());
    }

    [header, sectors].concat()
}

/// A BIFF record: type, payload size and payload.
pub(crate) fn biff_record(kind: u16, data: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(data.len() + 4);
    record.extend(kind.to_le_bytes());
    record.extend((data.len() as u16).to_le_bytes());
    record.extend_from_slice(data);
    record
}

/// Option byte and characters of a BIFF string, compressed when every
/// character fits in one byte.
fn biff_characters(text: &str) -> Vec<u8> {
    if text.chars().all(|character| (character as u32) < 0x100) {
        [vec![0u8], text.chars().map(|character| character as u8).collect()].concat()
    } else {
        [vec![1u8], text.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()].concat()
    }
}

fn biff_string(text: &str) -> Vec<u8> {
    [(text.encode_utf16().count() as u16).to_le_bytes().to_vec(), biff_characters(text)].concat()
}

fn biff_cell(kind: u16, row: u16, col: u16, xf: u16, data: &[u8]) -> Vec<u8> {
    let mut cell = [row.to_le_bytes(), col.to_le_bytes(), xf.to_le_bytes()].concat();
    cell.extend_from_slice(data);
    biff_record(kind, &cell)
}

fn biff_bof(kind: u16) -> Vec<u8> {
    let mut data = vec![0u8; 16];
    data[0..2].copy_from_slice(&0x0600u16.to_le_bytes());
    data[2..4].copy_from_slice(&kind.to_le_bytes());
    biff_record(0x0809, &data)
}

pub(crate) fn biff_number(row: u16, col: u16, xf: u16, value: f64) -> Vec<u8> {
    biff_cell(0x0203, row, col, xf, &value.to_le_bytes())
}

/// An RK cell holding a 30-bit integer.
pub(crate) fn biff_rk(row: u16, col: u16, xf: u16, value: i32) -> Vec<u8> {
    biff_cell(0x027E, row, col, xf, &((value << 2) | 0x02).to_le_bytes())
}

/// A MULRK run of integers starting at `first_col`, all with style `xf`.
pub(crate) fn biff_mul_rk(row: u16, first_col: u16, xf: u16, values: &[i32]) -> Vec<u8> {
    let mut data = [row.to_le_bytes(), first_col.to_le_bytes()].concat();
    for value in values {
        data.extend(xf.to_le_bytes());
        data.extend(((value << 2) | 0x02).to_le_bytes());
    }
    data.extend((first_col + values.len() as u16 - 1).to_le_bytes());
    biff_record(0x00BD, &data)
}

pub(crate) fn biff_label_sst(row: u16, col: u16, index: u32) -> Vec<u8> {
    biff_cell(0x00FD, row, col, 0, &index.to_le_bytes())
}

pub(crate) fn biff_label(row: u16, col: u16, text: &str) -> Vec<u8> {
    biff_cell(0x0204, row, col, 0, &biff_string(text))
}

pub(crate) fn biff_bool(row: u16, col: u16, value: bool) -> Vec<u8> {
    biff_cell(0x0205, row, col, 0, &[value as u8, 0])
}

pub(crate) fn biff_error(row: u16, col: u16, code: u8) -> Vec<u8> {
    biff_cell(0x0205, row, col, 0, &[code, 1])
}

fn biff_formula(row: u16, col: u16, xf: u16, result: [u8; 8]) -> Vec<u8> {
    // Result, flags, cache id and an empty parsed expression
    let mut data = result.to_vec();
    data.extend([0u8; 8]);
    biff_cell(0x0006, row, col, xf, &data)
}

pub(crate) fn biff_formula_number(row: u16, col: u16, xf: u16, value: f64) -> Vec<u8> {
    biff_formula(row, col, xf, value.to_le_bytes())
}

/// A formula with a string result, followed by its STRING record.
pub(crate) fn biff_formula_string(row: u16, col: u16, text: &str) -> Vec<u8> {
    let formula = biff_formula(row, col, 0, [0, 0, 0, 0, 0, 0, 0xFF, 0xFF]);
    [formula, biff_record(0x0207, &biff_string(text))].concat()
}

/// Builds a legacy workbook from `(sheet name, cell records)` pairs. The code
/// page is UTF-16, so compressed strings are Latin-1.
pub(crate) fn xls_bytes(sheets: &[(&str, Vec<Vec<u8>>)], shared_strings: &[&str], date1904: bool) -> Vec<u8> {
    let mut globals = [
        biff_bof(0x0005),
        biff_record(0x0042, &1200u16.to_le_bytes()),
        biff_record(0x0022, &(date1904 as u16).to_le_bytes()),
        biff_record(0x041E, &[164u16.to_le_bytes().to_vec(), biff_string("yyyy\\-mm\\-dd\\ hh:mm")].concat()),
    ]
    .concat();
    for format in [0u16, 14, 164, 2, 21] {
        let mut xf = vec![0u8; 20];
        xf[2..4].copy_from_slice(&format.to_le_bytes());
        globals.extend(biff_record(0x00E0, &xf));
    }
    let mut table = [(shared_strings.len() as u32).to_le_bytes(), (shared_strings.len() as u32).to_le_bytes()].concat();
    for text in shared_strings {
        table.extend(biff_string(text));
    }
    globals.extend(biff_record(0x00FC, &table));

    // Sheet directory records have a fixed size up to the name
    let directory_size: usize = sheets
        .iter()
        .map(|(name, _)| 4 + 4 + 2 + biff_characters(name).len() + 1)
        .sum();
    let mut offset = globals.len() + directory_size + 4;
    let mut substreams = Vec::new();
    for (name, records) in sheets {
        let mut data = (offset as u32).to_le_bytes().to_vec();
        data.extend([0, 0, name.chars().count() as u8]);
        data.extend(biff_characters(name));
        globals.extend(biff_record(0x0085, &data));
        let substream = [biff_bof(0x0010), records.concat(), biff_record(0x000A, &[])].concat();
        offset += substream.len();
        substreams.push(substream);
    }
    globals.extend(biff_record(0x000A, &[]));

    compound_file_bytes(&[("Workbook", [globals, substreams.concat()].concat())])
}
