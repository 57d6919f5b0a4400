//! Microsoft Office Binary Interchange File Format (BIFF8)
//! Record reader for the workbook stream of Excel 97-2003 files (.xls)

use crate::helpers::bytes::to_f64;
use crate::helpers::bytes::to_u16;
use crate::helpers::bytes::to_u32;
use crate::helpers::bytes::to_u64;
use crate::spreadsheet::SpreadsheetError;
use encoding_rs::Encoding;
use encoding_rs::UTF_16LE;
use encoding_rs::WINDOWS_1252;
use thiserror::Error;

const CONTINUE: u16 = 60;

/// Errors specific to BIFF8 record parsing
#[derive(Error, Debug)]
pub enum Biff8Error {
    #[error("Fewer than {0} bytes remaining in record")]
    NoEnoughDataError(usize),
}

/// Reader over a BIFF8 record stream.
///
/// A record's payload may be split over trailing `CONTINUE` records; the
/// reader keeps the payload as a list of chunks and reads walk them in order.
pub(crate) struct Biff8Reader {
    /// Code page of 8-bit strings, set from the `CodePage` record
    pub(crate) encoding: &'static Encoding,
    buffer: Vec<u8>,
    pointer: usize,              // Start of the next record
    chunks: Vec<(usize, usize)>, // Payload chunks (start, end) of the current record
    index: usize,                // Current chunk
    offset: usize,               // Offset within the current chunk
}

impl Biff8Reader {
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: WINDOWS_1252,
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Moves to the next record and returns its type, `None` at end of stream.
    pub(crate) fn next(&mut self) -> Result<Option<u16>, SpreadsheetError> {
        if self.pointer + 4 > self.buffer.len() {
            return Ok(None);
        }
        self.index = 0;
        self.offset = 0;
        self.chunks.clear();

        let kind = self.get_u16_at(self.pointer)?;
        self.push_chunk()?;
        while self.pointer + 4 <= self.buffer.len() && self.get_u16_at(self.pointer)? == CONTINUE {
            self.push_chunk()?;
        }
        Ok(Some(kind))
    }

    /// Registers the payload of the record header at `pointer` and skips past it.
    fn push_chunk(&mut self) -> Result<(), SpreadsheetError> {
        let size = self.get_u16_at(self.pointer + 2)? as usize;
        let lower = self.pointer + 4;
        let upper = self.buffer.len().min(lower + size);
        self.chunks.push((lower, upper));
        self.pointer = upper;
        Ok(())
    }

    /// Positions the reader at an absolute stream offset, such as a sheet's `BOF`.
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
        self.chunks.clear();
    }

    /// Reads up to `length` bytes from the current chunk; empty once the record is exhausted.
    fn read(&mut self, length: usize) -> &[u8] {
        while let Some(&(lower, upper)) = self.chunks.get(self.index) {
            let source = lower + self.offset;
            if source >= upper {
                self.index += 1;
                self.offset = 0;
                continue;
            }
            let target = upper.min(source + length);
            self.offset += target - source;
            return &self.buffer[source..target];
        }
        &[]
    }

    fn read_exact(&mut self, length: usize) -> Result<&[u8], SpreadsheetError> {
        let data = self.read(length);
        if data.len() == length {
            Ok(data)
        } else {
            Err(Biff8Error::NoEnoughDataError(length).into())
        }
    }

    fn is_chunk_exhausted(&self) -> bool {
        self.chunks
            .get(self.index)
            .map(|&(lower, upper)| lower + self.offset >= upper)
            .unwrap_or(true)
    }

    /// Skips `length` bytes, crossing chunk boundaries.
    pub(crate) fn skip(&mut self, length: usize) -> Result<(), SpreadsheetError> {
        let mut remaining = length;
        while remaining > 0 {
            let size = self.read(remaining).len();
            if size == 0 {
                Err(Biff8Error::NoEnoughDataError(length))?
            }
            remaining -= size;
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, SpreadsheetError> {
        self.read_exact(1).map(|data| data[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, SpreadsheetError> {
        self.read_exact(2).map(to_u16)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, SpreadsheetError> {
        self.read_exact(4).map(to_u32)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, SpreadsheetError> {
        self.read_exact(8).map(to_u64)
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, SpreadsheetError> {
        self.read_exact(8).map(to_f64)
    }

    /// Gets the 16-bit value `offset` bytes before the end of the current record.
    pub(crate) fn get_u16_back(&self, offset: usize) -> Result<u16, SpreadsheetError> {
        let mut offset = offset;
        for &(lower, upper) in self.chunks.iter().rev() {
            if lower + offset <= upper {
                return self.get_u16_at(upper - offset);
            }
            offset -= upper - lower;
        }
        Err(Biff8Error::NoEnoughDataError(2).into())
    }

    fn get_u16_at(&self, index: usize) -> Result<u16, SpreadsheetError> {
        match self.buffer.get(index..index + 2) {
            Some(bytes) => Ok(to_u16(bytes)),
            None => Err(Biff8Error::NoEnoughDataError(2).into()),
        }
    }

    /// Reads an RK number, the compressed form of integers and doubles.
    /// Bit 0 marks a value scaled by 100, bit 1 a 30-bit integer; otherwise
    /// the upper 30 bits hold the upper bits of an IEEE double.
    pub(crate) fn read_rk_number(&mut self) -> Result<f64, SpreadsheetError> {
        let rk = self.read_u32()?;
        let value = if rk & 0x02 != 0 {
            ((rk as i32) >> 2) as f64
        } else {
            f64::from_bits(((rk >> 2) as u64) << 34)
        };
        Ok(if rk & 0x01 != 0 { value / 100.0 } else { value })
    }

    /// Reads a string with a 1-byte character count (sheet names).
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, SpreadsheetError> {
        let chars = self.read_u8()? as usize;
        let flag = self.read_u8()?;
        let mut string = String::new();
        self.read_chars_into(chars, flag, &mut string)?;
        Ok(string)
    }

    /// Reads a string with a 2-byte character count (labels, formats, formula results).
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, SpreadsheetError> {
        let chars = self.read_u16()? as usize;
        let flag = self.read_u8()?;
        let mut string = String::new();
        self.read_chars_into(chars, flag, &mut string)?;
        Ok(string)
    }

    /// Reads a shared string table entry, dropping its formatting runs and
    /// phonetic data.
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, SpreadsheetError> {
        let chars = self.read_u16()? as usize;
        let flag = self.read_u8()?;
        let runs = if flag & 0x08 != 0 { self.read_u16()? as usize } else { 0 };
        let phonetic_size = if flag & 0x04 != 0 { self.read_u32()? as usize } else { 0 };
        let mut string = String::new();
        self.read_chars_into(chars, flag, &mut string)?;
        self.skip(4 * runs)?;
        self.skip(phonetic_size)?;
        Ok(string)
    }

    /// Decodes `chars` characters. When the characters run into a `CONTINUE`
    /// record, that record starts with a fresh option byte.
    fn read_chars_into(&mut self, chars: usize, flag: u8, content: &mut String) -> Result<(), SpreadsheetError> {
        let mut is_high_byte = flag & 0x01 != 0;
        let mut remaining = chars;
        while remaining > 0 {
            if self.is_chunk_exhausted() {
                self.index += 1;
                self.offset = 0;
                is_high_byte = self.read_u8()? & 0x01 != 0;
            }
            let encoding = self.encoding;
            let length = if is_high_byte { remaining * 2 } else { remaining };
            let bytes = self.read(length);
            if bytes.is_empty() {
                Err(Biff8Error::NoEnoughDataError(length))?
            }
            let size = bytes.len();
            if is_high_byte {
                content.push_str(&UTF_16LE.decode_without_bom_handling(bytes).0);
            } else if encoding == UTF_16LE {
                content.extend(bytes.iter().map(|&byte| byte as char));
            } else {
                content.push_str(&encoding.decode_without_bom_handling(bytes).0);
            }
            remaining = remaining.saturating_sub(if is_high_byte { size / 2 } else { size });
        }
        Ok(())
    }
}

/// Loops over the records of a `Biff8Reader`, dispatching on the record type
/// and ignoring unmatched records.
#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: u16, data: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(kind.to_le_bytes());
        bytes.extend((data.len() as u16).to_le_bytes());
        bytes.extend(data);
        bytes
    }

    #[test]
    fn records_and_continuations() -> Result<(), SpreadsheetError> {
        let stream = [
            record(0x0809, &[0, 6, 16, 0]),
            record(0x0203, &[1, 0, 2, 0]),
            record(CONTINUE, &[3, 0]),
            record(0x000A, &[]),
        ]
        .concat();
        let mut reader = Biff8Reader::new(stream);

        assert_eq!(reader.next()?, Some(0x0809));
        assert_eq!(reader.next()?, Some(0x0203));
        assert_eq!(reader.read_u16()?, 1);
        assert_eq!(reader.read_u16()?, 2);
        assert_eq!(reader.read_u16()?, 3);
        assert_eq!(reader.get_u16_back(2)?, 3);
        assert!(reader.read_u8().is_err());
        assert_eq!(reader.next()?, Some(0x000A));
        assert_eq!(reader.next()?, None);
        Ok(())
    }

    #[test]
    fn rk_numbers() -> Result<(), SpreadsheetError> {
        let integer = ((-42i32 << 2) | 0x02) as u32;
        let percent = (1234u32 << 2) | 0x03;
        let double = ((1.5f64.to_bits() >> 34) as u32) << 2;
        let data: Vec<u8> = [integer, percent, double].iter().flat_map(|rk| rk.to_le_bytes()).collect();
        let mut reader = Biff8Reader::new(record(0x027E, &data));
        reader.next()?;

        assert_eq!(reader.read_rk_number()?, -42.0);
        assert_eq!(reader.read_rk_number()?, 12.34);
        assert_eq!(reader.read_rk_number()?, 1.5);
        Ok(())
    }

    #[test]
    fn compressed_and_utf16_strings() -> Result<(), SpreadsheetError> {
        let mut data = vec![4, 0, 0];
        data.extend(b"Caf\xE9");
        data.extend([2, 0, 1]);
        data.extend("日本".encode_utf16().flat_map(|unit| unit.to_le_bytes()));
        let mut reader = Biff8Reader::new(record(0x0204, &data));
        reader.encoding = UTF_16LE;
        reader.next()?;

        assert_eq!(reader.read_xl_unicode_string()?, "Café");
        assert_eq!(reader.read_xl_unicode_string()?, "日本");
        Ok(())
    }

    #[test]
    fn string_split_over_continue_record() -> Result<(), SpreadsheetError> {
        // 6 characters with one formatting run: 3 compressed characters in the
        // record, the rest as UTF-16 in the continuation, then the run
        let mut head = vec![6, 0, 0x08, 1, 0];
        head.extend(b"abc");
        let mut tail = vec![0x01];
        tail.extend("déf".encode_utf16().flat_map(|unit| unit.to_le_bytes()));
        tail.extend([0, 0, 0, 0]);
        tail.extend([1, 0, 0, b'z']);
        let stream = [record(0x00FC, &head), record(CONTINUE, &tail)].concat();
        let mut reader = Biff8Reader::new(stream);
        reader.next()?;

        assert_eq!(reader.read_xl_unicode_rich_extended_string()?, "abcdéf");
        assert_eq!(reader.read_xl_unicode_rich_extended_string()?, "z");
        Ok(())
    }

    #[test]
    fn code_page_strings() -> Result<(), SpreadsheetError> {
        let data = [2, 0, 0, 0xC4, 0xE3];
        let mut reader = Biff8Reader::new(record(0x0204, &data));
        reader.encoding = encoding_rs::GBK;
        reader.next()?;
        assert_eq!(reader.read_xl_unicode_string()?, "你");
        Ok(())
    }
}
