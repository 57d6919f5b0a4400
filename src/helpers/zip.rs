//! Part lookup inside the zip container of an Office Open XML workbook.
//!
//! Producers disagree on the spelling of part names: some upper-case them,
//! some write Windows separators, some keep the leading `/` of the
//! relationship target. Lookups compare normalised names instead.

use crate::helpers::xml::XmlReader;
use crate::spreadsheet::SpreadsheetError;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::ZipArchive;

/// Whether an archive entry name denotes the part `name`.
fn is_same_part(entry: &str, name: &str) -> bool {
    let entry = entry.trim_start_matches(['/', '\\']);
    let name = name.trim_start_matches(['/', '\\']);
    entry.len() == name.len()
        && entry
            .bytes()
            .zip(name.bytes())
            .all(|(left, right)| match (left, right) {
                (b'\\' | b'/', b'\\' | b'/') => true,
                _ => left.eq_ignore_ascii_case(&right),
            })
}

pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Index of the entry holding the part `name`, if the archive has one.
    fn find_part(&self, name: &str) -> Option<usize>;

    /// Opens the part `name`, `None` if the archive has no such part.
    fn part(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, SpreadsheetError>;

    /// Opens the part `name` for XML pull parsing.
    fn xml_part(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, SpreadsheetError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn find_part(&self, name: &str) -> Option<usize> {
        (0..self.len()).find(|&index| {
            self.name_for_index(index)
                .is_some_and(|entry| is_same_part(entry, name))
        })
    }

    fn part(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, SpreadsheetError> {
        match self.find_part(name) {
            Some(index) => Ok(Some(self.by_index(index)?)),
            None => Ok(None),
        }
    }

    fn xml_part(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, SpreadsheetError> {
        Ok(self.part(name)?.map(|file| XmlReader::new(BufReader::new(file))))
    }
}
