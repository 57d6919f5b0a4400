//! Compound File Binary Format (CFB)
//! The OLE container of legacy Office documents, such as Excel 97-2003 workbooks (.xls)

use crate::helpers::bytes::to_u16;
use crate::helpers::bytes::to_u32;
use crate::helpers::bytes::to_u64;
use crate::helpers::bytes::to_usize;
use crate::helpers::bytes::to_usize_iter;
use crate::spreadsheet::SpreadsheetError;
use encoding_rs::UTF_16LE;
use thiserror::Error;

const SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;
const HEADER_SIZE: usize = 512;
const DIRECTORY_ENTRY_SIZE: usize = 128;
const MINI_SECTOR_SIZE: usize = 64;
const MINI_STREAM_CUTOFF: usize = 4096;
const MAX_REG_SECT: usize = 0xFFFF_FFFB;

const UNALLOCATED: u8 = 0;
const ROOT_STORAGE: u8 = 5;

/// Errors specific to the compound file container
#[derive(Error, Debug)]
pub enum CfbError {
    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,
    #[error("Invalid sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),
    #[error("Broken sector chain starting at sector {0}")]
    SectorChainError(usize),
    #[error("Compound file has no root storage")]
    RootStorageError,
    #[error("The file is corrupted or has an invalid compound file structure")]
    FileFormatError,
}

struct Header {
    major_version: u16,
    sector_shift: u16,
    fat_count: usize,
    directory_start: usize,
    mini_fat_start: usize,
    mini_fat_count: usize,
    difat_start: usize,
    difat_count: usize,
}

impl Header {
    fn new(data: &[u8]) -> Result<Header, SpreadsheetError> {
        if data.len() < HEADER_SIZE {
            Err(CfbError::FileFormatError)?
        }
        if to_u64(&data[0..8]) != SIGNATURE {
            Err(CfbError::OleSignatureError)?
        }
        Ok(Header {
            major_version: to_u16(&data[26..28]),
            sector_shift: to_u16(&data[30..32]),
            fat_count: to_usize(&data[44..48]),
            directory_start: to_usize(&data[48..52]),
            mini_fat_start: to_usize(&data[60..64]),
            mini_fat_count: to_usize(&data[64..68]),
            difat_start: to_usize(&data[68..72]),
            difat_count: to_usize(&data[72..76]),
        })
    }

    fn sector_size(&self) -> Result<usize, SpreadsheetError> {
        match (self.major_version, self.sector_shift) {
            (3, 9) | (4, 12) => Ok(1 << self.sector_shift),
            (version, shift) => Err(CfbError::SectorSizeError(version, shift).into()),
        }
    }
}

/// Fixed-size sectors laid over a byte buffer, starting at `base`.
struct Sectors {
    data: Vec<u8>,
    size: usize,
    base: usize,
}

impl Sectors {
    /// The sector at `index`; the last sector of the buffer may be short.
    fn get(&self, index: usize) -> Option<&[u8]> {
        let lower = index.checked_mul(self.size)?.checked_add(self.base)?;
        let upper = self.data.len().min(lower + self.size);
        (lower < upper).then(|| &self.data[lower..upper])
    }

    /// Concatenates the sectors of the chain starting at `start`.
    fn read_chain(&self, allocation_table: &[usize], start: usize) -> Result<Vec<u8>, SpreadsheetError> {
        let mut content = Vec::new();
        let mut index = start;
        let mut steps = 0;
        while index < MAX_REG_SECT {
            let sector = self.get(index).ok_or(CfbError::SectorChainError(start))?;
            content.extend_from_slice(sector);
            index = *allocation_table.get(index).ok_or(CfbError::SectorChainError(start))?;
            steps += 1;
            if steps > allocation_table.len() {
                Err(CfbError::SectorChainError(start))?
            }
        }
        Ok(content)
    }
}

struct Entry {
    name: String,
    kind: u8,
    start: usize,
    size: usize,
}

impl Entry {
    fn new(data: &[u8], major_version: u16) -> Option<Entry> {
        let kind = data[66];
        if kind == UNALLOCATED {
            return None;
        }
        let name_size = (to_u16(&data[64..66]) as usize).min(64);
        let name = UTF_16LE.decode_without_bom_handling(&data[..name_size]).0;
        // Version 3 files may leave garbage in the high half of the size
        let size = match major_version {
            3 => to_u32(&data[120..124]) as usize,
            _ => to_u64(&data[120..128]) as usize,
        };
        Some(Entry {
            name: name.trim_end_matches('\0').to_owned(),
            kind,
            start: to_usize(&data[116..120]),
            size,
        })
    }
}

/// Compound file opened from memory, giving access to its streams by name.
pub(crate) struct Cfb {
    entries: Vec<Entry>,
    file_allocation_table: Vec<usize>,
    sectors: Sectors,
    mini_file_allocation_table: Vec<usize>,
    mini_sectors: Sectors,
}

impl Cfb {
    /// Parses the header, allocation tables and directory of a compound file.
    ///
    /// # Arguments
    ///
    /// * `data` - The complete file content
    ///
    /// # Returns
    ///
    /// * `Result<Cfb, SpreadsheetError>` - The container, or an error if any
    ///   structure is truncated, cyclic or points outside the file
    pub(crate) fn new(data: Vec<u8>) -> Result<Cfb, SpreadsheetError> {
        let header = Header::new(&data)?;
        let sector_size = header.sector_size()?;
        let sectors = Sectors {
            data,
            size: sector_size,
            base: sector_size,
        };

        let file_allocation_table = load_file_allocation_table(&sectors, &header)?;
        let directory = sectors.read_chain(&file_allocation_table, header.directory_start)?;
        let entries: Vec<Entry> = directory
            .chunks_exact(DIRECTORY_ENTRY_SIZE)
            .filter_map(|data| Entry::new(data, header.major_version))
            .collect();

        let root = entries
            .iter()
            .find(|entry| entry.kind == ROOT_STORAGE)
            .ok_or(CfbError::RootStorageError)?;
        let mut mini_stream = sectors.read_chain(&file_allocation_table, root.start)?;
        mini_stream.truncate(root.size);
        let mini_file_allocation_table = match header.mini_fat_count {
            0 => Vec::new(),
            _ => to_usize_iter(&sectors.read_chain(&file_allocation_table, header.mini_fat_start)?).collect(),
        };

        Ok(Cfb {
            entries,
            file_allocation_table,
            sectors,
            mini_file_allocation_table,
            mini_sectors: Sectors {
                data: mini_stream,
                size: MINI_SECTOR_SIZE,
                base: 0,
            },
        })
    }

    fn find(&self, name: &str) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|entry| entry.kind != ROOT_STORAGE && entry.name.eq_ignore_ascii_case(name))
    }

    /// Whether the container has a stream or storage called `name`.
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Reads the stream `name`, `None` if the container has no such entry.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, SpreadsheetError> {
        let Some(entry) = self.find(name) else {
            return Ok(None);
        };
        let mut content = if entry.size < MINI_STREAM_CUTOFF {
            self.mini_sectors.read_chain(&self.mini_file_allocation_table, entry.start)?
        } else {
            self.sectors.read_chain(&self.file_allocation_table, entry.start)?
        };
        if content.len() < entry.size {
            Err(CfbError::SectorChainError(entry.start))?
        }
        content.truncate(entry.size);
        Ok(Some(content))
    }
}

/// Collects the FAT sector ids from the header and the DIFAT chain, then
/// concatenates those sectors into the file allocation table.
fn load_file_allocation_table(sectors: &Sectors, header: &Header) -> Result<Vec<usize>, SpreadsheetError> {
    let mut difat: Vec<usize> = to_usize_iter(&sectors.data[76..HEADER_SIZE]).collect();
    let mut index = header.difat_start;
    let mut visited = 0;
    while index < MAX_REG_SECT {
        if visited == header.difat_count {
            Err(CfbError::FileFormatError)?
        }
        let sector = sectors.get(index).ok_or(CfbError::SectorChainError(index))?;
        difat.extend(to_usize_iter(sector));
        // The last entry of a DIFAT sector links to the next one
        index = difat.pop().ok_or(CfbError::FileFormatError)?;
        visited += 1;
    }

    let fat_sectors: Vec<usize> = difat
        .into_iter()
        .filter(|&index| index < MAX_REG_SECT)
        .take(header.fat_count)
        .collect();
    if fat_sectors.len() != header.fat_count {
        Err(CfbError::FileFormatError)?
    }

    let mut file_allocation_table = Vec::with_capacity(fat_sectors.len() * sectors.size / 4);
    for index in fat_sectors {
        let sector = sectors.get(index).ok_or(CfbError::SectorChainError(index))?;
        file_allocation_table.extend(to_usize_iter(sector));
    }
    Ok(file_allocation_table)
}
