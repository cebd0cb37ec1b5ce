//! OLE Compound File Binary (CFB) reader for legacy Excel (.xls) format
//! Parses the container in place over the borrowed input bytes

use crate::error::SheetError;
use crate::helpers::string::to_u16;
use crate::helpers::string::to_u32;
use crate::helpers::string::to_u64;
use crate::helpers::string::to_usize;
use crate::helpers::string::to_usize_iter;
use encoding_rs::UTF_16LE;
use std::borrow::Cow;
use std::collections::HashMap;
use thiserror::Error;

const MAX_REG_SECT: usize = 0xFFFFFFFB;
/// Streams smaller than this live in the mini stream
const MINI_STREAM_CUTOFF: usize = 4096;
const MINI_SECTOR_SIZE: usize = 64;
const HEADER_SIZE: usize = 512;
const DIRECTORY_SIZE: usize = 128;

/// Errors specific to Compound File Binary format parsing
#[derive(Error, Debug)]
pub(crate) enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid Sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("The number of double indirect file allocation table error: expect '{0}', actual '{1}'")]
    DoubleIndirectFileAllocationTableError(usize, usize),

    #[error("The number of file allocation table error: expect '{0}', actual '{1}'")]
    FileAllocationTableError(usize, usize),

    #[error("Sector '{0}' is out of range")]
    SectorRangeError(usize),

    #[error("Sector chain starting at '{0}' is cyclic or truncated")]
    SectorChainError(usize),

    #[error("Empty Root directory")]
    RootDirectoryError,
}

/// Compound File Binary structure representing the entire OLE file
pub(crate) struct Cfb<'a> {
    /// Directory index mapping names to directory entries
    directories: HashMap<String, Directory>,
    /// File allocation table for regular sectors
    file_allocation_table: Vec<usize>,
    /// Regular sectors, borrowed from the input
    sectors: Sectors<'a>,
    /// Mini file allocation table for small streams
    mini_file_allocation_table: Vec<usize>,
    /// Mini sectors copied out of the mini stream
    mini_sectors: Sectors<'a>,
}

impl<'a> Cfb<'a> {
    /// Parses the compound file header, allocation tables and directory
    pub(crate) fn new(data: &'a [u8]) -> Result<Cfb<'a>, SheetError> {
        if data.len() < HEADER_SIZE {
            Err(CfbError::FileFormatError)?;
        }
        let header = Header::new(&data[..HEADER_SIZE])?;
        let sectors = Sectors {
            data: Cow::Borrowed(data),
            size: header.sector_size()?,
            offset: 1, // the header occupies the first sector slot
        };
        let file_allocation_table = Self::load_file_allocation_table(&sectors, &header)?;
        let directories = Self::load_directories(&file_allocation_table, &sectors, &header)?;
        let mini_file_allocation_table = Self::load_mini_file_allocation_table(&file_allocation_table, &sectors, &header)?;
        let mini_sectors = match directories.get("Root Entry") {
            Some(root) => Self::load_mini_sectors(&file_allocation_table, &sectors, root)?,
            None => Sectors { data: Cow::Owned(Vec::new()), size: MINI_SECTOR_SIZE, offset: 0 },
        };

        Ok(Cfb {
            directories,
            file_allocation_table,
            sectors,
            mini_file_allocation_table,
            mini_sectors,
        })
    }

    /// Checks if a stream exists in the CFB structure
    pub(crate) fn exists(&self, name: &str) -> bool {
        self.directories.contains_key(name)
    }

    /// Reads the contents of a stream from the CFB structure
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, SheetError> {
        if let Some(directory) = self.directories.get(name) {
            let mut bytes = if directory.count == 0 {
                Vec::new()
            } else if directory.count < MINI_STREAM_CUTOFF {
                Self::read_bytes(&self.mini_file_allocation_table, &self.mini_sectors, directory.index)?
            } else {
                Self::read_bytes(&self.file_allocation_table, &self.sectors, directory.index)?
            };
            if bytes.len() < directory.count {
                Err(CfbError::SectorChainError(directory.index))?
            }
            bytes.truncate(directory.count);
            Ok(Some(bytes))
        } else {
            Ok(None)
        }
    }

    /// Loads the file allocation table using the double indirect file allocation table
    fn load_file_allocation_table(sectors: &Sectors, header: &Header) -> Result<Vec<usize>, SheetError> {
        let mut double_indirect_file_allocation_table = Vec::<usize>::new();
        double_indirect_file_allocation_table.extend(to_usize_iter(sectors.slice(76, HEADER_SIZE)));

        let mut count = 0usize;
        let mut index = header.double_indirect_file_allocation_table_shift;
        while index < MAX_REG_SECT {
            if count > sectors.count() {
                Err(CfbError::SectorChainError(header.double_indirect_file_allocation_table_shift))?
            }
            double_indirect_file_allocation_table.extend(to_usize_iter(sectors.get(index)?));
            index = double_indirect_file_allocation_table.pop().ok_or(CfbError::FileFormatError)?;
            count += 1;
        }
        if count != header.double_indirect_file_allocation_table_count {
            Err(CfbError::DoubleIndirectFileAllocationTableError(header.double_indirect_file_allocation_table_count, count))?
        }

        let mut file_allocation_table: Vec<usize> = Vec::new();
        let mut count = 0usize;
        for index in double_indirect_file_allocation_table {
            if index < MAX_REG_SECT {
                file_allocation_table.extend(to_usize_iter(sectors.get(index)?));
                count += 1;
            }
        }
        if count != header.file_allocation_table_count {
            Err(CfbError::FileAllocationTableError(header.file_allocation_table_count, count))?
        }

        Ok(file_allocation_table)
    }

    /// Loads directory entries from the directory sector chain
    fn load_directories(file_allocation_table: &[usize], sectors: &Sectors, header: &Header) -> Result<HashMap<String, Directory>, SheetError> {
        let bytes = Self::read_bytes(file_allocation_table, sectors, header.directory_shift)?;
        let directories: HashMap<String, Directory> = bytes
            .chunks_exact(DIRECTORY_SIZE)
            .map(|chunk| Directory::new(chunk, header.major_version))
            .collect();
        if directories.is_empty() {
            Err(CfbError::RootDirectoryError)?
        }
        Ok(directories)
    }

    /// Loads the mini file allocation table for small streams
    fn load_mini_file_allocation_table(file_allocation_table: &[usize], sectors: &Sectors, header: &Header) -> Result<Vec<usize>, SheetError> {
        Ok(if header.mini_file_allocation_table_sector_count > 0 {
            let mini_file_allocation_table = Self::read_bytes(file_allocation_table, sectors, header.mini_file_allocation_table_sector_shift)?;
            to_usize_iter(&mini_file_allocation_table).collect()
        } else {
            Vec::new()
        })
    }

    /// Loads the mini stream, stored as a regular stream owned by the root entry
    fn load_mini_sectors(file_allocation_table: &[usize], sectors: &Sectors, root: &Directory) -> Result<Sectors<'a>, SheetError> {
        let mut data = if root.count > 0 {
            Self::read_bytes(file_allocation_table, sectors, root.index)?
        } else {
            Vec::new()
        };
        data.truncate(root.count);
        Ok(Sectors { data: Cow::Owned(data), size: MINI_SECTOR_SIZE, offset: 0 })
    }

    /// Reads a complete stream by following the allocation table chain.
    /// Each sector is read at most once, so a stream never outgrows its sector storage.
    fn read_bytes(file_allocation_table: &[usize], sectors: &Sectors, index: usize) -> Result<Vec<u8>, SheetError> {
        let start = index;
        let mut content: Vec<u8> = Vec::new();
        let mut visited = vec![false; sectors.count()];
        let mut index = index;
        while index < MAX_REG_SECT {
            let seen = visited.get_mut(index).ok_or(CfbError::SectorRangeError(index))?;
            if *seen {
                Err(CfbError::SectorChainError(start))?
            }
            *seen = true;
            content.extend_from_slice(sectors.get(index)?);
            index = *file_allocation_table.get(index).ok_or(CfbError::SectorRangeError(index))?;
        }
        Ok(content)
    }
}

/// Sector storage for either the file body or the mini stream
#[derive(Debug)]
struct Sectors<'a> {
    data: Cow<'a, [u8]>,
    /// Size of individual sectors
    size: usize,
    /// Number of sector slots preceding sector 0
    offset: usize,
}

impl Sectors<'_> {
    /// Gets the data for the sector at the specified index
    fn get(&self, index: usize) -> Result<&[u8], CfbError> {
        let source = index
            .checked_add(self.offset)
            .and_then(|slot| slot.checked_mul(self.size))
            .filter(|source| *source < self.data.len())
            .ok_or(CfbError::SectorRangeError(index))?;
        let target = self.data.len().min(source + self.size);
        Ok(&self.data[source..target])
    }

    /// Gets a slice of data from the specified range
    fn slice(&self, lower: usize, upper: usize) -> &[u8] {
        let upper = upper.min(self.data.len());
        &self.data[lower.min(upper)..upper]
    }

    /// Number of whole or partial sectors available
    fn count(&self) -> usize {
        self.data.len().div_ceil(self.size)
    }
}

/// CFB file header structure
#[derive(Debug)]
struct Header {
    signature: u64,
    major_version: u16,
    sector_shift: u16,
    file_allocation_table_count: usize,
    directory_shift: usize,
    mini_file_allocation_table_sector_shift: usize,
    mini_file_allocation_table_sector_count: usize,
    double_indirect_file_allocation_table_shift: usize,
    double_indirect_file_allocation_table_count: usize,
}

impl Header {
    /// Parses the CFB header from the first 512 bytes of data
    fn new(data: &[u8]) -> Result<Self, SheetError> {
        let header = Header {
            signature: to_u64(&data[0..8]),
            major_version: to_u16(&data[26..28]),
            sector_shift: to_u16(&data[30..32]),
            file_allocation_table_count: to_usize(&data[44..48]),
            directory_shift: to_usize(&data[48..52]),
            mini_file_allocation_table_sector_shift: to_usize(&data[60..64]),
            mini_file_allocation_table_sector_count: to_usize(&data[64..68]),
            double_indirect_file_allocation_table_shift: to_usize(&data[68..72]),
            double_indirect_file_allocation_table_count: to_usize(&data[72..76]),
        };

        if header.signature != 0xE11A_B1A1_E011_CFD0 {
            Err(CfbError::OleSignatureError)?;
        }

        Ok(header)
    }

    /// Calculates the sector size based on major version and sector shift
    fn sector_size(&self) -> Result<usize, SheetError> {
        if self.major_version == 3 && self.sector_shift == 0x0009 {
            Ok(512) // 2 ^ 9
        } else if self.major_version == 4 && self.sector_shift == 0x000C {
            // The rest of the 4096-byte header sector is zero filled
            Ok(4096) // 2 ^ 12
        } else {
            Err(CfbError::SectorSizeError(self.major_version, self.sector_shift))?
        }
    }
}

/// Directory entry representing a stream or storage in the CFB structure
#[derive(Debug)]
struct Directory {
    index: usize,
    count: usize,
}

impl Directory {
    /// Creates a directory entry from a 128-byte record
    fn new(bytes: &[u8], major_version: u16) -> (String, Directory) {
        let size = (to_u16(&bytes[64..66]) as usize).min(64);
        let (name, _, _) = UTF_16LE.decode(&bytes[..size]);
        let name = match name.find('\0') {
            Some(position) => name[..position].to_owned(),
            None => name.to_string(),
        };

        let index = to_usize(&bytes[116..120]);
        // Version 3 files may leave garbage in the high half of the stream size
        let count = if major_version == 3 {
            to_u32(&bytes[120..124]) as usize
        } else {
            to_u64(&bytes[120..128]) as usize
        };
        (name, Directory { index, count })
    }
}
