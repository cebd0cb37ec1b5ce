//! Microsoft Office Binary Interchange File Format (BIFF8)
//! Reader for the record stream of Excel 97-2003 workbooks (.xls files)
//! Records are split into chunks by CONTINUE records; reads are chunk aware

use crate::error::SheetError;
use crate::helpers::string::to_f64;
use crate::helpers::string::to_u16;
use crate::helpers::string::to_u32;
use crate::helpers::string::to_u64;
use crate::helpers::string::to_usize;
use encoding_rs::UTF_16LE;
use thiserror::Error;

const CONTINUE: u16 = 60;

/// Errors specific to BIFF8 format parsing
#[derive(Error, Debug)]
pub(crate) enum Biff8Error {
    #[error("Fewer than {0} bytes remaining")]
    NoEnoughDataError(usize),

    #[error("Record 0x{0:04X} at offset {1} is truncated")]
    TruncatedRecordError(u16, usize),
}

/// Reader for BIFF8 (Excel 97-2003) binary format
pub(crate) struct Biff8Reader {
    buffer: Vec<u8>,
    pointer: usize, // Next record position in buffer
    chunks: Vec<(usize, usize)>, // Current record chunks (start, end)
    index: usize,  // Current chunk index
    offset: usize, // Offset within current chunk
}

impl Biff8Reader {
    /// Creates a new BIFF8 reader with the given workbook stream
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Reads the next record type and prepares for reading record data
    /// Returns None when no more records are available
    pub(crate) fn next(&mut self) -> Result<Option<u16>, SheetError> {
        if self.pointer + 4 > self.buffer.len() {
            return Ok(None);
        }
        self.index = 0;
        self.offset = 0;
        self.chunks.clear();

        let kind = self.get_u16_at(self.pointer)?;
        let (lower, upper) = self.record_bounds(kind)?;
        self.chunks.push((lower, upper));
        while self.pointer + 4 <= self.buffer.len() && self.get_u16_at(self.pointer)? == CONTINUE {
            let (lower, upper) = self.record_bounds(CONTINUE)?;
            self.chunks.push((lower, upper));
        }

        Ok(Some(kind))
    }

    /// Computes the data bounds of the record at the pointer and moves past it
    fn record_bounds(&mut self, kind: u16) -> Result<(usize, usize), SheetError> {
        let size = self.get_u16_at(self.pointer + 2)? as usize;
        let lower = self.pointer + 4;
        let upper = lower + size;
        if upper > self.buffer.len() {
            Err(Biff8Error::TruncatedRecordError(kind, self.pointer))?
        }
        self.pointer = upper;
        Ok((lower, upper))
    }

    /// Position of the record following the current one
    pub(crate) fn position(&self) -> usize {
        self.pointer
    }

    /// Sets the reader pointer to a specific position
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
    }

    /// Reads exactly `length` bytes, returning an error if insufficient data
    fn read_extract(&mut self, length: usize) -> Result<&[u8], SheetError> {
        let (source, size) = self.advance(length, true);
        if size == length {
            Ok(&self.buffer[source..source + size])
        } else {
            Err(Biff8Error::NoEnoughDataError(length))?
        }
    }

    /// Moves up to `length` bytes forward inside the current chunk
    /// When `next_chunk` is set an exhausted chunk is left for the following one
    /// Returns the start position and actual number of bytes covered
    fn advance(&mut self, length: usize, next_chunk: bool) -> (usize, usize) {
        while let Some((lower, upper)) = self.chunks.get(self.index).copied() {
            let source = upper.min(lower + self.offset);
            if source == upper && next_chunk && length > 0 {
                self.index += 1;
                self.offset = 0;
                continue;
            }
            let target = upper.min(source + length);
            let size = target - source;
            if target == upper {
                self.index += 1;
                self.offset = 0;
            } else {
                self.offset += size;
            }
            return (source, size);
        }
        (self.buffer.len(), 0)
    }

    /// Skips `length` bytes, crossing chunk boundaries when needed
    pub(crate) fn skip(&mut self, length: usize) -> Result<(), SheetError> {
        let mut remaining = length;
        while remaining > 0 {
            let (_, size) = self.advance(remaining, true);
            if size == 0 {
                Err(Biff8Error::NoEnoughDataError(remaining))?
            }
            remaining -= size;
        }
        Ok(())
    }

    /// Reads a single byte
    pub(crate) fn read_u8(&mut self) -> Result<u8, SheetError> {
        self.read_extract(1).map(|data| data[0])
    }

    /// Reads a 16-bit unsigned integer
    pub(crate) fn read_u16(&mut self) -> Result<u16, SheetError> {
        self.read_extract(2).map(to_u16)
    }

    /// Gets a 16-bit unsigned integer located `offset` bytes before the record end
    pub(crate) fn get_u16_back(&self, offset: usize) -> Result<u16, SheetError> {
        let mut offset = offset;
        for (lower, upper) in self.chunks.iter().rev() {
            if *lower + offset <= *upper {
                return self.get_u16_at(*upper - offset);
            } else {
                offset -= *upper - *lower;
            }
        }
        Err(Biff8Error::NoEnoughDataError(2))?
    }

    /// Gets a 16-bit unsigned integer from the specified absolute position
    pub(crate) fn get_u16_at(&self, index: usize) -> Result<u16, SheetError> {
        if index + 2 <= self.buffer.len() {
            Ok(to_u16(&self.buffer[index..index + 2]))
        } else {
            Err(Biff8Error::NoEnoughDataError(2))?
        }
    }

    /// Reads a 32-bit unsigned integer
    pub(crate) fn read_u32(&mut self) -> Result<u32, SheetError> {
        self.read_extract(4).map(to_u32)
    }

    /// Reads a usize value
    pub(crate) fn read_usize(&mut self) -> Result<usize, SheetError> {
        self.read_extract(4).map(to_usize)
    }

    /// Reads a 64-bit unsigned integer
    pub(crate) fn read_u64(&mut self) -> Result<u64, SheetError> {
        self.read_extract(8).map(to_u64)
    }

    /// Reads a 64-bit floating point number
    pub(crate) fn read_f64(&mut self) -> Result<f64, SheetError> {
        self.read_extract(8).map(to_f64)
    }

    /// Reads an RK number (compressed numeric format used in Excel)
    pub(crate) fn read_rk_number(&mut self) -> Result<f64, SheetError> {
        self.read_u32().map(decode_rk)
    }

    /// Reads a short Unicode string (1-byte length prefix)
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, SheetError> {
        let chars = self.read_u8()? as usize;
        self.read_string_body(chars, false)
    }

    /// Reads a Unicode string (2-byte length prefix)
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, SheetError> {
        let chars = self.read_u16()? as usize;
        self.read_string_body(chars, false)
    }

    /// Reads a rich extended Unicode string, skipping formatting runs and phonetic data
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, SheetError> {
        let chars = self.read_u16()? as usize;
        self.read_string_body(chars, true)
    }

    /// Reads the option flags and characters of a string
    /// A CONTINUE boundary inside the characters is followed by a fresh option byte
    fn read_string_body(&mut self, chars: usize, is_extended: bool) -> Result<String, SheetError> {
        let flag = self.read_u8()?;
        let rich_string_count = if is_extended && (flag & 0x8) > 0 {
            self.read_u16()? as usize
        } else {
            0
        };
        let phonetic_size = if is_extended && (flag & 0x4) > 0 {
            self.read_usize()?
        } else {
            0
        };

        let mut content = String::with_capacity(chars);
        let mut remaining = chars - self.read_chars_into(chars, (flag & 0x1) > 0, &mut content);
        while remaining > 0 {
            let flag = self.read_u8()?;
            remaining -= self.read_chars_into(remaining, (flag & 0x1) > 0, &mut content);
        }

        // Skip rgRun
        self.skip(4 * rich_string_count)?;
        // Skip ExtRst
        self.skip(phonetic_size)?;
        Ok(content)
    }

    /// Decodes up to `chars` characters from the current chunk and returns how many were read
    fn read_chars_into(&mut self, chars: usize, is_high_byte: bool, content: &mut String) -> usize {
        let expected = if is_high_byte { chars << 1 } else { chars };
        let (source, size) = self.advance(expected, false);
        let bytes = &self.buffer[source..source + size];
        if is_high_byte {
            let (string, _) = UTF_16LE.decode_without_bom_handling(&bytes[..size & !1]);
            content.push_str(&string);
            size >> 1
        } else {
            // Compressed characters are the low bytes of UTF-16 code units
            content.extend(bytes.iter().map(|byte| *byte as char));
            size
        }
    }
}

/// Decodes an RK value: a 30-bit integer or the high bits of an IEEE double, optionally divided by 100
pub(crate) fn decode_rk(value: u32) -> f64 {
    let is_percentage = (value & 0x01) != 0;
    let is_integer = (value & 0x02) != 0;
    let number = if is_integer {
        ((value as i32) >> 2) as f64
    } else {
        f64::from_bits(((value & 0xFFFF_FFFC) as u64) << 32)
    };
    if is_percentage {
        number / 100.0
    } else {
        number
    }
}

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
