#![allow(dead_code)]

use std::io::{Cursor, Write};

// Just enough BIFF8 to exercise both legacy readers.
const RECORD_BOF: u16 = 0x0809;
const RECORD_EOF: u16 = 0x000A;
const RECORD_CODEPAGE: u16 = 0x0042;
const RECORD_DATEMODE: u16 = 0x0022;
const RECORD_WINDOW1: u16 = 0x003D;
const RECORD_FILEPASS: u16 = 0x002F;
const RECORD_FONT: u16 = 0x0031;
const RECORD_XF: u16 = 0x00E0;
const RECORD_SST: u16 = 0x00FC;
const RECORD_BOUNDSHEET: u16 = 0x0085;
const RECORD_DIMENSIONS: u16 = 0x0200;
const RECORD_NUMBER: u16 = 0x0203;
const RECORD_LABELSST: u16 = 0x00FD;
const RECORD_BOOLERR: u16 = 0x0205;

const BOF_VERSION_BIFF8: u16 = 0x0600;
const BOF_DT_WORKBOOK_GLOBALS: u16 = 0x0005;
const BOF_DT_WORKSHEET: u16 = 0x0010;

const XF_FLAG_LOCKED: u16 = 0x0001;
const XF_FLAG_STYLE: u16 = 0x0004;

/// Cell XF with the General number format
pub const XF_GENERAL: u16 = 16;
/// Cell XF with the built-in `m/d/yyyy` date format
pub const XF_DATE: u16 = 17;

/// A cell of a fixture worksheet, 0-based row and column
#[derive(Clone, Debug)]
pub enum FixtureCell {
    Number(u16, u16, f64),
    Date(u16, u16, f64),
    Text(u16, u16, &'static str),
    Bool(u16, u16, bool),
}

/// Builds a BIFF8 `.xls` compound file holding one worksheet per entry of `sheets`.
/// Text cells go through the shared string table.
pub fn build_workbook_xls(sheets: &[(&str, Vec<FixtureCell>)]) -> Vec<u8> {
    into_compound_file(&build_workbook_stream(sheets))
}

/// Builds a workbook whose globals carry a `FILEPASS` record
pub fn build_encrypted_xls() -> Vec<u8> {
    let mut globals = Vec::<u8>::new();
    push_record(&mut globals, RECORD_BOF, &bof(BOF_DT_WORKBOOK_GLOBALS));
    push_record(&mut globals, RECORD_FILEPASS, &[0u8; 6]);
    push_record(&mut globals, RECORD_EOF, &[]);
    into_compound_file(&globals)
}

fn into_compound_file(workbook_stream: &[u8]) -> Vec<u8> {
    let cursor = Cursor::new(Vec::new());
    let mut ole = cfb::CompoundFile::create(cursor).expect("create cfb");
    {
        let mut stream = ole.create_stream("Workbook").expect("Workbook stream");
        stream.write_all(workbook_stream).expect("write Workbook stream");
    }
    ole.into_inner().into_inner()
}

fn build_workbook_stream(sheets: &[(&str, Vec<FixtureCell>)]) -> Vec<u8> {
    let mut shared_strings: Vec<&str> = Vec::new();
    for (_, cells) in sheets {
        for cell in cells {
            if let FixtureCell::Text(_, _, text) = cell {
                if !shared_strings.contains(text) {
                    shared_strings.push(*text);
                }
            }
        }
    }

    // -- Globals -----------------------------------------------------------------
    let mut globals = Vec::<u8>::new();
    push_record(&mut globals, RECORD_BOF, &bof(BOF_DT_WORKBOOK_GLOBALS));
    push_record(&mut globals, RECORD_CODEPAGE, &1200u16.to_le_bytes());
    push_record(&mut globals, RECORD_DATEMODE, &0u16.to_le_bytes());
    push_record(&mut globals, RECORD_WINDOW1, &[0u8; 18]);
    push_record(&mut globals, RECORD_FONT, &font("Arial"));

    // Many readers expect 16 style XFs before the cell XFs.
    for _ in 0..16 {
        push_record(&mut globals, RECORD_XF, &xf_record(0, true));
    }
    push_record(&mut globals, RECORD_XF, &xf_record(0, false));
    push_record(&mut globals, RECORD_XF, &xf_record(14, false));

    let mut boundsheet_offsets = Vec::with_capacity(sheets.len());
    for (name, _) in sheets {
        let mut boundsheet = Vec::<u8>::new();
        boundsheet.extend_from_slice(&0u32.to_le_bytes()); // patched below
        boundsheet.extend_from_slice(&0u16.to_le_bytes()); // visible worksheet
        write_short_unicode_string(&mut boundsheet, name);
        boundsheet_offsets.push(globals.len() + 4);
        push_record(&mut globals, RECORD_BOUNDSHEET, &boundsheet);
    }

    push_record(&mut globals, RECORD_SST, &sst(&shared_strings));
    push_record(&mut globals, RECORD_EOF, &[]);

    // -- Sheets ------------------------------------------------------------------
    for ((_, cells), offset_pos) in sheets.iter().zip(boundsheet_offsets) {
        let sheet_offset = globals.len() as u32;
        globals[offset_pos..offset_pos + 4].copy_from_slice(&sheet_offset.to_le_bytes());
        let sheet = build_sheet_stream(cells, &shared_strings);
        globals.extend_from_slice(&sheet);
    }
    globals
}

fn build_sheet_stream(cells: &[FixtureCell], shared_strings: &[&str]) -> Vec<u8> {
    let mut sheet = Vec::<u8>::new();
    push_record(&mut sheet, RECORD_BOF, &bof(BOF_DT_WORKSHEET));

    let position = |cell: &FixtureCell| match cell {
        FixtureCell::Number(row, col, _)
        | FixtureCell::Date(row, col, _)
        | FixtureCell::Text(row, col, _)
        | FixtureCell::Bool(row, col, _) => (*row, *col),
    };
    let last_row = cells.iter().map(|cell| position(cell).0 + 1).max().unwrap_or(0);
    let last_col = cells.iter().map(|cell| position(cell).1 + 1).max().unwrap_or(0);
    let mut dims = Vec::<u8>::new();
    dims.extend_from_slice(&0u32.to_le_bytes()); // first row
    dims.extend_from_slice(&(last_row as u32).to_le_bytes()); // last row + 1
    dims.extend_from_slice(&0u16.to_le_bytes()); // first col
    dims.extend_from_slice(&last_col.to_le_bytes()); // last col + 1
    dims.extend_from_slice(&0u16.to_le_bytes()); // reserved
    push_record(&mut sheet, RECORD_DIMENSIONS, &dims);

    for cell in cells {
        match cell {
            FixtureCell::Number(row, col, value) => {
                push_record(&mut sheet, RECORD_NUMBER, &number_cell(*row, *col, XF_GENERAL, *value))
            }
            FixtureCell::Date(row, col, value) => {
                push_record(&mut sheet, RECORD_NUMBER, &number_cell(*row, *col, XF_DATE, *value))
            }
            FixtureCell::Text(row, col, text) => {
                let index = shared_strings
                    .iter()
                    .position(|shared| shared == text)
                    .expect("text in shared strings") as u32;
                push_record(&mut sheet, RECORD_LABELSST, &label_sst_cell(*row, *col, index))
            }
            FixtureCell::Bool(row, col, value) => {
                push_record(&mut sheet, RECORD_BOOLERR, &bool_cell(*row, *col, *value))
            }
        }
    }

    push_record(&mut sheet, RECORD_EOF, &[]);
    sheet
}

fn push_record(out: &mut Vec<u8>, id: u16, data: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(data);
}

fn bof(dt: u16) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[0..2].copy_from_slice(&BOF_VERSION_BIFF8.to_le_bytes());
    out[2..4].copy_from_slice(&dt.to_le_bytes());
    out[4..6].copy_from_slice(&0x0DBBu16.to_le_bytes()); // build
    out[6..8].copy_from_slice(&0x07CCu16.to_le_bytes()); // year (1996)
    out
}

fn font(name: &str) -> Vec<u8> {
    let mut out = Vec::<u8>::new();
    out.extend_from_slice(&200u16.to_le_bytes()); // height, 10pt
    out.extend_from_slice(&0u16.to_le_bytes()); // options
    out.extend_from_slice(&0x7FFFu16.to_le_bytes()); // automatic color
    out.extend_from_slice(&400u16.to_le_bytes()); // weight
    out.extend_from_slice(&0u16.to_le_bytes()); // escapement
    out.push(0); // underline
    out.push(0); // family
    out.push(0); // charset
    out.push(0); // reserved
    write_short_unicode_string(&mut out, name);
    out
}

fn xf_record(fmt_idx: u16, is_style_xf: bool) -> [u8; 20] {
    let mut out = [0u8; 20];
    out[2..4].copy_from_slice(&fmt_idx.to_le_bytes());
    let flags: u16 = XF_FLAG_LOCKED | if is_style_xf { XF_FLAG_STYLE } else { 0 };
    out[4..6].copy_from_slice(&flags.to_le_bytes());
    out[6] = 0x20; // General + Bottom
    out[9] = 0x3F;
    out
}

fn sst(strings: &[&str]) -> Vec<u8> {
    let mut out = Vec::<u8>::new();
    out.extend_from_slice(&(strings.len() as u32).to_le_bytes()); // total references
    out.extend_from_slice(&(strings.len() as u32).to_le_bytes()); // unique strings
    for text in strings {
        write_unicode_string(&mut out, text);
    }
    out
}

fn number_cell(row: u16, col: u16, xf: u16, v: f64) -> [u8; 14] {
    let mut out = [0u8; 14];
    out[0..2].copy_from_slice(&row.to_le_bytes());
    out[2..4].copy_from_slice(&col.to_le_bytes());
    out[4..6].copy_from_slice(&xf.to_le_bytes());
    out[6..14].copy_from_slice(&v.to_le_bytes());
    out
}

fn label_sst_cell(row: u16, col: u16, index: u32) -> [u8; 10] {
    let mut out = [0u8; 10];
    out[0..2].copy_from_slice(&row.to_le_bytes());
    out[2..4].copy_from_slice(&col.to_le_bytes());
    out[4..6].copy_from_slice(&XF_GENERAL.to_le_bytes());
    out[6..10].copy_from_slice(&index.to_le_bytes());
    out
}

fn bool_cell(row: u16, col: u16, value: bool) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0..2].copy_from_slice(&row.to_le_bytes());
    out[2..4].copy_from_slice(&col.to_le_bytes());
    out[4..6].copy_from_slice(&XF_GENERAL.to_le_bytes());
    out[6] = u8::from(value);
    out[7] = 0; // boolean, not an error code
    out
}

fn write_short_unicode_string(out: &mut Vec<u8>, s: &str) {
    // ShortXLUnicodeString: [cch: u8][flags: u8][chars]
    let bytes = s.as_bytes();
    let len: u8 = bytes.len().try_into().expect("string too long for u8 length");
    out.push(len);
    out.push(0); // compressed (8-bit)
    out.extend_from_slice(bytes);
}

fn write_unicode_string(out: &mut Vec<u8>, s: &str) {
    // XLUnicodeString: [cch: u16][flags: u8][chars]
    let bytes = s.as_bytes();
    let len: u16 = bytes.len().try_into().expect("string too long for u16 length");
    out.extend_from_slice(&len.to_le_bytes());
    out.push(0); // compressed (8-bit)
    out.extend_from_slice(bytes);
}
