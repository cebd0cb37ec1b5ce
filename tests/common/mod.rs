#![allow(dead_code)]

pub mod xls_fixture_builder;

use rusty_convert::{decode, SourceFormat, Table};

/// Reads a converted workbook back into a table
pub fn read_output(bytes: &[u8]) -> Table {
    decode(bytes, SourceFormat::Xlsx).expect("output is a readable workbook")
}
