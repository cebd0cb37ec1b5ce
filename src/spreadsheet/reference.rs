//! A1-style cell references

/// Converts 0-based row and column indexes into an A1 reference such as `"C7"`
pub(crate) fn index_to_reference(row: usize, col: usize) -> String {
    let mut letters = Vec::new();
    let mut number = col + 1;
    while number > 0 {
        let remainder = (number - 1) % 26;
        letters.push((b'A' + remainder as u8) as char);
        number = (number - 1) / 26;
    }
    letters.iter().rev().collect::<String>() + &(row + 1).to_string()
}

/// Converts a column label such as `"AB"` into a 0-based column index
pub(crate) fn column_to_index(label: &str) -> Option<usize> {
    if label.is_empty() || label.len() > 3 {
        return None;
    }
    let mut number = 0usize;
    for byte in label.bytes() {
        if !byte.is_ascii_alphabetic() {
            return None;
        }
        number = number * 26 + (byte.to_ascii_uppercase() - b'A') as usize + 1;
    }
    Some(number - 1)
}

/// Converts an A1 reference into 0-based (row, column) indexes.
/// Absolute markers (`$`) are accepted. Returns `None` for malformed references.
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.trim().replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (label, digits) = reference.split_at(split);
    let col = column_to_index(label)?;
    let row = digits.parse::<usize>().ok()?.checked_sub(1)?;
    Some((row, col))
}
