//! Cell-address translation.
//!
//! Formulas reference cells through these helpers instead of string
//! concatenation, so the row/column mapping stays testable without a board
//! client. Coordinates are 1-based; values below 1 clamp to 1, matching the
//! board service's lowest addressable cell.

/// Column number (1-based) to letters: 1 → A, 26 → Z, 27 → AA.
pub fn column_letters(col: i64) -> String {
    let mut col = col.max(1);
    let mut letters = Vec::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        letters.push(b'A' + rem);
        col = (col - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).expect("ASCII letters")
}

/// Letters to a 1-based column number. Empty or non-alphabetic input is None.
fn letters_to_column(letters: &str) -> Option<i64> {
    if letters.is_empty() {
        return None;
    }
    let mut col: i64 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (c.to_ascii_uppercase() as i64 - 'A' as i64 + 1);
    }
    Some(col)
}

/// Relative cell address, e.g. `cell_address(12, 2)` → `"B12"`.
pub fn cell_address(row: i64, col: i64) -> String {
    cell_address_abs(row, col, false, false)
}

/// Cell address with optional absolute markers, e.g. `"$B$12"`.
pub fn cell_address_abs(row: i64, col: i64, abs_row: bool, abs_col: bool) -> String {
    let row = row.max(1);
    format!(
        "{}{}{}{}",
        if abs_col { "$" } else { "" },
        column_letters(col),
        if abs_row { "$" } else { "" },
        row
    )
}

/// Rectangular range address, e.g. `"J2:J9"`.
pub fn range_address(row1: i64, col1: i64, row2: i64, col2: i64) -> String {
    format!("{}:{}", cell_address(row1, col1), cell_address(row2, col2))
}

/// Column-absolute range address, e.g. `"$G$2:$G$40"`.
pub fn range_address_abs(row1: i64, col1: i64, row2: i64, col2: i64) -> String {
    format!(
        "{}:{}",
        cell_address_abs(row1, col1, true, true),
        cell_address_abs(row2, col2, true, true)
    )
}

/// Parse an address back into (row, col), ignoring absolute markers.
/// The inverse of `cell_address` for all row ≥ 1, col ≥ 1.
pub fn parse_address(address: &str) -> Option<(i64, i64)> {
    let s = address.trim();
    let mut idx = 0;
    let bytes = s.as_bytes();

    if bytes.get(idx) == Some(&b'$') {
        idx += 1;
    }
    let col_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_alphabetic() {
        idx += 1;
    }
    if idx == col_start {
        return None;
    }
    let col = letters_to_column(&s[col_start..idx])?;

    if bytes.get(idx) == Some(&b'$') {
        idx += 1;
    }
    let row_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    if row_start == idx || idx != bytes.len() {
        return None;
    }
    let row: i64 = s[row_start..idx].parse().ok()?;
    if row < 1 {
        return None;
    }
    Some((row, col))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_cover_multi_letter_range() {
        assert_eq!(column_letters(1), "A");
        assert_eq!(column_letters(26), "Z");
        assert_eq!(column_letters(27), "AA");
        assert_eq!(column_letters(52), "AZ");
        assert_eq!(column_letters(703), "AAA");
    }

    #[test]
    fn addresses_with_markers() {
        assert_eq!(cell_address(12, 2), "B12");
        assert_eq!(cell_address_abs(12, 2, true, true), "$B$12");
        assert_eq!(cell_address_abs(12, 2, true, false), "B$12");
        assert_eq!(cell_address_abs(12, 2, false, true), "$B12");
        assert_eq!(range_address(2, 10, 9, 10), "J2:J9");
        assert_eq!(range_address_abs(2, 7, 40, 7), "$G$2:$G$40");
    }

    #[test]
    fn rows_below_one_clamp() {
        assert_eq!(cell_address(0, 1), "A1");
        assert_eq!(cell_address(-5, 3), "C1");
        assert_eq!(cell_address_abs(0, 0, false, false), "A1");
    }

    #[test]
    fn round_trip() {
        for row in [1i64, 2, 9, 40, 1000] {
            for col in [1i64, 2, 26, 27, 52, 703] {
                let addr = cell_address(row, col);
                assert_eq!(parse_address(&addr), Some((row, col)), "addr {}", addr);
            }
        }
        // Absolute markers are transparent on the way back
        assert_eq!(parse_address("$B$12"), Some((12, 2)));
        // Clamped addresses parse to the clamped cell
        assert_eq!(parse_address(&cell_address(0, 1)), Some((1, 1)));
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert_eq!(parse_address(""), None);
        assert_eq!(parse_address("12"), None);
        assert_eq!(parse_address("AB"), None);
        assert_eq!(parse_address("A0"), None);
        assert_eq!(parse_address("A1B"), None);
    }
}
