//! Row location within the board's value matrix.
//!
//! The contiguous run of rows whose key-column cell holds the same value is
//! the range "owned" by that key. Contracts own a header row plus their task
//! rows; the sort step keeps each run contiguous, so a linear scan for the
//! first and last match is enough.

use super::client::{CellValue, Matrix};

/// An inclusive row range within the matrix (0-based indices).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub first: usize,
    pub last: usize,
}

impl RowRange {
    pub fn row_count(&self) -> usize {
        self.last - self.first + 1
    }

    /// One past the last row, for end-exclusive range refs.
    pub fn end_exclusive(&self) -> usize {
        self.last + 1
    }
}

fn cell<'a>(values: &'a Matrix, row: usize, col: usize) -> Option<&'a CellValue> {
    values.get(row).and_then(|r| r.get(col))
}

/// First row at or after `first_data_row` whose `key_col` cell matches `key`.
pub fn first_match(values: &Matrix, key_col: usize, key: &str, first_data_row: usize) -> Option<usize> {
    (first_data_row..values.len())
        .find(|&row| cell(values, row, key_col).is_some_and(|v| v.matches_key(key)))
}

/// Last row whose `key_col` cell matches `key`.
pub fn last_match(values: &Matrix, key_col: usize, key: &str, first_data_row: usize) -> Option<usize> {
    (first_data_row..values.len())
        .rev()
        .find(|&row| cell(values, row, key_col).is_some_and(|v| v.matches_key(key)))
}

/// The full range owned by `key`, or None when the key is absent.
pub fn key_range(
    values: &Matrix,
    key_col: usize,
    key: &str,
    first_data_row: usize,
) -> Option<RowRange> {
    let first = first_match(values, key_col, key, first_data_row)?;
    let last = last_match(values, key_col, key, first_data_row)?;
    Some(RowRange { first, last })
}

/// Whether the rows owned by `key` form one contiguous run.
pub fn is_contiguous(values: &Matrix, key_col: usize, key: &str, first_data_row: usize) -> bool {
    match key_range(values, key_col, key, first_data_row) {
        Some(range) => (range.first..=range.last)
            .all(|row| cell(values, row, key_col).is_some_and(|v| v.matches_key(key))),
        None => true,
    }
}

/// Count contract header rows: a header carries a key but no task name.
pub fn header_count(
    values: &Matrix,
    key_col: usize,
    task_col: usize,
    first_data_row: usize,
) -> usize {
    (first_data_row..values.len())
        .filter(|&row| {
            let has_key = cell(values, row, key_col).is_some_and(|v| !v.is_empty());
            let has_task = cell(values, row, task_col).is_some_and(|v| !v.is_empty());
            has_key && !has_task
        })
        .count()
}

/// Find the row of a specific task inside a contract's range, matching on
/// the task-id column.
pub fn task_row_in_range(
    values: &Matrix,
    range: RowRange,
    task_id_col: usize,
    task_id: i64,
) -> Option<usize> {
    let key = task_id.to_string();
    (range.first..=range.last)
        .find(|&row| cell(values, row, task_id_col).is_some_and(|v| v.matches_key(&key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(keys: &[&str]) -> Matrix {
        keys.iter()
            .map(|k| {
                vec![
                    CellValue::text("P"),
                    CellValue::text("label"),
                    if k.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::text(*k)
                    },
                ]
            })
            .collect()
    }

    #[test]
    fn finds_first_and_last_of_a_run() {
        let m = matrix(&["hdr", "7", "7", "7", "9", "9"]);
        let range = key_range(&m, 2, "7", 1).unwrap();
        assert_eq!(range, RowRange { first: 1, last: 3 });
        assert_eq!(range.row_count(), 3);
        assert_eq!(key_range(&m, 2, "9", 1), Some(RowRange { first: 4, last: 5 }));
        assert_eq!(key_range(&m, 2, "11", 1), None);
    }

    #[test]
    fn skips_rows_before_first_data_row() {
        let m = matrix(&["7", "7"]);
        assert_eq!(first_match(&m, 2, "7", 1), Some(1));
    }

    #[test]
    fn contiguity_detects_interleaving() {
        let ok = matrix(&["hdr", "7", "7", "9"]);
        assert!(is_contiguous(&ok, 2, "7", 1));

        let broken = matrix(&["hdr", "7", "9", "7"]);
        assert!(!is_contiguous(&broken, 2, "7", 1));
    }

    #[test]
    fn counts_headers_by_empty_task_cell() {
        // col 0: key, col 1: task name
        let m: Matrix = vec![
            vec![CellValue::text("head"), CellValue::Empty],
            vec![CellValue::text("7"), CellValue::Empty],
            vec![CellValue::text("7"), CellValue::text("Pour footing")],
            vec![CellValue::text("9"), CellValue::Empty],
        ];
        assert_eq!(header_count(&m, 0, 1, 1), 2);
    }

    #[test]
    fn locates_task_by_id_cell() {
        let m: Matrix = vec![
            vec![CellValue::text("7"), CellValue::Empty],
            vec![CellValue::text("7"), CellValue::Number(41.0)],
            vec![CellValue::text("7"), CellValue::Number(42.0)],
        ];
        let range = RowRange { first: 0, last: 2 };
        assert_eq!(task_row_in_range(&m, range, 1, 42), Some(2));
        assert_eq!(task_row_in_range(&m, range, 1, 77), None);
    }
}
