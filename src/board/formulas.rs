//! Formula string builders.
//!
//! Every formula is generated whole from coordinates; updates rewrite the
//! full string for the target cell. Matrix indices (0-based) are converted
//! to the 1-based address notation at this boundary and nowhere else.

use super::coords;

/// 0-based matrix coordinates to a 1-based relative address.
fn addr(row: usize, col: usize) -> String {
    coords::cell_address(row as i64 + 1, col as i64 + 1)
}

/// Sum over one column across a row span: `=SUM(J3:J9)`.
/// Rows are 0-based matrix indices, inclusive.
pub fn column_sum(col: usize, first_row: usize, last_row: usize) -> String {
    format!(
        "=SUM({})",
        coords::range_address(
            first_row as i64 + 1,
            col as i64 + 1,
            last_row as i64 + 1,
            col as i64 + 1,
        )
    )
}

/// Difference of two cells on the same row: `=J5-K5`. Used for
/// remaining-time (planned minus consumed).
pub fn row_difference(row: usize, minuend_col: usize, subtrahend_col: usize) -> String {
    format!("={}-{}", addr(row, minuend_col), addr(row, subtrahend_col))
}

/// Conditional sum keyed on a criteria column:
/// `=SUMIF($G$2:$G$40,"Alice",J2:J40)`.
/// The criteria range is absolute so the formula survives column rebuilds.
pub fn conditional_sum(
    criteria_col: usize,
    criterion: &str,
    sum_col: usize,
    first_row: usize,
    last_row: usize,
) -> String {
    let criteria = coords::range_address_abs(
        first_row as i64 + 1,
        criteria_col as i64 + 1,
        last_row as i64 + 1,
        criteria_col as i64 + 1,
    );
    let sum = coords::range_address(
        first_row as i64 + 1,
        sum_col as i64 + 1,
        last_row as i64 + 1,
        sum_col as i64 + 1,
    );
    format!("=SUMIF({},\"{}\",{})", criteria, escape(criterion), sum)
}

/// Per-person daily total: planned hours for one owner whose deadline falls
/// on a weekday of the current week (0 = Monday):
/// `=SUMIFS(J2:J40,$G$2:$G$40,"Alice",H2:H40,TODAY()-WEEKDAY(TODAY(),3)+0)`.
pub fn weekday_sum(
    sum_col: usize,
    owner_col: usize,
    owner: &str,
    deadline_col: usize,
    day_offset: usize,
    first_row: usize,
    last_row: usize,
) -> String {
    let sum = coords::range_address(
        first_row as i64 + 1,
        sum_col as i64 + 1,
        last_row as i64 + 1,
        sum_col as i64 + 1,
    );
    let owners = coords::range_address_abs(
        first_row as i64 + 1,
        owner_col as i64 + 1,
        last_row as i64 + 1,
        owner_col as i64 + 1,
    );
    let deadlines = coords::range_address(
        first_row as i64 + 1,
        deadline_col as i64 + 1,
        last_row as i64 + 1,
        deadline_col as i64 + 1,
    );
    format!(
        "=SUMIFS({},{},\"{}\",{},TODAY()-WEEKDAY(TODAY(),3)+{})",
        sum,
        owners,
        escape(owner),
        deadlines,
        day_offset
    )
}

/// Difference of a literal and a cell: `=40-N5`. Used for available hours.
pub fn capacity_remainder(capacity: f64, row: usize, col: usize) -> String {
    format!("={}-{}", capacity, addr(row, col))
}

/// Sum of two cells: `=N5+P5`.
pub fn cell_sum(row: usize, col_a: usize, col_b: usize) -> String {
    format!("={}+{}", addr(row, col_a), addr(row, col_b))
}

fn escape(criterion: &str) -> String {
    criterion.replace('"', "\"\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_sum_spans_rows() {
        assert_eq!(column_sum(9, 2, 8), "=SUM(J3:J9)");
    }

    #[test]
    fn row_difference_for_remaining_time() {
        assert_eq!(row_difference(4, 9, 10), "=J5-K5");
    }

    #[test]
    fn conditional_sum_pins_criteria_range() {
        assert_eq!(
            conditional_sum(6, "Alice", 9, 1, 39),
            "=SUMIF($G$2:$G$40,\"Alice\",J2:J40)"
        );
    }

    #[test]
    fn criterion_quotes_are_escaped() {
        let f = conditional_sum(6, "An \"odd\" name", 9, 1, 3);
        assert!(f.contains("\"An \"\"odd\"\" name\""));
    }

    #[test]
    fn capacity_and_total_helpers() {
        assert_eq!(capacity_remainder(40.0, 4, 13), "=40-N5");
        assert_eq!(cell_sum(4, 13, 15), "=N5+P5");
    }
}
