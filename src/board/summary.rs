//! Per-person capacity summary block.
//!
//! A block of columns to the right of the task data, one row per person:
//! hours left, assigned, available, Mon–Fri daily totals, meetings (manual
//! entry), grand total. The block is rebuilt wholesale (columns deleted,
//! re-inserted, formulas regenerated) because its formulas reference data
//! rows by position and go stale whenever the row set changes.

use super::client::CellValue;
use super::formulas;
use crate::config::BoardLayout;
use crate::types::Person;

/// Column count of the block.
pub const SUMMARY_WIDTH: usize = 11;

/// Offsets within the block.
const COL_NAME: usize = 0;
const COL_HOURS_LEFT: usize = 1;
const COL_ASSIGNED: usize = 2;
const COL_AVAILABLE: usize = 3;
const COL_WEEKDAY_FIRST: usize = 4; // Monday; Friday is 8
const COL_MEETINGS: usize = 9;
const COL_TOTAL: usize = 10;

pub fn header_titles() -> Vec<CellValue> {
    [
        "Person", "Left", "Assigned", "Available", "Mon", "Tue", "Wed", "Thu", "Fri", "Meetings",
        "Total",
    ]
    .iter()
    .map(|t| CellValue::text(*t))
    .collect()
}

/// Build one person's summary row. `row` is the matrix row the values land
/// on; `last_data_row` is the last task/header row the formulas range over.
pub fn person_row(
    person: &Person,
    row: usize,
    layout: &BoardLayout,
    last_data_row: usize,
    capacity_hours: f64,
) -> Vec<CellValue> {
    let first = layout.first_data_row;
    let last = last_data_row.max(first);
    let base = layout.summary_start_col;

    let mut cells = vec![CellValue::Empty; SUMMARY_WIDTH];
    cells[COL_NAME] = CellValue::text(person.name.clone());
    cells[COL_HOURS_LEFT] = CellValue::formula(formulas::conditional_sum(
        layout.col_owner,
        &person.name,
        layout.col_remaining,
        first,
        last,
    ));
    cells[COL_ASSIGNED] = CellValue::formula(formulas::conditional_sum(
        layout.col_owner,
        &person.name,
        layout.col_planned,
        first,
        last,
    ));
    cells[COL_AVAILABLE] = CellValue::formula(formulas::capacity_remainder(
        capacity_hours,
        row,
        base + COL_ASSIGNED,
    ));
    for day in 0..5 {
        cells[COL_WEEKDAY_FIRST + day] = CellValue::formula(formulas::weekday_sum(
            layout.col_planned,
            layout.col_owner,
            &person.name,
            layout.col_deadline,
            day,
            first,
            last,
        ));
    }
    // Meetings stay blank for manual entry
    cells[COL_TOTAL] = CellValue::formula(formulas::cell_sum(
        row,
        base + COL_ASSIGNED,
        base + COL_MEETINGS,
    ));
    cells
}
