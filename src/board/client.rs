//! Capability interface over the tabular board service.
//!
//! The service itself has no transactions: every synchronizer operation is a
//! read-full-state, compute-range, write-range sequence. The client trait
//! mirrors the native operations the service offers (range writes, row and
//! column structural edits, range sort, format copy).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::session::AuthSession;

// =============================================================================
// Cell values
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    /// A formula string, leading `=` included. Formulas are generated whole;
    /// the synchronizer never edits one in place.
    Formula(String),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    pub fn formula(s: impl Into<String>) -> Self {
        CellValue::Formula(s.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty) || matches!(self, CellValue::Text(s) if s.is_empty())
    }

    /// Render the value the way the board displays it; integers drop their
    /// fraction so numeric keys compare equal to their text form.
    pub fn render(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Formula(s) => s.clone(),
        }
    }

    /// Key-column comparison: text and numeric forms of the same key match.
    pub fn matches_key(&self, key: &str) -> bool {
        !self.is_empty() && self.render() == key
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

pub type Matrix = Vec<Vec<CellValue>>;

// =============================================================================
// References
// =============================================================================

/// A sheet within a spreadsheet document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRef {
    pub spreadsheet: String,
    pub sheet: String,
}

impl SheetRef {
    pub fn new(spreadsheet: impl Into<String>, sheet: impl Into<String>) -> Self {
        SheetRef {
            spreadsheet: spreadsheet.into(),
            sheet: sheet.into(),
        }
    }

    /// Stable key for the per-sheet lock registry.
    pub fn lock_key(&self) -> String {
        format!("{}/{}", self.spreadsheet, self.sheet)
    }
}

/// A rectangular range: 0-based, end-exclusive on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRef {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl RangeRef {
    pub fn new(start_row: usize, start_col: usize, end_row: usize, end_col: usize) -> Self {
        RangeRef {
            start_row,
            start_col,
            end_row,
            end_col,
        }
    }

    pub fn cell(row: usize, col: usize) -> Self {
        RangeRef::new(row, col, row + 1, col + 1)
    }

    pub fn row_span(start_row: usize, end_row: usize, start_col: usize, end_col: usize) -> Self {
        RangeRef::new(start_row, start_col, end_row, end_col)
    }

    pub fn row_count(&self) -> usize {
        self.end_row.saturating_sub(self.start_row)
    }

    pub fn col_count(&self) -> usize {
        self.end_col.saturating_sub(self.start_col)
    }
}

/// One key of a range sort, applied in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub col: usize,
    pub ascending: bool,
}

impl SortSpec {
    pub fn asc(col: usize) -> Self {
        SortSpec {
            col,
            ascending: true,
        }
    }
}

// =============================================================================
// Client trait
// =============================================================================

/// Capability interface over the board service.
#[async_trait]
pub trait BoardClient: Send + Sync {
    async fn get_values(
        &self,
        session: &AuthSession,
        sheet: &SheetRef,
    ) -> Result<Matrix, StoreError>;

    async fn update_values(
        &self,
        session: &AuthSession,
        sheet: &SheetRef,
        range: RangeRef,
        values: Matrix,
    ) -> Result<(), StoreError>;

    async fn insert_rows(
        &self,
        session: &AuthSession,
        sheet: &SheetRef,
        start: usize,
        count: usize,
    ) -> Result<(), StoreError>;

    async fn delete_rows(
        &self,
        session: &AuthSession,
        sheet: &SheetRef,
        start: usize,
        count: usize,
    ) -> Result<(), StoreError>;

    async fn insert_columns(
        &self,
        session: &AuthSession,
        sheet: &SheetRef,
        start: usize,
        count: usize,
    ) -> Result<(), StoreError>;

    async fn delete_columns(
        &self,
        session: &AuthSession,
        sheet: &SheetRef,
        start: usize,
        count: usize,
    ) -> Result<(), StoreError>;

    async fn sort_range(
        &self,
        session: &AuthSession,
        sheet: &SheetRef,
        range: RangeRef,
        specs: &[SortSpec],
    ) -> Result<(), StoreError>;

    async fn copy_format(
        &self,
        session: &AuthSession,
        sheet: &SheetRef,
        source: RangeRef,
        destination: RangeRef,
    ) -> Result<(), StoreError>;

    async fn clear_values(
        &self,
        session: &AuthSession,
        sheet: &SheetRef,
        range: RangeRef,
    ) -> Result<(), StoreError>;
}
