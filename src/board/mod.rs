//! Board synchronization.
//!
//! The operational board is a projection of the database: one header row per
//! visible contract, immediately followed by that contract's task rows,
//! grouped by milestone type, case type and owner. The service offers no
//! transactions, so every operation here is read-full-state, compute-range,
//! write-range; the orchestrator serializes these sequences behind a
//! per-sheet lock.
//!
//! Formulas reference rows by position, so they are only (re)generated after
//! the board is structurally stable: inserts and sorts first, formulas last.

pub mod client;
pub mod coords;
pub mod formulas;
pub mod locate;
pub mod summary;
pub mod visibility;

use std::collections::{HashMap, HashSet};

pub use client::{BoardClient, CellValue, Matrix, RangeRef, SheetRef, SortSpec};

use crate::config::{BoardLayout, Config};
use crate::error::LifecycleError;
use crate::error::StoreError;
use crate::session::AuthSession;
use crate::types::{BoardHeader, BoardTask, Person};

/// Final row of each task after a reconcile, for board-row bookkeeping.
pub type TaskPlacements = Vec<(i64, usize)>;

/// The composite sort key: project, contract label, contract db id,
/// milestone type, case type, task owner.
pub fn composite_sort_specs(layout: &BoardLayout) -> Vec<SortSpec> {
    vec![
        SortSpec::asc(layout.col_project),
        SortSpec::asc(layout.col_contract),
        SortSpec::asc(layout.col_contract_id),
        SortSpec::asc(layout.col_milestone),
        SortSpec::asc(layout.col_case),
        SortSpec::asc(layout.col_owner),
    ]
}

pub struct BoardSync<'a> {
    client: &'a dyn BoardClient,
    config: &'a Config,
    sheet: SheetRef,
}

impl<'a> BoardSync<'a> {
    pub fn new(client: &'a dyn BoardClient, config: &'a Config) -> Self {
        let sheet = SheetRef::new(
            config.board.spreadsheet.clone(),
            config.board.sheet.clone(),
        );
        BoardSync {
            client,
            config,
            sheet,
        }
    }

    fn layout(&self) -> &BoardLayout {
        &self.config.board
    }

    async fn snapshot(&self, session: &AuthSession) -> Result<Matrix, StoreError> {
        self.client.get_values(session, &self.sheet).await
    }

    async fn write_row(
        &self,
        session: &AuthSession,
        row: usize,
        cells: Vec<CellValue>,
    ) -> Result<(), StoreError> {
        let width = cells.len();
        self.client
            .update_values(
                session,
                &self.sheet,
                RangeRef::row_span(row, row + 1, 0, width),
                vec![cells],
            )
            .await
    }

    async fn write_cells(
        &self,
        session: &AuthSession,
        row: usize,
        start_col: usize,
        cells: Vec<CellValue>,
    ) -> Result<(), StoreError> {
        let width = cells.len();
        self.client
            .update_values(
                session,
                &self.sheet,
                RangeRef::row_span(row, row + 1, start_col, start_col + width),
                vec![cells],
            )
            .await
    }

    fn header_cells(&self, header: &BoardHeader) -> Vec<CellValue> {
        let layout = self.layout();
        let mut cells = vec![CellValue::Empty; layout.data_width()];
        cells[layout.col_project] = CellValue::text(header.project.clone());
        cells[layout.col_contract] = CellValue::text(header.label.clone());
        cells[layout.col_contract_id] = CellValue::from(header.contract_id);
        cells
    }

    fn task_cells(&self, task: &BoardTask) -> Vec<CellValue> {
        let layout = self.layout();
        let mut cells = vec![CellValue::Empty; layout.data_width()];
        cells[layout.col_project] = CellValue::text(task.project.clone());
        cells[layout.col_contract] = CellValue::text(task.contract_label.clone());
        cells[layout.col_contract_id] = CellValue::from(task.contract_id);
        cells[layout.col_milestone] = CellValue::text(task.milestone.clone());
        cells[layout.col_case] = CellValue::text(task.case_label.clone());
        cells[layout.col_task] = CellValue::text(task.name.clone());
        cells[layout.col_owner] = match &task.owner {
            Some(owner) => CellValue::text(owner.clone()),
            None => CellValue::Empty,
        };
        cells[layout.col_deadline] = match &task.deadline {
            Some(deadline) => CellValue::text(deadline.clone()),
            None => CellValue::Empty,
        };
        cells[layout.col_status] = CellValue::text(task.status.as_str());
        cells[layout.col_planned] = CellValue::Number(task.planned_hours);
        cells[layout.col_consumed] = CellValue::Number(task.consumed_hours);
        // remaining is a formula, regenerated after sorting
        cells[layout.col_task_id] = CellValue::from(task.task_id);
        cells
    }

    /// Existing task rows of a contract range: task id → row.
    fn existing_task_rows(&self, values: &Matrix, range: locate::RowRange) -> HashMap<i64, usize> {
        let layout = self.layout();
        let mut map = HashMap::new();
        for row in range.first..=range.last {
            if let Some(cell) = values.get(row).and_then(|r| r.get(layout.col_task_id)) {
                if let Ok(id) = cell.render().parse::<i64>() {
                    map.insert(id, row);
                }
            }
        }
        map
    }

    // =========================================================================
    // Reconcile
    // =========================================================================

    /// Bring a contract's board range in line with the database: ensure the
    /// header when visible, add missing task rows without duplicating, update
    /// rows that drifted, drop rows whose task is gone or hidden, then
    /// re-sort and regenerate formulas. Also the repair path: re-running it
    /// is idempotent.
    pub async fn reconcile_contract(
        &self,
        session: &AuthSession,
        header: &BoardHeader,
        rows: &[BoardTask],
        visible: bool,
        people: &[Person],
    ) -> Result<TaskPlacements, LifecycleError> {
        let layout = self.layout();
        let key = header.contract_id.to_string();
        let key_col = layout.col_contract_id;
        let fdr = layout.first_data_row;
        let width = layout.data_width();

        if !visible {
            self.remove_key_rows(session, header.contract_id, people)
                .await?;
            return Ok(Vec::new());
        }

        // Header first: a task row cannot float without its contract.
        let values = self.snapshot(session).await?;
        match locate::key_range(&values, key_col, &key, fdr) {
            None => {
                // New headers go immediately above the first data row.
                self.client
                    .insert_rows(session, &self.sheet, fdr, 1)
                    .await?;
                if values.len() > fdr {
                    // The previous first data row (now shifted down) is the
                    // formatting template.
                    self.client
                        .copy_format(
                            session,
                            &self.sheet,
                            RangeRef::row_span(fdr + 1, fdr + 2, 0, width),
                            RangeRef::row_span(fdr, fdr + 1, 0, width),
                        )
                        .await?;
                }
                self.write_row(session, fdr, self.header_cells(header))
                    .await?;
            }
            Some(range) => {
                // Rewrite the label cells; aggregates are regenerated below
                self.write_row(session, range.first, self.header_cells(header))
                    .await?;
            }
        }

        // Drop rows whose task is gone or no longer visible.
        let values = self.snapshot(session).await?;
        let range = locate::key_range(&values, key_col, &key, fdr)
            .ok_or_else(|| LifecycleError::Consistency(format!("header for {} vanished", key)))?;
        let desired: HashSet<i64> = rows.iter().map(|t| t.task_id).collect();
        let mut stale: Vec<usize> = self
            .existing_task_rows(&values, range)
            .into_iter()
            .filter(|(id, _)| !desired.contains(id))
            .map(|(_, row)| row)
            .collect();
        stale.sort_unstable_by(|a, b| b.cmp(a));
        for row in stale {
            self.client.delete_rows(session, &self.sheet, row, 1).await?;
        }

        // Update drifted rows in place, append the missing ones at the end
        // of the owning range.
        let values = self.snapshot(session).await?;
        let range = locate::key_range(&values, key_col, &key, fdr)
            .ok_or_else(|| LifecycleError::Consistency(format!("header for {} vanished", key)))?;
        let existing = self.existing_task_rows(&values, range);
        let mut missing = Vec::new();
        for task in rows {
            match existing.get(&task.task_id) {
                Some(&row) => {
                    self.write_row(session, row, self.task_cells(task)).await?;
                }
                None => missing.push(task),
            }
        }
        if !missing.is_empty() {
            let at = range.end_exclusive();
            self.client
                .insert_rows(session, &self.sheet, at, missing.len())
                .await?;
            // Formatting and trailing formula cells come from the adjacent
            // row above (the last row of the range, or the header itself).
            self.client
                .copy_format(
                    session,
                    &self.sheet,
                    RangeRef::row_span(range.last, range.last + 1, 0, width),
                    RangeRef::row_span(at, at + missing.len(), 0, width),
                )
                .await?;
            for (offset, task) in missing.iter().enumerate() {
                self.write_row(session, at + offset, self.task_cells(task))
                    .await?;
            }
        }

        // Structural changes done: sort the task rows by the composite key.
        let values = self.snapshot(session).await?;
        let range = locate::key_range(&values, key_col, &key, fdr)
            .ok_or_else(|| LifecycleError::Consistency(format!("header for {} vanished", key)))?;
        if range.row_count() > 2 {
            self.client
                .sort_range(
                    session,
                    &self.sheet,
                    RangeRef::row_span(range.first + 1, range.end_exclusive(), 0, width),
                    &composite_sort_specs(layout),
                )
                .await?;
        }

        // The board is stable now; regenerate every position-dependent
        // formula and record final placements.
        let values = self.snapshot(session).await?;
        let range = locate::key_range(&values, key_col, &key, fdr)
            .ok_or_else(|| LifecycleError::Consistency(format!("header for {} vanished", key)))?;
        let mut placements = Vec::new();
        for row in (range.first + 1)..=range.last {
            self.write_cells(
                session,
                row,
                layout.col_remaining,
                vec![CellValue::formula(formulas::row_difference(
                    row,
                    layout.col_planned,
                    layout.col_consumed,
                ))],
            )
            .await?;
            if let Some(cell) = values.get(row).and_then(|r| r.get(layout.col_task_id)) {
                if let Ok(id) = cell.render().parse::<i64>() {
                    placements.push((id, row));
                }
            }
        }
        if range.row_count() > 1 {
            self.write_cells(
                session,
                range.first,
                layout.col_planned,
                vec![
                    CellValue::formula(formulas::column_sum(
                        layout.col_planned,
                        range.first + 1,
                        range.last,
                    )),
                    CellValue::formula(formulas::column_sum(
                        layout.col_consumed,
                        range.first + 1,
                        range.last,
                    )),
                    CellValue::formula(formulas::row_difference(
                        range.first,
                        layout.col_planned,
                        layout.col_consumed,
                    )),
                ],
            )
            .await?;
        } else {
            self.client
                .clear_values(
                    session,
                    &self.sheet,
                    RangeRef::row_span(
                        range.first,
                        range.first + 1,
                        layout.col_planned,
                        layout.col_remaining + 1,
                    ),
                )
                .await?;
        }

        self.rebuild_summary_if_below_threshold(session, people)
            .await?;
        Ok(placements)
    }

    /// Remove the full contiguous range owned by a contract. Returns the
    /// number of rows removed.
    pub async fn remove_key_rows(
        &self,
        session: &AuthSession,
        contract_id: i64,
        people: &[Person],
    ) -> Result<usize, LifecycleError> {
        let layout = self.layout();
        let values = self.snapshot(session).await?;
        let Some(range) = locate::key_range(
            &values,
            layout.col_contract_id,
            &contract_id.to_string(),
            layout.first_data_row,
        ) else {
            return Ok(0);
        };
        self.client
            .delete_rows(session, &self.sheet, range.first, range.row_count())
            .await?;
        self.rebuild_summary_if_below_threshold(session, people)
            .await?;
        Ok(range.row_count())
    }

    // =========================================================================
    // Capacity summary
    // =========================================================================

    /// Rebuild the per-person summary block: delete the columns, re-insert
    /// them, regenerate every formula. Runs whenever the header count is
    /// below the configured threshold. Under it, the layout assumptions the
    /// other formulas rely on no longer hold.
    async fn rebuild_summary_if_below_threshold(
        &self,
        session: &AuthSession,
        people: &[Person],
    ) -> Result<(), LifecycleError> {
        let layout = self.layout();
        let values = self.snapshot(session).await?;
        let headers = locate::header_count(
            &values,
            layout.col_contract_id,
            layout.col_task,
            layout.first_data_row,
        );
        if headers >= self.config.summary_rebuild_threshold {
            return Ok(());
        }
        log::debug!(
            "Contract header count {} below threshold {}; rebuilding capacity summary",
            headers,
            self.config.summary_rebuild_threshold
        );
        self.rebuild_capacity_summary(session, people).await
    }

    pub async fn rebuild_capacity_summary(
        &self,
        session: &AuthSession,
        people: &[Person],
    ) -> Result<(), LifecycleError> {
        let layout = self.layout();
        let values = self.snapshot(session).await?;

        // Last row still carrying task data; summary formulas range up to it.
        let last_data_row = (layout.first_data_row..values.len())
            .rev()
            .find(|&row| {
                values
                    .get(row)
                    .and_then(|r| r.get(layout.col_contract_id))
                    .is_some_and(|v| !v.is_empty())
            })
            .unwrap_or(layout.first_data_row);

        let start = layout.summary_start_col;
        self.client
            .delete_columns(session, &self.sheet, start, summary::SUMMARY_WIDTH)
            .await?;
        self.client
            .insert_columns(session, &self.sheet, start, summary::SUMMARY_WIDTH)
            .await?;

        self.write_cells(session, layout.header_row, start, summary::header_titles())
            .await?;
        for (offset, person) in people.iter().enumerate() {
            let row = layout.first_data_row + offset;
            let cells = summary::person_row(
                person,
                row,
                layout,
                last_data_row,
                self.config.weekly_capacity_hours,
            );
            self.write_cells(session, row, start, cells).await?;
        }
        Ok(())
    }
}
