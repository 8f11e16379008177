//! Sequence-number assignment for non-unique child entities.
//!
//! Numbers are minted per (type, parent) scope from a dedicated counter
//! column: `MAX(seq_number) + 1`, starting at 1. Deleted siblings leave a
//! gap on purpose; folder names keep the number they were minted with.
//!
//! The query is not serialized across processes: two callers racing on the
//! same scope can mint the same number. Within one process the orchestrator's
//! write path runs operations to completion, which is the only guard the
//! original design had either.

use rusqlite::params;

use crate::db::{DbError, TrackerDb};

/// Next number for a milestone of `type_id` under `contract_id`.
pub fn next_milestone_number(
    db: &TrackerDb,
    contract_id: i64,
    type_id: i64,
) -> Result<i64, DbError> {
    let max: i64 = db.conn_ref().query_row(
        "SELECT COALESCE(MAX(seq_number), 0) FROM milestones
         WHERE contract_id = ?1 AND type_id = ?2",
        params![contract_id, type_id],
        |row| row.get(0),
    )?;
    Ok(max + 1)
}

/// Next number for a case of `type_id` under `milestone_id`.
pub fn next_case_number(db: &TrackerDb, milestone_id: i64, type_id: i64) -> Result<i64, DbError> {
    let max: i64 = db.conn_ref().query_row(
        "SELECT COALESCE(MAX(seq_number), 0) FROM cases
         WHERE milestone_id = ?1 AND type_id = ?2",
        params![milestone_id, type_id],
        |row| row.get(0),
    )?;
    Ok(max + 1)
}

/// Next number for a foreign contract within `project_id`. Own contracts are
/// identified by their external reference and never numbered.
pub fn next_foreign_contract_number(db: &TrackerDb, project_id: i64) -> Result<i64, DbError> {
    let max: i64 = db.conn_ref().query_row(
        "SELECT COALESCE(MAX(seq_number), 0) FROM contracts
         WHERE project_id = ?1 AND kind = 'foreign'",
        params![project_id],
        |row| row.get(0),
    )?;
    Ok(max + 1)
}
