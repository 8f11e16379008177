use rusqlite::{params, OptionalExtension};

use super::*;
use crate::types::{BoardTask, Task, TaskStatus};

/// A task denormalized for the board, plus the owner's role rank for the
/// visibility predicate.
#[derive(Debug, Clone)]
pub struct BoardTaskRecord {
    pub row: BoardTask,
    pub owner_rank: Option<i32>,
}

impl TrackerDb {
    pub(crate) fn map_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
        let status: String = row.get(4)?;
        Ok(Task {
            id: row.get(0)?,
            case_id: row.get(1)?,
            name: row.get(2)?,
            deadline: row.get(3)?,
            status: TaskStatus::from_str_lossy(&status),
            owner_id: row.get(5)?,
            planned_hours: row.get(6)?,
            consumed_hours: row.get(7)?,
            board_row: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    pub fn insert_task(&self, t: &Task) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO tasks (case_id, name, deadline, status, owner_id,
                                planned_hours, consumed_hours, board_row,
                                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                t.case_id,
                t.name,
                t.deadline,
                t.status.as_str(),
                t.owner_id,
                t.planned_hours,
                t.consumed_hours,
                t.board_row,
                t.created_at,
                t.updated_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, case_id, name, deadline, status, owner_id,
                        planned_hours, consumed_hours, board_row, created_at, updated_at
                 FROM tasks WHERE id = ?1",
                params![id],
                Self::map_task_row,
            )
            .optional()?)
    }

    pub fn tasks_for_case(&self, case_id: i64) -> Result<Vec<Task>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, case_id, name, deadline, status, owner_id,
                    planned_hours, consumed_hours, board_row, created_at, updated_at
             FROM tasks WHERE case_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![case_id], Self::map_task_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Rewrite every mutable task column. Task edits are always full-row;
    /// the board row is rewritten from scratch anyway.
    pub fn update_task(&self, t: &Task, now: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE tasks SET name = ?1, deadline = ?2, status = ?3, owner_id = ?4,
                              planned_hours = ?5, consumed_hours = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                t.name,
                t.deadline,
                t.status.as_str(),
                t.owner_id,
                t.planned_hours,
                t.consumed_hours,
                now,
                t.id,
            ],
        )?;
        Ok(())
    }

    /// Record the last board row a task was written to (informational).
    pub fn set_task_board_row(&self, id: i64, board_row: Option<i64>) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE tasks SET board_row = ?1 WHERE id = ?2",
            params![board_row, id],
        )?;
        Ok(())
    }

    pub fn delete_task(&self, id: i64) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(())
    }

    // =========================================================================
    // Board projection
    // =========================================================================

    const BOARD_TASK_SQL: &'static str =
        "SELECT co.id, pr.name,
                CASE co.kind WHEN 'own' THEN co.reference ELSE co.name END,
                mt.code, ct.code,
                t.id, t.name, pe.name, t.deadline, t.status,
                t.planned_hours, t.consumed_hours, pe.role_rank
         FROM tasks t
         JOIN cases ca ON ca.id = t.case_id
         JOIN case_types ct ON ct.id = ca.type_id
         JOIN milestones mi ON mi.id = ca.milestone_id
         JOIN milestone_types mt ON mt.id = mi.type_id
         JOIN contracts co ON co.id = mi.contract_id
         JOIN projects pr ON pr.id = co.project_id
         LEFT JOIN people pe ON pe.id = t.owner_id";

    fn map_board_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BoardTaskRecord> {
        let status: String = row.get(9)?;
        Ok(BoardTaskRecord {
            row: BoardTask {
                contract_id: row.get(0)?,
                project: row.get(1)?,
                contract_label: row.get(2)?,
                milestone: row.get(3)?,
                case_label: row.get(4)?,
                task_id: row.get(5)?,
                name: row.get(6)?,
                owner: row.get(7)?,
                deadline: row.get(8)?,
                status: TaskStatus::from_str_lossy(&status),
                planned_hours: row.get(10)?,
                consumed_hours: row.get(11)?,
            },
            owner_rank: row.get(12)?,
        })
    }

    /// Every task of a contract, denormalized for the board.
    pub fn board_tasks_for_contract(
        &self,
        contract_id: i64,
    ) -> Result<Vec<BoardTaskRecord>, DbError> {
        let sql = format!("{} WHERE co.id = ?1 ORDER BY t.id", Self::BOARD_TASK_SQL);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![contract_id], Self::map_board_task_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Contract id a task belongs to, walking up the tree.
    pub fn contract_id_for_task(&self, task_id: i64) -> Result<Option<i64>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT mi.contract_id
                 FROM tasks t
                 JOIN cases ca ON ca.id = t.case_id
                 JOIN milestones mi ON mi.id = ca.milestone_id
                 WHERE t.id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Contract id a case belongs to.
    pub fn contract_id_for_case(&self, case_id: i64) -> Result<Option<i64>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT mi.contract_id FROM cases ca
                 JOIN milestones mi ON mi.id = ca.milestone_id
                 WHERE ca.id = ?1",
                params![case_id],
                |row| row.get(0),
            )
            .optional()?)
    }
}
