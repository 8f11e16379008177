use rusqlite::{params, OptionalExtension};

use super::*;
use crate::types::{Case, CaseField};

impl TrackerDb {
    pub(crate) fn map_case_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Case> {
        Ok(Case {
            id: row.get(0)?,
            milestone_id: row.get(1)?,
            type_id: row.get(2)?,
            seq_number: row.get(3)?,
            name: row.get(4)?,
            folder_id: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    pub fn insert_case(&self, c: &Case) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO cases (milestone_id, type_id, seq_number, name, folder_id,
                                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                c.milestone_id,
                c.type_id,
                c.seq_number,
                c.name,
                c.folder_id,
                c.created_at,
                c.updated_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_case(&self, id: i64) -> Result<Option<Case>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, milestone_id, type_id, seq_number, name, folder_id,
                        created_at, updated_at
                 FROM cases WHERE id = ?1",
                params![id],
                Self::map_case_row,
            )
            .optional()?)
    }

    pub fn cases_for_milestone(&self, milestone_id: i64) -> Result<Vec<Case>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, milestone_id, type_id, seq_number, name, folder_id,
                    created_at, updated_at
             FROM cases WHERE milestone_id = ?1 ORDER BY type_id, seq_number",
        )?;
        let rows = stmt.query_map(params![milestone_id], Self::map_case_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Uniqueness check for a unique-per-milestone case type.
    pub fn case_exists(&self, milestone_id: i64, type_id: i64) -> Result<bool, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM cases WHERE milestone_id = ?1 AND type_id = ?2")?;
        Ok(stmt.exists(params![milestone_id, type_id])?)
    }

    pub fn update_case_fields(
        &self,
        c: &Case,
        fields: &[CaseField],
        now: &str,
    ) -> Result<(), DbError> {
        for field in fields {
            match field {
                CaseField::Name => {
                    self.conn.execute(
                        "UPDATE cases SET name = ?1, updated_at = ?2 WHERE id = ?3",
                        params![c.name, now, c.id],
                    )?;
                }
                CaseField::Type => {
                    self.conn.execute(
                        "UPDATE cases SET type_id = ?1, seq_number = ?2, updated_at = ?3
                         WHERE id = ?4",
                        params![c.type_id, c.seq_number, now, c.id],
                    )?;
                }
            }
        }
        Ok(())
    }

    pub fn set_case_folder(&self, id: i64, folder_id: Option<&str>) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE cases SET folder_id = ?1 WHERE id = ?2",
            params![folder_id, id],
        )?;
        Ok(())
    }

    /// Delete a case; tasks cascade.
    pub fn delete_case(&self, id: i64) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM cases WHERE id = ?1", params![id])?;
        Ok(())
    }
}
