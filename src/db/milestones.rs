use rusqlite::{params, OptionalExtension};

use super::*;
use crate::types::{DateRange, Milestone, MilestoneField, MilestoneStatus};

impl TrackerDb {
    pub(crate) fn map_milestone_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Milestone> {
        let status: String = row.get(4)?;
        Ok(Milestone {
            id: row.get(0)?,
            contract_id: row.get(1)?,
            type_id: row.get(2)?,
            seq_number: row.get(3)?,
            status: MilestoneStatus::from_str_lossy(&status),
            folder_id: row.get(5)?,
            periods: Vec::new(),
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn attach_periods(&self, milestone: &mut Milestone) -> Result<(), DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT starts_on, ends_on FROM milestone_periods
             WHERE milestone_id = ?1 ORDER BY starts_on, id",
        )?;
        let rows = stmt.query_map(params![milestone.id], |row| {
            Ok(DateRange {
                starts_on: row.get(0)?,
                ends_on: row.get(1)?,
            })
        })?;
        milestone.periods = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }

    pub fn insert_milestone(&self, m: &Milestone) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO milestones (contract_id, type_id, seq_number, status, folder_id,
                                     created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                m.contract_id,
                m.type_id,
                m.seq_number,
                m.status.as_str(),
                m.folder_id,
                m.created_at,
                m.updated_at,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        for p in &m.periods {
            self.conn.execute(
                "INSERT INTO milestone_periods (milestone_id, starts_on, ends_on)
                 VALUES (?1, ?2, ?3)",
                params![id, p.starts_on, p.ends_on],
            )?;
        }
        Ok(id)
    }

    pub fn get_milestone(&self, id: i64) -> Result<Option<Milestone>, DbError> {
        let found = self
            .conn
            .query_row(
                "SELECT id, contract_id, type_id, seq_number, status, folder_id,
                        created_at, updated_at
                 FROM milestones WHERE id = ?1",
                params![id],
                Self::map_milestone_row,
            )
            .optional()?;
        match found {
            Some(mut m) => {
                self.attach_periods(&mut m)?;
                Ok(Some(m))
            }
            None => Ok(None),
        }
    }

    pub fn milestones_for_contract(&self, contract_id: i64) -> Result<Vec<Milestone>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, contract_id, type_id, seq_number, status, folder_id,
                    created_at, updated_at
             FROM milestones WHERE contract_id = ?1 ORDER BY type_id, seq_number",
        )?;
        let rows = stmt.query_map(params![contract_id], Self::map_milestone_row)?;
        let mut milestones = rows.collect::<Result<Vec<_>, _>>()?;
        for m in &mut milestones {
            self.attach_periods(m)?;
        }
        Ok(milestones)
    }

    /// Uniqueness check for a unique-per-contract milestone type.
    pub fn milestone_exists(&self, contract_id: i64, type_id: i64) -> Result<bool, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM milestones WHERE contract_id = ?1 AND type_id = ?2")?;
        Ok(stmt.exists(params![contract_id, type_id])?)
    }

    pub fn update_milestone_fields(
        &self,
        m: &Milestone,
        fields: &[MilestoneField],
        now: &str,
    ) -> Result<(), DbError> {
        for field in fields {
            match field {
                MilestoneField::Type => {
                    self.conn.execute(
                        "UPDATE milestones SET type_id = ?1, seq_number = ?2, updated_at = ?3
                         WHERE id = ?4",
                        params![m.type_id, m.seq_number, now, m.id],
                    )?;
                }
                MilestoneField::Status => {
                    self.conn.execute(
                        "UPDATE milestones SET status = ?1, updated_at = ?2 WHERE id = ?3",
                        params![m.status.as_str(), now, m.id],
                    )?;
                }
                MilestoneField::Periods => {
                    self.conn.execute(
                        "DELETE FROM milestone_periods WHERE milestone_id = ?1",
                        params![m.id],
                    )?;
                    for p in &m.periods {
                        self.conn.execute(
                            "INSERT INTO milestone_periods (milestone_id, starts_on, ends_on)
                             VALUES (?1, ?2, ?3)",
                            params![m.id, p.starts_on, p.ends_on],
                        )?;
                    }
                    self.conn.execute(
                        "UPDATE milestones SET updated_at = ?1 WHERE id = ?2",
                        params![now, m.id],
                    )?;
                }
            }
        }
        Ok(())
    }

    pub fn set_milestone_folder(&self, id: i64, folder_id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE milestones SET folder_id = ?1 WHERE id = ?2",
            params![folder_id, id],
        )?;
        Ok(())
    }

    /// Delete a milestone; cases and tasks cascade.
    pub fn delete_milestone(&self, id: i64) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM milestones WHERE id = ?1", params![id])?;
        Ok(())
    }
}
