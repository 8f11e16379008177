use rusqlite::{params, OptionalExtension};

use super::*;
use crate::types::{CaseType, MilestoneType, Person, Project, TaskStatus, TaskTemplate};

impl TrackerDb {
    // =========================================================================
    // Projects
    // =========================================================================

    pub fn insert_project(&self, name: &str, folder_id: Option<&str>) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO projects (name, folder_id) VALUES (?1, ?2)",
            params![name, folder_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, folder_id FROM projects WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        folder_id: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    // =========================================================================
    // People
    // =========================================================================

    pub fn insert_person(
        &self,
        name: &str,
        email: Option<&str>,
        role_rank: i32,
    ) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO people (name, email, role_rank) VALUES (?1, ?2, ?3)",
            params![name, email, role_rank],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub(crate) fn map_person_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Person> {
        Ok(Person {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            role_rank: row.get(3)?,
        })
    }

    pub fn get_person(&self, id: i64) -> Result<Option<Person>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, email, role_rank FROM people WHERE id = ?1",
                params![id],
                Self::map_person_row,
            )
            .optional()?)
    }

    /// People whose role rank qualifies them for the board, ordered by name.
    /// Drives the per-person capacity summary block.
    pub fn get_board_people(&self, max_rank: i32) -> Result<Vec<Person>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, email, role_rank FROM people
             WHERE role_rank <= ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![max_rank], Self::map_person_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // =========================================================================
    // Counterparties
    // =========================================================================

    pub fn insert_party(&self, name: &str, email: Option<&str>) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO parties (name, email) VALUES (?1, ?2)",
            params![name, email],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    // =========================================================================
    // Milestone types
    // =========================================================================

    pub fn insert_milestone_type(&self, t: &MilestoneType) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO milestone_types (name, code, folder_number, unique_per_contract, is_default)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                t.name,
                t.code,
                t.folder_number,
                t.unique_per_contract as i32,
                t.is_default as i32,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub(crate) fn map_milestone_type_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MilestoneType> {
        Ok(MilestoneType {
            id: row.get(0)?,
            name: row.get(1)?,
            code: row.get(2)?,
            folder_number: row.get(3)?,
            unique_per_contract: flag(row.get(4)?),
            is_default: flag(row.get(5)?),
        })
    }

    pub fn get_milestone_type(&self, id: i64) -> Result<Option<MilestoneType>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, code, folder_number, unique_per_contract, is_default
                 FROM milestone_types WHERE id = ?1",
                params![id],
                Self::map_milestone_type_row,
            )
            .optional()?)
    }

    /// Milestone types created automatically under every new contract,
    /// in catalog order.
    pub fn default_milestone_types(&self) -> Result<Vec<MilestoneType>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, code, folder_number, unique_per_contract, is_default
             FROM milestone_types WHERE is_default = 1 ORDER BY id",
        )?;
        let rows = stmt.query_map([], Self::map_milestone_type_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // =========================================================================
    // Case types
    // =========================================================================

    pub fn insert_case_type(&self, t: &CaseType) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO case_types (name, code, folder_number, unique_per_milestone, is_default)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                t.name,
                t.code,
                t.folder_number,
                t.unique_per_milestone as i32,
                t.is_default as i32,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub(crate) fn map_case_type_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CaseType> {
        Ok(CaseType {
            id: row.get(0)?,
            name: row.get(1)?,
            code: row.get(2)?,
            folder_number: row.get(3)?,
            unique_per_milestone: flag(row.get(4)?),
            is_default: flag(row.get(5)?),
        })
    }

    pub fn get_case_type(&self, id: i64) -> Result<Option<CaseType>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, code, folder_number, unique_per_milestone, is_default
                 FROM case_types WHERE id = ?1",
                params![id],
                Self::map_case_type_row,
            )
            .optional()?)
    }

    pub fn default_case_types(&self) -> Result<Vec<CaseType>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, code, folder_number, unique_per_milestone, is_default
             FROM case_types WHERE is_default = 1 ORDER BY id",
        )?;
        let rows = stmt.query_map([], Self::map_case_type_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // =========================================================================
    // Task templates
    // =========================================================================

    pub fn insert_task_template(&self, t: &TaskTemplate) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO task_templates (case_type_id, name, offset_days, default_status)
             VALUES (?1, ?2, ?3, ?4)",
            params![t.case_type_id, t.name, t.offset_days, t.default_status.as_str()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn task_templates_for_case_type(
        &self,
        case_type_id: i64,
    ) -> Result<Vec<TaskTemplate>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, case_type_id, name, offset_days, default_status
             FROM task_templates WHERE case_type_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![case_type_id], |row| {
            let status: String = row.get(4)?;
            Ok(TaskTemplate {
                id: row.get(0)?,
                case_type_id: row.get(1)?,
                name: row.get(2)?,
                offset_days: row.get(3)?,
                default_status: TaskStatus::from_str_lossy(&status),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_round_trip() {
        let db = TrackerDb::open_in_memory().unwrap();

        let mt_id = db
            .insert_milestone_type(&MilestoneType {
                id: 0,
                name: "Design".to_string(),
                code: "DSG".to_string(),
                folder_number: 2,
                unique_per_contract: false,
                is_default: true,
            })
            .unwrap();
        let loaded = db.get_milestone_type(mt_id).unwrap().unwrap();
        assert_eq!(loaded.code, "DSG");
        assert!(loaded.is_default);
        assert!(!loaded.unique_per_contract);

        assert_eq!(db.default_milestone_types().unwrap().len(), 1);
    }

    #[test]
    fn board_people_filters_by_rank() {
        let db = TrackerDb::open_in_memory().unwrap();
        db.insert_person("Alice", Some("alice@example.com"), 2).unwrap();
        db.insert_person("Bob", None, 4).unwrap();
        db.insert_person("Cleo", None, 3).unwrap();

        let people = db.get_board_people(3).unwrap();
        let names: Vec<&str> = people.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Cleo"]);
    }

    #[test]
    fn task_templates_scoped_to_case_type() {
        let db = TrackerDb::open_in_memory().unwrap();
        let ct = db
            .insert_case_type(&CaseType {
                id: 0,
                name: "Inspection".to_string(),
                code: "INSP".to_string(),
                folder_number: 1,
                unique_per_milestone: true,
                is_default: true,
            })
            .unwrap();
        db.insert_task_template(&TaskTemplate {
            id: 0,
            case_type_id: ct,
            name: "Schedule visit".to_string(),
            offset_days: Some(7),
            default_status: TaskStatus::Planned,
        })
        .unwrap();

        let templates = db.task_templates_for_case_type(ct).unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].default_status, TaskStatus::Planned);
    }
}
