use rusqlite::{params, OptionalExtension};

use super::*;
use crate::types::{Contract, ContractField, ContractKind, ContractStatus, RoleAssignment};

impl TrackerDb {
    pub(crate) fn map_contract_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contract> {
        let kind: String = row.get(2)?;
        let kind = if kind == "own" {
            ContractKind::Own {
                reference: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            }
        } else {
            ContractKind::Foreign {
                linked_contract_id: row.get(4)?,
            }
        };
        let status: String = row.get(10)?;
        Ok(Contract {
            id: row.get(0)?,
            project_id: row.get(1)?,
            kind,
            seq_number: row.get(5)?,
            name: row.get(6)?,
            starts_on: row.get(7)?,
            ends_on: row.get(8)?,
            value_cents: row.get(9)?,
            status: ContractStatus::from_str_lossy(&status),
            manager_id: row.get(11)?,
            folder_id: row.get(12)?,
            notes: row.get(13)?,
            archived: flag(row.get(14)?),
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    const CONTRACT_COLUMNS: &'static str =
        "id, project_id, kind, reference, linked_contract_id, seq_number, name,
         starts_on, ends_on, value_cents, status, manager_id, folder_id, notes,
         archived, created_at, updated_at";

    pub fn insert_contract(
        &self,
        c: &Contract,
    ) -> Result<i64, DbError> {
        let (kind, reference, linked) = match &c.kind {
            ContractKind::Own { reference } => ("own", Some(reference.as_str()), None),
            ContractKind::Foreign { linked_contract_id } => ("foreign", None, *linked_contract_id),
        };
        self.conn.execute(
            "INSERT INTO contracts (
                project_id, kind, reference, linked_contract_id, seq_number, name,
                starts_on, ends_on, value_cents, status, manager_id, folder_id,
                notes, archived, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                c.project_id,
                kind,
                reference,
                linked,
                c.seq_number,
                c.name,
                c.starts_on,
                c.ends_on,
                c.value_cents,
                c.status.as_str(),
                c.manager_id,
                c.folder_id,
                c.notes,
                c.archived as i32,
                c.created_at,
                c.updated_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_contract(&self, id: i64) -> Result<Option<Contract>, DbError> {
        let sql = format!(
            "SELECT {} FROM contracts WHERE id = ?1",
            Self::CONTRACT_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![id], Self::map_contract_row)
            .optional()?)
    }

    /// All contracts of a project, catalog order.
    pub fn contracts_for_project(&self, project_id: i64) -> Result<Vec<Contract>, DbError> {
        let sql = format!(
            "SELECT {} FROM contracts WHERE project_id = ?1 ORDER BY id",
            Self::CONTRACT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![project_id], Self::map_contract_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every non-archived contract, for a full board resync.
    pub fn all_live_contracts(&self) -> Result<Vec<Contract>, DbError> {
        let sql = format!(
            "SELECT {} FROM contracts WHERE archived = 0 ORDER BY id",
            Self::CONTRACT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::map_contract_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Uniqueness check for an own contract's external reference.
    pub fn contract_reference_exists(&self, reference: &str) -> Result<bool, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM contracts WHERE kind = 'own' AND reference = ?1")?;
        Ok(stmt.exists(params![reference])?)
    }

    /// Update a selection of contract fields; `None` in the caller maps to
    /// every field. Each field is a targeted UPDATE so unrelated columns
    /// keep their stored values.
    pub fn update_contract_fields(
        &self,
        c: &Contract,
        fields: &[ContractField],
        now: &str,
    ) -> Result<(), DbError> {
        for field in fields {
            match field {
                ContractField::Name => {
                    self.conn.execute(
                        "UPDATE contracts SET name = ?1, updated_at = ?2 WHERE id = ?3",
                        params![c.name, now, c.id],
                    )?;
                }
                ContractField::Kind => {
                    let (kind, reference, linked) = match &c.kind {
                        ContractKind::Own { reference } => {
                            ("own", Some(reference.as_str()), None)
                        }
                        ContractKind::Foreign { linked_contract_id } => {
                            ("foreign", None, *linked_contract_id)
                        }
                    };
                    self.conn.execute(
                        "UPDATE contracts SET kind = ?1, reference = ?2,
                            linked_contract_id = ?3, seq_number = ?4, updated_at = ?5
                         WHERE id = ?6",
                        params![kind, reference, linked, c.seq_number, now, c.id],
                    )?;
                }
                ContractField::Status => {
                    self.conn.execute(
                        "UPDATE contracts SET status = ?1, archived = ?2, updated_at = ?3
                         WHERE id = ?4",
                        params![
                            c.status.as_str(),
                            (c.archived || c.status == ContractStatus::Archived) as i32,
                            now,
                            c.id
                        ],
                    )?;
                }
                ContractField::Dates => {
                    self.conn.execute(
                        "UPDATE contracts SET starts_on = ?1, ends_on = ?2, updated_at = ?3
                         WHERE id = ?4",
                        params![c.starts_on, c.ends_on, now, c.id],
                    )?;
                }
                ContractField::Value => {
                    self.conn.execute(
                        "UPDATE contracts SET value_cents = ?1, updated_at = ?2 WHERE id = ?3",
                        params![c.value_cents, now, c.id],
                    )?;
                }
                ContractField::Notes => {
                    self.conn.execute(
                        "UPDATE contracts SET notes = ?1, updated_at = ?2 WHERE id = ?3",
                        params![c.notes, now, c.id],
                    )?;
                }
                ContractField::Manager => {
                    self.conn.execute(
                        "UPDATE contracts SET manager_id = ?1, updated_at = ?2 WHERE id = ?3",
                        params![c.manager_id, now, c.id],
                    )?;
                }
                ContractField::Roles => {
                    // Junction rows are replaced by the caller via
                    // replace_contract_roles; nothing to do on the row itself
                }
            }
        }
        Ok(())
    }

    pub fn set_contract_folder(&self, id: i64, folder_id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE contracts SET folder_id = ?1 WHERE id = ?2",
            params![folder_id, id],
        )?;
        Ok(())
    }

    /// Delete a contract; milestones, cases and tasks cascade.
    pub fn delete_contract(&self, id: i64) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM contracts WHERE id = ?1", params![id])?;
        Ok(())
    }

    // =========================================================================
    // Role associations
    // =========================================================================

    pub fn replace_contract_roles(
        &self,
        contract_id: i64,
        roles: &[RoleAssignment],
    ) -> Result<(), DbError> {
        self.conn.execute(
            "DELETE FROM contract_roles WHERE contract_id = ?1",
            params![contract_id],
        )?;
        for r in roles {
            self.conn.execute(
                "INSERT OR IGNORE INTO contract_roles (contract_id, party_id, role)
                 VALUES (?1, ?2, ?3)",
                params![contract_id, r.party_id, r.role],
            )?;
        }
        Ok(())
    }

    pub fn get_contract_roles(&self, contract_id: i64) -> Result<Vec<RoleAssignment>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT party_id, role FROM contract_roles WHERE contract_id = ?1 ORDER BY party_id",
        )?;
        let rows = stmt.query_map(params![contract_id], |row| {
            Ok(RoleAssignment {
                party_id: row.get(0)?,
                role: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::fixtures;

    #[test]
    fn insert_and_load_round_trip() {
        let db = TrackerDb::open_in_memory().unwrap();
        let project = db.insert_project("Depot", Some("fld-p")).unwrap();
        let c = fixtures::own_contract(project, "K-1", "Riverside depot");
        let id = db.insert_contract(&c).unwrap();

        let loaded = db.get_contract(id).unwrap().unwrap();
        assert_eq!(loaded.name, "Riverside depot");
        assert_eq!(
            loaded.kind,
            ContractKind::Own {
                reference: "K-1".to_string()
            }
        );
        assert!(!loaded.archived);
    }

    #[test]
    fn project_listing_orders_by_id() {
        let db = TrackerDb::open_in_memory().unwrap();
        let project = db.insert_project("Depot", None).unwrap();
        db.insert_contract(&fixtures::own_contract(project, "K-2", "Second"))
            .unwrap();
        db.insert_contract(&fixtures::own_contract(project, "K-1", "First"))
            .unwrap();

        let contracts = db.contracts_for_project(project).unwrap();
        assert_eq!(contracts.len(), 2);
        assert_eq!(contracts[0].name, "Second");
    }

    #[test]
    fn reference_uniqueness_check() {
        let db = TrackerDb::open_in_memory().unwrap();
        let project = db.insert_project("Depot", None).unwrap();
        db.insert_contract(&fixtures::own_contract(project, "K-1", "A"))
            .unwrap();
        assert!(db.contract_reference_exists("K-1").unwrap());
        assert!(!db.contract_reference_exists("K-2").unwrap());
    }

    #[test]
    fn status_update_sets_archived_flag() {
        let db = TrackerDb::open_in_memory().unwrap();
        let project = db.insert_project("Depot", None).unwrap();
        let mut c = fixtures::own_contract(project, "K-1", "A");
        c.id = db.insert_contract(&c).unwrap();

        c.status = ContractStatus::Archived;
        db.update_contract_fields(&c, &[ContractField::Status], "2026-01-01T00:00:00Z")
            .unwrap();

        let loaded = db.get_contract(c.id).unwrap().unwrap();
        assert_eq!(loaded.status, ContractStatus::Archived);
        assert!(loaded.archived);
    }

    #[test]
    fn roles_are_replaced_wholesale() {
        let db = TrackerDb::open_in_memory().unwrap();
        let project = db.insert_project("Depot", None).unwrap();
        let party_a = db.insert_party("Acme", None).unwrap();
        let party_b = db.insert_party("Bolt", None).unwrap();
        let c = fixtures::own_contract(project, "K-1", "A");
        let id = db.insert_contract(&c).unwrap();

        db.replace_contract_roles(
            id,
            &[RoleAssignment {
                party_id: party_a,
                role: "client".to_string(),
            }],
        )
        .unwrap();
        db.replace_contract_roles(
            id,
            &[RoleAssignment {
                party_id: party_b,
                role: "supplier".to_string(),
            }],
        )
        .unwrap();

        let roles = db.get_contract_roles(id).unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].party_id, party_b);
    }
}
