//! Entity lifecycle orchestration.
//!
//! One create/edit/delete entry point per entity kind, each sequencing the
//! three stores the same way: folder step first, database transaction
//! second, board projection last. The database is authoritative: a failure
//! before commit rolls everything back (including compensating folder
//! cleanup), a failure after commit degrades to a warning on the returned
//! outcome.
//!
//! Board operations are read-then-write against a service with no
//! transactions, so every board sequence runs behind a per-sheet async lock.
//! That serializes lifecycle operations touching the same sheet within this
//! process; cross-process callers still race, as the original deployment
//! model accepted.

mod case;
mod contract;
mod milestone;
mod task;

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::board::{BoardClient, BoardSync, SheetRef};
use crate::config::Config;
use crate::db::TrackerDb;
use crate::error::{LifecycleError, StoreKind, SyncWarning};
use crate::folders::{FolderId, FolderMirror, FolderStore};
use crate::session::AuthSession;
use crate::types::{BoardHeader, BoardTask, CaseType, EntityKind, Person, TaskTemplate};

/// A default case ready to be inserted under a new milestone: its type, the
/// pre-created folder, and the task templates to instantiate.
pub(crate) struct CasePlan {
    pub case_type: CaseType,
    pub seq: Option<i64>,
    pub folder: FolderId,
    pub templates: Vec<TaskTemplate>,
}

/// Deadline for a template task, offset from today.
fn template_deadline(offset_days: Option<i64>) -> Option<String> {
    offset_days.map(|days| {
        (Utc::now().date_naive() + chrono::Days::new(days.max(0) as u64)).to_string()
    })
}

/// What a board resync should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncScope {
    /// Every live contract.
    Full,
    /// One contract's header and task rows.
    Contract(i64),
}

pub struct Orchestrator {
    db: Arc<Mutex<TrackerDb>>,
    folders: FolderMirror,
    board: Arc<dyn BoardClient>,
    config: Config,
    sheet_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl Orchestrator {
    pub fn new(
        db: TrackerDb,
        folder_store: Arc<dyn FolderStore>,
        board: Arc<dyn BoardClient>,
        config: Config,
    ) -> Self {
        Orchestrator {
            db: Arc::new(Mutex::new(db)),
            folders: FolderMirror::new(folder_store),
            board,
            config,
            sheet_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn db(&self) -> parking_lot::MutexGuard<'_, TrackerDb> {
        self.db.lock()
    }

    pub(crate) fn folders(&self) -> &FolderMirror {
        &self.folders
    }

    pub(crate) fn board_sync(&self) -> BoardSync<'_> {
        BoardSync::new(self.board.as_ref(), &self.config)
    }

    pub(crate) fn timestamp() -> String {
        Utc::now().to_rfc3339()
    }

    pub(crate) fn new_op_id() -> Uuid {
        Uuid::new_v4()
    }

    /// Acquire the board lock for the configured sheet. Every board
    /// read-compute-write sequence runs under this guard.
    pub(crate) async fn sheet_guard(&self) -> tokio::sync::OwnedMutexGuard<()> {
        let key = SheetRef::new(
            self.config.board.spreadsheet.clone(),
            self.config.board.sheet.clone(),
        )
        .lock_key();
        let lock = self
            .sheet_locks
            .entry(key)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    pub(crate) fn warn(
        &self,
        store: StoreKind,
        entity: EntityKind,
        entity_id: i64,
        error: &LifecycleError,
    ) -> SyncWarning {
        let warning = SyncWarning {
            store,
            entity,
            entity_id,
            message: error.to_string(),
        };
        log::warn!("{}", warning);
        warning
    }

    /// People who qualify for the board, for the capacity summary.
    pub(crate) fn board_people(&self) -> Result<Vec<Person>, LifecycleError> {
        Ok(self
            .db()
            .get_board_people(self.config.visible_role_rank_max)?)
    }

    /// Compute a contract's full board state from the database: header,
    /// visible task rows, and whether the contract belongs on the board at
    /// all.
    pub(crate) fn contract_board_state(
        &self,
        contract_id: i64,
    ) -> Result<(BoardHeader, Vec<BoardTask>, bool), LifecycleError> {
        let db = self.db();
        let contract = db.get_contract(contract_id)?.ok_or_else(|| {
            LifecycleError::Consistency(format!("contract {} missing from database", contract_id))
        })?;
        let project = db.get_project(contract.project_id)?.ok_or_else(|| {
            LifecycleError::Consistency(format!(
                "project {} missing for contract {}",
                contract.project_id, contract_id
            ))
        })?;
        let manager = match contract.manager_id {
            Some(id) => db.get_person(id)?,
            None => None,
        };
        let visible = crate::board::visibility::contract_belongs_on_board(
            &contract,
            manager.as_ref(),
            &self.config,
        );

        let header = BoardHeader {
            contract_id,
            project: project.name,
            label: contract.board_label(),
        };
        let rows: Vec<BoardTask> = db
            .board_tasks_for_contract(contract_id)?
            .into_iter()
            .filter(|rec| {
                crate::board::visibility::task_row_qualifies(
                    rec.row.status,
                    rec.owner_rank,
                    &self.config,
                )
            })
            .map(|rec| rec.row)
            .collect();
        Ok((header, rows, visible))
    }

    /// Reconcile one contract's board range with the database, then persist
    /// the final row placements back onto the tasks. Runs under the sheet
    /// lock.
    pub(crate) async fn reconcile_contract_board(
        &self,
        session: &AuthSession,
        contract_id: i64,
    ) -> Result<(), LifecycleError> {
        let (header, rows, visible) = self.contract_board_state(contract_id)?;
        let people = self.board_people()?;

        let _guard = self.sheet_guard().await;
        let sync = self.board_sync();
        let placements = sync
            .reconcile_contract(session, &header, &rows, visible, &people)
            .await?;

        let db = self.db();
        for task in &rows {
            let placed = placements
                .iter()
                .find(|(id, _)| *id == task.task_id)
                .map(|(_, row)| *row as i64);
            db.set_task_board_row(task.task_id, placed)?;
        }
        Ok(())
    }

    /// Plan the default cases (and their template tasks) created under a new
    /// milestone. Folders are created up front, before the database
    /// transaction; the whole subtree lives inside the milestone folder, so
    /// compensating cleanup only needs to remove the top of it.
    pub(crate) async fn plan_default_cases(
        &self,
        session: &AuthSession,
        milestone_folder: &str,
    ) -> Result<Vec<CasePlan>, LifecycleError> {
        let defaults = {
            let db = self.db();
            let types = db.default_case_types()?;
            let mut with_templates = Vec::with_capacity(types.len());
            for ct in types {
                let templates = db.task_templates_for_case_type(ct.id)?;
                with_templates.push((ct, templates));
            }
            with_templates
        };

        let mut plans = Vec::with_capacity(defaults.len());
        for (ct, templates) in defaults {
            let seq = if ct.unique_per_milestone { None } else { Some(1) };
            let name = crate::naming::case_folder(&ct, seq, &ct.name);
            let folder = self.folders.ensure(session, milestone_folder, &name).await?;
            plans.push(CasePlan {
                case_type: ct,
                seq,
                folder,
                templates,
            });
        }
        Ok(plans)
    }

    /// Insert a planned case and its template tasks inside the current
    /// transaction.
    pub(crate) fn insert_planned_case(
        db: &TrackerDb,
        milestone_id: i64,
        plan: &CasePlan,
        now: &str,
    ) -> Result<i64, LifecycleError> {
        let case = crate::types::Case {
            id: 0,
            milestone_id,
            type_id: plan.case_type.id,
            seq_number: plan.seq,
            name: plan.case_type.name.clone(),
            folder_id: Some(plan.folder.clone()),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        };
        let case_id = db.insert_case(&case)?;
        for template in &plan.templates {
            let task = crate::types::Task {
                id: 0,
                case_id,
                name: template.name.clone(),
                deadline: template_deadline(template.offset_days),
                status: template.default_status,
                owner_id: None,
                planned_hours: 0.0,
                consumed_hours: 0.0,
                board_row: None,
                created_at: now.to_string(),
                updated_at: now.to_string(),
            };
            db.insert_task(&task)?;
        }
        Ok(case_id)
    }

    /// Repair the board projection without touching the database: missing
    /// header or task rows are added, stale rows dropped, nothing is
    /// duplicated.
    pub async fn resync_board(
        &self,
        scope: ResyncScope,
        session: &AuthSession,
    ) -> Result<(), LifecycleError> {
        match scope {
            ResyncScope::Contract(contract_id) => {
                self.reconcile_contract_board(session, contract_id).await
            }
            ResyncScope::Full => {
                let ids: Vec<i64> = {
                    let db = self.db();
                    db.all_live_contracts()?.iter().map(|c| c.id).collect()
                };
                for contract_id in ids {
                    self.reconcile_contract_board(session, contract_id).await?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::board::locate;
    use crate::testutil::{MemBoard, MemFolderStore};
    use crate::types::{
        CaseDraft, CaseType, ContractDraft, ContractField, ContractKind, ContractStatus,
        MilestoneType, TaskDraft, TaskStatus, TaskTemplate,
    };

    struct Rig {
        orch: Orchestrator,
        folders: Arc<MemFolderStore>,
        board: Arc<MemBoard>,
        manager_id: i64,
        project_folder: String,
    }

    fn session() -> AuthSession {
        AuthSession::new("ops@example.com", "token")
    }

    /// Orchestrator over in-memory stores, with a project, a manager and the
    /// default catalog: two default milestone types, one default unique case
    /// type carrying two planned task templates.
    fn rig() -> Rig {
        crate::testutil::init_test_logging();
        let db = TrackerDb::open_in_memory().unwrap();
        let project_folder = "fld-project".to_string();
        db.insert_project("Depot", Some(&project_folder)).unwrap();
        let manager_id = db
            .insert_person("Alice", Some("alice@example.com"), 2)
            .unwrap();

        for (name, code) in [("Design", "DSG"), ("Execution", "EXE")] {
            db.insert_milestone_type(&MilestoneType {
                id: 0,
                name: name.to_string(),
                code: code.to_string(),
                folder_number: 0,
                unique_per_contract: false,
                is_default: true,
            })
            .unwrap();
        }
        let ct = db
            .insert_case_type(&CaseType {
                id: 0,
                name: "General".to_string(),
                code: "GEN".to_string(),
                folder_number: 1,
                unique_per_milestone: true,
                is_default: true,
            })
            .unwrap();
        for name in ["Kickoff review", "Close-out"] {
            db.insert_task_template(&TaskTemplate {
                id: 0,
                case_type_id: ct,
                name: name.to_string(),
                offset_days: Some(14),
                default_status: TaskStatus::Planned,
            })
            .unwrap();
        }

        let folders = Arc::new(MemFolderStore::new(&project_folder));
        let board = Arc::new(MemBoard::new());
        let orch = Orchestrator::new(
            db,
            folders.clone(),
            board.clone(),
            Config::default(),
        );
        Rig {
            orch,
            folders,
            board,
            manager_id,
            project_folder,
        }
    }

    fn contract_draft(rig: &Rig, reference: &str) -> ContractDraft {
        ContractDraft {
            project_id: 1,
            kind: ContractKind::Own {
                reference: reference.to_string(),
            },
            name: "Riverside depot".to_string(),
            starts_on: Some("2026-01-01".to_string()),
            ends_on: Some("2026-12-31".to_string()),
            value_cents: Some(12_500_000),
            status: ContractStatus::Active,
            manager_id: Some(rig.manager_id),
            notes: None,
            roles: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_contract_builds_tree_folders_and_board() {
        let rig = rig();
        let outcome = rig
            .orch
            .create_contract(contract_draft(&rig, "K-1"), &session())
            .await
            .unwrap();
        assert!(outcome.is_clean());
        let contract = outcome.entity;
        assert!(contract.id > 0);

        // Default children: 2 milestones, each 1 case with 2 tasks
        {
            let db = rig.orch.db();
            let milestones = db.milestones_for_contract(contract.id).unwrap();
            assert_eq!(milestones.len(), 2);
            let mut tasks = 0;
            for m in &milestones {
                let cases = db.cases_for_milestone(m.id).unwrap();
                assert_eq!(cases.len(), 1);
                for c in &cases {
                    tasks += db.tasks_for_case(c.id).unwrap().len();
                }
            }
            assert_eq!(tasks, 4);
        }

        // Folder tree: contract folder under the project, milestone folders
        // inside it, the shared type folder inside each milestone
        let contract_folder = contract.folder_id.clone().unwrap();
        assert_eq!(
            rig.folders.child_names(&rig.project_folder),
            vec!["K-1 Riverside depot".to_string()]
        );
        assert_eq!(
            rig.folders.child_names(&contract_folder),
            vec!["M01 Design".to_string(), "M01 Execution".to_string()]
        );

        // Board: header plus 4 visible task rows, contiguous
        let layout = &rig.orch.config().board;
        let values = rig.board.values();
        let key = contract.id.to_string();
        let range =
            locate::key_range(&values, layout.col_contract_id, &key, layout.first_data_row)
                .unwrap();
        assert_eq!(range.row_count(), 5);
        assert!(locate::is_contiguous(
            &values,
            layout.col_contract_id,
            &key,
            layout.first_data_row
        ));
    }

    #[tokio::test]
    async fn duplicate_reference_rejected_before_side_effects() {
        let rig = rig();
        rig.orch
            .create_contract(contract_draft(&rig, "K-1"), &session())
            .await
            .unwrap();
        let before = rig.folders.child_count(&rig.project_folder);

        let err = rig
            .orch
            .create_contract(contract_draft(&rig, "K-1"), &session())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Duplicate { .. }));
        assert!(err.rejected_before_side_effects());
        assert_eq!(rig.folders.child_count(&rig.project_folder), before);
    }

    #[tokio::test]
    async fn child_folder_failure_compensates_contract_folder() {
        let rig = rig();
        // Contract folder succeeds, the first milestone folder fails
        rig.folders.set_create_budget(1);

        let err = rig
            .orch
            .create_contract(contract_draft(&rig, "K-1"), &session())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Store(_)));

        // Nothing persisted, the orphaned folder is soft-deleted
        assert_eq!(rig.orch.db().all_live_contracts().unwrap().len(), 0);
        assert_eq!(rig.folders.child_count(&rig.project_folder), 0);
    }

    #[tokio::test]
    async fn board_failure_after_commit_keeps_entity_and_resync_heals() {
        let rig = rig();
        rig.board.set_fail(true);

        let outcome = rig
            .orch
            .create_contract(contract_draft(&rig, "K-1"), &session())
            .await
            .unwrap();
        // Persisted with a valid id and folder, board degraded to a warning
        assert!(outcome.entity.id > 0);
        assert!(outcome.entity.folder_id.is_some());
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].store, StoreKind::Board);

        // The board heals on resync without duplicating the database row
        rig.board.set_fail(false);
        rig.orch
            .resync_board(ResyncScope::Contract(outcome.entity.id), &session())
            .await
            .unwrap();
        rig.orch
            .resync_board(ResyncScope::Contract(outcome.entity.id), &session())
            .await
            .unwrap();

        let layout = &rig.orch.config().board;
        let values = rig.board.values();
        let range = locate::key_range(
            &values,
            layout.col_contract_id,
            &outcome.entity.id.to_string(),
            layout.first_data_row,
        )
        .unwrap();
        assert_eq!(range.row_count(), 5);
        assert_eq!(rig.orch.db().all_live_contracts().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn status_only_edit_touches_neither_folder_nor_board() {
        let rig = rig();
        let created = rig
            .orch
            .create_contract(contract_draft(&rig, "K-1"), &session())
            .await
            .unwrap()
            .entity;

        // Any folder or board call from here on would error or warn
        rig.board.set_fail(true);
        rig.folders.set_fail_creates(true);

        let mut patch = created.clone();
        patch.status = ContractStatus::Completed;
        let outcome = rig
            .orch
            .edit_contract(patch, None, Some(&[ContractField::Status]), &session())
            .await
            .unwrap();

        assert!(outcome.is_clean());
        assert_eq!(outcome.entity.status, ContractStatus::Completed);
        assert_eq!(
            rig.folders.name_of(created.folder_id.as_deref().unwrap()),
            "K-1 Riverside depot"
        );
    }

    #[tokio::test]
    async fn renaming_contract_renames_folder_and_rewrites_header() {
        let rig = rig();
        let created = rig
            .orch
            .create_contract(contract_draft(&rig, "K-1"), &session())
            .await
            .unwrap()
            .entity;

        let mut patch = created.clone();
        patch.name = "Harbour depot".to_string();
        let outcome = rig
            .orch
            .edit_contract(patch, None, Some(&[ContractField::Name]), &session())
            .await
            .unwrap();
        assert!(outcome.is_clean());

        assert_eq!(
            rig.folders.name_of(created.folder_id.as_deref().unwrap()),
            "K-1 Harbour depot"
        );
    }

    #[tokio::test]
    async fn foreign_contracts_are_numbered_within_project() {
        let rig = rig();
        let mut draft = contract_draft(&rig, "unused");
        draft.kind = ContractKind::Foreign {
            linked_contract_id: None,
        };
        draft.name = "Subcontract".to_string();

        let first = rig
            .orch
            .create_contract(draft.clone(), &session())
            .await
            .unwrap()
            .entity;
        draft.name = "Second subcontract".to_string();
        let second = rig
            .orch
            .create_contract(draft, &session())
            .await
            .unwrap()
            .entity;

        assert_eq!(first.seq_number, Some(1));
        assert_eq!(second.seq_number, Some(2));
        let names = rig.folders.child_names(&rig.project_folder);
        assert!(names.contains(&"D01 Subcontract".to_string()));
        assert!(names.contains(&"D02 Second subcontract".to_string()));
    }

    #[tokio::test]
    async fn task_edit_reevaluates_visibility() {
        let rig = rig();
        let created = rig
            .orch
            .create_contract(contract_draft(&rig, "K-1"), &session())
            .await
            .unwrap()
            .entity;
        let task = {
            let db = rig.orch.db();
            let milestones = db.milestones_for_contract(created.id).unwrap();
            let cases = db.cases_for_milestone(milestones[0].id).unwrap();
            db.tasks_for_case(cases[0].id).unwrap().remove(0)
        };

        // Sending the task back to the backlog removes its row
        let mut patch = task.clone();
        patch.status = TaskStatus::Backlog;
        rig.orch.edit_task(patch, &session()).await.unwrap();

        let layout = &rig.orch.config().board;
        let values = rig.board.values();
        let range = locate::key_range(
            &values,
            layout.col_contract_id,
            &created.id.to_string(),
            layout.first_data_row,
        )
        .unwrap();
        assert_eq!(range.row_count(), 4); // header + 3 remaining tasks
        assert!(
            locate::task_row_in_range(&values, range, layout.col_task_id, task.id).is_none()
        );
    }

    #[tokio::test]
    async fn delete_contract_is_authoritative_and_cleans_up() {
        let rig = rig();
        let created = rig
            .orch
            .create_contract(contract_draft(&rig, "K-1"), &session())
            .await
            .unwrap()
            .entity;
        let folder_id = created.folder_id.clone().unwrap();

        rig.orch
            .delete_contract(created.id, &session())
            .await
            .unwrap();

        assert!(rig.orch.db().get_contract(created.id).unwrap().is_none());
        assert!(rig.folders.is_trashed(&folder_id));
        let layout = &rig.orch.config().board;
        assert!(locate::key_range(
            &rig.board.values(),
            layout.col_contract_id,
            &created.id.to_string(),
            layout.first_data_row
        )
        .is_none());
    }

    #[tokio::test]
    async fn delete_survives_board_outage() {
        let rig = rig();
        let created = rig
            .orch
            .create_contract(contract_draft(&rig, "K-1"), &session())
            .await
            .unwrap()
            .entity;

        rig.board.set_fail(true);
        rig.orch
            .delete_contract(created.id, &session())
            .await
            .unwrap();
        assert!(rig.orch.db().get_contract(created.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn bulk_case_creation_numbers_within_batch() {
        let rig = rig();
        let created = rig
            .orch
            .create_contract(contract_draft(&rig, "K-1"), &session())
            .await
            .unwrap()
            .entity;
        let (milestone_id, milestone_folder, type_id) = {
            let db = rig.orch.db();
            let mut milestones = db.milestones_for_contract(created.id).unwrap();
            let m = milestones.remove(0);
            let type_id = db
                .insert_case_type(&CaseType {
                    id: 0,
                    name: "Fit-out".to_string(),
                    code: "FIT".to_string(),
                    folder_number: 4,
                    unique_per_milestone: false,
                    is_default: false,
                })
                .unwrap();
            (m.id, m.folder_id.clone().unwrap(), type_id)
        };

        let drafts: Vec<CaseDraft> = ["North wing", "South wing"]
            .iter()
            .map(|n| CaseDraft {
                milestone_id,
                type_id,
                name: n.to_string(),
            })
            .collect();
        let outcome = rig
            .orch
            .bulk_create_cases(milestone_id, drafts, &session())
            .await
            .unwrap();

        assert_eq!(outcome.entity.len(), 2);
        assert_eq!(outcome.entity[0].seq_number, Some(1));
        assert_eq!(outcome.entity[1].seq_number, Some(2));
        let names = rig.folders.child_names(&milestone_folder);
        assert!(names.contains(&"S01 North wing".to_string()));
        assert!(names.contains(&"S02 South wing".to_string()));
    }

    #[tokio::test]
    async fn bulk_task_creation_syncs_board_once() {
        let rig = rig();
        let created = rig
            .orch
            .create_contract(contract_draft(&rig, "K-1"), &session())
            .await
            .unwrap()
            .entity;
        let case_id = {
            let db = rig.orch.db();
            let milestones = db.milestones_for_contract(created.id).unwrap();
            db.cases_for_milestone(milestones[0].id).unwrap()[0].id
        };

        let drafts: Vec<TaskDraft> = (0..3)
            .map(|i| TaskDraft {
                case_id,
                name: format!("Extra task {}", i),
                deadline: None,
                status: TaskStatus::Planned,
                owner_id: None,
                planned_hours: 4.0,
                consumed_hours: 0.0,
            })
            .collect();
        let outcome = rig
            .orch
            .bulk_create_tasks(case_id, drafts, &session())
            .await
            .unwrap();
        assert_eq!(outcome.entity.len(), 3);

        let layout = &rig.orch.config().board;
        let values = rig.board.values();
        let range = locate::key_range(
            &values,
            layout.col_contract_id,
            &created.id.to_string(),
            layout.first_data_row,
        )
        .unwrap();
        assert_eq!(range.row_count(), 8); // header + 4 defaults + 3 extras
    }
}
