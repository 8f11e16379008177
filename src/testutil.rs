//! Shared test support: in-memory store fakes and entity fixtures.
//!
//! The fakes model just enough of the external services to exercise the
//! synchronizer: the folder store keeps a parent/name tree with ownership
//! and trash flags, the board keeps a growable cell matrix and implements
//! the structural operations (insert/delete/sort/clear) the client trait
//! exposes. Both can be switched into a failing mode to drive the
//! compensation and warning paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::board::client::{BoardClient, CellValue, Matrix, RangeRef, SheetRef, SortSpec};
use crate::error::{StoreError, StoreKind};
use crate::folders::{FolderId, FolderMeta, FolderStore};
use crate::session::AuthSession;

/// Route log output through env_logger in tests (`RUST_LOG=debug` to see it).
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// =============================================================================
// Folder store fake
// =============================================================================

#[derive(Debug, Clone)]
struct FolderRec {
    parent: String,
    name: String,
    owned: bool,
    trashed: bool,
}

pub struct MemFolderStore {
    folders: Mutex<HashMap<String, FolderRec>>,
    next_id: Mutex<u64>,
    fail_creates: AtomicBool,
    create_budget: Mutex<Option<usize>>,
}

impl MemFolderStore {
    pub fn new(root: &str) -> Self {
        let mut folders = HashMap::new();
        folders.insert(
            root.to_string(),
            FolderRec {
                parent: String::new(),
                name: root.to_string(),
                owned: true,
                trashed: false,
            },
        );
        MemFolderStore {
            folders: Mutex::new(folders),
            next_id: Mutex::new(1),
            fail_creates: AtomicBool::new(false),
            create_budget: Mutex::new(None),
        }
    }

    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Allow `n` more folder creations, then fail. Drives the compensation
    /// paths that trigger when a child folder cannot be created.
    pub fn set_create_budget(&self, n: usize) {
        *self.create_budget.lock() = Some(n);
    }

    pub fn set_owned(&self, id: &str, owned: bool) {
        if let Some(rec) = self.folders.lock().get_mut(id) {
            rec.owned = owned;
        }
    }

    pub fn is_trashed(&self, id: &str) -> bool {
        self.folders.lock().get(id).is_some_and(|r| r.trashed)
    }

    pub fn name_of(&self, id: &str) -> String {
        self.folders
            .lock()
            .get(id)
            .map(|r| r.name.clone())
            .unwrap_or_default()
    }

    pub fn child_count(&self, parent: &str) -> usize {
        self.folders
            .lock()
            .values()
            .filter(|r| r.parent == parent && !r.trashed)
            .count()
    }

    pub fn child_names(&self, parent: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .folders
            .lock()
            .values()
            .filter(|r| r.parent == parent && !r.trashed)
            .map(|r| r.name.clone())
            .collect();
        names.sort();
        names
    }

    fn err(message: &str) -> StoreError {
        StoreError::Api {
            service: StoreKind::Folders,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl FolderStore for MemFolderStore {
    async fn create_folder(
        &self,
        _session: &AuthSession,
        parent: &str,
        name: &str,
    ) -> Result<FolderId, StoreError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(Self::err("folder service unavailable"));
        }
        {
            let mut budget = self.create_budget.lock();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(Self::err("folder service unavailable"));
                }
                *remaining -= 1;
            }
        }
        let mut next = self.next_id.lock();
        let id = format!("fld-{}", *next);
        *next += 1;
        self.folders.lock().insert(
            id.clone(),
            FolderRec {
                parent: parent.to_string(),
                name: name.to_string(),
                owned: true,
                trashed: false,
            },
        );
        Ok(id)
    }

    async fn rename_folder(
        &self,
        _session: &AuthSession,
        id: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        match self.folders.lock().get_mut(id) {
            Some(rec) => {
                rec.name = name.to_string();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                service: StoreKind::Folders,
                id: id.to_string(),
            }),
        }
    }

    async fn trash(&self, _session: &AuthSession, id: &str) -> Result<(), StoreError> {
        match self.folders.lock().get_mut(id) {
            Some(rec) => {
                rec.trashed = true;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                service: StoreKind::Folders,
                id: id.to_string(),
            }),
        }
    }

    async fn metadata(&self, _session: &AuthSession, id: &str) -> Result<FolderMeta, StoreError> {
        match self.folders.lock().get(id) {
            Some(rec) => Ok(FolderMeta {
                id: id.to_string(),
                owned_by_caller: rec.owned,
            }),
            None => Err(StoreError::NotFound {
                service: StoreKind::Folders,
                id: id.to_string(),
            }),
        }
    }

    async fn exists(&self, _session: &AuthSession, id: &str) -> Result<bool, StoreError> {
        Ok(self.folders.lock().get(id).is_some_and(|r| !r.trashed))
    }

    async fn find_child(
        &self,
        _session: &AuthSession,
        parent: &str,
        name: &str,
    ) -> Result<Option<FolderId>, StoreError> {
        Ok(self
            .folders
            .lock()
            .iter()
            .find(|(_, r)| r.parent == parent && r.name == name && !r.trashed)
            .map(|(id, _)| id.clone()))
    }
}

// =============================================================================
// Board fake
// =============================================================================

pub struct MemBoard {
    values: Mutex<Matrix>,
    fail_all: AtomicBool,
}

impl MemBoard {
    pub fn new() -> Self {
        MemBoard {
            values: Mutex::new(Vec::new()),
            fail_all: AtomicBool::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn values(&self) -> Matrix {
        self.values.lock().clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_all.load(Ordering::SeqCst) {
            Err(StoreError::Api {
                service: StoreKind::Board,
                message: "board service unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn pad(matrix: &mut Matrix, rows: usize, cols: usize) {
        while matrix.len() < rows {
            matrix.push(Vec::new());
        }
        for row in matrix.iter_mut() {
            while row.len() < cols {
                row.push(CellValue::Empty);
            }
        }
    }
}

impl Default for MemBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BoardClient for MemBoard {
    async fn get_values(
        &self,
        _session: &AuthSession,
        _sheet: &SheetRef,
    ) -> Result<Matrix, StoreError> {
        self.check()?;
        Ok(self.values.lock().clone())
    }

    async fn update_values(
        &self,
        _session: &AuthSession,
        _sheet: &SheetRef,
        range: RangeRef,
        values: Matrix,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut matrix = self.values.lock();
        Self::pad(&mut matrix, range.end_row, range.end_col);
        for (r, row_values) in values.into_iter().enumerate() {
            for (c, value) in row_values.into_iter().enumerate() {
                matrix[range.start_row + r][range.start_col + c] = value;
            }
        }
        Ok(())
    }

    async fn insert_rows(
        &self,
        _session: &AuthSession,
        _sheet: &SheetRef,
        start: usize,
        count: usize,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut matrix = self.values.lock();
        let width = matrix.iter().map(|r| r.len()).max().unwrap_or(0);
        Self::pad(&mut matrix, start, width);
        for _ in 0..count {
            matrix.insert(start, vec![CellValue::Empty; width]);
        }
        Ok(())
    }

    async fn delete_rows(
        &self,
        _session: &AuthSession,
        _sheet: &SheetRef,
        start: usize,
        count: usize,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut matrix = self.values.lock();
        for _ in 0..count {
            if start < matrix.len() {
                matrix.remove(start);
            }
        }
        Ok(())
    }

    async fn insert_columns(
        &self,
        _session: &AuthSession,
        _sheet: &SheetRef,
        start: usize,
        count: usize,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut matrix = self.values.lock();
        for row in matrix.iter_mut() {
            while row.len() < start {
                row.push(CellValue::Empty);
            }
            for _ in 0..count {
                row.insert(start, CellValue::Empty);
            }
        }
        Ok(())
    }

    async fn delete_columns(
        &self,
        _session: &AuthSession,
        _sheet: &SheetRef,
        start: usize,
        count: usize,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut matrix = self.values.lock();
        for row in matrix.iter_mut() {
            for _ in 0..count {
                if start < row.len() {
                    row.remove(start);
                }
            }
        }
        Ok(())
    }

    async fn sort_range(
        &self,
        _session: &AuthSession,
        _sheet: &SheetRef,
        range: RangeRef,
        specs: &[SortSpec],
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut matrix = self.values.lock();
        Self::pad(&mut matrix, range.end_row, range.end_col);

        // Only the cells inside the range move, like the real service.
        let mut block: Vec<Vec<CellValue>> = (range.start_row..range.end_row)
            .map(|r| matrix[r][range.start_col..range.end_col].to_vec())
            .collect();
        block.sort_by(|a, b| {
            for spec in specs {
                let col = spec.col - range.start_col;
                let left = a.get(col).map(|v| v.render()).unwrap_or_default();
                let right = b.get(col).map(|v| v.render()).unwrap_or_default();
                let ord = left.cmp(&right);
                if ord != std::cmp::Ordering::Equal {
                    return if spec.ascending { ord } else { ord.reverse() };
                }
            }
            std::cmp::Ordering::Equal
        });
        for (offset, cells) in block.into_iter().enumerate() {
            matrix[range.start_row + offset][range.start_col..range.end_col]
                .clone_from_slice(&cells);
        }
        Ok(())
    }

    async fn copy_format(
        &self,
        _session: &AuthSession,
        _sheet: &SheetRef,
        _source: RangeRef,
        _destination: RangeRef,
    ) -> Result<(), StoreError> {
        // Formatting is invisible to the value matrix
        self.check()
    }

    async fn clear_values(
        &self,
        _session: &AuthSession,
        _sheet: &SheetRef,
        range: RangeRef,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut matrix = self.values.lock();
        Self::pad(&mut matrix, range.end_row, range.end_col);
        for r in range.start_row..range.end_row {
            for c in range.start_col..range.end_col {
                matrix[r][c] = CellValue::Empty;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Entity fixtures
// =============================================================================

pub mod fixtures {
    use crate::db::TrackerDb;
    use crate::types::{
        Case, CaseType, Contract, ContractKind, ContractStatus, Milestone, MilestoneStatus,
        MilestoneType, Task, TaskStatus,
    };

    pub fn now() -> String {
        "2026-08-05T12:00:00+00:00".to_string()
    }

    pub fn own_contract(project_id: i64, reference: &str, name: &str) -> Contract {
        Contract {
            id: 0,
            project_id,
            kind: ContractKind::Own {
                reference: reference.to_string(),
            },
            seq_number: None,
            name: name.to_string(),
            starts_on: Some("2026-01-01".to_string()),
            ends_on: Some("2026-12-31".to_string()),
            value_cents: Some(12_500_000),
            status: ContractStatus::Active,
            manager_id: None,
            folder_id: None,
            notes: None,
            archived: false,
            created_at: now(),
            updated_at: now(),
        }
    }

    pub fn foreign_contract(project_id: i64, name: &str) -> Contract {
        Contract {
            id: 0,
            project_id,
            kind: ContractKind::Foreign {
                linked_contract_id: None,
            },
            seq_number: None,
            name: name.to_string(),
            starts_on: None,
            ends_on: None,
            value_cents: None,
            status: ContractStatus::Active,
            manager_id: None,
            folder_id: None,
            notes: None,
            archived: false,
            created_at: now(),
            updated_at: now(),
        }
    }

    pub fn milestone(contract_id: i64, type_id: i64, seq_number: Option<i64>) -> Milestone {
        Milestone {
            id: 0,
            contract_id,
            type_id,
            seq_number,
            status: MilestoneStatus::Planned,
            folder_id: None,
            periods: Vec::new(),
            created_at: now(),
            updated_at: now(),
        }
    }

    pub fn case(milestone_id: i64, type_id: i64, seq_number: Option<i64>, name: &str) -> Case {
        Case {
            id: 0,
            milestone_id,
            type_id,
            seq_number,
            name: name.to_string(),
            folder_id: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    pub fn task_struct(case_id: i64, name: &str) -> Task {
        Task {
            id: 0,
            case_id,
            name: name.to_string(),
            deadline: Some("2026-09-01".to_string()),
            status: TaskStatus::Planned,
            owner_id: None,
            planned_hours: 8.0,
            consumed_hours: 2.0,
            board_row: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    /// Project + own contract + one non-unique milestone type.
    pub fn contract_with_milestone_type(db: &TrackerDb) -> (i64, i64, i64) {
        let project_id = db.insert_project("Depot", Some("fld-project")).unwrap();
        let contract_id = db
            .insert_contract(&own_contract(project_id, "K-1", "Riverside depot"))
            .unwrap();
        let type_id = db
            .insert_milestone_type(&MilestoneType {
                id: 0,
                name: "Design".to_string(),
                code: "DSG".to_string(),
                folder_number: 2,
                unique_per_contract: false,
                is_default: false,
            })
            .unwrap();
        (project_id, contract_id, type_id)
    }

    /// Full parent chain down to a milestone plus a non-unique case type.
    pub fn milestone_with_case_type(db: &TrackerDb) -> (i64, i64) {
        let (_, contract_id, mt) = contract_with_milestone_type(db);
        let milestone_id = db.insert_milestone(&milestone(contract_id, mt, Some(1))).unwrap();
        let case_type_id = db
            .insert_case_type(&CaseType {
                id: 0,
                name: "Inspection".to_string(),
                code: "INSP".to_string(),
                folder_number: 5,
                unique_per_milestone: false,
                is_default: false,
            })
            .unwrap();
        (milestone_id, case_type_id)
    }

    pub struct Tree {
        pub project_id: i64,
        pub manager_id: i64,
        pub contract_id: i64,
        pub milestone_id: i64,
        pub case_id: i64,
        pub task_id: i64,
    }

    /// A complete tree: project, manager (rank 2), own contract, milestone,
    /// case, one owned task.
    pub fn full_tree(db: &TrackerDb) -> Tree {
        let project_id = db.insert_project("Depot", Some("fld-project")).unwrap();
        let manager_id = db
            .insert_person("Alice", Some("alice@example.com"), 2)
            .unwrap();
        let mut contract = own_contract(project_id, "K-1", "Riverside depot");
        contract.manager_id = Some(manager_id);
        let contract_id = db.insert_contract(&contract).unwrap();

        let mt = db
            .insert_milestone_type(&MilestoneType {
                id: 0,
                name: "Design".to_string(),
                code: "DSG".to_string(),
                folder_number: 2,
                unique_per_contract: false,
                is_default: false,
            })
            .unwrap();
        let milestone_id = db.insert_milestone(&milestone(contract_id, mt, Some(1))).unwrap();

        let ct = db
            .insert_case_type(&CaseType {
                id: 0,
                name: "Inspection".to_string(),
                code: "INSP".to_string(),
                folder_number: 5,
                unique_per_milestone: true,
                is_default: false,
            })
            .unwrap();
        let case_id = db
            .insert_case(&case(milestone_id, ct, None, "Inspection"))
            .unwrap();

        let mut t = task_struct(case_id, "Pour footing");
        t.owner_id = Some(manager_id);
        let task_id = db.insert_task(&t).unwrap();

        Tree {
            project_id,
            manager_id,
            contract_id,
            milestone_id,
            case_id,
            task_id,
        }
    }
}
