//! Task lifecycle.
//!
//! Tasks have no folder; their external footprint is the board row. The
//! visibility predicate is re-evaluated on every edit, so a status or owner
//! change can add or remove the row.

use super::Orchestrator;
use crate::error::{LifecycleError, Outcome, StoreKind};
use crate::session::AuthSession;
use crate::types::{EntityKind, Task, TaskDraft};

fn validate_draft(draft: &TaskDraft) -> Result<(), LifecycleError> {
    if draft.name.trim().is_empty() {
        return Err(LifecycleError::validation(
            EntityKind::Task,
            "name must not be empty",
        ));
    }
    if draft.planned_hours < 0.0 || draft.consumed_hours < 0.0 {
        return Err(LifecycleError::validation(
            EntityKind::Task,
            "hours must not be negative",
        ));
    }
    Ok(())
}

impl Orchestrator {
    pub async fn create_task(
        &self,
        draft: TaskDraft,
        session: &AuthSession,
    ) -> Result<Outcome<Task>, LifecycleError> {
        validate_draft(&draft)?;

        let (task, contract_id) = {
            let db = self.db();
            if db.get_case(draft.case_id)?.is_none() {
                return Err(LifecycleError::validation(
                    EntityKind::Task,
                    format!("unknown case {}", draft.case_id),
                ));
            }
            if let Some(owner_id) = draft.owner_id {
                if db.get_person(owner_id)?.is_none() {
                    return Err(LifecycleError::validation(
                        EntityKind::Task,
                        format!("unknown person {}", owner_id),
                    ));
                }
            }
            let contract_id = db.contract_id_for_case(draft.case_id)?.ok_or_else(|| {
                LifecycleError::Consistency(format!("case {} detached from tree", draft.case_id))
            })?;

            let now = Self::timestamp();
            let mut task = Task {
                id: 0,
                case_id: draft.case_id,
                name: draft.name.clone(),
                deadline: draft.deadline.clone(),
                status: draft.status,
                owner_id: draft.owner_id,
                planned_hours: draft.planned_hours,
                consumed_hours: draft.consumed_hours,
                board_row: None,
                created_at: now.clone(),
                updated_at: now,
            };
            task.id = db.insert_task(&task)?;
            (task, contract_id)
        };

        let mut warnings = Vec::new();
        if let Err(e) = self.reconcile_contract_board(session, contract_id).await {
            warnings.push(self.warn(StoreKind::Board, EntityKind::Task, task.id, &e));
        }
        let task = self.db().get_task(task.id)?.unwrap_or(task);
        Ok(Outcome::with_warnings(task, warnings))
    }

    /// Bulk creation under one case: one transaction, one board pass.
    pub async fn bulk_create_tasks(
        &self,
        case_id: i64,
        drafts: Vec<TaskDraft>,
        session: &AuthSession,
    ) -> Result<Outcome<Vec<Task>>, LifecycleError> {
        for draft in &drafts {
            validate_draft(draft)?;
            if draft.case_id != case_id {
                return Err(LifecycleError::validation(
                    EntityKind::Task,
                    "bulk create spans a single case",
                ));
            }
        }

        let (tasks, contract_id) = {
            let db = self.db();
            if db.get_case(case_id)?.is_none() {
                return Err(LifecycleError::validation(
                    EntityKind::Task,
                    format!("unknown case {}", case_id),
                ));
            }
            let contract_id = db.contract_id_for_case(case_id)?.ok_or_else(|| {
                LifecycleError::Consistency(format!("case {} detached from tree", case_id))
            })?;
            let now = Self::timestamp();
            let tasks = db.with_transaction::<_, _, LifecycleError>(|db| {
                let mut out = Vec::with_capacity(drafts.len());
                for draft in &drafts {
                    let mut task = Task {
                        id: 0,
                        case_id,
                        name: draft.name.clone(),
                        deadline: draft.deadline.clone(),
                        status: draft.status,
                        owner_id: draft.owner_id,
                        planned_hours: draft.planned_hours,
                        consumed_hours: draft.consumed_hours,
                        board_row: None,
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };
                    task.id = db.insert_task(&task)?;
                    out.push(task);
                }
                Ok(out)
            })?;
            (tasks, contract_id)
        };

        let mut warnings = Vec::new();
        if let Err(e) = self.reconcile_contract_board(session, contract_id).await {
            warnings.push(self.warn(StoreKind::Board, EntityKind::Case, case_id, &e));
        }
        Ok(Outcome::with_warnings(tasks, warnings))
    }

    /// Edit a task. The row is rewritten wholesale and the visibility
    /// predicate re-evaluated, so there is no database-only shortcut here.
    pub async fn edit_task(
        &self,
        task: Task,
        session: &AuthSession,
    ) -> Result<Outcome<Task>, LifecycleError> {
        if task.name.trim().is_empty() {
            return Err(LifecycleError::validation(
                EntityKind::Task,
                "name must not be empty",
            ));
        }

        let contract_id = {
            let db = self.db();
            if db.get_task(task.id)?.is_none() {
                return Err(LifecycleError::validation(
                    EntityKind::Task,
                    format!("unknown task {}", task.id),
                ));
            }
            let contract_id = db.contract_id_for_task(task.id)?.ok_or_else(|| {
                LifecycleError::Consistency(format!("task {} detached from tree", task.id))
            })?;
            let now = Self::timestamp();
            db.update_task(&task, &now)?;
            contract_id
        };

        let mut warnings = Vec::new();
        if let Err(e) = self.reconcile_contract_board(session, contract_id).await {
            warnings.push(self.warn(StoreKind::Board, EntityKind::Task, task.id, &e));
        }
        let task = self.db().get_task(task.id)?.unwrap_or(task);
        Ok(Outcome::with_warnings(task, warnings))
    }

    /// Delete a task. Database first, board row removal best-effort.
    pub async fn delete_task(
        &self,
        task_id: i64,
        session: &AuthSession,
    ) -> Result<(), LifecycleError> {
        let contract_id = {
            let db = self.db();
            if db.get_task(task_id)?.is_none() {
                return Err(LifecycleError::validation(
                    EntityKind::Task,
                    format!("unknown task {}", task_id),
                ));
            }
            let contract_id = db.contract_id_for_task(task_id)?;
            db.delete_task(task_id)?;
            contract_id
        };

        if let Some(contract_id) = contract_id {
            if let Err(e) = self.reconcile_contract_board(session, contract_id).await {
                log::warn!("Board cleanup failed for task {}: {}", task_id, e);
            }
        }
        Ok(())
    }
}
