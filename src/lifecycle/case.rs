//! Case lifecycle.
//!
//! Cases are the folder-bearing leaf level: a unique-per-milestone case has
//! no dedicated subfolder (its files live in the shared type folder), a
//! numbered case gets its own `S`-prefixed folder under the milestone.

use super::Orchestrator;
use crate::error::{LifecycleError, Outcome, StoreKind};
use crate::naming;
use crate::numbering;
use crate::session::AuthSession;
use crate::types::{Case, CaseDraft, CaseField, CaseType, EntityKind};

const ALL_CASE_FIELDS: [CaseField; 2] = [CaseField::Name, CaseField::Type];

impl Orchestrator {
    /// Create a case under a milestone, instantiating the type's task
    /// templates inside the same transaction.
    pub async fn create_case(
        &self,
        draft: CaseDraft,
        session: &AuthSession,
    ) -> Result<Outcome<Case>, LifecycleError> {
        let op = Self::new_op_id();
        if draft.name.trim().is_empty() {
            return Err(LifecycleError::validation(
                EntityKind::Case,
                "name must not be empty",
            ));
        }

        let (contract_id, case_type, parent_folder) = {
            let db = self.db();
            let milestone = db.get_milestone(draft.milestone_id)?.ok_or_else(|| {
                LifecycleError::validation(
                    EntityKind::Case,
                    format!("unknown milestone {}", draft.milestone_id),
                )
            })?;
            let case_type = db.get_case_type(draft.type_id)?.ok_or_else(|| {
                LifecycleError::validation(
                    EntityKind::Case,
                    format!("unknown case type {}", draft.type_id),
                )
            })?;
            if case_type.unique_per_milestone
                && db.case_exists(draft.milestone_id, draft.type_id)?
            {
                return Err(LifecycleError::duplicate(
                    EntityKind::Case,
                    format!(
                        "type {} under milestone {}",
                        case_type.code, draft.milestone_id
                    ),
                ));
            }
            let parent_folder = milestone.folder_id.clone().ok_or_else(|| {
                LifecycleError::validation(
                    EntityKind::Case,
                    format!("milestone {} has no folder", milestone.id),
                )
            })?;
            (milestone.contract_id, case_type, parent_folder)
        };

        let seq = if case_type.unique_per_milestone {
            None
        } else {
            let db = self.db();
            Some(numbering::next_case_number(
                &db,
                draft.milestone_id,
                draft.type_id,
            )?)
        };

        // Unique cases share the type folder; numbered ones get their own.
        let folder_name = naming::case_folder(&case_type, seq, &draft.name);
        let case_folder = self
            .folders()
            .ensure(session, &parent_folder, &folder_name)
            .await?;
        let dedicated_folder = !case_type.unique_per_milestone;

        let result: Result<Case, LifecycleError> = (|| {
            let templates = self.db().task_templates_for_case_type(case_type.id)?;
            let now = Self::timestamp();
            let db = self.db();
            db.with_transaction::<_, _, LifecycleError>(|db| {
                let mut case = Case {
                    id: 0,
                    milestone_id: draft.milestone_id,
                    type_id: draft.type_id,
                    seq_number: seq,
                    name: draft.name.clone(),
                    folder_id: Some(case_folder.clone()),
                    created_at: now.clone(),
                    updated_at: now.clone(),
                };
                case.id = db.insert_case(&case)?;
                for template in &templates {
                    let task = crate::types::Task {
                        id: 0,
                        case_id: case.id,
                        name: template.name.clone(),
                        deadline: super::template_deadline(template.offset_days),
                        status: template.default_status,
                        owner_id: None,
                        planned_hours: 0.0,
                        consumed_hours: 0.0,
                        board_row: None,
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };
                    db.insert_task(&task)?;
                }
                Ok(case)
            })
        })();

        let case = match result {
            Ok(case) => case,
            Err(e) => {
                log::warn!("op {}: case create failed after folder step: {}", op, e);
                // The shared type folder of a unique case may predate this
                // operation and hold files; only dedicated folders roll back.
                if dedicated_folder {
                    if let Err(cleanup) = self
                        .folders()
                        .soft_delete(session, &case_folder, &folder_name)
                        .await
                    {
                        log::error!(
                            "op {}: folder compensation failed for {}: {}",
                            op,
                            case_folder,
                            cleanup
                        );
                    }
                }
                return Err(e);
            }
        };

        let mut warnings = Vec::new();
        if let Err(e) = self.reconcile_contract_board(session, contract_id).await {
            warnings.push(self.warn(StoreKind::Board, EntityKind::Case, case.id, &e));
        }
        Ok(Outcome::with_warnings(case, warnings))
    }

    /// Bulk creation under one milestone: every case (plus template tasks)
    /// in one transaction, one board pass at the end. Already-ensured folders
    /// are not compensated on a mid-batch failure; a retried batch reuses
    /// them.
    pub async fn bulk_create_cases(
        &self,
        milestone_id: i64,
        drafts: Vec<CaseDraft>,
        session: &AuthSession,
    ) -> Result<Outcome<Vec<Case>>, LifecycleError> {
        let (contract_id, parent_folder) = {
            let db = self.db();
            let milestone = db.get_milestone(milestone_id)?.ok_or_else(|| {
                LifecycleError::validation(
                    EntityKind::Case,
                    format!("unknown milestone {}", milestone_id),
                )
            })?;
            let parent_folder = milestone.folder_id.clone().ok_or_else(|| {
                LifecycleError::validation(
                    EntityKind::Case,
                    format!("milestone {} has no folder", milestone.id),
                )
            })?;
            (milestone.contract_id, parent_folder)
        };

        // Everything checked before the first side effect, including
        // unique-type collisions within the batch itself.
        let mut types = Vec::with_capacity(drafts.len());
        for draft in &drafts {
            if draft.milestone_id != milestone_id {
                return Err(LifecycleError::validation(
                    EntityKind::Case,
                    "bulk create spans a single milestone",
                ));
            }
            if draft.name.trim().is_empty() {
                return Err(LifecycleError::validation(
                    EntityKind::Case,
                    "name must not be empty",
                ));
            }
            let db = self.db();
            let case_type = db.get_case_type(draft.type_id)?.ok_or_else(|| {
                LifecycleError::validation(
                    EntityKind::Case,
                    format!("unknown case type {}", draft.type_id),
                )
            })?;
            if case_type.unique_per_milestone
                && (db.case_exists(milestone_id, draft.type_id)?
                    || types.iter().any(|t: &CaseType| t.id == draft.type_id))
            {
                return Err(LifecycleError::duplicate(
                    EntityKind::Case,
                    format!("type {} under milestone {}", case_type.code, milestone_id),
                ));
            }
            types.push(case_type);
        }

        // Folders first, all of them. Earlier drafts in the batch may already
        // claim numbers in the same scope.
        let mut prepared: Vec<(CaseDraft, CaseType, Option<i64>, _)> =
            Vec::with_capacity(drafts.len());
        for (draft, case_type) in drafts.iter().zip(types) {
            let seq = if case_type.unique_per_milestone {
                None
            } else {
                let db = self.db();
                let base = numbering::next_case_number(&db, milestone_id, draft.type_id)?;
                drop(db);
                let claimed = prepared
                    .iter()
                    .filter(|(d, _, _, _)| d.type_id == draft.type_id)
                    .count() as i64;
                Some(base + claimed)
            };
            let folder_name = naming::case_folder(&case_type, seq, &draft.name);
            let folder = self
                .folders()
                .ensure(session, &parent_folder, &folder_name)
                .await?;
            prepared.push((draft.clone(), case_type, seq, folder));
        }

        let cases = {
            let now = Self::timestamp();
            let db = self.db();
            db.with_transaction::<_, _, LifecycleError>(|db| {
                let mut out = Vec::with_capacity(prepared.len());
                for (draft, case_type, seq, folder) in &prepared {
                    let templates = db.task_templates_for_case_type(case_type.id)?;
                    let mut case = Case {
                        id: 0,
                        milestone_id,
                        type_id: draft.type_id,
                        seq_number: *seq,
                        name: draft.name.clone(),
                        folder_id: Some(folder.clone()),
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };
                    case.id = db.insert_case(&case)?;
                    for template in &templates {
                        let task = crate::types::Task {
                            id: 0,
                            case_id: case.id,
                            name: template.name.clone(),
                            deadline: super::template_deadline(template.offset_days),
                            status: template.default_status,
                            owner_id: None,
                            planned_hours: 0.0,
                            consumed_hours: 0.0,
                            board_row: None,
                            created_at: now.clone(),
                            updated_at: now.clone(),
                        };
                        db.insert_task(&task)?;
                    }
                    out.push(case);
                }
                Ok(out)
            })?
        };

        let mut warnings = Vec::new();
        if let Err(e) = self.reconcile_contract_board(session, contract_id).await {
            warnings.push(self.warn(StoreKind::Board, EntityKind::Milestone, milestone_id, &e));
        }
        Ok(Outcome::with_warnings(cases, warnings))
    }

    /// Edit a case. Every case field reaches the folder or the board, so an
    /// edit always re-runs both after the commit.
    pub async fn edit_case(
        &self,
        case: Case,
        fields: Option<&[CaseField]>,
        session: &AuthSession,
    ) -> Result<Outcome<Case>, LifecycleError> {
        let fields: Vec<CaseField> = fields
            .map(|f| f.to_vec())
            .unwrap_or_else(|| ALL_CASE_FIELDS.to_vec());

        if fields.contains(&CaseField::Name) && case.name.trim().is_empty() {
            return Err(LifecycleError::validation(
                EntityKind::Case,
                "name must not be empty",
            ));
        }

        let mut case = case;
        let (current, new_type, contract_id, old_display) = {
            let db = self.db();
            let current = db.get_case(case.id)?.ok_or_else(|| {
                LifecycleError::validation(EntityKind::Case, format!("unknown case {}", case.id))
            })?;
            let new_type = db.get_case_type(case.type_id)?.ok_or_else(|| {
                LifecycleError::validation(
                    EntityKind::Case,
                    format!("unknown case type {}", case.type_id),
                )
            })?;
            let contract_id = db.contract_id_for_case(case.id)?.ok_or_else(|| {
                LifecycleError::Consistency(format!("case {} detached from tree", case.id))
            })?;
            let old_display = db
                .get_case_type(current.type_id)?
                .map(|t| naming::case_folder(&t, current.seq_number, &current.name))
                .unwrap_or_else(|| current.name.clone());
            (current, new_type, contract_id, old_display)
        };

        let type_changed = fields.contains(&CaseField::Type) && case.type_id != current.type_id;
        let became_unique = type_changed && new_type.unique_per_milestone;
        if type_changed {
            if new_type.unique_per_milestone {
                let db = self.db();
                if db.case_exists(current.milestone_id, new_type.id)? {
                    return Err(LifecycleError::duplicate(
                        EntityKind::Case,
                        format!(
                            "type {} under milestone {}",
                            new_type.code, current.milestone_id
                        ),
                    ));
                }
                case.seq_number = None;
            } else {
                let db = self.db();
                case.seq_number = Some(numbering::next_case_number(
                    &db,
                    current.milestone_id,
                    new_type.id,
                )?);
            }
        } else {
            case.seq_number = current.seq_number;
        }

        {
            let now = Self::timestamp();
            let db = self.db();
            db.with_transaction::<_, _, LifecycleError>(|db| {
                db.update_case_fields(&case, &fields, &now)?;
                Ok(())
            })?;
        }

        let updated = self.db().get_case(case.id)?.ok_or_else(|| {
            LifecycleError::Consistency(format!("case {} vanished after update", case.id))
        })?;

        let folder_leg =
            self.refresh_case_folder(&updated, &new_type, became_unique, &old_display, session);
        let board_leg = self.reconcile_contract_board(session, contract_id);
        let (folder_result, board_result) = tokio::join!(folder_leg, board_leg);

        let mut warnings = Vec::new();
        if let Err(e) = folder_result {
            warnings.push(self.warn(StoreKind::Folders, EntityKind::Case, updated.id, &e));
        }
        if let Err(e) = board_result {
            warnings.push(self.warn(StoreKind::Board, EntityKind::Case, updated.id, &e));
        }
        let updated = self.db().get_case(updated.id)?.unwrap_or(updated);
        Ok(Outcome::with_warnings(updated, warnings))
    }

    async fn refresh_case_folder(
        &self,
        case: &Case,
        case_type: &CaseType,
        became_unique: bool,
        old_display: &str,
        session: &AuthSession,
    ) -> Result<(), LifecycleError> {
        let name = naming::case_folder(case_type, case.seq_number, &case.name);
        let parent_folder = {
            let db = self.db();
            db.get_milestone(case.milestone_id)?
                .and_then(|m| m.folder_id)
                .ok_or_else(|| {
                    LifecycleError::Consistency(format!(
                        "milestone {} has no folder",
                        case.milestone_id
                    ))
                })?
        };

        if became_unique {
            // The number is gone; the old numbered folder keeps the files
            // until someone moves them into the shared type folder.
            if let Some(old_folder) = &case.folder_id {
                if self.folders().exists(session, old_folder).await? {
                    self.folders()
                        .mark_for_migration(session, old_folder, old_display)
                        .await?;
                }
            }
            let type_folder = self.folders().ensure(session, &parent_folder, &name).await?;
            self.db().set_case_folder(case.id, Some(&type_folder))?;
            return Ok(());
        }

        match &case.folder_id {
            Some(folder_id) if self.folders().exists(session, folder_id).await? => {
                self.folders().rename(session, folder_id, &name).await?;
            }
            _ => {
                let new_folder = self.folders().ensure(session, &parent_folder, &name).await?;
                self.db().set_case_folder(case.id, Some(&new_folder))?;
            }
        }
        Ok(())
    }

    /// Delete a case; its tasks cascade. The shared type folder of a unique
    /// case is left alone; only dedicated folders are soft-deleted.
    pub async fn delete_case(
        &self,
        case_id: i64,
        session: &AuthSession,
    ) -> Result<(), LifecycleError> {
        let (case, case_type, contract_id) = {
            let db = self.db();
            let case = db.get_case(case_id)?.ok_or_else(|| {
                LifecycleError::validation(EntityKind::Case, format!("unknown case {}", case_id))
            })?;
            let case_type = db.get_case_type(case.type_id)?;
            let contract_id = db.contract_id_for_case(case_id)?;
            db.delete_case(case_id)?;
            (case, case_type, contract_id)
        };

        let dedicated = case_type
            .as_ref()
            .map(|t| !t.unique_per_milestone)
            .unwrap_or(true);
        let display = match (&case_type, case.seq_number) {
            (Some(t), seq) => naming::case_folder(t, seq, &case.name),
            (None, _) => case.name.clone(),
        };

        let folder_leg = async {
            match (&case.folder_id, dedicated) {
                (Some(folder_id), true) => {
                    self.folders()
                        .soft_delete(session, folder_id, &display)
                        .await
                }
                _ => Ok(()),
            }
        };
        let board_leg = async {
            match contract_id {
                Some(contract_id) => self.reconcile_contract_board(session, contract_id).await,
                None => Ok(()),
            }
        };
        let (folder_result, board_result) = tokio::join!(folder_leg, board_leg);
        if let Err(e) = folder_result {
            log::warn!("Folder cleanup failed for case {}: {}", case_id, e);
        }
        if let Err(e) = board_result {
            log::warn!("Board cleanup failed for case {}: {}", case_id, e);
        }
        Ok(())
    }
}
