//! Milestone lifecycle.

use super::Orchestrator;
use crate::error::{LifecycleError, Outcome, StoreKind};
use crate::naming;
use crate::numbering;
use crate::session::AuthSession;
use crate::types::{
    Contract, EntityKind, Milestone, MilestoneDraft, MilestoneField, MilestoneType,
};

const ALL_MILESTONE_FIELDS: [MilestoneField; 3] = [
    MilestoneField::Type,
    MilestoneField::Status,
    MilestoneField::Periods,
];

fn validate_draft(draft: &MilestoneDraft) -> Result<(), LifecycleError> {
    if draft.periods.is_empty() {
        return Err(LifecycleError::validation(
            EntityKind::Milestone,
            "at least one date range is required",
        ));
    }
    for period in &draft.periods {
        if let Some(end) = &period.ends_on {
            if end < &period.starts_on {
                return Err(LifecycleError::validation(
                    EntityKind::Milestone,
                    "period end precedes its start",
                ));
            }
        }
    }
    Ok(())
}

impl Orchestrator {
    fn milestone_parent(
        &self,
        draft: &MilestoneDraft,
    ) -> Result<(Contract, MilestoneType, String), LifecycleError> {
        let db = self.db();
        let contract = db.get_contract(draft.contract_id)?.ok_or_else(|| {
            LifecycleError::validation(
                EntityKind::Milestone,
                format!("unknown contract {}", draft.contract_id),
            )
        })?;
        let milestone_type = db.get_milestone_type(draft.type_id)?.ok_or_else(|| {
            LifecycleError::validation(
                EntityKind::Milestone,
                format!("unknown milestone type {}", draft.type_id),
            )
        })?;
        if milestone_type.unique_per_contract
            && db.milestone_exists(draft.contract_id, draft.type_id)?
        {
            return Err(LifecycleError::duplicate(
                EntityKind::Milestone,
                format!(
                    "type {} under contract {}",
                    milestone_type.code, draft.contract_id
                ),
            ));
        }
        let parent_folder = contract.folder_id.clone().ok_or_else(|| {
            LifecycleError::validation(
                EntityKind::Milestone,
                format!("contract {} has no folder", contract.id),
            )
        })?;
        Ok((contract, milestone_type, parent_folder))
    }

    /// Create a milestone under a contract, with its default cases and their
    /// template tasks.
    pub async fn create_milestone(
        &self,
        draft: MilestoneDraft,
        session: &AuthSession,
    ) -> Result<Outcome<Milestone>, LifecycleError> {
        let op = Self::new_op_id();
        validate_draft(&draft)?;
        let (_, milestone_type, parent_folder) = self.milestone_parent(&draft)?;

        let seq = if milestone_type.unique_per_contract {
            None
        } else {
            let db = self.db();
            Some(numbering::next_milestone_number(
                &db,
                draft.contract_id,
                draft.type_id,
            )?)
        };

        let folder_name = naming::milestone_folder(&milestone_type, seq);
        let milestone_folder = self
            .folders()
            .ensure(session, &parent_folder, &folder_name)
            .await?;

        let result: Result<Milestone, LifecycleError> = async {
            let case_plans = self.plan_default_cases(session, &milestone_folder).await?;
            let now = Self::timestamp();
            let db = self.db();
            db.with_transaction::<_, _, LifecycleError>(|db| {
                let mut milestone = Milestone {
                    id: 0,
                    contract_id: draft.contract_id,
                    type_id: draft.type_id,
                    seq_number: seq,
                    status: draft.status,
                    folder_id: Some(milestone_folder.clone()),
                    periods: draft.periods.clone(),
                    created_at: now.clone(),
                    updated_at: now.clone(),
                };
                milestone.id = db.insert_milestone(&milestone)?;
                for plan in &case_plans {
                    Self::insert_planned_case(db, milestone.id, plan, &now)?;
                }
                Ok(milestone)
            })
        }
        .await;

        let milestone = match result {
            Ok(milestone) => milestone,
            Err(e) => {
                log::warn!("op {}: milestone create failed after folder step: {}", op, e);
                if let Err(cleanup) = self
                    .folders()
                    .soft_delete(session, &milestone_folder, &folder_name)
                    .await
                {
                    log::error!(
                        "op {}: folder compensation failed for {}: {}",
                        op,
                        milestone_folder,
                        cleanup
                    );
                }
                return Err(e);
            }
        };

        let mut warnings = Vec::new();
        if let Err(e) = self
            .reconcile_contract_board(session, milestone.contract_id)
            .await
        {
            warnings.push(self.warn(StoreKind::Board, EntityKind::Milestone, milestone.id, &e));
        }
        Ok(Outcome::with_warnings(milestone, warnings))
    }

    /// Bulk creation: every milestone (plus default children) in one
    /// transaction on one connection, one board pass at the end. Board
    /// consistency is not guaranteed by database success.
    pub async fn bulk_create_milestones(
        &self,
        drafts: Vec<MilestoneDraft>,
        session: &AuthSession,
    ) -> Result<Outcome<Vec<Milestone>>, LifecycleError> {
        let mut contract_ids = Vec::new();
        let mut planned = Vec::with_capacity(drafts.len());
        for draft in &drafts {
            validate_draft(draft)?;
            let (_, milestone_type, parent_folder) = self.milestone_parent(draft)?;
            if !contract_ids.contains(&draft.contract_id) {
                contract_ids.push(draft.contract_id);
            }
            planned.push((milestone_type, parent_folder));
        }

        // Folders first, all of them.
        let mut prepared: Vec<(MilestoneDraft, _, _, Option<i64>, _)> =
            Vec::with_capacity(drafts.len());
        for (draft, (milestone_type, parent_folder)) in drafts.iter().zip(planned) {
            let seq = if milestone_type.unique_per_contract {
                None
            } else {
                let db = self.db();
                let base =
                    numbering::next_milestone_number(&db, draft.contract_id, draft.type_id)?;
                drop(db);
                // Earlier drafts in this batch may already claim numbers in
                // the same scope.
                let claimed = prepared
                    .iter()
                    .filter(|(d, _, _, _, _)| {
                        d.contract_id == draft.contract_id && d.type_id == draft.type_id
                    })
                    .count() as i64;
                Some(base + claimed)
            };
            let folder_name = naming::milestone_folder(&milestone_type, seq);
            let folder = self
                .folders()
                .ensure(session, &parent_folder, &folder_name)
                .await?;
            let cases = self.plan_default_cases(session, &folder).await?;
            prepared.push((draft.clone(), milestone_type, folder, seq, cases));
        }

        let milestones = {
            let now = Self::timestamp();
            let db = self.db();
            db.with_transaction::<_, _, LifecycleError>(|db| {
                let mut out = Vec::with_capacity(prepared.len());
                for (draft, _, folder, seq, cases) in &prepared {
                    let mut milestone = Milestone {
                        id: 0,
                        contract_id: draft.contract_id,
                        type_id: draft.type_id,
                        seq_number: *seq,
                        status: draft.status,
                        folder_id: Some(folder.clone()),
                        periods: draft.periods.clone(),
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };
                    milestone.id = db.insert_milestone(&milestone)?;
                    for plan in cases {
                        Self::insert_planned_case(db, milestone.id, plan, &now)?;
                    }
                    out.push(milestone);
                }
                Ok(out)
            })?
        };

        let mut warnings = Vec::new();
        for contract_id in contract_ids {
            if let Err(e) = self.reconcile_contract_board(session, contract_id).await {
                warnings.push(self.warn(StoreKind::Board, EntityKind::Contract, contract_id, &e));
            }
        }
        Ok(Outcome::with_warnings(milestones, warnings))
    }

    /// Edit a milestone. Status and period changes are database-only; a type
    /// change renumbers, renames the folder and refreshes the board rows.
    pub async fn edit_milestone(
        &self,
        milestone: Milestone,
        fields: Option<&[MilestoneField]>,
        session: &AuthSession,
    ) -> Result<Outcome<Milestone>, LifecycleError> {
        let fields: Vec<MilestoneField> = fields
            .map(|f| f.to_vec())
            .unwrap_or_else(|| ALL_MILESTONE_FIELDS.to_vec());

        let mut milestone = milestone;
        let (current, new_type, old_display) = {
            let db = self.db();
            let current = db.get_milestone(milestone.id)?.ok_or_else(|| {
                LifecycleError::validation(
                    EntityKind::Milestone,
                    format!("unknown milestone {}", milestone.id),
                )
            })?;
            let new_type = db.get_milestone_type(milestone.type_id)?.ok_or_else(|| {
                LifecycleError::validation(
                    EntityKind::Milestone,
                    format!("unknown milestone type {}", milestone.type_id),
                )
            })?;
            let old_display = db
                .get_milestone_type(current.type_id)?
                .map(|t| naming::milestone_folder(&t, current.seq_number))
                .unwrap_or_default();
            (current, new_type, old_display)
        };

        let type_changed =
            fields.contains(&MilestoneField::Type) && milestone.type_id != current.type_id;
        let became_unique = type_changed && new_type.unique_per_contract;
        if type_changed {
            if new_type.unique_per_contract {
                let db = self.db();
                if db.milestone_exists(current.contract_id, new_type.id)? {
                    return Err(LifecycleError::duplicate(
                        EntityKind::Milestone,
                        format!(
                            "type {} under contract {}",
                            new_type.code, current.contract_id
                        ),
                    ));
                }
                milestone.seq_number = None;
            } else {
                let db = self.db();
                milestone.seq_number = Some(numbering::next_milestone_number(
                    &db,
                    current.contract_id,
                    new_type.id,
                )?);
            }
        } else {
            milestone.seq_number = current.seq_number;
        }

        {
            let now = Self::timestamp();
            let db = self.db();
            db.with_transaction::<_, _, LifecycleError>(|db| {
                db.update_milestone_fields(&milestone, &fields, &now)?;
                Ok(())
            })?;
        }

        if fields.iter().all(|f| f.is_database_only()) {
            let updated = self.db().get_milestone(milestone.id)?.unwrap_or(milestone);
            return Ok(Outcome::clean(updated));
        }

        let updated = self.db().get_milestone(milestone.id)?.ok_or_else(|| {
            LifecycleError::Consistency(format!("milestone {} vanished after update", milestone.id))
        })?;

        let folder_leg =
            self.refresh_milestone_folder(&updated, &new_type, became_unique, &old_display, session);
        let board_leg = self.reconcile_contract_board(session, updated.contract_id);
        let (folder_result, board_result) = tokio::join!(folder_leg, board_leg);

        let mut warnings = Vec::new();
        if let Err(e) = folder_result {
            warnings.push(self.warn(StoreKind::Folders, EntityKind::Milestone, updated.id, &e));
        }
        if let Err(e) = board_result {
            warnings.push(self.warn(StoreKind::Board, EntityKind::Milestone, updated.id, &e));
        }
        let updated = self.db().get_milestone(updated.id)?.unwrap_or(updated);
        Ok(Outcome::with_warnings(updated, warnings))
    }

    /// Folder side of a milestone edit. Becoming unique-per-contract leaves
    /// the old numbered folder marked for manual file migration and points
    /// the milestone at the shared type folder; otherwise the folder is
    /// renamed in place (or re-created when it vanished).
    async fn refresh_milestone_folder(
        &self,
        milestone: &Milestone,
        milestone_type: &MilestoneType,
        became_unique: bool,
        old_display: &str,
        session: &AuthSession,
    ) -> Result<(), LifecycleError> {
        let name = naming::milestone_folder(milestone_type, milestone.seq_number);
        let parent_folder = {
            let db = self.db();
            db.get_contract(milestone.contract_id)?
                .and_then(|c| c.folder_id)
                .ok_or_else(|| {
                    LifecycleError::Consistency(format!(
                        "contract {} has no folder",
                        milestone.contract_id
                    ))
                })?
        };

        if became_unique {
            if let Some(old_folder) = &milestone.folder_id {
                if self.folders().exists(session, old_folder).await? {
                    self.folders()
                        .mark_for_migration(session, old_folder, old_display)
                        .await?;
                }
            }
            let type_folder = self.folders().ensure(session, &parent_folder, &name).await?;
            self.db().set_milestone_folder(milestone.id, &type_folder)?;
            return Ok(());
        }

        match &milestone.folder_id {
            Some(folder_id) if self.folders().exists(session, folder_id).await? => {
                self.folders().rename(session, folder_id, &name).await?;
            }
            _ => {
                let new_folder = self.folders().ensure(session, &parent_folder, &name).await?;
                self.db().set_milestone_folder(milestone.id, &new_folder)?;
            }
        }
        Ok(())
    }

    /// Delete a milestone; cases and tasks cascade in the database, folder
    /// and board cleanup follow best-effort in parallel.
    pub async fn delete_milestone(
        &self,
        milestone_id: i64,
        session: &AuthSession,
    ) -> Result<(), LifecycleError> {
        let (milestone, milestone_type) = {
            let db = self.db();
            let milestone = db.get_milestone(milestone_id)?.ok_or_else(|| {
                LifecycleError::validation(
                    EntityKind::Milestone,
                    format!("unknown milestone {}", milestone_id),
                )
            })?;
            let milestone_type = db.get_milestone_type(milestone.type_id)?;
            db.delete_milestone(milestone_id)?;
            (milestone, milestone_type)
        };

        let display = match &milestone_type {
            Some(t) => naming::milestone_folder(t, milestone.seq_number),
            None => String::new(),
        };
        let folder_leg = async {
            match &milestone.folder_id {
                Some(folder_id) => {
                    self.folders()
                        .soft_delete(session, folder_id, &display)
                        .await
                }
                None => Ok(()),
            }
        };
        let board_leg = self.reconcile_contract_board(session, milestone.contract_id);
        let (folder_result, board_result) = tokio::join!(folder_leg, board_leg);
        if let Err(e) = folder_result {
            log::warn!("Folder cleanup failed for milestone {}: {}", milestone_id, e);
        }
        if let Err(e) = board_result {
            log::warn!("Board cleanup failed for milestone {}: {}", milestone_id, e);
        }
        Ok(())
    }
}
