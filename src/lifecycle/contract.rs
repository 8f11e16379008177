//! Contract lifecycle.

use super::Orchestrator;
use crate::error::{LifecycleError, Outcome, StoreKind};
use crate::naming;
use crate::numbering;
use crate::session::AuthSession;
use crate::types::{
    Contract, ContractDraft, ContractField, ContractKind, EntityKind, Milestone, MilestoneStatus,
    RoleAssignment,
};

const ALL_CONTRACT_FIELDS: [ContractField; 8] = [
    ContractField::Name,
    ContractField::Kind,
    ContractField::Status,
    ContractField::Dates,
    ContractField::Value,
    ContractField::Notes,
    ContractField::Manager,
    ContractField::Roles,
];

fn validate_draft(draft: &ContractDraft) -> Result<(), LifecycleError> {
    if draft.name.trim().is_empty() {
        return Err(LifecycleError::validation(
            EntityKind::Contract,
            "name must not be empty",
        ));
    }
    if let ContractKind::Own { reference } = &draft.kind {
        if reference.trim().is_empty() {
            return Err(LifecycleError::validation(
                EntityKind::Contract,
                "own contracts need an external reference",
            ));
        }
    }
    if let (Some(start), Some(end)) = (&draft.starts_on, &draft.ends_on) {
        if end < start {
            return Err(LifecycleError::validation(
                EntityKind::Contract,
                "end date precedes start date",
            ));
        }
    }
    Ok(())
}

impl Orchestrator {
    /// Create a contract: folder tree first, then one transaction inserting
    /// the contract, its role associations and the default milestone/case/
    /// task children, then the board projection.
    pub async fn create_contract(
        &self,
        draft: ContractDraft,
        session: &AuthSession,
    ) -> Result<Outcome<Contract>, LifecycleError> {
        let op = Self::new_op_id();
        validate_draft(&draft)?;

        // Everything checked before the first side effect.
        let (parent_folder, seq, milestone_defaults) = {
            let db = self.db();
            if let ContractKind::Own { reference } = &draft.kind {
                if db.contract_reference_exists(reference)? {
                    return Err(LifecycleError::duplicate(
                        EntityKind::Contract,
                        format!("reference {}", reference),
                    ));
                }
            }
            let project = db.get_project(draft.project_id)?.ok_or_else(|| {
                LifecycleError::validation(
                    EntityKind::Contract,
                    format!("unknown project {}", draft.project_id),
                )
            })?;
            let parent_folder = project.folder_id.ok_or_else(|| {
                LifecycleError::validation(
                    EntityKind::Contract,
                    format!("project {} has no folder", project.id),
                )
            })?;
            let seq = match draft.kind {
                ContractKind::Foreign { .. } => {
                    Some(numbering::next_foreign_contract_number(&db, draft.project_id)?)
                }
                ContractKind::Own { .. } => None,
            };
            (parent_folder, seq, db.default_milestone_types()?)
        };

        // Folder step. A failure here aborts before any database write.
        let folder_name = naming::contract_folder(&draft.kind, seq, &draft.name);
        let contract_folder = self
            .folders()
            .ensure(session, &parent_folder, &folder_name)
            .await?;
        log::info!(
            "op {}: contract folder {:?} ready ({})",
            op,
            folder_name,
            contract_folder
        );

        // Child folders and the transaction. Any failure from here on rolls
        // the folder step back before the error is re-raised.
        let result: Result<Contract, LifecycleError> = async {
            let mut milestone_plans = Vec::with_capacity(milestone_defaults.len());
            for mt in milestone_defaults {
                let m_seq = if mt.unique_per_contract { None } else { Some(1) };
                let m_name = naming::milestone_folder(&mt, m_seq);
                let m_folder = self
                    .folders()
                    .ensure(session, &contract_folder, &m_name)
                    .await?;
                let cases = self.plan_default_cases(session, &m_folder).await?;
                milestone_plans.push((mt, m_seq, m_folder, cases));
            }

            let now = Self::timestamp();
            let db = self.db();
            db.with_transaction::<_, _, LifecycleError>(|db| {
                let mut contract = Contract {
                    id: 0,
                    project_id: draft.project_id,
                    kind: draft.kind.clone(),
                    seq_number: seq,
                    name: draft.name.clone(),
                    starts_on: draft.starts_on.clone(),
                    ends_on: draft.ends_on.clone(),
                    value_cents: draft.value_cents,
                    status: draft.status,
                    manager_id: draft.manager_id,
                    folder_id: Some(contract_folder.clone()),
                    notes: draft.notes.clone(),
                    archived: false,
                    created_at: now.clone(),
                    updated_at: now.clone(),
                };
                contract.id = db.insert_contract(&contract)?;
                db.replace_contract_roles(contract.id, &draft.roles)?;

                for (mt, m_seq, m_folder, cases) in &milestone_plans {
                    let milestone = Milestone {
                        id: 0,
                        contract_id: contract.id,
                        type_id: mt.id,
                        seq_number: *m_seq,
                        status: MilestoneStatus::Planned,
                        folder_id: Some(m_folder.clone()),
                        periods: default_period(&contract),
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };
                    let milestone_id = db.insert_milestone(&milestone)?;
                    for plan in cases {
                        Self::insert_planned_case(db, milestone_id, plan, &now)?;
                    }
                }
                Ok(contract)
            })
        }
        .await;

        let contract = match result {
            Ok(contract) => contract,
            Err(e) => {
                log::warn!("op {}: contract create failed after folder step: {}", op, e);
                if let Err(cleanup) = self
                    .folders()
                    .soft_delete(session, &contract_folder, &folder_name)
                    .await
                {
                    log::error!(
                        "op {}: folder compensation failed for {}: {}",
                        op,
                        contract_folder,
                        cleanup
                    );
                }
                return Err(e);
            }
        };

        // Board step is isolated; the contract stays persisted either way.
        let mut warnings = Vec::new();
        if let Err(e) = self.reconcile_contract_board(session, contract.id).await {
            warnings.push(self.warn(StoreKind::Board, EntityKind::Contract, contract.id, &e));
        }
        Ok(Outcome::with_warnings(contract, warnings))
    }

    /// Edit a contract. With `fields` omitted every field counts as changed.
    /// Database-only fields return right after the commit; anything else
    /// re-runs the folder rename and the board update concurrently.
    pub async fn edit_contract(
        &self,
        contract: Contract,
        roles: Option<Vec<RoleAssignment>>,
        fields: Option<&[ContractField]>,
        session: &AuthSession,
    ) -> Result<Outcome<Contract>, LifecycleError> {
        let fields: Vec<ContractField> = fields
            .map(|f| f.to_vec())
            .unwrap_or_else(|| ALL_CONTRACT_FIELDS.to_vec());

        if fields.contains(&ContractField::Name) && contract.name.trim().is_empty() {
            return Err(LifecycleError::validation(
                EntityKind::Contract,
                "name must not be empty",
            ));
        }

        let mut contract = contract;
        let current = {
            let db = self.db();
            db.get_contract(contract.id)?.ok_or_else(|| {
                LifecycleError::validation(
                    EntityKind::Contract,
                    format!("unknown contract {}", contract.id),
                )
            })?
        };

        if fields.contains(&ContractField::Kind) && contract.kind != current.kind {
            self.prepare_kind_change(&mut contract, &current).await?;
        }

        {
            let now = Self::timestamp();
            let db = self.db();
            db.with_transaction::<_, _, LifecycleError>(|db| {
                db.update_contract_fields(&contract, &fields, &now)?;
                if fields.contains(&ContractField::Roles) {
                    if let Some(roles) = &roles {
                        db.replace_contract_roles(contract.id, roles)?;
                    }
                }
                Ok(())
            })?;
        }

        if fields.iter().all(|f| f.is_database_only()) {
            let updated = self.db().get_contract(contract.id)?.unwrap_or(contract);
            return Ok(Outcome::clean(updated));
        }

        let updated = self.db().get_contract(contract.id)?.ok_or_else(|| {
            LifecycleError::Consistency(format!("contract {} vanished after update", contract.id))
        })?;

        // Folder rename and board update are independent; run them together.
        let folder_leg = self.rename_contract_folder(&updated, session);
        let board_leg = self.reconcile_contract_board(session, updated.id);
        let (folder_result, board_result) = tokio::join!(folder_leg, board_leg);

        let mut warnings = Vec::new();
        if let Err(e) = folder_result {
            warnings.push(self.warn(StoreKind::Folders, EntityKind::Contract, updated.id, &e));
        }
        if let Err(e) = board_result {
            warnings.push(self.warn(StoreKind::Board, EntityKind::Contract, updated.id, &e));
        }
        let updated = self.db().get_contract(updated.id)?.unwrap_or(updated);
        Ok(Outcome::with_warnings(updated, warnings))
    }

    /// Subtype change: foreign contracts need a minted sequence number, own
    /// contracts a unique reference.
    async fn prepare_kind_change(
        &self,
        contract: &mut Contract,
        current: &Contract,
    ) -> Result<(), LifecycleError> {
        match &contract.kind {
            ContractKind::Foreign { .. } => {
                if current.seq_number.is_none() {
                    let db = self.db();
                    contract.seq_number =
                        Some(numbering::next_foreign_contract_number(&db, contract.project_id)?);
                } else {
                    contract.seq_number = current.seq_number;
                }
            }
            ContractKind::Own { reference } => {
                let db = self.db();
                if db.contract_reference_exists(reference)? {
                    return Err(LifecycleError::duplicate(
                        EntityKind::Contract,
                        format!("reference {}", reference),
                    ));
                }
                contract.seq_number = None;
            }
        }
        Ok(())
    }

    /// Re-derive the folder name after an edit. A missing folder falls back
    /// to full re-creation under the project folder.
    async fn rename_contract_folder(
        &self,
        contract: &Contract,
        session: &AuthSession,
    ) -> Result<(), LifecycleError> {
        let name = naming::contract_folder(&contract.kind, contract.seq_number, &contract.name);

        if let Some(folder_id) = &contract.folder_id {
            if self.folders().exists(session, folder_id).await? {
                self.folders().rename(session, folder_id, &name).await?;
                return Ok(());
            }
            log::warn!(
                "Contract {} folder {} is gone; re-creating",
                contract.id,
                folder_id
            );
        }

        let parent_folder = {
            let db = self.db();
            db.get_project(contract.project_id)?
                .and_then(|p| p.folder_id)
                .ok_or_else(|| {
                    LifecycleError::Consistency(format!(
                        "project {} has no folder to re-create under",
                        contract.project_id
                    ))
                })?
        };
        let new_folder = self.folders().ensure(session, &parent_folder, &name).await?;
        self.db().set_contract_folder(contract.id, &new_folder)?;
        Ok(())
    }

    /// Delete a contract. The database delete (cascading through milestones,
    /// cases and tasks) is authoritative; folder and board cleanup follow
    /// best-effort, in parallel.
    pub async fn delete_contract(
        &self,
        contract_id: i64,
        session: &AuthSession,
    ) -> Result<(), LifecycleError> {
        let contract = {
            let db = self.db();
            let contract = db.get_contract(contract_id)?.ok_or_else(|| {
                LifecycleError::validation(
                    EntityKind::Contract,
                    format!("unknown contract {}", contract_id),
                )
            })?;
            db.delete_contract(contract_id)?;
            contract
        };
        log::info!("Deleted contract {} from database", contract_id);

        let folder_name =
            naming::contract_folder(&contract.kind, contract.seq_number, &contract.name);
        let folder_leg = async {
            match &contract.folder_id {
                Some(folder_id) => {
                    self.folders()
                        .soft_delete(session, folder_id, &folder_name)
                        .await
                }
                None => Ok(()),
            }
        };
        let board_leg = async {
            let people = self.board_people()?;
            let _guard = self.sheet_guard().await;
            self.board_sync()
                .remove_key_rows(session, contract_id, &people)
                .await
        };
        let (folder_result, board_result) = tokio::join!(folder_leg, board_leg);
        if let Err(e) = folder_result {
            log::warn!("Folder cleanup failed for contract {}: {}", contract_id, e);
        }
        if let Err(e) = board_result {
            log::warn!("Board cleanup failed for contract {}: {}", contract_id, e);
        }
        Ok(())
    }
}

fn default_period(contract: &Contract) -> Vec<crate::types::DateRange> {
    match &contract.starts_on {
        Some(start) => vec![crate::types::DateRange {
            starts_on: start.clone(),
            ends_on: contract.ends_on.clone(),
        }],
        None => Vec::new(),
    }
}
