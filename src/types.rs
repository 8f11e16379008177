//! Core domain types for the contract work hierarchy.
//!
//! The hierarchy is a strict tree: a Contract owns Milestones, a Milestone
//! owns Cases, a Case owns Tasks. Type catalogs (milestone types, case types,
//! task templates) drive both sequence numbering and default-children
//! creation; their `unique_per_*` flag decides whether an instance carries a
//! sequence number and a dedicated folder.

use serde::{Deserialize, Serialize};

// =============================================================================
// Entity kinds
// =============================================================================

/// The four levels of the containment tree, root first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Contract,
    Milestone,
    Case,
    Task,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Contract => "contract",
            EntityKind::Milestone => "milestone",
            EntityKind::Case => "case",
            EntityKind::Task => "task",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Contract
// =============================================================================

/// Contract subtype.
///
/// Own contracts carry the externally visible reference under which the
/// office runs the job. Foreign contracts are tracked on behalf of a
/// counterparty and may point at the own contract they serve; they are
/// numbered within their project instead of referenced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ContractKind {
    Own {
        reference: String,
    },
    Foreign {
        #[serde(skip_serializing_if = "Option::is_none")]
        linked_contract_id: Option<i64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    Active,
    Completed,
    Archived,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::Active => "active",
            ContractStatus::Completed => "completed",
            ContractStatus::Archived => "archived",
        }
    }

    /// Parse a stored status, defaulting unknown values to `Draft`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "active" => ContractStatus::Active,
            "completed" => ContractStatus::Completed,
            "archived" => ContractStatus::Archived,
            _ => ContractStatus::Draft,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: i64,
    pub project_id: i64,
    #[serde(flatten)]
    pub kind: ContractKind,
    /// Sequence number within the project; foreign contracts only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq_number: Option<i64>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_cents: Option<i64>,
    pub status: ContractStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Contract {
    /// Label shown in the board's contract column. Own contracts show their
    /// external reference, foreign ones their name.
    pub fn board_label(&self) -> String {
        match &self.kind {
            ContractKind::Own { reference } => reference.clone(),
            ContractKind::Foreign { .. } => self.name.clone(),
        }
    }
}

/// Counterparty association on a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub party_id: i64,
    pub role: String,
}

// =============================================================================
// Milestone
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Planned,
    Active,
    Done,
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneStatus::Planned => "planned",
            MilestoneStatus::Active => "active",
            MilestoneStatus::Done => "done",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "active" => MilestoneStatus::Active,
            "done" => MilestoneStatus::Done,
            _ => MilestoneStatus::Planned,
        }
    }
}

/// An inclusive date range; `ends_on` is open-ended when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub starts_on: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_on: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: i64,
    pub contract_id: i64,
    pub type_id: i64,
    /// Absent when the type is unique-per-contract.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq_number: Option<i64>,
    pub status: MilestoneStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    pub periods: Vec<DateRange>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneType {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub folder_number: i64,
    pub unique_per_contract: bool,
    /// Created automatically under every new contract.
    pub is_default: bool,
}

// =============================================================================
// Case
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: i64,
    pub milestone_id: i64,
    pub type_id: i64,
    /// Absent when the type is unique-per-milestone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq_number: Option<i64>,
    pub name: String,
    /// For unique-per-milestone cases this is the shared type folder, not a
    /// dedicated subfolder; deletion must leave it alone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseType {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub folder_number: i64,
    pub unique_per_milestone: bool,
    /// Created automatically under every new milestone.
    pub is_default: bool,
}

// =============================================================================
// Task
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Planned,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Planned => "planned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "planned" => TaskStatus::Planned,
            "in_progress" => TaskStatus::InProgress,
            "done" => TaskStatus::Done,
            _ => TaskStatus::Backlog,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub case_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<i64>,
    pub planned_hours: f64,
    pub consumed_hours: f64,
    /// Last board row the task was written to. Informational only; the
    /// synchronizer always relocates by key scan because sorting shifts rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_row: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplate {
    pub id: i64,
    pub case_type_id: i64,
    pub name: String,
    /// Deadline offset from creation day, in days.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_days: Option<i64>,
    pub default_status: TaskStatus,
}

// =============================================================================
// People / projects
// =============================================================================

/// A person who can own tasks or manage contracts. Lower `role_rank` means
/// more privileged; the board only shows owners up to a configured rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role_rank: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}

// =============================================================================
// Drafts (creation payloads)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDraft {
    pub project_id: i64,
    #[serde(flatten)]
    pub kind: ContractKind,
    pub name: String,
    #[serde(default)]
    pub starts_on: Option<String>,
    #[serde(default)]
    pub ends_on: Option<String>,
    #[serde(default)]
    pub value_cents: Option<i64>,
    pub status: ContractStatus,
    #[serde(default)]
    pub manager_id: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleAssignment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneDraft {
    pub contract_id: i64,
    pub type_id: i64,
    pub status: MilestoneStatus,
    pub periods: Vec<DateRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseDraft {
    pub milestone_id: i64,
    pub type_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub case_id: i64,
    pub name: String,
    #[serde(default)]
    pub deadline: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub owner_id: Option<i64>,
    #[serde(default)]
    pub planned_hours: f64,
    #[serde(default)]
    pub consumed_hours: f64,
}

// =============================================================================
// Edit fields
// =============================================================================

/// Editable contract fields. The database-only subset may change without
/// touching the folder tree or the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractField {
    Name,
    Kind,
    Status,
    Dates,
    Value,
    Notes,
    Manager,
    Roles,
}

impl ContractField {
    pub fn is_database_only(&self) -> bool {
        matches!(
            self,
            ContractField::Status
                | ContractField::Dates
                | ContractField::Value
                | ContractField::Notes
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneField {
    Type,
    Status,
    Periods,
}

impl MilestoneField {
    pub fn is_database_only(&self) -> bool {
        matches!(self, MilestoneField::Status | MilestoneField::Periods)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseField {
    Name,
    Type,
}

impl CaseField {
    pub fn is_database_only(&self) -> bool {
        false
    }
}

// =============================================================================
// Board projections
// =============================================================================

/// Contract header row as projected onto the board.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardHeader {
    pub contract_id: i64,
    pub project: String,
    pub label: String,
}

/// A task row as projected onto the board, denormalized across the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardTask {
    pub contract_id: i64,
    pub project: String,
    pub contract_label: String,
    pub milestone: String,
    pub case_label: String,
    pub task_id: i64,
    pub name: String,
    pub owner: Option<String>,
    pub deadline: Option<String>,
    pub status: TaskStatus,
    pub planned_hours: f64,
    pub consumed_hours: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_kind_serializes_tagged() {
        let own = ContractKind::Own {
            reference: "K-2024-017".to_string(),
        };
        let json = serde_json::to_value(&own).unwrap();
        assert_eq!(json["kind"], "own");
        assert_eq!(json["reference"], "K-2024-017");

        let foreign: ContractKind =
            serde_json::from_str(r#"{"kind":"foreign","linkedContractId":4}"#).unwrap();
        assert_eq!(
            foreign,
            ContractKind::Foreign {
                linked_contract_id: Some(4)
            }
        );
    }

    #[test]
    fn statuses_round_trip_lossy() {
        for s in [
            TaskStatus::Backlog,
            TaskStatus::Planned,
            TaskStatus::InProgress,
            TaskStatus::Done,
        ] {
            assert_eq!(TaskStatus::from_str_lossy(s.as_str()), s);
        }
        assert_eq!(TaskStatus::from_str_lossy("garbage"), TaskStatus::Backlog);
        assert_eq!(
            ContractStatus::from_str_lossy("archived"),
            ContractStatus::Archived
        );
    }

    #[test]
    fn database_only_fields() {
        assert!(ContractField::Status.is_database_only());
        assert!(ContractField::Notes.is_database_only());
        assert!(!ContractField::Name.is_database_only());
        assert!(!ContractField::Kind.is_database_only());
        assert!(MilestoneField::Periods.is_database_only());
        assert!(!MilestoneField::Type.is_database_only());
        assert!(!CaseField::Name.is_database_only());
    }
}
