//! Folder display-name derivation.
//!
//! Folder names encode entity identity and ordering, so renames on edit must
//! reproduce exactly the same string for unchanged inputs. Everything here is
//! pure; the sequence numbers come from the numbering service.
//!
//! Shapes:
//! - unique-per-parent type:   "{folder_number} {type name}"
//! - numbered child:           "{prefix}{NN} {name}"   (2-digit, zero-padded)
//! - own contract:             "{reference} {name}"

use crate::types::{CaseType, ContractKind, MilestoneType};

/// Sequence prefix letters, fixed per entity kind.
pub const MILESTONE_PREFIX: char = 'M';
pub const CASE_PREFIX: char = 'S';
pub const FOREIGN_CONTRACT_PREFIX: char = 'D';

/// Suffix asking the folder owner to delete a folder the caller cannot trash.
const DELETE_SUFFIX: &str = "(PLEASE DELETE)";

/// Suffix marking a folder whose files need manual migration after its type
/// became unique-per-parent.
const MIGRATE_SUFFIX: &str = "(files need moving)";

/// Name for the folder of a unique-per-parent type, e.g. `"3 Surveys"`.
pub fn unique_type_folder(folder_number: i64, type_name: &str) -> String {
    format!("{} {}", folder_number, type_name)
}

/// Name for a numbered child folder, e.g. `"S04 Foundation review"`.
/// Numbers below 1 are clamped so a miscounted scope still yields a stable name.
pub fn numbered_folder(prefix: char, number: i64, name: &str) -> String {
    format!("{}{:02} {}", prefix, number.max(1), name)
}

/// Contract folder name, dispatching on the subtype.
pub fn contract_folder(kind: &ContractKind, seq_number: Option<i64>, name: &str) -> String {
    match kind {
        ContractKind::Own { reference } => format!("{} {}", reference, name),
        ContractKind::Foreign { .. } => {
            numbered_folder(FOREIGN_CONTRACT_PREFIX, seq_number.unwrap_or(1), name)
        }
    }
}

/// Milestone folder name. Unique types use their fixed type-folder slot;
/// numbered types use the milestone prefix and the type name.
pub fn milestone_folder(milestone_type: &MilestoneType, seq_number: Option<i64>) -> String {
    if milestone_type.unique_per_contract {
        unique_type_folder(milestone_type.folder_number, &milestone_type.name)
    } else {
        numbered_folder(
            MILESTONE_PREFIX,
            seq_number.unwrap_or(1),
            &milestone_type.name,
        )
    }
}

/// Case folder name. A unique-per-milestone case has no dedicated subfolder;
/// the name returned here is the shared type folder its files live in.
pub fn case_folder(case_type: &CaseType, seq_number: Option<i64>, case_name: &str) -> String {
    if case_type.unique_per_milestone {
        unique_type_folder(case_type.folder_number, &case_type.name)
    } else {
        numbered_folder(CASE_PREFIX, seq_number.unwrap_or(1), case_name)
    }
}

/// Cooperative-deletion rename for folders the caller does not own.
pub fn cooperative_delete_name(display_name: &str) -> String {
    format!("{} {}", display_name, DELETE_SUFFIX)
}

/// Marker rename for a folder whose files await manual migration.
pub fn migration_pending_name(display_name: &str) -> String {
    format!("{} {}", display_name, MIGRATE_SUFFIX)
}
