//! Board visibility predicates.
//!
//! Not everything in the database belongs on the board: the board only shows
//! active work for people the scheduling view cares about. Both predicates
//! are re-evaluated on every edit; an edit that flips one adds or removes
//! the corresponding rows.

use regex::Regex;

use crate::config::Config;
use crate::types::{Contract, ContractKind, ContractStatus, Person, Task, TaskStatus};

/// Whether a task belongs on the board.
///
/// Backlog work stays off; so do tasks owned by someone above the visible
/// role rank. Ownerless tasks show as soon as they leave the backlog. The
/// contract's header row must already be on the board; a task cannot float
/// without its contract.
pub fn task_belongs_on_board(
    task: &Task,
    owner: Option<&Person>,
    header_present: bool,
    config: &Config,
) -> bool {
    if task.status == TaskStatus::Backlog {
        return false;
    }
    if let Some(owner) = owner {
        if owner.role_rank > config.visible_role_rank_max {
            return false;
        }
    }
    header_present
}

/// Rank-only variant for denormalized rows where only the owner's rank is at
/// hand.
pub fn task_row_qualifies(status: TaskStatus, owner_rank: Option<i32>, config: &Config) -> bool {
    if status == TaskStatus::Backlog {
        return false;
    }
    match owner_rank {
        Some(rank) => rank <= config.visible_role_rank_max,
        None => true,
    }
}

/// Whether a contract gets a header row on the board.
///
/// Archived contracts never show. Own contracts require a manager whose role
/// rank qualifies; foreign contracts are admin-run and show even without a
/// manager. Either way, a manager whose email matches an exclusion pattern
/// keeps the contract off.
pub fn contract_belongs_on_board(
    contract: &Contract,
    manager: Option<&Person>,
    config: &Config,
) -> bool {
    if contract.archived || contract.status == ContractStatus::Archived {
        return false;
    }

    let patterns = config.excluded_email_patterns();
    if let Some(manager) = manager {
        if manager.role_rank > config.visible_role_rank_max {
            return false;
        }
        if let Some(email) = &manager.email {
            if matches_any(&patterns, email) {
                return false;
            }
        }
    }

    match contract.kind {
        ContractKind::Own { .. } => manager.is_some(),
        ContractKind::Foreign { .. } => true,
    }
}

fn matches_any(patterns: &[Regex], email: &str) -> bool {
    patterns.iter().any(|re| re.is_match(email))
}
