//! Error types for lifecycle orchestration
//!
//! Errors are classified by where in the pipeline they occur:
//! - Validation / Duplicate: rejected before any side effect
//! - Db: the transaction rolled back; folder compensation was attempted
//! - Store: an external store call failed; no automatic retry
//! - Consistency: the board is missing state it should have; self-heals by
//!   re-creating the missing rows

use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;
use crate::types::EntityKind;

/// Which external store an error or warning came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Folders,
    Board,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Folders => write!(f, "folders"),
            StoreKind::Board => write!(f, "board"),
        }
    }
}

/// Failure talking to the document store or the board service.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{service} API error: {message}")]
    Api { service: StoreKind, message: String },

    #[error("{service}: {id} not found")]
    NotFound { service: StoreKind, id: String },

    #[error("{service}: permission denied for {id}")]
    PermissionDenied { service: StoreKind, id: String },
}

impl StoreError {
    pub fn service(&self) -> StoreKind {
        match self {
            StoreError::Api { service, .. }
            | StoreError::NotFound { service, .. }
            | StoreError::PermissionDenied { service, .. } => *service,
        }
    }
}

/// Error surface of the lifecycle orchestrator.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{entity} validation failed: {message}")]
    Validation { entity: EntityKind, message: String },

    #[error("{entity} already exists: {detail}")]
    Duplicate { entity: EntityKind, detail: String },

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("board out of sync: {0}")]
    Consistency(String),
}

impl LifecycleError {
    pub fn validation(entity: EntityKind, message: impl Into<String>) -> Self {
        LifecycleError::Validation {
            entity,
            message: message.into(),
        }
    }

    pub fn duplicate(entity: EntityKind, detail: impl Into<String>) -> Self {
        LifecycleError::Duplicate {
            entity,
            detail: detail.into(),
        }
    }

    /// True when the error was raised before any store was touched.
    pub fn rejected_before_side_effects(&self) -> bool {
        matches!(
            self,
            LifecycleError::Validation { .. } | LifecycleError::Duplicate { .. }
        )
    }

    /// True for transient external-store failures worth re-invoking.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LifecycleError::Store(_) | LifecycleError::Consistency(_)
        )
    }

    /// A short hint for the caller on how to proceed.
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            LifecycleError::Validation { .. } => "Fix the request payload and retry.",
            LifecycleError::Duplicate { .. } => "Use the existing entity or change the key.",
            LifecycleError::Db(_) => "Nothing was persisted. Retry the whole operation.",
            LifecycleError::Store(_) => {
                "The database may already hold the entity. Re-run the folder/board step."
            }
            LifecycleError::Consistency(_) => "Run a board resync for the affected contract.",
        }
    }
}

/// A post-commit store failure degraded to a warning. The database write
/// succeeded; the caller can retry the store leg independently.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncWarning {
    pub store: StoreKind,
    pub entity: EntityKind,
    pub entity_id: i64,
    pub message: String,
}

impl std::fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} sync failed for {} {}: {}",
            self.store, self.entity, self.entity_id, self.message
        )
    }
}

/// Result of a create/edit: the persisted entity plus any isolated
/// post-commit store failures.
#[derive(Debug)]
pub struct Outcome<T> {
    pub entity: T,
    pub warnings: Vec<SyncWarning>,
}

impl<T> Outcome<T> {
    pub fn clean(entity: T) -> Self {
        Outcome {
            entity,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(entity: T, warnings: Vec<SyncWarning>) -> Self {
        Outcome { entity, warnings }
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
