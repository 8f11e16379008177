//! Tri-store core for the contract work hierarchy.
//!
//! Every Contract → Milestone → Case → Task entity lives in three places at
//! once: the SQLite database (source of truth), a folder tree in the document
//! store mirroring the hierarchy, and a formula-driven operational board.
//! The lifecycle orchestrator keeps the three in step (folder first, then
//! the database transaction, then the board projection) with compensating
//! cleanup when a later step fails.
//!
//! The document store and the board are reached through capability traits
//! ([`folders::FolderStore`], [`board::BoardClient`]); concrete API clients
//! live with the callers of this crate.

pub mod board;
pub mod config;
pub mod db;
mod error;
pub mod folders;
pub mod lifecycle;
mod migrations;
pub mod naming;
pub mod numbering;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{LifecycleError, Outcome, StoreError, StoreKind, SyncWarning};
pub use lifecycle::{Orchestrator, ResyncScope};
pub use session::AuthSession;
