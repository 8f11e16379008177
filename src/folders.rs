//! Folder mirror of the entity tree in the document store.
//!
//! Every entity that owns files gets one folder under its parent's folder,
//! named by `naming`. The store itself is reached through the `FolderStore`
//! capability trait; the concrete API client lives with the caller. The
//! mirror never hard-deletes on its own: trash when the session owns the
//! folder, cooperative rename when it does not.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::naming;
use crate::session::AuthSession;

pub type FolderId = String;

#[derive(Debug, Clone)]
pub struct FolderMeta {
    pub id: FolderId,
    /// Whether the session's account owns the folder (and may trash it).
    pub owned_by_caller: bool,
}

/// Capability interface over the hierarchical document store.
#[async_trait]
pub trait FolderStore: Send + Sync {
    async fn create_folder(
        &self,
        session: &AuthSession,
        parent: &str,
        name: &str,
    ) -> Result<FolderId, StoreError>;

    async fn rename_folder(
        &self,
        session: &AuthSession,
        id: &str,
        name: &str,
    ) -> Result<(), StoreError>;

    async fn trash(&self, session: &AuthSession, id: &str) -> Result<(), StoreError>;

    async fn metadata(&self, session: &AuthSession, id: &str) -> Result<FolderMeta, StoreError>;

    async fn exists(&self, session: &AuthSession, id: &str) -> Result<bool, StoreError>;

    /// Find a direct child folder by exact display name.
    async fn find_child(
        &self,
        session: &AuthSession,
        parent: &str,
        name: &str,
    ) -> Result<Option<FolderId>, StoreError>;
}

/// Creates, renames and soft-deletes entity folders.
#[derive(Clone)]
pub struct FolderMirror {
    store: Arc<dyn FolderStore>,
}

impl FolderMirror {
    pub fn new(store: Arc<dyn FolderStore>) -> Self {
        FolderMirror { store }
    }

    /// Idempotent upsert by name: reuse an existing child folder or create
    /// one. Re-running a failed lifecycle operation must not mint a second
    /// folder with the same name.
    pub async fn ensure(
        &self,
        session: &AuthSession,
        parent: &str,
        name: &str,
    ) -> Result<FolderId, StoreError> {
        if let Some(existing) = self.store.find_child(session, parent, name).await? {
            return Ok(existing);
        }
        self.store.create_folder(session, parent, name).await
    }

    pub async fn rename(
        &self,
        session: &AuthSession,
        id: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        self.store.rename_folder(session, id, name).await
    }

    pub async fn exists(&self, session: &AuthSession, id: &str) -> Result<bool, StoreError> {
        self.store.exists(session, id).await
    }

    /// Soft-delete: trash when the session owns the folder, otherwise rename
    /// with the cooperative please-delete suffix so the owner can clean up.
    pub async fn soft_delete(
        &self,
        session: &AuthSession,
        id: &str,
        display_name: &str,
    ) -> Result<(), StoreError> {
        let meta = self.store.metadata(session, id).await?;
        if meta.owned_by_caller {
            self.store.trash(session, id).await
        } else {
            let marked = naming::cooperative_delete_name(display_name);
            self.store.rename_folder(session, id, &marked).await
        }
    }

    /// Mark a folder whose files await manual migration after its type
    /// became unique-per-parent.
    pub async fn mark_for_migration(
        &self,
        session: &AuthSession,
        id: &str,
        display_name: &str,
    ) -> Result<(), StoreError> {
        let marked = naming::migration_pending_name(display_name);
        self.store.rename_folder(session, id, &marked).await
    }
}
