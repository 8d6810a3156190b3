//! Watch-list storage.
//!
//! - `model`: row types as read from SQLite.
//! - `repo`: the SQLite-backed [`WatchStore`] plus pool/migration helpers.
//!
//! The rest of the crate only talks to the [`WatchStore`] trait, so another
//! backend is an alternate implementation of the same operation set.

pub mod model;
pub mod repo;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::WatchEntry;

pub use repo::{init_pool, run_migrations, Pool, SqliteStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("chat {chat_id} already watches {repo_id}")]
    Conflict { chat_id: String, repo_id: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Persisted `(chat, repository)` watch entries.
#[async_trait]
pub trait WatchStore: Send + Sync {
    async fn get_by_chat(&self, chat_id: &str) -> Result<Vec<WatchEntry>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the `(chat_id, repo_id)` pair exists.
    async fn add(&self, entry: &WatchEntry) -> Result<(), StoreError>;

    async fn remove(&self, chat_id: &str, repo_id: &str) -> Result<(), StoreError>;

    async fn exists(&self, chat_id: &str, repo_id: &str) -> Result<bool, StoreError>;

    /// Every entry of every chat, in scan order.
    async fn list_all(&self) -> Result<Vec<WatchEntry>, StoreError>;

    /// Overwrite the release fields of the entry keyed by `(chat_id, repo_id)`.
    async fn update_release(&self, entry: &WatchEntry) -> Result<(), StoreError>;

    async fn set_notify_prerelease(
        &self,
        chat_id: &str,
        repo_id: &str,
        value: bool,
    ) -> Result<(), StoreError>;

    /// Take the reconciliation lease for `holder` until `expires_at` (unix
    /// seconds). Returns `false` while another holder's lease is still live
    /// at `now`.
    async fn try_acquire_pass_lease(
        &self,
        holder: &str,
        now: i64,
        expires_at: i64,
    ) -> Result<bool, StoreError>;

    /// Drop the lease if `holder` still owns it.
    async fn release_pass_lease(&self, holder: &str) -> Result<(), StoreError>;
}
