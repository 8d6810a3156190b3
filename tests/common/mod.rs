#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use release_watchbot::db::{SqliteStore, StoreError, WatchStore};
use release_watchbot::github::{LookupError, ReleaseLookup};
use release_watchbot::model::{Release, RepoSnapshot, WatchEntry};
use release_watchbot::transport::{ChatTransport, Keyboard, TransportError};
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, Semaphore};

pub async fn setup_store() -> SqliteStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    SqliteStore::new(pool)
}

pub fn release(tag: &str, id: &str, prerelease: bool) -> Release {
    Release {
        tag: tag.into(),
        id: id.into(),
        is_prerelease: prerelease,
    }
}

pub fn snapshot(owner: &str, name: &str, repo_id: &str, release: Option<Release>) -> RepoSnapshot {
    RepoSnapshot {
        repo_id: repo_id.into(),
        owner: owner.into(),
        name: name.into(),
        link: format!("https://github.com/{}/{}", owner, name),
        release,
    }
}

pub fn watch(chat_id: &str, snap: &RepoSnapshot, notify_prerelease: bool) -> WatchEntry {
    let mut entry = WatchEntry::from_snapshot(chat_id, snap);
    entry.notify_prerelease = notify_prerelease;
    entry
}

#[derive(Debug, Clone)]
pub enum Canned {
    Found(RepoSnapshot),
    Missing,
    Broken(String),
}

/// Lookup answering from a fixed table. Unknown repositories are missing.
#[derive(Default)]
pub struct FakeLookup {
    repos: Mutex<HashMap<(String, String), Canned>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    pub entered: Notify,
}

impl FakeLookup {
    /// Every `resolve` waits for a permit from `gate` before answering.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub async fn set(&self, owner: &str, name: &str, answer: Canned) {
        self.repos
            .lock()
            .await
            .insert((owner.to_string(), name.to_string()), answer);
    }

    pub async fn found(&self, snap: &RepoSnapshot) {
        self.set(&snap.owner, &snap.name, Canned::Found(snap.clone()))
            .await;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseLookup for FakeLookup {
    async fn resolve(&self, owner: &str, name: &str) -> Result<RepoSnapshot, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        let answer = self
            .repos
            .lock()
            .await
            .get(&(owner.to_string(), name.to_string()))
            .cloned()
            .unwrap_or(Canned::Missing);
        match answer {
            Canned::Found(snap) => Ok(snap),
            Canned::Missing => Err(LookupError::NotFound {
                owner: owner.into(),
                name: name.into(),
            }),
            Canned::Broken(msg) => Err(LookupError::Upstream(anyhow!(msg))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub chat_id: String,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub chat_id: String,
    pub message_id: i32,
    /// `None` for keyboard-only edits.
    pub text: Option<String>,
    pub keyboard: Option<Keyboard>,
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Unavailable,
    Transient,
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    edits: Mutex<Vec<Edit>>,
    failing: Mutex<HashMap<String, Failure>>,
}

impl RecordingTransport {
    pub async fn fail_chat(&self, chat_id: &str, failure: Failure) {
        self.failing.lock().await.insert(chat_id.to_string(), failure);
    }

    pub async fn sent(&self) -> Vec<Sent> {
        self.sent.lock().await.clone()
    }

    pub async fn edits(&self) -> Vec<Edit> {
        self.edits.lock().await.clone()
    }

    pub async fn last_sent(&self) -> Sent {
        self.sent.lock().await.last().cloned().unwrap()
    }

    pub async fn last_edit(&self) -> Edit {
        self.edits.lock().await.last().cloned().unwrap()
    }

    async fn check(&self, chat_id: &str) -> Result<(), TransportError> {
        match self.failing.lock().await.get(chat_id) {
            None => Ok(()),
            Some(Failure::Unavailable) => Err(TransportError::ChatUnavailable(format!(
                "bot was blocked by chat {}",
                chat_id
            ))),
            Some(Failure::Transient) => Err(TransportError::Other(anyhow!("network hiccup"))),
        }
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), TransportError> {
        self.check(chat_id).await?;
        self.sent.lock().await.push(Sent {
            chat_id: chat_id.into(),
            text: text.into(),
            keyboard,
        });
        Ok(())
    }

    async fn edit_message_text(
        &self,
        chat_id: &str,
        message_id: i32,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), TransportError> {
        self.check(chat_id).await?;
        self.edits.lock().await.push(Edit {
            chat_id: chat_id.into(),
            message_id,
            text: Some(text.into()),
            keyboard,
        });
        Ok(())
    }

    async fn edit_message_keyboard(
        &self,
        chat_id: &str,
        message_id: i32,
        keyboard: Keyboard,
    ) -> Result<(), TransportError> {
        self.check(chat_id).await?;
        self.edits.lock().await.push(Edit {
            chat_id: chat_id.into(),
            message_id,
            text: None,
            keyboard: Some(keyboard),
        });
        Ok(())
    }
}

/// SQLite store that counts mutations and can be told to fail listing,
/// release updates or removals.
pub struct CountingStore {
    inner: SqliteStore,
    writes: AtomicUsize,
    removes: AtomicUsize,
    fail_listing: AtomicBool,
    fail_updates: AtomicBool,
    fail_removes: AtomicBool,
}

impl CountingStore {
    pub async fn new() -> Self {
        Self {
            inner: setup_store().await,
            writes: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
            fail_listing: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.writes.store(0, Ordering::SeqCst);
        self.removes.store(0, Ordering::SeqCst);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl WatchStore for CountingStore {
    async fn get_by_chat(&self, chat_id: &str) -> Result<Vec<WatchEntry>, StoreError> {
        self.inner.get_by_chat(chat_id).await
    }

    async fn add(&self, entry: &WatchEntry) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.add(entry).await
    }

    async fn remove(&self, chat_id: &str, repo_id: &str) -> Result<(), StoreError> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(chat_id, repo_id).await
    }

    async fn exists(&self, chat_id: &str, repo_id: &str) -> Result<bool, StoreError> {
        self.inner.exists(chat_id, repo_id).await
    }

    async fn list_all(&self) -> Result<Vec<WatchEntry>, StoreError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        self.inner.list_all().await
    }

    async fn update_release(&self, entry: &WatchEntry) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update_release(entry).await
    }

    async fn set_notify_prerelease(
        &self,
        chat_id: &str,
        repo_id: &str,
        value: bool,
    ) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_notify_prerelease(chat_id, repo_id, value).await
    }

    async fn try_acquire_pass_lease(
        &self,
        holder: &str,
        now: i64,
        expires_at: i64,
    ) -> Result<bool, StoreError> {
        self.inner.try_acquire_pass_lease(holder, now, expires_at).await
    }

    async fn release_pass_lease(&self, holder: &str) -> Result<(), StoreError> {
        self.inner.release_pass_lease(holder).await
    }
}
