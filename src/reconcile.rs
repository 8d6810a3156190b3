//! Release-change reconciliation over the whole watch-list.
//!
//! One pass re-resolves every watch entry, writes changed release fields back
//! to the store, notifies eligible subscribers and prunes entries whose
//! repository or chat is gone. A failing entry never aborts the pass; only
//! failing to load the watch-list does.
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::db::{StoreError, WatchStore};
use crate::github::ReleaseLookup;
use crate::keyboards::release_notification;
use crate::model::{Release, WatchEntry};
use crate::transport::ChatTransport;

/// One entry that could not be reconciled cleanly during a pass.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedEntry {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

impl FailedEntry {
    fn for_entry(entry: &WatchEntry, error: impl fmt::Display) -> Self {
        Self {
            error: error.to_string(),
            chat_id: Some(entry.chat_id.clone()),
            repo_id: Some(entry.repo_id.clone()),
            repo: Some(entry.full_name()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// The watch-list could not be loaded, nothing was checked.
    pub aborted: bool,
    pub checked: usize,
    pub updated: usize,
    pub notified: usize,
    pub pruned: usize,
    pub failures: Vec<FailedEntry>,
}

impl PassReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            aborted: false,
            checked: 0,
            updated: 0,
            notified: 0,
            pruned: 0,
            failures: Vec::new(),
        }
    }

    /// A pass that never got to look at any entry.
    fn aborted(started_at: DateTime<Utc>, error: impl fmt::Display) -> Self {
        let mut report = Self::new(started_at);
        report.aborted = true;
        report.failures.push(FailedEntry {
            error: error.to_string(),
            chat_id: None,
            repo_id: None,
            repo: None,
        });
        report.finished_at = Utc::now();
        report
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Lifetime of the cross-process pass lease. A holder that dies mid-pass
/// blocks other processes for at most this long.
const PASS_LEASE_SECS: i64 = 60 * 60;

#[derive(Debug, Default)]
struct EntryResult {
    wrote: bool,
    notified: bool,
    pruned: bool,
    failure: Option<FailedEntry>,
}

/// Notify unless the release is a prerelease the subscriber did not opt into.
pub fn should_notify(release: &Release, notify_prerelease: bool) -> bool {
    !release.is_prerelease || notify_prerelease
}

/// Ticker for periodic passes. The first tick fires one `period` from now;
/// ticks missed while a pass overruns are delayed, never replayed in a burst.
pub fn pass_interval(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

pub struct Reconciler {
    store: Arc<dyn WatchStore>,
    lookup: Arc<dyn ReleaseLookup>,
    transport: Arc<dyn ChatTransport>,
    concurrency: usize,
    running: Mutex<()>,
    /// Identifies this reconciler as the pass-lease holder.
    holder: String,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn WatchStore>,
        lookup: Arc<dyn ReleaseLookup>,
        transport: Arc<dyn ChatTransport>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            lookup,
            transport,
            concurrency: concurrency.max(1),
            running: Mutex::new(()),
            holder: Uuid::new_v4().to_string(),
        }
    }

    /// Run a pass unless one is already in flight, in this process or in
    /// any other process sharing the store. When busy, `None` is returned
    /// and nothing is touched.
    pub async fn try_run_pass(&self) -> Option<PassReport> {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("reconciliation pass already running; skipping");
            return None;
        };

        let started_at = Utc::now();
        let now = started_at.timestamp();
        match self
            .store
            .try_acquire_pass_lease(&self.holder, now, now + PASS_LEASE_SECS)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!("another process holds the pass lease; skipping");
                return None;
            }
            Err(err) => {
                error!(?err, "failed to take pass lease; aborting pass");
                return Some(PassReport::aborted(started_at, err));
            }
        }

        let report = self.run_pass(started_at).await;
        if let Err(err) = self.store.release_pass_lease(&self.holder).await {
            warn!(?err, "failed to release pass lease; it will expire");
        }
        Some(report)
    }

    #[instrument(skip_all)]
    async fn run_pass(&self, started_at: DateTime<Utc>) -> PassReport {
        let mut report = PassReport::new(started_at);

        let entries = match self.store.list_all().await {
            Ok(entries) => entries,
            Err(err) => {
                error!(?err, "failed to load watch-list; aborting pass");
                return PassReport::aborted(started_at, err);
            }
        };
        report.checked = entries.len();

        let results: Vec<EntryResult> = stream::iter(entries)
            .map(|entry| self.reconcile_entry(entry))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for result in results {
            report.updated += usize::from(result.wrote);
            report.notified += usize::from(result.notified);
            report.pruned += usize::from(result.pruned);
            if let Some(failure) = result.failure {
                report.failures.push(failure);
            }
        }
        report.finished_at = Utc::now();

        info!(
            checked = report.checked,
            updated = report.updated,
            notified = report.notified,
            pruned = report.pruned,
            failed = report.failures.len(),
            "reconciliation pass finished"
        );
        report
    }

    async fn reconcile_entry(&self, mut entry: WatchEntry) -> EntryResult {
        let fresh = match self.lookup.resolve(&entry.owner, &entry.name).await {
            Ok(snapshot) => snapshot,
            Err(err) if err.is_not_found() => {
                info!(repo = %entry.full_name(), chat_id = %entry.chat_id, "repository gone; pruning");
                let (pruned, failure) = self.prune(&entry, err).await;
                return EntryResult {
                    pruned,
                    failure: Some(failure),
                    ..Default::default()
                };
            }
            Err(err) => {
                warn!(%err, repo = %entry.full_name(), "lookup failed");
                return EntryResult {
                    failure: Some(FailedEntry::for_entry(&entry, err)),
                    ..Default::default()
                };
            }
        };

        if fresh.release_id() == entry.current_release_id() {
            return EntryResult::default();
        }

        entry.current = fresh.release;
        if let Err(err) = self.store.update_release(&entry).await {
            warn!(%err, repo = %entry.full_name(), "failed to persist release");
            return EntryResult {
                failure: Some(FailedEntry::for_entry(&entry, err)),
                ..Default::default()
            };
        }

        let mut result = EntryResult {
            wrote: true,
            ..Default::default()
        };
        let Some(release) = entry.current.as_ref() else {
            return result;
        };
        if !should_notify(release, entry.notify_prerelease) {
            return result;
        }

        let (text, keyboard) = release_notification(&entry, &release.tag, release.is_prerelease);
        match self
            .transport
            .send_message(&entry.chat_id, &text, Some(keyboard))
            .await
        {
            Ok(()) => result.notified = true,
            Err(err) if err.is_chat_unavailable() => {
                info!(chat_id = %entry.chat_id, %err, "chat unreachable; pruning");
                let (pruned, failure) = self.prune(&entry, err).await;
                result.pruned = pruned;
                result.failure = Some(failure);
            }
            Err(err) => {
                warn!(%err, chat_id = %entry.chat_id, repo = %entry.full_name(), "notification failed");
                result.failure = Some(FailedEntry::for_entry(&entry, err));
            }
        }
        result
    }

    /// Remove `entry` because of `cause`. Returns whether the row is gone and
    /// the failure record, which also names a failed removal.
    async fn prune(&self, entry: &WatchEntry, cause: impl fmt::Display) -> (bool, FailedEntry) {
        match self.store.remove(&entry.chat_id, &entry.repo_id).await {
            Ok(()) => (true, FailedEntry::for_entry(entry, cause)),
            Err(err) => {
                error!(?err, chat_id = %entry.chat_id, repo_id = %entry.repo_id, "failed to prune entry");
                (false, FailedEntry::for_entry(entry, prune_failed(cause, &err)))
            }
        }
    }
}

fn prune_failed(cause: impl fmt::Display, err: &StoreError) -> String {
    format!("{}; prune failed: {}", cause, err)
}
