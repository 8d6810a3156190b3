//! Row models returned by the SQLite queries.

use crate::model::{Release, WatchEntry};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WatchRow {
    pub chat_id: String,
    pub repo_id: String,
    pub owner: String,
    pub name: String,
    pub link: String,
    pub release_tag: Option<String>,
    pub release_id: Option<String>,
    pub is_prerelease: bool,
    pub notify_prerelease: bool,
}

impl From<WatchRow> for WatchEntry {
    fn from(row: WatchRow) -> Self {
        // A release without an id is treated as no release at all.
        let current = match row.release_id.filter(|id| !id.is_empty()) {
            Some(id) => Some(Release {
                tag: row.release_tag.unwrap_or_default(),
                id,
                is_prerelease: row.is_prerelease,
            }),
            None => None,
        };
        WatchEntry {
            chat_id: row.chat_id,
            repo_id: row.repo_id,
            owner: row.owner,
            name: row.name,
            link: row.link,
            current,
            notify_prerelease: row.notify_prerelease,
        }
    }
}
