use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::model::WatchRow;
use super::{StoreError, WatchStore};
use crate::model::WatchEntry;

pub type Pool = SqlitePool;

/// Rows fetched per round trip while scanning the whole table.
const SCAN_PAGE_SIZE: i64 = 500;

const SELECT_COLUMNS: &str = "SELECT chat_id, repo_id, owner, name, link, release_tag, release_id, \
     is_prerelease, notify_prerelease FROM watches";

pub async fn init_pool(database_url: &str) -> Result<Pool, StoreError> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and create the parent
/// directory. Without a query the file is opened in `rwc` mode. In-memory and
/// non-sqlite URLs are returned unchanged.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{}?{}", path, q),
        None => format!("sqlite://{}?mode=rwc", path),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Open (and migrate) the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = init_pool(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl WatchStore for SqliteStore {
    #[instrument(skip_all, fields(chat_id = %chat_id))]
    async fn get_by_chat(&self, chat_id: &str) -> Result<Vec<WatchEntry>, StoreError> {
        let sql = format!("{} WHERE chat_id = ? ORDER BY rowid", SELECT_COLUMNS);
        let rows: Vec<WatchRow> = sqlx::query_as(&sql)
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(WatchEntry::from).collect())
    }

    #[instrument(skip_all, fields(chat_id = %entry.chat_id, repo_id = %entry.repo_id))]
    async fn add(&self, entry: &WatchEntry) -> Result<(), StoreError> {
        let res = sqlx::query(
            "INSERT INTO watches (chat_id, repo_id, owner, name, link, release_tag, release_id, \
             is_prerelease, notify_prerelease) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.chat_id)
        .bind(&entry.repo_id)
        .bind(&entry.owner)
        .bind(&entry.name)
        .bind(&entry.link)
        .bind(entry.current_release_tag())
        .bind(entry.current_release_id())
        .bind(entry.current.as_ref().is_some_and(|r| r.is_prerelease))
        .bind(entry.notify_prerelease)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Conflict {
                    chat_id: entry.chat_id.clone(),
                    repo_id: entry.repo_id.clone(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip_all, fields(chat_id = %chat_id, repo_id = %repo_id))]
    async fn remove(&self, chat_id: &str, repo_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM watches WHERE chat_id = ? AND repo_id = ?")
            .bind(chat_id)
            .bind(repo_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(chat_id = %chat_id, repo_id = %repo_id))]
    async fn exists(&self, chat_id: &str, repo_id: &str) -> Result<bool, StoreError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM watches WHERE chat_id = ? AND repo_id = ?")
                .bind(chat_id)
                .bind(repo_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    #[instrument(skip_all)]
    async fn list_all(&self) -> Result<Vec<WatchEntry>, StoreError> {
        let sql = format!(
            "{} WHERE (chat_id, repo_id) > (?, ?) ORDER BY chat_id, repo_id LIMIT ?",
            SELECT_COLUMNS
        );
        let mut entries = Vec::new();
        let mut cursor = (String::new(), String::new());
        loop {
            let rows: Vec<WatchRow> = sqlx::query_as(&sql)
                .bind(&cursor.0)
                .bind(&cursor.1)
                .bind(SCAN_PAGE_SIZE)
                .fetch_all(&self.pool)
                .await?;
            let fetched = rows.len() as i64;
            if let Some(last) = rows.last() {
                cursor = (last.chat_id.clone(), last.repo_id.clone());
            }
            entries.extend(rows.into_iter().map(WatchEntry::from));
            if fetched < SCAN_PAGE_SIZE {
                break;
            }
        }
        debug!(count = entries.len(), "scanned watch-list");
        Ok(entries)
    }

    #[instrument(skip_all, fields(chat_id = %entry.chat_id, repo_id = %entry.repo_id))]
    async fn update_release(&self, entry: &WatchEntry) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE watches SET release_tag = ?, release_id = ?, is_prerelease = ?, \
             updated_at = CURRENT_TIMESTAMP WHERE chat_id = ? AND repo_id = ?",
        )
        .bind(entry.current_release_tag())
        .bind(entry.current_release_id())
        .bind(entry.current.as_ref().is_some_and(|r| r.is_prerelease))
        .bind(&entry.chat_id)
        .bind(&entry.repo_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(chat_id = %chat_id, repo_id = %repo_id, value = value))]
    async fn set_notify_prerelease(
        &self,
        chat_id: &str,
        repo_id: &str,
        value: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE watches SET notify_prerelease = ?, updated_at = CURRENT_TIMESTAMP \
             WHERE chat_id = ? AND repo_id = ?",
        )
        .bind(value)
        .bind(chat_id)
        .bind(repo_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(holder = %holder))]
    async fn try_acquire_pass_lease(
        &self,
        holder: &str,
        now: i64,
        expires_at: i64,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "INSERT INTO pass_lease (id, holder, expires_at) VALUES (1, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET holder = excluded.holder, expires_at = excluded.expires_at \
             WHERE pass_lease.expires_at <= ?",
        )
        .bind(holder)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    #[instrument(skip_all, fields(holder = %holder))]
    async fn release_pass_lease(&self, holder: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM pass_lease WHERE holder = ?")
            .bind(holder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
