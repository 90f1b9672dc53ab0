use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

use super::TokenStore;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let url = expand_home(database_url);
    let mut options = SqliteConnectOptions::from_str(&url)
        .with_context(|| format!("invalid database url {database_url}"))?
        .create_if_missing(true);
    if !url.starts_with("sqlite::memory") {
        if let Some(parent) = database_path(&url).and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);
    }
    // One connection keeps in-memory databases shared across queries.
    let pool = SqlitePoolOptions::new()
        .max_connections(if url.starts_with("sqlite::memory") { 1 } else { 4 })
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open {database_url}"))?;
    Ok(pool)
}

/// Expand a leading `~/` in a `sqlite://` path.
fn expand_home(url: &str) -> String {
    let Some(path) = url.strip_prefix("sqlite://~/") else {
        return url.to_string();
    };
    match std::env::var("HOME") {
        Ok(home) => format!(
            "sqlite://{}",
            Path::new(home.trim_end_matches('/')).join(path).display()
        ),
        Err(_) => url.to_string(),
    }
}

fn database_path(url: &str) -> Option<&Path> {
    let rest = url.strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let path = rest.split('?').next().unwrap_or_default();
    (!path.is_empty()).then(|| Path::new(path))
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SqliteTokenStore {
    pool: Pool,
}

impl SqliteTokenStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) and migrate the database at `database_url`.
    pub async fn open(database_url: &str) -> Result<Self> {
        let pool = init_pool(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    #[instrument(skip(self))]
    async fn get(&self, username: &str) -> Result<Option<String>> {
        let token = sqlx::query_scalar::<_, String>("SELECT token FROM tokens WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(token)
    }

    #[instrument(skip(self, token))]
    async fn put(&self, username: &str, token: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO tokens (username, token) VALUES (?, ?) \
             ON CONFLICT(username) DO UPDATE SET \
             token = excluded.token, \
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        )
        .bind(username)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
