//! Username → notes-API token storage.
//!
//! - `sqlite`: the durable store used when deployed.
//! - `MemoryTokenStore`: process-local map for local runs and tests.
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub mod sqlite;

pub use sqlite::SqliteTokenStore;

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, username: &str) -> Result<Option<String>>;

    /// Insert or overwrite; the last write wins.
    async fn put(&self, username: &str, token: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens<I, K, V>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            tokens: RwLock::new(
                tokens
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, username: &str) -> Result<Option<String>> {
        Ok(self.tokens.read().await.get(username).cloned())
    }

    async fn put(&self, username: &str, token: &str) -> Result<()> {
        self.tokens
            .write()
            .await
            .insert(username.to_string(), token.to_string());
        Ok(())
    }
}
