//! Configuration loader and validator for the Reddit→Readwise bot.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::readwise::READWISE_API_BASE;
use crate::reddit::Credentials;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub reddit: Reddit,
    #[serde(default)]
    pub readwise: Readwise,
    #[serde(default)]
    pub server: Server,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    /// Local mode keeps tokens in memory instead of SQLite.
    #[serde(default)]
    pub local: bool,
    pub data_dir: String,
    pub poll_interval_secs: u64,
}

/// Reddit script-app settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reddit {
    pub app_id: String,
    pub app_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Readwise {
    pub base_url: String,
}

impl Default for Readwise {
    fn default() -> Self {
        Self {
            base_url: READWISE_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub listen: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8787".to_string(),
        }
    }
}

impl App {
    /// `data_dir` with a leading `~/` expanded.
    pub fn resolved_data_dir(&self) -> PathBuf {
        match (self.data_dir.strip_prefix("~/"), std::env::var("HOME")) {
            (Some(rest), Ok(home)) => Path::new(&home).join(rest),
            _ => PathBuf::from(&self.data_dir),
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            app_id: self.reddit.app_id.clone(),
            app_secret: self.reddit.app_secret.clone(),
            username: self.reddit.username.clone(),
            password: self.reddit.password.clone(),
            user_agent: self.reddit.user_agent.clone(),
        }
    }

    /// `DATABASE_URL` if set, otherwise a file under `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "sqlite://{}/tokens.db",
                self.app.resolved_data_dir().display()
            )
        })
    }

    /// Overlay secrets and the local flag from the environment.
    /// `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("REDDIT_CLIENT_SECRET") {
            self.reddit.app_secret = secret;
        }
        if let Some(password) = lookup("REDDIT_PASSWORD") {
            self.reddit.password = password;
        }
        if let Some(local) = lookup("LOCAL") {
            self.app.local = matches!(local.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }
}

/// Load configuration from a YAML file, overlay the environment, and validate.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env(|key| std::env::var(key).ok());
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_secs must be > 0"));
    }

    let r = &cfg.reddit;
    if r.app_id.trim().is_empty() {
        return Err(ConfigError::Invalid("reddit.app_id must be non-empty"));
    }
    if r.app_secret.trim().is_empty() {
        return Err(ConfigError::Invalid("reddit.app_secret must be non-empty"));
    }
    if r.username.trim().is_empty() {
        return Err(ConfigError::Invalid("reddit.username must be non-empty"));
    }
    if r.password.is_empty() {
        return Err(ConfigError::Invalid("reddit.password must be non-empty"));
    }
    if r.user_agent.trim().is_empty() {
        return Err(ConfigError::Invalid("reddit.user_agent must be non-empty"));
    }

    if reqwest::Url::parse(&cfg.readwise.base_url).is_err() {
        return Err(ConfigError::Invalid("readwise.base_url must be an absolute URL"));
    }
    if cfg.server.listen.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Invalid("server.listen must be host:port"));
    }

    Ok(())
}

/// Example configuration, also used by the tests.
pub fn example() -> &'static str {
    r#"app:
  local: false
  data_dir: "./data"
  poll_interval_secs: 300

reddit:
  app_id: "YOUR_REDDIT_APP_ID"
  app_secret: "YOUR_REDDIT_APP_SECRET"
  username: "reddit-readwise"
  password: "YOUR_REDDIT_PASSWORD"
  user_agent: "reddit-readwise/0.1.0"

readwise:
  base_url: "https://readwise.io/api/v2/"

server:
  listen: "127.0.0.1:8787"
"#
}
