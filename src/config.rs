//! Configuration loader and validator for the release bot.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::github::GITHUB_GRAPHQL_URL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub telegram: Telegram,
    pub github: GitHub,
    pub server: Server,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Watch entries shown per page of the list view.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Entries reconciled concurrently within one pass.
    #[serde(default = "default_pass_concurrency")]
    pub pass_concurrency: usize,
    /// Run a pass on this interval; 0 leaves passes to the HTTP trigger.
    #[serde(default)]
    pub check_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHub {
    pub token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub bind: String,
    /// Shared secret expected as the whole body of trigger requests.
    pub trigger_token: String,
}

fn default_page_size() -> usize {
    5
}

fn default_pass_concurrency() -> usize {
    4
}

fn default_api_url() -> String {
    GITHUB_GRAPHQL_URL.to_string()
}

impl Config {
    /// Ensure `app.data_dir` exists.
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` if set, otherwise a SQLite file inside `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| format!("sqlite://{}/watchbot.db", self.app.data_dir))
    }

    /// Replace secrets with `TELEGRAM_BOT_TOKEN`, `GITHUB_TOKEN` and
    /// `TRIGGER_TOKEN` when those are set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = get("GITHUB_TOKEN") {
            self.github.token = v;
        }
        if let Some(v) = get("TRIGGER_TOKEN") {
            self.server.trigger_token = v;
        }
    }
}

/// Load configuration from a YAML file, apply environment overrides and
/// validate. `None` means `config.yaml` in the working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env_overrides();
    validate(&cfg)?;
    Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.page_size == 0 {
        return Err(ConfigError::Invalid("app.page_size must be > 0"));
    }
    if cfg.app.pass_concurrency == 0 {
        return Err(ConfigError::Invalid("app.pass_concurrency must be > 0"));
    }
    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }
    if cfg.github.token.trim().is_empty() {
        return Err(ConfigError::Invalid("github.token must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.github.api_url).is_err() {
        return Err(ConfigError::Invalid("github.api_url must be a valid URL"));
    }
    if cfg.server.bind.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Invalid("server.bind must be a socket address"));
    }
    if cfg.server.trigger_token.trim().is_empty() {
        return Err(ConfigError::Invalid("server.trigger_token must be non-empty"));
    }
    Ok(())
}

pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  page_size: 5
  pass_concurrency: 4
  check_interval_secs: 0

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"

github:
  token: "YOUR_GITHUB_TOKEN"
  api_url: "https://api.github.com/graphql"

server:
  bind: "0.0.0.0:8080"
  trigger_token: "CHANGE_ME"
"#
}
