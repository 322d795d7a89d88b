//! Runtime configuration.
//!
//! Sources (highest priority first):
//! 1. Environment variables (TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, RADSYNC_*)
//! 2. Config file (radsync.yaml in the working directory, or $RADSYNC_CONFIG)
//! 3. Defaults (~/.radsync)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub intake: IntakeSection,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramSection {
    pub bot_token: Option<String>,
    /// Chat the study mirrors live in.
    pub chat_id: Option<String>,
    /// Broadcast channel for final-sign announcements.
    pub notify_chat_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsSection {
    /// Data home; db and media directories default underneath it.
    pub home: Option<String>,
    pub database: Option<String>,
    pub audio_dir: Option<String>,
    pub report_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntakeSection {
    pub defer_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub poll_batch_size: Option<u32>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSection {
    pub bind: Option<String>,
}

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: Option<String>,
    pub mirror_chat_id: Option<String>,
    pub notify_chat_id: Option<String>,
    pub database: PathBuf,
    pub audio_dir: PathBuf,
    pub report_dir: PathBuf,
    pub bind: SocketAddr,
    pub intake_defer: Duration,
    pub poll_interval: Duration,
    pub poll_batch_size: u32,
    pub max_attempts: u32,
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        let file = match config_file_path() {
            Some(path) => load_config_file(&path)?,
            None => ConfigFile::default(),
        };
        Ok(Self::resolve(file))
    }

    fn resolve(file: ConfigFile) -> Self {
        let home = env_var("RADSYNC_HOME")
            .map(PathBuf::from)
            .or_else(|| file.paths.home.as_ref().map(PathBuf::from))
            .unwrap_or_else(default_home);

        let database = env_var("RADSYNC_DB")
            .map(PathBuf::from)
            .or_else(|| file.paths.database.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| home.join("radsync.db"));
        let audio_dir = env_var("RADSYNC_AUDIO_DIR")
            .map(PathBuf::from)
            .or_else(|| file.paths.audio_dir.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| home.join("voices"));
        let report_dir = env_var("RADSYNC_REPORT_DIR")
            .map(PathBuf::from)
            .or_else(|| file.paths.report_dir.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| home.join("reports"));

        let bind = env_var("RADSYNC_BIND")
            .or(file.server.bind)
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));

        Self {
            bot_token: env_var("TELEGRAM_BOT_TOKEN").or(file.telegram.bot_token),
            mirror_chat_id: env_var("TELEGRAM_CHAT_ID").or(file.telegram.chat_id),
            notify_chat_id: env_var("RADSYNC_NOTIFY_CHAT_ID").or(file.telegram.notify_chat_id),
            database,
            audio_dir,
            report_dir,
            bind,
            intake_defer: Duration::from_secs(file.intake.defer_secs.unwrap_or(300)),
            poll_interval: Duration::from_secs(file.intake.poll_interval_secs.unwrap_or(30)),
            poll_batch_size: file.intake.poll_batch_size.unwrap_or(10),
            max_attempts: file.intake.max_attempts.unwrap_or(20),
        }
    }

    /// Telegram credentials, required by every command that talks to the
    /// provider.
    pub fn require_telegram(&self) -> Result<(&str, &str)> {
        let token = self
            .bot_token
            .as_deref()
            .context("Missing TELEGRAM_BOT_TOKEN in environment or config file")?;
        let chat = self
            .mirror_chat_id
            .as_deref()
            .context("Missing TELEGRAM_CHAT_ID in environment or config file")?;
        Ok((token, chat))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn config_file_path() -> Option<PathBuf> {
    if let Some(path) = env_var("RADSYNC_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let local = PathBuf::from("radsync.yaml");
    local.exists().then_some(local)
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".radsync")
}
