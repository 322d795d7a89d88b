//! Command-line interface for radsync.
//!
//! Provides commands for running the webhook listener and voice poller,
//! applying sign-offs, managing mirrors, and inspecting the voice queue.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::adapters::{MessagingApi, TelegramClient};
use crate::config::Config;
use crate::domain::{Actor, Role};
use crate::ingest::{JobPoller, PollerConfig, SystemClock, WebhookIntake};
use crate::notify::NotificationDispatcher;
use crate::signoff::SignOff;
use crate::storage::MediaStore;
use crate::store::StudyStore;
use crate::sync::{self, MessageSyncer};

/// radsync - Radiology study sign-off tracker with Telegram mirroring
#[derive(Parser, Debug)]
#[command(name = "radsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the database and data directories
    Init,

    /// Run the webhook listener and the voice poller
    Serve,

    /// Apply or revert a sign-off
    Sign {
        /// Study id
        study: i64,

        /// Which approval flag to change
        #[arg(value_enum)]
        target: TargetArg,

        /// Clear the flag instead of setting it
        #[arg(long)]
        uncheck: bool,

        /// Acting user id
        #[arg(long)]
        actor_id: i64,

        /// Acting user role
        #[arg(long, value_enum)]
        actor_role: RoleArg,
    },

    /// Create (or re-create) a study's mirror message
    Mirror {
        /// Study id
        study: i64,
    },

    /// Store report text for a study and refresh its mirror
    Report {
        /// Study id
        study: i64,

        /// File containing the report text
        input: PathBuf,
    },

    /// Attach an audio file to a study and refresh its mirror
    AttachAudio {
        /// Study id
        study: i64,

        /// Audio file to attach
        input: PathBuf,
    },

    /// Delete a study and its mirror message
    Remove {
        /// Study id
        study: i64,
    },

    /// Show voice queue counts
    Queue,

    /// Manage the provider webhook registration
    Webhook {
        #[command(subcommand)]
        command: WebhookCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum WebhookCommands {
    /// Register the webhook URL with the provider
    Set {
        /// Publicly reachable URL of the /telegram/webhook endpoint
        url: String,
    },

    /// Unregister the webhook
    Clear {
        /// Also discard updates the provider has queued
        #[arg(long)]
        drop_pending: bool,
    },
}

/// Sign-off target for the CLI
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TargetArg {
    Resident,
    Attending,
}

/// Actor role for the CLI (maps to Role)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RoleArg {
    Admin,
    Resident,
    Attending,
}

impl From<RoleArg> for Role {
    fn from(r: RoleArg) -> Self {
        match r {
            RoleArg::Admin => Role::Admin,
            RoleArg::Resident => Role::Resident,
            RoleArg::Attending => Role::Attending,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = Config::load()?;
        match self.command {
            Commands::Init => init(&config),
            Commands::Serve => serve(&config).await,
            Commands::Sign {
                study,
                target,
                uncheck,
                actor_id,
                actor_role,
            } => sign(&config, study, target, !uncheck, actor_id, actor_role.into()).await,
            Commands::Mirror { study } => mirror(&config, study).await,
            Commands::Report { study, input } => set_report(&config, study, &input).await,
            Commands::AttachAudio { study, input } => attach_audio(&config, study, &input).await,
            Commands::Remove { study } => remove(&config, study).await,
            Commands::Queue => queue_status(&config),
            Commands::Webhook { command } => webhook(&config, command).await,
            Commands::Config => show_config(&config),
        }
    }
}

/// Long-lived wiring shared by commands that talk to the provider.
struct App {
    store: Arc<StudyStore>,
    media: MediaStore,
    api: Arc<dyn MessagingApi>,
    syncer: Arc<MessageSyncer>,
    signoff: SignOff,
}

fn open_store(config: &Config) -> Result<Arc<StudyStore>> {
    let store = StudyStore::open(&config.database)
        .with_context(|| format!("Failed to open database: {}", config.database.display()))?;
    Ok(Arc::new(store))
}

fn build_app(config: &Config) -> Result<App> {
    let (token, mirror_chat) = config.require_telegram()?;
    let store = open_store(config)?;
    let media = MediaStore::new(config.audio_dir.clone(), config.report_dir.clone());

    let api: Arc<dyn MessagingApi> = Arc::new(TelegramClient::new(token.to_string()));
    let syncer = Arc::new(MessageSyncer::new(
        api.clone(),
        store.clone(),
        mirror_chat.to_string(),
    ));
    let notifier = Arc::new(NotificationDispatcher::new(
        api.clone(),
        config.notify_chat_id.clone(),
    ));
    let signoff = SignOff::new(
        store.clone(),
        syncer.clone(),
        notifier,
        media.clone(),
    );

    Ok(App {
        store,
        media,
        api,
        syncer,
        signoff,
    })
}

fn telegram_client(config: &Config) -> Result<TelegramClient> {
    let (token, _) = config.require_telegram()?;
    Ok(TelegramClient::new(token.to_string()))
}

/// Create the database schema and data directories
fn init(config: &Config) -> Result<()> {
    open_store(config)?;
    std::fs::create_dir_all(&config.audio_dir)?;
    std::fs::create_dir_all(&config.report_dir)?;
    println!("Initialized database at {}", config.database.display());
    Ok(())
}

/// Run the webhook listener and the voice poller until interrupted
async fn serve(config: &Config) -> Result<()> {
    let app = build_app(config)?;
    let clock = Arc::new(SystemClock);

    let intake = Arc::new(WebhookIntake::new(
        app.store.clone(),
        clock.clone(),
        config.intake_defer,
    ));

    let poller = Arc::new(JobPoller::new(
        app.store.clone(),
        app.api.clone(),
        app.syncer.clone(),
        app.media.clone(),
        clock,
        PollerConfig {
            interval: config.poll_interval,
            batch_size: config.poll_batch_size,
            max_attempts: config.max_attempts,
        },
    ));
    let poller_handle = poller.spawn();

    let result = crate::server::serve(config.bind, intake).await;

    // The listener is down; let an in-flight tick finish before exiting.
    poller_handle.stop().await?;
    result
}

/// Apply a sign-off transition
async fn sign(
    config: &Config,
    study: i64,
    target: TargetArg,
    checked: bool,
    actor_id: i64,
    actor_role: Role,
) -> Result<()> {
    let app = build_app(config)?;
    let actor = Actor::new(actor_id, actor_role);

    let outcome = match target {
        TargetArg::Resident => app.signoff.set_resident(study, &actor, checked).await?,
        TargetArg::Attending => app.signoff.set_attending(study, &actor, checked).await?,
    };

    println!(
        "Study {}: resident {} / attending {}",
        study,
        if outcome.resident_checked { "signed" } else { "unsigned" },
        if outcome.attending_checked { "signed" } else { "unsigned" },
    );
    Ok(())
}

/// Create or refresh a study's mirror message
async fn mirror(config: &Config, study: i64) -> Result<()> {
    let app = build_app(config)?;
    let detail = app.store.get_detail(study)?;

    if detail.has_mirror() {
        app.syncer.edit(study).await?;
        println!("Mirror for study {} refreshed", study);
    } else {
        let (chat_id, message_id) = app.syncer.create(study).await?;
        println!("Mirror for study {} created: {} / {}", study, chat_id, message_id);
    }
    Ok(())
}

/// Store report text and refresh the mirror
async fn set_report(config: &Config, study: i64, input: &PathBuf) -> Result<()> {
    let app = build_app(config)?;
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read report file: {}", input.display()))?;

    let path = app.media.save_report(study, &text).await?;
    app.store.attach_report(study, &path.to_string_lossy())?;
    app.syncer.edit(study).await?;

    println!("Report for study {} stored at {}", study, path.display());
    Ok(())
}

/// Attach an uploaded audio file and refresh the mirror
async fn attach_audio(config: &Config, study: i64, input: &PathBuf) -> Result<()> {
    let app = build_app(config)?;
    let bytes = std::fs::read(input)
        .with_context(|| format!("Failed to read audio file: {}", input.display()))?;
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp3");

    let path = app.media.save_audio_upload(study, ext, &bytes).await?;
    app.store.attach_audio(study, &path.to_string_lossy())?;
    app.syncer.edit(study).await?;

    println!("Audio for study {} stored at {}", study, path.display());
    Ok(())
}

/// Delete a study together with its mirror message
async fn remove(config: &Config, study: i64) -> Result<()> {
    let app = build_app(config)?;
    sync::remove_study(&app.store, &app.syncer, study).await?;
    println!("Study {} removed", study);
    Ok(())
}

/// Show voice queue counts
fn queue_status(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let (pending, done) = store.voice_queue_counts()?;
    println!("Voice queue: {} pending, {} done", pending, done);
    Ok(())
}

/// Manage the provider webhook registration
async fn webhook(config: &Config, command: WebhookCommands) -> Result<()> {
    let client = telegram_client(config)?;
    match command {
        WebhookCommands::Set { url } => {
            client.set_webhook(&url).await?;
            println!("Webhook set to {}", url);
        }
        WebhookCommands::Clear { drop_pending } => {
            client.delete_webhook(drop_pending).await?;
            println!("Webhook cleared");
        }
    }
    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config(config: &Config) -> Result<()> {
    println!("Database:       {}", config.database.display());
    println!("Audio dir:      {}", config.audio_dir.display());
    println!("Report dir:     {}", config.report_dir.display());
    println!("Bind:           {}", config.bind);
    println!("Mirror chat:    {}", config.mirror_chat_id.as_deref().unwrap_or("(unset)"));
    println!("Notify chat:    {}", config.notify_chat_id.as_deref().unwrap_or("(unset)"));
    println!("Bot token:      {}", if config.bot_token.is_some() { "(set)" } else { "(unset)" });
    println!("Intake defer:   {}s", config.intake_defer.as_secs());
    println!("Poll interval:  {}s", config.poll_interval.as_secs());
    println!("Poll batch:     {}", config.poll_batch_size);
    println!("Max attempts:   {}", config.max_attempts);
    Ok(())
}
