//! radsync - Radiology study sign-off tracker with Telegram mirroring
//!
//! Tracks diagnostic-imaging studies through a resident/attending sign-off
//! workflow and mirrors each study's state into a Telegram group chat. Voice
//! replies dictated under a mirror message are queued, downloaded in the
//! background, and attached to the originating study.
//!
//! # Architecture
//!
//! - Studies live in SQLite; the store is the single source of truth
//! - Every state change re-renders the full mirror message (edit-in-place)
//! - Voice ingestion is deferred: the webhook only records intent, a timer
//!   task does the slow I/O
//!
//! # Modules
//!
//! - `adapters`: Telegram Bot API client behind the `MessagingApi` seam
//! - `domain`: Data structures (Study, Actor, PendingVoiceJob)
//! - `signoff`: The resident/attending approval state machine
//! - `sync`: Mirror-message formatting and synchronization
//! - `ingest`: Webhook intake and the voice-job poller
//! - `notify`: Final-sign broadcast announcements
//! - `store`: SQLite persistence
//! - `server`: Webhook HTTP listener
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Initialize the database
//! radsync init
//!
//! # Run the webhook listener and voice poller
//! radsync serve
//!
//! # Apply a sign-off
//! radsync sign 42 resident --actor-id 7 --actor-role resident
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod ingest;
pub mod notify;
pub mod server;
pub mod signoff;
pub mod storage;
pub mod store;
pub mod sync;

// Re-export main types at crate root for convenience
pub use config::Config;
pub use domain::{can_sign, Actor, PendingVoiceJob, Role, SignTarget, StudyDetail};
pub use notify::NotificationDispatcher;
pub use signoff::{SignOff, SignOffError, SignOutcome};
pub use storage::MediaStore;
pub use store::{StoreError, StudyStore};
pub use sync::{MessageSyncer, SyncError};

// Voice ingestion pipeline
pub use ingest::{Clock, JobPoller, PollerConfig, SystemClock, WebhookIntake};

// Telegram integration
pub use adapters::{MessagingApi, TelegramClient, TelegramError};
