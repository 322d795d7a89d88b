//! Voice-reply ingestion pipeline.
//!
//! Audio replies posted under a study's mirror message flow through two
//! decoupled stages:
//!
//! 1. **WebhookIntake**: maps inbound provider updates to queued jobs
//! 2. **JobPoller**: timer-driven consumer that downloads the audio,
//!    attaches it to the study, and refreshes the mirror
//!
//! # Architecture
//!
//! ```text
//! provider update → WebhookIntake → pending_voice → JobPoller → MediaStore
//!                                                       ↓
//!                                                MessageSyncer.edit
//! ```
//!
//! The intake only persists intent; all slow I/O lives in the poller.

pub mod poller;
pub mod webhook;

use chrono::{DateTime, Utc};

// Re-export key types
pub use poller::{JobPoller, PollerConfig, PollerHandle, TickReport};
pub use webhook::{IgnoreReason, IntakeOutcome, Update, WebhookIntake};

/// Time source for intake deferral and poller eligibility.
///
/// Injectable so tests drive the pipeline without waiting on wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
