//! Resident/attending sign-off state machine.
//!
//! States are derived from the two approval flags; transitions validate the
//! acting user's capability, apply the write, then push the refreshed mirror.
//! A mirror push that fails after a successful write is logged and swallowed:
//! the store is the source of truth and the mirror is eventually consistent.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{can_sign, Actor, SignTarget};
use crate::notify::NotificationDispatcher;
use crate::storage::MediaStore;
use crate::store::{StoreError, StudyStore};
use crate::sync::MessageSyncer;

/// Failures surfaced to the caller of a sign-off operation.
#[derive(Debug, Error)]
pub enum SignOffError {
    #[error("study {0} not found")]
    NotFound(i64),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SignOffError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StudyNotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Flag state after a successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignOutcome {
    pub resident_checked: bool,
    pub attending_checked: bool,
}

/// Applies sign-off transitions against the store and keeps the mirror and
/// broadcast channel informed.
pub struct SignOff {
    store: Arc<StudyStore>,
    syncer: Arc<MessageSyncer>,
    notifier: Arc<NotificationDispatcher>,
    media: MediaStore,
}

impl SignOff {
    pub fn new(
        store: Arc<StudyStore>,
        syncer: Arc<MessageSyncer>,
        notifier: Arc<NotificationDispatcher>,
        media: MediaStore,
    ) -> Self {
        Self {
            store,
            syncer,
            notifier,
            media,
        }
    }

    /// Set or clear the resident approval flag.
    pub async fn set_resident(
        &self,
        study_id: i64,
        actor: &Actor,
        checked: bool,
    ) -> Result<SignOutcome, SignOffError> {
        let study = self.store.get_detail(study_id)?;

        if !can_sign(actor, &study, SignTarget::Resident) {
            return Err(SignOffError::Forbidden(
                "resident sign-off is limited to the corresponding resident",
            ));
        }

        if !checked && study.attending_checked {
            if !actor.is_admin() {
                return Err(SignOffError::Conflict(
                    "cannot unsign after attending has signed",
                ));
            }
            // Cascade revert: both flags drop in one atomic write.
            self.store.clear_sign_flags(study_id)?;
            info!(study_id, actor = actor.id, "cascade revert applied");
            self.push_mirror(study_id).await;
            return Ok(SignOutcome {
                resident_checked: false,
                attending_checked: false,
            });
        }

        self.store.set_resident_checked(study_id, checked)?;
        info!(study_id, actor = actor.id, checked, "resident flag updated");
        self.push_mirror(study_id).await;
        Ok(SignOutcome {
            resident_checked: checked,
            attending_checked: study.attending_checked,
        })
    }

    /// Set or clear the attending approval flag.
    ///
    /// The first transition to checked broadcasts the finalized report.
    pub async fn set_attending(
        &self,
        study_id: i64,
        actor: &Actor,
        checked: bool,
    ) -> Result<SignOutcome, SignOffError> {
        let study = self.store.get_detail(study_id)?;

        if !can_sign(actor, &study, SignTarget::Attending) {
            return Err(SignOffError::Forbidden(
                "attending sign-off is limited to the corresponding attending",
            ));
        }

        if checked && !study.resident_checked && !actor.is_admin() {
            return Err(SignOffError::Conflict("resident must sign first"));
        }

        let was_checked = study.attending_checked;
        self.store.set_attending_checked(study_id, checked)?;
        info!(study_id, actor = actor.id, checked, "attending flag updated");

        if checked && !was_checked {
            let report_text = self.media.read_report(&study).await;
            match self.store.get_detail(study_id) {
                Ok(finalized) => {
                    self.notifier
                        .announce_final_sign(&finalized, &report_text)
                        .await;
                }
                Err(err) => warn!(study_id, error = %err, "skipping announcement"),
            }
        }

        self.push_mirror(study_id).await;
        Ok(SignOutcome {
            resident_checked: study.resident_checked,
            attending_checked: checked,
        })
    }

    /// Best-effort mirror refresh after a committed state change.
    async fn push_mirror(&self, study_id: i64) {
        if let Err(err) = self.syncer.edit(study_id).await {
            warn!(study_id, error = %err, "mirror edit failed after sign-off write");
        }
    }
}
