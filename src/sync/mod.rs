//! Mirror-message synchronization.
//!
//! Keeps the external chat message for each study consistent with the store.
//! Writers race (sign-off requests vs the voice poller), so all mirror writes
//! for a study serialize on a per-study lock and re-read the snapshot inside
//! it; the rendering that reaches the provider always matches a state the
//! store actually held.

pub mod format;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::adapters::{MessagingApi, TelegramError};
use crate::store::{StoreError, StudyStore};

pub use format::{build_study_message, esc};

/// Errors from mirror operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Edit requested before the mirror was ever created.
    #[error("study {0} has no mirror message")]
    MissingMirror(i64),

    #[error(transparent)]
    Provider(#[from] TelegramError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creates, edits and deletes the chat message mirroring a study.
pub struct MessageSyncer {
    api: Arc<dyn MessagingApi>,
    store: Arc<StudyStore>,
    /// Default chat the mirrors live in.
    chat_id: String,
    /// One lock per study id; writers serialize here.
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl MessageSyncer {
    pub fn new(api: Arc<dyn MessagingApi>, store: Arc<StudyStore>, chat_id: String) -> Self {
        Self {
            api,
            store,
            chat_id,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn study_lock(&self, study_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(study_id).or_default().clone()
    }

    /// Send the initial mirror message and persist its identifiers.
    ///
    /// Re-creating an existing mirror sends a fresh message and repoints the
    /// study at it; the previous message is left to the caller to delete.
    pub async fn create(&self, study_id: i64) -> Result<(String, i64), SyncError> {
        let lock = self.study_lock(study_id).await;
        let _guard = lock.lock().await;

        let detail = self.store.get_detail(study_id)?;
        let text = build_study_message(&detail);
        let message_id = self.api.send_message(&self.chat_id, &text).await?;
        self.store.set_mirror(study_id, &self.chat_id, message_id)?;
        debug!(study_id, message_id, "mirror created");
        Ok((self.chat_id.clone(), message_id))
    }

    /// Re-render the study and replace the mirrored message text.
    ///
    /// No retry: the caller decides whether a provider failure matters for
    /// the state change that triggered the edit.
    pub async fn edit(&self, study_id: i64) -> Result<(), SyncError> {
        let lock = self.study_lock(study_id).await;
        let _guard = lock.lock().await;

        let detail = self.store.get_detail(study_id)?;
        let (chat_id, message_id) = match (&detail.chat_id, detail.message_id) {
            (Some(chat), Some(msg)) => (chat.clone(), msg),
            _ => return Err(SyncError::MissingMirror(study_id)),
        };

        let text = build_study_message(&detail);
        self.api
            .edit_message_text(&chat_id, message_id, &text)
            .await?;
        debug!(study_id, message_id, "mirror updated");
        Ok(())
    }

    /// Delete a mirrored message. Idempotent: deleting an already-removed
    /// message succeeds.
    pub async fn delete(&self, chat_id: &str, message_id: i64) -> Result<(), SyncError> {
        match self.api.delete_message(chat_id, message_id).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_message_missing() => {
                debug!(chat_id, message_id, "mirror already gone");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Remove a study and its mirror together: the chat message first (swallowing
/// already-gone), then the row. The mirrored message must never outlive the
/// study.
pub async fn remove_study(
    store: &StudyStore,
    syncer: &MessageSyncer,
    study_id: i64,
) -> Result<(), SyncError> {
    let detail = store.get_detail(study_id)?;
    if let (Some(chat_id), Some(message_id)) = (&detail.chat_id, detail.message_id) {
        syncer.delete(chat_id, message_id).await?;
    }
    store.delete_study(study_id)?;
    Ok(())
}
