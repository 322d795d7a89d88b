//! Webhook intake: inbound provider updates become queued voice jobs.
//!
//! The handler is synchronous and fast. It never downloads anything; a
//! matching update only inserts a row recording what to fetch and when it
//! becomes eligible. Everything else is acknowledged and dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use super::Clock;
use crate::store::{EnqueueOutcome, StoreError, StudyStore};

/// Inbound update envelope, pared down to the fields the intake reads.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat: ChatRef,
    #[serde(default)]
    pub reply_to_message: Option<RepliedTo>,
    #[serde(default)]
    pub voice: Option<VoiceNote>,
    #[serde(default)]
    pub audio: Option<AudioFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRef {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepliedTo {
    pub message_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceNote {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioFile {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl IncomingMessage {
    /// The audio reference carried by this message, voice note first.
    fn audio_file_id(&self) -> Option<&str> {
        self.voice
            .as_ref()
            .map(|v| v.file_id.as_str())
            .or_else(|| self.audio.as_ref().map(|a| a.file_id.as_str()))
    }
}

/// Why an update produced no job. All of these are acknowledged upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Update carries no message payload.
    NoMessage,
    /// Message is not a reply.
    NotAReply,
    /// Reply target does not match any study's mirror.
    UnknownMirror,
    /// Reply carries neither a voice note nor an audio file.
    NoAudio,
}

/// Result of handling one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// A job was queued for deferred processing.
    Queued { job_id: i64, study_id: i64 },
    /// The provider redelivered an update we already queued.
    Duplicate,
    /// Acknowledged and dropped.
    Ignored(IgnoreReason),
}

/// Maps provider updates to pending voice jobs.
pub struct WebhookIntake {
    store: Arc<StudyStore>,
    clock: Arc<dyn Clock>,
    /// Grace period before a queued reply becomes eligible, so a corrected
    /// recording can supersede the first one.
    defer: Duration,
}

impl WebhookIntake {
    pub fn new(store: Arc<StudyStore>, clock: Arc<dyn Clock>, defer: Duration) -> Self {
        Self { store, clock, defer }
    }

    /// Handle one inbound update.
    pub fn handle_update(&self, update: &Update) -> Result<IntakeOutcome, StoreError> {
        let Some(message) = &update.message else {
            return Ok(IntakeOutcome::Ignored(IgnoreReason::NoMessage));
        };
        let Some(reply) = &message.reply_to_message else {
            return Ok(IntakeOutcome::Ignored(IgnoreReason::NotAReply));
        };

        let chat_id = message.chat.id.to_string();
        let Some(study_id) = self.store.find_by_mirror(&chat_id, reply.message_id)? else {
            debug!(
                chat_id,
                reply_message_id = reply.message_id,
                "reply does not match a mirror, dropping"
            );
            return Ok(IntakeOutcome::Ignored(IgnoreReason::UnknownMirror));
        };

        let Some(file_id) = message.audio_file_id() else {
            return Ok(IntakeOutcome::Ignored(IgnoreReason::NoAudio));
        };

        let process_at = self.clock.now().timestamp() + self.defer.as_secs() as i64;
        let outcome = self.store.enqueue_voice_job(
            Some(update.update_id),
            study_id,
            &chat_id,
            message.message_id,
            file_id,
            process_at,
        )?;

        match outcome {
            EnqueueOutcome::Queued(job_id) => {
                info!(study_id, job_id, "voice reply queued");
                Ok(IntakeOutcome::Queued { job_id, study_id })
            }
            EnqueueOutcome::Duplicate => {
                debug!(update_id = update.update_id, "duplicate update dropped");
                Ok(IntakeOutcome::Duplicate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_parsing_full_shape() {
        let raw = r#"{
            "update_id": 9001,
            "message": {
                "message_id": 55,
                "chat": { "id": -100123 },
                "reply_to_message": { "message_id": 7 },
                "voice": { "file_id": "voice-abc" }
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert_eq!(update.update_id, 9001);
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, -100123);
        assert_eq!(message.reply_to_message.unwrap().message_id, 7);
        assert_eq!(message.voice.unwrap().file_id, "voice-abc");
    }

    #[test]
    fn test_update_parsing_tolerates_extra_fields() {
        let raw = r#"{
            "update_id": 1,
            "message": {
                "message_id": 2,
                "from": { "id": 3, "first_name": "x" },
                "chat": { "id": 4, "type": "supergroup" },
                "date": 1700000000,
                "text": "hello"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let message = update.message.unwrap();
        assert!(message.reply_to_message.is_none());
        assert!(message.voice.is_none());
        assert!(message.audio.is_none());
    }

    #[test]
    fn test_voice_note_takes_precedence_over_audio() {
        let message = IncomingMessage {
            message_id: 1,
            chat: ChatRef { id: 1 },
            reply_to_message: None,
            voice: Some(VoiceNote {
                file_id: "voice-id".to_string(),
            }),
            audio: Some(AudioFile {
                file_id: "audio-id".to_string(),
                file_name: Some("memo.mp3".to_string()),
            }),
        };
        assert_eq!(message.audio_file_id(), Some("voice-id"));
    }

    #[test]
    fn test_audio_file_used_when_no_voice_note() {
        let message = IncomingMessage {
            message_id: 1,
            chat: ChatRef { id: 1 },
            reply_to_message: None,
            voice: None,
            audio: Some(AudioFile {
                file_id: "audio-id".to_string(),
                file_name: None,
            }),
        };
        assert_eq!(message.audio_file_id(), Some("audio-id"));
    }
}
