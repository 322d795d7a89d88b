//! Queued voice-reply jobs.

/// A unit of deferred work: an audio reply waiting to be downloaded and
/// attached to its study.
///
/// Rows are never deleted; `done` flips to true exactly once and the row
/// stays behind as an audit trail. A job may be attempted repeatedly while
/// `done` is false, bounded by the poller's retry ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVoiceJob {
    pub id: i64,
    /// Provider-assigned update identifier, used to drop redelivered events.
    pub update_id: Option<i64>,
    pub study_id: i64,
    pub chat_id: String,
    /// The reply message carrying the audio, not the mirrored message.
    pub reply_message_id: i64,
    pub file_id: String,
    /// Earliest eligible processing time, unix seconds.
    pub process_at: i64,
    pub attempts: u32,
    pub done: bool,
}
