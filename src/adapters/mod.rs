//! Adapter interfaces for external systems.
//!
//! The messaging provider is reached through the [`MessagingApi`] trait so
//! the sync, notification and polling layers can be exercised against an
//! in-process fake. [`TelegramClient`] is the production implementation.

pub mod telegram;

use async_trait::async_trait;

// Re-export the Telegram adapter
pub use telegram::{TelegramClient, TelegramError};

/// Operations the core needs from the messaging provider.
///
/// Chat identifiers are strings end to end: group chat ids can be negative
/// and arrive from configuration, so nothing here assumes numeric form.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    /// Post a rich-text message; returns the provider message id.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<i64, TelegramError>;

    /// Replace the full text of an existing message.
    async fn edit_message_text(
        &self,
        chat_id: &str,
        message_id: i64,
        text: &str,
    ) -> Result<(), TelegramError>;

    /// Remove a message.
    async fn delete_message(&self, chat_id: &str, message_id: i64) -> Result<(), TelegramError>;

    /// Resolve an opaque file reference to a download URL.
    async fn resolve_file(&self, file_id: &str) -> Result<String, TelegramError>;

    /// Fetch the bytes behind a previously resolved URL.
    async fn download_file(&self, download_url: &str) -> Result<Vec<u8>, TelegramError>;
}
