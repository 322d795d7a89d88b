//! Telegram Bot API client.
//!
//! All payloads use `parse_mode: HTML`; callers are responsible for escaping
//! interpolated values (see [`crate::sync::format::esc`]).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use super::MessagingApi;

/// Errors from the Telegram Bot API.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// The API answered but rejected the call.
    #[error("Telegram {method} failed: {description}")]
    Api {
        method: &'static str,
        description: String,
    },

    /// The call never produced a usable answer.
    #[error("Telegram request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl TelegramError {
    /// True for the "message to delete not found" family of rejections,
    /// which callers treat as an already-deleted message.
    pub fn is_message_missing(&self) -> bool {
        match self {
            Self::Api { description, .. } => {
                let d = description.to_ascii_lowercase();
                d.contains("message to delete not found")
                    || d.contains("message to edit not found")
                    || d.contains("message_id_invalid")
            }
            Self::Http(_) => false,
        }
    }
}

/// Response envelope from the Telegram API
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Message result from sendMessage/editMessageText
#[derive(Debug, Deserialize)]
struct MessageResult {
    message_id: i64,
}

/// File result from getFile
#[derive(Debug, Deserialize)]
struct FileResult {
    file_path: String,
}

/// Telegram Bot API client
pub struct TelegramClient {
    /// Bot token
    bot_token: String,
    /// HTTP client
    client: reqwest::Client,
}

impl TelegramClient {
    /// Create a new Telegram client
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    /// Build file-download base URL
    fn file_url(&self, file_path: &str) -> String {
        format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.bot_token, file_path
        )
    }

    /// POST a method call and unwrap the response envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        payload: serde_json::Value,
    ) -> Result<T, TelegramError> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: TelegramResponse<T> = response.json().await?;

        match body {
            TelegramResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            TelegramResponse { description, .. } => Err(TelegramError::Api {
                method,
                description: description.unwrap_or_else(|| format!("HTTP {}", status)),
            }),
        }
    }

    /// Register the webhook URL updates should be delivered to.
    pub async fn set_webhook(&self, url: &str) -> Result<(), TelegramError> {
        self.call::<bool>("setWebhook", serde_json::json!({ "url": url }))
            .await?;
        Ok(())
    }

    /// Unregister the webhook, optionally discarding queued updates.
    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<(), TelegramError> {
        self.call::<bool>(
            "deleteWebhook",
            serde_json::json!({ "drop_pending_updates": drop_pending_updates }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MessagingApi for TelegramClient {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<i64, TelegramError> {
        let result: MessageResult = self
            .call(
                "sendMessage",
                serde_json::json!({
                    "chat_id": chat_id,
                    "text": text,
                    "parse_mode": "HTML",
                    "disable_web_page_preview": true,
                }),
            )
            .await?;
        Ok(result.message_id)
    }

    async fn edit_message_text(
        &self,
        chat_id: &str,
        message_id: i64,
        text: &str,
    ) -> Result<(), TelegramError> {
        self.call::<serde_json::Value>(
            "editMessageText",
            serde_json::json!({
                "chat_id": chat_id,
                "message_id": message_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }),
        )
        .await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: &str, message_id: i64) -> Result<(), TelegramError> {
        self.call::<bool>(
            "deleteMessage",
            serde_json::json!({
                "chat_id": chat_id,
                "message_id": message_id,
            }),
        )
        .await?;
        Ok(())
    }

    async fn resolve_file(&self, file_id: &str) -> Result<String, TelegramError> {
        let result: FileResult = self
            .call("getFile", serde_json::json!({ "file_id": file_id }))
            .await?;
        Ok(self.file_url(&result.file_path))
    }

    async fn download_file(&self, download_url: &str) -> Result<Vec<u8>, TelegramError> {
        let response = self.client.get(download_url).send().await?;
        if !response.status().is_success() {
            return Err(TelegramError::Api {
                method: "downloadFile",
                description: format!("HTTP {}", response.status()),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url() {
        let client = TelegramClient::new("TOKEN".to_string());
        assert_eq!(
            client.api_url("sendMessage"),
            "https://api.telegram.org/botTOKEN/sendMessage"
        );
    }

    #[test]
    fn test_file_url() {
        let client = TelegramClient::new("TOKEN".to_string());
        assert_eq!(
            client.file_url("voice/file_1.oga"),
            "https://api.telegram.org/file/botTOKEN/voice/file_1.oga"
        );
    }

    #[test]
    fn test_message_missing_detection() {
        let err = TelegramError::Api {
            method: "deleteMessage",
            description: "Bad Request: message to delete not found".to_string(),
        };
        assert!(err.is_message_missing());

        let err = TelegramError::Api {
            method: "sendMessage",
            description: "Bad Request: chat not found".to_string(),
        };
        assert!(!err.is_message_missing());
    }

    #[test]
    fn test_response_envelope_parsing() {
        let ok: TelegramResponse<MessageResult> =
            serde_json::from_str(r#"{"ok":true,"result":{"message_id":42}}"#).unwrap();
        assert!(ok.ok);
        assert_eq!(ok.result.unwrap().message_id, 42);

        let err: TelegramResponse<MessageResult> =
            serde_json::from_str(r#"{"ok":false,"description":"Bad Request"}"#).unwrap();
        assert!(!err.ok);
        assert_eq!(err.description.as_deref(), Some("Bad Request"));
    }
}
