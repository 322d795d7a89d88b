//! Durable storage for downloaded audio and report text.
//!
//! Paths are deterministic so re-processing a job overwrites its own file
//! instead of accumulating copies.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::domain::StudyDetail;

/// File storage for study media, rooted at the configured data directories.
#[derive(Debug, Clone)]
pub struct MediaStore {
    audio_dir: PathBuf,
    report_dir: PathBuf,
}

impl MediaStore {
    pub fn new(audio_dir: PathBuf, report_dir: PathBuf) -> Self {
        Self {
            audio_dir,
            report_dir,
        }
    }

    /// Destination for a voice reply, derived from the study and the source
    /// reply message.
    pub fn voice_reply_path(&self, study_id: i64, reply_message_id: i64) -> PathBuf {
        self.audio_dir
            .join(format!("study_{}_reply_{}.ogg", study_id, reply_message_id))
    }

    /// Persist downloaded voice bytes; returns the absolute-ish stored path.
    pub async fn save_voice_reply(
        &self,
        study_id: i64,
        reply_message_id: i64,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        let dest = self.voice_reply_path(study_id, reply_message_id);
        write_file(&dest, bytes).await?;
        Ok(dest)
    }

    /// Persist a directly uploaded audio file.
    pub async fn save_audio_upload(
        &self,
        study_id: i64,
        extension: &str,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        let ext = extension.trim_start_matches('.');
        let dest = self.audio_dir.join(format!("study_{}.{}", study_id, ext));
        write_file(&dest, bytes).await?;
        Ok(dest)
    }

    /// Persist report text for a study.
    pub async fn save_report(&self, study_id: i64, text: &str) -> io::Result<PathBuf> {
        let dest = self.report_dir.join(format!("study_{}.txt", study_id));
        write_file(&dest, text.as_bytes()).await?;
        Ok(dest)
    }

    /// Read the report text referenced by a study snapshot. Missing path or
    /// unreadable file read as empty, matching the report collaborator's
    /// best-effort contract.
    pub async fn read_report(&self, study: &StudyDetail) -> String {
        match &study.report_path {
            Some(path) => fs::read_to_string(path).await.unwrap_or_default(),
            None => String::new(),
        }
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn media_store(temp: &TempDir) -> MediaStore {
        MediaStore::new(
            temp.path().join("voices"),
            temp.path().join("reports"),
        )
    }

    #[test]
    fn test_voice_reply_path_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let store = media_store(&temp);
        assert_eq!(
            store.voice_reply_path(7, 42),
            store.voice_reply_path(7, 42)
        );
        assert_ne!(
            store.voice_reply_path(7, 42),
            store.voice_reply_path(7, 43)
        );
    }

    #[tokio::test]
    async fn test_save_and_read_report() {
        let temp = TempDir::new().unwrap();
        let store = media_store(&temp);

        let path = store.save_report(7, "Impression: clear").await.unwrap();
        assert!(path.ends_with("study_7.txt"));

        let study = StudyDetail {
            report_path: Some(path.to_string_lossy().into_owned()),
            ..StudyDetail::default()
        };
        assert_eq!(store.read_report(&study).await, "Impression: clear");
    }

    #[tokio::test]
    async fn test_read_report_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = media_store(&temp);

        let no_path = StudyDetail::default();
        assert_eq!(store.read_report(&no_path).await, "");

        let dangling = StudyDetail {
            report_path: Some(temp.path().join("gone.txt").to_string_lossy().into_owned()),
            ..StudyDetail::default()
        };
        assert_eq!(store.read_report(&dangling).await, "");
    }

    #[tokio::test]
    async fn test_save_voice_reply_creates_directories() {
        let temp = TempDir::new().unwrap();
        let store = media_store(&temp);

        let path = store.save_voice_reply(7, 42, b"ogg bytes").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"ogg bytes");

        // Overwrite on retry, no duplicate files
        store.save_voice_reply(7, 42, b"new bytes").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"new bytes");
    }
}
