//! Shared fixtures for integration tests: a seeded in-memory store, a fake
//! messaging provider, and a hand-cranked clock.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use radsync::domain::NewStudy;
use radsync::ingest::Clock;
use radsync::{MediaStore, MessageSyncer, MessagingApi, StudyStore, TelegramError};

pub const MIRROR_CHAT: &str = "-100500";
pub const MIRROR_CHAT_ID: i64 = -100500;
pub const NOTIFY_CHAT: &str = "-100900";
pub const MIRROR_MESSAGE_ID: i64 = 7;

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Send {
        chat_id: String,
        text: String,
    },
    Edit {
        chat_id: String,
        message_id: i64,
        text: String,
    },
    Delete {
        chat_id: String,
        message_id: i64,
    },
    Resolve {
        file_id: String,
    },
    Download {
        url: String,
    },
}

/// In-process stand-in for the Telegram API. Records every call and can be
/// told to fail specific operations.
pub struct FakeMessaging {
    pub calls: Mutex<Vec<ApiCall>>,
    next_message_id: AtomicI64,
    pub fail_edits: AtomicBool,
    pub fail_downloads: AtomicBool,
    /// Fail only downloads whose URL contains this fragment.
    pub fail_download_matching: Mutex<Option<String>>,
    /// When set, deletes answer "message to delete not found".
    pub messages_missing: AtomicBool,
}

impl FakeMessaging {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_message_id: AtomicI64::new(100),
            fail_edits: AtomicBool::new(false),
            fail_downloads: AtomicBool::new(false),
            fail_download_matching: Mutex::new(None),
            messages_missing: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn sends_to(&self, chat_id: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::Send { chat_id: chat, text } if chat == chat_id => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::Edit { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn resolved_file_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::Resolve { file_id } => Some(file_id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessagingApi for FakeMessaging {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<i64, TelegramError> {
        self.record(ApiCall::Send {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        });
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn edit_message_text(
        &self,
        chat_id: &str,
        message_id: i64,
        text: &str,
    ) -> Result<(), TelegramError> {
        self.record(ApiCall::Edit {
            chat_id: chat_id.to_string(),
            message_id,
            text: text.to_string(),
        });
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(TelegramError::Api {
                method: "editMessageText",
                description: "Bad Request: chat not found".to_string(),
            });
        }
        Ok(())
    }

    async fn delete_message(&self, chat_id: &str, message_id: i64) -> Result<(), TelegramError> {
        self.record(ApiCall::Delete {
            chat_id: chat_id.to_string(),
            message_id,
        });
        if self.messages_missing.load(Ordering::SeqCst) {
            return Err(TelegramError::Api {
                method: "deleteMessage",
                description: "Bad Request: message to delete not found".to_string(),
            });
        }
        Ok(())
    }

    async fn resolve_file(&self, file_id: &str) -> Result<String, TelegramError> {
        self.record(ApiCall::Resolve {
            file_id: file_id.to_string(),
        });
        Ok(format!("https://files.test/{}", file_id))
    }

    async fn download_file(&self, download_url: &str) -> Result<Vec<u8>, TelegramError> {
        self.record(ApiCall::Download {
            url: download_url.to_string(),
        });
        let matched = self
            .fail_download_matching
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|frag| download_url.contains(frag.as_str()));
        if self.fail_downloads.load(Ordering::SeqCst) || matched {
            return Err(TelegramError::Api {
                method: "downloadFile",
                description: "HTTP 404 Not Found".to_string(),
            });
        }
        Ok(b"ogg-bytes".to_vec())
    }
}

/// Deterministic clock driven by the test.
pub struct FixedClock(Mutex<i64>);

impl FixedClock {
    pub fn at(unix_secs: i64) -> Self {
        Self(Mutex::new(unix_secs))
    }

    pub fn advance(&self, secs: i64) {
        *self.0.lock().unwrap() += secs;
    }

    pub fn now_ts(&self) -> i64 {
        *self.0.lock().unwrap()
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.now_ts(), 0).unwrap()
    }
}

/// A seeded store plus the wiring most tests need. The temp dir backs the
/// media store and must stay alive for the test's duration.
pub struct Fixture {
    pub store: Arc<StudyStore>,
    pub api: Arc<FakeMessaging>,
    pub syncer: Arc<MessageSyncer>,
    pub clock: Arc<FixedClock>,
    pub media: MediaStore,
    pub temp: TempDir,
    pub study_id: i64,
    pub resident_id: i64,
    pub attending_id: i64,
    pub admin_id: i64,
    modality_id: i64,
    exam_type_id: i64,
}

impl Fixture {
    /// Add another study sharing the fixture's physicians and exam setup.
    pub fn add_study(&self, patient_code: &str, firstname: &str, lastname: &str) -> i64 {
        let patient = self
            .store
            .insert_patient(patient_code, firstname, lastname, None, None)
            .unwrap();
        self.store
            .insert_study(&NewStudy {
                patient_id: patient,
                modality_id: self.modality_id,
                exam_type_id: self.exam_type_id,
                exam_date: "2024-11-03".to_string(),
                exam_time: "09:00".to_string(),
                resident_id: self.resident_id,
                attending_id: self.attending_id,
                ..NewStudy::default()
            })
            .unwrap()
    }
}

/// Build a fixture with one study whose mirror already exists
/// (`MIRROR_CHAT` / `MIRROR_MESSAGE_ID`).
pub fn fixture() -> Fixture {
    let store = Arc::new(StudyStore::open_in_memory().unwrap());

    let patient = store
        .insert_patient("P-100", "Jane", "Doe", Some(1980), Some("F"))
        .unwrap();
    let modality_id = store.insert_modality("CT", "Computed Tomography").unwrap();
    let exam_type_id = store
        .insert_exam_type("BRAIN_WC", "Brain with contrast")
        .unwrap();
    let resident_id = store.insert_user("res", "Res Ident", "resident").unwrap();
    let attending_id = store.insert_user("att", "Att Ending", "attending").unwrap();
    let admin_id = store.insert_user("adm", "Ad Min", "admin").unwrap();

    let study_id = store
        .insert_study(&NewStudy {
            patient_id: patient,
            modality_id,
            exam_type_id,
            exam_date: "2024-11-02".to_string(),
            exam_time: "10:30".to_string(),
            patient_age: Some(44),
            resident_id,
            attending_id,
            ..NewStudy::default()
        })
        .unwrap();
    store
        .set_mirror(study_id, MIRROR_CHAT, MIRROR_MESSAGE_ID)
        .unwrap();

    let api = Arc::new(FakeMessaging::new());
    let syncer = Arc::new(MessageSyncer::new(
        api.clone(),
        store.clone(),
        MIRROR_CHAT.to_string(),
    ));

    let temp = TempDir::new().unwrap();
    let media = MediaStore::new(temp.path().join("voices"), temp.path().join("reports"));

    Fixture {
        store,
        api,
        syncer,
        clock: Arc::new(FixedClock::at(1_700_000_000)),
        media,
        temp,
        study_id,
        resident_id,
        attending_id,
        admin_id,
        modality_id,
        exam_type_id,
    }
}
