//! SQLite-backed study and voice-job store.
//!
//! Single source of truth for study state. Writes are per-statement atomic;
//! there is no optimistic-concurrency token, so concurrent mutators apply
//! last-write-wins semantics on the flags and mirror identifiers. The cascade
//! revert clears both flags in one UPDATE.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

use crate::domain::{NewStudy, PendingVoiceJob, StudyDetail};

/// Errors surfaced by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("study {0} not found")]
    StudyNotFound(i64),

    #[error("voice job {0} not found")]
    JobNotFound(i64),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Outcome of enqueueing a voice job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new job row was created.
    Queued(i64),
    /// The provider already delivered this update; nothing was inserted.
    Duplicate,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY,
    username    TEXT NOT NULL UNIQUE,
    full_name   TEXT NOT NULL,
    role        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS patients (
    id           INTEGER PRIMARY KEY,
    patient_code TEXT NOT NULL UNIQUE,
    firstname    TEXT,
    lastname     TEXT,
    birth_year   INTEGER,
    gender       TEXT
);

CREATE TABLE IF NOT EXISTS modalities (
    id   INTEGER PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS exam_types (
    id   INTEGER PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS studies (
    id                INTEGER PRIMARY KEY,
    patient_id        INTEGER NOT NULL REFERENCES patients(id),
    modality_id       INTEGER NOT NULL REFERENCES modalities(id),
    exam_type_id      INTEGER NOT NULL REFERENCES exam_types(id),
    exam_date         TEXT NOT NULL,
    exam_time         TEXT NOT NULL,
    exam_details      TEXT,
    description       TEXT,
    patient_age       INTEGER,
    resident_id       INTEGER NOT NULL REFERENCES users(id),
    attending_id      INTEGER NOT NULL REFERENCES users(id),
    resident_checked  INTEGER NOT NULL DEFAULT 0,
    attending_checked INTEGER NOT NULL DEFAULT 0,
    chat_id           TEXT,
    message_id        INTEGER,
    audio_path        TEXT,
    report_path       TEXT,
    dicom_url         TEXT
);

CREATE INDEX IF NOT EXISTS idx_studies_mirror ON studies(chat_id, message_id);

-- No foreign key on study_id: jobs are an audit trail and outlive their study.
CREATE TABLE IF NOT EXISTS pending_voice (
    id               INTEGER PRIMARY KEY,
    update_id        INTEGER UNIQUE,
    study_id         INTEGER NOT NULL,
    chat_id          TEXT NOT NULL,
    reply_message_id INTEGER NOT NULL,
    file_id          TEXT NOT NULL,
    process_at       INTEGER NOT NULL,
    attempts         INTEGER NOT NULL DEFAULT 0,
    done             INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_pending_voice_due ON pending_voice(done, process_at);
"#;

const DETAIL_SQL: &str = r#"
SELECT
    s.id,
    s.exam_date,
    s.exam_time,
    s.exam_details,
    s.description,
    m.code          AS modality_code,
    e.code          AS exam_type_code,
    p.patient_code  AS patient_code,
    p.firstname     AS patient_firstname,
    p.lastname      AS patient_lastname,
    s.patient_age   AS patient_age,
    p.gender        AS patient_gender,
    s.resident_id,
    s.attending_id,
    r.full_name     AS resident_fullname,
    a.full_name     AS attending_fullname,
    s.resident_checked,
    s.attending_checked,
    s.chat_id,
    s.message_id,
    s.audio_path,
    s.report_path,
    s.dicom_url
FROM studies s
JOIN patients p    ON p.id = s.patient_id
JOIN modalities m  ON m.id = s.modality_id
JOIN exam_types e  ON e.id = s.exam_type_id
LEFT JOIN users r  ON r.id = s.resident_id
LEFT JOIN users a  ON a.id = s.attending_id
WHERE s.id = ?1
"#;

/// Study and voice-job persistence over a single SQLite connection.
pub struct StudyStore {
    conn: Mutex<Connection>,
}

impl StudyStore {
    /// Open (and if necessary create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            // Match the provider client: missing directories are not an error.
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Open an in-memory database. Used by tests and `--dry-run` tooling.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Recover the connection even if a panicking thread poisoned the lock.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------
    // Reference data and registration
    // ------------------------------------------------------------------

    pub fn insert_user(
        &self,
        username: &str,
        full_name: &str,
        role: &str,
    ) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users (username, full_name, role) VALUES (?1, ?2, ?3)",
            params![username, full_name, role],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_patient(
        &self,
        patient_code: &str,
        firstname: &str,
        lastname: &str,
        birth_year: Option<i64>,
        gender: Option<&str>,
    ) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO patients (patient_code, firstname, lastname, birth_year, gender)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![patient_code, firstname, lastname, birth_year, gender],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_modality(&self, code: &str, name: &str) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO modalities (code, name) VALUES (?1, ?2)",
            params![code, name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_exam_type(&self, code: &str, name: &str) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO exam_types (code, name) VALUES (?1, ?2)",
            params![code, name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_study(&self, study: &NewStudy) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO studies (
                patient_id, modality_id, exam_type_id, exam_date, exam_time,
                exam_details, description, patient_age, resident_id, attending_id, dicom_url
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                study.patient_id,
                study.modality_id,
                study.exam_type_id,
                study.exam_date,
                study.exam_time,
                study.exam_details,
                study.description,
                study.patient_age,
                study.resident_id,
                study.attending_id,
                study.dicom_url,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // ------------------------------------------------------------------
    // Study reads
    // ------------------------------------------------------------------

    /// Joined display projection of a study.
    pub fn get_detail(&self, id: i64) -> Result<StudyDetail, StoreError> {
        let conn = self.conn();
        conn.query_row(DETAIL_SQL, params![id], row_to_detail)
            .optional()?
            .ok_or(StoreError::StudyNotFound(id))
    }

    /// Look up the study mirrored by `(chat_id, message_id)`, if any.
    pub fn find_by_mirror(
        &self,
        chat_id: &str,
        message_id: i64,
    ) -> Result<Option<i64>, StoreError> {
        let conn = self.conn();
        let id = conn
            .query_row(
                "SELECT id FROM studies WHERE chat_id = ?1 AND message_id = ?2",
                params![chat_id, message_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Study writes
    // ------------------------------------------------------------------

    pub fn set_resident_checked(&self, id: i64, checked: bool) -> Result<(), StoreError> {
        self.update_study(
            id,
            "UPDATE studies SET resident_checked = ?1 WHERE id = ?2",
            params![checked as i64, id],
        )
    }

    pub fn set_attending_checked(&self, id: i64, checked: bool) -> Result<(), StoreError> {
        self.update_study(
            id,
            "UPDATE studies SET attending_checked = ?1 WHERE id = ?2",
            params![checked as i64, id],
        )
    }

    /// Cascade revert: both approval flags drop in one atomic write.
    pub fn clear_sign_flags(&self, id: i64) -> Result<(), StoreError> {
        self.update_study(
            id,
            "UPDATE studies SET resident_checked = 0, attending_checked = 0 WHERE id = ?1",
            params![id],
        )
    }

    /// Persist the mirror identifiers returned by the provider.
    pub fn set_mirror(&self, id: i64, chat_id: &str, message_id: i64) -> Result<(), StoreError> {
        self.update_study(
            id,
            "UPDATE studies SET chat_id = ?1, message_id = ?2 WHERE id = ?3",
            params![chat_id, message_id, id],
        )
    }

    pub fn attach_audio(&self, id: i64, path: &str) -> Result<(), StoreError> {
        self.update_study(
            id,
            "UPDATE studies SET audio_path = ?1 WHERE id = ?2",
            params![path, id],
        )
    }

    pub fn attach_report(&self, id: i64, path: &str) -> Result<(), StoreError> {
        self.update_study(
            id,
            "UPDATE studies SET report_path = ?1 WHERE id = ?2",
            params![path, id],
        )
    }

    /// Remove a study row. Callers must clear the mirrored message first;
    /// see [`crate::sync::MessageSyncer::delete`].
    pub fn delete_study(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn();
        let changed = conn.execute("DELETE FROM studies WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::StudyNotFound(id));
        }
        Ok(())
    }

    fn update_study(
        &self,
        id: i64,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        let changed = conn.execute(sql, args)?;
        if changed == 0 {
            return Err(StoreError::StudyNotFound(id));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Voice jobs
    // ------------------------------------------------------------------

    /// Queue a voice reply for deferred processing.
    ///
    /// Redelivered provider updates (same `update_id`) are dropped without
    /// creating a second job.
    pub fn enqueue_voice_job(
        &self,
        update_id: Option<i64>,
        study_id: i64,
        chat_id: &str,
        reply_message_id: i64,
        file_id: &str,
        process_at: i64,
    ) -> Result<EnqueueOutcome, StoreError> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO pending_voice
                (update_id, study_id, chat_id, reply_message_id, file_id, process_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(update_id) DO NOTHING",
            params![update_id, study_id, chat_id, reply_message_id, file_id, process_at],
        )?;
        if inserted == 0 {
            return Ok(EnqueueOutcome::Duplicate);
        }
        Ok(EnqueueOutcome::Queued(conn.last_insert_rowid()))
    }

    /// Jobs eligible for processing: not done, due, and under the retry
    /// ceiling. Oldest first, bounded by `limit`.
    pub fn due_voice_jobs(
        &self,
        now: i64,
        limit: u32,
        max_attempts: u32,
    ) -> Result<Vec<PendingVoiceJob>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, update_id, study_id, chat_id, reply_message_id, file_id,
                    process_at, attempts, done
             FROM pending_voice
             WHERE done = 0 AND process_at <= ?1 AND attempts < ?2
             ORDER BY id
             LIMIT ?3",
        )?;
        let jobs = stmt
            .query_map(params![now, max_attempts, limit], row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    pub fn get_voice_job(&self, id: i64) -> Result<PendingVoiceJob, StoreError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, update_id, study_id, chat_id, reply_message_id, file_id,
                    process_at, attempts, done
             FROM pending_voice WHERE id = ?1",
            params![id],
            row_to_job,
        )
        .optional()?
        .ok_or(StoreError::JobNotFound(id))
    }

    /// Record a failed attempt; the job stays pending.
    pub fn record_job_attempt(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE pending_voice SET attempts = attempts + 1 WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(StoreError::JobNotFound(id));
        }
        Ok(())
    }

    pub fn mark_job_done(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE pending_voice SET done = 1 WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(StoreError::JobNotFound(id));
        }
        Ok(())
    }

    /// Counts per queue state, for operational tooling.
    pub fn voice_queue_counts(&self) -> Result<(u32, u32), StoreError> {
        let conn = self.conn();
        let (pending, done) = conn.query_row(
            "SELECT
                SUM(CASE WHEN done = 0 THEN 1 ELSE 0 END),
                SUM(CASE WHEN done = 1 THEN 1 ELSE 0 END)
             FROM pending_voice",
            [],
            |row| {
                Ok((
                    row.get::<_, Option<u32>>(0)?.unwrap_or(0),
                    row.get::<_, Option<u32>>(1)?.unwrap_or(0),
                ))
            },
        )?;
        Ok((pending, done))
    }
}

fn row_to_detail(row: &Row<'_>) -> rusqlite::Result<StudyDetail> {
    Ok(StudyDetail {
        id: row.get("id")?,
        exam_date: row.get("exam_date")?,
        exam_time: row.get("exam_time")?,
        exam_details: row.get("exam_details")?,
        description: row.get("description")?,
        modality_code: row.get("modality_code")?,
        exam_type_code: row.get("exam_type_code")?,
        patient_code: row.get("patient_code")?,
        patient_firstname: row.get("patient_firstname")?,
        patient_lastname: row.get("patient_lastname")?,
        patient_age: row.get("patient_age")?,
        patient_gender: row.get("patient_gender")?,
        resident_id: row.get("resident_id")?,
        attending_id: row.get("attending_id")?,
        resident_fullname: row.get("resident_fullname")?,
        attending_fullname: row.get("attending_fullname")?,
        resident_checked: row.get::<_, i64>("resident_checked")? != 0,
        attending_checked: row.get::<_, i64>("attending_checked")? != 0,
        chat_id: row.get("chat_id")?,
        message_id: row.get("message_id")?,
        audio_path: row.get("audio_path")?,
        report_path: row.get("report_path")?,
        dicom_url: row.get("dicom_url")?,
    })
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<PendingVoiceJob> {
    Ok(PendingVoiceJob {
        id: row.get("id")?,
        update_id: row.get("update_id")?,
        study_id: row.get("study_id")?,
        chat_id: row.get("chat_id")?,
        reply_message_id: row.get("reply_message_id")?,
        file_id: row.get("file_id")?,
        process_at: row.get("process_at")?,
        attempts: row.get("attempts")?,
        done: row.get::<_, i64>("done")? != 0,
    })
}
