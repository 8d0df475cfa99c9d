//! Answer history persistence.
//!
//! The tracker talks to history through [`AttemptStore`]; which backend sits
//! behind it is picked once at startup from the configuration.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::quiz::tracker::AttemptRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid user id '{0}'")]
    InvalidUserId(String),
}

pub trait AttemptStore: Send + Sync {
    fn append_attempt(&self, user_id: &str, record: &AttemptRecord) -> Result<(), StoreError>;
    fn load_attempts(&self, user_id: &str) -> Result<Vec<AttemptRecord>, StoreError>;
    /// Every user with at least one stored attempt, sorted.
    fn user_ids(&self) -> Result<Vec<String>, StoreError>;
}

/// One `<user>.jsonl` file per user, one record per line.
pub struct JsonLinesStore {
    dir: PathBuf,
}

impl JsonLinesStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, user_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !user_id.is_empty()
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidUserId(user_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.jsonl", user_id)))
    }
}

impl AttemptStore for JsonLinesStore {
    fn append_attempt(&self, user_id: &str, record: &AttemptRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        // A single write on an O_APPEND file, so concurrent appends never interleave within a line.
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(user_id)?)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn load_attempts(&self, user_id: &str) -> Result<Vec<AttemptRecord>, StoreError> {
        let path = self.path_for(user_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            // A crash mid-append can leave one broken line; the rest of the history is still good.
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(err) => log::warn!(
                    "Skipping unreadable line {} of {}: {}",
                    i + 1,
                    path.display(),
                    err
                ),
            }
        }
        Ok(records)
    }

    fn user_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut users = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            if let Some(user) = path.file_stem().and_then(|s| s.to_str()) {
                users.push(user.to_string());
            }
        }
        users.sort();
        Ok(users)
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                selected_choice TEXT NOT NULL,
                is_correct INTEGER NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_attempts_user ON attempts(user_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AttemptStore for SqliteStore {
    fn append_attempt(&self, user_id: &str, record: &AttemptRecord) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO attempts (user_id, item_id, selected_choice, is_correct, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                record.item_id,
                record.selected_choice,
                record.is_correct,
                record.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn load_attempts(&self, user_id: &str) -> Result<Vec<AttemptRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT item_id, selected_choice, is_correct, timestamp
             FROM attempts WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let timestamp: String = row.get(3)?;
            let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp)
                .map(|t| t.with_timezone(&chrono::Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
            Ok(AttemptRecord {
                item_id: row.get(0)?,
                selected_choice: row.get(1)?,
                is_correct: row.get(2)?,
                timestamp,
            })
        })?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }

    fn user_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT DISTINCT user_id FROM attempts ORDER BY user_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut users = Vec::new();
        for user in rows {
            users.push(user?);
        }
        Ok(users)
    }
}
