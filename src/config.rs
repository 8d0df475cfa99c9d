use std::path::PathBuf;
use std::sync::Arc;

use crate::quiz::selector::{DEFAULT_QUESTION_COUNT, MAX_QUESTION_COUNT};
use crate::quiz::store::{AttemptStore, JsonLinesStore, SqliteStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryBackend {
    Memory,
    Json,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub words_path: PathBuf,
    pub dialogue_db: String,
    pub history: HistoryBackend,
    pub history_path: PathBuf,
    pub default_questions: usize,
    /// Chat allowed to use `/overview`; unset means nobody.
    pub admin_chat_id: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("QUIZ_HISTORY must be one of memory, json, sqlite (got '{0}')")]
    UnknownHistoryBackend(String),
    #[error("QUIZ_DEFAULT_QUESTIONS must be a number from 1 to 50 (got '{0}')")]
    InvalidQuestionCount(String),
    #[error("QUIZ_ADMIN_CHAT_ID must be a Telegram chat id (got '{0}')")]
    InvalidAdminChatId(String),
    #[error("could not open the answer history")]
    Store(#[from] StoreError),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let history = match lookup("QUIZ_HISTORY").as_deref() {
            None | Some("json") => HistoryBackend::Json,
            Some("sqlite") => HistoryBackend::Sqlite,
            Some("memory") => HistoryBackend::Memory,
            Some(other) => return Err(ConfigError::UnknownHistoryBackend(other.to_string())),
        };

        let history_path = lookup("QUIZ_HISTORY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| match history {
                HistoryBackend::Sqlite => PathBuf::from("history.sqlite"),
                HistoryBackend::Json | HistoryBackend::Memory => PathBuf::from("user_history"),
            });

        let default_questions = match lookup("QUIZ_DEFAULT_QUESTIONS") {
            None => DEFAULT_QUESTION_COUNT,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if (1..=MAX_QUESTION_COUNT).contains(&n) => n,
                _ => return Err(ConfigError::InvalidQuestionCount(raw)),
            },
        };

        let admin_chat_id = match lookup("QUIZ_ADMIN_CHAT_ID") {
            None => None,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => return Err(ConfigError::InvalidAdminChatId(raw)),
            },
        };

        Ok(Self {
            words_path: lookup("QUIZ_WORDS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("words.csv")),
            dialogue_db: lookup("QUIZ_DIALOGUE_DB").unwrap_or_else(|| "db.sqlite".to_string()),
            history,
            history_path,
            default_questions,
            admin_chat_id,
        })
    }

    pub fn open_history(&self) -> Result<Option<Arc<dyn AttemptStore>>, ConfigError> {
        let store: Arc<dyn AttemptStore> = match self.history {
            HistoryBackend::Memory => return Ok(None),
            HistoryBackend::Json => Arc::new(JsonLinesStore::open(&self.history_path)?),
            HistoryBackend::Sqlite => Arc::new(SqliteStore::open(&self.history_path)?),
        };
        Ok(Some(store))
    }
}
