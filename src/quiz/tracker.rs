use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::quiz::store::{AttemptStore, StoreError};
use crate::quiz::QuizError;

/// Items answered perfectly keep this much sampling weight, so they still resurface now and then.
pub const FLOOR_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AttemptRecord {
    pub item_id: String,
    pub selected_choice: String,
    pub is_correct: bool,
    pub timestamp: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn new(item_id: impl Into<String>, selected_choice: impl Into<String>, is_correct: bool) -> Self {
        Self {
            item_id: item_id.into(),
            selected_choice: selected_choice.into(),
            is_correct,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccuracyStat {
    pub attempts: u32,
    pub corrects: u32,
}

impl AccuracyStat {
    /// `None` when the item was never attempted.
    pub fn accuracy(&self) -> Option<f64> {
        if self.attempts == 0 {
            return None;
        }
        Some(self.corrects as f64 / self.attempts as f64)
    }
}

/// Per-user answer history and the accuracy derived from it.
pub struct AccuracyTracker {
    user_id: String,
    history: Vec<AttemptRecord>,
    stats: HashMap<String, AccuracyStat>,
    store: Option<Arc<dyn AttemptStore>>,
}

impl AccuracyTracker {
    /// A tracker that only remembers answers for the life of the process.
    pub fn in_memory(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            history: Vec::new(),
            stats: HashMap::new(),
            store: None,
        }
    }

    /// Rebuilds the tracker from the user's stored history. If the store can't be
    /// read the tracker starts empty but still tries to append new attempts.
    pub fn load(user_id: impl Into<String>, store: Arc<dyn AttemptStore>) -> Self {
        let mut tracker = Self::in_memory(user_id);
        match store.load_attempts(&tracker.user_id) {
            Ok(records) => {
                log::debug!(
                    "Loaded {} past attempts for user {}",
                    records.len(),
                    tracker.user_id
                );
                for record in records {
                    tracker.apply(record);
                }
            }
            Err(err) => {
                log::warn!(
                    "Could not load answer history for user {}, starting empty: {}",
                    tracker.user_id,
                    err
                );
            }
        }
        tracker.store = Some(store);
        tracker
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn apply(&mut self, record: AttemptRecord) {
        let stat = self.stats.entry(record.item_id.clone()).or_default();
        stat.attempts += 1;
        if record.is_correct {
            stat.corrects += 1;
        }
        self.history.push(record);
    }

    /// Counts the attempt in memory first; a failing store is reported but the
    /// attempt stays counted.
    pub fn record(
        &mut self,
        item_id: &str,
        selected_choice: &str,
        is_correct: bool,
    ) -> Result<(), QuizError> {
        let record = AttemptRecord::new(item_id, selected_choice, is_correct);
        let persisted = match &self.store {
            Some(store) => store.append_attempt(&self.user_id, &record),
            None => Ok(()),
        };
        self.apply(record);
        persisted.map_err(QuizError::PersistenceUnavailable)
    }

    pub fn stat_for(&self, item_id: &str) -> AccuracyStat {
        self.stats.get(item_id).copied().unwrap_or_default()
    }

    pub fn weight(&self, item_id: &str) -> f64 {
        match self.stat_for(item_id).accuracy() {
            None => 1.0,
            Some(accuracy) => (1.0 - accuracy).max(FLOOR_WEIGHT),
        }
    }

    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn history(&self) -> &[AttemptRecord] {
        &self.history
    }

    /// Every attempted item, weakest first; ties go by id.
    pub fn accuracy_table(&self) -> Vec<(String, AccuracyStat)> {
        let mut table: Vec<(String, AccuracyStat)> = self
            .stats
            .iter()
            .map(|(id, stat)| (id.clone(), *stat))
            .collect();
        table.sort_by(|(a_id, a), (b_id, b)| {
            let a_acc = a.accuracy().unwrap_or(0.0);
            let b_acc = b.accuracy().unwrap_or(0.0);
            a_acc.total_cmp(&b_acc).then_with(|| a_id.cmp(b_id))
        });
        table
    }
}

/// One row of the all-learners overview.
#[derive(Debug, Clone, PartialEq)]
pub struct UserWordAccuracy {
    pub user_id: String,
    pub item_id: String,
    pub stat: AccuracyStat,
}

/// Accuracy per user and word straight from the store, users in order and each
/// user's words weakest first. `only_user` narrows it to one learner.
pub fn accuracy_by_user(
    store: &dyn AttemptStore,
    only_user: Option<&str>,
) -> Result<Vec<UserWordAccuracy>, StoreError> {
    let users = match only_user {
        Some(user) => vec![user.to_string()],
        None => store.user_ids()?,
    };

    let mut rows = Vec::new();
    for user_id in users {
        let mut tracker = AccuracyTracker::in_memory(user_id.clone());
        for record in store.load_attempts(&user_id)? {
            tracker.apply(record);
        }
        rows.extend(
            tracker
                .accuracy_table()
                .into_iter()
                .map(|(item_id, stat)| UserWordAccuracy {
                    user_id: user_id.clone(),
                    item_id,
                    stat,
                }),
        );
    }
    Ok(rows)
}

/// Trackers for every user seen so far. One lock serializes all history writes.
pub struct Trackers {
    store: Option<Arc<dyn AttemptStore>>,
    by_user: Mutex<HashMap<String, AccuracyTracker>>,
}

impl Trackers {
    pub fn new(store: Option<Arc<dyn AttemptStore>>) -> Self {
        Self {
            store,
            by_user: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Option<&Arc<dyn AttemptStore>> {
        self.store.as_ref()
    }

    /// Runs `f` on the user's tracker, loading it from the store on first use.
    pub fn with_user<T>(&self, user_id: &str, f: impl FnOnce(&mut AccuracyTracker) -> T) -> T {
        let mut by_user = self
            .by_user
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let tracker = by_user
            .entry(user_id.to_string())
            .or_insert_with(|| match &self.store {
                Some(store) => AccuracyTracker::load(user_id, store.clone()),
                None => AccuracyTracker::in_memory(user_id),
            });
        f(tracker)
    }
}
