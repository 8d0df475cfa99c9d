use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::quiz::{MalformedItem, MalformedReason, QuizError, QuizItem};

pub const CHOICE_SEPARATOR: char = '|';
pub const MIN_CHOICES: usize = 2;
pub const MAX_CHOICES: usize = 5;

/// All quiz items loaded from the word list, in source order.
#[derive(Debug, Clone, Default)]
pub struct WordBank {
    items: Vec<QuizItem>,
    index_by_id: HashMap<String, usize>,
}

/// What the loader had to skip or flag while building a [`WordBank`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub skipped: Vec<MalformedItem>,
    /// Rows kept despite repeating a choice: (row, id, repeated choice).
    pub duplicate_choices: Vec<(usize, String, String)>,
}

/// One CSV row as written. Both the canonical headers and the ones used by the
/// older word lists (`word`, `sentence_with_blank`, `answer`, ...) are accepted.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RawRow {
    #[serde(alias = "word")]
    id: Option<String>,
    #[serde(alias = "sentence_with_blank")]
    prompt_text: Option<String>,
    choices: Option<String>,
    #[serde(alias = "answer", alias = "correct")]
    correct_choice: Option<String>,
    #[serde(alias = "meaning_jp")]
    gloss_text: Option<String>,
    #[serde(alias = "sentence_jp")]
    translation_text: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, field: &'static str) -> Result<String, MalformedReason> {
    non_blank(value).ok_or(MalformedReason::MissingField(field))
}

impl RawRow {
    fn into_item(self) -> Result<QuizItem, MalformedReason> {
        let id = required(self.id, "id")?;
        let prompt_text = required(self.prompt_text, "prompt_text")?;
        let choices = required(self.choices, "choices")?
            .split(CHOICE_SEPARATOR)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>();
        let correct_choice = required(self.correct_choice, "correct_choice")?;

        if choices.len() < MIN_CHOICES {
            return Err(MalformedReason::TooFewChoices(choices.len()));
        }
        if choices.len() > MAX_CHOICES {
            return Err(MalformedReason::TooManyChoices(choices.len()));
        }
        if !choices.contains(&correct_choice) {
            return Err(MalformedReason::CorrectChoiceNotInChoices(correct_choice));
        }

        Ok(QuizItem {
            id,
            prompt_text,
            choices,
            correct_choice,
            gloss_text: non_blank(self.gloss_text),
            translation_text: non_blank(self.translation_text),
        })
    }
}

impl WordBank {
    /// Reads a word list from a CSV file with a header row.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, LoadReport), QuizError> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(QuizError::Source)?;
        Self::from_csv(reader)
    }

    pub fn load<R: Read>(source: R) -> Result<(Self, LoadReport), QuizError> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self::from_csv(reader)
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<(Self, LoadReport), QuizError> {
        let mut bank = WordBank::default();
        let mut report = LoadReport::default();

        for (i, row) in reader.deserialize::<RawRow>().enumerate() {
            let row_number = i + 1;
            let parsed = row
                .map_err(|e| MalformedReason::Unreadable(e.to_string()))
                .and_then(RawRow::into_item)
                .and_then(|item| {
                    if bank.index_by_id.contains_key(&item.id) {
                        Err(MalformedReason::DuplicateId(item.id))
                    } else {
                        Ok(item)
                    }
                });

            match parsed {
                Ok(item) => {
                    for duplicate in item.duplicate_choices() {
                        log::warn!(
                            "Row {}: item '{}' repeats the choice '{}'",
                            row_number,
                            item.id,
                            duplicate
                        );
                        report.duplicate_choices.push((
                            row_number,
                            item.id.clone(),
                            duplicate.to_string(),
                        ));
                    }
                    bank.index_by_id.insert(item.id.clone(), bank.items.len());
                    bank.items.push(item);
                }
                Err(reason) => {
                    let malformed = MalformedItem {
                        row: row_number,
                        reason,
                    };
                    log::warn!("Skipping word list {}", malformed);
                    report.skipped.push(malformed);
                }
            }
        }

        if bank.items.is_empty() {
            return Err(QuizError::EmptyWordBank {
                malformed: report.skipped.len(),
            });
        }

        log::debug!(
            "Word bank loaded: {} items, {} rows skipped",
            bank.items.len(),
            report.skipped.len()
        );
        Ok((bank, report))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[QuizItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&QuizItem> {
        self.index_by_id.get(id).map(|&i| &self.items[i])
    }

    /// `n` distinct items picked uniformly at random. When the bank is smaller than
    /// `n` and `with_replacement` is set, makes `n` independent draws instead.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        n: usize,
        with_replacement: bool,
        rng: &mut R,
    ) -> Result<Vec<QuizItem>, QuizError> {
        if n <= self.items.len() {
            return Ok(self.items.choose_multiple(rng, n).cloned().collect());
        }
        if !with_replacement || self.items.is_empty() {
            return Err(QuizError::InsufficientItems {
                requested: n,
                available: self.items.len(),
            });
        }
        Ok((0..n)
            .map(|_| self.items[rng.gen_range(0..self.items.len())].clone())
            .collect())
    }
}
