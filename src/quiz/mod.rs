pub mod error;
pub mod report;
pub mod selector;
pub mod session;
pub mod store;
pub mod tracker;
pub mod word_bank;

pub use error::{MalformedItem, MalformedReason, QuizError};

/// One multiple-choice vocabulary question.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuizItem {
    /// The headword, unique within a word bank.
    pub id: String,
    pub prompt_text: String,
    pub choices: Vec<String>,
    pub correct_choice: String,
    pub gloss_text: Option<String>,
    pub translation_text: Option<String>,
}

impl QuizItem {
    pub fn new(
        id: impl Into<String>,
        prompt_text: impl Into<String>,
        choices: Vec<String>,
        correct_choice: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            prompt_text: prompt_text.into(),
            choices,
            correct_choice: correct_choice.into(),
            gloss_text: None,
            translation_text: None,
        }
    }

    pub fn is_correct(&self, choice: &str) -> bool {
        self.correct_choice == choice
    }

    /// Choices that appear more than once, each reported once.
    pub fn duplicate_choices(&self) -> Vec<&str> {
        let mut duplicates: Vec<&str> = Vec::new();
        for (i, choice) in self.choices.iter().enumerate() {
            if self.choices[..i].contains(choice) && !duplicates.contains(&choice.as_str()) {
                duplicates.push(choice);
            }
        }
        duplicates
    }
}
