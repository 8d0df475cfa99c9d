use crate::quiz::store::StoreError;

/// Why a word list row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedReason {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("correct choice '{0}' is not one of the choices")]
    CorrectChoiceNotInChoices(String),
    #[error("expected at least 2 choices, found {0}")]
    TooFewChoices(usize),
    #[error("expected at most 5 choices, found {0}")]
    TooManyChoices(usize),
    #[error("id '{0}' was already used by an earlier row")]
    DuplicateId(String),
    #[error("row could not be read: {0}")]
    Unreadable(String),
}

/// A rejected row of the word list. `row` counts data rows from 1, header excluded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("row {row}: {reason}")]
pub struct MalformedItem {
    pub row: usize,
    pub reason: MalformedReason,
}

#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error("malformed item: {0}")]
    MalformedItem(#[from] MalformedItem),

    #[error("word list has no usable items ({malformed} malformed rows)")]
    EmptyWordBank { malformed: usize },

    #[error("requested {requested} items but only {available} are available")]
    InsufficientItems { requested: usize, available: usize },

    #[error("cannot start a quiz without questions")]
    EmptyQuiz,

    #[error("question {index} was already answered")]
    AlreadyAnswered { index: usize },

    #[error("question {index} has not been answered yet")]
    NotAnswered { index: usize },

    #[error("the session is already finished")]
    SessionFinished,

    #[error("the session is not finished yet ({answered} of {total} answered)")]
    SessionNotFinished { answered: usize, total: usize },

    #[error("'{0}' is not one of the offered choices")]
    UnknownChoice(String),

    #[error("answer history could not be saved")]
    PersistenceUnavailable(#[source] StoreError),

    #[error("word list could not be read")]
    Source(#[source] csv::Error),
}
