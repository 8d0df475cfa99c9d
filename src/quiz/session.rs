use rand::seq::SliceRandom;
use rand::Rng;

use crate::quiz::tracker::AccuracyTracker;
use crate::quiz::{QuizError, QuizItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SessionState {
    AwaitingAnswer,
    Answered,
    Finished,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnswerRecord {
    pub item_id: String,
    pub selected_choice: String,
    pub is_correct: bool,
}

/// What the learner sees right after answering.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub correct_choice: String,
    /// `false` when the answer could not be written to the history store.
    pub persisted: bool,
}

/// One quiz run. Choices are shuffled once at start and stay put until the end.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Session {
    items: Vec<QuizItem>,
    shuffled_choices: Vec<Vec<String>>,
    current_index: usize,
    answers: Vec<AnswerRecord>,
    state: SessionState,
}

impl Session {
    pub fn start(items: Vec<QuizItem>) -> Result<Self, QuizError> {
        Self::start_with_rng(items, &mut rand::thread_rng())
    }

    pub fn start_with_rng<R: Rng + ?Sized>(
        items: Vec<QuizItem>,
        rng: &mut R,
    ) -> Result<Self, QuizError> {
        if items.is_empty() {
            return Err(QuizError::EmptyQuiz);
        }

        // Source lists often put the answer in a fixed slot, so every position gets its own permutation.
        let shuffled_choices = items
            .iter()
            .map(|item| {
                let mut choices = item.choices.clone();
                choices.shuffle(rng);
                choices
            })
            .collect();

        Ok(Self {
            items,
            shuffled_choices,
            current_index: 0,
            answers: Vec::new(),
            state: SessionState::AwaitingAnswer,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }

    /// `(current_index, total)`.
    pub fn progress(&self) -> (usize, usize) {
        (self.current_index, self.items.len())
    }

    pub fn items(&self) -> &[QuizItem] {
        &self.items
    }

    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    pub fn current_item(&self) -> Result<&QuizItem, QuizError> {
        if self.is_finished() {
            return Err(QuizError::SessionFinished);
        }
        self.items
            .get(self.current_index)
            .ok_or(QuizError::SessionFinished)
    }

    pub fn current_choices(&self) -> Result<&[String], QuizError> {
        if self.is_finished() {
            return Err(QuizError::SessionFinished);
        }
        self.shuffled_choices
            .get(self.current_index)
            .map(Vec::as_slice)
            .ok_or(QuizError::SessionFinished)
    }

    pub fn submit_answer(
        &mut self,
        choice: &str,
        tracker: &mut AccuracyTracker,
    ) -> Result<AnswerOutcome, QuizError> {
        match self.state {
            SessionState::Finished => return Err(QuizError::SessionFinished),
            SessionState::Answered => {
                return Err(QuizError::AlreadyAnswered {
                    index: self.current_index,
                })
            }
            SessionState::AwaitingAnswer => {}
        }

        let item = self
            .items
            .get(self.current_index)
            .ok_or(QuizError::SessionFinished)?;
        if !item.choices.iter().any(|c| c == choice) {
            return Err(QuizError::UnknownChoice(choice.to_string()));
        }

        let is_correct = item.is_correct(choice);
        self.answers.push(AnswerRecord {
            item_id: item.id.clone(),
            selected_choice: choice.to_string(),
            is_correct,
        });
        self.state = SessionState::Answered;

        let persisted = match tracker.record(&item.id, choice, is_correct) {
            Ok(()) => true,
            Err(err) => {
                log::warn!(
                    "Answer to '{}' kept in session only: {}",
                    item.id,
                    err
                );
                false
            }
        };

        Ok(AnswerOutcome {
            is_correct,
            correct_choice: item.correct_choice.clone(),
            persisted,
        })
    }

    /// Moves past an answered question; returns the state the session ends up in.
    pub fn advance(&mut self) -> Result<SessionState, QuizError> {
        match self.state {
            SessionState::Finished => return Err(QuizError::SessionFinished),
            SessionState::AwaitingAnswer => {
                return Err(QuizError::NotAnswered {
                    index: self.current_index,
                })
            }
            SessionState::Answered => {}
        }

        self.current_index += 1;
        self.state = if self.current_index >= self.items.len() {
            SessionState::Finished
        } else {
            SessionState::AwaitingAnswer
        };
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::test_support::{item, wrong_choice};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn session(ids: &[&str]) -> Session {
        let items = ids.iter().map(|id| item(id, &format!("{}-ok", id))).collect();
        Session::start_with_rng(items, &mut StdRng::seed_from_u64(11)).unwrap()
    }

    #[test]
    fn empty_quiz_is_rejected() {
        assert!(matches!(Session::start(Vec::new()), Err(QuizError::EmptyQuiz)));
    }

    #[test]
    fn starts_at_the_first_question() {
        let session = session(&["a", "b"]);
        assert_eq!(session.state(), SessionState::AwaitingAnswer);
        assert_eq!(session.progress(), (0, 2));
        assert_eq!(session.current_item().unwrap().id, "a");
        assert!(session.answers().is_empty());
    }

    #[test]
    fn shuffled_choices_are_a_stable_permutation() {
        let mut session = session(&["a", "b", "c"]);
        let mut tracker = AccuracyTracker::in_memory("u");

        for i in 0..3 {
            let before = session.current_choices().unwrap().to_vec();
            let mut sorted = before.clone();
            sorted.sort();
            let mut original = session.items()[i].choices.clone();
            original.sort();
            assert_eq!(sorted, original);

            let choice = before[0].clone();
            session.submit_answer(&choice, &mut tracker).unwrap();
            assert_eq!(session.current_choices().unwrap(), before.as_slice());
            session.advance().unwrap();
        }
    }

    #[test]
    fn advance_requires_an_answer() {
        let mut session = session(&["a", "b"]);
        let mut tracker = AccuracyTracker::in_memory("u");

        assert!(matches!(session.advance(), Err(QuizError::NotAnswered { index: 0 })));
        assert_eq!(session.progress(), (0, 2));

        session.submit_answer("a-ok", &mut tracker).unwrap();
        assert_eq!(session.advance().unwrap(), SessionState::AwaitingAnswer);
        assert_eq!(session.progress(), (1, 2));
    }

    #[test]
    fn second_answer_is_rejected_without_double_counting() {
        let mut session = session(&["a"]);
        let mut tracker = AccuracyTracker::in_memory("u");

        let outcome = session.submit_answer("a-ok", &mut tracker).unwrap();
        assert!(outcome.is_correct);
        assert!(outcome.persisted);

        let wrong = wrong_choice(&session.items()[0]);
        assert!(matches!(
            session.submit_answer(&wrong, &mut tracker),
            Err(QuizError::AlreadyAnswered { index: 0 })
        ));
        assert_eq!(session.answers().len(), 1);
        assert_eq!(tracker.stat_for("a").attempts, 1);
    }

    #[test]
    fn unknown_choices_are_not_recorded() {
        let mut session = session(&["a"]);
        let mut tracker = AccuracyTracker::in_memory("u");

        assert!(matches!(
            session.submit_answer("banana", &mut tracker),
            Err(QuizError::UnknownChoice(_))
        ));
        assert_eq!(session.state(), SessionState::AwaitingAnswer);
        assert!(session.answers().is_empty());
        assert!(!tracker.has_history());
    }

    #[test]
    fn finishes_after_exactly_n_advances() {
        let mut session = session(&["a", "b", "c"]);
        let mut tracker = AccuracyTracker::in_memory("u");

        for i in 0..3 {
            assert!(!session.is_finished());
            let wrong = wrong_choice(session.current_item().unwrap());
            let outcome = session.submit_answer(&wrong, &mut tracker).unwrap();
            assert!(!outcome.is_correct);
            let state = session.advance().unwrap();
            assert_eq!(state == SessionState::Finished, i == 2);
        }

        assert!(session.is_finished());
        assert_eq!(session.progress(), (3, 3));
        assert!(matches!(session.current_item(), Err(QuizError::SessionFinished)));
        assert!(matches!(session.advance(), Err(QuizError::SessionFinished)));
        assert!(matches!(
            session.submit_answer("a-ok", &mut tracker),
            Err(QuizError::SessionFinished)
        ));
        assert_eq!(tracker.stat_for("b").attempts, 1);
    }

    #[test]
    fn inconsistent_stored_session_errors_instead_of_panicking() {
        let json = r#"{
            "items": [],
            "shuffled_choices": [],
            "current_index": 3,
            "answers": [],
            "state": "AwaitingAnswer"
        }"#;
        let mut session: Session = serde_json::from_str(json).unwrap();
        let mut tracker = AccuracyTracker::in_memory("u");

        assert!(matches!(session.current_item(), Err(QuizError::SessionFinished)));
        assert!(matches!(session.current_choices(), Err(QuizError::SessionFinished)));
        assert!(matches!(
            session.submit_answer("anything", &mut tracker),
            Err(QuizError::SessionFinished)
        ));
        assert!(!tracker.has_history());
    }

    #[test]
    fn session_survives_serialization() {
        let mut session = session(&["a", "b"]);
        let mut tracker = AccuracyTracker::in_memory("u");
        session.submit_answer("a-ok", &mut tracker).unwrap();

        let json = serde_json::to_string(&session).unwrap();
        let restored: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.state(), SessionState::Answered);
        assert_eq!(restored.current_choices().unwrap(), session.current_choices().unwrap());
        assert_eq!(restored.answers(), session.answers());
    }
}
