use std::collections::HashSet;

use crate::quiz::session::Session;
use crate::quiz::tracker::UserWordAccuracy;
use crate::quiz::{QuizError, QuizItem};

/// Telegram refuses messages longer than this many characters.
pub const MESSAGE_LIMIT: usize = 4096;
/// Missed words listed in the end-of-quiz message; the rest are only counted.
pub const MISSED_LIST_LIMIT: usize = 20;
/// Rows shown in the all-learners overview.
pub const OVERVIEW_LIMIT: usize = 40;
const LINE_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub score: usize,
    pub total: usize,
    /// In quiz order; an item drawn twice and missed twice appears twice.
    pub missed_items: Vec<QuizItem>,
}

pub fn summarize(session: &Session) -> Result<Summary, QuizError> {
    if !session.is_finished() {
        return Err(QuizError::SessionNotFinished {
            answered: session.answers().len(),
            total: session.items().len(),
        });
    }

    let mut score = 0;
    let mut missed_items = Vec::new();
    for (item, answer) in session.items().iter().zip(session.answers()) {
        if answer.is_correct {
            score += 1;
        } else {
            missed_items.push(item.clone());
        }
    }

    Ok(Summary {
        score,
        total: session.items().len(),
        missed_items,
    })
}

pub fn to_review_request(summary: &Summary) -> Vec<QuizItem> {
    summary.missed_items.clone()
}

fn clip(line: String) -> String {
    if line.chars().count() <= LINE_LIMIT {
        return line;
    }
    let mut clipped: String = line.chars().take(LINE_LIMIT - 3).collect();
    clipped.push_str("...");
    clipped
}

/// End-of-quiz message. Each missed word is listed once, at most
/// [`MISSED_LIST_LIMIT`] of them, so the text always fits one message.
pub fn summary_text(summary: &Summary) -> String {
    let mut text = format!(
        "Quiz finished! You answered {} of {} questions correctly.",
        summary.score, summary.total
    );

    let mut seen = HashSet::new();
    let unique: Vec<&QuizItem> = summary
        .missed_items
        .iter()
        .filter(|item| seen.insert(item.id.as_str()))
        .collect();

    if unique.is_empty() {
        text.push_str("\nAll correct, nothing to review!");
    } else {
        text.push_str("\n\nWords to review:");
        for item in unique.iter().take(MISSED_LIST_LIMIT) {
            text.push('\n');
            text.push_str(&clip(format!("{}: {}", item.id, item.correct_choice)));
        }
        if unique.len() > MISSED_LIST_LIMIT {
            text.push_str(&format!("\n...and {} more", unique.len() - MISSED_LIST_LIMIT));
        }
    }
    text.push_str("\n\nWhat would you like to do next?");
    text
}

/// Admin view of every learner's accuracy, one line per user and word.
pub fn overview_text(rows: &[UserWordAccuracy]) -> String {
    if rows.is_empty() {
        return "No answers recorded yet.".to_string();
    }

    let mut text = String::from("Accuracy by learner, weakest words first:");
    for row in rows.iter().take(OVERVIEW_LIMIT) {
        text.push('\n');
        text.push_str(&clip(format!(
            "{} / {}: {}/{} ({:.0}%)",
            row.user_id,
            row.item_id,
            row.stat.corrects,
            row.stat.attempts,
            row.stat.accuracy().unwrap_or(0.0) * 100.0
        )));
    }
    if rows.len() > OVERVIEW_LIMIT {
        text.push_str(&format!("\n...and {} more rows", rows.len() - OVERVIEW_LIMIT));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::selector::{select_normal, select_review};
    use crate::quiz::test_support::{item, wrong_choice};
    use crate::quiz::tracker::{AccuracyStat, AccuracyTracker};
    use crate::quiz::word_bank::WordBank;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const WORDS: &str = "\
id,prompt_text,choices,correct_choice
A,First ____.,x|p|q,x
B,Second ____.,y|r|s,y
C,Third ____.,z|t|u,z
";

    #[test]
    fn scores_a_finished_session() {
        let (bank, _) = WordBank::load(WORDS.as_bytes()).unwrap();
        let mut rng = StdRng::seed_from_u64(21);
        let items = select_normal(&bank, 3, &mut rng);
        let mut session = Session::start_with_rng(items, &mut rng).unwrap();
        let mut tracker = AccuracyTracker::in_memory("u");

        while !session.is_finished() {
            let item = session.current_item().unwrap().clone();
            let choice = if item.id == "B" {
                wrong_choice(&item)
            } else {
                item.correct_choice.clone()
            };
            session.submit_answer(&choice, &mut tracker).unwrap();
            session.advance().unwrap();
        }

        let summary = summarize(&session).unwrap();
        assert_eq!(summary.score, 2);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.missed_items, vec![bank.get("B").unwrap().clone()]);
        assert_eq!(summary.score + summary.missed_items.len(), summary.total);

        let review = select_review(&to_review_request(&summary), 5, &mut rng);
        assert_eq!(review, summary.missed_items);
    }

    #[test]
    fn repeated_misses_are_kept() {
        let (bank, _) = WordBank::load(WORDS.as_bytes()).unwrap();
        let b = bank.get("B").unwrap().clone();
        let mut session =
            Session::start_with_rng(vec![b.clone(), b.clone()], &mut StdRng::seed_from_u64(3))
                .unwrap();
        let mut tracker = AccuracyTracker::in_memory("u");
        for _ in 0..2 {
            session.submit_answer("r", &mut tracker).unwrap();
            session.advance().unwrap();
        }

        let summary = summarize(&session).unwrap();
        assert_eq!(summary.score, 0);
        assert_eq!(summary.missed_items, vec![b.clone(), b]);
        assert_eq!(tracker.stat_for("B").attempts, 2);
    }

    #[test]
    fn unfinished_sessions_cannot_be_summarized() {
        let (bank, _) = WordBank::load(WORDS.as_bytes()).unwrap();
        let session = Session::start(bank.items().to_vec()).unwrap();
        assert!(matches!(
            summarize(&session),
            Err(QuizError::SessionNotFinished { answered: 0, total: 3 })
        ));
    }

    #[test]
    fn summary_text_lists_each_missed_word_once() {
        let b = item("B", "y");
        let summary = Summary {
            score: 1,
            total: 3,
            missed_items: vec![b.clone(), b],
        };
        let text = summary_text(&summary);
        assert!(text.starts_with("Quiz finished! You answered 1 of 3"));
        assert_eq!(text.matches("B: y").count(), 1);
        assert!(!text.contains("more"));
    }

    #[test]
    fn summary_text_fits_one_message_for_long_quizzes() {
        let long_answer = "x".repeat(3000);
        let missed_items: Vec<_> = (0..500)
            .map(|i| item(&format!("word-{}", i), &long_answer))
            .collect();
        let summary = Summary {
            score: 0,
            total: missed_items.len(),
            missed_items,
        };

        let text = summary_text(&summary);
        assert!(text.chars().count() < MESSAGE_LIMIT, "{} chars", text.chars().count());
        assert!(text.contains("word-19: "));
        assert!(!text.contains("word-20: "));
        assert!(text.contains("...and 480 more"));
    }

    #[test]
    fn overview_text_is_capped() {
        let rows: Vec<_> = (0..100)
            .map(|i| UserWordAccuracy {
                user_id: format!("user-{}", i),
                item_id: "run".to_string(),
                stat: AccuracyStat { attempts: 4, corrects: 1 },
            })
            .collect();

        let text = overview_text(&rows);
        assert!(text.contains("user-0 / run: 1/4 (25%)"));
        assert!(text.ends_with("...and 60 more rows"));
        assert!(text.chars().count() < MESSAGE_LIMIT);
        assert_eq!(overview_text(&[]), "No answers recorded yet.");
    }
}
