use std::sync::Arc;

use dotenv::dotenv;
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup},
};
use vocab_quiz_bot::config::Config;
use vocab_quiz_bot::quiz::{
    report,
    selector::{self, SelectionMode, MAX_QUESTION_COUNT},
    session::{Session, SessionState},
    tracker::{self, Trackers},
    word_bank::WordBank,
    QuizError,
};

type QuizDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    /// `missed` holds the ids of the words missed in the last finished quiz.
    ReceiveModeChoice {
        missed: Vec<String>,
    },
    ReceiveAmountOfQuestions {
        mode: SelectionMode,
        missed: Vec<String>,
    },
    Quiz {
        session: Session,
    },
}

type UserInfoStorage = std::sync::Arc<ErasedStorage<State>>;

#[tokio::main]
async fn main() {
    let dotenv_result = dotenv();
    pretty_env_logger::init();
    if let Err(err) = dotenv_result {
        log::debug!("No .env file loaded: {}", err);
    }
    log::info!("Starting vocabulary quiz bot...");

    if let Err(err) = run().await {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_env()?;

    log::info!("Loading the word list from {}", config.words_path.display());
    let bank = match WordBank::open(&config.words_path) {
        Ok((bank, report)) => {
            log::info!(
                "Word list loaded: {} items, {} rows skipped, {} items with repeated choices",
                bank.len(),
                report.skipped.len(),
                report.duplicate_choices.len()
            );
            Arc::new(bank)
        }
        Err(err @ QuizError::EmptyWordBank { .. }) => {
            log::error!("No questions available, refusing to start");
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    let trackers = Arc::new(Trackers::new(config.open_history()?));
    log::info!("Answer history kept in {:?} storage", config.history);

    log::info!("Establishing connection to the dialogue database...");
    let storage: UserInfoStorage = SqliteStorage::open(&config.dialogue_db, Json)
        .await?
        .erase();
    log::info!("Connection established");

    let config = Arc::new(config);
    let bot = Bot::from_env();

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(dptree::filter(|msg: Message| msg.text() == Some("/start")).endpoint(start))
            .branch(
                dptree::filter(|msg: Message| {
                    msg.text().map_or(false, |text| text.starts_with("/overview"))
                })
                .endpoint(overview),
            )
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::ReceiveModeChoice { missed }].endpoint(receive_mode_choice))
            .branch(
                dptree::case![State::ReceiveAmountOfQuestions { mode, missed }]
                    .endpoint(receive_amount_of_questions),
            )
            .branch(dptree::case![State::Quiz { session }].endpoint(quiz_step)),
    )
    .dependencies(dptree::deps![storage, bank, trackers, config])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;

    Ok(())
}

const GREETING_TEXT: &str = "Hi! I'm a vocabulary quiz bot. Pick a mode to begin.";

const QUIZ_MODE: &str = "Quiz";
const WEAK_WORDS_MODE: &str = "Weak words";
const REVIEW_MODE: &str = "Review mistakes";
const ACCURACY_VIEW: &str = "My accuracy";
const NEXT_BUTTON: &str = "Next";

const ACCURACY_TABLE_LIMIT: usize = 30;

fn mode_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            KeyboardButton::new(QUIZ_MODE),
            KeyboardButton::new(WEAK_WORDS_MODE),
        ],
        vec![
            KeyboardButton::new(REVIEW_MODE),
            KeyboardButton::new(ACCURACY_VIEW),
        ],
    ])
}

fn user_id(msg: &Message) -> String {
    msg.chat.id.0.to_string()
}

async fn start(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, GREETING_TEXT)
        .reply_markup(mode_keyboard())
        .await?;

    dialogue
        .update(State::ReceiveModeChoice { missed: Vec::new() })
        .await?;
    Ok(())
}

async fn receive_mode_choice(
    bot: Bot,
    dialogue: QuizDialogue,
    missed: Vec<String>,
    trackers: Arc<Trackers>,
    config: Arc<Config>,
    msg: Message,
) -> HandlerResult {
    let mode = match msg.text() {
        Some(QUIZ_MODE) => SelectionMode::Normal,
        Some(WEAK_WORDS_MODE) => SelectionMode::Weighted,
        Some(REVIEW_MODE) => {
            if missed.is_empty() {
                bot.send_message(
                    msg.chat.id,
                    "There is nothing to review yet. Finish a quiz with a mistake first.",
                )
                .reply_markup(mode_keyboard())
                .await?;
                return Ok(());
            }
            SelectionMode::Review
        }
        Some(ACCURACY_VIEW) => {
            let table = trackers.with_user(&user_id(&msg), |tracker| tracker.accuracy_table());
            let text = if table.is_empty() {
                "No history yet. Take a quiz first!".to_string()
            } else {
                let lines = table
                    .iter()
                    .take(ACCURACY_TABLE_LIMIT)
                    .map(|(word, stat)| {
                        format!(
                            "{}: {}/{} ({:.0}%)",
                            word,
                            stat.corrects,
                            stat.attempts,
                            stat.accuracy().unwrap_or(0.0) * 100.0
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("Accuracy per word, weakest first:\n{}", lines)
            };
            bot.send_message(msg.chat.id, text)
                .reply_markup(mode_keyboard())
                .await?;
            return Ok(());
        }
        _ => {
            bot.send_message(msg.chat.id, "Please choose one of the options")
                .reply_markup(mode_keyboard())
                .await?;
            return Ok(());
        }
    };

    let mut counts = vec![5, config.default_questions, 15];
    counts.sort_unstable();
    counts.dedup();
    let keyboard = KeyboardMarkup::new(
        counts
            .iter()
            .map(|n| vec![KeyboardButton::new(n.to_string())])
            .collect::<Vec<_>>(),
    );
    bot.send_message(msg.chat.id, "How many questions?")
        .reply_markup(keyboard)
        .await?;

    dialogue
        .update(State::ReceiveAmountOfQuestions { mode, missed })
        .await?;
    Ok(())
}

async fn receive_amount_of_questions(
    bot: Bot,
    dialogue: QuizDialogue,
    (mode, missed): (SelectionMode, Vec<String>),
    bank: Arc<WordBank>,
    trackers: Arc<Trackers>,
    msg: Message,
) -> HandlerResult {
    let amount = match msg.text().map(|text| text.trim().parse::<usize>()) {
        Some(Ok(0)) => {
            bot.send_message(msg.chat.id, "The number of questions can't be 0")
                .await?;
            return Ok(());
        }
        Some(Ok(amount)) if amount <= MAX_QUESTION_COUNT => amount,
        Some(result) if result.is_ok() || is_overflow(&result) => {
            bot.send_message(
                msg.chat.id,
                format!("Please choose at most {} questions", MAX_QUESTION_COUNT),
            )
            .await?;
            return Ok(());
        }
        _ => {
            bot.send_message(msg.chat.id, "Please enter a number").await?;
            return Ok(());
        }
    };

    let missed_items = missed
        .iter()
        .filter_map(|id| bank.get(id).cloned())
        .collect::<Vec<_>>();
    let items = trackers.with_user(&user_id(&msg), |tracker| {
        selector::select(
            mode,
            &bank,
            tracker,
            &missed_items,
            amount,
            &mut rand::thread_rng(),
        )
    });

    let session = match Session::start(items) {
        Ok(session) => session,
        Err(QuizError::EmptyQuiz) => {
            bot.send_message(msg.chat.id, "No questions available. Pick another mode.")
                .reply_markup(mode_keyboard())
                .await?;
            dialogue.update(State::ReceiveModeChoice { missed }).await?;
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    log::info!(
        "User {} started a {:?} quiz with {} questions",
        user_id(&msg),
        mode,
        session.progress().1
    );
    bot.send_message(msg.chat.id, "Great! Let's begin!").await?;
    send_question(&bot, msg.chat.id, &session).await?;

    dialogue.update(State::Quiz { session }).await?;
    Ok(())
}

fn is_overflow(parsed: &Result<usize, std::num::ParseIntError>) -> bool {
    matches!(parsed, Err(err) if *err.kind() == std::num::IntErrorKind::PosOverflow)
}

async fn send_question(bot: &Bot, chat_id: ChatId, session: &Session) -> HandlerResult {
    let item = session.current_item()?;
    let (index, total) = session.progress();
    let keyboard = KeyboardMarkup::new(
        session
            .current_choices()?
            .iter()
            .map(|choice| vec![KeyboardButton::new(choice.clone())])
            .collect::<Vec<_>>(),
    );

    bot.send_message(
        chat_id,
        format!("Question {}/{}:\n{}", index + 1, total, item.prompt_text),
    )
    .reply_markup(keyboard)
    .await?;
    Ok(())
}

async fn quiz_step(
    bot: Bot,
    dialogue: QuizDialogue,
    mut session: Session,
    trackers: Arc<Trackers>,
    msg: Message,
) -> HandlerResult {
    let text = match msg.text() {
        Some(text) => text,
        None => {
            bot.send_message(msg.chat.id, "Please answer with one of the buttons")
                .await?;
            return Ok(());
        }
    };

    match session.state() {
        SessionState::AwaitingAnswer => {
            let outcome = trackers.with_user(&user_id(&msg), |tracker| {
                session.submit_answer(text, tracker)
            });
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(QuizError::UnknownChoice(_)) => {
                    bot.send_message(msg.chat.id, "Please pick one of the offered answers")
                        .await?;
                    send_question(&bot, msg.chat.id, &session).await?;
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };

            let item = session.current_item()?;
            let mut reply = if outcome.is_correct {
                "Correct!".to_string()
            } else {
                format!("Wrong! The answer is \"{}\"", outcome.correct_choice)
            };
            if let Some(gloss) = &item.gloss_text {
                reply.push_str(&format!("\n\nMeaning: {}", gloss));
            }
            if let Some(translation) = &item.translation_text {
                reply.push_str(&format!("\nTranslation: {}", translation));
            }
            if !outcome.persisted {
                reply.push_str("\n\n(This answer could not be saved to your history.)");
            }

            bot.send_message(msg.chat.id, reply)
                .reply_markup(KeyboardMarkup::new(vec![vec![KeyboardButton::new(
                    NEXT_BUTTON,
                )]]))
                .await?;
            dialogue.update(State::Quiz { session }).await?;
        }
        SessionState::Answered => {
            if text != NEXT_BUTTON {
                bot.send_message(msg.chat.id, "Press \"Next\" to continue")
                    .reply_markup(KeyboardMarkup::new(vec![vec![KeyboardButton::new(
                        NEXT_BUTTON,
                    )]]))
                    .await?;
                return Ok(());
            }

            if session.advance()? == SessionState::Finished {
                return finish_quiz(bot, dialogue, session, msg).await;
            }
            send_question(&bot, msg.chat.id, &session).await?;
            dialogue.update(State::Quiz { session }).await?;
        }
        SessionState::Finished => return finish_quiz(bot, dialogue, session, msg).await,
    }
    Ok(())
}

async fn finish_quiz(
    bot: Bot,
    dialogue: QuizDialogue,
    session: Session,
    msg: Message,
) -> HandlerResult {
    let summary = report::summarize(&session)?;
    log::info!(
        "User {} finished a quiz: {}/{}",
        user_id(&msg),
        summary.score,
        summary.total
    );

    let missed = report::to_review_request(&summary)
        .into_iter()
        .map(|item| item.id)
        .collect();
    dialogue.update(State::ReceiveModeChoice { missed }).await?;

    bot.send_message(msg.chat.id, report::summary_text(&summary))
        .reply_markup(mode_keyboard())
        .await?;
    Ok(())
}

/// `/overview [user]`: every learner's accuracy, for the configured admin chat only.
async fn overview(
    bot: Bot,
    trackers: Arc<Trackers>,
    config: Arc<Config>,
    msg: Message,
) -> HandlerResult {
    if config.admin_chat_id != Some(msg.chat.id.0) {
        log::warn!("Overview requested from non-admin chat {}", msg.chat.id.0);
        bot.send_message(msg.chat.id, "This command is only available to the admin")
            .await?;
        return Ok(());
    }

    let store = match trackers.store() {
        Some(store) => store,
        None => {
            bot.send_message(msg.chat.id, "Answer history is not being saved, nothing to show")
                .await?;
            return Ok(());
        }
    };

    let only_user = msg
        .text()
        .and_then(|text| text.split_whitespace().nth(1));
    let text = match tracker::accuracy_by_user(&**store, only_user) {
        Ok(rows) => report::overview_text(&rows),
        Err(err) => {
            log::error!("Could not read answer history for the overview: {}", err);
            "Could not read the answer history".to_string()
        }
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
