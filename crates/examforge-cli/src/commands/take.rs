//! The `examforge take` command.
//!
//! Runs one attempt session against stdin. The session's ticker runs in the
//! background and submits on its own when the time limit is reached.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;

use examforge_core::attempt::StudentAttempt;
use examforge_core::clock::SystemClock;
use examforge_core::error::ExamError;
use examforge_core::model::AssessType;
use examforge_core::review;
use examforge_core::session::{
    AttemptSession, SessionObserver, SubmitOutcome, SubmitTrigger, TickerHandle,
};
use examforge_grader::config::load_config_from;

/// Console session observer.
#[derive(Default)]
struct ConsoleObserver {
    finished: Notify,
    settled: AtomicBool,
    attempt: Mutex<Option<StudentAttempt>>,
}

impl ConsoleObserver {
    /// Wait until the submission that closed the session has been graded
    /// and persisted, or has failed.
    async fn wait_settled(&self) {
        while !self.settled.load(Ordering::Acquire) {
            self.finished.notified().await;
        }
    }

    fn take_attempt(&self) -> Option<StudentAttempt> {
        self.attempt.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl SessionObserver for ConsoleObserver {
    fn on_warning(&self, remaining: Duration) {
        let minutes = remaining.as_secs().div_ceil(60);
        eprintln!("\n*** {minutes} minute(s) remaining ***");
    }

    fn on_expired(&self) {
        eprintln!("\n*** Time is up. Submitting your answers. ***");
    }

    fn on_submitted(&self, attempt: &StudentAttempt, trigger: SubmitTrigger) {
        if trigger == SubmitTrigger::Expired {
            eprintln!("Submitted automatically.");
        }
        *self.attempt.lock().unwrap_or_else(|e| e.into_inner()) = Some(attempt.clone());
        self.settled.store(true, Ordering::Release);
        self.finished.notify_one();
    }

    fn on_submit_failed(&self, error: &ExamError) {
        eprintln!("Submission failed: {error}");
        self.settled.store(true, Ordering::Release);
        self.finished.notify_one();
    }
}

enum Flow {
    Continue,
    Done,
}

pub async fn execute(
    assessment_path: PathBuf,
    student: String,
    grader_name: Option<String>,
    attempts_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(!student.trim().is_empty(), "student id must not be empty");

    let config = load_config_from(config_path.as_deref())?;
    let definition = Arc::new(super::load_definition(&assessment_path)?);
    let repository = super::attempts_repository(attempts_dir, &config);
    let observer = Arc::new(ConsoleObserver::default());

    let mut session = AttemptSession::new(
        Arc::clone(&definition),
        &student,
        Arc::new(SystemClock),
        Arc::new(repository.clone()),
    )?
    .with_config(config.session_config())
    .with_observer(observer.clone());
    if definition.assess_type == AssessType::FreeText {
        session = session.with_grader(config.grader(grader_name.as_deref())?);
    }
    let session = Arc::new(session);

    println!("{}", definition.name);
    if !definition.description.is_empty() {
        println!("{}", definition.description);
    }
    match definition.time_limit_minutes() {
        Some(minutes) => println!("Time limit: {minutes} min"),
        None => println!("No time limit"),
    }
    for (i, question) in definition.questions.iter().enumerate() {
        super::print_question(i + 1, question);
    }
    print_help();

    session.start()?;
    let ticker = session.spawn_ticker();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = observer.finished.notified() => break,
            line = lines.next_line() => {
                let Some(line) = line? else {
                    if !session.state().is_terminal() {
                        eprintln!("Input closed, submitting.");
                        session.submit(true).await?;
                    }
                    break;
                };
                if let Flow::Done = handle_line(&session, &line).await? {
                    break;
                }
            }
        }
    }

    let Some(attempt) = settle(&session, &observer, ticker).await else {
        anyhow::bail!("attempt was not recorded");
    };

    let review = review::reconstruct(&definition, &attempt)?;
    println!();
    super::print_review(&review);
    eprintln!(
        "Attempt saved to: {}",
        repository.dir().join(format!("{}.json", attempt.id)).display()
    );
    Ok(())
}

/// Let a submission still grading or persisting in the ticker run to
/// completion, then stop the ticker.
async fn settle(
    session: &AttemptSession,
    observer: &ConsoleObserver,
    ticker: TickerHandle,
) -> Option<StudentAttempt> {
    if session.state().is_terminal() {
        observer.wait_settled().await;
    }
    ticker.stop();
    observer.take_attempt()
}

fn print_help() {
    println!("\nEnter answers as '<question> <answer>', e.g. '1 2' or '3 1,4'.");
    println!("Commands: status, clear <question>, submit, submit! (skip confirmation), help");
}

async fn handle_line(session: &AttemptSession, line: &str) -> Result<Flow> {
    let line = line.trim();
    match line {
        "" => return Ok(Flow::Continue),
        "help" => {
            print_help();
            return Ok(Flow::Continue);
        }
        "status" => {
            let summary = session.summary();
            print!(
                "{}/{} answered",
                summary.answered_count, summary.question_count
            );
            match session.remaining() {
                Some(left) => println!(", {}s remaining", left.as_secs()),
                None => println!(),
            }
            return Ok(Flow::Continue);
        }
        "submit" | "submit!" => {
            return match session.submit(line == "submit!").await? {
                SubmitOutcome::NeedsConfirmation(summary) => {
                    println!("{}", summary.message);
                    let unanswered: Vec<String> = summary
                        .unanswered_indices
                        .iter()
                        .map(|n| n.to_string())
                        .collect();
                    println!("Unanswered: {}", unanswered.join(", "));
                    println!("Type 'submit!' to confirm.");
                    Ok(Flow::Continue)
                }
                SubmitOutcome::Submitted(_) | SubmitOutcome::Ignored => Ok(Flow::Done),
            };
        }
        _ => {}
    }

    let (number, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let (clearing, number, rest) = match number {
        "clear" => (true, rest.trim(), ""),
        _ => (false, number, rest),
    };
    let Some(index) = number
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .filter(|&i| i < session.definition().question_count())
    else {
        eprintln!("Unknown question '{number}'. Type 'help' for usage.");
        return Ok(Flow::Continue);
    };

    if clearing {
        return record(session.clear_answer(index));
    }

    let question = &session.definition().questions[index];
    let answer = match super::parse_answer(question, rest) {
        Ok(answer) => answer,
        Err(e) => {
            eprintln!("{e}");
            return Ok(Flow::Continue);
        }
    };

    record(session.answer(index, answer))
}

fn record(result: Result<(), ExamError>) -> Result<Flow> {
    match result {
        Ok(()) => Ok(Flow::Continue),
        Err(ExamError::SessionClosed) => Ok(Flow::Done),
        Err(e) => {
            eprintln!("{e}");
            Ok(Flow::Continue)
        }
    }
}
