//! The `examforge init` command.

use std::path::Path;

use anyhow::{Context, Result};

pub fn execute() -> Result<()> {
    if Path::new("examforge.toml").exists() {
        println!("examforge.toml already exists, skipping.");
    } else {
        std::fs::write("examforge.toml", SAMPLE_CONFIG).context("failed to write examforge.toml")?;
        println!("Created examforge.toml");
    }

    std::fs::create_dir_all("assessments").context("failed to create assessments/")?;
    let example_path = Path::new("assessments/example.toml");
    if example_path.exists() {
        println!("assessments/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_ASSESSMENT)
            .context("failed to write assessments/example.toml")?;
        println!("Created assessments/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit examforge.toml to pick a grader for free-text assessments");
    println!("  2. Run: examforge validate --assessment assessments/example.toml");
    println!("  3. Run: examforge take --assessment assessments/example.toml --student you");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# examforge configuration

default_grader = "mock"
attempts_dir = "./examforge-attempts"
tick_interval_ms = 1000
grading_parallelism = 4

[graders.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"
model = "gpt-4.1-mini"

[graders.mock]
type = "mock"
rate = 0.8
"#;

const EXAMPLE_ASSESSMENT: &str = r#"[assessment]
id = "example"
name = "Example Quiz"
description = "A short quiz to get started"
assess_type = "single_choice"

[assessment.policy]
time_limited = true
time_limit = 10
allow_answer_change = true
attempt_limit = 3
score_method = "highest"

[[questions]]
question = "Which keyword declares an immutable binding in Rust?"
choices = ["var", "let", "const fn", "mut"]
correct_answer = 2

[[questions]]
question = "Which type owns a heap-allocated, growable string?"
choices = ["&str", "char", "String", "Box<str>"]
correct_answer = 3

[[questions]]
question = "What does the ? operator do on an Err value?"
choices = ["Panics", "Returns it early", "Ignores it", "Logs it"]
correct_answer = 2
"#;
