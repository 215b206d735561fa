//! examforge CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "examforge", version, about = "Timed assessment sessions and grading")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate assessment definition files
    Validate {
        /// Path to a .toml definition or a directory of them
        #[arg(long)]
        assessment: PathBuf,
    },

    /// Take an assessment interactively on stdin
    Take {
        /// Path to the .toml definition
        #[arg(long)]
        assessment: PathBuf,

        /// Student identifier recorded on the attempt
        #[arg(long)]
        student: String,

        /// Grader to use for free-text assessments
        #[arg(long)]
        grader: Option<String>,

        /// Where attempts are written (overrides config)
        #[arg(long)]
        attempts_dir: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Grade a prepared answer sheet and record the attempt
    Grade {
        /// Path to the .toml definition
        #[arg(long)]
        assessment: PathBuf,

        /// JSON array of answers, one entry per question
        #[arg(long)]
        answers: PathBuf,

        /// Student identifier recorded on the attempt
        #[arg(long)]
        student: String,

        /// Grader to use for free-text assessments
        #[arg(long)]
        grader: Option<String>,

        /// Where attempts are written (overrides config)
        #[arg(long)]
        attempts_dir: Option<PathBuf>,

        /// Submit even when fewer than half the questions are answered
        #[arg(long, short = 'y')]
        yes: bool,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Review a recorded attempt
    Review {
        /// Path to the .toml definition
        #[arg(long)]
        assessment: PathBuf,

        /// Attempt id, or path to an attempt JSON file
        #[arg(long)]
        attempt: String,

        /// Where attempts are read from (overrides config)
        #[arg(long)]
        attempts_dir: Option<PathBuf>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Summarize recorded attempts for an assessment
    Stats {
        /// Path to the .toml definition
        #[arg(long)]
        assessment: PathBuf,

        /// Where attempts are read from (overrides config)
        #[arg(long)]
        attempts_dir: Option<PathBuf>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and example assessment
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("examforge=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { assessment } => commands::validate::execute(assessment),
        Commands::Take {
            assessment,
            student,
            grader,
            attempts_dir,
            config,
        } => commands::take::execute(assessment, student, grader, attempts_dir, config).await,
        Commands::Grade {
            assessment,
            answers,
            student,
            grader,
            attempts_dir,
            yes,
            format,
            config,
        } => {
            commands::grade::execute(
                assessment,
                answers,
                student,
                grader,
                attempts_dir,
                yes,
                format,
                config,
            )
            .await
        }
        Commands::Review {
            assessment,
            attempt,
            attempts_dir,
            format,
            config,
        } => commands::review::execute(assessment, attempt, attempts_dir, format, config).await,
        Commands::Stats {
            assessment,
            attempts_dir,
            format,
            config,
        } => commands::stats::execute(assessment, attempts_dir, format, config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
