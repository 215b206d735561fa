//! examforge-grader: rubric grader integrations.
//!
//! Implements the `RubricGrader` trait for OpenAI-compatible chat endpoints
//! and a deterministic mock, plus the examforge configuration file that
//! selects between them.

pub mod config;
pub mod error;
pub mod mock;
pub mod openai;

pub use config::{create_grader, load_config, load_config_from, ExamforgeConfig, GraderConfig};
pub use error::GraderError;
