//! examforge-core: attempt sessions, scoring, and review.
//!
//! This crate defines the assessment data model, the per-attempt session
//! that collects answers under a clock, the scoring rules for each assessment
//! type, and the reconstruction of persisted attempts for review.

pub mod answers;
pub mod attempt;
pub mod clock;
pub mod error;
pub mod model;
pub mod parser;
pub mod repository;
pub mod review;
pub mod scoring;
pub mod session;
pub mod statistics;
pub mod traits;
pub mod validator;
