//! Attempt and assessment repositories.
//!
//! Concurrent writes to the same attempt are last-write-wins: `upsert`
//! replaces whatever is stored under the attempt id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::attempt::StudentAttempt;
use crate::model::AssessmentDefinition;
use crate::parser;
use crate::traits::{AssessmentRepository, AttemptRepository};

/// Keeps attempts in memory. Counts writes so tests can assert how many
/// submissions reached persistence.
#[derive(Debug, Default)]
pub struct InMemoryAttemptRepository {
    attempts: Mutex<HashMap<Uuid, StudentAttempt>>,
    upsert_count: AtomicU32,
    fail_writes: AtomicBool,
}

impl InMemoryAttemptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository whose every write fails, for exercising error paths.
    pub fn failing() -> Self {
        let repo = Self::default();
        repo.fail_writes.store(true, Ordering::Relaxed);
        repo
    }

    /// Number of upserts received, including failed ones.
    pub fn upsert_count(&self) -> u32 {
        self.upsert_count.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, StudentAttempt>> {
        self.attempts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryAttemptRepository {
    async fn upsert(&self, attempt: &StudentAttempt) -> Result<()> {
        self.upsert_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_writes.load(Ordering::Relaxed) {
            anyhow::bail!("attempt store unavailable");
        }
        self.lock().insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<StudentAttempt>> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn list_for_assessment(&self, assess_id: &str) -> Result<Vec<StudentAttempt>> {
        let mut attempts: Vec<StudentAttempt> = self
            .lock()
            .values()
            .filter(|a| a.parent_assess_id == assess_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.updated_at);
        Ok(attempts)
    }
}

/// Stores each attempt as `<dir>/<attempt id>.json`.
#[derive(Debug, Clone)]
pub struct FileAttemptRepository {
    dir: PathBuf,
}

impl FileAttemptRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl AttemptRepository for FileAttemptRepository {
    async fn upsert(&self, attempt: &StudentAttempt) -> Result<()> {
        let json = serde_json::to_string_pretty(attempt).context("failed to serialize attempt")?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.path_for(attempt.id);
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("failed to write attempt to {}", path.display()))?;
        tracing::debug!(attempt = %attempt.id, path = %path.display(), "attempt written");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<StudentAttempt>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read attempt from {}", path.display()))?;
        let attempt = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse attempt JSON: {}", path.display()))?;
        Ok(Some(attempt))
    }

    async fn list_for_assessment(&self, assess_id: &str) -> Result<Vec<StudentAttempt>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut attempts = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("failed to read directory: {}", self.dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<StudentAttempt>(&content) {
                Ok(attempt) if attempt.parent_assess_id == assess_id => attempts.push(attempt),
                Ok(_) => {}
                Err(e) => tracing::warn!("skipping {}: {}", path.display(), e),
            }
        }
        attempts.sort_by_key(|a| a.updated_at);
        Ok(attempts)
    }
}

/// Serves assessment definitions from a directory of TOML files.
#[derive(Debug, Clone)]
pub struct DirectoryAssessmentRepository {
    dir: PathBuf,
}

impl DirectoryAssessmentRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl AssessmentRepository for DirectoryAssessmentRepository {
    async fn fetch(&self, id: &str) -> Result<AssessmentDefinition> {
        let dir = self.dir.clone();
        let definitions = tokio::task::spawn_blocking(move || parser::load_definition_directory(&dir))
            .await
            .context("definition loader panicked")??;
        definitions
            .into_iter()
            .find(|d| d.id == id)
            .with_context(|| format!("assessment '{id}' not found in {}", self.dir.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Answer;

    fn attempt_for(assess_id: &str) -> StudentAttempt {
        let mut attempt = StudentAttempt::new(assess_id, "student-1", 2);
        attempt.answers[0] = Answer::Choice(1);
        attempt
    }

    #[tokio::test]
    async fn in_memory_upsert_is_last_write_wins() {
        let repo = InMemoryAttemptRepository::new();
        let mut attempt = attempt_for("quiz");
        repo.upsert(&attempt).await.unwrap();

        attempt.score = 80.0;
        attempt.completed = true;
        repo.upsert(&attempt).await.unwrap();

        assert_eq!(repo.len(), 1);
        assert_eq!(repo.upsert_count(), 2);
        let stored = repo.load(attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.score, 80.0);
        assert!(stored.completed);
    }

    #[tokio::test]
    async fn failing_repository_reports_error() {
        let repo = InMemoryAttemptRepository::failing();
        let err = repo.upsert(&attempt_for("quiz")).await.unwrap_err();
        assert!(err.to_string().contains("unavailable"));
        assert_eq!(repo.upsert_count(), 1);
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn file_repository_roundtrip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileAttemptRepository::new(dir.path().join("attempts"));

        let first = attempt_for("quiz");
        let other = attempt_for("other-quiz");
        repo.upsert(&first).await.unwrap();
        repo.upsert(&other).await.unwrap();

        let loaded = repo.load(first.id).await.unwrap().unwrap();
        assert_eq!(loaded, first);
        assert!(repo.load(Uuid::new_v4()).await.unwrap().is_none());

        let listed = repo.list_for_assessment("quiz").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, first.id);
    }

    #[tokio::test]
    async fn file_repository_missing_dir_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileAttemptRepository::new(dir.path().join("nope"));
        assert!(repo.list_for_assessment("quiz").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn directory_assessment_repository_fetches_by_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("capitals.toml"),
            r#"
[assessment]
id = "capitals"
name = "Capitals"
assess_type = "single_choice"

[[questions]]
question = "Capital of France?"
choices = ["Lyon", "Paris"]
correct_answer = 2
"#,
        )
        .unwrap();

        let repo = DirectoryAssessmentRepository::new(dir.path());
        let def = repo.fetch("capitals").await.unwrap();
        assert_eq!(def.question_count(), 1);
        assert!(repo.fetch("missing").await.is_err());
    }
}
