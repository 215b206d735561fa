//! Examforge configuration and grader factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use examforge_core::session::SessionConfig;
use examforge_core::traits::RubricGrader;

use crate::mock::MockGrader;
use crate::openai::OpenAiGrader;

/// Configuration for a single rubric grader.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GraderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Mock {
        #[serde(default = "default_mock_rate")]
        rate: f64,
        /// Answer substring → rate.
        #[serde(default)]
        keywords: HashMap<String, f64>,
    },
}

impl std::fmt::Debug for GraderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraderConfig::OpenAI {
                api_key: _,
                base_url,
                model,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("model", model)
                .field("org_id", org_id)
                .finish(),
            GraderConfig::Mock { rate, keywords } => f
                .debug_struct("Mock")
                .field("rate", rate)
                .field("keywords", keywords)
                .finish(),
        }
    }
}

fn default_mock_rate() -> f64 {
    1.0
}

/// Top-level examforge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamforgeConfig {
    /// Grader configurations keyed by name.
    #[serde(default)]
    pub graders: HashMap<String, GraderConfig>,
    /// Grader used for free-text assessments when none is named.
    #[serde(default = "default_grader")]
    pub default_grader: String,
    /// Where submitted attempts are written.
    #[serde(default = "default_attempts_dir")]
    pub attempts_dir: PathBuf,
    /// Cadence of the session clock check, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Max concurrent grading calls per attempt.
    #[serde(default = "default_parallelism")]
    pub grading_parallelism: usize,
}

fn default_grader() -> String {
    "mock".to_string()
}
fn default_attempts_dir() -> PathBuf {
    PathBuf::from("./examforge-attempts")
}
fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_parallelism() -> usize {
    4
}

impl Default for ExamforgeConfig {
    fn default() -> Self {
        Self {
            graders: HashMap::new(),
            default_grader: default_grader(),
            attempts_dir: default_attempts_dir(),
            tick_interval_ms: default_tick_interval_ms(),
            grading_parallelism: default_parallelism(),
        }
    }
}

impl ExamforgeConfig {
    /// Session settings derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            grading_parallelism: self.grading_parallelism.max(1),
        }
    }

    /// Build the named grader, or the default one.
    ///
    /// An unconfigured `mock` falls back to a mock with the default rate.
    pub fn grader(&self, name: Option<&str>) -> Result<Arc<dyn RubricGrader>> {
        let name = name.unwrap_or(&self.default_grader);
        match self.graders.get(name) {
            Some(config) => create_grader(name, config),
            None if name == "mock" => Ok(Arc::new(MockGrader::with_fixed_rate(
                default_mock_rate(),
            ))),
            None => anyhow::bail!(
                "grader '{name}' is not configured (known: {})",
                self.grader_names().join(", ")
            ),
        }
    }

    /// Configured grader names, sorted.
    pub fn grader_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.graders.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

fn resolve_grader_config(config: &GraderConfig) -> GraderConfig {
    match config {
        GraderConfig::OpenAI {
            api_key,
            base_url,
            model,
            org_id,
        } => GraderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
            model: model.as_deref().map(resolve_env_vars),
            org_id: org_id.as_deref().map(resolve_env_vars),
        },
        GraderConfig::Mock { .. } => config.clone(),
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examforge.toml` in the current directory
/// 2. `~/.config/examforge/config.toml`
///
/// `EXAMFORGE_OPENAI_KEY` overrides the key of the `openai` grader.
pub fn load_config() -> Result<ExamforgeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ExamforgeConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("examforge.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = toml::from_str::<ExamforgeConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            config
        }
        None => ExamforgeConfig::default(),
    };

    if let Ok(key) = std::env::var("EXAMFORGE_OPENAI_KEY") {
        let entry = config
            .graders
            .entry("openai".into())
            .or_insert(GraderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                model: None,
                org_id: None,
            });
        if let GraderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }

    config.graders = config
        .graders
        .iter()
        .map(|(k, v)| (k.clone(), resolve_grader_config(v)))
        .collect();

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examforge"))
}

/// Create a grader instance from its configuration.
pub fn create_grader(name: &str, config: &GraderConfig) -> Result<Arc<dyn RubricGrader>> {
    match config {
        GraderConfig::OpenAI {
            api_key,
            base_url,
            model,
            org_id,
        } => {
            anyhow::ensure!(
                !api_key.is_empty(),
                "grader '{name}' has no API key (set EXAMFORGE_OPENAI_KEY or api_key)"
            );
            Ok(Arc::new(OpenAiGrader::new(
                api_key,
                base_url.clone(),
                model.clone(),
                org_id.clone(),
            )?))
        }
        GraderConfig::Mock { rate, keywords } => {
            Ok(Arc::new(MockGrader::new(keywords.clone(), *rate)))
        }
    }
}
