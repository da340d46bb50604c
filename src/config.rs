//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::agents::events::DEFAULT_EVENT_CAPACITY;
use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Default model when `DEVFORGE_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Commits analyzed per repository when a task does not say otherwise.
pub const DEFAULT_COMMIT_LIMIT: usize = 10;

/// Upper bound on commits a single analysis task may request.
pub const MAX_COMMIT_LIMIT: usize = 50;

/// Process configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// LLM provider settings.
    pub llm: LlmConfig,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Root directory of the template store.
    pub templates_dir: PathBuf,
    /// HTTP listen port.
    pub port: u16,
    /// Orchestrator tuning.
    pub orchestrator: OrchestratorConfig,
}

/// Tuning for the registry and its workers.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Default number of commits pulled by `analyze_repository`.
    pub commit_limit: usize,
    /// Capacity of the agent event broadcast channel.
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            commit_limit: DEFAULT_COMMIT_LIMIT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("DEVFORGE_LLM_BACKEND").as_deref() {
            None | Some("anthropic") => LlmBackend::Anthropic,
            Some("openai") => LlmBackend::OpenAi,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "DEVFORGE_LLM_BACKEND".to_string(),
                    message: format!("expected 'anthropic' or 'openai', got '{other}'"),
                });
            }
        };

        let key_var = match backend {
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
            LlmBackend::OpenAi => "OPENAI_API_KEY",
        };
        let api_key = lookup(key_var)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(key_var.to_string()))?;

        let model = lookup("DEVFORGE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let db_path = lookup("DEVFORGE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/devforge.db"));
        let templates_dir = lookup("DEVFORGE_TEMPLATES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/templates"));

        let port = parse_or(&lookup, "DEVFORGE_PORT", 8080u16);
        let commit_limit =
            parse_or(&lookup, "DEVFORGE_COMMIT_LIMIT", DEFAULT_COMMIT_LIMIT).clamp(1, MAX_COMMIT_LIMIT);
        let event_capacity = parse_or(&lookup, "DEVFORGE_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY).max(1);

        Ok(Self {
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
            },
            db_path,
            templates_dir,
            port,
            orchestrator: OrchestratorConfig {
                commit_limit,
                event_capacity,
            },
        })
    }
}

/// Parse a numeric variable, falling back to `default` when unset or malformed.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Invalid numeric configuration, using default");
            default
        }),
        None => default,
    }
}
