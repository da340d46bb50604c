//! Error types for devforge.

use std::path::PathBuf;

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Version control error: {0}")]
    Vcs(#[from] VcsError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Content-generation (LLM) errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Version-control errors.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("Repository not found: {0}")]
    RepositoryNotFound(PathBuf),

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Unparseable git output: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Template store errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("No templates stored for {project}/{environment}")]
    NotFound { project: String, environment: String },

    #[error("Invalid template path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Agent lifecycle and routing errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent {id} not found")]
    NotFound { id: Uuid },

    #[error("Agent {id} is not running")]
    NotRunning { id: Uuid },

    #[error("No running agent available for archetype {archetype}")]
    Unavailable { archetype: String },

    #[error("Unknown agent archetype: {0}")]
    UnknownArchetype(String),

    #[error("Archetype {archetype} has no handler for task kind {kind}")]
    UnknownTaskKind { archetype: String, kind: String },

    #[error("Invalid payload for task kind {kind}: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("No knowledge recorded for project {0}")]
    NoKnowledge(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
