//! Agent, task, and audit record types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AgentError;

/// The closed category of a worker. Selects its handler table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Archetype {
    CodeGeneration,
    Infrastructure,
    Learning,
}

impl Archetype {
    /// All archetypes, in bootstrap order.
    pub const ALL: [Archetype; 3] = [
        Archetype::CodeGeneration,
        Archetype::Infrastructure,
        Archetype::Learning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeGeneration => "code-generation",
            Self::Infrastructure => "infrastructure",
            Self::Learning => "learning",
        }
    }

    /// Name given to the agent created for this archetype at bootstrap.
    pub fn default_name(&self) -> &'static str {
        match self {
            Self::CodeGeneration => "Code Generator",
            Self::Infrastructure => "Infrastructure Planner",
            Self::Learning => "Repository Learner",
        }
    }

    /// Configuration given to the agent created for this archetype at bootstrap.
    pub fn default_config(&self) -> serde_json::Value {
        match self {
            Self::CodeGeneration => serde_json::json!({ "max_files": 50 }),
            Self::Infrastructure => serde_json::json!({ "providers": ["aws", "gcp", "azure", "kubernetes", "docker"] }),
            Self::Learning => serde_json::json!({ "commit_limit": crate::config::DEFAULT_COMMIT_LIMIT }),
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Archetype {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code-generation" => Ok(Self::CodeGeneration),
            "infrastructure" => Ok(Self::Infrastructure),
            "learning" => Ok(Self::Learning),
            other => Err(AgentError::UnknownArchetype(other.to_string())),
        }
    }
}

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Not processing its queue.
    #[default]
    Idle,
    /// Processing loop active, no task in hand.
    Running,
    /// Executing one task.
    Working,
}

impl AgentStatus {
    /// Whether the agent accepts routed work.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Working)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Working => "working",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "working" => Ok(Self::Working),
            other => Err(format!("unknown agent status: {other}")),
        }
    }
}

/// Persistent identity of a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: Uuid,
    pub name: String,
    pub archetype: Archetype,
    pub status: AgentStatus,
    pub current_task: Option<String>,
    pub progress: u8,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    /// A new idle agent.
    pub fn new(name: impl Into<String>, archetype: Archetype, config: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            archetype,
            status: AgentStatus::Idle,
            current_task: None,
            progress: 0,
            config,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update in place (last write wins per field).
    pub fn apply(&mut self, update: &AgentUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(ref current_task) = update.current_task {
            self.current_task = current_task.clone();
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(ref config) = update.config {
            self.config = config.clone();
        }
        self.updated_at = Utc::now();
    }
}

/// Partial agent update. `None` leaves the field untouched; `current_task`
/// uses `Some(None)` to clear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentUpdate {
    pub status: Option<AgentStatus>,
    pub current_task: Option<Option<String>>,
    pub progress: Option<u8>,
    pub config: Option<serde_json::Value>,
}

impl AgentUpdate {
    pub fn status(status: AgentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Enter `working` on `kind` with progress 0.
    pub fn working_on(kind: impl Into<String>) -> Self {
        Self {
            status: Some(AgentStatus::Working),
            current_task: Some(Some(kind.into())),
            progress: Some(0),
            config: None,
        }
    }

    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    /// Clear the current task and progress, optionally setting a status.
    pub fn cleared(status: Option<AgentStatus>) -> Self {
        Self {
            status,
            current_task: Some(None),
            progress: Some(0),
            config: None,
        }
    }
}

/// One unit of requested work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: i32,
}

impl Task {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            payload,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Append-only record of something an agent did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub project_id: Option<String>,
    pub action: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(agent_id: Uuid, action: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            project_id: None,
            action: action.into(),
            description: description.into(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Severity of a system log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Append-only system log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLogRecord {
    pub id: Uuid,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
    pub agent_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl SystemLogRecord {
    pub fn new(level: LogLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            source: source.into(),
            message: message.into(),
            agent_id: None,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn for_agent(mut self, agent_id: Uuid) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Outcome of an infrastructure plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Templates were stored and validated.
    Planned,
    /// Templates were stored but failed validation.
    Invalid,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Invalid => "invalid",
        }
    }
}

impl FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "invalid" => Ok(Self::Invalid),
            other => Err(format!("unknown deployment status: {other}")),
        }
    }
}

/// Persisted outcome of an infrastructure generation or validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: Uuid,
    pub project_id: String,
    pub provider: String,
    pub environment: String,
    pub status: DeploymentStatus,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl DeploymentRecord {
    pub fn new(
        project_id: impl Into<String>,
        provider: impl Into<String>,
        environment: impl Into<String>,
        status: DeploymentStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.into(),
            provider: provider.into(),
            environment: environment.into(),
            status,
            details: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}
