//! Agent events broadcast to dashboard subscribers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::model::AgentStatus;

/// Default broadcast channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Lifecycle and task events emitted by workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The agent's status changed.
    StatusChanged { agent_id: Uuid, status: AgentStatus },
    /// A task was dequeued and handed to a handler.
    TaskStarted {
        agent_id: Uuid,
        task_id: String,
        kind: String,
    },
    /// A handler reported progress on the current task.
    Progress {
        agent_id: Uuid,
        task_id: String,
        progress: u8,
    },
    /// The handler returned successfully.
    TaskCompleted { agent_id: Uuid, task_id: String },
    /// The handler failed; the task was dropped.
    TaskFailed {
        agent_id: Uuid,
        task_id: String,
        error: String,
    },
}

impl AgentEvent {
    /// The agent this event concerns.
    pub fn agent_id(&self) -> Uuid {
        match self {
            Self::StatusChanged { agent_id, .. }
            | Self::TaskStarted { agent_id, .. }
            | Self::Progress { agent_id, .. }
            | Self::TaskCompleted { agent_id, .. }
            | Self::TaskFailed { agent_id, .. } => *agent_id,
        }
    }

    /// The task this event concerns, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::StatusChanged { .. } => None,
            Self::TaskStarted { task_id, .. }
            | Self::Progress { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFailed { task_id, .. } => Some(task_id),
        }
    }

    /// Whether this event ends a task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TaskCompleted { .. } | Self::TaskFailed { .. })
    }
}

/// Create the event channel shared by the registry and its workers.
pub fn channel(capacity: usize) -> broadcast::Sender<AgentEvent> {
    let (tx, _rx) = broadcast::channel(capacity.max(1));
    tx
}
