//! Per-task context handed to handlers.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use super::events::AgentEvent;
use super::model::{ActivityRecord, AgentUpdate, LogLevel, SystemLogRecord};
use crate::store::Database;

/// What a handler may touch while it runs: progress, activity, and logs for
/// the agent that owns the task.
///
/// Audit writes are best effort. A failed write is logged and the handler
/// carries on.
#[derive(Clone)]
pub struct TaskContext {
    agent_id: Uuid,
    task_id: String,
    kind: String,
    store: Arc<dyn Database>,
    events: broadcast::Sender<AgentEvent>,
}

impl TaskContext {
    pub fn new(
        agent_id: Uuid,
        task_id: impl Into<String>,
        kind: impl Into<String>,
        store: Arc<dyn Database>,
        events: broadcast::Sender<AgentEvent>,
    ) -> Self {
        Self {
            agent_id,
            task_id: task_id.into(),
            kind: kind.into(),
            store,
            events,
        }
    }

    pub fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn store(&self) -> &Arc<dyn Database> {
        &self.store
    }

    /// Persist progress (clamped to 100) and broadcast it.
    pub async fn report_progress(&self, progress: u8) {
        let progress = progress.min(100);
        if let Err(e) = self
            .store
            .update_agent(self.agent_id, &AgentUpdate::progress(progress))
            .await
        {
            warn!(agent_id = %self.agent_id, task_id = %self.task_id, error = %e, "Failed to persist progress");
        }
        let _ = self.events.send(AgentEvent::Progress {
            agent_id: self.agent_id,
            task_id: self.task_id.clone(),
            progress,
        });
    }

    /// Append an activity record for this agent.
    pub async fn record_activity(
        &self,
        action: &str,
        description: impl Into<String>,
        project_id: Option<&str>,
        metadata: serde_json::Value,
    ) {
        let mut record = ActivityRecord::new(self.agent_id, action, description).with_metadata(metadata);
        if let Some(project_id) = project_id {
            record = record.with_project(project_id);
        }
        if let Err(e) = self.store.create_activity(&record).await {
            warn!(agent_id = %self.agent_id, action, error = %e, "Failed to record activity");
        }
    }

    /// Append a system log record attributed to this agent.
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let record = SystemLogRecord::new(level, self.kind.clone(), message)
            .for_agent(self.agent_id)
            .with_metadata(serde_json::json!({ "task_id": self.task_id }));
        if let Err(e) = self.store.create_system_log(&record).await {
            warn!(agent_id = %self.agent_id, error = %e, "Failed to write system log");
        }
    }
}
