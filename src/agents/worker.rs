//! Worker — one agent's task queue and lifecycle state machine.
//!
//! `idle` → `running` (loop active, no task) → `working` (one task in hand)
//! → `running` again, or `idle` on stop. Stop is cooperative: the task in
//! hand runs to completion before the flag is checked again.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::context::TaskContext;
use super::events::AgentEvent;
use super::handlers::HandlerTable;
use super::model::{
    ActivityRecord, AgentStatus, AgentUpdate, Archetype, LogLevel, SystemLogRecord, Task,
};
use super::queue::TaskQueue;
use crate::store::Database;

/// A task the worker dropped after its handler failed.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub agent_id: Uuid,
    pub archetype: Archetype,
    pub task_id: String,
    pub kind: String,
    pub error: String,
}

/// Called once per failed task, after the error log is written.
pub type ErrorObserver = Arc<dyn Fn(&TaskFailure) + Send + Sync>;

/// Everything a worker needs from the outside.
#[derive(Clone)]
pub struct WorkerDeps {
    pub store: Arc<dyn Database>,
    pub handlers: Arc<dyn HandlerTable>,
    pub events: broadcast::Sender<AgentEvent>,
    pub on_error: ErrorObserver,
}

#[derive(Debug, Default)]
struct WorkerState {
    status: AgentStatus,
    queue: TaskQueue,
    should_continue: bool,
    draining: bool,
}

struct Inner {
    agent_id: Uuid,
    archetype: Archetype,
    deps: WorkerDeps,
    state: Mutex<WorkerState>,
    draining: watch::Sender<bool>,
}

/// Handle to one agent's worker. Cheap to clone.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<Inner>,
}

impl Worker {
    pub fn new(agent_id: Uuid, archetype: Archetype, deps: WorkerDeps) -> Self {
        let (draining, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                agent_id,
                archetype,
                deps,
                state: Mutex::new(WorkerState::default()),
                draining,
            }),
        }
    }

    pub fn agent_id(&self) -> Uuid {
        self.inner.agent_id
    }

    pub fn archetype(&self) -> Archetype {
        self.inner.archetype
    }

    /// Whether this worker's handler table dispatches `kind`.
    pub fn handles(&self, kind: &str) -> bool {
        self.inner.deps.handlers.handles(kind)
    }

    pub async fn status(&self) -> AgentStatus {
        self.inner.state.lock().await.status
    }

    /// Number of tasks waiting (not counting the one in hand).
    pub async fn queued(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    /// Whether a drain loop is currently alive.
    pub fn is_draining(&self) -> bool {
        *self.inner.draining.borrow()
    }

    /// Enter `running` and begin draining. No-op unless `idle`.
    pub async fn start(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if state.status != AgentStatus::Idle {
                debug!(agent_id = %self.inner.agent_id, status = %state.status, "Start ignored");
                return;
            }
            state.should_continue = true;
            self.inner.transition(&mut state, AgentStatus::Running).await;
        }
        info!(agent_id = %self.inner.agent_id, archetype = %self.inner.archetype, "Worker started");
        self.kick().await;
    }

    /// Clear the should-continue flag and go `idle`. The task in hand, if
    /// any, is not interrupted.
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        state.should_continue = false;
        if state.status != AgentStatus::Idle {
            self.inner.transition(&mut state, AgentStatus::Idle).await;
            info!(agent_id = %self.inner.agent_id, queued = state.queue.len(), "Worker stopped");
        }
    }

    /// Queue a task. Drains immediately when `running`; buffers when `idle`.
    pub async fn enqueue(&self, task: Task) {
        {
            let mut state = self.inner.state.lock().await;
            debug!(agent_id = %self.inner.agent_id, task_id = %task.id, kind = %task.kind, priority = task.priority, "Task queued");
            state.queue.push(task);
        }
        self.kick().await;
    }

    /// Resolve once no drain loop is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.draining.subscribe();
        let _ = rx.wait_for(|draining| !*draining).await;
    }

    async fn kick(&self) {
        let mut state = self.inner.state.lock().await;
        if state.status == AgentStatus::Running
            && state.should_continue
            && !state.draining
            && !state.queue.is_empty()
        {
            state.draining = true;
            self.inner.draining.send_replace(true);
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }
    }
}

impl Inner {
    /// Set the in-memory status, persist it, and broadcast. Caller holds the
    /// state lock so persisted order matches in-memory order.
    async fn transition(&self, state: &mut WorkerState, status: AgentStatus) {
        state.status = status;
        self.persist(AgentUpdate::status(status)).await;
        self.emit(AgentEvent::StatusChanged {
            agent_id: self.agent_id,
            status,
        });
    }

    async fn persist(&self, update: AgentUpdate) {
        if let Err(e) = self.deps.store.update_agent(self.agent_id, &update).await {
            warn!(agent_id = %self.agent_id, error = %e, "Failed to persist agent state");
        }
    }

    fn emit(&self, event: AgentEvent) {
        // No subscribers is fine.
        let _ = self.deps.events.send(event);
    }

    async fn execute(&self, task: Task) {
        let ctx = TaskContext::new(
            self.agent_id,
            task.id.clone(),
            task.kind.clone(),
            Arc::clone(&self.deps.store),
            self.deps.events.clone(),
        );

        let handlers = Arc::clone(&self.deps.handlers);
        let kind = task.kind.clone();
        let payload = task.payload.clone();
        let outcome = tokio::spawn(async move { handlers.dispatch(&kind, &payload, &ctx).await })
            .await
            .map_err(|e| {
                if e.is_panic() {
                    "handler panicked".to_string()
                } else {
                    format!("handler aborted: {e}")
                }
            })
            .and_then(|result| result.map_err(|e| e.to_string()));

        match outcome {
            Ok(()) => self.completed(&task).await,
            Err(message) => self.failed(&task, message).await,
        }
    }

    async fn completed(&self, task: &Task) {
        info!(agent_id = %self.agent_id, task_id = %task.id, kind = %task.kind, "Task completed");
        let mut activity = ActivityRecord::new(
            self.agent_id,
            "task_completed",
            format!("Completed {}", task.kind),
        )
        .with_metadata(serde_json::json!({ "task_id": task.id, "kind": task.kind }));
        if let Some(project_id) = task.payload.get("project_id").and_then(|v| v.as_str()) {
            activity = activity.with_project(project_id);
        }
        if let Err(e) = self.deps.store.create_activity(&activity).await {
            warn!(agent_id = %self.agent_id, error = %e, "Failed to record completion");
        }
        self.emit(AgentEvent::TaskCompleted {
            agent_id: self.agent_id,
            task_id: task.id.clone(),
        });
    }

    async fn failed(&self, task: &Task, message: String) {
        error!(agent_id = %self.agent_id, task_id = %task.id, kind = %task.kind, error = %message, "Task failed");
        let log = SystemLogRecord::new(
            LogLevel::Error,
            format!("agent:{}", self.archetype),
            format!("Task {} ({}) failed: {}", task.id, task.kind, message),
        )
        .for_agent(self.agent_id)
        .with_metadata(serde_json::json!({ "task_id": task.id, "kind": task.kind }));
        if let Err(e) = self.deps.store.create_system_log(&log).await {
            warn!(agent_id = %self.agent_id, error = %e, "Failed to write error log");
        }

        let failure = TaskFailure {
            agent_id: self.agent_id,
            archetype: self.archetype,
            task_id: task.id.clone(),
            kind: task.kind.clone(),
            error: message.clone(),
        };
        (self.deps.on_error)(&failure);

        self.emit(AgentEvent::TaskFailed {
            agent_id: self.agent_id,
            task_id: task.id.clone(),
            error: message,
        });
    }
}

/// Pop and run tasks until the queue empties or the worker is stopped.
async fn drain(inner: Arc<Inner>) {
    debug!(agent_id = %inner.agent_id, "Drain loop started");
    loop {
        let task = {
            let mut state = inner.state.lock().await;
            let next = if state.should_continue {
                state.queue.pop()
            } else {
                None
            };
            let Some(task) = next else {
                state.draining = false;
                inner.draining.send_replace(false);
                break;
            };
            state.status = AgentStatus::Working;
            inner.persist(AgentUpdate::working_on(task.kind.clone())).await;
            inner.emit(AgentEvent::StatusChanged {
                agent_id: inner.agent_id,
                status: AgentStatus::Working,
            });
            inner.emit(AgentEvent::TaskStarted {
                agent_id: inner.agent_id,
                task_id: task.id.clone(),
                kind: task.kind.clone(),
            });
            task
        };

        inner.execute(task).await;

        let mut state = inner.state.lock().await;
        if state.should_continue {
            state.status = AgentStatus::Running;
        }
        let status = state.status;
        inner.persist(AgentUpdate::cleared(Some(status))).await;
        inner.emit(AgentEvent::StatusChanged {
            agent_id: inner.agent_id,
            status,
        });
    }
    debug!(agent_id = %inner.agent_id, "Drain loop exited");
}
