//! Registry — builds workers from persisted agents and routes tasks to them.
//!
//! Constructed once per process and shared via `Arc`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use tokio::sync::{Mutex, broadcast};
use tracing::{info, warn};
use uuid::Uuid;

use super::events::AgentEvent;
use super::handlers::{Collaborators, KnowledgeStore, Recommendation, handler_table, task_kinds};
use super::model::{AgentRecord, AgentStatus, AgentUpdate, Archetype, Task};
use super::worker::{ErrorObserver, TaskFailure, Worker, WorkerDeps};
use crate::error::{AgentError, Error};
use crate::store::Database;

pub struct Registry {
    store: Arc<dyn Database>,
    collaborators: Collaborators,
    events: broadcast::Sender<AgentEvent>,
    /// Started workers, eligible for routing.
    workers: Mutex<HashMap<Uuid, Worker>>,
    /// Stopped workers whose drain loop may still be finishing a task.
    /// A restart revives them so an agent never has two drain loops.
    retiring: Mutex<HashMap<Uuid, Worker>>,
    failed_tasks: Arc<AtomicU64>,
}

impl Registry {
    pub fn new(
        store: Arc<dyn Database>,
        collaborators: Collaborators,
        events: broadcast::Sender<AgentEvent>,
    ) -> Self {
        Self {
            store,
            collaborators,
            events,
            workers: Mutex::new(HashMap::new()),
            retiring: Mutex::new(HashMap::new()),
            failed_tasks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn store(&self) -> &Arc<dyn Database> {
        &self.store
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeStore> {
        &self.collaborators.knowledge
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    /// Tasks dropped after a handler failure since startup.
    pub fn failed_tasks(&self) -> u64 {
        self.failed_tasks.load(Ordering::Relaxed)
    }

    /// Create one agent per archetype when none exist; otherwise restart the
    /// agents that were `running` or `working`. Returns the ids started.
    pub async fn bootstrap(&self) -> Result<Vec<Uuid>, Error> {
        let agents = self.store.list_agents().await?;
        let mut started = Vec::new();

        if agents.is_empty() {
            for archetype in Archetype::ALL {
                let agent = self
                    .create_agent(archetype.default_name(), archetype, None)
                    .await?;
                self.start_agent(agent.id).await?;
                started.push(agent.id);
            }
            info!(count = started.len(), "Bootstrapped default agents");
            return Ok(started);
        }

        for agent in agents {
            match agent.status {
                AgentStatus::Running => {
                    self.start_agent(agent.id).await?;
                    started.push(agent.id);
                }
                AgentStatus::Working => {
                    // The in-flight task died with the previous process; the
                    // agent itself resumes in `running`.
                    warn!(
                        agent_id = %agent.id,
                        task = agent.current_task.as_deref().unwrap_or(""),
                        "Agent was working at shutdown; task lost"
                    );
                    self.store
                        .update_agent(agent.id, &AgentUpdate::cleared(None))
                        .await?;
                    self.start_agent(agent.id).await?;
                    started.push(agent.id);
                }
                AgentStatus::Idle => {}
            }
        }
        info!(count = started.len(), "Restarted running agents");
        Ok(started)
    }

    /// Persist a new idle agent. `config` defaults to the archetype's.
    pub async fn create_agent(
        &self,
        name: &str,
        archetype: Archetype,
        config: Option<serde_json::Value>,
    ) -> Result<AgentRecord, Error> {
        let config = config.unwrap_or_else(|| archetype.default_config());
        let agent = AgentRecord::new(name, archetype, config);
        self.store.create_agent(&agent).await?;
        info!(agent_id = %agent.id, archetype = %archetype, name, "Agent created");
        Ok(agent)
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentRecord>, Error> {
        Ok(self.store.list_agents().await?)
    }

    /// Register and start the worker for `id`. Idempotent.
    pub async fn start_agent(&self, id: Uuid) -> Result<(), Error> {
        let mut workers = self.workers.lock().await;
        if workers.contains_key(&id) {
            return Ok(());
        }

        let agent = self
            .store
            .get_agent(id)
            .await?
            .ok_or(AgentError::NotFound { id })?;

        let revived = self.retiring.lock().await.remove(&id);
        let worker = match revived {
            Some(worker) => worker,
            None => self.build_worker(&agent),
        };
        worker.start().await;
        workers.insert(id, worker);
        info!(agent_id = %id, archetype = %agent.archetype, "Agent started");
        Ok(())
    }

    /// Stop and unregister the worker for `id`. The task in hand finishes.
    pub async fn stop_agent(&self, id: Uuid) -> Result<(), Error> {
        let mut workers = self.workers.lock().await;
        let worker = workers.remove(&id).ok_or(AgentError::NotFound { id })?;
        worker.stop().await;
        self.retiring.lock().await.insert(id, worker);
        info!(agent_id = %id, "Agent stopped");
        Ok(())
    }

    /// Enqueue `task` on the first active agent of `archetype`, in creation
    /// order. Returns the chosen agent's id.
    pub async fn assign_task(&self, archetype: Archetype, task: Task) -> Result<Uuid, Error> {
        if !task_kinds(archetype).contains(&task.kind.as_str()) {
            return Err(AgentError::UnknownTaskKind {
                archetype: archetype.to_string(),
                kind: task.kind,
            }
            .into());
        }

        let agents = self.store.list_agents().await?;
        let workers = self.workers.lock().await;
        let chosen = agents
            .iter()
            .filter(|a| a.archetype == archetype && a.status.is_active())
            .find_map(|a| workers.get(&a.id));

        match chosen {
            Some(worker) => {
                let agent_id = worker.agent_id();
                info!(agent_id = %agent_id, task_id = %task.id, kind = %task.kind, "Task assigned");
                worker.enqueue(task).await;
                Ok(agent_id)
            }
            None => Err(AgentError::Unavailable {
                archetype: archetype.to_string(),
            }
            .into()),
        }
    }

    /// The registered worker for `id`, if started.
    pub async fn worker(&self, id: Uuid) -> Option<Worker> {
        self.workers.lock().await.get(&id).cloned()
    }

    pub async fn recommendations(&self, project_id: &str) -> Result<Vec<Recommendation>, Error> {
        Ok(self.collaborators.knowledge.recommendations(project_id).await?)
    }

    /// Stop every worker, wait for in-flight tasks, and mark the agents
    /// `running` again so the next `bootstrap` resumes them. Agents stopped
    /// earlier finish their task in hand and stay `idle`.
    pub async fn shutdown(&self) {
        let workers: Vec<Worker> = self.workers.lock().await.drain().map(|(_, w)| w).collect();
        let retiring: Vec<Worker> = self.retiring.lock().await.drain().map(|(_, w)| w).collect();
        join_all(workers.iter().map(|w| w.stop())).await;
        join_all(retiring.iter().map(|w| w.wait_idle())).await;
        for worker in &workers {
            worker.wait_idle().await;
            if let Err(e) = self
                .store
                .update_agent(worker.agent_id(), &AgentUpdate::status(AgentStatus::Running))
                .await
            {
                warn!(agent_id = %worker.agent_id(), error = %e, "Failed to mark agent for resume");
            }
        }
        info!(count = workers.len(), "Registry shut down");
    }

    fn build_worker(&self, agent: &AgentRecord) -> Worker {
        let deps = WorkerDeps {
            store: Arc::clone(&self.store),
            handlers: handler_table(agent.archetype, &self.collaborators),
            events: self.events.clone(),
            on_error: self.error_observer(),
        };
        Worker::new(agent.id, agent.archetype, deps)
    }

    fn error_observer(&self) -> ErrorObserver {
        let failed = Arc::clone(&self.failed_tasks);
        Arc::new(move |failure: &TaskFailure| {
            failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                agent_id = %failure.agent_id,
                archetype = %failure.archetype,
                task_id = %failure.task_id,
                kind = %failure.kind,
                error = %failure.error,
                "Task dropped"
            );
        })
    }
}
