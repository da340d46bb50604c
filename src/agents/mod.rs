//! Agent orchestration: workers, handler tables, and the registry.

pub mod context;
pub mod events;
pub mod handlers;
pub mod model;
pub mod queue;
pub mod registry;
pub mod worker;

pub use context::TaskContext;
pub use events::AgentEvent;
pub use handlers::{Collaborators, HandlerTable, KnowledgeStore, Recommendation};
pub use model::{AgentRecord, AgentStatus, Archetype, Task};
pub use registry::Registry;
pub use worker::{TaskFailure, Worker, WorkerDeps};
