//! `Database` trait — single async interface for all persistence the
//! orchestrator touches.

use async_trait::async_trait;
use uuid::Uuid;

use crate::agents::model::{
    ActivityRecord, AgentRecord, AgentUpdate, DeploymentRecord, SystemLogRecord,
};
use crate::error::DatabaseError;

/// Backend-agnostic database trait covering agents and audit records.
///
/// Writes from independent workers may interleave; `update_agent` merges the
/// given fields only, last write wins.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Agents ──────────────────────────────────────────────────────

    /// Insert a new agent.
    async fn create_agent(&self, agent: &AgentRecord) -> Result<(), DatabaseError>;

    /// Get an agent by ID.
    async fn get_agent(&self, id: Uuid) -> Result<Option<AgentRecord>, DatabaseError>;

    /// All agents in creation order.
    async fn list_agents(&self) -> Result<Vec<AgentRecord>, DatabaseError>;

    /// Merge a partial update into an agent and return the result.
    ///
    /// Returns `DatabaseError::NotFound` if the agent does not exist.
    async fn update_agent(
        &self,
        id: Uuid,
        update: &AgentUpdate,
    ) -> Result<AgentRecord, DatabaseError>;

    // ── Audit ───────────────────────────────────────────────────────

    /// Append an activity record.
    async fn create_activity(&self, record: &ActivityRecord) -> Result<(), DatabaseError>;

    /// Most recent activities first, optionally for one agent.
    async fn list_activities(
        &self,
        agent_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, DatabaseError>;

    /// Append a system log record.
    async fn create_system_log(&self, record: &SystemLogRecord) -> Result<(), DatabaseError>;

    /// Most recent log records first, optionally for one agent.
    async fn list_system_logs(
        &self,
        agent_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<SystemLogRecord>, DatabaseError>;

    // ── Deployments ─────────────────────────────────────────────────

    /// Record an infrastructure plan outcome.
    async fn create_deployment(&self, record: &DeploymentRecord) -> Result<(), DatabaseError>;

    /// Deployments for a project, most recent first.
    async fn list_deployments(
        &self,
        project_id: &str,
    ) -> Result<Vec<DeploymentRecord>, DatabaseError>;
}
