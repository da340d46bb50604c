//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::{Connection, Database as LibSqlDatabase, Value, params};
use tracing::info;
use uuid::Uuid;

use crate::agents::model::{
    ActivityRecord, AgentRecord, AgentStatus, AgentUpdate, Archetype, DeploymentRecord,
    DeploymentStatus, LogLevel, SystemLogRecord,
};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::Database;

const AGENT_COLUMNS: &str =
    "id, name, archetype, status, current_task, progress, config, created_at, updated_at";

const ACTIVITY_COLUMNS: &str = "id, agent_id, project_id, action, description, metadata, created_at";

const LOG_COLUMNS: &str = "id, level, source, message, agent_id, metadata, created_at";

const DEPLOYMENT_COLUMNS: &str =
    "id, project_id, provider, environment, status, details, created_at";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(raw: &str, field: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::Query(format!("{field} parse: {e}")))
}

fn parse_json(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or(serde_json::Value::Null)
}

fn to_json(value: &serde_json::Value) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn column(row: &libsql::Row, idx: i32, field: &str) -> Result<String, DatabaseError> {
    row.get::<String>(idx)
        .map_err(|e| DatabaseError::Query(format!("{field}: {e}")))
}

fn row_to_agent(row: &libsql::Row) -> Result<AgentRecord, DatabaseError> {
    let id: String = column(row, 0, "agent.id")?;
    let archetype: String = column(row, 2, "agent.archetype")?;
    let status: String = column(row, 3, "agent.status")?;
    let progress: i64 = row.get(5).unwrap_or(0);
    let config: String = row.get(6).unwrap_or_else(|_| "{}".to_string());
    let created_at: String = column(row, 7, "agent.created_at")?;
    let updated_at: String = column(row, 8, "agent.updated_at")?;

    Ok(AgentRecord {
        id: parse_uuid(&id, "agent.id")?,
        name: column(row, 1, "agent.name")?,
        archetype: archetype
            .parse::<Archetype>()
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
        status: status
            .parse::<AgentStatus>()
            .map_err(DatabaseError::Serialization)?,
        current_task: row.get::<String>(4).ok(),
        progress: progress.clamp(0, 100) as u8,
        config: parse_json(&config),
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

fn row_to_activity(row: &libsql::Row) -> Result<ActivityRecord, DatabaseError> {
    let id: String = column(row, 0, "activity.id")?;
    let agent_id: String = column(row, 1, "activity.agent_id")?;
    let metadata: String = row.get(5).unwrap_or_default();
    let created_at: String = column(row, 6, "activity.created_at")?;

    Ok(ActivityRecord {
        id: parse_uuid(&id, "activity.id")?,
        agent_id: parse_uuid(&agent_id, "activity.agent_id")?,
        project_id: row.get::<String>(2).ok(),
        action: column(row, 3, "activity.action")?,
        description: column(row, 4, "activity.description")?,
        metadata: parse_json(&metadata),
        created_at: parse_datetime(&created_at),
    })
}

fn row_to_log(row: &libsql::Row) -> Result<SystemLogRecord, DatabaseError> {
    let id: String = column(row, 0, "log.id")?;
    let level: String = column(row, 1, "log.level")?;
    let agent_id = match row.get::<String>(4).ok() {
        Some(raw) => Some(parse_uuid(&raw, "log.agent_id")?),
        None => None,
    };
    let metadata: String = row.get(5).unwrap_or_default();
    let created_at: String = column(row, 6, "log.created_at")?;

    Ok(SystemLogRecord {
        id: parse_uuid(&id, "log.id")?,
        level: level
            .parse::<LogLevel>()
            .map_err(DatabaseError::Serialization)?,
        source: column(row, 2, "log.source")?,
        message: column(row, 3, "log.message")?,
        agent_id,
        metadata: parse_json(&metadata),
        created_at: parse_datetime(&created_at),
    })
}

fn row_to_deployment(row: &libsql::Row) -> Result<DeploymentRecord, DatabaseError> {
    let id: String = column(row, 0, "deployment.id")?;
    let status: String = column(row, 4, "deployment.status")?;
    let details: String = row.get(5).unwrap_or_default();
    let created_at: String = column(row, 6, "deployment.created_at")?;

    Ok(DeploymentRecord {
        id: parse_uuid(&id, "deployment.id")?,
        project_id: column(row, 1, "deployment.project_id")?,
        provider: column(row, 2, "deployment.provider")?,
        environment: column(row, 3, "deployment.environment")?,
        status: status
            .parse::<DeploymentStatus>()
            .map_err(DatabaseError::Serialization)?,
        details: parse_json(&details),
        created_at: parse_datetime(&created_at),
    })
}

/// `LIMIT` bound; SQLite treats negative as unlimited so clamp into i64.
fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Agents ──────────────────────────────────────────────────────

    async fn create_agent(&self, agent: &AgentRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO agents ({AGENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    agent.id.to_string(),
                    agent.name.clone(),
                    agent.archetype.as_str(),
                    agent.status.as_str(),
                    agent.current_task.clone(),
                    agent.progress as i64,
                    to_json(&agent.config)?,
                    agent.created_at.to_rfc3339(),
                    agent.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_agent: {e}")))?;
        Ok(())
    }

    async fn get_agent(&self, id: Uuid) -> Result<Option<AgentRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_agent: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_agent(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_agent row: {e}"))),
        }
    }

    async fn list_agents(&self) -> Result<Vec<AgentRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY created_at ASC, rowid ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_agents: {e}")))?;

        let mut agents = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            agents.push(row_to_agent(&row)?);
        }
        Ok(agents)
    }

    async fn update_agent(
        &self,
        id: Uuid,
        update: &AgentUpdate,
    ) -> Result<AgentRecord, DatabaseError> {
        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        let mut set = |column: &str, value: Value| {
            values.push(value);
            sets.push(format!("{column} = ?{}", values.len()));
        };

        if let Some(status) = update.status {
            set("status", Value::Text(status.as_str().to_string()));
        }
        if let Some(ref current_task) = update.current_task {
            set(
                "current_task",
                current_task.clone().map(Value::Text).unwrap_or(Value::Null),
            );
        }
        if let Some(progress) = update.progress {
            set("progress", Value::Integer(progress.min(100) as i64));
        }
        if let Some(ref config) = update.config {
            set("config", Value::Text(to_json(config)?));
        }
        set("updated_at", Value::Text(Utc::now().to_rfc3339()));

        values.push(Value::Text(id.to_string()));
        let sql = format!(
            "UPDATE agents SET {} WHERE id = ?{}",
            sets.join(", "),
            values.len()
        );

        let changed = self
            .conn()
            .execute(&sql, Params::Positional(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("update_agent: {e}")))?;

        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "agent".to_string(),
                id: id.to_string(),
            });
        }

        self.get_agent(id).await?.ok_or_else(|| DatabaseError::NotFound {
            entity: "agent".to_string(),
            id: id.to_string(),
        })
    }

    // ── Audit ───────────────────────────────────────────────────────

    async fn create_activity(&self, record: &ActivityRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO activities ({ACTIVITY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    record.id.to_string(),
                    record.agent_id.to_string(),
                    record.project_id.clone(),
                    record.action.clone(),
                    record.description.clone(),
                    to_json(&record.metadata)?,
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_activity: {e}")))?;
        Ok(())
    }

    async fn list_activities(
        &self,
        agent_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, DatabaseError> {
        let mut rows = match agent_id {
            Some(agent_id) => {
                self.conn()
                    .query(
                        &format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE agent_id = ?1 ORDER BY rowid DESC LIMIT ?2"),
                        params![agent_id.to_string(), limit_param(limit)],
                    )
                    .await
            }
            None => {
                self.conn()
                    .query(
                        &format!("SELECT {ACTIVITY_COLUMNS} FROM activities ORDER BY rowid DESC LIMIT ?1"),
                        params![limit_param(limit)],
                    )
                    .await
            }
        }
        .map_err(|e| DatabaseError::Query(format!("list_activities: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            records.push(row_to_activity(&row)?);
        }
        Ok(records)
    }

    async fn create_system_log(&self, record: &SystemLogRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO system_logs ({LOG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    record.id.to_string(),
                    record.level.as_str(),
                    record.source.clone(),
                    record.message.clone(),
                    record.agent_id.map(|id| id.to_string()),
                    to_json(&record.metadata)?,
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_system_log: {e}")))?;
        Ok(())
    }

    async fn list_system_logs(
        &self,
        agent_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<SystemLogRecord>, DatabaseError> {
        let mut rows = match agent_id {
            Some(agent_id) => {
                self.conn()
                    .query(
                        &format!("SELECT {LOG_COLUMNS} FROM system_logs WHERE agent_id = ?1 ORDER BY rowid DESC LIMIT ?2"),
                        params![agent_id.to_string(), limit_param(limit)],
                    )
                    .await
            }
            None => {
                self.conn()
                    .query(
                        &format!("SELECT {LOG_COLUMNS} FROM system_logs ORDER BY rowid DESC LIMIT ?1"),
                        params![limit_param(limit)],
                    )
                    .await
            }
        }
        .map_err(|e| DatabaseError::Query(format!("list_system_logs: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            records.push(row_to_log(&row)?);
        }
        Ok(records)
    }

    // ── Deployments ─────────────────────────────────────────────────

    async fn create_deployment(&self, record: &DeploymentRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO deployments ({DEPLOYMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    record.id.to_string(),
                    record.project_id.clone(),
                    record.provider.clone(),
                    record.environment.clone(),
                    record.status.as_str(),
                    to_json(&record.details)?,
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_deployment: {e}")))?;
        Ok(())
    }

    async fn list_deployments(
        &self,
        project_id: &str,
    ) -> Result<Vec<DeploymentRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {DEPLOYMENT_COLUMNS} FROM deployments WHERE project_id = ?1 ORDER BY rowid DESC"),
                params![project_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_deployments: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            records.push(row_to_deployment(&row)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_agent(name: &str, archetype: Archetype) -> AgentRecord {
        AgentRecord::new(name, archetype, serde_json::json!({"max_files": 5}))
    }

    // ── Agent tests ─────────────────────────────────────────────────

    #[tokio::test]
    async fn create_and_get_agent() {
        let db = test_db().await;
        let agent = make_agent("coder", Archetype::CodeGeneration);
        db.create_agent(&agent).await.unwrap();

        let fetched = db.get_agent(agent.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, agent.id);
        assert_eq!(fetched.name, "coder");
        assert_eq!(fetched.archetype, Archetype::CodeGeneration);
        assert_eq!(fetched.status, AgentStatus::Idle);
        assert!(fetched.current_task.is_none());
        assert_eq!(fetched.config, serde_json::json!({"max_files": 5}));
    }

    #[tokio::test]
    async fn get_agent_not_found() {
        let db = test_db().await;
        assert!(db.get_agent(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_agents_in_creation_order() {
        let db = test_db().await;
        let names = ["first", "second", "third"];
        for name in names {
            db.create_agent(&make_agent(name, Archetype::Learning))
                .await
                .unwrap();
        }

        let listed: Vec<String> = db
            .list_agents()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(listed, names);
    }

    #[tokio::test]
    async fn update_agent_merges_fields() {
        let db = test_db().await;
        let agent = make_agent("infra", Archetype::Infrastructure);
        db.create_agent(&agent).await.unwrap();

        let updated = db
            .update_agent(agent.id, &AgentUpdate::working_on("generate_infrastructure"))
            .await
            .unwrap();
        assert_eq!(updated.status, AgentStatus::Working);
        assert_eq!(updated.current_task.as_deref(), Some("generate_infrastructure"));

        let updated = db
            .update_agent(agent.id, &AgentUpdate::progress(70))
            .await
            .unwrap();
        assert_eq!(updated.progress, 70);
        assert_eq!(updated.status, AgentStatus::Working);
        assert_eq!(updated.current_task.as_deref(), Some("generate_infrastructure"));

        let updated = db
            .update_agent(agent.id, &AgentUpdate::cleared(Some(AgentStatus::Running)))
            .await
            .unwrap();
        assert_eq!(updated.status, AgentStatus::Running);
        assert_eq!(updated.progress, 0);
        assert!(updated.current_task.is_none());
        assert_eq!(updated.config, agent.config);
    }

    #[tokio::test]
    async fn update_missing_agent_is_not_found() {
        let db = test_db().await;
        let err = db
            .update_agent(Uuid::new_v4(), &AgentUpdate::status(AgentStatus::Running))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    // ── Audit tests ─────────────────────────────────────────────────

    #[tokio::test]
    async fn activities_most_recent_first() {
        let db = test_db().await;
        let agent_id = Uuid::new_v4();
        let other = Uuid::new_v4();

        db.create_activity(&ActivityRecord::new(agent_id, "a", "first").with_project("p1"))
            .await
            .unwrap();
        db.create_activity(&ActivityRecord::new(other, "b", "other agent"))
            .await
            .unwrap();
        db.create_activity(
            &ActivityRecord::new(agent_id, "c", "second")
                .with_metadata(serde_json::json!({"files": 3})),
        )
        .await
        .unwrap();

        let mine = db.list_activities(Some(agent_id), 10).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].description, "second");
        assert_eq!(mine[0].metadata["files"], 3);
        assert_eq!(mine[1].project_id.as_deref(), Some("p1"));

        let all = db.list_activities(None, 2).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn system_logs_round_trip() {
        let db = test_db().await;
        let agent_id = Uuid::new_v4();
        db.create_system_log(
            &SystemLogRecord::new(LogLevel::Error, "worker", "task failed").for_agent(agent_id),
        )
        .await
        .unwrap();
        db.create_system_log(&SystemLogRecord::new(LogLevel::Info, "registry", "bootstrap"))
            .await
            .unwrap();

        let logs = db.list_system_logs(Some(agent_id), 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, LogLevel::Error);
        assert_eq!(logs[0].agent_id, Some(agent_id));

        let all = db.list_system_logs(None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].agent_id.is_none());
    }

    #[tokio::test]
    async fn deployments_by_project() {
        let db = test_db().await;
        db.create_deployment(
            &DeploymentRecord::new("shop", "aws", "staging", DeploymentStatus::Planned)
                .with_details(serde_json::json!({"files": ["main.tf"]})),
        )
        .await
        .unwrap();
        db.create_deployment(&DeploymentRecord::new(
            "blog",
            "gcp",
            "prod",
            DeploymentStatus::Invalid,
        ))
        .await
        .unwrap();

        let shop = db.list_deployments("shop").await.unwrap();
        assert_eq!(shop.len(), 1);
        assert_eq!(shop[0].status, DeploymentStatus::Planned);
        assert_eq!(shop[0].details["files"][0], "main.tf");
    }

    #[tokio::test]
    async fn local_database_creates_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("devforge.db");
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        db.create_agent(&make_agent("x", Archetype::Learning))
            .await
            .unwrap();
        assert!(path.exists());
    }
}
