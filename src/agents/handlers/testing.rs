//! Stub collaborators for handler, worker, and registry tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::{Collaborators, KnowledgeStore};
use crate::agents::context::TaskContext;
use crate::agents::events;
use crate::agents::model::{AgentRecord, Archetype};
use crate::error::{LlmError, TemplateError, VcsError};
use crate::llm::{CommitAnalysis, ContentGenerator, PlannedFile};
use crate::store::{Database, LibSqlBackend};
use crate::templates::{TemplateFile, TemplateStore};
use crate::vcs::{Commit, VersionControl};

/// Holds a generator call open until the test releases it.
#[derive(Default)]
pub(crate) struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// Deterministic generator. Fails any request naming `fail_on`; project
/// planning waits on `gate` when one is set.
#[derive(Default)]
pub(crate) struct StubGenerator {
    pub files: Vec<PlannedFile>,
    pub infrastructure: Vec<TemplateFile>,
    pub fail_on: Option<String>,
    pub calls: AtomicUsize,
    pub gate: Option<Arc<Gate>>,
}

impl StubGenerator {
    pub fn with_files(paths: &[&str]) -> Self {
        Self {
            files: paths
                .iter()
                .map(|p| PlannedFile {
                    path: p.to_string(),
                    file_type: "text".to_string(),
                    description: String::new(),
                })
                .collect(),
            infrastructure: vec![TemplateFile::new(
                "main.tf",
                "provider \"aws\" {\n  region = \"us-east-1\"\n}\n",
            )],
            ..Default::default()
        }
    }

    fn check(&self, subject: &str) -> Result<(), LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_on {
            Some(needle) if subject.contains(needle.as_str()) => Err(LlmError::RequestFailed {
                provider: "stub".to_string(),
                reason: format!("refused {subject}"),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ContentGenerator for StubGenerator {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn generate_file_list(
        &self,
        project_type: &str,
        _config: &serde_json::Value,
    ) -> Result<Vec<PlannedFile>, LlmError> {
        self.check(project_type)?;
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Ok(self.files.clone())
    }

    async fn generate_file_content(
        &self,
        path: &str,
        _file_type: &str,
        _config: &serde_json::Value,
    ) -> Result<String, LlmError> {
        self.check(path)?;
        Ok(format!("// {path}\n"))
    }

    async fn generate_infrastructure(
        &self,
        provider: &str,
        _environment: &str,
        _config: &serde_json::Value,
    ) -> Result<Vec<TemplateFile>, LlmError> {
        self.check(provider)?;
        Ok(self.infrastructure.clone())
    }

    async fn analyze_commit(
        &self,
        commit: &Commit,
        _diff: &str,
    ) -> Result<CommitAnalysis, LlmError> {
        self.check(&commit.hash)?;
        Ok(CommitAnalysis {
            summary: commit.message.clone(),
            patterns: vec!["small commits".to_string()],
            technologies: vec!["rust".to_string()],
            suggestions: vec![format!("add tests for {}", commit.hash)],
        })
    }
}

/// Fixed history for every repository path.
#[derive(Default)]
pub(crate) struct StubVcs {
    pub commits: Vec<Commit>,
}

impl StubVcs {
    pub fn with_commits(count: usize) -> Self {
        Self {
            commits: (0..count)
                .map(|i| Commit {
                    hash: format!("c{i}"),
                    author: "Test User".to_string(),
                    date: "2024-01-01T00:00:00+00:00".to_string(),
                    message: format!("Commit {i}"),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl VersionControl for StubVcs {
    async fn recent_commits(&self, repo: &Path, limit: usize) -> Result<Vec<Commit>, VcsError> {
        if repo.as_os_str().is_empty() {
            return Err(VcsError::RepositoryNotFound(repo.to_path_buf()));
        }
        Ok(self.commits.iter().take(limit).cloned().collect())
    }

    async fn commit_diff(&self, _repo: &Path, hash: &str) -> Result<String, VcsError> {
        Ok(format!("+++ {hash}\n"))
    }
}

/// Template sets kept in memory.
#[derive(Default)]
pub(crate) struct MemoryTemplateStore {
    sets: Mutex<HashMap<(String, String), Vec<TemplateFile>>>,
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn save(
        &self,
        project: &str,
        environment: &str,
        files: &[TemplateFile],
    ) -> Result<(), TemplateError> {
        let mut set = files.to_vec();
        set.sort_by(|a, b| a.path.cmp(&b.path));
        self.sets
            .lock()
            .await
            .insert((project.to_string(), environment.to_string()), set);
        Ok(())
    }

    async fn load(
        &self,
        project: &str,
        environment: &str,
    ) -> Result<Vec<TemplateFile>, TemplateError> {
        self.sets
            .lock()
            .await
            .get(&(project.to_string(), environment.to_string()))
            .cloned()
            .ok_or_else(|| TemplateError::NotFound {
                project: project.to_string(),
                environment: environment.to_string(),
            })
    }
}

pub(crate) fn stub_collaborators() -> Collaborators {
    Collaborators {
        generator: Arc::new(StubGenerator::with_files(&["README.md", "src/main.rs"])),
        vcs: Arc::new(StubVcs::with_commits(3)),
        templates: Arc::new(MemoryTemplateStore::default()),
        knowledge: Arc::new(KnowledgeStore::new()),
        commit_limit: 10,
    }
}

/// An in-memory store holding one agent, and a context for a task on it.
pub(crate) async fn test_context(
    archetype: Archetype,
    kind: &str,
) -> (TaskContext, Arc<dyn Database>) {
    let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let agent = AgentRecord::new("test", archetype, archetype.default_config());
    store.create_agent(&agent).await.unwrap();
    let ctx = TaskContext::new(agent.id, "t1", kind, Arc::clone(&store), events::channel(64));
    (ctx, store)
}
