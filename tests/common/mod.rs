//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::broadcast;

use devforge::agents::handlers::{Collaborators, KnowledgeStore};
use devforge::agents::{AgentEvent, Registry, events};
use devforge::error::LlmError;
use devforge::llm::{CommitAnalysis, ContentGenerator, PlannedFile};
use devforge::store::{Database, LibSqlBackend};
use devforge::templates::{FsTemplateStore, TemplateFile};
use devforge::vcs::{Commit, GitCli};

/// Maximum time any test is allowed to run before we consider it hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Canned generator (no real API calls).
pub struct StubGenerator;

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
        Ok(vec![
            PlannedFile {
                path: "README.md".to_string(),
                file_type: "markdown".to_string(),
                description: format!("{project_type} readme"),
            },
            PlannedFile {
                path: "src/main.rs".to_string(),
                file_type: "rust".to_string(),
                description: "entry point".to_string(),
            },
        ])
    }

    async fn generate_file_content(
        &self,
        path: &str,
        _file_type: &str,
        _config: &serde_json::Value,
    ) -> Result<String, LlmError> {
        Ok(format!("// {path}\n"))
    }

    async fn generate_infrastructure(
        &self,
        provider: &str,
        environment: &str,
        _config: &serde_json::Value,
    ) -> Result<Vec<TemplateFile>, LlmError> {
        if provider == "kubernetes" {
            // Tab indentation fails validation.
            return Ok(vec![TemplateFile::new("deployment.yaml", "spec:\n\treplicas: 2\n")]);
        }
        Ok(vec![
            TemplateFile::new(
                "main.tf",
                format!(
                    "provider \"{provider}\" {{\n  region = \"us-east-1\"\n}}\n\nresource \"null_resource\" \"{environment}\" {{}}\n"
                ),
            ),
            TemplateFile::new("terraform.tfvars.json", "{\"env\": \"x\"}"),
        ])
    }

    async fn analyze_commit(
        &self,
        commit: &Commit,
        diff: &str,
    ) -> Result<CommitAnalysis, LlmError> {
        Ok(CommitAnalysis {
            summary: commit.message.clone(),
            patterns: vec!["one file per commit".to_string()],
            technologies: vec!["text".to_string()],
            suggestions: vec![format!("describe {} lines of change", diff.lines().count())],
        })
    }
}

pub struct Fixture {
    pub registry: Arc<Registry>,
    pub store: Arc<dyn Database>,
    pub templates_dir: TempDir,
}

impl Fixture {
    pub fn events(&self) -> broadcast::Receiver<AgentEvent> {
        self.registry.subscribe()
    }
}

/// In-memory database, filesystem templates, real git, stub generator.
pub async fn fixture() -> Fixture {
    let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let templates_dir = TempDir::new().unwrap();
    let collaborators = Collaborators {
        generator: Arc::new(StubGenerator),
        vcs: Arc::new(GitCli::new()),
        templates: Arc::new(FsTemplateStore::new(templates_dir.path())),
        knowledge: Arc::new(KnowledgeStore::new()),
        commit_limit: 10,
    };
    let registry = Arc::new(Registry::new(
        Arc::clone(&store),
        collaborators,
        events::channel(256),
    ));
    Fixture {
        registry,
        store,
        templates_dir,
    }
}

/// Wait for a terminal event for `task_id`.
pub async fn wait_terminal(rx: &mut broadcast::Receiver<AgentEvent>, task_id: &str) -> AgentEvent {
    tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if event.is_terminal() && event.task_id() == Some(task_id) {
                return event;
            }
        }
    })
    .await
    .expect("task did not finish")
}

fn git(path: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(path)
        .args(args)
        .output()
        .expect("git not available");
    assert!(output.status.success(), "git {args:?} failed");
}

/// A repository with `commits` commits, each adding one file.
pub fn create_test_repo(commits: usize) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path();
    git(path, &["init"]);
    git(path, &["config", "user.email", "test@example.com"]);
    git(path, &["config", "user.name", "Test User"]);
    for i in 1..=commits {
        std::fs::write(path.join(format!("file{i}.txt")), format!("File {i}\n")).unwrap();
        git(path, &["add", "."]);
        git(path, &["commit", "-m", &format!("Commit {i}")]);
    }
    temp_dir
}
