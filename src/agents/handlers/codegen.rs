//! Code generation: whole projects or single files.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{HandlerTable, parse_payload, scaled_progress, unknown_kind};
use crate::agents::context::TaskContext;
use crate::agents::model::Archetype;
use crate::error::Error;
use crate::llm::ContentGenerator;

pub(crate) const KINDS: &[&str] = &["generate_project", "generate_file"];

#[derive(Debug, Deserialize)]
struct GenerateProject {
    project_id: String,
    project_type: String,
    #[serde(default)]
    config: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateFile {
    project_id: String,
    path: String,
    file_type: String,
    #[serde(default)]
    config: serde_json::Value,
}

pub struct CodeGenerationHandlers {
    generator: Arc<dyn ContentGenerator>,
}

impl CodeGenerationHandlers {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }

    async fn generate_project(&self, req: GenerateProject, ctx: &TaskContext) -> Result<(), Error> {
        let files = self
            .generator
            .generate_file_list(&req.project_type, &req.config)
            .await?;
        ctx.report_progress(10).await;
        info!(
            agent_id = %ctx.agent_id(),
            project_id = %req.project_id,
            files = files.len(),
            "Planned project files"
        );

        let mut generated = Vec::with_capacity(files.len());
        for (i, file) in files.iter().enumerate() {
            let content = self
                .generator
                .generate_file_content(&file.path, &file.file_type, &req.config)
                .await?;
            ctx.record_activity(
                "file_generated",
                format!("Generated {}", file.path),
                Some(&req.project_id),
                serde_json::json!({
                    "path": file.path,
                    "file_type": file.file_type,
                    "bytes": content.len(),
                    "content": content,
                }),
            )
            .await;
            generated.push(file.path.clone());
            ctx.report_progress(scaled_progress(i + 1, files.len(), 10, 100))
                .await;
        }

        ctx.record_activity(
            "project_generated",
            format!(
                "Generated {} files for {} project",
                generated.len(),
                req.project_type
            ),
            Some(&req.project_id),
            serde_json::json!({ "project_type": req.project_type, "files": generated }),
        )
        .await;
        Ok(())
    }

    async fn generate_file(&self, req: GenerateFile, ctx: &TaskContext) -> Result<(), Error> {
        let content = self
            .generator
            .generate_file_content(&req.path, &req.file_type, &req.config)
            .await?;
        ctx.record_activity(
            "file_generated",
            format!("Generated {}", req.path),
            Some(&req.project_id),
            serde_json::json!({
                "path": req.path,
                "file_type": req.file_type,
                "bytes": content.len(),
                "content": content,
            }),
        )
        .await;
        ctx.report_progress(100).await;
        Ok(())
    }
}

#[async_trait]
impl HandlerTable for CodeGenerationHandlers {
    fn archetype(&self) -> Archetype {
        Archetype::CodeGeneration
    }

    fn kinds(&self) -> &'static [&'static str] {
        KINDS
    }

    async fn dispatch(
        &self,
        kind: &str,
        payload: &serde_json::Value,
        ctx: &TaskContext,
    ) -> Result<(), Error> {
        match kind {
            "generate_project" => self.generate_project(parse_payload(kind, payload)?, ctx).await,
            "generate_file" => self.generate_file(parse_payload(kind, payload)?, ctx).await,
            other => Err(unknown_kind(self.archetype(), other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::handlers::testing::{StubGenerator, test_context};
    use crate::error::{AgentError, LlmError};

    fn handlers(generator: StubGenerator) -> CodeGenerationHandlers {
        CodeGenerationHandlers::new(Arc::new(generator))
    }

    #[tokio::test]
    async fn generate_project_records_each_file_and_summary() {
        let (ctx, store) = test_context(Archetype::CodeGeneration, "generate_project").await;
        let table = handlers(StubGenerator::with_files(&["README.md", "src/main.rs", "Cargo.toml"]));

        table
            .dispatch(
                "generate_project",
                &serde_json::json!({"project_id": "p1", "project_type": "rust-cli", "config": {"name": "demo"}}),
                &ctx,
            )
            .await
            .unwrap();

        let activities = store.list_activities(Some(ctx.agent_id()), 10).await.unwrap();
        assert_eq!(activities.len(), 4);
        assert_eq!(activities[0].action, "project_generated");
        assert_eq!(
            activities[0].metadata["files"],
            serde_json::json!(["README.md", "src/main.rs", "Cargo.toml"])
        );
        assert!(activities[1..].iter().all(|a| a.action == "file_generated"));
        assert!(activities.iter().all(|a| a.project_id.as_deref() == Some("p1")));

        let agent = store.get_agent(ctx.agent_id()).await.unwrap().unwrap();
        assert_eq!(agent.progress, 100);
    }

    #[tokio::test]
    async fn generate_project_stops_at_first_failure() {
        let (ctx, store) = test_context(Archetype::CodeGeneration, "generate_project").await;
        let mut generator = StubGenerator::with_files(&["a.rs", "b.rs", "c.rs"]);
        generator.fail_on = Some("b.rs".to_string());
        let table = handlers(generator);

        let err = table
            .dispatch(
                "generate_project",
                &serde_json::json!({"project_id": "p1", "project_type": "lib"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Llm(LlmError::RequestFailed { .. })));

        let activities = store.list_activities(Some(ctx.agent_id()), 10).await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].metadata["path"], "a.rs");
    }

    #[tokio::test]
    async fn generate_file_single_activity() {
        let (ctx, store) = test_context(Archetype::CodeGeneration, "generate_file").await;
        handlers(StubGenerator::default())
            .dispatch(
                "generate_file",
                &serde_json::json!({"project_id": "p2", "path": "src/lib.rs", "file_type": "rust"}),
                &ctx,
            )
            .await
            .unwrap();

        let activities = store.list_activities(Some(ctx.agent_id()), 10).await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].metadata["content"], "// src/lib.rs\n");
    }

    #[tokio::test]
    async fn missing_fields_are_invalid_payload() {
        let (ctx, _store) = test_context(Archetype::CodeGeneration, "generate_file").await;
        let err = handlers(StubGenerator::default())
            .dispatch("generate_file", &serde_json::json!({"path": "x"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Agent(AgentError::InvalidPayload { .. })));
    }

    #[tokio::test]
    async fn unknown_kind_fails() {
        let (ctx, _store) = test_context(Archetype::CodeGeneration, "deploy").await;
        let err = handlers(StubGenerator::default())
            .dispatch("deploy", &serde_json::Value::Null, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Agent(AgentError::UnknownTaskKind { .. })));
    }
}
