//! Infrastructure: draft, store, and validate IaC templates.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use super::{HandlerTable, parse_payload, unknown_kind};
use crate::agents::context::TaskContext;
use crate::agents::model::{Archetype, DeploymentRecord, DeploymentStatus, LogLevel};
use crate::error::{AgentError, Error};
use crate::llm::ContentGenerator;
use crate::templates::{TemplateStore, ValidationReport};

pub(crate) const KINDS: &[&str] = &["generate_infrastructure", "validate_infrastructure"];

/// Providers the infrastructure agent will draft templates for.
pub const SUPPORTED_PROVIDERS: &[&str] = &["aws", "gcp", "azure", "kubernetes", "docker"];

#[derive(Debug, Deserialize)]
struct GenerateInfrastructure {
    project_id: String,
    provider: String,
    environment: String,
    #[serde(default)]
    config: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ValidateInfrastructure {
    project_id: String,
    environment: String,
    #[serde(default)]
    provider: Option<String>,
}

pub struct InfrastructureHandlers {
    generator: Arc<dyn ContentGenerator>,
    templates: Arc<dyn TemplateStore>,
}

impl InfrastructureHandlers {
    pub fn new(generator: Arc<dyn ContentGenerator>, templates: Arc<dyn TemplateStore>) -> Self {
        Self {
            generator,
            templates,
        }
    }

    async fn generate(&self, req: GenerateInfrastructure, ctx: &TaskContext) -> Result<(), Error> {
        if !SUPPORTED_PROVIDERS.contains(&req.provider.as_str()) {
            return Err(AgentError::InvalidPayload {
                kind: ctx.kind().to_string(),
                reason: format!("unsupported provider '{}'", req.provider),
            }
            .into());
        }

        let files = self
            .generator
            .generate_infrastructure(&req.provider, &req.environment, &req.config)
            .await?;
        ctx.report_progress(40).await;

        self.templates
            .save(&req.project_id, &req.environment, &files)
            .await?;
        ctx.report_progress(70).await;

        let report = self
            .templates
            .validate(&req.project_id, &req.environment)
            .await?;
        ctx.report_progress(90).await;

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        let status = record_outcome(ctx, &req.project_id, &req.provider, &req.environment, &report).await?;
        ctx.record_activity(
            "infrastructure_generated",
            format!(
                "Generated {} {} templates for {} ({})",
                files.len(),
                req.provider,
                req.environment,
                status.as_str()
            ),
            Some(&req.project_id),
            serde_json::json!({ "provider": req.provider, "environment": req.environment, "files": paths }),
        )
        .await;
        ctx.report_progress(100).await;
        Ok(())
    }

    async fn validate(&self, req: ValidateInfrastructure, ctx: &TaskContext) -> Result<(), Error> {
        let report = self
            .templates
            .validate(&req.project_id, &req.environment)
            .await?;
        ctx.report_progress(60).await;

        let provider = req.provider.as_deref().unwrap_or("unspecified");
        let status = record_outcome(ctx, &req.project_id, provider, &req.environment, &report).await?;
        ctx.record_activity(
            "infrastructure_validated",
            format!(
                "Validated {} templates for {}: {}",
                report.files_checked,
                req.environment,
                status.as_str()
            ),
            Some(&req.project_id),
            serde_json::to_value(&report).unwrap_or_default(),
        )
        .await;
        ctx.report_progress(100).await;
        Ok(())
    }
}

/// Persist a Deployment reflecting `report`.
async fn record_outcome(
    ctx: &TaskContext,
    project_id: &str,
    provider: &str,
    environment: &str,
    report: &ValidationReport,
) -> Result<DeploymentStatus, Error> {
    let status = if report.valid {
        DeploymentStatus::Planned
    } else {
        warn!(
            agent_id = %ctx.agent_id(),
            project_id,
            environment,
            issues = report.issues.len(),
            "Templates failed validation"
        );
        ctx.log(
            LogLevel::Warn,
            format!(
                "{} validation issues in {project_id}/{environment}",
                report.issues.len()
            ),
        )
        .await;
        DeploymentStatus::Invalid
    };
    let record = DeploymentRecord::new(project_id, provider, environment, status)
        .with_details(serde_json::to_value(report).unwrap_or_default());
    ctx.store().create_deployment(&record).await?;
    info!(project_id, environment, status = status.as_str(), "Deployment recorded");
    Ok(status)
}

#[async_trait]
impl HandlerTable for InfrastructureHandlers {
    fn archetype(&self) -> Archetype {
        Archetype::Infrastructure
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
            "generate_infrastructure" => self.generate(parse_payload(kind, payload)?, ctx).await,
            "validate_infrastructure" => self.validate(parse_payload(kind, payload)?, ctx).await,
            other => Err(unknown_kind(self.archetype(), other)),
        }
    }
}
