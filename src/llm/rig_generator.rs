//! [`ContentGenerator`] over a rig completion model.

use async_trait::async_trait;
use rig::agent::AgentBuilder;
use rig::completion::{CompletionModel, Prompt};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{CommitAnalysis, ContentGenerator, PlannedFile, prompts};
use crate::error::LlmError;
use crate::templates::TemplateFile;
use crate::vcs::Commit;

const MAX_TOKENS: u64 = 4096;

/// Sends one preamble + prompt pair per request and parses the reply.
pub struct RigGenerator<M: CompletionModel> {
    model: M,
    provider: &'static str,
    model_name: String,
}

impl<M: CompletionModel> RigGenerator<M> {
    pub fn new(model: M, provider: &'static str, model_name: &str) -> Self {
        Self {
            model,
            provider,
            model_name: model_name.to_string(),
        }
    }

    async fn complete(&self, preamble: &str, prompt: String) -> Result<String, LlmError> {
        let agent = AgentBuilder::new(self.model.clone())
            .preamble(preamble)
            .max_tokens(MAX_TOKENS)
            .build();
        let reply = agent
            .prompt(prompt)
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.provider.to_string(),
                reason: e.to_string(),
            })?;
        debug!(model = %self.model_name, bytes = reply.len(), "Completion received");
        Ok(reply)
    }

    fn parse<T: DeserializeOwned>(&self, reply: &str) -> Result<T, LlmError> {
        serde_json::from_str(extract_json(reply)).map_err(|e| LlmError::InvalidResponse {
            provider: self.provider.to_string(),
            reason: format!("expected JSON: {e}"),
        })
    }
}

/// The JSON payload inside a reply, tolerating fences and surrounding prose.
pub(crate) fn extract_json(reply: &str) -> &str {
    let body = strip_fence(reply);
    let start = body.find(['{', '[']);
    let end = body.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if start <= end => &body[start..=end],
        _ => body,
    }
}

/// Contents of the first fenced code block, or the trimmed reply.
pub(crate) fn strip_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[open + 3..];
    // Skip the info string (e.g. "json") up to the end of the fence line.
    let Some(newline) = after_open.find('\n') else {
        return trimmed;
    };
    let inner = &after_open[newline + 1..];
    match inner.find("```") {
        Some(close) => inner[..close].trim_end(),
        None => inner.trim_end(),
    }
}

#[async_trait]
impl<M> ContentGenerator for RigGenerator<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn generate_file_list(
        &self,
        project_type: &str,
        config: &serde_json::Value,
    ) -> Result<Vec<PlannedFile>, LlmError> {
        let reply = self
            .complete(prompts::FILE_LIST_PREAMBLE, prompts::file_list(project_type, config))
            .await?;
        self.parse(&reply)
    }

    async fn generate_file_content(
        &self,
        path: &str,
        file_type: &str,
        config: &serde_json::Value,
    ) -> Result<String, LlmError> {
        let reply = self
            .complete(
                prompts::FILE_CONTENT_PREAMBLE,
                prompts::file_content(path, file_type, config),
            )
            .await?;
        Ok(strip_fence(&reply).to_string())
    }

    async fn generate_infrastructure(
        &self,
        provider: &str,
        environment: &str,
        config: &serde_json::Value,
    ) -> Result<Vec<TemplateFile>, LlmError> {
        let reply = self
            .complete(
                prompts::INFRASTRUCTURE_PREAMBLE,
                prompts::infrastructure(provider, environment, config),
            )
            .await?;
        self.parse(&reply)
    }

    async fn analyze_commit(
        &self,
        commit: &Commit,
        diff: &str,
    ) -> Result<CommitAnalysis, LlmError> {
        let reply = self
            .complete(
                prompts::COMMIT_ANALYSIS_PREAMBLE,
                prompts::commit_analysis(commit, diff),
            )
            .await?;
        self.parse(&reply)
    }
}
