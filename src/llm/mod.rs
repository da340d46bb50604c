//! Content generation for devforge.
//!
//! Supports:
//! - **Anthropic**: Direct API access via rig-core
//! - **OpenAI**: Direct API access via rig-core
//!
//! Handlers only see the [`ContentGenerator`] trait; `RigGenerator` bridges
//! rig's `CompletionModel` to it.

mod prompts;
mod rig_generator;

pub use rig_generator::RigGenerator;

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::templates::TemplateFile;
use crate::vcs::Commit;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

/// Configuration for creating a content generator.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// A file the generator proposes for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedFile {
    pub path: String,
    #[serde(default, alias = "type")]
    pub file_type: String,
    #[serde(default)]
    pub description: String,
}

/// What the generator learned from one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Drafts code, infrastructure templates, and commit analyses.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// The files a project of `project_type` should contain.
    async fn generate_file_list(
        &self,
        project_type: &str,
        config: &serde_json::Value,
    ) -> Result<Vec<PlannedFile>, LlmError>;

    /// The full content of one file.
    async fn generate_file_content(
        &self,
        path: &str,
        file_type: &str,
        config: &serde_json::Value,
    ) -> Result<String, LlmError>;

    /// Infrastructure-as-code files for (provider, environment).
    async fn generate_infrastructure(
        &self,
        provider: &str,
        environment: &str,
        config: &serde_json::Value,
    ) -> Result<Vec<TemplateFile>, LlmError>;

    /// Analyze one commit and its diff.
    async fn analyze_commit(&self, commit: &Commit, diff: &str)
    -> Result<CommitAnalysis, LlmError>;
}

/// Create a content generator from configuration.
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn ContentGenerator>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_generator(config),
        LlmBackend::OpenAi => create_openai_generator(config),
    }
}

fn create_anthropic_generator(config: &LlmConfig) -> Result<Arc<dyn ContentGenerator>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigGenerator::new(model, "anthropic", &config.model)))
}

fn create_openai_generator(config: &LlmConfig) -> Result<Arc<dyn ContentGenerator>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigGenerator::new(model, "openai", &config.model)))
}
