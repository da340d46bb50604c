//! Infrastructure template storage and validation.

mod fs;
pub mod validate;

pub use fs::FsTemplateStore;
pub use validate::{ValidationIssue, ValidationReport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TemplateError;

/// One template file, addressed relative to its (project, environment) root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateFile {
    pub path: String,
    pub content: String,
}

impl TemplateFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Stores template sets keyed by (project, environment).
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Replace the stored set for (project, environment) with `files`.
    async fn save(
        &self,
        project: &str,
        environment: &str,
        files: &[TemplateFile],
    ) -> Result<(), TemplateError>;

    /// Every stored file for (project, environment), sorted by path.
    async fn load(&self, project: &str, environment: &str)
    -> Result<Vec<TemplateFile>, TemplateError>;

    /// Validate the stored set.
    async fn validate(
        &self,
        project: &str,
        environment: &str,
    ) -> Result<ValidationReport, TemplateError> {
        let files = self.load(project, environment).await?;
        Ok(validate::validate_files(&files))
    }
}
