//! Handler tables: task kind → procedure, one table per archetype.

mod codegen;
mod infra;
mod learning;

#[cfg(test)]
pub(crate) mod testing;

pub use codegen::CodeGenerationHandlers;
pub use infra::{InfrastructureHandlers, SUPPORTED_PROVIDERS};
pub use learning::{KnowledgeStore, LearningHandlers, ProjectKnowledge, Recommendation};

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::context::TaskContext;
use super::model::Archetype;
use crate::error::{AgentError, Error};
use crate::llm::ContentGenerator;
use crate::templates::TemplateStore;
use crate::vcs::VersionControl;

/// A closed mapping from task kind to procedure.
#[async_trait]
pub trait HandlerTable: Send + Sync {
    fn archetype(&self) -> Archetype;

    /// Every kind this table dispatches.
    fn kinds(&self) -> &'static [&'static str];

    fn handles(&self, kind: &str) -> bool {
        self.kinds().contains(&kind)
    }

    /// Run the procedure for `kind`. Unknown kinds fail with
    /// [`AgentError::UnknownTaskKind`].
    async fn dispatch(
        &self,
        kind: &str,
        payload: &serde_json::Value,
        ctx: &TaskContext,
    ) -> Result<(), Error>;
}

/// Collaborators shared by every handler table.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn ContentGenerator>,
    pub vcs: Arc<dyn VersionControl>,
    pub templates: Arc<dyn TemplateStore>,
    pub knowledge: Arc<KnowledgeStore>,
    /// Commits analyzed when a task does not say.
    pub commit_limit: usize,
}

/// The handler table for `archetype`.
pub fn handler_table(archetype: Archetype, collaborators: &Collaborators) -> Arc<dyn HandlerTable> {
    match archetype {
        Archetype::CodeGeneration => Arc::new(CodeGenerationHandlers::new(Arc::clone(
            &collaborators.generator,
        ))),
        Archetype::Infrastructure => Arc::new(InfrastructureHandlers::new(
            Arc::clone(&collaborators.generator),
            Arc::clone(&collaborators.templates),
        )),
        Archetype::Learning => Arc::new(LearningHandlers::new(
            Arc::clone(&collaborators.generator),
            Arc::clone(&collaborators.vcs),
            Arc::clone(&collaborators.knowledge),
            collaborators.commit_limit,
        )),
    }
}

/// The task kinds `archetype` accepts.
pub fn task_kinds(archetype: Archetype) -> &'static [&'static str] {
    match archetype {
        Archetype::CodeGeneration => codegen::KINDS,
        Archetype::Infrastructure => infra::KINDS,
        Archetype::Learning => learning::KINDS,
    }
}

pub(crate) fn unknown_kind(archetype: Archetype, kind: &str) -> Error {
    AgentError::UnknownTaskKind {
        archetype: archetype.to_string(),
        kind: kind.to_string(),
    }
    .into()
}

/// Deserialize a task payload, naming the kind on failure.
pub(crate) fn parse_payload<T: DeserializeOwned>(
    kind: &str,
    payload: &serde_json::Value,
) -> Result<T, AgentError> {
    serde_json::from_value(payload.clone()).map_err(|e| AgentError::InvalidPayload {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

/// Progress after `done` of `total` steps, scaled into `[from, to]`.
pub(crate) fn scaled_progress(done: usize, total: usize, from: u8, to: u8) -> u8 {
    if total == 0 {
        return to;
    }
    let span = usize::from(to.saturating_sub(from));
    from + (span * done.min(total) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use testing::stub_collaborators;

    #[test]
    fn tables_match_archetypes() {
        let collaborators = stub_collaborators();
        for archetype in Archetype::ALL {
            let table = handler_table(archetype, &collaborators);
            assert_eq!(table.archetype(), archetype);
            assert_eq!(table.kinds(), task_kinds(archetype));
        }
    }

    #[test]
    fn kinds_are_disjoint_per_archetype() {
        let collaborators = stub_collaborators();
        let codegen = handler_table(Archetype::CodeGeneration, &collaborators);
        let infra = handler_table(Archetype::Infrastructure, &collaborators);
        assert!(codegen.handles("generate_project"));
        assert!(!codegen.handles("generate_infrastructure"));
        assert!(infra.handles("validate_infrastructure"));
        assert!(!infra.handles("analyze_repository"));
    }

    #[test]
    fn progress_scaling() {
        assert_eq!(scaled_progress(0, 4, 10, 90), 10);
        assert_eq!(scaled_progress(2, 4, 10, 90), 50);
        assert_eq!(scaled_progress(4, 4, 10, 90), 90);
        assert_eq!(scaled_progress(9, 4, 10, 90), 90);
        assert_eq!(scaled_progress(0, 0, 10, 90), 90);
    }

    #[test]
    fn bad_payload_names_kind() {
        #[derive(Debug, serde::Deserialize)]
        struct P {
            #[allow(dead_code)]
            project_id: String,
        }
        let err = parse_payload::<P>("generate_file", &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, AgentError::InvalidPayload { ref kind, .. } if kind == "generate_file"));
    }
}
