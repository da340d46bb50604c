//! Learning: analyze repository history and derive recommendations.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{HandlerTable, parse_payload, scaled_progress, unknown_kind};
use crate::agents::context::TaskContext;
use crate::agents::model::Archetype;
use crate::config::MAX_COMMIT_LIMIT;
use crate::error::{AgentError, Error};
use crate::llm::{CommitAnalysis, ContentGenerator};
use crate::vcs::VersionControl;

pub(crate) const KINDS: &[&str] = &["analyze_repository", "generate_recommendations"];

/// Suggestions kept per project.
const MAX_SUGGESTIONS: usize = 50;

/// How many of the most frequent patterns become recommendations.
const TOP_PATTERNS: usize = 5;

/// Aggregate of every commit analysis for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectKnowledge {
    pub commits_analyzed: usize,
    /// Pattern → number of commits exhibiting it.
    pub patterns: BTreeMap<String, usize>,
    pub technologies: BTreeSet<String>,
    /// Distinct suggestions, oldest first.
    pub suggestions: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ProjectKnowledge {
    fn default() -> Self {
        Self {
            commits_analyzed: 0,
            patterns: BTreeMap::new(),
            technologies: BTreeSet::new(),
            suggestions: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

impl ProjectKnowledge {
    fn fold(&mut self, analysis: CommitAnalysis) {
        self.commits_analyzed += 1;
        for pattern in analysis.patterns {
            let key = pattern.trim().to_lowercase();
            if !key.is_empty() {
                *self.patterns.entry(key).or_default() += 1;
            }
        }
        self.technologies.extend(
            analysis
                .technologies
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty()),
        );
        for suggestion in analysis.suggestions {
            let suggestion = suggestion.trim().to_string();
            if !suggestion.is_empty()
                && !self.suggestions.contains(&suggestion)
                && self.suggestions.len() < MAX_SUGGESTIONS
            {
                self.suggestions.push(suggestion);
            }
        }
        self.updated_at = Utc::now();
    }

    /// Derive recommendations: recurring patterns, the observed stack, then
    /// improvement suggestions.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let mut ranked: Vec<(&String, &usize)> = self.patterns.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        let mut out: Vec<Recommendation> = ranked
            .into_iter()
            .take(TOP_PATTERNS)
            .map(|(pattern, count)| Recommendation {
                category: "pattern".to_string(),
                message: format!("Keep following '{pattern}' (seen in {count} commits)"),
            })
            .collect();

        if !self.technologies.is_empty() {
            let stack: Vec<&str> = self.technologies.iter().map(String::as_str).collect();
            out.push(Recommendation {
                category: "stack".to_string(),
                message: format!("Generate new code for the existing stack: {}", stack.join(", ")),
            });
        }

        out.extend(self.suggestions.iter().map(|s| Recommendation {
            category: "improvement".to_string(),
            message: s.clone(),
        }));
        out
    }
}

/// One actionable recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: String,
    pub message: String,
}

/// Per-project knowledge, held for the life of the process.
#[derive(Debug, Default)]
pub struct KnowledgeStore {
    projects: RwLock<HashMap<String, ProjectKnowledge>>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, project_id: &str) -> Option<ProjectKnowledge> {
        self.projects.read().await.get(project_id).cloned()
    }

    /// Fold analyses into the project's knowledge and return the result.
    pub async fn absorb(
        &self,
        project_id: &str,
        analyses: impl IntoIterator<Item = CommitAnalysis>,
    ) -> ProjectKnowledge {
        let mut projects = self.projects.write().await;
        let knowledge = projects.entry(project_id.to_string()).or_default();
        for analysis in analyses {
            knowledge.fold(analysis);
        }
        knowledge.clone()
    }

    /// Recommendations for a project. Fails when nothing was learned yet.
    pub async fn recommendations(&self, project_id: &str) -> Result<Vec<Recommendation>, AgentError> {
        match self.projects.read().await.get(project_id) {
            Some(knowledge) if knowledge.commits_analyzed > 0 => Ok(knowledge.recommendations()),
            _ => Err(AgentError::NoKnowledge(project_id.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeRepository {
    project_id: String,
    repo_path: PathBuf,
    #[serde(default)]
    commit_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct GenerateRecommendations {
    project_id: String,
}

pub struct LearningHandlers {
    generator: Arc<dyn ContentGenerator>,
    vcs: Arc<dyn VersionControl>,
    knowledge: Arc<KnowledgeStore>,
    default_commits: usize,
}

impl LearningHandlers {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        vcs: Arc<dyn VersionControl>,
        knowledge: Arc<KnowledgeStore>,
        default_commits: usize,
    ) -> Self {
        Self {
            generator,
            vcs,
            knowledge,
            default_commits,
        }
    }

    async fn analyze(&self, req: AnalyzeRepository, ctx: &TaskContext) -> Result<(), Error> {
        let limit = req
            .commit_count
            .unwrap_or(self.default_commits)
            .clamp(1, MAX_COMMIT_LIMIT);
        let commits = self.vcs.recent_commits(&req.repo_path, limit).await?;
        ctx.report_progress(10).await;

        let mut analyses = Vec::with_capacity(commits.len());
        for (i, commit) in commits.iter().enumerate() {
            let diff = self.vcs.commit_diff(&req.repo_path, &commit.hash).await?;
            let analysis = self.generator.analyze_commit(commit, &diff).await?;
            debug!(agent_id = %ctx.agent_id(), hash = %commit.hash, "Commit analyzed");
            analyses.push(analysis);
            ctx.report_progress(scaled_progress(i + 1, commits.len(), 10, 90))
                .await;
        }

        let knowledge = self.knowledge.absorb(&req.project_id, analyses).await;
        info!(
            agent_id = %ctx.agent_id(),
            project_id = %req.project_id,
            commits = commits.len(),
            total = knowledge.commits_analyzed,
            "Repository analyzed"
        );
        ctx.record_activity(
            "repository_analyzed",
            format!(
                "Analyzed {} commits from {}",
                commits.len(),
                req.repo_path.display()
            ),
            Some(&req.project_id),
            serde_json::json!({
                "commits": commits.len(),
                "commits_analyzed": knowledge.commits_analyzed,
                "patterns": knowledge.patterns.len(),
                "technologies": knowledge.technologies,
            }),
        )
        .await;
        ctx.report_progress(100).await;
        Ok(())
    }

    async fn recommend(&self, req: GenerateRecommendations, ctx: &TaskContext) -> Result<(), Error> {
        let recommendations = self.knowledge.recommendations(&req.project_id).await?;
        ctx.record_activity(
            "recommendations_generated",
            format!("{} recommendations", recommendations.len()),
            Some(&req.project_id),
            serde_json::json!({ "recommendations": recommendations }),
        )
        .await;
        ctx.report_progress(100).await;
        Ok(())
    }
}

#[async_trait]
impl HandlerTable for LearningHandlers {
    fn archetype(&self) -> Archetype {
        Archetype::Learning
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
            "analyze_repository" => self.analyze(parse_payload(kind, payload)?, ctx).await,
            "generate_recommendations" => self.recommend(parse_payload(kind, payload)?, ctx).await,
            other => Err(unknown_kind(self.archetype(), other)),
        }
    }
}
