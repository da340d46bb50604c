//! devforge — agent orchestration and task scheduling core.

pub mod agents;
pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod store;
pub mod templates;
pub mod vcs;
