//! Prompt text for each generation request.

use crate::vcs::Commit;

pub const FILE_LIST_PREAMBLE: &str = "You are a senior software architect. \
Plan the file layout of a new project. Respond with a JSON array only, no prose. \
Each element is an object with keys \"path\" (relative path), \"file_type\" \
(language or format), and \"description\" (one sentence).";

pub const FILE_CONTENT_PREAMBLE: &str = "You are a senior software engineer. \
Write the complete content of the requested file. Respond with the file content \
only, without commentary or markdown fences.";

pub const INFRASTRUCTURE_PREAMBLE: &str = "You are a cloud infrastructure engineer. \
Write infrastructure-as-code for the requested provider and environment. Respond \
with a JSON array only, no prose. Each element is an object with keys \"path\" \
(relative file path such as main.tf or k8s/deployment.yaml) and \"content\" \
(the full file text).";

pub const COMMIT_ANALYSIS_PREAMBLE: &str = "You review commits to learn how a team \
builds software. Respond with a JSON object only, with keys \"summary\" (string), \
\"patterns\" (array of short coding or architecture patterns), \"technologies\" \
(array of languages, frameworks, and tools), and \"suggestions\" (array of \
concrete improvement ideas).";

pub fn file_list(project_type: &str, config: &serde_json::Value) -> String {
    format!("Project type: {project_type}\nProject configuration:\n{config:#}")
}

pub fn file_content(path: &str, file_type: &str, config: &serde_json::Value) -> String {
    format!("File: {path}\nFile type: {file_type}\nProject configuration:\n{config:#}")
}

pub fn infrastructure(provider: &str, environment: &str, config: &serde_json::Value) -> String {
    format!("Provider: {provider}\nEnvironment: {environment}\nRequirements:\n{config:#}")
}

pub fn commit_analysis(commit: &Commit, diff: &str) -> String {
    format!(
        "Commit {hash} by {author} on {date}\nMessage: {message}\n\nDiff:\n{diff}",
        hash = commit.hash,
        author = commit.author,
        date = commit.date,
        message = commit.message,
    )
}
