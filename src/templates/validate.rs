//! Structural checks for Terraform, YAML, and JSON templates.
//!
//! These are sanity checks on generated text, not full parsers.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::TemplateFile;

static TF_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(resource|module|provider)\s+""#).expect("valid regex")
});

/// A problem found in one file (or in the set, when `path` is empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

/// Outcome of validating a template set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub files_checked: usize,
    pub issues: Vec<ValidationIssue>,
}

/// Validate every file by extension, plus set-level Terraform checks.
pub fn validate_files(files: &[TemplateFile]) -> ValidationReport {
    let mut issues = Vec::new();
    let mut terraform_files = 0;
    let mut terraform_blocks = false;

    for file in files {
        let problem = match extension(&file.path) {
            Some("tf") => {
                terraform_files += 1;
                terraform_blocks |= TF_BLOCK.is_match(&file.content);
                check_terraform(&file.content)
            }
            Some("yaml") | Some("yml") => check_yaml(&file.content),
            Some("json") => check_json(&file.content),
            _ => None,
        };
        if let Some(message) = problem {
            issues.push(ValidationIssue {
                path: file.path.clone(),
                message,
            });
        }
    }

    if terraform_files > 0 && !terraform_blocks {
        issues.push(ValidationIssue {
            path: String::new(),
            message: "no resource, module, or provider block in any .tf file".to_string(),
        });
    }
    if files.is_empty() {
        issues.push(ValidationIssue {
            path: String::new(),
            message: "template set is empty".to_string(),
        });
    }

    ValidationReport {
        valid: issues.is_empty(),
        files_checked: files.len(),
        issues,
    }
}

fn extension(path: &str) -> Option<&str> {
    path.rsplit_once('.').map(|(_, ext)| ext)
}

/// Braces must balance outside string literals and comments.
fn check_terraform(content: &str) -> Option<String> {
    let mut depth: i64 = 0;
    for (lineno, line) in content.lines().enumerate() {
        let mut in_string = false;
        let mut escaped = false;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if in_string {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '#' => break,
                '/' if chars.peek() == Some(&'/') => break,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth < 0 {
                        return Some(format!("unexpected '}}' on line {}", lineno + 1));
                    }
                }
                _ => {}
            }
        }
    }
    (depth != 0).then(|| format!("{depth} unclosed '{{'"))
}

fn check_yaml(content: &str) -> Option<String> {
    if content.trim().is_empty() {
        return Some("empty document".to_string());
    }
    content
        .lines()
        .position(|line| line.trim_start_matches(' ').starts_with('\t'))
        .map(|i| format!("tab indentation on line {}", i + 1))
}

fn check_json(content: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(content)
        .err()
        .map(|e| format!("invalid JSON: {e}"))
}
