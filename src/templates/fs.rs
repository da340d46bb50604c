//! Filesystem-backed template store: `<root>/<project>/<environment>/<path>`.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::{TemplateFile, TemplateStore};
use crate::error::TemplateError;

static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid regex"));

/// Stores template sets as plain files under a root directory.
#[derive(Debug, Clone)]
pub struct FsTemplateStore {
    root: PathBuf,
}

impl FsTemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn set_dir(&self, project: &str, environment: &str) -> Result<PathBuf, TemplateError> {
        for segment in [project, environment] {
            if !SEGMENT.is_match(segment) || segment.contains("..") {
                return Err(TemplateError::InvalidPath(segment.to_string()));
            }
        }
        Ok(self.root.join(project).join(environment))
    }
}

/// Accept only plain relative paths made of normal components.
fn relative_path(path: &str) -> Result<PathBuf, TemplateError> {
    let candidate = Path::new(path);
    let clean = !path.is_empty()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if clean {
        Ok(candidate.to_path_buf())
    } else {
        Err(TemplateError::InvalidPath(path.to_string()))
    }
}

#[async_trait]
impl TemplateStore for FsTemplateStore {
    async fn save(
        &self,
        project: &str,
        environment: &str,
        files: &[TemplateFile],
    ) -> Result<(), TemplateError> {
        let dir = self.set_dir(project, environment)?;
        let targets = files
            .iter()
            .map(|f| relative_path(&f.path).map(|rel| (dir.join(rel), f)))
            .collect::<Result<Vec<_>, _>>()?;

        // Files from a previous generation must not leak into this set.
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        for (target, file) in targets {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, &file.content).await?;
        }
        debug!(project, environment, count = files.len(), "Saved templates");
        Ok(())
    }

    async fn load(
        &self,
        project: &str,
        environment: &str,
    ) -> Result<Vec<TemplateFile>, TemplateError> {
        let dir = self.set_dir(project, environment)?;
        let not_found = || TemplateError::NotFound {
            project: project.to_string(),
            environment: environment.to_string(),
        };
        if !tokio::fs::try_exists(&dir).await? {
            return Err(not_found());
        }

        let mut files = Vec::new();
        let mut pending = vec![dir.clone()];
        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(rel) = path.strip_prefix(&dir) else {
                    continue;
                };
                let content = tokio::fs::read_to_string(&path).await?;
                files.push(TemplateFile::new(
                    rel.to_string_lossy().replace('\\', "/"),
                    content,
                ));
            }
        }

        if files.is_empty() {
            return Err(not_found());
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsTemplateStore) {
        let tmp = TempDir::new().unwrap();
        let store = FsTemplateStore::new(tmp.path());
        (tmp, store)
    }

    #[tokio::test]
    async fn save_then_load_sorted() {
        let (_tmp, store) = store();
        store
            .save(
                "shop",
                "staging",
                &[
                    TemplateFile::new("modules/net/main.tf", "module \"x\" {}"),
                    TemplateFile::new("main.tf", "provider \"aws\" {}"),
                ],
            )
            .await
            .unwrap();

        let files = store.load("shop", "staging").await.unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["main.tf", "modules/net/main.tf"]);
    }

    #[tokio::test]
    async fn save_overwrites_existing_file() {
        let (_tmp, store) = store();
        store
            .save("p", "dev", &[TemplateFile::new("a.json", "{}")])
            .await
            .unwrap();
        store
            .save("p", "dev", &[TemplateFile::new("a.json", "[1]")])
            .await
            .unwrap();
        let files = store.load("p", "dev").await.unwrap();
        assert_eq!(files, vec![TemplateFile::new("a.json", "[1]")]);
    }

    #[tokio::test]
    async fn save_replaces_previous_set() {
        let (tmp, store) = store();
        store
            .save("p", "dev", &[TemplateFile::new("old.tf", "resource \"a\" \"b\" {")])
            .await
            .unwrap();
        store
            .save(
                "p",
                "dev",
                &[TemplateFile::new("main.tf", "resource \"a\" \"b\" {}\n")],
            )
            .await
            .unwrap();

        let files = store.load("p", "dev").await.unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["main.tf"]);
        assert!(!tmp.path().join("p/dev/old.tf").exists());
        assert!(store.validate("p", "dev").await.unwrap().valid);
    }

    #[tokio::test]
    async fn save_leaves_other_environments_alone() {
        let (_tmp, store) = store();
        store
            .save("p", "dev", &[TemplateFile::new("a.json", "{}")])
            .await
            .unwrap();
        store
            .save("p", "prod", &[TemplateFile::new("b.json", "{}")])
            .await
            .unwrap();
        assert_eq!(store.load("p", "dev").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_set_is_not_found() {
        let (_tmp, store) = store();
        let err = store.load("nope", "prod").await.unwrap_err();
        assert!(matches!(err, TemplateError::NotFound { .. }));
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let (_tmp, store) = store();
        for (project, env, path) in [
            ("..", "dev", "main.tf"),
            ("p", "a/b", "main.tf"),
            ("p", "dev", "../escape.tf"),
            ("p", "dev", "/etc/passwd"),
            ("p", "dev", ""),
        ] {
            let err = store
                .save(project, env, &[TemplateFile::new(path, "x")])
                .await
                .unwrap_err();
            assert!(matches!(err, TemplateError::InvalidPath(_)), "{project}/{env}/{path}");
        }
    }

    #[tokio::test]
    async fn validate_uses_stored_files() {
        let (_tmp, store) = store();
        store
            .save("p", "dev", &[TemplateFile::new("main.tf", "resource \"a\" \"b\" {")])
            .await
            .unwrap();
        let report = store.validate("p", "dev").await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.files_checked, 1);
    }
}
