use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not available")]
    Missing(String),
}

/// Access to the diff and to both versions of every changed file.
///
/// Paths are workspace-relative with forward slashes.
pub trait SourceProvider: Send + Sync {
    /// Unified diff of the working tree against `HEAD`.
    fn diff(&self) -> Result<String, SourceError>;

    /// File content as committed at `HEAD`.
    fn read_at_head(&self, path: &str) -> Result<String, SourceError>;

    /// File content as it is on disk now.
    fn read_now(&self, path: &str) -> Result<String, SourceError>;
}

/// Shells out to the `git` CLI inside a workspace.
pub struct GitSources {
    root: PathBuf,
}

impl GitSources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn git(&self, args: &[&str]) -> Result<String, SourceError> {
        debug!("git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|source| SourceError::Io {
                path: self.root.display().to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(SourceError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl SourceProvider for GitSources {
    fn diff(&self) -> Result<String, SourceError> {
        self.git(&["diff", "HEAD", "--no-color", "--no-ext-diff"])
    }

    fn read_at_head(&self, path: &str) -> Result<String, SourceError> {
        self.git(&["show", &format!("HEAD:{path}")])
    }

    fn read_now(&self, path: &str) -> Result<String, SourceError> {
        std::fs::read_to_string(self.root.join(path)).map_err(|source| SourceError::Io {
            path: path.to_string(),
            source,
        })
    }
}

/// In-memory sources for diff text supplied by the caller and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySources {
    diff: String,
    head: HashMap<String, String>,
    now: HashMap<String, String>,
}

impl MemorySources {
    pub fn new(diff: impl Into<String>) -> Self {
        Self {
            diff: diff.into(),
            ..Default::default()
        }
    }

    pub fn with_head(mut self, path: &str, text: &str) -> Self {
        self.head.insert(path.to_string(), text.to_string());
        self
    }

    pub fn with_now(mut self, path: &str, text: &str) -> Self {
        self.now.insert(path.to_string(), text.to_string());
        self
    }
}

impl SourceProvider for MemorySources {
    fn diff(&self) -> Result<String, SourceError> {
        Ok(self.diff.clone())
    }

    fn read_at_head(&self, path: &str) -> Result<String, SourceError> {
        self.head
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::Missing(format!("HEAD:{path}")))
    }

    fn read_now(&self, path: &str) -> Result<String, SourceError> {
        self.now
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::Missing(path.to_string()))
    }
}

/// Serves the working tree from disk and everything else from memory.
///
/// Used when a caller pipes in diff text but the files are on disk.
pub struct DiskSources {
    diff: String,
    git: GitSources,
}

impl DiskSources {
    pub fn new(root: impl Into<PathBuf>, diff: impl Into<String>) -> Self {
        Self {
            diff: diff.into(),
            git: GitSources::new(root),
        }
    }
}

impl SourceProvider for DiskSources {
    fn diff(&self) -> Result<String, SourceError> {
        Ok(self.diff.clone())
    }

    fn read_at_head(&self, path: &str) -> Result<String, SourceError> {
        self.git.read_at_head(path)
    }

    fn read_now(&self, path: &str) -> Result<String, SourceError> {
        self.git.read_now(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sources() {
        let sources = MemorySources::new("diff text")
            .with_head("a.py", "old")
            .with_now("a.py", "new");
        assert_eq!(sources.diff().unwrap(), "diff text");
        assert_eq!(sources.read_at_head("a.py").unwrap(), "old");
        assert_eq!(sources.read_now("a.py").unwrap(), "new");
        assert!(matches!(
            sources.read_at_head("b.py"),
            Err(SourceError::Missing(_))
        ));
    }

    #[test]
    fn test_git_sources_reads_working_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.js"), "let a = 1;\n").unwrap();
        let sources = GitSources::new(dir.path());
        assert_eq!(sources.read_now("x.js").unwrap(), "let a = 1;\n");
        assert!(matches!(
            sources.read_now("missing.js"),
            Err(SourceError::Io { .. })
        ));
    }
}
