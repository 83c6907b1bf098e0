//! Filesystem access confined to the policy's root.
//!
//! Script paths are always relative to the root; a leading `/` names the
//! root itself. Paths are normalized lexically first (so `..` cannot climb
//! out) and then canonicalized (so symlinks cannot point out).

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::interpreter::{Fault, FaultKind, Interrupt};

use super::limits::FilesystemPolicy;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("{0}")]
    Denied(String),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    fn io(path: &str, source: io::Error) -> Self {
        FsError::Io {
            path: path.to_string(),
            source,
        }
    }
}

impl From<FsError> for Interrupt {
    fn from(err: FsError) -> Self {
        match err {
            FsError::Denied(message) => {
                Interrupt::Denied(Fault::new(FaultKind::FilesystemDenied, message))
            }
            FsError::Io { .. } => Interrupt::Fault(Fault::new(FaultKind::ToolError, err.to_string())),
        }
    }
}

/// The filesystem a run can see.
#[derive(Debug, Clone)]
pub struct ScopedFs {
    policy: FilesystemPolicy,
}

impl ScopedFs {
    pub fn new(policy: FilesystemPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &FilesystemPolicy {
        &self.policy
    }

    /// Map a script path onto the host, or refuse.
    pub async fn resolve(&self, path: &str, write: bool) -> Result<PathBuf, FsError> {
        let Some(root) = self.policy.root() else {
            return Err(FsError::Denied(format!(
                "filesystem access is disabled (path '{path}')"
            )));
        };
        if write && !self.policy.allows_write() {
            return Err(FsError::Denied(format!(
                "filesystem is read-only (path '{path}')"
            )));
        }

        let relative = normalize(path).ok_or_else(|| {
            FsError::Denied(format!("path '{path}' escapes the sandbox root"))
        })?;
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| FsError::io(&root.display().to_string(), e))?;
        let full = root.join(&relative);

        let canonical = if tokio::fs::try_exists(&full).await.unwrap_or(false) {
            tokio::fs::canonicalize(&full)
                .await
                .map_err(|e| FsError::io(path, e))?
        } else {
            // Not there yet: resolve the nearest existing ancestor and append
            // the missing components, which cannot be symlinks.
            let mut existing = full.as_path();
            let mut missing = Vec::new();
            while !tokio::fs::try_exists(existing).await.unwrap_or(false) {
                if tokio::fs::symlink_metadata(existing).await.is_ok() {
                    // A dangling symlink.
                    return Err(FsError::Denied(format!(
                        "path '{path}' escapes the sandbox root"
                    )));
                }
                let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                    return Err(FsError::Denied(format!("invalid path '{path}'")));
                };
                missing.push(name.to_os_string());
                existing = parent;
            }
            let mut resolved = tokio::fs::canonicalize(existing)
                .await
                .map_err(|e| FsError::io(path, e))?;
            resolved.extend(missing.iter().rev());
            resolved
        };

        if !canonical.starts_with(&root) {
            return Err(FsError::Denied(format!(
                "path '{path}' escapes the sandbox root"
            )));
        }
        debug!(path, resolved = %canonical.display(), write, "path resolved");
        Ok(canonical)
    }

    pub async fn read_to_string(&self, path: &str) -> Result<String, FsError> {
        let resolved = self.resolve(path, false).await?;
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| FsError::io(path, e))
    }

    /// Size of a file in bytes, used to check the memory budget before reading.
    pub async fn file_len(&self, path: &str) -> Result<u64, FsError> {
        let resolved = self.resolve(path, false).await?;
        tokio::fs::metadata(&resolved)
            .await
            .map(|meta| meta.len())
            .map_err(|e| FsError::io(path, e))
    }

    /// Write a file, creating missing parent directories.
    pub async fn write(&self, path: &str, contents: &str) -> Result<(), FsError> {
        let resolved = self.resolve(path, true).await?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FsError::io(path, e))?;
        }
        tokio::fs::write(&resolved, contents)
            .await
            .map_err(|e| FsError::io(path, e))
    }

    /// Entry names of a directory, sorted, directories with a trailing `/`.
    pub async fn list(&self, path: &str) -> Result<Vec<String>, FsError> {
        let resolved = self.resolve(path, false).await?;
        let mut entries = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|e| FsError::io(path, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| FsError::io(path, e))? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }
}

/// Lexically normalize a script path into a root-relative path.
/// `None` when `..` would climb above the root.
fn normalize(path: &str) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::Normal(part) => normalized.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_write(root: &Path) -> ScopedFs {
        ScopedFs::new(FilesystemPolicy::ReadWriteScoped {
            root: root.to_path_buf(),
        })
    }

    #[test]
    fn normalize_paths() {
        assert_eq!(normalize("a/./b/../c"), Some(PathBuf::from("a/c")));
        assert_eq!(normalize("/notes.txt"), Some(PathBuf::from("notes.txt")));
        assert_eq!(normalize("."), Some(PathBuf::new()));
        assert_eq!(normalize("../etc/passwd"), None);
        assert_eq!(normalize("a/../../b"), None);
    }

    #[tokio::test]
    async fn write_then_read_inside_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs = read_write(dir.path());
        fs.write("notes.txt", "hello").await.expect("write");
        assert_eq!(fs.read_to_string("notes.txt").await.expect("read"), "hello");
        assert_eq!(fs.file_len("/notes.txt").await.expect("len"), 5);
        assert_eq!(fs.list(".").await.expect("list"), ["notes.txt"]);
    }

    #[tokio::test]
    async fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs = read_write(dir.path());
        fs.write("out/report.md", "# done").await.expect("write");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out/report.md")).expect("read"),
            "# done"
        );
        assert_eq!(fs.list("/").await.expect("list"), ["out/"]);
    }

    #[tokio::test]
    async fn disabled_policy_denies_everything() {
        let fs = ScopedFs::new(FilesystemPolicy::Disabled);
        assert!(matches!(fs.read_to_string("a.txt").await, Err(FsError::Denied(_))));
    }

    #[tokio::test]
    async fn read_only_denies_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs = ScopedFs::new(FilesystemPolicy::ReadOnlyScoped {
            root: dir.path().to_path_buf(),
        });
        assert!(matches!(fs.write("a.txt", "x").await, Err(FsError::Denied(_))));
    }

    #[tokio::test]
    async fn parent_escape_is_denied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs = read_write(dir.path());
        assert!(matches!(fs.read_to_string("../secret").await, Err(FsError::Denied(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escape_is_denied() {
        let outside = tempfile::tempdir().expect("tempdir");
        std::fs::write(outside.path().join("secret.txt"), "s").expect("write");
        let dir = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).expect("symlink");
        let fs = read_write(dir.path());
        assert!(matches!(
            fs.read_to_string("link/secret.txt").await,
            Err(FsError::Denied(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs = read_write(dir.path());
        assert!(matches!(fs.read_to_string("nope.txt").await, Err(FsError::Io { .. })));
    }
}
