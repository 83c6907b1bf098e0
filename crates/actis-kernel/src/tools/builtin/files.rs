//! read_files / write_file / list_files over the scoped filesystem.

use async_trait::async_trait;

use crate::interpreter::{Dict, Fault, Interrupt, Value};
use crate::sandbox::FsError;
use crate::tools::{Tool, ToolArgs, ToolContext};

/// Read several files into a `{path: content}` dict.
///
/// A path outside the policy denies the whole call. Other read errors are
/// reported in place of that file's content.
pub struct ReadFiles;

#[async_trait]
impl Tool for ReadFiles {
    fn name(&self) -> &str {
        "read_files"
    }

    async fn execute(&self, args: ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
        let paths = match args.required("read_files", 0, "paths")? {
            Value::List(items) | Value::Tuple(items) => items.clone(),
            other => {
                return Err(Fault::type_error(format!(
                    "read_files() argument 'paths' must be a list of str, not {}",
                    other.type_name()
                ))
                .into());
            }
        };

        let mut contents = Dict::new();
        for path in paths.iter() {
            let Some(path) = path.as_str() else {
                return Err(Fault::type_error(format!(
                    "read_files() paths must be str, not {}",
                    path.type_name()
                ))
                .into());
            };
            let text = match read_one(path, ctx).await {
                Ok(text) => text,
                Err(ReadError::Interrupt(interrupt)) => return Err(interrupt),
                Err(ReadError::Io(message)) => format!("Error reading file: {message}"),
            };
            contents.insert(Value::str(path), Value::str(text))?;
        }
        Ok(Value::dict(contents))
    }
}

enum ReadError {
    Interrupt(Interrupt),
    Io(String),
}

impl From<FsError> for ReadError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::Denied(_) => ReadError::Interrupt(err.into()),
            FsError::Io { .. } => ReadError::Io(err.to_string()),
        }
    }
}

async fn read_one(path: &str, ctx: &mut ToolContext<'_>) -> Result<String, ReadError> {
    let len = ctx.fs.file_len(path).await?;
    ctx.budget
        .check_alloc(usize::try_from(len).unwrap_or(usize::MAX))
        .map_err(ReadError::Interrupt)?;
    Ok(ctx.fs.read_to_string(path).await?)
}

/// Write text to a file, creating parent directories.
pub struct WriteFile;

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    async fn execute(&self, args: ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
        let path = args.str_arg("write_file", 0, "path")?;
        let content = args.str_arg("write_file", 1, "content")?;
        let status = match ctx.fs.write(path, content).await {
            Ok(()) => format!("Successfully wrote to {path}"),
            Err(err @ FsError::Denied(_)) => return Err(err.into()),
            Err(err) => format!("Error writing to file: {err}"),
        };
        let mut result = Dict::new();
        result.insert(Value::str("status"), Value::str(status))?;
        Ok(Value::dict(result))
    }
}

/// List a directory; subdirectories carry a trailing `/`.
pub struct ListFiles;

#[async_trait]
impl Tool for ListFiles {
    fn name(&self) -> &str {
        "list_files"
    }

    async fn execute(&self, args: ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
        let path = match args.get(0, "path") {
            None | Some(Value::None) => ".",
            Some(_) => args.str_arg("list_files", 0, "path")?,
        };
        let entries = ctx.fs.list(path).await?;
        let value = Value::list(entries.into_iter().map(Value::str).collect());
        ctx.budget.check_alloc(value.estimated_size())?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::interpreter::FaultKind;
    use crate::sandbox::{Budget, FilesystemPolicy, NetworkGuard, NetworkPolicy, OutputBuffer, ScopedFs};

    struct Harness {
        fs: ScopedFs,
        net: NetworkGuard,
        stdout: OutputBuffer,
        stderr: OutputBuffer,
        budget: Budget,
    }

    impl Harness {
        fn new(policy: FilesystemPolicy, memory: usize) -> Self {
            Self {
                fs: ScopedFs::new(policy),
                net: NetworkGuard::new(NetworkPolicy::Deny),
                stdout: OutputBuffer::default(),
                stderr: OutputBuffer::default(),
                budget: Budget::new(Duration::from_secs(5), memory),
            }
        }

        async fn run(&mut self, tool: &dyn Tool, args: Vec<Value>) -> Result<Value, Interrupt> {
            let mut ctx = ToolContext {
                fs: &self.fs,
                net: &self.net,
                stdout: &mut self.stdout,
                stderr: &mut self.stderr,
                budget: &mut self.budget,
            };
            tool.execute(ToolArgs::from_positional(args), &mut ctx).await
        }
    }

    fn paths(names: &[&str]) -> Value {
        Value::list(names.iter().map(|n| Value::str(*n)).collect())
    }

    #[tokio::test]
    async fn read_files_reports_missing_files_inline() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "alpha").expect("write");
        let mut h = Harness::new(
            FilesystemPolicy::ReadOnlyScoped { root: dir.path().to_path_buf() },
            1 << 20,
        );
        let value = h
            .run(&ReadFiles, vec![paths(&["a.txt", "missing.txt"])])
            .await
            .expect("read");
        let Value::Dict(dict) = value else { panic!("expected dict") };
        assert_eq!(dict.get(&Value::str("a.txt")), Some(&Value::str("alpha")));
        let missing = dict.get(&Value::str("missing.txt")).expect("entry");
        assert!(missing.to_str().starts_with("Error reading file:"));
    }

    #[tokio::test]
    async fn read_files_outside_root_is_denied() {
        let dir = TempDir::new().expect("tempdir");
        let mut h = Harness::new(
            FilesystemPolicy::ReadOnlyScoped { root: dir.path().to_path_buf() },
            1 << 20,
        );
        match h.run(&ReadFiles, vec![paths(&["../etc/passwd"])]).await {
            Err(Interrupt::Denied(fault)) => assert_eq!(fault.kind, FaultKind::FilesystemDenied),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn large_file_exceeds_memory_budget() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("big.txt"), "x".repeat(4096)).expect("write");
        let mut h = Harness::new(
            FilesystemPolicy::ReadOnlyScoped { root: dir.path().to_path_buf() },
            1024,
        );
        assert!(matches!(
            h.run(&ReadFiles, vec![paths(&["big.txt"])]).await,
            Err(Interrupt::ResourceExceeded(_))
        ));
    }

    #[tokio::test]
    async fn write_then_list() {
        let dir = TempDir::new().expect("tempdir");
        let mut h = Harness::new(
            FilesystemPolicy::ReadWriteScoped { root: dir.path().to_path_buf() },
            1 << 20,
        );
        let status = h
            .run(&WriteFile, vec![Value::str("notes/today.md"), Value::str("hi")])
            .await
            .expect("write");
        assert_eq!(status.repr(), "{'status': 'Successfully wrote to notes/today.md'}");
        let listed = h.run(&ListFiles, vec![]).await.expect("list");
        assert_eq!(listed.repr(), "['notes/']");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes/today.md")).expect("read back"),
            "hi"
        );
    }

    #[tokio::test]
    async fn read_only_policy_refuses_writes() {
        let dir = TempDir::new().expect("tempdir");
        let mut h = Harness::new(
            FilesystemPolicy::ReadOnlyScoped { root: dir.path().to_path_buf() },
            1 << 20,
        );
        assert!(matches!(
            h.run(&WriteFile, vec![Value::str("x.txt"), Value::str("data")]).await,
            Err(Interrupt::Denied(_))
        ));
    }
}
