//! Invocation of the git executable

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::thread;

use crate::error::StoreError;
use crate::objects::ObjectFormat;

/// Versions of every git executable probed by this process
static PROBED: OnceLock<Mutex<HashMap<PathBuf, String>>> = OnceLock::new();

/// Make sure `program` runs, probing it at most once per process
pub fn ensure_available(program: &Path) -> Result<String, StoreError> {
    let probed = PROBED.get_or_init(Default::default);
    let mut probed = probed.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(version) = probed.get(program) {
        return Ok(version.clone());
    }

    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .map_err(|source| StoreError::Spawn {
            program: program.display().to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(StoreError::Command {
            command: "--version".to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    tracing::debug!("using {} ({})", program.display(), version);
    probed.insert(program.to_path_buf(), version.clone());
    Ok(version)
}

/// git command whose behaviour does not depend on the caller's environment
/// or on user configuration that could rewrite file content
fn isolated(program: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .env_remove("GIT_INDEX_FILE")
        .env_remove("GIT_OBJECT_DIRECTORY")
        .env_remove("GIT_ALTERNATE_OBJECT_DIRECTORIES")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_TERMINAL_PROMPT", "0")
        .args(["-c", "core.autocrlf=false"])
        .args(["-c", "core.safecrlf=false"])
        .args(["-c", "safe.directory=*"])
        .args(["-c", "gc.auto=0"]);
    cmd
}

/// Create a repository at `path` and return a handle to its git directory
pub fn init_repository(
    program: &Path,
    path: &Path,
    bare: bool,
    format: ObjectFormat,
) -> Result<Git, StoreError> {
    ensure_available(program)?;

    let mut args: Vec<OsString> = vec!["init".into(), "--quiet".into()];
    if bare {
        args.push("--bare".into());
    }
    // Older git predates --object-format; SHA-1 is its only format anyway
    if format != ObjectFormat::Sha1 {
        args.push(format!("--object-format={format}").into());
    }
    args.push(path.as_os_str().to_owned());

    let git_dir = if bare { path.to_path_buf() } else { path.join(".git") };
    let mut cmd = isolated(program);
    cmd.args(&args);
    if let Some(parent) = path.parent() {
        cmd.current_dir(parent);
    }

    GitCommand {
        inner: cmd,
        display: "init".to_string(),
        stdin: None,
    }
    .output()?;

    Ok(Git {
        program: program.to_path_buf(),
        git_dir,
        work_tree: None,
    })
}

/// A git directory, optionally paired with a work tree
#[derive(Debug, Clone)]
pub struct Git {
    program: PathBuf,
    git_dir: PathBuf,
    work_tree: Option<PathBuf>,
}

impl Git {
    /// Same git directory, operating on `work_tree`
    pub fn with_work_tree(&self, work_tree: &Path) -> Self {
        Self {
            work_tree: Some(work_tree.to_path_buf()),
            ..self.clone()
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Build a git command for this repository with an isolated environment
    pub fn command<I, S>(&self, args: I) -> GitCommand
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let display = args
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");

        let mut cmd = isolated(&self.program);
        cmd.arg("--git-dir").arg(&self.git_dir);
        match &self.work_tree {
            Some(work_tree) => {
                cmd.arg("--work-tree").arg(work_tree).current_dir(work_tree);
            }
            None => {
                cmd.current_dir(&self.git_dir);
            }
        }
        cmd.args(&args);

        GitCommand {
            inner: cmd,
            display,
            stdin: None,
        }
    }
}

/// A pending git invocation
pub struct GitCommand {
    inner: Command,
    display: String,
    stdin: Option<Stdio>,
}

impl GitCommand {
    pub fn env(mut self, key: &str, value: impl AsRef<OsStr>) -> Self {
        self.inner.env(key, value);
        self
    }

    pub fn stdin(mut self, stdin: Stdio) -> Self {
        self.stdin = Some(stdin);
        self
    }

    fn spawn_error(&self, source: io::Error) -> StoreError {
        StoreError::Spawn {
            program: format!("git {}", self.display),
            source,
        }
    }

    /// Run to completion and return stdout, failing on a non-zero exit
    pub fn output(mut self) -> Result<Vec<u8>, StoreError> {
        tracing::debug!("git {}", self.display);
        let stdin = self.stdin.take().unwrap_or_else(Stdio::null);
        let output = self
            .inner
            .stdin(stdin)
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(StoreError::Command {
                command: self.display,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// Run to completion and return trimmed stdout as text
    pub fn output_text(self) -> Result<String, StoreError> {
        let stdout = self.output()?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    /// Run and report whether git exited successfully
    ///
    /// Only a failure to start git is an error.
    pub fn succeeds(mut self) -> Result<bool, StoreError> {
        tracing::debug!("git {}", self.display);
        let stdin = self.stdin.take().unwrap_or_else(Stdio::null);
        let status = self
            .inner
            .stdin(stdin)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| self.spawn_error(e))?;
        Ok(status.success())
    }

    /// Feed `input` on stdin and stream stdout into `output`
    ///
    /// stderr is drained on a separate thread while stdout is copied. If
    /// copying fails the child is killed and reaped before returning.
    pub fn stream_to<W: Write>(mut self, input: &[u8], output: &mut W) -> Result<u64, StoreError> {
        tracing::debug!("git {}", self.display);
        let mut child = self
            .inner
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut stderr = Vec::new();
                // A read error only loses diagnostics
                let _ = pipe.read_to_end(&mut stderr);
                stderr
            })
        });

        let copied = feed_and_copy(&mut child, input, output, &self.display);
        let copied = match copied {
            Ok(copied) => copied,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                if let Some(reader) = stderr_reader {
                    let _ = reader.join();
                }
                return Err(e);
            }
        };

        let status = child
            .wait()
            .map_err(|e| StoreError::io(format!("failed to wait for git {}", self.display), e))?;
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(StoreError::Command {
                command: self.display,
                status,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(copied)
    }
}

/// Write `input` to the child's stdin, close it, and copy its stdout into `output`
fn feed_and_copy<W: Write>(
    child: &mut Child,
    input: &[u8],
    output: &mut W,
    display: &str,
) -> Result<u64, StoreError> {
    // Dropping the handle closes stdin so git sees end of input
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input)
            .map_err(|e| StoreError::io(format!("failed to write to git {display}"), e))?;
    }

    match child.stdout.take() {
        Some(mut stdout) => io::copy(&mut stdout, output)
            .map_err(|e| StoreError::io(format!("failed to copy output of git {display}"), e)),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_is_cached() {
        let git = Path::new("git");
        let first = ensure_available(git).unwrap();
        let second = ensure_available(git).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("git version"));
    }

    #[test]
    fn test_missing_program_fails_to_spawn() {
        let err = ensure_available(Path::new("/nonexistent/gitpack-no-such-git")).unwrap_err();
        assert!(matches!(err, StoreError::Spawn { .. }));
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader went away"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn bare_repo(dir: &tempfile::TempDir) -> Git {
        init_repository(Path::new("git"), &dir.path().join("repo.git"), true, ObjectFormat::Sha1)
            .unwrap()
    }

    #[test]
    fn test_stream_failure_carries_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        let git = bare_repo(&dir);

        let mut out = Vec::new();
        let err = git
            .command(["pack-objects", "--revs", "--stdout"])
            .stream_to(b"0123456789abcdef0123456789abcdef01234567\n", &mut out)
            .unwrap_err();
        match err {
            StoreError::Command { stderr, .. } => assert!(stderr.contains("bad object")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stream_into_broken_writer_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let git = bare_repo(&dir);

        let err = git
            .command(["version"])
            .stream_to(b"", &mut BrokenWriter)
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }), "got {err}");
    }
}
