//! Running a [`CommandSpec`] as a child process.
//!
//! The executor buffers both output streams in memory and reports any process that
//! ran as a [`CommandOutput`], whatever its exit code. Only faults that stop the
//! command from running to completion are errors.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::CommandSpec;

/// Why a command could not be run to completion.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The command has no program to run.
    #[error("command is empty")]
    EmptyCommand,

    /// The program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Reading from or writing to the child failed.
    #[error("I/O error while running command: {0}")]
    Io(#[from] io::Error),

    /// The provider was cancelled before or while the command ran.
    #[error("command cancelled")]
    Cancelled,
}

/// The result of a command that ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured stdout, lossily decoded as UTF-8.
    pub stdout: String,
    /// Captured stderr, lossily decoded as UTF-8.
    pub stderr: String,
    /// The exit code, `-1` when the process was killed by a signal.
    pub exit_code: i32,
}

impl CommandOutput {
    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs commands under a shared cancellation token.
///
/// Programs are looked up in the provider's own `PATH` (or an explicit search path),
/// never in the environment a command supplies for its child.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    cancel: CancellationToken,
    search_path: Option<OsString>,
}

impl CommandExecutor {
    /// Create an executor observing `cancel`.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            search_path: None,
        }
    }

    /// Look programs up in `path` instead of the process `PATH`.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    /// The token this executor observes.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolve `program` to an executable path. Unresolvable names are returned as
    /// given so the spawn reports the failure.
    fn resolve(&self, program: &str) -> PathBuf {
        let search_path = self
            .search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"));
        let cwd = std::env::current_dir().unwrap_or_default();
        match which::which_in(program, search_path, cwd) {
            Ok(path) => path,
            Err(e) => {
                debug!(program = %program, error = %e, "Program not found on search path");
                PathBuf::from(program)
            },
        }
    }

    /// Run `spec` to completion.
    pub async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        if self.cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }

        let program = spec.program().ok_or(ExecError::EmptyCommand)?;
        let args = &spec.argv[1..];

        let mut cmd = Command::new(self.resolve(program));
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !spec.environment.is_empty() {
            cmd.env_clear().envs(&spec.environment);
        }
        let stdin = spec.stdin.as_deref().filter(|s| !s.is_empty());
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: program.to_string(),
            source,
        })?;
        debug!(program = %program, args = args.len(), "Spawned command");

        // Feed stdin concurrently so a child that fills its output pipes first cannot
        // deadlock against us.
        let writer = match (stdin, child.stdin.take()) {
            (Some(text), Some(mut pipe)) => {
                let text = text.to_string();
                Some(tokio::spawn(async move {
                    pipe.write_all(text.as_bytes()).await?;
                    pipe.shutdown().await
                }))
            },
            _ => None,
        };

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = self.cancel.cancelled() => {
                warn!(program = %program, "Command cancelled, killing process");
                if let Some(writer) = writer {
                    writer.abort();
                }
                return Err(ExecError::Cancelled);
            },
        };

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {},
                Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!(program = %program, "Command exited before reading all of stdin");
                },
                Ok(Err(e)) => return Err(ExecError::Io(e)),
                Err(join) => return Err(ExecError::Io(io::Error::other(join))),
            }
        }

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        };
        debug!(program = %program, exit_code = result.exit_code, "Command finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn executor() -> CommandExecutor {
        CommandExecutor::new(CancellationToken::new())
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new(["sh", "-c", script])
    }

    #[tokio::test]
    async fn test_captures_both_streams() {
        let output = executor()
            .run(&sh("echo out; echo err >&2"))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_data() {
        let output = executor().run(&sh("echo boom >&2; exit 3")).await.unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stderr, "boom\n");
    }

    #[tokio::test]
    async fn test_stdin_is_written_and_closed() {
        let output = executor()
            .run(&CommandSpec::new(["cat"]).with_stdin("hello"))
            .await
            .unwrap();
        assert_eq!(output.stdout, "hello");
    }

    #[tokio::test]
    async fn test_no_stdin_reads_eof() {
        let output = executor().run(&CommandSpec::new(["cat"])).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "");
    }

    #[tokio::test]
    async fn test_environment_replaces_inherited() {
        std::env::set_var("COMMAND_PROVIDER_EXEC_TEST", "inherited");
        let script = "echo ${COMMAND_PROVIDER_EXEC_TEST:-unset} $VAR";
        let spec = CommandSpec::new(["/bin/sh", "-c", script]).with_env("VAR", "Hello");
        let output = executor().run(&spec).await.unwrap();
        assert_eq!(output.stdout, "unset Hello\n");
    }

    #[tokio::test]
    async fn test_empty_environment_inherits() {
        std::env::set_var("COMMAND_PROVIDER_INHERIT_TEST", "yes");
        let output = executor()
            .run(&sh("echo $COMMAND_PROVIDER_INHERIT_TEST"))
            .await
            .unwrap();
        assert_eq!(output.stdout, "yes\n");
    }

    #[tokio::test]
    async fn test_environment_keeps_program_lookup() {
        let bin = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("/bin/sh", bin.path().join("greet-tool")).unwrap();
        let exec = executor().with_search_path(bin.path());

        let plain = CommandSpec::new(["greet-tool", "-c", "echo ran"]);
        assert_eq!(exec.run(&plain).await.unwrap().stdout, "ran\n");

        let with_env = CommandSpec::new(["greet-tool", "-c", "echo $X"]).with_env("X", "1");
        let output = exec.run(&with_env).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "1\n");
    }

    #[tokio::test]
    async fn test_unresolved_program_fails_to_spawn() {
        let bin = tempfile::tempdir().unwrap();
        let exec = executor().with_search_path(bin.path());
        let err = exec
            .run(&CommandSpec::new(["greet-tool-missing"]).with_env("X", "1"))
            .await
            .unwrap_err();
        match err {
            ExecError::Spawn { program, .. } => assert_eq!(program, "greet-tool-missing"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let err = executor()
            .run(&CommandSpec::new(["/definitely/not/a/program"]))
            .await
            .unwrap_err();
        match err {
            ExecError::Spawn { program, .. } => assert_eq!(program, "/definitely/not/a/program"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_command() {
        let err = tokio_test::block_on(executor().run(&CommandSpec::default()));
        assert!(matches!(tokio_test::assert_err!(err), ExecError::EmptyCommand));
    }

    #[tokio::test]
    async fn test_signal_exit_code() {
        let output = executor().run(&sh("kill -9 $$")).await.unwrap();
        assert_eq!(output.exit_code, -1);
    }

    #[tokio::test]
    async fn test_cancel_kills_running_command() {
        let token = CancellationToken::new();
        let exec = CommandExecutor::new(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });

        let started = std::time::Instant::now();
        let err = exec.run(&sh("sleep 30")).await.unwrap_err();
        assert!(matches!(err, ExecError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_token_spawns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");

        let token = CancellationToken::new();
        token.cancel();
        let exec = CommandExecutor::new(token);

        let err = exec
            .run(&CommandSpec::new(["touch", marker.to_str().unwrap()]))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Cancelled));
        assert!(!marker.exists());
    }
}
