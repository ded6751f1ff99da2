//! # Process Supervisor
//!
//! Launches the benchmark command through the shell with its standard output
//! and standard error merged into a single OS pipe, and waits for it to exit.
//!
//! The session start instant is taken immediately before the spawn and the end
//! instant immediately after the wait resolves, so the measured total covers
//! the whole lifetime of the child as seen from the harness.
//!
//! ## Merged Output
//!
//! Both stdio handles of the child are clones of the same `os_pipe` writer.
//! The parent keeps only the reader end; once the child (and any process it
//! forked) exits, the reader sees end-of-stream.

use crate::{cli::HarnessConfig, error::HarnessError};
use chrono::Local;
use os_pipe::PipeReader;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Launches benchmark commands with the configured environment overlay.
#[derive(Clone, Debug)]
pub struct Supervisor {
    shell: String,
    thread_env_var: String,
    thread_count: usize,
}

/// A benchmark child that has been started but not yet reaped.
#[derive(Debug)]
pub struct RunningBenchmark {
    child: Child,
    command: String,
    started_at: Instant,
}

/// How and when the benchmark finished.
#[derive(Clone, Copy, Debug)]
pub struct BenchmarkExit {
    pub status: ExitStatus,
    pub ended_at: Instant,
    /// Wall-clock time between the pre-spawn and post-wait instants
    pub elapsed: Duration,
}

impl Supervisor {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            thread_env_var: config.thread_env_var.clone(),
            thread_count: config.thread_count,
        }
    }

    /// Start `command` through the shell.
    ///
    /// ## Returns
    ///
    /// - `Ok((RunningBenchmark, PipeReader))`: the child handle and the read end
    ///   of its merged stdout/stderr stream.
    /// - `Err(HarnessError::Spawn)`: the command's executable is missing or not
    ///   executable, or the shell itself could not be started.
    pub fn launch(&self, command: &str) -> Result<(RunningBenchmark, PipeReader), HarnessError> {
        preflight(command)?;

        let (reader, writer) = os_pipe::pipe().map_err(HarnessError::OutputPipe)?;
        let stderr_writer = writer.try_clone().map_err(HarnessError::OutputPipe)?;

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .env(&self.thread_env_var, self.thread_count.to_string())
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer);

        debug!(
            "Spawning `{} -c {}` with {}={}",
            self.shell, command, self.thread_env_var, self.thread_count
        );

        let started_wall = Local::now();
        let started_at = Instant::now();
        let child = cmd.spawn().map_err(|source| HarnessError::Spawn {
            command: command.to_string(),
            source,
        })?;
        // The command still owns our copies of the pipe writer; they must be
        // closed or the reader never sees end-of-stream.
        drop(cmd);

        info!(
            "Benchmark started at {} (pid {})",
            started_wall.format("%Y-%m-%d %H:%M:%S%.3f"),
            child.id().map_or("unknown".to_string(), |p| p.to_string())
        );

        Ok((
            RunningBenchmark {
                child,
                command: command.to_string(),
                started_at,
            },
            reader,
        ))
    }
}

impl RunningBenchmark {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Non-blocking check for whether the child has exited.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>, HarnessError> {
        self.child.try_wait().map_err(HarnessError::Wait)
    }

    /// Block until the benchmark exits.
    ///
    /// A non-zero exit status is returned, not raised. If the wait itself
    /// fails the child is killed so its output stream reaches end-of-stream.
    pub async fn wait(mut self) -> Result<BenchmarkExit, HarnessError> {
        let status = match self.child.wait().await {
            Ok(status) => status,
            Err(e) => {
                let _ = self.child.start_kill();
                return Err(HarnessError::Wait(e));
            }
        };
        let ended_at = Instant::now();
        let elapsed = ended_at.saturating_duration_since(self.started_at);
        debug!("Benchmark exited with {} after {:?}", status, elapsed);
        Ok(BenchmarkExit {
            status,
            ended_at,
            elapsed,
        })
    }
}

/// Characters that make the shell rewrite a word before running it.
const SHELL_EXPANSION: &[char] = &['$', '~', '\'', '"', '\\', '`', '='];

/// Reject commands whose executable path is missing or not executable.
///
/// The shell would otherwise start fine and exit 126/127, hiding the failure
/// behind an ordinary exit status. Bare program names are left to the shell's
/// `PATH` lookup, and words the shell expands or unquotes (`$NPB/bin/cg.A.x`,
/// `~/npb/cg.A.x`, `'my dir/cg.A.x'`, `VAR=1 ./cg.A.x`) are left to the shell
/// as well; their exit code is checked after the run instead.
fn preflight(command: &str) -> Result<(), HarnessError> {
    let program = match command.split_whitespace().next() {
        Some(p) => p,
        None => {
            return Err(HarnessError::Spawn {
                command: command.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            })
        }
    };
    if !program.contains('/') || program.contains(SHELL_EXPANSION) {
        return Ok(());
    }

    let spawn_err = |kind: std::io::ErrorKind, msg: &str| HarnessError::Spawn {
        command: command.to_string(),
        source: std::io::Error::new(kind, format!("{}: {}", program, msg)),
    };

    let metadata = std::fs::metadata(Path::new(program))
        .map_err(|_| spawn_err(std::io::ErrorKind::NotFound, "no such file"))?;
    if !metadata.is_file() {
        return Err(spawn_err(std::io::ErrorKind::InvalidInput, "not a regular file"));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(spawn_err(
                std::io::ErrorKind::PermissionDenied,
                "permission denied",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn supervisor_with_threads(threads: usize) -> Supervisor {
        Supervisor::new(&HarnessConfig {
            thread_count: threads,
            ..HarnessConfig::default()
        })
    }

    async fn run_to_string(supervisor: &Supervisor, command: &str) -> (BenchmarkExit, String) {
        let (running, mut reader) = supervisor.launch(command).unwrap();
        let exit = running.wait().await.unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        (exit, out)
    }

    #[tokio::test]
    async fn test_thread_count_is_exported() {
        let (_, out) = run_to_string(&supervisor_with_threads(7), "echo threads=$OMP_NUM_THREADS").await;
        assert_eq!(out.trim(), "threads=7");
    }

    #[tokio::test]
    async fn test_environment_is_overlaid_not_replaced() {
        let (_, out) = run_to_string(&supervisor_with_threads(64), "echo path=${PATH:+set}").await;
        assert_eq!(out.trim(), "path=set");
    }

    #[tokio::test]
    async fn test_stderr_is_merged_into_stream() {
        let (_, out) = run_to_string(&supervisor_with_threads(1), "echo out; echo err 1>&2").await;
        assert!(out.contains("out"));
        assert!(out.contains("err"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let (exit, _) = run_to_string(&supervisor_with_threads(1), "exit 3").await;
        assert_eq!(exit.status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_elapsed_covers_child_lifetime() {
        let (exit, _) = run_to_string(&supervisor_with_threads(1), "sleep 0.2").await;
        assert!(exit.elapsed >= Duration::from_millis(200));
    }

    #[test]
    fn test_missing_executable_is_spawn_error() {
        let err = supervisor_with_threads(1)
            .launch("/nonexistent/dir/cg.A.x --flag")
            .unwrap_err();
        match err {
            HarnessError::Spawn { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_file_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_exec");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        let err = supervisor_with_threads(1)
            .launch(path.to_str().unwrap())
            .unwrap_err();
        match err {
            HarnessError::Spawn { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shell_expanded_paths_are_left_to_the_shell() {
        for command in [
            "$NPB_DIR/bin/cg.A.x",
            "${NPB_DIR}/bin/cg.A.x --flag",
            "~/npb/bin/cg.A.x",
            "'/opt/my npb/bin/cg.A.x'",
            "\"/opt/npb/bin/cg.A.x\"",
            "OMP_PROC_BIND=true ./bin/cg.A.x",
            "/opt/npb\\ 3.4/bin/cg.A.x",
        ] {
            assert!(preflight(command).is_ok(), "{}", command);
        }
        assert!(preflight("/nonexistent/npb/bin/cg.A.x").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_var_path_runs_through_shell() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("ep.S.x");
        std::fs::write(&script, "#!/bin/sh\necho ran ep\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        std::env::set_var("NPB_HARNESS_EP_DIR", dir.path());
        let (exit, out) =
            run_to_string(&supervisor_with_threads(1), "$NPB_HARNESS_EP_DIR/ep.S.x").await;
        assert!(exit.status.success());
        assert_eq!(out.trim(), "ran ep");
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(matches!(
            supervisor_with_threads(1).launch("   "),
            Err(HarnessError::Spawn { .. })
        ));
    }
}
