//! # Harness Error Taxonomy
//!
//! Every failure the harness can surface is a variant of [`HarnessError`].
//! The binary converts these into `anyhow::Error` at the top level so that
//! any of them ends the invocation with a non-zero exit status.
//!
//! ## Categories
//!
//! - **Spawn failures**: the benchmark or profiler executable could not start
//! - **Capability failures**: the performance-counter kernel module is missing
//!   or could not be loaded without privileges
//! - **Marker parse failures**: the throughput line did not carry a number at
//!   the expected token position
//!
//! A benchmark exiting with a non-zero status is deliberately *not* an error.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while supervising, scanning, or profiling a benchmark.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The benchmark child process could not be started.
    #[error("failed to spawn benchmark `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The merged stdout/stderr pipe could not be created.
    #[error("failed to create output pipe for benchmark: {0}")]
    OutputPipe(#[source] io::Error),

    /// Waiting on a child process failed at the OS level.
    #[error("failed to wait for child process: {0}")]
    Wait(#[source] io::Error),

    /// The kernel module could not be loaded.
    #[error("kernel module `{module}` is unavailable: {reason}")]
    ModuleUnavailable { module: String, reason: String },

    /// Loading the kernel module was refused for lack of privileges.
    #[error("permission denied while loading kernel module `{module}`")]
    ModulePermissionDenied { module: String },

    /// The throughput marker line had no parseable value.
    #[error("could not parse throughput from token {token} of line {line:?}")]
    MarkerParse { line: String, token: usize },

    /// Reading the benchmark output or echoing it failed.
    #[error("I/O error while streaming benchmark output: {0}")]
    Io(#[from] io::Error),

    /// A profiling estimate was negative, zero where it must be positive, or not finite.
    #[error("invalid {name} estimate: {value} seconds")]
    InvalidEstimate { name: &'static str, value: f64 },

    /// The profiler output directory could not be created.
    #[error("failed to create profiler output directory {}: {source}", .path.display())]
    ArtifactDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The profiler executable could not be started.
    #[error("failed to spawn profiler {}: {source}", .exe.display())]
    ProfilerSpawn {
        exe: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_parse_message_names_line() {
        let err = HarnessError::MarkerParse {
            line: " Mop/s total =".to_string(),
            token: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("token 3"));
        assert!(msg.contains("Mop/s total"));
    }

    #[test]
    fn test_spawn_error_keeps_source() {
        use std::error::Error as _;
        let err = HarnessError::Spawn {
            command: "./bin/cg.A.x".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.to_string().contains("./bin/cg.A.x"));
        assert!(err.source().is_some());
    }
}
