//! # Profiler Scheduler
//!
//! Runs AMD uProf PCM alongside the benchmark so that it samples memory
//! bandwidth during the main computation phase only.
//!
//! ## Scheduling
//!
//! The profiler does not watch the benchmark. By default it is started once
//! the caller's *estimated* initialization duration has elapsed since the
//! benchmark start, and asked to sample for the *estimated* run duration,
//! truncated to whole seconds. Estimates come from an earlier `time` run and
//! may drift from the actual phase boundaries of this run.
//!
//! With [`ProfilerTrigger::SplitMarker`] the launch is instead driven by the
//! scanner's first sighting of the initialization marker.
//!
//! ## Invocation
//!
//! ```text
//! AMDuProfPcm -m memory -a -d <whole seconds> -o out/<benchmark>.csv
//! ```

use crate::{cli::HarnessConfig, error::HarnessError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// What releases the profiler launch.
#[derive(Debug)]
pub enum ProfilerTrigger {
    /// Launch once this long has passed since the benchmark started
    Estimated(Duration),
    /// Launch when the scanner reports the phase-split marker
    SplitMarker(oneshot::Receiver<Duration>),
}

/// How the scheduled profiler run ended.
#[derive(Clone, Copy, Debug)]
pub enum ProfilerOutcome {
    Completed {
        /// Time from benchmark start to profiler spawn
        launched_after: Duration,
        status: ExitStatus,
    },
    /// The trigger never fired, so the profiler was not started
    Skipped,
}

/// One scheduled run of the external profiler.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfilerJob {
    pub profiler_exe: PathBuf,
    pub run_duration: f64,
    pub artifact: PathBuf,
}

impl ProfilerJob {
    pub fn new(config: &HarnessConfig, command: &str, run_duration: f64) -> Self {
        Self {
            profiler_exe: config.profiler_exe.clone(),
            run_duration,
            artifact: artifact_path(&config.output_dir, command),
        }
    }

    /// Sampling duration handed to the profiler, truncated to whole seconds.
    pub fn duration_secs(&self) -> u64 {
        self.run_duration.floor() as u64
    }

    pub fn args(&self) -> Vec<OsString> {
        vec![
            "-m".into(),
            "memory".into(),
            "-a".into(),
            "-d".into(),
            self.duration_secs().to_string().into(),
            "-o".into(),
            self.artifact.clone().into_os_string(),
        ]
    }

    /// Create the artifact's parent directory; existing directories are fine.
    pub fn prepare_output_dir(&self) -> Result<(), HarnessError> {
        match self.artifact.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                std::fs::create_dir_all(dir).map_err(|source| HarnessError::ArtifactDir {
                    path: dir.to_path_buf(),
                    source,
                })
            }
            _ => Ok(()),
        }
    }

    /// Wait for `trigger`, then run the profiler to completion.
    ///
    /// `started_at` is the benchmark's pre-spawn instant; estimated delays are
    /// measured from it rather than from when this future is first polled.
    pub async fn schedule(
        self,
        trigger: ProfilerTrigger,
        started_at: Instant,
    ) -> Result<ProfilerOutcome, HarnessError> {
        match trigger {
            ProfilerTrigger::Estimated(delay) => {
                let launch_at = started_at.checked_add(delay).ok_or(HarnessError::InvalidEstimate {
                    name: "initialization duration",
                    value: delay.as_secs_f64(),
                })?;
                debug!("Profiler scheduled {:?} after benchmark start", delay);
                tokio::time::sleep_until(tokio::time::Instant::from_std(launch_at)).await;
            }
            ProfilerTrigger::SplitMarker(rx) => match rx.await {
                Ok(init) => debug!("Initialization marker after {:?}; starting profiler", init),
                Err(_) => {
                    warn!("Benchmark output ended without an initialization marker; profiler not started");
                    return Ok(ProfilerOutcome::Skipped);
                }
            },
        }

        let launched_after = started_at.elapsed();
        info!(
            "Starting profiler for {}s, writing {}",
            self.duration_secs(),
            self.artifact.display()
        );

        let status = Command::new(&self.profiler_exe)
            .args(self.args())
            .status()
            .await
            .map_err(|source| HarnessError::ProfilerSpawn {
                exe: self.profiler_exe.clone(),
                source,
            })?;

        if !status.success() {
            warn!("Profiler exited with {}", status);
        }

        Ok(ProfilerOutcome::Completed {
            launched_after,
            status,
        })
    }
}

/// `<output_dir>/<benchmark basename>.csv`
///
/// The base name comes from the program part of the command, so
/// `./bin/cg.C.x` becomes `out/cg.C.x.csv`.
pub fn artifact_path(output_dir: &Path, command: &str) -> PathBuf {
    let name = command
        .split_whitespace()
        .next()
        .and_then(|program| Path::new(program).file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("benchmark");
    output_dir.join(format!("{}.csv", name))
}
