//! # Run Sessions
//!
//! A session is one end-to-end execution of a benchmark command. This module
//! wires the supervisor, scanner, and profiler together for the two modes.
//!
//! ## Concurrency Model
//!
//! ```text
//!  main task ──launch──► benchmark child ──merged stdout/stderr──┐
//!      │                                                        │
//!      │                       spawn_blocking: MarkerScanner ◄──┘
//!      │                              │ (echo + first sightings)
//!      ├── wait(child) ───────────────┤
//!      ├── join(scanner) ◄── MarkerObservations
//!      └── join(profiler) ◄── tokio task: delay/marker → AMDuProfPcm
//! ```
//!
//! The scanner's findings reach the main task only through its join handle,
//! after the stream has been drained, so the report never sees a half-written
//! observation.

use crate::{
    capability::ModuleLoader,
    cli::HarnessConfig,
    error::HarnessError,
    profiler::{ProfilerJob, ProfilerOutcome, ProfilerTrigger},
    report::{Report, ReportTail},
    scanner::{MarkerObservations, MarkerScanner},
    supervisor::{RunningBenchmark, Supervisor},
};
use os_pipe::PipeReader;
use std::io::BufReader;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Caller-supplied estimates for profiling mode.
///
/// Both values normally come from an earlier `time` run of the same
/// benchmark. `init_duration: None` starts the profiler on the live
/// initialization marker instead.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProfilePlan {
    pub init_duration: Option<f64>,
    pub run_duration: f64,
}

/// Everything measured during one benchmark execution.
#[derive(Clone, Debug)]
pub struct RunSession {
    pub started_at: Instant,
    pub ended_at: Instant,
    pub observations: MarkerObservations,
}

impl RunSession {
    pub fn total(&self) -> Duration {
        self.ended_at.saturating_duration_since(self.started_at)
    }

    fn report(&self, tail: ReportTail) -> Report {
        Report::new(self.total(), self.observations.initialization, tail)
    }
}

/// Entry point for running benchmarks in either mode.
#[derive(Clone, Debug)]
pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run `command` once and report its phase split and throughput.
    pub async fn time(&self, command: &str) -> Result<Report, HarnessError> {
        let session = self.run_session(command, None).await?;
        Ok(session.report(ReportTail::Throughput(session.observations.throughput)))
    }

    /// Run `command` with the profiler sampling its main phase.
    ///
    /// The kernel module is loaded through `loader` first; if that fails
    /// nothing is spawned.
    pub async fn profile(
        &self,
        command: &str,
        plan: ProfilePlan,
        loader: &dyn ModuleLoader,
    ) -> Result<Report, HarnessError> {
        let module = &self.config.kernel_module;
        loader.load(module).await.into_result(module)?;

        if !(plan.run_duration.is_finite() && plan.run_duration > 0.0) {
            return Err(HarnessError::InvalidEstimate {
                name: "run duration",
                value: plan.run_duration,
            });
        }

        let (trigger, split_tx) = match plan.init_duration {
            Some(secs) => {
                let invalid = || HarnessError::InvalidEstimate {
                    name: "initialization duration",
                    value: secs,
                };
                let delay = Duration::try_from_secs_f64(secs).map_err(|_| invalid())?;
                // The launch instant must be representable from the benchmark start.
                if Instant::now().checked_add(delay).is_none() {
                    return Err(invalid());
                }
                (ProfilerTrigger::Estimated(delay), None)
            }
            None => {
                let (tx, rx) = oneshot::channel();
                (ProfilerTrigger::SplitMarker(rx), Some(tx))
            }
        };

        let job = ProfilerJob::new(&self.config, command, plan.run_duration);
        job.prepare_output_dir()?;
        let artifact = job.artifact.clone();

        let (running, reader) = Supervisor::new(&self.config).launch(command)?;
        let profiler = tokio::spawn(job.schedule(trigger, running.started_at()));

        let session = self.supervise(running, reader, split_tx).await;
        // Join the profiler even when the benchmark side failed; it may still
        // be sampling.
        let outcome = profiler.await?;
        let session = session?;

        if let ProfilerOutcome::Completed { launched_after, .. } = outcome? {
            info!("Profiler started {:.2}s after the benchmark", launched_after.as_secs_f64());
        }

        Ok(session.report(ReportTail::Artifact(artifact)))
    }

    async fn run_session(
        &self,
        command: &str,
        split_tx: Option<oneshot::Sender<Duration>>,
    ) -> Result<RunSession, HarnessError> {
        let (running, reader) = Supervisor::new(&self.config).launch(command)?;
        self.supervise(running, reader, split_tx).await
    }

    /// Scan the output concurrently with waiting on the child, then join both.
    async fn supervise(
        &self,
        running: RunningBenchmark,
        reader: PipeReader,
        split_tx: Option<oneshot::Sender<Duration>>,
    ) -> Result<RunSession, HarnessError> {
        let command = running.command().to_string();
        let started_at = running.started_at();

        let scanner = MarkerScanner::from_config(&self.config);
        let scan = tokio::task::spawn_blocking(move || {
            scanner.scan(BufReader::new(reader), std::io::stdout(), started_at, split_tx)
        });

        let (exit, observations) = join_scan_after(running.wait().await, scan).await?;

        match exit.status.code() {
            Some(code @ (126 | 127)) => warn!(
                "Benchmark `{}` exited with {}; the shell could not run it (code {})",
                command, exit.status, code
            ),
            _ if !exit.status.success() => {
                warn!("Benchmark `{}` exited with {}", command, exit.status)
            }
            _ => {}
        }
        if observations.initialization.is_none() {
            warn!("No `{}` line seen; initialization counted as zero", self.config.split_marker);
        }

        Ok(RunSession {
            started_at,
            ended_at: exit.ended_at,
            observations,
        })
    }
}

/// Join the scanning task whatever the wait on the child returned.
///
/// A wait error is reported in preference to anything the scanner says.
async fn join_scan_after<T>(
    waited: Result<T, HarnessError>,
    scan: JoinHandle<Result<MarkerObservations, HarnessError>>,
) -> Result<(T, MarkerObservations), HarnessError> {
    let scanned = scan.await;
    let waited = waited?;
    Ok((waited, scanned??))
}
