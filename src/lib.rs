//! # NPB Harness Library
//!
//! A timing and profiling harness for NAS Parallel Benchmarks style workloads.
//! The harness runs a benchmark executable, streams its output live, and splits
//! the wall-clock time into an initialization phase and a main computation phase
//! based on marker text the benchmark prints.
//!
//! ## Modes
//!
//! - **Time**: run the benchmark once and report initialization, runtime, and
//!   total durations along with the reported `Mop/s` throughput.
//! - **Profile**: load the `msr` kernel module, run the benchmark, and launch a
//!   hardware-counter profiler that samples memory bandwidth during the main
//!   computation phase only.
//!
//! ## Architecture Overview
//!
//! - `supervisor`: launches the benchmark with merged stdout/stderr and waits on it
//! - `scanner`: echoes the benchmark output and records the first marker sightings
//! - `profiler`: schedules the external profiler relative to the benchmark start
//! - `capability`: checks that the performance-counter kernel module is loadable
//! - `report`: formats the end-of-run summary
//! - `session`: ties the pieces together for the `time` and `profile` subcommands
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use npb_harness::{Harness, HarnessConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let harness = Harness::new(HarnessConfig::default());
//!     let report = harness.time("./bin/cg.A.x").await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

/// Kernel-module capability check for profiling mode
pub mod capability;

/// Command-line interface and configuration
///
/// Provides argument parsing using clap and converts the parsed options into
/// the `HarnessConfig` threaded through the rest of the crate.
pub mod cli;

pub mod error;

pub mod logging;

/// Profiler job definition and scheduling
pub mod profiler;

/// End-of-run summary formatting
pub mod report;

/// Marker definitions and the output scanning loop
pub mod scanner;

/// Run sessions and the time/profile orchestration
pub mod session;

/// Benchmark process launch and wait
pub mod supervisor;

pub use capability::{ModprobeLoader, ModuleAvailability, ModuleLoader};
pub use cli::{Args, Commands, HarnessConfig};
pub use error::HarnessError;
pub use profiler::{ProfilerJob, ProfilerOutcome, ProfilerTrigger};
pub use report::{Report, ReportTail};
pub use scanner::{Marker, MarkerObservations, MarkerScanner};
pub use session::{Harness, ProfilePlan};
pub use supervisor::{BenchmarkExit, RunningBenchmark, Supervisor};

/// The current version of the harness
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
///
/// These mirror the setup the harness has always used on the reference
/// 64-core machine. All of them can be overridden through `HarnessConfig`.
pub mod defaults {
    /// Number of OpenMP threads handed to the benchmark
    pub const THREAD_COUNT: usize = 64;

    /// Environment variable the thread count is exported through
    pub const THREAD_ENV_VAR: &str = "OMP_NUM_THREADS";

    /// Shell used to interpret the benchmark command string
    pub const SHELL: &str = "sh";

    /// Text printed by NPB once initialization has finished
    pub const SPLIT_MARKER: &str = "Initialization time";

    /// Text printed by NPB on the line carrying the throughput figure
    pub const THROUGHPUT_MARKER: &str = "Mop/s total";

    /// Zero-based whitespace token index of the throughput value
    ///
    /// NPB prints ` Mop/s total     =   12345.67`, so the value is the fourth token.
    pub const THROUGHPUT_TOKEN: usize = 3;

    /// Location of the AMD uProf PCM executable
    pub const PROFILER_EXE: &str = "/opt/AMDuProf_4.2-850/bin/AMDuProfPcm";

    /// Directory the profiler CSV artifacts are written to
    pub const OUTPUT_DIR: &str = "out";

    /// Kernel module required for reading model-specific registers
    pub const KERNEL_MODULE: &str = "msr";

    /// Program used to load the kernel module
    pub const MODPROBE: &str = "modprobe";
}
