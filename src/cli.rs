use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// NAS Parallel Benchmarks basic evaluation tool for CPU
#[derive(Parser, Debug)]
#[clap(name = "npbtool", version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub mode: Commands,

    /// Number of OpenMP threads exported to the benchmark
    #[clap(long, global = true, default_value_t = crate::defaults::THREAD_COUNT, help_heading = "Environment")]
    pub threads: usize,

    /// Path to the AMDuProfPcm executable
    #[clap(long, global = true, default_value = crate::defaults::PROFILER_EXE, help_heading = "Profiler")]
    pub profiler: PathBuf,

    /// Directory profiler CSV artifacts are written to
    #[clap(long, global = true, default_value = crate::defaults::OUTPUT_DIR, help_heading = "Profiler")]
    pub output_dir: PathBuf,

    /// Kernel module loaded before profiling
    #[clap(long, global = true, default_value = crate::defaults::KERNEL_MODULE, help_heading = "Profiler")]
    pub kernel_module: String,

    /// Program used to load the kernel module
    #[clap(long, global = true, default_value = crate::defaults::MODPROBE, help_heading = "Profiler")]
    pub modprobe: String,

    /// Run the module loader directly instead of through sudo
    #[clap(long, global = true, default_value_t = false, help_heading = "Profiler")]
    pub no_sudo: bool,

    /// Verbose harness diagnostics
    #[clap(short = 'v', long, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Time the benchmark execution and output initialization + main runtime splits
    Time {
        /// The path to the benchmark to run
        #[clap(short = 'c', long)]
        command: String,
    },

    /// Profile the benchmark and record memory bandwidth
    Profile {
        /// Duration expected for initialization phase
        #[clap(short = 'i', long = "init_duration", value_parser = parse_init_duration, required_unless_present = "on_marker")]
        init_duration: Option<f64>,

        /// Duration expected for run (main) phase (after initialization phase)
        #[clap(short = 'r', long = "run_duration", value_parser = parse_run_duration)]
        run_duration: f64,

        /// The path to the benchmark to run
        #[clap(short = 'c', long)]
        command: String,

        /// Start the profiler when the benchmark prints its initialization
        /// marker instead of after a fixed delay
        #[clap(long = "on_marker", conflicts_with = "init_duration", default_value_t = false)]
        on_marker: bool,
    },
}

/// Harness-wide settings threaded through every component
///
/// Nothing in the crate reads a global; the supervisor, scanner, and profiler
/// all take what they need from here.
#[derive(Clone, Debug, PartialEq)]
pub struct HarnessConfig {
    pub thread_count: usize,
    pub thread_env_var: String,
    pub shell: String,
    pub split_marker: String,
    pub throughput_marker: String,
    pub throughput_token: usize,
    pub profiler_exe: PathBuf,
    pub output_dir: PathBuf,
    pub kernel_module: String,
    pub modprobe: String,
    pub use_sudo: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        use crate::defaults;
        Self {
            thread_count: defaults::THREAD_COUNT,
            thread_env_var: defaults::THREAD_ENV_VAR.to_string(),
            shell: defaults::SHELL.to_string(),
            split_marker: defaults::SPLIT_MARKER.to_string(),
            throughput_marker: defaults::THROUGHPUT_MARKER.to_string(),
            throughput_token: defaults::THROUGHPUT_TOKEN,
            profiler_exe: PathBuf::from(defaults::PROFILER_EXE),
            output_dir: PathBuf::from(defaults::OUTPUT_DIR),
            kernel_module: defaults::KERNEL_MODULE.to_string(),
            modprobe: defaults::MODPROBE.to_string(),
            use_sudo: true,
        }
    }
}

impl From<&Args> for HarnessConfig {
    fn from(args: &Args) -> Self {
        Self {
            thread_count: args.threads,
            profiler_exe: args.profiler.clone(),
            output_dir: args.output_dir.clone(),
            kernel_module: args.kernel_module.clone(),
            modprobe: args.modprobe.clone(),
            use_sudo: !args.no_sudo,
            ..Self::default()
        }
    }
}

fn parse_seconds(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number of seconds: {}", s))?;
    if !value.is_finite() {
        return Err(format!("Duration must be finite: {}", s));
    }
    Ok(value)
}

/// Parse the estimated initialization delay; zero is allowed.
fn parse_init_duration(s: &str) -> Result<f64, String> {
    let value = parse_seconds(s)?;
    if value < 0.0 {
        return Err(format!("Initialization duration cannot be negative: {}", s));
    }
    Ok(value)
}

/// Parse the estimated run duration; must be strictly positive.
fn parse_run_duration(s: &str) -> Result<f64, String> {
    let value = parse_seconds(s)?;
    if value <= 0.0 {
        return Err(format!("Run duration must be positive: {}", s));
    }
    Ok(value)
}
