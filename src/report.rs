//! # Report Formatter
//!
//! Turns the measured total and the observed initialization split into the
//! summary printed after the benchmark's own output:
//!
//! ```text
//! ----------------------------------------
//! Initialization duration: 1.52 seconds
//! Runtime duration: 10.03 seconds
//! Total execution duration: 11.55 seconds
//! Mop/s: 12345.67
//! ```
//!
//! Runtime is derived as `total - initialization`. An unseen split marker means
//! an initialization of zero; an unseen throughput marker prints
//! `not observed`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

const SEPARATOR_WIDTH: usize = 40;

/// The last line of the report, which depends on the mode.
#[derive(Clone, Debug, PartialEq)]
pub enum ReportTail {
    /// `time` mode: the benchmark's reported Mop/s, if it printed one
    Throughput(Option<f64>),
    /// `profile` mode: where the profiler wrote its CSV
    Artifact(PathBuf),
}

/// End-of-run summary, all durations in seconds.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub initialization_secs: f64,
    pub runtime_secs: f64,
    pub total_secs: f64,
    pub tail: ReportTail,
}

impl Report {
    pub fn new(total: Duration, initialization: Option<Duration>, tail: ReportTail) -> Self {
        // Output read after the child exited can timestamp a hair past the end.
        let initialization = initialization.unwrap_or(Duration::ZERO).min(total);
        let total_secs = total.as_secs_f64();
        let initialization_secs = initialization.as_secs_f64();
        Self {
            initialization_secs,
            runtime_secs: total_secs - initialization_secs,
            total_secs,
            tail,
        }
    }

    pub fn throughput(&self) -> Option<f64> {
        match self.tail {
            ReportTail::Throughput(value) => value,
            ReportTail::Artifact(_) => None,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "-".repeat(SEPARATOR_WIDTH))?;
        writeln!(
            f,
            "Initialization duration: {:.2} seconds",
            self.initialization_secs
        )?;
        writeln!(f, "Runtime duration: {:.2} seconds", self.runtime_secs)?;
        writeln!(f, "Total execution duration: {:.2} seconds", self.total_secs)?;
        match &self.tail {
            ReportTail::Throughput(Some(mops)) => write!(f, "Mop/s: {:.2}", mops),
            ReportTail::Throughput(None) => write!(f, "Mop/s: not observed"),
            ReportTail::Artifact(path) => {
                write!(f, "Profiling complete; output: {}", path.display())
            }
        }
    }
}
