//! # Marker Scanner
//!
//! Consumes the benchmark's merged output line by line, echoes every line to
//! the harness's own stdout as soon as it is read, and records the first
//! sighting of each marker.
//!
//! ## Markers
//!
//! - **Phase split** (`Initialization time`): timestamp only. The elapsed time
//!   since the session start becomes the initialization duration.
//! - **Throughput** (`Mop/s total`): the value at a fixed whitespace token
//!   position is parsed as `f64`.
//!
//! Only the first occurrence of each marker counts. A throughput line without a
//! parseable value is an error, but scanning continues to end-of-stream so the
//! benchmark never stalls on a full pipe; the error is returned once the stream
//! closes.
//!
//! The scanner never writes into shared state. Its findings are the return
//! value of [`MarkerScanner::scan`], which the session collects by joining the
//! scanning task.

use crate::{cli::HarnessConfig, error::HarnessError};
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What to pull out of a line once its marker matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extraction {
    /// Record when the line was seen
    Timestamp,
    /// Parse the zero-based whitespace token as a floating-point value
    Token(usize),
}

/// A substring to look for and what to extract when it shows up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Marker {
    pub needle: String,
    pub extraction: Extraction,
}

impl Marker {
    pub fn new(needle: impl Into<String>, extraction: Extraction) -> Self {
        Self {
            needle: needle.into(),
            extraction,
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        line.contains(self.needle.as_str())
    }
}

/// First sightings recorded while scanning one benchmark run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MarkerObservations {
    /// Time from session start to the first phase-split line
    pub initialization: Option<Duration>,
    /// Value carried by the first throughput line
    pub throughput: Option<f64>,
}

/// Scans benchmark output for the phase-split and throughput markers.
#[derive(Clone, Debug)]
pub struct MarkerScanner {
    split: Marker,
    throughput: Marker,
}

impl MarkerScanner {
    pub fn new(split: Marker, throughput: Marker) -> Self {
        Self { split, throughput }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            Marker::new(config.split_marker.clone(), Extraction::Timestamp),
            Marker::new(
                config.throughput_marker.clone(),
                Extraction::Token(config.throughput_token),
            ),
        )
    }

    /// Drain `reader` to end-of-stream, echoing each line to `echo`.
    ///
    /// `split_tx`, when given, receives the initialization duration the moment
    /// the split marker is first seen. It is dropped unsent if the marker never
    /// appears.
    pub fn scan<R, W>(
        &self,
        mut reader: R,
        mut echo: W,
        started_at: Instant,
        mut split_tx: Option<oneshot::Sender<Duration>>,
    ) -> Result<MarkerObservations, HarnessError>
    where
        R: BufRead,
        W: Write,
    {
        let mut observations = MarkerObservations::default();
        let mut parse_error = None;
        let mut raw = Vec::new();

        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            let seen_at = Instant::now();

            echo.write_all(&raw)?;
            echo.flush()?;

            let line = String::from_utf8_lossy(&raw);

            if observations.initialization.is_none() && self.split.matches(&line) {
                let elapsed = seen_at.saturating_duration_since(started_at);
                debug!("Split marker seen after {:?}", elapsed);
                observations.initialization = Some(elapsed);
                if let Some(tx) = split_tx.take() {
                    // The receiver is gone if the profiler was not waiting on us.
                    let _ = tx.send(elapsed);
                }
            }

            if observations.throughput.is_none()
                && parse_error.is_none()
                && self.throughput.matches(&line)
            {
                match extract_value(&line, self.throughput.extraction) {
                    Some(value) => {
                        debug!("Throughput marker seen: {}", value);
                        observations.throughput = Some(value);
                    }
                    None => {
                        warn!("Malformed throughput line: {}", line.trim_end());
                        parse_error = Some(HarnessError::MarkerParse {
                            line: line.trim_end().to_string(),
                            token: token_index(self.throughput.extraction),
                        });
                    }
                }
            }
        }

        match parse_error {
            Some(err) => Err(err),
            None => Ok(observations),
        }
    }
}

fn token_index(extraction: Extraction) -> usize {
    match extraction {
        Extraction::Token(index) => index,
        Extraction::Timestamp => 0,
    }
}

fn extract_value(line: &str, extraction: Extraction) -> Option<f64> {
    match extraction {
        Extraction::Token(index) => line.split_whitespace().nth(index)?.parse().ok(),
        Extraction::Timestamp => None,
    }
}
