//! Benchmark harness: turns an async operation into a latency summary.
//!
//! Iterations run strictly one after another: the next call is not issued
//! until the previous one has fully resolved.

use anyhow::{ensure, Context, Result};
use std::future::Future;
use std::time::{Duration, Instant};

/// Latency summary of one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResult {
    pub method: String,
    samples: Vec<Duration>,
}

impl BenchmarkResult {
    /// Returns `None` for an empty sample set; a result always has data.
    pub fn from_samples(method: &str, samples: Vec<Duration>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        Some(Self {
            method: method.to_string(),
            samples,
        })
    }

    pub fn iterations(&self) -> usize {
        self.samples.len()
    }

    /// Mean in whole nanoseconds (the sum is divided with truncation), so it
    /// can never fall outside `[min_ms, max_ms]` through float rounding.
    pub fn avg_ms(&self) -> f64 {
        let total: u128 = self.samples.iter().map(Duration::as_nanos).sum();
        nanos_to_ms(total / self.samples.len() as u128)
    }

    pub fn min_ms(&self) -> f64 {
        self.samples
            .iter()
            .min()
            .map(|d| nanos_to_ms(d.as_nanos()))
            .unwrap_or_default()
    }

    pub fn max_ms(&self) -> f64 {
        self.samples
            .iter()
            .max()
            .map(|d| nanos_to_ms(d.as_nanos()))
            .unwrap_or_default()
    }
}

fn nanos_to_ms(nanos: u128) -> f64 {
    nanos as f64 / 1_000_000.0
}

/// Runs `operation` `iterations` times and summarises the elapsed times.
///
/// The operation's value is dropped; only completion is timed. An error from
/// any call aborts the measurement and is returned with the strategy name and
/// iteration attached.
pub async fn measure<F, Fut, T, E>(
    name: &str,
    iterations: u32,
    mut operation: F,
) -> Result<BenchmarkResult>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<anyhow::Error>,
{
    ensure!(
        iterations > 0,
        "{name}: a measurement needs at least one iteration"
    );

    let mut samples = Vec::with_capacity(iterations as usize);
    for i in 0..iterations {
        let start = Instant::now();
        let outcome = operation().await;
        let elapsed = start.elapsed();

        outcome
            .map_err(Into::into)
            .with_context(|| format!("{name}: iteration {}/{iterations} failed", i + 1))?;
        samples.push(elapsed);
    }

    BenchmarkResult::from_samples(name, samples)
        .with_context(|| format!("{name}: no samples recorded"))
}
