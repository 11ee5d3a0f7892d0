//! Comparative runner: warms up and measures an ordered list of strategies,
//! then expresses each one relative to a baseline.

use crate::harness::{measure, BenchmarkResult};
use anyhow::{bail, Context, Result};
use bench_core::constants::{DEFAULT_ITERATIONS, EXPENSIVE_ITERATION_CAP, WARMUP_ITERATIONS};
use log::{debug, info};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

pub type OpFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a>>;

/// One named way of performing the same lookup.
pub struct Strategy<'a> {
    name: String,
    expensive: bool,
    operation: Box<dyn FnMut() -> OpFuture<'a> + 'a>,
}

impl<'a> Strategy<'a> {
    pub fn new<F, Fut, T, E>(name: impl Into<String>, mut operation: F) -> Self
    where
        F: FnMut() -> Fut + 'a,
        Fut: Future<Output = std::result::Result<T, E>> + 'a,
        T: 'a,
        E: Into<anyhow::Error> + 'a,
    {
        Self {
            name: name.into(),
            expensive: false,
            operation: Box::new(move || -> OpFuture<'a> {
                let fut = operation();
                Box::pin(async move {
                    let outcome: Result<()> = fut.await.map(drop).map_err(Into::into);
                    outcome
                })
            }),
        }
    }

    /// Marks a full-scan strategy whose measured iterations are capped.
    pub fn expensive(mut self) -> Self {
        self.expensive = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_expensive(&self) -> bool {
        self.expensive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    pub iterations: u32,
    pub warmup: u32,
    /// Ceiling applied to strategies flagged [`Strategy::expensive`].
    pub expensive_cap: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            warmup: WARMUP_ITERATIONS,
            expensive_cap: EXPENSIVE_ITERATION_CAP,
        }
    }
}

impl RunnerConfig {
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations,
            ..Self::default()
        }
    }

    pub fn iterations_for(&self, expensive: bool) -> u32 {
        if expensive {
            self.iterations.min(self.expensive_cap)
        } else {
            self.iterations
        }
    }
}

pub struct ComparativeRunner {
    config: RunnerConfig,
}

impl ComparativeRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs every strategy to completion, in order, and returns one result per
    /// strategy in declaration order.
    ///
    /// The first failing call aborts the whole run: a partial result set is
    /// not comparable.
    pub async fn run(&self, strategies: Vec<Strategy<'_>>) -> Result<Vec<BenchmarkResult>> {
        let mut seen = HashSet::new();
        for strategy in &strategies {
            if !seen.insert(strategy.name.as_str()) {
                bail!("Duplicate strategy name: {}", strategy.name);
            }
        }

        let mut results = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            let Strategy {
                name,
                expensive,
                mut operation,
            } = strategy;

            debug!("{name}: {} warmup calls", self.config.warmup);
            for i in 0..self.config.warmup {
                operation()
                    .await
                    .with_context(|| format!("{name}: warmup call {} failed", i + 1))?;
            }

            let iterations = self.config.iterations_for(expensive);
            if expensive {
                println!("  {name}: full scan, limited to {iterations} iterations");
            }
            let result = measure(&name, iterations, || operation()).await?;
            info!(
                "{name}: avg {:.3}ms over {} iterations",
                result.avg_ms(),
                result.iterations()
            );
            println!(
                "  {:<30} done ({:.3}ms avg)",
                result.method,
                result.avg_ms()
            );
            results.push(result);
        }

        Ok(results)
    }
}

/// One strategy expressed relative to the baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct Overhead {
    pub method: String,
    pub avg_ms: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub baseline: String,
    pub baseline_avg_ms: f64,
    pub entries: Vec<Overhead>,
}

pub fn percent_change(baseline_avg_ms: f64, avg_ms: f64) -> f64 {
    (avg_ms - baseline_avg_ms) / baseline_avg_ms * 100.0
}

/// Why no relative section could be computed.
#[derive(Debug, Clone, PartialEq)]
pub enum NoComparison {
    MissingBaseline(String),
    ZeroBaseline(String),
}

impl fmt::Display for NoComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoComparison::MissingBaseline(name) => write!(f, "baseline {name} was not measured"),
            NoComparison::ZeroBaseline(name) => {
                write!(f, "baseline {name} averaged 0ms; percentages are undefined")
            }
        }
    }
}

/// Compares `candidates` against `baseline`.
///
/// Candidates missing from `results` are skipped. Fails when the baseline
/// itself is missing or has a zero average.
pub fn compare_to_baseline(
    results: &[BenchmarkResult],
    baseline: &str,
    candidates: &[&str],
) -> std::result::Result<Comparison, NoComparison> {
    let base = results
        .iter()
        .find(|r| r.method == baseline)
        .ok_or_else(|| NoComparison::MissingBaseline(baseline.to_string()))?;
    let baseline_avg_ms = base.avg_ms();
    if baseline_avg_ms <= 0.0 {
        return Err(NoComparison::ZeroBaseline(baseline.to_string()));
    }

    let entries = candidates
        .iter()
        .filter(|&&name| name != baseline)
        .filter_map(|&name| results.iter().find(|r| r.method == name))
        .map(|r| Overhead {
            method: r.method.clone(),
            avg_ms: r.avg_ms(),
            percent: percent_change(baseline_avg_ms, r.avg_ms()),
        })
        .collect();

    Ok(Comparison {
        baseline: baseline.to_string(),
        baseline_avg_ms,
        entries,
    })
}
