//! Plan/profile reporter.
//!
//! Re-issues one representative lookup per dimension in explain or profile
//! mode and prints what the backend says about it. Purely diagnostic: a
//! failing probe is logged and counted, never propagated, so it cannot
//! invalidate results that were already measured.

use anyhow::Result;
use log::warn;
use std::future::Future;
use std::pin::Pin;

pub type PlanFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<String>>> + 'a>>;

pub struct PlanProbe<'a> {
    pub label: String,
    future: PlanFuture<'a>,
}

impl<'a> PlanProbe<'a> {
    /// `future` is not polled until the probe is printed, so probes still run
    /// one after another.
    pub fn new(
        label: impl Into<String>,
        future: impl Future<Output = Result<Vec<String>>> + 'a,
    ) -> Self {
        Self {
            label: label.into(),
            future: Box::pin(future),
        }
    }
}

/// Runs the probes in order and prints each plan. Returns how many failed.
pub async fn print_plans(title: &str, probes: Vec<PlanProbe<'_>>) -> usize {
    println!("\n{title}:\n");

    let mut failures = 0;
    for probe in probes {
        println!("{}:", probe.label);
        match probe.future.await {
            Ok(lines) => {
                for line in lines {
                    println!("   {line}");
                }
            }
            Err(err) => {
                failures += 1;
                warn!("{}: plan unavailable: {err:#}", probe.label);
                println!("   (unavailable: {err})");
            }
        }
        println!();
    }
    failures
}
