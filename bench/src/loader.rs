//! Resilient bulk loader.
//!
//! Each batch moves through Generate → Submit → (Success | Retry). A failed
//! submission tears the connection down, waits a fixed backoff, connects
//! again and resubmits the *same* batch. After [`LoadConfig::max_attempts`]
//! consecutive failures of one batch the load is abandoned and the report
//! carries the count committed before that batch.

use anyhow::{ensure, Context, Result};
use bench_core::constants::{MAX_BATCH_ATTEMPTS, PROGRESS_EVERY, RECONNECT_BACKOFF_SECS};
use bench_core::corpus::{CorpusGenerator, SeedRecord};
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::{CryptoRng, RngCore};
use std::time::{Duration, Instant};

/// A backend that can take batches of seed records.
///
/// Implementations own their connection so that the loader can drop and
/// re-establish it between attempts.
#[allow(async_fn_in_trait)]
pub trait BatchSink {
    /// Drops and recreates the target table/index so that every load starts
    /// from an empty, identically indexed dataset.
    async fn prepare(&mut self) -> Result<()>;

    /// Writes the whole batch in one bulk call.
    async fn write_batch(&mut self, batch: &[SeedRecord]) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;

    async fn connect(&mut self) -> Result<()>;

    /// Runs once after the final batch has been committed.
    async fn finish(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadConfig {
    pub target: u64,
    pub batch_size: u64,
    pub max_attempts: u32,
    pub backoff: Duration,
    pub progress_every: u64,
}

impl LoadConfig {
    pub fn new(target: u64, batch_size: u64) -> Self {
        Self {
            target,
            batch_size,
            max_attempts: MAX_BATCH_ATTEMPTS,
            backoff: Duration::from_secs(RECONNECT_BACKOFF_SECS),
            progress_every: PROGRESS_EVERY,
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be greater than 0");
        ensure!(self.max_attempts > 0, "max_attempts must be greater than 0");
        ensure!(
            self.progress_every > 0,
            "progress_every must be greater than 0"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadProgress {
    pub inserted: u64,
    pub target: u64,
    pub elapsed: Duration,
}

impl LoadProgress {
    /// Records per second; positive as soon as anything was inserted.
    pub fn rate(&self) -> f64 {
        self.inserted as f64 / self.elapsed.as_secs_f64().max(f64::EPSILON)
    }

    pub fn percent(&self) -> f64 {
        if self.target == 0 {
            return 100.0;
        }
        self.inserted as f64 / self.target as f64 * 100.0
    }
}

#[derive(Debug)]
pub enum LoadOutcome {
    Completed,
    /// One batch failed `attempts` times in a row.
    Aborted {
        attempts: u32,
        last_error: anyhow::Error,
    },
    /// Every batch committed but the post-load step did not.
    FinishFailed { error: anyhow::Error },
}

#[derive(Debug)]
pub struct LoadReport {
    pub inserted: u64,
    pub target: u64,
    pub elapsed: Duration,
    /// Failed submissions that were followed by a retry or an abort.
    pub retries: u32,
    pub outcome: LoadOutcome,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, LoadOutcome::Completed)
    }

    pub fn progress(&self) -> LoadProgress {
        LoadProgress {
            inserted: self.inserted,
            target: self.target,
            elapsed: self.elapsed,
        }
    }

    /// Turns an aborted load into an error for the process exit status.
    pub fn into_result(self) -> Result<()> {
        match self.outcome {
            LoadOutcome::Completed => Ok(()),
            LoadOutcome::Aborted {
                attempts,
                last_error,
            } => Err(last_error.context(format!(
                "Load aborted after {attempts} failed attempts with {} of {} records inserted",
                self.inserted, self.target
            ))),
            LoadOutcome::FinishFailed { error } => Err(error.context(format!(
                "Failed to finalize the load target with {} of {} records inserted",
                self.inserted, self.target
            ))),
        }
    }
}

/// True when moving from `before` to `after` passes a multiple of `every`.
pub fn crosses_threshold(before: u64, after: u64, every: u64) -> bool {
    after / every > before / every
}

pub struct BatchLoader<R = StdRng> {
    config: LoadConfig,
    generator: CorpusGenerator<R>,
}

impl BatchLoader<StdRng> {
    pub fn new(config: LoadConfig) -> Result<Self> {
        Ok(Self::with_generator(config, CorpusGenerator::new()?))
    }
}

impl<R: RngCore + CryptoRng> BatchLoader<R> {
    pub fn with_generator(config: LoadConfig, generator: CorpusGenerator<R>) -> Self {
        Self { config, generator }
    }

    /// Loads `config.target` records into `sink`.
    ///
    /// Errors are returned only for invalid configuration or when preparing
    /// the target fails. Exhausted retries and a failed finish are reported
    /// through the [`LoadOutcome`] so the caller can still print how far the
    /// load got.
    pub async fn run<S: BatchSink>(
        &mut self,
        sink: &mut S,
        mut on_progress: impl FnMut(&LoadProgress),
    ) -> Result<LoadReport> {
        self.config.validate()?;
        let LoadConfig {
            target,
            batch_size,
            progress_every,
            ..
        } = self.config;

        sink.prepare()
            .await
            .context("Failed to prepare the load target")?;

        let start = Instant::now();
        let mut inserted = 0u64;
        let mut retries = 0u32;

        while inserted < target {
            let size = batch_size.min(target - inserted);
            let batch = self.generator.generate_batch(size as usize);

            match self.submit(sink, &batch, inserted).await {
                Ok(failed_attempts) => retries += failed_attempts,
                Err((attempts, last_error)) => {
                    error!(
                        "Giving up after {attempts} attempts; {inserted} of {target} records inserted"
                    );
                    return Ok(LoadReport {
                        inserted,
                        target,
                        elapsed: start.elapsed(),
                        retries: retries + attempts,
                        outcome: LoadOutcome::Aborted {
                            attempts,
                            last_error,
                        },
                    });
                }
            }

            let before = inserted;
            inserted += size;

            if crosses_threshold(before, inserted, progress_every) || inserted == target {
                on_progress(&LoadProgress {
                    inserted,
                    target,
                    elapsed: start.elapsed(),
                });
            }
        }

        let outcome = match sink.finish().await {
            Ok(()) => LoadOutcome::Completed,
            Err(error) => {
                error!("Finalizing after {inserted} records failed: {error:#}");
                LoadOutcome::FinishFailed { error }
            }
        };

        let elapsed = start.elapsed();
        info!("Loaded {inserted} records in {:.1}s", elapsed.as_secs_f64());
        Ok(LoadReport {
            inserted,
            target,
            elapsed,
            retries,
            outcome,
        })
    }

    /// Submits one batch until it succeeds or the attempt budget runs out.
    ///
    /// Returns the number of failed attempts before success, or the attempt
    /// count and last error when the budget is exhausted.
    async fn submit<S: BatchSink>(
        &self,
        sink: &mut S,
        batch: &[SeedRecord],
        inserted: u64,
    ) -> std::result::Result<u32, (u32, anyhow::Error)> {
        let max_attempts = self.config.max_attempts;
        let mut attempt = 0u32;

        loop {
            let err = match sink.write_batch(batch).await {
                Ok(()) => return Ok(attempt),
                Err(err) => err,
            };

            attempt += 1;
            error!(
                "Batch of {} failed ({attempt}/{max_attempts}) at {inserted} records: {err:#}",
                batch.len()
            );
            if attempt >= max_attempts {
                return Err((attempt, err));
            }

            if let Err(err) = sink.disconnect().await {
                warn!("Disconnect before retry failed: {err:#}");
            }
            tokio::time::sleep(self.config.backoff).await;
            if let Err(err) = sink.connect().await {
                warn!("Reconnect failed, retrying the batch anyway: {err:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_crossing() {
        assert!(crosses_threshold(50_000, 100_000, 100_000));
        assert!(crosses_threshold(95_000, 105_000, 100_000));
        assert!(!crosses_threshold(100_000, 150_000, 100_000));
        assert!(!crosses_threshold(0, 99_999, 100_000));
    }

    #[test]
    fn rate_is_positive_even_for_instant_loads() {
        let p = LoadProgress {
            inserted: 10,
            target: 10,
            elapsed: Duration::ZERO,
        };
        assert!(p.rate() > 0.0);
        assert_eq!(p.percent(), 100.0);
    }

    #[test]
    fn percent_of_target() {
        let p = LoadProgress {
            inserted: 250,
            target: 1_000,
            elapsed: Duration::from_secs(5),
        };
        assert_eq!(p.percent(), 25.0);
        assert_eq!(p.rate(), 50.0);
    }

    #[test]
    fn zero_batch_size_is_invalid() {
        let config = LoadConfig::new(10, 0);
        assert!(config.validate().is_err());
        assert!(LoadConfig::new(10, 5).validate().is_ok());
    }

    #[test]
    fn aborted_report_becomes_error_with_progress() {
        let report = LoadReport {
            inserted: 40,
            target: 100,
            elapsed: Duration::from_secs(1),
            retries: 5,
            outcome: LoadOutcome::Aborted {
                attempts: 5,
                last_error: anyhow::anyhow!("server closed the connection"),
            },
        };
        assert!(!report.is_complete());
        let message = format!("{:#}", report.into_result().unwrap_err());
        assert!(message.contains("40 of 100"), "{message}");
        assert!(message.contains("server closed the connection"), "{message}");
    }
}
