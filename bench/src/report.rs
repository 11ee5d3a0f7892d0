//! Report module: prints the human-readable results of benchmark and load runs.

use crate::harness::BenchmarkResult;
use crate::loader::{LoadOutcome, LoadProgress, LoadReport};
use crate::runner::{compare_to_baseline, Comparison};
use log::warn;

const RULE_WIDTH: usize = 80;

fn rule(ch: char) -> String {
    ch.to_string().repeat(RULE_WIDTH)
}

/// `1234567` → `"1,234,567"`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Signed percentage with one decimal, e.g. `+50.0%`.
pub fn format_overhead(percent: f64) -> String {
    format!("{percent:+.1}%")
}

pub fn print_header(title: &str) {
    println!("\n{}", rule('='));
    println!("  {title}");
    println!("{}", rule('='));
}

pub fn results_table(results: &[BenchmarkResult]) -> Vec<String> {
    let mut lines = vec![
        format!(
            "{:<30} | {:>12} | {:>12} | {:>12}",
            "Method", "Avg (ms)", "Min (ms)", "Max (ms)"
        ),
        rule('-'),
    ];
    lines.extend(results.iter().map(|r| {
        format!(
            "{:<30} | {:>12.3} | {:>12.3} | {:>12.3}",
            r.method,
            r.avg_ms(),
            r.min_ms(),
            r.max_ms()
        )
    }));
    lines
}

/// Print results in the order they were measured.
pub fn print_results(results: &[BenchmarkResult]) {
    print_header("Benchmark Results");
    for line in results_table(results) {
        println!("{line}");
    }
    println!("{}", rule('='));
}

pub fn comparison_lines(comparison: &Comparison) -> Vec<String> {
    let mut lines = vec![format!(
        "   {:<30} {:>10.3}ms (baseline)",
        comparison.baseline, comparison.baseline_avg_ms
    )];
    lines.extend(comparison.entries.iter().map(|entry| {
        format!(
            "   {:<30} {:>10.3}ms ({})",
            entry.method,
            entry.avg_ms,
            format_overhead(entry.percent)
        )
    }));
    lines
}

pub fn print_comparison(comparison: &Comparison) {
    println!("\nRelative to {}:", comparison.baseline);
    for line in comparison_lines(comparison) {
        println!("{line}");
    }
}

/// Prints the relative section, or says why it was skipped.
pub fn print_relative(results: &[BenchmarkResult], baseline: &str, candidates: &[&str]) {
    match compare_to_baseline(results, baseline, candidates) {
        Ok(comparison) => print_comparison(&comparison),
        Err(reason) => warn!("Relative section skipped: {reason}"),
    }
}

pub fn progress_line(progress: &LoadProgress) -> String {
    format!(
        "Progress: {:.2}% | {} records | {:.1} min | {:.0} records/s",
        progress.percent(),
        group_thousands(progress.inserted),
        progress.elapsed.as_secs_f64() / 60.0,
        progress.rate()
    )
}

pub fn print_progress(progress: &LoadProgress) {
    println!("{}", progress_line(progress));
}

pub fn print_load_plan(target: u64, batch_size: u64, fields: &str) {
    println!("Loading {} records", group_thousands(target));
    println!("Batch size: {}", group_thousands(batch_size));
    println!("Fields: {fields}\n");
}

pub fn load_summary(report: &LoadReport) -> String {
    let minutes = report.elapsed.as_secs_f64() / 60.0;
    match &report.outcome {
        LoadOutcome::Completed => format!(
            "Done: {} records | {minutes:.1} min | {} retries",
            group_thousands(report.inserted),
            report.retries
        ),
        LoadOutcome::Aborted { attempts, .. } => format!(
            "Aborted after {attempts} failed attempts: {} of {} records | {minutes:.1} min",
            group_thousands(report.inserted),
            group_thousands(report.target)
        ),
        LoadOutcome::FinishFailed { error } => format!(
            "Loaded {} records in {minutes:.1} min, but finalizing failed: {error}",
            group_thousands(report.inserted)
        ),
    }
}

pub fn print_load_summary(report: &LoadReport) {
    println!("\n{}", load_summary(report));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Overhead;
    use std::time::Duration;

    #[test]
    fn thousands_are_grouped() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(10_000_000), "10,000,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn overhead_is_signed_with_one_decimal() {
        assert_eq!(format_overhead(50.0), "+50.0%");
        assert_eq!(format_overhead(-50.0), "-50.0%");
        assert_eq!(format_overhead(0.04), "+0.0%");
    }

    #[test]
    fn table_keeps_measurement_order() {
        let results = vec![
            BenchmarkResult::from_samples("second", vec![Duration::from_millis(2)]).unwrap(),
            BenchmarkResult::from_samples("first", vec![Duration::from_millis(1)]).unwrap(),
        ];
        let lines = results_table(&results);
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Method"));
        assert!(lines[2].starts_with("second"));
        assert!(lines[2].ends_with("2.000"));
        assert!(lines[3].starts_with("first"));
    }

    #[test]
    fn comparison_marks_baseline() {
        let comparison = Comparison {
            baseline: "Driver - B-tree".into(),
            baseline_avg_ms: 10.0,
            entries: vec![Overhead {
                method: "ORM - B-tree".into(),
                avg_ms: 15.0,
                percent: 50.0,
            }],
        };
        let lines = comparison_lines(&comparison);
        assert!(lines[0].contains("10.000ms (baseline)"));
        assert!(lines[1].contains("15.000ms (+50.0%)"));
    }

    #[test]
    fn progress_line_shows_rate_and_minutes() {
        let line = progress_line(&LoadProgress {
            inserted: 100_000,
            target: 400_000,
            elapsed: Duration::from_secs(30),
        });
        assert_eq!(
            line,
            "Progress: 25.00% | 100,000 records | 0.5 min | 3333 records/s"
        );
    }

    #[test]
    fn aborted_summary_reports_partial_progress() {
        let report = LoadReport {
            inserted: 20_000,
            target: 50_000,
            elapsed: Duration::from_secs(6),
            retries: 5,
            outcome: LoadOutcome::Aborted {
                attempts: 5,
                last_error: anyhow::anyhow!("connection reset"),
            },
        };
        assert_eq!(
            load_summary(&report),
            "Aborted after 5 failed attempts: 20,000 of 50,000 records | 0.1 min"
        );
    }

    #[test]
    fn failed_finish_summary_keeps_the_count() {
        let report = LoadReport {
            inserted: 30,
            target: 30,
            elapsed: Duration::from_secs(12),
            retries: 0,
            outcome: LoadOutcome::FinishFailed {
                error: anyhow::anyhow!("refresh timed out"),
            },
        };
        assert_eq!(
            load_summary(&report),
            "Loaded 30 records in 0.2 min, but finalizing failed: refresh timed out"
        );
    }
}
