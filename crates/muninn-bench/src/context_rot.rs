//! Buckets results to the nearest 4K context tokens and fits a trendline to
//! detect "context rot": degrading accuracy as context grows.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::runner::TaskResult;

const BUCKET_WIDTH: usize = 4_000;

fn nearest_bucket(tokens: usize) -> usize {
    ((tokens + BUCKET_WIDTH / 2) / BUCKET_WIDTH) * BUCKET_WIDTH
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextBucketStats {
    pub context_tokens: usize,
    pub task_count: usize,
    pub accuracy: f64,
    pub mean_score: f64,
}

/// Per-bucket accuracy/score plus a global degradation slope.
#[derive(Debug, Clone, Serialize)]
pub struct ContextRotReport {
    pub buckets: Vec<ContextBucketStats>,
    /// Least-squares slope of score against context length, in score units
    /// per token. Negative means accuracy degrades as context grows.
    pub degradation_slope: f64,
}

pub struct ContextRotAnalyzer;

impl ContextRotAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, results: &[TaskResult]) -> ContextRotReport {
        let mut grouped: BTreeMap<usize, Vec<&TaskResult>> = BTreeMap::new();
        for r in results {
            grouped.entry(nearest_bucket(r.context_tokens)).or_default().push(r);
        }

        let buckets: Vec<ContextBucketStats> = grouped
            .iter()
            .map(|(bucket, rs)| {
                let task_count = rs.len();
                let correct = rs.iter().filter(|r| r.correct).count();
                let mean_score = rs.iter().map(|r| r.score).sum::<f64>() / task_count as f64;
                ContextBucketStats {
                    context_tokens: *bucket,
                    task_count,
                    accuracy: correct as f64 / task_count as f64,
                    mean_score,
                }
            })
            .collect();

        ContextRotReport {
            degradation_slope: least_squares_slope(results),
            buckets,
        }
    }
}

impl Default for ContextRotAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordinary least-squares slope of `score` regressed on `context_tokens`.
/// Returns 0.0 when there are fewer than two distinct x-values (an
/// underdetermined fit rather than a division by zero).
fn least_squares_slope(results: &[TaskResult]) -> f64 {
    let n = results.len() as f64;
    if n < 2.0 {
        return 0.0;
    }

    let xs: Vec<f64> = results.iter().map(|r| r.context_tokens as f64).collect();
    let ys: Vec<f64> = results.iter().map(|r| r.score).collect();

    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        numerator += (x - mean_x) * (y - mean_y);
        denominator += (x - mean_x).powi(2);
    }

    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}
