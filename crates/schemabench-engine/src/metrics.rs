//! Reduction of completed runs into a [`Summary`].

use serde::{Deserialize, Serialize};

use schemabench_types::Run;

/// Aggregate statistics for one scenario. A pure function of its runs.
///
/// Rates are percentages and, like the averages, rounded to one decimal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_runs: u32,
    pub successful_runs: u32,
    pub success_rate: f64,
    pub first_attempt_success_rate: f64,
    /// Cumulative success rate after `k` retries, for `k = 1..=len`. At
    /// least three entries; the last always equals `success_rate`.
    pub retry_tier_success_rates: Vec<f64>,
    pub average_duration_ms: f64,
    pub average_attempts: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens_used: u64,
}

const MIN_TIERS: usize = 3;

impl Summary {
    /// Cumulative success rate after `retries` retries. Zero retries is the
    /// first-attempt rate; tiers past the deepest observed equal the final
    /// success rate.
    pub fn after_retries(&self, retries: usize) -> f64 {
        if retries == 0 {
            return self.first_attempt_success_rate;
        }
        self.retry_tier_success_rates
            .get(retries - 1)
            .copied()
            .unwrap_or(self.success_rate)
    }
}

impl Default for Summary {
    fn default() -> Self {
        aggregate(&[])
    }
}

pub fn aggregate(runs: &[Run]) -> Summary {
    let total = runs.len();
    let tiers: Vec<u32> = runs.iter().filter_map(Run::retry_tier).collect();
    let depth = tiers
        .iter()
        .map(|&t| t as usize)
        .max()
        .unwrap_or(0)
        .max(MIN_TIERS);

    let first_attempt = tiers.iter().filter(|&&t| t == 0).count();
    let retry_tier_success_rates = (1..=depth)
        .map(|k| percent(tiers.iter().filter(|&&t| t as usize <= k).count(), total))
        .collect();

    let total_duration: u64 = runs.iter().map(|r| r.total_duration_ms).sum();
    let total_attempts: usize = runs.iter().map(Run::attempt_count).sum();
    let total_input_tokens: u64 = runs.iter().map(Run::input_tokens).sum();
    let total_output_tokens: u64 = runs.iter().map(Run::output_tokens).sum();

    Summary {
        total_runs: total as u32,
        successful_runs: tiers.len() as u32,
        success_rate: percent(tiers.len(), total),
        first_attempt_success_rate: percent(first_attempt, total),
        retry_tier_success_rates,
        average_duration_ms: mean(total_duration as f64, total),
        average_attempts: mean(total_attempts as f64, total),
        total_input_tokens,
        total_output_tokens,
        total_tokens_used: total_input_tokens + total_output_tokens,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(count as f64 / total as f64 * 100.0)
}

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    round1(sum / count as f64)
}
