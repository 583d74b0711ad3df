//! Plain-text summary tables.

use schemabench_engine::{ScenarioReport, Termination};
use schemabench_llm::ModelCatalog;

pub fn render_summary(results: &[ScenarioReport]) -> String {
    let mut out = format!(
        "{:<36} {:<20} {:>5} {:>8} {:>8} {:>8} {:>8} {:>8} {:>9} {:>10} {:>10}\n",
        "model", "scenario", "runs", "success", "first", "retry1", "retry2", "retry3", "attempts", "tokens", "cost"
    );
    for result in results {
        let s = &result.summary;
        let cost = result
            .estimated_cost_usd
            .map(|c| format!("${c:.4}"))
            .unwrap_or_else(|| "-".into());
        out.push_str(&format!(
            "{:<36} {:<20} {:>5} {:>7.1}% {:>7.1}% {:>7.1}% {:>7.1}% {:>7.1}% {:>9.1} {:>10} {:>10}",
            result.model,
            result.scenario.name(),
            s.total_runs,
            s.success_rate,
            s.first_attempt_success_rate,
            s.after_retries(1),
            s.after_retries(2),
            s.after_retries(3),
            s.average_attempts,
            s.total_tokens_used,
            cost,
        ));
        match &result.termination {
            Termination::Completed => {}
            Termination::Cancelled => out.push_str("  (cancelled)"),
            Termination::Aborted { reason, .. } => out.push_str(&format!("  (aborted: {reason})")),
        }
        out.push('\n');
    }
    out
}

pub fn render_models(catalog: &ModelCatalog) -> String {
    let mut out = format!(
        "{:<20} {:<10} {:>10} {:>12} {:>12}\n",
        "model", "provider", "context", "$/Mtok in", "$/Mtok out"
    );
    for info in catalog.models() {
        out.push_str(&format!(
            "{:<20} {:<10} {:>10} {:>12.2} {:>12.2}\n",
            info.id,
            info.provider,
            info.context_window,
            info.input_price_per_mtok,
            info.output_price_per_mtok
        ));
    }
    out
}
