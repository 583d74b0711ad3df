//! The shared status record.
//!
//! The engine is the only writer: every transition builds a new
//! [`BenchStatus`] from the current one and swaps it in whole. Readers take an
//! `Arc` snapshot and never observe a half-applied update.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use schemabench_types::Stage;

use crate::events::{AttemptPosition, AttemptStatus, LogEntry, ProgressEvent, ProgressObserver};
use crate::metrics::Summary;
use crate::scenario::{ScenarioId, Termination};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptCell {
    pub stage: Stage,
    pub attempt: u32,
    pub status: AttemptStatus,
}

/// Attempt grid row for one run of the current scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunProgress {
    pub run: u32,
    pub cells: Vec<AttemptCell>,
    /// `None` while the run is in flight.
    pub success: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedScenario {
    pub model: String,
    pub scenario: ScenarioId,
    pub termination: Termination,
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchStatus {
    pub execution_id: Option<String>,
    pub phase: Phase,
    pub termination: Option<Termination>,
    pub current_model: Option<String>,
    pub current_scenario: Option<ScenarioId>,
    pub current_attempt: Option<AttemptPosition>,
    pub current_status: Option<AttemptStatus>,
    pub runs: Vec<RunProgress>,
    /// Shared with earlier snapshots; publishing copies pointers, not text.
    pub logs: VecDeque<Arc<LogEntry>>,
    pub completed_scenarios: Vec<CompletedScenario>,
    pub updated_at: DateTime<Utc>,
}

impl Default for BenchStatus {
    fn default() -> Self {
        Self {
            execution_id: None,
            phase: Phase::Idle,
            termination: None,
            current_model: None,
            current_scenario: None,
            current_attempt: None,
            current_status: None,
            runs: Vec::new(),
            logs: VecDeque::new(),
            completed_scenarios: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

impl BenchStatus {
    fn run_mut(&mut self, run: u32) -> &mut RunProgress {
        let index = match self.runs.iter().position(|r| r.run == run) {
            Some(index) => index,
            None => {
                self.runs.push(RunProgress {
                    run,
                    cells: Vec::new(),
                    success: None,
                });
                self.runs.len() - 1
            }
        };
        &mut self.runs[index]
    }

    fn record_attempt(&mut self, position: &AttemptPosition, status: AttemptStatus) {
        let row = self.run_mut(position.run);
        match row
            .cells
            .iter_mut()
            .find(|c| c.stage == position.stage && c.attempt == position.attempt)
        {
            Some(cell) => cell.status = status,
            None => row.cells.push(AttemptCell {
                stage: position.stage,
                attempt: position.attempt,
                status,
            }),
        }
        self.current_attempt = Some(position.clone());
        self.current_status = Some(status);
    }

    fn push_log(&mut self, entry: Arc<LogEntry>, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.logs.len() >= capacity {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);
    }
}

/// Single-writer, many-reader holder of the current [`BenchStatus`].
pub struct StatusBoard {
    current: RwLock<Arc<BenchStatus>>,
    log_capacity: usize,
}

impl StatusBoard {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            current: RwLock::new(Arc::new(BenchStatus::default())),
            log_capacity,
        }
    }

    /// A complete, immutable snapshot.
    pub fn snapshot(&self) -> Arc<BenchStatus> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn publish(&self, update: impl FnOnce(&mut BenchStatus)) {
        let mut next = (*self.snapshot()).clone();
        update(&mut next);
        next.updated_at = Utc::now();
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new(200)
    }
}

impl ProgressObserver for StatusBoard {
    fn on_transition(&self, event: &ProgressEvent) {
        let capacity = self.log_capacity;
        self.publish(|status| match event {
            ProgressEvent::BenchmarkStarted { execution_id, .. } => {
                *status = BenchStatus {
                    execution_id: Some(execution_id.clone()),
                    phase: Phase::Running,
                    ..BenchStatus::default()
                };
            }
            ProgressEvent::ScenarioStarted {
                model, scenario, ..
            } => {
                status.current_model = Some(model.clone());
                status.current_scenario = Some(*scenario);
                status.current_attempt = None;
                status.current_status = None;
                status.runs.clear();
            }
            ProgressEvent::Attempt {
                position,
                status: attempt_status,
                log,
            } => {
                status.record_attempt(position, *attempt_status);
                if let Some(entry) = log {
                    status.push_log(Arc::new(entry.clone()), capacity);
                }
            }
            ProgressEvent::RunCompleted { run, success, .. } => {
                status.run_mut(*run).success = Some(*success);
            }
            ProgressEvent::ScenarioCompleted {
                model,
                scenario,
                termination,
                summary,
            } => {
                status.completed_scenarios.push(CompletedScenario {
                    model: model.clone(),
                    scenario: *scenario,
                    termination: termination.clone(),
                    summary: summary.clone(),
                });
            }
            ProgressEvent::BenchmarkFinished { termination, .. } => {
                status.phase = Phase::Finished;
                status.termination = Some(termination.clone());
                status.current_attempt = None;
                status.current_status = None;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemabench_types::Attempt;

    fn attempt(run: u32, stage: Stage, attempt: u32, status: AttemptStatus, log: bool) -> ProgressEvent {
        ProgressEvent::Attempt {
            position: AttemptPosition {
                model: "openai:gpt-4o-mini".into(),
                scenario: ScenarioId::SequentialGuided,
                run,
                stage,
                attempt,
            },
            status,
            log: log.then(|| {
                LogEntry::from_attempt(&Attempt::errored(attempt, "p".into(), format!("e{attempt}")))
            }),
        }
    }

    fn started() -> ProgressEvent {
        ProgressEvent::BenchmarkStarted {
            execution_id: "exec-1".into(),
            models: vec!["openai:gpt-4o-mini".into()],
            scenarios: vec![ScenarioId::SequentialGuided],
            runs_per_scenario: 2,
        }
    }

    #[test]
    fn starts_idle() {
        let board = StatusBoard::default();
        assert_eq!(board.snapshot().phase, Phase::Idle);
        assert!(board.snapshot().execution_id.is_none());
    }

    #[test]
    fn attempt_transitions_update_the_grid_in_place() {
        let board = StatusBoard::new(10);
        board.on_transition(&started());
        board.on_transition(&attempt(1, Stage::Decision, 1, AttemptStatus::Running, false));
        board.on_transition(&attempt(1, Stage::Decision, 1, AttemptStatus::Retrying, true));
        board.on_transition(&attempt(1, Stage::Decision, 2, AttemptStatus::Running, false));

        let snap = board.snapshot();
        assert_eq!(snap.phase, Phase::Running);
        assert_eq!(snap.runs.len(), 1);
        assert_eq!(
            snap.runs[0].cells,
            vec![
                AttemptCell {
                    stage: Stage::Decision,
                    attempt: 1,
                    status: AttemptStatus::Retrying
                },
                AttemptCell {
                    stage: Stage::Decision,
                    attempt: 2,
                    status: AttemptStatus::Running
                },
            ]
        );
        assert_eq!(snap.current_status, Some(AttemptStatus::Running));
        assert_eq!(snap.logs.len(), 1);
    }

    #[test]
    fn snapshots_are_immutable() {
        let board = StatusBoard::new(10);
        board.on_transition(&started());
        let before = board.snapshot();
        board.on_transition(&ProgressEvent::RunCompleted {
            model: "openai:gpt-4o-mini".into(),
            scenario: ScenarioId::SequentialGuided,
            run: 1,
            success: true,
        });

        assert!(before.runs.is_empty());
        assert_eq!(board.snapshot().runs[0].success, Some(true));
    }

    #[test]
    fn log_ring_is_capped() {
        let board = StatusBoard::new(2);
        board.on_transition(&started());
        for n in 1..=3 {
            board.on_transition(&attempt(1, Stage::Full, n, AttemptStatus::Retrying, true));
        }
        let snap = board.snapshot();
        assert_eq!(snap.logs.len(), 2);
        assert_eq!(snap.logs[0].prompt, "p");
        assert!(matches!(
            snap.logs[0].outcome,
            crate::events::LogOutcome::Error { ref message } if message == "e2"
        ));
    }

    #[test]
    fn publishing_shares_log_entries_between_snapshots() {
        let board = StatusBoard::new(10);
        board.on_transition(&started());
        board.on_transition(&attempt(1, Stage::Full, 1, AttemptStatus::Retrying, true));
        let before = board.snapshot();
        board.on_transition(&attempt(1, Stage::Full, 2, AttemptStatus::Running, false));
        let after = board.snapshot();

        assert!(!Arc::ptr_eq(&before, &after));
        assert!(Arc::ptr_eq(&before.logs[0], &after.logs[0]));
    }

    #[test]
    fn scenario_start_resets_grid_and_finish_records_termination() {
        let board = StatusBoard::new(10);
        board.on_transition(&started());
        board.on_transition(&attempt(1, Stage::Full, 1, AttemptStatus::Success, false));
        board.on_transition(&ProgressEvent::ScenarioCompleted {
            model: "openai:gpt-4o-mini".into(),
            scenario: ScenarioId::OneShotGuided,
            termination: Termination::Completed,
            summary: Summary::default(),
        });
        board.on_transition(&ProgressEvent::ScenarioStarted {
            model: "openai:gpt-4o-mini".into(),
            scenario: ScenarioId::OneShotEnforced,
            runs: 2,
        });
        assert!(board.snapshot().runs.is_empty());
        assert_eq!(board.snapshot().completed_scenarios.len(), 1);

        board.on_transition(&ProgressEvent::BenchmarkFinished {
            execution_id: "exec-1".into(),
            termination: Termination::Cancelled,
        });
        let snap = board.snapshot();
        assert_eq!(snap.phase, Phase::Finished);
        assert_eq!(snap.termination, Some(Termination::Cancelled));
        assert_eq!(snap.execution_id.as_deref(), Some("exec-1"));
    }
}
