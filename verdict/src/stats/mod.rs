//! Run statistics: fold a run's result map and fetched reports into counts.
//!
//! Runs fill in asynchronously (execution finishes before judging does), so
//! classification has to be careful about partial data. The precedence here
//! is load-bearing: a completed execution whose judge evaluation is still
//! `pending`/`calculating` counts as pending, not failed, even when the
//! report already carries a pass/fail value ("trace mode").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Execution status of one test case within a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// One entry of a run's `results` map.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    pub status: ResultStatus,
}

/// A benchmark run: one execution of a benchmark's test cases against one
/// agent/model pair. Mutated only by the execution orchestrator.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkRun {
    /// test case id → result entry.
    #[serde(default)]
    pub results: HashMap<String, TestCaseResult>,
}

/// Judged outcome of one test case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassFailStatus {
    Passed,
    Failed,
}

/// Progress of the asynchronous judge evaluation attached to a report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsStatus {
    Pending,
    Calculating,
    Done,
}

/// A report: created once per test case execution, metrics attached later.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_fail_status: Option<PassFailStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_status: Option<MetricsStatus>,
}

/// Aggregated counts for one run. `passed + failed + pending == total`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub passed: usize,
    pub failed: usize,
    pub pending: usize,
    pub total: usize,
    /// Rounded percentage over judged cases only; 0 when nothing is judged.
    pub pass_rate: u32,
}

/// Classifies every result into exactly one bucket, first match wins:
///
/// 1. `pending`/`running` → pending.
/// 2. `failed`/`cancelled` → failed.
/// 3. `completed` with a report id:
///    a. report not in the lookup → pending (not yet fetched).
///    b. report metrics `pending`/`calculating` → pending (judge still
///       running, regardless of any pass/fail value already present).
///    c. report passed → passed; anything else, including absent → failed.
/// 4. `completed` without a report id → pending.
///
/// Case 4 reads like a defensive fallback rather than an intentional rule;
/// it is preserved literally because changing it would shift pass-rate
/// semantics (see DESIGN.md).
pub fn compute_run_stats(
    run: &BenchmarkRun,
    reports: &HashMap<String, EvaluationReport>,
) -> RunStats {
    let mut stats = RunStats {
        total: run.results.len(),
        ..RunStats::default()
    };

    for result in run.results.values() {
        match result.status {
            ResultStatus::Pending | ResultStatus::Running => stats.pending += 1,
            ResultStatus::Failed | ResultStatus::Cancelled => stats.failed += 1,
            ResultStatus::Completed => match &result.report_id {
                None => stats.pending += 1,
                Some(report_id) => match reports.get(report_id) {
                    None => stats.pending += 1,
                    Some(report) => match report.metrics_status {
                        Some(MetricsStatus::Pending) | Some(MetricsStatus::Calculating) => {
                            stats.pending += 1
                        }
                        _ => match report.pass_fail_status {
                            Some(PassFailStatus::Passed) => stats.passed += 1,
                            _ => stats.failed += 1,
                        },
                    },
                },
            },
        }
    }

    let judged = stats.passed + stats.failed;
    if judged > 0 {
        stats.pass_rate = ((stats.passed as f64 / judged as f64) * 100.0).round() as u32;
    }
    stats
}
