//! Progress accounting
//!
//! Workers return a `UnitResult` per id; the coordinator folds them into a
//! `ProgressTracker` and hands snapshots to an injected observer. Nothing here
//! feeds back into control flow.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::info;

use crate::domain::report::Outcome;
use crate::domain::value_objects::StudbookId;

/// What one worker did with one id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitResult {
    pub worker: usize,
    pub studbook_id: StudbookId,
    pub outcome: Outcome,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub total: u64,
    pub completed: u64,
    pub outcomes: BTreeMap<String, u64>,
    pub elapsed: Duration,
    pub average_per_unit: Duration,
    pub estimated_remaining: Duration,
    pub estimated_finish: DateTime<Utc>,
    pub last: Option<LastUnit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUnit {
    pub worker: usize,
    pub studbook_id: StudbookId,
    pub outcome: Outcome,
    pub duration: Duration,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.completed as f64 / self.total as f64;
        ratio * 100.0
    }

    #[must_use]
    pub fn count(&self, outcome: Outcome) -> u64 {
        self.outcomes.get(outcome.as_str()).copied().unwrap_or(0)
    }
}

/// Final result of one scrape run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeSummary {
    pub start_id: StudbookId,
    pub end_id: StudbookId,
    pub workers: usize,
    pub completed: u64,
    pub outcomes: BTreeMap<String, u64>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl ScrapeSummary {
    #[must_use]
    pub fn count(&self, outcome: Outcome) -> u64 {
        self.outcomes.get(outcome.as_str()).copied().unwrap_or(0)
    }
}

/// Receives a snapshot after every aggregated unit
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);

    fn on_finished(&self, _summary: &ScrapeSummary) {}
}

/// Logs one progress line every `every` units
pub struct LoggingProgressObserver {
    every: u64,
}

impl LoggingProgressObserver {
    #[must_use]
    pub fn new(every: u64) -> Self {
        Self { every: every.max(1) }
    }
}

impl Default for LoggingProgressObserver {
    fn default() -> Self {
        Self::new(1)
    }
}

fn hours_minutes(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
}

impl ProgressObserver for LoggingProgressObserver {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        if snapshot.completed % self.every != 0 && snapshot.completed != snapshot.total {
            return;
        }
        let Some(last) = &snapshot.last else { return };
        info!(
            worker = last.worker + 1,
            studbook_id = last.studbook_id,
            outcome = last.outcome.as_str(),
            "Horse ID {} {} in {:.2}s, Total time: {}, ETA: {}, Remaining: {}, Progress: {:.2}%",
            last.studbook_id,
            last.outcome.as_str(),
            last.duration.as_secs_f64(),
            hours_minutes(snapshot.elapsed),
            snapshot.estimated_finish.format("%Y-%m-%d %H:%M:%S UTC"),
            hours_minutes(snapshot.estimated_remaining),
            snapshot.percentage(),
        );
    }

    fn on_finished(&self, summary: &ScrapeSummary) {
        info!(
            completed = summary.completed,
            cancelled = summary.cancelled,
            outcomes = ?summary.outcomes,
            "All horses scraped. Total time taken: {:.2} minutes",
            summary.elapsed.as_secs_f64() / 60.0
        );
    }
}

/// Aggregation state owned by the coordinator
#[derive(Debug)]
pub struct ProgressTracker {
    total: u64,
    completed: u64,
    outcomes: BTreeMap<String, u64>,
    started: Instant,
    last: Option<LastUnit>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(total: u64) -> Self {
        Self {
            total,
            completed: 0,
            outcomes: BTreeMap::new(),
            started: Instant::now(),
            last: None,
        }
    }

    pub fn record(&mut self, unit: &UnitResult) -> ProgressSnapshot {
        self.completed += 1;
        *self.outcomes.entry(unit.outcome.as_str().to_string()).or_insert(0) += 1;
        self.last = Some(LastUnit {
            worker: unit.worker,
            studbook_id: unit.studbook_id,
            outcome: unit.outcome,
            duration: unit.duration,
        });
        self.snapshot()
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed = self.started.elapsed();
        let average_per_unit = if self.completed == 0 {
            Duration::ZERO
        } else {
            elapsed / u32::try_from(self.completed).unwrap_or(u32::MAX)
        };
        // Wall-clock average over all workers, so parallelism is already in it
        let remaining_units = self.total.saturating_sub(self.completed);
        let estimated_remaining = average_per_unit * u32::try_from(remaining_units).unwrap_or(u32::MAX);
        let estimated_finish = Utc::now()
            + chrono::Duration::from_std(estimated_remaining).unwrap_or_else(|_| chrono::Duration::zero());

        ProgressSnapshot {
            total: self.total,
            completed: self.completed,
            outcomes: self.outcomes.clone(),
            elapsed,
            average_per_unit,
            estimated_remaining,
            estimated_finish,
            last: self.last.clone(),
        }
    }

    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed
    }

    #[must_use]
    pub fn outcomes(&self) -> &BTreeMap<String, u64> {
        &self.outcomes
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(studbook_id: StudbookId, outcome: Outcome) -> UnitResult {
        worker_unit(0, studbook_id, outcome)
    }

    fn worker_unit(worker: usize, studbook_id: StudbookId, outcome: Outcome) -> UnitResult {
        UnitResult {
            worker,
            studbook_id,
            outcome,
            duration: Duration::from_secs(2),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_counts_outcomes_and_estimates_remaining() {
        let mut tracker = ProgressTracker::new(10);

        tokio::time::advance(Duration::from_secs(4)).await;
        tracker.record(&unit(1, Outcome::Success));
        let snapshot = tracker.record(&unit(2, Outcome::InvalidId));

        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.count(Outcome::Success), 1);
        assert_eq!(snapshot.count(Outcome::InvalidId), 1);
        assert_eq!(snapshot.count(Outcome::NavigationError), 0);
        assert_eq!(snapshot.elapsed, Duration::from_secs(4));
        assert_eq!(snapshot.average_per_unit, Duration::from_secs(2));
        // 8 remaining at 2s each
        assert_eq!(snapshot.estimated_remaining, Duration::from_secs(16));
        assert!((snapshot.percentage() - 20.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.last.unwrap().studbook_id, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_workers_estimate_wall_clock_remaining() {
        let mut tracker = ProgressTracker::new(10);

        for round in 0..2 {
            tokio::time::advance(Duration::from_secs(2)).await;
            tracker.record(&worker_unit(0, 2 * round + 1, Outcome::Success));
            tracker.record(&worker_unit(1, 2 * round + 2, Outcome::Success));
        }
        let snapshot = tracker.snapshot();

        assert_eq!(snapshot.completed, 4);
        assert_eq!(snapshot.elapsed, Duration::from_secs(4));
        assert_eq!(snapshot.average_per_unit, Duration::from_secs(1));
        // two workers at 2s per unit finish the last 6 units in 6s
        assert_eq!(snapshot.estimated_remaining, Duration::from_secs(6));
    }

    #[test]
    fn empty_range_reports_complete() {
        let tracker = ProgressTracker::new(0);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.average_per_unit, Duration::ZERO);
        assert!((snapshot.percentage() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn hours_minutes_formats_like_progress_line() {
        assert_eq!(hours_minutes(Duration::from_secs(3 * 3600 + 25 * 60 + 59)), "3h 25m");
        assert_eq!(hours_minutes(Duration::ZERO), "0h 0m");
    }
}
