//! Workload calculation: score, ratio and status band of a worker.
//!
//! - Score = sum of difficulty of the worker's InProgress tasks
//! - Effective capacity = base capacity x seniority multiplier
//! - Ratio = score / effective capacity (0 when capacity is 0)

use std::fmt;

use crate::config::{ProjectConfig, WorkloadThresholds};
use crate::models::{SeniorityLevel, Task, TaskStatus};

/// Tolerance for ratio comparisons so that e.g. 15 / 10 <= 1.5 holds exactly.
const RATIO_EPSILON: f64 = 1e-9;

/// Ordered workload bands, least to most loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorkloadStatus {
    Idle,
    Relaxed,
    Healthy,
    Tight,
    Impossible,
}

impl WorkloadStatus {
    /// Bucket a ratio using inclusive upper bounds.
    pub fn from_ratio(ratio: f64, thresholds: &WorkloadThresholds) -> Self {
        if ratio <= thresholds.idle_max() + RATIO_EPSILON {
            WorkloadStatus::Idle
        } else if ratio <= thresholds.relaxed_max() + RATIO_EPSILON {
            WorkloadStatus::Relaxed
        } else if ratio <= thresholds.healthy_max() + RATIO_EPSILON {
            WorkloadStatus::Healthy
        } else if ratio <= thresholds.tight_max() + RATIO_EPSILON {
            WorkloadStatus::Tight
        } else {
            WorkloadStatus::Impossible
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkloadStatus::Idle => "Idle",
            WorkloadStatus::Relaxed => "Relaxed",
            WorkloadStatus::Healthy => "Healthy",
            WorkloadStatus::Tight => "Tight",
            WorkloadStatus::Impossible => "Impossible",
        }
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A worker's current load. Pure value; nothing here touches storage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Workload {
    score: u64,
    effective_capacity: f64,
}

impl Workload {
    pub fn new(score: u64, base_capacity: f64, multiplier: f64) -> Self {
        Self {
            score,
            effective_capacity: base_capacity * multiplier,
        }
    }

    /// Sum the given difficulty points for a worker of `seniority`.
    pub fn calculate(
        task_points: impl IntoIterator<Item = u32>,
        seniority: SeniorityLevel,
        config: &ProjectConfig,
    ) -> Self {
        let score = task_points.into_iter().map(u64::from).sum();
        Self::new(
            score,
            config.base_capacity,
            config.capacity_multiplier(seniority),
        )
    }

    /// Only InProgress tasks with a difficulty count toward the score.
    pub fn from_tasks<'a>(
        tasks: impl IntoIterator<Item = &'a Task>,
        seniority: SeniorityLevel,
        config: &ProjectConfig,
    ) -> Self {
        let points = tasks
            .into_iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .filter_map(|t| t.difficulty);
        Self::calculate(points, seniority, config)
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn effective_capacity(&self) -> f64 {
        self.effective_capacity
    }

    pub fn ratio(&self) -> f64 {
        self.ratio_for(self.score)
    }

    fn ratio_for(&self, score: u64) -> f64 {
        if self.effective_capacity <= 0.0 {
            return 0.0;
        }
        score as f64 / self.effective_capacity
    }

    pub fn status(&self, thresholds: &WorkloadThresholds) -> WorkloadStatus {
        WorkloadStatus::from_ratio(self.ratio(), thresholds)
    }

    /// Ratio the worker would reach after taking `points` more.
    pub fn projected_ratio(&self, points: u32) -> f64 {
        self.ratio_for(self.score + u64::from(points))
    }

    pub fn can_take_additional(&self, points: u32, max_ratio: f64) -> bool {
        self.projected_ratio(points) <= max_ratio + RATIO_EPSILON
    }

    /// Largest whole number of points that still keeps the ratio at or below `max_ratio`.
    pub fn remaining_capacity_points(&self, max_ratio: f64) -> u64 {
        let remaining = self.effective_capacity * max_ratio - self.score as f64;
        if remaining <= 0.0 {
            return 0;
        }
        (remaining + RATIO_EPSILON).floor() as u64
    }
}
