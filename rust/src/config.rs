//! Configuration types for workload gating and schedule calculation.

use thiserror::Error;

use crate::models::SeniorityLevel;

/// Invalid configuration values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Workload thresholds must be strictly ascending (got {idle} / {relaxed} / {healthy} / {tight})")]
    ThresholdsNotAscending {
        idle: f64,
        relaxed: f64,
        healthy: f64,
        tight: f64,
    },
    #[error("Points per day must be positive (got {0})")]
    NonPositivePointsPerDay(f64),
    #[error("Working days per week must be between 1 and 7 (got {0})")]
    WorkingDaysOutOfRange(u8),
    #[error("Base capacity cannot be negative (got {0})")]
    NegativeBaseCapacity(f64),
    #[error("Capacity multiplier for {level} must be positive (got {value})")]
    NonPositiveMultiplier { level: SeniorityLevel, value: f64 },
}

/// Inclusive upper bounds of the workload status bands.
///
/// - Idle: ratio <= idle_max
/// - Relaxed: <= relaxed_max
/// - Healthy: <= healthy_max
/// - Tight: <= tight_max
/// - Impossible: above tight_max
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorkloadThresholds {
    idle_max: f64,
    relaxed_max: f64,
    healthy_max: f64,
    tight_max: f64,
}

impl Default for WorkloadThresholds {
    fn default() -> Self {
        Self {
            idle_max: 0.3,
            relaxed_max: 0.7,
            healthy_max: 1.2,
            tight_max: 1.5,
        }
    }
}

impl WorkloadThresholds {
    pub fn new(
        idle_max: f64,
        relaxed_max: f64,
        healthy_max: f64,
        tight_max: f64,
    ) -> Result<Self, ConfigError> {
        if !(idle_max < relaxed_max && relaxed_max < healthy_max && healthy_max < tight_max) {
            return Err(ConfigError::ThresholdsNotAscending {
                idle: idle_max,
                relaxed: relaxed_max,
                healthy: healthy_max,
                tight: tight_max,
            });
        }
        Ok(Self {
            idle_max,
            relaxed_max,
            healthy_max,
            tight_max,
        })
    }

    pub fn idle_max(&self) -> f64 {
        self.idle_max
    }

    pub fn relaxed_max(&self) -> f64 {
        self.relaxed_max
    }

    pub fn healthy_max(&self) -> f64 {
        self.healthy_max
    }

    pub fn tight_max(&self) -> f64 {
        self.tight_max
    }
}

/// Capacity multiplier per seniority tier. Also scales the points-per-day rate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeniorityMultipliers {
    pub junior: f64,
    pub mid: f64,
    pub senior: f64,
    pub specialist: f64,
    pub lead: f64,
}

impl Default for SeniorityMultipliers {
    fn default() -> Self {
        Self {
            junior: 0.6,
            mid: 1.0,
            senior: 1.3,
            specialist: 1.2,
            lead: 1.1,
        }
    }
}

impl SeniorityMultipliers {
    pub fn get(&self, level: SeniorityLevel) -> f64 {
        match level {
            SeniorityLevel::Junior => self.junior,
            SeniorityLevel::Mid => self.mid,
            SeniorityLevel::Senior => self.senior,
            SeniorityLevel::Specialist => self.specialist,
            SeniorityLevel::Lead => self.lead,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for level in SeniorityLevel::ALL {
            let value = self.get(level);
            if !(value > 0.0) {
                return Err(ConfigError::NonPositiveMultiplier { level, value });
            }
        }
        Ok(())
    }
}

/// Project-level configuration shared by the selection policy and the scheduler.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectConfig {
    /// Story points a Mid-level worker can carry at ratio 1.0.
    pub base_capacity: f64,
    pub multipliers: SeniorityMultipliers,
    pub thresholds: WorkloadThresholds,
    /// Story points a Mid-level worker completes per working day.
    pub points_per_day: f64,
    /// Used to derive a Monday-based calendar when the project has none.
    pub working_days_per_week: u8,
    /// Seniority assumed for unassigned tasks.
    pub default_seniority: SeniorityLevel,
    /// When false a worker may hold only one in-progress task.
    pub allow_multitasking: bool,
    pub managers_cannot_select_tasks: bool,
    pub enforce_dependency_blocking: bool,
    /// Verbosity level: 0=silent, 1=summary, 2=checks, 3=trace.
    pub verbosity: u8,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            base_capacity: 10.0,
            multipliers: SeniorityMultipliers::default(),
            thresholds: WorkloadThresholds::default(),
            points_per_day: 2.0,
            working_days_per_week: 5,
            default_seniority: SeniorityLevel::Mid,
            allow_multitasking: false,
            managers_cannot_select_tasks: true,
            enforce_dependency_blocking: true,
            verbosity: 0,
        }
    }
}

impl ProjectConfig {
    /// Highest workload ratio a worker may reach by taking a task.
    pub fn max_workload_ratio(&self) -> f64 {
        self.thresholds.tight_max()
    }

    pub fn capacity_multiplier(&self, level: SeniorityLevel) -> f64 {
        self.multipliers.get(level)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.points_per_day > 0.0) {
            return Err(ConfigError::NonPositivePointsPerDay(self.points_per_day));
        }
        if !(1..=7).contains(&self.working_days_per_week) {
            return Err(ConfigError::WorkingDaysOutOfRange(self.working_days_per_week));
        }
        if self.base_capacity < 0.0 || self.base_capacity.is_nan() {
            return Err(ConfigError::NegativeBaseCapacity(self.base_capacity));
        }
        self.multipliers.validate()
    }
}
