//! Task allocation and scheduling core.
//!
//! This crate provides the pure computations behind project planning:
//! dependency cycle detection, calendar-aware schedule calculation with a
//! critical path, worker workload scoring, and task selection rules.
//! Nothing here performs I/O; callers load a snapshot, call in, and persist
//! the results.

pub mod calendar;
pub mod clock;
pub mod config;
pub mod graph;
pub mod logging;
pub mod models;
pub mod recalculate;
pub mod schedule;
pub mod selection;
pub mod workload;

#[cfg(feature = "python")]
mod python;

pub use calendar::{CalendarError, WorkingCalendar};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, ProjectConfig, SeniorityMultipliers, WorkloadThresholds};
pub use graph::{
    has_cycle, should_block_on_insert, should_unblock_after_remove, would_create_cycle, DependencyEdge,
    DependencyGraph, GraphError,
};
pub use models::{Project, ProjectMember, SeniorityLevel, Task, TaskError, TaskStatus};
pub use recalculate::{
    apply_date_updates, assignee_seniority, plan_date_updates, recalculate_project, ProjectSnapshot,
    ProjectSnapshotProvider, RecalculateError, ScheduleSink, TaskDateUpdate,
};
pub use schedule::{ProjectSchedule, ScheduleCalculator, ScheduleError, TaskSchedule};
pub use selection::{
    SelectionContext, SelectionError, SelectionRule, TaskSelectionPolicy, Violation, ViolationKind,
};
pub use workload::{Workload, WorkloadStatus};
