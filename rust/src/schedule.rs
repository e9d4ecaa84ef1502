//! Project schedule calculation: topological order, forward pass, backward pass, critical path.
//!
//! The whole project is recomputed on every call; there is no incremental path.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use thiserror::Error;

use crate::calendar::{CalendarError, WorkingCalendar};
use crate::clock::Clock;
use crate::config::{ConfigError, ProjectConfig, SeniorityMultipliers};
use crate::graph::DependencyEdge;
use crate::models::{SeniorityLevel, Task};
use crate::{log_checks, log_summary, log_trace};

/// Guards the duration ceiling against float noise (13 / 2.6 must give 5, not 6).
const DURATION_EPSILON: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("Circular dependency detected among tasks: {unresolved:?}")]
    CircularDependency { unresolved: Vec<String> },
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid calendar: {0}")]
    Calendar(#[from] CalendarError),
    #[error("Dates of task {task_id} fall outside the supported range")]
    DateOutOfRange { task_id: String },
}

/// Computed dates for one task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskSchedule {
    pub task_id: String,
    /// Earliest start (forward pass).
    pub expected_start: DateTime<Utc>,
    /// Earliest end (forward pass).
    pub expected_end: DateTime<Utc>,
    /// Latest start that keeps the project end date (backward pass).
    pub latest_start: DateTime<Utc>,
    pub latest_end: DateTime<Utc>,
    pub duration_days: u32,
    /// Working days the start can slip without moving the project end.
    pub slack_days: i64,
    pub is_on_critical_path: bool,
}

/// Schedule for an entire project.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProjectSchedule {
    pub task_schedules: FxHashMap<String, TaskSchedule>,
    /// Task ids in scheduling (topological) order.
    pub order: Vec<String>,
    /// One chain of zero-slack tasks from project start to project end.
    /// Other zero-slack tasks are flagged on their `TaskSchedule` only.
    pub critical_path: Vec<String>,
    /// Latest earliest-end of all scheduled tasks. None when nothing was scheduled.
    pub project_end_date: Option<DateTime<Utc>>,
}

impl ProjectSchedule {
    pub fn is_empty(&self) -> bool {
        self.task_schedules.is_empty()
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskSchedule> {
        self.task_schedules.get(task_id)
    }

    /// Sum of durations along the critical path, in working days.
    pub fn critical_path_duration_days(&self) -> u64 {
        self.critical_path
            .iter()
            .filter_map(|id| self.task_schedules.get(id))
            .map(|s| u64::from(s.duration_days))
            .sum()
    }
}

/// Calendar-aware schedule calculator.
#[derive(Clone, Debug)]
pub struct ScheduleCalculator {
    points_per_day: f64,
    multipliers: SeniorityMultipliers,
    default_seniority: SeniorityLevel,
    calendar: WorkingCalendar,
    verbosity: u8,
}

impl ScheduleCalculator {
    /// Uses a Monday-based calendar of `working_days_per_week` days until
    /// `with_calendar` supplies the project's own.
    pub fn new(config: &ProjectConfig) -> Result<Self, ScheduleError> {
        config.validate()?;
        Ok(Self {
            points_per_day: config.points_per_day,
            multipliers: config.multipliers,
            default_seniority: config.default_seniority,
            calendar: WorkingCalendar::monday_based(config.working_days_per_week)?,
            verbosity: config.verbosity,
        })
    }

    pub fn with_calendar(mut self, calendar: WorkingCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn calendar(&self) -> &WorkingCalendar {
        &self.calendar
    }

    /// Tier assumed for tasks missing from the seniority map.
    pub fn default_seniority(&self) -> SeniorityLevel {
        self.default_seniority
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Working days needed for `difficulty` points at the given seniority.
    ///
    /// ceil(points / (points_per_day x multiplier)), never less than 1.
    pub fn estimate_duration_days(&self, difficulty: Option<u32>, seniority: SeniorityLevel) -> u32 {
        let points = match difficulty {
            Some(p) if p > 0 => p,
            _ => return 1,
        };
        let rate = self.points_per_day * self.multipliers.get(seniority);
        if rate <= 0.0 {
            return 1;
        }
        let days = (f64::from(points) / rate - DURATION_EPSILON).ceil();
        if days < 1.0 {
            1
        } else {
            days as u32
        }
    }

    /// Compute dates, slack and the critical path for every non-terminal task.
    ///
    /// # Arguments
    /// * `tasks` - All project tasks; Done and Cancelled ones are ignored
    /// * `dependencies` - Accepted edges; edges touching ignored tasks impose nothing
    /// * `project_start` - Defaults to `clock.now()`
    /// * `assignee_seniority` - task id -> seniority of its assignee; missing tasks use the default tier
    /// * `clock` - Source of "now"
    ///
    /// # Returns
    /// * `Err(ScheduleError::CircularDependency)` listing the tasks that could not be ordered
    pub fn calculate_schedule(
        &self,
        tasks: &[Task],
        dependencies: &[DependencyEdge],
        project_start: Option<DateTime<Utc>>,
        assignee_seniority: Option<&FxHashMap<String, SeniorityLevel>>,
        clock: &dyn Clock,
    ) -> Result<ProjectSchedule, ScheduleError> {
        let verbosity = self.verbosity;

        let graph = ScheduleGraph::build(tasks, dependencies);
        if graph.tasks.is_empty() {
            log_summary!(verbosity, "Schedule: no open tasks, nothing to schedule");
            return Ok(ProjectSchedule::default());
        }

        let project_start = project_start.unwrap_or_else(|| clock.now());
        let order = graph.topological_order()?;
        let n = graph.tasks.len();

        let durations: Vec<u32> = graph
            .tasks
            .iter()
            .map(|task| {
                let seniority = assignee_seniority
                    .and_then(|m| m.get(&task.id))
                    .copied()
                    .unwrap_or(self.default_seniority);
                self.estimate_duration_days(task.difficulty, seniority)
            })
            .collect();

        // Forward pass
        let mut earliest_start = vec![project_start; n];
        let mut earliest_end = vec![project_start; n];
        for &idx in &order {
            let task = graph.tasks[idx];
            let mut start = graph.predecessors[idx]
                .iter()
                .map(|&p| earliest_end[p])
                .fold(project_start, |latest, end| latest.max(end));
            if let Some(pinned) = task.expected_start {
                if pinned > start {
                    log_trace!(verbosity, "  {} keeps pinned start {}", task.id, pinned);
                    start = pinned;
                }
            }
            earliest_start[idx] = start;
            earliest_end[idx] = self
                .calendar
                .add_working_days(start, i64::from(durations[idx]))
                .map_err(|_| ScheduleError::DateOutOfRange {
                    task_id: task.id.clone(),
                })?;
            log_trace!(
                verbosity,
                "  forward {}: {} -> {} ({}d)",
                task.id,
                earliest_start[idx],
                earliest_end[idx],
                durations[idx]
            );
        }

        let project_end = order
            .iter()
            .map(|&idx| earliest_end[idx])
            .max()
            .unwrap_or(project_start);

        // Backward pass
        let mut latest_start = vec![project_end; n];
        let mut latest_end = vec![project_end; n];
        for &idx in order.iter().rev() {
            let end = graph.successors[idx]
                .iter()
                .map(|&s| latest_start[s])
                .fold(project_end, |earliest, start| earliest.min(start));
            latest_end[idx] = end;
            latest_start[idx] = self
                .calendar
                .add_working_days(end, -i64::from(durations[idx]))
                .map_err(|_| ScheduleError::DateOutOfRange {
                    task_id: graph.tasks[idx].id.clone(),
                })?;
            log_trace!(
                verbosity,
                "  backward {}: {} -> {}",
                graph.tasks[idx].id,
                latest_start[idx],
                latest_end[idx]
            );
        }

        let raw_slack: Vec<i64> = (0..n)
            .map(|idx| {
                self.calendar
                    .working_days_between(earliest_start[idx], latest_start[idx])
            })
            .collect();
        let critical: Vec<bool> = raw_slack.iter().map(|&slack| slack <= 0).collect();
        let chain = graph.critical_chain(&order, &critical, &earliest_start, &earliest_end, project_end);

        let mut schedule = ProjectSchedule {
            task_schedules: FxHashMap::with_capacity_and_hasher(n, Default::default()),
            order: Vec::with_capacity(n),
            critical_path: chain.iter().map(|&idx| graph.tasks[idx].id.clone()).collect(),
            project_end_date: Some(project_end),
        };

        for &idx in &order {
            let task_id = graph.tasks[idx].id.clone();
            let raw_slack = raw_slack[idx];
            let is_critical = critical[idx];
            log_checks!(
                verbosity,
                "{}: start {} end {} slack {}{}",
                task_id,
                earliest_start[idx],
                earliest_end[idx],
                raw_slack.max(0),
                if is_critical { " [critical]" } else { "" }
            );
            schedule.order.push(task_id.clone());
            schedule.task_schedules.insert(
                task_id.clone(),
                TaskSchedule {
                    task_id,
                    expected_start: earliest_start[idx],
                    expected_end: earliest_end[idx],
                    latest_start: latest_start[idx],
                    latest_end: latest_end[idx],
                    duration_days: durations[idx],
                    slack_days: raw_slack.max(0),
                    is_on_critical_path: is_critical,
                },
            );
        }

        log_summary!(
            verbosity,
            "Schedule: {} tasks, project end {}, critical path {:?}",
            n,
            project_end,
            schedule.critical_path
        );

        Ok(schedule)
    }
}

/// Index-based view of the schedulable tasks and the edges between them.
struct ScheduleGraph<'a> {
    /// Non-terminal tasks in input order (first occurrence of each id).
    tasks: Vec<&'a Task>,
    predecessors: Vec<Vec<usize>>,
    successors: Vec<Vec<usize>>,
}

impl<'a> ScheduleGraph<'a> {
    fn build(tasks: &'a [Task], dependencies: &[DependencyEdge]) -> Self {
        let mut index: FxHashMap<&str, usize> = FxHashMap::default();
        let mut schedulable: Vec<&Task> = Vec::new();
        for task in tasks.iter().filter(|t| !t.status.is_terminal()) {
            if !index.contains_key(task.id.as_str()) {
                index.insert(task.id.as_str(), schedulable.len());
                schedulable.push(task);
            }
        }

        let mut predecessors = vec![Vec::new(); schedulable.len()];
        let mut successors = vec![Vec::new(); schedulable.len()];
        for dep in dependencies {
            if let (Some(&from), Some(&to)) = (index.get(dep.blocking()), index.get(dep.blocked())) {
                successors[from].push(to);
                predecessors[to].push(from);
            }
        }

        Self {
            tasks: schedulable,
            predecessors,
            successors,
        }
    }

    /// Kahn's algorithm. Ready tasks are taken FIFO, seeded in input order.
    fn topological_order(&self) -> Result<Vec<usize>, ScheduleError> {
        let n = self.tasks.len();
        let mut in_degree: Vec<usize> = self.predecessors.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            for &next in &self.successors[idx] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != n {
            let unresolved = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.tasks[i].id.clone())
                .collect();
            return Err(ScheduleError::CircularDependency { unresolved });
        }
        Ok(order)
    }

    /// Walk back from the first zero-slack task that ends at `project_end`,
    /// each time taking the first zero-slack blocker whose end is the current start.
    fn critical_chain(
        &self,
        order: &[usize],
        critical: &[bool],
        earliest_start: &[DateTime<Utc>],
        earliest_end: &[DateTime<Utc>],
        project_end: DateTime<Utc>,
    ) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = order
            .iter()
            .copied()
            .find(|&idx| critical[idx] && earliest_end[idx] == project_end);
        while let Some(idx) = current {
            chain.push(idx);
            current = self.predecessors[idx]
                .iter()
                .copied()
                .find(|&p| critical[p] && earliest_end[p] == earliest_start[idx]);
        }
        chain.reverse();
        chain
    }
}
