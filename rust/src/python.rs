//! Python bindings for the three external call shapes plus the workload helpers.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::{DateTime, NaiveDate, Utc};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::HashMap;

use crate::calendar::WorkingCalendar;
use crate::clock::{Clock, FixedClock, SystemClock};
use crate::config::{ProjectConfig, WorkloadThresholds};
use crate::graph::{self, DependencyEdge};
use crate::models::{Project, ProjectMember, SeniorityLevel, Task, TaskStatus};
use crate::schedule::{ProjectSchedule, ScheduleCalculator, TaskSchedule};
use crate::selection::{SelectionContext, TaskSelectionPolicy, Violation, ViolationKind};
use crate::workload::Workload;

fn value_error(e: impl ToString) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn parse_seniority(name: &str) -> PyResult<SeniorityLevel> {
    SeniorityLevel::parse(name).ok_or_else(|| value_error(format!("Unknown seniority level: {name}")))
}

/// Project configuration with optional overrides of the defaults.
#[pyclass(name = "ProjectConfig")]
#[derive(Clone, Debug)]
pub struct PyProjectConfig {
    inner: ProjectConfig,
}

#[pymethods]
impl PyProjectConfig {
    #[new]
    #[pyo3(signature = (
        base_capacity=None,
        points_per_day=None,
        working_days_per_week=None,
        thresholds=None,
        default_seniority=None,
        allow_multitasking=None,
        managers_cannot_select_tasks=None,
        enforce_dependency_blocking=None,
        verbosity=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        base_capacity: Option<f64>,
        points_per_day: Option<f64>,
        working_days_per_week: Option<u8>,
        thresholds: Option<(f64, f64, f64, f64)>,
        default_seniority: Option<&str>,
        allow_multitasking: Option<bool>,
        managers_cannot_select_tasks: Option<bool>,
        enforce_dependency_blocking: Option<bool>,
        verbosity: Option<u8>,
    ) -> PyResult<Self> {
        let defaults = ProjectConfig::default();
        let thresholds = match thresholds {
            Some((idle, relaxed, healthy, tight)) => {
                WorkloadThresholds::new(idle, relaxed, healthy, tight).map_err(value_error)?
            }
            None => defaults.thresholds,
        };
        let default_seniority = match default_seniority {
            Some(name) => parse_seniority(name)?,
            None => defaults.default_seniority,
        };
        let inner = ProjectConfig {
            base_capacity: base_capacity.unwrap_or(defaults.base_capacity),
            points_per_day: points_per_day.unwrap_or(defaults.points_per_day),
            working_days_per_week: working_days_per_week.unwrap_or(defaults.working_days_per_week),
            thresholds,
            default_seniority,
            allow_multitasking: allow_multitasking.unwrap_or(defaults.allow_multitasking),
            managers_cannot_select_tasks: managers_cannot_select_tasks
                .unwrap_or(defaults.managers_cannot_select_tasks),
            enforce_dependency_blocking: enforce_dependency_blocking
                .unwrap_or(defaults.enforce_dependency_blocking),
            verbosity: verbosity.unwrap_or(defaults.verbosity),
            ..defaults
        };
        inner.validate().map_err(value_error)?;
        Ok(Self { inner })
    }

    #[getter]
    fn max_workload_ratio(&self) -> f64 {
        self.inner.max_workload_ratio()
    }

    fn __repr__(&self) -> String {
        format!(
            "ProjectConfig(base_capacity={}, points_per_day={}, working_days_per_week={})",
            self.inner.base_capacity, self.inner.points_per_day, self.inner.working_days_per_week
        )
    }
}

fn config_or_default(config: Option<PyProjectConfig>) -> ProjectConfig {
    config.map(|c| c.inner).unwrap_or_default()
}

/// Task snapshot passed in from Python.
#[pyclass(name = "Task")]
#[derive(Clone, Debug)]
pub struct PyTask {
    #[pyo3(get, set)]
    pub id: String,
    #[pyo3(get, set)]
    pub status: String,
    #[pyo3(get, set)]
    pub difficulty: Option<u32>,
    #[pyo3(get, set)]
    pub assignee_id: Option<String>,
    #[pyo3(get, set)]
    pub required_capability: Option<String>,
    #[pyo3(get, set)]
    pub expected_start: Option<DateTime<Utc>>,
}

#[pymethods]
impl PyTask {
    #[new]
    #[pyo3(signature = (id, status="Open".to_string(), difficulty=None, assignee_id=None, required_capability=None, expected_start=None))]
    fn new(
        id: String,
        status: String,
        difficulty: Option<u32>,
        assignee_id: Option<String>,
        required_capability: Option<String>,
        expected_start: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            status,
            difficulty,
            assignee_id,
            required_capability,
            expected_start,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Task(id={}, status={}, difficulty={:?})",
            self.id, self.status, self.difficulty
        )
    }
}

impl PyTask {
    fn to_task(&self) -> PyResult<Task> {
        let status = TaskStatus::parse(&self.status)
            .ok_or_else(|| value_error(format!("Unknown task status: {}", self.status)))?;
        let mut task = Task::new(self.id.clone());
        task.status = status;
        task.difficulty = self.difficulty;
        task.assignee_id = self.assignee_id.clone();
        task.required_capability = self.required_capability.clone();
        task.expected_start = self.expected_start;
        Ok(task)
    }
}

fn to_tasks(tasks: &[PyTask]) -> PyResult<Vec<Task>> {
    tasks.iter().map(PyTask::to_task).collect()
}

/// Finish-to-start edge: `blocking` must finish before `blocked` starts.
#[pyclass(name = "Dependency")]
#[derive(Clone, Debug)]
pub struct PyDependency {
    #[pyo3(get, set)]
    pub blocking: String,
    #[pyo3(get, set)]
    pub blocked: String,
}

#[pymethods]
impl PyDependency {
    #[new]
    fn new(blocking: String, blocked: String) -> Self {
        Self { blocking, blocked }
    }

    fn __repr__(&self) -> String {
        format!("Dependency({} -> {})", self.blocking, self.blocked)
    }
}

fn to_edges(dependencies: &[PyDependency]) -> PyResult<Vec<DependencyEdge>> {
    dependencies
        .iter()
        .map(|d| DependencyEdge::new(d.blocking.clone(), d.blocked.clone()).map_err(value_error))
        .collect()
}

/// Computed dates for one task.
#[pyclass(name = "TaskSchedule", get_all)]
#[derive(Clone, Debug)]
pub struct PyTaskSchedule {
    pub task_id: String,
    pub expected_start: DateTime<Utc>,
    pub expected_end: DateTime<Utc>,
    pub latest_start: DateTime<Utc>,
    pub latest_end: DateTime<Utc>,
    pub duration_days: u32,
    pub slack_days: i64,
    pub is_on_critical_path: bool,
}

impl From<TaskSchedule> for PyTaskSchedule {
    fn from(s: TaskSchedule) -> Self {
        Self {
            task_id: s.task_id,
            expected_start: s.expected_start,
            expected_end: s.expected_end,
            latest_start: s.latest_start,
            latest_end: s.latest_end,
            duration_days: s.duration_days,
            slack_days: s.slack_days,
            is_on_critical_path: s.is_on_critical_path,
        }
    }
}

#[pyclass(name = "ProjectSchedule", get_all)]
#[derive(Clone, Debug)]
pub struct PyProjectSchedule {
    pub task_schedules: HashMap<String, PyTaskSchedule>,
    pub order: Vec<String>,
    pub critical_path: Vec<String>,
    pub project_end_date: Option<DateTime<Utc>>,
}

impl From<ProjectSchedule> for PyProjectSchedule {
    fn from(s: ProjectSchedule) -> Self {
        Self {
            task_schedules: s
                .task_schedules
                .into_iter()
                .map(|(id, ts)| (id, ts.into()))
                .collect(),
            order: s.order,
            critical_path: s.critical_path,
            project_end_date: s.project_end_date,
        }
    }
}

/// One failed selection rule.
#[pyclass(name = "Violation", get_all)]
#[derive(Clone, Debug)]
pub struct PyViolation {
    pub rule_id: String,
    pub message: String,
    /// Current workload ratio, set only for workload violations.
    pub ratio: Option<f64>,
}

impl From<Violation> for PyViolation {
    fn from(v: Violation) -> Self {
        let ratio = match v.kind {
            ViolationKind::WorkloadExceeded { current_ratio, .. } => Some(current_ratio),
            _ => None,
        };
        Self {
            rule_id: v.rule_id().to_string(),
            message: v.message(),
            ratio,
        }
    }
}

#[pyclass(name = "Workload", get_all)]
#[derive(Clone, Debug)]
pub struct PyWorkload {
    pub score: u64,
    pub effective_capacity: f64,
    pub ratio: f64,
    pub status: String,
    pub remaining_capacity_points: u64,
}

/// Whether adding `new_edge` to `existing_edges` would close a cycle.
///
/// # Raises
/// * ValueError if an existing edge is a self-dependency
#[pyfunction]
fn would_create_cycle(new_edge: PyDependency, existing_edges: Vec<PyDependency>) -> PyResult<bool> {
    let existing = to_edges(&existing_edges)?;
    let edge = match DependencyEdge::new(new_edge.blocking, new_edge.blocked) {
        Ok(edge) => edge,
        // A self-loop is the smallest possible cycle
        Err(graph::GraphError::SelfDependency(_)) => return Ok(true),
        Err(e) => return Err(value_error(e)),
    };
    Ok(graph::would_create_cycle(&edge, &existing))
}

/// Compute the full project schedule.
///
/// # Arguments
/// * `tasks` - All project tasks
/// * `dependencies` - Accepted dependency edges
/// * `config` - Project configuration (defaults when omitted)
/// * `project_start` - Defaults to `now`
/// * `assignee_seniority` - Dict task id -> seniority name
/// * `excluded_dates` - Non-working dates for the project calendar
/// * `timezone` - IANA name deciding each instant's local date; UTC when omitted
/// * `now` - Current time; the wall clock when omitted
///
/// # Raises
/// * ValueError on unknown names, invalid configuration or circular dependencies
#[pyfunction]
#[pyo3(signature = (tasks, dependencies, config=None, project_start=None, assignee_seniority=None, excluded_dates=None, timezone=None, now=None))]
#[allow(clippy::too_many_arguments)]
fn calculate_schedule(
    tasks: Vec<PyTask>,
    dependencies: Vec<PyDependency>,
    config: Option<PyProjectConfig>,
    project_start: Option<DateTime<Utc>>,
    assignee_seniority: Option<HashMap<String, String>>,
    excluded_dates: Option<Vec<NaiveDate>>,
    timezone: Option<String>,
    now: Option<DateTime<Utc>>,
) -> PyResult<PyProjectSchedule> {
    let config = config_or_default(config);
    let tasks = to_tasks(&tasks)?;
    let edges = to_edges(&dependencies)?;

    let seniority = match assignee_seniority {
        Some(map) => Some(
            map.into_iter()
                .map(|(id, name)| Ok((id, parse_seniority(&name)?)))
                .collect::<PyResult<FxHashMap<String, SeniorityLevel>>>()?,
        ),
        None => None,
    };

    let mut calculator = ScheduleCalculator::new(&config).map_err(value_error)?;
    if excluded_dates.is_some() || timezone.is_some() {
        let mut calendar =
            WorkingCalendar::monday_based(config.working_days_per_week).map_err(value_error)?;
        if let Some(name) = timezone {
            calendar = WorkingCalendar::with_timezone_name(&calendar.working_weekdays(), &name)
                .map_err(value_error)?;
        }
        let calendar = calendar.with_excluded_dates(excluded_dates.unwrap_or_default());
        calculator = calculator.with_calendar(calendar);
    }

    let clock: Box<dyn Clock> = match now {
        Some(instant) => Box::new(FixedClock(instant)),
        None => Box::new(SystemClock),
    };

    calculator
        .calculate_schedule(&tasks, &edges, project_start, seniority.as_ref(), clock.as_ref())
        .map(PyProjectSchedule::from)
        .map_err(value_error)
}

/// Evaluate every selection rule for `member` taking `task`.
///
/// # Returns
/// * List of violations; empty means the selection is permitted
#[pyfunction]
#[pyo3(signature = (task, manager_id, member_id, member_user_id, member_capability, member_seniority, assigned_tasks, dependencies, all_project_tasks, config=None))]
#[allow(clippy::too_many_arguments)]
fn evaluate_selection(
    task: PyTask,
    manager_id: String,
    member_id: String,
    member_user_id: String,
    member_capability: String,
    member_seniority: &str,
    assigned_tasks: Vec<PyTask>,
    dependencies: Vec<PyDependency>,
    all_project_tasks: Vec<PyTask>,
    config: Option<PyProjectConfig>,
) -> PyResult<Vec<PyViolation>> {
    let config = config_or_default(config);
    let task = task.to_task()?;
    let project = Project::new("", manager_id);
    let member = ProjectMember::new(
        member_id,
        member_user_id,
        member_capability,
        parse_seniority(member_seniority)?,
    );
    let assigned = to_tasks(&assigned_tasks)?;
    let edges = to_edges(&dependencies)?;
    let all_tasks = to_tasks(&all_project_tasks)?;

    let ctx = SelectionContext {
        task: &task,
        project: &project,
        member: &member,
        assigned_tasks: &assigned,
        dependencies: &edges,
        all_project_tasks: &all_tasks,
        config: &config,
    };
    Ok(TaskSelectionPolicy::new()
        .evaluate(&ctx)
        .into_iter()
        .map(PyViolation::from)
        .collect())
}

/// Workload of a worker whose in-progress tasks carry `points`.
#[pyfunction]
#[pyo3(signature = (points, seniority, config=None))]
fn calculate_workload(
    points: Vec<u32>,
    seniority: &str,
    config: Option<PyProjectConfig>,
) -> PyResult<PyWorkload> {
    let config = config_or_default(config);
    let workload = Workload::calculate(points, parse_seniority(seniority)?, &config);
    Ok(PyWorkload {
        score: workload.score(),
        effective_capacity: workload.effective_capacity(),
        ratio: workload.ratio(),
        status: workload.status(&config.thresholds).to_string(),
        remaining_capacity_points: workload.remaining_capacity_points(config.max_workload_ratio()),
    })
}

/// Whether a worker with in-progress `points` can take `additional` more.
#[pyfunction]
#[pyo3(signature = (points, seniority, additional, config=None))]
fn can_take_additional(
    points: Vec<u32>,
    seniority: &str,
    additional: u32,
    config: Option<PyProjectConfig>,
) -> PyResult<bool> {
    let config = config_or_default(config);
    let workload = Workload::calculate(points, parse_seniority(seniority)?, &config);
    Ok(workload.can_take_additional(additional, config.max_workload_ratio()))
}

/// The planner_core Python module.
#[pymodule]
fn planner_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Data types
    m.add_class::<PyTask>()?;
    m.add_class::<PyDependency>()?;
    m.add_class::<PyTaskSchedule>()?;
    m.add_class::<PyProjectSchedule>()?;
    m.add_class::<PyViolation>()?;
    m.add_class::<PyWorkload>()?;

    // Config
    m.add_class::<PyProjectConfig>()?;

    // Algorithms
    m.add_function(wrap_pyfunction!(would_create_cycle, m)?)?;
    m.add_function(wrap_pyfunction!(calculate_schedule, m)?)?;
    m.add_function(wrap_pyfunction!(evaluate_selection, m)?)?;
    m.add_function(wrap_pyfunction!(calculate_workload, m)?)?;
    m.add_function(wrap_pyfunction!(can_take_additional, m)?)?;

    Ok(())
}
