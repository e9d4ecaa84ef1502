//! Whole-project schedule recalculation.
//!
//! Run after any structural change: task added or removed, dependency added or
//! removed, assignee changed. Loading and persisting are behind traits so the
//! workflow itself stays free of I/O.

use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::calendar::WorkingCalendar;
use crate::clock::Clock;
use crate::graph::DependencyEdge;
use crate::log_summary;
use crate::models::{Project, ProjectMember, SeniorityLevel, Task, TaskError, TaskStatus};
use crate::schedule::{ProjectSchedule, ScheduleCalculator, ScheduleError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecalculateError {
    #[error("Project not found: {0}")]
    ProjectNotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Consistent view of one project, loaded before recalculating.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectSnapshot {
    pub project: Project,
    pub tasks: Vec<Task>,
    pub dependencies: Vec<DependencyEdge>,
    pub members: Vec<ProjectMember>,
    /// Project calendar. None falls back to the calculator's own.
    pub calendar: Option<WorkingCalendar>,
    /// None means "now".
    pub project_start: Option<DateTime<Utc>>,
}

impl ProjectSnapshot {
    pub fn new(project: Project) -> Self {
        Self {
            project,
            tasks: Vec::new(),
            dependencies: Vec::new(),
            members: Vec::new(),
            calendar: None,
            project_start: None,
        }
    }
}

pub trait ProjectSnapshotProvider {
    fn load_snapshot(&self, project_id: &str) -> Result<ProjectSnapshot, RecalculateError>;
}

pub trait ScheduleSink {
    fn save_task_dates(&mut self, updates: &[TaskDateUpdate]) -> Result<(), RecalculateError>;

    fn save_project_end(
        &mut self,
        project_id: &str,
        end: Option<DateTime<Utc>>,
    ) -> Result<(), RecalculateError>;
}

/// Dates to persist for one task. `expected_start` is None for in-progress tasks,
/// whose start is never rewritten.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskDateUpdate {
    pub task_id: String,
    pub expected_start: Option<DateTime<Utc>>,
    pub expected_end: DateTime<Utc>,
}

/// task id -> seniority of its assignee. Unassigned tasks and unknown members get `default`.
pub fn assignee_seniority(
    tasks: &[Task],
    members: &[ProjectMember],
    default: SeniorityLevel,
) -> FxHashMap<String, SeniorityLevel> {
    let by_member: FxHashMap<&str, SeniorityLevel> = members
        .iter()
        .map(|m| (m.id.as_str(), m.seniority))
        .collect();
    tasks
        .iter()
        .map(|t| {
            let level = t
                .assignee_id
                .as_deref()
                .and_then(|id| by_member.get(id).copied())
                .unwrap_or(default);
            (t.id.clone(), level)
        })
        .collect()
}

/// Turn a schedule into per-task updates, in task order.
///
/// At most one update per scheduled id; a repeated id keeps its first occurrence.
pub fn plan_date_updates(tasks: &[Task], schedule: &ProjectSchedule) -> Vec<TaskDateUpdate> {
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    tasks
        .iter()
        .filter_map(|task| {
            let computed = schedule.get(&task.id)?;
            if !seen.insert(task.id.as_str()) {
                return None;
            }
            let expected_start = if task.status == TaskStatus::InProgress {
                None
            } else {
                Some(computed.expected_start)
            };
            Some(TaskDateUpdate {
                task_id: task.id.clone(),
                expected_start,
                expected_end: computed.expected_end,
            })
        })
        .collect()
}

/// Apply updates to matching tasks in place.
pub fn apply_date_updates(tasks: &mut [Task], updates: &[TaskDateUpdate]) -> Result<(), TaskError> {
    let by_id: FxHashMap<&str, &TaskDateUpdate> =
        updates.iter().map(|u| (u.task_id.as_str(), u)).collect();
    for task in tasks.iter_mut() {
        if let Some(update) = by_id.get(task.id.as_str()) {
            task.update_schedule(update.expected_start, Some(update.expected_end))?;
        }
    }
    Ok(())
}

/// Load, schedule and persist one project.
pub fn recalculate_project(
    project_id: &str,
    provider: &dyn ProjectSnapshotProvider,
    sink: &mut dyn ScheduleSink,
    calculator: &ScheduleCalculator,
    clock: &dyn Clock,
) -> Result<ProjectSchedule, RecalculateError> {
    let snapshot = provider.load_snapshot(project_id)?;
    let seniority = assignee_seniority(
        &snapshot.tasks,
        &snapshot.members,
        calculator.default_seniority(),
    );

    let project_calculator;
    let calculator = match &snapshot.calendar {
        Some(calendar) => {
            project_calculator = calculator.clone().with_calendar(calendar.clone());
            &project_calculator
        }
        None => calculator,
    };

    let schedule = calculator.calculate_schedule(
        &snapshot.tasks,
        &snapshot.dependencies,
        snapshot.project_start,
        Some(&seniority),
        clock,
    )?;

    let updates = plan_date_updates(&snapshot.tasks, &schedule);
    if !updates.is_empty() {
        sink.save_task_dates(&updates)?;
    }
    sink.save_project_end(project_id, schedule.project_end_date)?;

    log_summary!(
        calculator.verbosity(),
        "Recalculated project {}: {} task dates updated",
        project_id,
        updates.len()
    );
    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::ProjectConfig;
    use chrono::{NaiveDate, TimeZone};

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, month, day, 9, 0, 0).unwrap()
    }

    fn task(id: &str, points: u32) -> Task {
        let mut task = Task::new(id);
        task.difficulty = Some(points);
        task
    }

    struct InMemoryProjects {
        snapshots: Vec<ProjectSnapshot>,
    }

    impl ProjectSnapshotProvider for InMemoryProjects {
        fn load_snapshot(&self, project_id: &str) -> Result<ProjectSnapshot, RecalculateError> {
            self.snapshots
                .iter()
                .find(|s| s.project.id == project_id)
                .cloned()
                .ok_or_else(|| RecalculateError::ProjectNotFound(project_id.to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        updates: Vec<TaskDateUpdate>,
        project_end: Option<(String, Option<DateTime<Utc>>)>,
        fail: bool,
    }

    impl ScheduleSink for RecordingSink {
        fn save_task_dates(&mut self, updates: &[TaskDateUpdate]) -> Result<(), RecalculateError> {
            if self.fail {
                return Err(RecalculateError::Storage("disk full".to_string()));
            }
            self.updates.extend_from_slice(updates);
            Ok(())
        }

        fn save_project_end(
            &mut self,
            project_id: &str,
            end: Option<DateTime<Utc>>,
        ) -> Result<(), RecalculateError> {
            self.project_end = Some((project_id.to_string(), end));
            Ok(())
        }
    }

    fn snapshot() -> ProjectSnapshot {
        let mut doing = task("a", 4);
        doing.status = TaskStatus::InProgress;
        doing.assignee_id = Some("m-senior".to_string());
        doing.expected_start = Some(at(1, 6));

        let mut snapshot = ProjectSnapshot::new(Project::new("p1", "u-boss"));
        snapshot.tasks = vec![doing, task("b", 2)];
        snapshot.dependencies = vec![DependencyEdge::new("a", "b").unwrap()];
        snapshot.members = vec![ProjectMember::new(
            "m-senior",
            "u-1",
            "backend",
            SeniorityLevel::Senior,
        )];
        snapshot.project_start = Some(at(1, 6));
        snapshot
    }

    fn calculator() -> ScheduleCalculator {
        ScheduleCalculator::new(&ProjectConfig::default()).unwrap()
    }

    #[test]
    fn test_assignee_seniority() {
        let mut assigned = task("a", 1);
        assigned.assignee_id = Some("m1".to_string());
        let mut stranger = task("b", 1);
        stranger.assignee_id = Some("gone".to_string());
        let tasks = vec![assigned, stranger, task("c", 1)];
        let members = vec![ProjectMember::new("m1", "u1", "qa", SeniorityLevel::Lead)];

        let map = assignee_seniority(&tasks, &members, SeniorityLevel::Junior);
        assert_eq!(map["a"], SeniorityLevel::Lead);
        assert_eq!(map["b"], SeniorityLevel::Junior);
        assert_eq!(map["c"], SeniorityLevel::Junior);
    }

    #[test]
    fn test_recalculate_persists_dates() {
        let provider = InMemoryProjects {
            snapshots: vec![snapshot()],
        };
        let mut sink = RecordingSink::default();
        let schedule = recalculate_project(
            "p1",
            &provider,
            &mut sink,
            &calculator(),
            &FixedClock(at(3, 3)),
        )
        .unwrap();

        // a: 4 points at senior rate 2.6/day = 2 days; b starts when a ends
        assert_eq!(schedule.get("a").unwrap().duration_days, 2);
        assert_eq!(
            sink.updates,
            vec![
                TaskDateUpdate {
                    task_id: "a".to_string(),
                    expected_start: None,
                    expected_end: at(1, 8),
                },
                TaskDateUpdate {
                    task_id: "b".to_string(),
                    expected_start: Some(at(1, 8)),
                    expected_end: at(1, 9),
                },
            ]
        );
        assert_eq!(sink.project_end, Some(("p1".to_string(), Some(at(1, 9)))));
    }

    #[test]
    fn test_project_calendar_is_used() {
        let mut snap = snapshot();
        snap.calendar = Some(
            WorkingCalendar::default().with_excluded_dates([NaiveDate::from_ymd_opt(2025, 1, 7).unwrap()]),
        );
        let provider = InMemoryProjects {
            snapshots: vec![snap],
        };
        let mut sink = RecordingSink::default();
        let schedule = recalculate_project(
            "p1",
            &provider,
            &mut sink,
            &calculator(),
            &FixedClock(at(3, 3)),
        )
        .unwrap();
        assert_eq!(schedule.get("a").unwrap().expected_end, at(1, 9));
    }

    #[test]
    fn test_missing_project_and_storage_failure() {
        let provider = InMemoryProjects {
            snapshots: vec![snapshot()],
        };
        let mut sink = RecordingSink::default();
        let clock = FixedClock(at(3, 3));
        assert_eq!(
            recalculate_project("nope", &provider, &mut sink, &calculator(), &clock),
            Err(RecalculateError::ProjectNotFound("nope".to_string()))
        );

        sink.fail = true;
        assert!(matches!(
            recalculate_project("p1", &provider, &mut sink, &calculator(), &clock),
            Err(RecalculateError::Storage(_))
        ));
        assert_eq!(sink.project_end, None);
    }

    #[test]
    fn test_cycle_surfaces_as_schedule_error() {
        let mut snap = snapshot();
        snap.dependencies.push(DependencyEdge::new("b", "a").unwrap());
        let provider = InMemoryProjects {
            snapshots: vec![snap],
        };
        let mut sink = RecordingSink::default();
        let result = recalculate_project(
            "p1",
            &provider,
            &mut sink,
            &calculator(),
            &FixedClock(at(3, 3)),
        );
        assert!(matches!(
            result,
            Err(RecalculateError::Schedule(ScheduleError::CircularDependency { .. }))
        ));
        assert!(sink.updates.is_empty());
    }

    #[test]
    fn test_apply_updates_keeps_in_progress_start() {
        let snap = snapshot();
        let schedule = calculator()
            .calculate_schedule(
                &snap.tasks,
                &snap.dependencies,
                Some(at(1, 13)),
                None,
                &FixedClock(at(3, 3)),
            )
            .unwrap();
        let updates = plan_date_updates(&snap.tasks, &schedule);

        let mut tasks = snap.tasks.clone();
        apply_date_updates(&mut tasks, &updates).unwrap();
        assert_eq!(tasks[0].expected_start, Some(at(1, 6)));
        assert_eq!(tasks[0].expected_end, Some(schedule.get("a").unwrap().expected_end));
        assert_eq!(tasks[1].expected_start, Some(schedule.get("b").unwrap().expected_start));
    }

    #[test]
    fn test_terminal_tasks_get_no_update() {
        let mut done = task("z", 2);
        done.status = TaskStatus::Done;
        let tasks = vec![done];
        let schedule = calculator()
            .calculate_schedule(&tasks, &[], Some(at(1, 6)), None, &FixedClock(at(3, 3)))
            .unwrap();
        assert!(plan_date_updates(&tasks, &schedule).is_empty());
    }

    #[test]
    fn test_repeated_task_id_gets_one_update() {
        let mut doing = task("a", 2);
        doing.status = TaskStatus::InProgress;
        let tasks = vec![doing, task("a", 20), task("b", 2)];
        let schedule = calculator()
            .calculate_schedule(&tasks, &[], Some(at(1, 6)), None, &FixedClock(at(3, 3)))
            .unwrap();

        let updates = plan_date_updates(&tasks, &schedule);
        let ids: Vec<&str> = updates.iter().map(|u| u.task_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        // First copy wins: InProgress keeps its start, 2 points take one day
        assert_eq!(updates[0].expected_start, None);
        assert_eq!(updates[0].expected_end, at(1, 7));
    }
}
