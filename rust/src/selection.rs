//! Task selection policy: ordered, independently toggleable eligibility rules.
//!
//! Each rule is a pure check over a `SelectionContext`. The policy runs every
//! enabled rule and returns all violations; an empty list means the worker may
//! take the task. Nothing here mutates state.

use std::fmt;

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::config::ProjectConfig;
use crate::graph::DependencyEdge;
use crate::models::{Project, ProjectMember, Task, TaskStatus};
use crate::workload::Workload;
use crate::{log_checks, log_summary};

/// Caller-facing error for a denied selection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    #[error("Managers cannot select tasks. Their role is administrative only.")]
    ManagerCannotSelect,
    #[error("Task {task_id} cannot be selected: {reason}")]
    TaskNotSelectable { task_id: String, reason: String },
    #[error("Selecting this task would exceed workload capacity (current ratio: {ratio:.2})")]
    WorkloadExceeded { ratio: f64 },
}

impl SelectionError {
    pub fn from_violation(task_id: &str, violation: &Violation) -> Self {
        match &violation.kind {
            ViolationKind::ManagerSelfAssignment => SelectionError::ManagerCannotSelect,
            ViolationKind::WorkloadExceeded { current_ratio, .. } => SelectionError::WorkloadExceeded {
                ratio: *current_ratio,
            },
            _ => SelectionError::TaskNotSelectable {
                task_id: task_id.to_string(),
                reason: violation.to_string(),
            },
        }
    }
}

/// Selection rules in evaluation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SelectionRule {
    /// Project managers may not take tasks themselves.
    ManagerRestriction,
    /// The task must have difficulty points.
    DifficultySet,
    /// Only Open tasks can be taken.
    OpenStatus,
    /// A required capability must match the worker's.
    CapabilityMatch,
    /// Every blocking task must be Done.
    DependenciesDone,
    /// The worker may not already have another task in progress.
    SingleFocus,
    /// The worker's ratio must stay at or below the maximum after taking the task.
    WorkloadCapacity,
}

impl SelectionRule {
    pub const ALL: [SelectionRule; 7] = [
        SelectionRule::ManagerRestriction,
        SelectionRule::DifficultySet,
        SelectionRule::OpenStatus,
        SelectionRule::CapabilityMatch,
        SelectionRule::DependenciesDone,
        SelectionRule::SingleFocus,
        SelectionRule::WorkloadCapacity,
    ];

    /// Business rule identifier.
    pub fn rule_id(self) -> &'static str {
        match self {
            SelectionRule::ManagerRestriction => "BR-PROJ-002",
            SelectionRule::DifficultySet => "BR-TASK-004",
            SelectionRule::OpenStatus => "BR-TASK-003",
            SelectionRule::CapabilityMatch => "BR-ASSIGN-002",
            SelectionRule::DependenciesDone => "BR-DEP-001",
            SelectionRule::SingleFocus => "BR-ASSIGN-004",
            SelectionRule::WorkloadCapacity => "BR-ASSIGN-003",
        }
    }

    pub fn is_enabled(self, config: &ProjectConfig) -> bool {
        match self {
            SelectionRule::ManagerRestriction => config.managers_cannot_select_tasks,
            SelectionRule::DependenciesDone => config.enforce_dependency_blocking,
            SelectionRule::SingleFocus => !config.allow_multitasking,
            SelectionRule::DifficultySet
            | SelectionRule::OpenStatus
            | SelectionRule::CapabilityMatch
            | SelectionRule::WorkloadCapacity => true,
        }
    }

    /// Run this rule alone, ignoring whether it is enabled.
    pub fn check(self, ctx: &SelectionContext<'_>) -> Option<Violation> {
        let kind = match self {
            SelectionRule::ManagerRestriction => check_manager(ctx),
            SelectionRule::DifficultySet => check_difficulty(ctx),
            SelectionRule::OpenStatus => check_status(ctx),
            SelectionRule::CapabilityMatch => check_capability(ctx),
            SelectionRule::DependenciesDone => check_dependencies(ctx),
            SelectionRule::SingleFocus => check_single_focus(ctx),
            SelectionRule::WorkloadCapacity => check_workload(ctx),
        }?;
        Some(Violation { rule: self, kind })
    }
}

impl fmt::Display for SelectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rule_id())
    }
}

/// Details of why a rule failed.
#[derive(Clone, Debug, PartialEq)]
pub enum ViolationKind {
    ManagerSelfAssignment,
    MissingDifficulty,
    WrongStatus { status: TaskStatus },
    CapabilityMismatch { required: String, actual: String },
    UnfinishedDependencies { blocking_task_ids: Vec<String> },
    AlreadyInProgress { task_id: String },
    WorkloadExceeded {
        current_ratio: f64,
        projected_ratio: f64,
        max_ratio: f64,
    },
}

/// One failed rule.
#[derive(Clone, Debug, PartialEq)]
pub struct Violation {
    pub rule: SelectionRule,
    pub kind: ViolationKind,
}

impl Violation {
    pub fn rule_id(&self) -> &'static str {
        self.rule.rule_id()
    }

    pub fn message(&self) -> String {
        match &self.kind {
            ViolationKind::ManagerSelfAssignment => {
                "Managers cannot select tasks. Their role is administrative only.".to_string()
            }
            ViolationKind::MissingDifficulty => "Task has no difficulty points set.".to_string(),
            ViolationKind::WrongStatus { status } => {
                format!("Task is in {} status, not Open.", status)
            }
            ViolationKind::CapabilityMismatch { required, actual } => format!(
                "Task requires capability {}, member has {}.",
                required, actual
            ),
            ViolationKind::UnfinishedDependencies { blocking_task_ids } => format!(
                "Task has unfinished dependencies: {}.",
                blocking_task_ids.join(", ")
            ),
            ViolationKind::AlreadyInProgress { task_id } => format!(
                "Already working on task {}. Complete or abandon it first.",
                task_id
            ),
            ViolationKind::WorkloadExceeded { current_ratio, .. } => format!(
                "Selecting this task would exceed workload capacity (current ratio: {:.2}).",
                current_ratio
            ),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule_id(), self.message())
    }
}

/// Immutable snapshot a selection is judged against.
#[derive(Clone, Copy, Debug)]
pub struct SelectionContext<'a> {
    pub task: &'a Task,
    pub project: &'a Project,
    /// The worker asking to take the task.
    pub member: &'a ProjectMember,
    /// Tasks currently assigned to the worker.
    pub assigned_tasks: &'a [Task],
    /// Dependency edges of the project.
    pub dependencies: &'a [DependencyEdge],
    pub all_project_tasks: &'a [Task],
    pub config: &'a ProjectConfig,
}

fn check_manager(ctx: &SelectionContext<'_>) -> Option<ViolationKind> {
    ctx.project
        .is_manager(&ctx.member.user_id)
        .then_some(ViolationKind::ManagerSelfAssignment)
}

fn check_difficulty(ctx: &SelectionContext<'_>) -> Option<ViolationKind> {
    ctx.task
        .difficulty
        .is_none()
        .then_some(ViolationKind::MissingDifficulty)
}

fn check_status(ctx: &SelectionContext<'_>) -> Option<ViolationKind> {
    (ctx.task.status != TaskStatus::Open).then_some(ViolationKind::WrongStatus {
        status: ctx.task.status,
    })
}

fn check_capability(ctx: &SelectionContext<'_>) -> Option<ViolationKind> {
    let required = ctx.task.required_capability.as_ref()?;
    (*required != ctx.member.capability).then(|| ViolationKind::CapabilityMismatch {
        required: required.clone(),
        actual: ctx.member.capability.clone(),
    })
}

fn check_dependencies(ctx: &SelectionContext<'_>) -> Option<ViolationKind> {
    let blockers: FxHashSet<&str> = ctx
        .dependencies
        .iter()
        .filter(|dep| dep.blocked() == ctx.task.id)
        .map(|dep| dep.blocking())
        .collect();
    if blockers.is_empty() {
        return None;
    }
    // Blockers not present in the project task list are treated as satisfied.
    let unfinished: Vec<String> = ctx
        .all_project_tasks
        .iter()
        .filter(|t| blockers.contains(t.id.as_str()) && t.status != TaskStatus::Done)
        .map(|t| t.id.clone())
        .collect();
    (!unfinished.is_empty()).then_some(ViolationKind::UnfinishedDependencies {
        blocking_task_ids: unfinished,
    })
}

fn check_single_focus(ctx: &SelectionContext<'_>) -> Option<ViolationKind> {
    ctx.assigned_tasks
        .iter()
        .find(|t| t.status == TaskStatus::InProgress && t.id != ctx.task.id)
        .map(|t| ViolationKind::AlreadyInProgress {
            task_id: t.id.clone(),
        })
}

fn check_workload(ctx: &SelectionContext<'_>) -> Option<ViolationKind> {
    // Unsized tasks are reported by the difficulty rule.
    let points = ctx.task.difficulty?;
    let workload = Workload::from_tasks(ctx.assigned_tasks, ctx.member.seniority, ctx.config);
    let max_ratio = ctx.config.max_workload_ratio();
    if workload.can_take_additional(points, max_ratio) {
        return None;
    }
    Some(ViolationKind::WorkloadExceeded {
        current_ratio: workload.ratio(),
        projected_ratio: workload.projected_ratio(points),
        max_ratio,
    })
}

/// Evaluates selection rules in a fixed order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskSelectionPolicy {
    rules: Vec<SelectionRule>,
}

impl Default for TaskSelectionPolicy {
    fn default() -> Self {
        Self {
            rules: SelectionRule::ALL.to_vec(),
        }
    }
}

impl TaskSelectionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the given rules, in the given order.
    pub fn with_rules(rules: impl IntoIterator<Item = SelectionRule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn rules(&self) -> &[SelectionRule] {
        &self.rules
    }

    /// Every violation of an enabled rule, in rule order. Empty means permitted.
    pub fn evaluate(&self, ctx: &SelectionContext<'_>) -> Vec<Violation> {
        let verbosity = ctx.config.verbosity;
        let mut violations = Vec::new();
        for &rule in &self.rules {
            if !rule.is_enabled(ctx.config) {
                log_checks!(verbosity, "{} skipped (disabled)", rule);
                continue;
            }
            match rule.check(ctx) {
                Some(violation) => {
                    log_checks!(verbosity, "{} failed: {}", rule, violation.message());
                    violations.push(violation);
                }
                None => log_checks!(verbosity, "{} passed", rule),
            }
        }

        if violations.is_empty() {
            log_summary!(
                verbosity,
                "Selection of {} by {} permitted",
                ctx.task.id,
                ctx.member.id
            );
        } else {
            log_summary!(
                verbosity,
                "Selection of {} by {} denied ({} violations)",
                ctx.task.id,
                ctx.member.id,
                violations.len()
            );
        }
        violations
    }

    pub fn can_select(&self, ctx: &SelectionContext<'_>) -> bool {
        self.evaluate(ctx).is_empty()
    }

    pub fn first_violation(&self, ctx: &SelectionContext<'_>) -> Option<Violation> {
        self.evaluate(ctx).into_iter().next()
    }

    /// `Ok` when permitted, otherwise the first violation as a `SelectionError`.
    pub fn ensure_selectable(&self, ctx: &SelectionContext<'_>) -> Result<(), SelectionError> {
        match self.first_violation(ctx) {
            Some(violation) => Err(SelectionError::from_violation(&ctx.task.id, &violation)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeniorityLevel;

    /// Owns everything a `SelectionContext` borrows. Defaults to a permitted selection.
    struct Fixture {
        task: Task,
        project: Project,
        member: ProjectMember,
        assigned: Vec<Task>,
        dependencies: Vec<DependencyEdge>,
        all_tasks: Vec<Task>,
        config: ProjectConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let mut task = Task::new("t1");
            task.difficulty = Some(3);
            Self {
                all_tasks: vec![task.clone()],
                task,
                project: Project::new("p1", "u-manager"),
                member: ProjectMember::new("m1", "u-dev", "backend", SeniorityLevel::Mid),
                assigned: Vec::new(),
                dependencies: Vec::new(),
                config: ProjectConfig::default(),
            }
        }

        fn ctx(&self) -> SelectionContext<'_> {
            SelectionContext {
                task: &self.task,
                project: &self.project,
                member: &self.member,
                assigned_tasks: &self.assigned,
                dependencies: &self.dependencies,
                all_project_tasks: &self.all_tasks,
                config: &self.config,
            }
        }

        fn rules(&self) -> Vec<SelectionRule> {
            TaskSelectionPolicy::new()
                .evaluate(&self.ctx())
                .iter()
                .map(|v| v.rule)
                .collect()
        }
    }

    fn in_progress(id: &str, points: u32) -> Task {
        let mut task = Task::new(id);
        task.difficulty = Some(points);
        task.status = TaskStatus::InProgress;
        task
    }

    #[test]
    fn test_permitted() {
        let fx = Fixture::new();
        let policy = TaskSelectionPolicy::new();
        assert!(policy.evaluate(&fx.ctx()).is_empty());
        assert!(policy.can_select(&fx.ctx()));
        assert_eq!(policy.first_violation(&fx.ctx()), None);
        assert_eq!(policy.ensure_selectable(&fx.ctx()), Ok(()));
    }

    #[test]
    fn test_manager_restriction_and_toggle() {
        let mut fx = Fixture::new();
        fx.member.user_id = "u-manager".to_string();
        assert_eq!(fx.rules(), vec![SelectionRule::ManagerRestriction]);
        assert_eq!(
            TaskSelectionPolicy::new().ensure_selectable(&fx.ctx()),
            Err(SelectionError::ManagerCannotSelect)
        );

        fx.config.managers_cannot_select_tasks = false;
        assert!(fx.rules().is_empty());
    }

    #[test]
    fn test_wrong_status() {
        for status in [
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Done,
            TaskStatus::Cancelled,
        ] {
            let mut fx = Fixture::new();
            fx.task.status = status;
            let violations = TaskSelectionPolicy::new().evaluate(&fx.ctx());
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].kind, ViolationKind::WrongStatus { status });
            assert_eq!(violations[0].rule_id(), "BR-TASK-003");
        }
    }

    #[test]
    fn test_capability_mismatch_always_reported() {
        let mut fx = Fixture::new();
        fx.task.required_capability = Some("frontend".to_string());
        let violations = TaskSelectionPolicy::new().evaluate(&fx.ctx());
        assert_eq!(
            violations,
            vec![Violation {
                rule: SelectionRule::CapabilityMatch,
                kind: ViolationKind::CapabilityMismatch {
                    required: "frontend".to_string(),
                    actual: "backend".to_string(),
                },
            }]
        );

        // Whatever else is wrong, the mismatch is always among the violations
        let variations: [fn(&mut Fixture); 5] = [
            |fx| fx.member.user_id = "u-manager".to_string(),
            |fx| fx.task.difficulty = None,
            |fx| fx.task.status = TaskStatus::Blocked,
            |fx| fx.assigned.push(in_progress("busy", 20)),
            |fx| fx.config.allow_multitasking = true,
        ];
        for vary in variations {
            let mut fx = Fixture::new();
            fx.task.required_capability = Some("frontend".to_string());
            vary(&mut fx);
            let rules = fx.rules();
            assert_eq!(
                rules
                    .iter()
                    .filter(|r| **r == SelectionRule::CapabilityMatch)
                    .count(),
                1
            );
        }

        let mut fx = Fixture::new();
        fx.task.required_capability = Some("backend".to_string());
        assert!(fx.rules().is_empty());
    }

    #[test]
    fn test_missing_difficulty_always_reported() {
        let mut fx = Fixture::new();
        fx.task.difficulty = None;
        assert_eq!(fx.rules(), vec![SelectionRule::DifficultySet]);

        for status in TaskStatus::ALL {
            for assigned_points in [0, 5, 30] {
                let mut fx = Fixture::new();
                fx.task.difficulty = None;
                fx.task.status = status;
                fx.task.required_capability = Some("design".to_string());
                if assigned_points > 0 {
                    fx.assigned.push(in_progress("busy", assigned_points));
                }
                let rules = fx.rules();
                assert!(rules.contains(&SelectionRule::DifficultySet));
                assert!(!rules.contains(&SelectionRule::WorkloadCapacity));
            }
        }
    }

    #[test]
    fn test_unfinished_dependencies() {
        let mut fx = Fixture::new();
        let mut blocker = Task::new("t0");
        blocker.difficulty = Some(2);
        fx.all_tasks.push(blocker);
        fx.dependencies
            .push(DependencyEdge::new("t0", "t1").unwrap());

        let violations = TaskSelectionPolicy::new().evaluate(&fx.ctx());
        assert_eq!(
            violations[0].kind,
            ViolationKind::UnfinishedDependencies {
                blocking_task_ids: vec!["t0".to_string()]
            }
        );

        fx.config.enforce_dependency_blocking = false;
        assert!(fx.rules().is_empty());

        fx.config.enforce_dependency_blocking = true;
        fx.all_tasks[1].status = TaskStatus::Done;
        assert!(fx.rules().is_empty());
    }

    #[test]
    fn test_unknown_blocker_is_satisfied() {
        let mut fx = Fixture::new();
        fx.dependencies
            .push(DependencyEdge::new("ghost", "t1").unwrap());
        assert!(fx.rules().is_empty());
    }

    #[test]
    fn test_single_focus_and_multitasking_toggle() {
        let mut fx = Fixture::new();
        fx.assigned.push(in_progress("t9", 1));
        assert_eq!(fx.rules(), vec![SelectionRule::SingleFocus]);

        fx.config.allow_multitasking = true;
        assert!(fx.rules().is_empty());

        // Open assigned tasks do not count
        let mut fx = Fixture::new();
        let mut open = in_progress("t9", 1);
        open.status = TaskStatus::Open;
        fx.assigned.push(open);
        assert!(fx.rules().is_empty());
    }

    #[test]
    fn test_workload_exceeded_carries_ratio() {
        let mut fx = Fixture::new();
        fx.config.allow_multitasking = true;
        fx.task.difficulty = Some(5);
        fx.assigned.push(in_progress("a", 8));
        fx.assigned.push(in_progress("b", 5));
        // 13 + 5 = 18 -> 1.8 > 1.5
        let violations = TaskSelectionPolicy::new().evaluate(&fx.ctx());
        assert_eq!(violations.len(), 1);
        match &violations[0].kind {
            ViolationKind::WorkloadExceeded {
                current_ratio,
                projected_ratio,
                max_ratio,
            } => {
                assert!((current_ratio - 1.3).abs() < 1e-9);
                assert!((projected_ratio - 1.8).abs() < 1e-9);
                assert!((max_ratio - 1.5).abs() < 1e-9);
            }
            other => panic!("unexpected violation: {other:?}"),
        }
        assert!(violations[0].message().contains("1.30"));

        match TaskSelectionPolicy::new().ensure_selectable(&fx.ctx()) {
            Err(SelectionError::WorkloadExceeded { ratio }) => assert!((ratio - 1.3).abs() < 1e-9),
            other => panic!("unexpected result: {other:?}"),
        }

        // Exactly at the maximum is allowed: 13 + 2 = 15 -> 1.5
        fx.task.difficulty = Some(2);
        assert!(fx.rules().is_empty());
    }

    #[test]
    fn test_all_violations_in_rule_order() {
        let mut fx = Fixture::new();
        fx.member.user_id = "u-manager".to_string();
        fx.task.status = TaskStatus::Blocked;
        fx.task.required_capability = Some("qa".to_string());
        fx.all_tasks.push(Task::new("t0"));
        fx.dependencies
            .push(DependencyEdge::new("t0", "t1").unwrap());
        fx.assigned.push(in_progress("t5", 20));

        assert_eq!(
            fx.rules(),
            vec![
                SelectionRule::ManagerRestriction,
                SelectionRule::OpenStatus,
                SelectionRule::CapabilityMatch,
                SelectionRule::DependenciesDone,
                SelectionRule::SingleFocus,
                SelectionRule::WorkloadCapacity,
            ]
        );
        let first = TaskSelectionPolicy::new().first_violation(&fx.ctx()).unwrap();
        assert_eq!(first.rule, SelectionRule::ManagerRestriction);
    }

    #[test]
    fn test_custom_rule_subset() {
        let mut fx = Fixture::new();
        fx.task.difficulty = None;
        fx.task.status = TaskStatus::Done;
        let policy = TaskSelectionPolicy::with_rules([SelectionRule::OpenStatus]);
        let violations = policy.evaluate(&fx.ctx());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, SelectionRule::OpenStatus);

        assert_eq!(
            policy.ensure_selectable(&fx.ctx()),
            Err(SelectionError::TaskNotSelectable {
                task_id: "t1".to_string(),
                reason: "[BR-TASK-003] Task is in Done status, not Open.".to_string(),
            })
        );
    }

    #[test]
    fn test_rule_ids_are_distinct() {
        let ids: FxHashSet<&str> = SelectionRule::ALL.iter().map(|r| r.rule_id()).collect();
        assert_eq!(ids.len(), SelectionRule::ALL.len());
    }
}
