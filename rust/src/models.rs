//! Core data types for the planning engine: tasks, their lifecycle, and project membership.

use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Errors raised by task lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("Task {0} has no difficulty points set")]
    MissingDifficulty(String),
    #[error("Difficulty points cannot be negative (got {0})")]
    NegativeDifficulty(i64),
    #[error("Difficulty points out of range (got {0})")]
    DifficultyOutOfRange(i64),
    #[error("Task {0}: cannot change start date of an in-progress task")]
    StartDateLocked(String),
    #[error("Task {0} is not in progress")]
    NotInProgress(String),
}

/// Task status.
///
/// Allowed transitions:
/// - Open -> InProgress, Blocked, Cancelled
/// - InProgress -> Done, Blocked, Open (abandonment)
/// - Blocked -> Open
/// - Done, Cancelled are terminal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Open,
    InProgress,
    Blocked,
    Done,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Open,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Done,
        TaskStatus::Cancelled,
    ];

    /// Statuses reachable from this one in a single step.
    pub fn allowed_transitions(self) -> &'static [TaskStatus] {
        match self {
            TaskStatus::Open => &[
                TaskStatus::InProgress,
                TaskStatus::Blocked,
                TaskStatus::Cancelled,
            ],
            TaskStatus::InProgress => &[TaskStatus::Done, TaskStatus::Blocked, TaskStatus::Open],
            TaskStatus::Blocked => &[TaskStatus::Open],
            TaskStatus::Done | TaskStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Done and Cancelled tasks take no further part in scheduling.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Open => "Open",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::Blocked => "Blocked",
            TaskStatus::Done => "Done",
            TaskStatus::Cancelled => "Cancelled",
        }
    }

    /// Parse a status name. Accepts the legacy "Todo"/"Doing" spellings too.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Open" | "Todo" => Some(TaskStatus::Open),
            "InProgress" | "Doing" => Some(TaskStatus::InProgress),
            "Blocked" => Some(TaskStatus::Blocked),
            "Done" => Some(TaskStatus::Done),
            "Cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seniority tier of a project member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SeniorityLevel {
    Junior,
    #[default]
    Mid,
    Senior,
    Specialist,
    Lead,
}

impl SeniorityLevel {
    pub const ALL: [SeniorityLevel; 5] = [
        SeniorityLevel::Junior,
        SeniorityLevel::Mid,
        SeniorityLevel::Senior,
        SeniorityLevel::Specialist,
        SeniorityLevel::Lead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SeniorityLevel::Junior => "Junior",
            SeniorityLevel::Mid => "Mid",
            SeniorityLevel::Senior => "Senior",
            SeniorityLevel::Specialist => "Specialist",
            SeniorityLevel::Lead => "Lead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_str() == s)
    }
}

impl fmt::Display for SeniorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work with a difficulty score and a status.
#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    /// Story points. Must be set before the task can go in progress.
    pub difficulty: Option<u32>,
    /// Member id of the assignee.
    pub assignee_id: Option<String>,
    /// Capability (role) id a worker must hold to take this task.
    pub required_capability: Option<String>,
    pub expected_start: Option<DateTime<Utc>>,
    pub expected_end: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
}

impl Task {
    /// A new Open task with no difficulty, assignee or dates.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Open,
            difficulty: None,
            assignee_id: None,
            required_capability: None,
            expected_start: None,
            expected_end: None,
            actual_end: None,
        }
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        self.status.can_transition_to(next)
    }

    /// Move to `next` if the transition table allows it.
    ///
    /// Entering InProgress requires a difficulty.
    pub fn transition_to(&mut self, next: TaskStatus) -> Result<(), TaskError> {
        if !self.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        if next == TaskStatus::InProgress && self.difficulty.is_none() {
            return Err(TaskError::MissingDifficulty(self.id.clone()));
        }
        self.status = next;
        Ok(())
    }

    pub fn set_difficulty(&mut self, points: i64) -> Result<(), TaskError> {
        if points < 0 {
            return Err(TaskError::NegativeDifficulty(points));
        }
        let points = u32::try_from(points).map_err(|_| TaskError::DifficultyOutOfRange(points))?;
        self.difficulty = Some(points);
        Ok(())
    }

    /// Open with a difficulty set.
    pub fn can_be_selected(&self) -> bool {
        self.status == TaskStatus::Open && self.difficulty.is_some()
    }

    /// Take the task: Open -> InProgress and record the assignee.
    pub fn select(&mut self, assignee_id: impl Into<String>) -> Result<(), TaskError> {
        self.transition_to(TaskStatus::InProgress)?;
        self.assignee_id = Some(assignee_id.into());
        Ok(())
    }

    /// Give the task back: InProgress -> Open and clear the assignee.
    pub fn abandon(&mut self) -> Result<(), TaskError> {
        if self.status != TaskStatus::InProgress {
            return Err(TaskError::NotInProgress(self.id.clone()));
        }
        self.transition_to(TaskStatus::Open)?;
        self.assignee_id = None;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), TaskError> {
        if self.status != TaskStatus::InProgress {
            return Err(TaskError::NotInProgress(self.id.clone()));
        }
        self.transition_to(TaskStatus::Done)?;
        self.actual_end = Some(now);
        Ok(())
    }

    pub fn block(&mut self) -> Result<(), TaskError> {
        self.transition_to(TaskStatus::Blocked)
    }

    pub fn unblock(&mut self) -> Result<(), TaskError> {
        if self.status != TaskStatus::Blocked {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to: TaskStatus::Open,
            });
        }
        self.transition_to(TaskStatus::Open)
    }

    pub fn cancel(&mut self) -> Result<(), TaskError> {
        if self.status != TaskStatus::Open {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to: TaskStatus::Cancelled,
            });
        }
        self.transition_to(TaskStatus::Cancelled)
    }

    /// Store computed dates. The start of an in-progress task is locked; only its end may move.
    pub fn update_schedule(
        &mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<(), TaskError> {
        if self.status == TaskStatus::InProgress && start.is_some() {
            return Err(TaskError::StartDateLocked(self.id.clone()));
        }
        if let Some(start) = start {
            self.expected_start = Some(start);
        }
        if let Some(end) = end {
            self.expected_end = Some(end);
        }
        Ok(())
    }

    /// Past its expected end and not finished.
    pub fn is_delayed(&self, now: DateTime<Utc>) -> bool {
        match self.expected_end {
            Some(end) if self.status != TaskStatus::Done => now > end,
            _ => false,
        }
    }
}

/// A project as seen by the engine: identity and its manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    /// User id of the manager.
    pub manager_id: String,
}

impl Project {
    pub fn new(id: impl Into<String>, manager_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            manager_id: manager_id.into(),
        }
    }

    pub fn is_manager(&self, user_id: &str) -> bool {
        self.manager_id == user_id
    }
}

/// A user's membership in a project: the worker tasks are assigned to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectMember {
    /// Member id (what `Task::assignee_id` refers to).
    pub id: String,
    pub user_id: String,
    /// Capability (role) id held in this project.
    pub capability: String,
    pub seniority: SeniorityLevel,
}

impl ProjectMember {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        capability: impl Into<String>,
        seniority: SeniorityLevel,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            capability: capability.into(),
            seniority,
        }
    }
}
