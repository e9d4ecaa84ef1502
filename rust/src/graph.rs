//! Finish-to-start dependency edges and cycle detection.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::log_summary;
use crate::models::{Task, TaskStatus};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("A task cannot depend on itself: {0}")]
    SelfDependency(String),
    #[error("Dependency {blocking} -> {blocked} would create a circular dependency")]
    CircularDependency { blocking: String, blocked: String },
    #[error("Dependency {blocking} -> {blocked} already exists")]
    DuplicateDependency { blocking: String, blocked: String },
}

/// `blocking` must finish before `blocked` can start. Never a self-loop.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    blocking: String,
    blocked: String,
}

impl DependencyEdge {
    pub fn new(blocking: impl Into<String>, blocked: impl Into<String>) -> Result<Self, GraphError> {
        let blocking = blocking.into();
        let blocked = blocked.into();
        if blocking == blocked {
            return Err(GraphError::SelfDependency(blocking));
        }
        Ok(Self { blocking, blocked })
    }

    pub fn blocking(&self) -> &str {
        &self.blocking
    }

    pub fn blocked(&self) -> &str {
        &self.blocked
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// DFS over every node of the edge set. Iterative so deep chains cannot overflow the stack.
fn contains_cycle<'a>(edges: impl IntoIterator<Item = &'a DependencyEdge>) -> bool {
    let mut index: FxHashMap<&str, usize> = FxHashMap::default();
    let mut adjacency: Vec<Vec<usize>> = Vec::new();

    let mut intern = |id: &'a str, adjacency: &mut Vec<Vec<usize>>| -> usize {
        *index.entry(id).or_insert_with(|| {
            adjacency.push(Vec::new());
            adjacency.len() - 1
        })
    };

    for edge in edges {
        let from = intern(edge.blocking(), &mut adjacency);
        let to = intern(edge.blocked(), &mut adjacency);
        adjacency[from].push(to);
    }

    let mut marks = vec![Mark::Unvisited; adjacency.len()];
    // (node, next neighbor position)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..adjacency.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::OnStack;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let (node, pos) = *frame;
            if pos < adjacency[node].len() {
                frame.1 += 1;
                let next = adjacency[node][pos];
                match marks[next] {
                    Mark::OnStack => return true,
                    Mark::Unvisited => {
                        marks[next] = Mark::OnStack;
                        stack.push((next, 0));
                    }
                    Mark::Done => {}
                }
            } else {
                marks[node] = Mark::Done;
                stack.pop();
            }
        }
    }
    false
}

/// Whether accepting `new_edge` on top of `existing` would close a cycle.
///
/// Checks the whole merged graph, so an already-cyclic `existing` also yields true.
pub fn would_create_cycle(new_edge: &DependencyEdge, existing: &[DependencyEdge]) -> bool {
    contains_cycle(existing.iter().chain(std::iter::once(new_edge)))
}

pub fn has_cycle(edges: &[DependencyEdge]) -> bool {
    contains_cycle(edges)
}

/// Whether inserting `blocking -> blocked` must move `blocked` into Blocked.
pub fn should_block_on_insert(blocking: &Task, blocked: &Task) -> bool {
    blocking.status != TaskStatus::Done
        && matches!(blocked.status, TaskStatus::Open | TaskStatus::InProgress)
}

/// Whether removing an edge into `blocked` lets it leave Blocked.
///
/// True when `blocked` is Blocked and none of `remaining_blockers` names a task
/// in `tasks` that is not Done. Ids missing from `tasks` count as satisfied.
pub fn should_unblock_after_remove<'a>(
    blocked: &Task,
    remaining_blockers: impl IntoIterator<Item = &'a str>,
    tasks: &[Task],
) -> bool {
    if blocked.status != TaskStatus::Blocked {
        return false;
    }
    !remaining_blockers.into_iter().any(|id| {
        tasks
            .iter()
            .any(|t| t.id == id && t.status != TaskStatus::Done)
    })
}

/// The accepted edge set of one project. Every insertion goes through the cycle check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: Vec<DependencyEdge>,
    verbosity: u8,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log rejected edges at `verbosity` >= 1.
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Build from edges, accepting them one at a time.
    pub fn from_edges(edges: impl IntoIterator<Item = DependencyEdge>) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for edge in edges {
            graph.add(edge)?;
        }
        Ok(graph)
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn contains(&self, edge: &DependencyEdge) -> bool {
        self.edges.contains(edge)
    }

    pub fn add(&mut self, edge: DependencyEdge) -> Result<(), GraphError> {
        if self.contains(&edge) {
            log_summary!(
                self.verbosity,
                "Dependency: rejected duplicate edge {} -> {}",
                edge.blocking,
                edge.blocked
            );
            return Err(GraphError::DuplicateDependency {
                blocking: edge.blocking,
                blocked: edge.blocked,
            });
        }
        if would_create_cycle(&edge, &self.edges) {
            log_summary!(
                self.verbosity,
                "Dependency: rejected edge {} -> {} (would create a cycle)",
                edge.blocking,
                edge.blocked
            );
            return Err(GraphError::CircularDependency {
                blocking: edge.blocking,
                blocked: edge.blocked,
            });
        }
        self.edges.push(edge);
        Ok(())
    }

    pub fn remove(&mut self, blocking: &str, blocked: &str) -> bool {
        let before = self.edges.len();
        self.edges
            .retain(|e| !(e.blocking() == blocking && e.blocked() == blocked));
        self.edges.len() != before
    }

    /// Tasks that must finish before `task_id`.
    pub fn blockers_of<'a>(&'a self, task_id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.blocked() == task_id)
            .map(|e| e.blocking())
    }

    /// Tasks waiting on `task_id`.
    pub fn dependents_of<'a>(&'a self, task_id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.blocking() == task_id)
            .map(|e| e.blocked())
    }
}
