use super::{Category, TaskId};
use thiserror::Error;

/// Reasons an instance is rejected before any strategy runs.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum InstanceError {
    #[error("task `{0}` is declared more than once")]
    DuplicateTask(TaskId),
    #[error("task `{0}` must have a positive duration")]
    InvalidDuration(TaskId),
    #[error("task `{0}` must have a positive finite priority, got {1}")]
    InvalidPriority(TaskId, f64),
    #[error("task `{0}` must have a non-negative finite resource demand, got {1}")]
    InvalidDemand(TaskId, f64),
    #[error("category {0} must have a non-negative finite capacity, got {1}")]
    InvalidCapacity(Category, f64),
    #[error("task `{task}` uses category {category} which has no resource limit")]
    MissingCategory { task: TaskId, category: Category },
    #[error("task `{task}` depends on unknown task `{dependency}`")]
    UnknownDependency { task: TaskId, dependency: TaskId },
    #[error("task `{0}` depends on itself")]
    SelfDependency(TaskId),
    #[error("dependency cycle through tasks {0:?}")]
    DependencyCycle(Vec<TaskId>),
    #[error("latest release time plus total duration exceeds {}", super::MAX_TIME)]
    HorizonOverflow,
}

/// Failures of a strategy itself, as opposed to an instance having no schedule.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("solver failed: {0}")]
    Solver(String),
    #[cfg(feature = "gurobi")]
    #[error("gurobi failed: {0}")]
    Gurobi(#[from] grb::Error),
    #[error("scheduling worker panicked")]
    WorkerPanicked,
}
