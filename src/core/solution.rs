use super::{dependency_feasible, usage_at, Instance, TaskId, EPSILON};
use std::fmt::{Display, Formatter};

/// Half-open interval `[start, end)` occupied by a placed task.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Slot {
    pub start: u64,
    pub end: u64,
}

impl Slot {
    /// Returns whether the slot covers the given instant.
    #[must_use]
    pub const fn covers(&self, instant: u64) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// One `(task_id, start_time, end_time)` triple of a schedule.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Entry<'a> {
    pub task: &'a TaskId,
    pub start: u64,
    pub end: u64,
}

/// Start times assigned to the tasks of an instance.
/// Each task holds at most one start time, so a task can never be placed twice.
#[derive(Clone, Debug, PartialEq)]
pub struct Schedule<'a> {
    instance: &'a Instance,
    starts: Vec<Option<u64>>,
}

impl<'a> Schedule<'a> {
    /// Creates a schedule with no task placed.
    #[must_use]
    pub fn new(instance: &'a Instance) -> Self {
        Self {
            instance,
            starts: vec![None; instance.tasks().len()],
        }
    }

    /// Returns the instance the schedule belongs to.
    #[must_use]
    pub const fn instance(&self) -> &'a Instance {
        self.instance
    }

    /// Places a task at the given start, replacing any previous placement.
    pub fn schedule(&mut self, task: usize, start: u64) {
        self.starts[task] = Some(start);
    }

    /// Removes the placement of a task.
    pub fn remove_schedule(&mut self, task: usize) {
        self.starts[task] = None;
    }

    /// Returns the slot of a task if it is placed.
    #[must_use]
    pub fn get_schedule(&self, task: usize) -> Option<Slot> {
        let duration = self.instance.tasks()[task].duration;
        self.starts[task].map(|start| Slot {
            start,
            end: start.saturating_add(duration),
        })
    }

    /// Iterates over placed tasks and their slots in canonical task order.
    pub fn placed(&self) -> impl Iterator<Item = (usize, Slot)> + '_ {
        (0..self.starts.len()).filter_map(|task| self.get_schedule(task).map(|slot| (task, slot)))
    }

    /// Returns the number of placed tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.starts.iter().flatten().count()
    }

    /// Returns whether no task is placed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.starts.iter().all(Option::is_none)
    }

    /// Returns the tasks that are not placed.
    #[must_use]
    pub fn unscheduled(&self) -> Vec<usize> {
        (0..self.starts.len()).filter(|&task| self.starts[task].is_none()).collect()
    }

    /// Returns the schedule entries ordered by start time, then by task id.
    #[must_use]
    pub fn entries(&self) -> Vec<Entry<'a>> {
        let tasks = self.instance.tasks();
        let mut entries: Vec<_> = self
            .placed()
            .map(|(task, slot)| Entry {
                task: &tasks[task].id,
                start: slot.start,
                end: slot.end,
            })
            .collect();
        entries.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.task.cmp(b.task)));
        entries
    }

    /// Returns the schedule as owned `(task_id, start_time, end_time)` triples.
    #[must_use]
    pub fn triples(&self) -> Vec<(TaskId, u64, u64)> {
        let entries = self.entries().into_iter();
        entries.map(|entry| (entry.task.clone(), entry.start, entry.end)).collect()
    }

    /// Returns the latest end time, zero for an empty schedule.
    #[must_use]
    pub fn makespan(&self) -> u64 {
        self.placed().map(|(_, slot)| slot.end).max().unwrap_or_default()
    }

    /// Calculates the total priority of the placed tasks.
    #[must_use]
    pub fn calculate_score(&self) -> f64 {
        let tasks = self.instance.tasks();
        self.placed().map(|(task, _)| tasks[task].priority).sum()
    }

    /// Verifies the schedule. Every placed task must start no earlier than its
    /// release time, every dependency must end before its dependent starts, and
    /// no category may exceed its capacity at any instant.
    #[must_use]
    pub fn verify(&self) -> bool {
        let tasks = self.instance.tasks();
        self.placed().all(|(task, slot)| {
            let info = &tasks[task];
            let capacity = self.instance.capacity(info.category);
            slot.start >= info.earliest_start
                && dependency_feasible(self, task, slot.start)
                && usage_at(self, info.category, slot.start, None) <= capacity + EPSILON
        })
    }
}

/// How good a returned schedule is known to be.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Optimality {
    /// Produced by a heuristic, no optimality claim.
    Heuristic,
    /// Proven optimal by the solver.
    Optimal,
    /// Best incumbent when the solver's time limit expired.
    TimeLimited,
}

/// A schedule together with what is known about its quality.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub struct Solution<'a> {
    pub schedule: Schedule<'a>,
    pub optimality: Optimality,
}

impl<'a> Solution<'a> {
    /// Creates a new solution.
    #[must_use]
    pub const fn new(schedule: Schedule<'a>, optimality: Optimality) -> Self {
        Self {
            schedule,
            optimality,
        }
    }

    /// Returns the ids of tasks the strategy could not place.
    #[must_use]
    pub fn unscheduled(&self) -> Vec<&'a TaskId> {
        let tasks = self.schedule.instance().tasks();
        let unscheduled = self.schedule.unscheduled().into_iter();
        unscheduled.map(|task| &tasks[task].id).collect()
    }
}

/// Why a strategy produced no schedule at all.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NoSchedule {
    /// The solver proved that no schedule exists.
    Infeasible,
    /// These tasks cannot be placed even in isolation.
    UnplaceableTasks(Vec<TaskId>),
    /// The search never produced a feasible individual.
    NoFeasibleIndividual,
}

impl Display for NoSchedule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Infeasible => write!(f, "proven infeasible"),
            Self::UnplaceableTasks(tasks) => write!(f, "tasks can never be placed: {tasks:?}"),
            Self::NoFeasibleIndividual => write!(f, "no feasible individual found"),
        }
    }
}

/// Result of one scheduling run.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<'a> {
    Scheduled(Solution<'a>),
    NoSchedule(NoSchedule),
}

impl<'a> Outcome<'a> {
    /// Returns the schedule if one was produced.
    #[must_use]
    pub const fn schedule(&self) -> Option<&Schedule<'a>> {
        match self {
            Self::Scheduled(solution) => Some(&solution.schedule),
            Self::NoSchedule(_) => None,
        }
    }

    /// Returns the solution if one was produced.
    #[must_use]
    pub fn into_solution(self) -> Option<Solution<'a>> {
        match self {
            Self::Scheduled(solution) => Some(solution),
            Self::NoSchedule(_) => None,
        }
    }
}
