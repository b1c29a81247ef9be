//! Placement predicates shared by every strategy.
//!
//! A schedule is feasible iff every placed task passes both predicates against
//! the other placed tasks. The greedy lanes, the integer program rows and the
//! genetic fitness are all checked against these two functions.

use super::{Category, Schedule};

/// Tolerance for comparing summed resource demands against a capacity.
pub const EPSILON: f64 = 1e-9;

/// Returns the total demand of tasks of `category` running at `instant`,
/// ignoring the task `skip` if it is placed.
#[must_use]
pub fn usage_at(schedule: &Schedule, category: Category, instant: u64, skip: Option<usize>) -> f64 {
    let tasks = schedule.instance().tasks();
    schedule
        .placed()
        .filter(|&(task, _)| Some(task) != skip && tasks[task].category == category)
        .filter(|(_, slot)| slot.covers(instant))
        .map(|(task, _)| tasks[task].demand)
        .sum()
}

/// Returns whether placing `task` at `start` keeps its category within capacity
/// at every instant of the task's interval.
///
/// Usage is piecewise constant and only rises where some task starts, so it is
/// enough to check `start` and every other start inside the interval.
#[must_use]
pub fn resource_feasible(schedule: &Schedule, task: usize, start: u64) -> bool {
    let instance = schedule.instance();
    let info = &instance.tasks()[task];
    let end = start + info.duration;
    let capacity = instance.capacity(info.category);

    if info.demand > capacity + EPSILON {
        return false;
    }

    let tasks = instance.tasks();
    let instants = std::iter::once(start).chain(
        schedule
            .placed()
            .filter(|&(other, _)| other != task && tasks[other].category == info.category)
            .map(|(_, slot)| slot.start)
            .filter(|&other| start < other && other < end),
    );

    for instant in instants {
        let usage = usage_at(schedule, info.category, instant, Some(task));
        if usage + info.demand > capacity + EPSILON {
            return false;
        }
    }

    true
}

/// Returns whether every dependency of `task` is placed and ends by `start`.
#[must_use]
pub fn dependency_feasible(schedule: &Schedule, task: usize, start: u64) -> bool {
    schedule
        .instance()
        .dependencies(task)
        .iter()
        .all(|&dependency| schedule.get_schedule(dependency).is_some_and(|slot| slot.end <= start))
}
