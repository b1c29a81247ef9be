//! Quality metrics of a finished schedule. Every metric has a defined neutral
//! value for empty schedules and empty task sets.
#![allow(clippy::cast_precision_loss)]

use crate::core::{usage_at, Category, Schedule};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/// Tasks with at least this priority count as high-priority.
pub const HIGH_PRIORITY: f64 = 3.0;

#[non_exhaustive]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Metrics {
    /// Placed tasks per time unit between the first start and the last end.
    pub throughput: f64,
    pub makespan: u64,
    /// Busy task time over `task count * makespan`.
    pub task_utilization: f64,
    /// Share of high-priority tasks that were placed.
    pub priority_satisfaction: f64,
    /// Percentage of capacity in use at every start and end time point.
    pub resource_utilization: BTreeMap<Category, Vec<f64>>,
    /// Mean delay past the earliest start, averaged over all tasks.
    pub average_wait: f64,
}

impl Metrics {
    /// Measures a schedule with the given high-priority threshold.
    #[must_use]
    pub fn measure(schedule: &Schedule, threshold: f64) -> Self {
        let tasks = schedule.instance().tasks();
        let placed: Vec<_> = schedule.placed().collect();

        let makespan = schedule.makespan();
        let first = placed.iter().map(|(_, slot)| slot.start).min().unwrap_or_default();
        let span = makespan.saturating_sub(first);
        let throughput = ratio(placed.len() as f64, span as f64);

        let busy: u64 = placed.iter().map(|(_, slot)| slot.end - slot.start).sum();
        let task_utilization = ratio(busy as f64, tasks.len() as f64 * makespan as f64);

        let high = tasks.iter().filter(|task| task.priority >= threshold).count();
        let satisfied = placed.iter().filter(|&&(task, _)| tasks[task].priority >= threshold);
        let priority_satisfaction = ratio(satisfied.count() as f64, high as f64);

        let wait: u64 = placed.iter().map(|&(task, slot)| slot.start - tasks[task].earliest_start).sum();
        let average_wait = ratio(wait as f64, tasks.len() as f64);

        Self {
            throughput,
            makespan,
            task_utilization,
            priority_satisfaction,
            resource_utilization: resource_utilization(schedule),
            average_wait,
        }
    }
}

impl Display for Metrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "throughput: {:.3}", self.throughput)?;
        writeln!(f, "makespan: {}", self.makespan)?;
        writeln!(f, "task utilization: {:.3}", self.task_utilization)?;
        writeln!(f, "priority satisfaction: {:.3}", self.priority_satisfaction)?;
        for (category, usage) in &self.resource_utilization {
            let peak = usage.iter().copied().fold(0.0, f64::max);
            writeln!(f, "resource {category} peak: {peak:.1}%")?;
        }
        write!(f, "average wait: {:.3}", self.average_wait)
    }
}

/// Percentage of each category's capacity used at every distinct start and
/// end time of the schedule, in time order.
#[must_use]
pub fn resource_utilization(schedule: &Schedule) -> BTreeMap<Category, Vec<f64>> {
    let points: BTreeSet<u64> = schedule
        .placed()
        .flat_map(|(_, slot)| [slot.start, slot.end])
        .collect();

    let limits = schedule.instance().limits();
    limits
        .iter()
        .map(|(&category, &capacity)| {
            let usage = points.iter().map(|&instant| {
                ratio(usage_at(schedule, category, instant, None), capacity) * 100.0
            });
            (category, usage.collect())
        })
        .collect()
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::{Instance, Task};

    fn instance() -> anyhow::Result<Instance> {
        let tasks = vec![
            Task::new("a", Category::A, 0, 2, 5.0, 2.0),
            Task::new("b", Category::A, 1, 2, 2.0, 2.0),
            Task::new("c", Category::B, 0, 4, 4.0, 1.0),
            Task::new("d", Category::B, 0, 1, 1.0, 1.0),
        ];
        let limits = BTreeMap::from([(Category::A, 4.0), (Category::B, 2.0)]);
        Ok(Instance::new(tasks, limits)?)
    }

    #[test]
    fn measures_a_partial_schedule() -> anyhow::Result<()> {
        let instance = instance()?;
        let mut schedule = Schedule::new(&instance);
        schedule.schedule(0, 0);
        schedule.schedule(1, 2);
        schedule.schedule(2, 0);

        let metrics = Metrics::measure(&schedule, HIGH_PRIORITY);
        assert_eq!(metrics.makespan, 4);
        assert!((metrics.throughput - 0.75).abs() < 1e-9);
        assert!((metrics.task_utilization - 0.5).abs() < 1e-9);
        assert!((metrics.priority_satisfaction - 1.0).abs() < 1e-9);
        assert!((metrics.average_wait - 0.25).abs() < 1e-9);

        let usage = &metrics.resource_utilization;
        assert_eq!(usage[&Category::A], vec![50.0, 50.0, 0.0]);
        assert_eq!(usage[&Category::B], vec![50.0, 50.0, 0.0]);
        Ok(())
    }

    #[test]
    fn threshold_selects_high_priority_tasks() -> anyhow::Result<()> {
        let instance = instance()?;
        let mut schedule = Schedule::new(&instance);
        schedule.schedule(3, 0);

        let metrics = Metrics::measure(&schedule, HIGH_PRIORITY);
        assert!(metrics.priority_satisfaction.abs() < 1e-9);

        let metrics = Metrics::measure(&schedule, 0.5);
        assert!((metrics.priority_satisfaction - 0.25).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn empty_schedule_is_neutral() -> anyhow::Result<()> {
        let instance = instance()?;
        let metrics = Metrics::measure(&Schedule::new(&instance), HIGH_PRIORITY);

        assert_eq!(metrics.makespan, 0);
        assert!(metrics.throughput.abs() < 1e-9);
        assert!(metrics.task_utilization.abs() < 1e-9);
        assert!(metrics.priority_satisfaction.abs() < 1e-9);
        assert!(metrics.average_wait.abs() < 1e-9);
        assert!(metrics.resource_utilization.values().all(Vec::is_empty));

        let empty = Instance::empty(BTreeMap::from([(Category::A, 0.0)]));
        let metrics = Metrics::measure(&Schedule::new(&empty), HIGH_PRIORITY);
        assert_eq!(metrics, Metrics {
            resource_utilization: BTreeMap::from([(Category::A, Vec::new())]),
            ..Metrics::default()
        });
        Ok(())
    }
}
