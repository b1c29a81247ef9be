#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
use crate::core::{Category, Task};
use rand::prelude::*;
use std::collections::BTreeMap;

/// Draws random task sets for benchmarks and tests.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TaskGenerator {
    tasks: usize,
    max_dependencies: usize,
}

impl TaskGenerator {
    pub const DURATIONS: std::ops::RangeInclusive<u64> = 1..=5;
    pub const PRIORITIES: std::ops::RangeInclusive<u32> = 1..=10;
    pub const RELEASES: std::ops::RangeInclusive<u64> = 0..=10;
    /// Demand is this factor times a whole number of capacity units.
    pub const DEMAND_FACTOR: f64 = 0.7;

    #[must_use]
    pub const fn new(tasks: usize, max_dependencies: usize) -> Self {
        Self {
            tasks,
            max_dependencies,
        }
    }

    /// Generates tasks `T0`, `T1`, ... using categories from `limits`.
    /// Dependencies only point at earlier tasks, so the result is acyclic.
    /// Returns no tasks when `limits` is empty.
    pub fn generate(&self, rng: &mut impl Rng, limits: &BTreeMap<Category, f64>) -> Vec<Task> {
        let categories: Vec<_> = limits.iter().map(|(&category, &capacity)| (category, capacity)).collect();
        if categories.is_empty() {
            return Vec::new();
        }

        let mut tasks = Vec::with_capacity(self.tasks);
        for i in 0..self.tasks {
            let Some(&(category, capacity)) = categories.choose(rng) else {
                unreachable!("Categories are never empty");
            };

            let duration = rng.gen_range(Self::DURATIONS);
            let priority = f64::from(rng.gen_range(Self::PRIORITIES));
            let units = capacity.floor() as u64;
            let demand = if units >= 1 {
                Self::DEMAND_FACTOR * rng.gen_range(1..=units) as f64
            } else {
                0.0
            };
            let earliest_start = rng.gen_range(Self::RELEASES);

            let count = rng.gen_range(0..=i.min(self.max_dependencies));
            let dependencies = rand::seq::index::sample(rng, i, count)
                .into_iter()
                .map(|j| format!("T{j}"));

            let task = Task::new(format!("T{i}"), category, earliest_start, duration, priority, demand)
                .with_dependencies(dependencies);
            tasks.push(task);
        }
        tasks
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::Instance;

    #[test]
    fn generated_tasks_form_a_valid_instance() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(3);
        let limits = BTreeMap::from([(Category::A, 5.0), (Category::C, 2.5)]);
        let tasks = TaskGenerator::new(50, 4).generate(&mut rng, &limits);

        assert_eq!(tasks.len(), 50);
        for task in &tasks {
            assert!(limits.contains_key(&task.category));
            assert!(TaskGenerator::DURATIONS.contains(&task.duration));
            assert!(TaskGenerator::RELEASES.contains(&task.earliest_start));
            assert!((1.0..=10.0).contains(&task.priority));
            assert!(task.demand > 0.0 && task.demand <= limits[&task.category]);
            assert!(task.dependencies.len() <= 4);
        }

        let instance = Instance::new(tasks, limits)?;
        assert!(instance.oversized().is_empty());
        Ok(())
    }

    #[test]
    fn first_task_has_no_dependencies() {
        let mut rng = StdRng::seed_from_u64(0);
        let limits = BTreeMap::from([(Category::B, 1.0)]);
        let tasks = TaskGenerator::new(1, 3).generate(&mut rng, &limits);

        assert_eq!(tasks[0].id.as_str(), "T0");
        assert!(tasks[0].dependencies.is_empty());
        assert!((tasks[0].demand - 0.7).abs() < 1e-9);
    }

    #[test]
    fn small_capacity_gives_zero_demand() {
        let mut rng = StdRng::seed_from_u64(0);
        let limits = BTreeMap::from([(Category::D, 0.5)]);
        let tasks = TaskGenerator::new(5, 0).generate(&mut rng, &limits);
        assert!(tasks.iter().all(|task| task.demand.abs() < 1e-9 && task.dependencies.is_empty()));
    }

    #[test]
    fn no_limits_no_tasks() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(TaskGenerator::new(5, 1).generate(&mut rng, &BTreeMap::new()).is_empty());
    }
}
