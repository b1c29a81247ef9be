//! Time-indexed binary formulation shared by the exact solver backends.
//!
//! Column `x[j, t]` is 1 iff task `j` starts at `t`. Every row reads
//! `sum(coefficient * column) <= bound`. The first solve maximizes total
//! priority; an optional second solve keeps that total with
//! [`Formulation::priority_floor`] and minimizes the priority-weighted starts.

use crate::config::ExactConfig;
use crate::core::{Instance, Schedule};

/// Slack allowed below the optimal total priority in the early-start solve.
pub const PRIORITY_TOLERANCE: f64 = 1e-6;

/// One binary variable: task `task` starts at `start`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Column {
    pub task: usize,
    pub start: u64,
    pub weight: f64,
}

/// A `<=` constraint over columns.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub name: String,
    pub terms: Vec<(usize, f64)>,
    pub bound: f64,
}

/// The whole model: maximize the sum of column weights (task priorities)
/// subject to the rows.
#[derive(Clone, Debug, PartialEq)]
pub struct Formulation {
    pub horizon: u64,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    /// Column indices of every task, ordered by start time.
    by_task: Vec<Vec<usize>>,
}

impl Formulation {
    /// Builds the model for the given instance.
    #[must_use]
    pub fn new(instance: &Instance, config: &ExactConfig) -> Self {
        let horizon = instance.horizon(config.horizon);
        let tasks = instance.tasks();

        let mut columns = Vec::new();
        let mut by_task = vec![Vec::new(); tasks.len()];

        for (j, task) in tasks.iter().enumerate() {
            let Some(last) = horizon.checked_sub(task.duration) else {
                continue;
            };
            for start in task.earliest_start..=last {
                by_task[j].push(columns.len());
                columns.push(Column {
                    task: j,
                    start,
                    weight: task.priority,
                });
            }
        }

        let mut formulation = Self {
            horizon,
            columns,
            rows: Vec::new(),
            by_task,
        };
        formulation.add_single_placement_rows();
        formulation.add_capacity_rows(instance);
        formulation.add_precedence_rows(instance);
        formulation
    }

    /// Returns the column indices of a task.
    #[must_use]
    pub fn task_columns(&self, task: usize) -> &[usize] {
        &self.by_task[task]
    }

    /// Returns the total weight of the columns set in `values`.
    #[must_use]
    pub fn score(&self, values: &[f64]) -> f64 {
        let chosen = self.columns.iter().zip(values).filter(|&(_, &value)| value > 0.5);
        chosen.map(|(column, _)| column.weight).sum()
    }

    /// Cost of a column in the early-start solve.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn delay(&self, column: usize) -> f64 {
        let column = &self.columns[column];
        column.weight * column.start as f64
    }

    /// Row keeping the total priority at least `score` minus [`PRIORITY_TOLERANCE`].
    #[must_use]
    pub fn priority_floor(&self, score: f64) -> Row {
        Row {
            name: "priority_floor".into(),
            terms: (0..self.columns.len()).map(|column| (column, -self.columns[column].weight)).collect(),
            bound: PRIORITY_TOLERANCE - score,
        }
    }

    /// Reads a schedule out of column values. Columns above one half count as chosen.
    #[must_use]
    pub fn extract<'a>(&self, instance: &'a Instance, values: &[f64]) -> Schedule<'a> {
        let mut schedule = Schedule::new(instance);
        for (column, &value) in self.columns.iter().zip(values) {
            if value > 0.5 {
                schedule.schedule(column.task, column.start);
            }
        }
        schedule
    }

    fn add_single_placement_rows(&mut self) {
        for (j, columns) in self.by_task.iter().enumerate() {
            if columns.len() > 1 {
                self.rows.push(Row {
                    name: format!("place_{j}"),
                    terms: columns.iter().map(|&column| (column, 1.0)).collect(),
                    bound: 1.0,
                });
            }
        }
    }

    fn add_capacity_rows(&mut self, instance: &Instance) {
        let tasks = instance.tasks();

        for (&category, lane) in instance.lanes() {
            let capacity = instance.capacity(category);

            for t in 0..self.horizon {
                let terms: Vec<_> = lane
                    .iter()
                    .flat_map(|&j| self.by_task[j].iter().map(move |&column| (j, column)))
                    .filter(|&(j, column)| {
                        let start = self.columns[column].start;
                        start <= t && t < start + tasks[j].duration
                    })
                    .filter(|&(j, _)| tasks[j].demand > 0.0)
                    .map(|(j, column)| (column, tasks[j].demand))
                    .collect();

                let total: f64 = terms.iter().map(|(_, demand)| demand).sum();
                if total > capacity {
                    self.rows.push(Row {
                        name: format!("capacity_{category}_{t}"),
                        terms,
                        bound: capacity,
                    });
                }
            }
        }
    }

    /// `x[j, t] <= sum over dependency starts s with s + duration <= t of x[dep, s]`.
    /// Forces the dependency to be placed and finished before `j` starts.
    fn add_precedence_rows(&mut self, instance: &Instance) {
        let tasks = instance.tasks();

        for j in 0..tasks.len() {
            for &dependency in instance.dependencies(j) {
                let duration = tasks[dependency].duration;

                for &column in &self.by_task[j] {
                    let start = self.columns[column].start;
                    let mut terms = vec![(column, 1.0)];
                    terms.extend(
                        self.by_task[dependency]
                            .iter()
                            .filter(|&&other| self.columns[other].start + duration <= start)
                            .map(|&other| (other, -1.0)),
                    );
                    self.rows.push(Row {
                        name: format!("precedence_{j}_{dependency}_{start}"),
                        terms,
                        bound: 0.0,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::{Category, Horizon, Task};
    use std::collections::BTreeMap;

    fn config(horizon: Horizon) -> ExactConfig {
        ExactConfig {
            horizon,
            ..ExactConfig::default()
        }
    }

    fn holds(row: &Row, values: &[f64]) -> bool {
        let lhs: f64 = row.terms.iter().map(|&(column, coef)| coef * values[column]).sum();
        lhs <= row.bound + 1e-9
    }

    fn satisfied(formulation: &Formulation, values: &[f64]) -> bool {
        formulation.rows.iter().all(|row| holds(row, values))
    }

    fn assignment(formulation: &Formulation, starts: &[(usize, u64)]) -> Vec<f64> {
        let mut values = vec![0.0; formulation.columns.len()];
        for &(task, start) in starts {
            for &column in formulation.task_columns(task) {
                if formulation.columns[column].start == start {
                    values[column] = 1.0;
                }
            }
        }
        values
    }

    #[test]
    fn columns_respect_release_and_horizon() -> anyhow::Result<()> {
        let tasks = vec![
            Task::new("a", Category::A, 0, 2, 1.0, 1.0),
            Task::new("b", Category::A, 2, 3, 1.0, 1.0),
        ];
        let instance = Instance::new(tasks, BTreeMap::from([(Category::A, 5.0)]))?;
        let formulation = Formulation::new(&instance, &config(Horizon::Release));

        assert_eq!(formulation.horizon, 5);
        let starts: Vec<_> = formulation.columns.iter().map(|c| (c.task, c.start)).collect();
        assert_eq!(starts, vec![(0, 0), (0, 1), (0, 2), (0, 3), (1, 2)]);
        Ok(())
    }

    #[test]
    fn rows_encode_the_feasibility_predicates() -> anyhow::Result<()> {
        let tasks = vec![
            Task::new("x", Category::A, 0, 1, 1.0, 3.0).with_dependencies(["y"]),
            Task::new("y", Category::A, 0, 3, 1.0, 3.0),
        ];
        let instance = Instance::new(tasks, BTreeMap::from([(Category::A, 5.0)]))?;
        let formulation = Formulation::new(&instance, &config(Horizon::Serial));
        let (x, y) = (0, 1);

        let cases = [
            (vec![(y, 0), (x, 3)], true),
            (vec![(y, 0), (x, 2)], false),
            (vec![(x, 3)], false),
            (vec![(y, 1)], true),
            (vec![], true),
        ];
        for (starts, expected) in cases {
            let values = assignment(&formulation, &starts);
            assert_eq!(satisfied(&formulation, &values), expected, "{starts:?}");

            let schedule = formulation.extract(&instance, &values);
            assert_eq!(schedule.verify(), expected, "{starts:?}");
        }

        let mut twice = assignment(&formulation, &[(y, 0)]);
        twice[formulation.task_columns(y)[1]] = 1.0;
        assert!(!satisfied(&formulation, &twice));
        Ok(())
    }

    #[test]
    fn weights_are_plain_priorities() -> anyhow::Result<()> {
        let tasks = vec![
            Task::new("a", Category::A, 0, 1, 2.0, 1.0),
            Task::new("b", Category::A, 0, 3, 1.0004, 1.0),
        ];
        let instance = Instance::new(tasks, BTreeMap::from([(Category::A, 1.0)]))?;
        let formulation = Formulation::new(&instance, &ExactConfig::default());

        for column in &formulation.columns {
            let priority = instance.tasks()[column.task].priority;
            assert!((column.weight - priority).abs() < f64::EPSILON);
        }
        let late = formulation.task_columns(0)[2];
        assert!((formulation.delay(late) - 4.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn priority_floor_rejects_lower_totals() -> anyhow::Result<()> {
        let tasks = vec![
            Task::new("a", Category::A, 0, 4, 1.0, 1.0),
            Task::new("b", Category::A, 2, 2, 1.0004, 1.0),
        ];
        let instance = Instance::new(tasks, BTreeMap::from([(Category::A, 1.0)]))?;
        let formulation = Formulation::new(&instance, &config(Horizon::Release));

        let best = assignment(&formulation, &[(1, 2)]);
        let worse = assignment(&formulation, &[(0, 0)]);
        let score = formulation.score(&best);
        assert!((score - 1.0004).abs() < 1e-12);

        let floor = formulation.priority_floor(score);
        assert!(holds(&floor, &best));
        assert!(!holds(&floor, &worse));
        Ok(())
    }
}
