#![allow(clippy::cast_precision_loss)]
use crate::config::GeneticConfig;
use crate::core::{
    Instance, NoSchedule, Optimality, Outcome, Schedule, Scheduler, Solution, SolveError, EPSILON,
};
use rand::prelude::*;
use std::cmp::Ordering;
use tracing::{debug, info, warn};

/// Performs a genetic algorithm over start-time assignments.
///
/// An individual assigns one start time to every task in canonical order, so
/// single-point crossover always recombines starts of the same tasks.
#[derive(Clone, Debug)]
pub struct Genetic {
    config: GeneticConfig,
    rng: StdRng,
}

impl Genetic {
    /// Creates a new genetic algorithm with a fixed seed.
    #[must_use]
    pub fn new(seed: u64, config: GeneticConfig) -> Self {
        let rng = StdRng::seed_from_u64(seed);
        Self { config, rng }
    }

    /// Creates a new genetic algorithm seeded from entropy.
    #[must_use]
    pub fn with_config(config: GeneticConfig) -> Self {
        let rng = StdRng::from_entropy();
        Self { config, rng }
    }
}

impl Default for Genetic {
    fn default() -> Self {
        Self::with_config(GeneticConfig::default())
    }
}

impl Scheduler for Genetic {
    fn schedule<'a>(&mut self, instance: &'a Instance) -> Result<Outcome<'a>, SolveError> {
        if instance.tasks().is_empty() {
            return Ok(Outcome::Scheduled(Solution::new(
                Schedule::new(instance),
                Optimality::Heuristic,
            )));
        }

        let oversized = instance.oversized();
        if !oversized.is_empty() {
            let tasks = instance.tasks();
            let ids: Vec<_> = oversized.into_iter().map(|task| tasks[task].id.clone()).collect();
            warn!(?ids, "tasks exceed their category capacity, no individual can be feasible");
            return Ok(Outcome::NoSchedule(NoSchedule::UnplaceableTasks(ids)));
        }

        let windows = Windows::new(instance, self.config.horizon);
        let size = self.config.population.get();
        let parents = (size / 2).max(1);

        let mut population: Vec<_> = (0..size)
            .map(|_| Individual::gen(&mut self.rng, &windows, instance))
            .collect();
        population.sort_unstable();
        let mut best = population[0].clone();

        for generation in 0..self.config.generations {
            let mut next = Vec::with_capacity(size);

            while next.len() < size {
                let (Some(first), Some(second)) = (
                    population[..parents].choose(&mut self.rng),
                    population[..parents].choose(&mut self.rng),
                ) else {
                    unreachable!("Population is never empty");
                };

                let (a, b) = Individual::cross(&mut self.rng, first, second);
                for mut child in [a, b] {
                    child.mutate(&mut self.rng, &windows, self.config.mutation_rate);
                    child.evaluate(instance);
                    if next.len() < size {
                        next.push(child);
                    }
                }
            }

            population = next;
            population.sort_unstable();

            if population[0] < best {
                best = population[0].clone();
            }

            debug!(generation, best = ?best.fitness, current = ?population[0].fitness, "generation");
        }

        if best.fitness == Fitness::Infeasible {
            warn!(
                generations = self.config.generations,
                population = size,
                "no feasible individual found"
            );
            return Ok(Outcome::NoSchedule(NoSchedule::NoFeasibleIndividual));
        }

        let schedule = best.to_schedule(instance);
        debug_assert!(schedule.verify(), "Genetic schedule is invalid");

        info!(
            placed = schedule.len(),
            score = schedule.calculate_score(),
            makespan = schedule.makespan(),
            "genetic schedule finished"
        );

        Ok(Outcome::Scheduled(Solution::new(
            schedule,
            Optimality::Heuristic,
        )))
    }

    fn name(&self) -> &'static str {
        "Genetic"
    }
}

#[allow(unsafe_code)]
#[linkme::distributed_slice(super::SCHEDULERS)]
static INSTANCE: fn(&crate::config::Settings) -> Box<dyn Scheduler> = |settings| {
    Box::new(settings.seed.map_or_else(
        || Genetic::with_config(settings.genetic),
        |seed| Genetic::new(seed, settings.genetic),
    ))
};

/// Inclusive range of start times each task may take.
#[derive(Clone, Debug)]
struct Windows(Vec<(u64, u64)>);

impl Windows {
    fn new(instance: &Instance, horizon: crate::core::Horizon) -> Self {
        let horizon = instance.horizon(horizon);
        let windows = instance.tasks().iter().map(|task| {
            let last = horizon.saturating_sub(task.duration);
            (task.earliest_start, last.max(task.earliest_start))
        });
        Self(windows.collect())
    }

    fn sample(&self, rng: &mut impl Rng, task: usize) -> u64 {
        let (first, last) = self.0[task];
        rng.gen_range(first..=last)
    }
}

/// Quality of an individual. Any infeasible individual is worse than every
/// feasible one and equal to every other infeasible one.
#[derive(Clone, Copy, Debug)]
enum Fitness {
    Infeasible,
    /// Total priority, ties broken by the lower priority-weighted start sum.
    Feasible { priority: f64, delay: f64 },
}

impl Fitness {
    /// Evaluates a full assignment: every dependency must end by its
    /// dependent's start and no category may exceed its capacity at any instant.
    fn evaluate(starts: &[u64], instance: &Instance) -> Self {
        let tasks = instance.tasks();

        for (task, &start) in starts.iter().enumerate() {
            let dependencies = instance.dependencies(task).iter();
            if dependencies.map(|&d| starts[d] + tasks[d].duration).any(|end| end > start) {
                return Self::Infeasible;
            }
        }

        for (&category, lane) in instance.lanes() {
            let capacity = instance.capacity(category);
            let mut events: Vec<_> = lane
                .iter()
                .flat_map(|&task| {
                    let info = &tasks[task];
                    let start = starts[task];
                    [(start + info.duration, -info.demand), (start, info.demand)]
                })
                .collect();
            // releases sort before acquisitions at the same instant
            events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));

            let mut usage = 0.0;
            for (_, change) in events {
                usage += change;
                if usage > capacity + EPSILON {
                    return Self::Infeasible;
                }
            }
        }

        let placed = starts.iter().zip(tasks);
        let (priority, delay) = placed.fold((0.0, 0.0), |(priority, delay), (&start, task)| {
            (priority + task.priority, delay + task.priority * start as f64)
        });
        Self::Feasible { priority, delay }
    }
}

impl PartialEq for Fitness {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Fitness {}

impl PartialOrd for Fitness {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fitness {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Infeasible, Self::Infeasible) => Ordering::Equal,
            (Self::Infeasible, Self::Feasible { .. }) => Ordering::Less,
            (Self::Feasible { .. }, Self::Infeasible) => Ordering::Greater,
            (
                Self::Feasible { priority, delay },
                Self::Feasible {
                    priority: other_priority,
                    delay: other_delay,
                },
            ) => priority
                .total_cmp(other_priority)
                .then_with(|| other_delay.total_cmp(delay)),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Individual {
    starts: Vec<u64>,
    fitness: Fitness,
}

impl Individual {
    fn new(starts: Vec<u64>, instance: &Instance) -> Self {
        let fitness = Fitness::evaluate(&starts, instance);
        Self { starts, fitness }
    }

    fn gen(rng: &mut impl Rng, windows: &Windows, instance: &Instance) -> Self {
        let starts = (0..windows.0.len()).map(|task| windows.sample(rng, task)).collect();
        Self::new(starts, instance)
    }

    /// Single-point crossover. Children still need [`Individual::evaluate`].
    fn cross(rng: &mut impl Rng, first: &Self, second: &Self) -> (Self, Self) {
        let len = first.starts.len();
        if len < 2 {
            return (first.clone(), second.clone());
        }

        let cut = rng.gen_range(1..len);
        let mut a = first.starts[..cut].to_vec();
        a.extend_from_slice(&second.starts[cut..]);
        let mut b = second.starts[..cut].to_vec();
        b.extend_from_slice(&first.starts[cut..]);

        let fitness = Fitness::Infeasible;
        (Self { starts: a, fitness }, Self { starts: b, fitness })
    }

    /// With probability `rate`, resamples the start of one random task.
    fn mutate(&mut self, rng: &mut impl Rng, windows: &Windows, rate: f64) {
        if rng.gen::<f64>() < rate {
            let task = rng.gen_range(0..self.starts.len());
            self.starts[task] = windows.sample(rng, task);
        }
    }

    fn evaluate(&mut self, instance: &Instance) {
        self.fitness = Fitness::evaluate(&self.starts, instance);
    }

    fn to_schedule<'a>(&self, instance: &'a Instance) -> Schedule<'a> {
        let mut schedule = Schedule::new(instance);
        for (task, &start) in self.starts.iter().enumerate() {
            schedule.schedule(task, start);
        }
        schedule
    }
}

impl PartialOrd for Individual {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Individual {
    fn cmp(&self, other: &Self) -> Ordering {
        let ord = self.fitness.cmp(&other.fitness).reverse();
        if ord == Ordering::Equal {
            self.starts.cmp(&other.starts)
        } else {
            ord
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::{Category, Horizon, Task, TaskId};
    use crate::data::samples;
    use std::collections::BTreeMap;
    use std::num::NonZero;

    fn config(population: usize, generations: usize) -> GeneticConfig {
        GeneticConfig {
            population: NonZero::new(population).unwrap_or(NonZero::<usize>::MIN),
            generations,
            ..GeneticConfig::default()
        }
    }

    fn limits() -> BTreeMap<Category, f64> {
        BTreeMap::from([(Category::A, 5.0), (Category::B, 5.0)])
    }

    fn solution<'a>(genetic: &mut Genetic, instance: &'a Instance) -> anyhow::Result<Schedule<'a>> {
        match genetic.schedule(instance)? {
            Outcome::Scheduled(solution) => Ok(solution.schedule),
            Outcome::NoSchedule(reason) => anyhow::bail!("no schedule: {reason}"),
        }
    }

    #[test]
    fn test_genetic() {
        assert!(samples(false, &mut Genetic::new(10, config(60, 80))).is_ok());
    }

    #[test]
    fn paired_tasks_are_placed_feasibly() -> anyhow::Result<()> {
        let tasks = vec![
            Task::new("a1", Category::A, 0, 2, 10.0, 3.0),
            Task::new("a2", Category::A, 0, 2, 1.0, 3.0),
            Task::new("b1", Category::B, 0, 2, 10.0, 3.0),
            Task::new("b2", Category::B, 0, 2, 1.0, 3.0),
        ];
        let instance = Instance::new(tasks, limits())?;
        let schedule = solution(&mut Genetic::new(1, config(40, 60)), &instance)?;

        assert!(schedule.verify());
        assert_eq!(schedule.len(), 4);
        assert!((schedule.calculate_score() - 22.0).abs() < EPSILON);
        Ok(())
    }

    #[test]
    fn dependency_ends_before_dependent() -> anyhow::Result<()> {
        let tasks = vec![
            Task::new("x", Category::A, 0, 1, 10.0, 1.0).with_dependencies(["y"]),
            Task::new("y", Category::A, 0, 3, 1.0, 1.0),
        ];
        let instance = Instance::new(tasks, limits())?;
        let schedule = solution(&mut Genetic::new(3, config(50, 40)), &instance)?;

        let x = instance.position(&TaskId::from("x")).and_then(|t| schedule.get_schedule(t));
        let y = instance.position(&TaskId::from("y")).and_then(|t| schedule.get_schedule(t));
        let (Some(x), Some(y)) = (x, y) else {
            anyhow::bail!("genetic places every task");
        };
        assert!(x.start >= y.end);
        assert!(schedule.verify());
        Ok(())
    }

    #[test]
    fn oversized_task_is_reported() -> anyhow::Result<()> {
        let tasks = vec![
            Task::new("big", Category::A, 0, 1, 1.0, 6.0),
            Task::new("small", Category::B, 0, 1, 1.0, 1.0),
        ];
        let instance = Instance::new(tasks, limits())?;
        let outcome = Genetic::new(0, config(10, 5)).schedule(&instance)?;

        assert_eq!(
            outcome,
            Outcome::NoSchedule(NoSchedule::UnplaceableTasks(vec!["big".into()]))
        );
        Ok(())
    }

    #[test]
    fn unreachable_dependency_yields_no_feasible_individual() -> anyhow::Result<()> {
        let tasks = vec![
            Task::new("x", Category::A, 0, 1, 10.0, 1.0).with_dependencies(["y"]),
            Task::new("y", Category::A, 0, 3, 1.0, 1.0),
        ];
        let instance = Instance::new(tasks, limits())?;
        let config = GeneticConfig {
            horizon: Horizon::Release,
            ..config(10, 5)
        };
        let outcome = Genetic::new(0, config).schedule(&instance)?;

        assert_eq!(outcome, Outcome::NoSchedule(NoSchedule::NoFeasibleIndividual));
        Ok(())
    }

    #[test]
    fn fitness_agrees_with_schedule_verification() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(11);
        let generator = crate::generate::TaskGenerator::new(12, 2);
        let limits = BTreeMap::from([(Category::A, 6.0), (Category::B, 4.0)]);
        let instance = Instance::new(generator.generate(&mut rng, &limits), limits)?;
        let windows = Windows::new(&instance, Horizon::Serial);

        let mut feasible = 0;
        for _ in 0..500 {
            let individual = Individual::gen(&mut rng, &windows, &instance);
            let verified = individual.to_schedule(&instance).verify();
            assert_eq!(individual.fitness != Fitness::Infeasible, verified);
            feasible += usize::from(verified);
        }
        assert!(feasible < 500);
        Ok(())
    }

    #[test]
    fn crossover_keeps_task_positions() {
        let mut rng = StdRng::seed_from_u64(5);
        let fitness = Fitness::Infeasible;
        let first = Individual {
            starts: vec![0, 1, 2, 3],
            fitness,
        };
        let second = Individual {
            starts: vec![10, 11, 12, 13],
            fitness,
        };

        for _ in 0..20 {
            let (a, b) = Individual::cross(&mut rng, &first, &second);
            let cut = a.starts.iter().position(|&start| start >= 10).unwrap_or(4);
            assert!((1..4).contains(&cut));

            let swapped = |head: &Individual, tail: &Individual| -> Vec<u64> {
                head.starts[..cut].iter().chain(&tail.starts[cut..]).copied().collect()
            };
            assert_eq!(a.starts, swapped(&first, &second));
            assert_eq!(b.starts, swapped(&second, &first));
        }
    }

    #[test]
    fn fitness_orders_feasible_above_infeasible() {
        let low = Fitness::Feasible {
            priority: 5.0,
            delay: 0.0,
        };
        let late = Fitness::Feasible {
            priority: 10.0,
            delay: 30.0,
        };
        let early = Fitness::Feasible {
            priority: 10.0,
            delay: 3.0,
        };

        assert!(Fitness::Infeasible < low);
        assert!(low < late);
        assert!(late < early);
        assert_eq!(Fitness::Infeasible, Fitness::Infeasible);
    }

    #[test]
    fn same_seed_same_schedule() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(2);
        let limits = limits();
        let tasks = crate::generate::TaskGenerator::new(6, 1).generate(&mut rng, &limits);
        let instance = Instance::new(tasks, limits)?;

        let first = Genetic::new(42, config(20, 10)).schedule(&instance)?;
        let second = Genetic::new(42, config(20, 10)).schedule(&instance)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn empty_instance_gives_empty_schedule() -> anyhow::Result<()> {
        let instance = Instance::empty(limits());
        let schedule = solution(&mut Genetic::new(0, config(4, 2)), &instance)?;
        assert!(schedule.is_empty());
        Ok(())
    }
}
