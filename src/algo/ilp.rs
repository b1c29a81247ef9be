use super::formulation::{Formulation, Row};
use super::Greedy;
use crate::config::ExactConfig;
use crate::core::{
    Instance, NoSchedule, Optimality, Outcome, Schedule, Scheduler, Solution, SolveError,
};
use good_lp::{
    constraint, microlp, variable, Expression, ProblemVariables, ResolutionError, Solution as _,
    SolverModel, Variable,
};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Exact scheduler solving the time-indexed integer program with `microlp`.
///
/// The first solve maximizes total priority. Unless disabled, a second solve
/// keeps that total and moves tasks as early as possible.
///
/// The solves run on a worker thread so the time limit can be enforced.
/// `microlp` cannot be interrupted, so a solve that outlives the limit is
/// abandoned and finishes in the background. The greedy schedule is then
/// returned as the incumbent.
#[derive(Clone, Debug, Default)]
pub struct Exact {
    config: ExactConfig,
}

impl Exact {
    /// Creates a new exact scheduler.
    #[must_use]
    pub const fn new(config: ExactConfig) -> Self {
        Self { config }
    }
}

/// What a single solve optimizes.
enum Objective<'f> {
    /// Maximize total priority.
    Priority,
    /// Minimize priority-weighted starts while keeping the floor row.
    Delay(&'f Row),
}

impl Scheduler for Exact {
    fn schedule<'a>(&mut self, instance: &'a Instance) -> Result<Outcome<'a>, SolveError> {
        if instance.tasks().is_empty() {
            return Ok(Outcome::Scheduled(Solution::new(
                Schedule::new(instance),
                Optimality::Optimal,
            )));
        }

        let limit = self.config.time_limit;
        if limit.is_zero() {
            warn!("zero time limit, returning the greedy incumbent");
            return incumbent(instance);
        }
        let deadline = Instant::now() + limit;

        let formulation = Arc::new(Formulation::new(instance, &self.config));
        debug!(
            horizon = formulation.horizon,
            columns = formulation.columns.len(),
            rows = formulation.rows.len(),
            "built integer program"
        );

        let (sender, receiver) = mpsc::channel();
        let worker = Arc::clone(&formulation);
        let prefer_early = self.config.prefer_early;
        std::thread::spawn(move || {
            let first = solve(&worker, &Objective::Priority);
            let floor = first.as_ref().ok().map(|values| worker.priority_floor(worker.score(values)));
            if sender.send(first).is_err() || !prefer_early {
                return;
            }
            if let Some(floor) = floor {
                let _ = sender.send(solve(&worker, &Objective::Delay(&floor)));
            }
        });

        let values = match receiver.recv_timeout(limit) {
            Ok(Ok(values)) => values,
            Ok(Err(ResolutionError::Infeasible)) => {
                return Ok(Outcome::NoSchedule(NoSchedule::Infeasible));
            }
            Ok(Err(err)) => return Err(SolveError::Solver(err.to_string())),
            Err(RecvTimeoutError::Timeout) => {
                warn!(?limit, "time limit reached, returning the greedy incumbent");
                return incumbent(instance);
            }
            Err(RecvTimeoutError::Disconnected) => return Err(SolveError::WorkerPanicked),
        };

        let values = if prefer_early {
            match receiver.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(Ok(early)) => early,
                Ok(Err(err)) => {
                    debug!(%err, "early-start solve failed, keeping the first optimum");
                    values
                }
                Err(_) => {
                    debug!("early-start solve did not finish, keeping the first optimum");
                    values
                }
            }
        } else {
            values
        };

        let schedule = formulation.extract(instance, &values);
        debug_assert!(schedule.verify(), "Exact schedule is invalid");

        info!(
            placed = schedule.len(),
            score = schedule.calculate_score(),
            "exact schedule finished"
        );

        Ok(Outcome::Scheduled(Solution::new(
            schedule,
            Optimality::Optimal,
        )))
    }

    fn exact(&self) -> bool {
        true
    }

    fn maximum_tasks(&self) -> usize {
        12
    }

    fn name(&self) -> &'static str {
        "Exact"
    }
}

#[allow(unsafe_code)]
#[linkme::distributed_slice(super::SCHEDULERS)]
static INSTANCE: fn(&crate::config::Settings) -> Box<dyn Scheduler> =
    |settings| Box::new(Exact::new(settings.exact));

/// Best known schedule when the solver gives up: the greedy one.
pub(super) fn incumbent(instance: &Instance) -> Result<Outcome<'_>, SolveError> {
    let run = Greedy.run(instance)?;
    Ok(Outcome::Scheduled(Solution::new(
        run.schedule,
        Optimality::TimeLimited,
    )))
}

fn solve(formulation: &Formulation, objective: &Objective<'_>) -> Result<Vec<f64>, ResolutionError> {
    let mut vars = ProblemVariables::new();
    let x: Vec<Variable> = formulation
        .columns
        .iter()
        .map(|_| vars.add(variable().binary()))
        .collect();

    let columns = 0..formulation.columns.len();
    let (mut model, floor) = match objective {
        Objective::Priority => {
            let weights = columns.map(|c| (c, formulation.columns[c].weight));
            (vars.maximise(linear(weights, &x)).using(microlp), None)
        }
        Objective::Delay(floor) => {
            let delays = columns.map(|c| (c, formulation.delay(c)));
            (vars.minimise(linear(delays, &x)).using(microlp), Some(*floor))
        }
    };

    for row in formulation.rows.iter().chain(floor) {
        let expression = linear(row.terms.iter().copied(), &x);
        model = model.with(constraint!(expression <= row.bound));
    }

    let solution = model.solve()?;
    Ok(x.iter().map(|&var| solution.value(var)).collect())
}

fn linear(terms: impl Iterator<Item = (usize, f64)>, x: &[Variable]) -> Expression {
    let mut expression = Expression::from(0.0);
    for (column, coefficient) in terms {
        expression += coefficient * x[column];
    }
    expression
}
