use super::formulation::Formulation;
use super::ilp::incumbent;
use crate::config::ExactConfig;
use crate::core::{
    Instance, NoSchedule, Optimality, Outcome, Schedule, Scheduler, Solution, SolveError,
};
use grb::prelude::*;
use grb::Status;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Exact scheduler solving the time-indexed integer program with Gurobi.
/// Gurobi enforces the time limit itself and keeps the incumbent it has found.
/// Without one, the greedy schedule is returned as the incumbent.
#[derive(Clone, Debug, Default)]
pub struct Gurobi {
    config: ExactConfig,
}

impl Gurobi {
    /// Creates a new Gurobi scheduler.
    #[must_use]
    pub const fn new(config: ExactConfig) -> Self {
        Self { config }
    }
}

impl Scheduler for Gurobi {
    fn schedule<'a>(&mut self, instance: &'a Instance) -> Result<Outcome<'a>, SolveError> {
        if instance.tasks().is_empty() {
            return Ok(Outcome::Scheduled(Solution::new(
                Schedule::new(instance),
                Optimality::Optimal,
            )));
        }

        let limit = self.config.time_limit;
        let deadline = Instant::now() + limit;
        let formulation = Formulation::new(instance, &self.config);
        let mut model = create_model("Scheduling", &self.config)?;
        let x = column_vars(&mut model, &formulation)?;

        for row in &formulation.rows {
            model.add_constr(&row.name, c!(linear(&row.terms, &x).grb_sum() <= row.bound))?;
        }

        let objective = formulation.columns.iter().zip(&x).map(|(c, &var)| c.weight * var);
        model.set_objective(objective.grb_sum(), Maximize)?;
        model.optimize()?;

        let optimality = match model.status()? {
            Status::Optimal => Optimality::Optimal,
            Status::Infeasible => return Ok(Outcome::NoSchedule(NoSchedule::Infeasible)),
            Status::TimeLimit if model.get_attr(attr::SolCount)? > 0 => {
                warn!(?limit, "time limit reached, returning the solver incumbent");
                Optimality::TimeLimited
            }
            Status::TimeLimit => {
                warn!(?limit, "time limit reached, returning the greedy incumbent");
                return incumbent(instance);
            }
            status => return Err(SolveError::Solver(format!("unexpected status {status:?}"))),
        };

        let mut values = model.get_obj_attr_batch(attr::X, x.clone())?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        if optimality == Optimality::Optimal && self.config.prefer_early && !remaining.is_zero() {
            let floor = formulation.priority_floor(formulation.score(&values));
            model.add_constr(&floor.name, c!(linear(&floor.terms, &x).grb_sum() <= floor.bound))?;

            let delays = (0..x.len()).map(|column| formulation.delay(column) * x[column]);
            model.set_objective(delays.grb_sum(), Minimize)?;
            model.set_param(param::TimeLimit, remaining.as_secs_f64())?;
            model.optimize()?;

            if model.get_attr(attr::SolCount)? > 0 {
                values = model.get_obj_attr_batch(attr::X, x)?;
            } else {
                debug!("early-start solve found nothing, keeping the first optimum");
            }
        }

        let schedule = formulation.extract(instance, &values);
        debug_assert!(schedule.verify(), "Gurobi schedule is invalid");

        info!(
            placed = schedule.len(),
            score = schedule.calculate_score(),
            ?optimality,
            "gurobi schedule finished"
        );

        Ok(Outcome::Scheduled(Solution::new(schedule, optimality)))
    }

    fn exact(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "Gurobi"
    }
}

#[allow(unsafe_code)]
#[linkme::distributed_slice(super::SCHEDULERS)]
static INSTANCE: fn(&crate::config::Settings) -> Box<dyn Scheduler> =
    |settings| Box::new(Gurobi::new(settings.exact));

fn create_model(name: &str, config: &ExactConfig) -> grb::Result<Model> {
    let mut env = Env::new("")?;
    env.set(param::OutputFlag, 0)?;
    env.set(param::LogToConsole, 0)?;
    env.set(param::TimeLimit, config.time_limit.as_secs_f64())?;
    Model::with_env(name, env)
}

fn column_vars(model: &mut Model, formulation: &Formulation) -> grb::Result<Vec<Var>> {
    let mut x = Vec::with_capacity(formulation.columns.len());
    for column in &formulation.columns {
        let name = format!("x_{}_{}", column.task, column.start);
        x.push(add_binvar!(model, name: &name)?);
    }
    Ok(x)
}

fn linear<'a>(terms: &'a [(usize, f64)], x: &'a [Var]) -> impl Iterator<Item = Expr> + 'a {
    terms.iter().map(move |&(column, coef)| coef * x[column])
}
