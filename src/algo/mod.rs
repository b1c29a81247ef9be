mod formulation;
mod genetic;
mod greedy;
#[cfg(feature = "gurobi")]
mod gurobi;
mod ilp;

use crate::config::Settings;
use crate::core::Scheduler;

pub use formulation::{Column, Formulation, Row};
pub use genetic::Genetic;
pub use greedy::{Greedy, GreedyRun};
#[cfg(feature = "gurobi")]
pub use gurobi::Gurobi;
pub use ilp::Exact;

/// Every scheduler linked into the binary, built from the run settings.
#[allow(unsafe_code)]
#[linkme::distributed_slice]
pub static SCHEDULERS: [fn(&Settings) -> Box<dyn Scheduler>];
