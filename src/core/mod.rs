mod error;
mod feasibility;
mod problem;
mod solution;

pub use error::*;
pub use feasibility::*;
pub use problem::*;
pub use solution::*;

/// Schedules the tasks of an instance.
pub trait Scheduler {
    /// Schedules the tasks of the given instance.
    ///
    /// # Errors
    /// - If the strategy itself fails. An instance without a schedule is
    ///   reported through [`Outcome::NoSchedule`], not as an error.
    fn schedule<'a>(&mut self, instance: &'a Instance) -> Result<Outcome<'a>, SolveError>;

    /// Returns whether the scheduler proves optimality of its result.
    fn exact(&self) -> bool {
        false
    }

    /// Returns the maximum number of tasks the scheduler handles in reasonable time.
    fn maximum_tasks(&self) -> usize {
        usize::MAX
    }

    /// Returns the name of the scheduler.
    fn name(&self) -> &'static str;
}
