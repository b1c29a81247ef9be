#![deny(clippy::all, clippy::cargo, clippy::expect_used, clippy::unwrap_used)]
#![deny(clippy::pedantic, clippy::nursery, unsafe_code)]
#![warn(clippy::unimplemented, clippy::redundant_type_annotations)]

use anyhow::Result;
use std::io::BufRead;

pub mod algo;
pub mod config;
pub mod core;
pub mod data;
pub mod generate;
pub mod metrics;

/// Runs the given scheduler on the instance read from reader and writes the
/// schedule as `(task_id, start_time, end_time)` triples to stdout, followed
/// by the score and the schedule metrics.
///
/// # Errors
/// - If the instance could not be read from the reader.
/// - If the scheduler fails.
/// - If the schedule could not be written to stdout.
///
/// # Panics
///  - If the schedule is invalid in debug mode.
pub fn run_reader(scheduler: &mut dyn core::Scheduler, reader: &mut impl BufRead) -> Result<()> {
    let instance: core::Instance = data::deserialize(reader)?;

    match scheduler.schedule(&instance)? {
        core::Outcome::Scheduled(solution) => {
            let schedule = &solution.schedule;
            debug_assert!(schedule.verify(), "Schedule is invalid: {schedule:?}");

            println!("{}", data::to_string(&schedule.triples())?);
            println!("{}", schedule.calculate_score());
            println!("{}", metrics::Metrics::measure(schedule, metrics::HIGH_PRIORITY));

            let unscheduled = solution.unscheduled();
            if !unscheduled.is_empty() {
                println!("unscheduled: {}", data::to_string(&unscheduled)?);
            }
        }
        core::Outcome::NoSchedule(reason) => println!("no schedule: {reason}"),
    }

    Ok(())
}
