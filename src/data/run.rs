use crate::core::{Instance, Outcome, Scheduler};
use crate::data::deserialize;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Tolerance when comparing a total priority with the expected optimum.
const SCORE_TOLERANCE: f64 = 1e-6;

/// Report of running a directory of samples.
#[derive(Debug, Deserialize, Serialize)]
pub struct Report {
    scheduler: String,
    entries: Vec<ReportEntry>,
}

impl Report {
    fn new(scheduler: String) -> Self {
        let entries = Vec::new();
        Self { scheduler, entries }
    }

    /// Get the scheduler name.
    #[must_use]
    pub fn scheduler_name(&self) -> &str {
        &self.scheduler
    }

    /// Get the entries.
    #[must_use]
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        writeln!(f, "Scheduler: {}", self.scheduler)?;
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        writeln!(f, "-------------------")
    }
}

/// Report of running a single sample. `score` is `None` when the scheduler
/// returned no schedule.
#[non_exhaustive]
#[derive(Debug, Deserialize, Serialize)]
pub struct ReportEntry {
    pub name: String,
    pub score: Option<f64>,
    pub optimum: f64,
    pub placed: usize,
    pub time: f64,
}

impl Display for ReportEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self.score {
            Some(score) => write!(
                f,
                "{}: {score} of {} ({} placed) in {:.2} sec",
                self.name, self.optimum, self.placed, self.time
            ),
            None => write!(f, "{}: no schedule in {:.2} sec", self.name, self.time),
        }
    }
}

/// Run all samples in the `samples` directory.
/// Print the report to stdout.
///
/// # Arguments
/// - `valid` is true, check if the score equals the optimum.
/// - `solver` is the scheduler to run.
///
/// # Errors
/// - If a file cannot be read.
/// - If no samples are found.
///
/// # Panics
/// - If a schedule is invalid.
/// - If `valid` is true and a score differs from the optimum or no schedule is returned.
pub fn samples(valid: bool, solver: &mut dyn Scheduler) -> anyhow::Result<()> {
    run("samples", valid, solver).and_then(|report| {
        if report.entries.is_empty() {
            Err(anyhow!("No samples found"))
        } else {
            println!("{report}");
            Ok(())
        }
    })
}

/// Run all samples in the `dir` directory. Samples with more tasks than the
/// scheduler handles are skipped.
///
/// # Arguments
/// - `valid` is true, check if the score equals the optimum.
/// - `solver` is the scheduler to run.
///
/// # Errors
/// - If a file cannot be read or parsed.
/// - If the scheduler fails.
///
/// # Panics
/// - If a schedule is invalid.
/// - If `valid` is true and a score differs from the optimum or no schedule is returned.
pub fn run(dir: impl AsRef<Path>, valid: bool, solver: &mut dyn Scheduler) -> anyhow::Result<Report> {
    let mut report = Report::new(solver.name().into());

    let mut files: Vec<_> = std::fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    files.sort_by_key(std::fs::DirEntry::file_name);

    for file in files {
        let (name, optimum) = parse_filename(&file.file_name())?;
        let instance: Instance = deserialize(&mut BufReader::new(File::open(file.path())?))?;

        if instance.tasks().len() > solver.maximum_tasks() {
            debug!(%name, tasks = instance.tasks().len(), "skipping sample");
            continue;
        }

        let time = std::time::Instant::now();
        let outcome = solver.schedule(&instance)?;
        let time = time.elapsed().as_secs_f64();

        let (score, placed) = match outcome {
            Outcome::Scheduled(solution) => {
                let schedule = &solution.schedule;
                assert!(schedule.verify(), "Invalid schedule created for {name}");

                let score = schedule.calculate_score();
                if valid {
                    assert!(
                        (score - optimum).abs() < SCORE_TOLERANCE,
                        "Invalid score {score} for {name}, expected {optimum}"
                    );
                }
                (Some(score), schedule.len())
            }
            Outcome::NoSchedule(reason) => {
                assert!(!valid, "No schedule for {name}: {reason}");
                (None, 0)
            }
        };

        report.entries.push(ReportEntry {
            name,
            score,
            optimum,
            placed,
            time,
        });
    }

    Ok(report)
}

/// Splits `{name}_{optimum}.json` into the full file name and the optimum.
fn parse_filename(filename: &std::ffi::OsStr) -> anyhow::Result<(String, f64)> {
    static NAME_ERR: &str = "Cannot read filename";

    let name = filename.to_str().ok_or_else(|| anyhow!(NAME_ERR))?;
    let stem = name.strip_suffix(".json").ok_or_else(|| anyhow!(NAME_ERR))?;
    let (_, optimum) = stem.rsplit_once('_').ok_or_else(|| anyhow!(NAME_ERR))?;
    Ok((name.into(), optimum.parse()?))
}
