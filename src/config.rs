//! Tunables of the scheduling strategies.
//!
//! Every struct derives [`clap::Args`] so the binary exposes the fields as
//! flags, and implements [`Default`] with the same values for library use.

use crate::core::Horizon;
use clap::Args;
use std::num::NonZero;
use std::time::Duration;

/// Parameters of the genetic scheduler.
#[derive(Args, Clone, Copy, Debug, PartialEq)]
pub struct GeneticConfig {
    /// Number of individuals in every generation.
    #[arg(long, default_value = "100")]
    pub population: NonZero<usize>,
    /// Number of generations to evolve.
    #[arg(long, default_value = "100")]
    pub generations: usize,
    /// Probability that an offspring gets one start time resampled.
    #[arg(long, default_value = "0.1")]
    pub mutation_rate: f64,
    /// Time bound for random start times.
    #[arg(id = "genetic_horizon", long = "genetic-horizon", value_enum, default_value = "serial")]
    pub horizon: Horizon,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population: NonZero::<usize>::MIN.saturating_add(99),
            generations: 100,
            mutation_rate: 0.1,
            horizon: Horizon::Serial,
        }
    }
}

/// Parameters of the exact solvers.
#[derive(Args, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExactConfig {
    /// Wall-clock budget of the solver in seconds.
    #[arg(long = "time-limit", value_parser = parse_seconds, default_value = "300")]
    pub time_limit: Duration,
    /// Time bound of the discretized start times.
    #[arg(id = "exact_horizon", long = "exact-horizon", value_enum, default_value = "serial")]
    pub horizon: Horizon,
    /// Skip the second solve that moves an optimal schedule's tasks as early
    /// as possible without losing total priority.
    #[arg(long = "no-prefer-early", action = clap::ArgAction::SetFalse)]
    pub prefer_early: bool,
}

impl Default for ExactConfig {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(300),
            horizon: Horizon::Serial,
            prefer_early: true,
        }
    }
}

/// Settings used to build the registered schedulers.
#[derive(Args, Clone, Copy, Debug, Default, PartialEq)]
pub struct Settings {
    #[command(flatten)]
    pub genetic: GeneticConfig,
    #[command(flatten)]
    pub exact: ExactConfig,
    /// Seed for randomized strategies. Drawn from entropy when omitted.
    #[arg(long)]
    pub seed: Option<u64>,
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value.parse().map_err(|err| format!("{err}"))?;
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(Duration::from_secs_f64(seconds))
    } else {
        Err(format!("invalid number of seconds: {value}"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn defaults_match_flags() {
        let cli = Cli::parse_from(["test"]);
        assert_eq!(cli.settings, Settings::default());
        assert_eq!(cli.settings.genetic.population.get(), 100);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "test",
            "--population",
            "12",
            "--generations",
            "7",
            "--time-limit",
            "1.5",
            "--exact-horizon",
            "release",
            "--genetic-horizon",
            "release",
            "--no-prefer-early",
            "--seed",
            "3",
        ]);
        let settings = cli.settings;
        assert_eq!(settings.genetic.population.get(), 12);
        assert_eq!(settings.genetic.generations, 7);
        assert_eq!(settings.exact.time_limit, Duration::from_millis(1500));
        assert_eq!(settings.exact.horizon, Horizon::Release);
        assert_eq!(settings.genetic.horizon, Horizon::Release);
        assert!(!settings.exact.prefer_early);
        assert_eq!(settings.seed, Some(3));
    }

    #[test]
    fn negative_time_limit_is_rejected() {
        assert!(parse_seconds("-1").is_err());
        assert!(parse_seconds("abc").is_err());
    }
}
