use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use prioritized_resource_scheduling::config::Settings;
use prioritized_resource_scheduling::core::{Category, Instance, Scheduler};
use prioritized_resource_scheduling::generate::TaskGenerator;
use prioritized_resource_scheduling::{algo, data, run_reader};
use rand::prelude::*;
use std::collections::BTreeMap;
use std::io::Write;
use std::num::NonZero;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug)]
struct Algorithm(usize, &'static str);

impl Algorithm {
    fn build(self, settings: &Settings) -> Box<dyn Scheduler> {
        algo::SCHEDULERS[self.0](settings)
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.1)
    }
}

impl ValueEnum for Algorithm {
    fn value_variants<'a>() -> &'a [Self] {
        static ALGORITHMS: std::sync::LazyLock<Vec<Algorithm>> = std::sync::LazyLock::new(|| {
            let settings = Settings::default();
            let iter = algo::SCHEDULERS.iter().enumerate();
            iter.map(|(i, init)| Algorithm(i, init(&settings).name())).collect()
        });

        ALGORITHMS.as_slice()
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.1))
    }
}

/// Schedules prioritized tasks under per-category resource limits.
#[derive(Debug, Parser)]
#[command(version)]
struct Application {
    /// Increase log verbosity. `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one of the implemented algorithms on an instance read from stdin.
    Run {
        algorithm: Algorithm,
        #[command(flatten)]
        settings: Settings,
    },
    /// Run benchmarks on a directory of `{name}_{optimum}.json` instances.
    Bench {
        /// The input directory.
        input: String,
        /// Exclude scheduling algorithms.
        #[arg(short, long, value_delimiter = ',')]
        exclude: Vec<Algorithm>,
        #[command(flatten)]
        settings: Settings,
    },
    /// Generate random instances. The optimum in the file name assumes the serial horizon.
    Gen {
        /// The number of tasks.
        tasks: NonZero<usize>,
        /// The maximum number of dependencies of a task.
        #[arg(short = 'd', long, default_value = "0")]
        max_dependencies: usize,
        /// Capacity of every category as `CATEGORY=CAPACITY`.
        #[arg(short, long, value_parser = parse_limit, value_delimiter = ',', default_value = "A=10,B=10,C=10,D=10")]
        limits: Vec<(Category, f64)>,
        /// Number of instances to generate.
        #[arg(short, long, default_value = "1")]
        amount: NonZero<u64>,
        /// Seed of the generator. Drawn from entropy when omitted.
        #[arg(long)]
        seed: Option<u64>,
        /// Path to output the generated instances. If the directory does not exist, it will be created.
        #[arg(short, long, default_value = "output")]
        output: String,
    },
}

fn parse_limit(value: &str) -> Result<(Category, f64), String> {
    let (category, capacity) = value
        .split_once('=')
        .ok_or_else(|| format!("expected CATEGORY=CAPACITY, got {value}"))?;
    let category = Category::from_str(category.trim(), true)?;
    let capacity = capacity.trim().parse().map_err(|err| format!("{err}"))?;
    Ok((category, capacity))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn schedulers<'a>(
    exclude: &'a [Algorithm],
    settings: &'a Settings,
) -> impl Iterator<Item = Box<dyn Scheduler>> + 'a {
    let iter = algo::SCHEDULERS.iter().map(|init| init(settings));
    iter.filter(|scheduler| !exclude.iter().any(|name| name.1 == scheduler.name()))
}

/// Total priority of the tasks that can be placed at all. On the serial
/// horizon every such task fits, so this is the optimum.
fn placeable_priority(instance: &Instance) -> f64 {
    let tasks = instance.tasks();
    let mut placeable = vec![true; tasks.len()];
    for task in instance.oversized() {
        placeable[task] = false;
    }
    for &task in instance.topological() {
        if instance.dependencies(task).iter().any(|&dependency| !placeable[dependency]) {
            placeable[task] = false;
        }
    }
    let placed = tasks.iter().zip(placeable).filter(|(_, placeable)| *placeable);
    placed.map(|(task, _)| task.priority).sum()
}

fn main() -> anyhow::Result<()> {
    let application = Application::parse();
    init_logging(application.verbose);

    match application.command {
        Command::Run {
            algorithm,
            settings,
        } => {
            let mut scheduler = algorithm.build(&settings);
            run_reader(scheduler.as_mut(), &mut std::io::stdin().lock())
        }
        Command::Bench {
            input,
            exclude,
            settings,
        } => {
            for mut scheduler in schedulers(&exclude, &settings) {
                println!("{}", data::run(&input, false, scheduler.as_mut())?);
            }
            Ok(())
        }
        Command::Gen {
            tasks,
            max_dependencies,
            limits,
            amount,
            seed,
            output,
        } => {
            let limits: BTreeMap<_, _> = limits.into_iter().collect();
            if limits.is_empty() {
                return Err(anyhow!("At least one category limit is required"));
            }

            let mut rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
            let generator = TaskGenerator::new(tasks.get(), max_dependencies);

            let output = std::path::Path::new(&output);
            if !output.try_exists()? {
                std::fs::create_dir_all(output)?;
            }

            for i in 0..amount.get() {
                let instance = Instance::new(generator.generate(&mut rng, &limits), limits.clone())?;
                let filename = format!("{}_{i}_{}.json", tasks.get(), placeable_priority(&instance));
                std::fs::File::create(output.join(filename))?
                    .write_all(data::to_string(&instance)?.as_bytes())?;
            }
            Ok(())
        }
    }
}
