use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use gazex::cli::{Cli, Commands, TraceArgs};
use gazex::headless::{load_config, load_trace, replay_experiment, replay_trial};
use gazex::logging::init_logging;
use gazex_experiment::{ExperimentConfig, JsonLinesSink, SelectionEventSink};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

fn open_sink(args: &TraceArgs) -> Result<Box<dyn SelectionEventSink>> {
    Ok(match &args.output {
        Some(path) => Box::new(
            JsonLinesSink::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(JsonLinesSink::new(std::io::stdout().lock())),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log.log_format, cli.log.verbose);

    match cli.command {
        Commands::Replay(args) => {
            let config = load_config(args.trace.config.as_deref())?;
            let trace = load_trace(&args.trace.trace)?;
            let mut rng = match args.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            let mut sink = open_sink(&args.trace)?;
            let results = replay_experiment(config, trace, &mut rng, sink.as_mut())?;
            info!(
                trials = results.len(),
                successes = results.iter().filter(|r| r.is_success()).count(),
                "experiment replay complete"
            );
        }
        Commands::Trial(args) => {
            let config = load_config(args.trace.config.as_deref())?;
            let trace = load_trace(&args.trace.trace)?;
            let mut sink = open_sink(&args.trace)?;
            let allow_queue = config.trial.allow_queue && !args.no_queue;
            let summary = replay_trial(
                &config,
                trace,
                allow_queue,
                args.seed_target.as_deref(),
                sink.as_mut(),
            )?;
            info!(
                termination = %summary.termination,
                selections = summary.selection_count,
                "trial replay complete"
            );
        }
        Commands::Validate(args) => {
            let config = ExperimentConfig::from_path(&args.config)?;
            info!(
                targets = config.targets.len(),
                path = %args.config.display(),
                "configuration is valid"
            );
        }
        Commands::DefaultConfig => {
            let json = serde_json::to_string_pretty(&ExperimentConfig::default())?;
            let mut out = std::io::stdout().lock();
            writeln!(out, "{json}")?;
        }
    }

    Ok(())
}
