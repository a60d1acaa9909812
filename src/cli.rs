//! Command-line definitions for the headless `gazex` binary.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::logging::LogFormat;

/// Logging flags, flattened into every gazex binary.
#[derive(Args, Debug, Clone, Default)]
pub struct LogArgs {
    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(long, value_enum, default_value_t, global = true, env = "GAZEX_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Replays scripted gaze traces through the selection scheduler under a
/// simulated clock.
#[derive(Parser, Debug)]
#[command(name = "gazex", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub log: LogArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the whole experiment (training, gaze-triggered attempts) against a trace.
    Replay(ReplayArgs),

    /// Run a single gaze-triggered trial against a trace.
    Trial(TrialArgs),

    /// Check a configuration file and exit.
    Validate(ValidateArgs),

    /// Print the default configuration as JSON.
    DefaultConfig,
}

/// Inputs shared by the replay commands.
#[derive(Args, Debug, Clone)]
pub struct TraceArgs {
    /// Experiment configuration (JSON). Defaults are used when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Gaze trace (JSON) in centered screen coordinates.
    #[arg(short, long)]
    pub trace: PathBuf,

    /// Selection log destination (JSON lines). Stdout when omitted.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    #[command(flatten)]
    pub trace: TraceArgs,

    /// Seed for target position shuffling.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct TrialArgs {
    #[command(flatten)]
    pub trace: TraceArgs,

    /// Disable queuing; fixations during an animation are ignored.
    #[arg(long)]
    pub no_queue: bool,

    /// Target label to queue before the first frame.
    #[arg(long)]
    pub seed_target: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    pub config: PathBuf,
}
