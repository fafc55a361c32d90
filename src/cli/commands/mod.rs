//! CLI parser and command dispatch.

mod init;
mod pool_cmd;
mod run_cmd;
mod state_cmd;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

/// Exit codes: 0 success (including "no new data"), 1 partial failure,
/// 2 hard failure.
pub const EXIT_OK: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_HARD: i32 = 2;

/// Fetch-scope selection for the run command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    /// Compare local and remote freshness
    #[default]
    Auto,
    /// Ignore local data and re-fetch everything
    ForceFull,
    /// Fresh incremental fetch, ignoring any resume checkpoint
    ForceIncremental,
}

impl From<ModeArg> for crate::runner::RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => Self::Auto,
            ModeArg::ForceFull => Self::ForceFull,
            ModeArg::ForceIncremental => Self::ForceIncremental,
        }
    }
}

#[derive(Parser)]
#[command(name = "scores")]
#[command(about = "Stealth acquisition pipeline for sports results")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration and initialize the state database
    Init,

    /// Acquire records for one or more partitions
    Run {
        /// Partition IDs to run
        partitions: Vec<String>,
        /// Run every configured partition
        #[arg(short, long)]
        all: bool,
        /// Fetch-scope selection
        #[arg(short, long, value_enum, default_value = "auto")]
        mode: ModeArg,
        /// Emit reports as JSON instead of styled text
        #[arg(long)]
        json: bool,
    },

    /// Show checkpoints and acquisition progress
    Status {
        /// Limit to one partition
        partition: Option<String>,
    },

    /// Show egress pool health
    Pool,

    /// Manage persisted run state
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    /// Drop a partition's resume checkpoint
    Reset {
        /// Partition ID
        partition: String,
    },
}

/// Parse arguments, dispatch, and return the process exit code.
pub async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings, cli.config.as_deref()).map(|_| EXIT_OK),
        Commands::Run {
            partitions,
            all,
            mode,
            json,
        } => run_cmd::cmd_run(&settings, &partitions, all, mode, json).await,
        Commands::Status { partition } => {
            status::cmd_status(&settings, partition.as_deref()).map(|_| EXIT_OK)
        }
        Commands::Pool => pool_cmd::cmd_pool(&settings).map(|_| EXIT_OK),
        Commands::State { command } => match command {
            StateCommands::Reset { partition } => {
                state_cmd::cmd_state_reset(&settings, &partition).map(|_| EXIT_OK)
            }
        },
    }
}
