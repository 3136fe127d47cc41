//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;

pub use job::SubmitArgs;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit a job through the orchestrator
    Submit(SubmitArgs),
    /// Show the status of an execution
    Status {
        /// Execution UUID
        id: String,
    },
    /// Cancel an execution
    Cancel {
        /// Execution UUID
        id: String,
    },
    /// Wait for an execution to finish
    Wait {
        /// Execution UUID
        id: String,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Submit(args) => job::submit(args, config).await,
        Commands::Status { id } => job::status(&id, config).await,
        Commands::Cancel { id } => job::cancel(&id, config).await,
        Commands::Wait { id, timeout } => job::wait(&id, timeout, config).await,
    }
}
