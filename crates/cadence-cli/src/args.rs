//! Command-line definitions using clap's derive API.
//!
//! Argument structs stay free of engine types; [`crate::cli::Cli`] turns them
//! into engine calls.

use std::path::PathBuf;

use cadence_core::PlanStatus;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

/// Run and inspect multi-step orchestration plans
///
/// Plans are JSON documents describing a goal and a set of steps with
/// dependencies. Cadence validates them, stores them in a local SQLite
/// database, runs independent steps concurrently with retries, and keeps an
/// audit trail of every attempt.
#[derive(Parser)]
#[command(version, about, name = "cadence")]
pub struct Args {
    /// Path to the SQLite database file. Defaults to
    /// $XDG_DATA_HOME/cadence/cadence.db
    #[arg(long, global = true)]
    pub database_file: Option<PathBuf>,

    /// Engine configuration file (JSON). Defaults to
    /// $XDG_CONFIG_HOME/cadence/config.json when present
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the number of steps that may run at the same time
    #[arg(long, global = true)]
    pub max_concurrency: Option<usize>,

    /// Disable colored output and use plain text
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check a plan document without storing it
    Validate(DocumentArgs),
    /// Store a plan document and print its ID
    Submit(SubmitArgs),
    /// Run a stored plan until every step is settled
    Run(PlanIdArgs),
    /// Show plan status, progress and a per-step table
    #[command(alias = "st")]
    Status(PlanIdArgs),
    /// Show a plan with all step details and results
    Show(PlanIdArgs),
    /// Show a single step
    Step(StepArgs),
    /// List plans, newest first
    #[command(alias = "ls")]
    List(ListArgs),
    /// Show the attempt history of a step
    History(StepArgs),
    /// Show the full execution log of a plan
    Log(PlanIdArgs),
    /// Show the result records of a plan
    Results(PlanIdArgs),
    /// Cancel a plan; running steps finish, nothing new starts
    Cancel(PlanIdArgs),
    /// Pause a running plan
    Pause(PlanIdArgs),
    /// Resume a paused plan
    Resume(PlanIdArgs),
    /// Delete a plan with its steps, results and log
    #[command(alias = "rm")]
    Delete(DeleteArgs),
    /// List registered agents and their capabilities
    Agents,
    /// Print the JSON schema of the plan document
    Schema,
}

/// A plan document on disk. `-` reads standard input.
#[derive(ClapArgs)]
pub struct DocumentArgs {
    #[arg(help = "Path to the plan document (JSON), or - for standard input")]
    pub file: PathBuf,
}

#[derive(ClapArgs)]
pub struct SubmitArgs {
    #[arg(help = "Path to the plan document (JSON), or - for standard input")]
    pub file: PathBuf,
    /// Run the plan right after storing it
    #[arg(long)]
    pub run: bool,
}

#[derive(ClapArgs)]
pub struct PlanIdArgs {
    #[arg(help = "Unique identifier of the plan")]
    pub plan_id: u64,
}

#[derive(ClapArgs)]
pub struct StepArgs {
    #[arg(help = "Unique identifier of the plan")]
    pub plan_id: u64,
    #[arg(help = "Step id as given in the plan document")]
    pub step: String,
}

#[derive(ClapArgs)]
pub struct ListArgs {
    /// Only plans in this status
    #[arg(short, long)]
    pub status: Option<StatusArg>,
    /// Only plans whose goal contains this text
    #[arg(short, long)]
    pub goal: Option<String>,
    /// Maximum number of plans to show
    #[arg(short, long)]
    pub limit: Option<u32>,
}

#[derive(ClapArgs)]
pub struct DeleteArgs {
    #[arg(help = "Unique identifier of the plan to delete")]
    pub plan_id: u64,
    /// Confirm permanent deletion
    #[arg(long)]
    pub confirm: bool,
}

/// Plan status values accepted by `list --status`.
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl From<StatusArg> for PlanStatus {
    fn from(val: StatusArg) -> Self {
        match val {
            StatusArg::Pending => PlanStatus::Pending,
            StatusArg::Running => PlanStatus::Running,
            StatusArg::Paused => PlanStatus::Paused,
            StatusArg::Completed => PlanStatus::Completed,
            StatusArg::Failed => PlanStatus::Failed,
            StatusArg::Cancelled => PlanStatus::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_list_with_status() {
        let args = Args::parse_from(["cadence", "--no-color", "list", "--status", "failed"]);
        assert!(args.no_color);
        match args.command {
            Some(Commands::List(list)) => {
                assert_eq!(list.status.map(PlanStatus::from), Some(PlanStatus::Failed));
            }
            _ => panic!("expected list command"),
        }
    }
}
