use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pifleet")]
#[command(author = "Aditya Deole")]
#[command(version)]
#[command(about = "Converge a Raspberry Pi capture device onto its fleet manifest", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Manifest path
    #[arg(
        short,
        long,
        global = true,
        env = "PIFLEET_MANIFEST",
        default_value = crate::manifest::DEFAULT_MANIFEST_PATH
    )]
    pub manifest: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Full provisioning run (first boot or re-image)
    Install {
        /// Show what would be done without touching the system
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Unattended convergence run (the cron entry point)
    Update,

    /// Show desired vs observed state without changing anything
    Status,

    /// Print the plan a run would execute right now
    Plan,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
