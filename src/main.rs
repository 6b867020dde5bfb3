mod action;
mod cli;
mod commands;
mod error;
mod git;
mod health;
mod lock;
mod logfile;
mod manifest;
mod net;
mod planner;
mod privilege;
mod probe;
mod runner;
mod ui;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use error::ProvisionError;
use manifest::Manifest;
use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "pifleet", &mut io::stdout());
        return ExitCode::SUCCESS;
    }

    let manifest = match Manifest::load(&cli.manifest) {
        Ok(manifest) => manifest,
        Err(err) => {
            ui::error(&format!("{err:#}"));
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Install { dry_run } => commands::install::run(&manifest, dry_run),
        Command::Update => commands::update::run(&manifest),
        Command::Status => commands::status::run(&manifest),
        Command::Plan => commands::plan::run(&manifest),
        Command::Completions { .. } => unreachable!("handled above"),
    };

    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            ui::error(&format!("{err:#}"));
            let code = err
                .downcast_ref::<ProvisionError>()
                .map_or(1, ProvisionError::exit_code);
            ExitCode::from(code as u8)
        }
    }
}
