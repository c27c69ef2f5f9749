// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Chorus CLI
//!
//! The `chorus` binary embeds a coordinator, registers the configured workers
//! and runs tasks against them.
//!
//! ## Commands
//!
//! - `chorus run <TASK>` - Orchestrate a task (`--worker`, `--refine`, `--repeat`, `--optimize`, `--json`)
//! - `chorus status` - Coordinator health and the audit tail
//! - `chorus config show|validate|generate` - Configuration management

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use chorus_orchestrator::commands::{self, ConfigCommand, RunArgs, StatusArgs};
use chorus_orchestrator::logging;

/// Chorus - coordinate heterogeneous workers on a single task
#[derive(Parser)]
#[command(name = "chorus")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "CHORUS_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// JSON-lines audit log (in-memory when unset)
    #[arg(long, global = true, env = "CHORUS_AUDIT_LOG", value_name = "FILE")]
    audit_log: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); falls back to the config, then "warn"
    #[arg(long, global = true, env = "CHORUS_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Orchestrate a task across the registered workers
    #[command(name = "run")]
    Run(RunArgs),

    /// Show coordinator status and recent runs
    #[command(name = "status")]
    Status(StatusArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let level = logging::log_level_for(cli.log_level.as_deref(), cli.config.clone());
    logging::init_logging(&level)?;

    match cli.command {
        Some(Commands::Run(args)) => commands::run::execute(args, cli.config, cli.audit_log).await,
        Some(Commands::Status(args)) => {
            commands::status::execute(args, cli.config, cli.audit_log).await
        }
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config),
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}
