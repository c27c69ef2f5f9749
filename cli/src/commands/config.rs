// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use chorus_core::domain::coordinator_config::CoordinatorConfigManifest;

use crate::embedded::default_ensemble;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./chorus-config.yaml)
        #[arg(short, long, default_value = "./chorus-config.yaml")]
        output: PathBuf,

        /// Include the default worker ensemble and an audit log path
        #[arg(long)]
        examples: bool,
    },
}

pub fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, examples } => generate(output, examples),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  --config flag: {}", path.display()),
            None => println!("  --config flag: {}", "(not set)".dimmed()),
        }
        for (i, path) in CoordinatorConfigManifest::discovery_paths().iter().enumerate() {
            let marker = if path.exists() { "✓".green() } else { "-".dimmed() };
            println!("  {}. {} {}", i + 1, marker, path.display());
        }
        println!();
    }

    let config = CoordinatorConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;

    println!("{}", "Current configuration:".bold());
    println!();
    print!("{}", serde_yaml::to_string(&config).context("Failed to render configuration")?);

    if config.spec.workers.is_empty() {
        println!();
        println!(
            "{}",
            "No workers configured; `chorus run` registers the default ensemble.".dimmed()
        );
    }

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = CoordinatorConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let mut config = CoordinatorConfigManifest::default();
    config.metadata.name = "chorus-coordinator".to_string();
    if with_examples {
        config.spec.workers = default_ensemble();
        config.spec.audit.path = Some(PathBuf::from("./chorus-audit.jsonl"));
    }

    config
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
