// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `chorus status` - coordinator health and recent audit entries

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use chorus_core::domain::worker::WorkerStatus;

use crate::embedded::EmbeddedCoordinator;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print status as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(
    args: StatusArgs,
    config_path: Option<PathBuf>,
    audit_log: Option<PathBuf>,
) -> Result<()> {
    let embedded = EmbeddedCoordinator::bootstrap(config_path, audit_log).await?;
    let status = embedded.coordinator.get_status().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", format!("Coordinator {}", embedded.config.metadata.name).bold());
    match &embedded.audit_path {
        Some(path) => println!("  Audit log: {}", path.display()),
        None => println!("  Audit log: {}", "(in-memory)".dimmed()),
    }
    println!("  Coherence: {:.3}", status.coherence);
    println!("  Resonance: {:.3}", status.resonance);
    println!("  Busy: {}", status.busy);
    println!();

    println!("{}", format!("Workers ({}):", status.worker_count).bold());
    for worker in &status.workers {
        let state = match worker.status {
            WorkerStatus::Idle => "idle".green(),
            WorkerStatus::Executing => "executing".yellow(),
        };
        println!(
            "  {} [{}] {} coherence {:.3} performance {:.3}{}",
            worker.id.to_string().bold(),
            worker.kind,
            state,
            worker.coherence,
            worker.performance,
            if worker.faulted { " (faulted)".red().to_string() } else { String::new() }
        );
    }
    println!();

    println!("{}", "Recent runs:".bold());
    if status.log_tail.is_empty() {
        println!("  {}", "No runs recorded".yellow());
    }
    for line in &status.log_tail {
        println!("  {}", line);
    }

    Ok(())
}
