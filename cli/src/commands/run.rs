// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `chorus run` - orchestrate a task across the configured workers

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use chorus_core::domain::orchestration::{
    OptimizationReport, OrchestrationRequest, OrchestrationResult, WorkerOutcome,
};

use crate::embedded::EmbeddedCoordinator;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Task description
    #[arg(value_name = "TASK")]
    pub task: String,

    /// Restrict the run to these worker ids (repeatable)
    #[arg(short, long = "worker", value_name = "ID")]
    pub workers: Vec<String>,

    /// Refinement pass (lower coherence seed and dissonance probability)
    #[arg(long)]
    pub refine: bool,

    /// Number of consecutive runs
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub repeat: u32,

    /// Optimise the resonance multiplier after the runs
    #[arg(long)]
    pub optimize: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(
    args: RunArgs,
    config_path: Option<PathBuf>,
    audit_log: Option<PathBuf>,
) -> Result<()> {
    let embedded = EmbeddedCoordinator::bootstrap(config_path, audit_log).await?;
    let coordinator = &embedded.coordinator;

    let mut results = Vec::with_capacity(args.repeat as usize);
    for round in 1..=args.repeat {
        let mut request = OrchestrationRequest::new(args.task.clone()).refine(args.refine);
        if !args.workers.is_empty() {
            request = request.with_workers(args.workers.iter().cloned());
        }

        let result = coordinator
            .run_orchestration(request)
            .await
            .with_context(|| format!("Orchestration run {} failed", round))?;

        if !args.json {
            print_result(round, args.repeat, &result);
        }
        results.push(result);
    }

    let report = if args.optimize {
        Some(coordinator.optimize_parameters())
    } else {
        None
    };

    if args.json {
        let output = serde_json::json!({
            "runs": results,
            "optimization": report,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if let Some(report) = &report {
        print_optimization(report);
    }

    Ok(())
}

fn print_result(round: u32, total: u32, result: &OrchestrationResult) {
    if total > 1 {
        println!("{}", format!("Run {}/{}", round, total).bold());
    }
    println!("Orchestration {}", result.orchestration_id.to_string().dimmed());
    println!("  Task: {}", result.task);
    println!();

    println!("{}", "Workers:".bold());
    for (worker_id, outcome) in &result.per_worker_results {
        match outcome {
            WorkerOutcome::Success(output) => println!(
                "  {} {} (resonance {:.3})",
                "✓".green(),
                worker_id,
                output.resonance
            ),
            WorkerOutcome::Failure { error } => {
                println!("  {} {} {}", "✗".red(), worker_id, error.to_string().red())
            }
        }
    }
    println!();

    println!("{}", "Unified result:".bold());
    for line in result.unified_result.summary.lines() {
        println!("  {}", line);
    }
    println!(
        "  Aggregate coherence: {:.3}  Stability: {:.3}",
        result.unified_result.aggregate_coherence, result.unified_result.stability
    );
    println!();

    let coherence = format!("{:.3}", result.final_coherence);
    println!("Final coherence: {}", coherence.bold());
    if let Some(report) = &result.dissonance {
        println!(
            "{}",
            format!(
                "⚠ Dissonance: {:.3} → {:.3}, recovered to {:.3}",
                report.onset, report.trough, report.recovered
            )
            .yellow()
        );
    }
    println!("Duration: {} ms", result.duration_ms);

    if !result.log_tail.is_empty() {
        println!();
        println!("{}", "Recent runs:".bold());
        for line in &result.log_tail {
            println!("  {}", line.dimmed());
        }
    }
    println!();
}

fn print_optimization(report: &OptimizationReport) {
    println!("{}", "Optimisation:".bold());
    if !report.adjusted {
        println!("  {}", "No history to optimise from".yellow());
        return;
    }
    println!("  Window: {} runs", report.window);
    println!("  Mean coherence: {:.3}", report.mean_coherence);
    println!("  Mean duration: {:.1} ms", report.mean_duration_ms);
    println!("  Performance: {:.3}", report.performance);
    println!(
        "  Resonance: {:.3} → {}",
        report.previous_resonance,
        format!("{:.3}", report.resonance).green()
    );
}
