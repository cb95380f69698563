use std::sync::Arc;

use anyhow::Context;
use arbor_lock::LockerConfig;
use arbor_tree::{run_stress, InMemoryResourceTree, StressPlan, StressReport, TreeService};
use colored::Colorize;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Stress(args) => cmd_stress(args, &cli.format),
        Command::Config(args) => cmd_config(args),
    }
}

/// File (or defaults), then command-line overrides, then validation.
fn effective_config(args: &LockerArgs) -> anyhow::Result<LockerConfig> {
    let mut config = match &args.config {
        Some(path) => LockerConfig::load(path)
            .with_context(|| format!("reading locker config {}", path.display()))?,
        None => LockerConfig::default(),
    };
    if let Some(strategy) = args.strategy {
        config.strategy = strategy.into();
    }
    if let Some(shards) = args.shards {
        config.shard_count = shards;
    }
    config.validate()?;
    debug!(?config, "effective locker configuration");
    Ok(config)
}

fn cmd_stress(args: StressArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let config = effective_config(&args.locker)?;
    let plan = StressPlan {
        threads: args.threads,
        ops_per_thread: args.ops,
        depth: args.depth,
        fanout: args.fanout,
        seed: args.seed,
        everything_percent: args.everything,
    };

    let service = TreeService::new(Arc::new(InMemoryResourceTree::new("base")), &config)?;
    let report = run_stress(&service, &plan).context("stress run failed")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &StressReport) {
    println!(
        "{} {} ops in {} ms ({:?} locker)",
        "✓".green().bold(),
        report.total_ops().to_string().bold(),
        report.elapsed_ms,
        report.strategy
    );
    println!("  Seeded:     {}", report.seeded);
    println!(
        "  Requests:   {} create, {} update, {} delete, {} whole-tree",
        report.creates, report.updates, report.deletes, report.everything
    );
    println!(
        "  Rejected:   {} not found, {} name conflicts",
        report.not_found.to_string().yellow(),
        report.name_conflicts.to_string().yellow()
    );
    println!(
        "  Tree:       {} resources, depth {}, integrity {}",
        report.resources,
        report.max_depth,
        "✓".green()
    );
    let leaked = if report.live_lock_entries == 0 {
        "0".green()
    } else {
        report.live_lock_entries.to_string().red().bold()
    };
    println!("  Lock table: {leaked} live entries");
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    let config = effective_config(&args.locker)?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}
