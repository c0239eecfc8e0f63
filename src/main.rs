mod dispatch;
mod render;
mod source;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use gridcal_core::config::{self, Config};
use gridcal_core::diff;
use gridcal_core::dispatch::{DispatchBatch, RowSource};
use gridcal_core::pipeline::{self, RunPhase};
use gridcal_core::state::PriorState;
use log::info;
use render::Render;

use crate::dispatch::HttpDispatcher;
use crate::source::FileSource;

#[derive(Parser)]
#[command(name = "gridcal")]
#[command(about = "Turn university schedule spreadsheets into synced calendar event streams")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a source and show the canonical events and diagnostics
    Check {
        /// Source name from config (defaults to all sources)
        source: Option<String>,
    },
    /// Show the operations a sync would dispatch, without dispatching
    Status {
        /// Source name from config (defaults to all sources)
        source: Option<String>,
    },
    /// Parse, diff and dispatch to the remote event store
    Sync {
        /// Source name from config (defaults to all sources)
        source: Option<String>,

        /// Render the operation batch instead of dispatching it
        #[arg(long)]
        dry_run: bool,

        /// Re-parse even if the source's last-modified token is unchanged
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = config::load_config()?;

    match cli.command {
        Commands::Check { source } => cmd_check(&config, source.as_deref()).await,
        Commands::Status { source } => cmd_status(&config, source.as_deref()).await,
        Commands::Sync {
            source,
            dry_run,
            force,
        } => cmd_sync(&config, source.as_deref(), dry_run, force).await,
    }
}

/// Resolve the sources a command operates on.
fn select_sources(config: &Config, name: Option<&str>) -> Result<Vec<FileSource>> {
    if config.sources.is_empty() {
        bail!("no sources configured; add a [sources.<name>] section to the config");
    }

    let mut selected = Vec::new();
    for (source_name, source_config) in &config.sources {
        if name.is_none_or(|n| n == source_name) {
            selected.push(FileSource::new(
                source_name,
                config::expand_path(&source_config.grid),
            ));
        }
    }

    if selected.is_empty() {
        bail!(
            "source '{}' not found; configured sources: {}",
            name.unwrap_or_default(),
            config
                .sources
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(selected)
}

async fn cmd_check(config: &Config, name: Option<&str>) -> Result<()> {
    let engine = config.engine();

    for source in select_sources(config, name)? {
        let outcome = pipeline::parse_source(&source, &engine).await?;

        println!("{}: {} event(s)", source.name(), outcome.events.len());
        for event in outcome.events.values() {
            println!("   {}", event.render());
        }
        print_diagnostics(&outcome.diagnostics);
    }

    Ok(())
}

async fn cmd_status(config: &Config, name: Option<&str>) -> Result<()> {
    let engine = config.engine();

    for source in select_sources(config, name)? {
        let outcome = pipeline::parse_source(&source, &engine).await?;
        let state_path = config::state_path(source.name())?;
        let prior = PriorState::load(&state_path)?;

        let operations = diff::compute(&outcome.events, &prior);
        if operations.is_empty() {
            println!("{}: up to date", source.name());
        } else {
            println!("{}: {} pending operation(s)", source.name(), operations.len());
            for operation in &operations {
                println!("   {}", operation.render());
            }
        }
        print_diagnostics(&outcome.diagnostics);
    }

    Ok(())
}

async fn cmd_sync(config: &Config, name: Option<&str>, dry_run: bool, force: bool) -> Result<()> {
    let engine = config.engine();

    if dry_run {
        for source in select_sources(config, name)? {
            let outcome = pipeline::parse_source(&source, &engine).await?;
            let state_path = config::state_path(source.name())?;
            let prior = PriorState::load(&state_path)?;

            let batch = DispatchBatch::new(diff::compute(&outcome.events, &prior));
            println!(
                "{}: would dispatch {} operation(s)",
                source.name(),
                batch.operations.len()
            );
            for operation in &batch.operations {
                println!("   {}", operation.render());
            }
            print_diagnostics(&outcome.diagnostics);
        }
        return Ok(());
    }

    // Credentials and endpoint are checked before any fetch begins.
    let key = config::auth_key()?;
    let api = config
        .api
        .as_ref()
        .context("no [api] section in config; the remote store endpoint is required for sync")?;
    let dispatcher = HttpDispatcher::new(&api.url, key);

    let mut failures = 0;
    for source in select_sources(config, name)? {
        let state_path = config::state_path(source.name())?;
        info!("syncing {}", source.name());

        let report = pipeline::run_source(&source, &dispatcher, &engine, &state_path, force).await?;

        println!("{}", report.render());
        print_diagnostics(&report.diagnostics);
        if report.phase == RunPhase::Failed {
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{failures} source(s) had rejected operations; re-run to retry the remainder");
    }
    Ok(())
}

fn print_diagnostics(diagnostics: &[gridcal_core::diagnostics::Diagnostic]) {
    for diagnostic in diagnostics {
        println!("   {}", diagnostic.render());
    }
}
