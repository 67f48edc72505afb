//! Sluice CLI - fetch, prepare and load, skipping work already done

mod config;
mod logging;
mod pipeline;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use config::Config;
use sluice_core::{ArtifactStore, FsStore, Registry, RunLog, RunReport, Runner, StepStatus};
use sluice_prep::{KeyBounds, KeySearch, Profile, read_table};
use sluice_sqlite::LOAD_STEP;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Idempotent fetch, prepare and load pipeline", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/sluice/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Artifact directory (overrides data_dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Stderr log level when RUST_LOG is unset (overrides log.level)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a step and everything it depends on
    Run {
        /// Step to run
        #[arg(default_value = LOAD_STEP)]
        step: String,
    },

    /// Show the execution order and which outputs already exist
    Plan {
        /// Step to plan for
        #[arg(default_value = LOAD_STEP)]
        step: String,
    },

    /// List pipeline steps
    List,

    /// Profile a prepared table and infer its primary keys
    Inspect {
        /// Semicolon-delimited table with a header row
        csv: PathBuf,
        /// Smallest key size (overrides keys.min_len)
        #[arg(long)]
        min_len: Option<usize>,
        /// Largest key size (overrides keys.max_len)
        #[arg(long)]
        max_len: Option<usize>,
        /// Stop at the smallest size that yields a key
        #[arg(long)]
        first_tier_only: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "sluice", &mut std::io::stdout());
        return Ok(());
    }

    // Load config file, CLI flags override
    let config_path = cli.config.clone().or_else(Config::default_path);
    let mut config = Config::load_from_path(config_path.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }
    config.validate()?;

    match cli.command {
        Commands::Run { step } => {
            let log = logging::build(&config.log.level, config.log_file().as_deref())?;
            let registry = pipeline::build_registry(&config)?;
            cmd_run(&registry, &config, &step, &log)
        }
        Commands::Plan { step } => {
            let registry = pipeline::build_registry(&config)?;
            cmd_plan(&registry, &config, &step)
        }
        Commands::List => {
            let registry = pipeline::build_registry(&config)?;
            cmd_list(&registry)
        }
        Commands::Inspect {
            csv,
            min_len,
            max_len,
            first_tier_only,
        } => {
            let bounds = KeyBounds::new(
                min_len.unwrap_or(config.keys.min_len),
                max_len.or(config.keys.max_len),
            )?;
            let search = KeySearch::new(bounds)
                .first_tier_only(first_tier_only || config.keys.first_tier_only);
            cmd_inspect(&csv, &search)
        }
        Commands::Completions { .. } => Ok(()),
    }
}

fn cmd_run(registry: &Registry, config: &Config, step: &str, log: &RunLog) -> Result<()> {
    let store = FsStore::new(&config.data_dir);
    let report = Runner::new(registry, &store)
        .run(step, log)
        .with_context(|| format!("Pipeline failed while running '{step}'"))?;

    print_report(&report);
    log.in_scope(|| {
        for s in report.degraded() {
            if let StepStatus::Degraded { reason } = &s.status {
                tracing::warn!(step = %s.step_id, %reason, "run completed in a degraded state");
            }
        }
    });
    Ok(())
}

fn print_report(report: &RunReport) {
    for s in &report.steps {
        let status = match &s.status {
            StepStatus::Skipped => "skipped (output exists)".to_string(),
            StepStatus::Completed => "completed".to_string(),
            StepStatus::Degraded { reason } => format!("degraded: {reason}"),
        };
        println!("  {:<10} {:<24} {:.2?}", s.step_id, status, s.duration);
    }
    println!();
    println!(
        "{} executed, {} skipped in {:.2?}",
        report.executed(),
        report.skipped(),
        report.duration
    );
}

fn cmd_plan(registry: &Registry, config: &Config, step: &str) -> Result<()> {
    let store = FsStore::new(&config.data_dir);
    let plan = Runner::new(registry, &store)
        .plan(step)
        .with_context(|| format!("Cannot plan '{step}'"))?;

    println!("Steps:");
    for (i, s) in plan.steps.iter().enumerate() {
        let state = if store.exists(&s.output) {
            "done"
        } else {
            "pending"
        };
        println!("  {}. {} -> {} [{}]", i + 1, s.step_id, store.locate(&s.output), state);
    }
    Ok(())
}

fn cmd_list(registry: &Registry) -> Result<()> {
    println!("Pipeline steps:\n");

    for decl in registry.declarations() {
        println!("  {}", decl.id);
        if !decl.description.is_empty() {
            println!("    {}", decl.description);
        }
        if !decl.requires.is_empty() {
            println!("    requires: {}", decl.requires.join(", "));
        }
        println!("    output:   {}", decl.output);
        println!();
    }

    println!("Total: {} steps", registry.len());
    Ok(())
}

fn cmd_inspect(path: &Path, search: &KeySearch) -> Result<()> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let table = read_table(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to read table {}", path.display()))?;

    println!(
        "{}: {} rows, {} columns\n",
        path.display(),
        table.n_rows(),
        table.n_cols()
    );
    print!("{}", Profile::of(&table));
    println!();

    let keys = search.search(&table);
    if keys.is_empty() {
        println!("No primary key found");
    } else {
        println!("Primary key candidates:");
        for key in keys.iter() {
            println!("  {}", key.join(", "));
        }
    }
    Ok(())
}
