//! schedsmith CLI
//!
//! Finds a schedule of recorded thread traces that fails the assertion, or,
//! with `--dsp-mode`, the pair of events whose order causes the failure in a
//! previously saved schedule.
//!
//! # Usage
//!
//! - `schedsmith --trace-folder traces --solution out/solution.txt [--csr]`
//! - `schedsmith --dsp-mode --trace-folder traces --solution out/solution.txt`
//! - `schedsmith --config run.json`

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::FileConfig;
use schedsmith_search::{Engine, EngineConfig};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schedsmith")]
#[command(about = "Bug-reproducing schedule synthesis from symbolic thread traces")]
#[command(version)]
struct Cli {
    /// JSON config file; flags override its keys
    #[arg(long)]
    config: Option<PathBuf>,

    /// Folder with the recorded per-thread traces
    #[arg(long)]
    trace_folder: Option<PathBuf>,

    /// Solver executable (default: z3 on PATH)
    #[arg(long)]
    with_solver: Option<PathBuf>,

    /// Where the constraint model is written
    #[arg(long)]
    model: Option<PathBuf>,

    /// Failing schedule output (input with --dsp-mode)
    #[arg(long)]
    solution: Option<PathBuf>,

    /// Bug-avoiding schedule output
    #[arg(long)]
    alt_sch: Option<PathBuf>,

    /// Candidate traces tried per flipped branch subset
    #[arg(long)]
    cortex_n: Option<usize>,

    /// Branches closest to the assertion considered for flipping
    #[arg(long)]
    cortex_d: Option<usize>,

    /// Search for the root cause of the saved failing schedule
    #[arg(long)]
    dsp_mode: bool,

    /// Reduce context switches of the failing schedule
    #[arg(long)]
    csr: bool,

    /// Debug logging
    #[arg(long)]
    debug: bool,

    /// Target handed to the symbolic-execution command
    #[arg(long)]
    jpf_file: Option<PathBuf>,

    /// Seconds before symbolic execution is stopped
    #[arg(long)]
    jpf_timeout: Option<u64>,

    /// Symbolic-execution command; `{jpf-file}` is substituted
    #[arg(long)]
    synthesis_cmd: Option<String>,

    /// Seconds to wait for one solver answer
    #[arg(long)]
    solver_timeout: Option<u64>,
}

impl Cli {
    fn flags(&self) -> FileConfig {
        FileConfig {
            trace_folder: self.trace_folder.clone(),
            with_solver: self.with_solver.clone(),
            model: self.model.clone(),
            solution: self.solution.clone(),
            alt_sch: self.alt_sch.clone(),
            cortex_n: self.cortex_n,
            cortex_d: self.cortex_d,
            dsp_mode: self.dsp_mode.then_some(true),
            csr: self.csr.then_some(true),
            debug: self.debug.then_some(true),
            jpf_file: self.jpf_file.clone(),
            jpf_timeout: self.jpf_timeout,
            synthesis_cmd: self.synthesis_cmd.clone(),
            solver_timeout: self.solver_timeout,
        }
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = file.merge(cli.flags());
    init_logging(settings.debug());

    let config = settings.engine_config();
    config.validate().context("invalid search bounds")?;
    if settings.dsp_mode() {
        info!(solution = %config.solution_file.display(), "Mode: find the bug's root cause");
    } else {
        info!(csr = config.csr, "Mode: find a bug-triggering schedule");
    }
    info!(traces = %config.trace_folder.display(), solution = %config.solution_file.display(), "Inputs");

    let mut engine = Engine::new(config.clone()).context("failed to start the search engine")?;
    let outcome = if settings.dsp_mode() {
        root_cause(&mut engine, &config)
    } else {
        failing_schedule(&mut engine, &config)
    };
    engine.close();
    outcome
}

fn failing_schedule(engine: &mut Engine, config: &EngineConfig) -> Result<()> {
    let Some(found) = engine.find_failing_schedule()? else {
        warn!("No bug-triggering schedule found");
        return Ok(());
    };
    println!("{}", found.schedule.pretty());
    println!(
        "Failing schedule: {} operations, {} context switches, {} attempts{}",
        found.schedule.len(),
        found.schedule.context_switches(),
        found.stats.attempts,
        if found.production_run {
            " (production run)"
        } else {
            ""
        }
    );
    println!("Saved to {}", config.solution_file.display());
    Ok(())
}

fn root_cause(engine: &mut Engine, config: &EngineConfig) -> Result<()> {
    let Some(cause) = engine.find_root_cause()? else {
        warn!("No bug-avoiding schedule found");
        return Ok(());
    };
    println!("{}", cause.schedule.pretty());
    match &cause.pair {
        Some(pair) => println!("Root cause {pair}: {}", pair.cause()),
        None => println!("Bug-avoiding schedule found on another trace combination"),
    }
    println!("Saved to {}", config.alternate_solution_file().display());
    Ok(())
}
