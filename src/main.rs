//! cellanneal CLI.
//!
//! Usage:
//!   cellanneal run -i 'frames/img%03d.png' -o out -c config.json -x initial.csv
//!   cellanneal serve --listen 0.0.0.0:7878

use anyhow::{Context, Result};
use cellanneal::aggregate::Strategy;
use cellanneal::config::OptimizerParams;
use cellanneal::dispatch::cluster::WorkerServer;
use cellanneal::pipeline::{self, RunPaths};
use cellanneal::render::Objective;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cellanneal")]
#[command(about = "Fit cell models to time-lapse microscopy with simulated annealing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Optimize a frame sequence and write the lineage
    Run(RunArgs),
    /// Serve annealing jobs for a cluster run
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:7878")]
        listen: String,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Input filename pattern (e.g. "image%03d.png")
    #[arg(short, long, value_name = "PATTERN")]
    input: String,

    /// Output directory
    #[arg(short, long, value_name = "DIRECTORY")]
    output: PathBuf,

    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Initial cell configuration
    #[arg(short = 'x', long, value_name = "FILE")]
    initial: PathBuf,

    /// Debug directory; saves the synthetic image of every frame
    #[arg(short, long, value_name = "DIRECTORY")]
    debug: Option<PathBuf>,

    /// First frame index
    #[arg(long, default_value_t = 0, value_name = "N")]
    frame_first: i64,

    /// Last frame index (defaults to until the last image)
    #[arg(long, default_value_t = -1, value_name = "N", allow_negative_numbers = true)]
    frame_last: i64,

    /// Use the distance-weighted objective
    #[arg(long)]
    dist: bool,

    /// Parallel workers (defaults to the number of processors)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Jobs per frame (defaults to --workers)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Number of top solutions kept (at most --jobs)
    #[arg(long, default_value_t = 1)]
    keep: usize,

    /// One of "best-wins", "worst-wins", "extreme-wins"
    #[arg(long, default_value = "best-wins")]
    strategy: String,

    /// Comma-separated host:port list of `cellanneal serve` workers
    #[arg(long, default_value = "")]
    cluster: String,

    /// Run every job on the main thread
    #[arg(long)]
    no_parallel: bool,

    /// Optimize all frames jointly
    #[arg(long)]
    global_optimization: bool,

    /// Automatic temperature scheduling (1 = on, 0 = off)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
    auto_temp: u8,

    /// Starting temperature (requires --auto-temp 0)
    #[arg(long)]
    start_temp: Option<f64>,

    /// Ending temperature (requires --auto-temp 0)
    #[arg(long)]
    end_temp: Option<f64>,

    /// Run seed (random when omitted)
    #[arg(long)]
    seed: Option<u64>,
}

impl RunArgs {
    fn params(&self) -> Result<OptimizerParams> {
        let strategy: Strategy = self.strategy.parse()?;
        let mut params = OptimizerParams::default()
            .with_frames(self.frame_first, self.frame_last)
            .with_keep(self.keep)
            .with_strategy(strategy)
            .with_cluster(self.cluster.clone())
            .with_no_parallel(self.no_parallel)
            .with_global_optimization(self.global_optimization);
        if self.dist {
            params = params.with_objective(Objective::Distance);
        }
        params.workers = self.workers;
        params.jobs = self.jobs;
        params.auto_temp = self.auto_temp == 1;
        params.start_temp = self.start_temp;
        params.end_temp = self.end_temp;
        params.seed = self.seed;
        Ok(params)
    }

    fn paths(&self) -> RunPaths {
        RunPaths {
            input: self.input.clone(),
            output: self.output.clone(),
            config: self.config.clone(),
            initial: self.initial.clone(),
            debug: self.debug.clone(),
        }
    }
}

fn install_interrupt_handler() -> Result<Arc<AtomicBool>> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        tracing::warn!("interrupt received; stopping after running jobs observe it");
        flag.store(true, Ordering::Relaxed);
    })
    .context("failed to install interrupt handler")?;
    Ok(cancel)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cancel = install_interrupt_handler()?;

    match cli.command {
        Command::Run(args) => {
            let params = args.params()?;
            let summary = pipeline::run(&args.paths(), &params, cancel)
                .with_context(|| format!("run on \"{}\" failed", args.input))?;
            println!(
                "{} frames, {} lineage rows in {:.1}s (seed {})",
                summary.frames,
                summary.rows,
                summary.elapsed.as_secs_f64(),
                summary.seed
            );
        }
        Command::Serve { listen } => {
            WorkerServer::bind(&listen)?
                .run(cancel)
                .with_context(|| format!("worker on {listen} failed"))?;
        }
    }
    Ok(())
}
