//! `eflex` command line: solve locally, or run one side of the
//! distributed handshake.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use eflex_admm::{
    write_final_assignment, write_iteration_trace, ControllerConfig, ConvergenceController,
    SolverSuite,
};
use eflex_core::Parameters;
use eflex_coord::{run_assignment, Registry, Worker, WorkerConfig};

#[derive(Parser)]
#[command(name = "eflex", version, about = "Electrolyzer fleet scheduler")]
struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a scheduling problem in-process and export the results.
    Solve {
        /// Problem description (JSON `Parameters`).
        params: PathBuf,

        /// Terminal assignment CSV.
        #[arg(long, default_value = "assignment.csv")]
        output: PathBuf,

        /// Optional per-iteration trace CSV.
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Iteration cap.
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Relative objective-improvement threshold for termination.
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Run the registration service for a distributed deployment.
    Registry {
        /// Listen address.
        #[arg(long, default_value = "127.0.0.1:8085")]
        addr: String,

        /// Number of workers that must register before the phone book
        /// goes out.
        #[arg(long)]
        workers: usize,
    },

    /// Register this process as a worker (scope comes from `EFLEX_*`
    /// environment variables), wait for the phone book, then run the
    /// assigned blocks to termination.
    Worker {
        /// Problem description (JSON `Parameters`).
        params: PathBuf,

        /// Port this worker advertises to its peers.
        #[arg(long)]
        port: u16,

        /// Iteration cap.
        #[arg(long)]
        max_iterations: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Solve {
            params,
            output,
            trace,
            max_iterations,
            threshold,
        } => solve(params, output, trace, max_iterations, threshold),
        Commands::Registry { addr, workers } => {
            let registry = Registry::bind(&addr, workers).await?;
            let book = registry.run().await?;
            for entry in &book {
                println!("{}\t{}", entry.name, entry.address);
            }
            Ok(())
        }
        Commands::Worker {
            params,
            port,
            max_iterations,
        } => {
            let file = File::open(&params)
                .with_context(|| format!("cannot open {}", params.display()))?;
            let problem: Parameters =
                serde_json::from_reader(file).context("problem description is not valid JSON")?;
            problem.validate()?;

            let assignment = WorkerConfig::from_env()?;
            let mut worker = Worker::new(assignment.clone());
            let book = worker.join(port).await?;
            info!(peers = book.len(), "handshake complete");

            let mut config = ControllerConfig::default();
            if let Some(cap) = max_iterations {
                config.max_iterations = cap;
            }
            let outcome = run_assignment(Arc::new(problem), config, &assignment).await?;
            info!(
                iterations = outcome.final_iteration,
                converged = outcome.converged,
                "worker run finished"
            );
            if !outcome.converged {
                anyhow::bail!(
                    "stopped at the iteration cap without converging ({} iterations)",
                    outcome.final_iteration
                );
            }
            Ok(())
        }
    }
}

fn solve(
    params_path: PathBuf,
    output: PathBuf,
    trace: Option<PathBuf>,
    max_iterations: Option<usize>,
    threshold: Option<f64>,
) -> anyhow::Result<()> {
    let file = File::open(&params_path)
        .with_context(|| format!("cannot open {}", params_path.display()))?;
    let params: Parameters =
        serde_json::from_reader(file).context("problem description is not valid JSON")?;
    params.validate()?;

    let mut config = ControllerConfig::default();
    if let Some(cap) = max_iterations {
        config.max_iterations = cap;
    }
    if let Some(threshold) = threshold {
        config.improvement_threshold = threshold;
    }

    let controller = ConvergenceController::new(&params, config, SolverSuite::default());
    let solution = controller.run()?;

    info!(
        iterations = solution.final_iteration,
        converged = solution.converged,
        "run finished"
    );

    if let Some(trace_path) = trace {
        write_iteration_trace(File::create(&trace_path)?, &solution)?;
        info!(path = %trace_path.display(), "trace written");
    }
    write_final_assignment(
        File::create(&output)?,
        &params,
        &solution.store,
        solution.final_iteration,
    )?;
    info!(path = %output.display(), "assignment written");

    if !solution.converged {
        anyhow::bail!(
            "stopped at the iteration cap without converging ({} iterations)",
            solution.final_iteration
        );
    }
    Ok(())
}
