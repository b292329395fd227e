use anyhow::{Context as _, Result};
use clap::Parser;
use floodns::{BasicSimulation, RoutingKind, RunConfig, SimStats, Time};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Run the flow-level simulation of a run directory.
#[derive(Parser)]
#[command(version)]
struct Command {
    /// directory holding `config_floodns.properties`
    run_dir: PathBuf,

    /// simulate until this time instead of the configured one
    /// (e.g. `2ms 500us`, or bare nanoseconds)
    #[arg(long)]
    end_time: Option<Time>,

    /// seed of the routing instead of the configured one
    #[arg(long)]
    seed: Option<u64>,

    /// routing strategy instead of the configured one
    /// (`ecmp`, `ksp`, `valiant` or `void`)
    #[arg(long)]
    routing: Option<RoutingKind>,

    /// where to write the result logs, `<run_dir>/logs_floodns` by default
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// display a progress bar
    #[arg(long)]
    progress: bool,
}

fn main() -> Result<()> {
    let cmd = Command::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = RunConfig::load(&cmd.run_dir)
        .with_context(|| format!("cannot load the run directory {}", cmd.run_dir.display()))?;
    if let Some(end_time) = cmd.end_time {
        anyhow::ensure!(end_time > Time::ZERO, "the end time must be positive");
        config.end_time = end_time;
    }
    if let Some(seed) = cmd.seed {
        config.seed = seed;
    }
    if let Some(routing) = cmd.routing {
        config.routing = routing;
    }
    if let Some(log_dir) = cmd.log_dir {
        config.log_dir = log_dir;
    }

    let end_time = config.end_time;
    let mut simulation = BasicSimulation::new(config);

    let progress = cmd.progress.then(|| progress_bar(end_time));
    if let Some(pb) = progress.clone() {
        simulation = simulation.set_progress_observer(move |stats: &SimStats| {
            pb.set_position(stats.now.into_nanos());
            pb.set_message(format!(
                "{} active connections, {} flows",
                stats.active_connections, stats.active_flows
            ));
        });
    }

    let stats = simulation.run().context("simulation failed")?;

    if let Some(pb) = progress {
        pb.finish_with_message(format!(
            "{} connections finished",
            stats.finished_connections
        ));
    }

    Ok(())
}

fn progress_bar(end_time: Time) -> ProgressBar {
    let pb = ProgressBar::new(end_time.into_nanos());
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {percent:>3}% {msg}")
    {
        pb.set_style(style);
    }
    pb
}
