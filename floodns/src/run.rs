//! Assembly of the simulation of a run directory.

use crate::{
    config::{AllocatorKind, RoutingKind, RunConfig},
    file_sink::FileSink,
    glop::GlopSolver,
};
use floodns_core::{
    Aftermath, RoutingStrategy, SimError, SimStats, Simulator, Time,
    allocator::{
        AllocatorError, EpsilonSumMaxLpAllocator, GenericMmfAllocator, MinMaxLinkCapLpAllocator,
        SimpleMmfAllocator, UniformFixedAllocator,
    },
    log::LogError,
    routing::{EcmpRouting, KspRouting, RoutingError, ValiantRouting, VoidRouting},
    schedule::{Schedule, ScheduleError},
    topology::{Topology, TopologyError},
};
use rand_chacha::ChaChaRng;
use rand_core::{Rng as _, SeedableRng as _};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("cannot set up the routing")]
    Routing(#[from] RoutingError),
    #[error("cannot set up the allocator")]
    Allocator(#[from] AllocatorError),
    #[error("cannot create the result logs")]
    Log(#[from] LogError),
    #[error("simulation failed")]
    Simulation(#[from] SimError),
}

/// The standard simulation of a run directory: topology and schedule files,
/// one routing strategy and one allocator, results logged as CSV files.
///
/// Everything random descends from the configured seed, so two runs of the
/// same directory write the same logs.
pub struct BasicSimulation {
    config: RunConfig,
    progress_interval: Option<Time>,
    observer: Option<Box<dyn FnMut(&SimStats)>>,
}

impl BasicSimulation {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            progress_interval: None,
            observer: None,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Override the simulator's default progress interval.
    pub fn set_progress_interval(mut self, interval: Time) -> Self {
        self.progress_interval = Some(interval);
        self
    }

    pub fn set_progress_observer(mut self, observer: impl FnMut(&SimStats) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Load the inputs, run until the configured end time and flush the
    /// logs. Returns the statistics of the finished run.
    pub fn run(self) -> Result<SimStats, RunError> {
        let config = self.config;

        let topology = Topology::load(&config.topology_file)?;
        let schedule = Schedule::load(&config.schedule_file, topology.details(), config.end_time)?;

        let mut master = ChaChaRng::seed_from_u64(config.seed);
        let routing = routing(&config, &topology, ChaChaRng::seed_from_u64(master.next_u64()))?;
        let allocator = allocator(&config)?;
        let sink = FileSink::create(&config.log_dir)?;

        let mut builder = Simulator::builder().set_log_sink(sink);
        if let Some(interval) = self.progress_interval {
            builder = builder.set_progress_interval(interval);
        }
        if let Some(observer) = self.observer {
            builder = builder.set_progress_observer(observer);
        }

        let (network, _details) = topology.into_parts();
        let mut simulator = builder.build(network, allocator, routing)?;
        schedule.apply(simulator.context_mut())?;
        simulator.run(config.end_time)?;

        let stats = simulator.stats();
        tracing::info!(
            finished_connections = stats.finished_connections,
            unfinished_connections = stats.active_connections + stats.pending_connections,
            log_dir = %config.log_dir.display(),
            "run complete"
        );
        Ok(stats)
    }
}

impl std::fmt::Debug for BasicSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicSimulation")
            .field("config", &self.config)
            .field("progress_interval", &self.progress_interval)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

fn routing(
    config: &RunConfig,
    topology: &Topology,
    rng: ChaChaRng,
) -> Result<Box<dyn RoutingStrategy>, RoutingError> {
    Ok(match config.routing {
        RoutingKind::Ecmp => Box::new(EcmpRouting::new(topology, rng)),
        RoutingKind::Ksp => Box::new(KspRouting::new(topology, config.ksp_k, rng)?),
        RoutingKind::Valiant => Box::new(ValiantRouting::through_all_switches(topology, rng)?),
        RoutingKind::Void => Box::new(VoidRouting),
    })
}

fn allocator(config: &RunConfig) -> Result<Box<dyn Aftermath>, AllocatorError> {
    Ok(match config.allocator {
        AllocatorKind::SimpleMmf => Box::new(SimpleMmfAllocator::new()),
        AllocatorKind::GenericMmf => Box::new(GenericMmfAllocator::new()),
        AllocatorKind::UniformFixed => Box::new(UniformFixedAllocator::new(
            config.uniform_bandwidth.unwrap_or_default(),
        )?),
        AllocatorKind::EpsilonSumMaxLp => Box::new(EpsilonSumMaxLpAllocator::new(
            config.lp_epsilon.unwrap_or_default(),
            lp_solver(config),
        )?),
        AllocatorKind::MinMaxLinkCapLp => Box::new(MinMaxLinkCapLpAllocator::uniform(
            config.lp_demand.unwrap_or_default(),
            lp_solver(config),
        )?),
    })
}

fn lp_solver(config: &RunConfig) -> GlopSolver {
    let solver = GlopSolver::new(config.lp_solver_script.clone().unwrap_or_default());
    match &config.lp_solver_interpreter {
        Some(interpreter) => solver.with_interpreter(interpreter),
        None => solver,
    }
}
