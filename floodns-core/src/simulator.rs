use crate::{
    defaults::{DEFAULT_FLOW_PRECISION, DEFAULT_PROGRESS_INTERVAL},
    event::Action,
    log::{LogSink, VoidSink},
    network::Network,
    policy::{Aftermath, RoutingStrategy},
    sim_context::{SimContext, SimError},
    stats::SimStats,
    time::Time,
};
use std::time::Instant;

type ProgressObserver = Box<dyn FnMut(&SimStats)>;

/// Builder for a [`Simulator`].
///
/// ## Defaults
///
/// | Setting | Default |
/// |---------|---------|
/// | Flow precision | [`DEFAULT_FLOW_PRECISION`] |
/// | Progress interval | [`DEFAULT_PROGRESS_INTERVAL`] |
/// | Log sink | [`VoidSink`] |
/// | Progress observer | none |
///
/// ## Example
///
/// ```
/// use floodns_core::{
///     allocator::SimpleMmfAllocator, network::Network, routing::VoidRouting, SimulatorBuilder,
///     Time,
/// };
///
/// let simulator = SimulatorBuilder::new()
///     .set_flow_precision(1e-9)
///     .set_progress_interval(Time::new(1_000))
///     .build(Network::new(4), SimpleMmfAllocator::new(), VoidRouting)
///     .unwrap();
/// assert_eq!(simulator.context().precision(), 1e-9);
/// ```
pub struct SimulatorBuilder {
    precision: f64,
    progress_interval: Time,
    sink: Box<dyn LogSink>,
    observer: Option<ProgressObserver>,
}

impl SimulatorBuilder {
    pub fn new() -> Self {
        Self {
            precision: DEFAULT_FLOW_PRECISION,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            sink: Box::new(VoidSink),
            observer: None,
        }
    }

    /// Tolerance of every floating point comparison of the run.
    pub fn set_flow_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    /// Simulated time between two progress reports.
    pub fn set_progress_interval(mut self, interval: Time) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Where the result logs go.
    pub fn set_log_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Called with a snapshot of the simulation at every progress report.
    pub fn set_progress_observer(mut self, observer: impl FnMut(&SimStats) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Start the logs of `network` and return a simulator ready to
    /// [`run`](Simulator::run).
    pub fn build(
        self,
        network: Network,
        aftermath: impl Aftermath + 'static,
        routing: impl RoutingStrategy + 'static,
    ) -> Result<Simulator, SimError> {
        let ctx = SimContext::new(network, self.precision, self.sink)?;
        Ok(Simulator {
            ctx,
            aftermath: Box::new(aftermath),
            routing: Box::new(routing),
            progress_interval: self.progress_interval,
            observer: self.observer,
        })
    }
}

impl Default for SimulatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The discrete event simulation kernel.
///
/// The simulator pops the events of its [`SimContext`] in time order. For
/// every instant that has events it:
///
/// 1. moves the clock, accounting what every active connection transmitted
///    since the previous instant (drained connections finish);
/// 2. triggers all the events of the instant;
/// 3. calls the [`Aftermath`] once to settle the allocation;
/// 4. flushes the logs of the links removed meanwhile and checks that no
///    link is over capacity;
/// 5. schedules its own wake up at the next instant a connection drains or
///    reaches its remainder update threshold (or at the end of the run).
///
/// Events after the runtime are never triggered. Once the run is over the
/// logs of every entity are flushed and the sink is closed.
pub struct Simulator {
    ctx: SimContext,
    aftermath: Box<dyn Aftermath>,
    routing: Box<dyn RoutingStrategy>,

    progress_interval: Time,
    observer: Option<ProgressObserver>,
}

impl Simulator {
    pub fn builder() -> SimulatorBuilder {
        SimulatorBuilder::new()
    }

    #[inline]
    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    /// Prepare the run: create connections, insert events.
    #[inline]
    pub fn context_mut(&mut self) -> &mut SimContext {
        &mut self.ctx
    }

    #[inline]
    pub fn network(&self) -> &Network {
        self.ctx.network()
    }

    #[inline]
    pub fn stats(&self) -> SimStats {
        self.ctx.stats()
    }

    /// Run the simulation for `runtime` units of simulated time.
    ///
    /// A simulator runs once: calling `run` again fails with
    /// [`SimError::InvalidState`].
    pub fn run(&mut self, runtime: Time) -> Result<(), SimError> {
        self.ctx.begin(runtime)?;
        tracing::info!(%runtime, "running the simulation");

        let started = Instant::now();
        let mut next_progress = self.progress_interval;

        while let Some(time) = self.ctx.next_event_time() {
            if time > runtime {
                break;
            }

            self.ctx.advance_to(time);
            while let Some(event) = self.ctx.pop_due() {
                match event.action {
                    Action::StartConnection(connection) => {
                        self.ctx.activate_connection(connection)?;
                        self.routing.assign_start_flows(&mut self.ctx, connection)?;
                    }
                    Action::Interrupt => {}
                    Action::Custom(mut custom) => custom.trigger(&mut self.ctx)?,
                }
            }

            self.aftermath.perform(&mut self.ctx)?;
            self.ctx.settle()?;
            self.ctx.rearm_interrupt();

            let now = self.ctx.now();
            if now > next_progress {
                next_progress = next_progress.saturating_add(self.progress_interval);
                self.report_progress(started);
            }

            if now == runtime {
                break;
            }
        }

        tracing::info!(
            %runtime,
            wallclock_secs = started.elapsed().as_secs_f64(),
            "simulation finished"
        );

        let flush_started = Instant::now();
        tracing::info!("writing logs");
        self.ctx.finish(runtime)?;
        tracing::info!(
            wallclock_secs = flush_started.elapsed().as_secs_f64(),
            "logs flushed"
        );

        Ok(())
    }

    fn report_progress(&mut self, started: Instant) {
        let stats = self.ctx.stats();
        tracing::info!(
            progress = format_args!("{:5.2}%", stats.progress() * 100.0),
            now = %stats.now,
            wallclock_secs = started.elapsed().as_secs_f64(),
            active_connections = stats.active_connections,
            active_flows = stats.active_flows,
            "simulation progress"
        );
        if let Some(observer) = self.observer.as_mut() {
            observer(&stats);
        }
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("ctx", &self.ctx)
            .field("progress_interval", &self.progress_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        allocator::{SimpleMmfAllocator, VoidAllocator},
        connection::ConnectionStatus,
        log::{MemorySink, SharedSink},
        routing::VoidRouting,
        sim_context::SimState,
        sim_id::{ConnectionId, LinkId, NodeId},
    };
    use std::{cell::RefCell, rc::Rc};

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    /// Routes every connection over the first link between its endpoints.
    struct DirectRouting;

    impl RoutingStrategy for DirectRouting {
        fn assign_start_flows(
            &mut self,
            ctx: &mut SimContext,
            connection: ConnectionId,
        ) -> Result<(), SimError> {
            let (src, dst) = {
                let connection = ctx
                    .network()
                    .connection(connection)
                    .ok_or(crate::network::NetworkError::ConnectionNotFound { connection })?;
                (connection.src(), connection.dst())
            };
            let path = ctx.network().path_through(&[src, dst])?;
            ctx.add_flow_to_connection(connection, path)?;
            Ok(())
        }
    }

    /// 0 -> 1 of capacity 10
    fn single_link() -> Network {
        let mut network = Network::new(2);
        network.add_link(n(0), n(1), 10.0).unwrap();
        network
    }

    fn simulator(sink: &SharedSink<MemorySink>) -> Simulator {
        SimulatorBuilder::new()
            .set_log_sink(sink.clone())
            .build(single_link(), SimpleMmfAllocator::new(), DirectRouting)
            .unwrap()
    }

    // ------------------------------------------------------------------
    // life cycle
    // ------------------------------------------------------------------

    #[test]
    fn empty_run_reaches_runtime() {
        let sink = SharedSink::new(MemorySink::new());
        let mut simulator = simulator(&sink);
        simulator.run(Time::new(100)).unwrap();

        assert_eq!(simulator.context().now(), Time::new(100));
        assert_eq!(simulator.context().state(), SimState::Finished);
        let sink = sink.borrow();
        assert!(sink.closed);
        assert_eq!(sink.node_info.len(), 2);
        assert_eq!(sink.link_info.len(), 1);
    }

    #[test]
    fn run_only_once() {
        let mut simulator = SimulatorBuilder::new()
            .build(single_link(), VoidAllocator, VoidRouting)
            .unwrap();
        simulator.run(Time::new(10)).unwrap();
        assert!(matches!(
            simulator.run(Time::new(10)),
            Err(SimError::InvalidState { .. })
        ));
        assert!(simulator
            .context_mut()
            .insert_event(Time::new(20), |_: &mut SimContext| -> Result<(), SimError> {
                Ok(())
            })
            .is_err());
    }

    // ------------------------------------------------------------------
    // connections
    // ------------------------------------------------------------------

    #[test]
    fn single_connection_completes() {
        let sink = SharedSink::new(MemorySink::new());
        let mut simulator = simulator(&sink);
        let ctx = simulator.context_mut();
        let connection = ctx.create_connection(n(0), n(1), 100.0).unwrap();
        ctx.start_connection_at(connection, Time::new(5)).unwrap();

        simulator.run(Time::new(1_000)).unwrap();

        let network = simulator.network();
        assert_eq!(
            network.connection(connection).unwrap().status(),
            ConnectionStatus::Finished
        );
        let sink = sink.borrow();
        let info = sink.connection_info_of(connection).unwrap();
        assert!(info.finished);
        assert_eq!(info.start, Time::new(5));
        assert_eq!(info.end, Time::new(15));
        assert_eq!(info.average_bandwidth, 10.0);
        assert_eq!(sink.flow_info.len(), 1);
        assert_eq!(sink.flow_info[0].bandwidth_sum, 100.0);
    }

    #[test]
    fn unfinished_connection_is_flushed_at_the_end() {
        let sink = SharedSink::new(MemorySink::new());
        let mut simulator = simulator(&sink);
        let ctx = simulator.context_mut();
        let connection = ctx.create_connection(n(0), n(1), 1_000.0).unwrap();
        ctx.start_connection_at(connection, Time::ZERO).unwrap();

        simulator.run(Time::new(50)).unwrap();

        let sink = sink.borrow();
        let info = sink.connection_info_of(connection).unwrap();
        assert!(!info.finished);
        assert_eq!(info.transmitted, 500.0);
        assert_eq!(info.end, Time::new(50));
        assert_eq!(sink.flow_info.len(), 1);
        assert_eq!(sink.flow_info[0].end, Time::new(50));
    }

    #[test]
    fn events_after_runtime_never_trigger() {
        let triggered = Rc::new(RefCell::new(Vec::new()));
        let mut simulator = SimulatorBuilder::new()
            .build(single_link(), VoidAllocator, VoidRouting)
            .unwrap();
        for time in [0, 10, 20] {
            let triggered = Rc::clone(&triggered);
            simulator
                .context_mut()
                .insert_event(
                    Time::new(time),
                    move |ctx: &mut SimContext| -> Result<(), SimError> {
                        triggered.borrow_mut().push(ctx.now());
                        Ok(())
                    },
                )
                .unwrap();
        }

        simulator.run(Time::new(10)).unwrap();
        assert_eq!(*triggered.borrow(), vec![Time::ZERO, Time::new(10)]);
    }

    // ------------------------------------------------------------------
    // contract violations
    // ------------------------------------------------------------------

    struct Greedy;

    impl Aftermath for Greedy {
        fn perform(&mut self, ctx: &mut SimContext) -> Result<(), SimError> {
            let flows: Vec<_> = ctx.network().flow_ids().collect();
            for flow in flows {
                ctx.allocate_flow_bandwidth(flow, 11.0)?;
            }
            Ok(())
        }
    }

    #[test]
    fn over_allocation_is_fatal() {
        let mut simulator = SimulatorBuilder::new()
            .build(single_link(), Greedy, DirectRouting)
            .unwrap();
        let ctx = simulator.context_mut();
        let connection = ctx.create_connection(n(0), n(1), 100.0).unwrap();
        ctx.start_connection_at(connection, Time::ZERO).unwrap();

        assert!(matches!(
            simulator.run(Time::new(100)),
            Err(SimError::Network(
                crate::network::NetworkError::OverCapacity { .. }
            ))
        ));
    }

    #[test]
    fn link_removal_mid_run() {
        let sink = SharedSink::new(MemorySink::new());
        let mut simulator = simulator(&sink);
        let ctx = simulator.context_mut();
        let connection = ctx.create_connection(n(0), n(1), 1_000.0).unwrap();
        ctx.start_connection_at(connection, Time::ZERO).unwrap();
        ctx.insert_event(Time::new(20), |ctx: &mut SimContext| -> Result<(), SimError> {
            ctx.remove_existing_link(LinkId::ZERO)
        })
        .unwrap();

        simulator.run(Time::new(100)).unwrap();

        let sink = sink.borrow();
        let info = sink.connection_info_of(connection).unwrap();
        assert_eq!(info.transmitted, 200.0);
        assert!(!info.finished);
        assert_eq!(sink.link_info.len(), 1);
        assert_eq!(sink.link_info[0].end, Time::new(20));
        assert_eq!(sink.link_info[0].average_utilization, 1.0);
    }

    #[test]
    fn progress_observer_is_called() {
        let reports = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&reports);
        let mut simulator = SimulatorBuilder::new()
            .set_progress_interval(Time::new(10))
            .set_progress_observer(move |_| *counter.borrow_mut() += 1)
            .build(single_link(), SimpleMmfAllocator::new(), DirectRouting)
            .unwrap();
        let ctx = simulator.context_mut();
        let connection = ctx.create_connection(n(0), n(1), 1_000.0).unwrap();
        ctx.start_connection_at(connection, Time::ZERO).unwrap();

        simulator.run(Time::new(100)).unwrap();
        assert!(*reports.borrow() >= 1);
    }

    // ------------------------------------------------------------------
    // properties of full runs
    // ------------------------------------------------------------------

    const EPSILON: f64 = 1e-6;

    /// Runs an allocator and then checks the state it leaves behind: no
    /// link carries more than its capacity, and what a link reports as used
    /// is what its flows carry.
    struct Checked<A>(A);

    impl<A: Aftermath> Aftermath for Checked<A> {
        fn perform(&mut self, ctx: &mut SimContext) -> Result<(), SimError> {
            self.0.perform(ctx)?;
            let network = ctx.network();
            for link in network.links() {
                let carried: f64 = link
                    .active_flows()
                    .map(|flow| network.flow(flow).unwrap().bandwidth())
                    .sum();
                assert!(carried <= link.capacity() + EPSILON, "link {}", link.id());
                assert!((carried - link.used_capacity()).abs() < EPSILON, "link {}", link.id());
            }
            for flow in network.flows() {
                assert!(flow.bandwidth() >= 0.0, "flow {}", flow.id());
            }
            Ok(())
        }
    }

    /// Every server of a 4x2 leaf-spine (two servers per leaf) sends to
    /// every other one, the connections starting one after the other.
    fn all_to_all(seed: u64, aftermath: impl Aftermath + 'static) -> MemorySink {
        use crate::{routing::EcmpRouting, topology::testing::leaf_spine};
        use rand_chacha::ChaChaRng;
        use rand_core::SeedableRng as _;

        let topology = leaf_spine(4, 2, 2, 10.0);
        let routing = EcmpRouting::new(&topology, ChaChaRng::seed_from_u64(seed));
        let servers: Vec<NodeId> = topology.details().servers().iter().copied().collect();

        let sink = SharedSink::new(MemorySink::new());
        let mut simulator = SimulatorBuilder::new()
            .set_log_sink(sink.clone())
            .build(topology.into_parts().0, Checked(aftermath), routing)
            .unwrap();
        let ctx = simulator.context_mut();
        let mut index = 0;
        for &src in &servers {
            for &dst in &servers {
                if src == dst {
                    continue;
                }
                let connection = ctx
                    .create_connection(src, dst, 1_000.0 + 100.0 * index as f64)
                    .unwrap();
                ctx.start_connection_at(connection, Time::new(7 * index))
                    .unwrap();
                index += 1;
            }
        }

        simulator.run(Time::new(1_000_000)).unwrap();
        let records = sink.borrow().clone();
        records
    }

    #[test]
    fn same_seed_same_run() {
        assert_eq!(
            all_to_all(7, SimpleMmfAllocator::new()),
            all_to_all(7, SimpleMmfAllocator::new())
        );
    }

    #[test]
    fn every_connection_is_delivered() {
        let sink = all_to_all(42, SimpleMmfAllocator::new());
        assert_eq!(sink.connection_info.len(), 56);

        for info in &sink.connection_info {
            assert!(info.finished, "connection {}", info.id);
            assert!((info.transmitted - info.total_size).abs() < EPSILON);

            // what the flows carried is what the connection transmitted
            let carried: f64 = sink
                .flow_info
                .iter()
                .filter(|flow| info.flows.contains(&flow.id))
                .map(|flow| flow.bandwidth_sum)
                .sum();
            assert!(
                (carried - info.transmitted).abs() < EPSILON * info.total_size,
                "connection {}: {carried} carried, {} transmitted",
                info.id,
                info.transmitted
            );
        }
    }

    #[test]
    fn links_never_exceed_their_capacity() {
        let sink = all_to_all(3, crate::allocator::GenericMmfAllocator::new());
        for (link, interval) in &sink.link_utilization {
            assert!(interval.value <= 1.0 + EPSILON, "link {link}: {}", interval.value);
        }
        for info in &sink.link_info {
            assert!(info.average_utilization <= 1.0 + EPSILON);
        }
    }

    #[test]
    fn flow_paths_are_acyclic() {
        let sink = all_to_all(11, SimpleMmfAllocator::new());
        assert!(!sink.flow_info.is_empty());
        for flow in &sink.flow_info {
            let nodes: Vec<NodeId> = flow.path.nodes().collect();
            let mut unique = nodes.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), nodes.len(), "flow {}: {}", flow.id, flow.path);
            assert_eq!(nodes.first(), Some(&flow.src));
            assert_eq!(nodes.last(), Some(&flow.dst));
        }
    }
}
