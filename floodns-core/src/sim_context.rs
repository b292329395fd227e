use crate::{
    connection::{Connection, ConnectionStatus},
    event::{Action, Event, EventQueue, Scheduled},
    flow::Flow,
    graph::GraphError,
    link::Link,
    log::{LogError, LogSink},
    lp::LpError,
    network::{Network, NetworkError},
    node::Node,
    path::{AcyclicPath, PathError},
    sim_id::{ConnectionId, EventId, FlowId, LinkId, NodeId},
    stats::SimStats,
    time::Time,
};
use thiserror::Error;

/// Life cycle of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimState {
    /// built, events and connections can be prepared
    Setup,
    /// inside [`Simulator::run`](crate::Simulator::run)
    Running,
    /// the run is over and the logs are flushed
    Finished,
}

/// Fatal simulation error.
///
/// Nothing is retried: any error stops the run.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Log(#[from] LogError),
    #[error(transparent)]
    Lp(#[from] LpError),
    #[error("cannot {operation} while the simulation is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SimState,
    },
    #[error("flow precision must be finite and positive, got {precision}")]
    InvalidPrecision { precision: f64 },
    #[error("cannot insert an event at {time}, it is not in the future (now is {now})")]
    EventNotInFuture { time: Time, now: Time },
    #[error("event {event} is not pending")]
    EventNotPending { event: EventId },
    #[error("cannot cancel event {event} at {time}, it is not in the future (now is {now})")]
    EventNotCancellable { event: EventId, time: Time, now: Time },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Everything the policies and events can see and touch.
///
/// The context owns the [`Network`], the event queue, the clock and the
/// result [`LogSink`]. Read access to the network is unrestricted, but the
/// network is only changed through the operations below: they update the
/// bookkeeping and the logs right away, but never settle the allocation.
/// Settling (calling the allocation policy) is the simulator's job, once per
/// processed instant.
///
/// The mutating operations are only legal while the simulation is
/// running; connections and events can also be prepared during the setup.
pub struct SimContext {
    network: Network,
    queue: EventQueue,
    sink: Box<dyn LogSink>,

    precision: f64,
    state: SimState,
    now: Time,
    runtime: Option<Time>,

    /// the pending wake up of the simulator
    interrupt: Option<EventId>,
    events_processed: u64,
}

impl SimContext {
    pub(crate) fn new(
        mut network: Network,
        precision: f64,
        mut sink: Box<dyn LogSink>,
    ) -> Result<Self, SimError> {
        if !precision.is_finite() || precision <= 0.0 {
            return Err(SimError::InvalidPrecision { precision });
        }
        network.bind(precision, sink.as_mut());
        Ok(Self {
            network,
            queue: EventQueue::new(),
            sink,
            precision,
            state: SimState::Setup,
            now: Time::ZERO,
            runtime: None,
            interrupt: None,
            events_processed: 0,
        })
    }

    #[inline]
    pub fn now(&self) -> Time {
        self.now
    }

    /// Total runtime of the current run.
    #[inline]
    pub fn runtime(&self) -> Option<Time> {
        self.runtime
    }

    /// `now + delay`
    #[inline]
    pub fn time_from_now(&self, delay: Time) -> Time {
        self.now.saturating_add(delay)
    }

    #[inline]
    pub fn state(&self) -> SimState {
        self.state
    }

    #[inline]
    pub fn precision(&self) -> f64 {
        self.precision
    }

    #[inline]
    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn stats(&self) -> SimStats {
        let mut stats = SimStats {
            now: self.now,
            runtime: self.runtime,
            state: self.state,
            pending_connections: 0,
            active_connections: 0,
            finished_connections: 0,
            active_flows: self.network.num_active_flows(),
            links: self.network.num_links(),
            events_processed: self.events_processed,
            pending_events: self.queue.len(),
        };
        for connection in self.network.connections() {
            match connection.status() {
                ConnectionStatus::Pending => stats.pending_connections += 1,
                ConnectionStatus::Active => stats.active_connections += 1,
                ConnectionStatus::Finished => stats.finished_connections += 1,
            }
        }
        stats
    }

    fn require(&self, operation: &'static str, allowed: &[SimState]) -> Result<(), SimError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SimError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn require_running(&self, operation: &'static str) -> Result<(), SimError> {
        self.require(operation, &[SimState::Running])
    }

    // ------------------------------------------------------------------
    // labels and log settings
    // ------------------------------------------------------------------

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.network.node_mut(id)
    }

    pub fn link_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.network.link_mut(id)
    }

    pub fn flow_mut(&mut self, id: FlowId) -> Option<&mut Flow> {
        self.network.flow_mut(id)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.network.connection_mut(id)
    }

    // ------------------------------------------------------------------
    // events
    // ------------------------------------------------------------------

    /// Insert `event`, to be triggered at `time`.
    ///
    /// During the setup `time` may be zero; while running it must be
    /// strictly in the future.
    pub fn insert_event(
        &mut self,
        time: Time,
        event: impl Event + 'static,
    ) -> Result<EventId, SimError> {
        self.insert_event_with_priority(time, 0, event)
    }

    /// Events of the same time trigger by decreasing priority, then in
    /// insertion order.
    pub fn insert_event_with_priority(
        &mut self,
        time: Time,
        priority: i32,
        event: impl Event + 'static,
    ) -> Result<EventId, SimError> {
        self.schedule(time, priority, Action::Custom(Box::new(event)))
    }

    /// Schedule the start of a pending connection: at `time` it is
    /// activated and the routing strategy assigns its first flows.
    pub fn start_connection_at(
        &mut self,
        connection: ConnectionId,
        time: Time,
    ) -> Result<EventId, SimError> {
        if self.network.connection(connection).is_none() {
            return Err(NetworkError::ConnectionNotFound { connection }.into());
        }
        self.schedule(time, 0, Action::StartConnection(connection))
    }

    fn schedule(&mut self, time: Time, priority: i32, action: Action) -> Result<EventId, SimError> {
        self.require("insert an event", &[SimState::Setup, SimState::Running])?;
        if time < self.now || (time == self.now && self.state == SimState::Running) {
            return Err(SimError::EventNotInFuture {
                time,
                now: self.now,
            });
        }
        Ok(self.queue.push(time, priority, action))
    }

    /// Cancel a pending event so it never triggers.
    pub fn cancel_event(&mut self, event: EventId) -> Result<(), SimError> {
        self.require("cancel an event", &[SimState::Setup, SimState::Running])?;
        let time = self
            .queue
            .time_of(event)
            .ok_or(SimError::EventNotPending { event })?;
        if time < self.now || (time == self.now && self.state == SimState::Running) {
            return Err(SimError::EventNotCancellable {
                event,
                time,
                now: self.now,
            });
        }
        self.queue.cancel(event);
        Ok(())
    }

    pub fn is_event_pending(&self, event: EventId) -> bool {
        self.queue.time_of(event).is_some()
    }

    // ------------------------------------------------------------------
    // connections
    // ------------------------------------------------------------------

    /// Create a pending connection. It does nothing until activated, see
    /// [`SimContext::start_connection_at`].
    pub fn create_connection(
        &mut self,
        src: NodeId,
        dst: NodeId,
        size: f64,
    ) -> Result<ConnectionId, SimError> {
        self.require("create a connection", &[SimState::Setup, SimState::Running])?;
        Ok(self.network.create_connection(src, dst, size)?)
    }

    pub fn activate_connection(&mut self, connection: ConnectionId) -> Result<(), SimError> {
        self.require_running("activate a connection")?;
        self.network
            .activate_connection(connection, self.now, self.sink.as_mut())?;
        tracing::trace!(%connection, now = %self.now, "connection activated");
        Ok(())
    }

    /// End every flow of an active connection and mark it finished, even
    /// though it did not drain.
    pub fn terminate_connection(&mut self, connection: ConnectionId) -> Result<(), SimError> {
        self.require_running("terminate a connection")?;
        self.network
            .terminate_connection(connection, self.now, self.sink.as_mut())?;
        tracing::trace!(%connection, now = %self.now, "connection terminated");
        Ok(())
    }

    /// Ask to be woken up once the connection has `threshold` left to
    /// transmit.
    pub fn set_remainder_update_threshold(
        &mut self,
        connection: ConnectionId,
        threshold: f64,
    ) -> Result<(), SimError> {
        Ok(self
            .network
            .set_remainder_update_threshold(connection, threshold)?)
    }

    // ------------------------------------------------------------------
    // flows
    // ------------------------------------------------------------------

    /// Start a new flow of an active connection along `path`, which must
    /// go from the connection's source to its destination over present
    /// links. The flow starts with a bandwidth of zero.
    pub fn add_flow_to_connection(
        &mut self,
        connection: ConnectionId,
        path: AcyclicPath,
    ) -> Result<FlowId, SimError> {
        self.require_running("add a flow")?;
        Ok(self
            .network
            .start_flow(connection, path, self.now, self.sink.as_mut())?)
    }

    pub fn end_flow(&mut self, flow: FlowId) -> Result<(), SimError> {
        self.require_running("end a flow")?;
        Ok(self.network.end_flow(flow, self.now, self.sink.as_mut())?)
    }

    pub fn allocate_flow_bandwidth(&mut self, flow: FlowId, bandwidth: f64) -> Result<(), SimError> {
        self.require_running("allocate bandwidth")?;
        Ok(self
            .network
            .allocate(flow, bandwidth, self.now, self.sink.as_mut())?)
    }

    /// Whether [`SimContext::allocate_flow_bandwidth`] would accept the
    /// allocation.
    pub fn can_allocate_flow_bandwidth(&self, flow: FlowId, bandwidth: f64) -> bool {
        self.network.can_allocate(flow, bandwidth)
    }

    // ------------------------------------------------------------------
    // links
    // ------------------------------------------------------------------

    pub fn add_new_link(&mut self, from: NodeId, to: NodeId, capacity: f64) -> Result<LinkId, SimError> {
        self.require_running("add a link")?;
        let link = self
            .network
            .add_link_logged(from, to, capacity, self.now, self.sink.as_mut())?;
        tracing::trace!(%link, %from, %to, capacity, "link added");
        Ok(link)
    }

    /// Remove a link, ending the flows crossing it.
    pub fn remove_existing_link(&mut self, link: LinkId) -> Result<(), SimError> {
        self.require_running("remove a link")?;
        self.network
            .remove_link(link, self.now, self.sink.as_mut())?;
        tracing::trace!(%link, "link removed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // run loop plumbing
    // ------------------------------------------------------------------

    pub(crate) fn begin(&mut self, runtime: Time) -> Result<(), SimError> {
        self.require("run", &[SimState::Setup])?;
        self.state = SimState::Running;
        self.runtime = Some(runtime);
        Ok(())
    }

    pub(crate) fn next_event_time(&mut self) -> Option<Time> {
        self.queue.peek_time()
    }

    /// Move the clock to `time`, accounting what the active connections
    /// transmitted meanwhile.
    pub(crate) fn advance_to(&mut self, time: Time) {
        let elapsed = time.saturating_sub(self.now);
        self.now = time;
        if elapsed > Time::ZERO {
            let drained = self
                .network
                .progress(elapsed, time, self.sink.as_mut());
            for connection in drained {
                tracing::trace!(%connection, now = %time, "connection finished");
            }
        }
    }

    pub(crate) fn pop_due(&mut self) -> Option<Scheduled> {
        let event = self.queue.pop_at(self.now)?;
        self.events_processed += 1;
        Some(event)
    }

    /// Apply what the allocation policy left behind and check the result.
    pub(crate) fn settle(&mut self) -> Result<(), SimError> {
        self.network
            .flush_retired_links(self.now, self.sink.as_mut());
        self.network.validate_allocation()?;
        if let Some(error) = self.sink.take_error() {
            return Err(error.into());
        }
        Ok(())
    }

    /// Replace the pending wake up by one at the next instant a connection
    /// needs attention, or at the end of the run.
    pub(crate) fn rearm_interrupt(&mut self) {
        let runtime = self.runtime.unwrap_or(self.now);
        if self.now == runtime {
            return;
        }
        if let Some(previous) = self.interrupt.take() {
            self.queue.cancel(previous);
        }
        let wait = runtime
            .saturating_sub(self.now)
            .min(self.network.time_till_update_needed());
        let at = self.now.saturating_add(wait);
        self.interrupt = Some(self.queue.push(at, 0, Action::Interrupt));
    }

    /// Stop the clock at `runtime`, flush every log and close the sink.
    pub(crate) fn finish(&mut self, runtime: Time) -> Result<(), SimError> {
        self.now = runtime;
        self.network.finish(runtime, self.sink.as_mut());
        let closed = self.sink.close();
        self.state = SimState::Finished;
        if let Some(error) = self.sink.take_error() {
            return Err(error.into());
        }
        Ok(closed?)
    }
}

impl std::fmt::Debug for SimContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimContext")
            .field("state", &self.state)
            .field("now", &self.now)
            .field("runtime", &self.runtime)
            .field("precision", &self.precision)
            .field("pending_events", &self.queue.len())
            .finish_non_exhaustive()
    }
}
