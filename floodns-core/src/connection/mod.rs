use crate::{
    log::{ConnectionInfo, ConnectionLog, LogSink},
    sim_id::{ConnectionId, FlowId, NodeId},
    time::Time,
};
use std::collections::BTreeSet;

/// Lifecycle of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// created, waiting for its start event
    Pending,
    /// transmitting: it can own flows
    Active,
    /// drained, or terminated by a policy
    Finished,
}

/// An amount of data to move from a source to a destination node.
///
/// The remaining size only ever decreases: at every instant the kernel
/// removes `elapsed × total bandwidth` from it, the total bandwidth being
/// the sum of the bandwidth of the connection's active flows. The
/// connection is finished once the remaining size is within the flow
/// precision of zero.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    src: NodeId,
    dst: NodeId,
    total_size: f64,

    remainder: f64,
    /// policies can ask to be woken up once this much is left
    remainder_update_threshold: f64,

    status: ConnectionStatus,

    /// every flow the connection ever had, in creation order
    flows: Vec<FlowId>,
    active_flows: BTreeSet<FlowId>,
    total_bandwidth: f64,

    label: Option<String>,
    log: ConnectionLog,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        src: NodeId,
        dst: NodeId,
        total_size: f64,
        precision: f64,
    ) -> Self {
        Self {
            id,
            src,
            dst,
            total_size,
            remainder: total_size,
            remainder_update_threshold: total_size,
            status: ConnectionStatus::Pending,
            flows: Vec::new(),
            active_flows: BTreeSet::new(),
            total_bandwidth: 0.0,
            label: None,
            log: ConnectionLog::new(precision),
        }
    }

    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[inline]
    pub fn src(&self) -> NodeId {
        self.src
    }

    #[inline]
    pub fn dst(&self) -> NodeId {
        self.dst
    }

    #[inline]
    pub fn total_size(&self) -> f64 {
        self.total_size
    }

    #[inline]
    pub fn remainder(&self) -> f64 {
        self.remainder
    }

    #[inline]
    pub fn remainder_update_threshold(&self) -> f64 {
        self.remainder_update_threshold
    }

    #[inline]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == ConnectionStatus::Active
    }

    /// Sum of the bandwidth of the active flows.
    #[inline]
    pub fn total_bandwidth(&self) -> f64 {
        self.total_bandwidth
    }

    /// Every flow the connection ever had, in creation order.
    pub fn flows(&self) -> &[FlowId] {
        &self.flows
    }

    pub fn active_flows(&self) -> impl Iterator<Item = FlowId> + '_ {
        self.active_flows.iter().copied()
    }

    #[inline]
    pub fn num_active_flows(&self) -> usize {
        self.active_flows.len()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
    }

    pub fn log_mut(&mut self) -> &mut ConnectionLog {
        &mut self.log
    }

    /// Whether the remainder update threshold has been reached.
    pub fn is_remainder_update_threshold_passed(&self, precision: f64) -> bool {
        self.remainder_update_threshold <= precision
    }

    /// Time until the kernel must look at this connection again: the
    /// moment it drains, or the moment it reaches its remainder update
    /// threshold if that comes first. [`Time::MAX`] when it does not
    /// progress at all.
    ///
    /// ```
    /// # use floodns_core::{network::Network, NodeId, Time};
    /// let mut network = Network::new(2);
    /// let id = network
    ///     .create_connection(NodeId::new(0), NodeId::new(1), 100.0)
    ///     .unwrap();
    /// let connection = network.connection(id).unwrap();
    ///
    /// assert_eq!(connection.time_till_update_needed(1e-10), Time::MAX);
    /// ```
    pub fn time_till_update_needed(&self, precision: f64) -> Time {
        if self.total_bandwidth == 0.0 {
            return Time::MAX;
        }
        let target = if self.remainder_update_threshold > precision {
            self.remainder_update_threshold
        } else {
            self.remainder
        };
        // `as` saturates, large waits clamp to `Time::MAX`
        let wait = ((target - precision) / self.total_bandwidth).ceil() as u64;
        Time::new(wait.max(1))
    }

    pub(crate) fn set_remainder_update_threshold(&mut self, threshold: f64) {
        self.remainder_update_threshold = threshold;
    }

    pub(crate) fn activate(&mut self, precision: f64, now: Time, sink: &mut dyn LogSink) {
        self.status = ConnectionStatus::Active;
        self.log.activate(self.id, precision, now, sink);
    }

    pub(crate) fn add_flow(&mut self, flow: FlowId) {
        self.flows.push(flow);
        self.active_flows.insert(flow);
    }

    /// Forget `flow`, which was carrying `bandwidth`.
    pub(crate) fn remove_flow(&mut self, flow: FlowId, bandwidth: f64, now: Time, sink: &mut dyn LogSink) {
        self.active_flows.remove(&flow);
        self.adapt_bandwidth(-bandwidth, now, sink);
    }

    pub(crate) fn adapt_bandwidth(&mut self, delta: f64, now: Time, sink: &mut dyn LogSink) {
        self.total_bandwidth = (self.total_bandwidth + delta).max(0.0);
        self.log.bandwidth(self.id, now, self.total_bandwidth, sink);
    }

    /// Account for `elapsed` time at the current bandwidth. Returns
    /// whether the connection is now drained.
    pub(crate) fn progress(&mut self, elapsed: Time, precision: f64) -> bool {
        let transmitted = elapsed.as_f64() * self.total_bandwidth;
        self.remainder -= transmitted;
        self.remainder_update_threshold -= transmitted;
        self.remainder <= precision
    }

    /// Close the log and mark the connection finished. All flows must have
    /// been ended before.
    pub(crate) fn finish(&mut self, precision: f64, now: Time, sink: &mut dyn LogSink) {
        self.final_flush(precision, now, sink);
        self.status = ConnectionStatus::Finished;
    }

    pub(crate) fn final_flush(&mut self, precision: f64, now: Time, sink: &mut dyn LogSink) {
        self.log.finish(self.id, now, sink);
        if self.log.info_enabled() {
            let start = self.log.start();
            let transmitted = self.log.transmitted();
            sink.connection_info(&ConnectionInfo {
                id: self.id,
                src: self.src,
                dst: self.dst,
                total_size: self.total_size,
                transmitted,
                flows: self.flows.clone(),
                start,
                end: now,
                duration: now.saturating_sub(start),
                average_bandwidth: self.log.average(now),
                finished: self.total_size - transmitted <= precision,
                label: self.label.clone(),
            });
        }
    }
}
