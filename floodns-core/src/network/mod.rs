use crate::{
    connection::{Connection, ConnectionStatus},
    defaults::DEFAULT_FLOW_PRECISION,
    flow::Flow,
    link::Link,
    log::LogSink,
    node::Node,
    path::{AcyclicPath, Hop, PathError},
    sim_id::{ConnectionId, FlowId, LinkId, NodeId},
    time::Time,
};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Violation of the network's bookkeeping rules.
///
/// All of them are fatal when raised by a policy during a run.
#[derive(Debug, Error, PartialEq)]
pub enum NetworkError {
    #[error("node {node} is out of range, the network has {num_nodes} nodes")]
    NodeOutOfRange { node: NodeId, num_nodes: usize },
    #[error("a link cannot start and end at node {node}")]
    SelfLoop { node: NodeId },
    #[error("link capacity must be finite and non-negative, got {capacity}")]
    InvalidCapacity { capacity: f64 },
    #[error("link {link} is not present")]
    LinkNotFound { link: LinkId },
    #[error("hop {from}->{to} does not match link {link}")]
    HopMismatch {
        link: LinkId,
        from: NodeId,
        to: NodeId,
    },
    #[error("flow {flow} is not active")]
    FlowNotActive { flow: FlowId },
    #[error("connection {connection} does not exist")]
    ConnectionNotFound { connection: ConnectionId },
    #[error("connection {connection} is {status:?}, expected {expected:?}")]
    ConnectionStatus {
        connection: ConnectionId,
        status: ConnectionStatus,
        expected: ConnectionStatus,
    },
    #[error("a connection cannot start and end at node {node}")]
    SameEndpoints { node: NodeId },
    #[error("connection size must be finite and above the flow precision, got {size}")]
    InvalidSize { size: f64 },
    #[error(
        "path {src}->{dst} does not join the endpoints of connection {connection} ({expected_src}->{expected_dst})"
    )]
    PathEndpoints {
        connection: ConnectionId,
        src: NodeId,
        dst: NodeId,
        expected_src: NodeId,
        expected_dst: NodeId,
    },
    #[error("cannot allocate bandwidth {bandwidth} to flow {flow}")]
    InvalidBandwidth { flow: FlowId, bandwidth: f64 },
    #[error(
        "allocating {bandwidth} to flow {flow} exceeds the capacity available on link {link} ({available})"
    )]
    OverCapacity {
        flow: FlowId,
        link: LinkId,
        bandwidth: f64,
        available: f64,
    },
    #[error("link {link} carries {used} over its capacity of {capacity}")]
    CapacityExceeded {
        link: LinkId,
        used: f64,
        capacity: f64,
    },
    #[error(
        "remainder update threshold {threshold} is above the remainder {remainder} of connection {connection}"
    )]
    InvalidThreshold {
        connection: ConnectionId,
        threshold: f64,
        remainder: f64,
    },
}

/// The state model mutated by the simulation.
///
/// The network owns every entity of the simulation: the nodes (fixed,
/// numbered `0..num_nodes`), the present links, the active flows and all
/// the connections. It keeps the indexes the policies need: which flows
/// cross a link or a node, which links join a pair of nodes, which links
/// carry at least one flow.
///
/// A network is built before the simulation with [`Network::add_link`]
/// (or loaded from a [`Topology`]). Once handed to a [`Simulator`], it is
/// only changed through the mutation surface of the [`SimContext`].
///
/// All collections are ordered by identifier so that iterating them is
/// deterministic.
///
/// ```
/// # use floodns_core::{network::Network, NodeId};
/// let mut network = Network::new(3);
/// let a = network.add_link(NodeId::new(0), NodeId::new(1), 10.0).unwrap();
/// let b = network.add_link(NodeId::new(1), NodeId::new(2), 10.0).unwrap();
///
/// let path = network
///     .path_through(&[NodeId::new(0), NodeId::new(1), NodeId::new(2)])
///     .unwrap();
/// assert_eq!(path.links().collect::<Vec<_>>(), vec![a, b]);
/// ```
///
/// [`Topology`]: crate::topology::Topology
/// [`Simulator`]: crate::Simulator
/// [`SimContext`]: crate::SimContext
#[derive(Debug, Clone)]
pub struct Network {
    precision: f64,

    nodes: Vec<Node>,

    links: BTreeMap<LinkId, Link>,
    pairs: BTreeMap<(NodeId, NodeId), Vec<LinkId>>,
    /// removed links, their final log flush is pending
    retired: Vec<Link>,
    next_link: LinkId,

    flows: BTreeMap<FlowId, Flow>,
    flow_active_links: BTreeSet<LinkId>,
    next_flow: FlowId,

    connections: BTreeMap<ConnectionId, Connection>,
    active_connections: BTreeSet<ConnectionId>,
    next_connection: ConnectionId,

    /// whether the logs of the nodes and links were started
    logging: bool,
}

impl Network {
    pub fn new(num_nodes: usize) -> Self {
        let precision = DEFAULT_FLOW_PRECISION;
        Self {
            precision,
            nodes: (0..num_nodes as u64)
                .map(|id| Node::new(NodeId::new(id), precision))
                .collect(),
            links: BTreeMap::new(),
            pairs: BTreeMap::new(),
            retired: Vec::new(),
            next_link: LinkId::ZERO,
            flows: BTreeMap::new(),
            flow_active_links: BTreeSet::new(),
            next_flow: FlowId::ZERO,
            connections: BTreeMap::new(),
            active_connections: BTreeSet::new(),
            next_connection: ConnectionId::ZERO,
            logging: false,
        }
    }

    #[inline]
    pub fn precision(&self) -> f64 {
        self.precision
    }

    // ------------------------------------------------------------------
    // nodes
    // ------------------------------------------------------------------

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    fn check_node(&self, node: NodeId) -> Result<(), NetworkError> {
        if node.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(NetworkError::NodeOutOfRange {
                node,
                num_nodes: self.nodes.len(),
            })
        }
    }

    // ------------------------------------------------------------------
    // links
    // ------------------------------------------------------------------

    /// Add a directed link of the given capacity.
    ///
    /// This is how a network is built before a simulation; during a run
    /// links are added with [`SimContext::add_new_link`].
    ///
    /// [`SimContext::add_new_link`]: crate::SimContext::add_new_link
    pub fn add_link(&mut self, from: NodeId, to: NodeId, capacity: f64) -> Result<LinkId, NetworkError> {
        self.check_node(from)?;
        self.check_node(to)?;
        if from == to {
            return Err(NetworkError::SelfLoop { node: from });
        }
        if !capacity.is_finite() || capacity < 0.0 {
            return Err(NetworkError::InvalidCapacity { capacity });
        }

        let id = self.next_link;
        self.next_link = id.next();

        self.nodes[from.index()].attach_outgoing(id);
        self.nodes[to.index()].attach_incoming(id);
        self.pairs.entry((from, to)).or_default().push(id);
        self.links
            .insert(id, Link::new(id, from, to, capacity, self.precision));

        Ok(id)
    }

    pub(crate) fn add_link_logged(
        &mut self,
        from: NodeId,
        to: NodeId,
        capacity: f64,
        now: Time,
        sink: &mut dyn LogSink,
    ) -> Result<LinkId, NetworkError> {
        let id = self.add_link(from, to, capacity)?;
        if self.logging {
            if let Some(link) = self.links.get_mut(&id) {
                link.start_log(self.precision, now, sink);
            }
        }
        Ok(id)
    }

    /// Present links, in ascending identifier order.
    pub fn links(&self) -> impl Iterator<Item = &Link> + '_ {
        self.links.values()
    }

    #[inline]
    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    pub fn link_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(&id)
    }

    /// Present links from `from` to `to`, in creation order.
    pub fn links_between(&self, from: NodeId, to: NodeId) -> &[LinkId] {
        self.pairs.get(&(from, to)).map_or(&[], Vec::as_slice)
    }

    pub fn has_link_between(&self, from: NodeId, to: NodeId) -> bool {
        self.pairs.contains_key(&(from, to))
    }

    /// Links carrying at least one active flow.
    pub fn flow_active_links(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.flow_active_links.iter().copied()
    }

    /// The path through the given nodes, taking the first present link
    /// between each consecutive pair.
    pub fn path_through(&self, nodes: &[NodeId]) -> Result<AcyclicPath, PathError> {
        let hops = nodes
            .windows(2)
            .map(|pair| {
                let (from, to) = (pair[0], pair[1]);
                self.links_between(from, to)
                    .first()
                    .map(|&link| Hop { link, from, to })
                    .ok_or(PathError::NoLink { from, to })
            })
            .collect::<Result<Vec<_>, _>>()?;
        AcyclicPath::new(hops)
    }

    /// Hop along `link`.
    pub fn hop(&self, link: LinkId) -> Option<Hop> {
        self.links.get(&link).map(|l| Hop {
            link,
            from: l.from(),
            to: l.to(),
        })
    }

    /// Remove a present link, ending every flow crossing it.
    ///
    /// The final flush of the link's logs is postponed until
    /// [`Network::flush_retired_links`].
    pub(crate) fn remove_link(
        &mut self,
        id: LinkId,
        now: Time,
        sink: &mut dyn LogSink,
    ) -> Result<(), NetworkError> {
        let mut link = self
            .links
            .remove(&id)
            .ok_or(NetworkError::LinkNotFound { link: id })?;

        self.nodes[link.from().index()].detach_link(id);
        self.nodes[link.to().index()].detach_link(id);
        let pair = (link.from(), link.to());
        if let Some(between) = self.pairs.get_mut(&pair) {
            between.retain(|&l| l != id);
            if between.is_empty() {
                self.pairs.remove(&pair);
            }
        }
        self.flow_active_links.remove(&id);

        let crossing: Vec<FlowId> = link.active_flows().collect();
        for flow_id in crossing {
            if let Some(flow) = self.flows.remove(&flow_id) {
                link.remove_flow(flow_id, flow.bandwidth(), now, sink);
                self.detach_flow(flow, now, sink);
            }
        }

        self.retired.push(link);
        Ok(())
    }

    pub(crate) fn flush_retired_links(&mut self, now: Time, sink: &mut dyn LogSink) {
        for mut link in self.retired.drain(..) {
            link.final_flush(now, sink);
        }
    }

    // ------------------------------------------------------------------
    // connections
    // ------------------------------------------------------------------

    /// Create a pending connection of `size` between `src` and `dst`.
    pub fn create_connection(
        &mut self,
        src: NodeId,
        dst: NodeId,
        size: f64,
    ) -> Result<ConnectionId, NetworkError> {
        self.check_node(src)?;
        self.check_node(dst)?;
        if src == dst {
            return Err(NetworkError::SameEndpoints { node: src });
        }
        if !size.is_finite() || size <= self.precision {
            return Err(NetworkError::InvalidSize { size });
        }

        let id = self.next_connection;
        self.next_connection = id.next();
        self.connections
            .insert(id, Connection::new(id, src, dst, size, self.precision));
        Ok(id)
    }

    /// All connections, whatever their status, in ascending identifier
    /// order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.connections.values()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn active_connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.active_connections.iter().copied()
    }

    #[inline]
    pub fn num_active_connections(&self) -> usize {
        self.active_connections.len()
    }

    fn connection_with_status(
        &mut self,
        id: ConnectionId,
        expected: ConnectionStatus,
    ) -> Result<&mut Connection, NetworkError> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(NetworkError::ConnectionNotFound { connection: id })?;
        if connection.status() != expected {
            return Err(NetworkError::ConnectionStatus {
                connection: id,
                status: connection.status(),
                expected,
            });
        }
        Ok(connection)
    }

    pub(crate) fn activate_connection(
        &mut self,
        id: ConnectionId,
        now: Time,
        sink: &mut dyn LogSink,
    ) -> Result<(), NetworkError> {
        let precision = self.precision;
        self.connection_with_status(id, ConnectionStatus::Pending)?
            .activate(precision, now, sink);
        self.active_connections.insert(id);
        Ok(())
    }

    pub(crate) fn terminate_connection(
        &mut self,
        id: ConnectionId,
        now: Time,
        sink: &mut dyn LogSink,
    ) -> Result<(), NetworkError> {
        self.connection_with_status(id, ConnectionStatus::Active)?;
        self.end_connection(id, now, sink);
        Ok(())
    }

    pub(crate) fn set_remainder_update_threshold(
        &mut self,
        id: ConnectionId,
        threshold: f64,
    ) -> Result<(), NetworkError> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(NetworkError::ConnectionNotFound { connection: id })?;
        if threshold > connection.remainder() {
            return Err(NetworkError::InvalidThreshold {
                connection: id,
                threshold,
                remainder: connection.remainder(),
            });
        }
        connection.set_remainder_update_threshold(threshold);
        Ok(())
    }

    /// End all the flows of an active connection, flush its logs and mark
    /// it finished.
    fn end_connection(&mut self, id: ConnectionId, now: Time, sink: &mut dyn LogSink) {
        let Some(connection) = self.connections.get(&id) else {
            return;
        };
        let active: Vec<FlowId> = connection.active_flows().collect();
        for flow_id in active {
            if let Some(flow) = self.flows.remove(&flow_id) {
                self.detach_flow(flow, now, sink);
            }
        }
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.finish(self.precision, now, sink);
        }
        self.active_connections.remove(&id);
    }

    /// Advance every active connection by `elapsed` at its current
    /// bandwidth. Drained connections are finished; their identifiers are
    /// returned.
    pub(crate) fn progress(
        &mut self,
        elapsed: Time,
        now: Time,
        sink: &mut dyn LogSink,
    ) -> Vec<ConnectionId> {
        let precision = self.precision;
        let drained: Vec<ConnectionId> = self
            .active_connections
            .iter()
            .copied()
            .filter(|id| {
                self.connections
                    .get_mut(id)
                    .is_some_and(|connection| connection.progress(elapsed, precision))
            })
            .collect();

        for &id in &drained {
            self.end_connection(id, now, sink);
        }
        drained
    }

    /// The earliest time any active connection needs attention again.
    pub fn time_till_update_needed(&self) -> Time {
        self.active_connections
            .iter()
            .filter_map(|id| self.connections.get(id))
            .map(|connection| connection.time_till_update_needed(self.precision))
            .min()
            .unwrap_or(Time::MAX)
    }

    // ------------------------------------------------------------------
    // flows
    // ------------------------------------------------------------------

    /// Active flows, in ascending identifier order.
    pub fn flows(&self) -> impl Iterator<Item = &Flow> + '_ {
        self.flows.values()
    }

    pub fn flow_ids(&self) -> impl Iterator<Item = FlowId> + '_ {
        self.flows.keys().copied()
    }

    #[inline]
    pub fn num_active_flows(&self) -> usize {
        self.flows.len()
    }

    pub fn flow(&self, id: FlowId) -> Option<&Flow> {
        self.flows.get(&id)
    }

    pub fn flow_mut(&mut self, id: FlowId) -> Option<&mut Flow> {
        self.flows.get_mut(&id)
    }

    pub fn is_flow_active(&self, id: FlowId) -> bool {
        self.flows.contains_key(&id)
    }

    pub(crate) fn start_flow(
        &mut self,
        connection_id: ConnectionId,
        path: AcyclicPath,
        now: Time,
        sink: &mut dyn LogSink,
    ) -> Result<FlowId, NetworkError> {
        let connection = self.connection_with_status(connection_id, ConnectionStatus::Active)?;
        if path.src() != connection.src() || path.dst() != connection.dst() {
            return Err(NetworkError::PathEndpoints {
                connection: connection_id,
                src: path.src(),
                dst: path.dst(),
                expected_src: connection.src(),
                expected_dst: connection.dst(),
            });
        }
        for hop in path.hops() {
            let link = self
                .links
                .get(&hop.link)
                .ok_or(NetworkError::LinkNotFound { link: hop.link })?;
            if link.from() != hop.from || link.to() != hop.to {
                return Err(NetworkError::HopMismatch {
                    link: hop.link,
                    from: hop.from,
                    to: hop.to,
                });
            }
        }

        let id = self.next_flow;
        self.next_flow = id.next();

        self.nodes[path.src().index()].add_flow(id, now, sink);
        for hop in path.hops() {
            self.nodes[hop.to.index()].add_flow(id, now, sink);
            if let Some(link) = self.links.get_mut(&hop.link) {
                link.add_flow(id, now, sink);
            }
            self.flow_active_links.insert(hop.link);
        }
        if let Some(connection) = self.connections.get_mut(&connection_id) {
            connection.add_flow(id);
        }

        let flow = Flow::new(id, connection_id, path, self.precision, now, sink);
        self.flows.insert(id, flow);
        Ok(id)
    }

    pub(crate) fn end_flow(
        &mut self,
        id: FlowId,
        now: Time,
        sink: &mut dyn LogSink,
    ) -> Result<(), NetworkError> {
        let flow = self
            .flows
            .remove(&id)
            .ok_or(NetworkError::FlowNotActive { flow: id })?;
        self.detach_flow(flow, now, sink);
        Ok(())
    }

    /// Release everything `flow` holds (already taken out of the active
    /// flows) and flush its logs.
    fn detach_flow(&mut self, mut flow: Flow, now: Time, sink: &mut dyn LogSink) {
        let id = flow.id();
        let bandwidth = flow.bandwidth();

        if let Some(connection) = self.connections.get_mut(&flow.connection()) {
            connection.remove_flow(id, bandwidth, now, sink);
        }

        self.nodes[flow.src().index()].remove_flow(id, now, sink);
        for hop in flow.path().hops() {
            self.nodes[hop.to.index()].remove_flow(id, now, sink);
            if let Some(link) = self.links.get_mut(&hop.link) {
                link.remove_flow(id, bandwidth, now, sink);
                if link.num_active_flows() == 0 {
                    self.flow_active_links.remove(&hop.link);
                }
            }
        }

        flow.final_flush(now, sink);
    }

    /// Whether `flow` could be given `bandwidth` without exceeding the
    /// capacity of any link of its path.
    pub fn can_allocate(&self, flow: FlowId, bandwidth: f64) -> bool {
        let Some(flow) = self.flows.get(&flow) else {
            return false;
        };
        bandwidth >= 0.0
            && flow.path().links().all(|link| {
                self.links
                    .get(&link)
                    .is_some_and(|l| l.fits(flow.bandwidth(), bandwidth, self.precision))
            })
    }

    pub(crate) fn allocate(
        &mut self,
        id: FlowId,
        bandwidth: f64,
        now: Time,
        sink: &mut dyn LogSink,
    ) -> Result<(), NetworkError> {
        let precision = self.precision;
        let Self {
            flows,
            links,
            connections,
            ..
        } = self;

        let flow = flows
            .get_mut(&id)
            .ok_or(NetworkError::FlowNotActive { flow: id })?;

        let bandwidth = if bandwidth < 0.0 && bandwidth > -precision {
            0.0
        } else {
            bandwidth
        };
        if !bandwidth.is_finite() || bandwidth < 0.0 {
            return Err(NetworkError::InvalidBandwidth { flow: id, bandwidth });
        }

        let current = flow.bandwidth();
        for link_id in flow.path().links() {
            let link = links
                .get(&link_id)
                .ok_or(NetworkError::LinkNotFound { link: link_id })?;
            if !link.fits(current, bandwidth, precision) {
                return Err(NetworkError::OverCapacity {
                    flow: id,
                    link: link_id,
                    bandwidth,
                    available: link.remaining_capacity() + current,
                });
            }
        }

        let old = flow.set_bandwidth(bandwidth, now, sink);
        for link_id in flow.path().links() {
            if let Some(link) = links.get_mut(&link_id) {
                link.reserve(old, bandwidth, now, sink);
            }
        }
        if let Some(connection) = connections.get_mut(&flow.connection()) {
            connection.adapt_bandwidth(bandwidth - old, now, sink);
        }
        Ok(())
    }

    /// Check that no link carries more than its capacity.
    pub(crate) fn validate_allocation(&self) -> Result<(), NetworkError> {
        for &id in &self.flow_active_links {
            if let Some(link) = self.links.get(&id) {
                let used: f64 = link
                    .active_flows()
                    .filter_map(|flow| self.flows.get(&flow))
                    .map(Flow::bandwidth)
                    .sum();
                if used - link.capacity() >= self.precision {
                    return Err(NetworkError::CapacityExceeded {
                        link: id,
                        used,
                        capacity: link.capacity(),
                    });
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // logging life cycle
    // ------------------------------------------------------------------

    /// Adopt the simulator's flow precision and start the logs of the
    /// nodes and links present at the start of the run.
    pub(crate) fn bind(&mut self, precision: f64, sink: &mut dyn LogSink) {
        self.precision = precision;
        for node in &mut self.nodes {
            node.start_log(precision, Time::ZERO, sink);
        }
        for link in self.links.values_mut() {
            link.start_log(precision, Time::ZERO, sink);
        }
        self.logging = true;
    }

    /// Final flush at the end of a run: nodes, then present links, then
    /// the active connections, and finally every flow still active is
    /// detached and flushed.
    pub(crate) fn finish(&mut self, now: Time, sink: &mut dyn LogSink) {
        self.flush_retired_links(now, sink);

        for node in &mut self.nodes {
            node.final_flush(now, sink);
        }
        tracing::debug!("node logs flushed");

        for link in self.links.values_mut() {
            link.final_flush(now, sink);
        }
        tracing::debug!("link logs flushed");

        for id in &self.active_connections {
            if let Some(connection) = self.connections.get_mut(id) {
                connection.final_flush(self.precision, now, sink);
            }
        }
        tracing::debug!("connection logs flushed");

        let remaining = std::mem::take(&mut self.flows);
        for flow in remaining.into_values() {
            self.detach_flow(flow, now, sink);
        }
        tracing::debug!("flow logs flushed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{MemorySink, VoidSink};

    const PRECISION: f64 = 1e-10;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    /// 0 -> 1 -> 2 with capacity 10, logs started
    fn line() -> Network {
        let mut network = Network::new(3);
        network.add_link(n(0), n(1), 10.0).unwrap();
        network.add_link(n(1), n(2), 10.0).unwrap();
        network.bind(PRECISION, &mut VoidSink);
        network
    }

    fn active_connection(network: &mut Network, src: u64, dst: u64) -> ConnectionId {
        let id = network.create_connection(n(src), n(dst), 1_000.0).unwrap();
        network
            .activate_connection(id, Time::ZERO, &mut VoidSink)
            .unwrap();
        id
    }

    fn flow(network: &mut Network, connection: ConnectionId, nodes: &[u64]) -> FlowId {
        let nodes: Vec<NodeId> = nodes.iter().copied().map(n).collect();
        let path = network.path_through(&nodes).unwrap();
        network
            .start_flow(connection, path, Time::ZERO, &mut VoidSink)
            .unwrap()
    }

    // ------------------------------------------------------------------
    // links
    // ------------------------------------------------------------------

    #[test]
    fn add_link_validation() {
        let mut network = Network::new(2);
        assert_eq!(
            network.add_link(n(0), n(2), 1.0),
            Err(NetworkError::NodeOutOfRange {
                node: n(2),
                num_nodes: 2
            })
        );
        assert_eq!(
            network.add_link(n(1), n(1), 1.0),
            Err(NetworkError::SelfLoop { node: n(1) })
        );
        assert!(network.add_link(n(0), n(1), -1.0).is_err());
        assert!(network.add_link(n(0), n(1), f64::INFINITY).is_err());
        assert!(network.add_link(n(0), n(1), 0.0).is_ok());
    }

    #[test]
    fn parallel_links_are_indexed_in_order() {
        let mut network = Network::new(2);
        let a = network.add_link(n(0), n(1), 1.0).unwrap();
        let b = network.add_link(n(0), n(1), 2.0).unwrap();
        assert_eq!(network.links_between(n(0), n(1)), &[a, b]);
        assert!(network.links_between(n(1), n(0)).is_empty());
        assert_eq!(network.node(n(0)).unwrap().num_outgoing_links(), 2);
        assert_eq!(network.node(n(1)).unwrap().num_incoming_links(), 2);
    }

    #[test]
    fn remove_link_ends_its_flows() {
        let mut network = line();
        let connection = active_connection(&mut network, 0, 2);
        let id = flow(&mut network, connection, &[0, 1, 2]);
        network.allocate(id, 4.0, Time::ZERO, &mut VoidSink).unwrap();

        let mut sink = MemorySink::new();
        network
            .remove_link(LinkId::ZERO, Time::new(5), &mut sink)
            .unwrap();

        assert!(!network.is_flow_active(id));
        assert_eq!(network.num_links(), 1);
        assert!(network.link(LinkId::ZERO).is_none());
        assert_eq!(network.link(LinkId::ONE).unwrap().remaining_capacity(), 10.0);
        assert_eq!(network.flow_active_links().count(), 0);
        assert_eq!(network.connection(connection).unwrap().total_bandwidth(), 0.0);
        assert_eq!(sink.flow_info.len(), 1);
        // the removed link is flushed later
        assert!(sink.link_info.is_empty());
        network.flush_retired_links(Time::new(5), &mut sink);
        assert_eq!(sink.link_info.len(), 1);
        assert_eq!(sink.link_info[0].end, Time::new(5));

        assert_eq!(
            network.remove_link(LinkId::ZERO, Time::new(5), &mut sink),
            Err(NetworkError::LinkNotFound { link: LinkId::ZERO })
        );
    }

    // ------------------------------------------------------------------
    // connections and flows
    // ------------------------------------------------------------------

    #[test]
    fn create_connection_validation() {
        let mut network = line();
        assert_eq!(
            network.create_connection(n(1), n(1), 10.0),
            Err(NetworkError::SameEndpoints { node: n(1) })
        );
        assert!(network.create_connection(n(0), n(1), PRECISION).is_err());
        assert!(network.create_connection(n(0), n(1), f64::NAN).is_err());
        assert!(network.create_connection(n(0), n(9), 1.0).is_err());
    }

    #[test]
    fn activation_requires_pending() {
        let mut network = line();
        let id = active_connection(&mut network, 0, 2);
        assert!(matches!(
            network.activate_connection(id, Time::ZERO, &mut VoidSink),
            Err(NetworkError::ConnectionStatus { .. })
        ));
    }

    #[test]
    fn flow_bookkeeping() {
        let mut network = line();
        let connection = active_connection(&mut network, 0, 2);
        let id = flow(&mut network, connection, &[0, 1, 2]);

        for node in 0..3 {
            assert_eq!(network.node(n(node)).unwrap().num_active_flows(), 1);
        }
        assert_eq!(network.flow_active_links().count(), 2);
        assert_eq!(network.connection(connection).unwrap().flows(), &[id]);

        network.end_flow(id, Time::new(1), &mut VoidSink).unwrap();
        for node in 0..3 {
            assert_eq!(network.node(n(node)).unwrap().num_active_flows(), 0);
        }
        assert_eq!(network.flow_active_links().count(), 0);
        // history is kept
        assert_eq!(network.connection(connection).unwrap().flows(), &[id]);
        assert_eq!(
            network.end_flow(id, Time::new(1), &mut VoidSink),
            Err(NetworkError::FlowNotActive { flow: id })
        );
    }

    #[test]
    fn flow_path_must_join_connection_endpoints() {
        let mut network = line();
        let connection = active_connection(&mut network, 0, 2);
        let path = network.path_through(&[n(0), n(1)]).unwrap();
        assert!(matches!(
            network.start_flow(connection, path, Time::ZERO, &mut VoidSink),
            Err(NetworkError::PathEndpoints { .. })
        ));
    }

    #[test]
    fn flow_needs_active_connection() {
        let mut network = line();
        let connection = network.create_connection(n(0), n(2), 10.0).unwrap();
        let path = network.path_through(&[n(0), n(1), n(2)]).unwrap();
        assert!(matches!(
            network.start_flow(connection, path, Time::ZERO, &mut VoidSink),
            Err(NetworkError::ConnectionStatus { .. })
        ));
    }

    // ------------------------------------------------------------------
    // allocation
    // ------------------------------------------------------------------

    #[test]
    fn allocation_updates_links_and_connection() {
        let mut network = line();
        let connection = active_connection(&mut network, 0, 2);
        let a = flow(&mut network, connection, &[0, 1, 2]);
        let b = flow(&mut network, connection, &[0, 1, 2]);

        network.allocate(a, 6.0, Time::ZERO, &mut VoidSink).unwrap();
        network.allocate(b, 4.0, Time::ZERO, &mut VoidSink).unwrap();
        assert_eq!(network.connection(connection).unwrap().total_bandwidth(), 10.0);
        assert_eq!(network.link(LinkId::ZERO).unwrap().remaining_capacity(), 0.0);

        assert!(!network.can_allocate(b, 4.5));
        assert!(network.can_allocate(b, 4.0));
        assert!(!network.can_allocate(b, -1.0));
        assert!(matches!(
            network.allocate(b, 4.5, Time::ZERO, &mut VoidSink),
            Err(NetworkError::OverCapacity { .. })
        ));
        // a rejected allocation changes nothing
        assert_eq!(network.flow(b).unwrap().bandwidth(), 4.0);

        network.allocate(a, 1.0, Time::ZERO, &mut VoidSink).unwrap();
        assert_eq!(network.connection(connection).unwrap().total_bandwidth(), 5.0);
        network.validate_allocation().unwrap();
    }

    #[test]
    fn small_negative_allocation_clamps_to_zero() {
        let mut network = line();
        let connection = active_connection(&mut network, 0, 1);
        let id = flow(&mut network, connection, &[0, 1]);

        network
            .allocate(id, -PRECISION / 2.0, Time::ZERO, &mut VoidSink)
            .unwrap();
        assert_eq!(network.flow(id).unwrap().bandwidth(), 0.0);
        assert!(matches!(
            network.allocate(id, -1.0, Time::ZERO, &mut VoidSink),
            Err(NetworkError::InvalidBandwidth { .. })
        ));
    }

    #[test]
    fn zero_capacity_link_carries_zero() {
        let mut network = Network::new(2);
        network.add_link(n(0), n(1), 0.0).unwrap();
        network.bind(PRECISION, &mut VoidSink);
        let connection = active_connection(&mut network, 0, 1);
        let id = flow(&mut network, connection, &[0, 1]);
        network.allocate(id, 0.0, Time::ZERO, &mut VoidSink).unwrap();
        assert!(network.allocate(id, 1.0, Time::ZERO, &mut VoidSink).is_err());
        assert_eq!(network.time_till_update_needed(), Time::MAX);
    }

    // ------------------------------------------------------------------
    // progression
    // ------------------------------------------------------------------

    #[test]
    fn progress_finishes_drained_connections() {
        let mut network = line();
        let connection = active_connection(&mut network, 0, 2);
        let id = flow(&mut network, connection, &[0, 1, 2]);
        network.allocate(id, 10.0, Time::ZERO, &mut VoidSink).unwrap();
        assert_eq!(network.time_till_update_needed(), Time::new(100));

        let mut sink = MemorySink::new();
        assert!(network.progress(Time::new(50), Time::new(50), &mut sink).is_empty());
        assert_eq!(
            network.progress(Time::new(50), Time::new(100), &mut sink),
            vec![connection]
        );

        let connection = network.connection(connection).unwrap();
        assert_eq!(connection.status(), ConnectionStatus::Finished);
        assert_eq!(network.num_active_flows(), 0);
        assert_eq!(network.num_active_connections(), 0);

        let info = &sink.connection_info[0];
        assert!(info.finished);
        assert_eq!(info.transmitted, 1_000.0);
        assert_eq!(info.average_bandwidth, 10.0);
    }

    #[test]
    fn remainder_update_threshold() {
        let mut network = line();
        let connection = active_connection(&mut network, 0, 2);
        assert!(matches!(
            network.set_remainder_update_threshold(connection, 2_000.0),
            Err(NetworkError::InvalidThreshold { .. })
        ));
        network
            .set_remainder_update_threshold(connection, 500.0)
            .unwrap();
        let id = flow(&mut network, connection, &[0, 1, 2]);
        network.allocate(id, 10.0, Time::ZERO, &mut VoidSink).unwrap();
        assert_eq!(network.time_till_update_needed(), Time::new(50));
    }
}
