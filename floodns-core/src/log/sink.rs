use super::Interval;
use crate::{
    path::AcyclicPath,
    sim_id::{ConnectionId, FlowId, LinkId, NodeId},
    time::Time,
};
use std::{
    cell::{Ref, RefCell, RefMut},
    rc::Rc,
};
use thiserror::Error;

/// Summary of a flow, produced when the flow ends.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowInfo {
    pub id: FlowId,
    pub src: NodeId,
    pub dst: NodeId,
    pub path: AcyclicPath,
    pub start: Time,
    pub end: Time,
    pub duration: Time,
    /// total amount of data carried (bandwidth × time)
    pub bandwidth_sum: f64,
    pub average_bandwidth: f64,
    pub label: Option<String>,
}

/// Summary of a connection, produced when it finishes, is terminated or the
/// run ends.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub src: NodeId,
    pub dst: NodeId,
    pub total_size: f64,
    pub transmitted: f64,
    /// every flow the connection ever had, in creation order
    pub flows: Vec<FlowId>,
    pub start: Time,
    pub end: Time,
    pub duration: Time,
    pub average_bandwidth: f64,
    pub finished: bool,
    pub label: Option<String>,
}

/// Summary of a link, produced when it is removed or the run ends.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkInfo {
    pub id: LinkId,
    pub src: NodeId,
    pub dst: NodeId,
    pub start: Time,
    pub end: Time,
    pub duration: Time,
    pub average_utilization: f64,
    pub average_active_flows: f64,
    pub label: Option<String>,
}

/// Summary of a node, produced at the end of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub average_active_flows: f64,
    pub label: Option<String>,
}

/// Error raised while persisting result logs.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to write result log `{file}'")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

/// Destination of the result logs.
///
/// All methods have a default implementation that drops the record, so a
/// sink only implements what it is interested in. The kernel never stops
/// on a sink call: a sink failing to persist a record keeps the error and
/// reports it through [`LogSink::take_error`], which the simulator polls
/// after every processed instant. Any error is fatal to the run.
pub trait LogSink {
    fn flow_bandwidth(&mut self, _flow: FlowId, _interval: Interval<f64>) {}
    fn flow_info(&mut self, _info: &FlowInfo) {}

    fn connection_bandwidth(&mut self, _connection: ConnectionId, _interval: Interval<f64>) {}
    fn connection_info(&mut self, _info: &ConnectionInfo) {}

    fn link_utilization(&mut self, _link: LinkId, _interval: Interval<f64>) {}
    fn link_num_active_flows(&mut self, _link: LinkId, _interval: Interval<usize>) {}
    fn link_info(&mut self, _info: &LinkInfo) {}

    fn node_num_active_flows(&mut self, _node: NodeId, _interval: Interval<usize>) {}
    fn node_info(&mut self, _info: &NodeInfo) {}

    /// Return the first error met since the last call, if any.
    fn take_error(&mut self) -> Option<LogError> {
        None
    }

    /// Called once, after the final flush of the run.
    fn close(&mut self) -> Result<(), LogError> {
        Ok(())
    }
}

/// A [`LogSink`] that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct VoidSink;

impl LogSink for VoidSink {}

/// A [`LogSink`] keeping every record in memory, in emission order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemorySink {
    pub flow_bandwidth: Vec<(FlowId, Interval<f64>)>,
    pub flow_info: Vec<FlowInfo>,
    pub connection_bandwidth: Vec<(ConnectionId, Interval<f64>)>,
    pub connection_info: Vec<ConnectionInfo>,
    pub link_utilization: Vec<(LinkId, Interval<f64>)>,
    pub link_num_active_flows: Vec<(LinkId, Interval<usize>)>,
    pub link_info: Vec<LinkInfo>,
    pub node_num_active_flows: Vec<(NodeId, Interval<usize>)>,
    pub node_info: Vec<NodeInfo>,
    pub closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bandwidth intervals of `connection`, in time order.
    pub fn connection_bandwidth_of(&self, connection: ConnectionId) -> Vec<Interval<f64>> {
        self.connection_bandwidth
            .iter()
            .filter(|(id, _)| *id == connection)
            .map(|(_, interval)| *interval)
            .collect()
    }

    /// The bandwidth intervals of `flow`, in time order.
    pub fn flow_bandwidth_of(&self, flow: FlowId) -> Vec<Interval<f64>> {
        self.flow_bandwidth
            .iter()
            .filter(|(id, _)| *id == flow)
            .map(|(_, interval)| *interval)
            .collect()
    }

    pub fn connection_info_of(&self, connection: ConnectionId) -> Option<&ConnectionInfo> {
        self.connection_info.iter().find(|info| info.id == connection)
    }
}

impl LogSink for MemorySink {
    fn flow_bandwidth(&mut self, flow: FlowId, interval: Interval<f64>) {
        self.flow_bandwidth.push((flow, interval));
    }
    fn flow_info(&mut self, info: &FlowInfo) {
        self.flow_info.push(info.clone());
    }
    fn connection_bandwidth(&mut self, connection: ConnectionId, interval: Interval<f64>) {
        self.connection_bandwidth.push((connection, interval));
    }
    fn connection_info(&mut self, info: &ConnectionInfo) {
        self.connection_info.push(info.clone());
    }
    fn link_utilization(&mut self, link: LinkId, interval: Interval<f64>) {
        self.link_utilization.push((link, interval));
    }
    fn link_num_active_flows(&mut self, link: LinkId, interval: Interval<usize>) {
        self.link_num_active_flows.push((link, interval));
    }
    fn link_info(&mut self, info: &LinkInfo) {
        self.link_info.push(info.clone());
    }
    fn node_num_active_flows(&mut self, node: NodeId, interval: Interval<usize>) {
        self.node_num_active_flows.push((node, interval));
    }
    fn node_info(&mut self, info: &NodeInfo) {
        self.node_info.push(info.clone());
    }
    fn close(&mut self) -> Result<(), LogError> {
        self.closed = true;
        Ok(())
    }
}

impl<S: LogSink + ?Sized> LogSink for Box<S> {
    fn flow_bandwidth(&mut self, flow: FlowId, interval: Interval<f64>) {
        (**self).flow_bandwidth(flow, interval)
    }
    fn flow_info(&mut self, info: &FlowInfo) {
        (**self).flow_info(info)
    }
    fn connection_bandwidth(&mut self, connection: ConnectionId, interval: Interval<f64>) {
        (**self).connection_bandwidth(connection, interval)
    }
    fn connection_info(&mut self, info: &ConnectionInfo) {
        (**self).connection_info(info)
    }
    fn link_utilization(&mut self, link: LinkId, interval: Interval<f64>) {
        (**self).link_utilization(link, interval)
    }
    fn link_num_active_flows(&mut self, link: LinkId, interval: Interval<usize>) {
        (**self).link_num_active_flows(link, interval)
    }
    fn link_info(&mut self, info: &LinkInfo) {
        (**self).link_info(info)
    }
    fn node_num_active_flows(&mut self, node: NodeId, interval: Interval<usize>) {
        (**self).node_num_active_flows(node, interval)
    }
    fn node_info(&mut self, info: &NodeInfo) {
        (**self).node_info(info)
    }
    fn take_error(&mut self) -> Option<LogError> {
        (**self).take_error()
    }
    fn close(&mut self) -> Result<(), LogError> {
        (**self).close()
    }
}

/// A [`LogSink`] that can be kept by the caller while the simulator owns a
/// clone of it, to inspect the records once the run is over.
///
/// ```
/// # use floodns_core::log::{MemorySink, SharedSink};
/// let sink = SharedSink::new(MemorySink::new());
/// let for_the_simulator = sink.clone();
/// # drop(for_the_simulator);
/// assert!(sink.borrow().flow_info.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct SharedSink<S>(Rc<RefCell<S>>);

impl<S> SharedSink<S> {
    pub fn new(sink: S) -> Self {
        Self(Rc::new(RefCell::new(sink)))
    }

    pub fn borrow(&self) -> Ref<'_, S> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, S> {
        self.0.borrow_mut()
    }
}

impl<S> Clone for SharedSink<S> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<S: LogSink> LogSink for SharedSink<S> {
    fn flow_bandwidth(&mut self, flow: FlowId, interval: Interval<f64>) {
        self.0.borrow_mut().flow_bandwidth(flow, interval)
    }
    fn flow_info(&mut self, info: &FlowInfo) {
        self.0.borrow_mut().flow_info(info)
    }
    fn connection_bandwidth(&mut self, connection: ConnectionId, interval: Interval<f64>) {
        self.0.borrow_mut().connection_bandwidth(connection, interval)
    }
    fn connection_info(&mut self, info: &ConnectionInfo) {
        self.0.borrow_mut().connection_info(info)
    }
    fn link_utilization(&mut self, link: LinkId, interval: Interval<f64>) {
        self.0.borrow_mut().link_utilization(link, interval)
    }
    fn link_num_active_flows(&mut self, link: LinkId, interval: Interval<usize>) {
        self.0.borrow_mut().link_num_active_flows(link, interval)
    }
    fn link_info(&mut self, info: &LinkInfo) {
        self.0.borrow_mut().link_info(info)
    }
    fn node_num_active_flows(&mut self, node: NodeId, interval: Interval<usize>) {
        self.0.borrow_mut().node_num_active_flows(node, interval)
    }
    fn node_info(&mut self, info: &NodeInfo) {
        self.0.borrow_mut().node_info(info)
    }
    fn take_error(&mut self) -> Option<LogError> {
        self.0.borrow_mut().take_error()
    }
    fn close(&mut self) -> Result<(), LogError> {
        self.0.borrow_mut().close()
    }
}
