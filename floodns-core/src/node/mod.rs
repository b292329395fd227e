use crate::{
    log::{LogSink, NodeInfo, NodeLog},
    sim_id::{FlowId, LinkId, NodeId},
    time::Time,
};
use std::collections::BTreeSet;

/// A vertex of the [`Network`].
///
/// A node only keeps track of what is attached to it: the links leaving
/// and entering it, and the flows currently crossing it. A flow counts at
/// its source node and at the destination node of each of its links, so
/// every node of its path sees it exactly once.
///
/// You never construct a `Node` directly: a [`Network`] of `n` nodes
/// creates the nodes `0..n` up front.
///
/// [`Network`]: crate::network::Network
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,

    outgoing: BTreeSet<LinkId>,
    incoming: BTreeSet<LinkId>,

    active_flows: BTreeSet<FlowId>,

    label: Option<String>,
    log: NodeLog,
}

impl Node {
    pub(crate) fn new(id: NodeId, precision: f64) -> Self {
        Self {
            id,
            outgoing: BTreeSet::new(),
            incoming: BTreeSet::new(),
            active_flows: BTreeSet::new(),
            label: None,
            log: NodeLog::new(precision),
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Present links leaving this node, in ascending identifier order.
    pub fn outgoing_links(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.outgoing.iter().copied()
    }

    /// Present links entering this node, in ascending identifier order.
    pub fn incoming_links(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.incoming.iter().copied()
    }

    #[inline]
    pub fn num_outgoing_links(&self) -> usize {
        self.outgoing.len()
    }

    #[inline]
    pub fn num_incoming_links(&self) -> usize {
        self.incoming.len()
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

    pub fn log_mut(&mut self) -> &mut NodeLog {
        &mut self.log
    }

    pub(crate) fn attach_outgoing(&mut self, link: LinkId) {
        self.outgoing.insert(link);
    }

    pub(crate) fn attach_incoming(&mut self, link: LinkId) {
        self.incoming.insert(link);
    }

    pub(crate) fn detach_link(&mut self, link: LinkId) {
        self.outgoing.remove(&link);
        self.incoming.remove(&link);
    }

    pub(crate) fn start_log(&mut self, precision: f64, now: Time, sink: &mut dyn LogSink) {
        self.log.activate(self.id, precision, now, sink);
    }

    pub(crate) fn add_flow(&mut self, flow: FlowId, now: Time, sink: &mut dyn LogSink) {
        self.active_flows.insert(flow);
        self.log
            .num_active_flows(self.id, now, self.active_flows.len(), sink);
    }

    pub(crate) fn remove_flow(&mut self, flow: FlowId, now: Time, sink: &mut dyn LogSink) {
        self.active_flows.remove(&flow);
        self.log
            .num_active_flows(self.id, now, self.active_flows.len(), sink);
    }

    pub(crate) fn final_flush(&mut self, now: Time, sink: &mut dyn LogSink) {
        self.log.finish(self.id, now, sink);
        if self.log.info_enabled() {
            sink.node_info(&NodeInfo {
                id: self.id,
                average_active_flows: self.log.average_active_flows(now),
                label: self.label.clone(),
            });
        }
    }
}
