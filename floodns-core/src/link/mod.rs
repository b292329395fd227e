use crate::{
    log::{LinkInfo, LinkLog, LogSink},
    sim_id::{FlowId, LinkId, NodeId},
    time::Time,
};
use std::collections::BTreeSet;

/// A directed, capacitated edge of the [`Network`].
///
/// The link keeps the set of flows crossing it and how much of its
/// capacity is still free. Allocating bandwidth to a flow reserves it on
/// every link of the flow's path; the sum of the reservations never
/// exceeds the capacity by the flow precision or more.
///
/// A capacity of zero is legal: such a link can carry flows, but only at
/// a bandwidth of zero, and it always reports a utilization of zero.
///
/// [`Network`]: crate::network::Network
#[derive(Debug, Clone)]
pub struct Link {
    id: LinkId,
    from: NodeId,
    to: NodeId,
    capacity: f64,

    /// capacity not yet reserved by the active flows
    remaining: f64,
    active_flows: BTreeSet<FlowId>,

    label: Option<String>,
    log: LinkLog,
}

impl Link {
    pub(crate) fn new(id: LinkId, from: NodeId, to: NodeId, capacity: f64, precision: f64) -> Self {
        Self {
            id,
            from,
            to,
            capacity,
            remaining: capacity,
            active_flows: BTreeSet::new(),
            label: None,
            log: LinkLog::new(precision),
        }
    }

    #[inline]
    pub fn id(&self) -> LinkId {
        self.id
    }

    #[inline]
    pub fn from(&self) -> NodeId {
        self.from
    }

    #[inline]
    pub fn to(&self) -> NodeId {
        self.to
    }

    #[inline]
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Capacity left after the reservations of the active flows.
    #[inline]
    pub fn remaining_capacity(&self) -> f64 {
        self.remaining
    }

    #[inline]
    pub fn used_capacity(&self) -> f64 {
        self.capacity - self.remaining
    }

    /// Fraction of the capacity in use, `0.0` for a zero-capacity link.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0.0 {
            0.0
        } else {
            self.used_capacity() / self.capacity
        }
    }

    pub fn active_flows(&self) -> impl Iterator<Item = FlowId> + '_ {
        self.active_flows.iter().copied()
    }

    #[inline]
    pub fn num_active_flows(&self) -> usize {
        self.active_flows.len()
    }

    pub fn has_flow(&self, flow: FlowId) -> bool {
        self.active_flows.contains(&flow)
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
    }

    pub fn log_mut(&mut self) -> &mut LinkLog {
        &mut self.log
    }

    pub(crate) fn start_log(&mut self, precision: f64, now: Time, sink: &mut dyn LogSink) {
        self.log.activate(self.id, precision, now, sink);
    }

    pub(crate) fn add_flow(&mut self, flow: FlowId, now: Time, sink: &mut dyn LogSink) {
        self.active_flows.insert(flow);
        self.log
            .num_active_flows(self.id, now, self.active_flows.len(), sink);
    }

    /// Drop `flow` from the link, releasing its reservation.
    pub(crate) fn remove_flow(
        &mut self,
        flow: FlowId,
        bandwidth: f64,
        now: Time,
        sink: &mut dyn LogSink,
    ) {
        self.active_flows.remove(&flow);
        self.log
            .num_active_flows(self.id, now, self.active_flows.len(), sink);
        self.remaining += bandwidth;
        self.log.utilization(self.id, now, self.utilization(), sink);
    }

    /// Whether a flow currently holding `current` can hold `new` instead.
    #[inline]
    pub(crate) fn fits(&self, current: f64, new: f64, precision: f64) -> bool {
        new - (self.remaining + current) < precision
    }

    /// Move the reservation of a flow from `old` to `new`. The caller
    /// checked [`Link::fits`] beforehand.
    pub(crate) fn reserve(&mut self, old: f64, new: f64, now: Time, sink: &mut dyn LogSink) {
        self.remaining += old;
        self.remaining -= new;
        self.log.utilization(self.id, now, self.utilization(), sink);
    }

    pub(crate) fn final_flush(&mut self, now: Time, sink: &mut dyn LogSink) {
        self.log.finish(self.id, now, sink);
        if self.log.info_enabled() {
            let start = self.log.start();
            sink.link_info(&LinkInfo {
                id: self.id,
                src: self.from,
                dst: self.to,
                start,
                end: now,
                duration: now.saturating_sub(start),
                average_utilization: self.log.average_utilization(now),
                average_active_flows: self.log.average_active_flows(now),
                label: self.label.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::VoidSink;

    const PRECISION: f64 = 1e-10;

    fn link(capacity: f64) -> Link {
        Link::new(LinkId::ZERO, NodeId::ZERO, NodeId::ONE, capacity, PRECISION)
    }

    #[test]
    fn reservations() {
        let mut sink = VoidSink;
        let mut link = link(10.0);
        let flow = FlowId::ZERO;
        link.add_flow(flow, Time::ZERO, &mut sink);

        assert!(link.fits(0.0, 10.0, PRECISION));
        assert!(!link.fits(0.0, 10.0 + PRECISION, PRECISION));

        link.reserve(0.0, 4.0, Time::ZERO, &mut sink);
        assert_eq!(link.remaining_capacity(), 6.0);
        assert_eq!(link.utilization(), 0.4);
        // a flow may always grow back into its own reservation
        assert!(link.fits(4.0, 10.0, PRECISION));

        link.remove_flow(flow, 4.0, Time::new(1), &mut sink);
        assert_eq!(link.remaining_capacity(), 10.0);
        assert_eq!(link.num_active_flows(), 0);
    }

    #[test]
    fn zero_capacity() {
        let link = link(0.0);
        assert_eq!(link.utilization(), 0.0);
        assert!(link.fits(0.0, 0.0, PRECISION));
        assert!(!link.fits(0.0, 1.0, PRECISION));
    }
}
