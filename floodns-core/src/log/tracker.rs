use super::{Interval, IntervalLog, LogSink, Sample};
use crate::{
    sim_id::{ConnectionId, FlowId, LinkId, NodeId},
    time::Time,
};

/// One logged quantity: the run-length encoder, the running integral of the
/// signal and whether the intervals are forwarded to the sink at all.
///
/// The integral is always accumulated, even when the series is not saved,
/// so the info records stay correct.
#[derive(Debug, Clone)]
struct Series<T> {
    log: IntervalLog<T>,
    sum: f64,
    enabled: bool,
}

impl<T: Sample> Series<T> {
    fn new(precision: f64) -> Self {
        Self {
            log: IntervalLog::new(precision),
            sum: 0.0,
            enabled: true,
        }
    }

    fn restart(&mut self, precision: f64) {
        self.log = IntervalLog::new(precision);
        self.sum = 0.0;
    }

    fn accept(&mut self, interval: Interval<T>, emit: &mut impl FnMut(Interval<T>)) {
        self.sum += interval.area();
        if self.enabled {
            emit(interval);
        }
    }

    fn record(&mut self, now: Time, value: T, mut emit: impl FnMut(Interval<T>)) {
        if let Some(interval) = self.log.update(now, value) {
            self.accept(interval, &mut emit);
        }
    }

    fn finish(&mut self, now: Time, mut emit: impl FnMut(Interval<T>)) {
        for interval in self.log.finish(now).into_iter().flatten() {
            self.accept(interval, &mut emit);
        }
    }
}

#[inline]
fn average(sum: f64, duration: Time) -> f64 {
    if duration == Time::ZERO {
        0.0
    } else {
        sum / duration.as_f64()
    }
}

/// Bandwidth history of a flow.
#[derive(Debug, Clone)]
pub struct FlowLog {
    start: Time,
    bandwidth: Series<f64>,
    info_enabled: bool,
}

impl FlowLog {
    pub(crate) fn new(precision: f64, now: Time) -> Self {
        Self {
            start: now,
            bandwidth: Series::new(precision),
            info_enabled: true,
        }
    }

    /// Whether a [`FlowInfo`](super::FlowInfo) is produced when the flow ends.
    pub fn set_info_enabled(&mut self, enabled: bool) {
        self.info_enabled = enabled;
    }

    /// Whether the bandwidth intervals are handed to the sink.
    pub fn set_bandwidth_enabled(&mut self, enabled: bool) {
        self.bandwidth.enabled = enabled;
    }

    #[inline]
    pub fn start(&self) -> Time {
        self.start
    }

    pub(crate) fn info_enabled(&self) -> bool {
        self.info_enabled
    }

    /// amount of data carried up to the last closed interval
    pub(crate) fn bandwidth_sum(&self) -> f64 {
        self.bandwidth.sum
    }

    pub(crate) fn average(&self, now: Time) -> f64 {
        average(self.bandwidth.sum, now.saturating_sub(self.start))
    }

    pub(crate) fn bandwidth(&mut self, id: FlowId, now: Time, value: f64, sink: &mut dyn LogSink) {
        self.bandwidth
            .record(now, value, |interval| sink.flow_bandwidth(id, interval));
    }

    pub(crate) fn finish(&mut self, id: FlowId, now: Time, sink: &mut dyn LogSink) {
        self.bandwidth
            .finish(now, |interval| sink.flow_bandwidth(id, interval));
    }
}

/// Bandwidth history of a connection, started when the connection is
/// activated.
#[derive(Debug, Clone)]
pub struct ConnectionLog {
    start: Time,
    bandwidth: Series<f64>,
    info_enabled: bool,
}

impl ConnectionLog {
    pub(crate) fn new(precision: f64) -> Self {
        Self {
            start: Time::ZERO,
            bandwidth: Series::new(precision),
            info_enabled: true,
        }
    }

    pub fn set_info_enabled(&mut self, enabled: bool) {
        self.info_enabled = enabled;
    }

    pub fn set_bandwidth_enabled(&mut self, enabled: bool) {
        self.bandwidth.enabled = enabled;
    }

    #[inline]
    pub fn start(&self) -> Time {
        self.start
    }

    pub(crate) fn info_enabled(&self) -> bool {
        self.info_enabled
    }

    /// amount of data transmitted, only complete once the log is finished
    pub(crate) fn transmitted(&self) -> f64 {
        self.bandwidth.sum
    }

    pub(crate) fn average(&self, now: Time) -> f64 {
        average(self.bandwidth.sum, now.saturating_sub(self.start))
    }

    pub(crate) fn activate(
        &mut self,
        id: ConnectionId,
        precision: f64,
        now: Time,
        sink: &mut dyn LogSink,
    ) {
        self.start = now;
        self.bandwidth.restart(precision);
        self.bandwidth(id, now, 0.0, sink);
    }

    pub(crate) fn bandwidth(
        &mut self,
        id: ConnectionId,
        now: Time,
        value: f64,
        sink: &mut dyn LogSink,
    ) {
        self.bandwidth
            .record(now, value, |interval| sink.connection_bandwidth(id, interval));
    }

    pub(crate) fn finish(&mut self, id: ConnectionId, now: Time, sink: &mut dyn LogSink) {
        self.bandwidth
            .finish(now, |interval| sink.connection_bandwidth(id, interval));
    }
}

/// Utilization and active flow count history of a link.
#[derive(Debug, Clone)]
pub struct LinkLog {
    start: Time,
    utilization: Series<f64>,
    num_active_flows: Series<usize>,
    info_enabled: bool,
}

impl LinkLog {
    pub(crate) fn new(precision: f64) -> Self {
        Self {
            start: Time::ZERO,
            utilization: Series::new(precision),
            num_active_flows: Series::new(precision),
            info_enabled: true,
        }
    }

    pub fn set_info_enabled(&mut self, enabled: bool) {
        self.info_enabled = enabled;
    }

    pub fn set_utilization_enabled(&mut self, enabled: bool) {
        self.utilization.enabled = enabled;
    }

    pub fn set_num_active_flows_enabled(&mut self, enabled: bool) {
        self.num_active_flows.enabled = enabled;
    }

    #[inline]
    pub fn start(&self) -> Time {
        self.start
    }

    pub(crate) fn info_enabled(&self) -> bool {
        self.info_enabled
    }

    pub(crate) fn average_utilization(&self, now: Time) -> f64 {
        average(self.utilization.sum, now.saturating_sub(self.start))
    }

    pub(crate) fn average_active_flows(&self, now: Time) -> f64 {
        average(self.num_active_flows.sum, now.saturating_sub(self.start))
    }

    /// (Re)start the log at `now`, with the link idle.
    pub(crate) fn activate(&mut self, id: LinkId, precision: f64, now: Time, sink: &mut dyn LogSink) {
        self.start = now;
        self.utilization.restart(precision);
        self.num_active_flows.restart(precision);
        self.utilization(id, now, 0.0, sink);
        self.num_active_flows(id, now, 0, sink);
    }

    pub(crate) fn utilization(&mut self, id: LinkId, now: Time, value: f64, sink: &mut dyn LogSink) {
        self.utilization
            .record(now, value, |interval| sink.link_utilization(id, interval));
    }

    pub(crate) fn num_active_flows(
        &mut self,
        id: LinkId,
        now: Time,
        value: usize,
        sink: &mut dyn LogSink,
    ) {
        self.num_active_flows
            .record(now, value, |interval| sink.link_num_active_flows(id, interval));
    }

    pub(crate) fn finish(&mut self, id: LinkId, now: Time, sink: &mut dyn LogSink) {
        self.num_active_flows
            .finish(now, |interval| sink.link_num_active_flows(id, interval));
        self.utilization
            .finish(now, |interval| sink.link_utilization(id, interval));
    }
}

/// Active flow count history of a node.
#[derive(Debug, Clone)]
pub struct NodeLog {
    num_active_flows: Series<usize>,
    info_enabled: bool,
}

impl NodeLog {
    pub(crate) fn new(precision: f64) -> Self {
        Self {
            num_active_flows: Series::new(precision),
            info_enabled: true,
        }
    }

    pub fn set_info_enabled(&mut self, enabled: bool) {
        self.info_enabled = enabled;
    }

    pub fn set_num_active_flows_enabled(&mut self, enabled: bool) {
        self.num_active_flows.enabled = enabled;
    }

    pub(crate) fn info_enabled(&self) -> bool {
        self.info_enabled
    }

    /// average number of active flows over `[0, now)`
    pub(crate) fn average_active_flows(&self, now: Time) -> f64 {
        average(self.num_active_flows.sum, now)
    }

    pub(crate) fn activate(&mut self, id: NodeId, precision: f64, now: Time, sink: &mut dyn LogSink) {
        self.num_active_flows.restart(precision);
        self.num_active_flows(id, now, 0, sink);
    }

    pub(crate) fn num_active_flows(
        &mut self,
        id: NodeId,
        now: Time,
        value: usize,
        sink: &mut dyn LogSink,
    ) {
        self.num_active_flows
            .record(now, value, |interval| sink.node_num_active_flows(id, interval));
    }

    pub(crate) fn finish(&mut self, id: NodeId, now: Time, sink: &mut dyn LogSink) {
        self.num_active_flows
            .finish(now, |interval| sink.node_num_active_flows(id, interval));
    }
}
