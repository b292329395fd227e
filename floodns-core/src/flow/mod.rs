use crate::{
    log::{FlowInfo, FlowLog, LogSink},
    path::AcyclicPath,
    sim_id::{ConnectionId, FlowId, NodeId},
    time::Time,
};

/// One path assignment of a [`Connection`].
///
/// A flow is created active by
/// [`SimContext::add_flow_to_connection`] and stays so until it is ended,
/// either explicitly, because its connection finished or because one of
/// the links of its path was removed. An ended flow is gone from the
/// [`Network`]: only its identifier remains, in its connection's history.
///
/// The bandwidth of a flow is only ever set by the allocation policy.
///
/// [`Connection`]: crate::connection::Connection
/// [`Network`]: crate::network::Network
/// [`SimContext::add_flow_to_connection`]: crate::SimContext::add_flow_to_connection
#[derive(Debug, Clone)]
pub struct Flow {
    id: FlowId,
    connection: ConnectionId,
    path: AcyclicPath,

    bandwidth: f64,

    label: Option<String>,
    log: FlowLog,
}

impl Flow {
    pub(crate) fn new(
        id: FlowId,
        connection: ConnectionId,
        path: AcyclicPath,
        precision: f64,
        now: Time,
        sink: &mut dyn LogSink,
    ) -> Self {
        let mut log = FlowLog::new(precision, now);
        log.bandwidth(id, now, 0.0, sink);
        Self {
            id,
            connection,
            path,
            bandwidth: 0.0,
            label: None,
            log,
        }
    }

    #[inline]
    pub fn id(&self) -> FlowId {
        self.id
    }

    #[inline]
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    #[inline]
    pub fn path(&self) -> &AcyclicPath {
        &self.path
    }

    #[inline]
    pub fn src(&self) -> NodeId {
        self.path.src()
    }

    #[inline]
    pub fn dst(&self) -> NodeId {
        self.path.dst()
    }

    #[inline]
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
    }

    pub fn log_mut(&mut self) -> &mut FlowLog {
        &mut self.log
    }

    /// Set the bandwidth, returning the previous one.
    pub(crate) fn set_bandwidth(&mut self, bandwidth: f64, now: Time, sink: &mut dyn LogSink) -> f64 {
        let old = std::mem::replace(&mut self.bandwidth, bandwidth);
        self.log.bandwidth(self.id, now, bandwidth, sink);
        old
    }

    pub(crate) fn final_flush(&mut self, now: Time, sink: &mut dyn LogSink) {
        self.log.finish(self.id, now, sink);
        if self.log.info_enabled() {
            let start = self.log.start();
            sink.flow_info(&FlowInfo {
                id: self.id,
                src: self.src(),
                dst: self.dst(),
                path: self.path.clone(),
                start,
                end: now,
                duration: now.saturating_sub(start),
                bandwidth_sum: self.log.bandwidth_sum(),
                average_bandwidth: self.log.average(now),
                label: self.label.clone(),
            });
        }
    }
}
