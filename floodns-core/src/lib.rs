//! Flow-level discrete event network simulator.
//!
//! The network is a directed graph of nodes and capacitated links.
//! Connections carry a fixed amount of data from a source to a
//! destination over one or more flows, each following an acyclic path.
//! Nothing is packetized: at every instant a flow has a bandwidth, and the
//! simulator only wakes up when something changes (a connection starts or
//! drains, or an event fires).
//!
//! Two policies drive a run:
//!
//! * the [`RoutingStrategy`] gives every started connection its flows, see
//!   [`routing`];
//! * the [`Aftermath`] decides the bandwidth of every flow once all the
//!   events of an instant were processed, see [`allocator`].
//!
//! The state of every entity is logged as intervals to a
//! [`log::LogSink`].

pub mod allocator;
pub mod connection;
pub mod defaults;
pub mod event;
pub mod flow;
pub mod graph;
pub mod link;
pub mod log;
pub mod lp;
pub mod network;
pub mod node;
pub mod path;
mod policy;
pub mod properties;
pub mod routing;
pub mod schedule;
mod sim_context;
mod sim_id;
mod simulator;
mod stats;
mod time;
pub mod topology;

pub use self::{
    policy::{Aftermath, RoutingStrategy},
    sim_context::{SimContext, SimError, SimState},
    sim_id::{ConnectionId, EventId, FlowId, LinkId, NodeId},
    simulator::{Simulator, SimulatorBuilder},
    stats::SimStats,
    time::Time,
};
