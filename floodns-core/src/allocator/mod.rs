//! Allocation policies.
//!
//! An allocator is an [`Aftermath`]: after every processed instant it
//! decides the bandwidth of every active flow. All the allocators here
//! start by resetting every flow to zero and then hand out bandwidth
//! again, so their result only depends on the current network state.
//!
//! * [`SimpleMmfAllocator`]: max-min fair water-filling;
//! * [`GenericMmfAllocator`]: weighted max-min fairness with per flow
//!   upper limits;
//! * [`UniformFixedAllocator`]: the same fixed bandwidth for every flow;
//! * [`EpsilonSumMaxLpAllocator`] and [`MinMaxLinkCapLpAllocator`]: the
//!   rates come from a linear program handed to an
//!   [`LpSolver`](crate::lp::LpSolver) at every instant;
//! * [`VoidAllocator`]: does nothing, flows stay at zero.
//!
//! [`Aftermath`]: crate::Aftermath

mod epsilon_sum_max_lp;
mod generic_mmf;
mod min_max_link_cap_lp;
mod simple_mmf;
mod uniform_fixed;

pub use self::{
    epsilon_sum_max_lp::EpsilonSumMaxLpAllocator, generic_mmf::GenericMmfAllocator,
    min_max_link_cap_lp::MinMaxLinkCapLpAllocator, simple_mmf::SimpleMmfAllocator,
    uniform_fixed::UniformFixedAllocator,
};
use crate::{
    policy::Aftermath,
    sim_context::{SimContext, SimError},
    sim_id::FlowId,
};
use std::cmp::Ordering;
use thiserror::Error;

/// Invalid allocator configuration.
#[derive(Debug, Error, PartialEq)]
pub enum AllocatorError {
    #[error("the weight of flow {flow} must be finite and positive, got {weight}")]
    InvalidWeight { flow: FlowId, weight: f64 },
    #[error("the upper limit of flow {flow} must be non-negative, got {limit}")]
    InvalidUpperLimit { flow: FlowId, limit: f64 },
    #[error("the uniform flow bandwidth must be finite and non-negative, got {bandwidth}")]
    InvalidBandwidth { bandwidth: f64 },
    #[error("epsilon must be within [0, 1], got {epsilon}")]
    InvalidEpsilon { epsilon: f64 },
    #[error("the demand of a connection must be finite and non-negative, got {demand}")]
    InvalidDemand { demand: f64 },
}

/// Leaves every flow at its current bandwidth, zero for new flows.
#[derive(Debug, Default, Clone, Copy)]
pub struct VoidAllocator;

impl Aftermath for VoidAllocator {
    fn perform(&mut self, _ctx: &mut SimContext) -> Result<(), SimError> {
        Ok(())
    }
}

/// Set every active flow to zero, releasing all the link reservations.
fn reset_all(ctx: &mut SimContext) -> Result<(), SimError> {
    let flows: Vec<FlowId> = ctx.network().flow_ids().collect();
    for flow in flows {
        ctx.allocate_flow_bandwidth(flow, 0.0)?;
    }
    Ok(())
}

/// Apply a computed allocation, after a [`reset_all`].
fn apply(ctx: &mut SimContext, allocation: &[(FlowId, f64)]) -> Result<(), SimError> {
    for &(flow, bandwidth) in allocation {
        ctx.allocate_flow_bandwidth(flow, bandwidth)?;
    }
    Ok(())
}

/// A fair share, totally ordered so it can key ordered collections.
#[derive(Debug, Clone, Copy)]
struct Share(f64);

impl PartialEq for Share {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Share {}

impl PartialOrd for Share {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Share {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::{
        log::VoidSink,
        network::Network,
        sim_context::SimContext,
        sim_id::{FlowId, NodeId},
        time::Time,
    };

    /// A running context over the given links.
    pub(crate) fn running(num_nodes: usize, links: &[(u64, u64, f64)]) -> SimContext {
        let mut network = Network::new(num_nodes);
        for &(from, to, capacity) in links {
            network
                .add_link(NodeId::new(from), NodeId::new(to), capacity)
                .unwrap();
        }
        let mut ctx = SimContext::new(network, 1e-10, Box::new(VoidSink)).unwrap();
        ctx.begin(Time::new(1_000_000)).unwrap();
        ctx
    }

    /// Start a connection and its single flow through `nodes`.
    pub(crate) fn start_flow(ctx: &mut SimContext, nodes: &[u64]) -> FlowId {
        let nodes: Vec<NodeId> = nodes.iter().copied().map(NodeId::new).collect();
        let src = nodes[0];
        let dst = nodes[nodes.len() - 1];
        let connection = ctx.create_connection(src, dst, 1e9).unwrap();
        ctx.activate_connection(connection).unwrap();
        let path = ctx.network().path_through(&nodes).unwrap();
        ctx.add_flow_to_connection(connection, path).unwrap()
    }

    pub(crate) fn bandwidth(ctx: &SimContext, flow: FlowId) -> f64 {
        ctx.network().flow(flow).unwrap().bandwidth()
    }

    pub(crate) fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }
}
