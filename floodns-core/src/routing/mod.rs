//! Routing strategies.
//!
//! A [`RoutingStrategy`] gives a newly started connection its flows. The
//! strategies here work on a data center [`Topology`]: their routing state
//! is computed once between the ToRs, and when the endpoints are servers
//! the fixed hops between each server and its ToR are added around it.
//!
//! Randomness comes from a caller provided generator so that a run is
//! reproducible from its seed.
//!
//! A connection which cannot be routed gets no flow at all: a warning is
//! logged and the connection stays active, without ever finishing.
//!
//! [`RoutingStrategy`]: crate::RoutingStrategy
//! [`Topology`]: crate::topology::Topology

mod ecmp;
mod ksp;
mod multipath;
mod valiant;

pub use self::{
    ecmp::EcmpRouting, ksp::KspRouting, multipath::MultiPathRouting, valiant::ValiantRouting,
};
use crate::{
    graph::{GraphError, HopDistances},
    network::{Network, NetworkError},
    path::{AcyclicPath, Hop},
    policy::RoutingStrategy,
    sim_context::{SimContext, SimError},
    sim_id::{ConnectionId, NodeId},
    topology::TopologyDetails,
};
use rand_core::Rng;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("the topology has no ToR")]
    NoTor,
    #[error("no valiant node to choose from")]
    NoValiantNode,
    #[error("valiant node {node} is a ToR")]
    ValiantNodeIsTor { node: NodeId },
    #[error("valiant node {node} is not a switch")]
    ValiantNodeNotSwitch { node: NodeId },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Adds no flow: the allocation policy is expected to manage the flows of
/// the connections itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct VoidRouting;

impl RoutingStrategy for VoidRouting {
    fn assign_start_flows(
        &mut self,
        _ctx: &mut SimContext,
        _connection: ConnectionId,
    ) -> Result<(), SimError> {
        Ok(())
    }
}

/// Index in `0..len`, uniformly distributed.
///
/// `len` must not be zero.
#[inline]
pub(crate) fn uniform_index<R: Rng>(rng: &mut R, len: usize) -> usize {
    ((u128::from(rng.next_u64()) * len as u128) >> 64) as usize
}

/// For every switch and every destination, the hops leaving the switch on
/// a shortest path to the destination.
#[derive(Debug, Clone, Default)]
pub(crate) struct NextHops {
    table: BTreeMap<(NodeId, NodeId), Vec<Hop>>,
}

impl NextHops {
    /// The next hops of every switch towards every ToR, or towards every
    /// switch if `towards_all_switches`.
    pub(crate) fn compute(
        network: &Network,
        details: &TopologyDetails,
        towards_all_switches: bool,
    ) -> Self {
        let distances = HopDistances::floyd_warshall(network);
        let targets = if towards_all_switches {
            details.switches()
        } else {
            details.tors()
        };

        let mut table = BTreeMap::new();
        for &at in details.switches() {
            let Some(node) = network.node(at) else {
                continue;
            };
            for &towards in targets {
                if at == towards {
                    continue;
                }
                let remaining = distances.get(at, towards);
                let hops: Vec<Hop> = node
                    .outgoing_links()
                    .filter_map(|link| network.hop(link))
                    .filter(|hop| {
                        distances.is_reachable(hop.to, towards)
                            && distances.get(hop.to, towards) + 1 == remaining
                    })
                    .collect();
                table.insert((at, towards), hops);
            }
        }
        tracing::debug!(entries = table.len(), "next hops computed");
        Self { table }
    }

    pub(crate) fn get(&self, at: NodeId, towards: NodeId) -> &[Hop] {
        self.table
            .get(&(at, towards))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Where the connections enter and leave the ToR layer.
///
/// When the ToRs are the endpoints there is nothing to add. Otherwise
/// each server reaches the rest of the network through a single link to
/// its ToR, and back through the reverse link.
#[derive(Debug, Clone)]
pub(crate) struct Access {
    details: TopologyDetails,
    up: BTreeMap<NodeId, Hop>,
    down: BTreeMap<NodeId, Hop>,
}

impl Access {
    pub(crate) fn new(network: &Network, details: &TopologyDetails) -> Self {
        let mut up = BTreeMap::new();
        let mut down = BTreeMap::new();
        for &server in details.servers() {
            let Some(tor) = details.tor_of_server(server) else {
                continue;
            };
            if let Some(hop) = first_hop(network, server, tor) {
                up.insert(server, hop);
            }
            if let Some(hop) = first_hop(network, tor, server) {
                down.insert(server, hop);
            }
        }
        Self {
            details: details.clone(),
            up,
            down,
        }
    }

    pub(crate) fn details(&self) -> &TopologyDetails {
        &self.details
    }

    /// ToRs of the two endpoints.
    pub(crate) fn tors(&self, src: NodeId, dst: NodeId) -> Option<(NodeId, NodeId)> {
        Some((
            self.details.tor_of_endpoint(src)?,
            self.details.tor_of_endpoint(dst)?,
        ))
    }

    /// Surround a walk between the ToRs of `src` and `dst` with the
    /// server hops.
    pub(crate) fn wrap(&self, src: NodeId, dst: NodeId, between_tors: &[Hop]) -> Option<Vec<Hop>> {
        if self.details.are_tors_endpoints() {
            return Some(between_tors.to_vec());
        }
        let mut hops = Vec::with_capacity(between_tors.len() + 2);
        hops.push(*self.up.get(&src)?);
        hops.extend_from_slice(between_tors);
        hops.push(*self.down.get(&dst)?);
        Some(hops)
    }
}

fn first_hop(network: &Network, from: NodeId, to: NodeId) -> Option<Hop> {
    network
        .links_between(from, to)
        .first()
        .map(|&link| Hop { link, from, to })
}

/// Give `connection` the single path chosen by `choose`, or no flow at all
/// if there is none.
pub(crate) fn assign_single_path(
    ctx: &mut SimContext,
    connection: ConnectionId,
    strategy: &'static str,
    choose: impl FnOnce(NodeId, NodeId) -> Option<AcyclicPath>,
) -> Result<(), SimError> {
    let (src, dst) = endpoints(ctx, connection)?;
    match choose(src, dst) {
        Some(path) => {
            ctx.add_flow_to_connection(connection, path)?;
        }
        None => unroutable(connection, src, dst, strategy),
    }
    Ok(())
}

pub(crate) fn endpoints(
    ctx: &SimContext,
    connection: ConnectionId,
) -> Result<(NodeId, NodeId), SimError> {
    let connection = ctx
        .network()
        .connection(connection)
        .ok_or(NetworkError::ConnectionNotFound { connection })?;
    Ok((connection.src(), connection.dst()))
}

pub(crate) fn unroutable(connection: ConnectionId, src: NodeId, dst: NodeId, strategy: &'static str) {
    tracing::warn!(
        %connection,
        %src,
        %dst,
        strategy,
        "no route, the connection gets no flow"
    );
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::{
        log::VoidSink,
        network::Network,
        sim_context::SimContext,
        sim_id::{ConnectionId, NodeId},
        time::Time,
        topology::{testing::properties, Topology},
    };

    /// Bidirectional ring 0 - 1 - 2 - 3 - 0 of ToRs, no server.
    pub(crate) fn ring() -> Topology {
        Topology::from_properties(&properties(
            4,
            4,
            "set(0,1,2,3)",
            "set(0,1,2,3)",
            "set()",
            "set(0-1,1-2,2-3,0-3)",
            "10",
        ))
        .unwrap()
    }

    /// A running context over `network`.
    pub(crate) fn running(network: Network) -> SimContext {
        let mut ctx = SimContext::new(network, 1e-10, Box::new(VoidSink)).unwrap();
        ctx.begin(Time::new(1_000_000)).unwrap();
        ctx
    }

    /// An active connection between `src` and `dst`, without flows.
    pub(crate) fn active(ctx: &mut SimContext, src: u64, dst: u64) -> ConnectionId {
        let connection = ctx
            .create_connection(NodeId::new(src), NodeId::new(dst), 1_000.0)
            .unwrap();
        ctx.activate_connection(connection).unwrap();
        connection
    }
}

#[cfg(test)]
mod tests {
    use super::{testing::*, *};
    use crate::topology::testing::leaf_spine;
    use rand_chacha::ChaChaRng;
    use rand_core::SeedableRng as _;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    #[test]
    fn uniform_index_covers_the_range() {
        let mut rng = ChaChaRng::seed_from_u64(7);
        let mut counts = [0usize; 3];
        for _ in 0..3_000 {
            counts[uniform_index(&mut rng, 3)] += 1;
        }
        for count in counts {
            assert!(count > 800, "{counts:?}");
        }
        assert_eq!(uniform_index(&mut rng, 1), 0);
    }

    #[test]
    fn ring_next_hops() {
        let topology = ring();
        let next = NextHops::compute(topology.network(), topology.details(), false);

        let towards_2: Vec<_> = next.get(n(0), n(2)).iter().map(|hop| hop.to).collect();
        assert_eq!(towards_2, vec![n(1), n(3)]);
        let towards_1: Vec<_> = next.get(n(0), n(1)).iter().map(|hop| hop.to).collect();
        assert_eq!(towards_1, vec![n(1)]);
        assert!(next.get(n(0), n(0)).is_empty());
    }

    #[test]
    fn access_wraps_server_hops() {
        let topology = leaf_spine(2, 1, 2, 1.0);
        let access = Access::new(topology.network(), topology.details());
        // switches 0, 1 (ToRs) and 2 (spine), servers 3 and 4 on 0, 5 and 6 on 1
        assert_eq!(access.tors(n(3), n(6)), Some((n(0), n(1))));
        assert_eq!(access.tors(n(0), n(6)), None);

        let middle = topology
            .network()
            .path_through(&[n(0), n(2), n(1)])
            .unwrap();
        let hops = access.wrap(n(3), n(6), middle.hops()).unwrap();
        let path = AcyclicPath::new(hops).unwrap();
        let nodes: Vec<_> = path.nodes().collect();
        assert_eq!(nodes, vec![n(3), n(0), n(2), n(1), n(6)]);
    }

    #[test]
    fn void_adds_nothing() {
        let mut ctx = running(ring().into_parts().0);
        let connection = active(&mut ctx, 0, 2);
        VoidRouting.assign_start_flows(&mut ctx, connection).unwrap();
        assert_eq!(ctx.network().num_active_flows(), 0);
    }
}
