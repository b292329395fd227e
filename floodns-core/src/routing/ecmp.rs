use super::{assign_single_path, uniform_index, Access, NextHops};
use crate::{
    network::Network,
    path::AcyclicPath,
    policy::RoutingStrategy,
    sim_context::{SimContext, SimError},
    sim_id::{ConnectionId, NodeId},
    topology::{Topology, TopologyDetails},
};
use rand_core::Rng;

/// Equal-cost multi-path routing.
///
/// Every connection gets a single flow. From the source ToR, each switch
/// on the way picks uniformly at random one of its outgoing links that
/// lies on a shortest path to the destination ToR.
#[derive(Debug, Clone)]
pub struct EcmpRouting<R> {
    access: Access,
    next_hops: NextHops,
    rng: R,
}

impl<R: Rng> EcmpRouting<R> {
    pub fn new(topology: &Topology, rng: R) -> Self {
        Self::with_network(topology.network(), topology.details(), rng)
    }

    pub fn with_network(network: &Network, details: &TopologyDetails, rng: R) -> Self {
        let next_hops = NextHops::compute(network, details, false);
        tracing::info!(tors = details.tors().len(), "ECMP routing tables computed");
        Self {
            access: Access::new(network, details),
            next_hops,
            rng,
        }
    }

    /// A random shortest path from `src` to `dst`, `None` if there is none
    /// or if they are not endpoints of the topology.
    pub fn choose_path(&mut self, src: NodeId, dst: NodeId) -> Option<AcyclicPath> {
        let (src_tor, dst_tor) = self.access.tors(src, dst)?;

        let mut hops = Vec::new();
        let mut at = src_tor;
        while at != dst_tor {
            let candidates = self.next_hops.get(at, dst_tor);
            if candidates.is_empty() {
                return None;
            }
            let hop = candidates[uniform_index(&mut self.rng, candidates.len())];
            hops.push(hop);
            at = hop.to;
        }

        let hops = self.access.wrap(src, dst, &hops)?;
        AcyclicPath::new(hops).ok()
    }
}

impl<R: Rng> RoutingStrategy for EcmpRouting<R> {
    fn assign_start_flows(
        &mut self,
        ctx: &mut SimContext,
        connection: ConnectionId,
    ) -> Result<(), SimError> {
        assign_single_path(ctx, connection, "ecmp", |src, dst| self.choose_path(src, dst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::testing::{active, ring, running};
    use crate::topology::testing::leaf_spine;
    use rand_chacha::ChaChaRng;
    use rand_core::SeedableRng as _;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    fn nodes(path: &AcyclicPath) -> Vec<u64> {
        path.nodes().map(NodeId::into_u64).collect()
    }

    #[test]
    fn ring_splits_evenly() {
        let topology = ring();
        let mut ecmp = EcmpRouting::new(&topology, ChaChaRng::seed_from_u64(42));

        let mut through_1 = 0;
        let mut through_3 = 0;
        for _ in 0..1_000 {
            let path = ecmp.choose_path(n(0), n(2)).unwrap();
            match nodes(&path).as_slice() {
                [0, 1, 2] => through_1 += 1,
                [0, 3, 2] => through_3 += 1,
                other => panic!("unexpected path {other:?}"),
            }
        }
        assert!(through_1 >= 300, "{through_1} vs {through_3}");
        assert!(through_3 >= 300, "{through_1} vs {through_3}");
    }

    #[test]
    fn neighbours_take_the_direct_link() {
        let topology = ring();
        let mut ecmp = EcmpRouting::new(&topology, ChaChaRng::seed_from_u64(1));
        for _ in 0..20 {
            assert_eq!(nodes(&ecmp.choose_path(n(1), n(2)).unwrap()), vec![1, 2]);
        }
    }

    #[test]
    fn servers_go_through_their_tors() {
        let topology = leaf_spine(2, 2, 1, 1.0);
        // ToRs 0 and 1, spines 2 and 3, servers 4 on 0 and 5 on 1
        let mut ecmp = EcmpRouting::new(&topology, ChaChaRng::seed_from_u64(3));
        let path = nodes(&ecmp.choose_path(n(4), n(5)).unwrap());
        assert!(path == vec![4, 0, 2, 1, 5] || path == vec![4, 0, 3, 1, 5], "{path:?}");

        // not endpoints
        assert!(ecmp.choose_path(n(0), n(5)).is_none());
    }

    #[test]
    fn same_tor_servers() {
        let topology = leaf_spine(1, 1, 2, 1.0);
        // ToR 0, spine 1, servers 2 and 3
        let mut ecmp = EcmpRouting::new(&topology, ChaChaRng::seed_from_u64(3));
        assert_eq!(nodes(&ecmp.choose_path(n(2), n(3)).unwrap()), vec![2, 0, 3]);
    }

    #[test]
    fn assigns_one_flow() {
        let topology = ring();
        let mut ecmp = EcmpRouting::new(&topology, ChaChaRng::seed_from_u64(5));
        let mut ctx = running(topology.into_parts().0);
        let connection = active(&mut ctx, 3, 1);

        ecmp.assign_start_flows(&mut ctx, connection).unwrap();
        let flows: Vec<_> = ctx.network().connection(connection).unwrap().active_flows().collect();
        assert_eq!(flows.len(), 1);
        let flow = ctx.network().flow(flows[0]).unwrap();
        assert_eq!(flow.path().src(), n(3));
        assert_eq!(flow.path().dst(), n(1));
        assert_eq!(flow.path().len(), 2);
    }

    #[test]
    fn unreachable_gets_no_flow() {
        // node 2 is isolated
        let topology = Topology::from_properties(&crate::topology::testing::properties(
            3,
            1,
            "set(0,1,2)",
            "set(0,1,2)",
            "set()",
            "set(0-1)",
            "1",
        ))
        .unwrap();
        let mut ecmp = EcmpRouting::new(&topology, ChaChaRng::seed_from_u64(5));
        let mut ctx = running(topology.into_parts().0);
        let connection = active(&mut ctx, 0, 2);

        ecmp.assign_start_flows(&mut ctx, connection).unwrap();
        assert_eq!(ctx.network().num_active_flows(), 0);
        assert!(ctx.network().connection(connection).unwrap().is_active());
    }
}
