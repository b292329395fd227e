use super::{assign_single_path, uniform_index, Access, NextHops, RoutingError};
use crate::{
    path::{convert_to_acyclic, AcyclicPath},
    policy::RoutingStrategy,
    sim_context::{SimContext, SimError},
    sim_id::{ConnectionId, NodeId},
    topology::Topology,
};
use rand_core::Rng;
use std::collections::BTreeSet;

/// Valiant load balancing.
///
/// Every connection gets a single flow which first goes to an intermediate
/// switch chosen uniformly at random among the valiant nodes, then to the
/// destination ToR, both legs along random shortest paths. The walk ends
/// as soon as it reaches the destination ToR, and the loops it made are
/// cut out.
///
/// When the two endpoints hang off the same ToR, no intermediate switch is
/// visited.
#[derive(Debug, Clone)]
pub struct ValiantRouting<R> {
    access: Access,
    next_hops: NextHops,
    valiant_nodes: Vec<NodeId>,
    resample_tors: bool,
    rng: R,
}

impl<R: Rng> ValiantRouting<R> {
    /// Route through the given `valiant_nodes`, which must be switches.
    ///
    /// Unless `permit_tors_and_resample`, none of them may be a ToR. If it
    /// is set, ToRs are accepted and the intermediate switch is never the
    /// source or destination ToR of the connection.
    pub fn new(
        topology: &Topology,
        valiant_nodes: impl IntoIterator<Item = NodeId>,
        permit_tors_and_resample: bool,
        rng: R,
    ) -> Result<Self, RoutingError> {
        let details = topology.details();
        if details.tors().is_empty() {
            return Err(RoutingError::NoTor);
        }
        let valiant_nodes: BTreeSet<NodeId> = valiant_nodes.into_iter().collect();
        if valiant_nodes.is_empty() {
            return Err(RoutingError::NoValiantNode);
        }
        for &node in &valiant_nodes {
            if !details.is_switch(node) {
                return Err(RoutingError::ValiantNodeNotSwitch { node });
            }
            if !permit_tors_and_resample && details.is_tor(node) {
                return Err(RoutingError::ValiantNodeIsTor { node });
            }
        }

        let next_hops = NextHops::compute(topology.network(), details, true);
        tracing::info!(
            valiant_nodes = valiant_nodes.len(),
            "valiant routing tables computed"
        );
        Ok(Self {
            access: Access::new(topology.network(), details),
            next_hops,
            valiant_nodes: valiant_nodes.into_iter().collect(),
            resample_tors: permit_tors_and_resample,
            rng,
        })
    }

    /// Route through any switch, ToRs included.
    pub fn through_all_switches(topology: &Topology, rng: R) -> Result<Self, RoutingError> {
        let switches = topology.details().switches().clone();
        Self::new(topology, switches, true, rng)
    }

    pub fn valiant_nodes(&self) -> &[NodeId] {
        &self.valiant_nodes
    }

    /// `None` if every valiant node is excluded.
    fn pick_valiant(&mut self, src_tor: NodeId, dst_tor: NodeId) -> Option<NodeId> {
        if !self.resample_tors {
            let index = uniform_index(&mut self.rng, self.valiant_nodes.len());
            return Some(self.valiant_nodes[index]);
        }
        let allowed: Vec<NodeId> = self
            .valiant_nodes
            .iter()
            .copied()
            .filter(|&node| node != src_tor && node != dst_tor)
            .collect();
        if allowed.is_empty() {
            return None;
        }
        Some(allowed[uniform_index(&mut self.rng, allowed.len())])
    }

    pub fn choose_path(&mut self, src: NodeId, dst: NodeId) -> Option<AcyclicPath> {
        let (src_tor, dst_tor) = self.access.tors(src, dst)?;

        let mut walk = Vec::new();
        if src_tor != dst_tor {
            let valiant = self.pick_valiant(src_tor, dst_tor);
            let mut passed = valiant.is_none();
            let mut at = src_tor;
            while at != dst_tor {
                let towards = match valiant {
                    Some(valiant) if !passed => valiant,
                    _ => dst_tor,
                };
                let candidates = self.next_hops.get(at, towards);
                if candidates.is_empty() {
                    return None;
                }
                let hop = candidates[uniform_index(&mut self.rng, candidates.len())];
                walk.push(hop);
                at = hop.to;
                if Some(at) == valiant {
                    passed = true;
                }
            }
        }

        let walk = self.access.wrap(src, dst, &walk)?;
        convert_to_acyclic(&walk).ok()
    }
}

impl<R: Rng> RoutingStrategy for ValiantRouting<R> {
    fn assign_start_flows(
        &mut self,
        ctx: &mut SimContext,
        connection: ConnectionId,
    ) -> Result<(), SimError> {
        assign_single_path(ctx, connection, "valiant", |src, dst| {
            self.choose_path(src, dst)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::testing::ring;
    use crate::topology::testing::leaf_spine;
    use rand_chacha::ChaChaRng;
    use rand_core::SeedableRng as _;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    fn nodes(path: &AcyclicPath) -> Vec<u64> {
        path.nodes().map(NodeId::into_u64).collect()
    }

    fn rng() -> ChaChaRng {
        ChaChaRng::seed_from_u64(11)
    }

    #[test]
    fn construction_checks() {
        let topology = leaf_spine(2, 2, 1, 1.0);
        // ToRs 0 and 1, spines 2 and 3, servers 4 and 5
        assert!(ValiantRouting::new(&topology, [n(2), n(3)], false, rng()).is_ok());
        assert!(matches!(
            ValiantRouting::new(&topology, [n(0), n(2)], false, rng()),
            Err(RoutingError::ValiantNodeIsTor { node }) if node == n(0)
        ));
        assert!(ValiantRouting::new(&topology, [n(0), n(2)], true, rng()).is_ok());
        assert!(matches!(
            ValiantRouting::new(&topology, [n(4)], true, rng()),
            Err(RoutingError::ValiantNodeNotSwitch { node }) if node == n(4)
        ));
        assert!(matches!(
            ValiantRouting::new(&topology, Vec::new(), true, rng()),
            Err(RoutingError::NoValiantNode)
        ));
    }

    #[test]
    fn goes_through_the_spines() {
        let topology = leaf_spine(2, 2, 1, 1.0);
        let mut valiant = ValiantRouting::new(&topology, [n(2), n(3)], false, rng()).unwrap();
        for _ in 0..50 {
            let path = nodes(&valiant.choose_path(n(4), n(5)).unwrap());
            assert!(path == vec![4, 0, 2, 1, 5] || path == vec![4, 0, 3, 1, 5], "{path:?}");
        }
    }

    #[test]
    fn detour_through_a_far_switch() {
        let topology = ring();
        // 0 -> 2 with 1 as only valiant node: the shortest walk 0-1-2
        let mut valiant = ValiantRouting::new(&topology, [n(1)], true, rng()).unwrap();
        assert_eq!(nodes(&valiant.choose_path(n(0), n(2)).unwrap()), vec![0, 1, 2]);

        // 0 -> 1 through 2: 0-1 would end the walk early, 0-3-2-1 goes round
        let mut valiant = ValiantRouting::new(&topology, [n(2)], true, rng()).unwrap();
        for _ in 0..20 {
            let path = nodes(&valiant.choose_path(n(0), n(1)).unwrap());
            assert!(path == vec![0, 1] || path == vec![0, 3, 2, 1], "{path:?}");
        }
    }

    #[test]
    fn resampling_avoids_the_endpoint_tors() {
        let topology = ring();
        let mut valiant = ValiantRouting::through_all_switches(&topology, rng()).unwrap();
        assert_eq!(valiant.valiant_nodes(), &[n(0), n(1), n(2), n(3)]);
        for _ in 0..100 {
            let picked = valiant.pick_valiant(n(0), n(1)).unwrap();
            assert!(picked == n(2) || picked == n(3));
        }

        // only the endpoints are valiant nodes: straight to the destination
        let mut valiant = ValiantRouting::new(&topology, [n(0), n(2)], true, rng()).unwrap();
        let path = nodes(&valiant.choose_path(n(0), n(2)).unwrap());
        assert!(path == vec![0, 1, 2] || path == vec![0, 3, 2], "{path:?}");
    }

    #[test]
    fn same_tor_skips_the_detour() {
        let topology = leaf_spine(1, 1, 2, 1.0);
        // ToR 0, spine 1, servers 2 and 3
        let mut valiant = ValiantRouting::new(&topology, [n(1)], false, rng()).unwrap();
        assert_eq!(nodes(&valiant.choose_path(n(2), n(3)).unwrap()), vec![2, 0, 3]);
    }
}
