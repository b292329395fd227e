use super::{assign_single_path, uniform_index, Access, RoutingError};
use crate::{
    graph::YenKsp,
    network::Network,
    path::AcyclicPath,
    policy::RoutingStrategy,
    sim_context::{SimContext, SimError},
    sim_id::{ConnectionId, NodeId},
    topology::{Topology, TopologyDetails},
};
use rand_core::Rng;
use std::collections::BTreeMap;

/// Paths between ToRs, keyed by (source ToR, destination ToR).
pub(crate) type PathTable = BTreeMap<(NodeId, NodeId), Vec<AcyclicPath>>;

/// The `k` shortest paths between every ordered pair of distinct ToRs.
pub(crate) fn ksp_table(
    network: &Network,
    details: &TopologyDetails,
    k: usize,
) -> Result<PathTable, RoutingError> {
    let yen = YenKsp::new(network)?;
    let tors = details.tors();
    if tors.is_empty() {
        return Err(RoutingError::NoTor);
    }

    let mut table = PathTable::new();
    for (done, &src) in tors.iter().enumerate() {
        for &dst in tors {
            if src != dst {
                table.insert((src, dst), yen.shortest_paths(src, dst, k)?);
            }
        }
        tracing::debug!(
            done = done + 1,
            total = tors.len(),
            "k shortest paths from {src} computed"
        );
    }
    tracing::info!(k, pairs = table.len(), "k shortest paths computed");
    Ok(table)
}

/// K-shortest-path routing: every connection gets a single flow, along
/// one of the `k` shortest paths between its ToRs chosen uniformly at
/// random.
#[derive(Debug, Clone)]
pub struct KspRouting<R> {
    access: Access,
    paths: PathTable,
    rng: R,
}

impl<R: Rng> KspRouting<R> {
    pub fn new(topology: &Topology, k: usize, rng: R) -> Result<Self, RoutingError> {
        let paths = ksp_table(topology.network(), topology.details(), k)?;
        Ok(Self {
            access: Access::new(topology.network(), topology.details()),
            paths,
            rng,
        })
    }

    /// The shortest paths between two ToRs.
    pub fn paths_between(&self, src_tor: NodeId, dst_tor: NodeId) -> &[AcyclicPath] {
        self.paths
            .get(&(src_tor, dst_tor))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn choose_path(&mut self, src: NodeId, dst: NodeId) -> Option<AcyclicPath> {
        let (src_tor, dst_tor) = self.access.tors(src, dst)?;
        let between_tors = if src_tor == dst_tor {
            &[][..]
        } else {
            let candidates = self.paths.get(&(src_tor, dst_tor))?;
            if candidates.is_empty() {
                return None;
            }
            candidates[uniform_index(&mut self.rng, candidates.len())].hops()
        };
        let hops = self.access.wrap(src, dst, between_tors)?;
        AcyclicPath::new(hops).ok()
    }
}

impl<R: Rng> RoutingStrategy for KspRouting<R> {
    fn assign_start_flows(
        &mut self,
        ctx: &mut SimContext,
        connection: ConnectionId,
    ) -> Result<(), SimError> {
        assign_single_path(ctx, connection, "ksp", |src, dst| self.choose_path(src, dst))
    }
}
