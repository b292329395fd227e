use super::{endpoints, ksp::ksp_table, unroutable, Access, RoutingError};
use crate::{
    path::AcyclicPath,
    policy::RoutingStrategy,
    sim_context::{SimContext, SimError},
    sim_id::{ConnectionId, NodeId},
    topology::Topology,
};
use std::collections::BTreeMap;

/// One flow per path: a connection gets a flow along every path of the
/// table between its source and destination ToRs.
///
/// Endpoints under the same ToR get a single flow through it.
#[derive(Debug, Clone)]
pub struct MultiPathRouting {
    access: Access,
    paths: BTreeMap<(NodeId, NodeId), Vec<AcyclicPath>>,
}

impl MultiPathRouting {
    /// Use the given paths, keyed by (source ToR, destination ToR). Each
    /// must go from the first ToR of its key to the second.
    pub fn new(
        topology: &Topology,
        paths: BTreeMap<(NodeId, NodeId), Vec<AcyclicPath>>,
    ) -> Self {
        Self {
            access: Access::new(topology.network(), topology.details()),
            paths,
        }
    }

    /// One flow along each of the `k` shortest paths.
    pub fn k_shortest(topology: &Topology, k: usize) -> Result<Self, RoutingError> {
        let paths = ksp_table(topology.network(), topology.details(), k)?;
        Ok(Self::new(topology, paths))
    }

    /// Every path between the endpoints, empty if there is none.
    pub fn paths(&self, src: NodeId, dst: NodeId) -> Vec<AcyclicPath> {
        let Some((src_tor, dst_tor)) = self.access.tors(src, dst) else {
            return Vec::new();
        };
        if src_tor == dst_tor {
            // servers under the same ToR
            return self
                .access
                .wrap(src, dst, &[])
                .and_then(|hops| AcyclicPath::new(hops).ok())
                .into_iter()
                .collect();
        }

        self.paths
            .get(&(src_tor, dst_tor))
            .into_iter()
            .flatten()
            .filter(|path| path.src() == src_tor && path.dst() == dst_tor)
            .filter_map(|path| self.access.wrap(src, dst, path.hops()))
            .filter_map(|hops| AcyclicPath::new(hops).ok())
            .collect()
    }
}

impl RoutingStrategy for MultiPathRouting {
    fn assign_start_flows(
        &mut self,
        ctx: &mut SimContext,
        connection: ConnectionId,
    ) -> Result<(), SimError> {
        let (src, dst) = endpoints(ctx, connection)?;
        let paths = self.paths(src, dst);
        if paths.is_empty() {
            unroutable(connection, src, dst, "multi-path");
        }
        for path in paths {
            ctx.add_flow_to_connection(connection, path)?;
        }
        Ok(())
    }
}
