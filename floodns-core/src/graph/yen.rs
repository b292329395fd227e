use super::GraphError;
use crate::{
    network::Network,
    path::{AcyclicPath, Hop, PathError},
    sim_id::{LinkId, NodeId},
};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// Yen's K shortest loopless paths.
///
/// The graph is a snapshot of the links present in the network when the
/// searcher is built. It must be simple: two links going from the same
/// node to the same node are rejected.
///
/// Paths are ordered by hop count, equally long paths by their sequence of
/// node identifiers, so the result is fully deterministic.
#[derive(Debug, Clone)]
pub struct YenKsp {
    /// sorted successors of every node
    adjacency: Vec<Vec<NodeId>>,
    links: BTreeMap<(NodeId, NodeId), LinkId>,
}

impl YenKsp {
    pub fn new(network: &Network) -> Result<Self, GraphError> {
        let mut adjacency = vec![Vec::new(); network.num_nodes()];
        let mut links = BTreeMap::new();
        for link in network.links() {
            let (from, to) = (link.from(), link.to());
            if links.insert((from, to), link.id()).is_some() {
                return Err(GraphError::ParallelLinks { from, to });
            }
            adjacency[from.index()].push(to);
        }
        for successors in &mut adjacency {
            successors.sort_unstable();
        }
        Ok(Self { adjacency, links })
    }

    pub fn num_nodes(&self) -> usize {
        self.adjacency.len()
    }

    /// At most `k` shortest loopless paths from `src` to `dst`, shortest
    /// first. There are none from a node to itself.
    pub fn shortest_paths(
        &self,
        src: NodeId,
        dst: NodeId,
        k: usize,
    ) -> Result<Vec<AcyclicPath>, GraphError> {
        self.check(src)?;
        self.check(dst)?;
        if src == dst || k == 0 {
            return Ok(Vec::new());
        }

        let Some(first) = self.bfs(src, dst, &HashSet::new(), &HashSet::new()) else {
            return Ok(Vec::new());
        };

        let mut accepted: Vec<Vec<NodeId>> = vec![first];
        // (hop count, nodes)
        let mut candidates: BTreeSet<(usize, Vec<NodeId>)> = BTreeSet::new();

        while accepted.len() < k {
            let previous = &accepted[accepted.len() - 1];

            for spur_index in 0..previous.len() - 1 {
                let spur = previous[spur_index];
                let root = &previous[..=spur_index];

                let removed_links: HashSet<(NodeId, NodeId)> = accepted
                    .iter()
                    .filter(|path| path.len() > spur_index + 1 && path[..=spur_index] == *root)
                    .map(|path| (path[spur_index], path[spur_index + 1]))
                    .collect();
                let removed_nodes: HashSet<NodeId> = root[..spur_index].iter().copied().collect();

                if let Some(spur_path) = self.bfs(spur, dst, &removed_nodes, &removed_links) {
                    let mut total = root[..spur_index].to_vec();
                    total.extend(spur_path);
                    if !accepted.contains(&total) {
                        candidates.insert((total.len() - 1, total));
                    }
                }
            }

            let Some((_, next)) = candidates.pop_first() else {
                break;
            };
            accepted.push(next);
        }

        accepted
            .iter()
            .map(|nodes| self.to_path(nodes))
            .collect()
    }

    fn check(&self, node: NodeId) -> Result<(), GraphError> {
        if node.index() < self.adjacency.len() {
            Ok(())
        } else {
            Err(GraphError::NodeOutOfRange {
                node,
                num_nodes: self.adjacency.len(),
            })
        }
    }

    /// Shortest path from `src` to `dst` avoiding the given nodes and
    /// links. Of the shortest paths, the one with the smallest sequence of
    /// node identifiers.
    fn bfs(
        &self,
        src: NodeId,
        dst: NodeId,
        removed_nodes: &HashSet<NodeId>,
        removed_links: &HashSet<(NodeId, NodeId)>,
    ) -> Option<Vec<NodeId>> {
        let mut parent: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        let mut visited: HashSet<NodeId> = HashSet::from([src]);
        let mut queue = VecDeque::from([src]);

        while let Some(current) = queue.pop_front() {
            if current == dst {
                let mut nodes = vec![dst];
                let mut at = dst;
                while let Some(&previous) = parent.get(&at) {
                    nodes.push(previous);
                    at = previous;
                }
                nodes.reverse();
                return Some(nodes);
            }
            for &next in &self.adjacency[current.index()] {
                if removed_nodes.contains(&next) || removed_links.contains(&(current, next)) {
                    continue;
                }
                if visited.insert(next) {
                    parent.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    fn to_path(&self, nodes: &[NodeId]) -> Result<AcyclicPath, GraphError> {
        let hops = nodes
            .windows(2)
            .map(|pair| {
                let (from, to) = (pair[0], pair[1]);
                self.links
                    .get(&(from, to))
                    .map(|&link| Hop { link, from, to })
                    .ok_or(PathError::NoLink { from, to })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AcyclicPath::new(hops)?)
    }
}
