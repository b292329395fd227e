use crate::{network::Network, sim_id::NodeId};

/// Distance between two nodes which are not connected.
///
/// Small enough that adding two of them does not overflow.
pub const INFINITE_DISTANCE: u32 = 999_999_999;

/// All pairs shortest hop counts.
///
/// ```
/// # use floodns_core::{graph::{HopDistances, INFINITE_DISTANCE}, network::Network, NodeId};
/// let mut network = Network::new(3);
/// network.add_link(NodeId::new(0), NodeId::new(1), 1.0).unwrap();
/// network.add_link(NodeId::new(1), NodeId::new(2), 1.0).unwrap();
///
/// let distances = HopDistances::floyd_warshall(&network);
/// assert_eq!(distances.get(NodeId::new(0), NodeId::new(2)), 2);
/// assert_eq!(distances.get(NodeId::new(2), NodeId::new(0)), INFINITE_DISTANCE);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopDistances {
    num_nodes: usize,
    distances: Vec<u32>,
}

impl HopDistances {
    /// Run Floyd-Warshall over the links present in `network`.
    ///
    /// `O(n^3)` in time and `O(n^2)` in memory for `n` nodes.
    pub fn floyd_warshall(network: &Network) -> Self {
        let n = network.num_nodes();
        let mut distances = vec![INFINITE_DISTANCE; n * n];
        for i in 0..n {
            distances[i * n + i] = 0;
        }
        for link in network.links() {
            let (from, to) = (link.from().index(), link.to().index());
            distances[from * n + to] = 1;
        }

        for k in 0..n {
            for i in 0..n {
                let ik = distances[i * n + k];
                if ik == INFINITE_DISTANCE {
                    continue;
                }
                for j in 0..n {
                    let through = ik + distances[k * n + j];
                    if through < distances[i * n + j] {
                        distances[i * n + j] = through;
                    }
                }
            }
        }

        Self {
            num_nodes: n,
            distances,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Hop count of the shortest path from `from` to `to`,
    /// [`INFINITE_DISTANCE`] if there is none or if a node is out of range.
    pub fn get(&self, from: NodeId, to: NodeId) -> u32 {
        let (i, j) = (from.index(), to.index());
        if i >= self.num_nodes || j >= self.num_nodes {
            return INFINITE_DISTANCE;
        }
        self.distances[i * self.num_nodes + j]
    }

    pub fn is_reachable(&self, from: NodeId, to: NodeId) -> bool {
        self.get(from, to) < INFINITE_DISTANCE
    }
}
