//! Data center topologies described in a properties file.
//!
//! ```text
//! num_nodes=7
//! num_undirected_edges=6
//! switches=set(0,1,2,3)
//! switches_which_are_tors=set(1,3)
//! servers=set(4,5,6)
//! undirected_edges=set(0-1,1-2,2-3,3-4,1-5,1-6)
//! link_data_rate_bit_per_ns=10
//! ```
//!
//! Every undirected edge `a-b` becomes two links, `a->b` then `b->a`,
//! created in ascending edge order. When the topology has servers, each
//! of them hangs off exactly one ToR and the servers are the endpoints of
//! the connections; otherwise the ToRs are.

mod value;

pub use self::value::{DataRate, ValueError};
use crate::{
    network::{Network, NetworkError},
    properties::{Properties, PropertiesError},
    sim_id::NodeId,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};
use thiserror::Error;

pub const NUM_NODES: &str = "num_nodes";
pub const NUM_UNDIRECTED_EDGES: &str = "num_undirected_edges";
pub const SWITCHES: &str = "switches";
pub const SWITCHES_WHICH_ARE_TORS: &str = "switches_which_are_tors";
pub const SERVERS: &str = "servers";
pub const UNDIRECTED_EDGES: &str = "undirected_edges";
pub const LINK_DATA_RATE: &str = "link_data_rate_bit_per_ns";

const KEYS: [&str; 7] = [
    NUM_NODES,
    NUM_UNDIRECTED_EDGES,
    SWITCHES,
    SWITCHES_WHICH_ARE_TORS,
    SERVERS,
    UNDIRECTED_EDGES,
    LINK_DATA_RATE,
];

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error(transparent)]
    Properties(#[from] PropertiesError),
    #[error("invalid value of {key}")]
    Value {
        key: &'static str,
        #[source]
        source: ValueError,
    },
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("node {node} is out of range, the topology has {num_nodes} nodes")]
    NodeOutOfRange { node: NodeId, num_nodes: usize },
    #[error("ToR {node} is not a switch")]
    TorNotSwitch { node: NodeId },
    #[error("node {node} is both a switch and a server")]
    SwitchIsServer { node: NodeId },
    #[error("node {node} is neither a switch nor a server")]
    Uncovered { node: NodeId },
    #[error("servers {a} and {b} are directly connected")]
    ServerToServer { a: NodeId, b: NodeId },
    #[error("server {server} is connected to {node} which is not a ToR")]
    ServerNotOnTor { server: NodeId, node: NodeId },
    #[error("server {server} has {edges} edges, it must have exactly one")]
    ServerEdges { server: NodeId, edges: usize },
    #[error("link data rate of {from}->{to} is missing or refers to no edge")]
    DataRateCoverage { from: NodeId, to: NodeId },
    #[error("link data rate of {from}->{to} must be finite and non-negative, got {rate}")]
    InvalidDataRate { from: NodeId, to: NodeId, rate: f64 },
    #[error("{declared} undirected edges declared but {defined} defined")]
    EdgeCount { declared: u64, defined: usize },
}

/// The roles of the nodes of a topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyDetails {
    num_nodes: usize,
    num_undirected_edges: usize,
    switches: BTreeSet<NodeId>,
    tors: BTreeSet<NodeId>,
    servers: BTreeSet<NodeId>,
    tor_of_server: BTreeMap<NodeId, NodeId>,
    servers_of_tor: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl TopologyDetails {
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_undirected_edges(&self) -> usize {
        self.num_undirected_edges
    }

    pub fn switches(&self) -> &BTreeSet<NodeId> {
        &self.switches
    }

    /// the switches which are Top of Rack
    pub fn tors(&self) -> &BTreeSet<NodeId> {
        &self.tors
    }

    pub fn servers(&self) -> &BTreeSet<NodeId> {
        &self.servers
    }

    pub fn is_switch(&self, node: NodeId) -> bool {
        self.switches.contains(&node)
    }

    pub fn is_tor(&self, node: NodeId) -> bool {
        self.tors.contains(&node)
    }

    pub fn is_server(&self, node: NodeId) -> bool {
        self.servers.contains(&node)
    }

    /// Without servers, the ToRs are the endpoints of connections.
    pub fn are_tors_endpoints(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn endpoints(&self) -> &BTreeSet<NodeId> {
        if self.are_tors_endpoints() {
            &self.tors
        } else {
            &self.servers
        }
    }

    pub fn is_valid_endpoint(&self, node: NodeId) -> bool {
        self.endpoints().contains(&node)
    }

    pub fn tor_of_server(&self, server: NodeId) -> Option<NodeId> {
        self.tor_of_server.get(&server).copied()
    }

    /// The ToR an endpoint belongs to: itself if the ToRs are the
    /// endpoints.
    pub fn tor_of_endpoint(&self, endpoint: NodeId) -> Option<NodeId> {
        if self.are_tors_endpoints() {
            self.is_tor(endpoint).then_some(endpoint)
        } else {
            self.tor_of_server(endpoint)
        }
    }

    pub fn servers_of_tor(&self, tor: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.servers_of_tor.get(&tor).into_iter().flatten().copied()
    }
}

/// A [`Network`] built from a topology description, along with the role
/// of its nodes.
#[derive(Debug)]
pub struct Topology {
    network: Network,
    details: TopologyDetails,
}

impl Topology {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TopologyError> {
        let path = path.as_ref();
        let topology = Self::from_properties(&Properties::load(path)?)?;
        tracing::info!(
            path = %path.display(),
            nodes = topology.details.num_nodes,
            links = topology.network.num_links(),
            "topology loaded"
        );
        Ok(topology)
    }

    /// Build the topology with the link capacities of its data rate
    /// property.
    pub fn from_properties(properties: &Properties) -> Result<Self, TopologyError> {
        Self::build(properties, None)
    }

    /// Build the topology with the capacity of every link given by
    /// `capacity(from, to)`. The data rate property is still checked.
    pub fn from_properties_with<F>(properties: &Properties, mut capacity: F) -> Result<Self, TopologyError>
    where
        F: FnMut(NodeId, NodeId) -> f64,
    {
        Self::build(properties, Some(&mut capacity))
    }

    fn build(
        properties: &Properties,
        mut capacity: Option<&mut dyn FnMut(NodeId, NodeId) -> f64>,
    ) -> Result<Self, TopologyError> {
        properties.validate(&KEYS, &[])?;

        let num_nodes = properties.u64(NUM_NODES)? as usize;
        let declared_edges = properties.u64(NUM_UNDIRECTED_EDGES)?;
        let switches = node_set(properties, SWITCHES)?;
        let tors = node_set(properties, SWITCHES_WHICH_ARE_TORS)?;
        let servers = node_set(properties, SERVERS)?;
        let edges = parse_value(properties, UNDIRECTED_EDGES, value::parse_edge_set)?;
        let rate = parse_value(properties, LINK_DATA_RATE, value::parse_data_rate)?;

        let in_range = |node: NodeId| {
            if node.index() < num_nodes {
                Ok(())
            } else {
                Err(TopologyError::NodeOutOfRange { node, num_nodes })
            }
        };
        for &node in switches.iter().chain(&tors).chain(&servers) {
            in_range(node)?;
        }
        for &(a, b) in &edges {
            in_range(a)?;
            in_range(b)?;
        }

        if let Some(&node) = tors.difference(&switches).next() {
            return Err(TopologyError::TorNotSwitch { node });
        }
        if let Some(&node) = switches.intersection(&servers).next() {
            return Err(TopologyError::SwitchIsServer { node });
        }
        if let Some(node) = (0..num_nodes as u64)
            .map(NodeId::new)
            .find(|node| !switches.contains(node) && !servers.contains(node))
        {
            return Err(TopologyError::Uncovered { node });
        }

        let mut tor_of_server = BTreeMap::new();
        let mut servers_of_tor: BTreeMap<NodeId, BTreeSet<NodeId>> =
            tors.iter().map(|&tor| (tor, BTreeSet::new())).collect();
        let mut server_edges: BTreeMap<NodeId, usize> = BTreeMap::new();
        for &(a, b) in &edges {
            if servers.contains(&a) && servers.contains(&b) {
                return Err(TopologyError::ServerToServer { a, b });
            }
            for (server, node) in [(a, b), (b, a)] {
                if !servers.contains(&server) {
                    continue;
                }
                if !tors.contains(&node) {
                    return Err(TopologyError::ServerNotOnTor { server, node });
                }
                *server_edges.entry(server).or_default() += 1;
                tor_of_server.insert(server, node);
                servers_of_tor.entry(node).or_default().insert(server);
            }
        }
        for &server in &servers {
            let edges = server_edges.get(&server).copied().unwrap_or(0);
            if edges != 1 {
                return Err(TopologyError::ServerEdges { server, edges });
            }
        }

        if let DataRate::PerLink(rates) = &rate {
            for &(from, to) in rates.keys() {
                let (a, b) = if from <= to { (from, to) } else { (to, from) };
                if !edges.contains(&(a, b)) {
                    return Err(TopologyError::DataRateCoverage { from, to });
                }
            }
        }

        let mut network = Network::new(num_nodes);
        for &(a, b) in &edges {
            for (from, to) in [(a, b), (b, a)] {
                let file_rate = rate
                    .get(from, to)
                    .ok_or(TopologyError::DataRateCoverage { from, to })?;
                if !file_rate.is_finite() || file_rate < 0.0 {
                    return Err(TopologyError::InvalidDataRate {
                        from,
                        to,
                        rate: file_rate,
                    });
                }
                let link_capacity = match capacity.as_mut() {
                    Some(capacity) => capacity(from, to),
                    None => file_rate,
                };
                network.add_link(from, to, link_capacity)?;
            }
        }

        if network.num_links() as u64 != declared_edges * 2 {
            return Err(TopologyError::EdgeCount {
                declared: declared_edges,
                defined: edges.len(),
            });
        }

        let details = TopologyDetails {
            num_nodes,
            num_undirected_edges: edges.len(),
            switches,
            tors,
            servers,
            tor_of_server,
            servers_of_tor,
        };
        Ok(Self { network, details })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn details(&self) -> &TopologyDetails {
        &self.details
    }

    pub fn into_parts(self) -> (Network, TopologyDetails) {
        (self.network, self.details)
    }
}

fn parse_value<T>(
    properties: &Properties,
    key: &'static str,
    parse: impl FnOnce(&str) -> Result<T, ValueError>,
) -> Result<T, TopologyError> {
    let raw = properties.string(key)?;
    parse(&raw).map_err(|source| TopologyError::Value { key, source })
}

fn node_set(properties: &Properties, key: &'static str) -> Result<BTreeSet<NodeId>, TopologyError> {
    parse_value(properties, key, value::parse_node_set)
}
