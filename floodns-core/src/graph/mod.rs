//! Graph algorithms over the links present in a [`Network`].
//!
//! Both algorithms count hops: every link weighs one.
//!
//! [`Network`]: crate::network::Network

mod floyd_warshall;
mod yen;

pub use self::{
    floyd_warshall::{HopDistances, INFINITE_DISTANCE},
    yen::YenKsp,
};
use crate::{path::PathError, sim_id::NodeId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("more than one link from {from} to {to}, the graph must be simple")]
    ParallelLinks { from: NodeId, to: NodeId },
    #[error("node {node} is out of range, the graph has {num_nodes} nodes")]
    NodeOutOfRange { node: NodeId, num_nodes: usize },
    #[error(transparent)]
    Path(#[from] PathError),
}
