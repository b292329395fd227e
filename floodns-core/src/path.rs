use crate::sim_id::{LinkId, NodeId};
use std::{collections::HashMap, fmt};
use thiserror::Error;

/// One step of a path: the link taken and the two nodes it joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hop {
    pub link: LinkId,
    pub from: NodeId,
    pub to: NodeId,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("a path needs at least one link")]
    Empty,
    #[error("path is not contiguous: hop {index} starts at {found}, expected {expected}")]
    Discontinuous {
        index: usize,
        expected: NodeId,
        found: NodeId,
    },
    #[error("path visits node {node} twice")]
    Cyclic { node: NodeId },
    #[error("no link from {from} to {to}")]
    NoLink { from: NodeId, to: NodeId },
}

/// A non-empty walk through the network that never visits the same node
/// twice.
///
/// ```
/// # use floodns_core::{path::{AcyclicPath, Hop}, LinkId, NodeId};
/// let hop = |link, from, to| Hop {
///     link: LinkId::new(link),
///     from: NodeId::new(from),
///     to: NodeId::new(to),
/// };
/// let path = AcyclicPath::new(vec![hop(11, 35, 4), hop(22, 4, 99), hop(77, 99, 33)]).unwrap();
///
/// assert_eq!(path.src(), NodeId::new(35));
/// assert_eq!(path.dst(), NodeId::new(33));
/// assert_eq!(path.to_string(), "35-[11]->4-[22]->99-[77]->33");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AcyclicPath {
    hops: Vec<Hop>,
}

impl AcyclicPath {
    pub fn new(hops: Vec<Hop>) -> Result<Self, PathError> {
        let Some(first) = hops.first() else {
            return Err(PathError::Empty);
        };

        let mut visited = vec![first.from];
        for (index, hop) in hops.iter().enumerate() {
            let expected = visited[visited.len() - 1];
            if hop.from != expected {
                return Err(PathError::Discontinuous {
                    index,
                    expected,
                    found: hop.from,
                });
            }
            if visited.contains(&hop.to) {
                return Err(PathError::Cyclic { node: hop.to });
            }
            visited.push(hop.to);
        }

        Ok(Self { hops })
    }

    #[inline]
    pub fn src(&self) -> NodeId {
        self.hops[0].from
    }

    #[inline]
    pub fn dst(&self) -> NodeId {
        self.hops[self.hops.len() - 1].to
    }

    /// number of links in the path, always at least one
    #[inline]
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// always `false`, present for API symmetry with [`AcyclicPath::len`]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    #[inline]
    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    pub fn links(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.hops.iter().map(|hop| hop.link)
    }

    /// the visited nodes, source first
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::once(self.src()).chain(self.hops.iter().map(|hop| hop.to))
    }

    pub fn contains_link(&self, link: LinkId) -> bool {
        self.hops.iter().any(|hop| hop.link == link)
    }

    /// Concatenate `self` and `other`, the latter starting where the former
    /// ends.
    pub fn join(&self, other: &AcyclicPath) -> Result<Self, PathError> {
        let mut hops = self.hops.clone();
        hops.extend_from_slice(&other.hops);
        Self::new(hops)
    }
}

impl fmt::Display for AcyclicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.src())?;
        for hop in &self.hops {
            write!(f, "-[{}]->{}", hop.link, hop.to)?;
        }
        Ok(())
    }
}

/// Turn a contiguous walk into an acyclic path by cutting out every loop.
///
/// The hops are scanned in order while remembering where each node was
/// last entered. When a hop comes back to a node already on the path, all
/// the hops taken since that node was entered are dropped, and so is the
/// returning hop.
pub fn convert_to_acyclic(walk: &[Hop]) -> Result<AcyclicPath, PathError> {
    let Some(first) = walk.first() else {
        return Err(PathError::Empty);
    };

    let mut kept: Vec<Hop> = Vec::with_capacity(walk.len());
    // node -> number of kept hops when the node was entered
    let mut entered: HashMap<NodeId, usize> = HashMap::new();
    entered.insert(first.from, 0);

    for hop in walk {
        match entered.get(&hop.to) {
            Some(&position) => {
                for dropped in kept.drain(position..) {
                    entered.remove(&dropped.to);
                }
            }
            None => {
                kept.push(*hop);
                entered.insert(hop.to, kept.len());
            }
        }
    }

    AcyclicPath::new(kept)
}
