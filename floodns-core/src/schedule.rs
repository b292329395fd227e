//! Connection schedules.
//!
//! A schedule is a CSV file with one connection per line:
//!
//! ```text
//! id,src,dst,size_byte,start_ns,params,label
//! ```
//!
//! The identifiers count up from zero, one per line, and the start times
//! never decrease. Blank lines are skipped.

use crate::{
    sim_context::{SimContext, SimError},
    sim_id::{ConnectionId, NodeId},
    time::Time,
    topology::TopologyDetails,
};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const NUM_COLUMNS: usize = 7;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("cannot read schedule {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("line {line} has {found} columns instead of 7")]
    Columns { line: usize, found: usize },
    #[error("line {line}: invalid {column} {value:?}")]
    InvalidNumber {
        line: usize,
        column: &'static str,
        value: String,
    },
    #[error("line {line}: connection identifier {found}, expected {expected}")]
    IdOrder {
        line: usize,
        expected: u64,
        found: u64,
    },
    #[error("connection {id} has no data to send")]
    ZeroSize { id: u64 },
    #[error("connection {id} starts at {start}, before the previous one ({previous})")]
    StartOrder { id: u64, start: Time, previous: Time },
    #[error("connection {id}: node {node} is not an endpoint of the topology")]
    InvalidEndpoint { id: u64, node: NodeId },
    #[error("connection {id} goes from node {node} to itself")]
    SelfConnection { id: u64, node: NodeId },
    #[error("connection {id} starts at {start}, not before the end of the simulation ({end})")]
    StartAfterEnd { id: u64, start: Time, end: Time },
}

/// One line of a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub id: u64,
    pub src: NodeId,
    pub dst: NodeId,
    pub size_byte: u64,
    pub start: Time,
    /// free-form, not interpreted
    pub params: String,
    pub label: String,
}

/// A validated connection schedule.
///
/// ```
/// # use floodns_core::{schedule::Schedule, topology::Topology, properties::Properties, Time};
/// let properties: Properties = "
///     num_nodes=2
///     num_undirected_edges=1
///     switches=set(0,1)
///     switches_which_are_tors=set(0,1)
///     servers=set()
///     undirected_edges=set(0-1)
///     link_data_rate_bit_per_ns=10
/// "
/// .parse()
/// .unwrap();
/// let topology = Topology::from_properties(&properties).unwrap();
///
/// let schedule = Schedule::parse(
///     "0,0,1,1000,0,,first\n1,1,0,500,200,,second\n",
///     topology.details(),
///     Time::new(1_000),
/// )
/// .unwrap();
/// assert_eq!(schedule.len(), 2);
/// assert_eq!(schedule.entries()[1].label, "second");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
}

impl Schedule {
    pub fn load(
        path: impl AsRef<Path>,
        details: &TopologyDetails,
        end: Time,
    ) -> Result<Self, ScheduleError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ScheduleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let schedule = Self::parse(&content, details, end)?;
        tracing::info!(
            path = %path.display(),
            connections = schedule.len(),
            "schedule loaded"
        );
        Ok(schedule)
    }

    /// Parse and validate against the endpoints of the topology and the
    /// `end` of the simulation.
    pub fn parse(content: &str, details: &TopologyDetails, end: Time) -> Result<Self, ScheduleError> {
        let mut entries: Vec<ScheduleEntry> = Vec::new();

        for (index, raw) in content.lines().enumerate() {
            let line = index + 1;
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }

            let entry = parse_entry(line, raw)?;
            let expected = entries.len() as u64;
            if entry.id != expected {
                return Err(ScheduleError::IdOrder {
                    line,
                    expected,
                    found: entry.id,
                });
            }
            if entry.size_byte == 0 {
                return Err(ScheduleError::ZeroSize { id: entry.id });
            }
            if let Some(previous) = entries.last() {
                if entry.start < previous.start {
                    return Err(ScheduleError::StartOrder {
                        id: entry.id,
                        start: entry.start,
                        previous: previous.start,
                    });
                }
            }
            for node in [entry.src, entry.dst] {
                if !details.is_valid_endpoint(node) {
                    return Err(ScheduleError::InvalidEndpoint { id: entry.id, node });
                }
            }
            if entry.src == entry.dst {
                return Err(ScheduleError::SelfConnection {
                    id: entry.id,
                    node: entry.src,
                });
            }
            if entry.start >= end {
                return Err(ScheduleError::StartAfterEnd {
                    id: entry.id,
                    start: entry.start,
                    end,
                });
            }

            entries.push(entry);
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Create the connections, sized in bits, and schedule their starts.
    ///
    /// Returns the connection of every entry, in order.
    pub fn apply(&self, ctx: &mut SimContext) -> Result<Vec<ConnectionId>, SimError> {
        let mut connections = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let size = entry.size_byte as f64 * 8.0;
            let connection = ctx.create_connection(entry.src, entry.dst, size)?;
            if !entry.label.is_empty() {
                if let Some(c) = ctx.connection_mut(connection) {
                    c.set_label(entry.label.clone());
                }
            }
            ctx.start_connection_at(connection, entry.start)?;
            connections.push(connection);
        }
        tracing::debug!(connections = connections.len(), "schedule applied");
        Ok(connections)
    }
}

fn parse_entry(line: usize, raw: &str) -> Result<ScheduleEntry, ScheduleError> {
    let columns: Vec<&str> = raw.split(',').collect();
    let &[id, src, dst, size_byte, start, params, label] = columns.as_slice() else {
        return Err(ScheduleError::Columns {
            line,
            found: columns.len(),
        });
    };

    let number = |column: &'static str, value: &str| {
        value
            .trim()
            .parse::<u64>()
            .map_err(|_| ScheduleError::InvalidNumber {
                line,
                column,
                value: value.to_owned(),
            })
    };

    Ok(ScheduleEntry {
        id: number("connection identifier", id)?,
        src: NodeId::new(number("source", src)?),
        dst: NodeId::new(number("destination", dst)?),
        size_byte: number("size", size_byte)?,
        start: Time::new(number("start time", start)?),
        params: params.to_owned(),
        label: label.to_owned(),
    })
}
