//! Linear program analysis of a network state.
//!
//! The programs are written in the `max: ..;` / `name: .. <= ..;` text
//! grammar read by the usual LP file parsers, and handed to an external
//! [`LpSolver`].
//!
//! The analyses here ignore the flows the routing chose: every active
//! connection is a commodity free to split over the whole network, with a
//! variable `f_<c>_<l>` for its rate over every link `l`.
//!
//! * [`MaxThroughputLp`]: the largest total throughput under demands;
//! * [`EpsilonSumMaxLp`]: the largest per connection bound most of the
//!   connections can reach together;
//! * [`MaxMinConnBwLp`]: the largest scaling of a traffic matrix the
//!   network can carry.
//!
//! The LP driven allocators are in [`crate::allocator`].

mod epsilon_sum_max;
mod max_min_conn_bw;
mod max_throughput;

pub use self::{
    epsilon_sum_max::{EpsilonSumMax, EpsilonSumMaxLp},
    max_min_conn_bw::MaxMinConnBwLp,
    max_throughput::{MaxThroughput, MaxThroughputLp},
};
use crate::{
    network::Network,
    sim_id::{ConnectionId, LinkId, NodeId},
};
use std::{collections::BTreeMap, fmt::Display};
use thiserror::Error;

const OBJECTIVE_PREFIX: &str = "Value of objective function:";
const VARIABLES_HEADER: &str = "Actual values of the variables:";

#[derive(Debug, Error)]
pub enum LpError {
    #[error("no demand given for active connection {connection}")]
    MissingDemand { connection: ConnectionId },
    #[error("invalid demand {demand} for connection {connection}")]
    InvalidDemand { connection: ConnectionId, demand: f64 },
    #[error("epsilon must be within [0, 1], got {epsilon}")]
    InvalidEpsilon { epsilon: f64 },
    #[error("the linear program was not solved, it is presumably infeasible")]
    Infeasible,
    #[error("line {line} of the solution is malformed: {text:?}")]
    MalformedSolution { line: usize, text: String },
    #[error("solver failed")]
    Solver(#[source] anyhow::Error),
}

/// Solves a linear program given as text.
pub trait LpSolver {
    fn solve(&mut self, program: &str) -> Result<LpSolution, LpError>;
}

impl<S: LpSolver + ?Sized> LpSolver for Box<S> {
    fn solve(&mut self, program: &str) -> Result<LpSolution, LpError> {
        (**self).solve(program)
    }
}

/// An optimal solution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LpSolution {
    pub objective: f64,
    pub variables: BTreeMap<String, f64>,
}

impl LpSolution {
    /// Read the report of a solver:
    ///
    /// ```text
    /// Value of objective function: 10.000000
    /// Actual values of the variables:
    /// f_0_1 10.0000000000
    /// f_0_2 0.0000000000
    /// ```
    ///
    /// Without the objective line the program is considered infeasible.
    ///
    /// ```
    /// # use floodns_core::lp::LpSolution;
    /// let solution = LpSolution::parse(
    ///     "Value of objective function: 2.5\nActual values of the variables:\nx 2.5\n",
    /// )
    /// .unwrap();
    /// assert_eq!(solution.objective, 2.5);
    /// assert_eq!(solution.variables["x"], 2.5);
    /// ```
    pub fn parse(report: &str) -> Result<Self, LpError> {
        let mut objective = None;
        let mut variables = BTreeMap::new();
        let mut in_variables = false;

        for (index, line) in report.lines().enumerate() {
            let line = line.trim();
            let malformed = || LpError::MalformedSolution {
                line: index + 1,
                text: line.to_owned(),
            };

            if let Some(value) = line.strip_prefix(OBJECTIVE_PREFIX) {
                objective = Some(value.trim().parse::<f64>().map_err(|_| malformed())?);
            } else if line.starts_with(VARIABLES_HEADER) {
                in_variables = true;
            } else if in_variables && !line.is_empty() {
                let mut parts = line.split_whitespace();
                let (Some(name), Some(value), None) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err(malformed());
                };
                let value = value.parse::<f64>().map_err(|_| malformed())?;
                variables.insert(name.to_owned(), value);
            }
        }

        let objective = objective.ok_or(LpError::Infeasible)?;
        Ok(Self {
            objective,
            variables,
        })
    }

    /// Value of a variable, zero if the solver did not report it.
    pub fn value(&self, variable: &str) -> f64 {
        self.variables.get(variable).copied().unwrap_or(0.0)
    }
}

/// `a + b + c`, or `0` when there is no term.
pub(crate) fn sum<T: Display>(terms: impl IntoIterator<Item = T>) -> String {
    let terms: Vec<String> = terms.into_iter().map(|term| term.to_string()).collect();
    if terms.is_empty() {
        "0".to_owned()
    } else {
        terms.join(" + ")
    }
}

/// An active connection, as one commodity of the flow problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Commodity {
    connection: ConnectionId,
    src: NodeId,
    dst: NodeId,
}

fn commodities(network: &Network) -> Vec<Commodity> {
    network
        .active_connections()
        .filter_map(|connection| {
            network.connection(connection).map(|c| Commodity {
                connection,
                src: c.src(),
                dst: c.dst(),
            })
        })
        .collect()
}

/// The demand of `connection`, finite and non-negative.
fn demand_of(demands: &BTreeMap<ConnectionId, f64>, connection: ConnectionId) -> Result<f64, LpError> {
    let demand = *demands
        .get(&connection)
        .ok_or(LpError::MissingDemand { connection })?;
    if !demand.is_finite() || demand < 0.0 {
        return Err(LpError::InvalidDemand { connection, demand });
    }
    Ok(demand)
}

fn variable(connection: ConnectionId, link: LinkId) -> String {
    format!("f_{connection}_{link}")
}

fn variables(connection: ConnectionId, links: impl Iterator<Item = LinkId>) -> Vec<String> {
    links.map(|link| variable(connection, link)).collect()
}

fn outgoing(network: &Network, node: NodeId) -> impl Iterator<Item = LinkId> + '_ {
    network
        .node(node)
        .into_iter()
        .flat_map(|node| node.outgoing_links())
}

fn incoming(network: &Network, node: NodeId) -> impl Iterator<Item = LinkId> + '_ {
    network
        .node(node)
        .into_iter()
        .flat_map(|node| node.incoming_links())
}

/// The variables of what `commodity` sends out of its source.
fn sent(network: &Network, commodity: &Commodity) -> Vec<String> {
    variables(commodity.connection, outgoing(network, commodity.src))
}

/// The rate `commodity` sends out of its source in `solution`.
fn sent_rate(network: &Network, commodity: &Commodity, solution: &LpSolution) -> f64 {
    outgoing(network, commodity.src)
        .map(|link| solution.value(&variable(commodity.connection, link)))
        .sum()
}

/// `a + b - c - d`
fn difference(plus: &[String], minus: &[String]) -> String {
    let mut expression = plus.join(" + ");
    for term in minus {
        if expression.is_empty() {
            expression.push_str("- ");
        } else {
            expression.push_str(" - ");
        }
        expression.push_str(term);
    }
    expression
}

/// `<prefix>_<l>: f_0_l + f_1_l <= capacity;` for every link, nothing
/// without commodities.
fn write_capacity(out: &mut String, network: &Network, commodities: &[Commodity], prefix: &str) {
    if commodities.is_empty() {
        return;
    }
    out.push_str("// capacity\n");
    for link in network.links() {
        let carried = commodities
            .iter()
            .map(|commodity| variable(commodity.connection, link.id()));
        out.push_str(&format!(
            "{prefix}_{}: {} <= {};\n",
            link.id(),
            sum(carried),
            link.capacity()
        ));
    }
    out.push('\n');
}

/// `<prefix>_<c>_<l>: f_c_l >= 0;` for every commodity and link.
fn write_non_negativity(
    out: &mut String,
    network: &Network,
    commodities: &[Commodity],
    prefix: &str,
) {
    out.push_str("// non-negativity\n");
    for commodity in commodities {
        let connection = commodity.connection;
        for link in network.links() {
            let link = link.id();
            out.push_str(&format!(
                "{prefix}_{connection}_{link}: {} >= 0;\n",
                variable(connection, link)
            ));
        }
    }
    out.push('\n');
}

/// What enters a node leaves it, for every commodity at every node. Nothing
/// may enter the source nor leave the destination.
fn write_conservation(
    out: &mut String,
    network: &Network,
    commodities: &[Commodity],
    prefix: &str,
) {
    out.push_str("// conservation\n");
    for commodity in commodities {
        let connection = commodity.connection;
        for node in network.nodes() {
            let id = node.id();
            let (entering, leaving) = if id == commodity.src {
                (variables(connection, node.incoming_links()), Vec::new())
            } else if id == commodity.dst {
                (variables(connection, node.outgoing_links()), Vec::new())
            } else {
                (
                    variables(connection, node.incoming_links()),
                    variables(connection, node.outgoing_links()),
                )
            };
            if entering.is_empty() && leaving.is_empty() {
                continue;
            }
            out.push_str(&format!(
                "{prefix}_{connection}_{id}: {} = 0;\n",
                difference(&entering, &leaving)
            ));
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{LpError, LpSolution, LpSolver};

    /// Answers every program with the same report, keeping the programs.
    #[derive(Debug)]
    pub(crate) struct Canned {
        pub(crate) report: String,
        pub(crate) programs: Vec<String>,
    }

    impl Canned {
        pub(crate) fn new(report: impl Into<String>) -> Self {
            Self {
                report: report.into(),
                programs: Vec::new(),
            }
        }
    }

    impl LpSolver for Canned {
        fn solve(&mut self, program: &str) -> Result<LpSolution, LpError> {
            self.programs.push(program.to_owned());
            LpSolution::parse(&self.report)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solution_report() {
        let solution = LpSolution::parse(
            "some solver chatter\n\
             Value of objective function: 10.000000\n\
             \n\
             Actual values of the variables:\n\
             f_0_1 10.0000000000\n\
             f_0_2   0.0000000000\n\
             \n",
        )
        .unwrap();
        assert_eq!(solution.objective, 10.0);
        assert_eq!(solution.variables.len(), 2);
        assert_eq!(solution.value("f_0_1"), 10.0);
        assert_eq!(solution.value("f_0_2"), 0.0);
        assert_eq!(solution.value("unknown"), 0.0);
    }

    #[test]
    fn infeasible_report() {
        assert!(matches!(
            LpSolution::parse("Linear program was not solved.\n"),
            Err(LpError::Infeasible)
        ));
    }

    #[test]
    fn malformed_report() {
        assert!(matches!(
            LpSolution::parse("Value of objective function: many\n"),
            Err(LpError::MalformedSolution { line: 1, .. })
        ));
        assert!(matches!(
            LpSolution::parse(
                "Value of objective function: 1\nActual values of the variables:\nx 1 2\n"
            ),
            Err(LpError::MalformedSolution { line: 3, .. })
        ));
    }

    #[test]
    fn sums() {
        assert_eq!(sum(["a", "b"]), "a + b");
        assert_eq!(sum(Vec::<String>::new()), "0");
    }

    #[test]
    fn differences() {
        let terms = |names: &[&str]| names.iter().map(|name| name.to_string()).collect::<Vec<_>>();
        assert_eq!(difference(&terms(&["a", "b"]), &terms(&["c"])), "a + b - c");
        assert_eq!(difference(&[], &terms(&["c", "d"])), "- c - d");
        assert_eq!(difference(&terms(&["a"]), &[]), "a");
    }
}
