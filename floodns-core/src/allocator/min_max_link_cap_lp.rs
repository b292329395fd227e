use super::{reset_all, AllocatorError};
use crate::{
    lp::{sum, LpError, LpSolver},
    network::Network,
    policy::Aftermath,
    sim_context::{SimContext, SimError},
    sim_id::{ConnectionId, FlowId},
};
use std::collections::BTreeMap;

/// Splits the demand of every connection over its flows so that the most
/// utilized link is as little utilized as possible.
///
/// Every flow `f` gets a weight `w_<f>`, the weights of a connection sum to
/// one, and the utilization `U_<l>` of a link is what its flows would carry
/// at their weighted demand over its capacity. `Z`, the largest
/// utilization, is minimized. Flows over a link without capacity get a zero
/// weight.
///
/// The rate of a flow is then `w * demand / Z`: the demands are scaled so
/// that the most utilized link is full.
///
/// Connections without flows are left out of the program.
#[derive(Debug)]
pub struct MinMaxLinkCapLpAllocator<S> {
    demands: BTreeMap<ConnectionId, f64>,
    default_demand: Option<f64>,
    solver: S,
    objective: f64,
}

fn check(demand: f64) -> Result<f64, AllocatorError> {
    if demand.is_finite() && demand >= 0.0 {
        Ok(demand)
    } else {
        Err(AllocatorError::InvalidDemand { demand })
    }
}

impl<S: LpSolver> MinMaxLinkCapLpAllocator<S> {
    /// A demand per connection, a connection without one fails the run.
    pub fn new(demands: BTreeMap<ConnectionId, f64>, solver: S) -> Result<Self, AllocatorError> {
        for &demand in demands.values() {
            check(demand)?;
        }
        Ok(Self {
            demands,
            default_demand: None,
            solver,
            objective: 0.0,
        })
    }

    /// The same demand for every connection.
    pub fn uniform(demand: f64, solver: S) -> Result<Self, AllocatorError> {
        Ok(Self {
            demands: BTreeMap::new(),
            default_demand: Some(check(demand)?),
            solver,
            objective: 0.0,
        })
    }

    /// `Z` of the last solved program.
    pub fn objective(&self) -> f64 {
        self.objective
    }

    fn demand(&self, connection: ConnectionId) -> Result<f64, LpError> {
        self.demands
            .get(&connection)
            .copied()
            .or(self.default_demand)
            .ok_or(LpError::MissingDemand { connection })
    }

    pub fn program(&self, network: &Network) -> Result<String, LpError> {
        let mut out = String::from("min: Z;\n\n");

        out.push_str("// weights\n");
        for id in network.active_connections() {
            let Some(connection) = network.connection(id) else {
                continue;
            };
            if connection.num_active_flows() == 0 {
                continue;
            }
            out.push_str(&format!(
                "c0_{id}: {} = 1;\n",
                sum(connection.active_flows().map(|flow| weight(&flow)))
            ));
        }
        out.push('\n');

        out.push_str("// non-negativity\n");
        for flow in network.flow_ids() {
            out.push_str(&format!("c1_{flow}: {} >= 0;\n", weight(&flow)));
        }
        out.push('\n');

        out.push_str("// utilization\n");
        for link in network.links() {
            let id = link.id();
            if link.capacity() == 0.0 {
                if link.num_active_flows() > 0 {
                    let blocked = link.active_flows().map(|flow| weight(&flow));
                    out.push_str(&format!("c2_{id}: {} = 0;\n", sum(blocked)));
                }
                continue;
            }
            let mut line = format!("c2_{id}: U_{id}");
            for flow_id in link.active_flows() {
                let Some(flow) = network.flow(flow_id) else {
                    continue;
                };
                let factor = self.demand(flow.connection())? / link.capacity();
                line.push_str(&format!(" - {factor} {}", weight(&flow_id)));
            }
            out.push_str(&line);
            out.push_str(" = 0;\n");
        }
        out.push('\n');

        out.push_str("// bound\n");
        for link in network.links().filter(|link| link.capacity() > 0.0) {
            out.push_str(&format!("c3_{0}: U_{0} - Z <= 0;\n", link.id()));
        }
        Ok(out)
    }
}

fn weight(flow: &FlowId) -> String {
    format!("w_{flow}")
}

impl<S: LpSolver> Aftermath for MinMaxLinkCapLpAllocator<S> {
    fn perform(&mut self, ctx: &mut SimContext) -> Result<(), SimError> {
        reset_all(ctx)?;
        if ctx.network().num_active_flows() == 0 {
            return Ok(());
        }

        let program = self.program(ctx.network())?;
        let solution = self.solver.solve(&program)?;
        self.objective = solution.objective;
        if self.objective <= 0.0 {
            // nothing is demanded
            return Ok(());
        }

        let flows: Vec<(FlowId, ConnectionId)> = ctx
            .network()
            .flows()
            .map(|flow| (flow.id(), flow.connection()))
            .collect();
        for (flow, connection) in flows {
            let w = solution.value(&weight(&flow)).max(0.0);
            let bandwidth = w * self.demand(connection)? / self.objective;
            ctx.allocate_flow_bandwidth(flow, bandwidth)?;
        }
        tracing::trace!(objective = self.objective, "min-max link utilization allocation");
        Ok(())
    }
}
