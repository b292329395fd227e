use super::{reset_all, AllocatorError};
use crate::{
    lp::{sum, LpSolver},
    network::Network,
    policy::Aftermath,
    sim_context::{SimContext, SimError},
    sim_id::{ConnectionId, FlowId},
};

/// Rates from a linear program over the current flows: every connection
/// sends at most `Z`, all of them together at least `epsilon * N * Z`, and
/// `Z` is maximized under the link capacities.
///
/// `N` counts the active connections that have at least one flow, the
/// others are left out of the program. Every flow `f` is a variable
/// `f_<f>`. With `epsilon = 1` every connection reaches `Z`.
///
/// The program is solved again after every instant, so the solver is the
/// bottleneck of a run.
#[derive(Debug)]
pub struct EpsilonSumMaxLpAllocator<S> {
    epsilon: f64,
    solver: S,
    objective: f64,
}

impl<S: LpSolver> EpsilonSumMaxLpAllocator<S> {
    pub fn new(epsilon: f64, solver: S) -> Result<Self, AllocatorError> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(AllocatorError::InvalidEpsilon { epsilon });
        }
        Ok(Self {
            epsilon,
            solver,
            objective: 0.0,
        })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// `Z` of the last solved program.
    pub fn objective(&self) -> f64 {
        self.objective
    }

    pub fn program(&self, network: &Network) -> String {
        let connections: Vec<(ConnectionId, Vec<FlowId>)> = network
            .active_connections()
            .filter_map(|id| {
                let flows: Vec<FlowId> = network.connection(id)?.active_flows().collect();
                (!flows.is_empty()).then_some((id, flows))
            })
            .collect();
        let mut out = String::from("max: Z;\n\n");

        out.push_str("// connection bound\n");
        for (id, flows) in &connections {
            out.push_str(&format!("c0_{id}: {} - Z <= 0;\n", sum(flows.iter().map(variable))));
        }
        out.push('\n');

        out.push_str("// non-negativity\n");
        for flow in network.flow_ids() {
            out.push_str(&format!("c1_{flow}: {} >= 0;\n", variable(&flow)));
        }
        out.push('\n');

        out.push_str("// capacity\n");
        for link in network.links().filter(|link| link.num_active_flows() > 0) {
            out.push_str(&format!(
                "c2_{}: {} <= {};\n",
                link.id(),
                sum(link.active_flows().map(|flow| variable(&flow))),
                link.capacity()
            ));
        }
        out.push('\n');

        out.push_str("// total\n");
        let coefficient = connections.len() as f64 * self.epsilon;
        out.push_str(&format!(
            "c3: {} - {coefficient} Z >= 0;\n",
            sum(connections.iter().flat_map(|(_, flows)| flows).map(variable))
        ));
        out
    }
}

fn variable(flow: &FlowId) -> String {
    format!("f_{flow}")
}

impl<S: LpSolver> Aftermath for EpsilonSumMaxLpAllocator<S> {
    fn perform(&mut self, ctx: &mut SimContext) -> Result<(), SimError> {
        reset_all(ctx)?;
        if ctx.network().num_active_flows() == 0 {
            return Ok(());
        }

        let solution = self.solver.solve(&self.program(ctx.network()))?;
        self.objective = solution.objective;

        let flows: Vec<FlowId> = ctx.network().flow_ids().collect();
        for flow in flows {
            let bandwidth = solution.value(&variable(&flow)).max(0.0);
            ctx.allocate_flow_bandwidth(flow, bandwidth)?;
        }
        tracing::trace!(objective = self.objective, "epsilon sum max allocation");
        Ok(())
    }
}
