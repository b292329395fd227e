use super::{
    commodities, demand_of, sent, sum, write_capacity, write_conservation, write_non_negativity,
    Commodity, LpError, LpSolver,
};
use crate::{network::Network, sim_id::ConnectionId};
use std::collections::BTreeMap;

/// The largest `alpha` for which `alpha` times the demands of the active
/// connections fits in the network, their traffic split arbitrarily.
///
/// Every connection must send at least `demand * Z` out of its source, and
/// `Z` is maximized.
#[derive(Debug, Clone)]
pub struct MaxMinConnBwLp<'a> {
    network: &'a Network,
    connections: Vec<(Commodity, f64)>,
}

impl<'a> MaxMinConnBwLp<'a> {
    /// `demands` must cover every active connection of the network.
    pub fn new(
        network: &'a Network,
        demands: &BTreeMap<ConnectionId, f64>,
    ) -> Result<Self, LpError> {
        let connections: Vec<(Commodity, f64)> = commodities(network)
            .into_iter()
            .map(|commodity| Ok((commodity, demand_of(demands, commodity.connection)?)))
            .collect::<Result<_, LpError>>()?;
        Ok(Self {
            network,
            connections,
        })
    }

    pub fn program(&self) -> String {
        let network = self.network;
        let commodities: Vec<Commodity> = self.connections.iter().map(|&(c, _)| c).collect();
        let mut out = String::from("max: Z;\n\n");

        out.push_str("// fairness\n");
        for (commodity, demand) in &self.connections {
            out.push_str(&format!(
                "c0_{}: {} - {demand} Z >= 0;\n",
                commodity.connection,
                sum(sent(network, commodity))
            ));
        }
        out.push('\n');

        write_capacity(&mut out, network, &commodities, "c1");
        write_non_negativity(&mut out, network, &commodities, "c2");
        write_conservation(&mut out, network, &commodities, "c3");
        out
    }

    /// Solve the program, returning `alpha`.
    pub fn solve(&self, solver: &mut dyn LpSolver) -> Result<f64, LpError> {
        let solution = solver.solve(&self.program())?;
        tracing::debug!(alpha = solution.objective, "max-min connection bandwidth solved");
        Ok(solution.objective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        allocator::testing::running,
        lp::testing::Canned,
        sim_context::SimContext,
        sim_id::{LinkId, NodeId},
    };

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    /// Two connections from 0 to 2 over 0 -> 1 -> 2 (8 then 6).
    fn chain() -> (SimContext, ConnectionId, ConnectionId) {
        let mut ctx = running(3, &[(0, 1, 8.0), (1, 2, 6.0)]);
        let a = ctx.create_connection(n(0), n(2), 1e6).unwrap();
        let b = ctx.create_connection(n(0), n(2), 1e6).unwrap();
        ctx.activate_connection(a).unwrap();
        ctx.activate_connection(b).unwrap();
        (ctx, a, b)
    }

    fn link(ctx: &SimContext, from: u64, to: u64) -> LinkId {
        ctx.network().links_between(n(from), n(to))[0]
    }

    #[test]
    fn program_text() {
        let (ctx, a, b) = chain();
        let (first, second) = (link(&ctx, 0, 1), link(&ctx, 1, 2));
        let demands = BTreeMap::from([(a, 1.0), (b, 2.0)]);
        let program = MaxMinConnBwLp::new(ctx.network(), &demands).unwrap().program();

        assert!(program.starts_with("max: Z;\n"));
        assert!(program.contains(&format!("c0_{a}: f_{a}_{first} - 1 Z >= 0;\n")));
        assert!(program.contains(&format!("c0_{b}: f_{b}_{first} - 2 Z >= 0;\n")));
        assert!(program.contains(&format!("c1_{second}: f_{a}_{second} + f_{b}_{second} <= 6;\n")));
        assert!(program.contains(&format!("c2_{b}_{first}: f_{b}_{first} >= 0;\n")));
        assert!(program.contains(&format!("c3_{a}_1: f_{a}_{first} - f_{a}_{second} = 0;\n")));
    }

    #[test]
    fn demands_are_checked() {
        let (ctx, a, b) = chain();
        assert!(matches!(
            MaxMinConnBwLp::new(ctx.network(), &BTreeMap::from([(a, 1.0)])),
            Err(LpError::MissingDemand { connection }) if connection == b
        ));
        assert!(matches!(
            MaxMinConnBwLp::new(ctx.network(), &BTreeMap::from([(a, 1.0), (b, f64::NAN)])),
            Err(LpError::InvalidDemand { .. })
        ));
    }

    #[test]
    fn alpha() {
        let (ctx, a, b) = chain();
        // 6 over the second link, one third to a and two thirds to b
        let mut solver = Canned::new(
            "Value of objective function: 2\n\
             Actual values of the variables:\n\
             Z 2\n",
        );
        let lp = MaxMinConnBwLp::new(ctx.network(), &BTreeMap::from([(a, 1.0), (b, 2.0)])).unwrap();
        assert_eq!(lp.solve(&mut solver).unwrap(), 2.0);
        assert_eq!(solver.programs.len(), 1);

        let mut solver = Canned::new("This problem is infeasible");
        assert!(matches!(lp.solve(&mut solver), Err(LpError::Infeasible)));
    }
}
