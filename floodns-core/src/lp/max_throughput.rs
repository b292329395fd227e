use super::{
    commodities, demand_of, incoming, sent, sent_rate, sum, variable, write_capacity,
    write_conservation, write_non_negativity, Commodity, LpError, LpSolver,
};
use crate::{network::Network, sim_id::ConnectionId};
use std::collections::BTreeMap;

/// Throughput found by a [`MaxThroughputLp`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaxThroughput {
    pub total: f64,
    /// what each connection sends out of its source
    pub per_connection: BTreeMap<ConnectionId, f64>,
}

/// The maximum total throughput the active connections could reach if
/// their traffic could be split arbitrarily over the whole network.
///
/// Each connection `c` has a variable `f_<c>_<l>` for every link `l`: its
/// rate over the link. The program maximizes what arrives at the
/// destinations, each connection sending at most its demand, under the
/// link capacities and the conservation of every connection at every node.
#[derive(Debug, Clone)]
pub struct MaxThroughputLp<'a> {
    network: &'a Network,
    /// every active connection with its demand
    connections: Vec<(Commodity, f64)>,
}

impl<'a> MaxThroughputLp<'a> {
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

    /// The program text.
    pub fn program(&self) -> String {
        let network = self.network;
        let commodities: Vec<Commodity> = self.connections.iter().map(|&(c, _)| c).collect();
        let mut out = String::new();

        let objective = commodities.iter().flat_map(|commodity| {
            incoming(network, commodity.dst).map(move |link| variable(commodity.connection, link))
        });
        out.push_str(&format!("max: {};\n\n", sum(objective)));

        out.push_str("// demand\n");
        for (commodity, demand) in &self.connections {
            out.push_str(&format!(
                "c0_{}: {} <= {demand};\n",
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

    /// Solve the program and read back the rate of every connection.
    pub fn solve(&self, solver: &mut dyn LpSolver) -> Result<MaxThroughput, LpError> {
        let solution = solver.solve(&self.program())?;

        let per_connection = self
            .connections
            .iter()
            .map(|(commodity, _)| {
                (
                    commodity.connection,
                    sent_rate(self.network, commodity, &solution),
                )
            })
            .collect();

        tracing::debug!(objective = solution.objective, "maximum throughput solved");
        Ok(MaxThroughput {
            total: solution.objective,
            per_connection,
        })
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

    /// 0 -> 1 directly (10) and through 2 (5 and 5), one active connection
    /// from 0 to 1.
    fn triangle() -> (SimContext, ConnectionId) {
        let mut ctx = running(3, &[(0, 1, 10.0), (0, 2, 5.0), (2, 1, 5.0)]);
        let connection = ctx.create_connection(n(0), n(1), 1e6).unwrap();
        ctx.activate_connection(connection).unwrap();
        (ctx, connection)
    }

    fn link(ctx: &SimContext, from: u64, to: u64) -> LinkId {
        ctx.network().links_between(n(from), n(to))[0]
    }

    #[test]
    fn program_text() {
        let (ctx, c) = triangle();
        let (direct, up, down) = (link(&ctx, 0, 1), link(&ctx, 0, 2), link(&ctx, 2, 1));
        let demands = BTreeMap::from([(c, 100.0)]);
        let program = MaxThroughputLp::new(ctx.network(), &demands).unwrap().program();

        assert!(program.starts_with(&format!("max: f_{c}_{direct} + f_{c}_{down};\n")));
        assert!(program.contains(&format!("c0_{c}: f_{c}_{direct} + f_{c}_{up} <= 100;\n")));
        assert!(program.contains(&format!("c1_{up}: f_{c}_{up} <= 5;\n")));
        assert!(program.contains(&format!("c2_{c}_{down}: f_{c}_{down} >= 0;\n")));
        assert!(program.contains(&format!("c3_{c}_2: f_{c}_{up} - f_{c}_{down} = 0;\n")));
        // no link enters 0 nor leaves 1
        assert!(!program.contains(&format!("c3_{c}_0:")));
        assert!(!program.contains(&format!("c3_{c}_1:")));
    }

    #[test]
    fn missing_or_invalid_demand() {
        let (ctx, c) = triangle();
        assert!(matches!(
            MaxThroughputLp::new(ctx.network(), &BTreeMap::new()),
            Err(LpError::MissingDemand { connection }) if connection == c
        ));
        assert!(matches!(
            MaxThroughputLp::new(ctx.network(), &BTreeMap::from([(c, -1.0)])),
            Err(LpError::InvalidDemand { .. })
        ));
    }

    #[test]
    fn no_active_connection() {
        let ctx = running(2, &[(0, 1, 1.0)]);
        let program = MaxThroughputLp::new(ctx.network(), &BTreeMap::new())
            .unwrap()
            .program();
        assert!(program.starts_with("max: 0;\n"));
        assert!(!program.contains("c1_"));
    }

    #[test]
    fn solution_is_read_back() {
        let (ctx, c) = triangle();
        let (direct, up, down) = (link(&ctx, 0, 1), link(&ctx, 0, 2), link(&ctx, 2, 1));
        let mut solver = Canned::new(format!(
            "Value of objective function: 15\n\
             Actual values of the variables:\n\
             f_{c}_{direct} 10\n\
             f_{c}_{up} 5\n\
             f_{c}_{down} 5\n"
        ));

        let lp = MaxThroughputLp::new(ctx.network(), &BTreeMap::from([(c, 100.0)])).unwrap();
        let result = lp.solve(&mut solver).unwrap();
        assert_eq!(result.total, 15.0);
        assert_eq!(result.per_connection[&c], 15.0);
        assert_eq!(solver.programs, vec![lp.program()]);
    }

    #[test]
    fn infeasible() {
        let (ctx, c) = triangle();
        let mut solver = Canned::new("Linear program was not solved.\n");
        let lp = MaxThroughputLp::new(ctx.network(), &BTreeMap::from([(c, 1.0)])).unwrap();
        assert!(matches!(lp.solve(&mut solver), Err(LpError::Infeasible)));
    }
}
