use super::{
    commodities, difference, sent, sent_rate, sum, write_capacity, write_conservation, Commodity,
    LpError, LpSolver,
};
use crate::{network::Network, sim_id::ConnectionId};
use std::collections::BTreeMap;

/// Result of an [`EpsilonSumMaxLp`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpsilonSumMax {
    /// the largest rate any connection gets, `Z`
    pub bound: f64,
    /// what each connection sends out of its source
    pub per_connection: BTreeMap<ConnectionId, f64>,
}

/// The largest bound `Z` such that no connection sends more than `Z` while
/// all of them together send at least `(1 - epsilon) * N * Z`, `N` being
/// the number of active connections.
///
/// With `epsilon = 0` every connection must reach `Z`; with `epsilon = 1`
/// only the largest one matters.
///
/// Each connection `c` has a variable `f_<c>_<l>` for every link `l` and a
/// variable `y_<c>` for its rate out of the source.
#[derive(Debug, Clone)]
pub struct EpsilonSumMaxLp<'a> {
    network: &'a Network,
    epsilon: f64,
    connections: Vec<Commodity>,
}

impl<'a> EpsilonSumMaxLp<'a> {
    /// `epsilon` must be within `[0, 1]`.
    pub fn new(network: &'a Network, epsilon: f64) -> Result<Self, LpError> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(LpError::InvalidEpsilon { epsilon });
        }
        Ok(Self {
            network,
            epsilon,
            connections: commodities(network),
        })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn program(&self) -> String {
        let network = self.network;
        let mut out = String::from("max: Z;\n\n");

        out.push_str("// connection rates\n");
        for commodity in &self.connections {
            let c = commodity.connection;
            out.push_str(&format!(
                "c0_{c}: {} = 0;\n",
                difference(&sent(network, commodity), &[format!("y_{c}")])
            ));
        }
        for commodity in &self.connections {
            out.push_str(&format!("c0_{0}_0: y_{0} >= 0;\n", commodity.connection));
        }
        for commodity in &self.connections {
            out.push_str(&format!("c0_{0}_2: y_{0} - Z <= 0;\n", commodity.connection));
        }
        let total = self
            .connections
            .iter()
            .map(|commodity| format!("y_{}", commodity.connection));
        let coefficient = (1.0 - self.epsilon) * self.connections.len() as f64;
        out.push_str(&format!("cysum: {} - {coefficient} Z >= 0;\n\n", sum(total)));

        write_capacity(&mut out, network, &self.connections, "c1");
        write_conservation(&mut out, network, &self.connections, "c2");
        out
    }

    pub fn solve(&self, solver: &mut dyn LpSolver) -> Result<EpsilonSumMax, LpError> {
        let solution = solver.solve(&self.program())?;

        let per_connection = self
            .connections
            .iter()
            .map(|commodity| {
                (
                    commodity.connection,
                    sent_rate(self.network, commodity, &solution),
                )
            })
            .collect();

        tracing::debug!(
            epsilon = self.epsilon,
            bound = solution.objective,
            "epsilon sum max solved"
        );
        Ok(EpsilonSumMax {
            bound: solution.objective,
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

    /// 0 -> 1 directly (10) and through 2 (5 and 5); connections 0 -> 1
    /// and 2 -> 1.
    fn triangle() -> (SimContext, ConnectionId, ConnectionId) {
        let mut ctx = running(3, &[(0, 1, 10.0), (0, 2, 5.0), (2, 1, 5.0)]);
        let a = ctx.create_connection(n(0), n(1), 1e6).unwrap();
        let b = ctx.create_connection(n(2), n(1), 1e6).unwrap();
        ctx.activate_connection(a).unwrap();
        ctx.activate_connection(b).unwrap();
        (ctx, a, b)
    }

    fn link(ctx: &SimContext, from: u64, to: u64) -> LinkId {
        ctx.network().links_between(n(from), n(to))[0]
    }

    #[test]
    fn epsilon_range() {
        let ctx = running(2, &[(0, 1, 1.0)]);
        for epsilon in [-0.1, 1.5, f64::NAN] {
            assert!(matches!(
                EpsilonSumMaxLp::new(ctx.network(), epsilon),
                Err(LpError::InvalidEpsilon { .. })
            ));
        }
        assert_eq!(EpsilonSumMaxLp::new(ctx.network(), 1.0).unwrap().epsilon(), 1.0);
    }

    #[test]
    fn program_text() {
        let (ctx, a, b) = triangle();
        let (direct, up, down) = (link(&ctx, 0, 1), link(&ctx, 0, 2), link(&ctx, 2, 1));
        let program = EpsilonSumMaxLp::new(ctx.network(), 0.25).unwrap().program();

        assert!(program.starts_with("max: Z;\n"));
        assert!(program.contains(&format!("c0_{a}: f_{a}_{direct} + f_{a}_{up} - y_{a} = 0;\n")));
        assert!(program.contains(&format!("c0_{b}: f_{b}_{down} - y_{b} = 0;\n")));
        assert!(program.contains(&format!("c0_{a}_0: y_{a} >= 0;\n")));
        assert!(program.contains(&format!("c0_{b}_2: y_{b} - Z <= 0;\n")));
        // (1 - 0.25) * 2
        assert!(program.contains(&format!("cysum: y_{a} + y_{b} - 1.5 Z >= 0;\n")));
        assert!(program.contains(&format!("c1_{down}: f_{a}_{down} + f_{b}_{down} <= 5;\n")));
        assert!(program.contains(&format!("c2_{a}_2: f_{a}_{up} - f_{a}_{down} = 0;\n")));
        // node 2 is the source of b, nothing may enter it
        assert!(program.contains(&format!("c2_{b}_2: f_{b}_{up} = 0;\n")));
    }

    #[test]
    fn nothing_active() {
        let ctx = running(2, &[(0, 1, 1.0)]);
        let program = EpsilonSumMaxLp::new(ctx.network(), 0.5).unwrap().program();
        assert!(program.contains("cysum: 0 - 0 Z >= 0;\n"));
        assert!(!program.contains("c1_"));
    }

    #[test]
    fn solution_is_read_back() {
        let (ctx, a, b) = triangle();
        let (direct, up, down) = (link(&ctx, 0, 1), link(&ctx, 0, 2), link(&ctx, 2, 1));
        let mut solver = Canned::new(format!(
            "Value of objective function: 7.5\n\
             Actual values of the variables:\n\
             Z 7.5\n\
             y_{a} 7.5\n\
             y_{b} 5\n\
             f_{a}_{direct} 7.5\n\
             f_{a}_{up} 0\n\
             f_{b}_{down} 5\n"
        ));

        let lp = EpsilonSumMaxLp::new(ctx.network(), 0.5).unwrap();
        let result = lp.solve(&mut solver).unwrap();
        assert_eq!(result.bound, 7.5);
        assert_eq!(result.per_connection[&a], 7.5);
        assert_eq!(result.per_connection[&b], 5.0);
        assert_eq!(solver.programs, vec![lp.program()]);
    }
}
