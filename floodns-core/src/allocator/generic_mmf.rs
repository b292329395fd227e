use super::{apply, reset_all, AllocatorError, Share};
use crate::{
    flow::Flow,
    network::Network,
    policy::Aftermath,
    sim_context::{SimContext, SimError},
    sim_id::{FlowId, LinkId},
};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Weighted max-min fairness with per flow upper limits.
///
/// Every unfixed flow grows at a rate proportional to its weight. A flow
/// is fixed either when it reaches its upper limit or when one of its
/// links runs out of capacity, in which case every unfixed flow of that
/// link is fixed at once. When both happen at the same level the upper
/// limit is applied first.
///
/// Flows without a configured weight weigh `1`, flows without a
/// configured upper limit are unlimited. With all weights at `1` this is
/// the upper limited max-min fair allocation, and with no limits at all it
/// gives the same result as the [`SimpleMmfAllocator`].
///
/// Settings of flows which are no longer active are forgotten at the next
/// [`perform`].
///
/// ```
/// # use floodns_core::{allocator::GenericMmfAllocator, FlowId};
/// let mut allocator = GenericMmfAllocator::new();
/// allocator.set_weight(FlowId::new(0), 2.0).unwrap();
/// allocator.set_upper_limit(FlowId::new(0), 5.0).unwrap();
/// assert!(allocator.set_weight(FlowId::new(1), 0.0).is_err());
/// assert_eq!(allocator.upper_limit(FlowId::new(1)), f64::INFINITY);
/// ```
///
/// [`SimpleMmfAllocator`]: super::SimpleMmfAllocator
/// [`perform`]: Aftermath::perform
#[derive(Debug, Default, Clone)]
pub struct GenericMmfAllocator {
    upper_limits: BTreeMap<FlowId, f64>,
    weights: BTreeMap<FlowId, f64>,
}

#[derive(Debug)]
struct LinkState {
    remaining: f64,
    weight: f64,
    unfixed: usize,
}

impl LinkState {
    /// The growth level at which the link would be full.
    fn level(&self) -> Option<Share> {
        (self.unfixed > 0).then(|| {
            Share(self.remaining.max(0.0) / self.weight.max(f64::MIN_POSITIVE))
        })
    }
}

impl GenericMmfAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An unweighted allocator with the given upper limits.
    pub fn upper_limited<I>(limits: I) -> Result<Self, AllocatorError>
    where
        I: IntoIterator<Item = (FlowId, f64)>,
    {
        let mut allocator = Self::new();
        for (flow, limit) in limits {
            allocator.set_upper_limit(flow, limit)?;
        }
        Ok(allocator)
    }

    pub fn set_upper_limit(&mut self, flow: FlowId, limit: f64) -> Result<(), AllocatorError> {
        if limit.is_nan() || limit < 0.0 {
            return Err(AllocatorError::InvalidUpperLimit { flow, limit });
        }
        self.upper_limits.insert(flow, limit);
        Ok(())
    }

    pub fn set_weight(&mut self, flow: FlowId, weight: f64) -> Result<(), AllocatorError> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(AllocatorError::InvalidWeight { flow, weight });
        }
        self.weights.insert(flow, weight);
        Ok(())
    }

    pub fn upper_limit(&self, flow: FlowId) -> f64 {
        self.upper_limits
            .get(&flow)
            .copied()
            .unwrap_or(f64::INFINITY)
    }

    pub fn weight(&self, flow: FlowId) -> f64 {
        self.weights.get(&flow).copied().unwrap_or(1.0)
    }

    /// The weighted max-min fair bandwidth of every active flow, as if all
    /// of them were at zero.
    pub fn compute(&self, network: &Network) -> Vec<(FlowId, f64)> {
        let mut links: BTreeMap<LinkId, LinkState> = network
            .flow_active_links()
            .filter_map(|id| network.link(id))
            .map(|link| {
                let weight = link.active_flows().map(|flow| self.weight(flow)).sum();
                (
                    link.id(),
                    LinkState {
                        remaining: link.capacity(),
                        weight,
                        unfixed: link.num_active_flows(),
                    },
                )
            })
            .collect();

        let mut tightest: BTreeSet<(Share, LinkId)> = links
            .iter()
            .filter_map(|(&id, state)| state.level().map(|level| (level, id)))
            .collect();

        // flows reach their limit in this order
        let mut capped: BTreeSet<(Share, FlowId)> = network
            .flow_ids()
            .map(|flow| (flow, self.upper_limit(flow)))
            .filter(|(_, limit)| limit.is_finite())
            .map(|(flow, limit)| (Share(limit / self.weight(flow)), flow))
            .collect();

        let mut fixed: HashSet<FlowId> = HashSet::with_capacity(network.num_active_flows());
        let mut allocation = Vec::with_capacity(network.num_active_flows());

        while let Some(&(Share(link_level), bottleneck)) = tightest.first() {
            while capped
                .first()
                .is_some_and(|(_, flow)| fixed.contains(flow))
            {
                capped.pop_first();
            }

            let capped_first = capped
                .first()
                .copied()
                .filter(|&(Share(level), _)| level <= link_level);

            if let Some((_, flow_id)) = capped_first {
                capped.pop_first();
                if let Some(flow) = network.flow(flow_id) {
                    let bandwidth = self.upper_limit(flow_id);
                    self.fix(flow, bandwidth, &mut links, &mut tightest);
                    fixed.insert(flow_id);
                    allocation.push((flow_id, bandwidth));
                }
                continue;
            }

            let Some(link) = network.link(bottleneck) else {
                tightest.pop_first();
                continue;
            };
            let unfixed: Vec<FlowId> = link
                .active_flows()
                .filter(|flow| !fixed.contains(flow))
                .collect();
            for flow_id in unfixed {
                let Some(flow) = network.flow(flow_id) else {
                    continue;
                };
                let bandwidth = link_level * self.weight(flow_id);
                self.fix(flow, bandwidth, &mut links, &mut tightest);
                fixed.insert(flow_id);
                allocation.push((flow_id, bandwidth));
            }
            // a link whose flows were all fixed already
            tightest.remove(&(Share(link_level), bottleneck));
        }

        allocation.sort_by_key(|&(flow, _)| flow);
        allocation
    }

    fn fix(
        &self,
        flow: &Flow,
        bandwidth: f64,
        links: &mut BTreeMap<LinkId, LinkState>,
        tightest: &mut BTreeSet<(Share, LinkId)>,
    ) {
        let weight = self.weight(flow.id());
        for hop in flow.path().links() {
            let Some(state) = links.get_mut(&hop) else {
                continue;
            };
            if let Some(previous) = state.level() {
                tightest.remove(&(previous, hop));
            }
            state.remaining -= bandwidth;
            state.weight -= weight;
            state.unfixed -= 1;
            if let Some(level) = state.level() {
                tightest.insert((level, hop));
            }
        }
    }

    fn forget_inactive(&mut self, network: &Network) {
        self.upper_limits
            .retain(|&flow, _| network.is_flow_active(flow));
        self.weights.retain(|&flow, _| network.is_flow_active(flow));
    }
}

impl Aftermath for GenericMmfAllocator {
    fn perform(&mut self, ctx: &mut SimContext) -> Result<(), SimError> {
        self.forget_inactive(ctx.network());
        reset_all(ctx)?;
        let allocation = self.compute(ctx.network());
        apply(ctx, &allocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::testing::*;

    fn flows(ctx: &mut SimContext, paths: &[&[u64]]) -> Vec<FlowId> {
        paths.iter().map(|path| start_flow(ctx, path)).collect()
    }

    fn configured(flows: &[FlowId], limits: &[f64], weights: &[f64]) -> GenericMmfAllocator {
        let mut allocator = GenericMmfAllocator::new();
        for (&flow, &limit) in flows.iter().zip(limits) {
            allocator.set_upper_limit(flow, limit).unwrap();
        }
        for (&flow, &weight) in flows.iter().zip(weights) {
            allocator.set_weight(flow, weight).unwrap();
        }
        allocator
    }

    fn assert_bandwidths(ctx: &SimContext, flows: &[FlowId], expected: &[f64]) {
        for (&flow, &expected) in flows.iter().zip(expected) {
            assert_close(bandwidth(ctx, flow), expected);
        }
    }

    // ------------------------------------------------------------------
    // configuration
    // ------------------------------------------------------------------

    #[test]
    fn settings_validation() {
        let mut allocator = GenericMmfAllocator::new();
        let flow = FlowId::new(3);
        assert_eq!(
            allocator.set_weight(flow, -1.0),
            Err(AllocatorError::InvalidWeight { flow, weight: -1.0 })
        );
        assert!(allocator.set_weight(flow, f64::INFINITY).is_err());
        assert!(allocator.set_upper_limit(flow, -0.5).is_err());
        assert!(allocator.set_upper_limit(flow, f64::NAN).is_err());

        allocator.set_upper_limit(flow, 0.0).unwrap();
        allocator.set_weight(flow, 0.25).unwrap();
        assert_eq!(allocator.upper_limit(flow), 0.0);
        assert_eq!(allocator.weight(flow), 0.25);
        assert_eq!(allocator.weight(FlowId::ZERO), 1.0);
    }

    #[test]
    fn settings_of_ended_flows_are_forgotten() {
        let mut ctx = running(2, &[(0, 1, 10.0)]);
        let flow = start_flow(&mut ctx, &[0, 1]);
        let mut allocator = configured(&[flow], &[3.0], &[2.0]);
        allocator.perform(&mut ctx).unwrap();
        assert_close(bandwidth(&ctx, flow), 3.0);

        ctx.end_flow(flow).unwrap();
        allocator.perform(&mut ctx).unwrap();
        assert_eq!(allocator.upper_limit(flow), f64::INFINITY);
        assert_eq!(allocator.weight(flow), 1.0);
    }

    // ------------------------------------------------------------------
    // single link
    // ------------------------------------------------------------------

    #[test]
    fn weights_only() {
        let mut ctx = running(2, &[(0, 1, 10.0)]);
        let flows = flows(&mut ctx, &[&[0, 1], &[0, 1], &[0, 1], &[0, 1]]);
        let mut allocator = configured(&flows, &[], &[2.0, 2.6, 2.7, 2.7]);
        allocator.perform(&mut ctx).unwrap();
        assert_bandwidths(&ctx, &flows, &[2.0, 2.6, 2.7, 2.7]);
    }

    #[test]
    fn upper_limits_only() {
        let mut ctx = running(2, &[(0, 1, 10.0)]);
        let flows = flows(&mut ctx, &[&[0, 1], &[0, 1], &[0, 1], &[0, 1]]);
        let limits = flows.iter().copied().zip([2.0, 2.6, 4.0, 5.0]);
        let mut allocator = GenericMmfAllocator::upper_limited(limits).unwrap();
        allocator.perform(&mut ctx).unwrap();
        assert_bandwidths(&ctx, &flows, &[2.0, 2.6, 2.7, 2.7]);
    }

    #[test]
    fn weights_and_upper_limits() {
        let mut ctx = running(2, &[(0, 1, 16.0)]);
        let flows = flows(&mut ctx, &[&[0, 1], &[0, 1], &[0, 1], &[0, 1]]);
        let mut allocator =
            configured(&flows, &[4.0, 2.0, 10.0, 4.0], &[2.5, 4.0, 0.5, 1.0]);
        allocator.perform(&mut ctx).unwrap();
        assert_bandwidths(&ctx, &flows, &[4.0, 2.0, 6.0, 4.0]);
    }

    #[test]
    fn zero_upper_limit() {
        let mut ctx = running(2, &[(0, 1, 10.0)]);
        let flows = flows(&mut ctx, &[&[0, 1], &[0, 1]]);
        let mut allocator = configured(&flows, &[0.0], &[]);
        allocator.perform(&mut ctx).unwrap();
        assert_bandwidths(&ctx, &flows, &[0.0, 10.0]);
    }

    // ------------------------------------------------------------------
    // two links
    // ------------------------------------------------------------------

    #[test]
    fn two_independent_links() {
        let mut ctx = running(3, &[(0, 1, 16.0), (1, 2, 16.0)]);
        let flows = flows(
            &mut ctx,
            &[
                &[0, 1],
                &[0, 1],
                &[0, 1],
                &[0, 1],
                &[1, 2],
                &[1, 2],
                &[1, 2],
                &[1, 2],
            ],
        );
        let limits = [4.0, 2.0, 10.0, 4.0, 4.0, 2.0, 10.0, 4.0];
        let weights = [2.5, 4.0, 0.5, 1.0, 2.5, 4.0, 0.5, 1.0];
        let mut allocator = configured(&flows, &limits, &weights);
        allocator.perform(&mut ctx).unwrap();
        assert_bandwidths(&ctx, &flows, &[4.0, 2.0, 6.0, 4.0, 4.0, 2.0, 6.0, 4.0]);
    }

    #[test]
    fn heavy_flows_share_the_first_link() {
        let mut ctx = running(3, &[(0, 1, 5.0), (1, 2, 10.0)]);
        let flows = flows(&mut ctx, &[&[0, 1, 2], &[0, 1], &[1, 2]]);
        let mut allocator = configured(&flows, &[100.0, 100.0, 100.0], &[10.0, 10.0, 1.0]);
        allocator.perform(&mut ctx).unwrap();
        assert_bandwidths(&ctx, &flows, &[2.5, 2.5, 7.5]);
    }

    #[test]
    fn heavy_flow_bottlenecked_on_the_second_link() {
        let mut ctx = running(3, &[(0, 1, 10.0), (1, 2, 5.0)]);
        let flows = flows(&mut ctx, &[&[0, 1, 2], &[0, 1]]);
        let mut allocator = configured(&flows, &[], &[9.0, 1.0]);
        allocator.perform(&mut ctx).unwrap();
        assert_bandwidths(&ctx, &flows, &[5.0, 5.0]);
    }

    #[test]
    fn limited_flows_leave_room_for_the_long_one() {
        let mut ctx = running(3, &[(0, 1, 10.0), (1, 2, 10.0)]);
        let flows = flows(&mut ctx, &[&[0, 1], &[0, 1], &[0, 1, 2], &[1, 2]]);
        let mut allocator = configured(&flows, &[1.0, 1.0, 10_000.0, 10_000.0], &[]);
        allocator.perform(&mut ctx).unwrap();
        assert_bandwidths(&ctx, &flows, &[1.0, 1.0, 5.0, 5.0]);
    }

    #[test]
    fn unconfigured_matches_simple_mmf() {
        let mut ctx = running(3, &[(0, 1, 10.0), (1, 2, 10.0)]);
        flows(&mut ctx, &[&[0, 1], &[0, 1], &[0, 1, 2], &[1, 2]]);
        let generic = GenericMmfAllocator::new().compute(ctx.network());
        let simple = crate::allocator::SimpleMmfAllocator::compute(ctx.network());
        assert_eq!(generic.len(), simple.len());
        for ((a, x), (b, y)) in generic.into_iter().zip(simple) {
            assert_eq!(a, b);
            assert_close(x, y);
        }
    }
}
