use super::{apply, reset_all, Share};
use crate::{
    network::Network,
    policy::Aftermath,
    sim_context::{SimContext, SimError},
    sim_id::{FlowId, LinkId},
};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Max-min fair water-filling.
///
/// The fair share of a link is its capacity left over divided by the
/// number of its flows not fixed yet. Repeatedly, the link with the
/// smallest fair share is picked and all its unfixed flows are fixed at
/// that share, which lowers the capacity left on every other link of their
/// paths.
///
/// Links with equal shares are picked by identifier, but fixing one of
/// them leaves the share of the others unchanged, so the rates do not
/// depend on that order nor on the order of the flows.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleMmfAllocator;

#[derive(Debug)]
struct LinkState {
    remaining: f64,
    unfixed: usize,
}

impl LinkState {
    fn share(&self) -> Option<Share> {
        (self.unfixed > 0).then(|| Share(self.remaining.max(0.0) / self.unfixed as f64))
    }
}

impl SimpleMmfAllocator {
    pub fn new() -> Self {
        Self
    }

    /// The max-min fair bandwidth of every active flow, as if all of them
    /// were at zero.
    pub fn compute(network: &Network) -> Vec<(FlowId, f64)> {
        let mut links: BTreeMap<LinkId, LinkState> = network
            .flow_active_links()
            .filter_map(|id| network.link(id))
            .map(|link| {
                (
                    link.id(),
                    LinkState {
                        remaining: link.capacity(),
                        unfixed: link.num_active_flows(),
                    },
                )
            })
            .collect();

        let mut tightest: BTreeSet<(Share, LinkId)> = links
            .iter()
            .filter_map(|(&id, state)| state.share().map(|share| (share, id)))
            .collect();

        let mut fixed: HashSet<FlowId> = HashSet::with_capacity(network.num_active_flows());
        let mut allocation = Vec::with_capacity(network.num_active_flows());

        while let Some((Share(share), bottleneck)) = tightest.pop_first() {
            let Some(link) = network.link(bottleneck) else {
                continue;
            };

            let mut affected: BTreeMap<LinkId, Option<Share>> = BTreeMap::new();
            for flow_id in link.active_flows() {
                if !fixed.insert(flow_id) {
                    continue;
                }
                let Some(flow) = network.flow(flow_id) else {
                    continue;
                };
                for hop in flow.path().links() {
                    let Some(state) = links.get_mut(&hop) else {
                        continue;
                    };
                    affected.entry(hop).or_insert_with(|| state.share());
                    state.remaining -= share;
                    state.unfixed -= 1;
                }
                allocation.push((flow_id, share));
            }

            for (id, previous) in affected {
                if let Some(previous) = previous {
                    tightest.remove(&(previous, id));
                }
                if let Some(share) = links.get(&id).and_then(LinkState::share) {
                    tightest.insert((share, id));
                }
            }
        }

        allocation.sort_by_key(|&(flow, _)| flow);
        allocation
    }
}

impl Aftermath for SimpleMmfAllocator {
    fn perform(&mut self, ctx: &mut SimContext) -> Result<(), SimError> {
        reset_all(ctx)?;
        let allocation = Self::compute(ctx.network());
        apply(ctx, &allocation)
    }
}
