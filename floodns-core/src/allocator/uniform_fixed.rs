use super::{reset_all, AllocatorError};
use crate::{
    policy::Aftermath,
    sim_context::{SimContext, SimError},
    sim_id::FlowId,
};

/// Gives every active flow the same fixed bandwidth.
///
/// Nothing is checked beforehand: if the flows sharing a link ask for
/// more than its capacity the allocation fails and so does the run.
#[derive(Debug, Clone, Copy)]
pub struct UniformFixedAllocator {
    bandwidth: f64,
}

impl UniformFixedAllocator {
    pub fn new(bandwidth: f64) -> Result<Self, AllocatorError> {
        if !bandwidth.is_finite() || bandwidth < 0.0 {
            return Err(AllocatorError::InvalidBandwidth { bandwidth });
        }
        Ok(Self { bandwidth })
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }
}

impl Aftermath for UniformFixedAllocator {
    fn perform(&mut self, ctx: &mut SimContext) -> Result<(), SimError> {
        reset_all(ctx)?;
        let flows: Vec<FlowId> = ctx.network().flow_ids().collect();
        for flow in flows {
            ctx.allocate_flow_bandwidth(flow, self.bandwidth)?;
        }
        Ok(())
    }
}
