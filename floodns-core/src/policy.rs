use crate::{
    sim_context::{SimContext, SimError},
    sim_id::ConnectionId,
};

/// The allocation policy.
///
/// [`Aftermath::perform`] is called exactly once after every processed
/// instant, once all the events of that instant were triggered. It must
/// leave every active flow with a bandwidth (zero included) such that no
/// link carries more than its capacity. It may also add or remove links
/// and flows through the [`SimContext`].
///
/// Given the same network state, `perform` must produce the same
/// allocation.
pub trait Aftermath {
    fn perform(&mut self, ctx: &mut SimContext) -> Result<(), SimError>;
}

impl<A: Aftermath + ?Sized> Aftermath for Box<A> {
    fn perform(&mut self, ctx: &mut SimContext) -> Result<(), SimError> {
        (**self).perform(ctx)
    }
}

/// The routing policy.
///
/// [`RoutingStrategy::assign_start_flows`] is called once, right after a
/// connection was activated by its start event. It adds zero or more flows
/// to the connection with [`SimContext::add_flow_to_connection`]; their
/// bandwidth is decided later by the [`Aftermath`].
pub trait RoutingStrategy {
    fn assign_start_flows(
        &mut self,
        ctx: &mut SimContext,
        connection: ConnectionId,
    ) -> Result<(), SimError>;
}

impl<R: RoutingStrategy + ?Sized> RoutingStrategy for Box<R> {
    fn assign_start_flows(
        &mut self,
        ctx: &mut SimContext,
        connection: ConnectionId,
    ) -> Result<(), SimError> {
        (**self).assign_start_flows(ctx, connection)
    }
}
