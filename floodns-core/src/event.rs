use crate::{
    sim_context::{SimContext, SimError},
    sim_id::{ConnectionId, EventId},
    time::Time,
};
use core::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

/// Something to do at a given instant of the simulation.
///
/// Events are inserted in the queue of the [`SimContext`] (see
/// [`SimContext::insert_event`]) and triggered when the clock reaches their
/// time. An event can mutate the network through the context, and insert
/// or cancel other events.
///
/// Any closure taking the context implements `Event`:
///
/// ```
/// # use floodns_core::{event::Event, SimContext, SimError, Time};
/// fn at_ten(ctx: &mut SimContext) -> Result<(), SimError> {
///     ctx.insert_event(Time::new(10), |ctx: &mut SimContext| -> Result<(), SimError> {
///         assert_eq!(ctx.now(), Time::new(10));
///         Ok(())
///     })?;
///     Ok(())
/// }
/// ```
pub trait Event {
    fn trigger(&mut self, ctx: &mut SimContext) -> Result<(), SimError>;
}

impl<F> Event for F
where
    F: FnMut(&mut SimContext) -> Result<(), SimError>,
{
    fn trigger(&mut self, ctx: &mut SimContext) -> Result<(), SimError> {
        self(ctx)
    }
}

/// What the simulator does when an event fires.
pub(crate) enum Action {
    /// activate the connection and let the routing strategy assign its
    /// first flows
    StartConnection(ConnectionId),
    /// wake the simulator up when a connection needs attention; nothing to
    /// do besides the progression accounting
    Interrupt,
    Custom(Box<dyn Event>),
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartConnection(id) => f.debug_tuple("StartConnection").field(id).finish(),
            Self::Interrupt => f.write_str("Interrupt"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Scheduled {
    pub(crate) id: EventId,
    pub(crate) time: Time,
    pub(crate) priority: i32,
    pub(crate) action: Action,
}

impl Scheduled {
    /// earliest time first, then highest priority, then insertion order
    fn key(&self) -> (Time, Reverse<i32>, EventId) {
        (self.time, Reverse(self.priority), self.id)
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Time ordered queue of events with lazy cancellation.
///
/// Cancelled events stay in the heap until they reach the top, where they
/// are discarded.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    /// the events inserted and not yet popped nor cancelled
    pending: HashMap<EventId, Time>,
    next_id: EventId,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of events still to trigger.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn push(&mut self, time: Time, priority: i32, action: Action) -> EventId {
        let id = self.next_id;
        self.next_id = id.next();
        self.pending.insert(id, time);
        self.heap.push(Reverse(Scheduled {
            id,
            time,
            priority,
            action,
        }));
        id
    }

    /// The time of a pending event.
    pub(crate) fn time_of(&self, id: EventId) -> Option<Time> {
        self.pending.get(&id).copied()
    }

    /// Returns whether the event was still pending.
    pub(crate) fn cancel(&mut self, id: EventId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Time of the earliest pending event.
    pub(crate) fn peek_time(&mut self) -> Option<Time> {
        self.discard_cancelled();
        self.heap.peek().map(|Reverse(event)| event.time)
    }

    /// Pop the earliest pending event if it is due at `time`.
    pub(crate) fn pop_at(&mut self, time: Time) -> Option<Scheduled> {
        self.discard_cancelled();
        match self.heap.peek() {
            Some(Reverse(event)) if event.time == time => {
                let Reverse(event) = self.heap.pop()?;
                self.pending.remove(&event.id);
                Some(event)
            }
            _ => None,
        }
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse(event)) = self.heap.peek() {
            if self.pending.contains_key(&event.id) {
                break;
            }
            self.heap.pop();
        }
    }
}
