//! Result logging.
//!
//! Every entity of the simulation (flow, connection, link, node) keeps a
//! small tracker that observes each of its state changes. The trackers
//! compress the observations into constant-value [`Interval`]s with an
//! [`IntervalLog`] and, when the entity goes away (or the run ends), produce
//! a summary record. Both are handed to the [`LogSink`] installed in the
//! simulator.

mod interval;
mod sink;
mod tracker;

pub use self::{
    interval::IntervalLog,
    sink::{
        ConnectionInfo, FlowInfo, LinkInfo, LogError, LogSink, MemorySink, NodeInfo, SharedSink,
        VoidSink,
    },
    tracker::{ConnectionLog, FlowLog, LinkLog, NodeLog},
};
use crate::time::Time;

/// A value that held over the half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval<T> {
    pub start: Time,
    pub end: Time,
    pub value: T,
}

impl<T: Sample> Interval<T> {
    #[inline]
    pub fn duration(&self) -> Time {
        self.end.saturating_sub(self.start)
    }

    /// `value × duration`, the integral of the signal over the interval.
    #[inline]
    pub fn area(&self) -> f64 {
        self.value.to_f64() * self.duration().as_f64()
    }
}

/// A quantity that can be observed by an [`IntervalLog`].
pub trait Sample: Copy {
    /// whether the two samples are to be logged as the same value
    fn same_as(self, other: Self, precision: f64) -> bool;

    fn to_f64(self) -> f64;
}

impl Sample for f64 {
    #[inline]
    fn same_as(self, other: Self, precision: f64) -> bool {
        (self - other).abs() < precision
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

impl Sample for usize {
    #[inline]
    fn same_as(self, other: Self, _precision: f64) -> bool {
        self == other
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }
}
