//! Simulation statistics.
//!
//! [`SimStats`] provides a point-in-time snapshot of a simulation. Obtain
//! one via [`SimContext::stats`](crate::SimContext::stats); the simulator
//! also hands one to its progress observer.

use crate::{sim_context::SimState, time::Time};
use std::fmt;

/// Point-in-time snapshot of a simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimStats {
    /// Current simulated time.
    pub now: Time,
    /// Total runtime of the current run, `None` before the run.
    pub runtime: Option<Time>,
    pub state: SimState,
    /// Connections created and not yet started.
    pub pending_connections: usize,
    /// Connections started and neither drained nor terminated.
    pub active_connections: usize,
    /// Connections drained or terminated.
    pub finished_connections: usize,
    pub active_flows: usize,
    /// Links present in the network.
    pub links: usize,
    /// Events triggered so far, the simulator's own wake ups included.
    pub events_processed: u64,
    /// Events inserted and still waiting to be triggered.
    pub pending_events: usize,
}

impl SimStats {
    /// Fraction of the runtime already simulated, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        match self.runtime {
            Some(runtime) if runtime > Time::ZERO => {
                (self.now.as_f64() / runtime.as_f64()).min(1.0)
            }
            Some(_) => 1.0,
            None => 0.0,
        }
    }
}

impl fmt::Display for SimStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:5.2}% t={} connections={}/{}/{} (pending/active/finished) flows={} links={} events={}",
            self.progress() * 100.0,
            self.now,
            self.pending_connections,
            self.active_connections,
            self.finished_connections,
            self.active_flows,
            self.links,
            self.events_processed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(now: u64, runtime: Option<u64>) -> SimStats {
        SimStats {
            now: Time::new(now),
            runtime: runtime.map(Time::new),
            state: SimState::Running,
            pending_connections: 1,
            active_connections: 2,
            finished_connections: 3,
            active_flows: 4,
            links: 5,
            events_processed: 6,
            pending_events: 7,
        }
    }

    #[test]
    fn progress() {
        assert_eq!(stats(0, None).progress(), 0.0);
        assert_eq!(stats(25, Some(100)).progress(), 0.25);
        assert_eq!(stats(0, Some(0)).progress(), 1.0);
    }

    #[test]
    fn display() {
        assert_eq!(
            stats(50, Some(100)).to_string(),
            "50.00% t=50 connections=1/2/3 (pending/active/finished) flows=4 links=5 events=6"
        );
    }
}
