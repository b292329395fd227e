use crate::time::Time;

/// Default flow precision
///
/// Tolerance used for every floating point comparison made by the kernel:
/// a connection is finished once its remaining size is below it, a link is
/// over capacity only when exceeded by at least this much, and two
/// bandwidth samples within it are logged as the same value.
///
/// ```
/// # use floodns_core::defaults::*;
/// assert_eq!(DEFAULT_FLOW_PRECISION, 1e-10);
/// ```
pub const DEFAULT_FLOW_PRECISION: f64 = 1e-10;

/// Default progress reporting interval
///
/// Every time the simulated clock moves past a multiple of this interval
/// the simulator reports its progress.
///
/// ```
/// # use floodns_core::defaults::*;
/// assert_eq!(DEFAULT_PROGRESS_INTERVAL.to_string(), "10000000");
/// ```
pub const DEFAULT_PROGRESS_INTERVAL: Time = Time::new(10_000_000);

/// Default number of paths computed per ToR pair by K-shortest-path routing.
pub const DEFAULT_KSP_K: usize = 4;
