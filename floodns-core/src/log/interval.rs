use super::{Interval, Sample};
use crate::time::Time;

/// Run-length encoder of a piecewise-constant signal sampled at irregular
/// instants.
///
/// * the value held at an instant is the last one recorded at that instant;
/// * adjacent intervals with the same value (see [`Sample::same_as`]) are
///   merged, the first value of the run is the one reported;
/// * zero-length intervals are never emitted;
/// * once finished, further updates are ignored.
///
/// ```
/// # use floodns_core::{log::{Interval, IntervalLog}, Time};
/// let mut log = IntervalLog::<f64>::new(1e-10);
///
/// assert_eq!(log.update(Time::new(1), 10.0), None);
/// assert_eq!(log.update(Time::new(80), 10.0), None);
/// assert_eq!(log.update(Time::new(90), 8.0), None);
///
/// let [first, second] = log.finish(Time::new(95));
/// assert_eq!(first, Some(Interval { start: Time::new(1), end: Time::new(90), value: 10.0 }));
/// assert_eq!(second, Some(Interval { start: Time::new(90), end: Time::new(95), value: 8.0 }));
/// ```
#[derive(Debug, Clone)]
pub struct IntervalLog<T> {
    precision: f64,
    /// the interval still open before `latest`, not yet emitted
    open: Option<(Time, T)>,
    /// the latest instant that saw an update, and its last value
    latest: Option<(Time, T)>,
    finished: bool,
}

impl<T: Sample> IntervalLog<T> {
    pub fn new(precision: f64) -> Self {
        Self {
            precision,
            open: None,
            latest: None,
            finished: false,
        }
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Record `value` as observed at `now`.
    ///
    /// Returns the interval that got closed by this update, if any. An
    /// interval can only be closed once the clock moved past the instant
    /// following it, so the returned interval always ends strictly before
    /// `now`.
    pub fn update(&mut self, now: Time, value: T) -> Option<Interval<T>> {
        if self.finished {
            return None;
        }

        match self.latest {
            Some((time, previous)) if now > time => {
                self.latest = Some((now, value));
                self.settle(time, previous)
            }
            Some((time, _)) => {
                self.latest = Some((time, value));
                None
            }
            None => {
                self.latest = Some((now, value));
                None
            }
        }
    }

    /// Close the log at `now`, returning the (up to two) intervals that
    /// were still pending.
    pub fn finish(&mut self, now: Time) -> [Option<Interval<T>>; 2] {
        if self.finished {
            return [None, None];
        }
        self.finished = true;

        let Some((time, value)) = self.latest else {
            return [None, None];
        };
        let tail = (time != now).then_some(Interval {
            start: time,
            end: now,
            value,
        });

        match self.open {
            None => [tail, None],
            Some((start, open)) if open.same_as(value, self.precision) => [
                Some(Interval {
                    start,
                    end: now,
                    value: open,
                }),
                None,
            ],
            Some((start, open)) => [
                Some(Interval {
                    start,
                    end: time,
                    value: open,
                }),
                tail,
            ],
        }
    }

    fn settle(&mut self, time: Time, value: T) -> Option<Interval<T>> {
        match self.open {
            None => {
                self.open = Some((time, value));
                None
            }
            Some((_, open)) if open.same_as(value, self.precision) => None,
            Some((start, open)) => {
                self.open = Some((time, value));
                Some(Interval {
                    start,
                    end: time,
                    value: open,
                })
            }
        }
    }
}
