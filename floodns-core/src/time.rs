use anyhow::{anyhow, bail, ensure, Result};
use core::fmt;
use logos::{Lexer, Logos};
use std::str::FromStr;

/// Logical simulation time, in nanoseconds.
///
/// Time is only ever consumed by the event queue: it has no relation with
/// the wall clock. It is also used for durations (the time elapsed between
/// two instants).
///
/// ```
/// # use floodns_core::Time;
/// let t: Time = "1ms 500us".parse().unwrap();
/// assert_eq!(t, Time::new(1_500_000));
///
/// // bare numbers are nanoseconds
/// let t: Time = "1000".parse().unwrap();
/// assert_eq!(t.into_nanos(), 1_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(u64);

impl Time {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(u64::MAX);

    #[inline]
    pub const fn new(nanos: u64) -> Self {
        Self(nanos)
    }

    #[inline]
    pub const fn into_nanos(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use = "function does not modify the current value"]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    #[inline]
    #[must_use = "function does not modify the current value"]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// `self` as a floating point number, for rate computations.
    #[inline]
    pub(crate) fn as_f64(self) -> f64 {
        self.0 as f64
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for Time {
    fn from(nanos: u64) -> Self {
        Self(nanos)
    }
}

impl FromStr for Time {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::<'_, Token>::new(s);

        let mut total: u64 = 0;
        let mut any = false;

        while let Some(next) = lex.next() {
            let number: Token = next.map_err(|()| anyhow!("Failed to parse: {s}"))?;

            ensure!(
                number == Token::Value,
                "Expecting time to starts with number. Cannot parse {s}"
            );
            let number: u64 = lex.slice().parse()?;
            any = true;

            let multiplier = match lex.next() {
                None => 1,
                Some(Ok(Token::NanoSeconds)) => 1,
                Some(Ok(Token::MicroSeconds)) => 1_000,
                Some(Ok(Token::MilliSeconds)) => 1_000_000,
                Some(Ok(Token::Seconds)) => 1_000_000_000,
                Some(Ok(Token::Minutes)) => 60_000_000_000,
                Some(Ok(Token::Value)) => bail!("Failed to parse `{s}', expecting a measure."),
                Some(Err(())) => bail!("Expecting a measure, failed to parse: {s}"),
            };
            let nanos = number
                .checked_mul(multiplier)
                .ok_or_else(|| anyhow!("time overflow while parsing {s}"))?;
            total = total
                .checked_add(nanos)
                .ok_or_else(|| anyhow!("time overflow while parsing {s}"))?;
        }

        ensure!(any, "Cannot parse an empty time");

        Ok(Self(total))
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")] // Ignore this regex pattern between tokens
enum Token {
    #[token("ns")]
    NanoSeconds,
    #[regex("us|μs")]
    MicroSeconds,
    #[token("ms")]
    MilliSeconds,
    #[token("s")]
    Seconds,
    #[token("m")]
    Minutes,

    #[regex("[0-9]+")]
    Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logos_lexer() {
        let mut lex = Token::lexer("1ns");

        assert_eq!(lex.next(), Some(Ok(Token::Value)));
        assert_eq!(lex.span(), 0..1);
        assert_eq!(lex.slice(), "1");

        assert_eq!(lex.next(), Some(Ok(Token::NanoSeconds)));
        assert_eq!(lex.span(), 1..3);
        assert_eq!(lex.slice(), "ns");
    }

    #[test]
    fn parse() {
        let Time(time) = "123ms".parse().unwrap();
        assert_eq!(time, 123_000_000);

        let Time(time) = "1s 2000ms 3000000us".parse().unwrap();
        assert_eq!(time, 6_000_000_000);

        let Time(time) = "100000".parse().unwrap();
        assert_eq!(time, 100_000);
    }

    #[test]
    fn parse_errors() {
        assert!("".parse::<Time>().is_err());
        assert!("ms".parse::<Time>().is_err());
        assert!("1 2".parse::<Time>().is_err());
        assert!("99999999999999m".parse::<Time>().is_err());
    }

    #[test]
    fn saturating() {
        assert_eq!(Time::new(3).saturating_sub(Time::new(5)), Time::ZERO);
        assert_eq!(Time::MAX.saturating_add(Time::new(1)), Time::MAX);
    }
}
