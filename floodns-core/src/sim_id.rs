use anyhow::anyhow;
use std::{fmt, str};

macro_rules! sim_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(C)]
        pub struct $name(u64);

        impl $name {
            pub const ZERO: Self = $name::new(0);
            pub const ONE: Self = $name::new(1);

            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            #[inline]
            pub const fn into_u64(self) -> u64 {
                self.0
            }

            #[must_use = "function does not modify the current value"]
            pub(crate) fn next(self) -> Self {
                Self::new(self.0 + 1)
            }
        }

        impl str::FromStr for $name {
            type Err = anyhow::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse()
                    .map(Self)
                    .map_err(|error| anyhow!("invalid {}: {error}", stringify!($name)))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
        impl fmt::LowerHex for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::LowerHex::fmt(&self.0, f)
            }
        }
        impl fmt::UpperHex for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::UpperHex::fmt(&self.0, f)
            }
        }
    };
}

sim_id! {
    /// Identifier of a [`Node`] in the [`Network`].
    ///
    /// Nodes are dense: a network of `n` nodes holds exactly the
    /// identifiers `0..n`.
    ///
    /// [`Node`]: crate::node::Node
    /// [`Network`]: crate::network::Network
    NodeId
}

sim_id! {
    /// Identifier of a directed [`Link`].
    ///
    /// Link identifiers are handed out by a counter and never reused, even
    /// after the link was removed from the network.
    ///
    /// [`Link`]: crate::link::Link
    LinkId
}

sim_id! {
    /// Identifier of a [`Flow`], unique for the lifetime of a run.
    ///
    /// [`Flow`]: crate::flow::Flow
    FlowId
}

sim_id! {
    /// Identifier of a [`Connection`], unique for the lifetime of a run.
    ///
    /// [`Connection`]: crate::connection::Connection
    ConnectionId
}

sim_id! {
    /// Identifier of an event inserted in the simulator's queue.
    ///
    /// The value is also the insertion sequence number, which breaks
    /// ties between events of the same time and priority.
    #[derive(Default)]
    EventId
}

impl NodeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print() {
        assert_eq!(format!("{}", NodeId::new(42)), "42");
        assert_eq!(format!("{}", LinkId::new(7)), "7");
    }
    #[test]
    fn print_lower_hex() {
        assert_eq!(format!("{:x}", FlowId::new(42)), "2a")
    }
    #[test]
    fn print_upper_hex() {
        assert_eq!(format!("{:X}", ConnectionId::new(42)), "2A")
    }
    #[test]
    fn parse() {
        assert_eq!("42".parse::<NodeId>().unwrap(), NodeId::new(42));
        assert_eq!(" 3 ".parse::<LinkId>().unwrap(), LinkId::new(3));
        assert!("-1".parse::<FlowId>().is_err());
        assert!("abc".parse::<EventId>().is_err());
    }
    #[test]
    fn next() {
        assert_eq!(EventId::ZERO.next(), EventId::ONE);
        assert_eq!(NodeId::new(9).next().index(), 10);
    }
}
