//! Readiness interest sets.
//!
//! An `Interest` is a small bit set over {ACCEPT, READ, WRITE}. It is the
//! value the dispatcher reads to decide which readiness conditions to
//! report for a registration, and the value the pipeline writes (through
//! [`InterestOps`](crate::InterestOps)) to ask for more reads or writes.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not, Sub};

/// Set of readiness conditions a registration is interested in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interest(u8);

impl Interest {
    /// Listening channel has a pending connection.
    pub const ACCEPT: Interest = Interest(0b001);
    /// Connected channel has bytes (or EOF / error) to read.
    pub const READ: Interest = Interest(0b010);
    /// Connected channel can take more bytes.
    pub const WRITE: Interest = Interest(0b100);

    const ALL: u8 = 0b111;

    /// The empty set. Registrations start here before their owner exists.
    #[inline]
    pub const fn empty() -> Self {
        Interest(0)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every condition in `other` is also in `self`.
    #[inline]
    pub const fn contains(self, other: Interest) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// True if `self` and `other` share at least one condition.
    #[inline]
    pub const fn intersects(self, other: Interest) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub const fn add(self, other: Interest) -> Self {
        Interest(self.0 | other.0)
    }

    #[inline]
    pub const fn remove(self, other: Interest) -> Self {
        Interest(self.0 & !other.0)
    }

    pub fn is_acceptable(self) -> bool {
        self.contains(Self::ACCEPT)
    }

    pub fn is_readable(self) -> bool {
        self.contains(Self::READ)
    }

    pub fn is_writable(self) -> bool {
        self.contains(Self::WRITE)
    }
}

impl BitOr for Interest {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.add(rhs)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.add(rhs);
    }
}

impl BitAnd for Interest {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Interest(self.0 & rhs.0)
    }
}

impl Sub for Interest {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self.remove(rhs)
    }
}

impl Not for Interest {
    type Output = Self;
    fn not(self) -> Self {
        Interest(!self.0 & Self::ALL)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(empty)");
        }
        let mut sep = "";
        for (flag, name) in [
            (Self::ACCEPT, "ACCEPT"),
            (Self::READ, "READ"),
            (Self::WRITE, "WRITE"),
        ] {
            if self.contains(flag) {
                write!(f, "{}{}", sep, name)?;
                sep = " | ";
            }
        }
        Ok(())
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let i = Interest::empty();
        assert!(i.is_empty());
        assert!(!i.contains(Interest::READ));
        assert!(!i.is_readable());
        assert_eq!(i, Interest::default());
    }

    #[test]
    fn test_add_remove() {
        let i = Interest::empty().add(Interest::READ).add(Interest::WRITE);
        assert!(i.is_readable());
        assert!(i.is_writable());
        assert!(!i.is_acceptable());

        let i = i.remove(Interest::READ);
        assert!(!i.is_readable());
        assert!(i.is_writable());

        // Removing something not present is a no-op
        assert_eq!(i.remove(Interest::ACCEPT), i);
    }

    #[test]
    fn test_contains_empty_is_false() {
        // The empty set is not "contained"; nobody asks for nothing.
        assert!(!Interest::READ.contains(Interest::empty()));
    }

    #[test]
    fn test_operators() {
        let rw = Interest::READ | Interest::WRITE;
        assert_eq!(rw & Interest::READ, Interest::READ);
        assert_eq!(rw - Interest::WRITE, Interest::READ);
        assert_eq!(!rw, Interest::ACCEPT);
        assert!(rw.intersects(Interest::WRITE));
        assert!(!rw.intersects(Interest::ACCEPT));
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", Interest::empty()), "(empty)");
        assert_eq!(format!("{:?}", Interest::READ | Interest::WRITE), "READ | WRITE");
    }
}
