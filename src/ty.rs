// Copyright (c) 2017-2021 Fabian Schuiki

//! Types of signal values.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use self::Type::*;

/// The type of a port, wire, register, or expression in a lowered netlist.
///
/// Widths are in bits. The clock type behaves as a one bit unsigned value
/// whose transitions drive the triggered schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Unsigned integer types like `UInt<8>`.
    UInt(usize),
    /// Signed integer types like `SInt<8>`.
    SInt(usize),
    /// The clock type.
    Clock,
}

impl Type {
    /// Return the width of the type in bits.
    pub fn width(self) -> usize {
        match self {
            UInt(w) | SInt(w) => w,
            Clock => 1,
        }
    }

    /// Check whether values of this type are signed.
    pub fn is_signed(self) -> bool {
        match self {
            SInt(_) => true,
            _ => false,
        }
    }

    /// Check whether this is the clock type.
    pub fn is_clock(self) -> bool {
        self == Clock
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            UInt(w) => write!(f, "UInt<{}>", w),
            SInt(w) => write!(f, "SInt<{}>", w),
            Clock => write!(f, "Clock"),
        }
    }
}

/// Create an unsigned integer type of the requested width.
pub fn uint_ty(width: usize) -> Type {
    UInt(width)
}

/// Create a signed integer type of the requested width.
pub fn sint_ty(width: usize) -> Type {
    SInt(width)
}

/// Create a clock type.
pub fn clock_ty() -> Type {
    Clock
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatting() {
        assert_eq!(format!("{}", uint_ty(8)), "UInt<8>");
        assert_eq!(format!("{}", sint_ty(4)), "SInt<4>");
        assert_eq!(format!("{}", clock_ty()), "Clock");
    }

    #[test]
    fn widths() {
        assert_eq!(uint_ty(32).width(), 32);
        assert_eq!(clock_ty().width(), 1);
        assert!(sint_ty(1).is_signed());
        assert!(!uint_ty(1).is_signed());
    }
}
