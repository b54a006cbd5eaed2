// Copyright (c) 2017-2021 Fabian Schuiki

//! Clock toggling and edge detection.

use crate::store::DataStore;
use crate::symbols::{SymbolId, SymbolTable};
use num::{traits::*, BigInt};

/// A level change between two samples of a clock signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The clock rose.
    Positive,
    /// The clock fell.
    Negative,
    /// No level change.
    Level,
}

/// Classify the change between two clock samples.
pub fn transition(before: &BigInt, now: &BigInt) -> Transition {
    match (before.is_zero(), now.is_zero()) {
        (true, false) => Transition::Positive,
        (false, true) => Transition::Negative,
        _ => Transition::Level,
    }
}

/// The strategy driving the top-level clock across cycles.
///
/// Circuits without a top-level `clock` or `clk` symbol get the null
/// strategy; cycles then only advance time and re-propagate inputs, which is
/// the correct behavior for purely combinational circuits.
pub enum ClockToggler {
    /// No top-level clock.
    Null,
    /// A toggler bound to the top-level clock and its shadow.
    Bound {
        /// The clock symbol.
        clock: SymbolId,
        /// The `<clock>/prev` shadow.
        prev: SymbolId,
    },
}

impl ClockToggler {
    /// Bind a toggler against a symbol table, searching for `clock` first and
    /// `clk` second.
    pub fn for_table(symbols: &SymbolTable) -> ClockToggler {
        for name in &["clock", "clk"] {
            if let Some(id) = symbols.get(name) {
                if let Some(prev) = symbols[id].prev {
                    info!("clock toggler bound to top-level `{}`", name);
                    return ClockToggler::Bound { clock: id, prev };
                }
            }
        }
        info!("no top-level clock; using null toggler");
        ClockToggler::Null
    }

    /// Return the driven clock symbol, if any.
    pub fn clock(&self) -> Option<SymbolId> {
        match self {
            ClockToggler::Bound { clock, .. } => Some(*clock),
            ClockToggler::Null => None,
        }
    }

    /// Drive the clock high.
    pub fn raise(&self, symbols: &SymbolTable, store: &mut DataStore) {
        if let ClockToggler::Bound { clock, .. } = self {
            store.write(&symbols[*clock], &BigInt::one());
        }
    }

    /// Drive the clock low.
    pub fn lower(&self, symbols: &SymbolTable, store: &mut DataStore) {
        if let ClockToggler::Bound { clock, .. } = self {
            store.write(&symbols[*clock], &BigInt::zero());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions() {
        let zero = BigInt::zero();
        let one = BigInt::one();
        assert_eq!(transition(&zero, &one), Transition::Positive);
        assert_eq!(transition(&one, &zero), Transition::Negative);
        assert_eq!(transition(&zero, &zero), Transition::Level);
        assert_eq!(transition(&one, &one), Transition::Level);
    }
}
