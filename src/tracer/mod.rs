// Copyright (c) 2017-2021 Fabian Schuiki

//! Value-change observers.
//!
//! A [`DataStorePlugin`] is notified for every slot write while the engine
//! runs in fat mode, and once per cycle with the new wall time. The VCD
//! logger is the one shipped implementation.

mod vcd;

pub use self::vcd::VcdLogger;

use crate::symbols::Symbol;
use num::BigInt;

/// An observer hooked into the data store.
pub trait DataStorePlugin {
    /// Called for every symbol write while plugins are enabled.
    fn value_changed(&mut self, symbol: &Symbol, value: &BigInt);

    /// Called once per cycle with the new wall time.
    fn advance_time(&mut self, _time: u64) {}

    /// Flush any buffered output.
    fn flush(&mut self) {}
}
