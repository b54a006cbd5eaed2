// Copyright (c) 2017-2021 Fabian Schuiki

//! The simulation data store.
//!
//! All symbol values live in three parallel arenas, one per size class, with
//! an optional ring of historical buffers for rollback queries. Buffer 0 is
//! always the current one; `advance_buffers` rotates the ring and exposes a
//! fresh copy of the current buffer, so earlier buffers keep the values of
//! past cycles.

use crate::symbols::Symbol;
use crate::tracer::DataStorePlugin;
use crate::value::normalize;
use num::{traits::*, BigInt};

/// The storage class of a symbol, chosen from its bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    /// Widths up to 31 bits, stored as `i32`.
    Int,
    /// Widths up to 63 bits, stored as `i64`.
    Long,
    /// Any wider value, stored as `BigInt`.
    Big,
}

impl SizeClass {
    /// Choose the size class for a bit width.
    pub fn of_width(width: usize) -> SizeClass {
        if width <= 31 {
            SizeClass::Int
        } else if width <= 63 {
            SizeClass::Long
        } else {
            SizeClass::Big
        }
    }
}

/// One buffer of slot values, split by size class.
#[derive(Clone, Default)]
struct Arena {
    ints: Vec<i32>,
    longs: Vec<i64>,
    bigs: Vec<BigInt>,
}

/// The flat value store of an engine.
pub struct DataStore {
    buffers: Vec<Arena>,
    current: usize,
    plugins: Vec<Box<dyn DataStorePlugin>>,
    plugins_enabled: bool,
}

impl DataStore {
    /// Create a new data store with the given number of buffers.
    ///
    /// A depth of 1 keeps only the current values; every additional buffer
    /// retains one more cycle of history.
    pub fn new(num_buffers: usize) -> DataStore {
        let num_buffers = num_buffers.max(1);
        DataStore {
            buffers: vec![Arena::default(); num_buffers],
            current: 0,
            plugins: Vec::new(),
            plugins_enabled: false,
        }
    }

    /// Grow the arena of a size class by `slots` zeroed slots in every
    /// buffer, returning the base index of the new slots.
    pub fn allocate(&mut self, class: SizeClass, slots: usize) -> usize {
        let base = match class {
            SizeClass::Int => self.buffers[0].ints.len(),
            SizeClass::Long => self.buffers[0].longs.len(),
            SizeClass::Big => self.buffers[0].bigs.len(),
        };
        for buffer in &mut self.buffers {
            match class {
                SizeClass::Int => buffer.ints.resize(base + slots, 0),
                SizeClass::Long => buffer.longs.resize(base + slots, 0),
                SizeClass::Big => buffer.bigs.resize(base + slots, BigInt::zero()),
            }
        }
        base
    }

    /// Read a symbol's value from the current buffer.
    pub fn read(&self, symbol: &Symbol) -> BigInt {
        self.read_buffer(symbol, self.current)
    }

    /// Read a symbol's value from buffer `k`, where 0 is the current buffer
    /// and larger values reach further into the past.
    ///
    /// Reads never fail; an offset beyond the oldest buffer is clamped.
    pub fn earlier_value(&self, symbol: &Symbol, k: usize) -> BigInt {
        let k = k.min(self.buffers.len() - 1);
        let physical = (self.current + k) % self.buffers.len();
        self.read_buffer(symbol, physical)
    }

    fn read_buffer(&self, symbol: &Symbol, buffer: usize) -> BigInt {
        let arena = &self.buffers[buffer];
        match symbol.size {
            SizeClass::Int => BigInt::from(arena.ints[symbol.index]),
            SizeClass::Long => BigInt::from(arena.longs[symbol.index]),
            SizeClass::Big => arena.bigs[symbol.index].clone(),
        }
    }

    /// Write a symbol's value into the current buffer.
    ///
    /// The value is masked to the symbol's width and sign-folded, so slots
    /// always hold canonical values.
    pub fn write(&mut self, symbol: &Symbol, value: &BigInt) {
        let value = normalize(value, symbol.ty);
        self.store(symbol.size, symbol.index, &value);
        if self.plugins_enabled {
            for plugin in &mut self.plugins {
                plugin.value_changed(symbol, &value);
            }
        }
    }

    /// Read a raw slot of a size-class arena in the current buffer.
    pub fn read_at_index(&self, class: SizeClass, index: usize) -> BigInt {
        let arena = &self.buffers[self.current];
        match class {
            SizeClass::Int => BigInt::from(arena.ints[index]),
            SizeClass::Long => BigInt::from(arena.longs[index]),
            SizeClass::Big => arena.bigs[index].clone(),
        }
    }

    /// Write a raw slot of a size-class arena in the current buffer.
    ///
    /// The caller is responsible for normalizing the value; memory write
    /// ports and black boxes normalize against the element type first.
    pub fn write_at_index(&mut self, class: SizeClass, index: usize, value: &BigInt) {
        self.store(class, index, value);
    }

    fn store(&mut self, class: SizeClass, index: usize, value: &BigInt) {
        let arena = &mut self.buffers[self.current];
        match class {
            SizeClass::Int => arena.ints[index] = value.to_i32().unwrap(),
            SizeClass::Long => arena.longs[index] = value.to_i64().unwrap(),
            SizeClass::Big => arena.bigs[index] = value.clone(),
        }
    }

    /// Rotate the buffer ring.
    ///
    /// The current buffer becomes buffer 1 and a fresh buffer, seeded with a
    /// copy of the current values, becomes buffer 0. A store with a single
    /// buffer is unaffected.
    pub fn advance_buffers(&mut self) {
        let n = self.buffers.len();
        if n == 1 {
            return;
        }
        let old = self.current;
        self.current = (self.current + n - 1) % n;
        let snapshot = self.buffers[old].clone();
        self.buffers[self.current] = snapshot;
    }

    /// Return the number of buffers.
    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Return the physical index of the current buffer.
    pub fn current_buffer_index(&self) -> usize {
        self.current
    }

    /// Return the physical index of the previous buffer.
    pub fn previous_buffer_index(&self) -> usize {
        (self.current + 1) % self.buffers.len()
    }

    /// Hook a plugin into the store and enable change notification.
    pub fn add_plugin(&mut self, plugin: Box<dyn DataStorePlugin>) {
        self.plugins.push(plugin);
        self.plugins_enabled = true;
    }

    /// Remove all plugins and disable change notification.
    pub fn clear_plugins(&mut self) {
        self.plugins.clear();
        self.plugins_enabled = false;
    }

    /// Check whether any plugin is hooked in.
    pub fn has_plugins(&self) -> bool {
        !self.plugins.is_empty()
    }

    /// Enable or disable change notification without removing plugins.
    pub fn set_plugins_enabled(&mut self, enabled: bool) {
        self.plugins_enabled = enabled && !self.plugins.is_empty();
    }

    /// Forward the new wall time to all plugins.
    pub fn advance_plugin_time(&mut self, time: u64) {
        for plugin in &mut self.plugins {
            plugin.advance_time(time);
        }
    }

    /// Flush all plugins.
    pub fn flush_plugins(&mut self) {
        for plugin in &mut self.plugins {
            plugin.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{SymbolId, SymbolKind};
    use crate::table::TableKey;
    use crate::ty::{sint_ty, uint_ty, Type};

    fn symbol(ty: Type, index: usize) -> Symbol {
        Symbol {
            id: SymbolId::new(0),
            name: "s".into(),
            ty,
            kind: SymbolKind::Wire,
            size: SizeClass::of_width(ty.width()),
            index,
            slots: 1,
            prev: None,
        }
    }

    #[test]
    fn size_classes() {
        assert_eq!(SizeClass::of_width(1), SizeClass::Int);
        assert_eq!(SizeClass::of_width(31), SizeClass::Int);
        assert_eq!(SizeClass::of_width(32), SizeClass::Long);
        assert_eq!(SizeClass::of_width(63), SizeClass::Long);
        assert_eq!(SizeClass::of_width(64), SizeClass::Big);
    }

    #[test]
    fn writes_are_masked() {
        let mut store = DataStore::new(1);
        store.allocate(SizeClass::Int, 1);
        let sym = symbol(uint_ty(8), 0);
        store.write(&sym, &BigInt::from(0x1ff));
        assert_eq!(store.read(&sym), BigInt::from(0xff));
    }

    #[test]
    fn signed_values_fold_negative() {
        let mut store = DataStore::new(1);
        store.allocate(SizeClass::Int, 1);
        let sym = symbol(sint_ty(8), 0);
        store.write(&sym, &BigInt::from(200));
        assert_eq!(store.read(&sym), BigInt::from(-56));
    }

    #[test]
    fn buffers_rotate() {
        let mut store = DataStore::new(3);
        store.allocate(SizeClass::Long, 1);
        let sym = symbol(uint_ty(32), 0);
        store.write(&sym, &BigInt::from(1));
        store.advance_buffers();
        store.write(&sym, &BigInt::from(2));
        store.advance_buffers();
        store.write(&sym, &BigInt::from(3));
        assert_eq!(store.read(&sym), BigInt::from(3));
        assert_eq!(store.earlier_value(&sym, 1), BigInt::from(2));
        assert_eq!(store.earlier_value(&sym, 2), BigInt::from(1));
        // Beyond the oldest buffer the read clamps.
        assert_eq!(store.earlier_value(&sym, 7), BigInt::from(1));
    }

    #[test]
    fn single_buffer_advance_is_a_no_op() {
        let mut store = DataStore::new(1);
        store.allocate(SizeClass::Int, 1);
        let sym = symbol(uint_ty(4), 0);
        store.write(&sym, &BigInt::from(5));
        store.advance_buffers();
        assert_eq!(store.read(&sym), BigInt::from(5));
        assert_eq!(store.num_buffers(), 1);
    }

    #[test]
    fn raw_index_access() {
        let mut store = DataStore::new(1);
        let base = store.allocate(SizeClass::Big, 4);
        store.write_at_index(SizeClass::Big, base + 2, &BigInt::from(77));
        assert_eq!(store.read_at_index(SizeClass::Big, base + 2), BigInt::from(77));
        assert_eq!(store.read_at_index(SizeClass::Big, base + 3), BigInt::zero());
    }
}
