// Copyright (c) 2017-2021 Fabian Schuiki

//! A Value Change Dump logger.

use crate::store::DataStore;
use crate::symbols::{Symbol, SymbolId, SymbolKind, SymbolTable};
use crate::tracer::DataStorePlugin;
use crate::value::to_field;
use num::BigInt;
use std::{cell::RefCell, collections::HashMap, io, io::Write};

/// A data store plugin that records slot writes as VCD.
pub struct VcdLogger<T> {
    writer: RefCell<T>,
    abbrevs: HashMap<SymbolId, (String, usize)>,
    pending: HashMap<SymbolId, BigInt>,
    time: u64,
}

impl<T> VcdLogger<T>
where
    T: io::Write,
{
    /// Create a new VCD logger, writing the header and an initial dump of
    /// all traced symbols.
    pub fn new(
        writer: T,
        symbols: &SymbolTable,
        store: &DataStore,
        top: &str,
        show_underscored: bool,
    ) -> io::Result<VcdLogger<T>> {
        let mut logger = VcdLogger {
            writer: RefCell::new(writer),
            abbrevs: HashMap::new(),
            pending: HashMap::new(),
            time: 0,
        };
        logger.prepare(symbols, store, top, show_underscored)?;
        Ok(logger)
    }

    /// Allocate short names and emit the header and `$dumpvars` block.
    fn prepare(
        &mut self,
        symbols: &SymbolTable,
        store: &DataStore,
        top: &str,
        show_underscored: bool,
    ) -> io::Result<()> {
        let mut w = self.writer.borrow_mut();
        write!(w, "$version\nlir {}\n$end\n", env!("CARGO_PKG_VERSION"))?;
        write!(w, "$timescale 1ns $end\n")?;
        write!(w, "$scope module {} $end\n", top.replace('.', "_"))?;
        let mut index = 0;
        for symbol in symbols.iter() {
            if !traced(symbol, show_underscored) {
                continue;
            }
            // Allocate a short name from the printable characters.
            let mut idx = index;
            let mut abbrev = String::new();
            loop {
                abbrev.push((33 + idx % 94) as u8 as char);
                idx /= 94;
                if idx == 0 {
                    break;
                }
            }
            index += 1;
            write!(
                w,
                "$var wire {} {} {} $end\n",
                symbol.width(),
                abbrev,
                symbol.name
            )?;
            self.abbrevs.insert(symbol.id, (abbrev, symbol.width()));
        }
        write!(w, "$upscope $end\n")?;
        write!(w, "$enddefinitions $end\n")?;

        write!(w, "$dumpvars\n")?;
        for symbol in symbols.iter() {
            if let Some((abbrev, width)) = self.abbrevs.get(&symbol.id) {
                let value = to_field(&store.read(symbol), *width);
                write!(w, "b{:b} {}\n", value, abbrev)?;
            }
        }
        write!(w, "$end\n")?;
        Ok(())
    }

    /// Write the value of all symbols that changed since the last flush.
    /// Clears the `pending` set.
    fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut w = self.writer.borrow_mut();
        write!(w, "#{}\n", self.time).unwrap();
        let mut changed: Vec<(SymbolId, BigInt)> =
            std::mem::replace(&mut self.pending, HashMap::new())
                .into_iter()
                .collect();
        changed.sort_by(|a, b| self.abbrevs[&a.0].0.cmp(&self.abbrevs[&b.0].0));
        for (id, value) in changed {
            let (abbrev, width) = &self.abbrevs[&id];
            write!(w, "b{:b} {}\n", to_field(&value, *width), abbrev).unwrap();
        }
    }
}

/// Whether a symbol appears in the trace.
///
/// Stage and shadow internals never do; names whose last segment starts with
/// an underscore only when requested.
fn traced(symbol: &Symbol, show_underscored: bool) -> bool {
    if symbol.name.contains('/') {
        return false;
    }
    if matches!(symbol.kind, SymbolKind::Memory | SymbolKind::Stop) {
        return false;
    }
    if !show_underscored {
        let last = symbol.name.rsplit('.').next().unwrap_or("");
        if last.starts_with('_') {
            return false;
        }
    }
    true
}

impl<T> DataStorePlugin for VcdLogger<T>
where
    T: io::Write,
{
    fn value_changed(&mut self, symbol: &Symbol, value: &BigInt) {
        if self.abbrevs.contains_key(&symbol.id) {
            self.pending.insert(symbol.id, value.clone());
        }
    }

    fn advance_time(&mut self, time: u64) {
        if time != self.time {
            self.flush_pending();
            self.time = time;
        }
    }

    fn flush(&mut self) {
        self.flush_pending();
        self.writer.borrow_mut().flush().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolKind;
    use crate::table::TableKey;
    use crate::ty::uint_ty;

    fn symbol(name: &str, kind: SymbolKind) -> Symbol {
        Symbol {
            id: SymbolId::new(0),
            name: name.into(),
            ty: uint_ty(8),
            kind,
            size: crate::store::SizeClass::Int,
            index: 0,
            slots: 1,
            prev: None,
        }
    }

    #[test]
    fn trace_filter() {
        assert!(traced(&symbol("io_a", SymbolKind::Wire), false));
        assert!(!traced(&symbol("counter/prev", SymbolKind::Wire), false));
        assert!(!traced(&symbol("_T_1", SymbolKind::Wire), false));
        assert!(traced(&symbol("_T_1", SymbolKind::Wire), true));
        assert!(!traced(&symbol("u0._gen", SymbolKind::Wire), false));
        assert!(!traced(&symbol("mem", SymbolKind::Memory), true));
    }

    #[test]
    fn header_and_changes() {
        let mut symbols = SymbolTable::new();
        symbols
            .add_symbol("io_a", uint_ty(8), SymbolKind::Wire, 1)
            .unwrap();
        let mut store = DataStore::new(1);
        symbols.allocate_data(&mut store);
        let mut logger =
            VcdLogger::new(Vec::new(), &symbols, &store, "top", false).unwrap();
        let id = symbols.get("io_a").unwrap();
        logger.advance_time(10);
        logger.value_changed(&symbols[id], &BigInt::from(5));
        logger.advance_time(20);
        logger.value_changed(&symbols[id], &BigInt::from(7));
        logger.flush();
        let text = String::from_utf8(logger.writer.into_inner()).unwrap();
        assert!(text.contains("$var wire 8 ! io_a $end"));
        assert!(text.contains("$enddefinitions $end"));
        assert!(text.contains("#10\nb101 !"));
        assert!(text.contains("#20\nb111 !"));
    }
}
