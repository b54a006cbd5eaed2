// Copyright (c) 2017-2021 Fabian Schuiki

//! The assigner scheduler.
//!
//! The scheduler owns all compiled assigners, partitioned into the orphan
//! list (run once at construction), the input-sensitive list (replayed while
//! inputs are dirty), and one triggered bucket per clock symbol. Execution
//! order within the combinational partition is a Kahn topological sort with
//! ties broken by output symbol name, so runs are deterministic.

use crate::assign::{Assigner, EvalContext};
use crate::error::EngineError;
use crate::symbols::{SymbolId, SymbolTable};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

/// The partitioned, ordered assigner lists of an engine.
pub struct Scheduler {
    combinational: Vec<Assigner>,
    input_sensitive: Vec<usize>,
    orphan: Vec<usize>,
    clock_assigns: Vec<usize>,
    triggered: BTreeMap<SymbolId, Vec<Assigner>>,
    lean: bool,
}

impl Scheduler {
    /// Create a scheduler over the compiled assigners.
    ///
    /// Triggered assigners are bucketed by their clock; the combinational
    /// list stays unsorted until [`sort_combinational_assigns`] runs.
    ///
    /// [`sort_combinational_assigns`]: Scheduler::sort_combinational_assigns
    pub fn new(combinational: Vec<Assigner>, triggered: Vec<Assigner>) -> Scheduler {
        let mut buckets: BTreeMap<SymbolId, Vec<Assigner>> = BTreeMap::new();
        for assigner in triggered {
            let clock = assigner
                .trigger_clock()
                .expect("triggered assigner without a clock");
            buckets.entry(clock).or_default().push(assigner);
        }
        Scheduler {
            combinational,
            input_sensitive: Vec::new(),
            orphan: Vec::new(),
            clock_assigns: Vec::new(),
            triggered: buckets,
            lean: true,
        }
    }

    /// Topologically sort the combinational assigners.
    ///
    /// Fails on a second driver for any symbol. A combinational cycle is
    /// fatal unless `allow_cycles` is set, in which case the members of the
    /// cycle are appended in name order and execution proceeds anyway.
    pub fn sort_combinational_assigns(
        &mut self,
        symbols: &SymbolTable,
        allow_cycles: bool,
    ) -> Result<(), EngineError> {
        let n = self.combinational.len();
        let mut producer: HashMap<SymbolId, usize> = HashMap::new();
        for (i, assigner) in self.combinational.iter().enumerate() {
            if producer.insert(assigner.symbol, i).is_some() {
                return Err(EngineError::MultipleDrivers(
                    symbols[assigner.symbol].name.clone(),
                ));
            }
        }

        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree: Vec<usize> = vec![0; n];
        for (i, assigner) in self.combinational.iter().enumerate() {
            for operand in assigner.operands() {
                if let Some(&j) = producer.get(&operand) {
                    successors[j].push(i);
                    in_degree[i] += 1;
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<(String, usize)>> = self
            .combinational
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] == 0)
            .map(|(i, a)| Reverse((symbols[a.symbol].name.clone(), i)))
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse((_, i))) = ready.pop() {
            order.push(i);
            for &j in &successors[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.push(Reverse((symbols[self.combinational[j].symbol].name.clone(), j)));
                }
            }
        }

        if order.len() < n {
            let mut remaining: Vec<usize> = (0..n).filter(|i| !order.contains(i)).collect();
            remaining.sort_by(|&a, &b| {
                symbols[self.combinational[a].symbol]
                    .name
                    .cmp(&symbols[self.combinational[b].symbol].name)
            });
            let through = symbols[self.combinational[remaining[0]].symbol].name.clone();
            if !allow_cycles {
                return Err(EngineError::CombinationalCycle(through));
            }
            warn!(
                "combinational cycle through `{}` broken; {} assigners appended in name order",
                through,
                remaining.len()
            );
            order.extend(remaining);
        }

        let mut slots: Vec<Option<Assigner>> =
            self.combinational.drain(..).map(Some).collect();
        self.combinational = order
            .into_iter()
            .map(|i| slots[i].take().expect("assigner ordered twice"))
            .collect();
        debug!("sorted {} combinational assigners", n);
        Ok(())
    }

    /// Sort every triggered bucket by output symbol name.
    ///
    /// Commits read stage slots written in a different phase, so name order
    /// is already a valid topological order within a bucket.
    pub fn sort_triggered_assigns(&mut self, symbols: &SymbolTable) {
        for bucket in self.triggered.values_mut() {
            bucket.sort_by(|a, b| symbols[a.symbol].name.cmp(&symbols[b.symbol].name));
        }
    }

    /// Partition the sorted combinational list into the input-sensitive and
    /// orphan lists, and note the clock-tree assigners.
    pub fn partition_input_sensitive(&mut self, symbols: &SymbolTable, inputs: &[SymbolId]) {
        let closure = symbols.children_of.reachable_from(inputs);
        self.input_sensitive.clear();
        self.orphan.clear();
        self.clock_assigns.clear();
        for (i, assigner) in self.combinational.iter().enumerate() {
            if closure.contains(&assigner.symbol) {
                self.input_sensitive.push(i);
            } else {
                self.orphan.push(i);
            }
            if symbols[assigner.symbol].ty.is_clock() {
                self.clock_assigns.push(i);
            }
        }
        debug!(
            "partitioned assigners: {} input-sensitive, {} orphans, {} clock-tree",
            self.input_sensitive.len(),
            self.orphan.len(),
            self.clock_assigns.len()
        );
    }

    /// Run a list of combinational assigners by index, in order.
    pub fn execute_assigners(&self, indices: &[usize], ctx: &mut EvalContext) {
        for &i in indices {
            self.combinational[i].execute(ctx);
        }
    }

    /// Run the input-sensitive list. Idempotent on unchanged inputs.
    pub fn execute_input_sensitivities(&self, ctx: &mut EvalContext) {
        self.execute_assigners(&self.input_sensitive, ctx);
    }

    /// Run the orphan list; done once from the engine constructor.
    pub fn execute_orphans(&self, ctx: &mut EvalContext) {
        self.execute_assigners(&self.orphan, ctx);
    }

    /// Run the clock-tree assigners only, refreshing derived clock levels.
    pub fn execute_clock_assigns(&self, ctx: &mut EvalContext) {
        self.execute_assigners(&self.clock_assigns, ctx);
    }

    /// Run the triggered bucket of a clock, if it has one.
    pub fn execute_triggered_assigns(&self, clock: SymbolId, ctx: &mut EvalContext) {
        if let Some(bucket) = self.triggered.get(&clock) {
            for assigner in bucket {
                assigner.execute(ctx);
            }
        }
    }

    /// Return the combinational assigner indices whose output is in the
    /// given set, preserving the topological order.
    pub fn assigners_for(&self, set: &HashSet<SymbolId>) -> Vec<usize> {
        self.combinational
            .iter()
            .enumerate()
            .filter(|(_, a)| set.contains(&a.symbol))
            .map(|(i, _)| i)
            .collect()
    }

    /// Find the assigner producing a symbol, checking the combinational list
    /// first and the triggered buckets second.
    pub fn producing(&self, symbol: SymbolId) -> Option<&Assigner> {
        self.combinational
            .iter()
            .find(|a| a.symbol == symbol)
            .or_else(|| {
                self.triggered
                    .values()
                    .flatten()
                    .find(|a| a.symbol == symbol)
            })
    }

    /// Switch between lean execution and fat execution with tracing hooks.
    pub fn set_lean_mode(&mut self, lean: bool) {
        self.lean = lean;
    }

    /// Check whether the scheduler runs lean.
    pub fn is_lean(&self) -> bool {
        self.lean
    }

    /// Return the number of combinational assigners.
    pub fn num_combinational(&self) -> usize {
        self.combinational.len()
    }

    /// Return the number of input-sensitive assigners.
    pub fn num_input_sensitive(&self) -> usize {
        self.input_sensitive.len()
    }

    /// Return the clocks that have triggered buckets.
    pub fn trigger_clocks(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.triggered.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assign::{AssignKind, Expr, ExprKind};
    use crate::ir::PrimOp;
    use crate::symbols::SymbolKind;
    use crate::ty::uint_ty;
    use num::BigInt;

    fn wire(symbols: &mut SymbolTable, name: &str) -> SymbolId {
        symbols
            .add_symbol(name, uint_ty(8), SymbolKind::Wire, 1)
            .unwrap()
    }

    fn assign(symbol: SymbolId, expr: Expr) -> Assigner {
        Assigner {
            symbol,
            kind: AssignKind::Expr { expr, notify: None },
        }
    }

    fn read(sym: SymbolId) -> Expr {
        Expr::read(sym, uint_ty(8))
    }

    fn add(a: SymbolId, b: SymbolId) -> Expr {
        Expr {
            ty: uint_ty(8),
            kind: ExprKind::Prim {
                op: PrimOp::Add,
                args: vec![read(a), read(b)],
                params: vec![],
            },
        }
    }

    #[test]
    fn topological_order() {
        let mut symbols = SymbolTable::new();
        let a = wire(&mut symbols, "a");
        let b = wire(&mut symbols, "b");
        let c = wire(&mut symbols, "c");
        // c = a + b, b = a, a = const; emitted deliberately out of order.
        let mut sched = Scheduler::new(
            vec![
                assign(c, add(a, b)),
                assign(b, read(a)),
                assign(a, Expr::constant(&BigInt::from(1), uint_ty(8))),
            ],
            vec![],
        );
        sched.sort_combinational_assigns(&symbols, false).unwrap();
        let order: Vec<SymbolId> = sched.combinational.iter().map(|x| x.symbol).collect();
        assert_eq!(order, vec![a, b, c]);
    }

    #[test]
    fn name_ties_are_deterministic() {
        let mut symbols = SymbolTable::new();
        let z = wire(&mut symbols, "z");
        let m = wire(&mut symbols, "m");
        let k = wire(&mut symbols, "k");
        let mut sched = Scheduler::new(
            vec![
                assign(z, Expr::constant(&BigInt::from(1), uint_ty(8))),
                assign(m, Expr::constant(&BigInt::from(2), uint_ty(8))),
                assign(k, Expr::constant(&BigInt::from(3), uint_ty(8))),
            ],
            vec![],
        );
        sched.sort_combinational_assigns(&symbols, false).unwrap();
        let order: Vec<SymbolId> = sched.combinational.iter().map(|x| x.symbol).collect();
        assert_eq!(order, vec![k, m, z]);
    }

    #[test]
    fn cycles_are_fatal_unless_allowed() {
        let mut symbols = SymbolTable::new();
        let a = wire(&mut symbols, "a");
        let b = wire(&mut symbols, "b");
        let mut sched = Scheduler::new(vec![assign(a, read(b)), assign(b, read(a))], vec![]);
        assert!(matches!(
            sched.sort_combinational_assigns(&symbols, false),
            Err(EngineError::CombinationalCycle(_))
        ));

        let mut sched = Scheduler::new(vec![assign(a, read(b)), assign(b, read(a))], vec![]);
        sched.sort_combinational_assigns(&symbols, true).unwrap();
        assert_eq!(sched.num_combinational(), 2);
    }

    #[test]
    fn duplicate_drivers_are_fatal() {
        let mut symbols = SymbolTable::new();
        let a = wire(&mut symbols, "a");
        let mut sched = Scheduler::new(
            vec![
                assign(a, Expr::constant(&BigInt::from(1), uint_ty(8))),
                assign(a, Expr::constant(&BigInt::from(2), uint_ty(8))),
            ],
            vec![],
        );
        assert!(matches!(
            sched.sort_combinational_assigns(&symbols, false),
            Err(EngineError::MultipleDrivers(_))
        ));
    }
}
