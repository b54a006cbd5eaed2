// Copyright (c) 2017-2021 Fabian Schuiki

//! The interpretation engine.
//!
//! The engine owns the symbol table, the data store, and the scheduler, and
//! drives them across clock cycles under stimulus from a test driver: poke
//! inputs, advance the clock, peek outputs. One cycle advances wall time,
//! raises the clock, evaluates the circuit, and lowers the clock again; the
//! circuit is evaluated after the rising edge only, so values sampled during
//! the low phase are not re-propagated.

use crate::assign::{AssignKind, EvalContext, EvalEvents};
use crate::blackbox::{BlackBoxFactory, BlackBoxRef, BlackBoxRegistry};
use crate::clock::{transition, ClockToggler, Transition};
use crate::compiler::{compile, Compilation};
use crate::error::EngineError;
use crate::ir::Circuit;
use crate::sched::Scheduler;
use crate::store::DataStore;
use crate::symbols::{SymbolId, SymbolKind, SymbolTable};
use crate::tracer::VcdLogger;
use itertools::Itertools;
use num::{traits::*, BigInt};
use rand::{rngs::StdRng, SeedableRng};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// The wall-time increment of one clock period.
const CYCLE_PERIOD: u64 = 10;

/// The options record an engine is constructed with.
#[derive(Default)]
pub struct EngineOptions {
    /// Trace every assigner execution.
    pub verbose: bool,
    /// Dump the netlist text at construction.
    pub show_circuit_at_load: bool,
    /// The number of historical buffers kept for rollback queries.
    pub rollback_buffers: usize,
    /// Report combinational cycles instead of failing on them.
    pub allow_cycles: bool,
    /// Whether invalid `validif` values read as random.
    pub valid_if_is_random: bool,
    /// The factories black boxes are resolved against.
    pub black_box_factories: Vec<Box<dyn BlackBoxFactory>>,
}

/// A cycle-accurate interpreter for one lowered circuit.
pub struct Engine {
    name: String,
    symbols: SymbolTable,
    store: DataStore,
    scheduler: Scheduler,
    toggler: ClockToggler,
    clock_symbols: Vec<SymbolId>,
    clock_subscribers: Vec<(SymbolId, String, BlackBoxRef)>,
    input_ports: Vec<SymbolId>,
    output_ports: Vec<SymbolId>,
    stops: Vec<SymbolId>,
    inputs_changed: bool,
    wall_time: u64,
    cycle_count: u64,
    verbose: bool,
    valid_if_is_random: bool,
    rng: StdRng,
    events: EvalEvents,
}

impl Engine {
    /// Build an engine for a circuit.
    ///
    /// Compiles the circuit, allocates the data store, sorts the schedule,
    /// and runs the orphan assigners once so constant-fed wires reach steady
    /// state before the first cycle.
    pub fn new(circuit: &Circuit, options: EngineOptions) -> Result<Engine, EngineError> {
        if options.show_circuit_at_load {
            println!("{}", circuit);
        }
        let registry = BlackBoxRegistry::new(options.black_box_factories);
        let Compilation {
            mut symbols,
            combinational,
            triggered,
            clock_subscribers,
            stops,
            input_ports,
            output_ports,
        } = compile(circuit, registry)?;

        let mut store = DataStore::new(options.rollback_buffers + 1);
        symbols.allocate_data(&mut store);

        let mut scheduler = Scheduler::new(combinational, triggered);
        scheduler.sort_combinational_assigns(&symbols, options.allow_cycles)?;
        scheduler.sort_triggered_assigns(&symbols);
        scheduler.partition_input_sensitive(&symbols, &input_ports);
        scheduler.set_lean_mode(!options.verbose);

        let toggler = ClockToggler::for_table(&symbols);
        let clock_symbols: Vec<SymbolId> = symbols
            .ids_by_name()
            .filter(|&id| symbols[id].kind == SymbolKind::Clock)
            .collect();

        let mut engine = Engine {
            name: circuit.name.clone(),
            symbols,
            store,
            scheduler,
            toggler,
            clock_symbols,
            clock_subscribers,
            input_ports,
            output_ports,
            stops,
            inputs_changed: true,
            wall_time: 0,
            cycle_count: 0,
            verbose: options.verbose,
            valid_if_is_random: options.valid_if_is_random,
            rng: StdRng::seed_from_u64(0x11b),
            events: EvalEvents::default(),
        };
        engine.run_orphans();
        info!(
            "engine for `{}` ready: {} symbols, {} combinational assigners ({} input-sensitive)",
            engine.name,
            engine.symbols.len(),
            engine.scheduler.num_combinational(),
            engine.scheduler.num_input_sensitive(),
        );
        Ok(engine)
    }

    fn run_orphans(&mut self) {
        let Engine {
            ref symbols,
            ref mut store,
            ref scheduler,
            ref mut rng,
            ref mut events,
            valid_if_is_random,
            verbose,
            ..
        } = *self;
        let mut ctx = EvalContext {
            symbols,
            store,
            rng,
            events,
            valid_if_is_random,
            verbose,
        };
        scheduler.execute_orphans(&mut ctx);
    }

    /// Run the input-sensitive list once.
    fn propagate(&mut self) {
        let Engine {
            ref symbols,
            ref mut store,
            ref scheduler,
            ref mut rng,
            ref mut events,
            valid_if_is_random,
            verbose,
            ..
        } = *self;
        let mut ctx = EvalContext {
            symbols,
            store,
            rng,
            events,
            valid_if_is_random,
            verbose,
        };
        scheduler.execute_input_sensitivities(&mut ctx);
    }

    fn run_assigners(&mut self, indices: &[usize]) {
        let Engine {
            ref symbols,
            ref mut store,
            ref scheduler,
            ref mut rng,
            ref mut events,
            valid_if_is_random,
            verbose,
            ..
        } = *self;
        let mut ctx = EvalContext {
            symbols,
            store,
            rng,
            events,
            valid_if_is_random,
            verbose,
        };
        scheduler.execute_assigners(indices, &mut ctx);
    }

    /// Compare every clock symbol against its shadow, firing black-box
    /// notifications and triggered buckets for new edges. Returns whether
    /// any clock transitioned.
    fn detect_and_fire_edges(&mut self) -> bool {
        let mut any = false;
        for i in 0..self.clock_symbols.len() {
            let clock = self.clock_symbols[i];
            let prev = self.symbols[clock].prev.expect("clock without shadow");
            let now = self.store.read(&self.symbols[clock]);
            let before = self.store.read(&self.symbols[prev]);
            let edge = transition(&before, &now);
            if edge == Transition::Level {
                continue;
            }
            any = true;
            debug!("clock `{}` {:?}", self.symbols[clock].name, edge);
            self.store.write(&self.symbols[prev], &now);
            for (subscribed, pin, instance) in &self.clock_subscribers {
                if *subscribed == clock {
                    instance.lock().unwrap().clock_change(edge, pin);
                }
            }
            if edge == Transition::Positive {
                let Engine {
                    ref symbols,
                    ref mut store,
                    ref scheduler,
                    ref mut rng,
                    ref mut events,
                    valid_if_is_random,
                    verbose,
                    ..
                } = *self;
                let mut ctx = EvalContext {
                    symbols,
                    store,
                    rng,
                    events,
                    valid_if_is_random,
                    verbose,
                };
                scheduler.execute_triggered_assigns(clock, &mut ctx);
            }
        }
        any
    }

    /// One full evaluation: rotate buffers, run the triggered bucket of
    /// every clock that transitioned, then the input-sensitive list while
    /// dirty, repeating edge detection for derived clocks that change during
    /// propagation, and finally check the stop latch.
    fn evaluate(&mut self) -> Result<(), EngineError> {
        self.store.advance_buffers();
        let mut rounds = 0;
        loop {
            let fired = self.detect_and_fire_edges();
            let dirty = fired || self.inputs_changed;
            self.inputs_changed = false;
            if !dirty {
                break;
            }
            self.propagate();
            rounds += 1;
            if rounds > self.clock_symbols.len() + 2 {
                warn!("clock tree did not settle after {} rounds", rounds);
                break;
            }
        }
        match self.last_stop_result() {
            Some(code) => Err(EngineError::Stopped(code)),
            None => Ok(()),
        }
    }

    /// Drive the clock low and refresh the clock tree, without
    /// re-propagating outputs.
    fn lower_clock(&mut self) {
        self.toggler.lower(&self.symbols, &mut self.store);
        {
            let Engine {
                ref symbols,
                ref mut store,
                ref scheduler,
                ref mut rng,
                ref mut events,
                valid_if_is_random,
                verbose,
                ..
            } = *self;
            let mut ctx = EvalContext {
                symbols,
                store,
                rng,
                events,
                valid_if_is_random,
                verbose,
            };
            scheduler.execute_clock_assigns(&mut ctx);
        }
        for i in 0..self.clock_symbols.len() {
            let clock = self.clock_symbols[i];
            let prev = self.symbols[clock].prev.expect("clock without shadow");
            let now = self.store.read(&self.symbols[clock]);
            let before = self.store.read(&self.symbols[prev]);
            let edge = transition(&before, &now);
            if edge == Transition::Level {
                continue;
            }
            self.store.write(&self.symbols[prev], &now);
            for (subscribed, pin, instance) in &self.clock_subscribers {
                if *subscribed == clock {
                    instance.lock().unwrap().clock_change(edge, pin);
                }
            }
        }
    }

    fn check_stopped(&self) -> Result<(), EngineError> {
        match self.last_stop_result() {
            Some(code) => Err(EngineError::Stopped(code)),
            None => Ok(()),
        }
    }

    /// Run one full clock period.
    ///
    /// Pending input changes settle before the rising edge, so pokes made
    /// since the last cycle are visible to the registers committing on it.
    pub fn cycle(&mut self, show_state: bool) -> Result<(), EngineError> {
        self.check_stopped()?;
        if self.inputs_changed {
            self.propagate();
            self.inputs_changed = false;
        }
        self.wall_time += CYCLE_PERIOD;
        self.store.advance_plugin_time(self.wall_time);
        self.toggler.raise(&self.symbols, &mut self.store);
        self.inputs_changed = true;
        let result = self.evaluate();
        self.lower_clock();
        self.cycle_count += 1;
        if show_state {
            println!("state after cycle {}:\n{}", self.cycle_count, self.state_string());
        }
        result
    }

    /// Run `n` cycles, returning early when a stop condition latches.
    pub fn do_cycles(&mut self, n: usize) -> Result<(), EngineError> {
        info!("running {} cycles from wall time {}", n, self.wall_time);
        for _ in 0..n {
            self.cycle(false)?;
        }
        Ok(())
    }

    /// Low-level single evaluation.
    ///
    /// With `specific_deps` given, only the forward transitive subgraph of
    /// those symbols is re-run instead of a full evaluation.
    pub fn evaluate_circuit(&mut self, specific_deps: &[&str]) -> Result<(), EngineError> {
        self.check_stopped()?;
        if specific_deps.is_empty() {
            return self.evaluate();
        }
        let mut roots = Vec::with_capacity(specific_deps.len());
        for name in specific_deps {
            roots.push(self.symbols.lookup(name)?);
        }
        let reached = self.symbols.children_of.reachable_from(&roots);
        let indices = self.scheduler.assigners_for(&reached);
        self.run_assigners(&indices);
        self.check_stopped()
    }

    /// Read a symbol's current value, settling pending input changes first.
    pub fn get_value(&mut self, name: &str) -> Result<BigInt, EngineError> {
        self.get_value_at(name, 0)
    }

    /// Read a symbol's value at a slot offset; memories index their
    /// elements this way.
    pub fn get_value_at(&mut self, name: &str, offset: usize) -> Result<BigInt, EngineError> {
        self.check_stopped()?;
        if self.inputs_changed {
            self.propagate();
            self.inputs_changed = false;
        }
        let id = self.symbols.lookup(name)?;
        let (size, index, slots) = {
            let sym = &self.symbols[id];
            (sym.size, sym.index, sym.slots)
        };
        if offset >= slots {
            return Err(EngineError::OffsetOutOfRange {
                name: name.to_string(),
                offset,
                slots,
            });
        }
        if offset == 0 {
            Ok(self.store.read(&self.symbols[id]))
        } else {
            Ok(self.store.read_at_index(size, index + offset))
        }
    }

    /// Poke a primary input, marking inputs dirty.
    ///
    /// Returns the normalized value actually written. Non-input targets
    /// fail; use [`force_value`](Engine::force_value) or
    /// [`poke_register`](Engine::poke_register) for those.
    pub fn set_value(&mut self, name: &str, value: BigInt) -> Result<BigInt, EngineError> {
        self.check_stopped()?;
        let id = self.symbols.lookup(name)?;
        if !self.input_ports.contains(&id) {
            return Err(EngineError::BadTarget(name.to_string()));
        }
        self.store.write(&self.symbols[id], &value);
        self.inputs_changed = true;
        let written = self.store.read(&self.symbols[id]);
        if self.verbose {
            trace!("poke {} <= {}", name, written);
        }
        Ok(written)
    }

    /// Poke a memory element directly.
    pub fn set_value_at(
        &mut self,
        name: &str,
        value: BigInt,
        offset: usize,
    ) -> Result<BigInt, EngineError> {
        self.check_stopped()?;
        let id = self.symbols.lookup(name)?;
        let (size, index, slots, ty, kind) = {
            let sym = &self.symbols[id];
            (sym.size, sym.index, sym.slots, sym.ty, sym.kind)
        };
        if kind != SymbolKind::Memory {
            if offset == 0 {
                return self.set_value(name, value);
            }
            return Err(EngineError::OffsetOutOfRange {
                name: name.to_string(),
                offset,
                slots,
            });
        }
        if offset >= slots {
            return Err(EngineError::OffsetOutOfRange {
                name: name.to_string(),
                offset,
                slots,
            });
        }
        let written = crate::value::normalize(&value, ty);
        self.store.write_at_index(size, index + offset, &written);
        self.inputs_changed = true;
        Ok(written)
    }

    /// Force a non-input symbol to a value and re-run its forward
    /// transitive subgraph.
    pub fn force_value(&mut self, name: &str, value: BigInt) -> Result<BigInt, EngineError> {
        self.check_stopped()?;
        let id = self.symbols.lookup(name)?;
        self.store.write(&self.symbols[id], &value);
        let written = self.store.read(&self.symbols[id]);
        let reached = self.symbols.children_of.reachable_from(&[id]);
        let indices = self.scheduler.assigners_for(&reached);
        debug!("force {} <= {}; re-running {} assigners", name, written, indices.len());
        self.run_assigners(&indices);
        Ok(written)
    }

    /// Write a register's canonical slot directly.
    pub fn poke_register(&mut self, name: &str, value: BigInt) -> Result<BigInt, EngineError> {
        self.check_stopped()?;
        let id = self.symbols.lookup(name)?;
        if self.symbols[id].kind != SymbolKind::Register {
            return Err(EngineError::BadTarget(name.to_string()));
        }
        self.store.write(&self.symbols[id], &value);
        Ok(self.store.read(&self.symbols[id]))
    }

    /// Attach a VCD logger writing to `path`.
    ///
    /// Names whose last segment starts with an underscore are traced only
    /// when `show_underscored` is set. Attaching a logger leaves lean mode.
    pub fn make_vcd_logger(
        &mut self,
        path: impl AsRef<Path>,
        show_underscored: bool,
    ) -> Result<(), EngineError> {
        let file = File::create(path.as_ref())?;
        let logger = VcdLogger::new(
            BufWriter::new(file),
            &self.symbols,
            &self.store,
            &self.name,
            show_underscored,
        )?;
        self.store.add_plugin(Box::new(logger));
        self.scheduler.set_lean_mode(false);
        info!("vcd logger attached at {}", path.as_ref().display());
        Ok(())
    }

    /// Detach all value-change recorders.
    pub fn disable_vcd(&mut self) {
        self.store.clear_plugins();
    }

    /// Flush pending value changes to the recorder.
    pub fn write_vcd(&mut self) {
        self.store.flush_plugins();
    }

    /// Return the latched stop result, if any.
    pub fn last_stop_result(&self) -> Option<i64> {
        for &id in &self.stops {
            let latch = self.store.read(&self.symbols[id]);
            if !latch.is_zero() {
                return Some(latch.to_i64().unwrap_or(0) - 1);
            }
        }
        None
    }

    /// Check whether a stop condition is latched.
    pub fn stopped(&self) -> bool {
        self.last_stop_result().is_some()
    }

    /// Clear the stop latch so that cycling can resume.
    pub fn clear_stop(&mut self) {
        for i in 0..self.stops.len() {
            let id = self.stops[i];
            self.store.write(&self.symbols[id], &BigInt::zero());
        }
        info!("stop latch cleared");
    }

    /// Enable or disable per-assigner tracing.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
        if verbose {
            self.scheduler.set_lean_mode(false);
        }
    }

    /// Switch between lean execution and fat execution with tracing and
    /// value-change hooks.
    pub fn set_lean_mode(&mut self, lean: bool) {
        self.scheduler.set_lean_mode(lean);
        self.store.set_plugins_enabled(!lean);
        if lean {
            self.verbose = false;
        }
    }

    /// Check whether a name denotes a register.
    pub fn is_register(&self, name: &str) -> bool {
        self.symbols
            .get(name)
            .map(|id| self.symbols[id].kind == SymbolKind::Register)
            .unwrap_or(false)
    }

    /// Check whether a name denotes a top-level input port.
    pub fn is_input_port(&self, name: &str) -> bool {
        self.symbols
            .get(name)
            .map(|id| self.input_ports.contains(&id))
            .unwrap_or(false)
    }

    /// Check whether a name denotes a top-level output port.
    pub fn is_output_port(&self, name: &str) -> bool {
        self.symbols
            .get(name)
            .map(|id| self.output_ports.contains(&id))
            .unwrap_or(false)
    }

    /// Return the top-level input port names.
    pub fn get_input_port_names(&self) -> Vec<String> {
        self.input_ports
            .iter()
            .map(|&id| self.symbols[id].name.clone())
            .collect()
    }

    /// Return the top-level output port names.
    pub fn get_output_port_names(&self) -> Vec<String> {
        self.output_ports
            .iter()
            .map(|&id| self.symbols[id].name.clone())
            .collect()
    }

    /// Return every valid symbol name.
    pub fn valid_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.symbols.names()
    }

    /// Return the symbol table.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Return the data store.
    pub fn store(&self) -> &DataStore {
        &self.store
    }

    /// Return the counters of recorded evaluation events.
    pub fn eval_events(&self) -> EvalEvents {
        self.events
    }

    /// Return the number of cycles run so far.
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Render the expression tree behind each named symbol with its current
    /// operand values.
    pub fn render_computation(&self, names: &[&str]) -> Result<String, EngineError> {
        let mut out = String::new();
        for name in names {
            let id = self.symbols.lookup(name)?;
            let sym = &self.symbols[id];
            let body = match self.scheduler.producing(id).map(|a| &a.kind) {
                Some(AssignKind::Expr { expr, .. }) => expr.render(&self.symbols, &self.store),
                Some(AssignKind::Commit { stage, .. }) => {
                    let stage = &self.symbols[*stage];
                    format!("commit({} <= {})", stage.name, self.store.read(stage))
                }
                Some(AssignKind::MemWrite { addr, data, .. }) => format!(
                    "write(addr: {}, data: {})",
                    addr.render(&self.symbols, &self.store),
                    data.render(&self.symbols, &self.store)
                ),
                Some(AssignKind::Stop { condition, .. }) => {
                    format!("stop({})", condition.render(&self.symbols, &self.store))
                }
                Some(AssignKind::Print { condition, .. }) => {
                    format!("print({})", condition.render(&self.symbols, &self.store))
                }
                None => "input".to_string(),
            };
            out.push_str(&format!(
                "{} <= {} : {}\n",
                sym.name,
                self.store.read(sym),
                body
            ));
        }
        Ok(out)
    }

    /// Render the current value of every user-visible symbol.
    pub fn state_string(&self) -> String {
        self.symbols
            .iter()
            .filter(|sym| !sym.name.contains('/'))
            .map(|sym| format!("{} = {}", sym.name, self.store.read(sym)))
            .join("\n")
    }

    /// Return the set of symbols transitively driven by a name.
    pub fn dependents_of(&self, name: &str) -> Result<HashSet<SymbolId>, EngineError> {
        let id = self.symbols.lookup(name)?;
        Ok(self.symbols.children_of.reachable_from(&[id]))
    }
}
