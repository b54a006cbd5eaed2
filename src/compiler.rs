// Copyright (c) 2017-2021 Fabian Schuiki

//! Lowering of circuit statements into assigners.
//!
//! The compiler walks the already-lowered circuit twice. The declaration pass
//! flattens the instance hierarchy by prefixing names with the dotted
//! instance path and allocates a symbol for every port, node, register (plus
//! its `/prev` stage), memory, black-box pin, clock shadow, and stop latch.
//! The compile pass then emits one assigner per statement and registers the
//! dependency edges the scheduler sorts over.
//!
//! Names must be declared before they are referenced, which holds for any
//! correctly lowered circuit.

use crate::assign::{AssignKind, Assigner, Expr, ExprKind};
use crate::blackbox::{BlackBoxRef, BlackBoxRegistry};
use crate::error::EngineError;
use crate::ir::{self, Circuit, Direction, Expression, Module, Stmt};
use crate::symbols::{SymbolId, SymbolKind, SymbolTable};
use crate::ty::Type;
use crate::value;
use std::collections::HashMap;

/// Everything the compiler hands to the engine.
pub struct Compilation {
    /// The flattened symbol table with dependency edges.
    pub symbols: SymbolTable,
    /// The combinational assigners, unsorted.
    pub combinational: Vec<Assigner>,
    /// The clock-triggered assigners, unbucketed.
    pub triggered: Vec<Assigner>,
    /// Black boxes subscribed to clock transitions, with their pin names.
    pub clock_subscribers: Vec<(SymbolId, String, BlackBoxRef)>,
    /// The stop latch symbols.
    pub stops: Vec<SymbolId>,
    /// The top-level input ports, clocks included.
    pub input_ports: Vec<SymbolId>,
    /// The top-level output ports.
    pub output_ports: Vec<SymbolId>,
}

struct RegInfo<'a> {
    stage: SymbolId,
    reset: Option<&'a ir::Reset>,
    prefix: String,
    driven: bool,
}

/// The statement-to-assigner compiler.
pub struct ExpressionCompiler<'a> {
    circuit: &'a Circuit,
    modules: HashMap<&'a str, &'a Module>,
    registry: BlackBoxRegistry,
    symbols: SymbolTable,
    combinational: Vec<Assigner>,
    triggered: Vec<Assigner>,
    clock_subscribers: Vec<(SymbolId, String, BlackBoxRef)>,
    stops: Vec<SymbolId>,
    input_ports: Vec<SymbolId>,
    output_ports: Vec<SymbolId>,
    bb_outputs: HashMap<SymbolId, (BlackBoxRef, String)>,
    bb_inputs: HashMap<SymbolId, (BlackBoxRef, String)>,
    regs: HashMap<SymbolId, RegInfo<'a>>,
    print_count: usize,
}

/// Compile a circuit into symbols and assigners.
pub fn compile(
    circuit: &Circuit,
    registry: BlackBoxRegistry,
) -> Result<Compilation, EngineError> {
    let top = circuit
        .find_module(&circuit.name)
        .ok_or_else(|| EngineError::UnknownModule(circuit.name.clone()))?;
    let mut compiler = ExpressionCompiler {
        circuit,
        modules: circuit.modules.iter().map(|m| (m.name.as_str(), m)).collect(),
        registry,
        symbols: SymbolTable::new(),
        combinational: Vec::new(),
        triggered: Vec::new(),
        clock_subscribers: Vec::new(),
        stops: Vec::new(),
        input_ports: Vec::new(),
        output_ports: Vec::new(),
        bb_outputs: HashMap::new(),
        bb_inputs: HashMap::new(),
        regs: HashMap::new(),
        print_count: 0,
    };
    compiler.declare_module("", top, true)?;
    compiler.print_count = 0;
    compiler.compile_module("", top)?;
    compiler.compile_driverless_registers()?;
    info!(
        "compiled `{}`: {} symbols, {} combinational, {} triggered assigners",
        circuit.name,
        compiler.symbols.len(),
        compiler.combinational.len(),
        compiler.triggered.len()
    );
    Ok(Compilation {
        symbols: compiler.symbols,
        combinational: compiler.combinational,
        triggered: compiler.triggered,
        clock_subscribers: compiler.clock_subscribers,
        stops: compiler.stops,
        input_ports: compiler.input_ports,
        output_ports: compiler.output_ports,
    })
}

impl<'a> ExpressionCompiler<'a> {
    fn resolve(&self, prefix: &str, name: &str) -> Result<SymbolId, EngineError> {
        self.symbols.lookup(&format!("{}{}", prefix, name))
    }

    fn add_shadow(&mut self, id: SymbolId) -> Result<(), EngineError> {
        let name = format!("{}/prev", self.symbols[id].name);
        let ty = self.symbols[id].ty;
        let prev = self
            .symbols
            .add_symbol(name, ty, SymbolKind::ClockPrev, 1)?;
        self.symbols[id].prev = Some(prev);
        Ok(())
    }

    fn expression_type(&self, prefix: &str, e: &Expression) -> Result<Type, EngineError> {
        match e {
            Expression::Ref(name) => Ok(self.symbols[self.resolve(prefix, name)?].ty),
            Expression::Lit(lit) => Ok(lit.ty),
            Expression::Prim { ty, .. }
            | Expression::Mux { ty, .. }
            | Expression::ValidIf { ty, .. } => Ok(*ty),
        }
    }

    /// The declaration pass over one module.
    fn declare_module(
        &mut self,
        prefix: &str,
        module: &'a Module,
        top: bool,
    ) -> Result<(), EngineError> {
        if let Some(defname) = &module.defname {
            return self.declare_black_box(prefix, module, defname, top);
        }
        for port in &module.ports {
            let name = format!("{}{}", prefix, port.name);
            let kind = if port.ty.is_clock() {
                SymbolKind::Clock
            } else if top && port.direction == Direction::Input {
                SymbolKind::InputPort
            } else if top {
                SymbolKind::OutputPort
            } else {
                SymbolKind::Wire
            };
            let id = self.symbols.add_symbol(name, port.ty, kind, 1)?;
            if port.ty.is_clock() {
                self.add_shadow(id)?;
            }
            if top {
                match port.direction {
                    Direction::Input => self.input_ports.push(id),
                    Direction::Output => self.output_ports.push(id),
                }
            }
        }
        for stmt in &module.body {
            match stmt {
                Stmt::Node { name, value } => {
                    let ty = self.expression_type(prefix, value)?;
                    let kind = if ty.is_clock() {
                        SymbolKind::Clock
                    } else if matches!(value, Expression::Lit(_)) {
                        SymbolKind::Literal
                    } else {
                        SymbolKind::Wire
                    };
                    let id = self
                        .symbols
                        .add_symbol(format!("{}{}", prefix, name), ty, kind, 1)?;
                    if ty.is_clock() {
                        self.add_shadow(id)?;
                    }
                }
                Stmt::Connect { .. } => {}
                Stmt::Reg { name, ty, .. } => {
                    let id = self.symbols.add_symbol(
                        format!("{}{}", prefix, name),
                        *ty,
                        SymbolKind::Register,
                        1,
                    )?;
                    let stage = self.symbols.add_symbol(
                        format!("{}{}/prev", prefix, name),
                        *ty,
                        SymbolKind::Wire,
                        1,
                    )?;
                    self.symbols[id].prev = Some(stage);
                }
                Stmt::Mem(mem) => {
                    self.symbols.add_symbol(
                        format!("{}{}", prefix, mem.name),
                        mem.ty,
                        SymbolKind::Memory,
                        mem.depth,
                    )?;
                    for port in &mem.read_ports {
                        self.symbols.add_symbol(
                            format!("{}{}.{}", prefix, mem.name, port.name),
                            mem.ty,
                            SymbolKind::Wire,
                            1,
                        )?;
                    }
                }
                Stmt::Inst { name, module } => {
                    let sub = self
                        .modules
                        .get(module.as_str())
                        .copied()
                        .ok_or_else(|| EngineError::UnknownModule(module.clone()))?;
                    self.declare_module(&format!("{}{}.", prefix, name), sub, false)?;
                }
                Stmt::Stop { name, .. } => {
                    let id = self.symbols.add_symbol(
                        format!("{}{}", prefix, name),
                        Type::UInt(63),
                        SymbolKind::Stop,
                        1,
                    )?;
                    self.stops.push(id);
                }
                Stmt::Print { .. } => {
                    self.symbols.add_symbol(
                        format!("{}print/{}", prefix, self.print_count),
                        Type::UInt(1),
                        SymbolKind::Wire,
                        1,
                    )?;
                    self.print_count += 1;
                }
            }
        }
        Ok(())
    }

    fn declare_black_box(
        &mut self,
        prefix: &str,
        module: &'a Module,
        defname: &str,
        top: bool,
    ) -> Result<(), EngineError> {
        let instance_name = if prefix.is_empty() {
            self.circuit.name.clone()
        } else {
            prefix.trim_end_matches('.').to_string()
        };
        let instance = self.registry.resolve(&instance_name, defname)?;
        for port in &module.ports {
            let name = format!("{}{}", prefix, port.name);
            match port.direction {
                Direction::Output => {
                    let id = self.symbols.add_symbol(
                        name,
                        port.ty,
                        SymbolKind::BlackBoxOutput,
                        1,
                    )?;
                    self.bb_outputs
                        .insert(id, (instance.clone(), port.name.clone()));
                    if top {
                        self.output_ports.push(id);
                    }
                }
                Direction::Input => {
                    let kind = if port.ty.is_clock() {
                        SymbolKind::Clock
                    } else if top {
                        SymbolKind::InputPort
                    } else {
                        SymbolKind::Wire
                    };
                    let id = self.symbols.add_symbol(name, port.ty, kind, 1)?;
                    if port.ty.is_clock() {
                        self.add_shadow(id)?;
                        self.clock_subscribers
                            .push((id, port.name.clone(), instance.clone()));
                    } else {
                        self.bb_inputs
                            .insert(id, (instance.clone(), port.name.clone()));
                    }
                    if top {
                        self.input_ports.push(id);
                    }
                }
            }
        }
        Ok(())
    }

    /// The compile pass over one module.
    fn compile_module(&mut self, prefix: &str, module: &'a Module) -> Result<(), EngineError> {
        if module.is_black_box() {
            return self.compile_black_box(prefix, module);
        }

        // Registers first, so connects targeting them find their stage and
        // reset information.
        for stmt in &module.body {
            if let Stmt::Reg {
                name,
                clock,
                reset,
                ..
            } = stmt
            {
                let id = self.resolve(prefix, name)?;
                let stage = self.symbols[id].prev.expect("register without stage");
                let clock_id = self.clock_symbol(prefix, clock)?;
                self.triggered.push(Assigner {
                    symbol: id,
                    kind: AssignKind::Commit {
                        stage,
                        clock: clock_id,
                    },
                });
                self.symbols.add_dependency(id, stage, false);
                self.symbols.add_dependency(id, clock_id, false);
                self.regs.insert(
                    id,
                    RegInfo {
                        stage,
                        reset: reset.as_ref(),
                        prefix: prefix.to_string(),
                        driven: false,
                    },
                );
            }
        }

        for stmt in &module.body {
            match stmt {
                Stmt::Node { name, value } => {
                    let id = self.resolve(prefix, name)?;
                    let expr = self.compile_expression(prefix, value)?;
                    self.push_combinational(id, expr, None);
                }
                Stmt::Connect { dest, source } => {
                    let id = self.resolve(prefix, dest)?;
                    let expr = self.compile_expression(prefix, source)?;
                    if self.symbols[id].kind == SymbolKind::Register {
                        let stage = self.regs[&id].stage;
                        let reset = self.regs[&id].reset;
                        // Reset expressions live in the register's own scope.
                        let scope = self.regs[&id].prefix.clone();
                        let expr = self.with_reset(&scope, self.symbols[id].ty, reset, expr)?;
                        self.push_combinational(stage, expr, None);
                        self.regs.get_mut(&id).expect("register info").driven = true;
                    } else {
                        let notify = self.bb_inputs.get(&id).cloned();
                        self.push_combinational(id, expr, notify);
                    }
                }
                Stmt::Reg { .. } => {}
                Stmt::Mem(mem) => {
                    let mem_id = self.resolve(prefix, &mem.name)?;
                    for port in &mem.read_ports {
                        let port_id = self
                            .symbols
                            .lookup(&format!("{}{}.{}", prefix, mem.name, port.name))?;
                        let addr = self.compile_expression(prefix, &port.addr)?;
                        let expr = Expr {
                            ty: mem.ty,
                            kind: ExprKind::ReadMem {
                                mem: mem_id,
                                addr: Box::new(addr),
                            },
                        };
                        self.push_combinational(port_id, expr, None);
                    }
                    for port in &mem.write_ports {
                        let clock_id = self.clock_symbol(prefix, &port.clock)?;
                        let assigner = Assigner {
                            symbol: mem_id,
                            kind: AssignKind::MemWrite {
                                clock: clock_id,
                                addr: self.compile_expression(prefix, &port.addr)?,
                                data: self.compile_expression(prefix, &port.data)?,
                                enable: self.compile_expression(prefix, &port.enable)?,
                            },
                        };
                        for operand in assigner.operands() {
                            self.symbols.add_dependency(mem_id, operand, false);
                        }
                        self.triggered.push(assigner);
                    }
                }
                Stmt::Inst { name, module } => {
                    let sub = self
                        .modules
                        .get(module.as_str())
                        .copied()
                        .ok_or_else(|| EngineError::UnknownModule(module.clone()))?;
                    self.compile_module(&format!("{}{}.", prefix, name), sub)?;
                }
                Stmt::Stop {
                    name,
                    clock,
                    condition,
                    code,
                } => {
                    let id = self.resolve(prefix, name)?;
                    let clock_id = self.clock_symbol(prefix, clock)?;
                    let assigner = Assigner {
                        symbol: id,
                        kind: AssignKind::Stop {
                            clock: clock_id,
                            condition: self.compile_expression(prefix, condition)?,
                            code: *code,
                        },
                    };
                    for operand in assigner.operands() {
                        self.symbols.add_dependency(id, operand, false);
                    }
                    self.triggered.push(assigner);
                }
                Stmt::Print {
                    clock,
                    condition,
                    format,
                    args,
                } => {
                    let id = self
                        .symbols
                        .lookup(&format!("{}print/{}", prefix, self.print_count))?;
                    self.print_count += 1;
                    let clock_id = self.clock_symbol(prefix, clock)?;
                    let assigner = Assigner {
                        symbol: id,
                        kind: AssignKind::Print {
                            clock: clock_id,
                            condition: self.compile_expression(prefix, condition)?,
                            format: format.clone(),
                            args: args
                                .iter()
                                .map(|a| self.compile_expression(prefix, a))
                                .collect::<Result<_, _>>()?,
                        },
                    };
                    for operand in assigner.operands() {
                        self.symbols.add_dependency(id, operand, false);
                    }
                    self.triggered.push(assigner);
                }
            }
        }
        Ok(())
    }

    fn compile_black_box(&mut self, prefix: &str, module: &'a Module) -> Result<(), EngineError> {
        for port in &module.ports {
            if port.direction != Direction::Output {
                continue;
            }
            let id = self.resolve(prefix, &port.name)?;
            let (instance, pin) = self.bb_outputs[&id].clone();
            let dep_names = instance.lock().unwrap().output_dependencies(&pin);
            let inputs = dep_names
                .iter()
                .map(|dep| self.resolve(prefix, dep))
                .collect::<Result<Vec<_>, _>>()?;
            let expr = Expr {
                ty: port.ty,
                kind: ExprKind::BlackBox {
                    instance,
                    output: pin,
                    inputs,
                },
            };
            self.push_combinational(id, expr, None);
        }
        Ok(())
    }

    /// Emit hold assigners for registers without a driving connect.
    fn compile_driverless_registers(&mut self) -> Result<(), EngineError> {
        let mut undriven: Vec<SymbolId> = self
            .regs
            .iter()
            .filter(|(_, info)| !info.driven)
            .map(|(&id, _)| id)
            .collect();
        undriven.sort_by(|&a, &b| self.symbols[a].name.cmp(&self.symbols[b].name));
        for id in undriven {
            let stage = self.regs[&id].stage;
            let reset = self.regs[&id].reset;
            let prefix = self.regs[&id].prefix.clone();
            let ty = self.symbols[id].ty;
            let hold = Expr::read(id, ty);
            let expr = self.with_reset(&prefix, ty, reset, hold)?;
            self.push_combinational(stage, expr, None);
        }
        Ok(())
    }

    fn with_reset(
        &mut self,
        prefix: &str,
        ty: Type,
        reset: Option<&'a ir::Reset>,
        next: Expr,
    ) -> Result<Expr, EngineError> {
        match reset {
            Some(reset) => Ok(Expr {
                ty,
                kind: ExprKind::Mux {
                    sel: Box::new(self.compile_expression(prefix, &reset.condition)?),
                    tval: Box::new(self.compile_expression(prefix, &reset.init)?),
                    fval: Box::new(next),
                },
            }),
            None => Ok(next),
        }
    }

    fn push_combinational(
        &mut self,
        symbol: SymbolId,
        expr: Expr,
        notify: Option<(BlackBoxRef, String)>,
    ) {
        let assigner = Assigner {
            symbol,
            kind: AssignKind::Expr { expr, notify },
        };
        for operand in assigner.operands() {
            self.symbols.add_dependency(symbol, operand, true);
        }
        self.combinational.push(assigner);
    }

    fn clock_symbol(&self, prefix: &str, e: &Expression) -> Result<SymbolId, EngineError> {
        match e {
            Expression::Ref(name) => {
                let id = self.resolve(prefix, name)?;
                if self.symbols[id].ty.is_clock() && self.symbols[id].prev.is_some() {
                    Ok(id)
                } else {
                    Err(EngineError::NotAClock(self.symbols[id].name.clone()))
                }
            }
            other => Err(EngineError::NotAClock(format!("{}", other))),
        }
    }

    fn compile_expression(&self, prefix: &str, e: &Expression) -> Result<Expr, EngineError> {
        match e {
            Expression::Ref(name) => {
                let id = self.resolve(prefix, name)?;
                Ok(Expr::read(id, self.symbols[id].ty))
            }
            Expression::Lit(lit) => {
                if !value::fits(&lit.value, lit.ty) {
                    return Err(EngineError::LiteralOverflow {
                        value: lit.value.clone(),
                        ty: lit.ty,
                    });
                }
                Ok(Expr::constant(&lit.value, lit.ty))
            }
            Expression::Prim {
                op,
                args,
                params,
                ty,
            } => Ok(Expr {
                ty: *ty,
                kind: ExprKind::Prim {
                    op: *op,
                    args: args
                        .iter()
                        .map(|a| self.compile_expression(prefix, a))
                        .collect::<Result<_, _>>()?,
                    params: params.clone(),
                },
            }),
            Expression::Mux {
                sel,
                tval,
                fval,
                ty,
            } => Ok(Expr {
                ty: *ty,
                kind: ExprKind::Mux {
                    sel: Box::new(self.compile_expression(prefix, sel)?),
                    tval: Box::new(self.compile_expression(prefix, tval)?),
                    fval: Box::new(self.compile_expression(prefix, fval)?),
                },
            }),
            Expression::ValidIf { cond, value, ty } => Ok(Expr {
                ty: *ty,
                kind: ExprKind::ValidIf {
                    cond: Box::new(self.compile_expression(prefix, cond)?),
                    value: Box::new(self.compile_expression(prefix, value)?),
                },
            }),
        }
    }
}
