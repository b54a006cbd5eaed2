// Copyright (c) 2017-2021 Fabian Schuiki

//! Compiled assigners.
//!
//! Every statement of the lowered circuit compiles into an [`Assigner`]: an
//! immutable record holding one output symbol and a compiled expression tree
//! whose leaves are operand slots and constants. Evaluation is a match on the
//! operation tag; each node normalizes its result into the canonical range of
//! its type before handing it up.

use crate::blackbox::BlackBoxRef;
use crate::ir::PrimOp;
use crate::store::DataStore;
use crate::symbols::{SymbolId, SymbolTable};
use crate::ty::Type;
use crate::value::{mask, normalize, random_field, to_field};
use num::{traits::*, BigInt};
use rand::rngs::StdRng;

/// Counters for recorded-but-non-fatal evaluation events.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalEvents {
    /// Divisions and remainders with a zero divisor.
    pub div_by_zero: usize,
    /// Memory accesses with an out-of-range address.
    pub out_of_range: usize,
}

/// Everything an assigner needs to evaluate: the symbol table for operand
/// metadata, the data store for slot values, and the engine-local knobs.
pub struct EvalContext<'a> {
    /// The symbol table of the engine.
    pub symbols: &'a SymbolTable,
    /// The value store of the engine.
    pub store: &'a mut DataStore,
    /// The source of randomness for invalid signals.
    pub rng: &'a mut StdRng,
    /// Event counters.
    pub events: &'a mut EvalEvents,
    /// Whether invalid `validif` values read as random.
    pub valid_if_is_random: bool,
    /// Whether per-assigner tracing is on.
    pub verbose: bool,
}

/// A compiled expression node with its result type.
#[derive(Clone)]
pub struct Expr {
    /// The result type; evaluation normalizes into it.
    pub ty: Type,
    /// The operation at this node.
    pub kind: ExprKind,
}

/// The operation of a compiled expression node.
#[derive(Clone)]
pub enum ExprKind {
    /// A constant, already normalized.
    Const(BigInt),
    /// A read of an operand slot at offset 0.
    Read(SymbolId),
    /// An indexed read of a memory arena.
    ReadMem {
        /// The memory symbol.
        mem: SymbolId,
        /// The address expression.
        addr: Box<Expr>,
    },
    /// A primitive operation.
    Prim {
        /// The operation tag.
        op: PrimOp,
        /// The operand expressions.
        args: Vec<Expr>,
        /// Constant parameters.
        params: Vec<u64>,
    },
    /// A two-way multiplexor; only the selected side is evaluated.
    Mux {
        /// The select expression.
        sel: Box<Expr>,
        /// The non-zero side.
        tval: Box<Expr>,
        /// The zero side.
        fval: Box<Expr>,
    },
    /// A validity-gated value.
    ValidIf {
        /// The validity condition.
        cond: Box<Expr>,
        /// The gated value.
        value: Box<Expr>,
    },
    /// A black box output pin.
    BlackBox {
        /// The black box instance.
        instance: BlackBoxRef,
        /// The output pin name.
        output: String,
        /// The input pins the output depends on, in declaration order.
        inputs: Vec<SymbolId>,
    },
}

impl Expr {
    /// Create a constant expression, normalizing the value.
    pub fn constant(value: &BigInt, ty: Type) -> Expr {
        Expr {
            ty,
            kind: ExprKind::Const(normalize(value, ty)),
        }
    }

    /// Create an operand read.
    pub fn read(symbol: SymbolId, ty: Type) -> Expr {
        Expr {
            ty,
            kind: ExprKind::Read(symbol),
        }
    }

    /// Evaluate the expression against the current buffer.
    pub fn eval(&self, ctx: &mut EvalContext) -> BigInt {
        match &self.kind {
            ExprKind::Const(value) => value.clone(),
            ExprKind::Read(id) => ctx.store.read(&ctx.symbols[*id]),
            ExprKind::ReadMem { mem, addr } => {
                let addr = addr.eval(ctx);
                let (size, index, slots) = {
                    let sym = &ctx.symbols[*mem];
                    (sym.size, sym.index, sym.slots)
                };
                match addr.to_usize() {
                    Some(i) if i < slots => ctx.store.read_at_index(size, index + i),
                    _ => {
                        ctx.events.out_of_range += 1;
                        warn!(
                            "read of `{}` at out-of-range address {}",
                            ctx.symbols[*mem].name, addr
                        );
                        BigInt::zero()
                    }
                }
            }
            ExprKind::Prim { op, args, params } => self.eval_prim(*op, args, params, ctx),
            ExprKind::Mux { sel, tval, fval } => {
                let chosen = if !sel.eval(ctx).is_zero() { tval } else { fval };
                normalize(&chosen.eval(ctx), self.ty)
            }
            ExprKind::ValidIf { cond, value } => {
                let valid = !cond.eval(ctx).is_zero();
                if valid || !ctx.valid_if_is_random {
                    normalize(&value.eval(ctx), self.ty)
                } else {
                    normalize(&random_field(ctx.rng, self.ty.width()), self.ty)
                }
            }
            ExprKind::BlackBox {
                instance,
                output,
                inputs,
            } => {
                let values: Vec<BigInt> = inputs
                    .iter()
                    .map(|&id| ctx.store.read(&ctx.symbols[id]))
                    .collect();
                let result = instance
                    .lock()
                    .unwrap()
                    .get_output(&values, &self.ty, output);
                normalize(&result, self.ty)
            }
        }
    }

    fn eval_prim(&self, op: PrimOp, args: &[Expr], params: &[u64], ctx: &mut EvalContext) -> BigInt {
        use PrimOp::*;
        let raw = match op {
            Add => args[0].eval(ctx) + args[1].eval(ctx),
            Sub => args[0].eval(ctx) - args[1].eval(ctx),
            Mul => args[0].eval(ctx) * args[1].eval(ctx),
            Div => {
                let lhs = args[0].eval(ctx);
                let rhs = args[1].eval(ctx);
                if rhs.is_zero() {
                    ctx.events.div_by_zero += 1;
                    warn!("division by zero; result clamped to zero");
                    BigInt::zero()
                } else {
                    lhs / rhs
                }
            }
            Rem => {
                let lhs = args[0].eval(ctx);
                let rhs = args[1].eval(ctx);
                if rhs.is_zero() {
                    ctx.events.div_by_zero += 1;
                    warn!("remainder by zero; result clamped to zero");
                    BigInt::zero()
                } else {
                    lhs % rhs
                }
            }
            Lt => BigInt::from((args[0].eval(ctx) < args[1].eval(ctx)) as u8),
            Leq => BigInt::from((args[0].eval(ctx) <= args[1].eval(ctx)) as u8),
            Gt => BigInt::from((args[0].eval(ctx) > args[1].eval(ctx)) as u8),
            Geq => BigInt::from((args[0].eval(ctx) >= args[1].eval(ctx)) as u8),
            Eq => BigInt::from((args[0].eval(ctx) == args[1].eval(ctx)) as u8),
            Neq => BigInt::from((args[0].eval(ctx) != args[1].eval(ctx)) as u8),
            And => {
                to_field(&args[0].eval(ctx), args[0].ty.width())
                    & to_field(&args[1].eval(ctx), args[1].ty.width())
            }
            Or => {
                to_field(&args[0].eval(ctx), args[0].ty.width())
                    | to_field(&args[1].eval(ctx), args[1].ty.width())
            }
            Xor => {
                to_field(&args[0].eval(ctx), args[0].ty.width())
                    ^ to_field(&args[1].eval(ctx), args[1].ty.width())
            }
            Not => to_field(&args[0].eval(ctx), args[0].ty.width()) ^ mask(args[0].ty.width()),
            Shl => args[0].eval(ctx) << params[0] as usize,
            Shr => args[0].eval(ctx) >> params[0] as usize,
            Dshl => {
                let amount = shift_amount(&args[1].eval(ctx), self.ty.width());
                args[0].eval(ctx) << amount
            }
            Dshr => {
                let amount = shift_amount(&args[1].eval(ctx), args[0].ty.width());
                args[0].eval(ctx) >> amount
            }
            Cat => {
                let low_width = args[1].ty.width();
                (to_field(&args[0].eval(ctx), args[0].ty.width()) << low_width)
                    | to_field(&args[1].eval(ctx), low_width)
            }
            Bits => {
                let lo = params[1] as usize;
                to_field(&args[0].eval(ctx), args[0].ty.width()) >> lo
            }
            Head => {
                let n = params[0] as usize;
                let width = args[0].ty.width();
                to_field(&args[0].eval(ctx), width) >> (width - n)
            }
            Tail | AsUInt | AsSInt | AsClock => {
                to_field(&args[0].eval(ctx), args[0].ty.width())
            }
        };
        normalize(&raw, self.ty)
    }

    /// Collect the symbols this expression reads.
    pub fn collect_operands(&self, out: &mut Vec<SymbolId>) {
        match &self.kind {
            ExprKind::Const(_) => {}
            ExprKind::Read(id) => out.push(*id),
            ExprKind::ReadMem { mem, addr } => {
                out.push(*mem);
                addr.collect_operands(out);
            }
            ExprKind::Prim { args, .. } => {
                for arg in args {
                    arg.collect_operands(out);
                }
            }
            ExprKind::Mux { sel, tval, fval } => {
                sel.collect_operands(out);
                tval.collect_operands(out);
                fval.collect_operands(out);
            }
            ExprKind::ValidIf { cond, value } => {
                cond.collect_operands(out);
                value.collect_operands(out);
            }
            ExprKind::BlackBox { inputs, .. } => out.extend(inputs.iter().copied()),
        }
    }

    /// Render the expression tree with the current operand values.
    pub fn render(&self, symbols: &SymbolTable, store: &DataStore) -> String {
        match &self.kind {
            ExprKind::Const(value) => format!("{}", value),
            ExprKind::Read(id) => {
                let sym = &symbols[*id];
                format!("{} <= {}", sym.name, store.read(sym))
            }
            ExprKind::ReadMem { mem, addr } => {
                format!("{}[{}]", symbols[*mem].name, addr.render(symbols, store))
            }
            ExprKind::Prim { op, args, params } => {
                let mut parts: Vec<String> =
                    args.iter().map(|a| a.render(symbols, store)).collect();
                parts.extend(params.iter().map(|p| p.to_string()));
                format!("{}({})", op, parts.join(", "))
            }
            ExprKind::Mux { sel, tval, fval } => format!(
                "mux({}, {}, {})",
                sel.render(symbols, store),
                tval.render(symbols, store),
                fval.render(symbols, store)
            ),
            ExprKind::ValidIf { cond, value } => format!(
                "validif({}, {})",
                cond.render(symbols, store),
                value.render(symbols, store)
            ),
            ExprKind::BlackBox { output, inputs, .. } => {
                let parts: Vec<String> = inputs
                    .iter()
                    .map(|&id| {
                        let sym = &symbols[id];
                        format!("{} <= {}", sym.name, store.read(sym))
                    })
                    .collect();
                format!("blackbox.{}({})", output, parts.join(", "))
            }
        }
    }
}

fn shift_amount(value: &BigInt, bound: usize) -> usize {
    value.to_usize().map(|v| v.min(bound)).unwrap_or(bound)
}

/// A compiled unit writing one symbol, immutable after compilation.
pub struct Assigner {
    /// The output symbol.
    pub symbol: SymbolId,
    /// The body of the assigner.
    pub kind: AssignKind,
}

/// The body of an assigner.
pub enum AssignKind {
    /// A combinational expression write, optionally notifying a black box
    /// whose input pin this symbol is.
    Expr {
        /// The compiled expression.
        expr: Expr,
        /// The black box and pin to notify after the write.
        notify: Option<(BlackBoxRef, String)>,
    },
    /// A register commit, copying the staged next-state into the canonical
    /// slot on a rising clock edge.
    Commit {
        /// The `<r>/prev` stage symbol.
        stage: SymbolId,
        /// The clock whose bucket runs this commit.
        clock: SymbolId,
    },
    /// A memory write gated by an enable, run on a rising clock edge.
    MemWrite {
        /// The clock whose bucket runs this write.
        clock: SymbolId,
        /// The address expression.
        addr: Expr,
        /// The data expression.
        data: Expr,
        /// The enable expression.
        enable: Expr,
    },
    /// A stop latch, run on a rising clock edge.
    Stop {
        /// The clock whose bucket runs this stop.
        clock: SymbolId,
        /// The stop condition.
        condition: Expr,
        /// The result code; the latch holds `code + 1`.
        code: i64,
    },
    /// A print, run on a rising clock edge.
    Print {
        /// The clock whose bucket runs this print.
        clock: SymbolId,
        /// The enable condition.
        condition: Expr,
        /// The format string.
        format: String,
        /// The argument expressions.
        args: Vec<Expr>,
    },
}

impl Assigner {
    /// Execute the assigner against the current buffer.
    pub fn execute(&self, ctx: &mut EvalContext) {
        match &self.kind {
            AssignKind::Expr { expr, notify } => {
                let value = expr.eval(ctx);
                if ctx.verbose {
                    trace!("{} <= {}", ctx.symbols[self.symbol].name, value);
                }
                ctx.store.write(&ctx.symbols[self.symbol], &value);
                if let Some((instance, pin)) = notify {
                    instance.lock().unwrap().input_changed(pin, &value);
                }
            }
            AssignKind::Commit { stage, .. } => {
                let value = ctx.store.read(&ctx.symbols[*stage]);
                if ctx.verbose {
                    trace!("{} <= {} (commit)", ctx.symbols[self.symbol].name, value);
                }
                ctx.store.write(&ctx.symbols[self.symbol], &value);
            }
            AssignKind::MemWrite {
                addr, data, enable, ..
            } => {
                if enable.eval(ctx).is_zero() {
                    return;
                }
                let addr = addr.eval(ctx);
                let (size, index, slots, ty) = {
                    let sym = &ctx.symbols[self.symbol];
                    (sym.size, sym.index, sym.slots, sym.ty)
                };
                match addr.to_usize() {
                    Some(i) if i < slots => {
                        let value = normalize(&data.eval(ctx), ty);
                        if ctx.verbose {
                            trace!(
                                "{}[{}] <= {}",
                                ctx.symbols[self.symbol].name,
                                i,
                                value
                            );
                        }
                        ctx.store.write_at_index(size, index + i, &value);
                    }
                    _ => {
                        ctx.events.out_of_range += 1;
                        warn!(
                            "write to `{}` at out-of-range address {} dropped",
                            ctx.symbols[self.symbol].name, addr
                        );
                    }
                }
            }
            AssignKind::Stop {
                condition, code, ..
            } => {
                if !condition.eval(ctx).is_zero() {
                    let latched = !ctx.store.read(&ctx.symbols[self.symbol]).is_zero();
                    if !latched {
                        info!(
                            "stop `{}` fired with result {}",
                            ctx.symbols[self.symbol].name, code
                        );
                        ctx.store
                            .write(&ctx.symbols[self.symbol], &BigInt::from(code + 1));
                    }
                }
            }
            AssignKind::Print {
                condition,
                format,
                args,
                ..
            } => {
                if !condition.eval(ctx).is_zero() {
                    let values: Vec<BigInt> = args.iter().map(|a| a.eval(ctx)).collect();
                    println!("{}", render_format(format, &values));
                }
            }
        }
    }

    /// Return the symbols this assigner reads. Triggered assigners also list
    /// their clock, so forward reachability flows through clock gating.
    pub fn operands(&self) -> Vec<SymbolId> {
        let mut out = Vec::new();
        match &self.kind {
            AssignKind::Expr { expr, .. } => expr.collect_operands(&mut out),
            AssignKind::Commit { stage, clock } => {
                out.push(*stage);
                out.push(*clock);
            }
            AssignKind::MemWrite {
                clock,
                addr,
                data,
                enable,
            } => {
                out.push(*clock);
                addr.collect_operands(&mut out);
                data.collect_operands(&mut out);
                enable.collect_operands(&mut out);
            }
            AssignKind::Stop {
                clock, condition, ..
            } => {
                out.push(*clock);
                condition.collect_operands(&mut out);
            }
            AssignKind::Print {
                clock,
                condition,
                args,
                ..
            } => {
                out.push(*clock);
                condition.collect_operands(&mut out);
                for arg in args {
                    arg.collect_operands(&mut out);
                }
            }
        }
        out
    }

    /// Check whether this assigner belongs to the combinational partition.
    pub fn is_combinational(&self) -> bool {
        matches!(self.kind, AssignKind::Expr { .. })
    }

    /// Return the clock bucket this assigner belongs to, if any.
    pub fn trigger_clock(&self) -> Option<SymbolId> {
        match &self.kind {
            AssignKind::Expr { .. } => None,
            AssignKind::Commit { clock, .. }
            | AssignKind::MemWrite { clock, .. }
            | AssignKind::Stop { clock, .. }
            | AssignKind::Print { clock, .. } => Some(*clock),
        }
    }
}

fn render_format(format: &str, values: &[BigInt]) -> String {
    let mut out = String::new();
    let mut values = values.iter();
    let mut parts = format.split("%d");
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    for part in parts {
        match values.next() {
            Some(value) => out.push_str(&value.to_string()),
            None => out.push_str("%d"),
        }
        out.push_str(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{SymbolKind, SymbolTable};
    use crate::ty::{sint_ty, uint_ty};
    use rand::SeedableRng;

    fn fixture() -> (SymbolTable, DataStore, StdRng, EvalEvents) {
        let mut symbols = SymbolTable::new();
        symbols
            .add_symbol("a", sint_ty(8), SymbolKind::Wire, 1)
            .unwrap();
        symbols
            .add_symbol("b", sint_ty(8), SymbolKind::Wire, 1)
            .unwrap();
        let mut store = DataStore::new(1);
        symbols.allocate_data(&mut store);
        (symbols, store, StdRng::seed_from_u64(0), EvalEvents::default())
    }

    fn eval(expr: &Expr, symbols: &SymbolTable, store: &mut DataStore) -> BigInt {
        let mut rng = StdRng::seed_from_u64(0);
        let mut events = EvalEvents::default();
        let mut ctx = EvalContext {
            symbols,
            store,
            rng: &mut rng,
            events: &mut events,
            valid_if_is_random: false,
            verbose: false,
        };
        expr.eval(&mut ctx)
    }

    #[test]
    fn signed_addition() {
        let (symbols, mut store, _, _) = fixture();
        let a = symbols.get("a").unwrap();
        let b = symbols.get("b").unwrap();
        store.write(&symbols[a], &BigInt::from(-50));
        store.write(&symbols[b], &BigInt::from(-80));
        let expr = Expr {
            ty: sint_ty(9),
            kind: ExprKind::Prim {
                op: PrimOp::Add,
                args: vec![Expr::read(a, sint_ty(8)), Expr::read(b, sint_ty(8))],
                params: vec![],
            },
        };
        assert_eq!(eval(&expr, &symbols, &mut store), BigInt::from(-130));
    }

    #[test]
    fn division_by_zero_clamps() {
        let (symbols, mut store, mut rng, mut events) = fixture();
        let a = symbols.get("a").unwrap();
        let b = symbols.get("b").unwrap();
        store.write(&symbols[a], &BigInt::from(42));
        let expr = Expr {
            ty: sint_ty(9),
            kind: ExprKind::Prim {
                op: PrimOp::Div,
                args: vec![Expr::read(a, sint_ty(8)), Expr::read(b, sint_ty(8))],
                params: vec![],
            },
        };
        let mut ctx = EvalContext {
            symbols: &symbols,
            store: &mut store,
            rng: &mut rng,
            events: &mut events,
            valid_if_is_random: false,
            verbose: false,
        };
        assert_eq!(expr.eval(&mut ctx), BigInt::zero());
        assert_eq!(events.div_by_zero, 1);
    }

    #[test]
    fn bit_fields() {
        let (symbols, mut store, _, _) = fixture();
        let a = symbols.get("a").unwrap();
        store.write(&symbols[a], &BigInt::from(-1)); // 0xff
        let bits = Expr {
            ty: uint_ty(4),
            kind: ExprKind::Prim {
                op: PrimOp::Bits,
                args: vec![Expr::read(a, sint_ty(8))],
                params: vec![7, 4],
            },
        };
        assert_eq!(eval(&bits, &symbols, &mut store), BigInt::from(15));
        let cat = Expr {
            ty: uint_ty(16),
            kind: ExprKind::Prim {
                op: PrimOp::Cat,
                args: vec![Expr::read(a, sint_ty(8)), Expr::read(a, sint_ty(8))],
                params: vec![],
            },
        };
        assert_eq!(eval(&cat, &symbols, &mut store), BigInt::from(0xffffu32));
    }

    #[test]
    fn mux_selects_lazily() {
        let (symbols, mut store, _, _) = fixture();
        let a = symbols.get("a").unwrap();
        store.write(&symbols[a], &BigInt::from(3));
        let expr = Expr {
            ty: uint_ty(8),
            kind: ExprKind::Mux {
                sel: Box::new(Expr::constant(&BigInt::one(), uint_ty(1))),
                tval: Box::new(Expr::read(a, sint_ty(8))),
                fval: Box::new(Expr::constant(&BigInt::from(9), uint_ty(8))),
            },
        };
        assert_eq!(eval(&expr, &symbols, &mut store), BigInt::from(3));
    }

    #[test]
    fn format_rendering() {
        let values = vec![BigInt::from(3), BigInt::from(7)];
        assert_eq!(render_format("a=%d b=%d\n", &values), "a=3 b=7\n");
        assert_eq!(render_format("no args", &values), "no args");
    }
}
