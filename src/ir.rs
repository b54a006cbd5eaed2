// Copyright (c) 2017-2021 Fabian Schuiki

//! Representation of lowered LIR circuits.
//!
//! This module implements the abstract syntax the interpreter consumes: a
//! circuit of modules, each a list of ports and statements over primitive-op
//! expressions. The representation is the *lowered* subset of the language;
//! conditional blocks have already been expanded into muxes and all widths
//! are explicit. The `Display` implementations render the netlist text, which
//! is used by the `show_circuit_at_load` option and by diagnostics.

use crate::ty::Type;
use crate::util::write_implode;
use num::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A lowered circuit: a set of modules with a designated top module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Circuit {
    /// The name of the top module.
    pub name: String,
    /// The modules in the circuit.
    pub modules: Vec<Module>,
}

impl Circuit {
    /// Create a new circuit with the given top module name.
    pub fn new(name: impl Into<String>) -> Circuit {
        Circuit {
            name: name.into(),
            modules: Vec::new(),
        }
    }

    /// Add a module to the circuit.
    pub fn module(mut self, module: Module) -> Circuit {
        self.modules.push(module);
        self
    }

    /// Find a module by name.
    pub fn find_module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }
}

/// A module: ports plus a body of lowered statements.
///
/// A module with a `defname` is externally implemented; its body is empty and
/// its behavior is provided through the black box registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    /// The name of the module.
    pub name: String,
    /// The ports of the module.
    pub ports: Vec<Port>,
    /// The statements in the module body.
    pub body: Vec<Stmt>,
    /// The external definition name, for black boxes.
    pub defname: Option<String>,
}

impl Module {
    /// Create a new module.
    pub fn new(name: impl Into<String>) -> Module {
        Module {
            name: name.into(),
            ports: Vec::new(),
            body: Vec::new(),
            defname: None,
        }
    }

    /// Create a new externally implemented module.
    pub fn black_box(name: impl Into<String>, defname: impl Into<String>) -> Module {
        Module {
            name: name.into(),
            ports: Vec::new(),
            body: Vec::new(),
            defname: Some(defname.into()),
        }
    }

    /// Add a port to the module.
    pub fn port(mut self, name: impl Into<String>, direction: Direction, ty: Type) -> Module {
        self.ports.push(Port {
            name: name.into(),
            direction,
            ty,
        });
        self
    }

    /// Add a statement to the module body.
    pub fn stmt(mut self, stmt: Stmt) -> Module {
        self.body.push(stmt);
        self
    }

    /// Check whether this module is externally implemented.
    pub fn is_black_box(&self) -> bool {
        self.defname.is_some()
    }
}

/// A module port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    /// The name of the port.
    pub name: String,
    /// The direction of the port.
    pub direction: Direction,
    /// The type of the port.
    pub ty: Type,
}

/// A port direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// An input port.
    Input,
    /// An output port.
    Output,
}

/// A lowered statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    /// A named combinational value, `node name = expr`.
    Node {
        /// The name of the node.
        name: String,
        /// The expression producing the node value.
        value: Expression,
    },
    /// A connection, `dest <= source`.
    Connect {
        /// The name of the driven wire, port, or register.
        dest: String,
        /// The driving expression.
        source: Expression,
    },
    /// A register declaration.
    Reg {
        /// The name of the register.
        name: String,
        /// The type of the register.
        ty: Type,
        /// The clock driving the register.
        clock: Expression,
        /// The optional reset condition and init value.
        reset: Option<Reset>,
    },
    /// A memory declaration with its access ports.
    Mem(Memory),
    /// A module instantiation, `inst name of module`.
    Inst {
        /// The instance name.
        name: String,
        /// The name of the instantiated module.
        module: String,
    },
    /// A stop statement latching a result code when its condition holds on a
    /// rising clock edge.
    Stop {
        /// The name of the stop, used for the latch symbol.
        name: String,
        /// The clock gating the stop.
        clock: Expression,
        /// The stop condition.
        condition: Expression,
        /// The result code to latch.
        code: i64,
    },
    /// A print statement rendered when its condition holds on a rising clock
    /// edge.
    Print {
        /// The clock gating the print.
        clock: Expression,
        /// The enable condition.
        condition: Expression,
        /// The format string; `%d` placeholders consume arguments in order.
        format: String,
        /// The argument expressions.
        args: Vec<Expression>,
    },
}

/// The reset specification of a register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reset {
    /// The reset condition.
    pub condition: Expression,
    /// The value the register assumes while the condition holds.
    pub init: Expression,
}

/// A memory declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// The name of the memory.
    pub name: String,
    /// The element type.
    pub ty: Type,
    /// The number of elements.
    pub depth: usize,
    /// The combinational read ports.
    pub read_ports: Vec<ReadPort>,
    /// The clock-triggered write ports.
    pub write_ports: Vec<WritePort>,
}

/// A combinational memory read port.
///
/// The port's data output is visible as `<mem>.<port>` in the flattened
/// namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadPort {
    /// The name of the port.
    pub name: String,
    /// The read address.
    pub addr: Expression,
}

/// A clock-triggered memory write port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WritePort {
    /// The name of the port.
    pub name: String,
    /// The clock gating the write.
    pub clock: Expression,
    /// The write address.
    pub addr: Expression,
    /// The data to write.
    pub data: Expression,
    /// The write enable.
    pub enable: Expression,
}

/// A lowered expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expression {
    /// A reference to a named symbol.
    Ref(String),
    /// A literal constant.
    Lit(Literal),
    /// A primitive operation. The result type is explicit; lowering has
    /// already computed all widths.
    Prim {
        /// The operation.
        op: PrimOp,
        /// The operand expressions.
        args: Vec<Expression>,
        /// Constant parameters (shift amounts, bit indices).
        params: Vec<u64>,
        /// The result type.
        ty: Type,
    },
    /// A two-way multiplexor.
    Mux {
        /// The select signal.
        sel: Box<Expression>,
        /// The value when the select is non-zero.
        tval: Box<Expression>,
        /// The value when the select is zero.
        fval: Box<Expression>,
        /// The result type.
        ty: Type,
    },
    /// A validity-gated value.
    ValidIf {
        /// The validity condition.
        cond: Box<Expression>,
        /// The gated value.
        value: Box<Expression>,
        /// The result type.
        ty: Type,
    },
}

impl Expression {
    /// Create a reference to a named symbol.
    pub fn var(name: impl Into<String>) -> Expression {
        Expression::Ref(name.into())
    }

    /// Create an unsigned literal.
    pub fn uint(width: usize, value: impl Into<BigInt>) -> Expression {
        Expression::Lit(Literal {
            value: value.into(),
            ty: Type::UInt(width),
        })
    }

    /// Create a signed literal.
    pub fn sint(width: usize, value: impl Into<BigInt>) -> Expression {
        Expression::Lit(Literal {
            value: value.into(),
            ty: Type::SInt(width),
        })
    }

    /// Create a primitive operation.
    pub fn prim(op: PrimOp, args: Vec<Expression>, params: Vec<u64>, ty: Type) -> Expression {
        Expression::Prim {
            op,
            args,
            params,
            ty,
        }
    }

    /// Create a multiplexor.
    pub fn mux(sel: Expression, tval: Expression, fval: Expression, ty: Type) -> Expression {
        Expression::Mux {
            sel: Box::new(sel),
            tval: Box::new(tval),
            fval: Box::new(fval),
            ty,
        }
    }

    /// Create a validity-gated value.
    pub fn valid_if(cond: Expression, value: Expression, ty: Type) -> Expression {
        Expression::ValidIf {
            cond: Box::new(cond),
            value: Box::new(value),
            ty,
        }
    }
}

/// A literal constant with an explicit type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Literal {
    /// The value of the literal.
    pub value: BigInt,
    /// The type of the literal.
    pub ty: Type,
}

/// A primitive operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division; a zero divisor yields zero and is recorded.
    Div,
    /// Remainder; a zero divisor yields zero and is recorded.
    Rem,
    /// Less than.
    Lt,
    /// Less than or equal.
    Leq,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Geq,
    /// Equality.
    Eq,
    /// Inequality.
    Neq,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
    /// Bitwise complement.
    Not,
    /// Shift left by a constant amount.
    Shl,
    /// Shift right by a constant amount; arithmetic for signed operands.
    Shr,
    /// Shift left by a width-bounded dynamic amount.
    Dshl,
    /// Shift right by a width-bounded dynamic amount.
    Dshr,
    /// Bit concatenation.
    Cat,
    /// Bit slice, `bits(x, hi, lo)`.
    Bits,
    /// The topmost n bits.
    Head,
    /// All but the topmost n bits.
    Tail,
    /// Reinterpret as unsigned.
    AsUInt,
    /// Reinterpret as signed.
    AsSInt,
    /// Reinterpret as clock.
    AsClock,
}

impl fmt::Display for PrimOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PrimOp::Add => "add",
            PrimOp::Sub => "sub",
            PrimOp::Mul => "mul",
            PrimOp::Div => "div",
            PrimOp::Rem => "rem",
            PrimOp::Lt => "lt",
            PrimOp::Leq => "leq",
            PrimOp::Gt => "gt",
            PrimOp::Geq => "geq",
            PrimOp::Eq => "eq",
            PrimOp::Neq => "neq",
            PrimOp::And => "and",
            PrimOp::Or => "or",
            PrimOp::Xor => "xor",
            PrimOp::Not => "not",
            PrimOp::Shl => "shl",
            PrimOp::Shr => "shr",
            PrimOp::Dshl => "dshl",
            PrimOp::Dshr => "dshr",
            PrimOp::Cat => "cat",
            PrimOp::Bits => "bits",
            PrimOp::Head => "head",
            PrimOp::Tail => "tail",
            PrimOp::AsUInt => "as_uint",
            PrimOp::AsSInt => "as_sint",
            PrimOp::AsClock => "as_clock",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "circuit {} :", self.name)?;
        for module in &self.modules {
            write!(f, "\n{}", module)?;
        }
        Ok(())
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.defname {
            Some(defname) => {
                write!(f, "  extmodule {} :", self.name)?;
                for port in &self.ports {
                    write!(f, "\n    {}", port)?;
                }
                write!(f, "\n    defname = {}", defname)
            }
            None => {
                write!(f, "  module {} :", self.name)?;
                for port in &self.ports {
                    write!(f, "\n    {}", port)?;
                }
                for stmt in &self.body {
                    write!(f, "\n    {}", stmt)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dir = match self.direction {
            Direction::Input => "input",
            Direction::Output => "output",
        };
        write!(f, "{} {} : {}", dir, self.name, self.ty)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stmt::Node { name, value } => write!(f, "node {} = {}", name, value),
            Stmt::Connect { dest, source } => write!(f, "{} <= {}", dest, source),
            Stmt::Reg {
                name,
                ty,
                clock,
                reset,
            } => {
                write!(f, "reg {} : {}, {}", name, ty, clock)?;
                if let Some(reset) = reset {
                    write!(f, " with reset => ({}, {})", reset.condition, reset.init)?;
                }
                Ok(())
            }
            Stmt::Mem(mem) => {
                write!(f, "mem {} : {}[{}]", mem.name, mem.ty, mem.depth)?;
                for port in &mem.read_ports {
                    write!(f, ", read {} => {}", port.name, port.addr)?;
                }
                for port in &mem.write_ports {
                    write!(
                        f,
                        ", write {} => ({}, {}, {}, {})",
                        port.name, port.clock, port.addr, port.data, port.enable
                    )?;
                }
                Ok(())
            }
            Stmt::Inst { name, module } => write!(f, "inst {} of {}", name, module),
            Stmt::Stop {
                name,
                clock,
                condition,
                code,
            } => write!(f, "stop {} : ({}, {}, {})", name, clock, condition, code),
            Stmt::Print {
                clock,
                condition,
                format,
                args,
            } => {
                write!(f, "printf({}, {}, {:?}", clock, condition, format)?;
                for arg in args {
                    write!(f, ", {}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::Ref(name) => write!(f, "{}", name),
            Expression::Lit(lit) => write!(f, "{}", lit),
            Expression::Prim {
                op, args, params, ..
            } => {
                write!(f, "{}(", op)?;
                write_implode(f, ", ", args.iter())?;
                if !params.is_empty() {
                    if !args.is_empty() {
                        write!(f, ", ")?;
                    }
                    write_implode(f, ", ", params.iter())?;
                }
                write!(f, ")")
            }
            Expression::Mux {
                sel, tval, fval, ..
            } => write!(f, "mux({}, {}, {})", sel, tval, fval),
            Expression::ValidIf { cond, value, .. } => {
                write!(f, "validif({}, {})", cond, value)
            }
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.ty {
            Type::UInt(w) => write!(f, "UInt<{}>({})", w, self.value),
            Type::SInt(w) => write!(f, "SInt<{}>({})", w, self.value),
            Type::Clock => write!(f, "Clock({})", self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::{clock_ty, uint_ty};

    #[test]
    fn render_netlist() {
        let module = Module::new("top")
            .port("clock", Direction::Input, clock_ty())
            .port("io_out", Direction::Output, uint_ty(8))
            .stmt(Stmt::Node {
                name: "sum".into(),
                value: Expression::prim(
                    PrimOp::Add,
                    vec![Expression::var("a"), Expression::uint(8, 1)],
                    vec![],
                    uint_ty(9),
                ),
            })
            .stmt(Stmt::Connect {
                dest: "io_out".into(),
                source: Expression::var("sum"),
            });
        let circuit = Circuit::new("top").module(module);
        let text = format!("{}", circuit);
        assert!(text.contains("circuit top :"));
        assert!(text.contains("input clock : Clock"));
        assert!(text.contains("node sum = add(a, UInt<8>(1))"));
        assert!(text.contains("io_out <= sum"));
    }
}
