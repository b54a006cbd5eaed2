// Copyright (c) 2017-2021 Fabian Schuiki

//! Engine error types.
//!
//! All errors that can surface from engine construction or from the driver
//! facade are variants of [`EngineError`]. Compile-time errors abort engine
//! construction; runtime errors carry the offending name; stop conditions are
//! expected events and recoverable via `clear_stop`.

use crate::ty::Type;
use num::BigInt;
use std::io;
use thiserror::Error;

/// Errors produced while compiling or interpreting a circuit.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A symbol name was declared twice in the flattened namespace.
    #[error("symbol `{0}` is declared more than once")]
    DuplicateSymbol(String),

    /// An expression referenced a name that is not in the symbol table.
    #[error("reference to unknown symbol `{0}`")]
    UnknownSymbol(String),

    /// An instantiation referenced a module that is not in the circuit.
    #[error("module `{0}` is not defined")]
    UnknownModule(String),

    /// Two assigners target the same symbol.
    #[error("symbol `{0}` is driven by more than one assigner")]
    MultipleDrivers(String),

    /// A literal does not fit its declared width.
    #[error("literal {value} does not fit in {ty}")]
    LiteralOverflow {
        /// The literal value.
        value: BigInt,
        /// The declared type.
        ty: Type,
    },

    /// No factory produced an implementation for a black box.
    #[error("no black box implementation registered for `{defname}` (instance `{instance}`)")]
    UnresolvedBlackBox {
        /// The external definition name.
        defname: String,
        /// The flattened instance name.
        instance: String,
    },

    /// A register, memory port, stop, or print referenced a non-clock signal
    /// as its clock.
    #[error("`{0}` is not a clock")]
    NotAClock(String),

    /// The combinational subgraph contains a cycle and `allow_cycles` is not
    /// set.
    #[error("combinational cycle through `{0}`")]
    CombinationalCycle(String),

    /// A write targeted a symbol that is not a primary input, without `force`
    /// or `register_poke`.
    #[error("`{0}` is not an input port; write requires force")]
    BadTarget(String),

    /// A slot offset was outside the symbol's allocation.
    #[error("offset {offset} out of range for `{name}` ({slots} slots)")]
    OffsetOutOfRange {
        /// The offending symbol name.
        name: String,
        /// The requested offset.
        offset: usize,
        /// The number of slots the symbol owns.
        slots: usize,
    },

    /// The circuit reached a stop statement; recoverable via `clear_stop`.
    #[error("circuit stopped with result {0}")]
    Stopped(i64),

    /// An I/O error occurred while writing trace output.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}
