// Copyright (c) 2017-2021 Fabian Schuiki

//! The LIR netlist interpreter. This library provides tools to build, render,
//! and cycle-accurately interpret lowered LIR circuits.

#[macro_use]
extern crate log;

mod assign;
pub mod bench;
pub mod blackbox;
mod clock;
mod compiler;
mod engine;
mod error;
pub mod ir;
mod sched;
mod store;
mod symbols;
pub mod table;
pub mod tracer;
mod ty;
mod util;
mod value;

pub use crate::{
    assign::*, clock::*, compiler::*, engine::*, error::*, sched::*, store::*, symbols::*, ty::*,
    value::*,
};
