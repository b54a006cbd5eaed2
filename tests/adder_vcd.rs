// Copyright (c) 2017-2021 Fabian Schuiki

//! A signed adder feeding an accumulator register, traced as VCD.

use lir::ir::{Circuit, Direction, Expression, Module, PrimOp, Stmt};
use lir::{clock_ty, sint_ty, Engine, EngineOptions};
use num::BigInt;
use std::fs;

fn adder_circuit() -> Circuit {
    let top = Module::new("top")
        .port("clock", Direction::Input, clock_ty())
        .port("io_a", Direction::Input, sint_ty(8))
        .port("io_b", Direction::Input, sint_ty(8))
        .port("io_c", Direction::Output, sint_ty(10))
        .stmt(Stmt::Node {
            name: "sum".into(),
            value: Expression::prim(
                PrimOp::Add,
                vec![Expression::var("io_a"), Expression::var("io_b")],
                vec![],
                sint_ty(9),
            ),
        })
        .stmt(Stmt::Reg {
            name: "accum".into(),
            ty: sint_ty(10),
            clock: Expression::var("clock"),
            reset: None,
        })
        .stmt(Stmt::Connect {
            dest: "accum".into(),
            source: Expression::var("sum"),
        })
        .stmt(Stmt::Connect {
            dest: "io_c".into(),
            source: Expression::var("accum"),
        });
    Circuit::new("top").module(top)
}

#[test]
fn signed_sums_register_through() {
    let mut engine = Engine::new(&adder_circuit(), EngineOptions::default()).unwrap();
    engine.set_value("io_a", BigInt::from(50)).unwrap();
    engine.set_value("io_b", BigInt::from(40)).unwrap();
    engine.cycle(false).unwrap();
    assert_eq!(engine.get_value("io_c").unwrap(), BigInt::from(90));
    engine.set_value("io_a", BigInt::from(-50)).unwrap();
    engine.set_value("io_b", BigInt::from(-80)).unwrap();
    engine.cycle(false).unwrap();
    assert_eq!(engine.get_value("io_c").unwrap(), BigInt::from(-130));
}

#[test]
fn vcd_records_the_session() {
    let path = std::env::temp_dir().join("lir_adder_vcd_test.vcd");
    let mut engine = Engine::new(&adder_circuit(), EngineOptions::default()).unwrap();
    engine.make_vcd_logger(&path, false).unwrap();
    engine.set_value("io_a", BigInt::from(50)).unwrap();
    engine.set_value("io_b", BigInt::from(40)).unwrap();
    engine.cycle(false).unwrap();
    engine.set_value("io_a", BigInt::from(-50)).unwrap();
    engine.set_value("io_b", BigInt::from(-80)).unwrap();
    engine.cycle(false).unwrap();
    engine.write_vcd();
    engine.disable_vcd();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("$timescale 1ns $end"));
    assert!(text.contains("io_c"));
    assert!(text.contains("$enddefinitions $end"));
    assert!(text.contains("$dumpvars"));
    // Two cycles of changes got stamped.
    assert!(text.contains("#10"));
    assert!(text.contains("#20"));
    // Stage internals stay out of the trace.
    assert!(!text.contains("accum/prev"));
    fs::remove_file(&path).unwrap();
}
