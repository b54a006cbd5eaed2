// Copyright (c) 2017-2021 Fabian Schuiki

//! Width boundaries: wide literals, normalization laws, division by zero.

use lir::ir::{Circuit, Direction, Expression, Module, PrimOp, Stmt};
use lir::{mask, sint_ty, uint_ty, Engine, EngineError, EngineOptions};
use num::BigInt;

#[test]
fn maximum_width_literals_load_without_overflow() {
    let top = Module::new("top")
        .port("io_out", Direction::Output, uint_ty(128))
        .stmt(Stmt::Node {
            name: "all_ones".into(),
            value: Expression::uint(128, mask(128)),
        })
        .stmt(Stmt::Connect {
            dest: "io_out".into(),
            source: Expression::var("all_ones"),
        });
    let circuit = Circuit::new("top").module(top);
    let mut engine = Engine::new(&circuit, EngineOptions::default()).unwrap();
    assert_eq!(engine.get_value("io_out").unwrap(), mask(128));
}

#[test]
fn oversized_literals_abort_construction() {
    let top = Module::new("top").stmt(Stmt::Node {
        name: "n".into(),
        value: Expression::uint(8, 256),
    });
    let circuit = Circuit::new("top").module(top);
    assert!(matches!(
        Engine::new(&circuit, EngineOptions::default()),
        Err(EngineError::LiteralOverflow { .. })
    ));
}

#[test]
fn pokes_normalize_to_the_declared_width() {
    let top = Module::new("top")
        .port("io_in", Direction::Input, sint_ty(8))
        .port("io_out", Direction::Output, sint_ty(8))
        .stmt(Stmt::Connect {
            dest: "io_out".into(),
            source: Expression::var("io_in"),
        });
    let circuit = Circuit::new("top").module(top);
    let mut engine = Engine::new(&circuit, EngineOptions::default()).unwrap();
    // set_value(x, v); get_value(x) == normalize(v, width(x))
    engine.set_value("io_in", BigInt::from(0x1ff)).unwrap();
    assert_eq!(engine.get_value("io_in").unwrap(), BigInt::from(-1));
    assert_eq!(engine.get_value("io_out").unwrap(), BigInt::from(-1));
}

#[test]
fn division_by_zero_yields_zero_and_continues() {
    let top = Module::new("top")
        .port("io_a", Direction::Input, uint_ty(8))
        .port("io_b", Direction::Input, uint_ty(8))
        .port("io_q", Direction::Output, uint_ty(8))
        .stmt(Stmt::Node {
            name: "quot".into(),
            value: Expression::prim(
                PrimOp::Div,
                vec![Expression::var("io_a"), Expression::var("io_b")],
                vec![],
                uint_ty(8),
            ),
        })
        .stmt(Stmt::Connect {
            dest: "io_q".into(),
            source: Expression::var("quot"),
        });
    let circuit = Circuit::new("top").module(top);
    let mut engine = Engine::new(&circuit, EngineOptions::default()).unwrap();
    engine.set_value("io_a", BigInt::from(42)).unwrap();
    engine.set_value("io_b", BigInt::from(0)).unwrap();
    assert_eq!(engine.get_value("io_q").unwrap(), BigInt::from(0));
    assert!(engine.eval_events().div_by_zero > 0);
    // Evaluation continues normally afterwards.
    engine.set_value("io_b", BigInt::from(6)).unwrap();
    assert_eq!(engine.get_value("io_q").unwrap(), BigInt::from(7));
}
