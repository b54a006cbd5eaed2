// Copyright (c) 2017-2021 Fabian Schuiki

//! A register counter with a synchronous reset mux.

use lir::ir::{Circuit, Direction, Expression, Module, PrimOp, Stmt};
use lir::{clock_ty, uint_ty, Engine, EngineOptions};
use num::BigInt;

fn counter_circuit() -> Circuit {
    let top = Module::new("top")
        .port("clock", Direction::Input, clock_ty())
        .port("reset", Direction::Input, uint_ty(1))
        .port("io_count", Direction::Output, uint_ty(32))
        .stmt(Stmt::Reg {
            name: "counter".into(),
            ty: uint_ty(32),
            clock: Expression::var("clock"),
            reset: None,
        })
        .stmt(Stmt::Node {
            name: "next".into(),
            value: Expression::prim(
                PrimOp::Add,
                vec![Expression::var("counter"), Expression::uint(32, 1)],
                vec![],
                uint_ty(33),
            ),
        })
        .stmt(Stmt::Connect {
            dest: "counter".into(),
            source: Expression::mux(
                Expression::var("reset"),
                Expression::uint(32, 0),
                Expression::var("next"),
                uint_ty(32),
            ),
        })
        .stmt(Stmt::Connect {
            dest: "io_count".into(),
            source: Expression::var("counter"),
        });
    Circuit::new("top").module(top)
}

#[test]
fn counts_up_and_resets() {
    let mut engine = Engine::new(&counter_circuit(), EngineOptions::default()).unwrap();
    engine.set_value("reset", BigInt::from(0)).unwrap();
    for i in 1..=5u32 {
        engine.cycle(false).unwrap();
        assert_eq!(engine.get_value("io_count").unwrap(), BigInt::from(i));
    }
    engine.set_value("reset", BigInt::from(1)).unwrap();
    engine.cycle(false).unwrap();
    assert_eq!(engine.get_value("io_count").unwrap(), BigInt::from(0));
}

#[test]
fn registers_take_their_staged_value() {
    let mut engine = Engine::new(&counter_circuit(), EngineOptions::default()).unwrap();
    engine.set_value("reset", BigInt::from(0)).unwrap();
    for _ in 0..4 {
        // The stage holds the next-state computed at the end of the previous
        // input-sensitive phase; the rising edge copies it over.
        let staged = engine.get_value("counter/prev").unwrap();
        engine.cycle(false).unwrap();
        assert_eq!(engine.get_value("counter").unwrap(), staged);
    }
}

#[test]
fn rollback_buffers_keep_history() {
    let options = EngineOptions {
        rollback_buffers: 2,
        ..Default::default()
    };
    let mut engine = Engine::new(&counter_circuit(), options).unwrap();
    engine.set_value("reset", BigInt::from(0)).unwrap();
    for _ in 0..4 {
        engine.cycle(false).unwrap();
    }
    assert_eq!(engine.get_value("io_count").unwrap(), BigInt::from(4));
    let symbols = engine.symbols();
    let counter = symbols.get("counter").unwrap();
    assert_eq!(engine.store().num_buffers(), 3);
    assert_eq!(
        engine.store().earlier_value(&symbols[counter], 1),
        BigInt::from(3)
    );
    assert_eq!(
        engine.store().earlier_value(&symbols[counter], 2),
        BigInt::from(2)
    );
}

#[test]
fn a_clock_that_never_transitions_freezes_registers() {
    let mut engine = Engine::new(&counter_circuit(), EngineOptions::default()).unwrap();
    engine.set_value("reset", BigInt::from(0)).unwrap();
    // Evaluate repeatedly without ever toggling the clock.
    for _ in 0..10 {
        engine.evaluate_circuit(&[]).unwrap();
        assert_eq!(engine.get_value("io_count").unwrap(), BigInt::from(0));
    }
}

#[test]
fn register_pokes_write_the_canonical_slot() {
    let mut engine = Engine::new(&counter_circuit(), EngineOptions::default()).unwrap();
    engine.set_value("reset", BigInt::from(0)).unwrap();
    engine.poke_register("counter", BigInt::from(40)).unwrap();
    engine.cycle(false).unwrap();
    assert_eq!(engine.get_value("io_count").unwrap(), BigInt::from(41));
}
