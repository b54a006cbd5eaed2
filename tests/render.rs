// Copyright (c) 2017-2021 Fabian Schuiki

//! Netlist text rendering and computation views.

#[macro_use]
extern crate indoc;

use lir::ir::{Circuit, Direction, Expression, Module, PrimOp, Stmt};
use lir::{sint_ty, uint_ty, Engine, EngineOptions};
use num::BigInt;

fn small_circuit() -> Circuit {
    let top = Module::new("top")
        .port("io_a", Direction::Input, sint_ty(8))
        .port("io_b", Direction::Input, sint_ty(8))
        .port("io_c", Direction::Output, sint_ty(9))
        .stmt(Stmt::Node {
            name: "sum".into(),
            value: Expression::prim(
                PrimOp::Add,
                vec![Expression::var("io_a"), Expression::var("io_b")],
                vec![],
                sint_ty(9),
            ),
        })
        .stmt(Stmt::Connect {
            dest: "io_c".into(),
            source: Expression::var("sum"),
        });
    Circuit::new("top").module(top)
}

#[test]
fn circuits_render_as_netlist_text() {
    let expected = indoc!(
        "
        circuit top :
          module top :
            input io_a : SInt<8>
            input io_b : SInt<8>
            output io_c : SInt<9>
            node sum = add(io_a, io_b)
            io_c <= sum"
    );
    assert_eq!(format!("{}", small_circuit()), expected.trim_start_matches('\n'));
}

#[test]
fn computations_render_with_live_operands() {
    let mut engine = Engine::new(&small_circuit(), EngineOptions::default()).unwrap();
    engine.set_value("io_a", BigInt::from(-3)).unwrap();
    engine.set_value("io_b", BigInt::from(10)).unwrap();
    engine.get_value("io_c").unwrap();
    let expected = indoc!(
        "
        sum <= 7 : add(io_a <= -3, io_b <= 10)
        io_c <= 7 : sum <= 7
        "
    );
    assert_eq!(
        engine.render_computation(&["sum", "io_c"]).unwrap(),
        expected.trim_start_matches('\n')
    );
}
