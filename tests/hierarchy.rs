// Copyright (c) 2017-2021 Fabian Schuiki

//! Flattening of a four-level module hierarchy.

use lir::ir::{Circuit, Direction, Expression, Module, Stmt};
use lir::{uint_ty, Engine, EngineOptions};
use num::BigInt;

fn pass_through(name: &str, child: Option<&str>) -> Module {
    let module = Module::new(name)
        .port("in", Direction::Input, uint_ty(16))
        .port("out", Direction::Output, uint_ty(16));
    match child {
        Some(child) => module
            .stmt(Stmt::Inst {
                name: "u".into(),
                module: child.into(),
            })
            .stmt(Stmt::Connect {
                dest: "u.in".into(),
                source: Expression::var("in"),
            })
            .stmt(Stmt::Connect {
                dest: "out".into(),
                source: Expression::var("u.out"),
            }),
        None => module.stmt(Stmt::Connect {
            dest: "out".into(),
            source: Expression::var("in"),
        }),
    }
}

fn nested_circuit() -> Circuit {
    let top = Module::new("top")
        .port("addr", Direction::Input, uint_ty(16))
        .port("data", Direction::Output, uint_ty(16))
        .stmt(Stmt::Inst {
            name: "l1".into(),
            module: "level1".into(),
        })
        .stmt(Stmt::Connect {
            dest: "l1.in".into(),
            source: Expression::var("addr"),
        })
        .stmt(Stmt::Connect {
            dest: "data".into(),
            source: Expression::var("l1.out"),
        });
    Circuit::new("top")
        .module(top)
        .module(pass_through("level1", Some("level2")))
        .module(pass_through("level2", Some("level3")))
        .module(pass_through("level3", None))
}

#[test]
fn nested_modules_flatten_into_dotted_names() {
    let mut engine = Engine::new(&nested_circuit(), EngineOptions::default()).unwrap();
    engine.set_value("addr", BigInt::from(0xbeef)).unwrap();
    assert_eq!(engine.get_value("data").unwrap(), BigInt::from(0xbeef));

    // Every level of the path is addressable in the flat namespace.
    assert_eq!(
        engine.get_value("l1.u.u.out").unwrap(),
        BigInt::from(0xbeef)
    );
    let symbols = engine.symbols();
    assert!(symbols.contains("l1.in"));
    assert!(symbols.contains("l1.u.in"));
    assert!(symbols.contains("l1.u.u.in"));
}

#[test]
fn new_stimulus_repropagates_the_whole_path() {
    let mut engine = Engine::new(&nested_circuit(), EngineOptions::default()).unwrap();
    engine.set_value("addr", BigInt::from(1)).unwrap();
    assert_eq!(engine.get_value("data").unwrap(), BigInt::from(1));
    engine.set_value("addr", BigInt::from(0xffff)).unwrap();
    assert_eq!(engine.get_value("data").unwrap(), BigInt::from(0xffff));
}
