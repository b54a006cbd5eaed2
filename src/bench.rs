// Copyright (c) 2017-2021 Fabian Schuiki

//! A thin test-driver facade over the engine.
//!
//! The bench carries no semantics of its own; it exists so driver sessions
//! read as poke/peek/expect/step sequences and so expectation failures are
//! collected rather than aborting the session.

use crate::engine::{Engine, EngineOptions};
use crate::error::EngineError;
use crate::ir::Circuit;
use num::BigInt;

/// A poke/peek/expect/step driver around an [`Engine`].
pub struct TestBench {
    engine: Engine,
    name: String,
    expectations: usize,
    failures: Vec<String>,
}

impl TestBench {
    /// Build a bench for a circuit.
    pub fn new(circuit: &Circuit, options: EngineOptions) -> Result<TestBench, EngineError> {
        Ok(TestBench {
            name: circuit.name.clone(),
            engine: Engine::new(circuit, options)?,
            expectations: 0,
            failures: Vec::new(),
        })
    }

    /// Drive an input.
    pub fn poke(&mut self, name: &str, value: impl Into<BigInt>) -> Result<(), EngineError> {
        self.engine.set_value(name, value.into())?;
        Ok(())
    }

    /// Sample a signal.
    pub fn peek(&mut self, name: &str) -> Result<BigInt, EngineError> {
        self.engine.get_value(name)
    }

    /// Sample a signal and record whether it matches the expected value.
    pub fn expect(
        &mut self,
        name: &str,
        expected: impl Into<BigInt>,
    ) -> Result<bool, EngineError> {
        let expected = expected.into();
        let actual = self.engine.get_value(name)?;
        self.expectations += 1;
        if actual != expected {
            self.failures.push(format!(
                "{}: expected {}, got {}",
                name, expected, actual
            ));
            return Ok(false);
        }
        Ok(true)
    }

    /// Advance the clock by `n` cycles.
    pub fn step(&mut self, n: usize) -> Result<(), EngineError> {
        self.engine.do_cycles(n)
    }

    /// Check whether every expectation held, logging a summary.
    pub fn report(&self) -> bool {
        if self.failures.is_empty() {
            info!("{}: {} expectations met", self.name, self.expectations);
            true
        } else {
            for failure in &self.failures {
                error!("{}: {}", self.name, failure);
            }
            false
        }
    }

    /// Return the recorded expectation failures.
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// Access the underlying engine.
    pub fn engine(&mut self) -> &mut Engine {
        &mut self.engine
    }
}
