// Copyright (c) 2017-2021 Fabian Schuiki

//! Externally implemented modules.
//!
//! A black box is a module whose behavior is not described in the netlist.
//! Implementations are provided through factories registered with the engine
//! options; the registry is consulted during compilation only, so the
//! dependency edges of every black-box output are statically known.

use crate::clock::Transition;
use crate::error::EngineError;
use crate::ty::Type;
use num::BigInt;
use std::sync::{Arc, Mutex};

/// A shared handle to a black box instance.
pub type BlackBoxRef = Arc<Mutex<dyn BlackBox>>;

/// The behavior of one black box instance.
pub trait BlackBox {
    /// Return the instance name.
    fn name(&self) -> &str;

    /// Called when an input pin is driven to a new value.
    fn input_changed(&mut self, _name: &str, _value: &BigInt) {}

    /// Called when a clock pin transitions.
    fn clock_change(&mut self, _transition: Transition, _clock_name: &str) {}

    /// Compute the value of an output pin.
    ///
    /// `inputs` holds the current values of the pins named by
    /// `output_dependencies`, in the same order.
    fn get_output(&mut self, inputs: &[BigInt], ty: &Type, output_name: &str) -> BigInt;

    /// Return the input pins an output pin depends on.
    fn output_dependencies(&self, output_name: &str) -> Vec<String>;

    /// Return the full output-to-inputs relation.
    ///
    /// The default covers implementations that only know their pins through
    /// [`output_dependencies`](BlackBox::output_dependencies); override it
    /// when the relation is available wholesale.
    fn get_dependencies(&self) -> Vec<(String, Vec<String>)> {
        Vec::new()
    }
}

/// A factory producing black box instances for a definition name.
pub trait BlackBoxFactory {
    /// Create an implementation for `instance_name` if this factory covers
    /// `defname`; return `None` otherwise.
    fn create(&self, instance_name: &str, defname: &str) -> Option<BlackBoxRef>;
}

/// The lookup used by the compiler to resolve `defname`s.
pub struct BlackBoxRegistry {
    factories: Vec<Box<dyn BlackBoxFactory>>,
    instances: Vec<(String, BlackBoxRef)>,
}

impl BlackBoxRegistry {
    /// Create a registry over a list of factories.
    pub fn new(factories: Vec<Box<dyn BlackBoxFactory>>) -> BlackBoxRegistry {
        BlackBoxRegistry {
            factories,
            instances: Vec::new(),
        }
    }

    /// Resolve a black box instance, trying each factory in order.
    pub fn resolve(
        &mut self,
        instance_name: &str,
        defname: &str,
    ) -> Result<BlackBoxRef, EngineError> {
        for factory in &self.factories {
            if let Some(instance) = factory.create(instance_name, defname) {
                debug!("black box `{}` resolved for `{}`", defname, instance_name);
                self.instances.push((instance_name.to_string(), instance.clone()));
                return Ok(instance);
            }
        }
        Err(EngineError::UnresolvedBlackBox {
            defname: defname.to_string(),
            instance: instance_name.to_string(),
        })
    }

    /// Return the instances created so far.
    pub fn instances(&self) -> &[(String, BlackBoxRef)] {
        &self.instances
    }
}
