//! Module Trait - Neural Network Module Interface
//!
//! Defines the core Module trait that all layers and transforms implement.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::collections::HashMap;

use hific_autograd::{Result, Variable};

use crate::parameter::Parameter;

// =============================================================================
// Module Trait
// =============================================================================

/// Core trait for all neural network modules.
///
/// Forward passes are pure functions of the input and the current
/// parameters; there is no training/evaluation state on the module.
pub trait Module: Send + Sync {
    /// Performs the forward pass.
    ///
    /// Shape errors from the underlying tensor operations propagate as
    /// [`hific_autograd::AutogradError`].
    fn forward(&self, input: &Variable) -> Result<Variable>;

    /// Returns all parameters of this module, including those of children.
    fn parameters(&self) -> Vec<Parameter> {
        Vec::new()
    }

    /// Returns named parameters of this module.
    fn named_parameters(&self) -> HashMap<String, Parameter> {
        HashMap::new()
    }

    /// Returns the number of trainable parameters.
    fn num_parameters(&self) -> usize {
        self.parameters()
            .iter()
            .filter(|p| p.requires_grad())
            .map(Parameter::numel)
            .sum()
    }

    /// Zeros all gradients of parameters.
    fn zero_grad(&self) {
        for param in self.parameters() {
            param.zero_grad();
        }
    }

    /// Returns the module name for debugging.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<M: Module + ?Sized> Module for Box<M> {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        (**self).forward(input)
    }

    fn parameters(&self) -> Vec<Parameter> {
        (**self).parameters()
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        (**self).named_parameters()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    struct Shift {
        offset: Parameter,
    }

    impl Module for Shift {
        fn forward(&self, input: &Variable) -> Result<Variable> {
            input.add(&self.offset.variable())
        }

        fn parameters(&self) -> Vec<Parameter> {
            vec![self.offset.clone()]
        }
    }

    #[test]
    fn test_default_methods() {
        let module = Shift {
            offset: Parameter::named("offset", ArrayD::ones(IxDyn(&[4])), true),
        };
        assert_eq!(module.num_parameters(), 4);
        assert!(module.named_parameters().is_empty());

        let input = Variable::from_array(ArrayD::zeros(IxDyn(&[2, 4])));
        module.forward(&input).unwrap().sum().backward().unwrap();
        assert!(module.offset.grad().is_some());

        module.zero_grad();
        assert!(module.offset.grad().is_none());
    }

    #[test]
    fn test_boxed_module_delegates() {
        let boxed: Box<dyn Module> = Box::new(Shift {
            offset: Parameter::new(ArrayD::ones(IxDyn(&[1])), true),
        });
        let out = boxed
            .forward(&Variable::from_array(ArrayD::zeros(IxDyn(&[3]))))
            .unwrap();
        assert_eq!(out.to_vec(), vec![1.0, 1.0, 1.0]);
        assert_eq!(boxed.num_parameters(), 1);
    }
}
