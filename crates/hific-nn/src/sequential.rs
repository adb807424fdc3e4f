//! Sequential - Sequential Container for Modules
//!
//! A container that runs modules in sequence, passing the output
//! of each module as input to the next.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::collections::HashMap;

use hific_autograd::{Result, Variable};

use crate::module::Module;
use crate::parameter::Parameter;

// =============================================================================
// Sequential
// =============================================================================

/// A sequential container that chains modules together.
///
/// # Example
/// ```ignore
/// let analysis = Sequential::new()
///     .add(Conv2d::new(220, 320, 3, &mut rng))
///     .add(ReLU)
///     .add(Conv2d::with_options(320, 320, 5, 2, 2, true, &mut rng));
///
/// let hyperlatents = analysis.forward(&latents)?;
/// ```
pub struct Sequential {
    modules: Vec<(String, Box<dyn Module>)>,
}

impl Sequential {
    /// Creates a new empty Sequential container.
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Adds a module with an auto-generated name.
    pub fn add<M: Module + 'static>(mut self, module: M) -> Self {
        self.push(module);
        self
    }

    /// Adds a module with a specific name.
    pub fn add_named<M: Module + 'static>(mut self, name: impl Into<String>, module: M) -> Self {
        self.modules.push((name.into(), Box::new(module)));
        self
    }

    /// Pushes a module (non-builder pattern).
    pub fn push<M: Module + 'static>(&mut self, module: M) {
        let name = format!("{}", self.modules.len());
        self.modules.push((name, Box::new(module)));
    }

    /// Returns the number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Returns an iterator over named modules.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Module)> {
        self.modules.iter().map(|(n, m)| (n.as_str(), m.as_ref()))
    }
}

impl Default for Sequential {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Sequential {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        let mut x = input.clone();
        for (_, module) in &self.modules {
            x = module.forward(&x)?;
        }
        Ok(x)
    }

    fn parameters(&self) -> Vec<Parameter> {
        self.modules
            .iter()
            .flat_map(|(_, m)| m.parameters())
            .collect()
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        for (module_name, module) in &self.modules {
            for (param_name, param) in module.named_parameters() {
                params.insert(format!("{module_name}.{param_name}"), param);
            }
        }
        params
    }

    fn name(&self) -> &'static str {
        "Sequential"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Conv2d;
    use crate::ReLU;
    use ndarray::{ArrayD, IxDyn};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct TestDouble;

    impl Module for TestDouble {
        fn forward(&self, input: &Variable) -> Result<Variable> {
            input.add(input)
        }
    }

    #[test]
    fn test_sequential_forward() {
        let seq = Sequential::new().add(TestDouble).add(TestDouble);
        assert_eq!(seq.len(), 2);

        let input =
            Variable::from_array(ArrayD::from_shape_vec(IxDyn(&[2]), vec![1.0, 2.0]).unwrap());
        let output = seq.forward(&input).unwrap();

        // Double twice: 1*2*2=4, 2*2*2=8
        assert_eq!(output.to_vec(), vec![4.0, 8.0]);
    }

    #[test]
    fn test_sequential_named_parameters() {
        let mut rng = StdRng::seed_from_u64(11);
        let seq = Sequential::new()
            .add_named("conv_in", Conv2d::new(1, 2, 3, &mut rng))
            .add_named("act", ReLU)
            .add(Conv2d::new(2, 1, 3, &mut rng));

        let names: Vec<&str> = seq.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["conv_in", "act", "2"]);

        let params = seq.named_parameters();
        assert!(params.contains_key("conv_in.weight"));
        assert!(params.contains_key("2.bias"));
        assert_eq!(seq.parameters().len(), 4);
    }

    #[test]
    fn test_sequential_propagates_errors() {
        let mut rng = StdRng::seed_from_u64(11);
        let seq = Sequential::new().add(Conv2d::new(3, 2, 3, &mut rng));
        let input = Variable::from_array(ArrayD::ones(IxDyn(&[1, 1, 4, 4])));
        assert!(seq.forward(&input).is_err());
    }
}
