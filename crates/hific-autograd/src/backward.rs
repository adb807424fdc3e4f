//! Backward Pass - Gradient Computation
//!
//! Reverse-mode traversal of the recorded graph plus finite-difference
//! helpers for checking hand-written gradients.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::collections::{HashMap, HashSet};

use ndarray::ArrayD;

use crate::error::Result;
use crate::grad_fn::{GradFn, GradFnId};
use crate::variable::Variable;

// =============================================================================
// Backward Function
// =============================================================================

/// Propagates `grad_output` from `output` to every leaf that requires
/// gradients, accumulating into each leaf's gradient storage.
pub fn backward(output: &Variable, grad_output: &ArrayD<f32>) {
    let Some(grad_fn) = output.grad_fn().cloned() else {
        return;
    };

    let mut topo_order: Vec<GradFn> = Vec::new();
    let mut visited: HashSet<GradFnId> = HashSet::new();
    build_topo_order(&grad_fn, &mut topo_order, &mut visited);

    let mut grad_map: HashMap<GradFnId, ArrayD<f32>> = HashMap::new();
    grad_map.insert(grad_fn.id(), grad_output.clone());

    for node in topo_order.iter().rev() {
        let Some(grad) = grad_map.remove(&node.id()) else {
            continue;
        };

        let input_grads = node.apply(&grad);

        for (maybe_next, input_grad) in node.next_functions().iter().zip(input_grads) {
            let (Some(next_fn), Some(input_grad)) = (maybe_next, input_grad) else {
                continue;
            };
            grad_map
                .entry(next_fn.id())
                .and_modify(|existing| *existing += &input_grad)
                .or_insert(input_grad);
        }
    }
}

/// Builds the topological order of nodes in the graph.
///
/// Iterative post-order DFS; deep graphs do not grow the call stack.
fn build_topo_order(root: &GradFn, order: &mut Vec<GradFn>, visited: &mut HashSet<GradFnId>) {
    let mut stack: Vec<(GradFn, bool)> = vec![(root.clone(), false)];

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !visited.insert(node.id()) {
            continue;
        }
        stack.push((node.clone(), true));
        for next in node.next_functions().iter().flatten() {
            if !visited.contains(&next.id()) {
                stack.push((next.clone(), false));
            }
        }
    }
}

// =============================================================================
// Gradient Checking
// =============================================================================

/// Central finite-difference gradient of a scalar-valued `func` at `input`.
pub fn numerical_gradient<F>(func: F, input: &Variable, eps: f32) -> Result<ArrayD<f32>>
where
    F: Fn(&Variable) -> Result<Variable>,
{
    let base = input.data();
    let mut grad = ArrayD::<f32>::zeros(base.raw_dim());

    for (i, slot) in grad.iter_mut().enumerate() {
        let mut plus = base.clone();
        let mut minus = base.clone();
        if let Some(v) = plus.iter_mut().nth(i) {
            *v += eps;
        }
        if let Some(v) = minus.iter_mut().nth(i) {
            *v -= eps;
        }

        let plus_val = func(&Variable::from_array(plus))?.item()?;
        let minus_val = func(&Variable::from_array(minus))?.item()?;
        *slot = (plus_val - minus_val) / (2.0 * eps);
    }

    Ok(grad)
}

/// Checks if analytical and numerical gradients match within
/// `atol + rtol * |numerical|`.
#[must_use]
pub fn gradcheck(analytical: &ArrayD<f32>, numerical: &ArrayD<f32>, rtol: f32, atol: f32) -> bool {
    if analytical.shape() != numerical.shape() {
        return false;
    }

    analytical
        .iter()
        .zip(numerical.iter())
        .all(|(&a, &n)| (a - n).abs() <= atol + rtol * n.abs())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn var(values: &[f32], requires_grad: bool) -> Variable {
        Variable::from_vec(values.to_vec(), &[values.len()], requires_grad).unwrap()
    }

    #[test]
    fn test_chain_backward() {
        // y = exp(2x), dy/dx = 2 exp(2x)
        let x = var(&[0.5], true);
        x.mul_scalar(2.0).exp().sum().backward().unwrap();
        let grad = x.grad().unwrap().sum();
        assert!((grad - 2.0 * 1f32.exp()).abs() < 1e-4);
    }

    #[test]
    fn test_shared_subexpression_accumulates() {
        // y = x * x, dy/dx = 2x
        let x = var(&[3.0], true);
        x.mul(&x).unwrap().sum().backward().unwrap();
        assert!((x.grad().unwrap().sum() - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_repeated_backward_accumulates() {
        let x = var(&[1.0, 2.0], true);
        x.mul_scalar(3.0).sum().backward().unwrap();
        x.mul_scalar(3.0).sum().backward().unwrap();
        assert!(x.grad().unwrap().iter().all(|&g| (g - 6.0).abs() < 1e-6));

        x.zero_grad();
        assert!(x.grad().is_none());
    }

    #[test]
    fn test_backward_on_leaf() {
        let x = var(&[2.0], true);
        x.backward().unwrap();
        assert!((x.grad().unwrap().sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_numerical_gradient_matches_softplus() {
        let x = var(&[-1.0, 0.0, 2.0], true);
        x.softplus().sum().backward().unwrap();
        let numerical = numerical_gradient(|v| Ok(v.softplus().sum()), &x, 1e-3).unwrap();
        assert!(gradcheck(&x.grad().unwrap(), &numerical, 1e-2, 1e-3));
    }

    #[test]
    fn test_numerical_gradient_matches_erfc() {
        let x = var(&[-0.7, 0.1, 1.3], true);
        x.erfc().sum().backward().unwrap();
        let numerical = numerical_gradient(|v| Ok(v.erfc().sum()), &x, 1e-3).unwrap();
        assert!(gradcheck(&x.grad().unwrap(), &numerical, 1e-2, 1e-3));
    }

    #[test]
    fn test_numerical_gradient_matches_conv2d() {
        let x = Variable::new(
            ArrayD::from_shape_fn(IxDyn(&[1, 2, 4, 4]), |i| (i[1] * 16 + i[2] * 4 + i[3]) as f32 * 0.1),
            true,
        );
        let w = Variable::from_array(ArrayD::from_shape_fn(IxDyn(&[2, 2, 3, 3]), |i| {
            ((i[0] + 2 * i[1] + i[2] * i[3]) % 5) as f32 * 0.2 - 0.4
        }));

        x.conv2d(&w, None, 2, 1).unwrap().tanh().sum().backward().unwrap();
        let numerical =
            numerical_gradient(|v| Ok(v.conv2d(&w, None, 2, 1)?.tanh().sum()), &x, 1e-2).unwrap();
        assert!(gradcheck(&x.grad().unwrap(), &numerical, 5e-2, 5e-3));
    }

    #[test]
    fn test_gradcheck() {
        let a = ArrayD::from_shape_vec(IxDyn(&[3]), vec![1.0, 2.0, 3.0]).unwrap();
        let b = ArrayD::from_shape_vec(IxDyn(&[3]), vec![1.001, 2.001, 3.001]).unwrap();
        assert!(gradcheck(&a, &b, 0.01, 0.01));
        assert!(!gradcheck(&a, &b, 0.0, 0.0001));

        let c = ArrayD::from_shape_vec(IxDyn(&[1, 3]), vec![1.0, 2.0, 3.0]).unwrap();
        assert!(!gradcheck(&a, &c, 1.0, 1.0));
    }
}
