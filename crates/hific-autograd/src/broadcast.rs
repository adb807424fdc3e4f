//! Broadcasting - NumPy-Style Shape Alignment
//!
//! Shapes are aligned from the trailing axis; a dimension of 1 stretches to
//! match the other operand. Backward passes fold the stretched axes back by
//! summation.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use ndarray::{ArrayD, Axis, Zip};

use crate::error::{AutogradError, Result};

/// Returns the broadcast shape of `lhs` and `rhs`.
pub fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> Result<Vec<usize>> {
    let ndim = lhs.len().max(rhs.len());
    let mut shape = vec![0; ndim];

    for i in 0..ndim {
        let l = dim_from_end(lhs, ndim - 1 - i);
        let r = dim_from_end(rhs, ndim - 1 - i);
        shape[i] = match (l, r) {
            (a, b) if a == b => a,
            (1, b) => b,
            (a, 1) => a,
            _ => return Err(AutogradError::broadcast(lhs, rhs)),
        };
    }

    Ok(shape)
}

fn dim_from_end(shape: &[usize], offset: usize) -> usize {
    if offset < shape.len() {
        shape[shape.len() - 1 - offset]
    } else {
        1
    }
}

/// Applies `f` element-wise over the broadcast of `lhs` and `rhs`.
pub(crate) fn zip_broadcast<F>(lhs: &ArrayD<f32>, rhs: &ArrayD<f32>, f: F) -> Result<ArrayD<f32>>
where
    F: Fn(f32, f32) -> f32,
{
    let shape = broadcast_shape(lhs.shape(), rhs.shape())?;
    let l = lhs
        .broadcast(shape.as_slice())
        .ok_or_else(|| AutogradError::broadcast(lhs.shape(), rhs.shape()))?;
    let r = rhs
        .broadcast(shape.as_slice())
        .ok_or_else(|| AutogradError::broadcast(lhs.shape(), rhs.shape()))?;

    Ok(Zip::from(&l).and(&r).map_collect(|&a, &b| f(a, b)))
}

/// Sums `grad` down to `target`, undoing a broadcast.
pub(crate) fn reduce_to_shape(grad: &ArrayD<f32>, target: &[usize]) -> ArrayD<f32> {
    if grad.shape() == target {
        return grad.clone();
    }

    let mut reduced = grad.clone();
    while reduced.ndim() > target.len() {
        reduced = reduced.sum_axis(Axis(0));
    }
    for (axis, &dim) in target.iter().enumerate() {
        if dim == 1 && reduced.shape()[axis] != 1 {
            reduced = reduced.sum_axis(Axis(axis)).insert_axis(Axis(axis));
        }
    }

    reduced
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn test_broadcast_shape() {
        assert_eq!(broadcast_shape(&[4, 3, 1], &[3, 5]).unwrap(), vec![4, 3, 5]);
        assert_eq!(broadcast_shape(&[], &[2, 2]).unwrap(), vec![2, 2]);
        assert!(broadcast_shape(&[2, 3], &[4, 3]).is_err());
    }

    #[test]
    fn test_zip_broadcast() {
        let a = ArrayD::from_shape_vec(IxDyn(&[2, 1]), vec![1.0f32, 2.0]).unwrap();
        let b = ArrayD::from_shape_vec(IxDyn(&[1, 3]), vec![10.0f32, 20.0, 30.0]).unwrap();
        let c = zip_broadcast(&a, &b, |x, y| x + y).unwrap();
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(
            c.iter().copied().collect::<Vec<_>>(),
            vec![11.0, 21.0, 31.0, 12.0, 22.0, 32.0]
        );
    }

    #[test]
    fn test_reduce_to_shape() {
        let grad = ArrayD::from_elem(IxDyn(&[2, 3, 4]), 1.0f32);
        let reduced = reduce_to_shape(&grad, &[3, 1]);
        assert_eq!(reduced.shape(), &[3, 1]);
        assert!(reduced.iter().all(|&v| (v - 8.0).abs() < 1e-6));

        let scalar = reduce_to_shape(&grad, &[]);
        assert_eq!(scalar.ndim(), 0);
        assert!((scalar.sum() - 24.0).abs() < 1e-6);
    }
}
