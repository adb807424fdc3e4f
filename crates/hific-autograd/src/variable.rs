//! Variable - Tensor with Gradient Tracking
//!
//! `Variable` wraps an `ndarray::ArrayD<f32>` and records the operations
//! applied to it so gradients can be computed by backpropagation.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::ops::Neg;
use std::sync::Arc;

use ndarray::{Array1, ArrayD, Ix1, Ix3, Ix4, IxDyn};
use parking_lot::RwLock;

use crate::broadcast::zip_broadcast;
use crate::error::{AutogradError, Result};
use crate::functions::{
    batched_matmul, conv2d_forward, reshape_standard, stable_sigmoid, stable_softplus,
    upsample_nearest_forward, AbsBackward, AddBackward, BmmBackward, ClampBackward,
    Conv2dBackward, DivBackward, ErfcBackward, ExpBackward, IdentityBackward, LogBackward,
    MulBackward, PermuteBackward, ReluBackward, ReshapeBackward, ScaleBackward, SigmoidBackward,
    SoftplusBackward, SubBackward, SumBackward, TanhBackward, UpsampleNearestBackward,
};
use crate::grad_fn::{AccumulateGrad, GradAccumulator, GradFn, GradientFunction};
use crate::no_grad::is_grad_enabled;

// =============================================================================
// Variable Struct
// =============================================================================

/// A tensor with automatic differentiation support.
///
/// Cloning a `Variable` is cheap and shares both data and gradient storage.
#[derive(Clone)]
pub struct Variable {
    /// The underlying tensor data.
    data: Arc<RwLock<ArrayD<f32>>>,
    /// Shared gradient accumulator (for leaves, shared with `AccumulateGrad`).
    grad: GradAccumulator,
    /// Whether this variable requires gradient computation.
    requires_grad: bool,
    /// Whether this is a leaf variable (created by user, not an operation).
    is_leaf: bool,
    /// The gradient function for backpropagation.
    grad_fn: Option<GradFn>,
}

impl Variable {
    /// Creates a new leaf variable from an array.
    #[must_use]
    pub fn new(data: ArrayD<f32>, requires_grad: bool) -> Self {
        let grad: GradAccumulator = Arc::new(RwLock::new(None));
        let grad_fn = requires_grad.then(|| GradFn::new(AccumulateGrad::new(Arc::clone(&grad))));

        Self {
            data: Arc::new(RwLock::new(data)),
            grad,
            requires_grad,
            is_leaf: true,
            grad_fn,
        }
    }

    /// Creates a variable that doesn't require gradients.
    #[must_use]
    pub fn from_array(data: ArrayD<f32>) -> Self {
        Self::new(data, false)
    }

    /// Creates a variable from a flat vector and a shape.
    pub fn from_vec(values: Vec<f32>, shape: &[usize], requires_grad: bool) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(AutogradError::shape_mismatch(&[expected], &[values.len()]));
        }
        let data = ArrayD::from_shape_vec(IxDyn(shape), values)
            .map_err(|e| AutogradError::invalid_operation(e.to_string()))?;
        Ok(Self::new(data, requires_grad))
    }

    /// Creates a constant variable filled with `value`.
    #[must_use]
    pub fn full(shape: &[usize], value: f32) -> Self {
        Self::from_array(ArrayD::from_elem(IxDyn(shape), value))
    }

    /// Creates a constant zero-filled variable.
    #[must_use]
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    /// Creates a new variable from an operation result.
    fn from_operation(data: ArrayD<f32>, grad_fn: GradFn) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            grad: Arc::new(RwLock::new(None)),
            requires_grad: true,
            is_leaf: false,
            grad_fn: Some(grad_fn),
        }
    }

    /// Wraps `result` and records `make_grad_fn` if any input is tracked.
    fn record<F, G>(result: ArrayD<f32>, track: bool, make_grad_fn: F) -> Self
    where
        F: FnOnce() -> G,
        G: GradientFunction + 'static,
    {
        if track && is_grad_enabled() {
            Self::from_operation(result, GradFn::new(make_grad_fn()))
        } else {
            Self::from_array(result)
        }
    }

    /// Returns a copy of the underlying array.
    #[must_use]
    pub fn data(&self) -> ArrayD<f32> {
        self.data.read().clone()
    }

    /// Returns the shape of the tensor.
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        self.data.read().shape().to_vec()
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.data.read().ndim()
    }

    /// Returns the total number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.read().len()
    }

    /// Returns the elements in logical (row-major) order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.read().iter().copied().collect()
    }

    /// Returns the value of a single-element variable.
    pub fn item(&self) -> Result<f32> {
        let data = self.data.read();
        if data.len() != 1 {
            return Err(AutogradError::shape_mismatch(&[], data.shape()));
        }
        Ok(data.iter().next().copied().unwrap_or_default())
    }

    /// Returns whether this variable requires gradients.
    #[must_use]
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Returns whether this is a leaf variable.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    /// Returns the accumulated gradient of a leaf variable.
    #[must_use]
    pub fn grad(&self) -> Option<ArrayD<f32>> {
        self.grad.read().clone()
    }

    /// Returns the gradient function.
    #[must_use]
    pub fn grad_fn(&self) -> Option<&GradFn> {
        self.grad_fn.as_ref()
    }

    /// Accumulates gradient (adds to existing gradient).
    pub fn accumulate_grad(&self, grad: &ArrayD<f32>) {
        let mut guard = self.grad.write();
        match guard.as_mut() {
            Some(existing) => *existing += grad,
            None => *guard = Some(grad.clone()),
        }
    }

    /// Clears the gradient.
    pub fn zero_grad(&self) {
        *self.grad.write() = None;
    }

    /// Detaches this variable from the computation graph.
    ///
    /// The result shares no history and never receives gradients.
    #[must_use]
    pub fn detach(&self) -> Self {
        Self::from_array(self.data())
    }

    /// Computes gradients of this single-element variable via backpropagation.
    pub fn backward(&self) -> Result<()> {
        if !self.requires_grad {
            return Err(AutogradError::invalid_operation(
                "backward on a variable that does not require gradients",
            ));
        }
        if self.numel() != 1 {
            return Err(AutogradError::shape_mismatch(&[], &self.shape()));
        }
        let seed = ArrayD::ones(IxDyn(&self.shape()));
        crate::backward::backward(self, &seed);
        Ok(())
    }

    fn tracked(&self) -> bool {
        self.requires_grad
    }

    fn next_fn(&self) -> Option<GradFn> {
        self.grad_fn.clone()
    }

    // =========================================================================
    // Arithmetic Operations
    // =========================================================================

    /// Element-wise addition with broadcasting.
    pub fn add(&self, other: &Variable) -> Result<Variable> {
        let result = zip_broadcast(&self.data.read(), &other.data.read(), |a, b| a + b)?;
        Ok(Self::record(result, self.tracked() || other.tracked(), || {
            AddBackward::new(self.next_fn(), other.next_fn(), self.shape(), other.shape())
        }))
    }

    /// Element-wise subtraction with broadcasting.
    pub fn sub(&self, other: &Variable) -> Result<Variable> {
        let result = zip_broadcast(&self.data.read(), &other.data.read(), |a, b| a - b)?;
        Ok(Self::record(result, self.tracked() || other.tracked(), || {
            SubBackward::new(self.next_fn(), other.next_fn(), self.shape(), other.shape())
        }))
    }

    /// Element-wise multiplication with broadcasting.
    pub fn mul(&self, other: &Variable) -> Result<Variable> {
        let lhs = self.data();
        let rhs = other.data();
        let result = zip_broadcast(&lhs, &rhs, |a, b| a * b)?;
        Ok(Self::record(result, self.tracked() || other.tracked(), || {
            MulBackward::new(self.next_fn(), other.next_fn(), lhs, rhs)
        }))
    }

    /// Element-wise division with broadcasting.
    pub fn div(&self, other: &Variable) -> Result<Variable> {
        let lhs = self.data();
        let rhs = other.data();
        let result = zip_broadcast(&lhs, &rhs, |a, b| a / b)?;
        Ok(Self::record(result, self.tracked() || other.tracked(), || {
            DivBackward::new(self.next_fn(), other.next_fn(), lhs, rhs)
        }))
    }

    /// Adds a constant to every element.
    #[must_use]
    pub fn add_scalar(&self, scalar: f32) -> Variable {
        let result = self.data.read().mapv(|x| x + scalar);
        Self::record(result, self.tracked(), || IdentityBackward::new(self.next_fn()))
    }

    /// Multiplies every element by a constant.
    #[must_use]
    pub fn mul_scalar(&self, scalar: f32) -> Variable {
        let result = self.data.read().mapv(|x| x * scalar);
        Self::record(result, self.tracked(), || ScaleBackward::new(self.next_fn(), scalar))
    }

    /// Negation.
    #[must_use]
    pub fn neg_var(&self) -> Variable {
        self.mul_scalar(-1.0)
    }

    // =========================================================================
    // Element-wise Functions
    // =========================================================================

    /// Absolute value.
    #[must_use]
    pub fn abs(&self) -> Variable {
        let input = self.data();
        let result = input.mapv(f32::abs);
        Self::record(result, self.tracked(), || AbsBackward::new(self.next_fn(), input))
    }

    /// Natural logarithm.
    #[must_use]
    pub fn log(&self) -> Variable {
        let input = self.data();
        let result = input.mapv(f32::ln);
        Self::record(result, self.tracked(), || LogBackward::new(self.next_fn(), input))
    }

    /// Exponential.
    #[must_use]
    pub fn exp(&self) -> Variable {
        let result = self.data.read().mapv(f32::exp);
        let saved = result.clone();
        Self::record(result, self.tracked(), || ExpBackward::new(self.next_fn(), saved))
    }

    /// `ReLU` activation.
    #[must_use]
    pub fn relu(&self) -> Variable {
        let input = self.data();
        let result = input.mapv(|x| x.max(0.0));
        Self::record(result, self.tracked(), || ReluBackward::new(self.next_fn(), input))
    }

    /// Softplus activation, `ln(1 + e^x)`.
    #[must_use]
    pub fn softplus(&self) -> Variable {
        let input = self.data();
        let result = input.mapv(stable_softplus);
        Self::record(result, self.tracked(), || SoftplusBackward::new(self.next_fn(), input))
    }

    /// Hyperbolic tangent.
    #[must_use]
    pub fn tanh(&self) -> Variable {
        let result = self.data.read().mapv(f32::tanh);
        let saved = result.clone();
        Self::record(result, self.tracked(), || TanhBackward::new(self.next_fn(), saved))
    }

    /// Logistic sigmoid.
    #[must_use]
    pub fn sigmoid(&self) -> Variable {
        let result = self.data.read().mapv(stable_sigmoid);
        let saved = result.clone();
        Self::record(result, self.tracked(), || SigmoidBackward::new(self.next_fn(), saved))
    }

    /// Complementary error function, evaluated in double precision.
    #[must_use]
    pub fn erfc(&self) -> Variable {
        let input = self.data();
        let result = input.mapv(|x| libm::erfc(f64::from(x)) as f32);
        Self::record(result, self.tracked(), || ErfcBackward::new(self.next_fn(), input))
    }

    /// Clamps every element into `[min, max]`.
    #[must_use]
    pub fn clamp(&self, min: f32, max: f32) -> Variable {
        let input = self.data();
        let result = input.mapv(|x| x.max(min).min(max));
        Self::record(result, self.tracked(), || {
            ClampBackward::new(self.next_fn(), input, min, max)
        })
    }

    /// Clamps every element to at least `min`.
    #[must_use]
    pub fn clamp_min(&self, min: f32) -> Variable {
        self.clamp(min, f32::INFINITY)
    }

    // =========================================================================
    // Non-differentiable Functions
    // =========================================================================

    /// Rounds to the nearest integer, ties to even.
    ///
    /// Rounding has zero gradient almost everywhere, so the result is
    /// returned without history.
    #[must_use]
    pub fn round(&self) -> Variable {
        Self::from_array(self.data.read().mapv(f32::round_ties_even))
    }

    /// Largest integer not greater than each element. Untracked.
    #[must_use]
    pub fn floor(&self) -> Variable {
        Self::from_array(self.data.read().mapv(f32::floor))
    }

    /// Sign of each element (`-1`, `0` or `1`). Untracked.
    #[must_use]
    pub fn sign(&self) -> Variable {
        Self::from_array(self.data.read().mapv(|x| {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            }
        }))
    }

    // =========================================================================
    // Reduction Operations
    // =========================================================================

    /// Sum of all elements as a 0-dimensional variable.
    #[must_use]
    pub fn sum(&self) -> Variable {
        let total = self.data.read().sum();
        let result = ArrayD::from_elem(IxDyn(&[]), total);
        Self::record(result, self.tracked(), || SumBackward::new(self.next_fn(), self.shape()))
    }

    // =========================================================================
    // Shape Operations
    // =========================================================================

    /// Reshapes into `shape`, reading elements in row-major order.
    pub fn reshape(&self, shape: &[usize]) -> Result<Variable> {
        let expected: usize = shape.iter().product();
        if expected != self.numel() {
            return Err(AutogradError::shape_mismatch(shape, &self.shape()));
        }
        let result = reshape_standard(&self.data.read(), shape);
        Ok(Self::record(result, self.tracked(), || {
            ReshapeBackward::new(self.next_fn(), self.shape())
        }))
    }

    /// Reorders axes so that output axis `i` is input axis `axes[i]`.
    pub fn permute(&self, axes: &[usize]) -> Result<Variable> {
        let ndim = self.ndim();
        let mut seen = vec![false; ndim];
        if axes.len() != ndim {
            return Err(AutogradError::invalid_dimension("permute", ndim, axes.len()));
        }
        for &axis in axes {
            if axis >= ndim || seen[axis] {
                return Err(AutogradError::invalid_operation(format!(
                    "{axes:?} is not a permutation of {ndim} axes"
                )));
            }
            seen[axis] = true;
        }

        let result = self
            .data
            .read()
            .view()
            .permuted_axes(IxDyn(axes))
            .as_standard_layout()
            .into_owned();
        Ok(Self::record(result, self.tracked(), || {
            PermuteBackward::new(self.next_fn(), axes)
        }))
    }

    // =========================================================================
    // Linear Algebra
    // =========================================================================

    /// Batched matrix multiplication, (B, M, K) x (B, K, N) -> (B, M, N).
    pub fn bmm(&self, other: &Variable) -> Result<Variable> {
        let lhs = self
            .data()
            .into_dimensionality::<Ix3>()
            .map_err(|_| AutogradError::invalid_dimension("bmm", 3, self.ndim()))?;
        let rhs = other
            .data()
            .into_dimensionality::<Ix3>()
            .map_err(|_| AutogradError::invalid_dimension("bmm", 3, other.ndim()))?;

        let (lb, _, lk) = lhs.dim();
        let (rb, rk, _) = rhs.dim();
        if lb != rb || lk != rk {
            return Err(AutogradError::shape_mismatch(lhs.shape(), rhs.shape()));
        }

        let result = batched_matmul(lhs.view(), rhs.view()).into_dyn();
        Ok(Self::record(result, self.tracked() || other.tracked(), || {
            BmmBackward::new(self.next_fn(), other.next_fn(), lhs, rhs)
        }))
    }

    // =========================================================================
    // Spatial Operations
    // =========================================================================

    /// 2D cross-correlation of an (N, C_in, H, W) input with an
    /// (C_out, C_in, kH, kW) weight and optional (C_out) bias.
    pub fn conv2d(
        &self,
        weight: &Variable,
        bias: Option<&Variable>,
        stride: usize,
        padding: usize,
    ) -> Result<Variable> {
        if stride == 0 {
            return Err(AutogradError::invalid_operation("conv2d stride must be positive"));
        }
        let input = self
            .data()
            .into_dimensionality::<Ix4>()
            .map_err(|_| AutogradError::invalid_dimension("conv2d", 4, self.ndim()))?;
        let kernel = weight
            .data()
            .into_dimensionality::<Ix4>()
            .map_err(|_| AutogradError::invalid_dimension("conv2d weight", 4, weight.ndim()))?;

        let (_, in_channels, height, width) = input.dim();
        let (out_channels, kernel_channels, kh, kw) = kernel.dim();
        if in_channels != kernel_channels {
            return Err(AutogradError::shape_mismatch(
                &[out_channels, in_channels, kh, kw],
                kernel.shape(),
            ));
        }
        if height + 2 * padding < kh || width + 2 * padding < kw {
            return Err(AutogradError::invalid_operation(format!(
                "kernel {kh}x{kw} larger than padded input {height}x{width} (padding {padding})"
            )));
        }

        let bias_data: Option<Array1<f32>> = match bias {
            Some(b) => {
                let data = b
                    .data()
                    .into_dimensionality::<Ix1>()
                    .map_err(|_| AutogradError::invalid_dimension("conv2d bias", 1, b.ndim()))?;
                if data.len() != out_channels {
                    return Err(AutogradError::shape_mismatch(&[out_channels], data.shape()));
                }
                Some(data)
            }
            None => None,
        };

        let result = conv2d_forward(
            input.view(),
            kernel.view(),
            bias_data.as_ref().map(|b| b.view()),
            stride,
            padding,
        )
        .into_dyn();

        let bias_tracked = bias.is_some_and(Variable::tracked);
        let track = self.tracked() || weight.tracked() || bias_tracked;
        Ok(Self::record(result, track, || {
            Conv2dBackward::new(
                [self.next_fn(), weight.next_fn(), bias.and_then(Variable::next_fn)],
                input,
                kernel,
                bias.is_some(),
                stride,
                padding,
            )
        }))
    }

    /// Nearest-neighbour upsampling of an (N, C, H, W) variable by `factor`.
    pub fn upsample_nearest(&self, factor: usize) -> Result<Variable> {
        if factor == 0 {
            return Err(AutogradError::invalid_operation("upsample factor must be positive"));
        }
        let input = self
            .data()
            .into_dimensionality::<Ix4>()
            .map_err(|_| AutogradError::invalid_dimension("upsample", 4, self.ndim()))?;
        let input_dim = input.dim();
        let result = upsample_nearest_forward(input.view(), factor).into_dyn();
        Ok(Self::record(result, self.tracked(), || {
            UpsampleNearestBackward::new(self.next_fn(), input_dim, factor)
        }))
    }
}

// =============================================================================
// Operator Overloads
// =============================================================================

impl Neg for &Variable {
    type Output = Variable;

    fn neg(self) -> Variable {
        self.neg_var()
    }
}

impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("shape", &self.shape())
            .field("requires_grad", &self.requires_grad)
            .field("is_leaf", &self.is_leaf)
            .field("grad_fn", &self.grad_fn.as_ref().map(GradFn::name))
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
