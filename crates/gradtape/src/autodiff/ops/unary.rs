//! Unary operations with backward pass.

use crate::autodiff::graph::{GradFn, OpKind};
use crate::error::TapeError;
use crate::operations::{apply, apply_binary, sum_to_shape};
use crate::scalar::Scalar;
use crate::tensor::Tensor;
use smallvec::{SmallVec, smallvec};

/// Backward function for `x^n` with a constant exponent.
#[derive(Debug)]
pub(crate) struct PowBackward<T: Scalar> {
    input: Tensor<T>,
    exponent: T,
}

impl<T: Scalar> PowBackward<T> {
    pub(crate) fn new(input: &Tensor<T>, exponent: T) -> Self {
        Self {
            input: input.clone(),
            exponent,
        }
    }
}

impl<T: Scalar> GradFn<T> for PowBackward<T> {
    fn backward(&self, grad_output: &Tensor<T>) -> Result<SmallVec<[Tensor<T>; 2]>, TapeError> {
        // ∂L/∂x = g * n * x^(n-1)
        let n = self.exponent;
        let local = apply(&self.input, |x| n * x.powf(n - T::one()));
        Ok(smallvec![apply_binary(grad_output, &local, |g, d| g * d)?])
    }
}

/// Elementwise functions whose derivative depends only on the input `x`
/// and the output `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Exp,
    Ln,
    Sin,
    Cos,
    Sqrt,
}

impl UnaryOp {
    /// Kind recorded on the tape.
    pub(crate) fn kind(self) -> OpKind {
        match self {
            UnaryOp::Neg => OpKind::Neg,
            UnaryOp::Exp => OpKind::Exp,
            UnaryOp::Ln => OpKind::Ln,
            UnaryOp::Sin => OpKind::Sin,
            UnaryOp::Cos => OpKind::Cos,
            UnaryOp::Sqrt => OpKind::Sqrt,
        }
    }
}

/// Backward function for a [`UnaryOp`].
#[derive(Debug)]
pub(crate) struct UnaryBackward<T: Scalar> {
    op: UnaryOp,
    input: Tensor<T>,
    output: Tensor<T>,
}

impl<T: Scalar> UnaryBackward<T> {
    pub(crate) fn new(op: UnaryOp, input: &Tensor<T>, output: &Tensor<T>) -> Self {
        Self {
            op,
            input: input.clone(),
            output: output.clone(),
        }
    }

    fn derivative(&self, x: T, y: T) -> T {
        match self.op {
            UnaryOp::Neg => -T::one(),
            UnaryOp::Exp => y,
            UnaryOp::Ln => T::one() / x,
            UnaryOp::Sin => x.cos(),
            UnaryOp::Cos => -x.sin(),
            UnaryOp::Sqrt => T::one() / (T::from_f64(2.0) * y),
        }
    }
}

impl<T: Scalar> GradFn<T> for UnaryBackward<T> {
    fn backward(&self, grad_output: &Tensor<T>) -> Result<SmallVec<[Tensor<T>; 2]>, TapeError> {
        let local = apply_binary(&self.input, &self.output, |x, y| self.derivative(x, y))?;
        Ok(smallvec![apply_binary(grad_output, &local, |g, d| g * d)?])
    }
}

/// Backward function for the sum of all elements.
#[derive(Debug)]
pub(crate) struct SumBackward {
    input_shape: Vec<usize>,
}

impl SumBackward {
    pub(crate) fn new<T: Scalar>(input: &Tensor<T>) -> Self {
        Self {
            input_shape: input.shape().to_vec(),
        }
    }
}

impl<T: Scalar> GradFn<T> for SumBackward {
    fn backward(&self, grad_output: &Tensor<T>) -> Result<SmallVec<[Tensor<T>; 2]>, TapeError> {
        Ok(smallvec![sum_to_shape(grad_output, &self.input_shape)?])
    }
}
