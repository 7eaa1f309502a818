//! Binary elementwise operations with backward pass.

use crate::autodiff::graph::GradFn;
use crate::error::TapeError;
use crate::operations::{apply, apply_binary, sum_to_shape};
use crate::scalar::Scalar;
use crate::tensor::Tensor;
use smallvec::{SmallVec, smallvec};

/// Backward function for `a + b`.
#[derive(Debug)]
pub(crate) struct AddBackward {
    lhs_shape: Vec<usize>,
    rhs_shape: Vec<usize>,
}

impl AddBackward {
    pub(crate) fn new<T: Scalar>(lhs: &Tensor<T>, rhs: &Tensor<T>) -> Self {
        Self {
            lhs_shape: lhs.shape().to_vec(),
            rhs_shape: rhs.shape().to_vec(),
        }
    }
}

impl<T: Scalar> GradFn<T> for AddBackward {
    fn backward(&self, grad_output: &Tensor<T>) -> Result<SmallVec<[Tensor<T>; 2]>, TapeError> {
        Ok(smallvec![
            sum_to_shape(grad_output, &self.lhs_shape)?,
            sum_to_shape(grad_output, &self.rhs_shape)?,
        ])
    }
}

/// Backward function for `a - b`.
#[derive(Debug)]
pub(crate) struct SubBackward {
    lhs_shape: Vec<usize>,
    rhs_shape: Vec<usize>,
}

impl SubBackward {
    pub(crate) fn new<T: Scalar>(lhs: &Tensor<T>, rhs: &Tensor<T>) -> Self {
        Self {
            lhs_shape: lhs.shape().to_vec(),
            rhs_shape: rhs.shape().to_vec(),
        }
    }
}

impl<T: Scalar> GradFn<T> for SubBackward {
    fn backward(&self, grad_output: &Tensor<T>) -> Result<SmallVec<[Tensor<T>; 2]>, TapeError> {
        let negated = apply(grad_output, |g| -g);
        Ok(smallvec![
            sum_to_shape(grad_output, &self.lhs_shape)?,
            sum_to_shape(&negated, &self.rhs_shape)?,
        ])
    }
}

/// Backward function for `a * b`.
#[derive(Debug)]
pub(crate) struct MulBackward<T: Scalar> {
    lhs: Tensor<T>,
    rhs: Tensor<T>,
}

impl<T: Scalar> MulBackward<T> {
    pub(crate) fn new(lhs: &Tensor<T>, rhs: &Tensor<T>) -> Self {
        Self {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        }
    }
}

impl<T: Scalar> GradFn<T> for MulBackward<T> {
    fn backward(&self, grad_output: &Tensor<T>) -> Result<SmallVec<[Tensor<T>; 2]>, TapeError> {
        // ∂L/∂a = ∂L/∂out * b, ∂L/∂b = ∂L/∂out * a
        let grad_a = apply_binary(grad_output, &self.rhs, |g, b| g * b)?;
        let grad_b = apply_binary(grad_output, &self.lhs, |g, a| g * a)?;
        Ok(smallvec![
            sum_to_shape(&grad_a, self.lhs.shape())?,
            sum_to_shape(&grad_b, self.rhs.shape())?,
        ])
    }
}

/// Backward function for `a / b`.
#[derive(Debug)]
pub(crate) struct DivBackward<T: Scalar> {
    lhs: Tensor<T>,
    rhs: Tensor<T>,
}

impl<T: Scalar> DivBackward<T> {
    pub(crate) fn new(lhs: &Tensor<T>, rhs: &Tensor<T>) -> Self {
        Self {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        }
    }
}

impl<T: Scalar> GradFn<T> for DivBackward<T> {
    fn backward(&self, grad_output: &Tensor<T>) -> Result<SmallVec<[Tensor<T>; 2]>, TapeError> {
        // ∂L/∂a = g / b, ∂L/∂b = -g * a / b²
        let grad_a = apply_binary(grad_output, &self.rhs, |g, b| g / b)?;
        let a_over_b2 = apply_binary(&self.lhs, &self.rhs, |a, b| a / (b * b))?;
        let grad_b = apply_binary(grad_output, &a_over_b2, |g, q| -g * q)?;
        Ok(smallvec![
            sum_to_shape(&grad_a, self.lhs.shape())?,
            sum_to_shape(&grad_b, self.rhs.shape())?,
        ])
    }
}
