//! Gradient storage container.

use super::value::ValueId;
use crate::error::TapeError;
use crate::operations::apply_binary;
use crate::scalar::Scalar;
use crate::tensor::Tensor;
use std::collections::HashMap;

/// Container for accumulated gradients.
///
/// Stores gradients keyed by ValueId, with in-place accumulation
/// for values with multiple downstream paths.
#[derive(Debug)]
pub(crate) struct Gradients<T: Scalar> {
    grads: HashMap<ValueId, Tensor<T>>,
}

impl<T: Scalar> Gradients<T> {
    /// Create empty gradient container.
    pub(crate) fn new() -> Self {
        Self {
            grads: HashMap::new(),
        }
    }

    /// Accumulate gradient for a value.
    ///
    /// If gradient already exists, adds to it (for multiple paths).
    ///
    /// # Errors
    ///
    /// Returns `TapeError::IncompatibleShapes` if the shapes cannot be summed.
    pub(crate) fn accumulate(&mut self, id: ValueId, grad: Tensor<T>) -> Result<(), TapeError> {
        if let Some(existing) = self.grads.get_mut(&id) {
            *existing = apply_binary(existing, &grad, |a, b| a + b)?;
        } else {
            self.grads.insert(id, grad);
        }
        Ok(())
    }

    /// Get gradient for a value.
    pub(crate) fn get(&self, id: ValueId) -> Option<&Tensor<T>> {
        self.grads.get(&id)
    }
}
