//! TrackedValue - a tensor with an identity the tape can refer to.

use crate::scalar::Scalar;
use crate::tensor::Tensor;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VALUE_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identifier of a tracked value.
///
/// Ids are drawn from a process-wide counter, so values created by
/// different contexts never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u64);

impl ValueId {
    pub(crate) fn fresh() -> Self {
        Self(NEXT_VALUE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn new(index: u64) -> Self {
        Self(index)
    }

    /// Get the internal index.
    pub fn index(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// How a tracked value came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Plain value; tracked only if explicitly watched.
    Constant,
    /// Trainable value; auto-watched by tapes with [`WatchPolicy::Auto`].
    ///
    /// [`WatchPolicy::Auto`]: super::WatchPolicy::Auto
    Variable,
    /// Result of an elementary operation.
    Computed,
}

/// A tensor with an identity, created through a [`GradientContext`].
///
/// Tapes never own tracked values; they refer to them by [`ValueId`].
/// Cloning a tracked value keeps its identity.
///
/// [`GradientContext`]: super::GradientContext
#[derive(Debug, Clone)]
pub struct TrackedValue<T: Scalar> {
    id: ValueId,
    kind: ValueKind,
    tensor: Tensor<T>,
}

impl<T: Scalar> TrackedValue<T> {
    pub(crate) fn new(id: ValueId, kind: ValueKind, tensor: Tensor<T>) -> Self {
        Self { id, kind, tensor }
    }

    /// Identity of this value.
    pub fn id(&self) -> ValueId {
        self.id
    }

    /// Kind of this value.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Check if this value is a variable.
    pub fn is_variable(&self) -> bool {
        self.kind == ValueKind::Variable
    }

    /// Get the underlying tensor.
    pub fn tensor(&self) -> &Tensor<T> {
        &self.tensor
    }

    /// Consume and return the underlying tensor.
    pub fn into_tensor(self) -> Tensor<T> {
        self.tensor
    }

    /// Get shape.
    pub fn shape(&self) -> &[usize] {
        self.tensor.shape()
    }

    /// Get total number of elements.
    pub fn len(&self) -> usize {
        self.tensor.len()
    }

    /// Check if the value is empty.
    pub fn is_empty(&self) -> bool {
        self.tensor.is_empty()
    }

    /// Get data slice.
    pub fn data(&self) -> &[T] {
        self.tensor.data()
    }

    /// The single element of a one-element value.
    pub fn item(&self) -> Option<T> {
        self.tensor.item()
    }
}
