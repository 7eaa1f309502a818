//! Scalar trait for tensor element types.

use num_traits::Float;
use std::fmt::Debug;

/// Trait for scalar types supported by gradtape.
///
/// This wraps `num_traits::Float` with the extra bounds the tape needs
/// to store values inside recorded nodes.
pub trait Scalar: Float + Debug + Default + 'static {
    /// Convert an `f64` constant into this scalar type.
    fn from_f64(value: f64) -> Self;
}

impl Scalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }
}

impl Scalar for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}
