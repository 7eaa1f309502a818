//! Tensor operations.
//!
//! Plain, unrecorded arithmetic on [`Tensor`](crate::Tensor) values. The
//! recorded versions live in [`autodiff`](crate::autodiff) and are built on
//! top of these.

mod elementwise;

pub use elementwise::{apply, apply_binary, broadcast_shape, scale, sum_to_shape};
