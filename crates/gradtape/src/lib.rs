//! gradtape - gradient-tape automatic differentiation
//!
//! This crate records elementary operations on tensors during a scoped
//! recording interval and computes gradients by replaying the recording in
//! reverse.
//!
//! # Architecture
//!
//! ```text
//! Level 1: Recording API (autodiff module)
//!     → GradientContext, Tape, TrackedValue
//!
//! Level 2: Backward rules (autodiff::ops)
//!     → one GradFn per elementary operation
//!
//! Level 3: Numeric substrate (tensor, operations)
//!     → dense Tensor, elementwise arithmetic with scalar broadcasting
//! ```
//!
//! # Example
//!
//! The three ways a value can take part in differentiation:
//!
//! ```
//! use gradtape::Tensor;
//! use gradtape::autodiff::{GradientContext, TapeOptions};
//!
//! let mut ctx = GradientContext::new();
//! let opts = TapeOptions::default();
//!
//! // A plain constant is not tracked: no gradient.
//! let x = ctx.constant(Tensor::from_slice(&[2.0]));
//! let (mut tape, f) = ctx.record(opts, |ctx, _| ctx.pow(&x, 2.0)).unwrap();
//! assert!(tape.gradient(&f, &x).unwrap().is_none());
//!
//! // A variable is watched automatically.
//! let v = ctx.variable(Tensor::from_slice(&[2.0]));
//! let (mut tape, f) = ctx.record(opts, |ctx, _| ctx.pow(&v, 2.0)).unwrap();
//! assert_eq!(tape.gradient(&f, &v).unwrap().unwrap().data(), &[4.0]);
//!
//! // A constant passed to `watch` is tracked too.
//! let (mut tape, f) = ctx
//!     .record(opts, |ctx, id| {
//!         ctx.watch(id, &x).unwrap();
//!         ctx.pow(&x, 2.0)
//!     })
//!     .unwrap();
//! assert_eq!(tape.gradient(&f, &x).unwrap().unwrap().data(), &[4.0]);
//! ```

pub mod autodiff;
pub mod error;
pub mod operations;
pub mod scalar;
pub mod tensor;

pub use autodiff::{GradientContext, Tape, TapeOptions, TrackedValue, WatchPolicy};
pub use error::TapeError;
pub use scalar::Scalar;
pub use tensor::Tensor;
