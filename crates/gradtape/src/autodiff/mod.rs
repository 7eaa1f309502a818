//! Gradient-tape reverse-mode automatic differentiation.
//!
//! Operations on tracked values are recorded on every open tape that tracks
//! one of their operands. After the recording interval closes, the tape
//! answers gradient queries by walking its nodes in reverse.
//!
//! # Architecture
//!
//! ```text
//! GradientContext ──owns──► stack of open Tape (innermost last)
//!        │                          │
//!        ▼                          ▼
//!   TrackedValue (ValueId)     Vec<Node<T>>  ──►  GradFn (Rc, shared
//!        │                          │             across nested tapes)
//!        ▼                          ▼
//!     Tensor<T>              reverse sweep ──► Gradients (summed per path)
//! ```
//!
//! # Example
//!
//! ```
//! use gradtape::Tensor;
//! use gradtape::autodiff::{GradientContext, TapeOptions};
//!
//! let mut ctx = GradientContext::new();
//! let x = ctx.variable(Tensor::from_slice(&[2.0]));
//!
//! let tape_id = ctx.open(TapeOptions::persistent_tape());
//! let f = ctx.pow(&x, 2.0);
//! let h = ctx.pow(&x, 3.0);
//! let mut tape = ctx.close(tape_id).unwrap();
//!
//! assert_eq!(tape.gradient(&f, &x).unwrap().unwrap().data(), &[4.0]);
//! assert_eq!(tape.gradient(&h, &x).unwrap().unwrap().data(), &[12.0]);
//! tape.dispose();
//! ```
//!
//! # Key Types
//!
//! - [`GradientContext`]: creates tracked values, opens and closes tapes, runs operations
//! - [`TrackedValue`]: tensor with an identity; constant, variable or computed
//! - [`Tape`]: recorded nodes of one interval; answers gradient queries
//! - [`TapeOptions`]: persistence and [`WatchPolicy`]
//! - [`TapeGraph`]: petgraph / DOT export of a tape
//!
//! # Design Notes
//!
//! - No global state; the active-tape stack is a field of the context
//! - Single-threaded (`Rc`, no `Arc`)
//! - "No gradient" is `Ok(None)`, never a zero tensor

mod backward;
mod context;
mod dot;
mod gradients;
mod graph;
mod ops;
mod options;
mod tape;
mod value;

pub use context::GradientContext;
pub use dot::{Edge, TapeGraph, Vertex};
pub use graph::{GradFn, Node, OpKind, TapeId};
pub use options::{TapeOptions, WatchPolicy};
pub use tape::Tape;
pub use value::{TrackedValue, ValueId, ValueKind};
