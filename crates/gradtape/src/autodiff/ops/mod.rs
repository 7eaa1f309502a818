//! Backward rules for the elementary operations the tape records.
//!
//! Forward values are computed by [`operations`](crate::operations); the
//! structs here save whatever the local derivative needs and map an
//! upstream gradient to one gradient per operand.

mod binary;
mod unary;

pub(crate) use binary::{AddBackward, DivBackward, MulBackward, SubBackward};
pub(crate) use unary::{PowBackward, SumBackward, UnaryBackward, UnaryOp};
