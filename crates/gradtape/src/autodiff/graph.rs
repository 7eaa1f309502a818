//! Recorded operations: nodes and their backward rules.

use super::value::ValueId;
use crate::error::TapeError;
use crate::scalar::Scalar;
use crate::tensor::Tensor;
use smallvec::SmallVec;
use std::fmt::{self, Debug};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TAPE_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identifier of a tape, drawn from a process-wide counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TapeId(u64);

impl TapeId {
    pub(crate) fn fresh() -> Self {
        Self(NEXT_TAPE_ID.fetch_add(1, Ordering::Relaxed))
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

impl fmt::Display for TapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tape #{}", self.0)
    }
}

/// Elementary operation kinds the tape can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Pow,
    Exp,
    Ln,
    Sin,
    Cos,
    Sqrt,
    Sum,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Add => "add",
            OpKind::Sub => "sub",
            OpKind::Mul => "mul",
            OpKind::Div => "div",
            OpKind::Neg => "neg",
            OpKind::Pow => "pow",
            OpKind::Exp => "exp",
            OpKind::Ln => "ln",
            OpKind::Sin => "sin",
            OpKind::Cos => "cos",
            OpKind::Sqrt => "sqrt",
            OpKind::Sum => "sum",
        };
        f.write_str(name)
    }
}

/// Backward function trait.
///
/// Computes gradients with respect to inputs given gradient of output.
/// Each operation (pow, add, etc.) implements this trait.
pub trait GradFn<T: Scalar>: Debug {
    /// Compute VJP: given grad_output, return one gradient per operand,
    /// in operand order, each shaped like its operand.
    fn backward(&self, grad_output: &Tensor<T>) -> Result<SmallVec<[Tensor<T>; 2]>, TapeError>;
}

/// One recorded elementary operation.
///
/// Operand slots hold `None` for operands the owning tape does not track;
/// no gradient flows into those.
#[derive(Debug)]
pub struct Node<T: Scalar> {
    op: OpKind,
    inputs: SmallVec<[Option<ValueId>; 2]>,
    output: ValueId,
    value: Rc<Tensor<T>>,
    grad_fn: Rc<dyn GradFn<T>>,
}

impl<T: Scalar> Node<T> {
    pub(crate) fn new(
        op: OpKind,
        inputs: SmallVec<[Option<ValueId>; 2]>,
        output: ValueId,
        value: Rc<Tensor<T>>,
        grad_fn: Rc<dyn GradFn<T>>,
    ) -> Self {
        Self {
            op,
            inputs,
            output,
            value,
            grad_fn,
        }
    }

    /// Operation kind.
    pub fn op(&self) -> OpKind {
        self.op
    }

    /// Operand ids, `None` where the operand is not tracked.
    pub fn inputs(&self) -> &[Option<ValueId>] {
        &self.inputs
    }

    /// Tracked operand ids.
    pub fn tracked_inputs(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.inputs.iter().flatten().copied()
    }

    /// Id of the value this node produced.
    pub fn output(&self) -> ValueId {
        self.output
    }

    /// The value this node produced.
    pub fn value(&self) -> &Tensor<T> {
        &self.value
    }

    /// Get backward function reference.
    pub fn grad_fn(&self) -> &dyn GradFn<T> {
        self.grad_fn.as_ref()
    }
}
