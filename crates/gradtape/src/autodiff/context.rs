//! Recording context: value identities and the stack of open tapes.

use super::graph::{GradFn, Node, OpKind, TapeId};
use super::ops::{
    AddBackward, DivBackward, MulBackward, PowBackward, SubBackward, SumBackward, UnaryBackward,
    UnaryOp,
};
use super::options::TapeOptions;
use super::tape::Tape;
use super::value::{TrackedValue, ValueId, ValueKind};
use crate::error::TapeError;
use crate::operations::{apply, apply_binary};
use crate::scalar::Scalar;
use crate::tensor::Tensor;
use smallvec::SmallVec;
use std::rc::Rc;

/// Owner of the active-tape stack.
///
/// Every tracked value is created through a context, and every recorded
/// operation goes through one. Independent contexts share no tapes, so
/// each test or thread can use its own. Value and tape ids are unique
/// across contexts: a value from another context is never mistaken for
/// one of this context's values.
///
/// Tapes opened on a context nest: an operation is recorded on every open
/// tape that tracks one of its operands, innermost first, and each tape
/// keeps its own node sequence.
///
/// # Example
///
/// ```
/// use gradtape::Tensor;
/// use gradtape::autodiff::{GradientContext, TapeOptions};
///
/// let mut ctx = GradientContext::new();
/// let x = ctx.constant(Tensor::from_slice(&[2.0]));
///
/// let (mut tape, f) = ctx
///     .record(TapeOptions::default(), |ctx, tape| {
///         ctx.watch(tape, &x).unwrap();
///         ctx.pow(&x, 2.0)
///     })
///     .unwrap();
///
/// let grad = tape.gradient(&f, &x).unwrap().unwrap();
/// assert_eq!(grad.data(), &[4.0]);
/// ```
#[derive(Debug)]
pub struct GradientContext<T: Scalar> {
    /// Open tapes, innermost last.
    stack: Vec<Tape<T>>,
    /// Depth of nested `stop_recording` calls.
    paused: usize,
}

impl<T: Scalar> GradientContext<T> {
    /// Create a context with no open tapes.
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            paused: 0,
        }
    }

    fn fresh(&self, kind: ValueKind, tensor: Tensor<T>) -> TrackedValue<T> {
        TrackedValue::new(ValueId::fresh(), kind, tensor)
    }

    /// Wrap a plain value. It is tracked only if explicitly watched.
    pub fn constant(&mut self, tensor: Tensor<T>) -> TrackedValue<T> {
        self.fresh(ValueKind::Constant, tensor)
    }

    /// Wrap a trainable value. Auto-watch tapes track it when it is read.
    pub fn variable(&mut self, tensor: Tensor<T>) -> TrackedValue<T> {
        self.fresh(ValueKind::Variable, tensor)
    }

    /// Begin a recording interval and return its id.
    pub fn open(&mut self, options: TapeOptions) -> TapeId {
        let id = TapeId::fresh();
        log::debug!(
            "{id}: opened at depth {} (persistent: {}, watch: {:?})",
            self.stack.len(),
            options.persistent,
            options.watch_policy
        );
        self.stack.push(Tape::recording(id, options));
        id
    }

    /// End the innermost recording interval and hand back its tape.
    ///
    /// # Errors
    ///
    /// Returns `TapeError::TapeNotOpen` if `tape` is not recording, and
    /// `TapeError::TapeNotInnermost` if tapes opened after it are still open.
    pub fn close(&mut self, tape: TapeId) -> Result<Tape<T>, TapeError> {
        match self.stack.last() {
            Some(top) if top.id() == tape => {}
            Some(top) if self.position(tape).is_some() => {
                return Err(TapeError::TapeNotInnermost {
                    tape,
                    innermost: top.id(),
                });
            }
            _ => return Err(TapeError::TapeNotOpen { tape }),
        }
        let mut closed = self.stack.pop().ok_or(TapeError::TapeNotOpen { tape })?;
        closed.close();
        Ok(closed)
    }

    /// Run `f` inside a fresh recording interval and close it afterwards.
    ///
    /// Tapes that `f` opened and left open are closed and dropped first.
    ///
    /// # Errors
    ///
    /// Returns `TapeError::TapeNotOpen` if `f` closed the interval itself.
    /// Tapes `f` opened after that are dropped too.
    pub fn record<R>(
        &mut self,
        options: TapeOptions,
        f: impl FnOnce(&mut Self, TapeId) -> R,
    ) -> Result<(Tape<T>, R), TapeError> {
        let depth = self.stack.len();
        let id = self.open(options);
        let result = f(self, id);

        if self.stack.get(depth).map(Tape::id) != Some(id) {
            if self.stack.len() > depth {
                log::warn!(
                    "{id}: closed inside its own recording, dropping {} tapes opened after it",
                    self.stack.len() - depth
                );
                self.stack.truncate(depth);
            }
            return Err(TapeError::TapeNotOpen { tape: id });
        }
        if self.stack.len() > depth + 1 {
            log::warn!(
                "{id}: dropping {} nested tapes left open",
                self.stack.len() - depth - 1
            );
            self.stack.truncate(depth + 1);
        }
        let tape = self.close(id)?;
        Ok((tape, result))
    }

    fn position(&self, tape: TapeId) -> Option<usize> {
        self.stack.iter().position(|t| t.id() == tape)
    }

    fn open_tape(&mut self, tape: TapeId) -> Result<&mut Tape<T>, TapeError> {
        self.stack
            .iter_mut()
            .find(|t| t.id() == tape)
            .ok_or(TapeError::TapeNotOpen { tape })
    }

    /// Mark `value` as a differentiation input of an open tape.
    ///
    /// Watching an already watched value does nothing.
    ///
    /// # Errors
    ///
    /// Returns `TapeError::TapeNotOpen` if `tape` is not recording.
    pub fn watch(&mut self, tape: TapeId, value: &TrackedValue<T>) -> Result<(), TapeError> {
        let open = self.open_tape(tape)?;
        if open.watch(value.id()) {
            log::trace!("{tape}: watching {}", value.id());
        }
        Ok(())
    }

    /// Discard everything an open tape has recorded so far.
    ///
    /// # Errors
    ///
    /// Returns `TapeError::TapeNotOpen` if `tape` is not recording.
    pub fn reset(&mut self, tape: TapeId) -> Result<(), TapeError> {
        self.open_tape(tape)?.reset();
        Ok(())
    }

    /// Run `f` with recording paused on every open tape.
    ///
    /// Recording resumes when `f` returns or unwinds.
    pub fn stop_recording<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.paused += 1;
        let mut guard = PauseGuard { ctx: self };
        f(&mut *guard.ctx)
    }

    /// Check if an operation run now would be recorded on some tape.
    pub fn is_recording(&self) -> bool {
        self.paused == 0 && !self.stack.is_empty()
    }

    /// Number of open tapes.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Wrap `value` as the output of `op` and record it on every open tape
    /// that tracks one of `operands`.
    fn record_op(
        &mut self,
        op: OpKind,
        operands: &[&TrackedValue<T>],
        value: Tensor<T>,
        grad_fn: impl FnOnce() -> Rc<dyn GradFn<T>>,
    ) -> TrackedValue<T> {
        let output = self.fresh(ValueKind::Computed, value);
        if !self.is_recording() {
            return output;
        }

        // Innermost first. Reading operands may auto-watch them.
        let mut recorders: SmallVec<[(usize, SmallVec<[Option<ValueId>; 2]>); 2]> =
            SmallVec::new();
        for (index, tape) in self.stack.iter_mut().enumerate().rev() {
            let inputs: SmallVec<[Option<ValueId>; 2]> =
                operands.iter().map(|v| tape.track(v)).collect();
            if inputs.iter().any(Option::is_some) {
                recorders.push((index, inputs));
            }
        }
        if recorders.is_empty() {
            return output;
        }

        let grad_fn = grad_fn();
        let value = Rc::new(output.tensor().clone());
        for (index, inputs) in recorders {
            let node = Node::new(op, inputs, output.id(), value.clone(), grad_fn.clone());
            self.stack[index].push(node);
        }
        output
    }

    /// `x^n` for a constant exponent `n`.
    pub fn pow(&mut self, x: &TrackedValue<T>, n: T) -> TrackedValue<T> {
        let value = apply(x.tensor(), |v| v.powf(n));
        self.record_op(OpKind::Pow, &[x], value, || {
            Rc::new(PowBackward::new(x.tensor(), n))
        })
    }

    /// Elementwise `a + b`.
    ///
    /// # Errors
    ///
    /// Returns `TapeError::IncompatibleShapes` if the operands cannot be broadcast.
    pub fn add(
        &mut self,
        a: &TrackedValue<T>,
        b: &TrackedValue<T>,
    ) -> Result<TrackedValue<T>, TapeError> {
        let value = apply_binary(a.tensor(), b.tensor(), |x, y| x + y)?;
        Ok(self.record_op(OpKind::Add, &[a, b], value, || {
            Rc::new(AddBackward::new(a.tensor(), b.tensor()))
        }))
    }

    /// Elementwise `a - b`.
    ///
    /// # Errors
    ///
    /// Returns `TapeError::IncompatibleShapes` if the operands cannot be broadcast.
    pub fn sub(
        &mut self,
        a: &TrackedValue<T>,
        b: &TrackedValue<T>,
    ) -> Result<TrackedValue<T>, TapeError> {
        let value = apply_binary(a.tensor(), b.tensor(), |x, y| x - y)?;
        Ok(self.record_op(OpKind::Sub, &[a, b], value, || {
            Rc::new(SubBackward::new(a.tensor(), b.tensor()))
        }))
    }

    /// Elementwise `a * b`.
    ///
    /// # Errors
    ///
    /// Returns `TapeError::IncompatibleShapes` if the operands cannot be broadcast.
    pub fn mul(
        &mut self,
        a: &TrackedValue<T>,
        b: &TrackedValue<T>,
    ) -> Result<TrackedValue<T>, TapeError> {
        let value = apply_binary(a.tensor(), b.tensor(), |x, y| x * y)?;
        Ok(self.record_op(OpKind::Mul, &[a, b], value, || {
            Rc::new(MulBackward::new(a.tensor(), b.tensor()))
        }))
    }

    /// Elementwise `a / b`.
    ///
    /// # Errors
    ///
    /// Returns `TapeError::IncompatibleShapes` if the operands cannot be broadcast.
    pub fn div(
        &mut self,
        a: &TrackedValue<T>,
        b: &TrackedValue<T>,
    ) -> Result<TrackedValue<T>, TapeError> {
        let value = apply_binary(a.tensor(), b.tensor(), |x, y| x / y)?;
        Ok(self.record_op(OpKind::Div, &[a, b], value, || {
            Rc::new(DivBackward::new(a.tensor(), b.tensor()))
        }))
    }

    fn unary(&mut self, op: UnaryOp, x: &TrackedValue<T>, f: impl Fn(T) -> T) -> TrackedValue<T> {
        let value = apply(x.tensor(), f);
        let saved = value.clone();
        self.record_op(op.kind(), &[x], value, || {
            Rc::new(UnaryBackward::new(op, x.tensor(), &saved))
        })
    }

    /// Elementwise `-x`.
    pub fn neg(&mut self, x: &TrackedValue<T>) -> TrackedValue<T> {
        self.unary(UnaryOp::Neg, x, |v| -v)
    }

    /// Elementwise `e^x`.
    pub fn exp(&mut self, x: &TrackedValue<T>) -> TrackedValue<T> {
        self.unary(UnaryOp::Exp, x, T::exp)
    }

    /// Elementwise natural logarithm.
    pub fn ln(&mut self, x: &TrackedValue<T>) -> TrackedValue<T> {
        self.unary(UnaryOp::Ln, x, T::ln)
    }

    /// Elementwise sine.
    pub fn sin(&mut self, x: &TrackedValue<T>) -> TrackedValue<T> {
        self.unary(UnaryOp::Sin, x, T::sin)
    }

    /// Elementwise cosine.
    pub fn cos(&mut self, x: &TrackedValue<T>) -> TrackedValue<T> {
        self.unary(UnaryOp::Cos, x, T::cos)
    }

    /// Elementwise square root.
    pub fn sqrt(&mut self, x: &TrackedValue<T>) -> TrackedValue<T> {
        self.unary(UnaryOp::Sqrt, x, T::sqrt)
    }

    /// Sum of all elements, as a scalar.
    pub fn sum(&mut self, x: &TrackedValue<T>) -> TrackedValue<T> {
        let value = Tensor::scalar(x.tensor().sum());
        self.record_op(OpKind::Sum, &[x], value, || {
            Rc::new(SumBackward::new(x.tensor()))
        })
    }
}

/// Lifts one level of `stop_recording` when dropped.
struct PauseGuard<'a, T: Scalar> {
    ctx: &'a mut GradientContext<T>,
}

impl<T: Scalar> Drop for PauseGuard<'_, T> {
    fn drop(&mut self) {
        self.ctx.paused -= 1;
    }
}

impl<T: Scalar> Default for GradientContext<T> {
    fn default() -> Self {
        Self::new()
    }
}
