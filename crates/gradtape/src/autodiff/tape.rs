//! Gradient tape: the recorded graph of one recording interval.

use super::backward::reverse_accumulate;
use super::graph::{Node, TapeId};
use super::options::{TapeOptions, WatchPolicy};
use super::value::{TrackedValue, ValueId};
use crate::error::TapeError;
use crate::scalar::Scalar;
use crate::tensor::Tensor;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TapeState {
    Recording,
    Closed,
    Exhausted,
}

/// The recorded operations of one recording interval.
///
/// While open, a tape lives inside its [`GradientContext`] and is appended to
/// by every operation that reads a value it tracks. Closing the interval
/// hands the tape back to the caller, read-only, to answer gradient queries.
///
/// A non-persistent tape releases its nodes on the first query and rejects
/// later ones with [`TapeError::TapeExhausted`]. A persistent tape keeps them
/// until it is disposed or dropped.
///
/// [`GradientContext`]: super::GradientContext
#[derive(Debug)]
pub struct Tape<T: Scalar> {
    id: TapeId,
    options: TapeOptions,
    nodes: Vec<Node<T>>,
    watched: BTreeSet<ValueId>,
    /// Output id -> index of the producing node.
    producers: HashMap<ValueId, usize>,
    state: TapeState,
}

impl<T: Scalar> Tape<T> {
    pub(crate) fn recording(id: TapeId, options: TapeOptions) -> Self {
        Self {
            id,
            options,
            nodes: Vec::new(),
            watched: BTreeSet::new(),
            producers: HashMap::new(),
            state: TapeState::Recording,
        }
    }

    /// Identifier of this tape.
    pub fn id(&self) -> TapeId {
        self.id
    }

    /// Options the tape was opened with.
    pub fn options(&self) -> TapeOptions {
        self.options
    }

    /// Check if the tape survives gradient queries.
    pub fn is_persistent(&self) -> bool {
        self.options.persistent
    }

    /// Check if a non-persistent tape has been used up.
    pub fn is_exhausted(&self) -> bool {
        self.state == TapeState::Exhausted
    }

    /// Recorded nodes, in recording order.
    pub fn nodes(&self) -> &[Node<T>] {
        &self.nodes
    }

    /// Number of recorded nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids watched on this tape, explicitly or by auto-watch, in creation order.
    pub fn watched(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.watched.iter().copied()
    }

    /// Check if a value is a watched input of this tape.
    pub fn is_watched(&self, value: &TrackedValue<T>) -> bool {
        self.watched.contains(&value.id())
    }

    fn is_tracked(&self, id: ValueId) -> bool {
        self.watched.contains(&id) || self.producers.contains_key(&id)
    }

    /// Mark `id` as a differentiation input. Returns false if already watched.
    pub(crate) fn watch(&mut self, id: ValueId) -> bool {
        self.watched.insert(id)
    }

    /// Tracking status of an operand read by an operation.
    ///
    /// Under [`WatchPolicy::Auto`] reading a variable watches it.
    pub(crate) fn track(&mut self, value: &TrackedValue<T>) -> Option<ValueId> {
        let id = value.id();
        if self.is_tracked(id) {
            return Some(id);
        }
        if value.is_variable() && self.options.watch_policy == WatchPolicy::Auto {
            self.watched.insert(id);
            return Some(id);
        }
        None
    }

    pub(crate) fn push(&mut self, node: Node<T>) {
        log::trace!("{}: record {} -> {}", self.id, node.op(), node.output());
        self.producers.insert(node.output(), self.nodes.len());
        self.nodes.push(node);
    }

    /// Forget everything recorded so far, watched inputs included.
    pub(crate) fn reset(&mut self) {
        log::debug!("{}: reset, dropping {} nodes", self.id, self.nodes.len());
        self.release();
        self.watched.clear();
    }

    pub(crate) fn close(&mut self) {
        self.state = TapeState::Closed;
        log::debug!(
            "{}: closed with {} nodes, {} watched",
            self.id,
            self.nodes.len(),
            self.watched.len()
        );
    }

    fn release(&mut self) {
        self.nodes.clear();
        self.producers.clear();
    }

    /// Gradient of `output` with respect to `input`.
    ///
    /// The upstream gradient is seeded with ones shaped like `output`, so for a
    /// non-scalar output this is the gradient of the sum of its elements.
    ///
    /// Returns `Ok(None)` if `input` was never watched on this tape or no
    /// recorded chain of operations connects it to `output`. Contributions
    /// from every path are summed.
    ///
    /// # Errors
    ///
    /// Returns `TapeError::TapeExhausted` on a second query against a
    /// non-persistent tape.
    ///
    /// # Example
    ///
    /// ```
    /// use gradtape::Tensor;
    /// use gradtape::autodiff::{GradientContext, TapeOptions};
    ///
    /// let mut ctx = GradientContext::new();
    /// let x = ctx.variable(Tensor::from_slice(&[2.0]));
    ///
    /// let tape_id = ctx.open(TapeOptions::default());
    /// let f = ctx.pow(&x, 3.0);
    /// let mut tape = ctx.close(tape_id).unwrap();
    ///
    /// let grad = tape.gradient(&f, &x).unwrap().unwrap();
    /// assert_eq!(grad.data(), &[12.0]);
    /// assert!(tape.gradient(&f, &x).is_err());
    /// ```
    pub fn gradient(
        &mut self,
        output: &TrackedValue<T>,
        input: &TrackedValue<T>,
    ) -> Result<Option<Tensor<T>>, TapeError> {
        let seed = Tensor::ones(output.shape());
        let mut grads = self.query(output.id(), &[input.id()], seed)?;
        Ok(grads.pop().flatten())
    }

    /// Gradient of `output` with respect to `input`, starting from `seed`
    /// instead of ones.
    ///
    /// # Errors
    ///
    /// Returns `TapeError::IncompatibleShapes` if `seed` is not shaped like
    /// `output`, and `TapeError::TapeExhausted` as [`Tape::gradient`] does.
    pub fn gradient_with_seed(
        &mut self,
        output: &TrackedValue<T>,
        input: &TrackedValue<T>,
        seed: Tensor<T>,
    ) -> Result<Option<Tensor<T>>, TapeError> {
        if seed.shape() != output.shape() {
            return Err(TapeError::IncompatibleShapes {
                lhs: seed.shape().to_vec(),
                rhs: output.shape().to_vec(),
            });
        }
        let mut grads = self.query(output.id(), &[input.id()], seed)?;
        Ok(grads.pop().flatten())
    }

    /// Gradients of `output` with respect to several inputs in one sweep.
    ///
    /// Counts as a single query against a non-persistent tape.
    pub fn gradients(
        &mut self,
        output: &TrackedValue<T>,
        inputs: &[&TrackedValue<T>],
    ) -> Result<Vec<Option<Tensor<T>>>, TapeError> {
        let sources: Vec<ValueId> = inputs.iter().map(|v| v.id()).collect();
        self.query(output.id(), &sources, Tensor::ones(output.shape()))
    }

    fn query(
        &mut self,
        output: ValueId,
        sources: &[ValueId],
        seed: Tensor<T>,
    ) -> Result<Vec<Option<Tensor<T>>>, TapeError> {
        if self.state == TapeState::Exhausted {
            return Err(TapeError::TapeExhausted { tape: self.id });
        }

        // Sources never tracked on this tape have no path to anything.
        let tracked: Vec<ValueId> = sources
            .iter()
            .copied()
            .filter(|&id| self.is_tracked(id))
            .collect();
        let result = if self.is_tracked(output) && !tracked.is_empty() {
            reverse_accumulate(&self.nodes, &self.producers, output, &tracked, seed)
        } else {
            Ok(vec![None; tracked.len()])
        };
        let result = result.map(|grads| {
            let mut grads = grads.into_iter();
            sources
                .iter()
                .map(|&id| {
                    if self.is_tracked(id) {
                        grads.next().flatten()
                    } else {
                        None
                    }
                })
                .collect()
        });

        log::debug!(
            "{}: gradient of {} w.r.t. {} inputs over {} nodes",
            self.id,
            output,
            sources.len(),
            self.nodes.len()
        );

        if !self.options.persistent {
            log::debug!("{}: released after first gradient query", self.id);
            self.release();
            self.state = TapeState::Exhausted;
        }
        result
    }

    /// Release a persistent tape's nodes.
    pub fn dispose(self) {
        log::debug!("{}: disposed with {} nodes", self.id, self.nodes.len());
    }
}
