//! Reverse sweep over a recorded tape.

use super::gradients::Gradients;
use super::graph::Node;
use super::value::ValueId;
use crate::error::TapeError;
use crate::scalar::Scalar;
use crate::tensor::Tensor;
use std::collections::{HashMap, HashSet, VecDeque};

/// Nodes and values reachable backwards from `output`.
#[derive(Debug, Default)]
pub(crate) struct Reachable {
    /// Node indices in reverse recording order.
    pub nodes: Vec<usize>,
    /// Every value id on some path into `output`, `output` included.
    pub values: HashSet<ValueId>,
}

/// Collect everything `output` depends on.
///
/// Breadth-first walk over operand ids, mapping each id to the node that
/// produced it on this tape. Leaves (watched inputs) have no producer.
pub(crate) fn reachable_from<T: Scalar>(
    nodes: &[Node<T>],
    producers: &HashMap<ValueId, usize>,
    output: ValueId,
) -> Reachable {
    let mut reachable = Reachable::default();
    let mut queue = VecDeque::new();
    queue.push_back(output);

    while let Some(id) = queue.pop_front() {
        if !reachable.values.insert(id) {
            continue;
        }
        if let Some(&index) = producers.get(&id) {
            reachable.nodes.push(index);
            for input in nodes[index].tracked_inputs() {
                if !reachable.values.contains(&input) {
                    queue.push_back(input);
                }
            }
        }
    }

    reachable.nodes.sort_unstable_by(|a, b| b.cmp(a));
    reachable
}

/// Reverse-mode accumulation from `output` into each of `sources`.
///
/// Returns one entry per source: `None` when no recorded chain of
/// operations connects the source to `output`.
///
/// # Errors
///
/// Propagates shape errors raised by backward rules.
pub(crate) fn reverse_accumulate<T: Scalar>(
    nodes: &[Node<T>],
    producers: &HashMap<ValueId, usize>,
    output: ValueId,
    sources: &[ValueId],
    seed: Tensor<T>,
) -> Result<Vec<Option<Tensor<T>>>, TapeError> {
    let reachable = reachable_from(nodes, producers, output);
    if !sources.iter().any(|s| reachable.values.contains(s)) {
        return Ok(vec![None; sources.len()]);
    }

    let mut gradients = Gradients::new();
    gradients.accumulate(output, seed)?;

    // Recording order is topological, so reverse order visits every
    // consumer of a value before the value's producer.
    for index in reachable.nodes {
        let node = &nodes[index];
        let grad_output = match gradients.get(node.output()) {
            Some(g) => g.clone(),
            None => continue, // No gradient flowing to this node
        };

        let input_grads = node.grad_fn().backward(&grad_output)?;
        for (input, grad) in node.inputs().iter().zip(input_grads) {
            if let Some(id) = input {
                gradients.accumulate(*id, grad)?;
            }
        }
        log::trace!("backward through {} -> {}", node.op(), node.output());
    }

    Ok(sources
        .iter()
        .map(|s| gradients.get(*s).cloned())
        .collect())
}
