//! Graph export of a recorded tape.
//!
//! Values and operations become vertices of a `petgraph` directed graph:
//! each tracked operand points at the operation that read it, and each
//! operation points at the value it produced.

use super::graph::OpKind;
use super::tape::Tape;
use super::value::ValueId;
use crate::scalar::Scalar;
use petgraph::algo::has_path_connecting;
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::fmt;

/// Vertex of a [`TapeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vertex {
    /// A watched input or an operation output.
    Value(ValueId),
    /// A recorded operation.
    Op(OpKind),
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vertex::Value(id) => write!(f, "{id}"),
            Vertex::Op(op) => write!(f, "{op}"),
        }
    }
}

/// Edge of a [`TapeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Value read as the operand at this position.
    Operand(usize),
    /// Operation produced the value.
    Output,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Operand(position) => write!(f, "{position}"),
            Edge::Output => Ok(()),
        }
    }
}

/// Snapshot of a tape's recorded graph.
#[derive(Debug, Clone)]
pub struct TapeGraph {
    graph: DiGraph<Vertex, Edge>,
    values: HashMap<ValueId, NodeIndex>,
}

impl TapeGraph {
    /// Build the graph of everything `tape` currently holds.
    pub fn from_tape<T: Scalar>(tape: &Tape<T>) -> Self {
        let mut this = Self {
            graph: DiGraph::new(),
            values: HashMap::new(),
        };
        for id in tape.watched() {
            this.value_vertex(id);
        }
        for node in tape.nodes() {
            let op = this.graph.add_node(Vertex::Op(node.op()));
            for (position, input) in node.inputs().iter().enumerate() {
                if let Some(id) = input {
                    let from = this.value_vertex(*id);
                    this.graph.add_edge(from, op, Edge::Operand(position));
                }
            }
            let output = this.value_vertex(node.output());
            this.graph.add_edge(op, output, Edge::Output);
        }
        this
    }

    fn value_vertex(&mut self, id: ValueId) -> NodeIndex {
        let graph = &mut self.graph;
        *self
            .values
            .entry(id)
            .or_insert_with(|| graph.add_node(Vertex::Value(id)))
    }

    /// The underlying petgraph graph.
    pub fn graph(&self) -> &DiGraph<Vertex, Edge> {
        &self.graph
    }

    /// Check if some chain of recorded operations leads from `from` to `to`.
    ///
    /// A value is connected to itself if it appears in the graph.
    pub fn is_connected(&self, from: ValueId, to: ValueId) -> bool {
        match (self.values.get(&from), self.values.get(&to)) {
            (Some(&a), Some(&b)) => has_path_connecting(&self.graph, a, b, None),
            _ => false,
        }
    }

    /// Graphviz DOT rendering.
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::new(&self.graph))
    }
}
