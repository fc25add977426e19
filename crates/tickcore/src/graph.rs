//! Operator topology of one fragment.
//!
//! Operators are identified by their creation index. Edges keep their
//! declaration order, which is also the order fan-in receives see.

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

/// (producer, output port) → (consumer, input port)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: usize,
    pub producer: usize,
    pub out_port: String,
    pub consumer: usize,
    pub in_port: String,
}

#[derive(Debug, Clone, Default)]
pub struct OperatorGraph {
    graph: DiGraph<usize, usize>,
    nodes: Vec<NodeIndex>,
    edges: Vec<Edge>,
}

impl OperatorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node for the next operator and return its index
    pub fn add_operator(&mut self) -> usize {
        let index = self.nodes.len();
        self.nodes.push(self.graph.add_node(index));
        index
    }

    pub fn operator_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains_edge(&self, producer: usize, out_port: &str, consumer: usize, in_port: &str) -> bool {
        self.edges.iter().any(|e| {
            e.producer == producer && e.consumer == consumer && e.out_port == out_port && e.in_port == in_port
        })
    }

    /// Append an edge; callers validate ports and duplicates first
    pub fn add_edge(&mut self, producer: usize, out_port: &str, consumer: usize, in_port: &str) -> usize {
        let id = self.edges.len();
        self.graph
            .add_edge(self.nodes[producer], self.nodes[consumer], id);
        self.edges.push(Edge {
            id,
            producer,
            out_port: out_port.to_string(),
            consumer,
            in_port: in_port.to_string(),
        });
        id
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges feeding `port` of `consumer`, in declaration order
    pub fn edges_into<'a>(&'a self, consumer: usize, port: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.consumer == consumer && e.in_port == port)
    }

    /// Edges fed by `port` of `producer`, in declaration order
    pub fn edges_from<'a>(&'a self, producer: usize, port: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.producer == producer && e.out_port == port)
    }

    fn neighbors(&self, op: usize, direction: Direction) -> Vec<usize> {
        let Some(&node) = self.nodes.get(op) else {
            return Vec::new();
        };
        let unique: BTreeSet<usize> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|n| self.graph[n])
            .collect();
        unique.into_iter().collect()
    }

    /// Distinct consumers of `op`, by creation order
    pub fn next_operators(&self, op: usize) -> Vec<usize> {
        self.neighbors(op, Direction::Outgoing)
    }

    /// Distinct producers feeding `op`, by creation order
    pub fn previous_operators(&self, op: usize) -> Vec<usize> {
        self.neighbors(op, Direction::Incoming)
    }

    /// Operators without incoming edges
    pub fn root_operators(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&op| self.previous_operators(op).is_empty())
            .collect()
    }

    /// Operators without outgoing edges
    pub fn leaf_operators(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&op| self.next_operators(op).is_empty())
            .collect()
    }

    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Stable topological order.
    ///
    /// Kahn's algorithm where ready operators leave in creation order. When
    /// only operators on cycles remain, the earliest created one is taken next
    /// as if its feedback edges were absent.
    pub fn scheduling_order(&self) -> Vec<usize> {
        let count = self.nodes.len();
        let mut indegree: Vec<usize> = (0..count)
            .map(|op| self.edges.iter().filter(|e| e.consumer == op && e.producer != op).count())
            .collect();
        let mut placed = vec![false; count];
        let mut ready: BinaryHeap<Reverse<usize>> = (0..count)
            .filter(|&op| indegree[op] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(count);

        while order.len() < count {
            let next = match ready.pop() {
                Some(Reverse(op)) if placed[op] => continue,
                Some(Reverse(op)) => op,
                None => match (0..count).find(|&op| !placed[op]) {
                    Some(op) => {
                        tracing::debug!("Breaking cycle at operator index {}", op);
                        op
                    }
                    None => break,
                },
            };

            placed[next] = true;
            order.push(next);

            for edge in self.edges.iter().filter(|e| e.producer == next && e.consumer != next) {
                let consumer = edge.consumer;
                if placed[consumer] {
                    continue;
                }
                indegree[consumer] = indegree[consumer].saturating_sub(1);
                if indegree[consumer] == 0 {
                    ready.push(Reverse(consumer));
                }
            }
        }

        order
    }
}
