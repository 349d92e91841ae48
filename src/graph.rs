//! The program IR: a directed graph of nodes, each holding one expression or
//! statement and the operator that schedules its outgoing edges.
use std::collections::HashMap;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Walker};
use petgraph::Direction;
use strum::{Display, EnumString};

use crate::{error::GraphError, value::Value};

/// How the edges leaving a node are scheduled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Operator {
    /// successors run one after another, each awaited before the next starts
    Sync,
    /// successors are dispatched concurrently
    Async,
    /// terminal node
    #[default]
    None,
}

#[derive(Clone, Debug)]
pub enum Content {
    Source(String),
    /// an already built value, used as the node's result as-is
    Literal(Value),
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Self::Source(s.to_string())
    }
}

impl From<Value> for Content {
    fn from(v: Value) -> Self {
        Self::Literal(v)
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub id: String,
    pub content: Content,
    pub operator: Operator,
}

/// Read-only during a run, and shared by every branch without locking
#[derive(Clone, Debug, Default)]
pub struct ProgramGraph {
    graph: DiGraph<Node, ()>,
    ids: HashMap<String, NodeIndex>,
}

impl ProgramGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        content: impl Into<Content>,
        operator: Operator,
    ) -> Result<NodeIndex, GraphError> {
        let id = id.into();
        if self.ids.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        let ix = self.graph.add_node(Node {
            id: id.clone(),
            content: content.into(),
            operator,
        });
        self.ids.insert(id, ix);
        Ok(ix)
    }

    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        let a = self.index_of(from)?;
        let b = self.index_of(to)?;
        self.graph.update_edge(a, b, ());
        Ok(())
    }

    /// Appends a linear chain of nodes, each linked to the next, with ids
    /// continuing the zero-padded sequence so id order is insertion order
    pub fn push_chain(&mut self, chain: Vec<(Content, Operator)>) -> Vec<NodeIndex> {
        let mut added: Vec<NodeIndex> = Vec::with_capacity(chain.len());
        for (content, operator) in chain {
            let mut n = self.graph.node_count();
            let mut id = format!("{n:06}");
            while self.ids.contains_key(&id) {
                n += 1;
                id = format!("{n:06}");
            }
            let ix = self.graph.add_node(Node {
                id: id.clone(),
                content,
                operator,
            });
            self.ids.insert(id, ix);
            if let Some(prev) = added.last() {
                self.graph.add_edge(*prev, ix, ());
            }
            added.push(ix);
        }
        added
    }

    pub fn index_of(&self, id: &str) -> Result<NodeIndex, GraphError> {
        self.ids
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))
    }

    pub fn node(&self, ix: NodeIndex) -> &Node {
        &self.graph[ix]
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Successors ordered by the string order of their ids
    pub fn successors(&self, ix: NodeIndex) -> Vec<NodeIndex> {
        let mut next: Vec<_> = self
            .graph
            .neighbors_directed(ix, Direction::Outgoing)
            .collect();
        next.sort_by(|a, b| self.graph[*a].id.cmp(&self.graph[*b].id));
        next
    }

    /// Nodes without incoming edges, in insertion order
    pub fn roots(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|ix| {
                self.graph
                    .neighbors_directed(*ix, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect()
    }

    /// Rejects cycles and nodes that have successors but no operator
    pub fn validate(&self) -> Result<(), GraphError> {
        if is_cyclic_directed(&self.graph) {
            // name a node that sits on a cycle: one reachable from its own successor
            let on_cycle = self
                .graph
                .node_indices()
                .find(|ix| {
                    self.graph
                        .neighbors_directed(*ix, Direction::Outgoing)
                        .any(|next| Dfs::new(&self.graph, next).iter(&self.graph).any(|n| n == *ix))
                })
                .map(|ix| self.graph[ix].id.clone())
                .unwrap_or_default();
            return Err(GraphError::Cycle(on_cycle));
        }
        for ix in self.graph.node_indices() {
            let node = &self.graph[ix];
            if node.operator == Operator::None && !self.successors(ix).is_empty() {
                return Err(GraphError::MissingOperator(node.id.clone()));
            }
        }
        Ok(())
    }
}
