//! Fan-in for nodes marked `_!`: every branch that reaches such a node leaves
//! a capture behind instead of evaluating it, and the node later runs once
//! with `_` bound to the list of all captured values.
use std::sync::Mutex;

use indexmap::IndexMap;
use petgraph::graph::NodeIndex;
use tracing::debug;

use crate::{env::Env, value::Value};

/// One unit of a branch's contribution to the overall result
#[derive(Clone, Debug)]
pub enum Item {
    Value(Value),
    /// Stands for the eventual result of a reduce node
    Deferred(NodeIndex),
}

pub type Contribution = Vec<Item>;

#[derive(Debug)]
pub struct Capture {
    pub prior: Value,
    pub env: Env,
}

/// Captures grouped by node, in the order branches arrived
#[derive(Debug, Default)]
pub struct Ledger {
    captures: Mutex<IndexMap<NodeIndex, Vec<Capture>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture(&self, node: NodeIndex, env: Env) -> Item {
        let prior = env.underscore();
        debug!(node = node.index(), prior = %prior, "reduce capture");
        let mut captures = match self.captures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        captures.entry(node).or_default().push(Capture { prior, env });
        Item::Deferred(node)
    }

    /// Removes the earliest group, ready for replay: `_` is rebound to the
    /// list of captured values in the first capture's environment
    pub fn take_next(&self) -> Option<(NodeIndex, Env)> {
        let mut captures = match self.captures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (node, group) = captures.shift_remove_index(0)?;
        let priors: Vec<Value> = group.iter().map(|c| c.prior.clone()).collect();
        let mut env = group.into_iter().next().map(|c| c.env).unwrap_or_default();
        debug!(node = node.index(), values = priors.len(), "reduce replay");
        env.set_underscore(Value::list(priors));
        Some((node, env))
    }
}

/// Puts a copy of `replayed` wherever a placeholder for `node` stands
pub fn substitute(results: &mut [Contribution], node: NodeIndex, replayed: &[Item]) {
    for items in results.iter_mut() {
        let mut out = Vec::with_capacity(items.len());
        for item in items.drain(..) {
            match item {
                Item::Deferred(n) if n == node => out.extend(replayed.iter().cloned()),
                item => out.push(item),
            }
        }
        *items = out;
    }
}
