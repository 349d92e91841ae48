//! Walks a program graph from its roots.
//!
//! A node's result either explodes, when it is a list or tuple, into one
//! branch per element, or propagates as a single value to the node's
//! successors. In both cases the first branch runs in-line on the current
//! thread and the others go to a pool following the node's operator. Every
//! branch, the in-line one included, works on its own copy of the
//! environment.
use petgraph::graph::NodeIndex;
use tracing::debug;

use crate::{
    compiler,
    env::Env,
    error::EvalError,
    eval::Host,
    graph::{Content, ProgramGraph},
    pool::fan_out,
    reduce::{self, Contribution, Item, Ledger},
    runtime::Runtime,
    spawn,
    value::Value,
};

pub struct Walker<'r> {
    runtime: &'r Runtime,
    graph: &'r ProgramGraph,
    ledger: Ledger,
    depth: usize,
    threads: usize,
}

impl<'r> Walker<'r> {
    pub fn new(runtime: &'r Runtime, graph: &'r ProgramGraph, depth: usize, threads: usize) -> Self {
        Self {
            runtime,
            graph,
            ledger: Ledger::new(),
            depth,
            threads,
        }
    }

    /// Runs every root in order against `env`, then replays the reduce nodes
    /// reached along the way. Returns one value per root, unwrapped when there
    /// is a single root, and leaves it bound to `_`.
    pub fn run(&self, env: &mut Env) -> Result<Value, EvalError> {
        let mut results = Vec::new();
        for root in self.graph.roots() {
            results.push(self.visit(root, env, false)?);
        }
        while let Some((node, mut replay_env)) = self.ledger.take_next() {
            let replayed = self.visit(node, &mut replay_env, true)?;
            reduce::substitute(&mut results, node, &replayed);
        }
        let mut per_root: Vec<Value> = results.into_iter().map(collect).collect();
        let result = match per_root.len() {
            0 => Value::None,
            1 => per_root.remove(0),
            _ => Value::list(per_root),
        };
        env.set_underscore(result.clone());
        Ok(result)
    }

    /// Evaluates one node against `env` and carries its result onwards
    fn visit(&self, ix: NodeIndex, env: &mut Env, replay: bool) -> Result<Contribution, EvalError> {
        let node = self.graph.node(ix);
        let r = match &node.content {
            Content::Literal(v) => v.clone(),
            Content::Source(text) => {
                let prepared = compiler::preprocess(text);
                if prepared.reduce && !replay {
                    return Ok(vec![self.ledger.capture(ix, env.clone())]);
                }
                debug!(node = %node.id, text = %prepared.text, "evaluating node");
                if prepared.spawn {
                    spawn::run(
                        self.runtime.settings(),
                        self.runtime.output(),
                        &prepared.text,
                        env,
                        self.depth,
                    )?
                } else {
                    compiler::execute(self.runtime, env, &prepared.text, self.depth)?
                }
            }
        };
        env.set_underscore(r.clone());
        self.explode(ix, r, env)
    }

    fn explode(&self, ix: NodeIndex, r: Value, env: &mut Env) -> Result<Contribution, EvalError> {
        let Some(elements) = r.as_sequence().map(<[Value]>::to_vec) else {
            return self.propagate(ix, r, env);
        };
        if let (Value::List(_), [Value::List(inner)]) = (&r, elements.as_slice()) {
            return self.propagate(ix, Value::List(inner.clone()), env);
        }
        if self.graph.successors(ix).is_empty() {
            let collected = match elements.len() {
                1 => elements.into_iter().next().unwrap_or(Value::None),
                _ => r,
            };
            return Ok(vec![Item::Value(collected)]);
        }
        let mut branches = elements.into_iter().map(|v| (v, env.clone()));
        let Some((first, mut first_env)) = branches.next() else {
            return Ok(vec![]);
        };
        let rest: Vec<(Value, Env)> = branches.collect();
        debug!(node = %self.graph.node(ix).id, branches = rest.len() + 1, "exploding");
        let results = fan_out(
            self.graph.node(ix).operator,
            self.threads,
            || self.propagate(ix, first, &mut first_env),
            rest,
            |(v, mut env)| self.propagate(ix, v, &mut env),
        )?;
        Ok(results.into_iter().flatten().collect())
    }

    fn propagate(&self, ix: NodeIndex, v: Value, env: &mut Env) -> Result<Contribution, EvalError> {
        if v.is_false() {
            return Ok(vec![]);
        }
        let successors = self.graph.successors(ix);
        let Some((&first, rest)) = successors.split_first() else {
            return Ok(vec![Item::Value(v)]);
        };
        env.set_underscore(v);
        let mut first_env = env.clone();
        let rest: Vec<(NodeIndex, Env)> = rest.iter().map(|&s| (s, env.clone())).collect();
        let results = fan_out(
            self.graph.node(ix).operator,
            self.threads,
            || self.visit(first, &mut first_env, false),
            rest,
            |(s, mut env)| self.visit(s, &mut env, false),
        )?;
        Ok(results.into_iter().flatten().collect())
    }
}

/// A root's value: `False` when nothing reached the end, the value itself
/// when one did, a list otherwise
fn collect(items: Contribution) -> Value {
    let mut values: Vec<Value> = items
        .into_iter()
        .filter_map(|item| match item {
            Item::Value(v) => Some(v),
            Item::Deferred(_) => None,
        })
        .collect();
    match values.len() {
        0 => Value::Bool(false),
        1 => values.remove(0),
        _ => Value::list(values),
    }
}
