//! Thread pools created for one fan-out step and dropped when it completes.
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::trace;

use crate::{error::EvalError, graph::Operator};

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn guarded<T>(f: impl FnOnce() -> Result<T, EvalError>) -> Result<T, EvalError> {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(EvalError::BranchPanicked(panic_message(payload))))
}

pub struct FlowPool {
    pool: ThreadPool,
}

impl FlowPool {
    pub fn new(threads: usize) -> Result<Self, EvalError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("pythonect-flow-{i}"))
            .build()
            .map_err(|e| EvalError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Runs each branch in the pool, waiting for one to finish before
    /// submitting the next; stops at the first failure
    pub fn apply<V, T, F>(&self, branches: Vec<V>, f: &F) -> Result<Vec<T>, EvalError>
    where
        V: Send,
        T: Send,
        F: Fn(V) -> Result<T, EvalError> + Sync,
    {
        branches
            .into_iter()
            .map(|v| self.pool.install(|| guarded(|| f(v))))
            .collect()
    }

    /// Submits every branch at once and runs `inline` on the calling thread
    /// meanwhile; results are gathered by position, not completion
    pub fn apply_async<V, T, F, G>(
        &self,
        inline: G,
        branches: Vec<V>,
        f: &F,
    ) -> (Result<T, EvalError>, Vec<Result<T, EvalError>>)
    where
        V: Send,
        T: Send,
        F: Fn(V) -> Result<T, EvalError> + Sync,
        G: FnOnce() -> Result<T, EvalError>,
    {
        let n = branches.len();
        let (tx, rx) = mpsc::channel();
        let first = self.pool.in_place_scope(|scope| {
            for (i, v) in branches.into_iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    // the receiver outlives the scope
                    let _ = tx.send((i, guarded(|| f(v))));
                });
            }
            drop(tx);
            guarded(inline)
        });
        let mut slots: Vec<Option<Result<T, EvalError>>> = (0..n).map(|_| None).collect();
        for (i, r) in rx {
            slots[i] = Some(r);
        }
        let rest = slots
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(EvalError::BranchPanicked("branch never reported".into()))))
            .collect();
        (first, rest)
    }
}

/// Runs `first` in-line and `f` over `rest` in a fresh pool of `threads`
/// following `operator`; results come back in submission order, `first`'s
/// ahead of the rest
pub fn fan_out<V, T, F, G>(
    operator: Operator,
    threads: usize,
    first: G,
    rest: Vec<V>,
    f: F,
) -> Result<Vec<T>, EvalError>
where
    V: Send,
    T: Send,
    F: Fn(V) -> Result<T, EvalError> + Sync,
    G: FnOnce() -> Result<T, EvalError>,
{
    if rest.is_empty() {
        return Ok(vec![first()?]);
    }
    trace!(%operator, branches = rest.len() + 1, threads, "fan-out");
    let pool = FlowPool::new(threads)?;
    match operator {
        Operator::Async => {
            let (first, rest) = pool.apply_async(first, rest, &f);
            let mut out = Vec::with_capacity(rest.len() + 1);
            out.push(first?);
            for r in rest {
                out.push(r?);
            }
            Ok(out)
        }
        Operator::Sync | Operator::None => {
            let mut out = vec![first()?];
            out.extend(pool.apply(rest, &f)?);
            Ok(out)
        }
    }
}
