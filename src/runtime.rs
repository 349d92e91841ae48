use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, instrument};

use crate::{
    config::{pythonect_config, Settings},
    env::Env,
    error::{Error, EvalError, TransportError},
    eval::{Host, ModuleResolver, Resolver},
    graph::ProgramGraph,
    parser,
    remote::xmlrpc,
    scheduler::Walker,
    value::Value,
    writer::Output,
};

/// Name of the global binding that overrides `max_threads_per_flow` for a run.
/// A global named plainly `max_threads_per_flow` is accepted as an alias.
pub const MAX_THREADS_PER_FLOW: &str = "__MAX_THREADS_PER_FLOW__";

const MAX_THREADS_PER_FLOW_ALIAS: &str = "max_threads_per_flow";

/// What [`Runtime::evaluate`] runs: program text, or a graph built elsewhere
#[derive(Clone, Copy, Debug)]
pub enum Program<'a> {
    Source(&'a str),
    Graph(&'a ProgramGraph),
}

impl<'a> From<&'a str> for Program<'a> {
    fn from(s: &'a str) -> Self {
        Self::Source(s)
    }
}

impl<'a> From<&'a String> for Program<'a> {
    fn from(s: &'a String) -> Self {
        Self::Source(s)
    }
}

impl<'a> From<&'a ProgramGraph> for Program<'a> {
    fn from(g: &'a ProgramGraph) -> Self {
        Self::Graph(g)
    }
}

/// Evaluates flow programs.
///
/// Holds what outlives a single run: settings, the resolver used for
/// auto-imports, the shared output and one XML-RPC client per endpoint.
pub struct Runtime {
    settings: Settings,
    resolver: Box<dyn Resolver>,
    output: Output,
    clients: DashMap<String, Arc<xmlrpc::Client>>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// A runtime configured from the global settings
    pub fn new() -> Self {
        Self::with_settings(pythonect_config(None, None).clone())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings,
            resolver: Box::new(ModuleResolver),
            output: Output::stdout(),
            clients: DashMap::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Lines printed so far, when the output captures them
    pub fn take_output(&self) -> Vec<String> {
        self.output.take()
    }

    /// Runs `program` against `env`. The result is also left bound to `_` in
    /// both of `env`'s namespaces.
    pub fn evaluate<'p>(&self, program: impl Into<Program<'p>>, env: &mut Env) -> Result<Value, Error> {
        self.evaluate_at(program.into(), env, 0)
    }

    #[instrument(level = "debug", skip_all, fields(depth = depth))]
    fn evaluate_at(&self, program: Program<'_>, env: &mut Env, depth: usize) -> Result<Value, Error> {
        if depth > self.settings.max_depth {
            return Err(EvalError::RecursionLimit(self.settings.max_depth).into());
        }
        let parsed;
        let graph = match program {
            Program::Graph(graph) => graph,
            Program::Source(text) => {
                parsed = parser::parse_program(text)?;
                &parsed
            }
        };
        graph.validate()?;
        let threads = self.threads_per_flow(env);
        if depth == 0 {
            info!(nodes = graph.len(), threads, "evaluating program");
        }
        Ok(Walker::new(self, graph, depth, threads).run(env)?)
    }

    fn threads_per_flow(&self, env: &Env) -> usize {
        [MAX_THREADS_PER_FLOW, MAX_THREADS_PER_FLOW_ALIAS]
            .into_iter()
            .find_map(|name| env.globals.get(name))
            .and_then(Value::as_int)
            .filter(|n| *n > 0)
            .map_or(self.settings.max_threads_per_flow, |n| n as usize)
    }
}

impl Host for Runtime {
    fn resolver(&self) -> &dyn Resolver {
        self.resolver.as_ref()
    }

    fn output(&self) -> &Output {
        &self.output
    }

    fn eval_program(&self, source: &str, mut env: Env, depth: usize) -> Result<Value, EvalError> {
        self.evaluate_at(Program::Source(source), &mut env, depth)
            .map_err(|e| match e {
                Error::Eval(e) => e,
                Error::Parse(e) => EvalError::Syntax(e),
                Error::Graph(e) => EvalError::value_error(e.to_string()),
            })
    }

    fn transport(&self, endpoint: &str) -> Result<Arc<xmlrpc::Client>, TransportError> {
        Ok(self
            .clients
            .entry(endpoint.to_string())
            .or_try_insert_with(|| xmlrpc::Client::new(endpoint).map(Arc::new))?
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Operator;

    fn runtime() -> Runtime {
        Runtime::with_settings(Settings::default()).with_output(Output::capture())
    }

    fn eval(src: &str) -> Value {
        runtime().evaluate(src, &mut Env::new()).unwrap()
    }

    #[test]
    fn scalar_chains() {
        assert_eq!(eval("1 -> 1"), Value::Int(1));
        assert_eq!(eval("1 -> _ + 1 | _ * 10"), Value::Int(20));
        assert_eq!(eval("1 == 0"), Value::Bool(false));
        assert_eq!(eval("1 == 0 -> 99"), Value::Bool(false));
        assert_eq!(eval("'Hello world' -> split").repr(), "['Hello', 'world']");
    }

    #[test]
    fn explosion() {
        assert_eq!(eval("[1, 2] -> 1").repr(), "[1, 1]");
        assert_eq!(eval("[1, 2, 3] | _ * 2").repr(), "[2, 4, 6]");
        assert_eq!(eval("[[1, 2, 3]] -> sum"), Value::Int(6));
        assert_eq!(eval("[1, 2] -> [3, 4]").repr(), "[[3, 4], [3, 4]]");
        assert_eq!(eval("range(5) -> _ if _ % 2 else False").repr(), "[1, 3]");
        assert_eq!(eval("[]").repr(), "[]");
        assert_eq!(eval("[] -> 1"), Value::Bool(false));
    }

    #[test]
    fn fan_out_to_several_successors() {
        let mut g = ProgramGraph::new();
        g.add_node("a", "10", Operator::Async).unwrap();
        g.add_node("b", "_ + 1", Operator::None).unwrap();
        g.add_node("c", "_ + 2", Operator::None).unwrap();
        g.add_edge("a", "c").unwrap();
        g.add_edge("a", "b").unwrap();
        let r = runtime().evaluate(&g, &mut Env::new()).unwrap();
        assert_eq!(r.repr(), "[11, 12]");
    }

    #[test]
    fn literal_content_is_used_as_is() {
        let mut g = ProgramGraph::new();
        g.add_node("a", Value::from("x y"), Operator::Sync).unwrap();
        g.add_node("b", "split", Operator::None).unwrap();
        g.add_edge("a", "b").unwrap();
        let r = runtime().evaluate(&g, &mut Env::new()).unwrap();
        assert_eq!(r.repr(), "['x', 'y']");
    }

    #[test]
    fn roots_share_the_environment() {
        let mut env = Env::new();
        let r = runtime().evaluate("x = 5\nx * 2, 'a'", &mut env).unwrap();
        assert_eq!(r.repr(), "[None, 10, 'a']");
        assert_eq!(env.lookup("x"), Some(&Value::Int(5)));
        assert_eq!(env.globals.get("_"), Some(&r));
        assert_eq!(env.locals.get("_"), Some(&r));
    }

    #[test]
    fn reduce_runs_once_with_every_value() {
        let rt = runtime();
        let r = rt
            .evaluate("[1, 2, 3] -> _ * 10 -> print(sorted(_!)) or sum(_)", &mut Env::new())
            .unwrap();
        assert_eq!(r.repr(), "[60, 60, 60]");
        assert_eq!(rt.take_output(), ["[10, 20, 30]"]);
        assert_eq!(eval("[1, 2, 3] -> sum(_!)").repr(), "[6, 6, 6]");
        assert_eq!(eval("[1, 2, 3] -> _ * 10 -> sum(_!) -> _ + 1").repr(), "[61, 61, 61]");
    }

    #[test]
    fn branches_do_not_leak_bindings() {
        let mut env = Env::new();
        let r = runtime().evaluate("[1, 2, 3] -> x = _ * 100", &mut env).unwrap();
        assert_eq!(r.repr(), "[1, 2, 3]");
        assert_eq!(env.lookup("x"), None);

        let mut env = Env::new();
        runtime().evaluate("7 -> y = _", &mut env).unwrap();
        assert_eq!(env.lookup("y"), None);
        assert_eq!(env.underscore(), Value::Int(7));
    }

    #[test]
    fn backticks_nest_and_are_bounded() {
        assert_eq!(eval("`1 -> _ + 1` -> _ * 3"), Value::Int(6));
        let mut settings = Settings::default();
        settings.max_depth = 2;
        let rt = Runtime::with_settings(settings).with_output(Output::capture());
        let mut env = Env::new();
        rt.evaluate("f = '__eval__(f)'", &mut env).unwrap();
        assert!(matches!(
            rt.evaluate("__eval__(f)", &mut env),
            Err(Error::Eval(EvalError::RecursionLimit(2)))
        ));
    }

    #[test]
    fn errors_abort_the_run() {
        assert!(matches!(
            runtime().evaluate("[1, 0] -> 1 / _", &mut Env::new()),
            Err(Error::Eval(EvalError::ZeroDivision(_)))
        ));
        assert!(matches!(
            runtime().evaluate("1 -> (", &mut Env::new()),
            Err(Error::Parse(_)) | Err(Error::Eval(EvalError::Syntax(_)))
        ));
    }

    #[test]
    fn thread_override_from_globals() {
        let rt = runtime();
        let mut env = Env::new();
        assert_eq!(rt.threads_per_flow(&env), rt.settings().max_threads_per_flow);
        env.bind_global("max_threads_per_flow", Value::Int(3));
        assert_eq!(rt.threads_per_flow(&env), 3);
        env.bind_global(MAX_THREADS_PER_FLOW, Value::Int(2));
        assert_eq!(rt.threads_per_flow(&env), 2);
        assert_eq!(rt.evaluate("[1, 2, 3] -> _", &mut env).unwrap().repr(), "[1, 2, 3]");
    }
}
