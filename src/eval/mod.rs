//! The embedded expression language: evaluation of [`Expr`], execution of
//! [`Stmt`], builtins and importable modules.
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use crate::{
    env::Env,
    error::{EvalError, TransportError},
    parser,
    remote::xmlrpc,
    syntax::{Expr, Stmt, Target},
    value::{Key, Lambda, Value},
    writer::Output,
};

pub mod builtins;
pub mod modules;
pub mod ops;

pub use modules::ModuleResolver;

pub type Kwargs = Vec<(String, Value)>;
pub type BuiltinFn = fn(&Context<'_>, Vec<Value>, Kwargs) -> Result<Value, EvalError>;

/// Keyword list of builtins that forward arbitrary keyword arguments
pub const ANY_KWARGS: &[&str] = &["**"];

/// A natively implemented function
pub struct Builtin {
    pub name: &'static str,
    /// Module (or receiver type, for methods) the function belongs to
    pub module: Option<&'static str>,
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub kwargs: &'static [&'static str],
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.qualified_name())
    }
}

impl Builtin {
    pub const fn new(
        name: &'static str,
        min_args: usize,
        max_args: Option<usize>,
        func: BuiltinFn,
    ) -> Self {
        Self {
            name,
            module: None,
            min_args,
            max_args,
            kwargs: &[],
            func,
        }
    }

    pub const fn in_module(mut self, module: &'static str) -> Self {
        self.module = Some(module);
        self
    }

    pub const fn with_kwargs(mut self, kwargs: &'static [&'static str]) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn qualified_name(&self) -> String {
        match self.module {
            Some(module) => format!("{module}.{}", self.name),
            None => self.name.to_string(),
        }
    }

    pub fn accepts(&self, n: usize) -> bool {
        n >= self.min_args && self.max_args.map_or(true, |max| n <= max)
    }

    pub fn call(
        &self,
        ctx: &Context<'_>,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value, EvalError> {
        if !self.accepts(args.len()) {
            let expected = match self.max_args {
                Some(max) if max == self.min_args => format!("exactly {max}"),
                Some(max) => format!("from {} to {max}", self.min_args),
                None => format!("at least {}", self.min_args),
            };
            return Err(EvalError::type_error(format!(
                "{}() takes {expected} arguments ({} given)",
                self.name,
                args.len()
            )));
        }
        if self.kwargs != ANY_KWARGS {
            if let Some((k, _)) = kwargs.iter().find(|(k, _)| !self.kwargs.contains(&k.as_str())) {
                return Err(EvalError::type_error(format!(
                    "{}() got an unexpected keyword argument '{k}'",
                    self.name
                )));
            }
        }
        (self.func)(ctx, args, kwargs)
    }
}

/// A member of an importable module
pub enum Member {
    Func(Builtin),
    Const(&'static str, fn() -> Value),
}

impl Member {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Func(b) => b.name,
            Self::Const(name, _) => name,
        }
    }

    pub fn value(&'static self) -> Value {
        match self {
            Self::Func(b) => Value::Builtin(b),
            Self::Const(_, f) => f(),
        }
    }
}

pub struct Module {
    pub name: &'static str,
    pub members: &'static [Member],
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Module({})", self.name)
    }
}

impl Module {
    pub fn get(&'static self, name: &str) -> Option<Value> {
        self.members
            .iter()
            .find(|m| m.name() == name)
            .map(Member::value)
    }
}

/// Symbol resolution used to recover from an unbound name.
///
/// The compiler asks the resolver exactly once per failed attempt; whatever it
/// returns is bound in the global namespace under the missing name.
pub trait Resolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Value>;
}

/// Services the evaluator needs from the runtime that hosts it
pub trait Host: Sync {
    fn resolver(&self) -> &dyn Resolver;

    fn output(&self) -> &Output;

    /// Runs `source` as a nested flow program against `env`
    fn eval_program(&self, source: &str, env: Env, depth: usize) -> Result<Value, EvalError>;

    /// An XML-RPC client for `endpoint`, shared across calls
    fn transport(&self, endpoint: &str) -> Result<Arc<xmlrpc::Client>, TransportError>;
}

/// What an expression is evaluated against
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub host: &'a dyn Host,
    pub env: &'a Env,
    pub depth: usize,
}

impl<'a> Context<'a> {
    pub fn new(host: &'a dyn Host, env: &'a Env, depth: usize) -> Self {
        Self { host, env, depth }
    }

    pub fn with_env<'b>(&self, env: &'b Env) -> Context<'b>
    where
        'a: 'b,
    {
        Context {
            host: self.host,
            env,
            depth: self.depth,
        }
    }

    /// Looks `name` up in locals, globals, then builtins
    pub fn lookup(&self, name: &str) -> Result<Value, EvalError> {
        if let Some(v) = self.env.lookup(name) {
            return Ok(v.clone());
        }
        builtins::lookup(name).ok_or_else(|| EvalError::UnboundName(name.to_string()))
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::None(_) => Ok(Value::None),
            Expr::Bool(_, b) => Ok(Value::Bool(*b)),
            Expr::Int(_, i) => Ok(Value::Int(*i)),
            Expr::Float(_, x) => Ok(Value::Float(*x)),
            Expr::Str(_, s) => Ok(Value::from(s.as_str())),
            Expr::Name(_, name) => self.lookup(name),
            Expr::List(_, xs) => Ok(Value::list(self.eval_all(xs)?)),
            Expr::Tuple(_, xs) => Ok(Value::tuple(self.eval_all(xs)?)),
            Expr::Dict(_, entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (k, v) in entries {
                    map.insert(Key::new(self.eval(k)?)?, self.eval(v)?);
                }
                Ok(Value::dict(map))
            }
            Expr::Attribute(_, obj, name) => get_attribute(&self.eval(obj)?, name),
            Expr::Index(_, obj, index) => ops::index(&self.eval(obj)?, &self.eval(index)?),
            Expr::Slice(_, obj, lo, hi) => {
                let obj = self.eval(obj)?;
                let lo = lo.as_ref().map(|e| self.eval(e)).transpose()?;
                let hi = hi.as_ref().map(|e| self.eval(e)).transpose()?;
                ops::slice(&obj, lo.as_ref(), hi.as_ref())
            }
            Expr::Call(_, f, args, kwargs) => {
                let f = self.eval(f)?;
                let args = self.eval_all(args)?;
                let kwargs = kwargs
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.eval(v)?)))
                    .collect::<Result<Kwargs, EvalError>>()?;
                self.call(&f, args, kwargs)
            }
            Expr::Unary(_, op, x) => ops::unary(*op, &self.eval(x)?),
            Expr::Binary(_, op, a, b) => ops::binary(*op, &self.eval(a)?, &self.eval(b)?),
            Expr::Compare(_, first, rest) => {
                let mut lhs = self.eval(first)?;
                for (op, rhs) in rest {
                    let rhs = self.eval(rhs)?;
                    if !ops::compare(*op, &lhs, &rhs)? {
                        return Ok(Value::Bool(false));
                    }
                    lhs = rhs;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(_, a, b) => {
                let a = self.eval(a)?;
                if a.is_truthy() {
                    self.eval(b)
                } else {
                    Ok(a)
                }
            }
            Expr::Or(_, a, b) => {
                let a = self.eval(a)?;
                if a.is_truthy() {
                    Ok(a)
                } else {
                    self.eval(b)
                }
            }
            Expr::IfElse(_, then, cond, otherwise) => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Lambda(_, params, body) => Ok(Value::Lambda(Arc::new(Lambda {
                params: params.clone(),
                body: (**body).clone(),
                env: self.env.clone(),
            }))),
        }
    }

    fn eval_all(&self, xs: &[Expr]) -> Result<Vec<Value>, EvalError> {
        xs.iter().map(|x| self.eval(x)).collect()
    }

    pub fn call(&self, f: &Value, mut args: Vec<Value>, kwargs: Kwargs) -> Result<Value, EvalError> {
        match f {
            Value::Builtin(b) => b.call(self, args, kwargs),
            Value::Method(m) => {
                args.insert(0, m.0.clone());
                m.1.call(self, args, kwargs)
            }
            Value::Lambda(l) => self.call_lambda(l, args, kwargs),
            Value::Remote(r) => r.call(self, args, kwargs),
            v => Err(EvalError::type_error(format!(
                "'{}' object is not callable",
                v.type_name()
            ))),
        }
    }

    fn call_lambda(&self, l: &Lambda, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, EvalError> {
        let given = args.len() + kwargs.len();
        if given != l.params.len() {
            return Err(EvalError::type_error(format!(
                "<lambda>() takes {} positional arguments but {given} were given",
                l.params.len()
            )));
        }
        let mut env = l.env.clone();
        for (param, arg) in l.params.iter().zip(args) {
            env.bind(param.as_str(), arg);
        }
        for (k, v) in kwargs {
            if !l.params.contains(&k) {
                return Err(EvalError::type_error(format!(
                    "<lambda>() got an unexpected keyword argument '{k}'"
                )));
            }
            env.bind(k, v);
        }
        self.with_env(&env).eval(&l.body)
    }
}

pub fn get_attribute(obj: &Value, name: &str) -> Result<Value, EvalError> {
    if let Value::Module(m) = obj {
        return m.get(name).ok_or_else(|| {
            EvalError::Attribute(format!("module '{}' has no attribute '{name}'", m.name))
        });
    }
    builtins::method(obj, name).ok_or_else(|| {
        EvalError::Attribute(format!(
            "'{}' object has no attribute '{name}'",
            obj.type_name()
        ))
    })
}

fn bind_target(env: &mut Env, target: &Target, value: Value) -> Result<(), EvalError> {
    match target {
        Target::Name(name) => {
            env.bind(name.as_str(), value);
            Ok(())
        }
        Target::Tuple(targets) => {
            let values = value.iterate()?;
            if values.len() != targets.len() {
                return Err(EvalError::value_error(format!(
                    "expected {} values to unpack, got {}",
                    targets.len(),
                    values.len()
                )));
            }
            for (t, v) in targets.iter().zip(values) {
                bind_target(env, t, v)?;
            }
            Ok(())
        }
    }
}

fn import(name: &str) -> Result<&'static Module, EvalError> {
    modules::find(name).ok_or_else(|| EvalError::Import(name.to_string()))
}

/// Executes a statement for its effect on `env`
pub fn exec(host: &dyn Host, env: &mut Env, stmt: &Stmt, depth: usize) -> Result<(), EvalError> {
    trace!("exec {stmt:?}");
    match stmt {
        Stmt::Assign(_, targets, rhs) => {
            let value = Context::new(host, env, depth).eval(rhs)?;
            for target in targets {
                bind_target(env, target, value.clone())?;
            }
        }
        Stmt::AugAssign(_, name, op, rhs) => {
            let ctx = Context::new(host, env, depth);
            let value = ops::binary(*op, &ctx.lookup(name)?, &ctx.eval(rhs)?)?;
            env.bind(name.as_str(), value);
        }
        Stmt::Import(_, names) => {
            for (name, alias) in names {
                let module = import(name)?;
                env.bind(alias.as_deref().unwrap_or(name), Value::Module(module));
            }
        }
        Stmt::FromImport(_, module, names) => {
            let module = import(module)?;
            for (name, alias) in names {
                let value = module.get(name).ok_or_else(|| {
                    EvalError::Import(format!("{name} from {}", module.name))
                })?;
                env.bind(alias.as_deref().unwrap_or(name), value);
            }
        }
        Stmt::FromImportAll(_, module) => {
            let module = import(module)?;
            for member in module.members {
                env.bind(member.name(), member.value());
            }
        }
        Stmt::Pass(_) => (),
        Stmt::Del(_, names) => {
            for name in names {
                env.unbind(name)
                    .ok_or_else(|| EvalError::UnboundName(name.clone()))?;
            }
        }
    }
    Ok(())
}

/// Evaluates `text` as a single expression, like Python's `eval`
pub fn eval_str(ctx: &Context<'_>, text: &str) -> Result<Value, EvalError> {
    let expr = parser::parse_expr(text)?;
    ctx.eval(&expr)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use dashmap::DashMap;

    use super::*;
    use crate::{parser::parse_source, syntax::Source};

    /// A host without nested programs, printing into a buffer
    pub(crate) struct TestHost {
        pub output: Output,
        pub clients: DashMap<String, Arc<xmlrpc::Client>>,
    }

    impl TestHost {
        pub(crate) fn new() -> Self {
            Self {
                output: Output::capture(),
                clients: DashMap::new(),
            }
        }
    }

    impl Host for TestHost {
        fn resolver(&self) -> &dyn Resolver {
            &ModuleResolver
        }

        fn output(&self) -> &Output {
            &self.output
        }

        fn eval_program(&self, source: &str, env: Env, depth: usize) -> Result<Value, EvalError> {
            eval_str(&Context::new(self, &env, depth), source)
        }

        fn transport(&self, endpoint: &str) -> Result<Arc<xmlrpc::Client>, TransportError> {
            Ok(self
                .clients
                .entry(endpoint.to_string())
                .or_try_insert_with(|| xmlrpc::Client::new(endpoint).map(Arc::new))?
                .clone())
        }
    }

    pub(crate) fn run(env: &mut Env, src: &str) -> Result<Value, EvalError> {
        let host = TestHost::new();
        match parse_source(src)? {
            Source::Expr(e) => Context::new(&host, env, 0).eval(&e),
            Source::Stmt(s) => exec(&host, env, &s, 0).map(|_| Value::None),
        }
    }

    fn eval(src: &str) -> Value {
        run(&mut Env::new(), src).unwrap()
    }

    #[test]
    fn arithmetic_and_logic() {
        assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval("7 // -2"), Value::Int(-4));
        assert_eq!(eval("7 % -2"), Value::Int(-1));
        assert_eq!(eval("1 / 2"), Value::Float(0.5));
        assert_eq!(eval("2 ** 10"), Value::Int(1024));
        assert_eq!(eval("0 or 'x'"), Value::from("x"));
        assert_eq!(eval("[] and 1"), Value::list(vec![]));
        assert_eq!(eval("1 < 2 < 3"), Value::Bool(true));
        assert_eq!(eval("3 > 2 > 2"), Value::Bool(false));
        assert_eq!(eval("'ell' in 'hello'"), Value::Bool(true));
        assert_eq!(eval("'a' if 0 else 'b'"), Value::from("b"));
    }

    #[test]
    fn lambdas_close_over_their_environment() {
        let mut env = Env::new();
        run(&mut env, "n = 10").unwrap();
        run(&mut env, "f = lambda x: x + n").unwrap();
        run(&mut env, "n = 0").unwrap();
        assert_eq!(run(&mut env, "f(1)").unwrap(), Value::Int(11));
        assert_eq!(run(&mut env, "f(x=2)").unwrap(), Value::Int(12));
        assert!(matches!(run(&mut env, "f(1, 2)"), Err(EvalError::Type(_))));
    }

    #[test]
    fn statements_bind_into_locals() {
        let mut env = Env::new();
        run(&mut env, "a, (b, c) = 1, [2, 3]").unwrap();
        assert_eq!(env.locals.get("c"), Some(&Value::Int(3)));
        run(&mut env, "a += 41").unwrap();
        assert_eq!(env.locals.get("a"), Some(&Value::Int(42)));
        run(&mut env, "del a").unwrap();
        assert!(env.lookup("a").is_none());
        assert!(matches!(
            run(&mut env, "del a"),
            Err(EvalError::UnboundName(name)) if name == "a"
        ));
    }

    #[test]
    fn imports() {
        let mut env = Env::new();
        run(&mut env, "import math as m").unwrap();
        assert_eq!(run(&mut env, "m.floor(2.5)").unwrap(), Value::Int(2));
        run(&mut env, "from string import upper").unwrap();
        assert_eq!(run(&mut env, "upper('a')").unwrap(), Value::from("A"));
        run(&mut env, "from os import *").unwrap();
        assert!(env.locals.contains_key("getpid"));
        assert!(matches!(
            run(&mut env, "import nosuch"),
            Err(EvalError::Import(_))
        ));
    }

    #[test]
    fn unbound_names_are_reported() {
        assert!(matches!(
            run(&mut Env::new(), "split('a b')"),
            Err(EvalError::UnboundName(name)) if name == "split"
        ));
    }

    #[test]
    fn attributes_and_methods() {
        assert_eq!(eval("'a,b'.split(',')"), eval("['a', 'b']"));
        assert_eq!(eval("{'k': 1}.get('x', 2)"), Value::Int(2));
        assert!(matches!(
            run(&mut Env::new(), "(1).nope"),
            Err(EvalError::Attribute(_))
        ));
        assert!(matches!(
            run(&mut Env::new(), "1(2)"),
            Err(EvalError::Type(_))
        ));
    }
}
