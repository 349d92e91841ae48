//! Runs `&`-marked nodes in a separate worker process.
//!
//! The parent sends the node text and a snapshot of its environment as one
//! JSON [`SpawnRequest`] on the worker's stdin, and reads a JSON
//! [`SpawnResponse`] back from its stdout. Only plain data crosses the process
//! boundary: builtins and modules travel by name, and bindings that cannot be
//! captured (lambdas) are left out unless the node needs them.
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    compiler,
    config::Settings,
    env::{Env, UNDERSCORE},
    error::EvalError,
    eval::{builtins, modules},
    parser,
    remote::RemoteFunction,
    runtime::Runtime,
    value::{Key, Value},
    writer::Output,
};

/// Serializable rendition of a [`Value`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Portable {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Portable>),
    Tuple(Vec<Portable>),
    Dict(Vec<(Portable, Portable)>),
    Builtin(String),
    Module(String),
    Method(Box<Portable>, String),
    Remote {
        name: String,
        host_expr: String,
        args: Vec<Portable>,
        kwargs: Vec<(String, Portable)>,
        host: Option<Box<Portable>>,
    },
}

fn capture_all<'a>(xs: impl IntoIterator<Item = &'a Value>) -> Option<Vec<Portable>> {
    xs.into_iter().map(Portable::capture).collect()
}

fn restore_all(xs: Vec<Portable>) -> Result<Vec<Value>, EvalError> {
    xs.into_iter().map(Portable::restore).collect()
}

impl Portable {
    /// `None` when the value, or something inside it, cannot leave the process
    pub fn capture(v: &Value) -> Option<Self> {
        Some(match v {
            Value::None => Self::None,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(i) => Self::Int(*i),
            Value::Float(x) => Self::Float(*x),
            Value::Str(s) => Self::Str(s.to_string()),
            Value::List(xs) => Self::List(capture_all(xs.iter())?),
            Value::Tuple(xs) => Self::Tuple(capture_all(xs.iter())?),
            Value::Dict(d) => Self::Dict(
                d.iter()
                    .map(|(k, v)| Some((Self::capture(k.value())?, Self::capture(v)?)))
                    .collect::<Option<_>>()?,
            ),
            Value::Builtin(b) => Self::Builtin(b.qualified_name()),
            Value::Module(m) => Self::Module(m.name.to_string()),
            Value::Method(m) => Self::Method(Box::new(Self::capture(&m.0)?), m.1.qualified_name()),
            Value::Lambda(_) => return None,
            Value::Remote(r) => Self::Remote {
                name: r.name.clone(),
                host_expr: r.host_expr.clone(),
                args: capture_all(r.args.iter())?,
                kwargs: r
                    .kwargs
                    .iter()
                    .map(|(k, v)| Some((k.clone(), Self::capture(v)?)))
                    .collect::<Option<_>>()?,
                host: match &r.host {
                    Some(h) => Some(Box::new(Self::capture(h)?)),
                    None => None,
                },
            },
        })
    }

    pub fn restore(self) -> Result<Value, EvalError> {
        let unknown = |what: &str, name: &str| EvalError::Spawn(format!("unknown {what} '{name}'"));
        Ok(match self {
            Self::None => Value::None,
            Self::Bool(b) => Value::Bool(b),
            Self::Int(i) => Value::Int(i),
            Self::Float(x) => Value::Float(x),
            Self::Str(s) => Value::from(s),
            Self::List(xs) => Value::list(restore_all(xs)?),
            Self::Tuple(xs) => Value::tuple(restore_all(xs)?),
            Self::Dict(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (k, v) in entries {
                    map.insert(Key::new(k.restore()?)?, v.restore()?);
                }
                Value::dict(map)
            }
            Self::Builtin(name) => Value::Builtin(
                builtins::lookup_qualified(&name).ok_or_else(|| unknown("builtin", &name))?,
            ),
            Self::Module(name) => {
                Value::Module(modules::find(&name).ok_or_else(|| unknown("module", &name))?)
            }
            Self::Method(receiver, name) => {
                let method =
                    builtins::lookup_qualified(&name).ok_or_else(|| unknown("method", &name))?;
                Value::Method(Arc::new((receiver.restore()?, method)))
            }
            Self::Remote {
                name,
                host_expr,
                args,
                kwargs,
                host,
            } => {
                let mut r = RemoteFunction::new(
                    &name,
                    &host_expr,
                    restore_all(args)?,
                    kwargs
                        .into_iter()
                        .map(|(k, v)| Ok((k, v.restore()?)))
                        .collect::<Result<_, EvalError>>()?,
                );
                r.host = host.map(|h| h.restore()).transpose()?;
                Value::Remote(Arc::new(r))
            }
        })
    }
}

/// The bindings of an [`Env`] that can cross a process boundary
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub globals: BTreeMap<String, Portable>,
    pub locals: BTreeMap<String, Portable>,
}

impl Snapshot {
    /// Fails with [`EvalError::Capture`] only for a binding named in `needed`
    pub fn capture(env: &Env, needed: &BTreeSet<String>) -> Result<Self, EvalError> {
        let take = |scope: &std::collections::HashMap<String, Value>| {
            let mut out = BTreeMap::new();
            for (name, v) in scope {
                match Portable::capture(v) {
                    Some(p) => {
                        out.insert(name.clone(), p);
                    }
                    None if needed.contains(name) => return Err(EvalError::Capture(name.clone())),
                    None => debug!(%name, "binding left out of spawned process"),
                }
            }
            Ok(out)
        };
        Ok(Self {
            globals: take(&env.globals)?,
            locals: take(&env.locals)?,
        })
    }

    pub fn restore(self) -> Result<Env, EvalError> {
        let mut env = Env::new();
        for (name, v) in self.globals {
            env.bind_global(name, v.restore()?);
        }
        for (name, v) in self.locals {
            env.bind(name, v.restore()?);
        }
        Ok(env)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub text: String,
    pub snapshot: Snapshot,
    pub depth: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpawnResponse {
    Ok { value: Portable, output: Vec<String> },
    Err { message: String },
}

fn worker_program(settings: &Settings) -> Result<std::path::PathBuf, EvalError> {
    match &settings.worker_program {
        Some(program) => Ok(program.clone().into_std_path_buf()),
        None => std::env::current_exe().map_err(|e| EvalError::Spawn(e.to_string())),
    }
}

/// Runs preprocessed node `text` in a worker process, blocking until it exits.
///
/// Lines the worker printed are replayed through `output`.
pub fn run(
    settings: &Settings,
    output: &Output,
    text: &str,
    env: &Env,
    depth: usize,
) -> Result<Value, EvalError> {
    let source = parser::parse_source(text)?;
    let mut needed = source.free_names();
    needed.insert(UNDERSCORE.to_string());
    let request = SpawnRequest {
        text: text.to_string(),
        snapshot: Snapshot::capture(env, &needed)?,
        depth,
    };
    let body = serde_json::to_vec(&request).map_err(|e| EvalError::Spawn(e.to_string()))?;

    let program = worker_program(settings)?;
    info!(program = %program.display(), %text, "spawning worker");
    let mut child = Command::new(&program)
        .arg("worker")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| EvalError::Spawn(format!("{}: {e}", program.display())))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(&body)
            .map_err(|e| EvalError::Spawn(e.to_string()))?;
    }
    let finished = child
        .wait_with_output()
        .map_err(|e| EvalError::Spawn(e.to_string()))?;
    if !finished.status.success() {
        return Err(EvalError::Spawn(format!(
            "worker exited with {}",
            finished.status
        )));
    }
    let response: SpawnResponse = serde_json::from_slice(&finished.stdout)
        .map_err(|e| EvalError::Spawn(format!("unreadable worker response: {e}")))?;
    match response {
        SpawnResponse::Ok { value, output: lines } => {
            for line in lines {
                output.println(&line);
            }
            value.restore()
        }
        SpawnResponse::Err { message } => Err(EvalError::Spawn(message)),
    }
}

fn handle(request: SpawnRequest, settings: Settings) -> SpawnResponse {
    let runtime = Runtime::with_settings(settings).with_output(Output::capture());
    let result = request.snapshot.restore().and_then(|mut env| {
        compiler::execute(&runtime, &mut env, &request.text, request.depth)
    });
    match result {
        Ok(value) => match Portable::capture(&value) {
            Some(value) => SpawnResponse::Ok {
                value,
                output: runtime.take_output(),
            },
            None => SpawnResponse::Err {
                message: format!("a {} cannot be returned from a spawned process", value.type_name()),
            },
        },
        Err(e) => SpawnResponse::Err {
            message: e.to_string(),
        },
    }
}

/// Serves one request read from `input`, writing the response to `output`
pub fn serve(mut input: impl Read, mut output: impl Write, settings: Settings) -> Result<(), EvalError> {
    let mut body = Vec::new();
    input
        .read_to_end(&mut body)
        .map_err(|e| EvalError::Spawn(e.to_string()))?;
    let response = match serde_json::from_slice::<SpawnRequest>(&body) {
        Ok(request) => handle(request, settings),
        Err(e) => SpawnResponse::Err {
            message: format!("malformed request: {e}"),
        },
    };
    serde_json::to_writer(&mut output, &response).map_err(|e| EvalError::Spawn(e.to_string()))?;
    output.flush().map_err(|e| EvalError::Spawn(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::tests::run as eval;

    #[test]
    fn values_cross_as_plain_data() {
        let mut env = Env::new();
        let v = eval(
            &mut env,
            "[1, 2.5, 'x', (None, True), {'k': [len, 'a b'.split]}, remotefunction('f', 'None', 3)]",
        )
        .unwrap();
        let p = Portable::capture(&v).unwrap();
        let json = serde_json::to_string(&p).unwrap();
        let back: Portable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.restore().unwrap().repr(), v.repr());
        assert!(Portable::capture(&eval(&mut env, "[lambda: 1]").unwrap()).is_none());
    }

    #[test]
    fn lambdas_are_left_out_unless_needed() {
        let mut env = Env::new();
        eval(&mut env, "f = lambda x: x").unwrap();
        eval(&mut env, "n = 2").unwrap();
        let none = BTreeSet::new();
        let snap = Snapshot::capture(&env, &none).unwrap();
        assert!(snap.locals.contains_key("n"));
        assert!(!snap.locals.contains_key("f"));

        let needed = BTreeSet::from(["f".to_string()]);
        assert!(matches!(
            Snapshot::capture(&env, &needed),
            Err(EvalError::Capture(name)) if name == "f"
        ));
    }

    #[test]
    fn worker_answers_requests() {
        let mut env = Env::new();
        env.set_underscore(Value::Int(4));
        env.bind("k", Value::Int(10));
        let request = SpawnRequest {
            text: "__print__(k) or _ * k".into(),
            snapshot: Snapshot::capture(&env, &BTreeSet::new()).unwrap(),
            depth: 0,
        };
        let mut out = Vec::new();
        serve(
            serde_json::to_vec(&request).unwrap().as_slice(),
            &mut out,
            Settings::default(),
        )
        .unwrap();
        let response: SpawnResponse = serde_json::from_slice(&out).unwrap();
        assert_eq!(
            response,
            SpawnResponse::Ok {
                value: Portable::Int(40),
                output: vec!["10".into()]
            }
        );

        let mut out = Vec::new();
        serve(&b"{}"[..], &mut out, Settings::default()).unwrap();
        let response: SpawnResponse = serde_json::from_slice(&out).unwrap();
        assert!(matches!(response, SpawnResponse::Err { .. }));
    }
}
