//! Importable modules, and the default [`Resolver`] that auto-imports from them
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use rand::{seq::SliceRandom, Rng};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::{
    error::EvalError,
    eval::{
        builtins::{self, expect_float, expect_int, expect_str},
        Builtin, Context, Kwargs, Member, Module, Resolver,
    },
    value::{Key, Value},
};

type Res = Result<Value, EvalError>;

pub static OS: Module = Module {
    name: "os",
    members: &[
        Member::Func(Builtin::new("getpid", 0, Some(0), getpid).in_module("os")),
        Member::Func(Builtin::new("pid", 0, Some(0), getpid).in_module("os")),
        Member::Func(Builtin::new("getcwd", 0, Some(0), getcwd).in_module("os")),
        Member::Func(Builtin::new("getenv", 1, Some(2), getenv).in_module("os")),
        Member::Const("sep", sep),
    ],
};

pub static MATH: Module = Module {
    name: "math",
    members: &[
        Member::Func(Builtin::new("sqrt", 1, Some(1), sqrt).in_module("math")),
        Member::Func(Builtin::new("floor", 1, Some(1), floor).in_module("math")),
        Member::Func(Builtin::new("ceil", 1, Some(1), ceil).in_module("math")),
        Member::Func(Builtin::new("pow", 2, Some(2), pow).in_module("math")),
        Member::Func(Builtin::new("fabs", 1, Some(1), fabs).in_module("math")),
        Member::Func(Builtin::new("log", 1, Some(2), log).in_module("math")),
        Member::Func(Builtin::new("exp", 1, Some(1), exp).in_module("math")),
        Member::Const("pi", pi),
        Member::Const("e", e),
    ],
};

pub static STRING: Module = Module {
    name: "string",
    members: &[
        Member::Func(Builtin::new("split", 1, Some(3), builtins::split).in_module("string")),
        Member::Func(Builtin::new("join", 1, Some(2), join).in_module("string")),
        Member::Func(Builtin::new("upper", 1, Some(1), upper).in_module("string")),
        Member::Func(Builtin::new("lower", 1, Some(1), lower).in_module("string")),
        Member::Func(Builtin::new("strip", 1, Some(1), strip).in_module("string")),
        Member::Func(Builtin::new("replace", 3, Some(3), replace).in_module("string")),
        Member::Func(Builtin::new("capitalize", 1, Some(1), capitalize).in_module("string")),
    ],
};

pub static TIME: Module = Module {
    name: "time",
    members: &[
        Member::Func(Builtin::new("time", 0, Some(0), time).in_module("time")),
        Member::Func(Builtin::new("sleep", 1, Some(1), sleep).in_module("time")),
    ],
};

pub static RANDOM: Module = Module {
    name: "random",
    members: &[
        Member::Func(Builtin::new("random", 0, Some(0), random).in_module("random")),
        Member::Func(Builtin::new("randint", 2, Some(2), randint).in_module("random")),
        Member::Func(Builtin::new("choice", 1, Some(1), choice).in_module("random")),
    ],
};

pub static JSON: Module = Module {
    name: "json",
    members: &[
        Member::Func(Builtin::new("dumps", 1, Some(1), dumps).in_module("json")),
        Member::Func(Builtin::new("loads", 1, Some(1), loads).in_module("json")),
    ],
};

/// Modules in resolution order
pub static MODULES: [&Module; 6] = [&OS, &MATH, &STRING, &TIME, &RANDOM, &JSON];

pub fn find(name: &str) -> Option<&'static Module> {
    MODULES.iter().copied().find(|m| m.name == name)
}

/// Resolves a module by name, otherwise the first module member with that name
#[derive(Clone, Copy, Debug, Default)]
pub struct ModuleResolver;

impl Resolver for ModuleResolver {
    fn resolve(&self, name: &str) -> Option<Value> {
        if let Some(module) = find(name) {
            return Some(Value::Module(module));
        }
        MODULES.iter().find_map(|m| m.get(name))
    }
}

fn getpid(_: &Context<'_>, _: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::Int(std::process::id() as i64))
}

fn getcwd(_: &Context<'_>, _: Vec<Value>, _: Kwargs) -> Res {
    let dir = std::env::current_dir().map_err(|e| EvalError::Value(e.to_string()))?;
    Ok(Value::from(dir.to_string_lossy().into_owned()))
}

fn getenv(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let name = expect_str(&args[0], "getenv()")?;
    Ok(match std::env::var(name) {
        Ok(v) => Value::from(v),
        Err(_) => args.get(1).cloned().unwrap_or(Value::None),
    })
}

fn sep() -> Value {
    Value::from(std::path::MAIN_SEPARATOR.to_string())
}

fn pi() -> Value {
    Value::Float(std::f64::consts::PI)
}

fn e() -> Value {
    Value::Float(std::f64::consts::E)
}

fn sqrt(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let x = expect_float(&args[0], "sqrt()")?;
    if x < 0.0 {
        return Err(EvalError::value_error("math domain error"));
    }
    Ok(Value::Float(x.sqrt()))
}

fn floor(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::Int(expect_float(&args[0], "floor()")?.floor() as i64))
}

fn ceil(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::Int(expect_float(&args[0], "ceil()")?.ceil() as i64))
}

fn pow(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let x = expect_float(&args[0], "pow()")?;
    let y = expect_float(&args[1], "pow()")?;
    Ok(Value::Float(x.powf(y)))
}

fn fabs(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::Float(expect_float(&args[0], "fabs()")?.abs()))
}

fn log(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let x = expect_float(&args[0], "log()")?;
    if x <= 0.0 {
        return Err(EvalError::value_error("math domain error"));
    }
    match args.get(1) {
        None => Ok(Value::Float(x.ln())),
        Some(base) => Ok(Value::Float(x.log(expect_float(base, "log()")?))),
    }
}

fn exp(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::Float(expect_float(&args[0], "exp()")?.exp()))
}

/// `string.join(words[, sep])`, separating with a space by default
fn join(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let sep = match args.get(1) {
        Some(v) => expect_str(v, "join()")?,
        None => " ",
    };
    let words = args[0]
        .iterate()?
        .iter()
        .map(|w| expect_str(w, "join()").map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::from(words.join(sep)))
}

fn upper(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::from(expect_str(&args[0], "upper()")?.to_uppercase()))
}

fn lower(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::from(expect_str(&args[0], "lower()")?.to_lowercase()))
}

fn strip(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::from(expect_str(&args[0], "strip()")?.trim()))
}

fn replace(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let s = expect_str(&args[0], "replace()")?;
    let old = expect_str(&args[1], "replace()")?;
    let new = expect_str(&args[2], "replace()")?;
    Ok(Value::from(s.replace(old, new)))
}

fn capitalize(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let s = expect_str(&args[0], "capitalize()")?;
    let mut chars = s.chars();
    Ok(Value::from(match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect::<String>(),
        None => String::new(),
    }))
}

fn time(_: &Context<'_>, _: Vec<Value>, _: Kwargs) -> Res {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| EvalError::Value(e.to_string()))?;
    Ok(Value::Float(now.as_secs_f64()))
}

fn sleep(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let secs = expect_float(&args[0], "sleep()")?;
    if secs < 0.0 || !secs.is_finite() {
        return Err(EvalError::value_error("sleep length must be non-negative"));
    }
    std::thread::sleep(Duration::from_secs_f64(secs));
    Ok(Value::None)
}

fn random(_: &Context<'_>, _: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::Float(rand::thread_rng().gen::<f64>()))
}

fn randint(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let lo = expect_int(&args[0], "randint()")?;
    let hi = expect_int(&args[1], "randint()")?;
    if lo > hi {
        return Err(EvalError::value_error(format!(
            "empty range for randint() ({lo}, {hi})"
        )));
    }
    Ok(Value::Int(rand::thread_rng().gen_range(lo..=hi)))
}

fn choice(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    args[0]
        .iterate()?
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| EvalError::Index("cannot choose from an empty sequence".into()))
}

/// Borrowed view of a value that serializes the way `json.dumps` renders it
struct Json<'a>(&'a Value);

impl Serialize for Json<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error;
        match self.0 {
            Value::None => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) if x.is_finite() => serializer.serialize_f64(*x),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(xs) | Value::Tuple(xs) => {
                let mut seq = serializer.serialize_seq(Some(xs.len()))?;
                for x in xs.iter() {
                    seq.serialize_element(&Json(x))?;
                }
                seq.end()
            }
            Value::Dict(d) => {
                let mut map = serializer.serialize_map(Some(d.len()))?;
                for (k, v) in d.iter() {
                    let key = match k.value() {
                        Value::Str(s) => s.to_string(),
                        Value::None => "null".into(),
                        Value::Bool(b) => b.to_string(),
                        other => other.to_string(),
                    };
                    map.serialize_entry(&key, &Json(v))?;
                }
                map.end()
            }
            v => Err(S::Error::custom(format!(
                "Object of type {} is not JSON serializable",
                v.type_name()
            ))),
        }
    }
}

/// Separators as in `json.dumps`: `", "` between items, `": "` after keys
struct PythonFormatter;

impl serde_json::ser::Formatter for PythonFormatter {
    fn begin_array_value<W: ?Sized + std::io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> std::io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + std::io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> std::io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + std::io::Write>(
        &mut self,
        writer: &mut W,
    ) -> std::io::Result<()> {
        writer.write_all(b": ")
    }
}

pub fn to_json(v: &Value) -> Result<String, EvalError> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PythonFormatter);
    Json(v)
        .serialize(&mut ser)
        .map_err(|e| EvalError::type_error(e.to_string()))?;
    String::from_utf8(out).map_err(|e| EvalError::value_error(e.to_string()))
}

pub fn from_json(v: serde_json::Value) -> Result<Value, EvalError> {
    Ok(match v {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::from(s),
        serde_json::Value::Array(xs) => {
            Value::list(xs.into_iter().map(from_json).collect::<Result<_, _>>()?)
        }
        serde_json::Value::Object(m) => {
            let mut map = IndexMap::with_capacity(m.len());
            for (k, v) in m {
                map.insert(Key::new(Value::from(k))?, from_json(v)?);
            }
            Value::dict(map)
        }
    })
}

fn dumps(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    to_json(&args[0]).map(Value::from)
}

fn loads(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let text = expect_str(&args[0], "loads()")?;
    let v = serde_json::from_str(text).map_err(|e| EvalError::value_error(e.to_string()))?;
    from_json(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Env;
    use crate::eval::tests::run;

    #[test]
    fn resolver_prefers_modules_then_members() {
        let r = ModuleResolver;
        assert!(matches!(r.resolve("math"), Some(Value::Module(m)) if m.name == "math"));
        assert!(matches!(r.resolve("split"), Some(Value::Builtin(b)) if b.qualified_name() == "string.split"));
        assert!(matches!(r.resolve("pid"), Some(Value::Builtin(b)) if b.module == Some("os")));
        assert_eq!(r.resolve("pi"), Some(Value::Float(std::f64::consts::PI)));
        assert!(r.resolve("no_such_name").is_none());
    }

    #[test]
    fn module_functions() {
        let mut env = Env::new();
        run(&mut env, "import os, math, string, json, random").unwrap();
        assert_eq!(
            run(&mut env, "os.getpid()").unwrap(),
            Value::Int(std::process::id() as i64)
        );
        assert_eq!(run(&mut env, "math.sqrt(16)").unwrap(), Value::Float(4.0));
        assert_eq!(run(&mut env, "math.ceil(1.2)").unwrap(), Value::Int(2));
        assert_eq!(
            run(&mut env, "string.join(['a', 'b'])").unwrap(),
            Value::from("a b")
        );
        assert_eq!(
            run(&mut env, "string.split('Hello world')").unwrap().repr(),
            "['Hello', 'world']"
        );
        let r = run(&mut env, "random.randint(1, 3)").unwrap();
        assert!((1..=3).contains(&r.as_int().unwrap()));
        assert!(run(&mut env, "math.sqrt(-1)").is_err());
    }

    #[test]
    fn json_round_trip() {
        let mut env = Env::new();
        run(&mut env, "import json").unwrap();
        assert_eq!(
            run(&mut env, "json.dumps({'a': [1, 2.5, None, True]})").unwrap(),
            Value::from(r#"{"a": [1, 2.5, null, true]}"#)
        );
        assert_eq!(
            run(&mut env, "json.loads('[1, \"x\", {\"k\": false}]')")
                .unwrap()
                .repr(),
            "[1, 'x', {'k': False}]"
        );
        assert!(run(&mut env, "json.dumps(len)").is_err());
    }
}
