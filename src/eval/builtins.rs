//! Functions that are always in scope, and the methods of strings, sequences and dicts
use std::cmp::Ordering;
use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;

use crate::{
    error::EvalError,
    eval::{eval_str, Builtin, Context, Kwargs, ANY_KWARGS},
    remote::RemoteFunction,
    value::{Key, Value},
};

type Res = Result<Value, EvalError>;

pub static BUILTINS: &[Builtin] = &[
    Builtin::new("len", 1, Some(1), len),
    Builtin::new("str", 0, Some(1), str_),
    Builtin::new("repr", 1, Some(1), repr),
    Builtin::new("int", 0, Some(2), int),
    Builtin::new("float", 0, Some(1), float),
    Builtin::new("bool", 0, Some(1), bool_),
    Builtin::new("list", 0, Some(1), list),
    Builtin::new("tuple", 0, Some(1), tuple),
    Builtin::new("dict", 0, Some(1), dict).with_kwargs(ANY_KWARGS),
    Builtin::new("range", 1, Some(3), range),
    Builtin::new("sum", 1, Some(2), sum),
    Builtin::new("min", 1, None, min).with_kwargs(&["key"]),
    Builtin::new("max", 1, None, max).with_kwargs(&["key"]),
    Builtin::new("abs", 1, Some(1), abs),
    Builtin::new("round", 1, Some(2), round),
    Builtin::new("sorted", 1, Some(1), sorted).with_kwargs(&["key", "reverse"]),
    Builtin::new("reversed", 1, Some(1), reversed),
    Builtin::new("enumerate", 1, Some(2), enumerate),
    Builtin::new("zip", 0, None, zip),
    Builtin::new("map", 2, None, map),
    Builtin::new("filter", 2, Some(2), filter),
    Builtin::new("any", 1, Some(1), any),
    Builtin::new("all", 1, Some(1), all),
    Builtin::new("type", 1, Some(1), type_),
    Builtin::new("print", 0, None, print).with_kwargs(&["sep"]),
    Builtin::new("eval", 1, Some(1), eval),
    Builtin::new("remotefunction", 2, None, remotefunction).with_kwargs(ANY_KWARGS),
    // Targets of the `print` and backtick rewrites
    Builtin::new("__print__", 0, None, print).with_kwargs(&["sep"]),
    Builtin::new("__eval__", 1, Some(1), eval_program),
];

pub static STR_METHODS: &[Builtin] = &[
    Builtin::new("upper", 1, Some(1), upper).in_module("str"),
    Builtin::new("lower", 1, Some(1), lower).in_module("str"),
    Builtin::new("strip", 1, Some(2), strip).in_module("str"),
    Builtin::new("lstrip", 1, Some(2), lstrip).in_module("str"),
    Builtin::new("rstrip", 1, Some(2), rstrip).in_module("str"),
    Builtin::new("split", 1, Some(3), split).in_module("str"),
    Builtin::new("join", 2, Some(2), join).in_module("str"),
    Builtin::new("replace", 3, Some(3), replace).in_module("str"),
    Builtin::new("startswith", 2, Some(2), startswith).in_module("str"),
    Builtin::new("endswith", 2, Some(2), endswith).in_module("str"),
    Builtin::new("find", 2, Some(2), find).in_module("str"),
    Builtin::new("count", 2, Some(2), count).in_module("str"),
    Builtin::new("title", 1, Some(1), title).in_module("str"),
    Builtin::new("capitalize", 1, Some(1), capitalize).in_module("str"),
];

pub static SEQUENCE_METHODS: &[Builtin] = &[
    Builtin::new("index", 2, Some(2), seq_index).in_module("list"),
    Builtin::new("count", 2, Some(2), seq_count).in_module("list"),
];

pub static DICT_METHODS: &[Builtin] = &[
    Builtin::new("get", 2, Some(3), dict_get).in_module("dict"),
    Builtin::new("keys", 1, Some(1), dict_keys).in_module("dict"),
    Builtin::new("values", 1, Some(1), dict_values).in_module("dict"),
    Builtin::new("items", 1, Some(1), dict_items).in_module("dict"),
];

pub fn lookup(name: &str) -> Option<Value> {
    BUILTINS
        .iter()
        .find(|b| b.name == name)
        .map(Value::Builtin)
}

fn methods_of(v: &Value) -> &'static [Builtin] {
    match v {
        Value::Str(_) => STR_METHODS,
        Value::List(_) | Value::Tuple(_) => SEQUENCE_METHODS,
        Value::Dict(_) => DICT_METHODS,
        _ => &[],
    }
}

/// Looks up `name` among the methods of `v`'s type, bound to `v`
pub fn method(v: &Value, name: &str) -> Option<Value> {
    methods_of(v)
        .iter()
        .find(|b| b.name == name)
        .map(|b| Value::Method(Arc::new((v.clone(), b))))
}

/// Finds a builtin or method by the name [`Builtin::qualified_name`] gives it
pub fn lookup_qualified(name: &str) -> Option<&'static Builtin> {
    let (module, short) = match name.split_once('.') {
        Some((module, short)) => (Some(module), short),
        None => (None, name),
    };
    let table: &'static [Builtin] = match module {
        None => BUILTINS,
        Some("str") => STR_METHODS,
        Some("list") => SEQUENCE_METHODS,
        Some("dict") => DICT_METHODS,
        Some(module) => {
            return super::modules::find(module).and_then(|m| {
                m.members.iter().find_map(|member| match member {
                    super::Member::Func(b) if b.name == short => Some(b),
                    _ => None,
                })
            })
        }
    };
    table.iter().find(|b| b.name == short)
}

pub(crate) fn expect_str<'a>(v: &'a Value, what: &str) -> Result<&'a str, EvalError> {
    v.as_str().ok_or_else(|| {
        EvalError::type_error(format!("{what} expected a string, got {}", v.type_name()))
    })
}

pub(crate) fn expect_int(v: &Value, what: &str) -> Result<i64, EvalError> {
    v.as_int().ok_or_else(|| {
        EvalError::type_error(format!("{what} expected an integer, got {}", v.type_name()))
    })
}

pub(crate) fn expect_float(v: &Value, what: &str) -> Result<f64, EvalError> {
    v.as_float().ok_or_else(|| {
        EvalError::type_error(format!("{what} expected a number, got {}", v.type_name()))
    })
}

fn take_kwarg(kwargs: &mut Kwargs, name: &str) -> Option<Value> {
    let i = kwargs.iter().position(|(k, _)| k == name)?;
    Some(kwargs.remove(i).1)
}

fn len(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let n = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(xs) | Value::Tuple(xs) => xs.len(),
        Value::Dict(d) => d.len(),
        v => {
            return Err(EvalError::type_error(format!(
                "object of type '{}' has no len()",
                v.type_name()
            )))
        }
    };
    Ok(Value::Int(n as i64))
}

fn str_(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::from(
        args.first().map(Value::to_string).unwrap_or_default(),
    ))
}

fn repr(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::from(args[0].repr()))
}

fn int(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let Some(v) = args.first() else {
        return Ok(Value::Int(0));
    };
    let base = args.get(1).map(|b| expect_int(b, "int()")).transpose()?;
    match (v, base) {
        (Value::Str(s), base) => {
            let radix = base.unwrap_or(10);
            if !(2..=36).contains(&radix) {
                return Err(EvalError::value_error("int() base must be >= 2 and <= 36"));
            }
            let radix = radix as u32;
            i64::from_str_radix(s.trim(), radix)
                .map(Value::Int)
                .map_err(|_| {
                    EvalError::value_error(format!(
                        "invalid literal for int() with base {radix}: {}",
                        v.repr()
                    ))
                })
        }
        (Value::Float(x), None) => Ok(Value::Int(x.trunc() as i64)),
        (v, None) if v.as_int().is_some() => Ok(Value::Int(v.as_int().unwrap_or(0))),
        (v, _) => Err(EvalError::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            v.type_name()
        ))),
    }
}

fn float(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    match args.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(s)) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            EvalError::value_error(format!("could not convert string to float: '{s}'"))
        }),
        Some(v) => expect_float(v, "float()").map(Value::Float),
    }
}

fn bool_(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::Bool(args.first().map_or(false, Value::is_truthy)))
}

fn list(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    match args.first() {
        None => Ok(Value::list(vec![])),
        Some(v) => Ok(Value::list(v.iterate()?)),
    }
}

fn tuple(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    match args.first() {
        None => Ok(Value::tuple(vec![])),
        Some(v) => Ok(Value::tuple(v.iterate()?)),
    }
}

fn pair(v: Value) -> Result<(Value, Value), EvalError> {
    match v.iterate()?.as_slice() {
        [k, v] => Ok((k.clone(), v.clone())),
        xs => Err(EvalError::value_error(format!(
            "dictionary update sequence element has length {}; 2 is required",
            xs.len()
        ))),
    }
}

fn dict(_: &Context<'_>, args: Vec<Value>, kwargs: Kwargs) -> Res {
    let mut map = IndexMap::new();
    match args.into_iter().next() {
        Some(Value::Dict(d)) => map.extend(d.iter().map(|(k, v)| (k.clone(), v.clone()))),
        Some(v) => {
            for item in v.iterate()? {
                let (k, v) = pair(item)?;
                map.insert(Key::new(k)?, v);
            }
        }
        None => (),
    }
    for (k, v) in kwargs {
        map.insert(Key::new(Value::from(k))?, v);
    }
    Ok(Value::dict(map))
}

fn range(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let ints = args
        .iter()
        .map(|a| expect_int(a, "range()"))
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(EvalError::type_error("range expected 1 to 3 arguments")),
    };
    if step == 0 {
        return Err(EvalError::value_error("range() arg 3 must not be zero"));
    }
    let mut out = vec![];
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(Value::Int(i));
        i += step;
    }
    Ok(Value::list(out))
}

fn sum(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let start = args.get(1).cloned().unwrap_or(Value::Int(0));
    args[0].iterate()?.iter().try_fold(start, |acc, x| {
        super::ops::binary(crate::syntax::BinOp::Add, &acc, x)
    })
}

/// The candidates of `min`/`max`: one iterable argument or several positional ones
fn candidates(args: Vec<Value>) -> Result<Vec<Value>, EvalError> {
    if args.len() == 1 {
        args[0].iterate()
    } else {
        Ok(args)
    }
}

fn extreme(
    ctx: &Context<'_>,
    args: Vec<Value>,
    mut kwargs: Kwargs,
    name: &str,
    wanted: Ordering,
) -> Res {
    let key = take_kwarg(&mut kwargs, "key");
    let mut best: Option<(Value, Value)> = None;
    for x in candidates(args)? {
        let k = match &key {
            Some(f) => ctx.call(f, vec![x.clone()], vec![])?,
            None => x.clone(),
        };
        best = match best {
            Some((bk, bx)) if k.compare(&bk)? != wanted => Some((bk, bx)),
            _ => Some((k, x)),
        };
    }
    best.map(|(_, x)| x)
        .ok_or_else(|| EvalError::value_error(format!("{name}() arg is an empty sequence")))
}

fn min(ctx: &Context<'_>, args: Vec<Value>, kwargs: Kwargs) -> Res {
    extreme(ctx, args, kwargs, "min", Ordering::Less)
}

fn max(ctx: &Context<'_>, args: Vec<Value>, kwargs: Kwargs) -> Res {
    extreme(ctx, args, kwargs, "max", Ordering::Greater)
}

fn abs(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    match &args[0] {
        Value::Float(x) => Ok(Value::Float(x.abs())),
        v => expect_int(v, "abs()")?
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| EvalError::value_error("integer overflow")),
    }
}

fn round(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let x = expect_float(&args[0], "round()")?;
    match args.get(1) {
        None => Ok(Value::Int(round_half_even(x) as i64)),
        Some(n) => {
            let scale = 10f64.powi(expect_int(n, "round()")? as i32);
            Ok(Value::Float(round_half_even(x * scale) / scale))
        }
    }
}

/// Banker's rounding, as Python's `round` does
fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
        r - x.signum()
    } else {
        r
    }
}

fn sorted(ctx: &Context<'_>, args: Vec<Value>, mut kwargs: Kwargs) -> Res {
    let key = take_kwarg(&mut kwargs, "key");
    let reverse = take_kwarg(&mut kwargs, "reverse").map_or(false, |r| r.is_truthy());
    let mut keyed = vec![];
    for x in args[0].iterate()? {
        let k = match &key {
            Some(f) => ctx.call(f, vec![x.clone()], vec![])?,
            None => x.clone(),
        };
        keyed.push((k, x));
    }
    // sort_by cannot fail, so the first comparison error is kept aside
    let mut failure = None;
    keyed.sort_by(|(a, _), (b, _)| match a.compare(b) {
        Ok(o) => o,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    if reverse {
        keyed.reverse();
    }
    Ok(Value::list(keyed.into_iter().map(|(_, x)| x).collect()))
}

fn reversed(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let mut xs = args[0].iterate()?;
    xs.reverse();
    Ok(Value::list(xs))
}

fn enumerate(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let start = args.get(1).map(|s| expect_int(s, "enumerate()")).transpose()?;
    let start = start.unwrap_or(0);
    Ok(Value::list(
        args[0]
            .iterate()?
            .into_iter()
            .enumerate()
            .map(|(i, x)| Value::tuple(vec![Value::Int(start + i as i64), x]))
            .collect(),
    ))
}

fn transpose(columns: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    let n = columns.iter().map(Vec::len).min().unwrap_or(0);
    (0..n)
        .map(|i| columns.iter().map(|c| c[i].clone()).collect())
        .collect()
}

fn zip(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let columns = args
        .iter()
        .map(Value::iterate)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::list(
        transpose(columns).into_iter().map(Value::tuple).collect(),
    ))
}

fn map(ctx: &Context<'_>, mut args: Vec<Value>, _: Kwargs) -> Res {
    let f = args.remove(0);
    let columns = args
        .iter()
        .map(Value::iterate)
        .collect::<Result<Vec<_>, _>>()?;
    transpose(columns)
        .into_iter()
        .map(|row| ctx.call(&f, row, vec![]))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::list)
}

fn filter(ctx: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let mut out = vec![];
    for x in args[1].iterate()? {
        let keep = match &args[0] {
            Value::None => x.is_truthy(),
            f => ctx.call(f, vec![x.clone()], vec![])?.is_truthy(),
        };
        if keep {
            out.push(x);
        }
    }
    Ok(Value::list(out))
}

fn any(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::Bool(args[0].iterate()?.iter().any(Value::is_truthy)))
}

fn all(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::Bool(args[0].iterate()?.iter().all(Value::is_truthy)))
}

fn type_(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::from(args[0].type_name()))
}

/// Prints one whole line through the host's locked output
fn print(ctx: &Context<'_>, args: Vec<Value>, mut kwargs: Kwargs) -> Res {
    let sep = match take_kwarg(&mut kwargs, "sep") {
        Some(v) => expect_str(&v, "print()")?.to_string(),
        None => " ".to_string(),
    };
    let line = args.iter().map(Value::to_string).join(&sep);
    ctx.host.output().println(&line);
    Ok(Value::None)
}

fn eval(ctx: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    eval_str(ctx, expect_str(&args[0], "eval()")?)
}

fn eval_program(ctx: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let source = expect_str(&args[0], "__eval__()")?;
    ctx.host
        .eval_program(source, ctx.env.clone(), ctx.depth + 1)
}

fn remotefunction(_: &Context<'_>, mut args: Vec<Value>, kwargs: Kwargs) -> Res {
    let rest = args.split_off(2);
    let name = expect_str(&args[0], "remotefunction()")?;
    let host = expect_str(&args[1], "remotefunction()")?;
    Ok(Value::Remote(Arc::new(RemoteFunction::new(
        name, host, rest, kwargs,
    ))))
}

fn receiver<'a>(args: &'a [Value]) -> Result<&'a str, EvalError> {
    expect_str(&args[0], "descriptor")
}

fn upper(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::from(receiver(&args)?.to_uppercase()))
}

fn lower(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::from(receiver(&args)?.to_lowercase()))
}

fn strip_chars(args: &[Value]) -> Result<Option<Vec<char>>, EvalError> {
    match args.get(1) {
        None | Some(Value::None) => Ok(None),
        Some(v) => Ok(Some(expect_str(v, "strip()")?.chars().collect())),
    }
}

fn strip(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let s = receiver(&args)?;
    Ok(Value::from(match strip_chars(&args)? {
        None => s.trim(),
        Some(cs) => s.trim_matches(cs.as_slice()),
    }))
}

fn lstrip(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let s = receiver(&args)?;
    Ok(Value::from(match strip_chars(&args)? {
        None => s.trim_start(),
        Some(cs) => s.trim_start_matches(cs.as_slice()),
    }))
}

fn rstrip(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let s = receiver(&args)?;
    Ok(Value::from(match strip_chars(&args)? {
        None => s.trim_end(),
        Some(cs) => s.trim_end_matches(cs.as_slice()),
    }))
}

/// `s.split([sep[, maxsplit]])`; without a separator, splits on runs of whitespace
pub(crate) fn split(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let s = receiver(&args)?;
    let sep = match args.get(1) {
        None | Some(Value::None) => None,
        Some(v) => Some(expect_str(v, "split()")?),
    };
    let maxsplit = match args.get(2) {
        None => None,
        Some(v) => usize::try_from(expect_int(v, "split()")?).ok(),
    };
    let parts: Vec<Value> = match (sep, maxsplit) {
        (Some(""), _) => return Err(EvalError::value_error("empty separator")),
        (Some(sep), None) => s.split(sep).map(Value::from).collect(),
        (Some(sep), Some(n)) => s.splitn(n + 1, sep).map(Value::from).collect(),
        (None, None) => s.split_whitespace().map(Value::from).collect(),
        (None, Some(n)) => {
            let mut out = vec![];
            let mut rest = s.trim_start();
            while !rest.is_empty() && out.len() < n {
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                out.push(Value::from(&rest[..end]));
                rest = rest[end..].trim_start();
            }
            if !rest.is_empty() {
                out.push(Value::from(rest));
            }
            out
        }
    };
    Ok(Value::list(parts))
}

fn join(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let sep = receiver(&args)?;
    let words = args[1]
        .iterate()?
        .iter()
        .map(|w| expect_str(w, "join()").map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::from(words.join(sep)))
}

fn replace(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let s = receiver(&args)?;
    let old = expect_str(&args[1], "replace()")?;
    let new = expect_str(&args[2], "replace()")?;
    Ok(Value::from(s.replace(old, new)))
}

fn startswith(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let prefix = expect_str(&args[1], "startswith()")?;
    Ok(Value::Bool(receiver(&args)?.starts_with(prefix)))
}

fn endswith(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let suffix = expect_str(&args[1], "endswith()")?;
    Ok(Value::Bool(receiver(&args)?.ends_with(suffix)))
}

fn find(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let s = receiver(&args)?;
    let sub = expect_str(&args[1], "find()")?;
    Ok(Value::Int(
        s.find(sub).map_or(-1, |i| s[..i].chars().count() as i64),
    ))
}

fn count(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let s = receiver(&args)?;
    let sub = expect_str(&args[1], "count()")?;
    let n = if sub.is_empty() {
        s.chars().count() + 1
    } else {
        s.matches(sub).count()
    };
    Ok(Value::Int(n as i64))
}

fn capitalize_word(w: &str) -> String {
    let mut chars = w.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn title(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let s = receiver(&args)?;
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(c);
            word_start = true;
        }
    }
    Ok(Value::from(out))
}

fn capitalize(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    Ok(Value::from(capitalize_word(receiver(&args)?)))
}

fn seq_index(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let xs = args[0].iterate()?;
    xs.iter()
        .position(|x| *x == args[1])
        .map(|i| Value::Int(i as i64))
        .ok_or_else(|| EvalError::value_error(format!("{} is not in list", args[1].repr())))
}

fn seq_count(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let xs = args[0].iterate()?;
    Ok(Value::Int(xs.iter().filter(|x| **x == args[1]).count() as i64))
}

fn receiver_dict(args: &[Value]) -> Result<&IndexMap<Key, Value>, EvalError> {
    match &args[0] {
        Value::Dict(d) => Ok(d),
        v => Err(EvalError::type_error(format!(
            "descriptor requires a 'dict' object but received a '{}'",
            v.type_name()
        ))),
    }
}

fn dict_get(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let d = receiver_dict(&args)?;
    Ok(d.get(&Key::new(args[1].clone())?)
        .cloned()
        .unwrap_or_else(|| args.get(2).cloned().unwrap_or(Value::None)))
}

fn dict_keys(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let d = receiver_dict(&args)?;
    Ok(Value::list(d.keys().map(|k| k.value().clone()).collect()))
}

fn dict_values(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let d = receiver_dict(&args)?;
    Ok(Value::list(d.values().cloned().collect()))
}

fn dict_items(_: &Context<'_>, args: Vec<Value>, _: Kwargs) -> Res {
    let d = receiver_dict(&args)?;
    Ok(Value::list(
        d.iter()
            .map(|(k, v)| Value::tuple(vec![k.value().clone(), v.clone()]))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use crate::env::Env;
    use crate::eval::tests::run;
    use crate::value::Value;

    fn eval(src: &str) -> Value {
        run(&mut Env::new(), src).unwrap()
    }

    fn eval_repr(src: &str) -> String {
        eval(src).repr()
    }

    #[test]
    fn conversions() {
        assert_eq!(eval("int('42')"), Value::Int(42));
        assert_eq!(eval("int('ff', 16)"), Value::Int(255));
        assert_eq!(eval("int(2.9)"), Value::Int(2));
        assert_eq!(eval("float('1.5')"), Value::Float(1.5));
        assert_eq!(eval("str(1.0)"), Value::from("1.0"));
        assert_eq!(eval("bool([])"), Value::Bool(false));
        assert_eq!(eval_repr("dict([('a', 1)], b=2)"), "{'a': 1, 'b': 2}");
        assert_eq!(eval("type('x')"), Value::from("str"));
    }

    #[test]
    fn sequences() {
        assert_eq!(eval_repr("range(5)"), "[0, 1, 2, 3, 4]");
        assert_eq!(eval_repr("range(5, 0, -2)"), "[5, 3, 1]");
        assert_eq!(eval("sum([1, 2, 3])"), Value::Int(6));
        assert_eq!(eval("sum([[1], [2]], [])"), eval("[1, 2]"));
        assert_eq!(eval("max(3, 9, 4)"), Value::Int(9));
        assert_eq!(eval("min(['bb', 'a', 'ccc'], key=len)"), Value::from("a"));
        assert_eq!(eval_repr("sorted([3, 1, 2], reverse=True)"), "[3, 2, 1]");
        assert_eq!(eval_repr("sorted(['bb', 'a'], key=lambda s: len(s))"), "['a', 'bb']");
        assert_eq!(eval_repr("reversed((1, 2))"), "[2, 1]");
        assert_eq!(eval_repr("enumerate('ab', 1)"), "[(1, 'a'), (2, 'b')]");
        assert_eq!(eval_repr("zip([1, 2, 3], 'ab')"), "[(1, 'a'), (2, 'b')]");
        assert_eq!(eval_repr("map(lambda x, y: x * y, [1, 2], [3, 4])"), "[3, 8]");
        assert_eq!(eval_repr("filter(None, [0, 1, '', 'a'])"), "[1, 'a']");
        assert_eq!(eval("any([0, 1])"), Value::Bool(true));
        assert_eq!(eval("all([])"), Value::Bool(true));
        assert_eq!(eval("round(2.5)"), Value::Int(2));
        assert_eq!(eval("round(3.5)"), Value::Int(4));
        assert_eq!(eval("abs(-3)"), Value::Int(3));
        assert!(run(&mut Env::new(), "sorted([1, 'a'])").is_err());
        assert!(run(&mut Env::new(), "max([])").is_err());
    }

    #[test]
    fn string_methods() {
        assert_eq!(eval_repr("'  a b  '.split()"), "['a', 'b']");
        assert_eq!(eval_repr("'a b c'.split(None, 1)"), "['a', 'b c']");
        assert_eq!(eval_repr("'a,b,c'.split(',', 1)"), "['a', 'b,c']");
        assert_eq!(eval("'-'.join(['a', 'b'])"), Value::from("a-b"));
        assert_eq!(eval("'xxhixx'.strip('x')"), Value::from("hi"));
        assert_eq!(eval("'hello world'.title()"), Value::from("Hello World"));
        assert_eq!(eval("'hELLO'.capitalize()"), Value::from("Hello"));
        assert_eq!(eval("'banana'.count('a')"), Value::Int(3));
        assert_eq!(eval("'banana'.find('n')"), Value::Int(2));
        assert_eq!(eval("'abc'.startswith('ab')"), Value::Bool(true));
        assert_eq!(eval("[1, 2, 2].count(2)"), Value::Int(2));
        assert_eq!(eval("(1, 2).index(2)"), Value::Int(1));
        assert_eq!(eval_repr("{'a': 1}.items()"), "[('a', 1)]");
    }

    #[test]
    fn arity_and_keywords_are_checked() {
        let err = run(&mut Env::new(), "len(1, 2)").unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: len() takes exactly 1 arguments (2 given)"
        );
        assert!(run(&mut Env::new(), "len([], key=1)").is_err());
    }

    #[test]
    fn qualified_names_round_trip() {
        for name in ["len", "str.upper", "dict.get", "os.getpid", "math.sqrt"] {
            let b = super::lookup_qualified(name).unwrap();
            assert_eq!(b.qualified_name(), name);
        }
        assert!(super::lookup_qualified("os.nope").is_none());
    }
}
