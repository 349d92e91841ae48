use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    env::Env,
    error::EvalError,
    eval::{Builtin, Module},
    remote::RemoteFunction,
    syntax::Expr,
};

/// Runtime values flowing through a program
#[derive(Clone, Debug)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Arc<Vec<Value>>),
    Tuple(Arc<Vec<Value>>),
    Dict(Arc<IndexMap<Key, Value>>),
    Builtin(&'static Builtin),
    Module(&'static Module),
    // A builtin method together with the value it was looked up on: "a b".split
    Method(Arc<(Value, &'static Builtin)>),
    Lambda(Arc<Lambda>),
    Remote(Arc<RemoteFunction>),
}

/// An anonymous function closing over the environment it was created in
#[derive(Debug)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Expr,
    pub env: Env,
}

/// A hashable value used as a dictionary key.
///
/// Keys compare the way their values do, so `1`, `1.0` and `True` are the same key.
#[derive(Clone, Debug)]
pub struct Key(Value);

impl Key {
    pub fn new(value: Value) -> Result<Self, EvalError> {
        match &value {
            Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => {
                Ok(Self(value))
            }
            Value::Tuple(xs) => {
                for x in xs.iter() {
                    Key::new(x.clone())?;
                }
                Ok(Self(value))
            }
            v => Err(EvalError::type_error(format!(
                "unhashable type: '{}'",
                v.type_name()
            ))),
        }
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        fn hash_value<H: Hasher>(v: &Value, state: &mut H) {
            match v {
                Value::None => 0u8.hash(state),
                Value::Bool(b) => (*b as i64).hash(state),
                Value::Int(i) => i.hash(state),
                Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => (*f as i64).hash(state),
                Value::Float(f) => f.to_bits().hash(state),
                Value::Str(s) => s.hash(state),
                Value::Tuple(xs) => {
                    xs.len().hash(state);
                    xs.iter().for_each(|x| hash_value(x, state));
                }
                _ => (),
            }
        }
        hash_value(&self.0, state)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(xs: Vec<Value>) -> Self {
        Self::List(Arc::new(xs))
    }
}

impl Value {
    pub fn list(xs: Vec<Value>) -> Self {
        Self::List(Arc::new(xs))
    }

    pub fn tuple(xs: Vec<Value>) -> Self {
        Self::Tuple(Arc::new(xs))
    }

    pub fn dict(entries: IndexMap<Key, Value>) -> Self {
        Self::Dict(Arc::new(entries))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Builtin(_) => "builtin_function_or_method",
            Self::Module(_) => "module",
            Self::Method(_) => "builtin_function_or_method",
            Self::Lambda(_) => "function",
            Self::Remote(_) => "remotefunction",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(x) => *x != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(xs) | Self::Tuple(xs) => !xs.is_empty(),
            Self::Dict(d) => !d.is_empty(),
            _ => true,
        }
    }

    /// Only boolean `False` terminates a branch; `0`, `""` and `[]` do not
    pub fn is_false(&self) -> bool {
        matches!(self, Self::Bool(false))
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Self::Builtin(_) | Self::Method(_) | Self::Lambda(_) | Self::Remote(_)
        )
    }

    /// Whether a call with `n` positional arguments passes the arity check,
    /// `None` when the callee's arity is not known ahead of the call
    pub fn accepts(&self, n: usize) -> Option<bool> {
        match self {
            Self::Builtin(b) => Some(b.accepts(n)),
            Self::Method(m) => Some(m.1.accepts(n + 1)),
            Self::Lambda(l) => Some(l.params.len() == n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(*b as i64),
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(*b as i64 as f64),
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Elements of a list or tuple, the only values a node result explodes over
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Self::List(xs) | Self::Tuple(xs) => Some(xs),
            _ => None,
        }
    }

    /// Iterates any iterable value: sequences, the characters of a string, the keys of a dict
    pub fn iterate(&self) -> Result<Vec<Value>, EvalError> {
        match self {
            Self::List(xs) | Self::Tuple(xs) => Ok(xs.to_vec()),
            Self::Str(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
            Self::Dict(d) => Ok(d.keys().map(|k| k.value().clone()).collect()),
            v => Err(EvalError::type_error(format!(
                "'{}' object is not iterable",
                v.type_name()
            ))),
        }
    }

    /// Python's `<`/`>` family; mixed numeric types compare by value
    pub fn compare(&self, other: &Value) -> Result<Ordering, EvalError> {
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => Ok(a.cmp(b)),
            (Self::List(a), Self::List(b)) | (Self::Tuple(a), Self::Tuple(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        o => return Ok(o),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => Ok(x.cmp(&y)),
                _ => match (a.as_float(), b.as_float()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| {
                        EvalError::value_error("cannot order NaN")
                    }),
                    _ => Err(EvalError::type_error(format!(
                        "'<' not supported between instances of '{}' and '{}'",
                        a.type_name(),
                        b.type_name()
                    ))),
                },
            },
        }
    }

    /// Python's `repr()`
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out);
        out
    }

    fn write_repr(&self, out: &mut String) {
        use std::fmt::Write;
        match self {
            Self::Str(s) => out.push_str(&repr_str(s)),
            Self::List(xs) => {
                out.push('[');
                write_items(out, xs);
                out.push(']');
            }
            Self::Tuple(xs) => {
                out.push('(');
                write_items(out, xs);
                if xs.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Self::Dict(d) => {
                out.push('{');
                for (i, (k, v)) in d.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.value().write_repr(out);
                    out.push_str(": ");
                    v.write_repr(out);
                }
                out.push('}');
            }
            v => {
                let _ = write!(out, "{v}");
            }
        }
    }
}

fn write_items(out: &mut String, xs: &[Value]) {
    for (i, x) in xs.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        x.write_repr(out);
    }
}

/// Quotes a string the way Python's `repr` does: single quotes unless the text contains one
pub fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".into()
    } else if x.is_infinite() {
        String::from(if x > 0.0 { "inf" } else { "-inf" })
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

/// Python's `str()`
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{}", format_float(*x)),
            Self::Str(s) => write!(f, "{s}"),
            Self::List(_) | Self::Tuple(_) | Self::Dict(_) => write!(f, "{}", self.repr()),
            Self::Builtin(b) => write!(f, "<built-in function {}>", b.name),
            Self::Module(m) => write!(f, "<module '{}'>", m.name),
            Self::Method(m) => write!(
                f,
                "<built-in method {} of {} object>",
                m.1.name,
                m.0.type_name()
            ),
            Self::Lambda(_) => write!(f, "<function <lambda>>"),
            Self::Remote(r) => write!(f, "<remotefunction {}@{}>", r.name, r.host_expr),
        }
    }
}

/// Python's `==`
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) | (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Self::Builtin(a), Self::Builtin(b)) => std::ptr::eq(*a, *b),
            (Self::Module(a), Self::Module(b)) => std::ptr::eq(*a, *b),
            (Self::Method(a), Self::Method(b)) => Arc::ptr_eq(a, b),
            (Self::Lambda(a), Self::Lambda(b)) => Arc::ptr_eq(a, b),
            (Self::Remote(a), Self::Remote(b)) => Arc::ptr_eq(a, b),
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => x == y,
                _ => match (a, b) {
                    (Self::Float(_), _) | (_, Self::Float(_)) => {
                        matches!((a.as_float(), b.as_float()), (Some(x), Some(y)) if x == y)
                    }
                    _ => false,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;
    use indexmap::indexmap;

    use super::*;

    fn key(v: impl Into<Value>) -> Key {
        Key::new(v.into()).unwrap()
    }

    #[test]
    fn equality_crosses_numeric_types() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::Int(1), Value::from("1"));
        assert_ne!(Value::None, Value::Bool(false));
        assert_eq!(
            Value::list(vec![Value::Int(1), Value::Float(2.0)]),
            Value::list(vec![Value::Float(1.0), Value::Int(2)])
        );
        assert_ne!(Value::list(vec![]), Value::tuple(vec![]));
    }

    #[test]
    fn only_false_terminates() {
        assert!(Value::Bool(false).is_false());
        for v in [Value::Int(0), Value::from(""), Value::list(vec![]), Value::None] {
            assert!(!v.is_false());
            assert!(!v.is_truthy());
        }
    }

    #[test]
    fn keys_unify_numeric_types() {
        let d = indexmap! { key(1i64) => Value::from("one") };
        assert_eq!(d.get(&key(true)), Some(&Value::from("one")));
        assert_eq!(d.get(&key(1.0)), Some(&Value::from("one")));
        assert!(Key::new(Value::list(vec![])).is_err());
    }

    #[test]
    fn ordering() {
        assert_eq!(
            Value::Int(1).compare(&Value::Float(1.5)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Value::from("b").compare(&Value::from("a")).unwrap(),
            Ordering::Greater
        );
        assert!(Value::from("a").compare(&Value::Int(1)).is_err());
    }

    #[test]
    fn repr_matches_python() {
        let v = Value::list(vec![
            Value::Int(1),
            Value::Float(2.0),
            Value::from("it's"),
            Value::None,
            Value::tuple(vec![Value::Bool(true)]),
            Value::dict(indexmap! { key("k") => Value::Float(0.5) }),
        ]);
        expect![[r#"[1, 2.0, "it's", None, (True,), {'k': 0.5}]"#]].assert_eq(&v.repr());
        expect!["hello"].assert_eq(&Value::from("hello").to_string());
        expect!["'hello'"].assert_eq(&Value::from("hello").repr());
    }
}
