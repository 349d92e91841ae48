//! Operators with Python semantics
use std::cmp::Ordering;
use std::sync::Arc;

use crate::{
    error::EvalError,
    syntax::{BinOp, CmpOp, UnaryOp},
    value::{Key, Value},
};

fn unsupported(op: BinOp, a: &Value, b: &Value) -> EvalError {
    EvalError::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        a.type_name(),
        b.type_name()
    ))
}

fn overflow() -> EvalError {
    EvalError::value_error("integer overflow")
}

fn zero_division(what: &str) -> EvalError {
    EvalError::ZeroDivision(format!("{what} by zero"))
}

fn repeat(xs: &[Value], n: i64) -> Vec<Value> {
    let n = n.max(0) as usize;
    let mut out = Vec::with_capacity(xs.len() * n);
    for _ in 0..n {
        out.extend_from_slice(xs);
    }
    out
}

/// Integer division rounding towards negative infinity
pub fn floor_div(a: i64, b: i64) -> Result<i64, EvalError> {
    if b == 0 {
        return Err(zero_division("integer division or modulo"));
    }
    let q = a.checked_div(b).ok_or_else(overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// Remainder taking the sign of the divisor
pub fn floor_mod(a: i64, b: i64) -> Result<i64, EvalError> {
    if b == 0 {
        return Err(zero_division("integer division or modulo"));
    }
    let r = a.checked_rem(b).ok_or_else(overflow)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn float_binary(op: BinOp, x: f64, y: f64) -> Result<Value, EvalError> {
    let v = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(zero_division("float division"));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(zero_division("float divmod()"));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(zero_division("float modulo"));
            }
            let r = x % y;
            if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => x.powf(y),
    };
    Ok(Value::Float(v))
}

fn int_binary(op: BinOp, x: i64, y: i64) -> Result<Value, EvalError> {
    let v = match op {
        BinOp::Add => x.checked_add(y).ok_or_else(overflow)?,
        BinOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
        BinOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
        BinOp::Div => {
            if y == 0 {
                return Err(zero_division("division"));
            }
            return Ok(Value::Float(x as f64 / y as f64));
        }
        BinOp::FloorDiv => floor_div(x, y)?,
        BinOp::Mod => floor_mod(x, y)?,
        BinOp::Pow => {
            if y < 0 {
                return float_binary(op, x as f64, y as f64);
            }
            let exp = u32::try_from(y).map_err(|_| overflow())?;
            x.checked_pow(exp).ok_or_else(overflow)?
        }
    };
    Ok(Value::Int(v))
}

pub fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value, EvalError> {
    match (op, a, b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => Ok(Value::from(format!("{x}{y}"))),
        (BinOp::Add, Value::List(x), Value::List(y)) => {
            Ok(Value::list(x.iter().chain(y.iter()).cloned().collect()))
        }
        (BinOp::Add, Value::Tuple(x), Value::Tuple(y)) => {
            Ok(Value::tuple(x.iter().chain(y.iter()).cloned().collect()))
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s)) if n.as_int().is_some() => {
            let n = n.as_int().unwrap_or(0).max(0) as usize;
            Ok(Value::from(s.repeat(n)))
        }
        (BinOp::Mul, Value::List(xs), n) | (BinOp::Mul, n, Value::List(xs))
            if n.as_int().is_some() =>
        {
            Ok(Value::List(Arc::new(repeat(xs, n.as_int().unwrap_or(0)))))
        }
        (BinOp::Mul, Value::Tuple(xs), n) | (BinOp::Mul, n, Value::Tuple(xs))
            if n.as_int().is_some() =>
        {
            Ok(Value::Tuple(Arc::new(repeat(xs, n.as_int().unwrap_or(0)))))
        }
        (BinOp::Mod, Value::Str(fmt), args) => format(fmt, args),
        _ => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => int_binary(op, x, y),
            _ => match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => float_binary(op, x, y),
                _ => Err(unsupported(op, a, b)),
            },
        },
    }
}

pub fn unary(op: UnaryOp, x: &Value) -> Result<Value, EvalError> {
    match (op, x) {
        (UnaryOp::Not, x) => Ok(Value::Bool(!x.is_truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Neg, x) if x.as_int().is_some() => x
            .as_int()
            .and_then(i64::checked_neg)
            .map(Value::Int)
            .ok_or_else(overflow),
        (UnaryOp::Pos, x) if x.as_int().is_some() => Ok(Value::Int(x.as_int().unwrap_or(0))),
        (op, x) => Err(EvalError::type_error(format!(
            "bad operand type for unary {op}: '{}'",
            x.type_name()
        ))),
    }
}

/// Python's `in`
pub fn contains(container: &Value, item: &Value) -> Result<bool, EvalError> {
    match container {
        Value::Str(s) => match item {
            Value::Str(sub) => Ok(s.contains(&**sub)),
            v => Err(EvalError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                v.type_name()
            ))),
        },
        Value::List(xs) | Value::Tuple(xs) => Ok(xs.iter().any(|x| x == item)),
        Value::Dict(d) => Ok(d.contains_key(&Key::new(item.clone())?)),
        v => Err(EvalError::type_error(format!(
            "argument of type '{}' is not iterable",
            v.type_name()
        ))),
    }
}

fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => Arc::ptr_eq(x, y) || x == y,
        (Value::List(x), Value::List(y)) | (Value::Tuple(x), Value::Tuple(y)) => Arc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Arc::ptr_eq(x, y),
        (Value::Float(_), _) | (_, Value::Float(_)) => false,
        _ => a == b,
    }
}

pub fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool, EvalError> {
    Ok(match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a.compare(b)? == Ordering::Less,
        CmpOp::Le => a.compare(b)? != Ordering::Greater,
        CmpOp::Gt => a.compare(b)? == Ordering::Greater,
        CmpOp::Ge => a.compare(b)? != Ordering::Less,
        CmpOp::In => contains(b, a)?,
        CmpOp::NotIn => !contains(b, a)?,
        CmpOp::Is => identical(a, b),
        CmpOp::IsNot => !identical(a, b),
    })
}

/// Resolves a possibly negative index against a sequence of `len` items
fn normalize_index(i: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if i < 0 { i + len } else { i };
    (0..len).contains(&i).then_some(i as usize)
}

pub fn index(obj: &Value, index: &Value) -> Result<Value, EvalError> {
    let out_of_range = || EvalError::Index(format!("{} index out of range", obj.type_name()));
    match obj {
        Value::Dict(d) => d
            .get(&Key::new(index.clone())?)
            .cloned()
            .ok_or_else(|| EvalError::Key(index.repr())),
        Value::List(xs) | Value::Tuple(xs) => {
            let i = int_index(obj, index)?;
            normalize_index(i, xs.len())
                .map(|i| xs[i].clone())
                .ok_or_else(out_of_range)
        }
        Value::Str(s) => {
            let i = int_index(obj, index)?;
            let chars: Vec<char> = s.chars().collect();
            normalize_index(i, chars.len())
                .map(|i| Value::from(chars[i].to_string()))
                .ok_or_else(out_of_range)
        }
        v => Err(EvalError::type_error(format!(
            "'{}' object is not subscriptable",
            v.type_name()
        ))),
    }
}

fn int_index(obj: &Value, index: &Value) -> Result<i64, EvalError> {
    index.as_int().ok_or_else(|| {
        EvalError::type_error(format!(
            "{} indices must be integers, not {}",
            obj.type_name(),
            index.type_name()
        ))
    })
}

/// Clamped slice bounds, Python style
fn slice_bounds(len: usize, lo: Option<&Value>, hi: Option<&Value>) -> Result<(usize, usize), EvalError> {
    let bound = |v: Option<&Value>, default: i64| -> Result<usize, EvalError> {
        let i = match v {
            None | Some(Value::None) => default,
            Some(v) => v
                .as_int()
                .ok_or_else(|| EvalError::type_error("slice indices must be integers or None"))?,
        };
        let len = len as i64;
        let i = if i < 0 { (i + len).max(0) } else { i.min(len) };
        Ok(i as usize)
    };
    let lo = bound(lo, 0)?;
    let hi = bound(hi, len as i64)?;
    Ok((lo, hi.max(lo)))
}

pub fn slice(obj: &Value, lo: Option<&Value>, hi: Option<&Value>) -> Result<Value, EvalError> {
    match obj {
        Value::List(xs) => {
            let (lo, hi) = slice_bounds(xs.len(), lo, hi)?;
            Ok(Value::list(xs[lo..hi].to_vec()))
        }
        Value::Tuple(xs) => {
            let (lo, hi) = slice_bounds(xs.len(), lo, hi)?;
            Ok(Value::tuple(xs[lo..hi].to_vec()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (lo, hi) = slice_bounds(chars.len(), lo, hi)?;
            Ok(Value::from(chars[lo..hi].iter().collect::<String>()))
        }
        v => Err(EvalError::type_error(format!(
            "'{}' object is not subscriptable",
            v.type_name()
        ))),
    }
}

/// `%`-formatting of strings: `%s`, `%r`, `%d`, `%i`, `%f` (with an optional precision) and `%%`
pub fn format(fmt: &str, args: &Value) -> Result<Value, EvalError> {
    let args = match args {
        Value::Tuple(xs) => xs.to_vec(),
        v => vec![v.clone()],
    };
    let mut args = args.into_iter();
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    let not_enough = || EvalError::type_error("not enough arguments for format string");
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(*d);
                chars.next();
            }
            precision = digits.parse::<usize>().ok();
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => out.push_str(&args.next().ok_or_else(not_enough)?.to_string()),
            Some('r') => out.push_str(&args.next().ok_or_else(not_enough)?.repr()),
            Some('d') | Some('i') => {
                let v = args.next().ok_or_else(not_enough)?;
                let n = match v.as_float() {
                    Some(x) if v.as_int().is_none() => x.trunc() as i64,
                    _ => v.as_int().ok_or_else(|| {
                        EvalError::type_error(format!(
                            "%d format: a number is required, not {}",
                            v.type_name()
                        ))
                    })?,
                };
                out.push_str(&n.to_string());
            }
            Some('f') => {
                let v = args.next().ok_or_else(not_enough)?;
                let x = v.as_float().ok_or_else(|| {
                    EvalError::type_error(format!("must be real number, not {}", v.type_name()))
                })?;
                out.push_str(&format!("{:.*}", precision.unwrap_or(6), x));
            }
            other => {
                return Err(EvalError::value_error(format!(
                    "unsupported format character {:?}",
                    other.unwrap_or(' ')
                )))
            }
        }
    }
    if args.next().is_some() {
        return Err(EvalError::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(Value::from(out))
}
