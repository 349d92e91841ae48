//! Turns one node's text into its new pipeline value.
//!
//! Node text first goes through a purely syntactic rewrite ([`preprocess`]),
//! which recognizes the markers of the flow language:
//!
//! - a trailing `&` runs the node in a separate process
//! - `_!` makes the node a reduce point, fed once with every incoming value
//! - a trailing `name(args)@host` or `name@host` becomes a remote call
//! - `` `text` `` evaluates `text` as a nested program
//! - `print` and `print args` print through the shared output
//!
//! The rewritten text is then evaluated as an expression, or executed as a
//! statement when it is not one, and the result normalized against the
//! incoming `_` ([`run`]).
use std::sync::Arc;

use tracing::{debug, trace};

use crate::{
    env::Env,
    error::EvalError,
    eval::{self, Context, Host},
    parser::{self, string::quote},
    syntax::Source,
    value::{Key, Value},
};

/// Node text after rewriting, with the markers that were found
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prepared {
    pub text: String,
    pub spawn: bool,
    pub reduce: bool,
}

pub fn preprocess(content: &str) -> Prepared {
    let mut text = content.trim();
    let mut spawn = false;
    if let Some(rest) = text.strip_suffix('&') {
        if !rest.ends_with('&') {
            spawn = true;
            text = rest.trim_end();
        }
    }
    let (text, reduce) = rewrite_reduce(text);
    let text = rewrite_remote(&text);
    let text = rewrite_backticks(&text);
    let text = rewrite_print(&text);
    Prepared {
        text,
        spawn,
        reduce,
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Characters outside string literals and backticks, with their byte offset
/// and bracket depth (a bracket pair reports the depth outside of it)
fn unquoted(text: &str) -> Vec<(usize, char, usize)> {
    let mut out = Vec::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(q) if c == '\\' && q != '`' => escaped = true,
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' | '[' | '{' => {
                    out.push((i, c, depth));
                    depth += 1;
                }
                ')' | ']' | '}' => {
                    depth = depth.saturating_sub(1);
                    out.push((i, c, depth));
                }
                c => out.push((i, c, depth)),
            },
        }
    }
    out
}

/// Rewrites every `_!` (but not `_!=`) to `_`
fn rewrite_reduce(text: &str) -> (String, bool) {
    let chars = unquoted(text);
    let mut marks = vec![];
    for w in chars.windows(2) {
        let ((i, a, _), (j, b, _)) = (w[0], w[1]);
        if a != '_' || b != '!' || j != i + 1 {
            continue;
        }
        let before = text[..i].chars().next_back();
        let after = text[j + 1..].chars().next();
        if before.map_or(true, |c| !is_ident_char(c)) && after != Some('=') {
            marks.push(j);
        }
    }
    if marks.is_empty() {
        return (text.to_string(), false);
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for j in marks {
        out.push_str(&text[last..j]);
        last = j + 1;
    }
    out.push_str(&text[last..]);
    (out, true)
}

fn is_callable_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && name.chars().all(|c| is_ident_char(c) || c == '.')
        && !name.ends_with('.')
}

/// Rewrites a trailing `name(args)@host` or `name@host` into a
/// `remotefunction` call capturing the name, the host text and the arguments
fn rewrite_remote(text: &str) -> String {
    let chars = unquoted(text);
    let Some(&(at, _, _)) = chars.iter().rev().find(|(_, c, d)| *c == '@' && *d == 0) else {
        return text.to_string();
    };
    let host = text[at + 1..].trim();
    let callee = text[..at].trim();
    if host.is_empty() {
        return text.to_string();
    }
    let (name, args) = match callee.strip_suffix(')') {
        Some(_) => {
            let inner = unquoted(callee);
            let open = inner.iter().find(|(_, c, d)| *c == '(' && *d == 0);
            let close = inner.iter().find(|(_, c, d)| *c == ')' && *d == 0);
            match (open, close) {
                (Some(&(open, ..)), Some(&(close, ..))) if close == callee.len() - 1 => {
                    (callee[..open].trim(), callee[open + 1..close].trim())
                }
                _ => return text.to_string(),
            }
        }
        None => (callee, ""),
    };
    if !is_callable_name(name) {
        return text.to_string();
    }
    let mut out = format!("remotefunction({}, {}", quote(name), quote(host));
    if !args.is_empty() {
        out.push_str(", ");
        out.push_str(args);
    }
    out.push(')');
    out
}

/// Rewrites each `` `text` `` outside string literals into `__eval__("text")`
fn rewrite_backticks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote_char: Option<char> = None;
    let mut escaped = false;
    let mut rest = text.char_indices();
    while let Some((i, c)) = rest.next() {
        match quote_char {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote_char = None,
            Some(_) => (),
            None if c == '\'' || c == '"' => quote_char = Some(c),
            None if c == '`' => {
                if let Some(len) = text[i + 1..].find('`') {
                    let inner = &text[i + 1..i + 1 + len];
                    out.push_str("__eval__(");
                    out.push_str(&quote(inner));
                    out.push(')');
                    for _ in inner.chars().chain(Some('`')) {
                        rest.next();
                    }
                    continue;
                }
            }
            None => (),
        }
        out.push(c);
    }
    out
}

/// `print` alone prints `_`; `print args` prints `args`
fn rewrite_print(text: &str) -> String {
    let Some(rest) = text.strip_prefix("print") else {
        return text.to_string();
    };
    match rest.chars().next() {
        None => "__print__".to_string(),
        Some(c) if is_ident_char(c) => text.to_string(),
        Some(_) if rest.trim_start().starts_with('(') => format!("__print__{rest}"),
        Some(c) if c.is_whitespace() => format!("__print__({})", rest.trim()),
        Some(_) => text.to_string(),
    }
}

/// Retries `f` once after binding an unbound name through the host's resolver
fn with_auto_import<T>(
    host: &dyn Host,
    env: &mut Env,
    mut f: impl FnMut(&mut Env) -> Result<T, EvalError>,
) -> Result<T, EvalError> {
    match f(env) {
        Err(EvalError::UnboundName(name)) => match host.resolver().resolve(&name) {
            Some(value) => {
                debug!(%name, "auto-import");
                env.bind_global(name, value);
                f(env)
            }
            None => Err(EvalError::UnboundName(name)),
        },
        r => r,
    }
}

/// Parses and runs already preprocessed node text against `env`
pub fn execute(host: &dyn Host, env: &mut Env, text: &str, depth: usize) -> Result<Value, EvalError> {
    let source = parser::parse_source(text)?;
    run(host, env, &source, depth)
}

/// Evaluates an expression and normalizes its value; a statement runs for its
/// effect on `env` and leaves `_` as it was
pub fn run(host: &dyn Host, env: &mut Env, source: &Source, depth: usize) -> Result<Value, EvalError> {
    let incoming = env.underscore();
    match source {
        Source::Expr(expr) => {
            let r = with_auto_import(host, env, |env| Context::new(host, env, depth).eval(expr))?;
            trace!(result = %r, "evaluated");
            normalize(&Context::new(host, env, depth), incoming, r)
        }
        Source::Stmt(stmt) => {
            with_auto_import(host, env, |env| eval::exec(host, env, stmt, depth))?;
            Ok(incoming)
        }
    }
}

fn normalize(ctx: &Context<'_>, incoming: Value, r: Value) -> Result<Value, EvalError> {
    let r = match r {
        Value::Remote(f) => Value::Remote(Arc::new(f.resolve_host(ctx)?)),
        r => r,
    };
    match r {
        Value::Dict(table) => Ok(Key::new(incoming)
            .ok()
            .and_then(|k| table.get(&k).cloned())
            .unwrap_or(Value::Bool(false))),
        Value::None | Value::Bool(true) => Ok(incoming),
        f if f.is_callable() => {
            let result = match (f.accepts(1), f.accepts(0)) {
                (Some(false), Some(true)) => ctx.call(&f, vec![], vec![])?,
                (None, _) => match ctx.call(&f, vec![incoming.clone()], vec![]) {
                    Err(EvalError::Type(_)) if matches!(f, Value::Remote(_)) => {
                        ctx.call(&f, vec![], vec![])?
                    }
                    r => r?,
                },
                _ => ctx.call(&f, vec![incoming.clone()], vec![])?,
            };
            Ok(match result {
                Value::None => incoming,
                result => result,
            })
        }
        r => Ok(r),
    }
}
