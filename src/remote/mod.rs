//! Calls written `name@host`, serviced locally or over XML-RPC.
//!
//! The host is an expression evaluated as late as possible, in the
//! environment of the node that produced the handle. A host of `None` (or the
//! text `"None"`) turns the call into a plain local call of `name`.
use indexmap::IndexMap;
use tracing::debug;

use crate::{
    error::{EvalError, TransportError},
    eval::{builtins, Context, Kwargs},
    parser,
    value::{Key, Value},
};

pub mod xmlrpc;

const DEFAULT_PATH: &str = "/RPC2";

#[derive(Clone, Debug)]
pub struct RemoteFunction {
    pub name: String,
    pub host_expr: String,
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
    /// Result of evaluating `host_expr`, once resolved
    pub host: Option<Value>,
}

impl RemoteFunction {
    pub fn new(name: &str, host_expr: &str, args: Vec<Value>, kwargs: Kwargs) -> Self {
        Self {
            name: name.to_string(),
            host_expr: host_expr.trim().to_string(),
            args,
            kwargs,
            host: None,
        }
    }

    /// A copy of this handle with its host evaluated against `ctx`.
    ///
    /// Host text that does not parse is taken literally, so
    /// `xmlrpc://localhost:8000` needs no quotes.
    pub fn resolve_host(&self, ctx: &Context<'_>) -> Result<Self, EvalError> {
        let host = match parser::parse_expr(&self.host_expr) {
            Ok(expr) => ctx.eval(&expr)?,
            Err(_) => Value::from(self.host_expr.as_str()),
        };
        debug!(name = %self.name, host = %host, "resolved remote host");
        Ok(Self {
            host: Some(host),
            ..self.clone()
        })
    }

    fn is_local(host: &Value) -> bool {
        matches!(host, Value::None) || host.as_str() == Some("None")
    }

    /// Invokes the function; arguments captured at construction replace the
    /// ones given at the call site.
    pub fn call(&self, ctx: &Context<'_>, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, EvalError> {
        let host = match &self.host {
            Some(host) => host.clone(),
            None => self.resolve_host(ctx)?.host.unwrap_or(Value::None),
        };
        let (args, kwargs) = if self.args.is_empty() && self.kwargs.is_empty() {
            (args, kwargs)
        } else {
            (self.args.clone(), self.kwargs.clone())
        };
        if Self::is_local(&host) {
            let f = self.local_callable(ctx)?;
            return ctx.call(&f, args, kwargs);
        }
        let endpoint = host.to_string();
        let url = endpoint_url(&endpoint)?;
        let client = ctx.host.transport(&url)?;
        let mut params = args;
        if !kwargs.is_empty() {
            let mut map = IndexMap::with_capacity(kwargs.len());
            for (k, v) in kwargs {
                map.insert(Key::new(Value::from(k))?, v);
            }
            params.push(Value::dict(map));
        }
        client.call(&self.name, &params)
    }

    fn local_callable(&self, ctx: &Context<'_>) -> Result<Value, EvalError> {
        if let Some(v) = ctx.env.lookup(&self.name) {
            return Ok(v.clone());
        }
        builtins::lookup(&self.name)
            .or_else(|| ctx.host.resolver().resolve(&self.name))
            .ok_or_else(|| EvalError::UnboundName(self.name.clone()))
    }
}

/// Maps `xmlrpc://` to `http://` and `xmlrpcs://` to `https://`, adding the
/// conventional `/RPC2` path when the host has none
pub fn endpoint_url(host: &str) -> Result<String, TransportError> {
    let (scheme, rest) = host
        .split_once("://")
        .ok_or_else(|| TransportError::UnsupportedScheme(host.to_string()))?;
    let scheme = match scheme.to_ascii_lowercase().as_str() {
        "xmlrpc" | "http" => "http",
        "xmlrpcs" | "https" => "https",
        _ => return Err(TransportError::UnsupportedScheme(host.to_string())),
    };
    let rest = rest.trim_end_matches('/');
    if rest.contains('/') {
        Ok(format!("{scheme}://{rest}"))
    } else {
        Ok(format!("{scheme}://{rest}{DEFAULT_PATH}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{env::Env, eval::tests::run};

    #[test]
    fn endpoints() {
        assert_eq!(
            endpoint_url("xmlrpc://localhost:8000").unwrap(),
            "http://localhost:8000/RPC2"
        );
        assert_eq!(
            endpoint_url("xmlrpcs://example.com/api").unwrap(),
            "https://example.com/api"
        );
        assert!(matches!(
            endpoint_url("ftp://example.com"),
            Err(TransportError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            endpoint_url("localhost"),
            Err(TransportError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn local_fallback() {
        let mut env = Env::new();
        assert_eq!(
            run(&mut env, "remotefunction('len', 'None')([1, 2])").unwrap(),
            Value::Int(2)
        );
        run(&mut env, "h = None").unwrap();
        run(&mut env, "f = lambda x: x * 2").unwrap();
        assert_eq!(
            run(&mut env, "remotefunction('f', 'h')(21)").unwrap(),
            Value::Int(42)
        );
        // captured arguments win over call-site ones
        assert_eq!(
            run(&mut env, "remotefunction('f', 'None', 'ab')(1)").unwrap(),
            Value::from("abab")
        );
        // auto-imported through the resolver
        assert_eq!(
            run(&mut env, "remotefunction('upper', 'None')('a')").unwrap(),
            Value::from("A")
        );
    }

    #[test]
    fn literal_hosts() {
        let mut env = Env::new();
        let ctx_host = crate::eval::tests::TestHost::new();
        let ctx = Context::new(&ctx_host, &env, 0);
        let r = RemoteFunction::new("f", " xmlrpc://localhost:1 ", vec![], vec![]);
        let resolved = r.resolve_host(&ctx).unwrap();
        assert_eq!(resolved.host, Some(Value::from("xmlrpc://localhost:1")));
        env.bind("port", Value::Int(8080));
        let r = RemoteFunction::new("f", "'xmlrpc://h:%d' % port", vec![], vec![]);
        let resolved = r.resolve_host(&Context::new(&ctx_host, &env, 0)).unwrap();
        assert_eq!(resolved.host, Some(Value::from("xmlrpc://h:8080")));
    }
}
