use std::collections::HashMap;

use crate::value::Value;

/// Name of the binding that carries the value flowing through a pipeline
pub const UNDERSCORE: &str = "_";

/// The pair of namespaces threaded through every evaluation step.
///
/// Lookups try `locals` then `globals`; statements bind into `locals` and
/// auto-imports into `globals`. Each fan-out branch works on its own clone.
#[derive(Clone, Debug, Default)]
pub struct Env {
    pub globals: HashMap<String, Value>,
    pub locals: HashMap<String, Value>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.locals.get(name).or_else(|| self.globals.get(name))
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    pub fn bind_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Removes `name` from the innermost namespace that holds it
    pub fn unbind(&mut self, name: &str) -> Option<Value> {
        self.locals
            .remove(name)
            .or_else(|| self.globals.remove(name))
    }

    /// The current pipeline value, `None` before anything flowed
    pub fn underscore(&self) -> Value {
        self.lookup(UNDERSCORE).cloned().unwrap_or(Value::None)
    }

    /// Rebinds `_` in both namespaces
    pub fn set_underscore(&mut self, value: Value) {
        self.globals.insert(UNDERSCORE.into(), value.clone());
        self.locals.insert(UNDERSCORE.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_shadow_globals() {
        let mut env = Env::new();
        env.bind_global("x", Value::Int(1));
        assert_eq!(env.lookup("x"), Some(&Value::Int(1)));
        env.bind("x", Value::Int(2));
        assert_eq!(env.lookup("x"), Some(&Value::Int(2)));
        assert_eq!(env.unbind("x"), Some(Value::Int(2)));
        assert_eq!(env.lookup("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn underscore_defaults_to_none() {
        let mut env = Env::new();
        assert_eq!(env.underscore(), Value::None);
        env.set_underscore(Value::from("x"));
        assert_eq!(env.globals.get(UNDERSCORE), Some(&Value::from("x")));
        assert_eq!(env.locals.get(UNDERSCORE), Some(&Value::from("x")));
    }
}
