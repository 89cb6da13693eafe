// File: src/library.rs
//
// Host library registration (§4.7): a library is just an Env of
// name -> NativeFunction bindings. This module is the builder host code
// uses to assemble one before handing it to `Vm::add_library`; `IMPORT`
// (implemented in vm.rs) merges it into the program's current top env.

use std::rc::Rc;

use crate::interpreter::{Env, NativeFn, NativeFunction, Value};

/// Fluent builder for a named collection of native bindings.
pub struct Library {
    name: String,
    env: Env,
}

impl Library {
    pub fn new(name: impl Into<String>) -> Self {
        Library { name: name.into(), env: Env::new() }
    }

    pub fn native(mut self, name: &str, arity: i32, func: impl Fn(&[Value]) -> Value + 'static) -> Self {
        let native: NativeFn = Rc::new(func);
        self.env.set(name, Value::NativeFunction(Rc::new(NativeFunction { name: name.to_string(), arity, func: native })));
        self
    }

    pub fn build(self) -> (String, Env) {
        (self.name, self.env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_named_env_with_bindings() {
        let (name, env) = Library::new("demo").native("double", 1, |args| match args.first() {
            Some(Value::Number(n)) => Value::Number(n * 2.0),
            _ => Value::error("double expects a number"),
        }).build();
        assert_eq!(name, "demo");
        assert!(env.has("double"));
        let result = env.get("double").call(&[Value::Number(21.0)]);
        assert!(matches!(result, Value::Number(n) if n == 42.0));
    }
}
