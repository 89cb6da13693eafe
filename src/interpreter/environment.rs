// File: src/interpreter/environment.rs
//
// One lexical scope for the Sprig VM: an insertion-ordered name -> Value
// mapping. Scope chaining is realized by the VM holding a stack of these
// (see vm.rs), not by parent pointers on Env itself (spec §3).

use indexmap::IndexMap;

use super::value::Value;

/// An insertion-order-stable mapping from identifier to Value.
///
/// # Examples
///
/// ```ignore
/// let mut env = Env::new();
/// env.set("x".to_string(), Value::Number(10.0));
/// assert!(env.has("x"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Env {
    bindings: IndexMap<String, Value>,
}

impl Env {
    pub fn new() -> Self {
        Env { bindings: IndexMap::new() }
    }

    pub fn has(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Returns `Value::Undefined` rather than `None` for a missing name,
    /// matching GET_VARIABLE's push-Undefined-if-absent contract (§4.5).
    pub fn get(&self, name: &str) -> Value {
        self.bindings.get(name).cloned().unwrap_or(Value::Undefined)
    }

    /// Insert or overwrite, preserving the name's original insertion
    /// position if it already exists.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Define only if absent; a no-op on redefinition (spec §3 invariant:
    /// `let` in the same scope silently rejects redefinition).
    pub fn define(&mut self, name: impl Into<String>, value: Value) -> bool {
        let name = name.into();
        if self.bindings.contains_key(&name) {
            return false;
        }
        self.bindings.insert(name, value);
        true
    }

    /// Copy every binding from `other` into this env, overwriting on
    /// collision. Used by IMPORT to merge a library's Env (§4.5, §4.7).
    pub fn merge_from(&mut self, other: &Env) {
        for (name, value) in other.bindings.iter() {
            self.bindings.insert(name.clone(), value.clone());
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.bindings.keys()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_rejects_redefinition_silently() {
        let mut env = Env::new();
        assert!(env.define("x", Value::Number(1.0)));
        assert!(!env.define("x", Value::Number(2.0)));
        match env.get("x") {
            Value::Number(n) => assert_eq!(n, 1.0),
            other => panic!("expected Number(1), got {other:?}"),
        }
    }

    #[test]
    fn set_overwrites_preserving_order() {
        let mut env = Env::new();
        env.set("a", Value::Number(1.0));
        env.set("b", Value::Number(2.0));
        env.set("a", Value::Number(9.0));
        let names: Vec<&String> = env.names().collect();
        assert_eq!(names, vec!["a", "b"]);
        match env.get("a") {
            Value::Number(n) => assert_eq!(n, 9.0),
            other => panic!("expected Number(9), got {other:?}"),
        }
    }

    #[test]
    fn get_missing_is_undefined() {
        let env = Env::new();
        assert!(matches!(env.get("missing"), Value::Undefined));
    }

    #[test]
    fn merge_from_overwrites_on_collision() {
        let mut a = Env::new();
        a.set("x", Value::Number(1.0));
        let mut b = Env::new();
        b.set("x", Value::Number(2.0));
        b.set("y", Value::Number(3.0));
        a.merge_from(&b);
        assert!(matches!(a.get("x"), Value::Number(n) if n == 2.0));
        assert!(matches!(a.get("y"), Value::Number(n) if n == 3.0));
    }
}
