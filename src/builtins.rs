// File: src/builtins.rs
//
// Built-in globals injected into the global env at load time (§6):
// the four castable types, the variadic `print` native, and the
// zero-arity `__needs_update`/`__needs_draw` scheduler predicates.

use std::cell::Cell;
use std::rc::Rc;

use crate::interpreter::{Env, NativeFunction, Type, TypeTag, Value};

/// A host console sink. Swappable so tests and the REPL can capture
/// output instead of writing to real stdout.
pub type PrintSink = Rc<dyn Fn(&str)>;

pub fn stdout_sink() -> PrintSink {
    Rc::new(|line: &str| println!("{line}"))
}

fn cast_bool(args: &[Value]) -> Value {
    match args.first() {
        Some(Value::Number(n)) => Value::Bool(*n != 0.0),
        Some(Value::String(s)) => match s.to_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::error(format!("cannot cast \"{s}\" to bool")),
        },
        Some(other) => Value::error(format!("cannot cast {other} to bool")),
        None => Value::error("cast to bool requires an argument"),
    }
}

fn cast_number(args: &[Value]) -> Value {
    match args.first() {
        Some(Value::Bool(b)) => Value::Number(if *b { 1.0 } else { 0.0 }),
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::error(format!("cannot cast \"{s}\" to number")),
        },
        Some(other) => Value::error(format!("cannot cast {other} to number")),
        None => Value::error("cast to number requires an argument"),
    }
}

fn cast_string(args: &[Value]) -> Value {
    match args.first() {
        Some(v @ Value::Bool(_)) | Some(v @ Value::Number(_)) => Value::string(v.to_string()),
        Some(other) => Value::error(format!("cannot cast {other} to string")),
        None => Value::error("cast to string requires an argument"),
    }
}

fn cast_function(_args: &[Value]) -> Value {
    Value::error("cannot cast to function")
}

fn make_type(tag: TypeTag, caster: fn(&[Value]) -> Value) -> Value {
    Value::Type(Rc::new(Type { tag, caster: Rc::new(caster) }))
}

fn make_native(name: &str, arity: i32, func: impl Fn(&[Value]) -> Value + 'static) -> Value {
    Value::NativeFunction(Rc::new(NativeFunction { name: name.to_string(), arity, func: Rc::new(func) }))
}

/// Builds the global env merged into the VM before a program runs:
/// the type casters, `print`, and the two scheduler predicates.
pub fn install(output: PrintSink, needs_update: Rc<Cell<bool>>, needs_draw: Rc<Cell<bool>>) -> Env {
    let mut env = Env::new();

    env.set("bool", make_type(TypeTag::Bool, cast_bool));
    env.set("number", make_type(TypeTag::Number, cast_number));
    env.set("string", make_type(TypeTag::String, cast_string));
    env.set("function", make_type(TypeTag::Function, cast_function));

    env.set(
        "print",
        make_native("print", -1, move |args: &[Value]| {
            let line = args.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
            output(&line);
            Value::Undefined
        }),
    );

    env.set(
        "__needs_update",
        make_native("__needs_update", 0, move |_| Value::Bool(needs_update.replace(false))),
    );
    env.set(
        "__needs_draw",
        make_native("__needs_draw", 0, move |_| Value::Bool(needs_draw.replace(false))),
    );

    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn sink() -> (PrintSink, Rc<RefCell<Vec<String>>>) {
        let buf = Rc::new(RefCell::new(Vec::new()));
        let out = buf.clone();
        (Rc::new(move |line: &str| out.borrow_mut().push(line.to_string())), buf)
    }

    #[test]
    fn print_joins_with_spaces() {
        let (sink, buf) = sink();
        let env = install(sink, Rc::new(Cell::new(false)), Rc::new(Cell::new(false)));
        let print = env.get("print");
        print.call(&[Value::Number(1.0), Value::string("x")]);
        assert_eq!(buf.borrow().clone(), vec!["1 x".to_string()]);
    }

    #[test]
    fn number_cast_identity_handled_by_value_call() {
        let env = install(stdout_sink(), Rc::new(Cell::new(false)), Rc::new(Cell::new(false)));
        let number = env.get("number");
        let result = number.call(&[Value::Number(5.0)]);
        assert!(matches!(result, Value::Number(n) if n == 5.0));
    }

    #[test]
    fn number_cast_from_string() {
        let env = install(stdout_sink(), Rc::new(Cell::new(false)), Rc::new(Cell::new(false)));
        let number = env.get("number");
        let result = number.call(&[Value::string("42")]);
        assert!(matches!(result, Value::Number(n) if n == 42.0));
    }

    #[test]
    fn bool_cast_invalid_string_is_error() {
        let env = install(stdout_sink(), Rc::new(Cell::new(false)), Rc::new(Cell::new(false)));
        let bool_type = env.get("bool");
        let result = bool_type.call(&[Value::string("nope")]);
        assert!(matches!(result, Value::Error(_)));
    }

    #[test]
    fn needs_update_reads_and_clears() {
        let flag = Rc::new(Cell::new(true));
        let env = install(stdout_sink(), flag.clone(), Rc::new(Cell::new(false)));
        let pred = env.get("__needs_update");
        assert!(matches!(pred.call(&[]), Value::Bool(true)));
        assert!(!flag.get());
        assert!(matches!(pred.call(&[]), Value::Bool(false)));
    }
}
