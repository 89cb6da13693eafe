// File: src/interpreter/value.rs
//
// Runtime value types for the Sprig scripting language.
// A closed sum of the eight kinds of values a running program can hold.

use std::fmt;
use std::rc::Rc;

use crate::bytecode::OpCode;

/// A callable implemented in Rust and exposed to scripts as a Value.
///
/// Takes the already-evaluated argument list and returns a Value. Arity is
/// checked by the caller (see [`NativeFunction`]) before this is invoked.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Value>;

/// A user-defined function: its parameter names (in source order) and its
/// own code array. Constants are never duplicated per-function — a
/// function's GET_CONST operands index into the one program-wide constant
/// pool the VM owns (§3: "Function values carry their own code array").
#[derive(Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub code: Rc<Vec<OpCode>>,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fun {}({})>", self.name, self.params.join(" "))
    }
}

/// A host- or stdlib-provided callable. `arity < 0` means variadic.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub arity: i32,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native {}>", self.name)
    }
}

/// The target variant a [`Type`] casts to, and the handful of casts this
/// language actually defines (see spec §4.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeTag {
    Bool,
    Number,
    String,
    Function,
}

impl TypeTag {
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Bool => "bool",
            TypeTag::Number => "number",
            TypeTag::String => "string",
            TypeTag::Function => "function",
        }
    }
}

/// A first-class type value. Calling it casts `args[0]`; `is` checks the tag.
#[derive(Clone)]
pub struct Type {
    pub tag: TypeTag,
    pub caster: NativeFn,
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<type {}>", self.tag.name())
    }
}

/// A runtime value. Every operation in §4.1 is defined on every variant;
/// unsupported combinations produce `Value::Error` rather than panicking.
#[derive(Clone, Debug)]
pub enum Value {
    Bool(bool),
    Number(f64),
    String(Rc<String>),
    Function(Rc<Function>),
    NativeFunction(Rc<NativeFunction>),
    Type(Rc<Type>),
    Undefined,
    Error(Rc<String>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(Rc::new(s.into()))
    }

    pub fn error(msg: impl Into<String>) -> Value {
        Value::Error(Rc::new(msg.into()))
    }

    /// The variant tag used by `is` and by `Type::cast`. Not user-visible
    /// as a value in its own right — only `is`/casts observe it.
    pub fn type_tag(&self) -> Option<TypeTag> {
        match self {
            Value::Bool(_) => Some(TypeTag::Bool),
            Value::Number(_) => Some(TypeTag::Number),
            Value::String(_) => Some(TypeTag::String),
            Value::Function(_) | Value::NativeFunction(_) => Some(TypeTag::Function),
            _ => None,
        }
    }

    /// §4.1 `truthy`: every value is truthy except `false`, `undefined`,
    /// and `Error` (so an unused faulted value dies silently in a branch).
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Bool(false) | Value::Undefined | Value::Error(_))
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::NativeFunction(_) => "native function",
            Value::Type(_) => "type",
            Value::Undefined => "undefined",
            Value::Error(_) => "error",
        }
    }

    fn unsupported(&self, op: &str, other: Option<&Value>) -> Value {
        match other {
            Some(o) => Value::error(format!(
                "unsupported operation '{op}' between {} and {}",
                self.type_name(),
                o.type_name()
            )),
            None => Value::error(format!("unsupported operation '{op}' on {}", self.type_name())),
        }
    }

    pub fn add(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::String(a), Value::String(b)) => Value::string(format!("{a}{b}")),
            _ => self.unsupported("+", Some(other)),
        }
    }

    pub fn sub(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a - b),
            _ => self.unsupported("-", Some(other)),
        }
    }

    pub fn mul(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a * b),
            (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
                if *n < 0.0 || n.fract() != 0.0 {
                    return self.unsupported("*", Some(other));
                }
                Value::string(s.repeat(*n as usize))
            }
            _ => self.unsupported("*", Some(other)),
        }
    }

    pub fn div(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Number(_), Value::Number(b)) if *b == 0.0 => {
                Value::error("division by zero")
            }
            (Value::Number(a), Value::Number(b)) => Value::Number(a / b),
            _ => self.unsupported("/", Some(other)),
        }
    }

    pub fn fdiv(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Number(_), Value::Number(b)) if *b == 0.0 => {
                Value::error("division by zero")
            }
            (Value::Number(a), Value::Number(b)) => Value::Number((a / b).floor()),
            _ => self.unsupported("//", Some(other)),
        }
    }

    pub fn modulo(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Number(_), Value::Number(b)) if *b == 0.0 => {
                Value::error("division by zero")
            }
            (Value::Number(a), Value::Number(b)) => Value::Number(a % b),
            _ => self.unsupported("%", Some(other)),
        }
    }

    pub fn negate(&self) -> Value {
        match self {
            Value::Number(n) => Value::Number(-n),
            _ => self.unsupported("unary -", None),
        }
    }

    pub fn not(&self) -> Value {
        match self {
            Value::Bool(b) => Value::Bool(!b),
            _ => Value::Bool(!self.truthy()),
        }
    }

    pub fn eq_value(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(a == b),
            (Value::Number(a), Value::Number(b)) => Value::Bool(a == b),
            (Value::String(a), Value::String(b)) => Value::Bool(a == b),
            (Value::Undefined, Value::Undefined) => Value::Bool(true),
            _ => self.unsupported("==", Some(other)),
        }
    }

    pub fn neq(&self, other: &Value) -> Value {
        match self.eq_value(other) {
            Value::Bool(b) => Value::Bool(!b),
            err => err,
        }
    }

    pub fn lt(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Value::Bool(a < b),
            (Value::String(a), Value::String(b)) => Value::Bool(a < b),
            _ => self.unsupported("<", Some(other)),
        }
    }

    pub fn gt(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Value::Bool(a > b),
            (Value::String(a), Value::String(b)) => Value::Bool(a > b),
            _ => self.unsupported(">", Some(other)),
        }
    }

    pub fn lteq(&self, other: &Value) -> Value {
        match self.gt(other) {
            Value::Bool(b) => Value::Bool(!b),
            err => err,
        }
    }

    pub fn gteq(&self, other: &Value) -> Value {
        match self.lt(other) {
            Value::Bool(b) => Value::Bool(!b),
            err => err,
        }
    }

    /// `is`: type-tag comparison, used as the bytecode IS opcode target
    /// (`(is A B)` where `B` is a Type). For two non-Type operands this
    /// falls back to value equality, matching the compiler's uniform
    /// `(op A B)` dispatch for `is` in §4.4's operator table.
    pub fn is(&self, other: &Value) -> Value {
        if let Value::Type(t) = other {
            return Value::Bool(self.type_tag() == Some(t.tag));
        }
        self.eq_value(other)
    }

    /// §4.1 `dot`: member/index access. Only String-indexed-by-Number is
    /// specified; everything else is an Error.
    pub fn dot(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::String(s), Value::Number(n)) => {
                if *n < 0.0 || n.fract() != 0.0 {
                    return Value::error(format!("index {n} out of bounds"));
                }
                match s.chars().nth(*n as usize) {
                    Some(c) => Value::string(c.to_string()),
                    None => Value::error(format!("index {n} out of bounds")),
                }
            }
            _ => self.unsupported(".", Some(other)),
        }
    }

    /// §4.1 `call`: only Type and NativeFunction are called this way;
    /// Function calls go through the VM's CALL opcode instead (§4.5).
    pub fn call(&self, args: &[Value]) -> Value {
        match self {
            Value::Type(t) => {
                let target = args.first().cloned().unwrap_or(Value::Undefined);
                if target.type_tag() == Some(t.tag) {
                    return target;
                }
                (t.caster)(args)
            }
            Value::NativeFunction(f) => {
                if f.arity >= 0 && args.len() != f.arity as usize {
                    return Value::error(format!(
                        "{} expects {} argument(s), got {}",
                        f.name,
                        f.arity,
                        args.len()
                    ));
                }
                (f.func)(args)
            }
            _ => self.unsupported("call", None),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::String(s) => write!(f, "{s}"),
            Value::Function(func) => write!(f, "<fun {}>", func.name),
            Value::NativeFunction(func) => write!(f, "<native {}>", func.name),
            Value::Type(t) => write!(f, "<type {}>", t.tag.name()),
            Value::Undefined => write!(f, "undefined"),
            Value::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}
