// File: src/interpreter/mod.rs
//
// Runtime building blocks shared between the compiler and the VM: the
// Value sum type (§3/§4.1) and the Env scope representation (§3/§4.2).
// There is no tree-walking evaluator here — this crate only executes
// compiled bytecode (see compiler.rs, vm.rs).

mod environment;
mod value;

pub use environment::Env;
pub use value::{Function, NativeFn, NativeFunction, Type, TypeTag, Value};
