// File: src/vm.rs
//
// The stack virtual machine: executes a compiled chunk against a value
// stack, an environment stack realizing lexical scope chaining, a
// call-frame stack, a shared constant pool, and a library registry for
// host-injected native callables (§4.6).

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::OpCode;
use crate::errors::LangError;
use crate::interpreter::{Env, Value};

const MAX_VALUE_STACK: usize = 65_536;
const MAX_ENV_STACK: usize = 256;

/// The `while true` loop appended to every compiled program (§6). Placed
/// after the user's own top-level forms so that `update`/`draw` are
/// already bound by the time the loop starts polling — this crate
/// resolves the prepended/appended conflict between §5's prose and §6's
/// literal kernel listing in favor of appending (see DESIGN.md).
pub const KERNEL_SOURCE: &str = r#"
(while true (
  (if (__needs_update) ((update)))
  (if (__needs_draw) ((clear) (draw)))
))
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Stopped,
    Paused,
    Running,
}

struct Frame {
    code: Rc<Vec<OpCode>>,
    pc: usize,
}

pub struct Vm {
    value_stack: Vec<Value>,
    env_stack: Vec<Env>,
    frames: Vec<Frame>,
    constants: Vec<Value>,
    libraries: HashMap<String, Env>,
    state: VmState,
    needs_update: Rc<Cell<bool>>,
    needs_draw: Rc<Cell<bool>>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Vm {
            value_stack: Vec::new(),
            env_stack: vec![Env::new()],
            frames: Vec::new(),
            constants: Vec::new(),
            libraries: HashMap::new(),
            state: VmState::Stopped,
            needs_update: Rc::new(Cell::new(false)),
            needs_draw: Rc::new(Cell::new(false)),
        }
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    /// Names bound in the global (bottom) env, for REPL introspection.
    pub fn global_names(&self) -> impl Iterator<Item = &String> {
        self.env_stack.first().into_iter().flat_map(|env| env.names())
    }

    pub fn global_get(&self, name: &str) -> Value {
        self.env_stack.first().map(|env| env.get(name)).unwrap_or(Value::Undefined)
    }

    /// The value left on top of the stack after the last run, without
    /// popping it — the REPL's "last expression result" display.
    pub fn last_result(&self) -> Option<Value> {
        self.value_stack.last().cloned()
    }

    /// Shared flag the driver's update tick sets; native `__needs_update`
    /// reads and clears it.
    pub fn needs_update_flag(&self) -> Rc<Cell<bool>> {
        self.needs_update.clone()
    }

    /// Shared flag the driver's draw tick sets; native `__needs_draw`
    /// reads and clears it.
    pub fn needs_draw_flag(&self) -> Rc<Cell<bool>> {
        self.needs_draw.clone()
    }

    pub fn mark_needs_update(&self) {
        self.needs_update.set(true);
    }

    pub fn mark_needs_draw(&self) {
        self.needs_draw.set(true);
    }

    /// Registers a library: `IMPORT` merges its Env into the current top
    /// env on demand (§4.7).
    pub fn add_library(&mut self, name: impl Into<String>, env: Env) {
        self.libraries.insert(name.into(), env);
    }

    /// Bindings visible from program start without an explicit `import`
    /// (§6 built-in globals) — merged straight into the fresh global env.
    pub fn install_globals(&mut self, env: &Env) {
        if let Some(global) = self.env_stack.first_mut() {
            global.merge_from(env);
        }
    }

    /// Compiles `source` with the kernel appended, and seeds a fresh
    /// global env and root frame. Does not start execution — call
    /// `run()` to transition to `Running`.
    pub fn load(&mut self, source: &str) -> Result<(), LangError> {
        let full_source = format!("{source}\n{KERNEL_SOURCE}");
        let chunk = crate::compiler::compile(&full_source)?;
        self.constants = chunk.constants;
        self.value_stack.clear();
        self.env_stack.clear();
        self.env_stack.push(Env::new());
        self.frames.clear();
        self.frames.push(Frame { code: Rc::new(chunk.code), pc: 0 });
        self.state = VmState::Paused;
        Ok(())
    }

    /// Compiles `source` verbatim, without appending the kernel. Used by
    /// the REPL and headless tests that don't drive update/draw.
    pub fn load_bare(&mut self, source: &str) -> Result<(), LangError> {
        let chunk = crate::compiler::compile(source)?;
        self.constants = chunk.constants;
        self.value_stack.clear();
        self.env_stack.clear();
        self.env_stack.push(Env::new());
        self.frames.clear();
        self.frames.push(Frame { code: Rc::new(chunk.code), pc: 0 });
        self.state = VmState::Paused;
        Ok(())
    }

    /// Compiles `source` into a fresh frame and appends its constants to
    /// the existing pool, but leaves `env_stack` untouched — the REPL's
    /// primitive for evaluating one more line against bindings a prior
    /// line already defined. `load`/`load_bare` reset everything because
    /// they start a program from scratch; this only replaces "what runs
    /// next".
    pub fn load_incremental(&mut self, source: &str) -> Result<(), LangError> {
        let chunk = crate::compiler::compile(source)?;
        let offset = self.constants.len();
        let code = offset_code(&chunk.code, offset);
        let constants = offset_constants(chunk.constants, offset);
        self.constants.extend(constants);
        self.value_stack.clear();
        self.frames.clear();
        self.frames.push(Frame { code: Rc::new(code), pc: 0 });
        if self.env_stack.is_empty() {
            self.env_stack.push(Env::new());
        }
        self.state = VmState::Paused;
        Ok(())
    }

    pub fn run(&mut self) {
        if self.state != VmState::Stopped {
            self.state = VmState::Running;
        }
    }

    pub fn pause(&mut self) {
        if self.state == VmState::Running {
            self.state = VmState::Paused;
        }
    }

    pub fn stop(&mut self) {
        self.state = VmState::Stopped;
        self.frames.clear();
        self.value_stack.clear();
        self.env_stack.truncate(1);
    }

    /// Executes up to `max_instructions`, stopping early if the VM
    /// halts. This is the driver's update-tick primitive (§5, ~160
    /// instructions per call).
    pub fn multi_step(&mut self, max_instructions: usize) -> Result<(), LangError> {
        if self.state != VmState::Running {
            return Ok(());
        }
        for _ in 0..max_instructions {
            if !self.step()? {
                break;
            }
        }
        Ok(())
    }

    /// Executes a single instruction. Returns `Ok(false)` once the VM
    /// has halted (top-level RETURN, or nothing left to run).
    pub fn step(&mut self) -> Result<bool, LangError> {
        if self.state == VmState::Stopped {
            return Ok(false);
        }

        let op = {
            let frame = match self.frames.last() {
                Some(f) => f,
                None => {
                    self.state = VmState::Stopped;
                    return Ok(false);
                }
            };
            if frame.pc >= frame.code.len() {
                self.state = VmState::Stopped;
                return Ok(false);
            }
            frame.code[frame.pc].clone()
        };
        self.frames.last_mut().unwrap().pc += 1;

        match self.execute(op) {
            Ok(cont) => Ok(cont),
            Err(err) => {
                self.state = VmState::Stopped;
                Err(err)
            }
        }
    }

    fn push(&mut self, v: Value) {
        if self.value_stack.len() < MAX_VALUE_STACK {
            self.value_stack.push(v);
        }
    }

    fn pop(&mut self) -> Value {
        self.value_stack.pop().unwrap_or(Value::Undefined)
    }

    fn push_env(&mut self, env: Env) {
        if self.env_stack.len() < MAX_ENV_STACK {
            self.env_stack.push(env);
        }
    }

    fn const_name(&self, i: usize) -> Rc<String> {
        match self.constants.get(i) {
            Some(Value::String(s)) => s.clone(),
            _ => Rc::new(String::new()),
        }
    }

    fn get_variable(&self, name: &str) -> Value {
        for env in self.env_stack.iter().rev() {
            if env.has(name) {
                return env.get(name);
            }
        }
        Value::Undefined
    }

    fn set_variable(&mut self, name: &str, value: Value) {
        for env in self.env_stack.iter_mut().rev() {
            if env.has(name) {
                env.set(name.to_string(), value);
                return;
            }
        }
        if let Some(top) = self.env_stack.last_mut() {
            top.set(name.to_string(), value);
        }
    }

    fn jump_to(&mut self, target: isize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.pc = target.max(0) as usize;
        }
    }

    fn current_pc(&self) -> isize {
        self.frames.last().map(|f| f.pc as isize).unwrap_or(0)
    }

    /// Executes one already-fetched instruction. Returns `Ok(false)`
    /// only for the root-frame RETURN (program end).
    fn execute(&mut self, op: OpCode) -> Result<bool, LangError> {
        match op {
            OpCode::GetConst(i) => {
                let v = self.constants.get(i).cloned().unwrap_or(Value::Undefined);
                self.push(v);
            }
            OpCode::DefVariable(i) => {
                let v = self.pop();
                let name = self.const_name(i);
                if let Some(top) = self.env_stack.last_mut() {
                    top.define(name.as_str(), v);
                }
            }
            OpCode::GetVariable(i) => {
                let name = self.const_name(i);
                let v = self.get_variable(&name);
                self.push(v);
            }
            OpCode::SetVariable(i) => {
                let v = self.pop();
                let name = self.const_name(i);
                self.set_variable(&name, v);
            }
            OpCode::True => self.push(Value::Bool(true)),
            OpCode::False => self.push(Value::Bool(false)),
            OpCode::Undefined => self.push(Value::Undefined),
            OpCode::Pop => {
                self.pop();
            }
            OpCode::Dup => {
                let top = self.value_stack.last().cloned().unwrap_or(Value::Undefined);
                self.push(top);
            }
            OpCode::Equal => self.binary(|a, b| a.eq_value(b)),
            OpCode::NotEqual => self.binary(|a, b| a.neq(b)),
            OpCode::Greater => self.binary(|a, b| a.gt(b)),
            OpCode::GreaterEqual => self.binary(|a, b| a.gteq(b)),
            OpCode::Less => self.binary(|a, b| a.lt(b)),
            OpCode::LessEqual => self.binary(|a, b| a.lteq(b)),
            OpCode::Add => self.binary(|a, b| a.add(b)),
            OpCode::Sub => self.binary(|a, b| a.sub(b)),
            OpCode::Mul => self.binary(|a, b| a.mul(b)),
            OpCode::Div => self.binary(|a, b| a.div(b)),
            OpCode::FloorDiv => self.binary(|a, b| a.fdiv(b)),
            OpCode::Mod => self.binary(|a, b| a.modulo(b)),
            OpCode::Dot => self.binary(|a, b| a.dot(b)),
            OpCode::Is => self.binary(|a, b| a.is(b)),
            OpCode::And => {
                let b = self.pop();
                let a = self.pop();
                self.push(if a.truthy() { b } else { a });
            }
            OpCode::Or => {
                let b = self.pop();
                let a = self.pop();
                self.push(if a.truthy() { a } else { b });
            }
            OpCode::Negate => {
                let a = self.pop();
                self.push(a.negate());
            }
            OpCode::Not => {
                let a = self.pop();
                self.push(a.not());
            }
            OpCode::Jump(off) => {
                let target = self.current_pc() + off;
                self.jump_to(target);
            }
            OpCode::JumpIfFalse(off) => {
                let c = self.pop();
                if !c.truthy() {
                    let target = self.current_pc() + off;
                    self.jump_to(target);
                }
            }
            OpCode::Call(argc, i) => self.call(argc, i),
            OpCode::Return => return self.do_return(),
            OpCode::Import(i) => {
                let name = self.const_name(i);
                if let Some(lib) = self.libraries.get(name.as_str()).cloned() {
                    if let Some(top) = self.env_stack.last_mut() {
                        top.merge_from(&lib);
                    }
                }
            }
        }
        Ok(true)
    }

    fn binary(&mut self, f: impl Fn(&Value, &Value) -> Value) {
        let b = self.pop();
        let a = self.pop();
        self.push(f(&a, &b));
    }

    fn call(&mut self, argc: usize, name_idx: usize) {
        let name = self.const_name(name_idx);
        let callee = self.get_variable(&name);
        match callee {
            Value::Function(f) => {
                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(self.pop());
                }
                if args.len() != f.params.len() {
                    self.push(Value::error(format!(
                        "{} expects {} argument(s), got {}",
                        f.name,
                        f.params.len(),
                        args.len()
                    )));
                    return;
                }
                let mut env = Env::new();
                for (param, value) in f.params.iter().zip(args.into_iter()) {
                    env.define(param.clone(), value);
                }
                self.push_env(env);
                self.frames.push(Frame { code: f.code.clone(), pc: 0 });
            }
            other => {
                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(self.pop());
                }
                args.reverse();
                let result = other.call(&args);
                self.push(result);
            }
        }
    }

    fn do_return(&mut self) -> Result<bool, LangError> {
        if self.frames.len() <= 1 {
            self.state = VmState::Stopped;
            return Ok(false);
        }
        let ret = self.pop();
        self.frames.pop();
        self.env_stack.pop();
        self.push(ret);
        Ok(true)
    }
}

/// Shifts every constant-pool index an opcode carries by `offset`. Jump
/// offsets and argument counts aren't constant indices and pass through
/// unchanged.
fn offset_code(code: &[OpCode], offset: usize) -> Vec<OpCode> {
    code.iter()
        .map(|op| match op {
            OpCode::GetConst(i) => OpCode::GetConst(i + offset),
            OpCode::DefVariable(i) => OpCode::DefVariable(i + offset),
            OpCode::GetVariable(i) => OpCode::GetVariable(i + offset),
            OpCode::SetVariable(i) => OpCode::SetVariable(i + offset),
            OpCode::Call(argc, i) => OpCode::Call(*argc, i + offset),
            OpCode::Import(i) => OpCode::Import(i + offset),
            other => other.clone(),
        })
        .collect()
}

/// A freshly compiled chunk's constants were indexed relative to that
/// chunk alone; a `Function` constant's own body carries indices into
/// the same chunk, so it needs the same shift applied recursively.
fn offset_constants(constants: Vec<Value>, offset: usize) -> Vec<Value> {
    constants
        .into_iter()
        .map(|v| match v {
            Value::Function(f) => Value::Function(Rc::new(crate::interpreter::Function {
                name: f.name.clone(),
                params: f.params.clone(),
                code: Rc::new(offset_code(&f.code, offset)),
            })),
            other => other,
        })
        .collect()
}
