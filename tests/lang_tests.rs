// Integration tests for the Sprig scripting language.
//
// Each test compiles and runs a complete program and checks console
// output, following the end-to-end scenarios in the language spec (§8).

use sprig::builtins;
use sprig::game::{self, NullGameLibrary};
use sprig::interpreter::{Env, NativeFunction, Value};
use sprig::vm::Vm;
use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

/// Compiles `code` without the update/draw kernel and runs it to
/// completion, returning everything `print` emitted.
fn run_source(code: &str) -> Vec<String> {
    let mut vm = Vm::new();
    vm.load_bare(code).expect("compile");
    let output = Rc::new(RefCell::new(Vec::new()));
    let sink_buf = output.clone();
    let sink: builtins::PrintSink = Rc::new(move |line: &str| sink_buf.borrow_mut().push(line.to_string()));
    let globals = builtins::install(sink, vm.needs_update_flag(), vm.needs_draw_flag());
    vm.install_globals(&globals);
    let host: Rc<RefCell<dyn game::GameLibrary>> = Rc::new(RefCell::new(NullGameLibrary::new()));
    vm.add_library("game", game::build(host));

    vm.run();
    // Bounded as defense in depth — a genuinely non-terminating test program
    // is a bug in the test, not something to hang the suite on.
    const STEP_BUDGET: usize = 1_000_000;
    for _ in 0..STEP_BUDGET {
        match vm.step() {
            Ok(true) => continue,
            Ok(false) => return output.borrow().clone(),
            Err(e) => panic!("vm error: {e}"),
        }
    }
    panic!("program did not halt within {STEP_BUDGET} steps");
}

#[test]
fn scenario_print_addition() {
    assert_eq!(run_source("(print (+ 1 2))"), vec!["3"]);
}

#[test]
fn scenario_assignment_and_mutation() {
    assert_eq!(run_source("(let x 10) (= x (* x 2)) (print x)"), vec!["20"]);
}

#[test]
fn scenario_if_else() {
    assert_eq!(run_source("(if (> 3 2) ((print \"y\")) ((print \"n\")))"), vec!["y"]);
}

#[test]
fn scenario_while_loop() {
    assert_eq!(
        run_source("(let i 0) (while (< i 3) ((print i) (+= i 1)))"),
        vec!["0", "1", "2"]
    );
}

#[test]
fn scenario_function_call_with_return() {
    assert_eq!(run_source("(fun sq (n) ((return (* n n)))) (print (sq 5))"), vec!["25"]);
}

#[test]
fn scenario_string_indexing() {
    assert_eq!(run_source("(print (. \"abc\" 1))"), vec!["b"]);
    let out = run_source("(print (. \"abc\" 9))");
    assert!(out[0].starts_with("error:"), "VM continues past an unused error value");
}

#[test]
fn division_by_zero_is_an_error_value_not_a_panic() {
    let out = run_source("(print (/ 1 0))");
    assert!(out[0].starts_with("error:"));
}

#[test]
fn not_equal_is_negation_of_equal_for_comparable_values() {
    assert_eq!(run_source("(print (!= 1 1))"), vec!["false"]);
    assert_eq!(run_source("(print (!= 1 2))"), vec!["true"]);
}

#[test]
fn floor_div_matches_floor_of_true_division() {
    assert_eq!(run_source("(print (// 7 2))"), vec!["3"]);
    assert_eq!(run_source("(print (// -7 2))"), vec!["-4"]);
}

#[test]
fn recursive_function_calls_resolve_dynamically() {
    assert_eq!(
        run_source("(fun fact (n) ((if (<= n 1) ((return 1)) ((return (* n (fact (- n 1)))))))) (print (fact 5))"),
        vec!["120"]
    );
}

#[test]
fn redefining_a_name_with_let_is_rejected_silently() {
    assert_eq!(run_source("(let x 1) (let x 2) (print x)"), vec!["1"]);
}

#[test]
fn unary_minus_negates_while_binary_minus_subtracts() {
    assert_eq!(run_source("(print (- 5))"), vec!["-5"]);
    assert_eq!(run_source("(print (- 5 2))"), vec!["3"]);
}

#[test]
fn and_or_short_circuit_semantics_return_an_operand_not_just_a_bool() {
    assert_eq!(run_source("(print (or false 7))"), vec!["7"]);
    assert_eq!(run_source("(print (and 7 false))"), vec!["false"]);
}

#[test]
fn type_casting_natives_cast_or_error() {
    assert_eq!(run_source("(print (number \"42\"))"), vec!["42"]);
    let out = run_source("(print (bool \"nope\"))");
    assert!(out[0].starts_with("error:"));
}

#[test]
fn is_checks_runtime_type_tag() {
    assert_eq!(run_source("(print (is 5 number))"), vec!["true"]);
    assert_eq!(run_source("(print (is \"x\" number))"), vec!["false"]);
}

#[test]
fn undefined_variables_read_as_undefined_rather_than_erroring() {
    assert_eq!(run_source("(print nope)"), vec!["undefined"]);
}

#[test]
fn game_library_natives_are_reachable_after_import() {
    assert_eq!(run_source("(import game) (clear) (print \"drew\")"), vec!["drew"]);
}

#[test]
fn demo_fizzbuzz_matches_the_classic_sequence() {
    let source = fs::read_to_string("demos/fizzbuzz.game").expect("read demo");
    let out = run_source(&source);
    assert_eq!(out[2], "fizz");
    assert_eq!(out[4], "buzz");
    assert_eq!(out[14], "fizzbuzz");
    assert_eq!(out.len(), 20);
}

#[test]
fn library_builder_produces_bindings_callable_through_import() {
    let (name, env) = sprig::library::Library::new("mathx")
        .native("double", 1, |args| match args.first() {
            Some(Value::Number(n)) => Value::Number(n * 2.0),
            _ => Value::error("double expects a number"),
        })
        .build();

    let mut vm = Vm::new();
    vm.load_bare("(import mathx) (print (double 21))").expect("compile");
    let output = Rc::new(RefCell::new(Vec::new()));
    let sink_buf = output.clone();
    let sink: builtins::PrintSink = Rc::new(move |line: &str| sink_buf.borrow_mut().push(line.to_string()));
    let globals = builtins::install(sink, vm.needs_update_flag(), vm.needs_draw_flag());
    vm.install_globals(&globals);
    vm.add_library(name, env);
    vm.run();
    loop {
        match vm.step() {
            Ok(true) => continue,
            Ok(false) => break,
            Err(e) => panic!("vm error: {e}"),
        }
    }
    assert_eq!(output.borrow().clone(), vec!["42"]);
}

#[test]
fn null_game_library_reports_no_key_pressed_by_default() {
    let mut env = Env::new();
    env.define(
        "noop",
        Value::NativeFunction(Rc::new(NativeFunction { name: "noop".to_string(), arity: 0, func: Rc::new(|_| Value::Undefined) })),
    );
    assert!(env.has("noop"));

    let host: Rc<RefCell<dyn game::GameLibrary>> = Rc::new(RefCell::new(NullGameLibrary::new()));
    let lib = game::build(host);
    let is_key_pressed = lib.get("is_key_pressed");
    assert!(matches!(is_key_pressed.call(&[Value::string("Enter")]), Value::Bool(false)));
}

#[test]
fn driver_pump_invokes_update_and_draw_once_per_pump() {
    use sprig::driver::{Driver, ManualTicker};

    let mut vm = Vm::new();
    vm.load("(import game) (fun update () ((print \"u\"))) (fun draw () ((print \"d\")))").expect("compile");
    let output = Rc::new(RefCell::new(Vec::new()));
    let sink_buf = output.clone();
    let sink: builtins::PrintSink = Rc::new(move |line: &str| sink_buf.borrow_mut().push(line.to_string()));
    let globals = builtins::install(sink, vm.needs_update_flag(), vm.needs_draw_flag());
    vm.install_globals(&globals);
    let host: Rc<RefCell<dyn game::GameLibrary>> = Rc::new(RefCell::new(NullGameLibrary::new()));
    vm.add_library("game", game::build(host));

    let mut driver = Driver::new(vm, ManualTicker::new());
    driver.vm_mut().run();
    driver.pump_once().expect("pump");

    assert_eq!(output.borrow().clone(), vec!["u", "d"]);
}
