// File: src/main.rs
//
// CLI entry point: compile-and-run a script headlessly, or launch the
// interactive REPL. No JIT, no benchmark harness, no custom test runner —
// this crate's scope has none of those.

mod builtins;
mod bytecode;
mod compiler;
mod driver;
mod errors;
mod game;
mod interpreter;
mod lexer;
mod library;
mod repl;
mod vm;

use clap::{Parser as ClapParser, Subcommand};
use colored::Colorize;
use game::NullGameLibrary;
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(ClapParser)]
#[command(
    name = "sprig",
    about = "Sprig: a small Lisp-style scripting language for tiny games",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// Compile and run a .sprig script to completion, headless game library
    Run {
        /// Path to the .sprig file
        file: PathBuf,
    },

    /// Launch the interactive REPL
    Repl,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file } => run_file(&file),
        Commands::Repl => match repl::Repl::new() {
            Ok(mut repl) => {
                if let Err(e) = repl.run() {
                    eprintln!("{} {}", "REPL error:".bright_red(), e);
                    std::process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("{} {}", "Failed to start REPL:".bright_red(), e);
                std::process::exit(1);
            }
        },
    }
}

fn run_file(file: &PathBuf) {
    let code = match fs::read_to_string(file) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} could not read {}: {e}", "Error:".bright_red(), file.display());
            std::process::exit(1);
        }
    };

    let mut vm = vm::Vm::new();
    let output = Rc::new(RefCell::new(Vec::<String>::new()));
    let sink_buf = output.clone();
    let sink: builtins::PrintSink = Rc::new(move |line: &str| sink_buf.borrow_mut().push(line.to_string()));
    let globals = builtins::install(sink, vm.needs_update_flag(), vm.needs_draw_flag());

    if let Err(err) = vm.load(&code) {
        eprintln!("{err}");
        std::process::exit(1);
    }
    vm.install_globals(&globals);
    let host: Rc<RefCell<dyn game::GameLibrary>> = Rc::new(RefCell::new(NullGameLibrary::new()));
    vm.add_library("game", game::build(host));

    vm.run();
    // The kernel's own `while true` never halts on its own; a headless run
    // drives a bounded number of instructions and then stops the VM so the
    // process can exit instead of spinning forever polling dead flags.
    const HEADLESS_INSTRUCTION_BUDGET: usize = 100_000;
    let result = vm.multi_step(HEADLESS_INSTRUCTION_BUDGET);

    for line in output.borrow().iter() {
        println!("{line}");
    }

    if let Err(err) = result {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
