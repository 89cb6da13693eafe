// File: src/repl.rs
//
// Interactive REPL for the Sprig scripting language:
// - Multi-line input support via paren-balance tracking
// - Command history with up/down arrow navigation
// - Special commands (:help, :clear, :quit, :vars, :reset)
// - Persistent VM state across inputs

use crate::builtins;
use crate::game::{self, NullGameLibrary};
use crate::interpreter::Value;
use crate::vm::Vm;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;
use std::rc::Rc;

/// REPL session that maintains VM state and handles user interaction.
pub struct Repl {
    vm: Vm,
    editor: DefaultEditor,
    output: Rc<RefCell<Vec<String>>>,
}

impl Repl {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let editor = DefaultEditor::new()?;
        let (vm, output) = fresh_vm();
        Ok(Repl { vm, editor, output })
    }

    fn show_banner(&self) {
        println!("{}", "╔══════════════════════════════════════════════════════╗".bright_cyan());
        println!("{}", "║             Sprig REPL - Interactive Shell          ║".bright_cyan());
        println!("{}", "╚══════════════════════════════════════════════════════╝".bright_cyan());
        println!();
        println!(
            "  {} Use {}{}{}{}",
            "Welcome!".bright_green(),
            ":".bright_blue(),
            "help".bright_yellow(),
            " for commands or ".bright_blue(),
            ":quit".bright_yellow()
        );
        println!("  {} Multi-line input: end with an unclosed '('", "Tip:".bright_magenta());
        println!();
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.show_banner();

        let mut buffer = String::new();

        loop {
            let prompt = if buffer.is_empty() { "sprig> ".bright_green().to_string() } else { "....> ".bright_blue().to_string() };

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());

                    if buffer.is_empty() && line.trim().starts_with(':') {
                        if self.handle_command(line.trim()) {
                            continue;
                        } else {
                            break;
                        }
                    }

                    buffer.push_str(&line);
                    buffer.push('\n');

                    if is_input_complete(&buffer) {
                        self.eval_input(&buffer);
                        buffer.clear();
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C (Ctrl+C to interrupt, :quit to exit)".bright_yellow());
                    buffer.clear();
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "\nGoodbye!".bright_cyan());
                    break;
                }
                Err(err) => {
                    eprintln!("{} {}", "Error:".bright_red(), err);
                    break;
                }
            }
        }

        Ok(())
    }

    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":help" | ":h" => {
                self.show_help();
                true
            }
            ":quit" | ":q" | ":exit" => {
                println!("{}", "Goodbye!".bright_cyan());
                false
            }
            ":clear" | ":c" => {
                print!("\x1B[2J\x1B[1;1H");
                self.show_banner();
                true
            }
            ":vars" | ":v" => {
                self.show_variables();
                true
            }
            ":reset" | ":r" => {
                let (vm, output) = fresh_vm();
                self.vm = vm;
                self.output = output;
                println!("{}", "Environment reset".bright_green());
                true
            }
            _ => {
                println!(
                    "{} Unknown command: {}. Type {}{}{}",
                    "Error:".bright_red(),
                    cmd.bright_yellow(),
                    ":".bright_blue(),
                    "help".bright_yellow(),
                    " for available commands.".bright_blue()
                );
                true
            }
        }
    }

    fn show_help(&self) {
        println!();
        println!("{}", "REPL Commands:".bright_cyan().bold());
        println!();
        println!("  {}{}  Display this help message", ":help".bright_yellow(), " or :h     ".dimmed());
        println!("  {}{}  Exit the REPL", ":quit".bright_yellow(), " or :q     ".dimmed());
        println!("  {}{}  Clear the screen", ":clear".bright_yellow(), " or :c    ".dimmed());
        println!("  {}{}  Show defined variables", ":vars".bright_yellow(), " or :v    ".dimmed());
        println!("  {}{}  Reset the VM", ":reset".bright_yellow(), " or :r   ".dimmed());
        println!();
        println!("{}", "Navigation:".bright_cyan().bold());
        println!();
        println!("  {}  Navigate command history", "↑/↓ arrows".bright_blue());
        println!("  {}  Interrupt current input", "Ctrl+C    ".bright_blue());
        println!("  {}  Exit REPL", "Ctrl+D    ".bright_blue());
        println!();
        println!("{}", "Multi-line Input:".bright_cyan().bold());
        println!();
        println!("  Leave a parenthesis unclosed to continue on the next line.");
        println!("  Close it to execute the form.");
        println!();
        println!("{}", "Examples:".bright_cyan().bold());
        println!();
        println!("  {}", "sprig> (let x 42)".dimmed());
        println!("  {}", "sprig> (fun greet (name) (".dimmed());
        println!("  {}", "....>     (print \"hello\" name)".dimmed());
        println!("  {}", "....> ))".dimmed());
        println!("  {}", "sprig> (greet \"world\")".dimmed());
        println!();
    }

    fn show_variables(&self) {
        println!();
        println!("{}", "Defined Variables:".bright_cyan().bold());
        println!();
        let names: Vec<&String> = self.vm.global_names().collect();
        if names.is_empty() {
            println!("  {}", "(none)".dimmed());
        } else {
            for name in names {
                println!("  {} = {}", name.bright_yellow(), self.format_inline(&self.vm.global_get(name)));
            }
        }
        println!();
    }

    /// Evaluates one complete form and prints its result, the way a REPL
    /// normally shows the value of the last top-level expression.
    fn eval_input(&mut self, input: &str) {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return;
        }

        if let Err(err) = self.vm.load_incremental(trimmed) {
            println!("{} {}", "Error:".bright_red().bold(), err);
            return;
        }
        self.vm.run();
        loop {
            match self.vm.step() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(err) => {
                    println!("{} {}", "Error:".bright_red().bold(), err);
                    return;
                }
            }
        }

        for line in self.output.borrow_mut().drain(..) {
            println!("{}", line);
        }

        if let Some(result) = self.vm.last_result() {
            if !matches!(result, Value::Undefined) {
                println!("{} {}", "=>".bright_blue(), self.format_inline(&result));
            }
        }
    }

    fn format_inline(&self, value: &Value) -> String {
        match value {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    (*n as i64).to_string()
                } else {
                    n.to_string()
                }
            }
            Value::String(s) => format!("\"{s}\""),
            Value::Bool(b) => b.to_string(),
            Value::Function(f) => format!("<fun {}({})>", f.name, f.params.join(" ")),
            Value::NativeFunction(f) => format!("<native {}>", f.name),
            Value::Type(t) => format!("<type {}>", t.tag.name()),
            Value::Undefined => "undefined".to_string(),
            Value::Error(e) => format!("error: {e}"),
        }
    }
}

fn fresh_vm() -> (Vm, Rc<RefCell<Vec<String>>>) {
    let mut vm = Vm::new();
    let output = Rc::new(RefCell::new(Vec::new()));
    let sink_buf = output.clone();
    let sink: builtins::PrintSink = Rc::new(move |line: &str| sink_buf.borrow_mut().push(line.to_string()));
    let globals = builtins::install(sink, vm.needs_update_flag(), vm.needs_draw_flag());
    vm.install_globals(&globals);
    let host: Rc<RefCell<dyn game::GameLibrary>> = Rc::new(RefCell::new(NullGameLibrary::new()));
    vm.add_library("game", game::build(host));
    (vm, output)
}

/// True if every paren is balanced and we aren't mid-string — mirrors the
/// lexer's own notion of a string literal so the REPL doesn't miscount
/// parens written inside one.
fn is_input_complete(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return true;
    }

    let mut paren_count = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for ch in trimmed.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '(' if !in_string => paren_count += 1,
            ')' if !in_string => paren_count -= 1,
            _ => {}
        }
    }

    !in_string && paren_count <= 0
}

impl Default for Repl {
    fn default() -> Self {
        Self::new().expect("failed to create REPL")
    }
}
