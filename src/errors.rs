// File: src/errors.rs
//
// Structured errors for the three tiers described in §7: lex/compile
// errors abort the toolchain before a program ever runs; runtime type
// errors are Value::Error and never reach this type; catastrophic
// errors (host panics, stack underflow) halt the VM.

use colored::Colorize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    Compile,
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::Lex => write!(f, "Lex Error"),
            ErrorKind::Compile => write!(f, "Compile Error"),
            ErrorKind::Runtime => write!(f, "Runtime Error"),
        }
    }
}

/// A tier-1 (lex/compile) or tier-3 (catastrophic) error. Tier-2 runtime
/// type errors never take this shape — they are `Value::Error`, data
/// flowing through the stack like any other value (§7.2).
#[derive(Debug, Clone)]
pub struct LangError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub source_line: Option<String>,
    pub suggestion: Option<String>,
}

impl LangError {
    pub fn lex(message: impl Into<String>, line: usize, column: usize) -> Self {
        LangError {
            kind: ErrorKind::Lex,
            message: message.into(),
            line,
            column,
            source_line: None,
            suggestion: None,
        }
    }

    pub fn compile(message: impl Into<String>, line: usize, column: usize) -> Self {
        LangError {
            kind: ErrorKind::Compile,
            message: message.into(),
            line,
            column,
            source_line: None,
            suggestion: None,
        }
    }

    /// Tier 3: catastrophic VM errors have no fixed source position.
    pub fn runtime(message: impl Into<String>) -> Self {
        LangError {
            kind: ErrorKind::Runtime,
            message: message.into(),
            line: 0,
            column: 0,
            source_line: None,
            suggestion: None,
        }
    }

    pub fn with_source_line(mut self, line: impl Into<String>) -> Self {
        self.source_line = Some(line.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for LangError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.kind == ErrorKind::Runtime {
            writeln!(f, "{}: {}", format!("{}", self.kind).red().bold(), self.message.bold())?;
        } else {
            writeln!(f, "{}:{}: {}", self.line, self.column, self.message.bold())?;
        }

        if let Some(ref source) = self.source_line {
            writeln!(f, "   {}", "|".bright_blue())?;
            writeln!(f, "{} {} {}", format!("{:3}", self.line).bright_blue(), "|".bright_blue(), source)?;
            writeln!(
                f,
                "   {} {}{}",
                "|".bright_blue(),
                " ".repeat(self.column.saturating_sub(1)),
                "^".red().bold()
            )?;
        }

        if let Some(ref suggestion) = self.suggestion {
            writeln!(
                f,
                "   {} {}",
                "=".bright_green(),
                format!("did you mean '{suggestion}'?").bright_green()
            )?;
        }

        Ok(())
    }
}

impl std::error::Error for LangError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lex_error_display_includes_position() {
        let err = LangError::lex("unclosed string", 3, 7);
        let rendered = format!("{err}");
        assert!(rendered.contains("3:7"));
    }
}
