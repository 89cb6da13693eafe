// File: src/compiler.rs
//
// Single-pass compiler: walks the pull-token stream from the lexer and
// emits a flat bytecode chunk directly, with no intermediate AST (§4.4).
// Forward jumps are emitted with a placeholder offset and patched once
// their target position is known; nested function bodies are compiled
// into the shared chunk and then sliced out into their own code array.

use std::rc::Rc;

use crate::bytecode::{Chunk, OpCode};
use crate::errors::LangError;
use crate::interpreter::{Function, Value};
use crate::lexer::{Keyword, Lexer, TokenKind};

pub struct Compiler<'a> {
    lexer: Lexer<'a>,
    chunk: Chunk,
}

/// Compile `source` into a flat bytecode chunk. Stops at the first
/// compile error, as a well-formed program always ends with `RETURN`.
pub fn compile(source: &str) -> Result<Chunk, LangError> {
    Compiler::new(source).compile()
}

impl<'a> Compiler<'a> {
    pub fn new(source: &'a str) -> Self {
        Compiler { lexer: Lexer::new(source), chunk: Chunk::new() }
    }

    pub fn compile(mut self) -> Result<Chunk, LangError> {
        loop {
            if self.lexer.peek().kind == TokenKind::Eof {
                break;
            }
            self.compile_sexpr()?;
        }
        self.chunk.emit(OpCode::Return);
        Ok(self.chunk)
    }

    fn intern_name(&mut self, name: impl Into<String>) -> usize {
        self.chunk.add_constant(Value::string(name.into()))
    }

    fn err(&self, message: impl Into<String>, line: usize, column: usize) -> LangError {
        LangError::compile(message, line, column)
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String, LangError> {
        let tok = self.lexer.next_token();
        match tok.kind {
            TokenKind::Identifier(name) => Ok(name),
            other => Err(self.err(format!("expected {what}, found {other:?}"), tok.line, tok.column)),
        }
    }

    fn expect(&mut self, expected: TokenKind, what: &str) -> Result<(), LangError> {
        let tok = self.lexer.next_token();
        if tok.kind == expected {
            Ok(())
        } else {
            Err(self.err(format!("expected {what}, found {:?}", tok.kind), tok.line, tok.column))
        }
    }

    /// Computes the signed offset so that, once the VM has fetched the
    /// jump instruction at `jump_index` (advancing pc to jump_index+1),
    /// adding the offset lands pc exactly at `target`.
    fn patch_to(&mut self, jump_index: usize, target: usize) {
        let offset = target as isize - (jump_index as isize + 1);
        self.chunk.patch_jump(jump_index, offset);
    }

    /// A block is `(` s-expression* `)`.
    fn compile_block(&mut self) -> Result<(), LangError> {
        let open = self.lexer.next_token();
        if open.kind != TokenKind::LParen {
            return Err(self.err(
                format!("expected '(' to start a block, found {:?}", open.kind),
                open.line,
                open.column,
            ));
        }
        loop {
            if self.lexer.peek().kind == TokenKind::RParen {
                self.lexer.next_token();
                break;
            }
            if self.lexer.peek().kind == TokenKind::Eof {
                let tok = self.lexer.peek();
                return Err(self.err("unexpected end of input inside block", tok.line, tok.column));
            }
            self.compile_sexpr()?;
        }
        Ok(())
    }

    /// Atom-position dispatch (§4.4 "S-expression grammar").
    fn compile_sexpr(&mut self) -> Result<(), LangError> {
        let tok = self.lexer.next_token();
        match tok.kind {
            TokenKind::LParen => {
                self.compile_paren()?;
                let close = self.lexer.next_token();
                if close.kind != TokenKind::RParen {
                    return Err(self.err(
                        format!("expected ')', found {:?}", close.kind),
                        close.line,
                        close.column,
                    ));
                }
                Ok(())
            }
            TokenKind::Identifier(name) => {
                let idx = self.intern_name(name);
                self.chunk.emit(OpCode::GetVariable(idx));
                Ok(())
            }
            TokenKind::Number(n) => {
                let idx = self.chunk.add_constant(Value::Number(n));
                self.chunk.emit(OpCode::GetConst(idx));
                Ok(())
            }
            TokenKind::String(s) => {
                let idx = self.chunk.add_constant(Value::string(s));
                self.chunk.emit(OpCode::GetConst(idx));
                Ok(())
            }
            TokenKind::Keyword(Keyword::True) => {
                self.chunk.emit(OpCode::True);
                Ok(())
            }
            TokenKind::Keyword(Keyword::False) => {
                self.chunk.emit(OpCode::False);
                Ok(())
            }
            TokenKind::Keyword(Keyword::Undefined) => {
                self.chunk.emit(OpCode::Undefined);
                Ok(())
            }
            other => Err(self.err(format!("unexpected token {other:?} at atom position"), tok.line, tok.column)),
        }
    }

    /// Dispatches on the first token after a freshly consumed `(`.
    fn compile_paren(&mut self) -> Result<(), LangError> {
        let head = self.lexer.next_token();
        match head.kind {
            TokenKind::Plus => self.compile_binary(OpCode::Add),
            TokenKind::Minus => self.compile_minus(),
            TokenKind::Star => self.compile_binary(OpCode::Mul),
            TokenKind::Slash => self.compile_binary(OpCode::Div),
            TokenKind::SlashSlash => self.compile_binary(OpCode::FloorDiv),
            TokenKind::Percent => self.compile_binary(OpCode::Mod),
            TokenKind::Dot => self.compile_binary(OpCode::Dot),
            TokenKind::EqEq => self.compile_binary(OpCode::Equal),
            TokenKind::NotEq => self.compile_binary(OpCode::NotEqual),
            TokenKind::Lt => self.compile_binary(OpCode::Less),
            TokenKind::LtEq => self.compile_binary(OpCode::LessEqual),
            TokenKind::Gt => self.compile_binary(OpCode::Greater),
            TokenKind::GtEq => self.compile_binary(OpCode::GreaterEqual),
            TokenKind::Keyword(Keyword::Is) => self.compile_binary(OpCode::Is),
            TokenKind::Keyword(Keyword::And) => self.compile_binary(OpCode::And),
            TokenKind::Keyword(Keyword::Or) => self.compile_binary(OpCode::Or),
            TokenKind::Bang => {
                self.compile_sexpr()?;
                self.chunk.emit(OpCode::Not);
                Ok(())
            }
            TokenKind::PlusEq => self.compile_compound_assign(OpCode::Add),
            TokenKind::MinusEq => self.compile_compound_assign(OpCode::Sub),
            TokenKind::StarEq => self.compile_compound_assign(OpCode::Mul),
            TokenKind::SlashEq => self.compile_compound_assign(OpCode::Div),
            TokenKind::SlashSlashEq => self.compile_compound_assign(OpCode::FloorDiv),
            TokenKind::PercentEq => self.compile_compound_assign(OpCode::Mod),
            TokenKind::Eq => self.compile_assign(),
            TokenKind::Identifier(name) => self.compile_call(name),
            TokenKind::Keyword(Keyword::Let) => self.compile_let(),
            TokenKind::Keyword(Keyword::If) => self.compile_if(),
            TokenKind::Keyword(Keyword::While) => self.compile_while(),
            TokenKind::Keyword(Keyword::Fun) => self.compile_fun(),
            TokenKind::Keyword(Keyword::Import) => self.compile_import(),
            TokenKind::Keyword(Keyword::Return) => self.compile_return(),
            TokenKind::RParen => Err(self.err("unbalanced parenthesis", head.line, head.column)),
            other => Err(self.err(format!("unexpected token {other:?} after '('"), head.line, head.column)),
        }
    }

    /// `(op A B)`: compile A, compile B, emit opcode.
    fn compile_binary(&mut self, op: OpCode) -> Result<(), LangError> {
        self.compile_sexpr()?;
        self.compile_sexpr()?;
        self.chunk.emit(op);
        Ok(())
    }

    /// `-` is binary subtraction or unary negation depending on whether
    /// a closing paren immediately follows the first operand.
    fn compile_minus(&mut self) -> Result<(), LangError> {
        self.compile_sexpr()?;
        if self.lexer.peek().kind == TokenKind::RParen {
            self.chunk.emit(OpCode::Negate);
        } else {
            self.compile_sexpr()?;
            self.chunk.emit(OpCode::Sub);
        }
        Ok(())
    }

    /// `(op VAR A)` compound assignment: GET_VARIABLE var, compile A,
    /// emit op, SET_VARIABLE var.
    fn compile_compound_assign(&mut self, op: OpCode) -> Result<(), LangError> {
        let name = self.expect_identifier("a variable name")?;
        let idx = self.intern_name(name);
        self.chunk.emit(OpCode::GetVariable(idx));
        self.compile_sexpr()?;
        self.chunk.emit(op);
        self.chunk.emit(OpCode::SetVariable(idx));
        Ok(())
    }

    /// `(= VAR A)`: compile A, emit SET_VARIABLE var.
    fn compile_assign(&mut self) -> Result<(), LangError> {
        let name = self.expect_identifier("a variable name")?;
        let idx = self.intern_name(name);
        self.compile_sexpr()?;
        self.chunk.emit(OpCode::SetVariable(idx));
        Ok(())
    }

    /// `(name arg*)`: compile each arg left to right, emit CALL.
    fn compile_call(&mut self, name: String) -> Result<(), LangError> {
        let idx = self.intern_name(name);
        let mut argc = 0usize;
        loop {
            if self.lexer.peek().kind == TokenKind::RParen {
                break;
            }
            self.compile_sexpr()?;
            argc += 1;
        }
        self.chunk.emit(OpCode::Call(argc, idx));
        Ok(())
    }

    /// `(let NAME EXPR)`: compile EXPR, emit DEF_VARIABLE name.
    fn compile_let(&mut self) -> Result<(), LangError> {
        let name = self.expect_identifier("a variable name")?;
        let idx = self.intern_name(name);
        self.compile_sexpr()?;
        self.chunk.emit(OpCode::DefVariable(idx));
        Ok(())
    }

    /// `(if COND TRUE_BLOCK [ELSE_BLOCK])`.
    fn compile_if(&mut self) -> Result<(), LangError> {
        self.compile_sexpr()?;
        let p1 = self.chunk.emit(OpCode::JumpIfFalse(0));
        self.compile_block()?;
        let after_true = self.chunk.len();

        if self.lexer.peek().kind == TokenKind::LParen {
            // false branch should skip over the upcoming unconditional jump
            self.patch_to(p1, after_true + 1);
            let p2 = self.chunk.emit(OpCode::Jump(0));
            self.compile_block()?;
            let after_else = self.chunk.len();
            self.patch_to(p2, after_else);
        } else {
            self.patch_to(p1, after_true);
        }
        Ok(())
    }

    /// `(while COND BODY_BLOCK)`.
    fn compile_while(&mut self) -> Result<(), LangError> {
        let cond_start = self.chunk.len();
        self.compile_sexpr()?;
        let p = self.chunk.emit(OpCode::JumpIfFalse(0));
        self.compile_block()?;
        let after_body = self.chunk.len();
        // +1 to skip the not-yet-emitted back jump below, same as compile_if's
        // else-branch patch.
        self.patch_to(p, after_body + 1);
        let back = self.chunk.emit(OpCode::Jump(0));
        self.patch_to(back, cond_start);
        Ok(())
    }

    /// `(fun NAME (PARAM*) BODY_BLOCK)`.
    fn compile_fun(&mut self) -> Result<(), LangError> {
        let name = self.expect_identifier("a function name")?;
        self.expect(TokenKind::LParen, "'(' to start the parameter list")?;
        let mut params = Vec::new();
        loop {
            if self.lexer.peek().kind == TokenKind::RParen {
                self.lexer.next_token();
                break;
            }
            params.push(self.expect_identifier("a parameter name")?);
        }

        let fp = self.chunk.len();
        self.compile_block()?;
        let mut body = self.chunk.code.split_off(fp);
        body.push(OpCode::Return);

        // reversed so popping call-time arguments binds them in source order
        params.reverse();

        let function = Value::Function(Rc::new(Function { name: name.clone(), params, code: Rc::new(body) }));
        let fn_idx = self.chunk.add_constant(function);
        self.chunk.emit(OpCode::GetConst(fn_idx));
        let name_idx = self.intern_name(name);
        self.chunk.emit(OpCode::DefVariable(name_idx));
        Ok(())
    }

    /// `(return [EXPR])`: a dedicated flow-control form, not an ordinary
    /// call (§9 open question) — compiles EXPR (or pushes Undefined if
    /// bare) then emits RETURN directly, reusing the CALL/RETURN
    /// frame-unwinding semantics already defined for function exit.
    fn compile_return(&mut self) -> Result<(), LangError> {
        if self.lexer.peek().kind == TokenKind::RParen {
            self.chunk.emit(OpCode::Undefined);
        } else {
            self.compile_sexpr()?;
        }
        self.chunk.emit(OpCode::Return);
        Ok(())
    }

    /// `(import NAME)`.
    fn compile_import(&mut self) -> Result<(), LangError> {
        let name = self.expect_identifier("a module name")?;
        let idx = self.intern_name(name);
        self.chunk.emit(OpCode::Import(idx));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_simple_arithmetic() {
        let chunk = compile("(print (+ 1 2))").unwrap();
        assert_eq!(chunk.code.last(), Some(&OpCode::Return));
        assert!(chunk.code.contains(&OpCode::Add));
    }

    #[test]
    fn unary_minus_vs_binary_minus() {
        let chunk = compile("(- 5)").unwrap();
        assert!(chunk.code.contains(&OpCode::Negate));
        let chunk = compile("(- 5 2)").unwrap();
        assert!(chunk.code.contains(&OpCode::Sub));
    }

    #[test]
    fn if_without_else_patches_forward() {
        let chunk = compile("(if (> 1 0) ((print 1)))").unwrap();
        let jump_idx = chunk.code.iter().position(|op| matches!(op, OpCode::JumpIfFalse(_))).unwrap();
        if let OpCode::JumpIfFalse(off) = chunk.code[jump_idx] {
            let target = (jump_idx as isize + 1 + off) as usize;
            assert_eq!(target, chunk.code.len() - 1); // lands right before RETURN
        } else {
            unreachable!();
        }
    }

    #[test]
    fn if_with_else_skips_else_block() {
        let chunk = compile("(if (> 1 0) ((print 1)) ((print 2)))").unwrap();
        assert!(chunk.code.iter().any(|op| matches!(op, OpCode::Jump(_))));
    }

    #[test]
    fn while_jumps_back_to_condition() {
        let chunk = compile("(let i 0) (while (< i 3) ((+= i 1)))").unwrap();
        let back_idx = chunk.code.iter().rposition(|op| matches!(op, OpCode::Jump(off) if *off < 0)).unwrap();
        if let OpCode::Jump(off) = chunk.code[back_idx] {
            let target = (back_idx as isize + 1 + off) as usize;
            assert!(target < back_idx);
        }
    }

    #[test]
    fn fun_slices_body_and_reverses_params() {
        let chunk = compile("(fun sq (n) ((return (* n n))))").unwrap();
        let func = chunk.constants.iter().find_map(|c| match c {
            Value::Function(f) => Some(f.clone()),
            _ => None,
        });
        let func = func.expect("function constant");
        assert_eq!(func.params, vec!["n".to_string()]);
        assert_eq!(func.code.last(), Some(&OpCode::Return));
    }

    #[test]
    fn constant_interning_shares_index() {
        let chunk = compile("(print \"x\") (print \"x\")").unwrap();
        let count = chunk.constants.iter().filter(|c| matches!(c, Value::String(s) if s.as_str() == "x")).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn unbalanced_paren_is_error() {
        assert!(compile("(print))").is_err());
    }

    #[test]
    fn program_always_ends_in_return() {
        let chunk = compile("(let x 1)").unwrap();
        assert_eq!(chunk.code.last(), Some(&OpCode::Return));
    }
}
