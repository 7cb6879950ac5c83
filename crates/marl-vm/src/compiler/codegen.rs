// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Code generation from tokens.

use super::CompileError;
use super::bytecode::{Bytecode, Instruction, OpCode, Operand};
use super::lexer::{Token, TokenKind, tokenize};
use crate::module::Module;
use crate::runtime::Value;

/// Compiles module source into a top-level function body.
///
/// The compiler declares `let`, `import` and `from` bindings in the target
/// module's namespace as it goes, so every slot exists before the body runs.
pub struct Compiler<'m> {
    module: &'m mut Module,
    tokens: Vec<Token>,
    current: usize,
    bytecode: Bytecode,
    ends_with_expression: bool,
}

impl<'m> Compiler<'m> {
    /// Creates a compiler targeting `module`.
    pub fn new(module: &'m mut Module) -> Self {
        Self {
            module,
            tokens: Vec::new(),
            current: 0,
            bytecode: Bytecode::new(),
            ends_with_expression: false,
        }
    }

    /// Compiles `source` into bytecode.
    ///
    /// The body returns the value of its final statement when that statement
    /// is an expression, and null otherwise.
    pub fn compile(mut self, source: &str) -> Result<Bytecode, CompileError> {
        self.tokens = tokenize(source)?;

        while !self.check(&TokenKind::Eof) {
            self.compile_statement()?;
            self.matches(&TokenKind::Semicolon);
        }

        if self.ends_with_expression {
            // Keep the final expression's value as the return value
            self.bytecode.instructions.pop();
        } else {
            self.emit(OpCode::LoadNull);
        }
        self.emit(OpCode::Return);

        Ok(self.bytecode)
    }

    fn compile_statement(&mut self) -> Result<(), CompileError> {
        self.ends_with_expression = false;

        let kind = self.peek().kind.clone();
        match kind {
            TokenKind::Let => {
                self.advance();
                let name = self.identifier("expected variable name after 'let'")?;
                self.consume(&TokenKind::Equals, "expected '=' after variable name")?;
                self.compile_expression()?;
                self.store(&name)?;
            }
            TokenKind::Import => {
                self.advance();
                let (module, last) = self.dotted_name()?;
                let binding = if self.matches(&TokenKind::As) {
                    self.identifier("expected name after 'as'")?
                } else {
                    last
                };
                self.compile_import(&module)?;
                self.store(&binding)?;
            }
            TokenKind::From => {
                self.advance();
                let (module, _) = self.dotted_name()?;
                self.consume(&TokenKind::Import, "expected 'import' after module name")?;
                self.compile_import(&module)?;

                loop {
                    let name = self.identifier("expected variable name to import")?;
                    self.emit(OpCode::Dup);
                    self.emit_string(&name)?;
                    self.emit_invoke("get", 1)?;
                    self.store(&name)?;
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                }

                self.emit(OpCode::Pop);
            }
            TokenKind::Raise => {
                self.advance();
                self.compile_expression()?;
                self.emit(OpCode::Raise);
            }
            TokenKind::Ident(_) if self.peek_next().kind == TokenKind::Equals => {
                let name = self.identifier("expected variable name")?;
                self.advance();
                let slot = self.resolve(&name)?;
                self.compile_expression()?;
                self.emit_with(OpCode::StoreVariable, Operand::Variable(slot));
                self.emit(OpCode::Pop);
            }
            _ => {
                self.compile_expression()?;
                self.emit(OpCode::Pop);
                self.ends_with_expression = true;
            }
        }

        Ok(())
    }

    /// Loads and runs `module`, leaving the module value on the stack.
    fn compile_import(&mut self, module: &str) -> Result<(), CompileError> {
        self.emit_string(module)?;
        self.emit(OpCode::Import);
        self.emit(OpCode::Dup);
        self.emit_invoke("run", 0)?;
        self.emit(OpCode::Pop);
        Ok(())
    }

    fn compile_expression(&mut self) -> Result<(), CompileError> {
        self.compile_postfix()?;
        while self.matches(&TokenKind::Plus) {
            self.compile_postfix()?;
            self.emit(OpCode::Add);
        }
        Ok(())
    }

    fn compile_postfix(&mut self) -> Result<(), CompileError> {
        self.compile_primary()?;

        loop {
            if self.matches(&TokenKind::LeftParen) {
                let count = self.compile_arguments()?;
                self.emit_with(OpCode::Call, Operand::ArgCount(count));
            } else if self.matches(&TokenKind::Dot) {
                let method = self.identifier("expected method name after '.'")?;
                self.consume(&TokenKind::LeftParen, "expected '(' after method name")?;
                let count = self.compile_arguments()?;
                self.emit_invoke(&method, count)?;
            } else {
                return Ok(());
            }
        }
    }

    /// Compiles a parenthesized argument list whose `(` was already consumed.
    fn compile_arguments(&mut self) -> Result<u8, CompileError> {
        let mut count: usize = 0;
        if !self.check(&TokenKind::RightParen) {
            loop {
                self.compile_expression()?;
                count += 1;
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RightParen, "expected ')' after arguments")?;

        u8::try_from(count).map_err(|_| self.error("too many arguments"))
    }

    fn compile_primary(&mut self) -> Result<(), CompileError> {
        let token = self.advance().clone();

        match token.kind {
            TokenKind::Int(n) => {
                let index = self
                    .bytecode
                    .add_constant(Value::Int(n))
                    .ok_or_else(|| self.error("too many constants"))?;
                self.emit_with(OpCode::LoadConst, Operand::Constant(index));
            }
            TokenKind::Str(s) => self.emit_string(&s)?,
            TokenKind::Null => self.emit(OpCode::LoadNull),
            TokenKind::True => self.emit(OpCode::LoadTrue),
            TokenKind::False => self.emit(OpCode::LoadFalse),
            TokenKind::Ident(name) => {
                let slot = self.resolve(&name)?;
                self.emit_with(OpCode::LoadVariable, Operand::Variable(slot));
            }
            TokenKind::LeftParen => {
                self.compile_expression()?;
                self.consume(&TokenKind::RightParen, "expected ')' after expression")?;
            }
            other => {
                return Err(CompileError::new(
                    token.line,
                    format!("expected expression, found {}", describe(&other)),
                ));
            }
        }

        Ok(())
    }

    /// Stores the top of stack into `name`, declaring it if needed, and pops.
    fn store(&mut self, name: &str) -> Result<(), CompileError> {
        let slot = self.module.namespace.declare(name);
        let slot = u16::try_from(slot).map_err(|_| self.error("too many module variables"))?;
        self.emit_with(OpCode::StoreVariable, Operand::Variable(slot));
        self.emit(OpCode::Pop);
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<u16, CompileError> {
        let slot = self
            .module
            .namespace
            .find(name)
            .ok_or_else(|| self.previous_error(format!("undefined variable '{}'", name)))?;
        u16::try_from(slot).map_err(|_| self.error("too many module variables"))
    }

    fn dotted_name(&mut self) -> Result<(String, String), CompileError> {
        let mut last = self.identifier("expected module name")?;
        let mut full = last.clone();
        while self.matches(&TokenKind::Dot) {
            last = self.identifier("expected name after '.'")?;
            full.push('.');
            full.push_str(&last);
        }
        Ok((full, last))
    }

    fn emit(&mut self, opcode: OpCode) {
        self.bytecode.emit(Instruction::simple(opcode));
    }

    fn emit_with(&mut self, opcode: OpCode, operand: Operand) {
        self.bytecode.emit(Instruction::with_operand(opcode, operand));
    }

    fn emit_string(&mut self, s: &str) -> Result<(), CompileError> {
        let index = self.module.strings.intern(s);
        self.emit_with(OpCode::LoadString, Operand::String(index));
        Ok(())
    }

    fn emit_invoke(&mut self, method: &str, args: u8) -> Result<(), CompileError> {
        let name = self.module.strings.intern(method);
        self.emit_with(OpCode::Invoke, Operand::Method { name, args });
        Ok(())
    }

    fn identifier(&mut self, message: &str) -> Result<String, CompileError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(message)),
        }
    }

    fn consume(&mut self, kind: &TokenKind, message: &str) -> Result<(), CompileError> {
        if self.matches(kind) {
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.current + 1).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> &Token {
        let index = self.current.min(self.tokens.len() - 1);
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
        &self.tokens[index]
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(self.peek().line, message)
    }

    fn previous_error(&self, message: impl Into<String>) -> CompileError {
        let line = self.tokens[self.current.saturating_sub(1)].line;
        CompileError::new(line, message)
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Eof => "end of input".to_string(),
        TokenKind::Ident(name) => format!("'{}'", name),
        other => format!("{:?}", other).to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> Module {
        Module::new(Some("test".into()), None)
    }

    fn opcodes(bytecode: &Bytecode) -> Vec<OpCode> {
        bytecode.instructions.iter().map(|i| i.opcode).collect()
    }

    #[test]
    fn test_let_declares_before_run() {
        let mut module = module();
        let bytecode = Compiler::new(&mut module).compile("let x = 1").unwrap();

        assert_eq!(module.namespace.find("x"), Some(0));
        assert_eq!(module.namespace.get(0), Some(&Value::Null));
        assert_eq!(
            opcodes(&bytecode),
            vec![
                OpCode::LoadConst,
                OpCode::StoreVariable,
                OpCode::Pop,
                OpCode::LoadNull,
                OpCode::Return,
            ]
        );
    }

    #[test]
    fn test_trailing_expression_is_returned() {
        let mut module = module();
        let bytecode = Compiler::new(&mut module).compile("let x = 1; x + 2").unwrap();
        let ops = opcodes(&bytecode);

        assert_eq!(&ops[ops.len() - 3..], &[OpCode::LoadConst, OpCode::Add, OpCode::Return]);
    }

    #[test]
    fn test_undefined_variable_is_error() {
        let mut module = module();
        let error = Compiler::new(&mut module).compile("let a = 1\nb").unwrap_err();
        assert_eq!(error.line, 2);
        assert_eq!(error.message, "undefined variable 'b'");
    }

    #[test]
    fn test_let_cannot_reference_itself() {
        let mut module = module();
        assert!(Compiler::new(&mut module).compile("let a = a").is_err());
    }

    #[test]
    fn test_assignment_requires_existing_name() {
        let mut module = module();
        assert!(Compiler::new(&mut module).compile("a = 1").is_err());

        let mut module = self::module();
        assert!(Compiler::new(&mut module).compile("let a = 1\na = 2").is_ok());
    }

    #[test]
    fn test_import_binds_last_segment() {
        let mut module = module();
        let bytecode = Compiler::new(&mut module).compile("import geo.shapes").unwrap();

        assert!(module.namespace.find("shapes").is_some());
        assert!(module.namespace.find("geo").is_none());
        assert!(opcodes(&bytecode).contains(&OpCode::Import));
        assert!(module.strings.iter().any(|s| s == "geo.shapes"));
        assert!(module.strings.iter().any(|s| s == "run"));
    }

    #[test]
    fn test_import_as() {
        let mut module = module();
        Compiler::new(&mut module).compile("import geo.shapes as s").unwrap();
        assert!(module.namespace.find("s").is_some());
        assert!(module.namespace.find("shapes").is_none());
    }

    #[test]
    fn test_from_import_declares_each_name() {
        let mut module = module();
        Compiler::new(&mut module).compile("from geo import area, perimeter").unwrap();

        let names: Vec<&str> = module.namespace.names().map(|n| &**n).collect();
        assert_eq!(names, vec!["area", "perimeter"]);
        assert!(module.strings.iter().any(|s| s == "get"));
    }

    #[test]
    fn test_string_literals_are_interned_once() {
        let mut module = module();
        Compiler::new(&mut module)
            .compile("let a = \"geo\"; let b = \"geo\"")
            .unwrap();
        assert_eq!(module.strings.iter().filter(|s| *s == "geo").count(), 1);
    }

    #[test]
    fn test_method_invocation() {
        let mut module = module();
        module.namespace.define("m", Value::Null);
        let bytecode = Compiler::new(&mut module).compile("m.get(\"x\")").unwrap();

        let invoke = bytecode
            .instructions
            .iter()
            .find(|i| i.opcode == OpCode::Invoke)
            .unwrap();
        assert!(matches!(invoke.operand, Some(Operand::Method { args: 1, .. })));
    }

    #[test]
    fn test_syntax_errors() {
        for source in ["let = 1", "import", "from geo area", "print(1", "1 +", ")"] {
            let mut module = module();
            module.namespace.define("print", Value::Null);
            assert!(
                Compiler::new(&mut module).compile(source).is_err(),
                "expected error for {:?}",
                source
            );
        }
    }
}
