// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tokenizer for module source text.

use super::CompileError;

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Integer literal
    Int(i64),
    /// String literal, escapes already processed
    Str(String),
    /// Identifier
    Ident(String),
    /// `let`
    Let,
    /// `import`
    Import,
    /// `from`
    From,
    /// `as`
    As,
    /// `raise`
    Raise,
    /// `null`
    Null,
    /// `true`
    True,
    /// `false`
    False,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `+`
    Plus,
    /// `=`
    Equals,
    /// `;`
    Semicolon,
    /// End of input
    Eof,
}

/// A token with its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The token kind
    pub kind: TokenKind,
    /// 1-based line number
    pub line: u32,
}

/// Splits source text into tokens, ending with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        let kind = match c {
            '\n' => {
                line += 1;
                chars.next();
                continue;
            }
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '/' => {
                chars.next();
                if chars.peek() != Some(&'/') {
                    return Err(CompileError::new(line, "unexpected character '/'"));
                }
                while chars.peek().is_some_and(|&c| c != '\n') {
                    chars.next();
                }
                continue;
            }
            '0'..='9' => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(d);
                    chars.next();
                }
                let n = digits
                    .parse::<i64>()
                    .map_err(|_| CompileError::new(line, format!("integer literal {} is too large", digits)))?;
                TokenKind::Int(n)
            }
            '"' => {
                chars.next();
                TokenKind::Str(scan_string(&mut chars, &mut line)?)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&w) = chars.peek().filter(|w| w.is_alphanumeric() || **w == '_') {
                    word.push(w);
                    chars.next();
                }
                keyword(&word).unwrap_or(TokenKind::Ident(word))
            }
            _ => {
                chars.next();
                match c {
                    '(' => TokenKind::LeftParen,
                    ')' => TokenKind::RightParen,
                    ',' => TokenKind::Comma,
                    '.' => TokenKind::Dot,
                    '+' => TokenKind::Plus,
                    '=' => TokenKind::Equals,
                    ';' => TokenKind::Semicolon,
                    _ => {
                        return Err(CompileError::new(line, format!("unexpected character '{}'", c)));
                    }
                }
            }
        };

        tokens.push(Token { kind, line });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        line,
    });
    Ok(tokens)
}

fn scan_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    line: &mut u32,
) -> Result<String, CompileError> {
    let start = *line;
    let mut value = String::new();

    loop {
        match chars.next() {
            None => return Err(CompileError::new(start, "unterminated string")),
            Some('"') => return Ok(value),
            Some('\\') => match chars.next() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some('"') => value.push('"'),
                Some('\\') => value.push('\\'),
                Some(other) => {
                    return Err(CompileError::new(*line, format!("invalid escape '\\{}'", other)));
                }
                None => return Err(CompileError::new(start, "unterminated string")),
            },
            Some(c) => {
                if c == '\n' {
                    *line += 1;
                }
                value.push(c);
            }
        }
    }
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "let" => TokenKind::Let,
        "import" => TokenKind::Import,
        "from" => TokenKind::From,
        "as" => TokenKind::As,
        "raise" => TokenKind::Raise,
        "null" => TokenKind::Null,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => return None,
    })
}
