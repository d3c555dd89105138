//! Lexer (tokenizer) for assignment expressions.

use crate::error::{MdoError, Result};

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The token's text
    pub text: String,
    /// Column number (1-indexed)
    pub column: usize,
}

/// Token types in the expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Variable, function or constant name
    Identifier,
    /// Floating point literal, possibly with exponent
    Number,
    Plus,
    Minus,
    Star,
    Slash,
    /// `**`
    Power,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Comma,
    Equals,
    /// End of input
    Eof,
}

/// Lexer for tokenizing a single expression line.
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    column: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            column: 1,
        }
    }

    /// Tokenize the whole input, ending with [`TokenKind::Eof`].
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();

        let column = self.column;
        let ch = match self.chars.peek().copied() {
            Some(ch) => ch,
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    column,
                })
            }
        };

        let single = |kind: TokenKind| Token {
            kind,
            text: ch.to_string(),
            column,
        };

        let token = match ch {
            '+' => {
                self.advance();
                single(TokenKind::Plus)
            }
            '-' => {
                self.advance();
                single(TokenKind::Minus)
            }
            '*' => {
                self.advance();
                if self.chars.peek() == Some(&'*') {
                    self.advance();
                    Token {
                        kind: TokenKind::Power,
                        text: "**".to_string(),
                        column,
                    }
                } else {
                    single(TokenKind::Star)
                }
            }
            '/' => {
                self.advance();
                single(TokenKind::Slash)
            }
            '(' => {
                self.advance();
                single(TokenKind::OpenParen)
            }
            ')' => {
                self.advance();
                single(TokenKind::CloseParen)
            }
            '[' => {
                self.advance();
                single(TokenKind::OpenBracket)
            }
            ']' => {
                self.advance();
                single(TokenKind::CloseBracket)
            }
            ',' => {
                self.advance();
                single(TokenKind::Comma)
            }
            '=' => {
                self.advance();
                single(TokenKind::Equals)
            }
            '0'..='9' | '.' => Token {
                kind: TokenKind::Number,
                text: self.read_number(column)?,
                column,
            },
            _ if ch.is_alphabetic() || ch == '_' => Token {
                kind: TokenKind::Identifier,
                text: self.read_identifier(),
                column,
            },
            _ => {
                return Err(MdoError::lexer(
                    column,
                    format!("unexpected character '{}'", ch),
                ));
            }
        };

        Ok(token)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        self.column += 1;
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(&ch) = self.chars.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut text = String::new();
        while let Some(&ch) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        text
    }

    fn read_digits(&mut self, text: &mut String) {
        while let Some(&ch) = self.chars.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self, column: usize) -> Result<String> {
        let mut text = String::new();

        // Integer part
        self.read_digits(&mut text);

        // Decimal part
        if self.chars.peek() == Some(&'.') {
            text.push('.');
            self.advance();
            self.read_digits(&mut text);
        }

        // Exponent part
        if let Some(&ch) = self.chars.peek() {
            if ch == 'e' || ch == 'E' {
                text.push(ch);
                self.advance();
                if let Some(&sign) = self.chars.peek() {
                    if sign == '-' || sign == '+' {
                        text.push(sign);
                        self.advance();
                    }
                }
                let before = text.len();
                self.read_digits(&mut text);
                if text.len() == before {
                    return Err(MdoError::lexer(column, format!("malformed exponent in '{}'", text)));
                }
            }
        }

        if text == "." {
            return Err(MdoError::lexer(column, "lone '.' is not a number"));
        }
        Ok(text)
    }
}
