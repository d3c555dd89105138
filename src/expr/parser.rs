//! Recursive-descent parser for assignment expressions.
//!
//! ```text
//! statement = identifier '=' expr EOF
//! expr      = term { ('+' | '-') term }
//! term      = unary { ('*' | '/') unary }
//! unary     = ('-' | '+') unary | power
//! power     = primary [ '**' unary ]
//! primary   = number | identifier [ call | index ] | '(' expr ')'
//! call      = '(' expr { ',' expr } ')'
//! index     = '[' number ']'
//! ```

use super::ast::{BinOp, Expr, Func, Statement};
use super::lexer::{Lexer, Token, TokenKind};
use crate::error::{MdoError, Result};

/// Parser over a pre-tokenized expression.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    source: String,
}

impl Parser {
    /// Tokenize `source` and prepare to parse it.
    pub fn new(source: &str) -> Result<Self> {
        Ok(Self {
            tokens: Lexer::new(source).tokenize()?,
            pos: 0,
            source: source.to_string(),
        })
    }

    /// Parse a full `target = expr` statement.
    pub fn parse_statement(&mut self) -> Result<Statement> {
        let target = self.expect(TokenKind::Identifier)?.text;
        self.expect(TokenKind::Equals)?;
        let expr = self.parse_expr()?;
        self.expect(TokenKind::Eof)?;
        Ok(Statement {
            target,
            expr,
            source: self.source.clone(),
        })
    }

    /// Parse a bare expression.
    pub fn parse_expression(&mut self) -> Result<Expr> {
        let expr = self.parse_expr()?;
        self.expect(TokenKind::Eof)?;
        Ok(expr)
    }

    fn current(&self) -> &Token {
        // tokenize() always ends with Eof, and Eof is never consumed
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let tok = self.current();
            Err(MdoError::parse(
                tok.column,
                format!("expected {:?}, got {:?} '{}'", kind, tok.kind, tok.text),
            ))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.current().kind {
            TokenKind::Minus => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            TokenKind::Plus => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;
        if self.check(TokenKind::Power) {
            self.advance();
            // Right-associative, binds tighter than unary minus on the left
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary {
                op: BinOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Number => tok
                .text
                .parse::<f64>()
                .map(Expr::Number)
                .map_err(|_| MdoError::parse(tok.column, format!("invalid number '{}'", tok.text))),
            TokenKind::OpenParen => {
                let inner = self.parse_expr()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(inner)
            }
            TokenKind::Identifier => {
                if self.check(TokenKind::OpenParen) {
                    return self.parse_call(&tok);
                }
                if self.check(TokenKind::OpenBracket) {
                    self.advance();
                    let index_tok = self.expect(TokenKind::Number)?;
                    let index = index_tok.text.parse::<usize>().map_err(|_| {
                        MdoError::parse(
                            index_tok.column,
                            format!("index must be a non-negative integer, got '{}'", index_tok.text),
                        )
                    })?;
                    self.expect(TokenKind::CloseBracket)?;
                    return Ok(Expr::Index(tok.text, index));
                }
                Ok(match tok.text.as_str() {
                    "pi" => Expr::Number(std::f64::consts::PI),
                    "e" => Expr::Number(std::f64::consts::E),
                    _ => Expr::Var(tok.text),
                })
            }
            _ => Err(MdoError::parse(
                tok.column,
                format!("unexpected {:?} '{}'", tok.kind, tok.text),
            )),
        }
    }

    fn parse_call(&mut self, name: &Token) -> Result<Expr> {
        let func = Func::from_name(&name.text).ok_or_else(|| MdoError::ExprError {
            expr: self.source.clone(),
            message: format!("unknown function '{}'", name.text),
        })?;
        self.expect(TokenKind::OpenParen)?;

        let mut args = vec![self.parse_expr()?];
        while self.check(TokenKind::Comma) {
            self.advance();
            args.push(self.parse_expr()?);
        }
        self.expect(TokenKind::CloseParen)?;

        if args.len() != func.arity() {
            return Err(MdoError::ExprError {
                expr: self.source.clone(),
                message: format!(
                    "'{}' takes {} argument(s), got {}",
                    name.text,
                    func.arity(),
                    args.len()
                ),
            });
        }
        Ok(Expr::Call { func, args })
    }
}

/// Parse a single `target = expr` statement.
pub fn parse_statement(source: &str) -> Result<Statement> {
    Parser::new(source)?.parse_statement()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    fn eval(source: &str, vars: &[(&str, Vec<f64>)]) -> Vec<f64> {
        let expr = Parser::new(source).unwrap().parse_expression().unwrap();
        let scope: HashMap<String, Vec<f64>> =
            vars.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        expr.eval(&scope).unwrap()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3", &[]), vec![7.0]);
        assert_eq!(eval("(1 + 2) * 3", &[]), vec![9.0]);
        assert_eq!(eval("-2**2", &[]), vec![-4.0]);
        assert_eq!(eval("2**3**2", &[]), vec![512.0]);
        assert_eq!(eval("2**-1", &[]), vec![0.5]);
        assert_eq!(eval("8 / 4 / 2", &[]), vec![1.0]);
    }

    #[test]
    fn test_sellar_objective() {
        let stmt = parse_statement("obj = x**2 + z[1] + y1 + exp(-y2)").unwrap();
        assert_eq!(stmt.target, "obj");

        let mut vars = Vec::new();
        stmt.expr.variables(&mut vars);
        assert_eq!(vars, vec!["x", "z", "y1", "y2"]);

        let scope: HashMap<String, Vec<f64>> = [
            ("x".to_string(), vec![1.0]),
            ("z".to_string(), vec![5.0, 2.0]),
            ("y1".to_string(), vec![25.58830237]),
            ("y2".to_string(), vec![12.05848815]),
        ]
        .into_iter()
        .collect();
        let obj = stmt.expr.eval(&scope).unwrap();
        assert_relative_eq!(obj[0], 28.58830817, epsilon = 1e-6);
    }

    #[test]
    fn test_constants_and_functions() {
        assert_relative_eq!(eval("cos(pi)", &[])[0], -1.0);
        assert_relative_eq!(eval("log(e)", &[])[0], 1.0);
        assert_relative_eq!(eval("arctan2(1, 1)", &[])[0], std::f64::consts::FRAC_PI_4);
        assert_eq!(eval("sum(z * 2)", &[("z", vec![1.0, 2.0])]), vec![6.0]);
    }

    #[test]
    fn test_unknown_function() {
        let err = parse_statement("y = foo(x)").unwrap_err();
        assert!(matches!(err, MdoError::ExprError { .. }));
    }

    #[test]
    fn test_wrong_arity() {
        let err = parse_statement("y = arctan2(x)").unwrap_err();
        assert!(err.to_string().contains("takes 2"));
    }

    #[test]
    fn test_parse_errors_carry_column() {
        let err = parse_statement("y = (x + 1").unwrap_err();
        assert!(matches!(err, MdoError::ParseError { column: 11, .. }));

        let err = parse_statement("= x").unwrap_err();
        assert!(matches!(err, MdoError::ParseError { column: 1, .. }));
    }
}
