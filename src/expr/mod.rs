//! Expression language for [`ExecComp`](crate::components::ExecComp).
//!
//! Each statement assigns one output from an arithmetic expression over
//! inputs:
//!
//! ```text
//! obj  = x**2 + z[1] + y1 + exp(-y2)
//! con1 = 3.16 - y1
//! ```
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `+ - * /` | elementwise arithmetic |
//! | `**` | power (right-associative) |
//! | `name[i]` | element `i` of a vector |
//! | `exp log log10 sqrt sin cos tan arcsin arccos arctan tanh abs` | elementwise functions |
//! | `sum(v)` | sum of all elements |
//! | `arctan2(y, x)` | two-argument arctangent |
//! | `pi`, `e` | constants |
//!
//! Every value is a vector; scalars broadcast.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{BinOp, Expr, Func, Scope, Statement};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{parse_statement, Parser};
