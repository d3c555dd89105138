//! Abstract syntax tree and evaluation for assignment expressions.
//!
//! Values are vectors; a length-1 operand broadcasts against any length.

use std::collections::HashMap;

use crate::error::{MdoError, Result};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Pow => a.powf(b),
        }
    }
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Exp,
    Log,
    Log10,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Arcsin,
    Arccos,
    Arctan,
    Tanh,
    Abs,
    /// Reduces a vector to a scalar
    Sum,
    /// Two-argument arctangent `arctan2(y, x)`
    Arctan2,
}

impl Func {
    /// Look up a function by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "exp" => Func::Exp,
            "log" => Func::Log,
            "log10" => Func::Log10,
            "sqrt" => Func::Sqrt,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "arcsin" => Func::Arcsin,
            "arccos" => Func::Arccos,
            "arctan" => Func::Arctan,
            "tanh" => Func::Tanh,
            "abs" => Func::Abs,
            "sum" => Func::Sum,
            "arctan2" => Func::Arctan2,
            _ => return None,
        })
    }

    /// Number of arguments the function takes.
    pub fn arity(self) -> usize {
        match self {
            Func::Arctan2 => 2,
            _ => 1,
        }
    }

    fn apply_unary(self, x: f64) -> f64 {
        match self {
            Func::Exp => x.exp(),
            Func::Log => x.ln(),
            Func::Log10 => x.log10(),
            Func::Sqrt => x.sqrt(),
            Func::Sin => x.sin(),
            Func::Cos => x.cos(),
            Func::Tan => x.tan(),
            Func::Arcsin => x.asin(),
            Func::Arccos => x.acos(),
            Func::Arctan => x.atan(),
            Func::Tanh => x.tanh(),
            Func::Abs => x.abs(),
            Func::Sum | Func::Arctan2 => x,
        }
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Var(String),
    /// Single element of a vector variable
    Index(String, usize),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
}

/// Source of variable values during evaluation.
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<&[f64]>;
}

impl Scope for HashMap<String, Vec<f64>> {
    fn lookup(&self, name: &str) -> Option<&[f64]> {
        self.get(name).map(Vec::as_slice)
    }
}

fn broadcast_len(a: usize, b: usize) -> Option<usize> {
    match (a, b) {
        (a, b) if a == b => Some(a),
        (1, b) => Some(b),
        (a, 1) => Some(a),
        _ => None,
    }
}

fn zip_broadcast(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    let n = a.len().max(b.len());
    (0..n)
        .map(|i| {
            let x = if a.len() == 1 { a[0] } else { a[i] };
            let y = if b.len() == 1 { b[0] } else { b[i] };
            f(x, y)
        })
        .collect()
}

impl Expr {
    /// Collect variable names in first-appearance order, without duplicates.
    pub fn variables(&self, out: &mut Vec<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Var(name) | Expr::Index(name, _) => {
                if !out.iter().any(|n| n == name) {
                    out.push(name.clone());
                }
            }
            Expr::Neg(inner) => inner.variables(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.variables(out);
                rhs.variables(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.variables(out);
                }
            }
        }
    }

    /// Infer the result length given variable lengths.
    pub fn shape(&self, shapes: &HashMap<String, usize>) -> std::result::Result<usize, String> {
        match self {
            Expr::Number(_) => Ok(1),
            Expr::Var(name) => shapes
                .get(name)
                .copied()
                .ok_or_else(|| format!("unknown variable '{}'", name)),
            Expr::Index(name, index) => {
                let len = shapes
                    .get(name)
                    .copied()
                    .ok_or_else(|| format!("unknown variable '{}'", name))?;
                if *index >= len {
                    return Err(format!("index {} out of range for '{}' (length {})", index, name, len));
                }
                Ok(1)
            }
            Expr::Neg(inner) => inner.shape(shapes),
            Expr::Binary { lhs, rhs, .. } => {
                let (a, b) = (lhs.shape(shapes)?, rhs.shape(shapes)?);
                broadcast_len(a, b).ok_or_else(|| format!("cannot broadcast lengths {} and {}", a, b))
            }
            Expr::Call { func, args } => {
                let lens = args
                    .iter()
                    .map(|a| a.shape(shapes))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                match func {
                    Func::Sum => Ok(1),
                    Func::Arctan2 => broadcast_len(lens[0], lens[1])
                        .ok_or_else(|| format!("cannot broadcast lengths {} and {}", lens[0], lens[1])),
                    _ => Ok(lens[0]),
                }
            }
        }
    }

    /// Evaluate against a scope.
    pub fn eval(&self, scope: &dyn Scope) -> Result<Vec<f64>> {
        match self {
            Expr::Number(v) => Ok(vec![*v]),
            Expr::Var(name) => scope
                .lookup(name)
                .map(<[f64]>::to_vec)
                .ok_or_else(|| MdoError::UnknownVariable { path: name.clone() }),
            Expr::Index(name, index) => {
                let value = scope
                    .lookup(name)
                    .ok_or_else(|| MdoError::UnknownVariable { path: name.clone() })?;
                value
                    .get(*index)
                    .map(|v| vec![*v])
                    .ok_or_else(|| MdoError::IndexOutOfRange {
                        path: name.clone(),
                        index: *index,
                        len: value.len(),
                    })
            }
            Expr::Neg(inner) => Ok(inner.eval(scope)?.into_iter().map(|v| -v).collect()),
            Expr::Binary { op, lhs, rhs } => {
                let a = lhs.eval(scope)?;
                let b = rhs.eval(scope)?;
                if broadcast_len(a.len(), b.len()).is_none() {
                    return Err(MdoError::ExprError {
                        expr: format!("{:?}", self),
                        message: format!("cannot broadcast lengths {} and {}", a.len(), b.len()),
                    });
                }
                Ok(zip_broadcast(&a, &b, |x, y| op.apply(x, y)))
            }
            Expr::Call { func, args } => {
                let values = args
                    .iter()
                    .map(|a| a.eval(scope))
                    .collect::<Result<Vec<_>>>()?;
                Ok(match func {
                    Func::Sum => vec![values[0].iter().sum()],
                    Func::Arctan2 => zip_broadcast(&values[0], &values[1], f64::atan2),
                    f => values[0].iter().map(|&x| f.apply_unary(x)).collect(),
                })
            }
        }
    }
}

/// A parsed `target = expr` line.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub target: String,
    pub expr: Expr,
    /// Original text, for error messages
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(pairs: &[(&str, Vec<f64>)]) -> HashMap<String, Vec<f64>> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_broadcast_scalar_against_vector() {
        let e = Expr::Binary {
            op: BinOp::Mul,
            lhs: Box::new(Expr::Number(2.0)),
            rhs: Box::new(Expr::Var("z".into())),
        };
        let s = scope(&[("z", vec![1.0, 2.0, 3.0])]);
        assert_eq!(e.eval(&s).unwrap(), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_sum_reduces_to_scalar() {
        let e = Expr::Call {
            func: Func::Sum,
            args: vec![Expr::Var("z".into())],
        };
        let s = scope(&[("z", vec![1.0, 2.0, 3.0])]);
        assert_eq!(e.eval(&s).unwrap(), vec![6.0]);

        let shapes: HashMap<String, usize> = [("z".to_string(), 3)].into_iter().collect();
        assert_eq!(e.shape(&shapes), Ok(1));
    }

    #[test]
    fn test_shape_rejects_incompatible_lengths() {
        let e = Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expr::Var("a".into())),
            rhs: Box::new(Expr::Var("b".into())),
        };
        let shapes: HashMap<String, usize> =
            [("a".to_string(), 2), ("b".to_string(), 3)].into_iter().collect();
        assert!(e.shape(&shapes).is_err());
    }
}
