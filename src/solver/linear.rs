//! Dense linear solves for Newton steps.

use crate::error::{MdoError, Result};

/// Pivots below this fraction of the largest matrix entry are treated as zero.
const PIVOT_TOLERANCE: f64 = 1e-15;

/// Dense square system `A x = b` with an LU factorization.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    /// System matrix A (row-major)
    pub a: Vec<f64>,
    /// Matrix dimension
    pub size: usize,
    /// LU decomposition of A
    lu: Vec<f64>,
    /// Pivot indices for LU decomposition
    pivots: Vec<usize>,
}

impl DenseMatrix {
    /// Create a zero matrix of the given dimension.
    pub fn new(size: usize) -> Self {
        Self {
            a: vec![0.0; size * size],
            size,
            lu: vec![0.0; size * size],
            pivots: vec![0; size],
        }
    }

    pub fn clear(&mut self) {
        self.a.fill(0.0);
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.a[row * self.size + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] = value;
    }

    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] += value;
    }

    /// Perform LU decomposition with partial pivoting.
    pub fn factor(&mut self) -> Result<()> {
        let n = self.size;
        self.lu.copy_from_slice(&self.a);

        for i in 0..n {
            self.pivots[i] = i;
        }

        let scale = self.a.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let threshold = PIVOT_TOLERANCE * scale;

        for k in 0..n {
            // Find pivot
            let mut max_val = self.lu[k * n + k].abs();
            let mut max_row = k;

            for i in (k + 1)..n {
                let val = self.lu[i * n + k].abs();
                if val > max_val {
                    max_val = val;
                    max_row = i;
                }
            }

            if max_val <= threshold || !max_val.is_finite() {
                return Err(MdoError::SingularMatrix);
            }

            // Swap rows if needed
            if max_row != k {
                self.pivots.swap(k, max_row);
                for j in 0..n {
                    self.lu.swap(k * n + j, max_row * n + j);
                }
            }

            // Eliminate
            let pivot = self.lu[k * n + k];
            for i in (k + 1)..n {
                let factor = self.lu[i * n + k] / pivot;
                self.lu[i * n + k] = factor;
                for j in (k + 1)..n {
                    self.lu[i * n + j] -= factor * self.lu[k * n + j];
                }
            }
        }

        Ok(())
    }

    /// Solve with the factorization from [`DenseMatrix::factor`].
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.size;

        // Apply pivot permutation to b
        let mut x: Vec<f64> = (0..n).map(|i| b[self.pivots[i]]).collect();

        // Forward substitution (L * y = Pb)
        for i in 0..n {
            for j in 0..i {
                x[i] -= self.lu[i * n + j] * x[j];
            }
        }

        // Back substitution (U * x = y)
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                x[i] -= self.lu[i * n + j] * x[j];
            }
            x[i] /= self.lu[i * n + i];
        }

        x
    }
}
