//! Dense linear algebra for small penalised least-squares problems
//!
//! The model fits at most a few dozen coefficients, so the normal
//! equations are assembled explicitly and solved with a Cholesky
//! factorisation.

use crate::{MathError, Result};

/// Solve `A x = b` for a symmetric positive-definite `A` stored row-major.
pub fn cholesky_solve(matrix: &[f64], n: usize, rhs: &[f64]) -> Result<Vec<f64>> {
    if matrix.len() != n * n || rhs.len() != n {
        return Err(MathError::InvalidInput(format!(
            "Expected a {n}x{n} system, got {} matrix entries and {} right-hand sides",
            matrix.len(),
            rhs.len()
        )));
    }

    // Lower-triangular factor, row-major
    let mut lower = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[i * n + j];
            for k in 0..j {
                sum -= lower[i * n + k] * lower[j * n + k];
            }

            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return Err(MathError::CalculationError(format!(
                        "Matrix is not positive definite (pivot {} = {})",
                        i, sum
                    )));
                }
                lower[i * n + i] = sum.sqrt();
            } else {
                lower[i * n + j] = sum / lower[j * n + j];
            }
        }
    }

    // Forward substitution: L z = b
    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut sum = rhs[i];
        for k in 0..i {
            sum -= lower[i * n + k] * z[k];
        }
        z[i] = sum / lower[i * n + i];
    }

    // Back substitution: L^T x = z
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= lower[k * n + i] * x[k];
        }
        x[i] = sum / lower[i * n + i];
    }

    Ok(x)
}

/// Minimise `precision * Σ (target_i - design_i · θ)² + Σ penalty_j θ_j²`.
///
/// `design` is row-major with one row per observation. Every penalty must be
/// non-negative; a strictly positive penalty on each coefficient keeps the
/// system well-posed even when columns are collinear.
pub fn ridge_solve(
    design: &[Vec<f64>],
    target: &[f64],
    penalties: &[f64],
    precision: f64,
) -> Result<Vec<f64>> {
    if design.len() != target.len() {
        return Err(MathError::InvalidInput(format!(
            "Design has {} rows but target has {} values",
            design.len(),
            target.len()
        )));
    }
    if design.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot solve a system without observations".to_string(),
        ));
    }

    let p = penalties.len();
    if design.iter().any(|row| row.len() != p) {
        return Err(MathError::InvalidInput(format!(
            "Every design row must have {} columns",
            p
        )));
    }
    if penalties.iter().any(|&l| l < 0.0 || !l.is_finite()) {
        return Err(MathError::InvalidInput(
            "Penalties must be finite and non-negative".to_string(),
        ));
    }

    let mut normal = vec![0.0; p * p];
    let mut rhs = vec![0.0; p];
    for (row, &r) in design.iter().zip(target) {
        for i in 0..p {
            if row[i] == 0.0 {
                continue;
            }
            rhs[i] += precision * row[i] * r;
            for j in 0..=i {
                normal[i * p + j] += precision * row[i] * row[j];
            }
        }
    }
    for i in 0..p {
        normal[i * p + i] += penalties[i];
        for j in 0..i {
            normal[j * p + i] = normal[i * p + j];
        }
    }

    match cholesky_solve(&normal, p, &rhs) {
        Ok(solution) => Ok(solution),
        Err(_) => {
            // Retry once with a small diagonal jitter scaled to the system
            let trace: f64 = (0..p).map(|i| normal[i * p + i]).sum();
            let jitter = 1e-10 * (trace / p.max(1) as f64).max(1.0);
            for i in 0..p {
                normal[i * p + i] += jitter;
            }
            cholesky_solve(&normal, p, &rhs)
        }
    }
}
