//! Gap filling for columns with missing values

use crate::{MathError, Result};

/// Replace each gap with the next observed value below it.
pub fn backward_fill(values: &mut [Option<f64>]) {
    let mut next = None;
    for value in values.iter_mut().rev() {
        match value {
            Some(v) => next = Some(*v),
            None => *value = next,
        }
    }
}

/// Replace each gap with the last observed value above it.
pub fn forward_fill(values: &mut [Option<f64>]) {
    let mut last = None;
    for value in values.iter_mut() {
        match value {
            Some(v) => last = Some(*v),
            None => *value = last,
        }
    }
}

/// Back-fill then forward-fill a column, returning dense values.
///
/// Fails only when the column holds no observation at all.
pub fn fill_gaps(values: &[Option<f64>]) -> Result<Vec<f64>> {
    let mut filled = values.to_vec();
    backward_fill(&mut filled);
    forward_fill(&mut filled);

    filled
        .into_iter()
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(|| MathError::InsufficientData("Column has no observed values".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backward_then_forward() {
        let values = [None, Some(2.0), None, Some(4.0), None];
        assert_eq!(fill_gaps(&values).unwrap(), vec![2.0, 2.0, 4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_fill_empty_column_fails() {
        assert!(fill_gaps(&[None, None]).is_err());
    }

    #[test]
    fn test_fill_dense_column_is_identity() {
        let values = [Some(1.0), Some(2.0)];
        assert_eq!(fill_gaps(&values).unwrap(), vec![1.0, 2.0]);
    }
}
