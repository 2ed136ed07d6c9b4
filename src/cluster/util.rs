use crate::error::{Error, Result};

#[inline]
pub(crate) fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Check that `data` is a non-empty, rectangular, finite matrix; returns its dimension.
pub(crate) fn validate_dense(data: &[Vec<f32>]) -> Result<usize> {
    let first = data.first().ok_or(Error::EmptyInput)?;
    let d = first.len();
    if d == 0 {
        return Err(Error::InvalidParameter {
            name: "dimension",
            message: "must be at least 1",
        });
    }
    for (row, point) in data.iter().enumerate() {
        if point.len() != d {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: point.len(),
            });
        }
        if let Some(col) = point.iter().position(|x| !x.is_finite()) {
            return Err(Error::InvalidValue {
                row,
                col,
                message: "must be finite",
            });
        }
    }
    Ok(d)
}

/// Like [`validate_dense`], additionally rejecting negative entries.
pub(crate) fn validate_nonnegative(data: &[Vec<f32>]) -> Result<usize> {
    let d = validate_dense(data)?;
    for (row, point) in data.iter().enumerate() {
        if let Some(col) = point.iter().position(|&x| x < 0.0) {
            return Err(Error::InvalidValue {
                row,
                col,
                message: "must be nonnegative",
            });
        }
    }
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_dense_reports_offending_cell() {
        assert_eq!(validate_dense(&[vec![1.0, 2.0]]).unwrap(), 2);
        assert!(matches!(validate_dense(&[]), Err(Error::EmptyInput)));
        assert!(matches!(
            validate_dense(&[vec![1.0, 2.0], vec![1.0]]),
            Err(Error::DimensionMismatch { expected: 2, found: 1 })
        ));
        assert!(matches!(
            validate_dense(&[vec![1.0, 2.0], vec![0.0, f32::NAN]]),
            Err(Error::InvalidValue { row: 1, col: 1, .. })
        ));
    }

    #[test]
    fn test_validate_nonnegative() {
        assert!(validate_nonnegative(&[vec![0.0, 3.0]]).is_ok());
        assert!(matches!(
            validate_nonnegative(&[vec![0.0, 3.0], vec![-0.5, 1.0]]),
            Err(Error::InvalidValue { row: 1, col: 0, .. })
        ));
    }
}
