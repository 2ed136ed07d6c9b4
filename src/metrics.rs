//! External clustering scores.
//!
//! Both scores compare a predicted labeling against a reference labeling and
//! are invariant to how the cluster ids are numbered.
//!
//! - [`accuracy`]: fraction of samples correctly labeled after the best
//!   one-to-one mapping of predicted clusters onto reference classes
//!   (Hungarian algorithm on the contingency table).
//! - [`nmi`]: normalized mutual information, `I(T; P) / ((H(T) + H(P)) / 2)`.

use crate::error::{Error, Result};
use pathfinding::prelude::{kuhn_munkres, Matrix};
use std::collections::HashMap;

/// Contingency table between two labelings, with compacted class ids.
struct Contingency {
    counts: Vec<Vec<usize>>,
    n: usize,
}

impl Contingency {
    fn new(truth: &[usize], pred: &[usize]) -> Result<Self> {
        if truth.is_empty() {
            return Err(Error::EmptyInput);
        }
        if truth.len() != pred.len() {
            return Err(Error::DimensionMismatch {
                expected: truth.len(),
                found: pred.len(),
            });
        }

        let t = compact(truth);
        let p = compact(pred);
        let n_t = t.iter().max().map_or(0, |&x| x + 1);
        let n_p = p.iter().max().map_or(0, |&x| x + 1);
        let mut counts = vec![vec![0usize; n_p]; n_t];
        for (&a, &b) in t.iter().zip(p.iter()) {
            counts[a][b] += 1;
        }
        Ok(Self {
            counts,
            n: truth.len(),
        })
    }

    fn row_sums(&self) -> Vec<usize> {
        self.counts.iter().map(|r| r.iter().sum()).collect()
    }

    fn col_sums(&self) -> Vec<usize> {
        let cols = self.counts.first().map_or(0, Vec::len);
        (0..cols)
            .map(|c| self.counts.iter().map(|r| r[c]).sum())
            .collect()
    }
}

/// Map arbitrary label values onto `0..n_distinct` in order of first appearance.
fn compact(labels: &[usize]) -> Vec<usize> {
    let mut ids: HashMap<usize, usize> = HashMap::new();
    labels
        .iter()
        .map(|l| {
            let next = ids.len();
            *ids.entry(*l).or_insert(next)
        })
        .collect()
}

/// Clustering accuracy under the best one-to-one relabeling of `pred`.
pub fn accuracy(truth: &[usize], pred: &[usize]) -> Result<f64> {
    let table = Contingency::new(truth, pred)?;
    let counts = &table.counts;
    let size = counts.len().max(counts.first().map_or(0, Vec::len));

    // Square, zero-padded weights so every predicted cluster can be matched.
    let weights = Matrix::from_rows((0..size).map(|r| {
        (0..size)
            .map(move |c| {
                counts
                    .get(r)
                    .and_then(|row| row.get(c))
                    .map_or(0i64, |&x| x as i64)
            })
            .collect::<Vec<i64>>()
    }))
    .map_err(|e| Error::Other(format!("contingency matrix: {e:?}")))?;

    let (matched, _) = kuhn_munkres(&weights);
    Ok(matched as f64 / table.n as f64)
}

/// Normalized mutual information (arithmetic-mean normalization).
///
/// Returns 1.0 when both labelings consist of a single cluster.
pub fn nmi(truth: &[usize], pred: &[usize]) -> Result<f64> {
    let table = Contingency::new(truth, pred)?;
    let n = table.n as f64;
    let rows = table.row_sums();
    let cols = table.col_sums();

    let entropy = |sums: &[usize]| -> f64 {
        sums.iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let p = c as f64 / n;
                -p * p.ln()
            })
            .sum()
    };
    let h_t = entropy(&rows);
    let h_p = entropy(&cols);

    let mut mi = 0.0;
    for (i, row) in table.counts.iter().enumerate() {
        for (j, &c) in row.iter().enumerate() {
            if c == 0 {
                continue;
            }
            let pij = c as f64 / n;
            mi += pij * (c as f64 * n / (rows[i] as f64 * cols[j] as f64)).ln();
        }
    }

    let denom = 0.5 * (h_t + h_p);
    if denom <= f64::EPSILON {
        // Both labelings are a single cluster; they agree perfectly.
        return Ok(1.0);
    }
    Ok((mi / denom).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_permutation_invariant() {
        let truth = vec![0, 0, 1, 1, 2, 2];
        let pred = vec![7, 7, 3, 3, 0, 0];
        assert_eq!(accuracy(&truth, &pred).unwrap(), 1.0);
    }

    #[test]
    fn test_accuracy_partial() {
        let truth = vec![0, 0, 0, 1, 1, 1];
        let pred = vec![1, 1, 0, 0, 0, 0];
        assert!((accuracy(&truth, &pred).unwrap() - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_accuracy_more_predicted_clusters() {
        let truth = vec![0, 0, 1, 1];
        let pred = vec![0, 1, 2, 2];
        assert!((accuracy(&truth, &pred).unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_nmi_bounds() {
        let truth = vec![0, 0, 1, 1, 2, 2];
        assert!((nmi(&truth, &[5, 5, 4, 4, 9, 9]).unwrap() - 1.0).abs() < 1e-12);

        let independent = nmi(&[0, 0, 1, 1], &[0, 1, 0, 1]).unwrap();
        assert!(independent.abs() < 1e-12);

        assert_eq!(nmi(&[3, 3, 3], &[1, 1, 1]).unwrap(), 1.0);
    }

    #[test]
    fn test_metrics_reject_mismatched_lengths() {
        assert!(accuracy(&[0, 1], &[0]).is_err());
        assert!(nmi(&[], &[]).is_err());
    }
}
