//! Sample-neighbourhood graph and preprocessing for GNMF.
//!
//! [`neighbor_graph`] connects every sample to its `p` nearest neighbours
//! (Euclidean distance on the raw data) with 0/1 weights, then symmetrizes:
//! `W[i][j] = 1` iff `j` is among the `p` nearest of `i` **or** vice versa.
//! The diagonal is always zero.
//!
//! The graph is built once per ensemble fit and borrowed read-only by every
//! factorization, so all base clusterings regularize against the same
//! neighbourhood structure.

use crate::cluster::util::{squared_euclidean, validate_dense};
use crate::error::{Error, Result};
use log::{debug, trace};
use sprs::{CsMat, TriMat};

/// Build the symmetric binary p-nearest-neighbour graph over the rows of `data`.
///
/// Ties in distance are broken by sample index. Returns an `M x M` CSR matrix.
pub fn neighbor_graph(data: &[Vec<f32>], p: usize) -> Result<CsMat<f32>> {
    validate_dense(data)?;
    let n = data.len();

    if p == 0 {
        return Err(Error::InvalidParameter {
            name: "p",
            message: "must be positive",
        });
    }
    if p >= n {
        return Err(Error::InvalidParameter {
            name: "p",
            message: "must be smaller than the number of samples",
        });
    }

    let mut edges: Vec<(usize, usize)> = Vec::with_capacity(2 * n * p);
    let mut dists: Vec<(f32, usize)> = Vec::with_capacity(n - 1);
    for i in 0..n {
        dists.clear();
        dists.extend(
            (0..n)
                .filter(|&j| j != i)
                .map(|j| (squared_euclidean(&data[i], &data[j]), j)),
        );
        dists.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        for &(_, j) in dists.iter().take(p) {
            edges.push((i, j));
            edges.push((j, i));
        }
    }
    trace!("collected {} directed p-NN edges", edges.len());

    // Mutual neighbours appear twice; keep a single unit entry.
    edges.sort_unstable();
    edges.dedup();

    let mut tri = TriMat::with_capacity((n, n), edges.len());
    for (i, j) in edges {
        tri.add_triplet(i, j, 1.0f32);
    }
    let graph: CsMat<f32> = tri.to_csr();
    debug!(
        "neighbor graph: {} nodes, {} undirected edges (p={})",
        n,
        graph.nnz() / 2,
        p
    );
    Ok(graph)
}

/// Scale every sample to unit L2 norm; all-zero samples are left as they are.
pub fn normalize_samples(data: &[Vec<f32>]) -> Vec<Vec<f32>> {
    data.iter()
        .map(|row| {
            let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > f32::EPSILON {
                row.iter().map(|x| x / norm).collect()
            } else {
                row.clone()
            }
        })
        .collect()
}

/// Weighted degree (row sum) of every node.
pub(crate) fn degrees(graph: &CsMat<f32>) -> Vec<f32> {
    graph
        .outer_iterator()
        .map(|row| row.iter().map(|(_, &w)| w).sum())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> Vec<Vec<f32>> {
        (0..6).map(|i| vec![i as f32, 0.0]).collect()
    }

    #[test]
    fn test_graph_is_symmetric_binary() {
        let g = neighbor_graph(&line(), 2).unwrap();
        assert_eq!(g.shape(), (6, 6));
        for (i, row) in g.outer_iterator().enumerate() {
            for (j, &w) in row.iter() {
                assert_ne!(i, j, "diagonal must be empty");
                assert_eq!(w, 1.0);
                assert_eq!(g.get(j, i), Some(&1.0));
            }
        }
    }

    #[test]
    fn test_graph_nearest_neighbours() {
        // On a line with p = 1 every node links to an adjacent node.
        let g = neighbor_graph(&line(), 1).unwrap();
        assert_eq!(g.get(0, 1), Some(&1.0));
        assert_eq!(g.get(5, 4), Some(&1.0));
        assert_eq!(g.get(0, 5), None);
        assert!(degrees(&g).iter().all(|&d| d >= 1.0));
    }

    #[test]
    fn test_graph_separate_groups_stay_disconnected() {
        let data = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![9.0, 9.0],
            vec![9.1, 9.0],
            vec![9.0, 9.1],
        ];
        let g = neighbor_graph(&data, 2).unwrap();
        for i in 0..3 {
            for j in 3..6 {
                assert_eq!(g.get(i, j), None);
            }
        }
    }

    #[test]
    fn test_graph_invalid_p() {
        assert!(neighbor_graph(&line(), 0).is_err());
        assert!(neighbor_graph(&line(), 6).is_err());
        assert!(neighbor_graph(&[], 1).is_err());
    }

    #[test]
    fn test_normalize_samples() {
        let out = normalize_samples(&[vec![3.0, 4.0], vec![0.0, 0.0]]);
        assert!((out[0][0] - 0.6).abs() < 1e-6);
        assert!((out[0][1] - 0.8).abs() < 1e-6);
        assert_eq!(out[1], vec![0.0, 0.0]);
    }
}
