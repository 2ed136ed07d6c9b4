//! Consensus clustering: fusing many base clusterings into one.
//!
//! ## Hypergraph
//!
//! Each base clustering (one *run*) contributes one hyperedge per distinct
//! label: the set of samples that run put in that cluster. Stacking the one-hot
//! blocks of all `N` runs side by side gives the `M x K` incidence matrix `H`
//! (`K` = total number of distinct labels summed over runs). Without noise,
//! every row of `H` has exactly `N` ones.
//!
//! ## HBGF (Fern & Brodley, 2004)
//!
//! The Hybrid Bipartite Graph Formulation treats cluster instances and samples
//! as two kinds of vertices:
//!
//! ```text
//!         K        M
//!     ┌────────┬────────┐
//!   K │   0    │   Hᵗ   │
//!     ├────────┼────────┤
//!   M │   H    │   0    │
//!     └────────┴────────┘
//! ```
//!
//! Partitioning this bipartite graph clusters votes and samples jointly:
//! samples that share many cluster instances end up in the same part. The
//! consensus labels are the parts of the last `M` vertices.
//!
//! ## References
//!
//! Fern & Brodley (2004). "Solving Cluster Ensemble Problems by Bipartite Graph
//! Partitioning." ICML.

use crate::cluster::NOISE;
use crate::error::{Error, Result};
use crate::partition::{GraphPartitioner, RecursiveBisection};
use log::debug;
use sprs::{CsMat, TriMat};

/// The `N x M` label matrix of an ensemble: one label vector per run.
///
/// A label equal to [`NOISE`] marks a sample the run left unassigned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseClusterings {
    runs: Vec<Vec<usize>>,
    n_samples: usize,
}

impl BaseClusterings {
    /// Wrap `runs`; all runs must label the same, non-zero number of samples.
    pub fn new(runs: Vec<Vec<usize>>) -> Result<Self> {
        let n_samples = runs.first().ok_or(Error::EmptyInput)?.len();
        if n_samples == 0 {
            return Err(Error::EmptyInput);
        }
        if let Some(bad) = runs.iter().find(|r| r.len() != n_samples) {
            return Err(Error::DimensionMismatch {
                expected: n_samples,
                found: bad.len(),
            });
        }
        Ok(Self { runs, n_samples })
    }

    /// Number of runs (`N`).
    pub fn n_runs(&self) -> usize {
        self.runs.len()
    }

    /// Number of samples (`M`).
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// The label vectors, in run order.
    pub fn runs(&self) -> &[Vec<usize>] {
        &self.runs
    }

    /// Number of distinct (non-noise) labels over the union of all runs.
    pub fn n_distinct_labels(&self) -> usize {
        let mut all: Vec<usize> = self
            .runs
            .iter()
            .flatten()
            .copied()
            .filter(|&l| l != NOISE)
            .collect();
        all.sort_unstable();
        all.dedup();
        all.len()
    }
}

/// Sample-by-cluster-instance incidence matrix `H` of an ensemble.
#[derive(Clone, Debug)]
pub struct Hypergraph {
    incidence: CsMat<f32>,
    run_offsets: Vec<usize>,
}

impl Hypergraph {
    /// Build `H` from the base clusterings.
    ///
    /// Within a run, distinct labels get consecutive columns in ascending label
    /// order; runs are laid out left to right. Identical runs are not merged.
    pub fn from_base_clusterings(base: &BaseClusterings) -> Result<Self> {
        let m = base.n_samples();
        let mut run_offsets = Vec::with_capacity(base.n_runs() + 1);
        let mut triplets: Vec<(usize, usize)> = Vec::with_capacity(m * base.n_runs());
        let mut offset = 0;

        for run in base.runs() {
            run_offsets.push(offset);
            let mut distinct: Vec<usize> = run.iter().copied().filter(|&l| l != NOISE).collect();
            distinct.sort_unstable();
            distinct.dedup();

            for (sample, &label) in run.iter().enumerate() {
                if label == NOISE {
                    continue;
                }
                let local = distinct
                    .binary_search(&label)
                    .map_err(|_| Error::Other(format!("label {label} missing from its own run")))?;
                triplets.push((sample, offset + local));
            }
            offset += distinct.len();
        }
        run_offsets.push(offset);

        if offset == 0 {
            return Err(Error::Other(
                "every base clustering labels all samples as noise".to_string(),
            ));
        }

        let mut tri = TriMat::with_capacity((m, offset), triplets.len());
        for (sample, col) in triplets {
            tri.add_triplet(sample, col, 1.0f32);
        }
        let incidence: CsMat<f32> = tri.to_csr();

        debug!(
            "hypergraph: {} samples, {} runs, {} hyperedges",
            m,
            base.n_runs(),
            offset
        );
        Ok(Self {
            incidence,
            run_offsets,
        })
    }

    /// The `M x K` incidence matrix (CSR).
    pub fn incidence(&self) -> &CsMat<f32> {
        &self.incidence
    }

    /// Number of samples (`M`).
    pub fn n_samples(&self) -> usize {
        self.incidence.rows()
    }

    /// Number of hyperedges / cluster instances (`K`).
    pub fn n_hyperedges(&self) -> usize {
        self.incidence.cols()
    }

    /// Number of runs the hypergraph was built from.
    pub fn n_runs(&self) -> usize {
        self.run_offsets.len() - 1
    }

    /// First column of each run, plus a final entry equal to `K`.
    pub fn run_offsets(&self) -> &[usize] {
        &self.run_offsets
    }

    /// Symmetric `(K + M) x (K + M)` bipartite adjacency `[[0, Hᵗ], [H, 0]]`.
    ///
    /// Nodes `0..K` are cluster instances, nodes `K..K+M` are samples.
    pub fn bipartite_adjacency(&self) -> CsMat<f32> {
        let k = self.n_hyperedges();
        let n = k + self.n_samples();
        let mut tri = TriMat::with_capacity((n, n), 2 * self.incidence.nnz());
        for (sample, row) in self.incidence.outer_iterator().enumerate() {
            for (col, &w) in row.iter() {
                tri.add_triplet(col, k + sample, w);
                tri.add_triplet(k + sample, col, w);
            }
        }
        tri.to_csr()
    }
}

/// Strategy that turns an ensemble into one clustering.
pub trait ConsensusFunction {
    /// Fuse `base` into one label per sample.
    ///
    /// `n_clusters` is the requested number of consensus clusters; `None` lets
    /// the implementation derive it from the ensemble.
    fn consensus(&self, base: &BaseClusterings, n_clusters: Option<usize>) -> Result<Vec<usize>>;
}

/// Hybrid Bipartite Graph Formulation consensus.
#[derive(Clone, Debug, Default)]
pub struct Hbgf<P = RecursiveBisection> {
    partitioner: P,
}

impl Hbgf {
    /// HBGF with the default multilevel partitioner.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: GraphPartitioner> Hbgf<P> {
    /// HBGF with a custom graph partitioner.
    pub fn with_partitioner(partitioner: P) -> Self {
        Self { partitioner }
    }

    /// Partition the bipartite graph of `hypergraph` and keep the sample parts.
    pub fn consensus_from_hypergraph(
        &self,
        hypergraph: &Hypergraph,
        n_parts: usize,
    ) -> Result<Vec<usize>> {
        let adjacency = hypergraph.bipartite_adjacency();
        let membership = self.partitioner.partition(n_parts, &adjacency)?;
        if membership.len() != adjacency.rows() {
            return Err(Error::DimensionMismatch {
                expected: adjacency.rows(),
                found: membership.len(),
            });
        }
        if let Some(&part) = membership.iter().find(|&&p| p >= n_parts) {
            return Err(Error::Other(format!(
                "partitioner assigned part {part}, but only {n_parts} parts were requested"
            )));
        }
        Ok(membership[hypergraph.n_hyperedges()..].to_vec())
    }
}

impl<P: GraphPartitioner> ConsensusFunction for Hbgf<P> {
    fn consensus(&self, base: &BaseClusterings, n_clusters: Option<usize>) -> Result<Vec<usize>> {
        // Default target: distinct labels over the union of all runs, as observed.
        let n_parts = n_clusters.unwrap_or_else(|| base.n_distinct_labels());
        let hypergraph = Hypergraph::from_base_clusterings(base)?;
        self.consensus_from_hypergraph(&hypergraph, n_parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::accuracy;

    fn runs(r: Vec<Vec<usize>>) -> BaseClusterings {
        BaseClusterings::new(r).unwrap()
    }

    #[test]
    fn test_hypergraph_layout() {
        let base = runs(vec![vec![0, 0, 1, 1], vec![5, 2, 2, 5], vec![0, 0, 0, 0]]);
        let h = Hypergraph::from_base_clusterings(&base).unwrap();

        assert_eq!(h.n_samples(), 4);
        assert_eq!(h.n_hyperedges(), 5);
        assert_eq!(h.run_offsets(), &[0, 2, 4, 5]);

        let inc = h.incidence();
        // Run 1: label 2 -> column 2, label 5 -> column 3.
        assert_eq!(inc.get(1, 2), Some(&1.0));
        assert_eq!(inc.get(0, 3), Some(&1.0));
        assert_eq!(inc.get(0, 2), None);
        assert_eq!(inc.get(3, 4), Some(&1.0));
    }

    #[test]
    fn test_hypergraph_row_and_column_sums() {
        let base = runs(vec![vec![0, 1, 2, 0, 1], vec![1, 1, 0, 0, 0], vec![3, 3, 3, 4, 4]]);
        let h = Hypergraph::from_base_clusterings(&base).unwrap();
        for row in h.incidence().outer_iterator() {
            assert_eq!(row.iter().map(|(_, &w)| w).sum::<f32>(), 3.0);
        }

        let mut col_sums = vec![0.0f32; h.n_hyperedges()];
        for row in h.incidence().outer_iterator() {
            for (c, &w) in row.iter() {
                col_sums[c] += w;
            }
        }
        assert_eq!(col_sums, vec![2.0, 2.0, 1.0, 3.0, 2.0, 3.0, 2.0]);
    }

    #[test]
    fn test_identical_runs_keep_every_vote() {
        let run = vec![0, 0, 1, 1, 2, 2];
        let base = runs(vec![run.clone(); 4]);
        let h = Hypergraph::from_base_clusterings(&base).unwrap();
        assert_eq!(h.n_hyperedges(), 4 * 3);
    }

    #[test]
    fn test_noise_is_skipped() {
        let base = runs(vec![vec![0, NOISE, 1], vec![0, 0, 1]]);
        let h = Hypergraph::from_base_clusterings(&base).unwrap();
        assert_eq!(h.n_hyperedges(), 4);
        let sums: Vec<f32> = h
            .incidence()
            .outer_iterator()
            .map(|r| r.iter().map(|(_, &w)| w).sum())
            .collect();
        assert_eq!(sums, vec![2.0, 1.0, 2.0]);
        assert_eq!(base.n_distinct_labels(), 2);

        let all_noise = runs(vec![vec![NOISE, NOISE]]);
        assert!(Hypergraph::from_base_clusterings(&all_noise).is_err());
    }

    #[test]
    fn test_bipartite_adjacency_blocks() {
        let base = runs(vec![vec![0, 1, 1]]);
        let h = Hypergraph::from_base_clusterings(&base).unwrap();
        let w = h.bipartite_adjacency();
        assert_eq!(w.shape(), (5, 5));
        // cluster-instance 0 <-> sample 0 (node 2)
        assert_eq!(w.get(0, 2), Some(&1.0));
        assert_eq!(w.get(2, 0), Some(&1.0));
        // no edges inside either block
        assert_eq!(w.get(0, 1), None);
        assert_eq!(w.get(2, 3), None);
        assert_eq!(w.nnz(), 6);
    }

    #[test]
    fn test_hbgf_recovers_identical_partition() {
        let truth: Vec<usize> = (0..12).map(|i| i / 4).collect();
        // Same partition under different label permutations.
        let permuted: Vec<Vec<usize>> = [[0, 1, 2], [2, 0, 1], [1, 2, 0], [2, 1, 0]]
            .iter()
            .map(|perm| truth.iter().map(|&t| perm[t]).collect())
            .collect();
        let base = runs(permuted);

        let labels = Hbgf::new().consensus(&base, Some(3)).unwrap();
        assert_eq!(labels.len(), 12);
        assert!(labels.iter().all(|&l| l < 3));
        assert_eq!(accuracy(&truth, &labels).unwrap(), 1.0);
    }

    #[test]
    fn test_hbgf_majority_wins() {
        let truth: Vec<usize> = (0..10).map(|i| i / 5).collect();
        let mut dissent = truth.clone();
        dissent.swap(0, 9);
        let base = runs(vec![truth.clone(), truth.clone(), truth.clone(), dissent]);

        let labels = Hbgf::new().consensus(&base, Some(2)).unwrap();
        assert_eq!(accuracy(&truth, &labels).unwrap(), 1.0);
    }

    #[test]
    fn test_hbgf_default_part_count_uses_label_union() {
        // Union of labels is {0, 1, 2, 3}: four parts even though each run has two.
        let base = runs(vec![vec![0, 0, 1, 1, 0, 1, 0, 1], vec![2, 2, 3, 3, 2, 3, 2, 3]]);
        let labels = Hbgf::new().consensus(&base, None).unwrap();
        let mut used = labels.clone();
        used.sort_unstable();
        used.dedup();
        assert!(used.iter().all(|&l| l < 4));
        assert_eq!(labels.len(), 8);
    }

    #[test]
    fn test_hbgf_too_many_parts_fails() {
        let base = runs(vec![vec![0, 1], vec![0, 1]]);
        assert!(Hbgf::new().consensus(&base, Some(10)).is_err());
    }

    #[test]
    fn test_base_clusterings_validation() {
        assert!(matches!(BaseClusterings::new(vec![]), Err(Error::EmptyInput)));
        assert!(matches!(BaseClusterings::new(vec![vec![]]), Err(Error::EmptyInput)));
        assert!(matches!(
            BaseClusterings::new(vec![vec![0, 1], vec![0]]),
            Err(Error::DimensionMismatch { expected: 2, found: 1 })
        ));
    }

    /// Partitioner returning a fixed membership vector, whatever the graph.
    struct Fixed(Vec<usize>);

    impl GraphPartitioner for Fixed {
        fn partition(&self, _n_parts: usize, _adjacency: &CsMat<f32>) -> Result<Vec<usize>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_hbgf_rejects_short_membership() {
        // 4 samples and 4 hyperedges: the bipartite graph has 8 nodes.
        let base = runs(vec![vec![0, 0, 1, 1], vec![0, 1, 0, 1]]);
        let err = Hbgf::with_partitioner(Fixed(vec![0; 2]))
            .consensus(&base, Some(2))
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 8, found: 2 }));
    }

    #[test]
    fn test_hbgf_rejects_out_of_range_part() {
        let base = runs(vec![vec![0, 0, 1, 1], vec![0, 1, 0, 1]]);
        let mut membership = vec![0, 1, 0, 1, 0, 0, 1, 1];
        membership[6] = 5;
        assert!(Hbgf::with_partitioner(Fixed(membership))
            .consensus(&base, Some(2))
            .is_err());

        let valid = vec![0, 1, 0, 1, 0, 0, 1, 1];
        assert_eq!(
            Hbgf::with_partitioner(Fixed(valid))
                .consensus(&base, Some(2))
                .unwrap(),
            vec![0, 0, 1, 1]
        );
    }
}
