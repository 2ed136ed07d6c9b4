//! EGNMF: ensemble of GNMF base clusterings fused by HBGF.
//!
//! # Pipeline
//!
//! ```text
//! data ──┬─► p-NN graph W ───────────────┐  (built once, shared read-only)
//!        └─► unit-norm samples X̂ ────────┤
//!                                        ▼
//!            for i in 0..N:  GNMF(seed = base + i) ─► V_i ─► k-means ─► labels_i
//!                                        │
//!                                        ▼  (join)
//!            N x M base clusterings ─► hypergraph H ─► HBGF ─► consensus labels
//! ```
//!
//! Diversity across ensemble members comes only from the random initialization
//! of each factorization; every member regularizes against the same graph.
//! Each member's seed is a pure function of the base seed and its index, so a
//! fixed `random_state` gives identical results whether the members run
//! sequentially or in parallel.

use crate::cluster::{Clustering, Kmeans, KmeansInit};
use crate::consensus::{BaseClusterings, ConsensusFunction, Hbgf};
use crate::error::{Error, Result};
use crate::gnmf::Gnmf;
use crate::graph::{neighbor_graph, normalize_samples};
use log::{debug, info};
use rand::prelude::*;
use rayon::prelude::*;
use sprs::CsMat;
use std::time::Instant;

/// EGNMF parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct EgnmfParams {
    /// Number of clusters, both per base clustering and in the consensus.
    pub n_clusters: usize,

    /// Graph regularization weight λ of each factorization.
    pub rterm: f64,

    /// Neighbour count of the p-NN graph.
    pub p: usize,

    /// Multiplicative-update iterations per factorization.
    pub max_iter: usize,

    /// Ensemble size `N`.
    pub n_estimators: usize,

    /// Base seed; member `i` uses `random_state + i`. `None` draws a random base seed.
    pub random_state: Option<u64>,

    /// Run ensemble members on the rayon thread pool.
    pub parallel: bool,
}

impl Default for EgnmfParams {
    fn default() -> Self {
        Self {
            n_clusters: 2,
            rterm: 100.0,
            p: 5,
            max_iter: 30,
            n_estimators: 30,
            random_state: None,
            parallel: false,
        }
    }
}

impl EgnmfParams {
    /// Default parameters with `n_clusters` clusters.
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Default::default()
        }
    }

    /// Set the regularization weight.
    pub fn with_rterm(mut self, rterm: f64) -> Self {
        self.rterm = rterm;
        self
    }

    /// Set the neighbour count.
    pub fn with_p(mut self, p: usize) -> Self {
        self.p = p;
        self
    }

    /// Set the factorization iteration budget.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the ensemble size.
    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    /// Set the base seed.
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Run members in parallel.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Check every parameter; the first violation is returned.
    pub fn validate(&self) -> Result<()> {
        if self.n_clusters <= 1 {
            return Err(Error::InvalidParameter {
                name: "n_clusters",
                message: "must be greater than 1",
            });
        }
        if !(self.rterm >= 0.0) {
            return Err(Error::InvalidParameter {
                name: "rterm",
                message: "must be non-negative",
            });
        }
        if self.p == 0 {
            return Err(Error::InvalidParameter {
                name: "p",
                message: "must be positive",
            });
        }
        if self.max_iter <= 1 {
            return Err(Error::InvalidParameter {
                name: "max_iter",
                message: "must be greater than 1",
            });
        }
        if self.n_estimators <= 1 {
            return Err(Error::InvalidParameter {
                name: "n_estimators",
                message: "must be greater than 1",
            });
        }
        Ok(())
    }
}

/// Ensemble GNMF clusterer.
///
/// ```rust
/// use egnmf::{Egnmf, EgnmfParams};
///
/// let data: Vec<Vec<f32>> = (0..20)
///     .map(|i| if i < 10 { vec![5.0, 0.1 * i as f32] } else { vec![0.1 * i as f32, 5.0] })
///     .collect();
///
/// let mut model = Egnmf::new(
///     EgnmfParams::new(2).with_p(3).with_n_estimators(5).with_random_state(0),
/// )
/// .unwrap();
/// let labels = model.fit(&data).unwrap().labels().unwrap();
/// assert_eq!(labels.len(), 20);
/// ```
#[derive(Clone, Debug)]
pub struct Egnmf {
    params: EgnmfParams,
    labels: Option<Vec<usize>>,
}

impl Egnmf {
    /// Create a clusterer; parameters are validated here, before any data is seen.
    pub fn new(params: EgnmfParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            labels: None,
        })
    }

    /// The validated parameters.
    pub fn params(&self) -> &EgnmfParams {
        &self.params
    }

    /// Fit on `data` (samples as rows, nonnegative) and store the consensus labels.
    ///
    /// On failure the previously stored labels (if any) are kept.
    pub fn fit(&mut self, data: &[Vec<f32>]) -> Result<&mut Self> {
        let labels = self.run(data)?;
        self.labels = Some(labels);
        Ok(self)
    }

    /// Consensus labels from the last successful [`Egnmf::fit`].
    pub fn labels(&self) -> Option<&[usize]> {
        self.labels.as_deref()
    }

    /// Generate the `N` base clusterings of `data` without fusing them.
    pub fn base_clusterings(&self, data: &[Vec<f32>]) -> Result<BaseClusterings> {
        let base_seed = self
            .params
            .random_state
            .unwrap_or_else(|| rand::rng().random::<u64>());
        self.generate(data, base_seed)
    }

    fn run(&self, data: &[Vec<f32>]) -> Result<Vec<usize>> {
        let start = Instant::now();
        let base = self.base_clusterings(data)?;

        let labels = Hbgf::new()
            .consensus(&base, Some(self.params.n_clusters))
            .map_err(|e| Error::Consensus(Box::new(e)))?;

        info!(
            "EGNMF fit: {} samples, {} members, k={} in {:?}",
            data.len(),
            base.n_runs(),
            self.params.n_clusters,
            start.elapsed()
        );
        Ok(labels)
    }

    fn generate(&self, data: &[Vec<f32>], base_seed: u64) -> Result<BaseClusterings> {
        let graph = neighbor_graph(data, self.params.p)?;
        let normalized = normalize_samples(data);
        info!(
            "EGNMF: {} members over {} samples (base seed {})",
            self.params.n_estimators,
            data.len(),
            base_seed
        );

        let member = |index: usize| -> Result<Vec<usize>> {
            self.member(&graph, &normalized, base_seed, index)
                .map_err(|e| Error::Estimator {
                    index,
                    source: Box::new(e),
                })
        };

        let runs: Vec<Vec<usize>> = if self.params.parallel {
            (0..self.params.n_estimators)
                .into_par_iter()
                .map(member)
                .collect::<Result<_>>()?
        } else {
            (0..self.params.n_estimators)
                .map(member)
                .collect::<Result<_>>()?
        };

        BaseClusterings::new(runs)
    }

    /// One ensemble member: GNMF with seed `base_seed + index`, then k-means.
    fn member(
        &self,
        graph: &CsMat<f32>,
        normalized: &[Vec<f32>],
        base_seed: u64,
        index: usize,
    ) -> Result<Vec<usize>> {
        let mut gnmf = Gnmf::new(self.params.n_clusters)
            .with_seed(base_seed.wrapping_add(index as u64))
            .with_graph(graph)
            .with_rterm(self.params.rterm)
            .with_normalize(false)
            .with_max_iter(self.params.max_iter);
        let coefficients = gnmf
            .fit(normalized)?
            .coefficients()
            .ok_or_else(|| Error::Other("factorization produced no coefficients".to_string()))?;

        let labels = Kmeans::new(self.params.n_clusters)
            .with_seed(base_seed)
            .with_init(KmeansInit::Random)
            .fit_predict(coefficients)?;

        debug!(
            "member {}: {} distinct labels",
            index,
            count_distinct(&labels)
        );
        Ok(labels)
    }
}

impl Clustering for Egnmf {
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<usize>> {
        self.run(data)
    }

    fn n_clusters(&self) -> usize {
        self.params.n_clusters
    }
}

fn count_distinct(labels: &[usize]) -> usize {
    let mut seen = labels.to_vec();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}
