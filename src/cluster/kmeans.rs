//! K-means clustering (Lloyd iterations).
//!
//! Used by the ensemble as the discretizer that turns a GNMF coefficient matrix
//! into hard labels, but usable on any dense data.
//!
//! ## Seeding
//!
//! - [`KmeansInit::Random`]: `k` distinct observations chosen uniformly at random.
//!   This is what the ensemble uses: cheap, and diverse across restarts.
//! - [`KmeansInit::KmeansPlusPlus`]: D² sampling (Arthur & Vassilvitskii, 2007).
//!
//! Each fit runs `n_init` independent restarts from one seeded RNG stream and
//! keeps the one with the lowest inertia.
//!
//! ## Empty clusters
//!
//! A centroid that loses all its points during an iteration is moved onto the
//! point farthest from its current centroid. With duplicate points the final
//! assignment can still leave a cluster unused, so callers must not assume all
//! `k` labels appear.

use super::traits::Clustering;
use super::util::{squared_euclidean, validate_dense};
use crate::error::{Error, Result};
use rand::prelude::*;

/// Centroid seeding strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KmeansInit {
    /// Pick `k` distinct observations uniformly at random.
    Random,
    /// k-means++ (D² weighted) seeding.
    #[default]
    KmeansPlusPlus,
}

/// K-means clusterer.
#[derive(Debug, Clone)]
pub struct Kmeans {
    k: usize,
    max_iter: usize,
    n_init: usize,
    tol: f32,
    init: KmeansInit,
    seed: Option<u64>,
}

/// Result of a k-means fit.
#[derive(Debug, Clone)]
pub struct KmeansFit {
    /// Final centroids, `k x d`.
    pub centroids: Vec<Vec<f32>>,
    /// Label per input point.
    pub labels: Vec<usize>,
    /// Sum of squared distances of points to their centroid.
    pub inertia: f32,
    /// Lloyd iterations run by the best restart.
    pub n_iter: usize,
}

impl Kmeans {
    /// Create a k-means clusterer with `k` clusters.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 300,
            n_init: 10,
            tol: 1e-4,
            init: KmeansInit::default(),
            seed: None,
        }
    }

    /// Set the maximum number of Lloyd iterations per restart.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the number of restarts.
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Set the convergence tolerance on total squared centroid shift.
    pub fn with_tol(mut self, tol: f32) -> Self {
        self.tol = tol;
        self
    }

    /// Set the seeding strategy.
    pub fn with_init(mut self, init: KmeansInit) -> Self {
        self.init = init;
        self
    }

    /// Set the RNG seed for reproducible fits.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fit and return centroids, labels, and inertia.
    pub fn fit(&self, data: &[Vec<f32>]) -> Result<KmeansFit> {
        let d = validate_dense(data)?;
        let n = data.len();

        if self.k == 0 {
            return Err(Error::InvalidParameter {
                name: "k",
                message: "must be at least 1",
            });
        }
        if self.k > n {
            return Err(Error::InvalidClusterCount {
                requested: self.k,
                n_items: n,
            });
        }
        if self.max_iter == 0 {
            return Err(Error::InvalidParameter {
                name: "max_iter",
                message: "must be at least 1",
            });
        }
        if self.n_init == 0 {
            return Err(Error::InvalidParameter {
                name: "n_init",
                message: "must be at least 1",
            });
        }

        let mut rng: Box<dyn RngCore> = match self.seed {
            Some(s) => Box::new(StdRng::seed_from_u64(s)),
            None => Box::new(rand::rng()),
        };

        let mut best: Option<KmeansFit> = None;
        for _ in 0..self.n_init {
            let centroids = match self.init {
                KmeansInit::Random => init_random(data, self.k, rng.as_mut()),
                KmeansInit::KmeansPlusPlus => init_plus_plus(data, self.k, rng.as_mut()),
            };
            let fit = self.lloyd(data, d, centroids);
            match &best {
                Some(b) if b.inertia <= fit.inertia => {}
                _ => best = Some(fit),
            }
        }

        best.ok_or_else(|| Error::Other("k-means produced no restart".to_string()))
    }

    fn lloyd(&self, data: &[Vec<f32>], d: usize, mut centroids: Vec<Vec<f32>>) -> KmeansFit {
        let n = data.len();
        let mut labels = vec![0usize; n];
        let mut n_iter = 0;

        for it in 0..self.max_iter {
            n_iter = it + 1;
            assign(data, &centroids, &mut labels);

            let mut sums = vec![vec![0.0f32; d]; self.k];
            let mut counts = vec![0usize; self.k];
            for (point, &l) in data.iter().zip(labels.iter()) {
                counts[l] += 1;
                for (s, x) in sums[l].iter_mut().zip(point.iter()) {
                    *s += x;
                }
            }

            relocate_empty(data, &centroids, &mut labels, &mut counts, &mut sums);

            let mut shift = 0.0f32;
            for (c, (sum, &count)) in sums.into_iter().zip(counts.iter()).enumerate() {
                let updated: Vec<f32> = sum.into_iter().map(|s| s / count as f32).collect();
                shift += squared_euclidean(&centroids[c], &updated);
                centroids[c] = updated;
            }

            if shift <= self.tol {
                break;
            }
        }

        // Labels must match the returned centroids.
        let inertia = assign(data, &centroids, &mut labels);
        KmeansFit {
            centroids,
            labels,
            inertia,
            n_iter,
        }
    }
}

impl Default for Kmeans {
    fn default() -> Self {
        Self::new(8)
    }
}

impl Clustering for Kmeans {
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<usize>> {
        Ok(self.fit(data)?.labels)
    }

    fn n_clusters(&self) -> usize {
        self.k
    }
}

/// Assign each point to its nearest centroid; returns the inertia.
fn assign(data: &[Vec<f32>], centroids: &[Vec<f32>], labels: &mut [usize]) -> f32 {
    let mut inertia = 0.0f32;
    for (point, label) in data.iter().zip(labels.iter_mut()) {
        let mut best = 0usize;
        let mut best_d = f32::INFINITY;
        for (c, centroid) in centroids.iter().enumerate() {
            let dist = squared_euclidean(point, centroid);
            if dist < best_d {
                best_d = dist;
                best = c;
            }
        }
        *label = best;
        inertia += best_d;
    }
    inertia
}

/// Give every empty cluster the point farthest from its own centroid.
fn relocate_empty(
    data: &[Vec<f32>],
    centroids: &[Vec<f32>],
    labels: &mut [usize],
    counts: &mut [usize],
    sums: &mut [Vec<f32>],
) {
    if !counts.iter().any(|&c| c == 0) {
        return;
    }

    let mut far: Vec<(f32, usize)> = data
        .iter()
        .enumerate()
        .map(|(i, p)| (squared_euclidean(p, &centroids[labels[i]]), i))
        .collect();
    far.sort_by(|a, b| b.0.total_cmp(&a.0));
    let mut candidates = far.into_iter().map(|(_, i)| i);

    for c in 0..counts.len() {
        if counts[c] != 0 {
            continue;
        }
        // Donor clusters must keep at least one point.
        let Some(i) = candidates.by_ref().find(|&i| counts[labels[i]] > 1) else {
            break;
        };
        let from = labels[i];
        counts[from] -= 1;
        for (s, x) in sums[from].iter_mut().zip(data[i].iter()) {
            *s -= x;
        }
        labels[i] = c;
        counts[c] = 1;
        sums[c] = data[i].clone();
    }
}

fn init_random(data: &[Vec<f32>], k: usize, rng: &mut dyn RngCore) -> Vec<Vec<f32>> {
    rand::seq::index::sample(rng, data.len(), k)
        .into_iter()
        .map(|i| data[i].clone())
        .collect()
}

fn init_plus_plus(data: &[Vec<f32>], k: usize, rng: &mut dyn RngCore) -> Vec<Vec<f32>> {
    let n = data.len();
    let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(k);
    centroids.push(data[rng.random_range(0..n)].clone());

    let mut nearest: Vec<f32> = data
        .iter()
        .map(|p| squared_euclidean(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f32 = nearest.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.random::<f32>() * total;
            let mut pick = n - 1;
            for (i, &w) in nearest.iter().enumerate() {
                if target < w {
                    pick = i;
                    break;
                }
                target -= w;
            }
            pick
        } else {
            // All remaining mass is zero (duplicates); fall back to uniform.
            rng.random_range(0..n)
        };

        let c = data[next].clone();
        for (p, dist) in data.iter().zip(nearest.iter_mut()) {
            *dist = dist.min(squared_euclidean(p, &c));
        }
        centroids.push(c);
    }
    centroids
}
