//! GNMF: graph-regularized nonnegative matrix factorization (Cai et al., 2011).
//!
//! With samples as rows, the data `X` (`M x D`) is approximated by `V Uᵀ`,
//! where `V` (`M x k`) holds the per-sample coefficients and `U` (`D x k`) the
//! basis. A sample graph `W` with degree matrix `Dg` adds a smoothness penalty:
//!
//! ```text
//! O = ||X - V Uᵀ||²  +  λ · Tr(Vᵀ (Dg - W) V)
//! ```
//!
//! Multiplicative updates keep both factors nonnegative:
//!
//! ```text
//! U ← U ∘ (Xᵀ V) / (U Vᵀ V)
//! V ← V ∘ (X U + λ W V) / (V Uᵀ U + λ Dg V)
//! ```
//!
//! After the last iteration the columns of `U` are scaled to unit L2 norm and
//! `V` is rescaled to compensate, so coefficients are comparable across samples.

use crate::cluster::util::validate_nonnegative;
use crate::error::{Error, Result};
use crate::graph::{degrees, normalize_samples};
use log::trace;
use rand::prelude::*;
use sprs::CsMat;

const EPS: f64 = 1e-10;

/// Dense row-major matrix used for the factor updates.
#[derive(Clone, Debug)]
struct Dense {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Dense {
    fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    fn random(rows: usize, cols: usize, rng: &mut StdRng) -> Self {
        Self {
            rows,
            cols,
            data: (0..rows * cols).map(|_| rng.random::<f64>()).collect(),
        }
    }

    fn from_rows(rows: &[Vec<f32>]) -> Self {
        let cols = rows.first().map_or(0, Vec::len);
        Self {
            rows: rows.len(),
            cols,
            data: rows.iter().flatten().map(|&x| f64::from(x)).collect(),
        }
    }

    #[inline]
    fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    #[inline]
    fn at(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    /// `selfᵀ · other`, both with the same row count.
    fn t_mul(&self, other: &Dense) -> Dense {
        debug_assert_eq!(self.rows, other.rows);
        let mut out = Dense::zeros(self.cols, other.cols);
        for r in 0..self.rows {
            let a = self.row(r);
            let b = other.row(r);
            for (i, &ai) in a.iter().enumerate() {
                if ai == 0.0 {
                    continue;
                }
                let dst = &mut out.data[i * other.cols..(i + 1) * other.cols];
                for (d, &bj) in dst.iter_mut().zip(b) {
                    *d += ai * bj;
                }
            }
        }
        out
    }

    /// `self · other`.
    fn mul(&self, other: &Dense) -> Dense {
        debug_assert_eq!(self.cols, other.rows);
        let mut out = Dense::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            let dst = &mut out.data[r * other.cols..(r + 1) * other.cols];
            for (k, &a) in self.row(r).iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                for (d, &b) in dst.iter_mut().zip(other.row(k)) {
                    *d += a * b;
                }
            }
        }
        out
    }

    /// `self ← self ∘ num / max(den, EPS)`.
    fn multiplicative_update(&mut self, num: &Dense, den: &Dense) {
        for ((x, &n), &d) in self.data.iter_mut().zip(&num.data).zip(&den.data) {
            *x *= n / d.max(EPS);
        }
    }

    fn to_rows(&self) -> Vec<Vec<f32>> {
        (0..self.rows)
            .map(|i| self.row(i).iter().map(|&x| x as f32).collect())
            .collect()
    }
}

/// Graph-regularized NMF.
///
/// A fresh instance is configured per ensemble member; the graph is borrowed so
/// many instances can share one neighbourhood structure.
#[derive(Clone, Debug)]
pub struct Gnmf<'g> {
    n_components: usize,
    graph: Option<&'g CsMat<f32>>,
    rterm: f64,
    max_iter: usize,
    normalize: bool,
    seed: Option<u64>,

    basis: Option<Vec<Vec<f32>>>,
    coefficients: Option<Vec<Vec<f32>>>,
    objective: Option<f64>,
}

impl<'g> Gnmf<'g> {
    /// Create a factorizer with `n_components` latent factors.
    ///
    /// Without a graph (or with `rterm == 0`) this is plain multiplicative-update NMF.
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            graph: None,
            rterm: 100.0,
            max_iter: 30,
            normalize: true,
            seed: None,
            basis: None,
            coefficients: None,
            objective: None,
        }
    }

    /// Regularize against `graph` (`M x M`, symmetric, nonnegative).
    pub fn with_graph(mut self, graph: &'g CsMat<f32>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Set the regularization weight λ.
    pub fn with_rterm(mut self, rterm: f64) -> Self {
        self.rterm = rterm;
        self
    }

    /// Set the number of multiplicative-update iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Scale samples to unit norm before factorizing (default `true`).
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Set the seed for the random factor initialization.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Factorize `data` (samples as rows, nonnegative).
    pub fn fit(&mut self, data: &[Vec<f32>]) -> Result<&mut Self> {
        validate_nonnegative(data)?;
        let m = data.len();

        if self.n_components == 0 {
            return Err(Error::InvalidParameter {
                name: "n_components",
                message: "must be at least 1",
            });
        }
        if !(self.rterm >= 0.0) {
            return Err(Error::InvalidParameter {
                name: "rterm",
                message: "must be non-negative",
            });
        }
        if self.max_iter == 0 {
            return Err(Error::InvalidParameter {
                name: "max_iter",
                message: "must be at least 1",
            });
        }
        if let Some(g) = self.graph {
            if g.shape() != (m, m) {
                return Err(Error::DimensionMismatch {
                    expected: m,
                    found: g.rows(),
                });
            }
        }

        let x = if self.normalize {
            Dense::from_rows(&normalize_samples(data))
        } else {
            Dense::from_rows(data)
        };

        let mut rng = match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let mut u = Dense::random(x.cols, self.n_components, &mut rng);
        let mut v = Dense::random(m, self.n_components, &mut rng);

        let regularized = self.graph.filter(|_| self.rterm > 0.0);
        let degree = regularized.map(degrees);

        for it in 0..self.max_iter {
            // U update
            let xtv = x.t_mul(&v);
            let vtv = v.t_mul(&v);
            let uvv = u.mul(&vtv);
            u.multiplicative_update(&xtv, &uvv);

            // V update
            let mut xu = x.mul(&u);
            let utu = u.t_mul(&u);
            let mut vuu = v.mul(&utu);
            if let (Some(g), Some(deg)) = (regularized, degree.as_ref()) {
                self.add_graph_terms(g, deg, &v, &mut xu, &mut vuu);
            }
            v.multiplicative_update(&xu, &vuu);

            if log::log_enabled!(log::Level::Trace) {
                trace!("gnmf iter {}: objective {:.6e}", it, self.objective_of(&x, &u, &v));
            }
        }

        self.objective = Some(self.objective_of(&x, &u, &v));
        normalize_factors(&mut u, &mut v);
        self.basis = Some(u.to_rows());
        self.coefficients = Some(v.to_rows());
        Ok(self)
    }

    /// `num += λ W V`, `den += λ Dg V`.
    fn add_graph_terms(
        &self,
        graph: &CsMat<f32>,
        degree: &[f32],
        v: &Dense,
        num: &mut Dense,
        den: &mut Dense,
    ) {
        let k = v.cols;
        for (i, row) in graph.outer_iterator().enumerate() {
            let dst = &mut num.data[i * k..(i + 1) * k];
            for (j, &w) in row.iter() {
                let coef = self.rterm * f64::from(w);
                for (d, &vj) in dst.iter_mut().zip(v.row(j)) {
                    *d += coef * vj;
                }
            }
            let di = self.rterm * f64::from(degree[i]);
            for (d, &vi) in den.data[i * k..(i + 1) * k].iter_mut().zip(v.row(i)) {
                *d += di * vi;
            }
        }
    }

    fn objective_of(&self, x: &Dense, u: &Dense, v: &Dense) -> f64 {
        let mut loss = 0.0;
        for i in 0..x.rows {
            let vi = v.row(i);
            for f in 0..x.cols {
                let approx: f64 = vi.iter().zip(u.row(f)).map(|(a, b)| a * b).sum();
                let r = x.at(i, f) - approx;
                loss += r * r;
            }
        }
        if let Some(g) = self.graph.filter(|_| self.rterm > 0.0) {
            // Tr(Vᵀ L V) = ½ Σ_ij W_ij ||v_i - v_j||²
            let mut smooth = 0.0;
            for (i, row) in g.outer_iterator().enumerate() {
                for (j, &w) in row.iter() {
                    let d2: f64 = v
                        .row(i)
                        .iter()
                        .zip(v.row(j))
                        .map(|(a, b)| (a - b) * (a - b))
                        .sum();
                    smooth += f64::from(w) * d2;
                }
            }
            loss += self.rterm * 0.5 * smooth;
        }
        loss
    }

    /// Per-sample coefficients `V` (`M x k`), available after [`Gnmf::fit`].
    pub fn coefficients(&self) -> Option<&[Vec<f32>]> {
        self.coefficients.as_deref()
    }

    /// Basis `U` (`D x k`, unit-norm columns), available after [`Gnmf::fit`].
    pub fn basis(&self) -> Option<&[Vec<f32>]> {
        self.basis.as_deref()
    }

    /// Regularized objective at the last iteration (before factor normalization).
    pub fn objective(&self) -> Option<f64> {
        self.objective
    }

    /// Number of latent factors.
    pub fn n_components(&self) -> usize {
        self.n_components
    }
}

/// Scale columns of `U` to unit L2 norm and multiply `V`'s columns by the old norms.
fn normalize_factors(u: &mut Dense, v: &mut Dense) {
    let k = u.cols;
    let mut norms = vec![0.0f64; k];
    for f in 0..u.rows {
        for (n, &x) in norms.iter_mut().zip(u.row(f)) {
            *n += x * x;
        }
    }
    for n in &mut norms {
        *n = n.sqrt().max(EPS);
    }
    for f in 0..u.rows {
        for (x, n) in u.data[f * k..(f + 1) * k].iter_mut().zip(&norms) {
            *x /= n;
        }
    }
    for i in 0..v.rows {
        for (x, n) in v.data[i * k..(i + 1) * k].iter_mut().zip(&norms) {
            *x *= n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::neighbor_graph;

    fn two_directions() -> Vec<Vec<f32>> {
        vec![
            vec![5.0, 0.2, 0.1],
            vec![4.8, 0.1, 0.3],
            vec![5.1, 0.3, 0.2],
            vec![0.1, 0.2, 5.0],
            vec![0.3, 0.1, 4.9],
            vec![0.2, 0.2, 5.2],
        ]
    }

    #[test]
    fn test_gnmf_shapes_and_nonnegativity() {
        let data = two_directions();
        let mut model = Gnmf::new(2).with_seed(0).with_max_iter(50);
        model.fit(&data).unwrap();

        assert_eq!(model.n_components(), 2);
        let v = model.coefficients().unwrap();
        assert_eq!(v.len(), 6);
        assert!(v
            .iter()
            .all(|r| r.len() == model.n_components() && r.iter().all(|&x| x >= 0.0)));

        let u = model.basis().unwrap();
        assert_eq!(u.len(), 3);
        for c in 0..2 {
            let norm: f32 = u.iter().map(|r| r[c] * r[c]).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_gnmf_objective_decreases_with_iterations() {
        let data = two_directions();
        let graph = neighbor_graph(&data, 2).unwrap();
        let short = Gnmf::new(2)
            .with_seed(4)
            .with_graph(&graph)
            .with_rterm(1.0)
            .with_max_iter(2)
            .fit(&data)
            .unwrap()
            .objective()
            .unwrap();
        let long = Gnmf::new(2)
            .with_seed(4)
            .with_graph(&graph)
            .with_rterm(1.0)
            .with_max_iter(200)
            .fit(&data)
            .unwrap()
            .objective()
            .unwrap();
        assert!(long <= short);
    }

    #[test]
    fn test_gnmf_separates_directions() {
        let data = two_directions();
        let graph = neighbor_graph(&data, 2).unwrap();
        let mut model = Gnmf::new(2)
            .with_seed(11)
            .with_graph(&graph)
            .with_rterm(1.0)
            .with_max_iter(300);
        model.fit(&data).unwrap();
        let v = model.coefficients().unwrap();

        let dominant = |r: &Vec<f32>| usize::from(r[1] > r[0]);
        assert_eq!(dominant(&v[0]), dominant(&v[1]));
        assert_eq!(dominant(&v[0]), dominant(&v[2]));
        assert_eq!(dominant(&v[3]), dominant(&v[4]));
        assert_eq!(dominant(&v[3]), dominant(&v[5]));
        assert_ne!(dominant(&v[0]), dominant(&v[3]));
    }

    #[test]
    fn test_gnmf_same_seed_same_result() {
        let data = two_directions();
        let graph = neighbor_graph(&data, 2).unwrap();
        let run = || {
            let mut m = Gnmf::new(2).with_seed(9).with_graph(&graph);
            m.fit(&data).unwrap();
            m.coefficients().unwrap().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_gnmf_rejects_bad_input() {
        let mut model = Gnmf::new(2).with_seed(0);
        assert!(matches!(
            model.fit(&[vec![1.0, -1.0], vec![1.0, 1.0]]),
            Err(Error::InvalidValue { row: 0, col: 1, .. })
        ));
        assert!(model.fit(&[]).is_err());

        let graph = neighbor_graph(&two_directions(), 1).unwrap();
        let mut mismatched = Gnmf::new(2).with_graph(&graph);
        assert!(matches!(
            mismatched.fit(&[vec![1.0], vec![2.0]]),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
