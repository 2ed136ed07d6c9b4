//! Balanced multi-way graph partitioning.
//!
//! The consensus step needs a METIS-like partitioner: split a weighted,
//! undirected graph into `n_parts` parts of (nearly) equal vertex weight while
//! cutting as little edge weight as possible.
//!
//! [`RecursiveBisection`] follows the classic multilevel scheme:
//!
//! 1. **Coarsening**: heavy-edge matching (vertices visited in random order,
//!    each matched with the unmatched neighbour sharing the heaviest edge)
//!    until the graph is small or stops shrinking.
//! 2. **Initial bisection**: greedy graph growing from several random seeds;
//!    the region absorbs the frontier vertex that adds the least cut until it
//!    reaches its target weight. The best trial (balance first, then cut) wins.
//! 3. **Uncoarsening**: the bisection is projected back level by level and
//!    refined with Fiduccia–Mattheyses passes (single-vertex moves by gain,
//!    rollback to the best prefix).
//!
//! A `k`-way partition is obtained by bisecting with target fractions
//! `⌊k/2⌋/k : ⌈k/2⌉/k` and recursing on both induced subgraphs.
//!
//! ## References
//!
//! Karypis & Kumar (1998). "A Fast and High Quality Multilevel Scheme for
//! Partitioning Irregular Graphs." SIAM J. Sci. Comput.
//!
//! Fiduccia & Mattheyses (1982). "A Linear-Time Heuristic for Improving
//! Network Partitions." DAC.

use crate::error::{Error, Result};
use log::{debug, trace};
use rand::prelude::*;
use sprs::CsMat;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const TOL: f64 = 1e-9;

/// Splits a graph into a fixed number of parts.
pub trait GraphPartitioner {
    /// Partition the graph given by the symmetric `adjacency` matrix into
    /// `n_parts` parts; returns one part id in `[0, n_parts)` per node.
    fn partition(&self, n_parts: usize, adjacency: &CsMat<f32>) -> Result<Vec<usize>>;
}

/// Multilevel recursive-bisection partitioner.
#[derive(Debug, Clone)]
pub struct RecursiveBisection {
    /// Allowed relative overweight of each side over its target.
    imbalance: f64,
    /// Random initial bisections tried on the coarsest graph.
    n_trials: usize,
    /// Stop coarsening once the graph has at most this many vertices.
    coarsen_to: usize,
    /// Maximum FM passes per level.
    refine_passes: usize,
    seed: u64,
}

impl RecursiveBisection {
    /// Create a partitioner with default settings (3% imbalance, 4 trials, seed 0).
    pub fn new() -> Self {
        Self {
            imbalance: 0.03,
            n_trials: 4,
            coarsen_to: 40,
            refine_passes: 8,
            seed: 0,
        }
    }

    /// Set the allowed imbalance (e.g. `0.03` for 3%).
    pub fn with_imbalance(mut self, imbalance: f64) -> Self {
        self.imbalance = imbalance;
        self
    }

    /// Set the number of initial bisection trials.
    pub fn with_trials(mut self, n_trials: usize) -> Self {
        self.n_trials = n_trials;
        self
    }

    /// Set the coarsening threshold.
    pub fn with_coarsen_to(mut self, coarsen_to: usize) -> Self {
        self.coarsen_to = coarsen_to;
        self
    }

    /// Set the maximum number of refinement passes per level.
    pub fn with_refine_passes(mut self, refine_passes: usize) -> Self {
        self.refine_passes = refine_passes;
        self
    }

    /// Set the RNG seed (matching order and growing seeds).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn recurse(
        &self,
        g: &WeightedGraph,
        ids: &[usize],
        n_parts: usize,
        offset: usize,
        membership: &mut [usize],
        rng: &mut StdRng,
    ) {
        if n_parts <= 1 {
            for &id in ids {
                membership[id] = offset;
            }
            return;
        }

        let left_parts = n_parts / 2;
        let right_parts = n_parts - left_parts;
        let frac = left_parts as f64 / n_parts as f64;

        let mut side = self.bisect(g, frac, rng);
        ensure_min_counts(g, &mut side, [left_parts, right_parts]);
        trace!(
            "bisected {} vertices ({} parts), cut {:.1}",
            g.n(),
            n_parts,
            g.cut(&side)
        );

        let halves = [
            (0u8, left_parts, offset),
            (1u8, right_parts, offset + left_parts),
        ];
        for (s, parts, off) in halves {
            let keep: Vec<bool> = side.iter().map(|&x| x == s).collect();
            let (sub, local) = g.induced(&keep);
            let sub_ids: Vec<usize> = local.iter().map(|&v| ids[v]).collect();
            self.recurse(&sub, &sub_ids, parts, off, membership, rng);
        }
    }

    /// Multilevel bisection; side 0 targets `frac` of the total vertex weight.
    fn bisect(&self, g: &WeightedGraph, frac: f64, rng: &mut StdRng) -> Vec<u8> {
        let total = g.total_weight();
        let targets = [frac * total, (1.0 - frac) * total];
        let limits = targets.map(|t| t * (1.0 + self.imbalance));
        let coarsen_to = self.coarsen_to.max(2);
        let max_vwgt = 1.5 * total / coarsen_to as f64;

        let mut levels: Vec<(WeightedGraph, Vec<usize>)> = Vec::new();
        let mut current = g.clone();
        while current.n() > coarsen_to {
            let (coarse, cmap) = current.coarsen(max_vwgt, rng);
            if coarse.n() as f64 > 0.95 * current.n() as f64 {
                break;
            }
            let finer = std::mem::replace(&mut current, coarse);
            levels.push((finer, cmap));
        }
        trace!(
            "coarsened {} -> {} vertices in {} levels",
            g.n(),
            current.n(),
            levels.len()
        );

        let mut side = self.initial_bisection(&current, targets, limits, rng);

        while let Some((finer, cmap)) = levels.pop() {
            side = cmap.iter().map(|&c| side[c]).collect();
            self.refine(&finer, &mut side, limits);
        }
        side
    }

    fn initial_bisection(
        &self,
        g: &WeightedGraph,
        targets: [f64; 2],
        limits: [f64; 2],
        rng: &mut StdRng,
    ) -> Vec<u8> {
        let mut best: Option<(Score, Vec<u8>)> = None;
        for _ in 0..self.n_trials.max(1) {
            let start = rng.random_range(0..g.n());
            let mut side = g.grow(start, targets[0], limits[0], rng);
            self.refine(g, &mut side, limits);
            let score = Score::of(g, &side, limits);
            match &best {
                Some((b, _)) if !score.better_than(b) => {}
                _ => best = Some((score, side)),
            }
        }
        best.map(|(_, side)| side).unwrap_or_else(|| vec![0; g.n()])
    }

    fn refine(&self, g: &WeightedGraph, side: &mut [u8], limits: [f64; 2]) {
        for _ in 0..self.refine_passes {
            if !g.fm_pass(side, limits) {
                break;
            }
        }
    }
}

impl Default for RecursiveBisection {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphPartitioner for RecursiveBisection {
    fn partition(&self, n_parts: usize, adjacency: &CsMat<f32>) -> Result<Vec<usize>> {
        let n = adjacency.rows();
        if adjacency.cols() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                found: adjacency.cols(),
            });
        }
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if n_parts == 0 {
            return Err(Error::InvalidParameter {
                name: "n_parts",
                message: "must be at least 1",
            });
        }
        if n_parts > n {
            return Err(Error::InvalidClusterCount {
                requested: n_parts,
                n_items: n,
            });
        }
        if !(self.imbalance >= 0.0 && self.imbalance.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "imbalance",
                message: "must be finite and non-negative",
            });
        }

        let graph = WeightedGraph::from_csr(adjacency)?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut membership = vec![0usize; n];
        let ids: Vec<usize> = (0..n).collect();
        self.recurse(&graph, &ids, n_parts, 0, &mut membership, &mut rng);

        debug!(
            "partitioned {} nodes / {} edges into {} parts",
            n,
            graph.adjncy.len() / 2,
            n_parts
        );
        Ok(membership)
    }
}

/// Balance violation first, then edge cut; lower is better.
#[derive(Clone, Copy, Debug)]
struct Score {
    violation: f64,
    cut: f64,
}

impl Score {
    fn of(g: &WeightedGraph, side: &[u8], limits: [f64; 2]) -> Self {
        Self {
            violation: violation(g.side_weights(side), limits),
            cut: g.cut(side),
        }
    }

    fn better_than(&self, other: &Score) -> bool {
        self.violation < other.violation - TOL
            || ((self.violation - other.violation).abs() <= TOL && self.cut < other.cut - TOL)
    }
}

fn violation(weights: [f64; 2], limits: [f64; 2]) -> f64 {
    (weights[0] - limits[0]).max(0.0) + (weights[1] - limits[1]).max(0.0)
}

/// Heap entry for gain-ordered vertex selection; stale entries are skipped on pop.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    gain: f64,
    vertex: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on gain; lower vertex id wins ties.
        self.gain
            .total_cmp(&other.gain)
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}

/// Make sure each side has at least as many vertices as parts it must hold.
fn ensure_min_counts(g: &WeightedGraph, side: &mut [u8], parts: [usize; 2]) {
    for s in [0u8, 1u8] {
        let have = side.iter().filter(|&&x| x == s).count();
        let need = parts[s as usize].saturating_sub(have);
        if need == 0 {
            continue;
        }
        // Move the vertices that are most attached to side `s` already.
        let mut donors: Vec<(f64, usize)> = (0..g.n())
            .filter(|&v| side[v] != s)
            .map(|v| {
                let pull: f64 = g
                    .neighbors(v)
                    .filter(|&(u, _)| side[u] == s)
                    .map(|(_, w)| w)
                    .sum();
                (pull, v)
            })
            .collect();
        donors.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        for &(_, v) in donors.iter().take(need) {
            side[v] = s;
        }
    }
}

/// CSR graph with vertex and edge weights.
#[derive(Clone, Debug)]
struct WeightedGraph {
    xadj: Vec<usize>,
    adjncy: Vec<usize>,
    adjwgt: Vec<f64>,
    vwgt: Vec<f64>,
}

impl WeightedGraph {
    /// Unit vertex weights; self-loops and zero entries are dropped.
    fn from_csr(adjacency: &CsMat<f32>) -> Result<Self> {
        let n = adjacency.rows();
        let mut xadj = Vec::with_capacity(n + 1);
        let mut adjncy = Vec::with_capacity(adjacency.nnz());
        let mut adjwgt = Vec::with_capacity(adjacency.nnz());
        xadj.push(0);

        let csr = adjacency.to_csr();
        for (i, row) in csr.outer_iterator().enumerate() {
            for (j, &w) in row.iter() {
                if !(w.is_finite() && w >= 0.0) {
                    return Err(Error::InvalidValue {
                        row: i,
                        col: j,
                        message: "edge weights must be finite and non-negative",
                    });
                }
                if i == j || w == 0.0 {
                    continue;
                }
                adjncy.push(j);
                adjwgt.push(f64::from(w));
            }
            xadj.push(adjncy.len());
        }

        Ok(Self {
            xadj,
            adjncy,
            adjwgt,
            vwgt: vec![1.0; n],
        })
    }

    #[inline]
    fn n(&self) -> usize {
        self.vwgt.len()
    }

    #[inline]
    fn neighbors(&self, v: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.xadj[v]..self.xadj[v + 1];
        self.adjncy[range.clone()]
            .iter()
            .copied()
            .zip(self.adjwgt[range].iter().copied())
    }

    fn total_weight(&self) -> f64 {
        self.vwgt.iter().sum()
    }

    fn degree(&self, v: usize) -> f64 {
        self.neighbors(v).map(|(_, w)| w).sum()
    }

    fn side_weights(&self, side: &[u8]) -> [f64; 2] {
        let mut w = [0.0; 2];
        for (v, &s) in side.iter().enumerate() {
            w[s as usize] += self.vwgt[v];
        }
        w
    }

    fn cut(&self, side: &[u8]) -> f64 {
        let mut cut = 0.0;
        for v in 0..self.n() {
            for (u, w) in self.neighbors(v) {
                if side[u] != side[v] {
                    cut += w;
                }
            }
        }
        cut / 2.0
    }

    /// Subgraph on the vertices with `keep[v]`; returns it with local -> parent ids.
    fn induced(&self, keep: &[bool]) -> (WeightedGraph, Vec<usize>) {
        let mut local_id = vec![usize::MAX; self.n()];
        let mut parent: Vec<usize> = Vec::new();
        for v in (0..self.n()).filter(|&v| keep[v]) {
            local_id[v] = parent.len();
            parent.push(v);
        }

        let mut xadj = Vec::with_capacity(parent.len() + 1);
        let mut adjncy = Vec::new();
        let mut adjwgt = Vec::new();
        let mut vwgt = Vec::with_capacity(parent.len());
        xadj.push(0);
        for &v in &parent {
            for (u, w) in self.neighbors(v) {
                if keep[u] {
                    adjncy.push(local_id[u]);
                    adjwgt.push(w);
                }
            }
            xadj.push(adjncy.len());
            vwgt.push(self.vwgt[v]);
        }

        (
            WeightedGraph {
                xadj,
                adjncy,
                adjwgt,
                vwgt,
            },
            parent,
        )
    }

    /// One level of heavy-edge matching; returns the coarse graph and fine -> coarse map.
    fn coarsen(&self, max_vwgt: f64, rng: &mut StdRng) -> (WeightedGraph, Vec<usize>) {
        let n = self.n();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let mut matched = vec![usize::MAX; n];
        for &v in &order {
            if matched[v] != usize::MAX {
                continue;
            }
            let mut mate = v;
            let mut heaviest = 0.0;
            for (u, w) in self.neighbors(v) {
                if matched[u] == usize::MAX
                    && u != v
                    && w > heaviest
                    && self.vwgt[v] + self.vwgt[u] <= max_vwgt
                {
                    mate = u;
                    heaviest = w;
                }
            }
            matched[v] = mate;
            matched[mate] = v;
        }

        let mut cmap = vec![usize::MAX; n];
        let mut members: Vec<(usize, usize)> = Vec::new();
        for v in 0..n {
            if cmap[v] == usize::MAX {
                cmap[v] = members.len();
                cmap[matched[v]] = members.len();
                members.push((v, matched[v]));
            }
        }

        let cn = members.len();
        let mut xadj = Vec::with_capacity(cn + 1);
        let mut adjncy: Vec<usize> = Vec::new();
        let mut adjwgt: Vec<f64> = Vec::new();
        let mut vwgt = Vec::with_capacity(cn);
        let mut slot = vec![usize::MAX; cn];
        xadj.push(0);

        for (c, &(a, b)) in members.iter().enumerate() {
            let start = adjncy.len();
            let pair = [a, b];
            let fine = if a == b { &pair[..1] } else { &pair[..] };
            for &v in fine {
                for (u, w) in self.neighbors(v) {
                    let cu = cmap[u];
                    if cu == c {
                        continue;
                    }
                    if slot[cu] == usize::MAX {
                        slot[cu] = adjncy.len();
                        adjncy.push(cu);
                        adjwgt.push(w);
                    } else {
                        adjwgt[slot[cu]] += w;
                    }
                }
            }
            for &cu in &adjncy[start..] {
                slot[cu] = usize::MAX;
            }
            xadj.push(adjncy.len());
            vwgt.push(fine.iter().map(|&v| self.vwgt[v]).sum());
        }

        (
            WeightedGraph {
                xadj,
                adjncy,
                adjwgt,
                vwgt,
            },
            cmap,
        )
    }

    /// Greedy graph growing: side 0 grows from `start` until it reaches `target`.
    fn grow(&self, start: usize, target: f64, limit: f64, rng: &mut StdRng) -> Vec<u8> {
        let n = self.n();
        let mut side = vec![1u8; n];
        let mut rejected = vec![false; n];
        let mut conn = vec![0.0f64; n];
        let degree: Vec<f64> = (0..n).map(|v| self.degree(v)).collect();
        let mut weight = 0.0;

        let mut heap = BinaryHeap::new();
        heap.push(Candidate {
            gain: -degree[start],
            vertex: start,
        });

        while weight < target - TOL {
            let next = std::iter::from_fn(|| heap.pop()).find(|c| {
                side[c.vertex] == 1
                    && !rejected[c.vertex]
                    && c.gain == 2.0 * conn[c.vertex] - degree[c.vertex]
            });
            let v = match next {
                Some(c) => c.vertex,
                None => {
                    // Frontier exhausted (disconnected graph): jump to a fresh vertex.
                    let free: Vec<usize> = (0..n)
                        .filter(|&v| side[v] == 1 && !rejected[v])
                        .collect();
                    match free.choose(rng) {
                        Some(&v) => v,
                        None => break,
                    }
                }
            };

            if weight + self.vwgt[v] > limit + TOL {
                rejected[v] = true;
                continue;
            }

            side[v] = 0;
            weight += self.vwgt[v];
            for (u, w) in self.neighbors(v) {
                if side[u] == 1 {
                    conn[u] += w;
                    heap.push(Candidate {
                        gain: 2.0 * conn[u] - degree[u],
                        vertex: u,
                    });
                }
            }
        }
        side
    }

    /// One Fiduccia–Mattheyses pass; returns whether the bisection improved.
    fn fm_pass(&self, side: &mut [u8], limits: [f64; 2]) -> bool {
        const MAX_STALL: usize = 64;

        let n = self.n();
        let mut weights = self.side_weights(side);
        let mut gain = vec![0.0f64; n];
        let mut cut = 0.0;
        for v in 0..n {
            for (u, w) in self.neighbors(v) {
                if side[u] != side[v] {
                    gain[v] += w;
                    cut += w;
                } else {
                    gain[v] -= w;
                }
            }
        }
        cut /= 2.0;

        let mut heap: BinaryHeap<Candidate> = (0..n)
            .map(|v| Candidate {
                gain: gain[v],
                vertex: v,
            })
            .collect();

        let mut locked = vec![false; n];
        let mut moves: Vec<usize> = Vec::new();
        let mut best = Score {
            violation: violation(weights, limits),
            cut,
        };
        let mut best_len = 0;
        let mut stall = 0;

        while let Some(Candidate { gain: g, vertex: v }) = heap.pop() {
            if locked[v] || g != gain[v] {
                continue;
            }
            let from = side[v] as usize;
            let to = 1 - from;

            let before = violation(weights, limits);
            let mut after_weights = weights;
            after_weights[from] -= self.vwgt[v];
            after_weights[to] += self.vwgt[v];
            if violation(after_weights, limits) > before + TOL {
                continue;
            }

            side[v] = to as u8;
            weights = after_weights;
            cut -= gain[v];
            gain[v] = -gain[v];
            locked[v] = true;
            moves.push(v);

            for (u, w) in self.neighbors(v) {
                if side[u] as usize == to {
                    gain[u] -= 2.0 * w;
                } else {
                    gain[u] += 2.0 * w;
                }
                if !locked[u] {
                    heap.push(Candidate {
                        gain: gain[u],
                        vertex: u,
                    });
                }
            }

            let score = Score {
                violation: violation(weights, limits),
                cut,
            };
            if score.better_than(&best) {
                best = score;
                best_len = moves.len();
                stall = 0;
            } else {
                stall += 1;
                if stall >= MAX_STALL {
                    break;
                }
            }
        }

        for &v in moves[best_len..].iter().rev() {
            side[v] ^= 1;
        }
        best_len > 0
    }
}
