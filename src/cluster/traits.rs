use crate::error::Result;

/// Label marking a point that a clustering left unassigned (noise).
///
/// Consensus functions skip such entries when building hypergraphs.
pub const NOISE: usize = usize::MAX;

/// Common interface for hard clustering algorithms (one label per point).
pub trait Clustering {
    /// Fit the model (if needed) and return one cluster label per input point.
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<usize>>;

    /// The configured number of clusters (if applicable).
    ///
    /// For algorithms that discover the number of clusters dynamically this returns 0.
    fn n_clusters(&self) -> usize;
}
