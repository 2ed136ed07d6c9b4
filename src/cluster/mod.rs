//! Hard clustering primitives.
//!
//! ## K-means
//!
//! Assign each point to the nearest centroid, then move each centroid to the
//! mean of its points. Repeat.
//!
//! **Objective**: minimize the within-cluster sum of squares:
//!
//! ```text
//! J = Σ_k Σ_{x ∈ C_k} ||x - μ_k||²
//! ```
//!
//! In the ensemble, k-means discretizes each GNMF coefficient matrix (one row
//! of soft memberships per sample) into hard labels. Rows of `V` that the graph
//! regularizer has pulled together end up in the same cluster.
//!
//! ## Usage
//!
//! ```rust
//! use egnmf::cluster::{Clustering, Kmeans, KmeansInit};
//!
//! let data = vec![
//!     vec![0.0, 0.0],
//!     vec![0.1, 0.1],
//!     vec![10.0, 10.0],
//!     vec![10.1, 10.1],
//! ];
//!
//! let labels = Kmeans::new(2)
//!     .with_seed(42)
//!     .with_init(KmeansInit::Random)
//!     .fit_predict(&data)
//!     .unwrap();
//! assert_eq!(labels[0], labels[1]);
//! assert_ne!(labels[0], labels[2]);
//! ```

mod kmeans;
mod traits;
pub(crate) mod util;

pub use kmeans::{Kmeans, KmeansFit, KmeansInit};
pub use traits::{Clustering, NOISE};
