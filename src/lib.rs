//! Ensemble GNMF clustering with HBGF consensus.
//!
//! `egnmf` clusters nonnegative data by running graph-regularized NMF many
//! times from different random starts, discretizing every factorization with
//! k-means, and fusing the resulting base clusterings with the Hybrid Bipartite
//! Graph Formulation.
//!
//! The building blocks are public on their own:
//! - [`graph`]: p-nearest-neighbour graph and sample normalization
//! - [`gnmf`]: the graph-regularized factorizer
//! - [`cluster`]: k-means
//! - [`consensus`]: hypergraph construction and the HBGF consensus function
//! - [`partition`]: the balanced multilevel graph partitioner HBGF uses
//! - [`metrics`]: accuracy and NMI against reference labels

#![forbid(unsafe_code)]

pub mod cluster;
pub mod consensus;
pub mod ensemble;
pub mod error;
pub mod gnmf;
pub mod graph;
pub mod metrics;
pub mod partition;

pub use cluster::{Clustering, Kmeans, KmeansFit, KmeansInit, NOISE};
pub use consensus::{BaseClusterings, ConsensusFunction, Hbgf, Hypergraph};
pub use ensemble::{Egnmf, EgnmfParams};
pub use error::{Error, Result};
pub use gnmf::Gnmf;
pub use graph::{neighbor_graph, normalize_samples};
pub use metrics::{accuracy, nmi};
pub use partition::{GraphPartitioner, RecursiveBisection};
