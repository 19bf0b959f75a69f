//! The embedding and ranking engine.
//!
//! This module provides:
//! - **errors**: Error types for build, training, and query failures
//! - **graph**: Gene–phenotype knowledge graph with CSR adjacency
//! - **alias**: O(1) sampling from fixed discrete distributions
//! - **walks**: Second-order biased random walk generation
//! - **skipgram**: Skip-gram-with-negative-sampling trainer
//! - **embedding**: Immutable node-to-vector mapping
//! - **prioritize**: Centroid/cosine gene ranking
//! - **evaluate**: Top-k rank evaluation of held-out links
//! - **params**: Combined, serializable hyperparameter record

pub mod alias;
pub mod embedding;
pub mod errors;
pub mod evaluate;
pub mod graph;
pub mod params;
pub mod prioritize;
pub mod skipgram;
pub mod walks;
