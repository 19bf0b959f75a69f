//! Combined embedding hyperparameters.
//!
//! [`EmbeddingParams`] is the single serializable record of how a model was
//! produced; it is persisted next to the vectors and splits into the walk
//! and training configs consumed by the pipeline stages.

use serde::{Deserialize, Serialize};

use crate::engine::skipgram::TrainConfig;
use crate::engine::walks::WalkConfig;

/// Parameters for the embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingParams {
    /// The number of dimensions of feature vectors
    pub dimensions: usize,
    /// The number of nodes in each random walk
    pub walk_length: usize,
    /// Controls the probability for a walk to visit immediately back to the
    /// previous node
    pub p: f64,
    /// Controls the probability for a walk to visit previously unexplored
    /// neighborhoods in the graph
    pub q: f64,
    /// Number of random walks to be generated from each node in the graph
    pub num_walks: usize,
    /// Limit on the number of words in each context
    pub window: usize,
    /// Minimum corpus occurrences for a node to keep its vector
    pub min_count: usize,
    /// Negative samples per positive pair
    pub negative: usize,
    /// Passes over the walk corpus
    pub epochs: usize,
    /// Tokens between learning-rate updates
    pub batch_words: usize,
    /// Number of workers threads to use
    pub workers: usize,
    /// Master seed; walk and training stages derive their own offsets so
    /// the two stages never share a stream.
    pub seed: Option<u64>,
}

impl Default for EmbeddingParams {
    fn default() -> Self {
        Self {
            dimensions: 300,
            walk_length: 60,
            p: 1.7987535798694703,
            q: 3.875406134463754,
            num_walks: 10,
            window: 4,
            min_count: 1,
            negative: 5,
            epochs: 1,
            batch_words: 10_000,
            workers: 4,
            seed: None,
        }
    }
}

impl EmbeddingParams {
    /// Walk-stage view of the parameters.
    pub fn walk_config(&self) -> WalkConfig {
        WalkConfig {
            num_walks: self.num_walks,
            walk_length: self.walk_length,
            p: self.p,
            q: self.q,
            seed: self.seed.map(|s| s.wrapping_add(23)),
        }
    }

    /// Training-stage view of the parameters.
    pub fn train_config(&self) -> TrainConfig {
        TrainConfig {
            dimensions: self.dimensions,
            window: self.window,
            min_count: self.min_count,
            negative: self.negative,
            epochs: self.epochs,
            batch_words: self.batch_words,
            workers: self.workers,
            seed: self.seed.map(|s| s.wrapping_add(42)),
            ..TrainConfig::default()
        }
    }
}
