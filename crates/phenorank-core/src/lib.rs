//! # Phenorank Core
//!
//! Phenotype-driven gene prioritization: a heterogeneous gene–phenotype
//! knowledge graph, node2vec-style biased random walks, skip-gram embedding
//! training, and cosine-centroid ranking of candidate genes.

pub mod engine;
pub mod ingest;
pub mod storage;

// Re-export commonly used types
pub use engine::embedding::NodeEmbeddings;
pub use engine::errors::PrioError;
pub use engine::evaluate::{evaluate_links, HeldOutLink, TopKReport};
pub use engine::graph::{build_graph, BuildReport, GraphBuilder, GraphConfig, KnowledgeGraph};
pub use engine::params::EmbeddingParams;
pub use engine::prioritize::{Prioritizer, RankQuery, RankedGene, Ranking};
pub use storage::{load_model, save_model};

/// Runs the walk and training stages over a built graph.
///
/// This is a convenience wrapper that derives the stage configs from one
/// [`EmbeddingParams`] record, the way a training run is normally invoked.
pub fn train_pipeline(
    graph: &KnowledgeGraph,
    params: &EmbeddingParams,
) -> Result<NodeEmbeddings, PrioError> {
    let walks = engine::walks::generate_walks(graph, &params.walk_config())?;
    engine::skipgram::train_embeddings(graph, &walks, &params.train_config())
}
