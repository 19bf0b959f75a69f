//! Skip-gram embedding training over the walk corpus.
//!
//! Walks are treated as sentences and nodes as words: skip-gram with
//! negative sampling predicts context co-occurrence from a center node,
//! with negatives drawn from the unigram^0.75 distribution. Two flat f32
//! matrices are trained (target and context); only the target matrix
//! survives as the embedding.
//!
//! ## Determinism
//!
//! Training is bit-reproducible iff a seed is set and `workers == 1`. With
//! more workers, updates are Hogwild-style: weight cells are written
//! without synchronization, so the accumulation order of floating-point
//! gradients varies between runs. That is a documented property of the
//! trainer, not a defect; sparse co-occurrence updates rarely collide and
//! the objective tolerates the noise.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::engine::alias::AliasTable;
use crate::engine::embedding::NodeEmbeddings;
use crate::engine::errors::PrioError;
use crate::engine::graph::{KnowledgeGraph, NodeId};

/// Skip-gram training parameters.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Dimensionality of the learned vectors.
    pub dimensions: usize,
    /// Maximum context window on each side of the center node. The
    /// effective window per position is drawn uniformly from `1..=window`.
    pub window: usize,
    /// Nodes occurring fewer times than this across all walks are dropped
    /// from the vocabulary and get no vector.
    pub min_count: usize,
    /// Negative samples per positive pair.
    pub negative: usize,
    /// Passes over the walk corpus.
    pub epochs: usize,
    /// Tokens processed between learning-rate recalculations.
    pub batch_words: usize,
    /// Initial learning rate, decayed linearly to `min_lr`.
    pub initial_lr: f32,
    pub min_lr: f32,
    /// Worker threads. Determinism requires exactly 1.
    pub workers: usize,
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dimensions: 128,
            window: 5,
            min_count: 1,
            negative: 5,
            epochs: 1,
            batch_words: 10_000,
            initial_lr: 0.025,
            min_lr: 1e-4,
            workers: 1,
            seed: None,
        }
    }
}

/// Weight matrix shared across training workers.
///
/// Cells are plain f32 behind per-cell `UnsafeCell`s. In multi-worker mode
/// concurrent read-modify-write of the same cell can lose an update; that
/// is the Hogwild contract callers opt into via `workers > 1`.
struct SharedMatrix {
    cells: Vec<UnsafeCell<f32>>,
}

// SAFETY: concurrent access is intentional (Hogwild); every access goes
// through `get`/`add` on single cells, no references to cell contents are
// ever held across operations.
unsafe impl Sync for SharedMatrix {}

impl SharedMatrix {
    fn new(values: Vec<f32>) -> Self {
        Self {
            cells: values.into_iter().map(UnsafeCell::new).collect(),
        }
    }

    #[inline]
    fn get(&self, i: usize) -> f32 {
        // SAFETY: single-cell read; see the Sync impl note.
        unsafe { *self.cells[i].get() }
    }

    #[inline]
    fn add(&self, i: usize, delta: f32) {
        // SAFETY: single-cell read-modify-write; see the Sync impl note.
        unsafe { *self.cells[i].get() += delta }
    }

    fn into_values(self) -> Vec<f32> {
        self.cells.into_iter().map(UnsafeCell::into_inner).collect()
    }
}

/// Trains node embeddings over a walk corpus.
///
/// Nodes below `min_count` are excluded from the vocabulary and the
/// returned mapping; the prioritizer must handle their absence.
pub fn train_embeddings(
    graph: &KnowledgeGraph,
    walks: &[Vec<NodeId>],
    config: &TrainConfig,
) -> Result<NodeEmbeddings, PrioError> {
    if graph.is_empty() {
        return Err(PrioError::EmptyGraph);
    }
    if config.dimensions == 0 {
        return Err(PrioError::Model("embedding dimensionality must be > 0".into()));
    }

    // Vocabulary: occurrence counts over the corpus, pruned by min_count,
    // ordered by node id for determinism.
    let mut counts = vec![0u64; graph.node_count()];
    for walk in walks {
        for node in walk {
            counts[node.index()] += 1;
        }
    }
    let vocab: Vec<NodeId> = (0..graph.node_count() as u32)
        .map(NodeId)
        .filter(|n| counts[n.index()] >= config.min_count as u64)
        .collect();
    if vocab.is_empty() {
        warn!("walk corpus produced an empty vocabulary");
        return NodeEmbeddings::from_parts(config.dimensions, Vec::new(), Vec::new(), Vec::new());
    }
    let mut node_to_vocab = vec![u32::MAX; graph.node_count()];
    for (row, node) in vocab.iter().enumerate() {
        node_to_vocab[node.index()] = row as u32;
    }

    // Negative sampling from the smoothed unigram distribution.
    let neg_weights: Vec<f64> = vocab
        .iter()
        .map(|n| (counts[n.index()] as f64).powf(0.75))
        .collect();
    let neg_table = AliasTable::new(&neg_weights);

    // Sentences in vocabulary space, out-of-vocabulary tokens dropped.
    let sentences: Vec<Vec<u32>> = walks
        .iter()
        .map(|walk| {
            walk.iter()
                .map(|n| node_to_vocab[n.index()])
                .filter(|&row| row != u32::MAX)
                .collect()
        })
        .filter(|s: &Vec<u32>| !s.is_empty())
        .collect();
    let tokens_per_epoch: usize = sentences.iter().map(Vec::len).sum();
    let total_tokens = tokens_per_epoch * config.epochs.max(1);

    info!(
        vocab = vocab.len(),
        sentences = sentences.len(),
        tokens = total_tokens,
        dimensions = config.dimensions,
        workers = config.workers,
        "training skip-gram embedding"
    );

    let dim = config.dimensions;
    let mut init_rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_rng(&mut rand::rng()),
    };
    let bound = 0.5 / dim as f32;
    let target_init: Vec<f32> = (0..vocab.len() * dim)
        .map(|_| init_rng.random::<f32>() * 2.0 * bound - bound)
        .collect();
    let target = SharedMatrix::new(target_init);
    let context = SharedMatrix::new(vec![0.0f32; vocab.len() * dim]);

    let progress = AtomicUsize::new(0);
    let trainer = Trainer {
        config,
        dim,
        neg_table: &neg_table,
        target: &target,
        context: &context,
        progress: &progress,
        total_tokens,
    };

    let workers = config.workers.max(1);
    let base_seed = config.seed.unwrap_or_else(|| rand::rng().random());
    for epoch in 0..config.epochs.max(1) {
        if workers == 1 {
            let mut rng = ChaCha8Rng::seed_from_u64(stream_seed(base_seed, epoch, 0));
            trainer.train_chunk(&sentences, &mut rng);
        } else {
            let chunk_size = sentences.len().div_ceil(workers).max(1);
            std::thread::scope(|scope| {
                for (worker, chunk) in sentences.chunks(chunk_size).enumerate() {
                    let trainer = &trainer;
                    scope.spawn(move || {
                        let mut rng =
                            ChaCha8Rng::seed_from_u64(stream_seed(base_seed, epoch, worker + 1));
                        trainer.train_chunk(chunk, &mut rng);
                    });
                }
            });
        }
    }

    // Only the target matrix becomes the model; context vectors are
    // training scaffolding.
    drop(context);
    let vectors = target.into_values();
    let identifiers: Vec<String> = vocab
        .iter()
        .map(|n| graph.node(*n).map(|d| d.identifier.to_string()))
        .collect::<Option<_>>()
        .ok_or_else(|| PrioError::Model("walk corpus references nodes outside the graph".into()))?;
    let kinds = vocab
        .iter()
        .map(|n| graph.node(*n).map(|d| d.kind))
        .collect::<Option<_>>()
        .ok_or_else(|| PrioError::Model("walk corpus references nodes outside the graph".into()))?;
    NodeEmbeddings::from_parts(dim, identifiers, kinds, vectors)
}

/// Read-only view of everything a training worker needs.
struct Trainer<'a> {
    config: &'a TrainConfig,
    dim: usize,
    neg_table: &'a AliasTable,
    target: &'a SharedMatrix,
    context: &'a SharedMatrix,
    progress: &'a AtomicUsize,
    total_tokens: usize,
}

impl Trainer<'_> {
    fn train_chunk<R: Rng>(&self, sentences: &[Vec<u32>], rng: &mut R) {
        let window = self.config.window.max(1);
        let mut lr = self.learning_rate();
        let mut since_update = 0usize;

        for sentence in sentences {
            for (pos, &center) in sentence.iter().enumerate() {
                let actual_window = rng.random_range(1..=window);
                let start = pos.saturating_sub(actual_window);
                let end = (pos + actual_window + 1).min(sentence.len());
                for ctx_pos in start..end {
                    if ctx_pos == pos {
                        continue;
                    }
                    let ctx = sentence[ctx_pos] as usize;
                    self.train_pair(center as usize, ctx, 1.0, lr);
                    for _ in 0..self.config.negative {
                        let neg = self.neg_table.sample(rng);
                        if neg != ctx {
                            self.train_pair(center as usize, neg, 0.0, lr);
                        }
                    }
                }

                since_update += 1;
                if since_update >= self.config.batch_words.max(1) {
                    self.progress.fetch_add(since_update, Ordering::Relaxed);
                    since_update = 0;
                    lr = self.learning_rate();
                }
            }
        }
        self.progress.fetch_add(since_update, Ordering::Relaxed);
    }

    /// One SGD step on a (center, context-or-negative) pair.
    fn train_pair(&self, center: usize, other: usize, label: f32, lr: f32) {
        let t_off = center * self.dim;
        let c_off = other * self.dim;

        let mut dot = 0.0f32;
        for i in 0..self.dim {
            dot += self.target.get(t_off + i) * self.context.get(c_off + i);
        }
        let sigmoid = 1.0 / (1.0 + (-dot).exp());
        let g = (label - sigmoid) * lr;

        for i in 0..self.dim {
            let t = self.target.get(t_off + i);
            let c = self.context.get(c_off + i);
            self.target.add(t_off + i, g * c);
            self.context.add(c_off + i, g * t);
        }
    }

    /// Linear decay from `initial_lr` to `min_lr` over the full corpus.
    fn learning_rate(&self) -> f32 {
        if self.total_tokens == 0 {
            return self.config.initial_lr;
        }
        let done = self.progress.load(Ordering::Relaxed) as f32 / self.total_tokens as f32;
        (self.config.initial_lr - (self.config.initial_lr - self.config.min_lr) * done)
            .max(self.config.min_lr)
    }
}

/// Distinct ChaCha stream per (epoch, worker).
fn stream_seed(seed: u64, epoch: usize, worker: usize) -> u64 {
    let mut z = seed
        .wrapping_add((epoch as u64) << 32 | worker as u64)
        .wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::GraphBuilder;
    use crate::engine::walks::{generate_walks, WalkConfig};

    fn star_graph() -> KnowledgeGraph {
        let mut b = GraphBuilder::new();
        let g1 = b.add_gene("HGNC:1", "AAA").unwrap();
        let g2 = b.add_gene("HGNC:2", "BBB").unwrap();
        let p1 = b.add_phenotype("HP:0000001", None).unwrap();
        let p2 = b.add_phenotype("HP:0000002", None).unwrap();
        let p3 = b.add_phenotype("HP:0000003", None).unwrap();
        b.add_association(g1, p1, 1.0).unwrap();
        b.add_association(g1, p2, 1.0).unwrap();
        b.add_association(g2, p3, 1.0).unwrap();
        b.add_ontology_edge(p2, p1, 1.0).unwrap();
        b.add_ontology_edge(p3, p1, 1.0).unwrap();
        b.build()
    }

    fn small_config() -> TrainConfig {
        TrainConfig {
            dimensions: 16,
            window: 3,
            negative: 3,
            epochs: 2,
            seed: Some(9),
            ..TrainConfig::default()
        }
    }

    fn corpus(graph: &KnowledgeGraph) -> Vec<Vec<NodeId>> {
        let config = WalkConfig {
            num_walks: 10,
            walk_length: 15,
            seed: Some(5),
            ..WalkConfig::default()
        };
        generate_walks(graph, &config).unwrap()
    }

    #[test]
    fn every_walked_node_gets_a_vector_of_requested_dimension() {
        let graph = star_graph();
        let emb = train_embeddings(&graph, &corpus(&graph), &small_config()).unwrap();
        assert_eq!(emb.len(), graph.node_count());
        for node in graph.nodes() {
            let v = emb.get(&node.identifier).expect("node was walked");
            assert_eq!(v.len(), 16);
        }
    }

    #[test]
    fn min_count_drops_rare_nodes() {
        let graph = star_graph();
        let walks = corpus(&graph);
        let config = TrainConfig {
            min_count: usize::MAX,
            ..small_config()
        };
        let emb = train_embeddings(&graph, &walks, &config).unwrap();
        assert_eq!(emb.len(), 0);
    }

    #[test]
    fn seeded_single_worker_training_is_bit_identical() {
        let graph = star_graph();
        let walks = corpus(&graph);
        let config = small_config();
        let a = train_embeddings(&graph, &walks, &config).unwrap();
        let b = train_embeddings(&graph, &walks, &config).unwrap();
        for node in graph.nodes() {
            assert_eq!(
                a.get(&node.identifier).unwrap(),
                b.get(&node.identifier).unwrap(),
                "vectors for '{}' differ between identical runs",
                node.identifier
            );
        }
    }

    #[test]
    fn training_moves_cooccurring_nodes_together() {
        // G1 shares walks with P1/P2; G2 lives on the other side of the
        // star. After training, G1 should be closer to P1 than G2 is.
        let graph = star_graph();
        let walks = corpus(&graph);
        let config = TrainConfig {
            epochs: 8,
            ..small_config()
        };
        let emb = train_embeddings(&graph, &walks, &config).unwrap();
        let sim = |a: &str, b: &str| {
            crate::engine::embedding::cosine(emb.get(a).unwrap(), emb.get(b).unwrap())
        };
        assert!(sim("HGNC:1", "HP:0000002") > sim("HGNC:2", "HP:0000002"));
    }

    #[test]
    fn multi_worker_training_produces_usable_vectors() {
        let graph = star_graph();
        let walks = corpus(&graph);
        let config = TrainConfig {
            workers: 4,
            ..small_config()
        };
        let emb = train_embeddings(&graph, &walks, &config).unwrap();
        assert_eq!(emb.len(), graph.node_count());
        for node in graph.nodes() {
            let v = emb.get(&node.identifier).unwrap();
            assert!(v.iter().all(|x| x.is_finite()));
        }
    }

    #[test]
    fn empty_graph_is_an_error() {
        let graph = GraphBuilder::new().build();
        let err = train_embeddings(&graph, &[], &small_config()).unwrap_err();
        assert!(matches!(err, PrioError::EmptyGraph));
    }
}
