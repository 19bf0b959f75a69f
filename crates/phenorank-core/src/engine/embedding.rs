//! Immutable node-to-vector mapping produced by training.
//!
//! The mapping is an arena: one flat f32 buffer of row-major vectors plus
//! parallel identifier and kind arrays, with a hash index from identifier
//! to row. Nothing is mutable after construction, so the whole structure is
//! freely shared across concurrent prioritization queries.

use rustc_hash::FxHashMap;

use crate::engine::errors::PrioError;
use crate::engine::graph::NodeKind;

/// The trained embedding: fixed-dimension vector per embedded node.
///
/// Nodes dropped by `min_count` simply have no row here; callers must treat
/// absence as "no vector", not as an error.
#[derive(Debug, Clone)]
pub struct NodeEmbeddings {
    dim: usize,
    identifiers: Vec<String>,
    kinds: Vec<NodeKind>,
    /// Row-major, `identifiers.len() * dim` values.
    vectors: Vec<f32>,
    index: FxHashMap<String, usize>,
}

impl NodeEmbeddings {
    /// Assembles an embedding from its parts, validating shapes and
    /// identifier uniqueness.
    pub fn from_parts(
        dim: usize,
        identifiers: Vec<String>,
        kinds: Vec<NodeKind>,
        vectors: Vec<f32>,
    ) -> Result<Self, PrioError> {
        if kinds.len() != identifiers.len() {
            return Err(PrioError::Model(format!(
                "kind array length {} does not match {} identifiers",
                kinds.len(),
                identifiers.len()
            )));
        }
        if vectors.len() != identifiers.len() * dim {
            return Err(PrioError::Model(format!(
                "vector buffer holds {} values, expected {} rows x {} dims",
                vectors.len(),
                identifiers.len(),
                dim
            )));
        }
        let mut index = FxHashMap::default();
        for (row, identifier) in identifiers.iter().enumerate() {
            if index.insert(identifier.clone(), row).is_some() {
                return Err(PrioError::Model(format!(
                    "duplicate identifier '{}' in embedding",
                    identifier
                )));
            }
        }
        Ok(Self {
            dim,
            identifiers,
            kinds,
            vectors,
            index,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of embedded nodes.
    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }

    /// Vector for an identifier, if it was embedded.
    pub fn get(&self, identifier: &str) -> Option<&[f32]> {
        self.index.get(identifier).map(|&row| self.vector(row))
    }

    /// Row index for an identifier.
    pub fn row(&self, identifier: &str) -> Option<usize> {
        self.index.get(identifier).copied()
    }

    /// Vector by row index.
    pub fn vector(&self, row: usize) -> &[f32] {
        &self.vectors[row * self.dim..(row + 1) * self.dim]
    }

    pub fn identifier(&self, row: usize) -> &str {
        &self.identifiers[row]
    }

    pub fn kind(&self, row: usize) -> NodeKind {
        self.kinds[row]
    }

    /// Rows holding gene vectors, in row order.
    pub fn gene_rows(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.kinds.len()).filter(|&row| self.kinds[row] == NodeKind::Gene)
    }

    /// Decomposes into `(dim, identifiers, kinds, vectors)` for persistence.
    pub fn into_parts(self) -> (usize, Vec<String>, Vec<NodeKind>, Vec<f32>) {
        (self.dim, self.identifiers, self.kinds, self.vectors)
    }

    /// Borrowing view of the parts, used when saving without consuming.
    pub fn parts(&self) -> (usize, &[String], &[NodeKind], &[f32]) {
        (self.dim, &self.identifiers, &self.kinds, &self.vectors)
    }
}

/// Cosine similarity; 0.0 when either vector has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na <= 0.0 || nb <= 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}
