//! Error types for graph construction, training, and prioritization.

use thiserror::Error;

/// Errors that can occur while building the knowledge graph, training the
/// embedding, or answering prioritization queries.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// Construction-time failures (`DataIntegrity`, `EmptyGraph`, `Io`, `Parse`)
/// abort the pipeline. `NoKnownPhenotypes` is per-query and recoverable: it
/// is surfaced to the caller without affecting the loaded model or other
/// queries.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PrioError {
    /// Malformed or duplicate source records (e.g. two nomenclature rows
    /// with the same gene id). Fatal for the build.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// The graph has no usable nodes; walks and training are impossible.
    #[error("graph has no nodes")]
    EmptyGraph,

    /// None of the query phenotype terms resolve to an embedded node.
    #[error("no known phenotype terms in query")]
    NoKnownPhenotypes,

    /// I/O failure with the operation that triggered it.
    #[error("io error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed input file (bad JSONL line, unparseable ontology stanza).
    #[error("parse error: {0}")]
    Parse(String),

    /// Persisted model is malformed or inconsistent (shape mismatch,
    /// duplicate identifiers, failed serialization).
    #[error("model error: {0}")]
    Model(String),
}

impl PrioError {
    /// Wraps an `std::io::Error` with a short description of the operation.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
