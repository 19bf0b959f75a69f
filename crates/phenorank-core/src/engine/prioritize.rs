//! Gene prioritization against a query phenotype set.
//!
//! The query vector is the centroid of the embedded query terms; every
//! candidate gene is scored by cosine similarity to it. Ranking is total
//! and deterministic: descending score, ties broken by gene identifier
//! ascending.

use tracing::{debug, warn};

use crate::engine::embedding::{cosine, NodeEmbeddings};
use crate::engine::errors::PrioError;
use crate::engine::graph::NodeKind;

/// A prioritization request.
#[derive(Debug, Clone, Default)]
pub struct RankQuery {
    /// Phenotype term identifiers describing the case.
    pub phenotypes: Vec<String>,
    /// Gene removed from the candidate pool entirely (leave-one-out
    /// evaluation); it can never appear in the output.
    pub exclude_gene: Option<String>,
    /// When set, only these genes are scored.
    pub candidates: Option<Vec<String>>,
}

/// One scored gene.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedGene {
    pub identifier: String,
    pub score: f32,
}

/// Result of a prioritization query.
#[derive(Debug, Clone)]
pub struct Ranking {
    /// Query terms that resolved to an embedded phenotype node, in query
    /// order.
    pub used_terms: Vec<String>,
    /// Query terms that had no vector and were dropped from the centroid.
    pub dropped_terms: usize,
    /// Genes in rank order (best first).
    pub entries: Vec<RankedGene>,
}

/// Read-only prioritization over a loaded embedding.
///
/// Cheap to construct per query; the underlying embedding is never
/// modified, so one embedding can serve concurrent prioritizers.
pub struct Prioritizer<'a> {
    embeddings: &'a NodeEmbeddings,
}

impl<'a> Prioritizer<'a> {
    pub fn new(embeddings: &'a NodeEmbeddings) -> Self {
        Self { embeddings }
    }

    /// Ranks candidate genes for the query.
    ///
    /// Fails with [`PrioError::NoKnownPhenotypes`] only when *no* query
    /// term resolves; otherwise unresolved terms are dropped and counted.
    /// An empty candidate pool (e.g. everything excluded) yields an empty
    /// ranking, not an error.
    pub fn rank(&self, query: &RankQuery) -> Result<Ranking, PrioError> {
        let (centroid, used_terms, dropped_terms) = self.centroid(&query.phenotypes)?;

        let mut entries: Vec<RankedGene> = match &query.candidates {
            Some(restriction) => restriction
                .iter()
                .filter_map(|identifier| {
                    let row = self.embeddings.row(identifier)?;
                    (self.embeddings.kind(row) == NodeKind::Gene).then(|| RankedGene {
                        identifier: self.embeddings.identifier(row).to_string(),
                        score: cosine(&centroid, self.embeddings.vector(row)),
                    })
                })
                .collect(),
            None => self
                .embeddings
                .gene_rows()
                .map(|row| RankedGene {
                    identifier: self.embeddings.identifier(row).to_string(),
                    score: cosine(&centroid, self.embeddings.vector(row)),
                })
                .collect(),
        };

        if let Some(excluded) = &query.exclude_gene {
            entries.retain(|e| &e.identifier != excluded);
        }

        entries.sort_unstable_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });

        debug!(
            used = used_terms.len(),
            dropped = dropped_terms,
            candidates = entries.len(),
            "ranked candidate genes"
        );
        Ok(Ranking {
            used_terms,
            dropped_terms,
            entries,
        })
    }

    /// Mean of the embedded query-term vectors.
    fn centroid(&self, phenotypes: &[String]) -> Result<(Vec<f32>, Vec<String>, usize), PrioError> {
        let mut centroid = vec![0.0f32; self.embeddings.dim()];
        let mut used_terms = Vec::new();
        let mut dropped = 0usize;
        for term in phenotypes {
            let vector = self
                .embeddings
                .row(term)
                .filter(|&row| self.embeddings.kind(row) == NodeKind::Phenotype)
                .map(|row| self.embeddings.vector(row));
            match vector {
                Some(v) => {
                    for (acc, x) in centroid.iter_mut().zip(v) {
                        *acc += x;
                    }
                    used_terms.push(term.clone());
                }
                None => {
                    warn!(term = %term, "query term has no embedding, dropping");
                    dropped += 1;
                }
            }
        }
        if used_terms.is_empty() {
            return Err(PrioError::NoKnownPhenotypes);
        }
        let n = used_terms.len() as f32;
        for x in &mut centroid {
            *x /= n;
        }
        Ok((centroid, used_terms, dropped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::embedding::NodeEmbeddings;
    use crate::engine::graph::NodeKind;

    /// Two genes on orthogonal axes, two phenotypes aligned with them.
    fn model() -> NodeEmbeddings {
        NodeEmbeddings::from_parts(
            2,
            vec![
                "HGNC:1".into(),
                "HGNC:2".into(),
                "HP:0000001".into(),
                "HP:0000002".into(),
            ],
            vec![
                NodeKind::Gene,
                NodeKind::Gene,
                NodeKind::Phenotype,
                NodeKind::Phenotype,
            ],
            vec![1.0, 0.0, 0.0, 1.0, 0.9, 0.1, 0.1, 0.9],
        )
        .unwrap()
    }

    fn query(terms: &[&str]) -> RankQuery {
        RankQuery {
            phenotypes: terms.iter().map(|s| s.to_string()).collect(),
            ..RankQuery::default()
        }
    }

    #[test]
    fn associated_gene_ranks_first() {
        let emb = model();
        let ranking = Prioritizer::new(&emb).rank(&query(&["HP:0000001"])).unwrap();
        assert_eq!(ranking.entries[0].identifier, "HGNC:1");
        assert_eq!(ranking.entries[1].identifier, "HGNC:2");
        assert!(ranking.entries[0].score > ranking.entries[1].score);
    }

    #[test]
    fn unknown_terms_are_dropped_not_fatal() {
        let emb = model();
        let ranking = Prioritizer::new(&emb)
            .rank(&query(&["HP:0000001", "HP:9999999"]))
            .unwrap();
        assert_eq!(ranking.used_terms, vec!["HP:0000001".to_string()]);
        assert_eq!(ranking.dropped_terms, 1);
    }

    #[test]
    fn all_unknown_terms_is_an_error() {
        let emb = model();
        let err = Prioritizer::new(&emb)
            .rank(&query(&["HP:9999999"]))
            .unwrap_err();
        assert!(matches!(err, PrioError::NoKnownPhenotypes));
    }

    #[test]
    fn gene_identifiers_do_not_count_as_phenotype_terms() {
        let emb = model();
        let err = Prioritizer::new(&emb).rank(&query(&["HGNC:1"])).unwrap_err();
        assert!(matches!(err, PrioError::NoKnownPhenotypes));
    }

    #[test]
    fn excluded_gene_never_appears() {
        let emb = model();
        let mut q = query(&["HP:0000001"]);
        q.exclude_gene = Some("HGNC:1".into());
        let ranking = Prioritizer::new(&emb).rank(&q).unwrap();
        assert!(ranking.entries.iter().all(|e| e.identifier != "HGNC:1"));
    }

    #[test]
    fn empty_pool_after_exclusion_is_not_an_error() {
        let emb = model();
        let mut q = query(&["HP:0000001"]);
        q.candidates = Some(vec!["HGNC:1".into()]);
        q.exclude_gene = Some("HGNC:1".into());
        let ranking = Prioritizer::new(&emb).rank(&q).unwrap();
        assert!(ranking.entries.is_empty());
    }

    #[test]
    fn restriction_list_limits_candidates() {
        let emb = model();
        let mut q = query(&["HP:0000001"]);
        q.candidates = Some(vec!["HGNC:2".into(), "HP:0000001".into()]);
        let ranking = Prioritizer::new(&emb).rank(&q).unwrap();
        assert_eq!(ranking.entries.len(), 1);
        assert_eq!(ranking.entries[0].identifier, "HGNC:2");
    }

    #[test]
    fn ranking_is_stable_across_repeated_queries() {
        let emb = model();
        let prio = Prioritizer::new(&emb);
        let q = query(&["HP:0000001", "HP:0000002"]);
        let a = prio.rank(&q).unwrap();
        let b = prio.rank(&q).unwrap();
        assert_eq!(a.entries, b.entries);
    }

    #[test]
    fn ties_break_by_identifier_ascending() {
        // Both genes identical vectors: scores tie exactly.
        let emb = NodeEmbeddings::from_parts(
            2,
            vec!["HGNC:9".into(), "HGNC:10".into(), "HP:0000001".into()],
            vec![NodeKind::Gene, NodeKind::Gene, NodeKind::Phenotype],
            vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0],
        )
        .unwrap();
        let ranking = Prioritizer::new(&emb).rank(&query(&["HP:0000001"])).unwrap();
        assert_eq!(ranking.entries[0].identifier, "HGNC:10");
        assert_eq!(ranking.entries[1].identifier, "HGNC:9");
    }
}
