//! Rank evaluation over held-out gene–phenotype links.
//!
//! For each held-out link the true gene's rank under plain prioritization
//! is recorded, and the report gives the percentage of links whose gene
//! landed within the top {1, 5, 10, 50, 100}. Links with no resolvable
//! phenotype terms are skipped and counted. This is measurement only; any
//! search over hyperparameters lives outside this crate.

use tracing::{info, warn};

use crate::engine::embedding::NodeEmbeddings;
use crate::engine::errors::PrioError;
use crate::engine::prioritize::{Prioritizer, RankQuery};

/// Rank buckets reported by [`evaluate_links`].
pub const TOP_K_BUCKETS: [usize; 5] = [1, 5, 10, 50, 100];

/// One held-out case: the causal gene and the observed phenotype terms.
#[derive(Debug, Clone)]
pub struct HeldOutLink {
    pub gene: String,
    pub phenotypes: Vec<String>,
}

/// Evaluation summary.
#[derive(Debug, Clone)]
pub struct TopKReport {
    /// Links actually evaluated.
    pub total: usize,
    /// Links skipped because no phenotype term resolved.
    pub skipped: usize,
    /// `(k, percentage of evaluated links ranked within top k)`, one entry
    /// per value in [`TOP_K_BUCKETS`].
    pub hits: Vec<(usize, f64)>,
}

/// Ranks every held-out link's phenotype set and scores where the true
/// gene landed.
///
/// A true gene missing from the ranking (no vector) counts as unranked and
/// hits no bucket.
pub fn evaluate_links(embeddings: &NodeEmbeddings, links: &[HeldOutLink]) -> TopKReport {
    let prioritizer = Prioritizer::new(embeddings);
    let mut total = 0usize;
    let mut skipped = 0usize;
    let mut hit_counts = [0usize; TOP_K_BUCKETS.len()];

    for link in links {
        let query = RankQuery {
            phenotypes: link.phenotypes.clone(),
            ..RankQuery::default()
        };
        let ranking = match prioritizer.rank(&query) {
            Ok(r) => r,
            Err(PrioError::NoKnownPhenotypes) => {
                warn!(gene = %link.gene, "no resolvable phenotype terms, skipping link");
                skipped += 1;
                continue;
            }
            // rank() has no other failure mode today; treat anything new
            // as a skipped link rather than aborting the whole sweep.
            Err(err) => {
                warn!(gene = %link.gene, error = %err, "prioritization failed, skipping link");
                skipped += 1;
                continue;
            }
        };

        total += 1;
        // A true gene with no row in the ranking can never be a hit.
        let rank = ranking
            .entries
            .iter()
            .position(|e| e.identifier == link.gene)
            .map(|pos| pos + 1)
            .unwrap_or(usize::MAX);
        for (slot, &k) in TOP_K_BUCKETS.iter().enumerate() {
            if rank <= k {
                hit_counts[slot] += 1;
            }
        }
    }

    let hits = TOP_K_BUCKETS
        .iter()
        .zip(hit_counts)
        .map(|(&k, count)| {
            let pct = if total > 0 {
                100.0 * count as f64 / total as f64
            } else {
                0.0
            };
            (k, pct)
        })
        .collect();

    info!(total, skipped, "rank evaluation finished");
    TopKReport {
        total,
        skipped,
        hits,
    }
}
