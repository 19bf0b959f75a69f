//! Gene-to-phenotype association loading.
//!
//! Two source shapes are supported:
//!
//! - JSONL link records (one submission per line: gene id plus its HPO
//!   term list, optionally weighted), and
//! - the tab-separated `genes_to_phenotype` export (one gene/term pair per
//!   row, optional frequency column).
//!
//! Both flatten into [`AssociationRecord`]s carrying the gene reference as
//! written in the source; alias normalization happens during graph
//! assembly, where unresolvable references are counted rather than fatal.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::errors::PrioError;

/// Minimal link record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Submitter
    #[serde(default)]
    pub submitter: Option<String>,
    /// Gene HGNC ID
    pub hgnc_id: String,
    /// Linked HPO terms
    pub hpo_terms: Vec<String>,
}

/// One gene–phenotype pair ready for graph assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationRecord {
    /// Gene reference as written in the source (any catalog alias).
    pub gene: String,
    /// Phenotype term id as written in the source.
    pub phenotype: String,
    /// Evidence weight, when the source carries one.
    pub weight: Option<f64>,
}

/// Loads JSONL link records.
pub fn load_link_records(path: &Path) -> Result<Vec<LinkRecord>, PrioError> {
    info!(path = %path.display(), "loading gene-phenotype links");
    let file = File::open(path)
        .map_err(|e| PrioError::io(format!("opening link file {}", path.display()), e))?;
    let mut records = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| PrioError::io("reading link file", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: LinkRecord = serde_json::from_str(&line).map_err(|e| {
            PrioError::Parse(format!(
                "{}:{}: bad link record: {}",
                path.display(),
                lineno + 1,
                e
            ))
        })?;
        records.push(record);
    }
    info!(links = records.len(), "gene-phenotype links loaded");
    Ok(records)
}

/// Flattens link records into per-pair associations (unweighted).
pub fn flatten_links(links: &[LinkRecord]) -> Vec<AssociationRecord> {
    links
        .iter()
        .flat_map(|link| {
            link.hpo_terms.iter().map(|term| AssociationRecord {
                gene: link.hgnc_id.clone(),
                phenotype: term.clone(),
                weight: None,
            })
        })
        .collect()
}

/// Loads the tab-separated gene-to-phenotype table.
///
/// Expected columns: gene reference, HPO term id, optional frequency
/// weight. A header row naming the first column is skipped.
pub fn load_gene_to_phenotype_tsv(path: &Path) -> Result<Vec<AssociationRecord>, PrioError> {
    info!(path = %path.display(), "loading gene-to-phenotype table");
    let file = File::open(path)
        .map_err(|e| PrioError::io(format!("opening association table {}", path.display()), e))?;
    let mut records = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| PrioError::io("reading association table", e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || (lineno == 0 && trimmed.starts_with("ncbi_gene_id")) {
            continue;
        }
        let mut fields = trimmed.split('\t');
        let (Some(gene), Some(phenotype)) = (fields.next(), fields.next()) else {
            return Err(PrioError::Parse(format!(
                "{}:{}: expected at least two tab-separated columns",
                path.display(),
                lineno + 1
            )));
        };
        let weight = match fields.next().map(str::trim) {
            None | Some("") | Some("-") => None,
            Some(raw) => Some(raw.parse::<f64>().map_err(|_| {
                PrioError::Parse(format!(
                    "{}:{}: bad frequency value '{}'",
                    path.display(),
                    lineno + 1,
                    raw
                ))
            })?),
        };
        records.push(AssociationRecord {
            gene: gene.to_string(),
            phenotype: phenotype.to_string(),
            weight,
        });
    }
    info!(pairs = records.len(), "gene-to-phenotype table loaded");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_expands_term_lists() {
        let links = vec![LinkRecord {
            submitter: Some("HPO".into()),
            hgnc_id: "HGNC:1".into(),
            hpo_terms: vec!["HP:0000001".into(), "HP:0000002".into()],
        }];
        let assocs = flatten_links(&links);
        assert_eq!(assocs.len(), 2);
        assert!(assocs.iter().all(|a| a.gene == "HGNC:1"));
        assert!(assocs.iter().all(|a| a.weight.is_none()));
    }
}
