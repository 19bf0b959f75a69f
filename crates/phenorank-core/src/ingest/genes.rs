//! Gene nomenclature loading and alias resolution.
//!
//! The nomenclature table is JSONL, one [`GeneRecord`] per line. Every
//! record's symbol, NCBI id, and Ensembl id all resolve back to the primary
//! id, so association files may reference genes by whichever identifier
//! their source uses.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::errors::PrioError;

/// Mapping between gene IDs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneRecord {
    pub symbol: String,
    pub hgnc_id: String,
    #[serde(default)]
    pub ncbi_gene_id: Option<String>,
    #[serde(default)]
    pub ensembl_gene_id: Option<String>,
}

/// Gene nomenclature table with any-alias lookup.
#[derive(Debug, Clone, Default)]
pub struct GeneCatalog {
    records: Vec<GeneRecord>,
    by_primary: FxHashMap<String, usize>,
    by_alias: FxHashMap<String, usize>,
}

impl GeneCatalog {
    /// Builds a catalog, rejecting duplicate primary ids.
    pub fn from_records(records: Vec<GeneRecord>) -> Result<Self, PrioError> {
        let mut by_primary = FxHashMap::default();
        let mut by_alias = FxHashMap::default();
        for (i, record) in records.iter().enumerate() {
            if by_primary.insert(record.hgnc_id.clone(), i).is_some() {
                return Err(PrioError::DataIntegrity(format!(
                    "duplicate gene id '{}' in nomenclature table",
                    record.hgnc_id
                )));
            }
            // First writer wins for ambiguous aliases; the primary id always
            // resolves to its own record below.
            by_alias.entry(record.symbol.clone()).or_insert(i);
            if let Some(ncbi) = &record.ncbi_gene_id {
                by_alias.entry(ncbi.clone()).or_insert(i);
            }
            if let Some(ensembl) = &record.ensembl_gene_id {
                by_alias.entry(ensembl.clone()).or_insert(i);
            }
        }
        for (id, &i) in &by_primary {
            by_alias.insert(id.clone(), i);
        }
        Ok(Self {
            records,
            by_primary,
            by_alias,
        })
    }

    /// Resolves any known alias (primary id, symbol, NCBI, Ensembl).
    pub fn resolve(&self, reference: &str) -> Option<&GeneRecord> {
        self.by_alias.get(reference).map(|&i| &self.records[i])
    }

    /// Resolves only the primary id.
    pub fn get(&self, hgnc_id: &str) -> Option<&GeneRecord> {
        self.by_primary.get(hgnc_id).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[GeneRecord] {
        &self.records
    }
}

/// Loads the JSONL nomenclature table.
pub fn load_gene_catalog(path: &Path) -> Result<GeneCatalog, PrioError> {
    info!(path = %path.display(), "loading gene nomenclature");
    let file = File::open(path)
        .map_err(|e| PrioError::io(format!("opening gene table {}", path.display()), e))?;
    let mut records = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| PrioError::io("reading gene table", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: GeneRecord = serde_json::from_str(&line).map_err(|e| {
            PrioError::Parse(format!(
                "{}:{}: bad gene record: {}",
                path.display(),
                lineno + 1,
                e
            ))
        })?;
        records.push(record);
    }
    info!(genes = records.len(), "gene nomenclature loaded");
    GeneCatalog::from_records(records)
}
