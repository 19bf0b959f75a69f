//! Source-table ingestion.
//!
//! This module provides:
//! - **genes**: gene nomenclature table and alias resolution
//! - **links**: gene-to-phenotype association records (JSONL and TSV)
//! - **ontology**: minimal OBO loading with alternate-id normalization

pub mod genes;
pub mod links;
pub mod ontology;
