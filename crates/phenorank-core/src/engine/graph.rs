//! # Gene–Phenotype Knowledge Graph
//!
//! This module implements the heterogeneous graph that the embedding is
//! trained on: gene nodes, phenotype-term nodes, weighted association edges
//! between the two, and hierarchy edges between phenotype terms.
//!
//! ## Key Components
//!
//! - **GraphBuilder**: Mutable accumulation of nodes and edges with
//!   validation (unique identifiers, existing endpoints, no self-loops)
//!
//! - **KnowledgeGraph**: Immutable compressed-sparse-row adjacency built
//!   once per training run; per-node neighbor slices are sorted by node id
//!   for deterministic iteration and O(log d) membership tests
//!
//! - **BuildReport**: Counts of what was kept, merged, and skipped during
//!   assembly from source tables
//!
//! ## Design
//!
//! - Duplicate associations between the same gene and phenotype collapse to
//!   the maximum supplied weight
//! - Associations referencing genes or phenotype terms that cannot be
//!   resolved are skipped and counted, never fatal
//! - Node storage is contiguous; `NodeId` doubles as the index into it

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::errors::PrioError;
use crate::ingest::genes::GeneCatalog;
use crate::ingest::links::AssociationRecord;
use crate::ingest::ontology::Ontology;

/// A unique identifier for a node in the knowledge graph.
///
/// NodeId implements Ord/PartialOrd for stable, deterministic iteration.
/// Uses u32 internally; the value is also the index into node storage.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Whether a node represents a gene or a phenotype term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Gene,
    Phenotype,
}

/// A node in the knowledge graph.
///
/// Immutable after the graph is built. `identifier` is the stable external
/// id (e.g. `HGNC:11998`, `HP:0001250`); `label` is the human-readable
/// symbol or term name when the source provided one.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Using Arc<str> for cheap cloning (reference count increment, not allocation)
    pub identifier: Arc<str>,
    pub label: Option<Arc<str>>,
}

/// Edge-weight configuration for graph assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Weight of a gene–phenotype association edge when the source record
    /// carries no evidence weight of its own.
    pub association_weight: f64,
    /// Weight of every phenotype parent–child hierarchy edge. Held separate
    /// from `association_weight` so hierarchy traversal can be re-weighted
    /// without touching association ingestion.
    pub ontology_weight: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            association_weight: 1.0,
            ontology_weight: 1.0,
        }
    }
}

/// Counts reported by graph assembly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildReport {
    pub gene_nodes: usize,
    pub phenotype_nodes: usize,
    pub association_edges: usize,
    pub ontology_edges: usize,
    /// Associations whose gene reference did not resolve in the catalog.
    pub skipped_unknown_genes: usize,
    /// Associations whose phenotype term was absent from the ontology.
    pub skipped_unknown_phenotypes: usize,
    /// Hierarchy records that would have produced a self-loop.
    pub skipped_self_loops: usize,
    /// Duplicate associations collapsed by the max-weight merge.
    pub merged_duplicates: usize,
}

/// Accumulates nodes and edges, then freezes them into a [`KnowledgeGraph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<NodeData>,
    index: FxHashMap<Arc<str>, NodeId>,
    /// Undirected edges keyed by (low, high) endpoint; value is the weight.
    edges: FxHashMap<(NodeId, NodeId), f64>,
    merged_duplicates: usize,
    skipped_self_loops: usize,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a gene node. Fails if the identifier is already taken.
    pub fn add_gene(&mut self, identifier: &str, symbol: &str) -> Result<NodeId, PrioError> {
        self.add_node(NodeKind::Gene, identifier, Some(symbol))
    }

    /// Registers a phenotype-term node. Fails if the identifier is already taken.
    pub fn add_phenotype(
        &mut self,
        identifier: &str,
        label: Option<&str>,
    ) -> Result<NodeId, PrioError> {
        self.add_node(NodeKind::Phenotype, identifier, label)
    }

    fn add_node(
        &mut self,
        kind: NodeKind,
        identifier: &str,
        label: Option<&str>,
    ) -> Result<NodeId, PrioError> {
        if self.index.contains_key(identifier) {
            return Err(PrioError::DataIntegrity(format!(
                "duplicate node identifier '{}'",
                identifier
            )));
        }
        let id = NodeId(self.nodes.len() as u32);
        let identifier: Arc<str> = Arc::from(identifier);
        self.index.insert(identifier.clone(), id);
        self.nodes.push(NodeData {
            id,
            kind,
            identifier,
            label: label.map(Arc::from),
        });
        Ok(id)
    }

    /// Looks up a registered node by identifier.
    pub fn node_id(&self, identifier: &str) -> Option<NodeId> {
        self.index.get(identifier).copied()
    }

    /// Adds a weighted gene–phenotype association edge.
    ///
    /// Duplicate associations collapse to the maximum weight seen.
    pub fn add_association(
        &mut self,
        gene: NodeId,
        phenotype: NodeId,
        weight: f64,
    ) -> Result<(), PrioError> {
        self.check_endpoint(gene, NodeKind::Gene)?;
        self.check_endpoint(phenotype, NodeKind::Phenotype)?;
        if !(weight.is_finite() && weight > 0.0) {
            return Err(PrioError::DataIntegrity(format!(
                "association weight must be positive and finite, got {}",
                weight
            )));
        }
        self.insert_edge(gene, phenotype, weight);
        Ok(())
    }

    /// Adds a phenotype hierarchy edge between a term and its parent.
    ///
    /// A record naming the same term on both sides is skipped and counted;
    /// the finished graph never contains self-loops.
    pub fn add_ontology_edge(
        &mut self,
        child: NodeId,
        parent: NodeId,
        weight: f64,
    ) -> Result<(), PrioError> {
        self.check_endpoint(child, NodeKind::Phenotype)?;
        self.check_endpoint(parent, NodeKind::Phenotype)?;
        if child == parent {
            self.skipped_self_loops += 1;
            return Ok(());
        }
        self.insert_edge(child, parent, weight);
        Ok(())
    }

    fn insert_edge(&mut self, a: NodeId, b: NodeId, weight: f64) {
        let key = if a <= b { (a, b) } else { (b, a) };
        match self.edges.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                // Repeated curation of the same link is corroboration, not
                // additive evidence: keep the strongest recorded weight.
                let merged = e.get().max(weight);
                e.insert(merged);
                self.merged_duplicates += 1;
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(weight);
            }
        }
    }

    fn check_endpoint(&self, id: NodeId, expected: NodeKind) -> Result<(), PrioError> {
        match self.nodes.get(id.index()) {
            Some(node) if node.kind == expected => Ok(()),
            Some(node) => Err(PrioError::DataIntegrity(format!(
                "node '{}' has the wrong kind for this edge",
                node.identifier
            ))),
            None => Err(PrioError::DataIntegrity(format!(
                "edge endpoint {:?} does not reference a registered node",
                id
            ))),
        }
    }

    /// Number of registered nodes so far.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Freezes the accumulated nodes and edges into a CSR adjacency.
    pub fn build(self) -> KnowledgeGraph {
        let n = self.nodes.len();
        let mut degree = vec![0usize; n];
        for (&(a, b), _) in &self.edges {
            degree[a.index()] += 1;
            degree[b.index()] += 1;
        }

        let mut offsets = Vec::with_capacity(n + 1);
        let mut acc = 0usize;
        offsets.push(0);
        for d in &degree {
            acc += d;
            offsets.push(acc);
        }

        // Fill both directions, then sort each adjacency run by neighbor id
        // so iteration order is deterministic and membership is a binary
        // search.
        let mut cursor: Vec<usize> = offsets[..n].to_vec();
        let mut neighbors = vec![NodeId(0); acc];
        let mut weights = vec![0.0f64; acc];
        for (&(a, b), &w) in &self.edges {
            neighbors[cursor[a.index()]] = b;
            weights[cursor[a.index()]] = w;
            cursor[a.index()] += 1;
            neighbors[cursor[b.index()]] = a;
            weights[cursor[b.index()]] = w;
            cursor[b.index()] += 1;
        }
        for v in 0..n {
            let (start, end) = (offsets[v], offsets[v + 1]);
            let mut run: Vec<(NodeId, f64)> = neighbors[start..end]
                .iter()
                .copied()
                .zip(weights[start..end].iter().copied())
                .collect();
            run.sort_unstable_by_key(|(id, _)| *id);
            for (i, (id, w)) in run.into_iter().enumerate() {
                neighbors[start + i] = id;
                weights[start + i] = w;
            }
        }

        KnowledgeGraph {
            nodes: self.nodes,
            index: self.index,
            offsets,
            neighbors,
            weights,
        }
    }
}

/// The frozen gene–phenotype graph.
///
/// Invariants (enforced by [`GraphBuilder`], relied on by walk generation):
/// every edge endpoint references an existing node, there are no self-loops,
/// and no two nodes share an identifier. All data is read-only after build
/// and safe to share across walk workers without locking.
#[derive(Debug, Clone)]
pub struct KnowledgeGraph {
    nodes: Vec<NodeData>,
    index: FxHashMap<Arc<str>, NodeId>,
    /// CSR offsets, length `nodes.len() + 1`.
    offsets: Vec<usize>,
    neighbors: Vec<NodeId>,
    weights: Vec<f64>,
}

impl KnowledgeGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.neighbors.len() / 2
    }

    pub fn nodes(&self) -> &[NodeData] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.index())
    }

    /// Resolves an external identifier to its node id.
    pub fn resolve(&self, identifier: &str) -> Option<NodeId> {
        self.index.get(identifier).copied()
    }

    /// Neighbors of `v`, sorted by node id.
    pub fn neighbors(&self, v: NodeId) -> &[NodeId] {
        let (start, end) = self.range(v);
        &self.neighbors[start..end]
    }

    /// Edge weights parallel to [`neighbors`](Self::neighbors).
    pub fn edge_weights(&self, v: NodeId) -> &[f64] {
        let (start, end) = self.range(v);
        &self.weights[start..end]
    }

    pub fn degree(&self, v: NodeId) -> usize {
        let (start, end) = self.range(v);
        end - start
    }

    /// Index of the first directed slot belonging to `v`.
    ///
    /// Directed slot `k` of node `v` is the global index
    /// `slot_base(v) + k`, used by the walk plan to key per-edge alias
    /// tables.
    pub fn slot_base(&self, v: NodeId) -> usize {
        self.offsets[v.index()]
    }

    /// Total number of directed slots (twice the undirected edge count).
    pub fn slot_count(&self) -> usize {
        self.neighbors.len()
    }

    /// O(log d) membership test on the sorted neighbor run.
    pub fn has_edge(&self, u: NodeId, x: NodeId) -> bool {
        self.neighbors(u).binary_search(&x).is_ok()
    }

    fn range(&self, v: NodeId) -> (usize, usize) {
        (self.offsets[v.index()], self.offsets[v.index() + 1])
    }
}

/// Assembles the knowledge graph from the three source tables.
///
/// Node population: every non-obsolete ontology term becomes a phenotype
/// node; a gene becomes a node when at least one usable association
/// references it, taking its identity (primary id and symbol) from the
/// catalog. Associations are normalized through the catalog's alias map and
/// the ontology's alternate-id map before edges are added; references that
/// still fail to resolve are skipped and counted in the report.
pub fn build_graph(
    catalog: &GeneCatalog,
    associations: &[AssociationRecord],
    ontology: &Ontology,
    config: &GraphConfig,
) -> Result<(KnowledgeGraph, BuildReport), PrioError> {
    info!(
        genes = catalog.len(),
        associations = associations.len(),
        terms = ontology.len(),
        "building knowledge graph"
    );
    let mut builder = GraphBuilder::new();
    let mut report = BuildReport::default();

    for term in ontology.terms() {
        builder.add_phenotype(&term.id, term.name.as_deref())?;
    }
    report.phenotype_nodes = builder.node_count();

    // Hierarchy edges: one per (term, parent) pair. Parents referencing
    // terms missing from the term set are malformed input.
    for term in ontology.terms() {
        let child = builder
            .node_id(&term.id)
            .expect("term registered in the loop above");
        for parent in &term.parents {
            let Some(parent_id) = ontology.primary_id(parent).and_then(|p| builder.node_id(p))
            else {
                return Err(PrioError::DataIntegrity(format!(
                    "term '{}' names unknown parent '{}'",
                    term.id, parent
                )));
            };
            builder.add_ontology_edge(child, parent_id, config.ontology_weight)?;
            if child != parent_id {
                report.ontology_edges += 1;
            }
        }
    }

    for record in associations {
        let Some(gene) = catalog.resolve(&record.gene) else {
            report.skipped_unknown_genes += 1;
            debug!(gene = %record.gene, "skipping association with unknown gene");
            continue;
        };
        let Some(term_id) = ontology
            .primary_id(&record.phenotype)
            .and_then(|p| builder.node_id(p))
        else {
            report.skipped_unknown_phenotypes += 1;
            debug!(term = %record.phenotype, "skipping association with unknown phenotype term");
            continue;
        };
        let gene_id = match builder.node_id(&gene.hgnc_id) {
            Some(id) => id,
            None => builder.add_gene(&gene.hgnc_id, &gene.symbol)?,
        };
        let weight = record.weight.unwrap_or(config.association_weight);
        builder.add_association(gene_id, term_id, weight)?;
        report.association_edges += 1;
    }

    report.gene_nodes = builder.node_count() - report.phenotype_nodes;
    report.merged_duplicates = builder.merged_duplicates;
    report.skipped_self_loops += builder.skipped_self_loops;

    if report.skipped_unknown_genes > 0 || report.skipped_unknown_phenotypes > 0 {
        warn!(
            unknown_genes = report.skipped_unknown_genes,
            unknown_phenotypes = report.skipped_unknown_phenotypes,
            "skipped associations with unresolvable references"
        );
    }

    let graph = builder.build();
    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "knowledge graph built"
    );
    Ok((graph, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_gene_graph() -> KnowledgeGraph {
        let mut b = GraphBuilder::new();
        let g1 = b.add_gene("HGNC:1", "AAA").unwrap();
        let g2 = b.add_gene("HGNC:2", "BBB").unwrap();
        let p1 = b.add_phenotype("HP:0000001", Some("Root")).unwrap();
        let p2 = b.add_phenotype("HP:0000002", None).unwrap();
        b.add_association(g1, p1, 1.0).unwrap();
        b.add_association(g2, p2, 1.0).unwrap();
        b.add_ontology_edge(p2, p1, 1.0).unwrap();
        b.build()
    }

    #[test]
    fn duplicate_identifier_is_rejected() {
        let mut b = GraphBuilder::new();
        b.add_gene("HGNC:1", "AAA").unwrap();
        let err = b.add_gene("HGNC:1", "AAA2").unwrap_err();
        assert!(matches!(err, PrioError::DataIntegrity(_)));
    }

    #[test]
    fn association_requires_registered_endpoints() {
        let mut b = GraphBuilder::new();
        let g = b.add_gene("HGNC:1", "AAA").unwrap();
        let err = b.add_association(g, NodeId(99), 1.0).unwrap_err();
        assert!(matches!(err, PrioError::DataIntegrity(_)));
    }

    #[test]
    fn duplicate_associations_merge_by_max() {
        let mut b = GraphBuilder::new();
        let g = b.add_gene("HGNC:1", "AAA").unwrap();
        let p = b.add_phenotype("HP:0000001", None).unwrap();
        b.add_association(g, p, 0.4).unwrap();
        b.add_association(g, p, 0.9).unwrap();
        b.add_association(g, p, 0.2).unwrap();
        let graph = b.build();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edge_weights(g), &[0.9]);
    }

    #[test]
    fn ontology_self_loop_is_skipped() {
        let mut b = GraphBuilder::new();
        let p = b.add_phenotype("HP:0000001", None).unwrap();
        b.add_ontology_edge(p, p, 1.0).unwrap();
        let graph = b.build();
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.degree(p), 0);
    }

    #[test]
    fn neighbors_are_sorted_and_searchable() {
        let g = two_gene_graph();
        let p1 = g.resolve("HP:0000001").unwrap();
        let run = g.neighbors(p1);
        assert!(run.windows(2).all(|w| w[0] < w[1]));
        for &x in run {
            assert!(g.has_edge(p1, x));
            assert!(g.has_edge(x, p1), "adjacency must be symmetric");
        }
        assert!(!g.has_edge(p1, p1));
    }

    #[test]
    fn every_endpoint_is_a_registered_node() {
        let g = two_gene_graph();
        for node in g.nodes() {
            for &x in g.neighbors(node.id) {
                assert!(g.node(x).is_some());
                assert_ne!(x, node.id, "no self-loops");
            }
        }
    }
}
