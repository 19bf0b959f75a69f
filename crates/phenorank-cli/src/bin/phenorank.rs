//! Phenorank CLI - train embedding models and rank candidate genes
//!
//! Usage:
//!   phenorank train --genes hgnc.jsonl --links links.jsonl --obo hp.obo --out model/
//!   phenorank rank --model model/ --terms HP:0001250,HP:0001251
//!   phenorank rank --model model/ --terms HP:0001250 --output json

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::info;

use phenorank_core::engine::graph::GraphConfig;
use phenorank_core::ingest::{genes, links, ontology};
use phenorank_core::{
    build_graph, load_model, save_model, train_pipeline, EmbeddingParams, PrioError, Prioritizer,
    RankQuery,
};

#[derive(Parser)]
#[command(name = "phenorank")]
#[command(version)]
#[command(about = "Phenotype-driven gene prioritization")]
#[command(long_about = "Train graph-embedding models over gene-phenotype associations \
and rank candidate genes for a query phenotype set")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the knowledge graph and train an embedding model
    Train {
        /// Gene nomenclature table (JSONL)
        #[arg(long, value_name = "FILE")]
        genes: PathBuf,

        /// Gene-phenotype link records (JSONL)
        #[arg(long, value_name = "FILE")]
        links: Option<PathBuf>,

        /// Gene-to-phenotype table (TSV)
        #[arg(long, value_name = "FILE")]
        gene_to_phenotype: Option<PathBuf>,

        /// Phenotype ontology (OBO)
        #[arg(long, value_name = "FILE")]
        obo: PathBuf,

        /// Output model directory
        #[arg(long, value_name = "DIR")]
        out: PathBuf,

        /// Embedding parameters (JSON); defaults used when omitted
        #[arg(long, value_name = "FILE")]
        params: Option<PathBuf>,

        /// Master seed for reproducible training
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Rank genes for a phenotype term set against a trained model
    Rank {
        /// Model directory written by `train`
        #[arg(long, value_name = "DIR")]
        model: PathBuf,

        /// Comma-separated phenotype term ids
        #[arg(long, value_name = "TERMS")]
        terms: String,

        /// Gene to exclude from the candidate pool
        #[arg(long, value_name = "GENE")]
        exclude: Option<String>,

        /// Output format: table or json
        #[arg(short, long, default_value = "table", value_name = "FORMAT")]
        output: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Train {
            genes,
            links,
            gene_to_phenotype,
            obo,
            out,
            params,
            seed,
        } => run_train(genes, links, gene_to_phenotype, obo, out, params, seed),
        Command::Rank {
            model,
            terms,
            exclude,
            output,
        } => run_rank(model, terms, exclude, output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
fn run_train(
    genes_path: PathBuf,
    links_path: Option<PathBuf>,
    g2p_path: Option<PathBuf>,
    obo_path: PathBuf,
    out: PathBuf,
    params_path: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<(), PrioError> {
    let mut params = match params_path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| PrioError::io(format!("reading params {}", path.display()), e))?;
            serde_json::from_str::<EmbeddingParams>(&raw)
                .map_err(|e| PrioError::Parse(format!("bad params file: {}", e)))?
        }
        None => EmbeddingParams::default(),
    };
    if seed.is_some() {
        params.seed = seed;
    }

    let catalog = genes::load_gene_catalog(&genes_path)?;
    let ontology = ontology::load_obo(&obo_path)?;

    let mut associations = Vec::new();
    if let Some(path) = &links_path {
        let records = links::load_link_records(path)?;
        associations.extend(links::flatten_links(&records));
    }
    if let Some(path) = &g2p_path {
        associations.extend(links::load_gene_to_phenotype_tsv(path)?);
    }
    if associations.is_empty() {
        return Err(PrioError::DataIntegrity(
            "no association source given: pass --links and/or --gene-to-phenotype".into(),
        ));
    }

    let (graph, report) = build_graph(&catalog, &associations, &ontology, &GraphConfig::default())?;
    info!(
        genes = report.gene_nodes,
        phenotypes = report.phenotype_nodes,
        associations = report.association_edges,
        ontology_edges = report.ontology_edges,
        "graph assembled"
    );

    let embeddings = train_pipeline(&graph, &params)?;
    save_model(&out, &embeddings, &params)?;
    println!(
        "model saved to {} ({} vectors, {} dims)",
        out.display(),
        embeddings.len(),
        embeddings.dim()
    );
    Ok(())
}

fn run_rank(
    model_dir: PathBuf,
    terms: String,
    exclude: Option<String>,
    output: String,
) -> Result<(), PrioError> {
    let (embeddings, _params) = load_model(&model_dir)?;
    let query = RankQuery {
        phenotypes: terms
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
        exclude_gene: exclude,
        candidates: None,
    };
    let ranking = Prioritizer::new(&embeddings).rank(&query)?;

    match output.as_str() {
        "json" => {
            let entries: Vec<serde_json::Value> = ranking
                .entries
                .iter()
                .enumerate()
                .map(|(i, e)| {
                    serde_json::json!({
                        "rank": i + 1,
                        "gene": e.identifier,
                        "score": e.score,
                    })
                })
                .collect();
            let doc = serde_json::json!({
                "query": ranking.used_terms,
                "dropped_terms": ranking.dropped_terms,
                "ranking": entries,
            });
            let rendered = serde_json::to_string_pretty(&doc)
                .map_err(|e| PrioError::Model(format!("serializing ranking: {}", e)))?;
            println!("{}", rendered);
        }
        _ => {
            println!(
                "# query (len={}): {}",
                ranking.used_terms.len(),
                ranking.used_terms.join(",")
            );
            if ranking.dropped_terms > 0 {
                println!("# dropped {} unknown term(s)", ranking.dropped_terms);
            }
            println!("rank\tscore\tgene");
            for (i, entry) in ranking.entries.iter().enumerate() {
                println!("{}\t{:.6}\t{}", i + 1, entry.score, entry.identifier);
            }
        }
    }
    Ok(())
}
