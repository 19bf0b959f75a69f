//! Model persistence.
//!
//! A saved model is a directory holding two artifacts:
//!
//! - `embedding.bin` — bincode `(dim, identifiers, kinds, vectors)` arena
//! - `params.json` — the [`EmbeddingParams`] the model was trained with
//!
//! Both files are staged through a temporary file in the target directory
//! and atomically renamed into place, so a crashed save never leaves a
//! readable-but-partial model: either both artifacts exist and are
//! complete, or loading fails.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::engine::embedding::NodeEmbeddings;
use crate::engine::errors::PrioError;
use crate::engine::graph::NodeKind;
use crate::engine::params::EmbeddingParams;

/// Vector arena artifact inside a model directory.
pub const EMBEDDING_FILE: &str = "embedding.bin";
/// Hyperparameter artifact inside a model directory.
pub const PARAMS_FILE: &str = "params.json";

type EmbeddingParts = (usize, Vec<String>, Vec<NodeKind>, Vec<f32>);

/// Saves a trained model into `dir`, creating it if needed.
pub fn save_model(
    dir: &Path,
    embeddings: &NodeEmbeddings,
    params: &EmbeddingParams,
) -> Result<(), PrioError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| PrioError::io(format!("creating model directory {}", dir.display()), e))?;

    stage(dir, EMBEDDING_FILE, |writer| {
        let (dim, identifiers, kinds, vectors) = embeddings.parts();
        bincode::serialize_into(writer, &(dim, identifiers, kinds, vectors))
            .map_err(|e| PrioError::Model(format!("serializing embedding: {}", e)))
    })?;

    stage(dir, PARAMS_FILE, |writer| {
        serde_json::to_writer_pretty(writer, params)
            .map_err(|e| PrioError::Model(format!("serializing params: {}", e)))
    })?;

    info!(
        dir = %dir.display(),
        vectors = embeddings.len(),
        dim = embeddings.dim(),
        "model saved"
    );
    Ok(())
}

/// Loads a model saved by [`save_model`].
pub fn load_model(dir: &Path) -> Result<(NodeEmbeddings, EmbeddingParams), PrioError> {
    let embedding_path = dir.join(EMBEDDING_FILE);
    let file = File::open(&embedding_path)
        .map_err(|e| PrioError::io(format!("opening {}", embedding_path.display()), e))?;
    let (dim, identifiers, kinds, vectors): EmbeddingParts =
        bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| PrioError::Model(format!("deserializing embedding: {}", e)))?;
    let embeddings = NodeEmbeddings::from_parts(dim, identifiers, kinds, vectors)?;

    let params_path = dir.join(PARAMS_FILE);
    let file = File::open(&params_path)
        .map_err(|e| PrioError::io(format!("opening {}", params_path.display()), e))?;
    let params: EmbeddingParams = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| PrioError::Model(format!("deserializing params: {}", e)))?;

    debug!(
        dir = %dir.display(),
        vectors = embeddings.len(),
        dim = embeddings.dim(),
        "model loaded"
    );
    Ok((embeddings, params))
}

/// Writes one artifact through a temp file in the same directory, then
/// renames it into place.
fn stage<F>(dir: &Path, name: &str, write: F) -> Result<(), PrioError>
where
    F: FnOnce(&mut BufWriter<&mut tempfile::NamedTempFile>) -> Result<(), PrioError>,
{
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| PrioError::io(format!("creating temp file in {}", dir.display()), e))?;
    {
        let mut writer = BufWriter::new(&mut tmp);
        write(&mut writer)?;
        writer
            .flush()
            .map_err(|e| PrioError::io(format!("flushing {}", name), e))?;
    }
    tmp.persist(dir.join(name))
        .map_err(|e| PrioError::io(format!("renaming {} into place", name), e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> (NodeEmbeddings, EmbeddingParams) {
        let embeddings = NodeEmbeddings::from_parts(
            3,
            vec!["HGNC:1".into(), "HP:0000001".into()],
            vec![NodeKind::Gene, NodeKind::Phenotype],
            vec![0.25, -1.5, 3.0, 0.0, 0.125, -7.75],
        )
        .unwrap();
        let params = EmbeddingParams {
            dimensions: 3,
            seed: Some(17),
            ..EmbeddingParams::default()
        };
        (embeddings, params)
    }

    #[test]
    fn round_trip_preserves_vectors_bit_for_bit() {
        let dir = tempfile::tempdir().unwrap();
        let (embeddings, params) = sample_model();
        save_model(dir.path(), &embeddings, &params).unwrap();

        let (loaded, loaded_params) = load_model(dir.path()).unwrap();
        assert_eq!(loaded.dim(), embeddings.dim());
        assert_eq!(loaded.len(), embeddings.len());
        for id in ["HGNC:1", "HP:0000001"] {
            assert_eq!(loaded.get(id).unwrap(), embeddings.get(id).unwrap());
        }
        assert_eq!(loaded_params.seed, params.seed);
        assert_eq!(loaded_params.dimensions, params.dimensions);
    }

    #[test]
    fn missing_artifact_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let (embeddings, params) = sample_model();
        save_model(dir.path(), &embeddings, &params).unwrap();
        std::fs::remove_file(dir.path().join(PARAMS_FILE)).unwrap();
        assert!(load_model(dir.path()).is_err());
    }

    #[test]
    fn save_overwrites_previous_model() {
        let dir = tempfile::tempdir().unwrap();
        let (embeddings, params) = sample_model();
        save_model(dir.path(), &embeddings, &params).unwrap();

        let second = NodeEmbeddings::from_parts(
            1,
            vec!["HGNC:2".into()],
            vec![NodeKind::Gene],
            vec![42.0],
        )
        .unwrap();
        save_model(dir.path(), &second, &params).unwrap();
        let (loaded, _) = load_model(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("HGNC:2").unwrap(), &[42.0][..]);
    }
}
