//! Minimal OBO ontology loading.
//!
//! Parses the subset of the OBO flat-file format the phenotype ontology
//! actually uses for graph construction: `[Term]` stanzas with `id`,
//! `name`, `alt_id`, `is_a`, and `is_obsolete` tags. Obsolete terms are
//! skipped and counted; alternate ids map to their primary term so queries
//! written against older releases still resolve.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::info;

use crate::engine::errors::PrioError;

/// One ontology term as parsed from a `[Term]` stanza.
#[derive(Debug, Clone, Default)]
pub struct TermRecord {
    pub id: String,
    pub name: Option<String>,
    /// Direct parents (`is_a` targets).
    pub parents: Vec<String>,
    pub alt_ids: Vec<String>,
}

/// The loaded phenotype ontology.
#[derive(Debug, Clone, Default)]
pub struct Ontology {
    terms: Vec<TermRecord>,
    by_id: FxHashMap<String, usize>,
    alt_to_primary: FxHashMap<String, String>,
    /// Obsolete stanzas dropped during parsing.
    pub obsolete_skipped: usize,
}

impl Ontology {
    /// Builds an ontology from parsed terms, rejecting duplicate ids.
    pub fn from_terms(terms: Vec<TermRecord>, obsolete_skipped: usize) -> Result<Self, PrioError> {
        let mut by_id = FxHashMap::default();
        let mut alt_to_primary = FxHashMap::default();
        for (i, term) in terms.iter().enumerate() {
            if by_id.insert(term.id.clone(), i).is_some() {
                return Err(PrioError::DataIntegrity(format!(
                    "duplicate ontology term id '{}'",
                    term.id
                )));
            }
            for alt in &term.alt_ids {
                alt_to_primary.insert(alt.clone(), term.id.clone());
            }
        }
        Ok(Self {
            terms,
            by_id,
            alt_to_primary,
            obsolete_skipped,
        })
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[TermRecord] {
        &self.terms
    }

    pub fn term(&self, id: &str) -> Option<&TermRecord> {
        self.by_id.get(id).map(|&i| &self.terms[i])
    }

    /// Normalizes a term reference: primary ids pass through, alternate
    /// ids map to their primary term, anything else is `None`.
    pub fn primary_id(&self, reference: &str) -> Option<&str> {
        if self.by_id.contains_key(reference) {
            return self.term(reference).map(|t| t.id.as_str());
        }
        self.alt_to_primary.get(reference).map(String::as_str)
    }
}

/// Loads an ontology from an OBO file.
pub fn load_obo(path: &Path) -> Result<Ontology, PrioError> {
    info!(path = %path.display(), "loading ontology");
    let file = File::open(path)
        .map_err(|e| PrioError::io(format!("opening ontology {}", path.display()), e))?;

    let mut terms = Vec::new();
    let mut obsolete_skipped = 0usize;
    let mut current: Option<TermRecord> = None;
    let mut current_obsolete = false;
    let mut in_term_stanza = false;

    let mut finish =
        |current: &mut Option<TermRecord>, current_obsolete: &mut bool, obsolete: &mut usize| {
            if let Some(term) = current.take() {
                if *current_obsolete {
                    *obsolete += 1;
                } else if !term.id.is_empty() {
                    terms.push(term);
                }
            }
            *current_obsolete = false;
        };

    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| PrioError::io("reading ontology", e))?;
        let line = line.trim();
        if line.starts_with('[') {
            finish(&mut current, &mut current_obsolete, &mut obsolete_skipped);
            in_term_stanza = line == "[Term]";
            if in_term_stanza {
                current = Some(TermRecord::default());
            }
            continue;
        }
        if !in_term_stanza {
            continue;
        }
        let Some(term) = current.as_mut() else {
            continue;
        };
        let Some((tag, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match tag {
            "id" => term.id = value.to_string(),
            "name" => term.name = Some(value.to_string()),
            "alt_id" => term.alt_ids.push(value.to_string()),
            // `is_a: HP:0000001 ! comment` keeps only the target id.
            "is_a" => {
                let target = value.split('!').next().unwrap_or("").trim();
                if target.is_empty() {
                    return Err(PrioError::Parse(format!(
                        "term '{}' has an is_a line without a target",
                        term.id
                    )));
                }
                term.parents.push(target.to_string());
            }
            "is_obsolete" => current_obsolete = value == "true",
            _ => {}
        }
    }
    finish(&mut current, &mut current_obsolete, &mut obsolete_skipped);

    info!(
        terms = terms.len(),
        obsolete = obsolete_skipped,
        "ontology loaded"
    );
    Ontology::from_terms(terms, obsolete_skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
format-version: 1.2

[Term]
id: HP:0000001
name: All

[Term]
id: HP:0000118
name: Phenotypic abnormality
alt_id: HP:0000117
is_a: HP:0000001 ! All

[Term]
id: HP:0500000
name: Gone
is_obsolete: true

[Typedef]
id: part_of
";

    fn write_sample() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parses_terms_parents_and_alt_ids() {
        let f = write_sample();
        let ontology = load_obo(f.path()).unwrap();
        assert_eq!(ontology.len(), 2);
        let abnormality = ontology.term("HP:0000118").unwrap();
        assert_eq!(abnormality.name.as_deref(), Some("Phenotypic abnormality"));
        assert_eq!(abnormality.parents, vec!["HP:0000001".to_string()]);
        assert_eq!(ontology.primary_id("HP:0000117"), Some("HP:0000118"));
        assert_eq!(ontology.primary_id("HP:0000118"), Some("HP:0000118"));
        assert_eq!(ontology.primary_id("HP:9999999"), None);
    }

    #[test]
    fn obsolete_terms_are_skipped_and_counted() {
        let f = write_sample();
        let ontology = load_obo(f.path()).unwrap();
        assert!(ontology.term("HP:0500000").is_none());
        assert_eq!(ontology.obsolete_skipped, 1);
    }

    #[test]
    fn typedef_stanzas_are_ignored() {
        let f = write_sample();
        let ontology = load_obo(f.path()).unwrap();
        assert!(ontology.term("part_of").is_none());
    }

    #[test]
    fn duplicate_term_id_is_rejected() {
        let err = Ontology::from_terms(
            vec![
                TermRecord {
                    id: "HP:1".into(),
                    ..TermRecord::default()
                },
                TermRecord {
                    id: "HP:1".into(),
                    ..TermRecord::default()
                },
            ],
            0,
        )
        .unwrap_err();
        assert!(matches!(err, PrioError::DataIntegrity(_)));
    }
}
