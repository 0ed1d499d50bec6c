//! In-memory evidence store.
//!
//! The store simulates a retrieval index over a small, fixed set of
//! documents. It is built once and never mutated afterwards, so it can be
//! shared freely between tools.
//!
//! ## Match policy
//!
//! First hit wins, in this order:
//! 1. A loaded document whose text contains the whole query, or any single
//!    whitespace-delimited query token (case-insensitive). Documents are
//!    scanned in id order.
//! 2. A mapping key exactly equal to the query.
//! 3. A mapping key contained in the query, or containing it. Keys are
//!    scanned in insertion order.

pub mod mock;

pub use mock::{MOCK_INTERNAL_DOCS, MOCK_POLICY_CHECKS, MOCK_SEARCH_MAPPING};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::evidence::Evidence;

/// Message returned when no document matches.
pub const NO_EVIDENCE_MESSAGE: &str =
    "No direct evidence found for this check in the simulated database.";

/// Errors from building a store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Evidence directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("Failed to list evidence directory: {0}")]
    Io(#[from] std::io::Error),
}

/// A labeled text document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDocument {
    pub id: String,
    pub text: String,
}

/// Result of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum SearchOutcome {
    #[serde(rename = "success")]
    Found { document_id: String, excerpt: String },

    #[serde(rename = "error")]
    NotFound { message: String },
}

impl SearchOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found { .. })
    }

    /// The matched excerpt as evidence.
    pub fn evidence(&self) -> Option<Evidence> {
        match self {
            SearchOutcome::Found {
                document_id,
                excerpt,
            } => Some(Evidence::from_store(document_id.clone(), excerpt.clone())),
            SearchOutcome::NotFound { .. } => None,
        }
    }

    fn found(doc: &StoreDocument) -> Self {
        SearchOutcome::Found {
            document_id: doc.id.clone(),
            excerpt: doc.text.clone(),
        }
    }
}

/// Immutable keyword-search store.
#[derive(Debug, Clone, Default)]
pub struct EvidenceStore {
    documents: BTreeMap<String, String>,
    mapping: Vec<(String, StoreDocument)>,
}

impl EvidenceStore {
    /// Start building a store.
    pub fn builder() -> EvidenceStoreBuilder {
        EvidenceStoreBuilder::default()
    }

    /// Store holding only the built-in demo mapping.
    pub fn demo() -> Self {
        Self::builder().demo_mapping().build()
    }

    /// Find the single best matching document.
    pub fn search(&self, query: &str) -> SearchOutcome {
        let lowered = query.to_lowercase();
        let terms: Vec<&str> = lowered.split_whitespace().collect();

        for (id, text) in &self.documents {
            let content = text.to_lowercase();
            if content.contains(&lowered) || terms.iter().any(|t| content.contains(t)) {
                tracing::debug!(document_id = %id, "Keyword match in loaded document");
                return SearchOutcome::Found {
                    document_id: id.clone(),
                    excerpt: text.clone(),
                };
            }
        }

        if let Some((_, doc)) = self.mapping.iter().find(|(key, _)| key == query) {
            tracing::debug!(document_id = %doc.id, "Exact mapping match");
            return SearchOutcome::found(doc);
        }

        if let Some((_, doc)) = self
            .mapping
            .iter()
            .find(|(key, _)| key.contains(query) || query.contains(key.as_str()))
        {
            tracing::debug!(document_id = %doc.id, "Partial mapping match");
            return SearchOutcome::found(doc);
        }

        SearchOutcome::NotFound {
            message: NO_EVIDENCE_MESSAGE.to_string(),
        }
    }

    /// Full text of a document, by id.
    pub fn document(&self, id: &str) -> Option<&str> {
        self.documents.get(id).map(String::as_str).or_else(|| {
            self.mapping
                .iter()
                .find(|(_, doc)| doc.id == id)
                .map(|(_, doc)| doc.text.as_str())
        })
    }

    pub fn contains_document(&self, id: &str) -> bool {
        self.document(id).is_some()
    }

    /// Number of loaded documents plus mapping entries.
    pub fn len(&self) -> usize {
        self.documents.len() + self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builder for [`EvidenceStore`].
#[derive(Debug, Default)]
pub struct EvidenceStoreBuilder {
    documents: BTreeMap<String, String>,
    mapping: Vec<(String, StoreDocument)>,
}

impl EvidenceStoreBuilder {
    /// Add a searchable document. A later document with the same id replaces it.
    pub fn document(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.documents.insert(id.into(), text.into());
        self
    }

    /// Load every regular file in a directory, keyed by file name.
    ///
    /// Unreadable files are skipped with a warning.
    pub fn load_dir(mut self, dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(StoreError::MissingDirectory(dir.to_path_buf()));
        }

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match fs::read_to_string(&path) {
                Ok(text) => {
                    self.documents.insert(name.to_string(), text);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Could not read evidence document");
                }
            }
        }

        tracing::info!(dir = %dir.display(), documents = self.documents.len(), "Loaded evidence documents");
        Ok(self)
    }

    /// Map a query key to a document.
    pub fn mapping(
        mut self,
        key: impl Into<String>,
        id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.mapping.push((
            key.into(),
            StoreDocument {
                id: id.into(),
                text: text.into(),
            },
        ));
        self
    }

    /// Add the built-in demo mapping.
    pub fn demo_mapping(mut self) -> Self {
        for (check, doc) in MOCK_SEARCH_MAPPING {
            let (id, text) = MOCK_INTERNAL_DOCS[doc];
            self = self.mapping(MOCK_POLICY_CHECKS[check], id, text);
        }
        self
    }

    pub fn build(self) -> EvidenceStore {
        EvidenceStore {
            documents: self.documents,
            mapping: self.mapping,
        }
    }
}
