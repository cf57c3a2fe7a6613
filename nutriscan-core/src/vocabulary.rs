//! The ordered set of class labels a model can output.

use crate::error::DataIntegrityError;
use serde::Serialize;
use std::collections::HashSet;

/// Fixed, ordered class labels. Index `i` names model output `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Vocabulary {
    labels: Vec<String>,
}

impl Vocabulary {
    /// Build a vocabulary, rejecting empty and duplicate label sets.
    pub fn new<I, S>(labels: I) -> Result<Self, DataIntegrityError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(DataIntegrityError::EmptyVocabulary);
        }
        let mut seen = HashSet::with_capacity(labels.len());
        for label in &labels {
            if !seen.insert(label.as_str()) {
                return Err(DataIntegrityError::DuplicateLabel {
                    label: label.clone(),
                });
            }
        }
        Ok(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false; construction rejects empty vocabularies.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// Fail unless the model produces exactly one output per label.
    pub fn ensure_matches_outputs(&self, model_outputs: usize) -> Result<(), DataIntegrityError> {
        if self.labels.len() != model_outputs {
            return Err(DataIntegrityError::VocabularyMismatch {
                vocabulary: self.labels.len(),
                model_outputs,
            });
        }
        Ok(())
    }
}
