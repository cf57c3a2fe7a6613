//! Result ranker: pairs model confidences with labels and orders them.

use crate::error::DataIntegrityError;
use crate::vocabulary::Vocabulary;
use serde::Serialize;

/// One (label, confidence) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredLabel {
    pub label: String,
    pub confidence: f32,
}

/// Predictions sorted by descending confidence, split into the best match and the rest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub top: ScoredLabel,
    /// Remaining labels, still in descending order. Empty for a one-label vocabulary.
    pub others: Vec<ScoredLabel>,
}

impl RankedResult {
    /// Total number of ranked labels.
    pub fn len(&self) -> usize {
        self.others.len() + 1
    }

    /// Always false; a ranking holds at least the top entry.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All entries in rank order, top first.
    pub fn iter(&self) -> impl Iterator<Item = &ScoredLabel> {
        std::iter::once(&self.top).chain(self.others.iter())
    }
}

/// Rank `confidences` against `vocabulary`.
///
/// Sorting is stable, so equal confidences keep vocabulary order. A length
/// mismatch means the deployment pairs the wrong model and labels.
pub fn rank(confidences: &[f32], vocabulary: &Vocabulary) -> Result<RankedResult, DataIntegrityError> {
    vocabulary.ensure_matches_outputs(confidences.len())?;

    let mut scored: Vec<ScoredLabel> = vocabulary
        .iter()
        .zip(confidences)
        .map(|(label, &confidence)| ScoredLabel {
            label: label.to_string(),
            confidence,
        })
        .collect();
    scored.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut ranked = scored.into_iter();
    // ensure_matches_outputs guarantees at least one entry
    let top = ranked.next().ok_or(DataIntegrityError::EmptyVocabulary)?;
    Ok(RankedResult {
        top,
        others: ranked.collect(),
    })
}
