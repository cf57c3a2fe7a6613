//! Nutrition lookup: a static label -> nutrition facts dataset.
//!
//! The dataset is a YAML mapping keyed by class label. It is loaded once at
//! startup, checked against the vocabulary, and read-only afterwards.

use crate::error::DataIntegrityError;
use crate::vocabulary::Vocabulary;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Nutrition facts for one ingredient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionRecord {
    /// Reference portion the figures refer to, e.g. `"100 g"`.
    pub serving: String,
    pub calories_kcal: f32,
    pub protein_g: f32,
    pub fat_g: f32,
    pub carbohydrate_g: f32,
    #[serde(default)]
    pub fiber_g: f32,
    /// Any further facts the dataset carries (vitamins, minerals, notes).
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl NutritionRecord {
    fn validate(&self, label: &str) -> Result<(), DataIntegrityError> {
        if self.serving.trim().is_empty() {
            return Err(DataIntegrityError::InvalidNutrition {
                label: label.to_string(),
                reason: "serving is empty".to_string(),
            });
        }
        let figures = [
            ("calories_kcal", self.calories_kcal),
            ("protein_g", self.protein_g),
            ("fat_g", self.fat_g),
            ("carbohydrate_g", self.carbohydrate_g),
            ("fiber_g", self.fiber_g),
        ];
        for (name, value) in figures {
            if !value.is_finite() || value < 0.0 {
                return Err(DataIntegrityError::InvalidNutrition {
                    label: label.to_string(),
                    reason: format!("{name} must be a non-negative number, got {value}"),
                });
            }
        }
        Ok(())
    }
}

/// All nutrition records, keyed by label.
#[derive(Debug, Clone, Default)]
pub struct NutritionTable {
    records: HashMap<String, NutritionRecord>,
}

impl NutritionTable {
    pub fn from_records(records: HashMap<String, NutritionRecord>) -> Self {
        Self { records }
    }

    /// Parse a YAML dataset.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let records: HashMap<String, NutritionRecord> = serde_yaml::from_str(yaml)?;
        Ok(Self { records })
    }

    /// Read and parse a YAML dataset from disk.
    pub fn load(path: &Path) -> Result<Self, DataIntegrityError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| DataIntegrityError::NutritionDataset {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let table =
            Self::from_yaml_str(&content).map_err(|e| DataIntegrityError::NutritionDataset {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        tracing::debug!(path = %path.display(), records = table.len(), "Loaded nutrition dataset");
        Ok(table)
    }

    /// Every vocabulary label must have a well-formed record.
    ///
    /// Records for labels outside the vocabulary are tolerated and logged.
    pub fn validate(&self, vocabulary: &Vocabulary) -> Result<(), DataIntegrityError> {
        for label in vocabulary.iter() {
            let record = self
                .records
                .get(label)
                .ok_or_else(|| DataIntegrityError::MissingNutrition {
                    label: label.to_string(),
                })?;
            record.validate(label)?;
        }
        for label in self.records.keys() {
            if !vocabulary.contains(label) {
                tracing::warn!(label = %label, "Nutrition record has no matching vocabulary label");
            }
        }
        Ok(())
    }

    /// Look up the record for a vocabulary label.
    pub fn lookup(&self, label: &str) -> Result<&NutritionRecord, DataIntegrityError> {
        self.records
            .get(label)
            .ok_or_else(|| DataIntegrityError::MissingNutrition {
                label: label.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
Wortel:
  serving: "100 g"
  calories_kcal: 41
  protein_g: 0.9
  fat_g: 0.2
  carbohydrate_g: 9.6
  fiber_g: 2.8
  vitamin_a_mcg: 835
Tahu:
  serving: "100 g"
  calories_kcal: 76
  protein_g: 8.1
  fat_g: 4.8
  carbohydrate_g: 1.9
"#;

    #[test]
    fn test_parse_and_lookup() {
        let table = NutritionTable::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(table.len(), 2);

        let wortel = table.lookup("Wortel").unwrap();
        assert_eq!(wortel.calories_kcal, 41.0);
        assert_eq!(wortel.fiber_g, 2.8);
        assert_eq!(
            wortel.extra.get("vitamin_a_mcg"),
            Some(&serde_yaml::Value::from(835))
        );

        // fiber defaults to zero when absent
        assert_eq!(table.lookup("Tahu").unwrap().fiber_g, 0.0);
    }

    #[test]
    fn test_missing_lookup_fails_loudly() {
        let table = NutritionTable::from_yaml_str(SAMPLE).unwrap();
        let err = table.lookup("Ikan").unwrap_err();
        assert!(matches!(err, DataIntegrityError::MissingNutrition { ref label } if label == "Ikan"));
    }

    #[test]
    fn test_validate_coverage() {
        let table = NutritionTable::from_yaml_str(SAMPLE).unwrap();
        let covered = Vocabulary::new(["Wortel", "Tahu"]).unwrap();
        assert!(table.validate(&covered).is_ok());

        let uncovered = Vocabulary::new(["Wortel", "Tahu", "Telur"]).unwrap();
        let err = table.validate(&uncovered).unwrap_err();
        assert!(matches!(err, DataIntegrityError::MissingNutrition { ref label } if label == "Telur"));
    }

    #[test]
    fn test_validate_rejects_negative_figures() {
        let yaml = r#"
Ikan:
  serving: "100 g"
  calories_kcal: -1
  protein_g: 20
  fat_g: 1.7
  carbohydrate_g: 0
"#;
        let table = NutritionTable::from_yaml_str(yaml).unwrap();
        let vocab = Vocabulary::new(["Ikan"]).unwrap();
        let err = table.validate(&vocab).unwrap_err();
        assert!(err.to_string().contains("calories_kcal"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = NutritionTable::load(&dir.path().join("nutrition.yaml")).unwrap_err();
        assert!(matches!(err, DataIntegrityError::NutritionDataset { .. }));
    }

    #[test]
    fn test_record_serializes_extras_inline() {
        let table = NutritionTable::from_yaml_str(SAMPLE).unwrap();
        let json = serde_json::to_value(table.lookup("Wortel").unwrap()).unwrap();
        assert_eq!(json["serving"], "100 g");
        assert_eq!(json["vitamin_a_mcg"], 835);
    }
}
