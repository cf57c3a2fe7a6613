//! Model manifest: which artifact to load and the digest it must have.

use crate::error::ProvisioningError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Contents of the manifest YAML file.
///
/// ```yaml
/// filename: food-classifier-v6.onnx
/// sha256: 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08
/// url: https://example.com/models/food-classifier-v6.onnx
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub filename: String,
    pub sha256: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl ModelManifest {
    pub fn load(path: &Path) -> Result<Self, ProvisioningError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ProvisioningError::io(path, e))?;
        let mut manifest: Self =
            serde_yaml::from_str(&content).map_err(|e| ProvisioningError::Manifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        manifest.sha256 = manifest.sha256.trim().to_ascii_lowercase();
        manifest
            .validate()
            .map_err(|reason| ProvisioningError::Manifest {
                path: path.to_path_buf(),
                reason,
            })?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), String> {
        let name = Path::new(&self.filename);
        if self.filename.is_empty()
            || name.file_name().and_then(|n| n.to_str()) != Some(self.filename.as_str())
        {
            return Err(format!(
                "filename '{}' must be a bare file name",
                self.filename
            ));
        }
        if self.sha256.len() != 64 || !self.sha256.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err("sha256 must be 64 hexadecimal characters".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn write(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("model.yaml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_valid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            &format!("filename: m.onnx\nsha256: \"{}\"\n", DIGEST.to_uppercase()),
        );
        let manifest = ModelManifest::load(&path).unwrap();
        assert_eq!(manifest.filename, "m.onnx");
        assert_eq!(manifest.sha256, DIGEST);
        assert!(manifest.url.is_none());
    }

    #[test]
    fn test_rejects_short_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "filename: m.onnx\nsha256: abc123\n");
        let err = ModelManifest::load(&path).unwrap_err();
        assert!(matches!(err, ProvisioningError::Manifest { .. }));
    }

    #[test]
    fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            &format!("filename: ../outside.onnx\nsha256: {DIGEST}\n"),
        );
        let err = ModelManifest::load(&path).unwrap_err();
        assert!(err.to_string().contains("bare file name"));
    }

    #[test]
    fn test_missing_manifest_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelManifest::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ProvisioningError::Io { .. }));
    }
}
