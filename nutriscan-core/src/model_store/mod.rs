//! # Model Store
//!
//! Resolves the on-disk model artifact named by the manifest, verifies its
//! SHA-256 digest, and downloads it when it is missing or corrupt. Runs once at
//! startup; a store that cannot produce a verified file is fatal.

mod digest;
mod manifest;
mod source;

pub use digest::{sha256_file, sha256_hex};
pub use manifest::ModelManifest;
pub use source::{ArtifactSource, HttpArtifactSource};

use crate::config::ModelConfig;
use crate::error::ProvisioningError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// What is currently on disk at the artifact path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactState {
    Missing,
    Verified,
    Corrupt { actual: String },
}

/// Owns the model artifact location and its provisioning.
pub struct ModelStore {
    manifest: ModelManifest,
    model_dir: PathBuf,
    source: Option<Arc<dyn ArtifactSource>>,
    max_attempts: u32,
}

impl std::fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStore")
            .field("manifest", &self.manifest)
            .field("model_dir", &self.model_dir)
            .field("source", &self.source.as_ref().map(|s| s.location().to_string()))
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl ModelStore {
    /// Create a store with an explicit fetch source (`None` = local only).
    pub fn new(
        manifest: ModelManifest,
        model_dir: impl Into<PathBuf>,
        source: Option<Arc<dyn ArtifactSource>>,
    ) -> Self {
        Self {
            manifest,
            model_dir: model_dir.into(),
            source,
            max_attempts: 1,
        }
    }

    /// Load the manifest named in `config` and wire an HTTP source from the
    /// manifest URL, falling back to `config.source_url`.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ProvisioningError> {
        let manifest = ModelManifest::load(&config.manifest_path)?;
        let url = manifest.url.clone().or_else(|| config.source_url.clone());
        let source = match url {
            Some(url) => Some(Arc::new(HttpArtifactSource::new(
                url,
                Duration::from_secs(config.connect_timeout_secs),
                Duration::from_secs(config.download_timeout_secs),
            )?) as Arc<dyn ArtifactSource>),
            None => None,
        };
        Ok(Self::new(manifest, &config.model_dir, source).with_max_attempts(config.max_fetch_attempts))
    }

    /// Allow retrying network failures. Checksum mismatches are never retried.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    /// Where the verified artifact lives.
    pub fn artifact_path(&self) -> PathBuf {
        self.model_dir.join(&self.manifest.filename)
    }

    fn partial_path(&self) -> PathBuf {
        self.model_dir.join(format!("{}.part", self.manifest.filename))
    }

    /// Check the local artifact without touching the network.
    pub fn inspect(&self) -> Result<ArtifactState, ProvisioningError> {
        let path = self.artifact_path();
        if !path.is_file() {
            return Ok(ArtifactState::Missing);
        }
        let actual = sha256_file(&path).map_err(|e| ProvisioningError::io(&path, e))?;
        if actual == self.manifest.sha256 {
            Ok(ArtifactState::Verified)
        } else {
            Ok(ArtifactState::Corrupt { actual })
        }
    }

    /// Return the path of a verified local artifact, fetching it if needed.
    pub async fn ensure_available(&self) -> Result<PathBuf, ProvisioningError> {
        let path = self.artifact_path();
        match self.inspect()? {
            ArtifactState::Verified => {
                tracing::info!(path = %path.display(), "Model artifact verified");
                return Ok(path);
            }
            ArtifactState::Missing => {
                tracing::info!(path = %path.display(), "Model artifact missing, fetching");
            }
            ArtifactState::Corrupt { actual } => {
                tracing::warn!(
                    path = %path.display(),
                    expected = %self.manifest.sha256,
                    actual = %actual,
                    "Model artifact checksum mismatch, fetching a fresh copy"
                );
            }
        }

        let source = self
            .source
            .as_ref()
            .ok_or_else(|| ProvisioningError::NoSource { path: path.clone() })?;

        std::fs::create_dir_all(&self.model_dir)
            .map_err(|e| ProvisioningError::io(&self.model_dir, e))?;

        let mut attempt = 1;
        loop {
            match self.fetch_once(source.as_ref(), &path).await {
                Ok(()) => return Ok(path),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(attempt, max = self.max_attempts, error = %e, "Model fetch failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(Duration::from_secs(1u64 << attempt.min(5))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Download into a `.part` sibling, verify, then rename over the target.
    async fn fetch_once(
        &self,
        source: &dyn ArtifactSource,
        path: &Path,
    ) -> Result<(), ProvisioningError> {
        let partial = self.partial_path();
        let result = source.fetch(&partial).await;
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                return Err(e);
            }
        };

        let actual = sha256_file(&partial).map_err(|e| ProvisioningError::io(&partial, e))?;
        if actual != self.manifest.sha256 {
            let _ = std::fs::remove_file(&partial);
            return Err(ProvisioningError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: self.manifest.sha256.clone(),
                actual,
            });
        }

        std::fs::rename(&partial, path).map_err(|e| ProvisioningError::io(path, e))?;
        tracing::info!(
            source = source.location(),
            path = %path.display(),
            bytes,
            "Model artifact downloaded and verified"
        );
        Ok(())
    }
}
