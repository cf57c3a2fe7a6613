//! Remote sources the model artifact can be fetched from.

use crate::error::ProvisioningError;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Somewhere the model artifact can be downloaded from.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Human-readable location, used in logs and errors.
    fn location(&self) -> &str;

    /// Write the artifact bytes to `dest`, replacing any existing file.
    /// Returns the number of bytes written.
    async fn fetch(&self, dest: &Path) -> Result<u64, ProvisioningError>;
}

/// Plain HTTP(S) download.
pub struct HttpArtifactSource {
    client: reqwest::Client,
    url: String,
}

impl HttpArtifactSource {
    pub fn new(
        url: impl Into<String>,
        connect_timeout: Duration,
        total_timeout: Duration,
    ) -> Result<Self, ProvisioningError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .user_agent(format!("nutriscan/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .timeout(total_timeout)
            .build()
            .map_err(|e| ProvisioningError::fetch(&url, e.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ArtifactSource for HttpArtifactSource {
    fn location(&self) -> &str {
        &self.url
    }

    async fn fetch(&self, dest: &Path) -> Result<u64, ProvisioningError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ProvisioningError::fetch(&self.url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProvisioningError::fetch(
                &self.url,
                format!("server returned status {}", response.status()),
            ));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| ProvisioningError::io(dest, e))?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProvisioningError::fetch(&self.url, e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ProvisioningError::io(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| ProvisioningError::io(dest, e))?;
        file.sync_all()
            .await
            .map_err(|e| ProvisioningError::io(dest, e))?;

        tracing::debug!(url = %self.url, bytes = written, "Download finished");
        Ok(written)
    }
}
