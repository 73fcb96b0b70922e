use std::{path::Path, time::Duration};

use async_trait::async_trait;
use reqwest::Client;

use crate::error::ProvisionError;

#[async_trait]
pub trait InstallerFetcher: Send + Sync {
    /// Downloads `url` into `dest`, replacing anything already there.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ProvisionError>;
}

pub struct HttpInstallerFetcher {
    client: Client,
}

impl HttpInstallerFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ProvisionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProvisionError::HttpClient)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl InstallerFetcher for HttpInstallerFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ProvisionError> {
        tracing::info!(url, dest = %dest.display(), "downloading toolchain installer");

        let download_err = |source| ProvisionError::Download {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().await.map_err(download_err)?;
        if !response.status().is_success() {
            return Err(ProvisionError::DownloadStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        tracing::info!(
            status = response.status().as_u16(),
            content_length = ?response.content_length(),
            "installer response received"
        );

        let bytes = response.bytes().await.map_err(download_err)?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|source| ProvisionError::WriteInstaller {
                path: dest.to_path_buf(),
                source,
            })?;
        tracing::info!(bytes = bytes.len(), dest = %dest.display(), "installer saved");
        Ok(bytes.len() as u64)
    }
}
