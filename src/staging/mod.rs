use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::relay::HttpTransport;
use crate::PipelineError;

/// Public handle to a staged payload.
///
/// The hosting service is ephemeral: the asset may disappear after its
/// first retrieval or a short TTL, so it must be consumed promptly and
/// never reused across runs.
#[derive(Debug, Clone)]
pub struct StagedAsset {
    pub public_url: String,
    pub size_bytes: u64,
}

/// Pushes a binary payload to a publicly dereferenceable URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetStager: Send + Sync {
    async fn stage(
        &self,
        payload: Vec<u8>,
        suggested_name: String,
    ) -> std::result::Result<StagedAsset, PipelineError>;
}

#[derive(Debug, Deserialize)]
struct StagingResponse {
    #[serde(default)]
    success: bool,
    link: Option<String>,
}

/// Uploads bytes to an ephemeral hosting endpoint with one multipart POST.
///
/// The transcription service only accepts URLs, not raw bytes, which is
/// the sole reason this hop exists. No retry here: re-uploading a whole
/// audio track is costly, so retry policy belongs to the caller.
pub struct StagingUploader {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    timeout: Duration,
}

impl StagingUploader {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &Config) -> Self {
        Self {
            transport,
            endpoint: config.staging.endpoint.clone(),
            timeout: config.upload_timeout(),
        }
    }
}

#[async_trait]
impl AssetStager for StagingUploader {
    async fn stage(
        &self,
        payload: Vec<u8>,
        suggested_name: String,
    ) -> std::result::Result<StagedAsset, PipelineError> {
        let size_bytes = payload.len() as u64;
        tracing::info!(
            "Staging {} as {}",
            crate::utils::format_file_size(size_bytes),
            suggested_name
        );

        let response = self
            .transport
            .post_file(
                &self.endpoint,
                "file".to_string(),
                suggested_name,
                payload,
                self.timeout,
            )
            .await
            .map_err(|e| PipelineError::StagingFailed(e.to_string()))?;

        if !response.is_success() {
            return Err(PipelineError::StagingFailed(format!(
                "hosting service returned HTTP {}",
                response.status
            )));
        }

        let parsed: StagingResponse = response
            .json()
            .map_err(|e| PipelineError::StagingFailed(e.to_string()))?;

        match parsed.link {
            Some(link) if parsed.success => {
                tracing::info!("Staged at {}", link);
                Ok(StagedAsset {
                    public_url: link,
                    size_bytes,
                })
            }
            _ => Err(PipelineError::StagingFailed(
                "hosting service returned no link".to_string(),
            )),
        }
    }
}
