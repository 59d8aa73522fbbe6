use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::metadata::{MediaLocator, BROWSER_USER_AGENT};
use crate::relay::{HttpTransport, RelayFetcher};
use crate::PipelineError;

/// Source of raw audio bytes for a media locator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn download(
        &self,
        locator: &MediaLocator,
    ) -> std::result::Result<Vec<u8>, PipelineError>;
}

/// Downloads the audio track through the relay chain.
///
/// Relays happily return their own error pages with a 200 status, so a
/// response only counts when the payload is at least `min_bytes` long; a
/// real audio track is never that small.
pub struct AudioAcquirer {
    fetcher: RelayFetcher,
    min_bytes: usize,
}

impl AudioAcquirer {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &Config) -> Self {
        Self {
            fetcher: RelayFetcher::new(
                transport,
                config.relays.clone(),
                config.attempt_timeout(),
            ),
            min_bytes: config.http.min_audio_bytes,
        }
    }
}

#[async_trait]
impl AudioSource for AudioAcquirer {
    async fn download(
        &self,
        locator: &MediaLocator,
    ) -> std::result::Result<Vec<u8>, PipelineError> {
        let headers = vec![("User-Agent".to_string(), BROWSER_USER_AGENT.to_string())];
        let min_bytes = self.min_bytes;

        tracing::info!("Downloading audio stream via {} relays", self.fetcher.relay_count());
        let response = self
            .fetcher
            .fetch(locator.as_str(), &headers, |r| {
                r.is_success() && r.body.len() >= min_bytes
            })
            .await
            .map_err(|e| match e {
                PipelineError::AllRelaysExhausted { attempts, .. } => {
                    PipelineError::AudioDownloadFailed { attempts }
                }
                other => other,
            })?;

        tracing::info!(
            "Audio downloaded: {}",
            crate::utils::format_file_size(response.body.len() as u64)
        );
        Ok(response.body)
    }
}
