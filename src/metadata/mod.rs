use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::relay::{HttpTransport, RawResponse, RelayFetcher};
use crate::PipelineError;

/// Browser User-Agent sent on platform requests; the origin rejects
/// obviously non-browser clients.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Opaque platform video id extracted from a share link
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(String);

impl VideoId {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Time-limited URL of a specific audio stream variant.
///
/// Expires shortly after issue; always fetched fresh per run, never cached.
#[derive(Debug, Clone)]
pub struct MediaLocator(String);

impl MediaLocator {
    pub fn new(url: &str) -> Self {
        Self(url.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Everything the pipeline needs to know about one video
#[derive(Debug, Clone)]
pub struct VideoMetadata {
    pub title: String,
    pub author: String,
    pub description: String,
    pub duration_secs: u64,

    /// Platform captions, newline-joined, when the optional captions fetch succeeded
    pub caption_text: Option<String>,

    /// Audio stream locator, when the platform exposed one
    pub media_locator: Option<MediaLocator>,
}

impl VideoMetadata {
    /// Best available text content: captions when present, description otherwise
    pub fn text_content(&self) -> &str {
        self.caption_text.as_deref().unwrap_or(&self.description)
    }
}

/// Source of video metadata, keyed by video id
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_metadata(
        &self,
        id: &VideoId,
    ) -> std::result::Result<VideoMetadata, PipelineError>;
}

// Wire shapes of the platform endpoints.

#[derive(Debug, Deserialize)]
struct ViewEnvelope {
    code: i64,
    data: Option<ViewData>,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    title: String,
    owner: ViewOwner,
    #[serde(default)]
    desc: String,
    aid: u64,
    cid: u64,
    #[serde(default)]
    duration: u64,
}

#[derive(Debug, Deserialize)]
struct ViewOwner {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlayurlEnvelope {
    code: i64,
    data: Option<PlayurlData>,
}

#[derive(Debug, Deserialize)]
struct PlayurlData {
    dash: Option<PlayurlDash>,
}

#[derive(Debug, Deserialize)]
struct PlayurlDash {
    #[serde(default)]
    audio: Vec<PlayurlTrack>,
}

#[derive(Debug, Deserialize)]
struct PlayurlTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PlayerEnvelope {
    data: Option<PlayerData>,
}

#[derive(Debug, Deserialize)]
struct PlayerData {
    subtitle: Option<PlayerSubtitle>,
}

#[derive(Debug, Deserialize)]
struct PlayerSubtitle {
    #[serde(default)]
    subtitles: Vec<PlayerSubtitleEntry>,
}

#[derive(Debug, Deserialize)]
struct PlayerSubtitleEntry {
    #[serde(default)]
    subtitle_url: String,
}

#[derive(Debug, Deserialize)]
struct SubtitleBody {
    #[serde(default)]
    body: Vec<SubtitleLine>,
}

#[derive(Debug, Deserialize)]
struct SubtitleLine {
    content: String,
}

/// Fetches title, author, description, captions, and an audio stream
/// locator from the platform's public endpoints, all through the relay
/// chain. Only the primary info fetch is fatal; captions and the stream
/// locator are best-effort.
pub struct MetadataProvider {
    fetcher: RelayFetcher,
    metadata_url: String,
    stream_url: String,
    captions_url: String,
}

impl MetadataProvider {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &Config) -> Self {
        Self {
            fetcher: RelayFetcher::new(
                transport,
                config.relays.clone(),
                config.attempt_timeout(),
            ),
            metadata_url: config.platform.metadata_url.clone(),
            stream_url: config.platform.stream_url.clone(),
            captions_url: config.platform.captions_url.clone(),
        }
    }

    fn browser_headers() -> Vec<(String, String)> {
        vec![("User-Agent".to_string(), BROWSER_USER_AGENT.to_string())]
    }

    /// Accept only responses whose parsed body carries the platform success code
    fn accept_platform_body(response: &RawResponse) -> bool {
        if !response.is_success() {
            return false;
        }
        matches!(
            serde_json::from_slice::<serde_json::Value>(&response.body),
            Ok(body) if body.get("code").and_then(|c| c.as_i64()) == Some(0)
        )
    }

    /// Best-effort captions fetch; any failure is reported as Err and
    /// swallowed by the caller.
    async fn fetch_captions(&self, aid: u64, cid: u64) -> crate::Result<Option<String>> {
        let target = self
            .captions_url
            .replace("{aid}", &aid.to_string())
            .replace("{cid}", &cid.to_string());

        let response = self
            .fetcher
            .fetch(&target, &Self::browser_headers(), |r| r.is_success())
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        let envelope: PlayerEnvelope = response.json()?;
        let subtitle_url = envelope
            .data
            .and_then(|d| d.subtitle)
            .and_then(|s| s.subtitles.into_iter().next())
            .map(|entry| entry.subtitle_url)
            .filter(|url| !url.is_empty());

        let Some(subtitle_url) = subtitle_url else {
            return Ok(None);
        };

        // Subtitle URLs come back scheme-relative
        let subtitle_url = if subtitle_url.starts_with("//") {
            format!("https:{}", subtitle_url)
        } else {
            subtitle_url
        };

        let response = self
            .fetcher
            .fetch(&subtitle_url, &[], |r| r.is_success())
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        let body: SubtitleBody = response.json()?;
        let text = body
            .body
            .iter()
            .map(|line| line.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(if text.is_empty() { None } else { Some(text) })
    }

    /// Best-effort stream locator fetch
    async fn fetch_stream_locator(
        &self,
        id: &VideoId,
        cid: u64,
    ) -> crate::Result<Option<MediaLocator>> {
        let target = self
            .stream_url
            .replace("{id}", id.as_str())
            .replace("{cid}", &cid.to_string());

        let response = self
            .fetcher
            .fetch(&target, &Self::browser_headers(), Self::accept_platform_body)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        let envelope: PlayurlEnvelope = response.json()?;
        let locator = envelope
            .data
            .and_then(|d| d.dash)
            .and_then(|dash| dash.audio.into_iter().next())
            .map(|track| MediaLocator::new(&track.base_url));

        Ok(locator)
    }
}

#[async_trait]
impl MetadataSource for MetadataProvider {
    async fn fetch_metadata(
        &self,
        id: &VideoId,
    ) -> std::result::Result<VideoMetadata, PipelineError> {
        let target = self.metadata_url.replace("{id}", id.as_str());

        tracing::info!("Fetching metadata for video {}", id);
        let response = self
            .fetcher
            .fetch(&target, &Self::browser_headers(), Self::accept_platform_body)
            .await
            .map_err(|e| PipelineError::MetadataUnavailable(e.to_string()))?;

        let envelope: ViewEnvelope = response.json().map_err(|e| {
            PipelineError::MetadataUnavailable(format!("malformed video info response: {}", e))
        })?;

        let data = envelope.data.ok_or_else(|| {
            PipelineError::MetadataUnavailable("video info response carried no data".to_string())
        })?;

        // The captions fetch is the one failure the pipeline swallows by
        // design; the description is an acceptable degraded result.
        let caption_text = match self.fetch_captions(data.aid, data.cid).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Captions unavailable for {}: {}", id, e);
                None
            }
        };

        // The locator is optional at this layer; speech mode fails later
        // with a specific message when it is missing.
        let media_locator = match self.fetch_stream_locator(id, data.cid).await {
            Ok(locator) => locator,
            Err(e) => {
                tracing::warn!("No audio stream locator for {}: {}", id, e);
                None
            }
        };

        Ok(VideoMetadata {
            title: data.title,
            author: data.owner.name,
            description: data.desc,
            duration_secs: data.duration,
            caption_text,
            media_locator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::MockHttpTransport;
    use std::time::Duration;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.relays = vec!["https://relay.test/?q={target}".to_string()];
        config
    }

    fn json_response(value: serde_json::Value) -> crate::relay::RawResponse {
        crate::relay::RawResponse {
            status: 200,
            body: serde_json::to_vec(&value).unwrap(),
        }
    }

    fn view_body() -> serde_json::Value {
        serde_json::json!({
            "code": 0,
            "data": {
                "title": "T",
                "owner": { "name": "A" },
                "desc": "D",
                "aid": 77,
                "cid": 88,
                "duration": 120
            }
        })
    }

    #[tokio::test]
    async fn returns_metadata_when_secondary_fetches_fail() {
        let mut transport = MockHttpTransport::new();
        transport.expect_get().returning(|url, _, _| {
            let decoded = urlencoding::decode(url).unwrap().into_owned();
            if decoded.contains("/x/web-interface/view") {
                Ok(json_response(view_body()))
            } else {
                Err(anyhow::anyhow!("relay down"))
            }
        });

        let provider = MetadataProvider::new(Arc::new(transport), &test_config());
        let meta = provider.fetch_metadata(&VideoId::new("BVabc123")).await.unwrap();

        assert_eq!(meta.title, "T");
        assert_eq!(meta.author, "A");
        assert_eq!(meta.description, "D");
        assert_eq!(meta.duration_secs, 120);
        assert!(meta.caption_text.is_none());
        assert!(meta.media_locator.is_none());
        assert_eq!(meta.text_content(), "D");
    }

    #[tokio::test]
    async fn picks_up_captions_and_stream_locator() {
        let mut transport = MockHttpTransport::new();
        transport.expect_get().returning(|url, _, _| {
            let decoded = urlencoding::decode(url).unwrap().into_owned();
            if decoded.contains("/x/web-interface/view") {
                Ok(json_response(view_body()))
            } else if decoded.contains("/x/player/v2") {
                Ok(json_response(serde_json::json!({
                    "code": 0,
                    "data": { "subtitle": { "subtitles": [
                        { "subtitle_url": "//sub.test/lines.json" }
                    ]}}
                })))
            } else if decoded.contains("sub.test/lines.json") {
                Ok(json_response(serde_json::json!({
                    "body": [ { "content": "line one" }, { "content": "line two" } ]
                })))
            } else if decoded.contains("/x/player/playurl") {
                Ok(json_response(serde_json::json!({
                    "code": 0,
                    "data": { "dash": { "audio": [
                        { "baseUrl": "https://stream.test/a.m4s?expires=1" }
                    ]}}
                })))
            } else {
                Err(anyhow::anyhow!("unexpected url: {}", decoded))
            }
        });

        let provider = MetadataProvider::new(Arc::new(transport), &test_config());
        let meta = provider.fetch_metadata(&VideoId::new("BVabc123")).await.unwrap();

        assert_eq!(meta.caption_text.as_deref(), Some("line one\nline two"));
        assert_eq!(meta.text_content(), "line one\nline two");
        assert_eq!(
            meta.media_locator.unwrap().as_str(),
            "https://stream.test/a.m4s?expires=1"
        );
    }

    #[tokio::test]
    async fn platform_error_code_means_metadata_unavailable() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_get()
            .returning(|_, _, _| Ok(json_response(serde_json::json!({ "code": -404 }))));

        let provider = MetadataProvider::new(Arc::new(transport), &test_config());
        let err = provider
            .fetch_metadata(&VideoId::new("BVmissing"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::MetadataUnavailable(_)));
    }

    #[tokio::test]
    async fn relay_attempts_respect_configured_timeout() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_get()
            .withf(|_, _, timeout| *timeout == Duration::from_secs(20))
            .returning(|url, _, _| {
                let decoded = urlencoding::decode(url).unwrap().into_owned();
                if decoded.contains("/x/web-interface/view") {
                    Ok(json_response(view_body()))
                } else {
                    Err(anyhow::anyhow!("relay down"))
                }
            });

        let provider = MetadataProvider::new(Arc::new(transport), &test_config());
        assert!(provider.fetch_metadata(&VideoId::new("BVabc123")).await.is_ok());
    }
}
