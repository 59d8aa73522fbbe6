use std::sync::Arc;

use crate::audio::{AudioAcquirer, AudioSource};
use crate::config::Config;
use crate::metadata::{MetadataProvider, MetadataSource};
use crate::relay::{HttpTransport, ReqwestTransport};
use crate::resolver::LinkResolver;
use crate::staging::{AssetStager, StagingUploader};
use crate::transcribe::{
    SpeechTranscriber, StatusCallback, TokioClock, TranscriptSegment, TranscriptionOrchestrator,
};
use crate::PipelineError;

/// What the caller wants out of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptMode {
    /// Captions or description text only; no audio work
    Description,
    /// Full speech-to-text over the extracted audio track
    Speech,
}

/// Fixed checkpoints of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolve,
    Metadata,
    LocateAudio,
    Download,
    Stage,
    Submit,
    Transcribe,
    Done,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Resolve => "Resolving link",
            Phase::Metadata => "Fetching video info",
            Phase::LocateAudio => "Locating audio stream",
            Phase::Download => "Downloading audio",
            Phase::Stage => "Staging audio",
            Phase::Submit => "Submitting transcription job",
            Phase::Transcribe => "Transcribing",
            Phase::Done => "Done",
        }
    }
}

/// Progress signal emitted at each checkpoint; percent never decreases
/// within one run.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub percent: u8,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Externally visible output of one run
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub title: String,
    pub author: String,
    pub transcript_text: String,
    pub segments: Vec<TranscriptSegment>,
}

/// Composes resolver, metadata, audio, staging, and transcription into the
/// end-to-end flow. One controller may serve many runs; each run owns its
/// entire id-through-transcript chain, so independent runs never share
/// state. Any component failure aborts the run with a single error - there
/// is no cross-component recovery and no silent mode switch.
pub struct PipelineController {
    resolver: LinkResolver,
    metadata: Arc<dyn MetadataSource>,
    audio: Arc<dyn AudioSource>,
    stager: Arc<dyn AssetStager>,
    transcriber: Arc<dyn SpeechTranscriber>,
}

impl PipelineController {
    /// Wire up the production components from configuration
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());

        Ok(Self {
            resolver: LinkResolver::new(&config.platform.id_pattern)?,
            metadata: Arc::new(MetadataProvider::new(Arc::clone(&transport), config)),
            audio: Arc::new(AudioAcquirer::new(Arc::clone(&transport), config)),
            stager: Arc::new(StagingUploader::new(Arc::clone(&transport), config)),
            transcriber: Arc::new(TranscriptionOrchestrator::new(
                transport,
                Arc::new(TokioClock),
                config,
            )),
        })
    }

    pub fn new(
        resolver: LinkResolver,
        metadata: Arc<dyn MetadataSource>,
        audio: Arc<dyn AudioSource>,
        stager: Arc<dyn AssetStager>,
        transcriber: Arc<dyn SpeechTranscriber>,
    ) -> Self {
        Self {
            resolver,
            metadata,
            audio,
            stager,
            transcriber,
        }
    }

    /// Run the pipeline for one share link
    pub async fn run(
        &self,
        url: &str,
        api_key: &str,
        mode: TranscriptMode,
        on_progress: ProgressCallback,
    ) -> std::result::Result<PipelineResult, PipelineError> {
        let emit = |phase: Phase, percent: u8| {
            tracing::debug!("{} ({}%)", phase.label(), percent);
            on_progress(ProgressEvent { phase, percent });
        };

        emit(Phase::Resolve, 5);
        let id = self.resolver.resolve(url)?;

        emit(Phase::Metadata, 10);
        let meta = self.metadata.fetch_metadata(&id).await?;

        if meta.duration_secs > 1800 {
            tracing::info!(
                "Long video ({}); transcription may take a while",
                crate::utils::format_duration(meta.duration_secs)
            );
        }

        if mode == TranscriptMode::Description {
            let transcript_text = meta.text_content().to_string();
            emit(Phase::Done, 100);
            return Ok(PipelineResult {
                title: meta.title,
                author: meta.author,
                transcript_text,
                segments: Vec::new(),
            });
        }

        emit(Phase::LocateAudio, 20);
        let locator = meta.media_locator.clone().ok_or_else(|| {
            PipelineError::MetadataUnavailable(
                "the platform exposed no audio stream for this video".to_string(),
            )
        })?;

        emit(Phase::Download, 30);
        let payload = self.audio.download(&locator).await?;

        emit(Phase::Stage, 50);
        let staged_name = crate::utils::generate_unique_filename(id.as_str(), "m4s");
        let asset = self.stager.stage(payload, staged_name).await?;

        emit(Phase::Submit, 60);
        let job_id = self.transcriber.submit(&asset.public_url, api_key).await?;

        emit(Phase::Transcribe, 70);
        let progress = Arc::clone(&on_progress);
        let on_status: StatusCallback = Arc::new(move |_status, fraction| {
            // Climb smoothly from 70 toward 89 as the timeout budget burns;
            // 100 is reserved for the terminal success checkpoint
            let percent = (70.0 + fraction * 19.0).min(89.0) as u8;
            progress(ProgressEvent {
                phase: Phase::Transcribe,
                percent,
            });
        });

        let transcript = self
            .transcriber
            .await_completion(&job_id, api_key, on_status)
            .await?;

        emit(Phase::Done, 100);
        Ok(PipelineResult {
            title: meta.title,
            author: meta.author,
            transcript_text: transcript.full_text,
            segments: transcript.segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockAudioSource;
    use crate::metadata::{MediaLocator, MockMetadataSource, VideoMetadata};
    use crate::staging::{MockAssetStager, StagedAsset};
    use crate::transcribe::{JobStatus, MockSpeechTranscriber, Transcript};
    use std::sync::Mutex;

    fn resolver() -> LinkResolver {
        LinkResolver::new("BV[0-9A-Za-z]+").unwrap()
    }

    fn metadata(locator: Option<&str>) -> VideoMetadata {
        VideoMetadata {
            title: "T".to_string(),
            author: "A".to_string(),
            description: "D".to_string(),
            duration_secs: 120,
            caption_text: None,
            media_locator: locator.map(MediaLocator::new),
        }
    }

    fn controller(
        metadata: MockMetadataSource,
        audio: MockAudioSource,
        stager: MockAssetStager,
        transcriber: MockSpeechTranscriber,
    ) -> PipelineController {
        PipelineController::new(
            resolver(),
            Arc::new(metadata),
            Arc::new(audio),
            Arc::new(stager),
            Arc::new(transcriber),
        )
    }

    fn untouched_audio() -> MockAudioSource {
        let mut audio = MockAudioSource::new();
        audio.expect_download().times(0);
        audio
    }

    fn untouched_stager() -> MockAssetStager {
        let mut stager = MockAssetStager::new();
        stager.expect_stage().times(0);
        stager
    }

    fn untouched_transcriber() -> MockSpeechTranscriber {
        let mut transcriber = MockSpeechTranscriber::new();
        transcriber.expect_submit().times(0);
        transcriber.expect_await_completion().times(0);
        transcriber
    }

    fn ignore_progress() -> ProgressCallback {
        Arc::new(|_| {})
    }

    #[tokio::test]
    async fn description_mode_returns_text_without_audio_work() {
        // Scenario A: no track locator, description mode still succeeds
        let mut source = MockMetadataSource::new();
        source
            .expect_fetch_metadata()
            .times(1)
            .returning(|_| Ok(metadata(None)));

        let controller = controller(
            source,
            untouched_audio(),
            untouched_stager(),
            untouched_transcriber(),
        );

        let result = controller
            .run(
                "https://x.test/video/BVabc123",
                "key-1",
                TranscriptMode::Description,
                ignore_progress(),
            )
            .await
            .unwrap();

        assert_eq!(result.title, "T");
        assert_eq!(result.author, "A");
        assert_eq!(result.transcript_text, "D");
        assert!(result.segments.is_empty());
    }

    #[tokio::test]
    async fn description_mode_prefers_captions_over_description() {
        let mut source = MockMetadataSource::new();
        source.expect_fetch_metadata().returning(|_| {
            let mut meta = metadata(None);
            meta.caption_text = Some("caption line".to_string());
            Ok(meta)
        });

        let controller = controller(
            source,
            untouched_audio(),
            untouched_stager(),
            untouched_transcriber(),
        );

        let result = controller
            .run(
                "https://x.test/video/BVabc123",
                "key-1",
                TranscriptMode::Description,
                ignore_progress(),
            )
            .await
            .unwrap();

        assert_eq!(result.transcript_text, "caption line");
    }

    #[tokio::test]
    async fn unresolvable_link_stops_before_metadata() {
        let mut source = MockMetadataSource::new();
        source.expect_fetch_metadata().times(0);

        let controller = controller(
            source,
            untouched_audio(),
            untouched_stager(),
            untouched_transcriber(),
        );

        let err = controller
            .run(
                "https://x.test/about",
                "key-1",
                TranscriptMode::Description,
                ignore_progress(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnresolvableLink(_)));
    }

    #[tokio::test]
    async fn speech_mode_requires_a_media_locator() {
        let mut source = MockMetadataSource::new();
        source.expect_fetch_metadata().returning(|_| Ok(metadata(None)));

        let controller = controller(
            source,
            untouched_audio(),
            untouched_stager(),
            untouched_transcriber(),
        );

        let err = controller
            .run(
                "https://x.test/video/BVabc123",
                "key-1",
                TranscriptMode::Speech,
                ignore_progress(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MetadataUnavailable(_)));
    }

    #[tokio::test]
    async fn failed_download_aborts_before_staging() {
        // Scenario B: all relays fail the download, no staging or submission
        let mut source = MockMetadataSource::new();
        source
            .expect_fetch_metadata()
            .returning(|_| Ok(metadata(Some("https://stream.test/a.m4s"))));

        let mut audio = MockAudioSource::new();
        audio
            .expect_download()
            .times(1)
            .returning(|_| Err(PipelineError::AudioDownloadFailed { attempts: 3 }));

        let controller = controller(source, audio, untouched_stager(), untouched_transcriber());

        let err = controller
            .run(
                "https://x.test/video/BVabc123",
                "key-1",
                TranscriptMode::Speech,
                ignore_progress(),
            )
            .await
            .unwrap_err();
        match err {
            PipelineError::AudioDownloadFailed { attempts } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn speech_mode_runs_the_full_chain() {
        let mut source = MockMetadataSource::new();
        source
            .expect_fetch_metadata()
            .returning(|_| Ok(metadata(Some("https://stream.test/a.m4s"))));

        let mut audio = MockAudioSource::new();
        audio
            .expect_download()
            .times(1)
            .returning(|_| Ok(vec![0u8; 4096]));

        let mut stager = MockAssetStager::new();
        stager
            .expect_stage()
            .times(1)
            .withf(|payload, name| payload.len() == 4096 && name.contains("BVabc123"))
            .returning(|payload, _| {
                Ok(StagedAsset {
                    public_url: "https://file.io/abc".to_string(),
                    size_bytes: payload.len() as u64,
                })
            });

        let mut transcriber = MockSpeechTranscriber::new();
        transcriber
            .expect_submit()
            .times(1)
            .withf(|url, key| url == "https://file.io/abc" && key == "key-1")
            .returning(|_, _| Ok("task-42".to_string()));
        transcriber
            .expect_await_completion()
            .times(1)
            .returning(|_, _, on_status| {
                on_status(JobStatus::Running, 0.1);
                on_status(JobStatus::Succeeded, 0.2);
                Ok(Transcript {
                    full_text: "hello\nworld".to_string(),
                    segments: vec![TranscriptSegment {
                        text: "hello world".to_string(),
                        start_ms: 0,
                        end_ms: 1800,
                    }],
                })
            });

        let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let on_progress: ProgressCallback = Arc::new(move |event| {
            sink.lock().unwrap().push(event);
        });

        let controller = controller(source, audio, stager, transcriber);
        let result = controller
            .run(
                "https://x.test/video/BVabc123",
                "key-1",
                TranscriptMode::Speech,
                on_progress,
            )
            .await
            .unwrap();

        assert_eq!(result.transcript_text, "hello\nworld");
        assert_eq!(result.segments.len(), 1);

        let events = events.lock().unwrap();
        assert_eq!(events.first().unwrap().phase, Phase::Resolve);
        assert_eq!(events.last().unwrap().phase, Phase::Done);
        assert_eq!(events.last().unwrap().percent, 100);
        // Percent never decreases across the run
        assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));
        // Poll-loop updates stay below the terminal checkpoint
        assert!(events
            .iter()
            .filter(|e| e.phase == Phase::Transcribe)
            .all(|e| (70..=89).contains(&e.percent)));
    }
}
