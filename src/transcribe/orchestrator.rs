use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::{Clock, JobStatus, SpeechTranscriber, StatusCallback, Transcript, TranscriptSegment};
use crate::config::Config;
use crate::relay::HttpTransport;
use crate::PipelineError;

// Wire shapes of the transcription service.

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    code: Option<String>,
    message: Option<String>,
    output: Option<SubmitOutput>,
}

#[derive(Debug, Deserialize)]
struct SubmitOutput {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    output: Option<PollOutput>,
}

#[derive(Debug, Deserialize)]
struct PollOutput {
    task_status: String,
    #[serde(default)]
    results: Vec<PollResultEntry>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PollResultEntry {
    transcription_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultPayload {
    #[serde(default)]
    transcripts: Vec<ResultTranscript>,
}

#[derive(Debug, Deserialize)]
struct ResultTranscript {
    #[serde(default)]
    text: String,
    #[serde(default)]
    sentences: Vec<ResultSentence>,
}

#[derive(Debug, Deserialize)]
struct ResultSentence {
    #[serde(default)]
    text: String,
    #[serde(default)]
    begin_time: u64,
    #[serde(default)]
    end_time: u64,
}

/// Drives one asynchronous transcription job: submit, poll to a terminal
/// state under a wall-clock budget, then fetch and parse the result.
///
/// The service has no cancellation call; on timeout the job is simply
/// abandoned locally and may still complete remotely.
pub struct TranscriptionOrchestrator {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    submit_url: String,
    poll_url: String,
    model: String,
    language_hints: Vec<String>,
    poll_interval: Duration,
    timeout: Duration,
    request_timeout: Duration,
}

impl TranscriptionOrchestrator {
    pub fn new(transport: Arc<dyn HttpTransport>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            transport,
            clock,
            submit_url: config.transcription.submit_url.clone(),
            poll_url: config.transcription.poll_url.clone(),
            model: config.transcription.model.clone(),
            language_hints: config.transcription.language_hints.clone(),
            poll_interval: config.poll_interval(),
            timeout: config.transcription_timeout(),
            request_timeout: config.attempt_timeout(),
        }
    }

    fn auth_headers(api_key: &str) -> Vec<(String, String)> {
        vec![("Authorization".to_string(), format!("Bearer {}", api_key))]
    }

    async fn poll_once(
        &self,
        job_id: &str,
        api_key: &str,
    ) -> crate::Result<(JobStatus, Option<String>, Option<String>)> {
        let url = self.poll_url.replace("{task_id}", job_id);
        let response = self
            .transport
            .get(&url, Self::auth_headers(api_key), self.request_timeout)
            .await?;

        if !response.is_success() {
            anyhow::bail!("status poll returned HTTP {}", response.status);
        }

        let parsed: PollResponse = response.json()?;
        let output = parsed
            .output
            .ok_or_else(|| anyhow::anyhow!("status poll response carried no output"))?;

        let status = JobStatus::parse(&output.task_status);
        let result_url = output
            .results
            .into_iter()
            .find_map(|entry| entry.transcription_url);

        Ok((status, result_url, output.message))
    }

    /// Fetch the result payload and assemble the transcript.
    ///
    /// Transcript texts are concatenated in document order, newline-joined;
    /// sentence offsets become segments when the service provides them.
    async fn fetch_result(&self, result_url: &str) -> crate::Result<Transcript> {
        let response = self
            .transport
            .get(result_url, Vec::new(), self.request_timeout)
            .await?;

        if !response.is_success() {
            anyhow::bail!("result fetch returned HTTP {}", response.status);
        }

        let payload: ResultPayload = response.json()?;

        let full_text = payload
            .transcripts
            .iter()
            .map(|t| t.text.as_str())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let segments = payload
            .transcripts
            .into_iter()
            .flat_map(|t| t.sentences)
            .map(|s| TranscriptSegment {
                text: s.text,
                start_ms: s.begin_time,
                end_ms: s.end_time,
            })
            .collect();

        Ok(Transcript {
            full_text,
            segments,
        })
    }
}

#[async_trait]
impl SpeechTranscriber for TranscriptionOrchestrator {
    async fn submit(
        &self,
        staged_url: &str,
        api_key: &str,
    ) -> std::result::Result<String, PipelineError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": { "file_urls": [staged_url] },
            "parameters": { "language_hints": self.language_hints },
        });

        let mut headers = Self::auth_headers(api_key);
        headers.push(("X-DashScope-Async".to_string(), "enable".to_string()));

        tracing::info!("Submitting transcription job for {}", staged_url);
        let response = self
            .transport
            .post_json(&self.submit_url, headers, body, self.request_timeout)
            .await
            .map_err(|e| PipelineError::SubmissionRejected(e.to_string()))?;

        let parsed: SubmitResponse = response
            .json()
            .map_err(|e| PipelineError::SubmissionRejected(e.to_string()))?;

        if !response.is_success() || parsed.code.is_some() {
            let message = parsed
                .message
                .or(parsed.code)
                .unwrap_or_else(|| format!("HTTP {}", response.status));
            return Err(PipelineError::SubmissionRejected(message));
        }

        let output = parsed.output.ok_or_else(|| {
            PipelineError::SubmissionRejected("service returned no task id".to_string())
        })?;

        tracing::info!("Job accepted: {}", output.task_id);
        Ok(output.task_id)
    }

    async fn await_completion(
        &self,
        job_id: &str,
        api_key: &str,
        on_status: StatusCallback,
    ) -> std::result::Result<Transcript, PipelineError> {
        let started = self.clock.now();

        loop {
            let elapsed = self.clock.now().duration_since(started);
            if elapsed >= self.timeout {
                tracing::warn!("Abandoning job {} after {:?}", job_id, self.timeout);
                return Err(PipelineError::TranscriptionTimedOut(self.timeout.as_secs()));
            }

            self.clock.sleep(self.poll_interval).await;

            let (status, result_url, message) = match self.poll_once(job_id, api_key).await {
                Ok(observed) => observed,
                Err(e) => {
                    // A flaky poll is not a job failure; the timeout bounds us
                    tracing::warn!("Status poll for {} failed: {}", job_id, e);
                    continue;
                }
            };

            let elapsed = self.clock.now().duration_since(started);
            let fraction = (elapsed.as_secs_f64() / self.timeout.as_secs_f64()).min(1.0);
            on_status(status, fraction);
            tracing::debug!("Job {} is {} ({}s elapsed)", job_id, status.label(), elapsed.as_secs());

            match status {
                JobStatus::Succeeded => {
                    let result_url = result_url.ok_or_else(|| {
                        PipelineError::TranscriptionFailed(
                            "job succeeded but returned no result locator".to_string(),
                        )
                    })?;

                    let transcript = self
                        .fetch_result(&result_url)
                        .await
                        .map_err(|e| PipelineError::TranscriptionFailed(e.to_string()))?;

                    if transcript.full_text.is_empty() {
                        return Err(PipelineError::TranscriptionFailed(
                            "transcription produced no text".to_string(),
                        ));
                    }

                    return Ok(transcript);
                }
                JobStatus::Failed => {
                    return Err(PipelineError::TranscriptionFailed(
                        message.unwrap_or_else(|| "remote job failed".to_string()),
                    ));
                }
                _ => {}
            }
        }
    }
}
