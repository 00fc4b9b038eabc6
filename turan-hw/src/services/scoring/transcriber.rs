//! Transcription collaborator client
//!
//! The collaborator takes audio bytes with their content type and returns
//! text plus a confidence in [0, 1]. It does no retrying of its own; the
//! scoring worker owns retries and timeouts.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{HomeworkError, HwResult};

const USER_AGENT: &str = concat!("turan-hw/", env!("CARGO_PKG_VERSION"));

/// Transcription output
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub confidence: f64,
    #[serde(default)]
    pub language: Option<String>,
}

/// Speech-to-text collaborator
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8], content_type: &str) -> HwResult<TranscriptionResult>;
}

/// Transcriber calling an HTTP endpoint
///
/// POSTs the raw audio with its `Content-Type` and expects
/// `{"text": "...", "confidence": 0.93, "language": "uz"}`.
pub struct HttpTranscriber {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTranscriber {
    /// `request_timeout` is a transport ceiling; the worker applies its own
    /// per-attempt timeout on top
    pub fn new(endpoint: String, api_key: Option<String>, request_timeout: Duration) -> HwResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| HomeworkError::ExternalService(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: &[u8], content_type: &str) -> HwResult<TranscriptionResult> {
        let mut request = self
            .http_client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(audio.to_vec());

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(bytes = audio.len(), content_type, "Sending audio for transcription");

        let response = request
            .send()
            .await
            .map_err(|e| HomeworkError::ExternalService(format!("Transcription request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HomeworkError::ExternalService(format!(
                "Transcription service returned {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        let result: TranscriptionResult = response
            .json()
            .await
            .map_err(|e| HomeworkError::ExternalService(format!("Invalid transcription response: {}", e)))?;

        validate_result(result)
    }
}

/// Placeholder used when no endpoint is configured; every call fails
#[derive(Debug, Default)]
pub struct UnconfiguredTranscriber;

#[async_trait]
impl Transcriber for UnconfiguredTranscriber {
    async fn transcribe(&self, _audio: &[u8], _content_type: &str) -> HwResult<TranscriptionResult> {
        Err(HomeworkError::ExternalService(
            "No transcription endpoint configured".to_string(),
        ))
    }
}

fn validate_result(result: TranscriptionResult) -> HwResult<TranscriptionResult> {
    if !(0.0..=1.0).contains(&result.confidence) {
        return Err(HomeworkError::ExternalService(format!(
            "Transcription confidence out of range: {}",
            result.confidence
        )));
    }
    Ok(result)
}
