//! Speech-to-text with an ordered provider chain.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::{ProviderSettings, Settings};
use crate::services::retry::{with_retries, CallSite, RetryPolicy};
use crate::services::storage::{audio_extension, BlobStorage};

pub(crate) const AUDIO_TOO_SHORT: &str = "audio too short";

/// A downloaded recording, living in a temp file for the duration of one run.
#[derive(Debug)]
pub(crate) struct LocalAudio {
    pub(crate) path: PathBuf,
    pub(crate) mime_type: String,
}

impl LocalAudio {
    fn file_name(&self) -> String {
        let extension = self.path.extension().and_then(|ext| ext.to_str()).unwrap_or("bin");
        format!("audio.{extension}")
    }
}

#[async_trait]
pub(crate) trait Transcriber: Send + Sync {
    fn name(&self) -> &str;

    async fn transcribe(&self, audio: &LocalAudio, language_code: &str) -> anyhow::Result<String>;
}

/// Where the recording lives and what the submission recorded about it.
#[derive(Debug, Clone)]
pub(crate) struct AudioRef<'a> {
    pub(crate) key: &'a str,
    pub(crate) size_bytes: i64,
    pub(crate) mime_type: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TranscriptionOutcome {
    Transcribed { text: String, provider: String },
    /// Pre-filter rejected the audio before any provider ran.
    Rejected { reason: String },
    Exhausted { reason: String },
}

pub(crate) struct TranscriptionGateway {
    providers: Vec<(Arc<dyn Transcriber>, RetryPolicy)>,
    storage: Arc<dyn BlobStorage>,
    min_audio_bytes: usize,
}

impl TranscriptionGateway {
    pub(crate) fn new(
        providers: Vec<(Arc<dyn Transcriber>, RetryPolicy)>,
        storage: Arc<dyn BlobStorage>,
        min_audio_bytes: usize,
    ) -> Self {
        Self { providers, storage, min_audio_bytes }
    }

    pub(crate) fn from_settings(
        settings: &Settings,
        storage: Arc<dyn BlobStorage>,
    ) -> anyhow::Result<Self> {
        let grading = settings.grading();
        let backoff = Duration::from_millis(grading.provider_backoff_ms);
        let mut providers: Vec<(Arc<dyn Transcriber>, RetryPolicy)> = Vec::new();

        if settings.ai().speech.is_configured() {
            let provider = &settings.ai().speech;
            providers.push((
                Arc::new(SpeechApiTranscriber::new(provider)?),
                policy_for(provider, grading.transcription_attempts, backoff),
            ));
        }
        if settings.ai().multimodal.is_configured() {
            let provider = &settings.ai().multimodal;
            providers.push((
                Arc::new(MultimodalTranscriber::new(provider)?),
                policy_for(provider, grading.transcription_attempts, backoff),
            ));
        }
        if providers.is_empty() {
            tracing::warn!("No transcription provider configured; every submission will fail");
        }

        Ok(Self::new(providers, storage, grading.min_audio_bytes))
    }

    pub(crate) async fn transcribe(
        &self,
        audio: AudioRef<'_>,
        language_code: &str,
        submission_id: &str,
    ) -> TranscriptionOutcome {
        if audio.size_bytes < self.min_audio_bytes as i64 {
            tracing::info!(
                submission_id = %submission_id,
                size_bytes = audio.size_bytes,
                "Audio below minimum length, skipping providers"
            );
            return TranscriptionOutcome::Rejected { reason: AUDIO_TOO_SHORT.to_string() };
        }

        // The temp file is removed when `_file` drops, whichever branch returns.
        let (_file, local) = match self.download(audio.key, audio.mime_type).await {
            Ok(downloaded) => downloaded,
            Err(err) => {
                tracing::error!(
                    submission_id = %submission_id,
                    error = %format!("{err:#}"),
                    "Failed to fetch submission audio"
                );
                return TranscriptionOutcome::Exhausted {
                    reason: "audio could not be retrieved".to_string(),
                };
            }
        };

        if file_len(&local.path).await < self.min_audio_bytes as u64 {
            return TranscriptionOutcome::Rejected { reason: AUDIO_TOO_SHORT.to_string() };
        }

        let local = &local;
        for (provider, policy) in &self.providers {
            let site = CallSite {
                capability: "transcription",
                provider: provider.name(),
                submission_id,
            };
            let result = with_retries(site, *policy, |_| async move {
                let text = provider.transcribe(local, language_code).await?;
                let text = text.trim().to_string();
                if text.is_empty() {
                    return Err(anyhow!("provider returned an empty transcript"));
                }
                Ok(text)
            })
            .await;

            match result {
                Ok(text) => {
                    return TranscriptionOutcome::Transcribed {
                        text,
                        provider: provider.name().to_string(),
                    };
                }
                Err(_) => {
                    tracing::warn!(
                        submission_id = %submission_id,
                        provider = provider.name(),
                        "Transcription provider exhausted, trying next"
                    );
                }
            }
        }

        TranscriptionOutcome::Exhausted {
            reason: "speech could not be transcribed by any provider".to_string(),
        }
    }

    async fn download(
        &self,
        key: &str,
        mime_type: &str,
    ) -> anyhow::Result<(tempfile::NamedTempFile, LocalAudio)> {
        let bytes = self.storage.download(key).await?;
        let extension = Path::new(key).extension().and_then(|ext| ext.to_str()).unwrap_or("bin");
        let file = tempfile::Builder::new()
            .prefix("speakwise-audio-")
            .suffix(&format!(".{extension}"))
            .tempfile()
            .context("Failed to create temp audio file")?;
        tokio::fs::write(file.path(), &bytes).await.context("Failed to write temp audio file")?;
        let local = LocalAudio { path: file.path().to_path_buf(), mime_type: mime_type.to_string() };
        Ok((file, local))
    }
}

async fn file_len(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|meta| meta.len()).unwrap_or(0)
}

pub(crate) fn policy_for(provider: &ProviderSettings, attempts: u32, backoff: Duration) -> RetryPolicy {
    RetryPolicy { attempts, backoff, timeout: Duration::from_secs(provider.timeout_seconds) }
}

fn http_client(provider: &ProviderSettings) -> anyhow::Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(provider.timeout_seconds))
        .build()
        .context("Failed to build HTTP client")
}

/// OpenAI-compatible `/audio/transcriptions` endpoint (Whisper and friends).
pub(crate) struct SpeechApiTranscriber {
    client: Client,
    name: String,
    api_key: String,
    base_url: String,
    model: String,
}

impl SpeechApiTranscriber {
    pub(crate) fn new(provider: &ProviderSettings) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(provider)?,
            name: provider.name.clone(),
            api_key: provider.api_key.clone(),
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            model: provider.model.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for SpeechApiTranscriber {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transcribe(&self, audio: &LocalAudio, language_code: &str) -> anyhow::Result<String> {
        let bytes = tokio::fs::read(&audio.path).await.context("Failed to read temp audio")?;
        let part = Part::bytes(bytes).file_name(audio.file_name()).mime_str(&audio.mime_type)?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", language_code.to_string())
            .text("response_format", "json");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed to call speech API")?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(anyhow!("speech API error {status}: {body}"));
        }

        body.get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("Missing transcript text in speech API response")
    }
}

/// General-purpose multimodal chat model asked to transcribe inline audio.
pub(crate) struct MultimodalTranscriber {
    client: Client,
    name: String,
    api_key: String,
    base_url: String,
    model: String,
}

impl MultimodalTranscriber {
    pub(crate) fn new(provider: &ProviderSettings) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(provider)?,
            name: provider.name.clone(),
            api_key: provider.api_key.clone(),
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            model: provider.model.clone(),
        })
    }
}

fn audio_format(mime_type: &str) -> anyhow::Result<&'static str> {
    audio_extension(mime_type)
        .ok_or_else(|| anyhow::anyhow!("unsupported audio format {mime_type}"))
}

#[async_trait]
impl Transcriber for MultimodalTranscriber {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transcribe(&self, audio: &LocalAudio, language_code: &str) -> anyhow::Result<String> {
        let format = audio_format(&audio.mime_type)?;
        let bytes = tokio::fs::read(&audio.path).await.context("Failed to read temp audio")?;
        let payload = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "text",
                        "text": format!(
                            "Transcribe this recording verbatim. The speaker uses language \
                             code '{language_code}'. Reply with the transcript only."
                        )
                    },
                    {
                        "type": "input_audio",
                        "input_audio": {
                            "data": STANDARD.encode(&bytes),
                            "format": format
                        }
                    }
                ]
            }],
            "temperature": 0
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to call multimodal API")?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(anyhow!("multimodal API error {status}: {body}"));
        }

        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("Missing transcript in multimodal response")
    }
}
