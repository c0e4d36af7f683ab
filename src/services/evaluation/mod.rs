//! Rubric scoring of a transcript with primary/secondary model fallback.
//!
//! Unusable output is a failed attempt like any transport error, so it is
//! retried and then falls over to the next provider. When the whole chain
//! is spent the gateway still answers, with `EvaluationOutcome::Degraded`.

mod prompt;
mod report;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::{ProviderSettings, Settings};
use crate::services::retry::{with_retries, CallSite, RetryPolicy};
use crate::services::transcription::policy_for;

use prompt::build_prompt;
use report::{fallback_report, parse_report};

pub(crate) use prompt::{EvaluationPrompt, PromptContext};
pub(crate) use report::ScoreReport;

#[async_trait]
pub(crate) trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    /// Raw model text for the prompt; parsing happens in the gateway.
    async fn complete(&self, prompt: &EvaluationPrompt) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EvaluationOutcome {
    Scored { report: ScoreReport, provider: String },
    Degraded { report: ScoreReport, reason: String },
}

impl EvaluationOutcome {
    pub(crate) fn report(&self) -> &ScoreReport {
        match self {
            Self::Scored { report, .. } | Self::Degraded { report, .. } => report,
        }
    }

    pub(crate) fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

pub(crate) struct EvaluationGateway {
    providers: Vec<(Arc<dyn Evaluator>, RetryPolicy)>,
    fallback_score: u32,
    max_images: usize,
}

impl EvaluationGateway {
    pub(crate) fn new(
        providers: Vec<(Arc<dyn Evaluator>, RetryPolicy)>,
        fallback_score: u32,
        max_images: usize,
    ) -> Self {
        Self { providers, fallback_score, max_images }
    }

    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let ai = settings.ai();
        let grading = settings.grading();
        let backoff = Duration::from_millis(grading.provider_backoff_ms);
        let mut providers: Vec<(Arc<dyn Evaluator>, RetryPolicy)> = Vec::new();

        for provider in [&ai.primary_evaluator, &ai.secondary_evaluator] {
            if provider.is_configured() {
                providers.push((
                    Arc::new(ChatCompletionEvaluator::new(provider, ai.max_tokens, ai.temperature)?),
                    policy_for(provider, grading.evaluation_attempts, backoff),
                ));
            }
        }
        if providers.is_empty() {
            tracing::warn!("No evaluation provider configured; every evaluation will degrade");
        }

        Ok(Self::new(providers, grading.fallback_score, grading.max_images))
    }

    pub(crate) async fn evaluate(
        &self,
        context: &PromptContext,
        transcript: &str,
        submission_id: &str,
    ) -> EvaluationOutcome {
        let prompt = build_prompt(context, transcript, self.max_images);
        let prompt = &prompt;
        let language_code = context.language_code.as_str();

        for (provider, policy) in &self.providers {
            let site = CallSite { capability: "evaluation", provider: provider.name(), submission_id };
            let result = with_retries(site, *policy, |_| async move {
                let raw = provider.complete(prompt).await?;
                parse_report(&raw, language_code).map_err(|err| anyhow!(err))
            })
            .await;

            if let Ok(report) = result {
                return EvaluationOutcome::Scored { report, provider: provider.name().to_string() };
            }
        }

        metrics::counter!("evaluation_fallback_total").increment(1);
        tracing::warn!(
            submission_id = %submission_id,
            fallback_score = self.fallback_score,
            "Every evaluation provider failed, substituting fallback score"
        );
        EvaluationOutcome::Degraded {
            report: fallback_report(language_code, self.fallback_score),
            reason: "evaluation providers unavailable".to_string(),
        }
    }
}

/// OpenAI-compatible chat completions endpoint with JSON output.
pub(crate) struct ChatCompletionEvaluator {
    client: Client,
    name: String,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl ChatCompletionEvaluator {
    pub(crate) fn new(
        provider: &ProviderSettings,
        max_tokens: u32,
        temperature: f64,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(provider.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            name: provider.name.clone(),
            api_key: provider.api_key.clone(),
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            model: provider.model.clone(),
            max_tokens,
            temperature,
        })
    }

    fn payload(&self, prompt: &EvaluationPrompt) -> Value {
        let mut content = vec![json!({"type": "text", "text": prompt.user})];
        for image in &prompt.images {
            content.push(json!({"type": "image_url", "image_url": {"url": image}}));
        }

        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": content}
            ],
            "max_completion_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"}
        })
    }
}

#[async_trait]
impl Evaluator for ChatCompletionEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &EvaluationPrompt) -> anyhow::Result<String> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.payload(prompt))
            .send()
            .await
            .with_context(|| format!("Failed to call {}", self.name))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(anyhow!("{} error {status}: {body}", self.name));
        }

        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .with_context(|| format!("Missing content in {} response", self.name))
    }
}
