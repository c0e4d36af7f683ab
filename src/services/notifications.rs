use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::core::config::Settings;
use crate::db::types::SubmissionStatus;

/// Outcome a learner is told about once grading reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct GradeVerdict {
    pub(crate) submission_id: String,
    pub(crate) exercise_id: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) final_score: f64,
    pub(crate) passed: bool,
    pub(crate) message: Option<String>,
}

#[async_trait]
pub(crate) trait Notifier: Send + Sync {
    async fn notify_grade_result(&self, user_id: &str, verdict: &GradeVerdict)
        -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub(crate) struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_grade_result(
        &self,
        user_id: &str,
        verdict: &GradeVerdict,
    ) -> anyhow::Result<()> {
        tracing::info!(
            user_id = %user_id,
            submission_id = %verdict.submission_id,
            status = verdict.status.as_str(),
            final_score = verdict.final_score,
            passed = verdict.passed,
            "Grade result ready"
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct WebhookNotifier {
    client: Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    event: &'static str,
    user_id: &'a str,
    verdict: &'a GradeVerdict,
}

impl WebhookNotifier {
    pub(crate) fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build notification HTTP client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_grade_result(
        &self,
        user_id: &str,
        verdict: &GradeVerdict,
    ) -> anyhow::Result<()> {
        let payload = WebhookPayload { event: "grade_result", user_id, verdict };
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("Failed to deliver grade notification")?
            .error_for_status()
            .context("Notification endpoint rejected grade result")?;
        Ok(())
    }
}

/// Webhook delivery when `NOTIFY_WEBHOOK_URL` is set, log-only otherwise.
pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn Notifier>> {
    let notifications = settings.notifications();
    match notifications.webhook_url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(
            url.to_string(),
            Duration::from_secs(notifications.timeout_seconds),
        )?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
