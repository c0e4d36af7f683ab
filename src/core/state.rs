use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::repositories::postgres::PgGradingStore;
use crate::repositories::GradingStore;
use crate::services::evaluation::EvaluationGateway;
use crate::services::grading::{GradingPipeline, PipelineLimits};
use crate::services::notifications;
use crate::services::storage::{BlobStorage, S3BlobStorage};
use crate::services::transcription::TranscriptionGateway;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn GradingStore>,
    redis: RedisHandle,
    pipeline: Arc<GradingPipeline>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        store: Arc<dyn GradingStore>,
        redis: RedisHandle,
        pipeline: Arc<GradingPipeline>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, store, redis, pipeline }) }
    }

    /// Wires the production collaborators: Postgres store, S3 audio storage,
    /// provider gateways and the configured notifier.
    pub(crate) async fn from_settings(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
    ) -> anyhow::Result<Self> {
        let store: Arc<dyn GradingStore> = Arc::new(PgGradingStore::new(db));
        let storage: Arc<dyn BlobStorage> = Arc::new(
            S3BlobStorage::from_settings(&settings)
                .await?
                .context("S3 storage is not configured; set S3_ACCESS_KEY and S3_SECRET_KEY")?,
        );

        let transcription = TranscriptionGateway::from_settings(&settings, storage.clone())?;
        let evaluation = EvaluationGateway::from_settings(&settings)?;
        let notifier = notifications::from_settings(&settings)?;
        let grading = settings.grading();
        let limits = PipelineLimits {
            review_window_hours: grading.review_window_hours,
            max_audio_bytes: usize::try_from(grading.max_audio_size_mb * 1024 * 1024)
                .unwrap_or(usize::MAX),
        };
        let pipeline = Arc::new(GradingPipeline::new(
            store.clone(),
            storage,
            transcription,
            evaluation,
            notifier,
            limits,
        ));

        Ok(Self::new(settings, store, redis, pipeline))
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &Arc<dyn GradingStore> {
        &self.inner.store
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn pipeline(&self) -> &Arc<GradingPipeline> {
        &self.inner.pipeline
    }
}
