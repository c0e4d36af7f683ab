pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use crate::core::{config::Settings, redis::RedisHandle, state::AppState, telemetry};

async fn bootstrap() -> anyhow::Result<(AppState, RedisHandle)> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; continuing without rate limits");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let state = AppState::from_settings(settings, db_pool, redis.clone()).await?;
    Ok((state, redis))
}

pub async fn run() -> anyhow::Result<()> {
    let (state, redis) = bootstrap().await?;

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Speakwise grading API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    let (state, redis) = bootstrap().await?;

    tracing::info!(
        stale_after_seconds = state.settings().grading().stale_after_seconds,
        "Speakwise grading worker started"
    );
    let result = tasks::scheduler::run(state).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
