use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration};

use crate::core::shutdown::shutdown_channel;
use crate::core::state::AppState;

const RECOVERY_INTERVAL: Duration = Duration::from_secs(60);
const OVERDUE_REPORT_INTERVAL: Duration = Duration::from_secs(300);
const RECOVERY_BATCH_SIZE: i64 = 20;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let shutdown = shutdown_channel();

    let handles = vec![
        tokio::spawn(recover_stale_loop(state.clone(), shutdown.clone())),
        tokio::spawn(report_overdue_loop(state, shutdown)),
    ];

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn recover_stale_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let stale_after = Duration::from_secs(state.settings().grading().stale_after_seconds);
    let mut tick = interval(RECOVERY_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                match state.pipeline().recover_stale(stale_after, RECOVERY_BATCH_SIZE).await {
                    Ok(0) => {}
                    Ok(count) => tracing::info!(count, "Stale submissions re-graded"),
                    Err(err) => tracing::error!(error = %err, "recover_stale failed"),
                }
            }
        }
    }
}

async fn report_overdue_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(OVERDUE_REPORT_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = state.pipeline().report_overdue().await {
                    tracing::error!(error = %err, "report_overdue failed");
                }
            }
        }
    }
}
