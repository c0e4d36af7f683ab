use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("grading_jobs_total", "AI grading runs by terminal outcome");
    metrics::describe_counter!(
        "provider_attempts_total",
        "External AI provider calls by capability, provider and outcome"
    );
    metrics::describe_counter!(
        "evaluation_fallback_total",
        "Evaluations that fell back to the deterministic fallback score"
    );
    metrics::describe_counter!("progress_cascades_total", "Progress recomputations by level");
    metrics::describe_histogram!("grading_duration_seconds", "Wall time of one AI grading run");
    metrics::describe_gauge!(
        "grading_assignments_overdue",
        "Assigned grading assignments past their deadline"
    );
}
