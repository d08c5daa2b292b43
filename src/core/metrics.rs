use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn record_status_change(kind: &'static str, accepted: bool) {
    let outcome = if accepted { "accepted" } else { "rejected" };
    metrics::counter!("content_status_changes_total", "kind" => kind, "outcome" => outcome)
        .increment(1);
}

pub(crate) fn record_attempt_start(outcome: &'static str) {
    metrics::counter!("attempts_started_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_attempt_graded(late: bool) {
    metrics::counter!("attempts_graded_total", "late" => if late { "true" } else { "false" })
        .increment(1);
}
