use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(default_level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let filter = build_filter(&settings.telemetry().log_level);
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(fmt::format::FmtSpan::CLOSE);

    let result =
        if settings.telemetry().json { builder.json().try_init() } else { builder.try_init() };

    result.map_err(|err| anyhow::anyhow!(err.to_string()))?;

    tracing::debug!(
        environment = settings.runtime().environment.as_str(),
        json = settings.telemetry().json,
        "Tracing initialized"
    );
    Ok(())
}
