pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::storage::StorageService;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let state = build_state(settings).await?;
    if let Err(err) = core::bootstrap::ensure_superuser(&state).await {
        tracing::error!(error = %err, "Failed to ensure default superuser");
    }

    serve(state).await
}

async fn build_state(settings: Settings) -> anyhow::Result<AppState> {
    let pool = db::connect(settings.database()).await?;
    db::migrate(&pool).await?;

    let storage = StorageService::from_settings(&settings).await?;
    if storage.is_none() {
        tracing::warn!("S3 credentials not configured; lecture files are disabled");
    }

    Ok(AppState::new(settings, pool, storage))
}

async fn serve(state: AppState) -> anyhow::Result<()> {
    let settings = state.settings();
    let listener = tokio::net::TcpListener::bind(settings.server_addr()).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        environment = settings.runtime().environment.as_str(),
        "CourseHub API listening"
    );

    let app = api::router::router(state.clone());
    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    tracing::info!("CourseHub API stopped");
    Ok(())
}
