use std::time::Duration;

use sqlx::PgPool;

const PING_TIMEOUT: Duration = Duration::from_secs(3);

/// Round-trips a trivial query, bounded so a hung pool reports unhealthy.
pub(crate) async fn ping(pool: &PgPool) -> Result<(), String> {
    match tokio::time::timeout(PING_TIMEOUT, sqlx::query("SELECT 1").execute(pool)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err(format!("timed out after {}s", PING_TIMEOUT.as_secs())),
    }
}
