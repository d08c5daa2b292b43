use uuid::Uuid;

use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
use crate::repositories;
use crate::repositories::users::{CreateUser, UpdateUser};

/// Creates the configured admin account, or brings an existing one back to
/// an active admin with the configured password.
pub(crate) async fn ensure_superuser(state: &AppState) -> anyhow::Result<()> {
    let admin = state.settings().admin();
    if admin.first_superuser_password.is_empty() {
        tracing::warn!("FIRST_SUPERUSER_PASSWORD not configured; skipping superuser creation");
        return Ok(());
    }

    let email = admin.first_superuser_email.trim().to_lowercase();
    let now = primitive_now_utc();

    if let Some(user) = repositories::users::find_by_email(state.db(), &email).await? {
        let verified =
            security::verify_password(&admin.first_superuser_password, &user.hashed_password)
                .unwrap_or(false);
        let hashed_password = if verified {
            None
        } else {
            Some(security::hash_password(&admin.first_superuser_password)?)
        };

        let needs_update =
            hashed_password.is_some() || user.role != UserRole::Admin || !user.is_active;
        if !needs_update {
            tracing::info!(email = %email, "Default superuser already up to date");
            return Ok(());
        }

        repositories::users::update(
            state.db(),
            &user.id,
            UpdateUser {
                full_name: None,
                email: None,
                role: Some(UserRole::Admin),
                is_active: Some(true),
                hashed_password,
                updated_at: now,
            },
        )
        .await?;

        tracing::info!(email = %email, "Updated default superuser");
        return Ok(());
    }

    let hashed_password = security::hash_password(&admin.first_superuser_password)?;
    repositories::users::create(
        state.db(),
        CreateUser {
            id: &Uuid::new_v4().to_string(),
            email: &email,
            hashed_password,
            full_name: &admin.first_superuser_name,
            role: UserRole::Admin,
            group_id: None,
            is_active: true,
            created_at: now,
        },
    )
    .await?;

    tracing::info!(email = %email, "Created default superuser");
    Ok(())
}
