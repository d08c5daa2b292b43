use serde::Serialize;

use crate::schemas::user::UserResponse;

#[derive(Debug, Serialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    pub(crate) token_type: String,
    /// Seconds until `access_token` stops being accepted.
    pub(crate) expires_in: i64,
    pub(crate) user: UserResponse,
}
