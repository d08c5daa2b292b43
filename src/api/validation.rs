use crate::api::errors::ApiError;
use crate::services::lectures;

pub(crate) const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn validate_password_len(password: &str) -> Result<(), ApiError> {
    if password.chars().count() >= MIN_PASSWORD_LEN {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )))
    }
}

/// Returns the lowercased extension when it is on the allow list.
pub(crate) fn validate_lecture_extension(
    filename: &str,
    allowed_extensions: &[String],
) -> Result<String, ApiError> {
    let extension = lectures::file_extension(filename)
        .ok_or_else(|| ApiError::BadRequest("File must have an extension".to_string()))?;

    if allowed_extensions.iter().any(|allowed| allowed == &extension) {
        Ok(extension)
    } else {
        Err(ApiError::BadRequest(format!(
            "File extension '{extension}' is not allowed; allowed: {}",
            allowed_extensions.join(", ")
        )))
    }
}

/// Trims and drops duplicates while keeping first-seen order.
pub(crate) fn normalize_ids(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}
