use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use shared_models::error::AppError;

/// Postgres unique_violation, surfaced by PostgREST in the error body.
const UNIQUE_VIOLATION: &str = "23505";
/// Postgres foreign_key_violation.
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Error, Debug)]
pub enum SupabaseError {
    #[error("Authentication error: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

impl SupabaseError {
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed: Option<PostgrestErrorBody> = serde_json::from_str(body).ok();
        let pg_code = parsed.as_ref().and_then(|b| b.code.clone());
        let message = parsed
            .as_ref()
            .and_then(|b| b.message.clone().or_else(|| b.details.clone()))
            .unwrap_or_else(|| body.to_string());

        match (status.as_u16(), pg_code.as_deref()) {
            (_, Some(UNIQUE_VIOLATION)) => SupabaseError::Conflict(message),
            (_, Some(FOREIGN_KEY_VIOLATION)) => SupabaseError::InvalidReference(message),
            (409, _) => SupabaseError::Conflict(message),
            (401 | 403, _) => SupabaseError::Unauthorized(message),
            (404, _) => SupabaseError::NotFound(message),
            (code, _) => SupabaseError::Api {
                status: code,
                message,
            },
        }
    }
}

impl From<SupabaseError> for AppError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::Unauthorized(msg) => AppError::Forbidden(msg),
            SupabaseError::NotFound(msg) => AppError::NotFound(msg),
            SupabaseError::Conflict(msg) => AppError::Conflict(msg),
            SupabaseError::InvalidReference(msg) => AppError::ValidationError(msg),
            SupabaseError::Api { status, message } if status == 400 => {
                AppError::ValidationError(message)
            }
            other => AppError::Database(other.to_string()),
        }
    }
}
