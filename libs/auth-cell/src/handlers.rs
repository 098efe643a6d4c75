use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::{TokenResponse, User};
use shared_models::error::AppError;
use shared_utils::extractor::bearer_token;
use shared_utils::jwt::validate_token;

use crate::models::Profile;

fn header_token(headers: &HeaderMap) -> Result<String, AppError> {
    let raw = headers
        .get("Authorization")
        .map(|value| {
            value
                .to_str()
                .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))
        })
        .transpose()?;

    bearer_token(raw).map(str::to_string)
}

pub async fn validate(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let token = header_token(&headers)?;
    let user = validate_token(&token, &config.supabase_jwt_secret).map_err(AppError::Auth)?;

    Ok(Json(TokenResponse {
        valid: true,
        role: Some(user.app_role().to_string()),
        user_id: user.id,
        email: user.email,
        organization_id: user.organization_id,
    }))
}

pub async fn verify(State(config): State<Arc<AppConfig>>, headers: HeaderMap) -> Json<Value> {
    debug!("Verifying token");

    let valid = header_token(&headers)
        .map(|token| validate_token(&token, &config.supabase_jwt_secret).is_ok())
        .unwrap_or(false);

    Json(json!({ "valid": valid }))
}

pub async fn get_profile(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    debug!("Getting profile for user: {}", user.id);

    let client = SupabaseClient::new(&config);
    let path = format!("/rest/v1/profiles?id=eq.{}", user.id);

    let profile: Profile = client
        .select_one(&path, auth.token())
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

    // Authorization follows the token; a stale profile row is only reported.
    let role = user.app_role();
    if profile
        .role
        .as_deref()
        .is_some_and(|r| r != role.as_str())
    {
        warn!(
            "Profile role {:?} differs from token role {} for user {}",
            profile.role, role, user.id
        );
    }

    Ok(Json(json!({
        "user_id": user.id,
        "role": role,
        "organization_id": user.organization_id,
        "full_name": profile.full_name(),
        "profile": profile,
    })))
}
