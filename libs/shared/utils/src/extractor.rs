use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Pulls the raw token out of an `Authorization: Bearer ...` value.
pub fn bearer_token(header_value: Option<&str>) -> Result<&str, AppError> {
    let value =
        header_value.ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(AppError::Auth("Invalid authorization header format".to_string())),
    }
}

pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let header_value = request
        .headers()
        .get("Authorization")
        .map(|value| {
            value
                .to_str()
                .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))
        })
        .transpose()?;

    let token = bearer_token(header_value)?;

    let user = validate_token(token, &config.supabase_jwt_secret).map_err(AppError::Auth)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

pub fn require_role(user: &User, allowed: &[UserRole]) -> Result<UserRole, AppError> {
    let role = user.app_role();
    if allowed.contains(&role) {
        Ok(role)
    } else {
        Err(AppError::Forbidden(format!(
            "Role '{}' is not allowed to perform this action",
            role
        )))
    }
}

pub fn require_superadmin(user: &User) -> Result<(), AppError> {
    require_role(user, &[UserRole::Superadmin])
        .map(|_| ())
        .map_err(|_| AppError::Forbidden("Superadmin access required".to_string()))
}

pub fn ensure_organization_access(user: &User, organization_id: &str) -> Result<(), AppError> {
    if user.can_access_organization(organization_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Resource belongs to another organization".to_string(),
        ))
    }
}

/// Organization a request works in: superadmins may pick one, everyone else is pinned to theirs.
///
/// The requested id ends up inside PostgREST filters, so it must be a UUID.
pub fn resolve_organization(user: &User, requested: Option<&str>) -> Result<String, AppError> {
    let requested = requested
        .map(|raw| {
            Uuid::parse_str(raw.trim()).map_err(|_| {
                AppError::ValidationError(format!("Invalid organization_id '{}'", raw))
            })
        })
        .transpose()?
        .map(|id| id.to_string());

    if user.app_role().is_superadmin() {
        return requested
            .or_else(|| user.organization_id.clone())
            .ok_or_else(|| AppError::ValidationError("organization_id is required".to_string()));
    }

    let own = user
        .organization_id
        .clone()
        .ok_or_else(|| AppError::Forbidden("User is not assigned to an organization".to_string()))?;

    match requested {
        Some(org) if !org.eq_ignore_ascii_case(&own) => Err(AppError::Forbidden(
            "Resource belongs to another organization".to_string(),
        )),
        _ => Ok(own),
    }
}
