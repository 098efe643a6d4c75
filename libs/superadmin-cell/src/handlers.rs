use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::settings::SystemConfigStore;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::settings::UpdateSystemConfigRequest;
use shared_utils::extractor::require_superadmin;
use shared_utils::extract::{Json, Path, Query};

use crate::models::{
    CreateOrganizationRequest, HealthCheckRequest, HealthQuery, OrganizationQuery,
    UpdateOrganizationRequest, UpdateUserRequest, UserQuery,
};
use crate::services::health::parse_components;
use crate::services::{HealthService, OrganizationService, UserService};

// ==============================================================================
// ORGANIZATIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_organizations(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<OrganizationQuery>,
) -> Result<Json<Value>, AppError> {
    require_superadmin(&user)?;

    let (organizations, total) = OrganizationService::new(&state)
        .list(&query, auth.token())
        .await?;

    Ok(Json(json!({
        "organizations": organizations,
        "total": total,
        "limit": query.limit,
        "offset": query.offset.unwrap_or(0),
    })))
}

#[axum::debug_handler]
pub async fn create_organization(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_superadmin(&user)?;

    let organization = OrganizationService::new(&state)
        .create(request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(organization))))
}

#[axum::debug_handler]
pub async fn get_organization(
    State(state): State<Arc<AppConfig>>,
    Path(organization_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_superadmin(&user)?;

    let organization = OrganizationService::new(&state)
        .get(organization_id, auth.token())
        .await?;

    Ok(Json(json!(organization)))
}

#[axum::debug_handler]
pub async fn update_organization(
    State(state): State<Arc<AppConfig>>,
    Path(organization_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateOrganizationRequest>,
) -> Result<Json<Value>, AppError> {
    require_superadmin(&user)?;

    let organization = OrganizationService::new(&state)
        .update(organization_id, request, auth.token())
        .await?;

    Ok(Json(json!(organization)))
}

#[axum::debug_handler]
pub async fn deactivate_organization(
    State(state): State<Arc<AppConfig>>,
    Path(organization_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_superadmin(&user)?;

    let organization = OrganizationService::new(&state)
        .deactivate(organization_id, auth.token())
        .await?;

    Ok(Json(json!({
        "message": "Organization deactivated",
        "organization": organization,
    })))
}

#[axum::debug_handler]
pub async fn get_organization_stats(
    State(state): State<Arc<AppConfig>>,
    Path(organization_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_superadmin(&user)?;

    let stats = OrganizationService::new(&state)
        .stats(organization_id, auth.token())
        .await?;

    Ok(Json(json!(stats)))
}

// ==============================================================================
// USERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_users(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, AppError> {
    require_superadmin(&user)?;

    let (users, total) = UserService::new(&state).list(&query, auth.token()).await?;

    Ok(Json(json!({
        "users": users,
        "total": total,
        "limit": query.limit,
        "offset": query.offset.unwrap_or(0),
    })))
}

#[axum::debug_handler]
pub async fn get_user(
    State(state): State<Arc<AppConfig>>,
    Path(user_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_superadmin(&user)?;

    let account = UserService::new(&state).get(user_id, auth.token()).await?;

    Ok(Json(json!(account)))
}

#[axum::debug_handler]
pub async fn update_user(
    State(state): State<Arc<AppConfig>>,
    Path(user_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<Value>, AppError> {
    require_superadmin(&user)?;

    let account = UserService::new(&state)
        .update(&user, user_id, request, auth.token())
        .await?;

    Ok(Json(json!(account)))
}

#[axum::debug_handler]
pub async fn deactivate_user(
    State(state): State<Arc<AppConfig>>,
    Path(user_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_superadmin(&user)?;

    let account = UserService::new(&state)
        .deactivate(&user, user_id, auth.token())
        .await?;

    Ok(Json(json!({
        "message": "User deactivated",
        "user": account,
    })))
}

// ==============================================================================
// SYSTEM
// ==============================================================================

#[axum::debug_handler]
pub async fn get_system_health(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Query(query): Query<HealthQuery>,
) -> Result<Json<Value>, AppError> {
    require_superadmin(&user)?;

    let names = query.component_names();
    let components = parse_components(names.as_deref())?;
    let health = HealthService::new(&state).check(&components).await;

    Ok(Json(json!(health)))
}

#[axum::debug_handler]
pub async fn run_health_check(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    request: Option<Json<HealthCheckRequest>>,
) -> Result<Json<Value>, AppError> {
    require_superadmin(&user)?;

    let names = request.and_then(|Json(body)| body.components);
    let components = parse_components(names.as_deref())?;
    info!("Health check requested by {} for {:?}", user.id, components);
    let health = HealthService::new(&state).check(&components).await;

    Ok(Json(json!(health)))
}

#[axum::debug_handler]
pub async fn get_system_config(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_superadmin(&user)?;

    let config = SystemConfigStore::new(&state).load(auth.token()).await;

    Ok(Json(json!(config)))
}

#[axum::debug_handler]
pub async fn update_system_config(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateSystemConfigRequest>,
) -> Result<Json<Value>, AppError> {
    require_superadmin(&user)?;

    let config = SystemConfigStore::new(&state)
        .save(&request, auth.token())
        .await?;
    info!("System configuration updated by {}", user.id);

    Ok(Json(json!(config)))
}
