use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;
use shared_utils::extractor::{require_role, resolve_organization};
use shared_utils::extract::{Json, Path, Query};

use crate::models::{
    AppointmentListQuery, AvailabilityQuery, AvailabilitySummaryQuery, BookAppointmentRequest,
    CancelAppointmentRequest, StatsQuery, UpdateStatusRequest,
};
use crate::services::{AvailabilityService, BookingService};

// ==============================================================================
// AVAILABILITY
// ==============================================================================

#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let organization_id = resolve_organization(&user, query.organization_id.as_deref())?;

    let availability = AvailabilityService::new(&state)
        .day_availability(&user, &organization_id, &query, auth.token())
        .await?;

    Ok(Json(json!(availability)))
}

#[axum::debug_handler]
pub async fn get_availability_summary(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<AvailabilitySummaryQuery>,
) -> Result<Json<Value>, AppError> {
    let organization_id = resolve_organization(&user, query.organization_id.as_deref())?;

    let days = AvailabilityService::new(&state)
        .summary(&user, &organization_id, &query, auth.token())
        .await?;

    Ok(Json(json!({
        "start_date": query.start_date,
        "end_date": query.end_date,
        "days": days,
    })))
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let appointment = BookingService::new(&state)
        .book(&user, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let (appointments, total) = BookingService::new(&state)
        .list(&user, &query, auth.token())
        .await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": total,
        "limit": query.limit,
        "offset": query.offset.unwrap_or(0),
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = BookingService::new(&state)
        .get(&user, appointment_id, auth.token())
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = BookingService::new(&state)
        .update_status(&user, appointment_id, request, auth.token())
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    request: Option<Json<CancelAppointmentRequest>>,
) -> Result<Json<Value>, AppError> {
    let reason = request.and_then(|Json(body)| body.reason);
    let appointment = BookingService::new(&state)
        .cancel(&user, appointment_id, reason, auth.token())
        .await?;

    Ok(Json(json!({
        "message": "Appointment cancelled",
        "appointment": appointment,
    })))
}

// ==============================================================================
// DASHBOARD
// ==============================================================================

#[axum::debug_handler]
pub async fn get_appointment_stats(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, AppError> {
    require_role(
        &user,
        &[
            UserRole::Doctor,
            UserRole::Staff,
            UserRole::Admin,
            UserRole::Superadmin,
        ],
    )?;
    let organization_id = resolve_organization(&user, query.organization_id.as_deref())?;

    let stats = BookingService::new(&state)
        .stats(&organization_id, &query, auth.token())
        .await?;

    Ok(Json(json!({
        "organization_id": organization_id,
        "stats": stats,
    })))
}
