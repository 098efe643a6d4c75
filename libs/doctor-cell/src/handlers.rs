use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;
use shared_utils::extractor::{ensure_organization_access, require_role, resolve_organization};
use shared_utils::extract::{Json, Path, Query};

use crate::models::{
    AssignServiceRequest, CreateDoctorRequest, CreateLocationRequest, CreateScheduleRequest,
    CreateServiceRequest, Doctor, DoctorFilter, UpdateDoctorRequest, UpdateLocationRequest,
    UpdateScheduleRequest, UpdateServiceRequest,
};
use crate::services::{CatalogService, DoctorService, ScheduleService};

const MANAGERS: &[UserRole] = &[UserRole::Admin, UserRole::Superadmin];

#[derive(Debug, Deserialize)]
pub struct DoctorListQuery {
    pub organization_id: Option<String>,
    pub service_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    pub organization_id: Option<String>,
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    pub include_inactive: Option<bool>,
}

/// Loads a doctor and checks it belongs to the caller's organization.
async fn load_doctor(
    service: &DoctorService,
    user: &User,
    doctor_id: Uuid,
    token: &str,
) -> Result<Doctor, AppError> {
    let doctor = service.get_doctor(doctor_id, token).await?;
    ensure_organization_access(user, &doctor.organization_id.to_string())?;
    Ok(doctor)
}

/// Admins manage every schedule; staff and the doctor themselves manage theirs.
fn can_edit_schedule(user: &User, doctor: &Doctor) -> bool {
    match user.app_role() {
        UserRole::Admin | UserRole::Superadmin | UserRole::Staff => true,
        UserRole::Doctor => user.id == doctor.profile_id.to_string(),
        UserRole::Patient => false,
    }
}

// ==============================================================================
// DOCTORS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<DoctorListQuery>,
) -> Result<Json<Value>, AppError> {
    let organization_id = resolve_organization(&user, query.organization_id.as_deref())?;

    // Inactive doctors are an administrative view.
    let include_inactive =
        query.include_inactive.unwrap_or(false) && user.app_role().can_manage_organization();

    let filter = DoctorFilter {
        organization_id,
        service_id: query.service_id,
        location_id: query.location_id,
        include_inactive,
    };

    let doctors = DoctorService::new(&state)
        .list_doctors(&filter, auth.token())
        .await?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len(),
    })))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = DoctorService::new(&state);
    let doctor = load_doctor(&service, &user, doctor_id, auth.token()).await?;
    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn create_doctor(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<CatalogQuery>,
    Json(request): Json<CreateDoctorRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, MANAGERS)?;
    let organization_id = resolve_organization(&user, query.organization_id.as_deref())?;

    let doctor = DoctorService::new(&state)
        .create_doctor(&organization_id, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(doctor))))
}

#[axum::debug_handler]
pub async fn update_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, MANAGERS)?;
    let service = DoctorService::new(&state);
    load_doctor(&service, &user, doctor_id, auth.token()).await?;

    let doctor = service.update_doctor(doctor_id, request, auth.token()).await?;
    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn delete_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, MANAGERS)?;
    let service = DoctorService::new(&state);
    load_doctor(&service, &user, doctor_id, auth.token()).await?;

    let doctor = service.deactivate_doctor(doctor_id, auth.token()).await?;
    Ok(Json(json!({
        "message": "Doctor deactivated",
        "doctor": doctor,
    })))
}

// ==============================================================================
// DOCTOR SERVICES
// ==============================================================================

#[axum::debug_handler]
pub async fn list_doctor_services(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = DoctorService::new(&state);
    load_doctor(&service, &user, doctor_id, auth.token()).await?;

    let services = service.list_doctor_services(doctor_id, auth.token()).await?;
    Ok(Json(json!({
        "doctor_id": doctor_id,
        "services": services,
    })))
}

#[axum::debug_handler]
pub async fn assign_doctor_service(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<AssignServiceRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, MANAGERS)?;
    let doctors = DoctorService::new(&state);
    let doctor = load_doctor(&doctors, &user, doctor_id, auth.token()).await?;
    let medical_service = CatalogService::new(&state)
        .get_service(request.service_id, auth.token())
        .await?;

    let link = doctors
        .assign_service(&doctor, &medical_service, auth.token())
        .await?;
    Ok((StatusCode::CREATED, Json(json!(link))))
}

#[axum::debug_handler]
pub async fn remove_doctor_service(
    State(state): State<Arc<AppConfig>>,
    Path((doctor_id, service_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, MANAGERS)?;
    let doctors = DoctorService::new(&state);
    load_doctor(&doctors, &user, doctor_id, auth.token()).await?;

    doctors
        .remove_service(doctor_id, service_id, auth.token())
        .await?;
    Ok(Json(json!({ "message": "Service removed from doctor" })))
}

// ==============================================================================
// SCHEDULES
// ==============================================================================

#[axum::debug_handler]
pub async fn list_schedules(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<Value>, AppError> {
    let doctors = DoctorService::new(&state);
    load_doctor(&doctors, &user, doctor_id, auth.token()).await?;

    let active_only = !query.include_inactive.unwrap_or(false);
    let schedules = ScheduleService::new(&state)
        .list_schedules(doctor_id, active_only, auth.token())
        .await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "schedules": schedules,
    })))
}

#[axum::debug_handler]
pub async fn create_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let doctors = DoctorService::new(&state);
    let doctor = load_doctor(&doctors, &user, doctor_id, auth.token()).await?;
    if !can_edit_schedule(&user, &doctor) {
        return Err(AppError::Forbidden(
            "Not allowed to manage this doctor's schedule".to_string(),
        ));
    }

    if let Some(location_id) = request.location_id {
        let location = CatalogService::new(&state)
            .get_location(location_id, auth.token())
            .await?;
        if location.organization_id != doctor.organization_id {
            return Err(AppError::ValidationError(
                "Location belongs to a different organization".to_string(),
            ));
        }
    }

    let schedule = ScheduleService::new(&state)
        .create_schedule(doctor_id, request, auth.token())
        .await?;
    Ok((StatusCode::CREATED, Json(json!(schedule))))
}

#[axum::debug_handler]
pub async fn update_schedule(
    State(state): State<Arc<AppConfig>>,
    Path((doctor_id, schedule_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let doctors = DoctorService::new(&state);
    let doctor = load_doctor(&doctors, &user, doctor_id, auth.token()).await?;
    if !can_edit_schedule(&user, &doctor) {
        return Err(AppError::Forbidden(
            "Not allowed to manage this doctor's schedule".to_string(),
        ));
    }

    let schedule = ScheduleService::new(&state)
        .update_schedule(doctor_id, schedule_id, request, auth.token())
        .await?;
    Ok(Json(json!(schedule)))
}

#[axum::debug_handler]
pub async fn delete_schedule(
    State(state): State<Arc<AppConfig>>,
    Path((doctor_id, schedule_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let doctors = DoctorService::new(&state);
    let doctor = load_doctor(&doctors, &user, doctor_id, auth.token()).await?;
    if !can_edit_schedule(&user, &doctor) {
        return Err(AppError::Forbidden(
            "Not allowed to manage this doctor's schedule".to_string(),
        ));
    }

    let schedule = ScheduleService::new(&state)
        .deactivate_schedule(doctor_id, schedule_id, auth.token())
        .await?;
    Ok(Json(json!({
        "message": "Schedule deactivated",
        "schedule": schedule,
    })))
}

// ==============================================================================
// SERVICES CATALOG
// ==============================================================================

#[axum::debug_handler]
pub async fn list_services(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Value>, AppError> {
    let organization_id = resolve_organization(&user, query.organization_id.as_deref())?;
    let include_inactive =
        query.include_inactive.unwrap_or(false) && user.app_role().can_manage_organization();

    let services = CatalogService::new(&state)
        .list_services(&organization_id, include_inactive, auth.token())
        .await?;
    Ok(Json(json!({
        "services": services,
        "total": services.len(),
    })))
}

#[axum::debug_handler]
pub async fn create_service(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<CatalogQuery>,
    Json(request): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, MANAGERS)?;
    let organization_id = resolve_organization(&user, query.organization_id.as_deref())?;

    let service = CatalogService::new(&state)
        .create_service(&organization_id, request, auth.token())
        .await?;
    Ok((StatusCode::CREATED, Json(json!(service))))
}

#[axum::debug_handler]
pub async fn update_service(
    State(state): State<Arc<AppConfig>>,
    Path(service_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateServiceRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, MANAGERS)?;
    let catalog = CatalogService::new(&state);
    let existing = catalog.get_service(service_id, auth.token()).await?;
    ensure_organization_access(&user, &existing.organization_id.to_string())?;

    let service = catalog
        .update_service(service_id, request, auth.token())
        .await?;
    Ok(Json(json!(service)))
}

#[axum::debug_handler]
pub async fn delete_service(
    State(state): State<Arc<AppConfig>>,
    Path(service_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, MANAGERS)?;
    let catalog = CatalogService::new(&state);
    let existing = catalog.get_service(service_id, auth.token()).await?;
    ensure_organization_access(&user, &existing.organization_id.to_string())?;

    let service = catalog.deactivate_service(service_id, auth.token()).await?;
    Ok(Json(json!({
        "message": "Service deactivated",
        "service": service,
    })))
}

// ==============================================================================
// LOCATIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_locations(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Value>, AppError> {
    let organization_id = resolve_organization(&user, query.organization_id.as_deref())?;
    let include_inactive =
        query.include_inactive.unwrap_or(false) && user.app_role().can_manage_organization();

    let locations = CatalogService::new(&state)
        .list_locations(&organization_id, include_inactive, auth.token())
        .await?;
    Ok(Json(json!({
        "locations": locations,
        "total": locations.len(),
    })))
}

#[axum::debug_handler]
pub async fn create_location(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<CatalogQuery>,
    Json(request): Json<CreateLocationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, MANAGERS)?;
    let organization_id = resolve_organization(&user, query.organization_id.as_deref())?;

    let location = CatalogService::new(&state)
        .create_location(&organization_id, request, auth.token())
        .await?;
    Ok((StatusCode::CREATED, Json(json!(location))))
}

#[axum::debug_handler]
pub async fn update_location(
    State(state): State<Arc<AppConfig>>,
    Path(location_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateLocationRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, MANAGERS)?;
    let catalog = CatalogService::new(&state);
    let existing = catalog.get_location(location_id, auth.token()).await?;
    ensure_organization_access(&user, &existing.organization_id.to_string())?;

    let location = catalog
        .update_location(location_id, request, auth.token())
        .await?;
    Ok(Json(json!(location)))
}

#[axum::debug_handler]
pub async fn delete_location(
    State(state): State<Arc<AppConfig>>,
    Path(location_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, MANAGERS)?;
    let catalog = CatalogService::new(&state);
    let existing = catalog.get_location(location_id, auth.token()).await?;
    ensure_organization_access(&user, &existing.organization_id.to_string())?;

    let location = catalog
        .deactivate_location(location_id, auth.token())
        .await?;
    Ok(Json(json!({
        "message": "Location deactivated",
        "location": location,
    })))
}
