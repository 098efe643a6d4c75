use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(handlers::list_doctors).post(handlers::create_doctor))
        .route(
            "/{doctor_id}",
            get(handlers::get_doctor)
                .put(handlers::update_doctor)
                .delete(handlers::delete_doctor),
        )
        .route(
            "/{doctor_id}/services",
            get(handlers::list_doctor_services).post(handlers::assign_doctor_service),
        )
        .route(
            "/{doctor_id}/services/{service_id}",
            delete(handlers::remove_doctor_service),
        )
        .route(
            "/{doctor_id}/schedules",
            get(handlers::list_schedules).post(handlers::create_schedule),
        )
        .route(
            "/{doctor_id}/schedules/{schedule_id}",
            put(handlers::update_schedule).delete(handlers::delete_schedule),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

pub fn service_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(handlers::list_services).post(handlers::create_service))
        .route(
            "/{service_id}",
            put(handlers::update_service).delete(handlers::delete_service),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

pub fn location_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(handlers::list_locations).post(handlers::create_location))
        .route(
            "/{location_id}",
            put(handlers::update_location).delete(handlers::delete_location),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
