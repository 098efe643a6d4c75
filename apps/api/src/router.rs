use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use auth_cell::router::auth_routes;
use doctor_cell::router::{doctor_routes, location_routes, service_routes};
use shared_config::AppConfig;
use superadmin_cell::router::superadmin_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "AgentSalud API is running!" }))
        .nest("/api/auth", auth_routes(state.clone()))
        .nest("/api/superadmin", superadmin_routes(state.clone()))
        .nest("/api/doctors", doctor_routes(state.clone()))
        .nest("/api/services", service_routes(state.clone()))
        .nest("/api/locations", location_routes(state.clone()))
        .nest("/api/appointments", appointment_routes(state))
}
