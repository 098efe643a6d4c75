use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::health::mark_started;

pub fn superadmin_routes(state: Arc<AppConfig>) -> Router {
    mark_started();

    Router::new()
        .route(
            "/organizations",
            get(handlers::list_organizations).post(handlers::create_organization),
        )
        .route(
            "/organizations/{organization_id}",
            get(handlers::get_organization)
                .put(handlers::update_organization)
                .delete(handlers::deactivate_organization),
        )
        .route(
            "/organizations/{organization_id}/stats",
            get(handlers::get_organization_stats),
        )
        .route("/users", get(handlers::list_users))
        .route(
            "/users/{user_id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::deactivate_user),
        )
        .route(
            "/system/health",
            get(handlers::get_system_health).post(handlers::run_health_check),
        )
        .route(
            "/system/config",
            get(handlers::get_system_config).put(handlers::update_system_config),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
