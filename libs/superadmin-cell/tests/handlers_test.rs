use assert_matches::assert_matches;
use axum::{
    extract::{Extension, State},
    http::StatusCode,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_models::error::AppError;
use shared_models::settings::UpdateSystemConfigRequest;
use shared_utils::extract::{Json, Path, Query};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};
use superadmin_cell::handlers::{
    create_organization, deactivate_organization, get_organization_stats, get_system_config,
    get_system_health, list_organizations, run_health_check, update_organization,
    update_system_config, update_user,
};
use superadmin_cell::models::{
    CreateOrganizationRequest, HealthCheckRequest, HealthQuery, OrganizationQuery,
    UpdateOrganizationRequest, UpdateUserRequest,
};

const ORG: &str = "6a1f0c1e-7f7a-4a43-9d40-2a1b7f0e9c11";

fn bearer() -> TypedHeader<Authorization<Bearer>> {
    TypedHeader(Authorization::bearer("test-token").unwrap())
}

fn new_organization(slug: &str) -> CreateOrganizationRequest {
    CreateOrganizationRequest {
        name: "Clinica Norte".to_string(),
        slug: slug.to_string(),
        email: Some("contacto@clinicanorte.co".to_string()),
        phone: None,
        address: None,
        timezone: None,
        subscription_plan: None,
    }
}

fn counted(total: u64) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-range", format!("0-0/{}", total).as_str())
        .set_body_json(json!([]))
}

#[tokio::test]
async fn test_duplicate_slug_is_conflict() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/organizations"))
        .and(query_param("slug", "eq.clinica-norte"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseResponses::organization_response(ORG, "clinica-norte"),
        ]))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/organizations"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let root = TestUser::superadmin("root@agentsalud.co");

    let result = create_organization(
        State(config),
        bearer(),
        Extension(root.to_user()),
        Json(new_organization("clinica-norte")),
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.status(), StatusCode::CONFLICT);
    assert_matches!(err, AppError::Conflict(msg) if msg.contains("clinica-norte"));
}

#[tokio::test]
async fn test_create_organization_returns_created() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/organizations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/organizations"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![
            MockSupabaseResponses::organization_response(ORG, "clinica-sur"),
        ]))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let root = TestUser::superadmin("root@agentsalud.co");

    let (status, Json(body)) = create_organization(
        State(config),
        bearer(),
        Extension(root.to_user()),
        Json(new_organization("clinica-sur")),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["slug"], "clinica-sur");
    assert_eq!(body["subscription_plan"], "basic");
}

#[tokio::test]
async fn test_invalid_slug_is_rejected_before_any_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/organizations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let root = TestUser::superadmin("root@agentsalud.co");

    let result = create_organization(
        State(config),
        bearer(),
        Extension(root.to_user()),
        Json(new_organization("Clinica Norte")),
    )
    .await;

    assert_matches!(result, Err(AppError::InvalidFields { details, .. }) => {
        assert!(details.get("slug").is_some());
    });
}

#[tokio::test]
async fn test_admin_cannot_list_organizations() {
    let config = TestConfig::default().to_arc();
    let admin = TestUser::admin("admin@clinica.co", ORG);

    let result = list_organizations(
        State(config),
        bearer(),
        Extension(admin.to_user()),
        Query(OrganizationQuery::default()),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_organization_stats_reads_counts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/organizations"))
        .and(query_param("id", format!("eq.{}", ORG)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseResponses::organization_response(ORG, "clinica-norte"),
        ]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.pending"))
        .respond_with(counted(4))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(counted(25))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(counted(40))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(counted(6))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let root = TestUser::superadmin("root@agentsalud.co");

    let Json(body) = get_organization_stats(
        State(config),
        Path(Uuid::parse_str(ORG).unwrap()),
        bearer(),
        Extension(root.to_user()),
    )
    .await
    .unwrap();

    assert_eq!(body["users"], 40);
    assert_eq!(body["doctors"], 6);
    assert_eq!(body["appointments"], 25);
    assert_eq!(body["pending_appointments"], 4);
}

#[tokio::test]
async fn test_superadmin_cannot_demote_self() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let root = TestUser::superadmin("root@agentsalud.co");

    let result = update_user(
        State(config),
        Path(Uuid::parse_str(&root.id).unwrap()),
        bearer(),
        Extension(root.to_user()),
        Json(UpdateUserRequest {
            role: Some("admin".to_string()),
            ..Default::default()
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::BadRequest(msg)) if msg.contains("superadmin role"));
}

#[tokio::test]
async fn test_staff_role_requires_organization() {
    let mock_server = MockServer::start().await;
    let target = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseResponses::profile_response(&target.to_string(), "patient", None),
        ]))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let root = TestUser::superadmin("root@agentsalud.co");

    let result = update_user(
        State(config),
        Path(target),
        bearer(),
        Extension(root.to_user()),
        Json(UpdateUserRequest {
            role: Some("staff".to_string()),
            ..Default::default()
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::ValidationError(msg)) if msg.contains("requires an organization"));
}

#[tokio::test]
async fn test_unknown_health_component_is_bad_request() {
    let config = TestConfig::default().to_arc();
    let root = TestUser::superadmin("root@agentsalud.co");

    let result = run_health_check(
        State(config),
        Extension(root.to_user()),
        Some(Json(HealthCheckRequest {
            components: Some(vec!["database".to_string(), "redis".to_string()]),
        })),
    )
    .await;

    assert_matches!(result, Err(AppError::BadRequest(msg)) if msg.contains("redis"));
}

#[tokio::test]
async fn test_failing_auth_service_makes_system_unhealthy() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/health"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let root = TestUser::superadmin("root@agentsalud.co");

    let Json(body) = get_system_health(
        State(config),
        Extension(root.to_user()),
        Query(HealthQuery::default()),
    )
    .await
    .unwrap();

    assert_eq!(body["status"], "unhealthy");
    let components = body["components"].as_array().unwrap();
    assert_eq!(components.len(), 3);
    let status_of = |name: &str| {
        components
            .iter()
            .find(|c| c["component"] == name)
            .map(|c| c["status"].clone())
            .unwrap()
    };
    assert_eq!(status_of("configuration"), "healthy");
    assert_eq!(status_of("database"), "healthy");
    assert_eq!(status_of("auth"), "unhealthy");
}

#[tokio::test]
async fn test_invalid_system_config_is_not_saved() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/system_config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/system_config"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let root = TestUser::superadmin("root@agentsalud.co");

    let result = update_system_config(
        State(config),
        bearer(),
        Extension(root.to_user()),
        Json(UpdateSystemConfigRequest {
            default_slot_minutes: Some(2),
            ..Default::default()
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::InvalidFields { details, .. }) => {
        assert!(details.get("default_slot_minutes").is_some());
    });
}

#[tokio::test]
async fn test_bodyless_health_check_runs_every_component() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "v2"})))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let root = TestUser::superadmin("root@agentsalud.co");

    let Json(body) = run_health_check(State(config), Extension(root.to_user()), None)
        .await
        .unwrap();

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_renaming_to_taken_slug_is_conflict() {
    let mock_server = MockServer::start().await;
    let other = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/organizations"))
        .and(query_param("id", format!("eq.{}", ORG)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseResponses::organization_response(ORG, "clinica-norte"),
        ]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/organizations"))
        .and(query_param("slug", "eq.clinica-sur"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseResponses::organization_response(&other, "clinica-sur"),
        ]))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/organizations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let root = TestUser::superadmin("root@agentsalud.co");

    let result = update_organization(
        State(config),
        Path(Uuid::parse_str(ORG).unwrap()),
        bearer(),
        Extension(root.to_user()),
        Json(UpdateOrganizationRequest {
            slug: Some("clinica-sur".to_string()),
            ..Default::default()
        }),
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.status(), StatusCode::CONFLICT);
    assert_matches!(err, AppError::Conflict(msg) if msg.contains("clinica-sur"));
}

#[tokio::test]
async fn test_delete_organization_is_soft() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/organizations"))
        .and(query_param("id", format!("eq.{}", ORG)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseResponses::organization_response(ORG, "clinica-norte"),
        ]))
        .mount(&mock_server)
        .await;

    let mut deactivated = MockSupabaseResponses::organization_response(ORG, "clinica-norte");
    deactivated["is_active"] = json!(false);
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/organizations"))
        .and(query_param("id", format!("eq.{}", ORG)))
        .and(body_partial_json(json!({"is_active": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![deactivated]))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/organizations"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let root = TestUser::superadmin("root@agentsalud.co");

    let Json(body) = deactivate_organization(
        State(config),
        Path(Uuid::parse_str(ORG).unwrap()),
        bearer(),
        Extension(root.to_user()),
    )
    .await
    .unwrap();

    assert_eq!(body["organization"]["is_active"], false);
    assert_eq!(body["organization"]["slug"], "clinica-norte");
}

#[tokio::test]
async fn test_system_config_reads_stored_row() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/system_config"))
        .and(query_param("id", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "maintenance_mode": true,
            "allow_new_registrations": false,
            "patient_min_advance_days": 2,
            "max_advance_booking_days": 60,
            "default_slot_minutes": 20,
            "updated_at": null
        }])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let root = TestUser::superadmin("root@agentsalud.co");

    let Json(body) = get_system_config(State(config), bearer(), Extension(root.to_user()))
        .await
        .unwrap();

    assert_eq!(body["maintenance_mode"], true);
    assert_eq!(body["patient_min_advance_days"], 2);
    assert_eq!(body["default_slot_minutes"], 20);
}

#[tokio::test]
async fn test_system_config_update_is_upserted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/system_config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/system_config"))
        .and(body_partial_json(json!({"id": 1, "maintenance_mode": true})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "maintenance_mode": true,
            "allow_new_registrations": true,
            "patient_min_advance_days": 1,
            "max_advance_booking_days": 90,
            "default_slot_minutes": 30,
            "updated_at": "2026-10-17T12:00:00Z"
        }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let root = TestUser::superadmin("root@agentsalud.co");

    let Json(body) = update_system_config(
        State(config),
        bearer(),
        Extension(root.to_user()),
        Json(UpdateSystemConfigRequest {
            maintenance_mode: Some(true),
            ..Default::default()
        }),
    )
    .await
    .unwrap();

    assert_eq!(body["maintenance_mode"], true);
    assert_eq!(body["max_advance_booking_days"], 90);
}
