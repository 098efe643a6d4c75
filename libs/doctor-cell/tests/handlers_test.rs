use assert_matches::assert_matches;
use axum::{
    extract::{Extension, State},
    http::StatusCode,
};
use axum_extra::TypedHeader;
use headers::Authorization;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::handlers::{
    assign_doctor_service, create_doctor, create_schedule, create_service, list_doctors,
    CatalogQuery, DoctorListQuery,
};
use doctor_cell::models::{
    AssignServiceRequest, CreateDoctorRequest, CreateScheduleRequest, CreateServiceRequest,
};
use shared_models::error::AppError;
use shared_utils::extract::{Json, Path, Query};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

const ORG: &str = "6a1f0c1e-7f7a-4a43-9d40-2a1b7f0e9c11";
const OTHER_ORG: &str = "0b4c9d5e-3a7e-4f5a-8e2d-1c6b9a8f7e22";

fn bearer() -> TypedHeader<Authorization<headers::authorization::Bearer>> {
    TypedHeader(Authorization::bearer("test-token").unwrap())
}

fn no_filters() -> DoctorListQuery {
    DoctorListQuery {
        organization_id: None,
        service_id: None,
        location_id: None,
        include_inactive: None,
    }
}

#[tokio::test]
async fn test_list_doctors_intersects_service_and_location() {
    let mock_server = MockServer::start().await;
    let service_id = Uuid::new_v4();
    let location_id = Uuid::new_v4();
    let both = Uuid::new_v4().to_string();
    let service_only = Uuid::new_v4().to_string();
    let location_only = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_services"))
        .and(query_param("service_id", format!("eq.{}", service_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "doctor_id": both },
            { "doctor_id": service_only },
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .and(query_param("location_id", format!("eq.{}", location_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "doctor_id": location_only },
            { "doctor_id": both },
            { "doctor_id": both },
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("in.({})", both)))
        .and(query_param("organization_id", format!("eq.{}", ORG)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![MockSupabaseResponses::doctor_response(&both, ORG)]),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let user = TestUser::patient_of("paciente@example.com", ORG);

    let body = list_doctors(
        State(config),
        bearer(),
        Extension(user.to_user()),
        Query(DoctorListQuery {
            service_id: Some(service_id),
            location_id: Some(location_id),
            ..no_filters()
        }),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(body["total"], 1);
    assert_eq!(body["doctors"][0]["id"], both);
}

#[tokio::test]
async fn test_list_doctors_disjoint_filters_skip_doctor_query() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_services"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "doctor_id": Uuid::new_v4() }])),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "doctor_id": Uuid::new_v4() }])),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let user = TestUser::staff("recepcion@clinica.co", ORG);

    let body = list_doctors(
        State(config),
        bearer(),
        Extension(user.to_user()),
        Query(DoctorListQuery {
            service_id: Some(Uuid::new_v4()),
            location_id: Some(Uuid::new_v4()),
            ..no_filters()
        }),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_list_doctors_rejects_foreign_organization() {
    let config = TestConfig::default().to_arc();
    let user = TestUser::admin("admin@clinica.co", ORG);

    let result = list_doctors(
        State(config),
        bearer(),
        Extension(user.to_user()),
        Query(DoctorListQuery {
            organization_id: Some(OTHER_ORG.to_string()),
            ..no_filters()
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_patient_cannot_create_doctor() {
    let config = TestConfig::default().to_arc();
    let user = TestUser::patient_of("paciente@example.com", ORG);

    let result = create_doctor(
        State(config),
        bearer(),
        Extension(user.to_user()),
        Query(CatalogQuery {
            organization_id: None,
            include_inactive: None,
        }),
        Json(CreateDoctorRequest {
            profile_id: Uuid::new_v4(),
            specialty: "Pediatría".to_string(),
            license_number: None,
            bio: None,
            experience_years: Some(5),
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_create_schedule_overlap_is_conflict() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseResponses::doctor_response(&doctor_id.to_string(), ORG),
        ]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseResponses::schedule_response(
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                None,
                1,
                "08:00:00",
                "12:00:00",
            ),
        ]))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let user = TestUser::staff("recepcion@clinica.co", ORG);

    let result = create_schedule(
        State(config),
        Path(doctor_id),
        bearer(),
        Extension(user.to_user()),
        Json(CreateScheduleRequest {
            day_of_week: 1,
            start_time: "11:00".to_string(),
            end_time: "13:00".to_string(),
            location_id: None,
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::Conflict(msg)) if msg.contains("(08:00 - 12:00)"));
}

#[tokio::test]
async fn test_create_schedule_adjacent_window_is_created() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let schedule_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseResponses::doctor_response(&doctor_id.to_string(), ORG),
        ]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseResponses::schedule_response(
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                None,
                1,
                "08:00:00",
                "12:00:00",
            ),
        ]))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![
            MockSupabaseResponses::schedule_response(
                &schedule_id,
                &doctor_id.to_string(),
                None,
                1,
                "14:00:00",
                "18:00:00",
            ),
        ]))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let user = TestUser::admin("admin@clinica.co", ORG);

    let (status, Json(body)) = create_schedule(
        State(config),
        Path(doctor_id),
        bearer(),
        Extension(user.to_user()),
        Json(CreateScheduleRequest {
            day_of_week: 1,
            start_time: "14:00".to_string(),
            end_time: "18:00".to_string(),
            location_id: None,
        }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], schedule_id);
    assert_eq!(body["start_time"], "14:00:00");
}

#[tokio::test]
async fn test_assign_service_from_other_organization_is_rejected() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseResponses::doctor_response(&doctor_id.to_string(), ORG),
        ]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/services"))
        .and(query_param("id", format!("eq.{}", service_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseResponses::service_response(&service_id.to_string(), OTHER_ORG, 30),
        ]))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let user = TestUser::admin("admin@clinica.co", ORG);

    let result = assign_doctor_service(
        State(config),
        Path(doctor_id),
        bearer(),
        Extension(user.to_user()),
        Json(AssignServiceRequest { service_id }),
    )
    .await;

    assert_matches!(result, Err(AppError::ValidationError(_)));
}

#[tokio::test]
async fn test_create_service_rejects_out_of_range_duration() {
    let config = TestConfig::default().to_arc();
    let user = TestUser::admin("admin@clinica.co", ORG);

    let result = create_service(
        State(config),
        bearer(),
        Extension(user.to_user()),
        Query(CatalogQuery {
            organization_id: None,
            include_inactive: None,
        }),
        Json(CreateServiceRequest {
            name: "Consulta express".to_string(),
            description: None,
            duration_minutes: 3,
            price: Some(30000.0),
            category: None,
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::ValidationError(_)));
}
