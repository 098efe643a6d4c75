use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::{AppConfig, BookingDefaults};
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub clinic_utc_offset_minutes: i32,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            clinic_utc_offset_minutes: -300,
        }
    }
}

impl TestConfig {
    /// Points the Supabase client at a mock server.
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            server_port: 3000,
            clinic_utc_offset_minutes: self.clinic_utc_offset_minutes,
            booking: BookingDefaults::default(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub organization_id: Option<String>,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
            organization_id: None,
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str, organization_id: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            organization_id: organization_id.map(str::to_string),
        }
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient", None)
    }

    pub fn patient_of(email: &str, organization_id: &str) -> Self {
        Self::new(email, "patient", Some(organization_id))
    }

    pub fn doctor(email: &str, organization_id: &str) -> Self {
        Self::new(email, "doctor", Some(organization_id))
    }

    pub fn staff(email: &str, organization_id: &str) -> Self {
        Self::new(email, "staff", Some(organization_id))
    }

    pub fn admin(email: &str, organization_id: &str) -> Self {
        Self::new(email, "admin", Some(organization_id))
    }

    pub fn superadmin(email: &str) -> Self {
        Self::new(email, "superadmin", None)
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            organization_id: self.organization_id.clone(),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "app_metadata": {
                "role": user.role,
                "organization_id": user.organization_id,
            },
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        Self::sign(&header, &payload, secret)
    }

    /// Signs arbitrary header and claims with HS256.
    pub fn sign(header: &serde_json::Value, payload: &serde_json::Value, secret: &str) -> String {
        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn organization_response(id: &str, slug: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": "Clinica Test",
            "slug": slug,
            "email": "contacto@clinicatest.co",
            "phone": null,
            "address": null,
            "timezone": "America/Bogota",
            "subscription_plan": "basic",
            "is_active": true,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn profile_response(id: &str, role: &str, organization_id: Option<&str>) -> serde_json::Value {
        json!({
            "id": id,
            "email": format!("{}@example.com", role),
            "first_name": "Test",
            "last_name": "User",
            "phone": null,
            "role": role,
            "organization_id": organization_id,
            "is_active": true,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn doctor_response(id: &str, organization_id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "organization_id": organization_id,
            "profile_id": Uuid::new_v4(),
            "specialty": "Medicina General",
            "license_number": "RM-12345",
            "bio": null,
            "experience_years": 8,
            "is_active": true,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn service_response(id: &str, organization_id: &str, duration_minutes: i32) -> serde_json::Value {
        json!({
            "id": id,
            "organization_id": organization_id,
            "name": "Consulta General",
            "description": null,
            "duration_minutes": duration_minutes,
            "price": 60000.0,
            "category": "general",
            "is_active": true
        })
    }

    pub fn schedule_response(
        id: &str,
        doctor_id: &str,
        location_id: Option<&str>,
        day_of_week: i32,
        start: &str,
        end: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "doctor_id": doctor_id,
            "location_id": location_id,
            "day_of_week": day_of_week,
            "start_time": start,
            "end_time": end,
            "is_active": true
        })
    }

    pub fn appointment_response(
        id: &str,
        organization_id: &str,
        patient_id: &str,
        doctor_id: &str,
        date: &str,
        start: &str,
        end: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "organization_id": organization_id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "service_id": null,
            "location_id": null,
            "appointment_date": date,
            "start_time": start,
            "end_time": end,
            "duration_minutes": 30,
            "status": status,
            "reason": null,
            "notes": null,
            "cancellation_reason": null,
            "created_by": patient_id,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code,
            "details": null,
            "hint": null
        })
    }
}
