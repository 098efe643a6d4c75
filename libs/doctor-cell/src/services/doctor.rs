use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::error::AppError;

use crate::models::{
    patch_body, CreateDoctorRequest, Doctor, DoctorFilter, DoctorServiceLink, MedicalService,
    UpdateDoctorRequest,
};

#[derive(Debug, Deserialize)]
struct DoctorIdRow {
    doctor_id: Uuid,
}

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Doctors of an organization, narrowed to those offering `service_id`
    /// and working at `location_id` when given.
    pub async fn list_doctors(
        &self,
        filter: &DoctorFilter,
        auth_token: &str,
    ) -> Result<Vec<Doctor>, AppError> {
        debug!("Listing doctors with filter: {:?}", filter);

        let eligible = self.eligible_doctor_ids(filter, auth_token).await?;
        if eligible.as_ref().is_some_and(|ids| ids.is_empty()) {
            debug!("No doctor matches both service and location filters");
            return Ok(vec![]);
        }

        let mut query_parts = vec![format!("organization_id=eq.{}", filter.organization_id)];
        if !filter.include_inactive {
            query_parts.push("is_active=eq.true".to_string());
        }
        if let Some(ids) = eligible {
            query_parts.push(format!("id=in.({})", join_ids(&ids)));
        }
        query_parts.push("order=created_at.asc".to_string());

        let path = format!("/rest/v1/doctors?{}", query_parts.join("&"));
        Ok(self.supabase.select(&path, auth_token).await?)
    }

    /// `None` means no service/location filter was requested.
    pub async fn eligible_doctor_ids(
        &self,
        filter: &DoctorFilter,
        auth_token: &str,
    ) -> Result<Option<Vec<Uuid>>, AppError> {
        let by_service = match filter.service_id {
            Some(service_id) => {
                let path = format!(
                    "/rest/v1/doctor_services?service_id=eq.{}&select=doctor_id",
                    service_id
                );
                let rows: Vec<DoctorIdRow> = self.supabase.select(&path, auth_token).await?;
                Some(rows.into_iter().map(|r| r.doctor_id).collect())
            }
            None => None,
        };

        let by_location = match filter.location_id {
            Some(location_id) => {
                let path = format!(
                    "/rest/v1/doctor_availability?location_id=eq.{}&is_active=eq.true&select=doctor_id",
                    location_id
                );
                let rows: Vec<DoctorIdRow> = self.supabase.select(&path, auth_token).await?;
                Some(rows.into_iter().map(|r| r.doctor_id).collect())
            }
            None => None,
        };

        Ok(intersect_ids(by_service, by_location))
    }

    pub async fn get_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<Doctor, AppError> {
        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        self.supabase
            .select_one(&path, auth_token)
            .await?
            .ok_or_else(|| AppError::NotFound("Doctor not found".to_string()))
    }

    /// Doctor record linked to a login profile, if any.
    pub async fn find_by_profile(
        &self,
        profile_id: &str,
        auth_token: &str,
    ) -> Result<Option<Doctor>, AppError> {
        let path = format!("/rest/v1/doctors?profile_id=eq.{}", profile_id);
        Ok(self.supabase.select_one(&path, auth_token).await?)
    }

    pub async fn create_doctor(
        &self,
        organization_id: &str,
        request: CreateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, AppError> {
        validate_specialty(&request.specialty)?;
        validate_experience(request.experience_years)?;

        let existing_path = format!(
            "/rest/v1/doctors?profile_id=eq.{}&select=id",
            request.profile_id
        );
        let existing: Vec<serde_json::Value> =
            self.supabase.select(&existing_path, auth_token).await?;
        if !existing.is_empty() {
            return Err(AppError::Conflict(
                "A doctor record already exists for this profile".to_string(),
            ));
        }

        let now = Utc::now().to_rfc3339();
        let doctor: Doctor = self
            .supabase
            .insert(
                "doctors",
                json!({
                    "organization_id": organization_id,
                    "profile_id": request.profile_id,
                    "specialty": request.specialty.trim(),
                    "license_number": request.license_number,
                    "bio": request.bio,
                    "experience_years": request.experience_years,
                    "is_active": true,
                    "created_at": now,
                    "updated_at": now,
                }),
                auth_token,
            )
            .await?;

        info!("Doctor {} created in organization {}", doctor.id, organization_id);
        Ok(doctor)
    }

    pub async fn update_doctor(
        &self,
        doctor_id: Uuid,
        request: UpdateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, AppError> {
        if let Some(ref specialty) = request.specialty {
            validate_specialty(specialty)?;
        }
        validate_experience(request.experience_years)?;

        let mut body = patch_body(vec![
            ("specialty", request.specialty.map(|s| json!(s.trim()))),
            ("license_number", request.license_number.map(|v| json!(v))),
            ("bio", request.bio.map(|v| json!(v))),
            ("experience_years", request.experience_years.map(|v| json!(v))),
            ("is_active", request.is_active.map(|v| json!(v))),
        ]);
        body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let rows: Vec<Doctor> = self
            .supabase
            .update(&path, serde_json::Value::Object(body), auth_token)
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Doctor not found".to_string()))
    }

    pub async fn deactivate_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<Doctor, AppError> {
        info!("Deactivating doctor {}", doctor_id);
        self.update_doctor(
            doctor_id,
            UpdateDoctorRequest {
                is_active: Some(false),
                ..Default::default()
            },
            auth_token,
        )
        .await
    }

    pub async fn list_doctor_services(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<MedicalService>, AppError> {
        let links_path = format!("/rest/v1/doctor_services?doctor_id=eq.{}", doctor_id);
        let links: Vec<DoctorServiceLink> = self.supabase.select(&links_path, auth_token).await?;
        if links.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<Uuid> = links.iter().map(|l| l.service_id).collect();
        let path = format!(
            "/rest/v1/services?id=in.({})&order=name.asc",
            join_ids(&ids)
        );
        Ok(self.supabase.select(&path, auth_token).await?)
    }

    pub async fn offers_service(
        &self,
        doctor_id: Uuid,
        service_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, AppError> {
        let path = format!(
            "/rest/v1/doctor_services?doctor_id=eq.{}&service_id=eq.{}",
            doctor_id, service_id
        );
        let links: Vec<DoctorServiceLink> = self.supabase.select(&path, auth_token).await?;
        Ok(!links.is_empty())
    }

    pub async fn assign_service(
        &self,
        doctor: &Doctor,
        service: &MedicalService,
        auth_token: &str,
    ) -> Result<DoctorServiceLink, AppError> {
        if doctor.organization_id != service.organization_id {
            return Err(AppError::ValidationError(
                "Service belongs to a different organization than the doctor".to_string(),
            ));
        }
        if self.offers_service(doctor.id, service.id, auth_token).await? {
            return Err(AppError::Conflict(
                "Doctor already offers this service".to_string(),
            ));
        }

        let link: DoctorServiceLink = self
            .supabase
            .insert(
                "doctor_services",
                json!({ "doctor_id": doctor.id, "service_id": service.id }),
                auth_token,
            )
            .await?;

        info!("Service {} assigned to doctor {}", service.id, doctor.id);
        Ok(link)
    }

    pub async fn remove_service(
        &self,
        doctor_id: Uuid,
        service_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppError> {
        let path = format!(
            "/rest/v1/doctor_services?doctor_id=eq.{}&service_id=eq.{}",
            doctor_id, service_id
        );
        let removed: Vec<DoctorServiceLink> = self.supabase.delete(&path, auth_token).await?;
        if removed.is_empty() {
            return Err(AppError::NotFound(
                "Doctor does not offer this service".to_string(),
            ));
        }
        Ok(())
    }
}

/// Both filters must hold; an absent filter does not constrain.
pub fn intersect_ids(a: Option<Vec<Uuid>>, b: Option<Vec<Uuid>>) -> Option<Vec<Uuid>> {
    let mut ids = match (a, b) {
        (None, None) => return None,
        (Some(ids), None) | (None, Some(ids)) => ids,
        (Some(a), Some(b)) => a.into_iter().filter(|id| b.contains(id)).collect(),
    };

    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
    Some(ids)
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn validate_specialty(specialty: &str) -> Result<(), AppError> {
    if specialty.trim().is_empty() {
        return Err(AppError::ValidationError("Specialty is required".to_string()));
    }
    Ok(())
}

fn validate_experience(years: Option<i32>) -> Result<(), AppError> {
    match years {
        Some(y) if !(0..=70).contains(&y) => Err(AppError::ValidationError(
            "Experience years must be between 0 and 70".to_string(),
        )),
        _ => Ok(()),
    }
}
