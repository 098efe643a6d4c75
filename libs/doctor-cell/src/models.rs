use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use shared_utils::dates::time_format;

fn default_active() -> bool {
    true
}

// ==============================================================================
// DOCTORS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub profile_id: Uuid,
    pub specialty: String,
    pub license_number: Option<String>,
    pub bio: Option<String>,
    pub experience_years: Option<i32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDoctorRequest {
    pub profile_id: Uuid,
    pub specialty: String,
    pub license_number: Option<String>,
    pub bio: Option<String>,
    pub experience_years: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDoctorRequest {
    pub specialty: Option<String>,
    pub license_number: Option<String>,
    pub bio: Option<String>,
    pub experience_years: Option<i32>,
    pub is_active: Option<bool>,
}

/// Criteria for picking doctors when booking.
#[derive(Debug, Clone, Default)]
pub struct DoctorFilter {
    pub organization_id: String,
    pub service_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub include_inactive: bool,
}

/// Row of the `doctor_services` join table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorServiceLink {
    pub doctor_id: Uuid,
    pub service_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignServiceRequest {
    pub service_id: Uuid,
}

// ==============================================================================
// SERVICES CATALOG
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalService {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub price: Option<f64>,
    pub category: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub price: Option<f64>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration_minutes: Option<i32>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
}

// ==============================================================================
// LOCATIONS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub address: String,
    pub city: Option<String>,
    pub phone: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLocationRequest {
    pub name: String,
    pub address: String,
    pub city: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateLocationRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

// ==============================================================================
// WEEKLY SCHEDULES (doctor_availability)
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSchedule {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub location_id: Option<Uuid>,
    pub day_of_week: i32, // 0 = Sunday
    #[serde(with = "time_format")]
    pub start_time: NaiveTime,
    #[serde(with = "time_format")]
    pub end_time: NaiveTime,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl DoctorSchedule {
    pub fn contains(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start_time <= start && end <= self.end_time
    }

    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start_time < end && start < self.end_time
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub day_of_week: i32,
    pub start_time: String,
    pub end_time: String,
    pub location_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateScheduleRequest {
    pub day_of_week: Option<i32>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

/// Collects `Some` fields of a partial update into a PATCH body.
pub(crate) fn patch_body(fields: Vec<(&str, Option<Value>)>) -> Map<String, Value> {
    fields
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
        .collect()
}
