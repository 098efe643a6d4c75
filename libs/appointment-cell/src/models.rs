use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::SupabaseError;
use shared_models::error::AppError;
use shared_utils::dates::time_format;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub service_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub appointment_date: NaiveDate,
    #[serde(with = "time_format")]
    pub start_time: NaiveTime,
    #[serde(with = "time_format")]
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Appointment {
    /// Cancelled appointments free their slot; every other status holds it.
    pub fn holds_slot(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }

    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start_time < end && start < self.end_time
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    pub fn next_statuses(&self) -> &'static [AppointmentStatus] {
        match self {
            AppointmentStatus::Pending => {
                &[AppointmentStatus::Confirmed, AppointmentStatus::Cancelled]
            }
            AppointmentStatus::Confirmed => &[
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => &[],
        }
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        self.next_statuses().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.next_statuses().is_empty()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Dates and times arrive as strings so malformed values get a validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub service_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub appointment_date: String,
    pub start_time: String,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailabilityQuery {
    pub date: String,
    pub doctor_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub organization_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailabilitySummaryQuery {
    pub start_date: String,
    pub end_date: String,
    pub doctor_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub organization_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub status: Option<AppointmentStatus>,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub organization_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsQuery {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub organization_id: Option<String>,
}

// ==============================================================================
// AVAILABILITY MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    #[serde(with = "time_format")]
    pub start_time: NaiveTime,
    #[serde(with = "time_format")]
    pub end_time: NaiveTime,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSlots {
    pub doctor_id: Uuid,
    pub slots: Vec<TimeSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub date: NaiveDate,
    pub booking_allowed: bool,
    pub blocked_reason: Option<String>,
    pub slot_minutes: i64,
    pub doctors: Vec<DoctorSlots>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityLevel {
    High,
    Medium,
    Low,
    None,
}

impl AvailabilityLevel {
    /// high: at least half free, medium: at least a fifth, low: anything free.
    pub fn from_counts(total: usize, available: usize) -> Self {
        if total == 0 || available == 0 {
            return AvailabilityLevel::None;
        }
        let ratio = available as f64 / total as f64;
        if ratio >= 0.5 {
            AvailabilityLevel::High
        } else if ratio >= 0.2 {
            AvailabilityLevel::Medium
        } else {
            AvailabilityLevel::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub booking_allowed: bool,
    pub total_slots: usize,
    pub available_slots: usize,
    pub level: AvailabilityLevel,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppointmentStats {
    pub total: u64,
    pub pending: u64,
    pub confirmed: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub no_show: u64,
    pub today: u64,
    pub upcoming: u64,
}

// ==============================================================================
// ERROR HANDLING
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Appointments cannot be booked in the past")]
    PastDate,

    #[error("Patients must book at least {min_days} day(s) in advance")]
    AdvanceBookingRequired { min_days: i64 },

    #[error("Appointments can be booked at most {max_days} days in advance")]
    TooFarAhead { max_days: i64 },

    #[error("The requested time has already passed")]
    SlotInPast,

    #[error("Requested time is outside the doctor's schedule")]
    OutsideSchedule,

    #[error("Appointment slot is no longer available")]
    SlotTaken,

    #[error("Doctor is not accepting appointments")]
    DoctorInactive,

    #[error("Doctor does not offer this service")]
    ServiceNotOffered,

    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Booking is disabled while the system is in maintenance mode")]
    Maintenance,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] SupabaseError),

    #[error(transparent)]
    App(#[from] AppError),
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound | AppointmentError::PatientNotFound => {
                AppError::NotFound(err.to_string())
            }
            AppointmentError::SlotTaken => AppError::Conflict(err.to_string()),
            AppointmentError::Maintenance => AppError::Forbidden(err.to_string()),
            AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
            AppointmentError::Store(e) => AppError::from(e),
            AppointmentError::App(e) => e,
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::PastDate
            | AppointmentError::AdvanceBookingRequired { .. }
            | AppointmentError::TooFarAhead { .. }
            | AppointmentError::SlotInPast
            | AppointmentError::OutsideSchedule
            | AppointmentError::DoctorInactive
            | AppointmentError::ServiceNotOffered
            | AppointmentError::InvalidStatusTransition { .. } => {
                AppError::ValidationError(err.to_string())
            }
        }
    }
}
