use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use shared_config::BookingDefaults;

use crate::error::AppError;

/// Runtime-editable platform settings, stored as the single `system_config` row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemConfig {
    #[serde(default)]
    pub maintenance_mode: bool,
    #[serde(default = "default_true")]
    pub allow_new_registrations: bool,
    pub patient_min_advance_days: i64,
    pub max_advance_booking_days: i64,
    pub default_slot_minutes: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl SystemConfig {
    pub fn from_defaults(defaults: &BookingDefaults) -> Self {
        Self {
            maintenance_mode: false,
            allow_new_registrations: true,
            patient_min_advance_days: defaults.patient_min_advance_days,
            max_advance_booking_days: defaults.max_advance_booking_days,
            default_slot_minutes: defaults.default_slot_minutes,
            updated_at: None,
        }
    }

    /// Applies a validated update and returns the merged configuration.
    pub fn merged(&self, update: &UpdateSystemConfigRequest) -> Result<Self, AppError> {
        let merged = Self {
            maintenance_mode: update.maintenance_mode.unwrap_or(self.maintenance_mode),
            allow_new_registrations: update
                .allow_new_registrations
                .unwrap_or(self.allow_new_registrations),
            patient_min_advance_days: update
                .patient_min_advance_days
                .unwrap_or(self.patient_min_advance_days),
            max_advance_booking_days: update
                .max_advance_booking_days
                .unwrap_or(self.max_advance_booking_days),
            default_slot_minutes: update
                .default_slot_minutes
                .unwrap_or(self.default_slot_minutes),
            updated_at: Some(Utc::now()),
        };
        merged.validate()?;
        Ok(merged)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Map::new();

        if !(0..=30).contains(&self.patient_min_advance_days) {
            errors.insert(
                "patient_min_advance_days".to_string(),
                json!("must be between 0 and 30"),
            );
        }
        if !(1..=365).contains(&self.max_advance_booking_days) {
            errors.insert(
                "max_advance_booking_days".to_string(),
                json!("must be between 1 and 365"),
            );
        } else if self.max_advance_booking_days < self.patient_min_advance_days {
            errors.insert(
                "max_advance_booking_days".to_string(),
                json!("must not be lower than patient_min_advance_days"),
            );
        }
        if !(5..=240).contains(&self.default_slot_minutes) {
            errors.insert(
                "default_slot_minutes".to_string(),
                json!("must be between 5 and 240"),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::InvalidFields {
                message: "Invalid system configuration".to_string(),
                details: Value::Object(errors),
            })
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSystemConfigRequest {
    pub maintenance_mode: Option<bool>,
    pub allow_new_registrations: Option<bool>,
    pub patient_min_advance_days: Option<i64>,
    pub max_advance_booking_days: Option<i64>,
    pub default_slot_minutes: Option<i64>,
}
