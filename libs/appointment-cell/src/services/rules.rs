use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::warn;

use shared_models::auth::UserRole;
use shared_models::settings::SystemConfig;

use crate::models::AppointmentError;

/// Date and time rules for booking, evaluated on clinic-local calendar days.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingPolicy {
    pub patient_min_advance_days: i64,
    pub max_advance_booking_days: i64,
    pub default_slot_minutes: i64,
    pub maintenance_mode: bool,
}

impl BookingPolicy {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            patient_min_advance_days: config.patient_min_advance_days,
            max_advance_booking_days: config.max_advance_booking_days,
            default_slot_minutes: config.default_slot_minutes,
            maintenance_mode: config.maintenance_mode,
        }
    }

    pub fn check_maintenance(&self, role: UserRole) -> Result<(), AppointmentError> {
        if self.maintenance_mode && !role.is_superadmin() {
            warn!("Booking rejected for {}: maintenance mode", role);
            return Err(AppointmentError::Maintenance);
        }
        Ok(())
    }

    pub fn min_advance_days(&self, role: UserRole) -> i64 {
        if role.can_book_same_day() {
            0
        } else {
            self.patient_min_advance_days
        }
    }

    /// Compares calendar days only; `today` must be the clinic-local date.
    pub fn check_date(
        &self,
        role: UserRole,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<(), AppointmentError> {
        let days_ahead = (date - today).num_days();

        if days_ahead < 0 {
            return Err(AppointmentError::PastDate);
        }

        let min_days = self.min_advance_days(role);
        if days_ahead < min_days {
            warn!(
                "Booking for {} rejected: {} is {} day(s) ahead, {} requires {}",
                date, date, days_ahead, role, min_days
            );
            return Err(AppointmentError::AdvanceBookingRequired { min_days });
        }

        if days_ahead > self.max_advance_booking_days {
            return Err(AppointmentError::TooFarAhead {
                max_days: self.max_advance_booking_days,
            });
        }

        Ok(())
    }

    /// A slot is still bookable when it starts after the current clinic time.
    pub fn slot_is_open(&self, date: NaiveDate, start: NaiveTime, now: NaiveDateTime) -> bool {
        date > now.date() || (date == now.date() && start > now.time())
    }

    pub fn slot_minutes(&self, service_duration: Option<i32>) -> i64 {
        service_duration
            .map(i64::from)
            .filter(|minutes| *minutes > 0)
            .unwrap_or(self.default_slot_minutes)
    }
}
