//! Calendar helpers for appointment dates.
//!
//! Appointment dates are calendar days in the clinic's timezone. They are
//! parsed as `NaiveDate` directly and compared against "today" computed at
//! the clinic offset, so a `2025-03-10` request never turns into March 9th
//! because it went through a UTC midnight.

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};

use shared_models::error::AppError;

pub fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    let trimmed = raw.trim();
    if trimmed.len() != 10 {
        return Err(AppError::ValidationError(format!(
            "Invalid date '{}', expected YYYY-MM-DD",
            raw
        )));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| {
        AppError::ValidationError(format!("Invalid date '{}', expected YYYY-MM-DD", raw))
    })
}

pub fn parse_time(raw: &str) -> Result<NaiveTime, AppError> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| AppError::ValidationError(format!("Invalid time '{}', expected HH:MM", raw)))
}

pub fn clinic_offset(offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(offset_minutes * 60).unwrap_or_else(|| Utc.fix())
}

pub fn clinic_now(offset: FixedOffset) -> NaiveDateTime {
    Utc::now().with_timezone(&offset).naive_local()
}

pub fn clinic_today(offset: FixedOffset) -> NaiveDate {
    clinic_now(offset).date()
}

/// Day index used by `doctor_availability.day_of_week` (Sunday = 0).
pub fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Accepts the `HH:MM:SS` values PostgREST returns for `time` columns.
pub mod time_format {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time(&raw).map_err(serde::de::Error::custom)
    }
}
