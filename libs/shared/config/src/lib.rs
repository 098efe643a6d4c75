use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Booking limits used when the `system_config` row is missing or unreadable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingDefaults {
    pub patient_min_advance_days: i64,
    pub max_advance_booking_days: i64,
    pub default_slot_minutes: i64,
}

impl Default for BookingDefaults {
    fn default() -> Self {
        Self {
            patient_min_advance_days: 1,
            max_advance_booking_days: 90,
            default_slot_minutes: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub server_port: u16,
    /// Offset of the clinic's wall clock from UTC. Bogota is UTC-5 all year.
    pub clinic_utc_offset_minutes: i32,
    pub booking: BookingDefaults,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = BookingDefaults::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            server_port: parse_var("PORT", 3000),
            clinic_utc_offset_minutes: parse_var("CLINIC_UTC_OFFSET_MINUTES", -300),
            booking: BookingDefaults {
                patient_min_advance_days: parse_var(
                    "PATIENT_MIN_ADVANCE_DAYS",
                    defaults.patient_min_advance_days,
                ),
                max_advance_booking_days: parse_var(
                    "MAX_ADVANCE_BOOKING_DAYS",
                    defaults.max_advance_booking_days,
                ),
                default_slot_minutes: parse_var(
                    "DEFAULT_SLOT_MINUTES",
                    defaults.default_slot_minutes,
                ),
            },
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_defaults_match_clinic_policy() {
        let defaults = BookingDefaults::default();
        assert_eq!(defaults.patient_min_advance_days, 1);
        assert_eq!(defaults.max_advance_booking_days, 90);
        assert_eq!(defaults.default_slot_minutes, 30);
    }

    #[test]
    fn unparsable_variable_falls_back_to_default() {
        env::set_var("AGENTSALUD_TEST_BAD_NUMBER", "not-a-number");
        let value: i64 = parse_var("AGENTSALUD_TEST_BAD_NUMBER", 42);
        assert_eq!(value, 42);
        env::remove_var("AGENTSALUD_TEST_BAD_NUMBER");
    }

    #[test]
    fn missing_supabase_values_mean_not_configured() {
        let config = AppConfig {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: "secret".to_string(),
            server_port: 3000,
            clinic_utc_offset_minutes: -300,
            booking: BookingDefaults::default(),
        };
        assert!(!config.is_configured());
    }
}
