use chrono::{FixedOffset, NaiveDate, NaiveDateTime};
use futures::future::try_join_all;
use tracing::{debug, info};
use uuid::Uuid;

use doctor_cell::{CatalogService, DoctorFilter, DoctorSchedule, DoctorService, ScheduleService};
use shared_config::AppConfig;
use shared_database::settings::SystemConfigStore;
use shared_database::SupabaseClient;
use shared_models::auth::{User, UserRole};
use shared_utils::dates::{clinic_now, clinic_offset, clinic_today, day_of_week, parse_date};

use crate::models::{
    Appointment, AppointmentError, AvailabilityLevel, AvailabilityQuery, AvailabilityResponse,
    AvailabilitySummaryQuery, DaySummary, DoctorSlots, TimeSlot,
};
use crate::services::rules::BookingPolicy;
use crate::services::slots::generate_slots;

const MAX_SUMMARY_DAYS: i64 = 31;

/// Weekly windows and held appointments of one doctor over a date range.
#[derive(Debug, Clone)]
pub struct DoctorCalendar {
    pub doctor_id: Uuid,
    pub windows: Vec<DoctorSchedule>,
    pub booked: Vec<Appointment>,
}

impl DoctorCalendar {
    pub fn windows_on(&self, date: NaiveDate) -> Vec<DoctorSchedule> {
        let weekday = day_of_week(date);
        self.windows
            .iter()
            .filter(|w| w.day_of_week == weekday)
            .cloned()
            .collect()
    }

    pub fn booked_on(&self, date: NaiveDate) -> Vec<Appointment> {
        self.booked
            .iter()
            .filter(|a| a.appointment_date == date)
            .cloned()
            .collect()
    }

    pub fn slots_on(
        &self,
        date: NaiveDate,
        slot_minutes: i64,
        policy: &BookingPolicy,
        now: NaiveDateTime,
    ) -> Vec<TimeSlot> {
        generate_slots(
            &self.windows_on(date),
            slot_minutes,
            &self.booked_on(date),
            |start| policy.slot_is_open(date, start, now),
        )
    }
}

/// Why `role` cannot book on `date`, if it cannot.
pub fn blocked_reason(
    policy: &BookingPolicy,
    role: UserRole,
    date: NaiveDate,
    today: NaiveDate,
) -> Option<String> {
    policy
        .check_maintenance(role)
        .and_then(|_| policy.check_date(role, date, today))
        .err()
        .map(|e| e.to_string())
}

pub fn summarize_day(
    calendars: &[DoctorCalendar],
    date: NaiveDate,
    slot_minutes: i64,
    policy: &BookingPolicy,
    now: NaiveDateTime,
    booking_allowed: bool,
) -> DaySummary {
    let slots: Vec<TimeSlot> = calendars
        .iter()
        .flat_map(|c| c.slots_on(date, slot_minutes, policy, now))
        .collect();

    let total_slots = slots.len();
    let available_slots = if booking_allowed {
        slots.iter().filter(|s| s.available).count()
    } else {
        0
    };

    DaySummary {
        date,
        booking_allowed,
        total_slots,
        available_slots,
        level: AvailabilityLevel::from_counts(total_slots, available_slots),
    }
}

pub struct AvailabilityService {
    supabase: SupabaseClient,
    doctors: DoctorService,
    schedules: ScheduleService,
    catalog: CatalogService,
    settings: SystemConfigStore,
    offset: FixedOffset,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctors: DoctorService::new(config),
            schedules: ScheduleService::new(config),
            catalog: CatalogService::new(config),
            settings: SystemConfigStore::new(config),
            offset: clinic_offset(config.clinic_utc_offset_minutes),
        }
    }

    pub async fn policy(&self, auth_token: &str) -> BookingPolicy {
        BookingPolicy::from_config(&self.settings.load(auth_token).await)
    }

    /// Current wall-clock time at the clinic.
    pub fn now(&self) -> NaiveDateTime {
        clinic_now(self.offset)
    }

    pub fn today(&self) -> NaiveDate {
        clinic_today(self.offset)
    }

    /// Appointments of a doctor that still hold their slot, between two dates inclusive.
    pub async fn held_appointments(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=gte.{}&appointment_date=lte.{}&status=neq.cancelled&order=appointment_date.asc,start_time.asc",
            doctor_id, from, to
        );
        Ok(self.supabase.select(&path, auth_token).await?)
    }

    pub async fn load_calendar(
        &self,
        doctor_id: Uuid,
        location_id: Option<Uuid>,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: &str,
    ) -> Result<DoctorCalendar, AppointmentError> {
        let mut windows = self
            .schedules
            .list_schedules(doctor_id, true, auth_token)
            .await?;
        if let Some(location_id) = location_id {
            windows.retain(|w| w.location_id == Some(location_id));
        }

        let booked = self
            .held_appointments(doctor_id, from, to, auth_token)
            .await?;

        Ok(DoctorCalendar {
            doctor_id,
            windows,
            booked,
        })
    }

    /// Slot length for a service of the organization, or the configured default.
    pub async fn slot_minutes(
        &self,
        policy: &BookingPolicy,
        organization_id: &str,
        service_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<i64, AppointmentError> {
        let Some(service_id) = service_id else {
            return Ok(policy.slot_minutes(None));
        };

        let service = self.catalog.get_service(service_id, auth_token).await?;
        if service.organization_id.to_string() != organization_id {
            return Err(AppointmentError::Validation(
                "Service belongs to another organization".to_string(),
            ));
        }
        Ok(policy.slot_minutes(Some(service.duration_minutes)))
    }

    async fn candidate_doctors(
        &self,
        organization_id: &str,
        doctor_id: Option<Uuid>,
        service_id: Option<Uuid>,
        location_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Uuid>, AppointmentError> {
        if let Some(doctor_id) = doctor_id {
            let doctor = self.doctors.get_doctor(doctor_id, auth_token).await?;
            if doctor.organization_id.to_string() != organization_id {
                return Err(AppointmentError::Validation(
                    "Doctor belongs to another organization".to_string(),
                ));
            }
            if !doctor.is_active {
                return Ok(vec![]);
            }
            if let Some(service_id) = service_id {
                if !self
                    .doctors
                    .offers_service(doctor_id, service_id, auth_token)
                    .await?
                {
                    return Ok(vec![]);
                }
            }
            return Ok(vec![doctor_id]);
        }

        let filter = DoctorFilter {
            organization_id: organization_id.to_string(),
            service_id,
            location_id,
            include_inactive: false,
        };
        let doctors = self.doctors.list_doctors(&filter, auth_token).await?;
        Ok(doctors.into_iter().map(|d| d.id).collect())
    }

    async fn load_calendars(
        &self,
        doctor_ids: &[Uuid],
        location_id: Option<Uuid>,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<DoctorCalendar>, AppointmentError> {
        try_join_all(
            doctor_ids
                .iter()
                .map(|id| self.load_calendar(*id, location_id, from, to, auth_token)),
        )
        .await
    }

    pub async fn day_availability(
        &self,
        user: &User,
        organization_id: &str,
        query: &AvailabilityQuery,
        auth_token: &str,
    ) -> Result<AvailabilityResponse, AppointmentError> {
        let date = parse_date(&query.date)?;
        let policy = self.policy(auth_token).await;
        let now = self.now();
        let slot_minutes = self
            .slot_minutes(&policy, organization_id, query.service_id, auth_token)
            .await?;

        if let Some(reason) = blocked_reason(&policy, user.app_role(), date, now.date()) {
            debug!("Availability for {} blocked for user {}: {}", date, user.id, reason);
            return Ok(AvailabilityResponse {
                date,
                booking_allowed: false,
                blocked_reason: Some(reason),
                slot_minutes,
                doctors: vec![],
            });
        }

        let doctor_ids = self
            .candidate_doctors(
                organization_id,
                query.doctor_id,
                query.service_id,
                query.location_id,
                auth_token,
            )
            .await?;
        let calendars = self
            .load_calendars(&doctor_ids, query.location_id, date, date, auth_token)
            .await?;

        let doctors = calendars
            .iter()
            .map(|c| DoctorSlots {
                doctor_id: c.doctor_id,
                slots: c.slots_on(date, slot_minutes, &policy, now),
            })
            .collect();

        Ok(AvailabilityResponse {
            date,
            booking_allowed: true,
            blocked_reason: None,
            slot_minutes,
            doctors,
        })
    }

    pub async fn summary(
        &self,
        user: &User,
        organization_id: &str,
        query: &AvailabilitySummaryQuery,
        auth_token: &str,
    ) -> Result<Vec<DaySummary>, AppointmentError> {
        let start = parse_date(&query.start_date)?;
        let end = parse_date(&query.end_date)?;
        if end < start {
            return Err(AppointmentError::Validation(
                "end_date must not be before start_date".to_string(),
            ));
        }
        let days = (end - start).num_days() + 1;
        if days > MAX_SUMMARY_DAYS {
            return Err(AppointmentError::Validation(format!(
                "Date range cannot exceed {} days",
                MAX_SUMMARY_DAYS
            )));
        }

        let policy = self.policy(auth_token).await;
        let now = self.now();
        let role = user.app_role();
        let slot_minutes = self
            .slot_minutes(&policy, organization_id, query.service_id, auth_token)
            .await?;

        let doctor_ids = self
            .candidate_doctors(
                organization_id,
                query.doctor_id,
                query.service_id,
                query.location_id,
                auth_token,
            )
            .await?;
        let calendars = self
            .load_calendars(&doctor_ids, query.location_id, start, end, auth_token)
            .await?;

        info!(
            "Availability summary {}..{} over {} doctor(s)",
            start,
            end,
            calendars.len()
        );

        Ok(start
            .iter_days()
            .take(days as usize)
            .map(|date| {
                let allowed = blocked_reason(&policy, role, date, now.date()).is_none();
                summarize_day(&calendars, date, slot_minutes, &policy, now, allowed)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use shared_config::BookingDefaults;
    use shared_models::settings::SystemConfig;

    fn policy() -> BookingPolicy {
        BookingPolicy::from_config(&SystemConfig::from_defaults(&BookingDefaults::default()))
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn calendar() -> DoctorCalendar {
        DoctorCalendar {
            doctor_id: Uuid::from_u128(7),
            windows: vec![DoctorSchedule {
                id: Uuid::from_u128(1),
                doctor_id: Uuid::from_u128(7),
                location_id: None,
                day_of_week: 1,
                start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                is_active: true,
            }],
            booked: vec![],
        }
    }

    #[test]
    fn patients_see_today_as_blocked() {
        let reason = blocked_reason(&policy(), UserRole::Patient, monday(), monday());
        assert!(reason.unwrap().contains("in advance"));
        assert!(blocked_reason(&policy(), UserRole::Staff, monday(), monday()).is_none());
    }

    #[test]
    fn schedules_only_apply_to_their_weekday() {
        let now = monday().pred_opt().unwrap().and_hms_opt(12, 0, 0).unwrap();
        let cal = calendar();
        assert_eq!(cal.slots_on(monday(), 30, &policy(), now).len(), 4);
        let tuesday = monday().succ_opt().unwrap();
        assert!(cal.slots_on(tuesday, 30, &policy(), now).is_empty());
    }

    #[test]
    fn blocked_day_counts_no_free_slots() {
        let now = monday().pred_opt().unwrap().and_hms_opt(12, 0, 0).unwrap();
        let cals = vec![calendar()];

        let open = summarize_day(&cals, monday(), 30, &policy(), now, true);
        assert_eq!((open.total_slots, open.available_slots), (4, 4));
        assert_eq!(open.level, AvailabilityLevel::High);

        let closed = summarize_day(&cals, monday(), 30, &policy(), now, false);
        assert_eq!((closed.total_slots, closed.available_slots), (4, 0));
        assert_eq!(closed.level, AvailabilityLevel::None);
    }
}
