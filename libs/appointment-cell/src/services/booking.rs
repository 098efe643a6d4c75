use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::{CatalogService, Doctor, DoctorService, ScheduleService};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::{User, UserRole};
use shared_utils::dates::{day_of_week, parse_date, parse_time};

use crate::models::{
    Appointment, AppointmentError, AppointmentListQuery, AppointmentStats, AppointmentStatus,
    BookAppointmentRequest, StatsQuery, UpdateStatusRequest,
};
use crate::services::availability::AvailabilityService;
use crate::services::slots::{find_conflict, fits_schedule, slot_end};

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Deserialize)]
struct PatientProfile {
    id: Uuid,
    role: Option<String>,
    organization_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct StatusRow {
    status: AppointmentStatus,
    appointment_date: NaiveDate,
}

/// Which appointments a caller may see.
#[derive(Debug, Clone, PartialEq)]
pub enum Visibility {
    Patient(Uuid),
    Doctor(Uuid),
    Organization(String),
    Everything,
    Nothing,
}

impl Visibility {
    pub fn allows(&self, appointment: &Appointment) -> bool {
        match self {
            Visibility::Patient(id) => appointment.patient_id == *id,
            Visibility::Doctor(id) => appointment.doctor_id == *id,
            Visibility::Organization(org) => appointment.organization_id.to_string() == *org,
            Visibility::Everything => true,
            Visibility::Nothing => false,
        }
    }

    fn filter(&self) -> Option<String> {
        match self {
            Visibility::Patient(id) => Some(format!("patient_id=eq.{}", id)),
            Visibility::Doctor(id) => Some(format!("doctor_id=eq.{}", id)),
            Visibility::Organization(org) => Some(format!("organization_id=eq.{}", org)),
            Visibility::Everything | Visibility::Nothing => None,
        }
    }
}

/// Counts per status plus today's and upcoming active appointments.
pub fn tally<'a, I>(rows: I, today: NaiveDate) -> AppointmentStats
where
    I: IntoIterator<Item = (&'a AppointmentStatus, &'a NaiveDate)>,
{
    let mut stats = AppointmentStats::default();
    for (status, date) in rows {
        stats.total += 1;
        match status {
            AppointmentStatus::Pending => stats.pending += 1,
            AppointmentStatus::Confirmed => stats.confirmed += 1,
            AppointmentStatus::Completed => stats.completed += 1,
            AppointmentStatus::Cancelled => stats.cancelled += 1,
            AppointmentStatus::NoShow => stats.no_show += 1,
        }
        let active = matches!(status, AppointmentStatus::Pending | AppointmentStatus::Confirmed);
        if active && *date == today {
            stats.today += 1;
        }
        if active && *date > today {
            stats.upcoming += 1;
        }
    }
    stats
}

fn user_uuid(user: &User) -> Result<Uuid, AppointmentError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppointmentError::Validation("User id is not a valid UUID".to_string()))
}

fn own_organization(user: &User) -> Result<String, AppointmentError> {
    user.organization_id
        .clone()
        .ok_or_else(|| AppointmentError::Forbidden("User is not assigned to an organization".to_string()))
}

pub struct BookingService {
    supabase: SupabaseClient,
    availability: AvailabilityService,
    doctors: DoctorService,
    schedules: ScheduleService,
    catalog: CatalogService,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            availability: AvailabilityService::new(config),
            doctors: DoctorService::new(config),
            schedules: ScheduleService::new(config),
            catalog: CatalogService::new(config),
        }
    }

    pub async fn book(
        &self,
        user: &User,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let role = user.app_role();
        let policy = self.availability.policy(auth_token).await;
        policy.check_maintenance(role)?;

        let patient_id = self
            .resolve_patient(user, role, request.patient_id, auth_token)
            .await?;

        let date = parse_date(&request.appointment_date)?;
        let start = parse_time(&request.start_time)?;
        let now = self.availability.now();
        policy.check_date(role, date, now.date())?;

        let doctor = self.doctors.get_doctor(request.doctor_id, auth_token).await?;
        if !doctor.is_active {
            return Err(AppointmentError::DoctorInactive);
        }
        let organization_id = doctor.organization_id.to_string();
        if !user.can_access_organization(&organization_id) {
            return Err(AppointmentError::Forbidden(
                "Doctor belongs to another organization".to_string(),
            ));
        }

        let duration = match request.service_id {
            Some(service_id) => {
                let service = self.catalog.get_service(service_id, auth_token).await?;
                if service.organization_id != doctor.organization_id || !service.is_active {
                    return Err(AppointmentError::Validation(
                        "Service is not available in this organization".to_string(),
                    ));
                }
                if !self
                    .doctors
                    .offers_service(doctor.id, service_id, auth_token)
                    .await?
                {
                    return Err(AppointmentError::ServiceNotOffered);
                }
                policy.slot_minutes(Some(service.duration_minutes))
            }
            None => policy.slot_minutes(None),
        };

        let end = slot_end(start, duration).ok_or(AppointmentError::OutsideSchedule)?;
        if !policy.slot_is_open(date, start, now) {
            return Err(AppointmentError::SlotInPast);
        }

        self.check_slot(&doctor, request.location_id, date, start, end, auth_token)
            .await?;

        let appointment: Appointment = self
            .supabase
            .insert(
                "appointments",
                json!({
                    "organization_id": doctor.organization_id,
                    "patient_id": patient_id,
                    "doctor_id": doctor.id,
                    "service_id": request.service_id,
                    "location_id": request.location_id,
                    "appointment_date": date.to_string(),
                    "start_time": start.format("%H:%M:%S").to_string(),
                    "end_time": end.format("%H:%M:%S").to_string(),
                    "duration_minutes": duration,
                    "status": AppointmentStatus::Pending,
                    "reason": request.reason,
                    "notes": request.notes,
                    "created_by": user.id,
                }),
                auth_token,
            )
            .await?;

        info!(
            "Appointment {} booked with doctor {} on {} at {} by {}",
            appointment.id, doctor.id, date, start, user.id
        );
        Ok(appointment)
    }

    /// Patients book for themselves; other roles name a patient of their organization.
    async fn resolve_patient(
        &self,
        user: &User,
        role: UserRole,
        requested: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Uuid, AppointmentError> {
        let own_id = user_uuid(user)?;

        if !role.can_book_for_others() {
            return match requested {
                Some(id) if id != own_id => Err(AppointmentError::Forbidden(
                    "Patients can only book appointments for themselves".to_string(),
                )),
                _ => Ok(own_id),
            };
        }

        let Some(patient_id) = requested else {
            return Err(AppointmentError::Validation(
                "patient_id is required".to_string(),
            ));
        };

        let path = format!(
            "/rest/v1/profiles?id=eq.{}&select=id,role,organization_id",
            patient_id
        );
        let profile: PatientProfile = self
            .supabase
            .select_one(&path, auth_token)
            .await?
            .ok_or(AppointmentError::PatientNotFound)?;

        if profile.role.as_deref().is_some_and(|r| r != "patient") {
            debug!("Booking on behalf of non-patient profile {}", profile.id);
        }
        if let Some(org) = profile.organization_id {
            if !user.can_access_organization(&org.to_string()) {
                return Err(AppointmentError::Forbidden(
                    "Patient belongs to another organization".to_string(),
                ));
            }
        }
        Ok(profile.id)
    }

    async fn check_slot(
        &self,
        doctor: &Doctor,
        location_id: Option<Uuid>,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let windows = self
            .schedules
            .schedules_for_day(doctor.id, day_of_week(date), location_id, auth_token)
            .await?;
        if !fits_schedule(&windows, start, end) {
            warn!(
                "Requested {}-{} on {} is outside doctor {}'s schedule",
                start, end, date, doctor.id
            );
            return Err(AppointmentError::OutsideSchedule);
        }

        let held = self
            .availability
            .held_appointments(doctor.id, date, date, auth_token)
            .await?;
        if let Some(clash) = find_conflict(&held, start, end) {
            warn!(
                "Requested {}-{} on {} overlaps appointment {}",
                start, end, date, clash.id
            );
            return Err(AppointmentError::SlotTaken);
        }
        Ok(())
    }

    pub async fn visibility(
        &self,
        user: &User,
        auth_token: &str,
    ) -> Result<Visibility, AppointmentError> {
        Ok(match user.app_role() {
            UserRole::Patient => Visibility::Patient(user_uuid(user)?),
            UserRole::Doctor => match self.doctors.find_by_profile(&user.id, auth_token).await? {
                Some(doctor) => Visibility::Doctor(doctor.id),
                None => Visibility::Nothing,
            },
            UserRole::Staff | UserRole::Admin => Visibility::Organization(own_organization(user)?),
            UserRole::Superadmin => Visibility::Everything,
        })
    }

    pub async fn list(
        &self,
        user: &User,
        query: &AppointmentListQuery,
        auth_token: &str,
    ) -> Result<(Vec<Appointment>, u64), AppointmentError> {
        let visibility = self.visibility(user, auth_token).await?;
        if visibility == Visibility::Nothing {
            return Ok((vec![], 0));
        }

        let mut filters: Vec<String> = visibility.filter().into_iter().collect();
        if visibility == Visibility::Everything {
            if let Some(org) = &query.organization_id {
                filters.push(format!("organization_id=eq.{}", org));
            }
        }
        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status));
        }
        if let Some(doctor_id) = query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = query.patient_id {
            filters.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(from) = query.from_date.as_deref() {
            filters.push(format!("appointment_date=gte.{}", parse_date(from)?));
        }
        if let Some(to) = query.to_date.as_deref() {
            filters.push(format!("appointment_date=lte.{}", parse_date(to)?));
        }

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0);

        let mut count_parts = vec!["select=id".to_string()];
        count_parts.extend(filters.iter().cloned());
        let count_path = format!("/rest/v1/appointments?{}", count_parts.join("&"));

        filters.push("order=appointment_date.asc,start_time.asc".to_string());
        filters.push(format!("limit={}", limit));
        filters.push(format!("offset={}", offset));
        let list_path = format!("/rest/v1/appointments?{}", filters.join("&"));

        let appointments: Vec<Appointment> = self.supabase.select(&list_path, auth_token).await?;
        let total = self.supabase.count(&count_path, auth_token).await?;

        debug!("Listed {} of {} appointments for {}", appointments.len(), total, user.id);
        Ok((appointments, total))
    }

    pub async fn get(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let appointment: Appointment = self
            .supabase
            .select_one(&path, auth_token)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        if !self.visibility(user, auth_token).await?.allows(&appointment) {
            return Err(AppointmentError::Forbidden(
                "Not allowed to access this appointment".to_string(),
            ));
        }
        Ok(appointment)
    }

    pub async fn update_status(
        &self,
        user: &User,
        appointment_id: Uuid,
        request: UpdateStatusRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get(user, appointment_id, auth_token).await?;

        if user.app_role() == UserRole::Patient && request.status != AppointmentStatus::Cancelled {
            return Err(AppointmentError::Forbidden(
                "Patients can only cancel appointments".to_string(),
            ));
        }
        if !current.status.can_transition_to(request.status) {
            warn!(
                "Rejected transition {} -> {} for appointment {}",
                current.status, request.status, appointment_id
            );
            return Err(AppointmentError::InvalidStatusTransition {
                from: current.status,
                to: request.status,
            });
        }

        let mut body = Map::new();
        body.insert("status".to_string(), json!(request.status));
        if let Some(notes) = request.notes {
            body.insert("notes".to_string(), json!(notes));
        }
        self.apply_update(appointment_id, body, auth_token).await
    }

    pub async fn cancel(
        &self,
        user: &User,
        appointment_id: Uuid,
        reason: Option<String>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get(user, appointment_id, auth_token).await?;
        if !current.status.can_transition_to(AppointmentStatus::Cancelled) {
            return Err(AppointmentError::InvalidStatusTransition {
                from: current.status,
                to: AppointmentStatus::Cancelled,
            });
        }

        let mut body = Map::new();
        body.insert("status".to_string(), json!(AppointmentStatus::Cancelled));
        body.insert("cancellation_reason".to_string(), json!(reason));

        let appointment = self.apply_update(appointment_id, body, auth_token).await?;
        info!("Appointment {} cancelled by {}", appointment_id, user.id);
        Ok(appointment)
    }

    async fn apply_update(
        &self,
        appointment_id: Uuid,
        mut body: Map<String, Value>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Appointment> = self
            .supabase
            .update(&path, Value::Object(body), auth_token)
            .await?;
        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    pub async fn stats(
        &self,
        organization_id: &str,
        query: &StatsQuery,
        auth_token: &str,
    ) -> Result<AppointmentStats, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?organization_id=eq.{}&select=status,appointment_date",
            organization_id
        );
        if let Some(from) = query.from_date.as_deref() {
            path.push_str(&format!("&appointment_date=gte.{}", parse_date(from)?));
        }
        if let Some(to) = query.to_date.as_deref() {
            path.push_str(&format!("&appointment_date=lte.{}", parse_date(to)?));
        }

        let rows: Vec<StatusRow> = self.supabase.select(&path, auth_token).await?;
        let today = self.availability.today();
        Ok(tally(
            rows.iter().map(|r| (&r.status, &r.appointment_date)),
            today,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appointment(patient: u128, doctor: u128, org: u128) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            organization_id: Uuid::from_u128(org),
            patient_id: Uuid::from_u128(patient),
            doctor_id: Uuid::from_u128(doctor),
            service_id: None,
            location_id: None,
            appointment_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            duration_minutes: 30,
            status: AppointmentStatus::Pending,
            reason: None,
            notes: None,
            cancellation_reason: None,
            created_by: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn visibility_scopes() {
        let appt = appointment(1, 2, 3);
        assert!(Visibility::Patient(Uuid::from_u128(1)).allows(&appt));
        assert!(!Visibility::Patient(Uuid::from_u128(9)).allows(&appt));
        assert!(Visibility::Doctor(Uuid::from_u128(2)).allows(&appt));
        assert!(Visibility::Organization(Uuid::from_u128(3).to_string()).allows(&appt));
        assert!(!Visibility::Organization(Uuid::from_u128(4).to_string()).allows(&appt));
        assert!(Visibility::Everything.allows(&appt));
        assert!(!Visibility::Nothing.allows(&appt));
    }

    #[test]
    fn tally_counts_statuses_and_dates() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let tomorrow = today.succ_opt().unwrap();
        let rows = vec![
            (AppointmentStatus::Pending, today),
            (AppointmentStatus::Confirmed, tomorrow),
            (AppointmentStatus::Cancelled, tomorrow),
            (AppointmentStatus::Completed, today),
        ];

        let stats = tally(rows.iter().map(|(s, d)| (s, d)), today);

        assert_eq!(stats.total, 4);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.today, 1);
        assert_eq!(stats.upcoming, 1);
    }
}
