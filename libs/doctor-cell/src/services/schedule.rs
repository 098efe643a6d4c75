use chrono::NaiveTime;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::error::AppError;
use shared_utils::dates::{format_time, parse_time};

use crate::models::{patch_body, CreateScheduleRequest, DoctorSchedule, UpdateScheduleRequest};

pub struct ScheduleService {
    supabase: SupabaseClient,
}

impl ScheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn list_schedules(
        &self,
        doctor_id: Uuid,
        active_only: bool,
        auth_token: &str,
    ) -> Result<Vec<DoctorSchedule>, AppError> {
        let mut path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&order=day_of_week.asc,start_time.asc",
            doctor_id
        );
        if active_only {
            path.push_str("&is_active=eq.true");
        }
        Ok(self.supabase.select(&path, auth_token).await?)
    }

    /// Active windows of one weekday, optionally at one location.
    pub async fn schedules_for_day(
        &self,
        doctor_id: Uuid,
        day_of_week: i32,
        location_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<DoctorSchedule>, AppError> {
        let mut path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&day_of_week=eq.{}&is_active=eq.true&order=start_time.asc",
            doctor_id, day_of_week
        );
        if let Some(location_id) = location_id {
            path.push_str(&format!("&location_id=eq.{}", location_id));
        }
        Ok(self.supabase.select(&path, auth_token).await?)
    }

    pub async fn create_schedule(
        &self,
        doctor_id: Uuid,
        request: CreateScheduleRequest,
        auth_token: &str,
    ) -> Result<DoctorSchedule, AppError> {
        let start = parse_time(&request.start_time)?;
        let end = parse_time(&request.end_time)?;
        validate_window(request.day_of_week, start, end)?;

        let existing = self.list_schedules(doctor_id, true, auth_token).await?;
        if let Some(clash) = find_overlap(&existing, request.day_of_week, start, end, None) {
            warn!(
                "Schedule for doctor {} on day {} overlaps window {}",
                doctor_id, request.day_of_week, clash.id
            );
            return Err(AppError::Conflict(format!(
                "Schedule overlaps an existing window ({} - {})",
                format_time(clash.start_time),
                format_time(clash.end_time)
            )));
        }

        let schedule: DoctorSchedule = self
            .supabase
            .insert(
                "doctor_availability",
                json!({
                    "doctor_id": doctor_id,
                    "location_id": request.location_id,
                    "day_of_week": request.day_of_week,
                    "start_time": start.format("%H:%M:%S").to_string(),
                    "end_time": end.format("%H:%M:%S").to_string(),
                    "is_active": true,
                }),
                auth_token,
            )
            .await?;

        info!("Schedule {} created for doctor {}", schedule.id, doctor_id);
        Ok(schedule)
    }

    pub async fn update_schedule(
        &self,
        doctor_id: Uuid,
        schedule_id: Uuid,
        request: UpdateScheduleRequest,
        auth_token: &str,
    ) -> Result<DoctorSchedule, AppError> {
        let existing = self.list_schedules(doctor_id, false, auth_token).await?;
        let current = existing
            .iter()
            .find(|s| s.id == schedule_id)
            .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))?;

        let start = match request.start_time.as_deref() {
            Some(raw) => parse_time(raw)?,
            None => current.start_time,
        };
        let end = match request.end_time.as_deref() {
            Some(raw) => parse_time(raw)?,
            None => current.end_time,
        };
        let day = request.day_of_week.unwrap_or(current.day_of_week);
        let will_be_active = request.is_active.unwrap_or(current.is_active);

        validate_window(day, start, end)?;

        if will_be_active {
            let active: Vec<DoctorSchedule> =
                existing.iter().filter(|s| s.is_active).cloned().collect();
            if find_overlap(&active, day, start, end, Some(schedule_id)).is_some() {
                return Err(AppError::Conflict(
                    "Schedule overlaps an existing window".to_string(),
                ));
            }
        }

        let body = patch_body(vec![
            ("day_of_week", request.day_of_week.map(|v| json!(v))),
            (
                "start_time",
                request
                    .start_time
                    .map(|_| json!(start.format("%H:%M:%S").to_string())),
            ),
            (
                "end_time",
                request
                    .end_time
                    .map(|_| json!(end.format("%H:%M:%S").to_string())),
            ),
            ("location_id", request.location_id.map(|v| json!(v))),
            ("is_active", request.is_active.map(|v| json!(v))),
        ]);
        if body.is_empty() {
            return Ok(current.clone());
        }

        let path = format!(
            "/rest/v1/doctor_availability?id=eq.{}&doctor_id=eq.{}",
            schedule_id, doctor_id
        );
        let rows: Vec<DoctorSchedule> = self
            .supabase
            .update(&path, serde_json::Value::Object(body), auth_token)
            .await?;

        debug!("Schedule {} updated", schedule_id);
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))
    }

    pub async fn deactivate_schedule(
        &self,
        doctor_id: Uuid,
        schedule_id: Uuid,
        auth_token: &str,
    ) -> Result<DoctorSchedule, AppError> {
        self.update_schedule(
            doctor_id,
            schedule_id,
            UpdateScheduleRequest {
                is_active: Some(false),
                ..Default::default()
            },
            auth_token,
        )
        .await
    }
}

pub fn validate_window(day_of_week: i32, start: NaiveTime, end: NaiveTime) -> Result<(), AppError> {
    if !(0..=6).contains(&day_of_week) {
        return Err(AppError::ValidationError(
            "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
        ));
    }
    if start >= end {
        return Err(AppError::ValidationError(
            "Start time must be before end time".to_string(),
        ));
    }
    Ok(())
}

/// First window on `day_of_week` that overlaps `[start, end)`, ignoring `exclude`.
pub fn find_overlap(
    schedules: &[DoctorSchedule],
    day_of_week: i32,
    start: NaiveTime,
    end: NaiveTime,
    exclude: Option<Uuid>,
) -> Option<&DoctorSchedule> {
    schedules.iter().find(|s| {
        s.day_of_week == day_of_week && Some(s.id) != exclude && s.overlaps(start, end)
    })
}
