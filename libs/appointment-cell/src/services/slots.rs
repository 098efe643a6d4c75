use std::collections::BTreeMap;

use chrono::{Duration, NaiveTime};

use doctor_cell::DoctorSchedule;

use crate::models::{Appointment, TimeSlot};

/// End of a slot starting at `start`, or `None` if it would run past midnight.
pub fn slot_end(start: NaiveTime, minutes: i64) -> Option<NaiveTime> {
    let (end, wrapped) = start.overflowing_add_signed(Duration::minutes(minutes));
    (wrapped == 0).then_some(end)
}

/// Consecutive slots of `slot_minutes` inside each window, marked unavailable
/// when they collide with a held appointment or `is_open` rejects their start.
pub fn generate_slots<F>(
    windows: &[DoctorSchedule],
    slot_minutes: i64,
    booked: &[Appointment],
    is_open: F,
) -> Vec<TimeSlot>
where
    F: Fn(NaiveTime) -> bool,
{
    if slot_minutes <= 0 {
        return vec![];
    }

    let mut slots: BTreeMap<(NaiveTime, NaiveTime), bool> = BTreeMap::new();

    for window in windows.iter().filter(|w| w.is_active) {
        let mut cursor = window.start_time;
        while let Some(end) = slot_end(cursor, slot_minutes) {
            if end > window.end_time {
                break;
            }

            let taken = booked
                .iter()
                .any(|a| a.holds_slot() && a.overlaps(cursor, end));
            let available = !taken && is_open(cursor);

            // Overlapping windows can emit the same slot twice.
            slots
                .entry((cursor, end))
                .and_modify(|existing| *existing = *existing && available)
                .or_insert(available);

            cursor = end;
        }
    }

    slots
        .into_iter()
        .map(|((start_time, end_time), available)| TimeSlot {
            start_time,
            end_time,
            available,
        })
        .collect()
}

/// Whether `[start, end)` fits entirely inside one active window.
pub fn fits_schedule(windows: &[DoctorSchedule], start: NaiveTime, end: NaiveTime) -> bool {
    windows
        .iter()
        .any(|w| w.is_active && w.contains(start, end))
}

pub fn find_conflict(booked: &[Appointment], start: NaiveTime, end: NaiveTime) -> Option<&Appointment> {
    booked
        .iter()
        .find(|a| a.holds_slot() && a.overlaps(start, end))
}
