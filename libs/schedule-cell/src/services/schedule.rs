// libs/schedule-cell/src/services/schedule.rs
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_store::Collection;

use crate::models::{
    BookableSlot, BreakTime, Schedule, ScheduleError, ScheduleStatus, UpsertScheduleRequest,
    WorkingHours, DEFAULT_SLOT_MINUTES, MAX_SLOT_MINUTES, MIN_SLOT_MINUTES,
};
use crate::services::slots::SlotGridGenerator;

/// One schedule per doctor per calendar day.
pub type ScheduleKey = (Uuid, NaiveDate);
pub type ScheduleStore = Collection<ScheduleKey, Schedule>;

/// Seam to the appointment side: schedule deletion must not orphan live
/// bookings, and only the appointment records can tell a completed visit
/// (terminal, deletable) from a pending one.
pub trait BookingGuard: Send + Sync {
    fn has_active_bookings(&self, doctor_id: Uuid, date: NaiveDate) -> bool;
}

pub struct ScheduleService {
    schedules: Arc<ScheduleStore>,
    grid: SlotGridGenerator,
}

impl ScheduleService {
    pub fn new(schedules: Arc<ScheduleStore>) -> Self {
        Self {
            schedules,
            grid: SlotGridGenerator::new(),
        }
    }

    /// Create a schedule for (doctor, date), or update the existing one.
    ///
    /// On create the slot grid is generated from the working hours; on
    /// update the existing `time_slots` are left untouched even when the
    /// working hours or slot duration change. Regeneration is a separate,
    /// explicit operation so already-booked slots are never silently
    /// destroyed.
    pub fn create_or_update(
        &self,
        request: UpsertScheduleRequest,
    ) -> Result<Schedule, ScheduleError> {
        debug!(
            "Upserting schedule for doctor {} on {}",
            request.doctor_id, request.date
        );

        let duration = request
            .slot_duration_minutes
            .unwrap_or(DEFAULT_SLOT_MINUTES);
        let fee = request.consultation_fee.unwrap_or(0.0);
        let break_times = request.break_times.clone().unwrap_or_default();

        Self::validate_config(&request.working_hours, duration, fee, &break_times)?;

        let key = (request.doctor_id, request.date);
        let now = Utc::now();

        // Omitted optional fields mean "leave unchanged" on update.
        let updated = self.schedules.update(&key, |schedule| {
            schedule.working_hours = request.working_hours;
            if let Some(duration) = request.slot_duration_minutes {
                schedule.slot_duration_minutes = duration;
            }
            if let Some(fee) = request.consultation_fee {
                schedule.consultation_fee = fee;
            }
            if let Some(break_times) = request.break_times.clone() {
                schedule.break_times = break_times;
            }
            if let Some(is_working_day) = request.is_working_day {
                schedule.is_working_day = is_working_day;
            }
            if let Some(status) = request.status.clone() {
                schedule.status = status;
            }
            if let Some(is_recurring) = request.is_recurring {
                schedule.is_recurring = is_recurring;
            }
            if request.recurring_pattern.is_some() {
                schedule.recurring_pattern = request.recurring_pattern.clone();
            }
            if let Some(days) = request.recurring_days.clone() {
                schedule.recurring_days = days;
            }
            if request.recurring_end_date.is_some() {
                schedule.recurring_end_date = request.recurring_end_date;
            }
            schedule.updated_at = now;
            schedule.clone()
        });

        if let Some(schedule) = updated {
            info!(
                "Schedule {} updated for doctor {} on {} (slots preserved)",
                schedule.id, schedule.doctor_id, schedule.date
            );
            return Ok(schedule);
        }

        let time_slots =
            self.grid
                .generate_with_breaks(&request.working_hours, duration, &break_times)?;

        let schedule = Schedule {
            id: Uuid::new_v4(),
            doctor_id: request.doctor_id,
            date: request.date,
            working_hours: request.working_hours,
            slot_duration_minutes: duration,
            time_slots,
            break_times,
            is_working_day: request.is_working_day.unwrap_or(true),
            consultation_fee: fee,
            status: request.status.unwrap_or(ScheduleStatus::Active),
            is_recurring: request.is_recurring.unwrap_or(false),
            recurring_pattern: request.recurring_pattern,
            recurring_days: request.recurring_days.unwrap_or_default(),
            recurring_end_date: request.recurring_end_date,
            created_at: now,
            updated_at: now,
        };

        self.schedules.insert(key, schedule.clone());
        info!(
            "Schedule {} created for doctor {} on {} with {} slots",
            schedule.id,
            schedule.doctor_id,
            schedule.date,
            schedule.time_slots.len()
        );
        Ok(schedule)
    }

    /// Rebuild the slot grid from the schedule's current working hours,
    /// duration and breaks. Discards all occupancy; callers invoke this
    /// deliberately after changing the day's shape.
    pub fn regenerate_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Schedule, ScheduleError> {
        let key = (doctor_id, date);
        let current = self.schedules.get(&key).ok_or(ScheduleError::NotFound)?;

        let time_slots = self.grid.generate_with_breaks(
            &current.working_hours,
            current.slot_duration_minutes,
            &current.break_times,
        )?;

        let booked: i32 = current
            .time_slots
            .iter()
            .map(|s| s.current_patients)
            .sum();
        if booked > 0 {
            warn!(
                "Regenerating slots for doctor {} on {} discards {} existing booking(s)",
                doctor_id, date, booked
            );
        }

        self.schedules
            .update(&key, |schedule| {
                schedule.time_slots = time_slots.clone();
                schedule.updated_at = Utc::now();
                schedule.clone()
            })
            .ok_or(ScheduleError::NotFound)
    }

    pub fn get(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Schedule, ScheduleError> {
        self.schedules
            .get(&(doctor_id, date))
            .ok_or(ScheduleError::NotFound)
    }

    pub fn get_by_id(&self, schedule_id: Uuid) -> Result<Schedule, ScheduleError> {
        self.schedules
            .find_one(|s| s.id == schedule_id)
            .ok_or(ScheduleError::NotFound)
    }

    pub fn list_for_doctor(&self, doctor_id: Uuid) -> Vec<Schedule> {
        let mut schedules = self.schedules.find(|s| s.doctor_id == doctor_id);
        schedules.sort_by_key(|s| s.date);
        schedules
    }

    /// Schedules a patient could book against: active, on a working day,
    /// date within the range, sorted by date.
    pub fn find_bookable(&self, doctor_id: Uuid, from: NaiveDate, to: NaiveDate) -> Vec<Schedule> {
        let mut schedules = self.schedules.find(|s| {
            s.doctor_id == doctor_id && s.is_bookable() && s.date >= from && s.date <= to
        });
        schedules.sort_by_key(|s| s.date);
        schedules
    }

    pub fn list_bookable_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<BookableSlot>, ScheduleError> {
        let schedule = self
            .schedules
            .get(&(doctor_id, date))
            .ok_or(ScheduleError::NotBookable)?;

        if !schedule.is_bookable() {
            return Err(ScheduleError::NotBookable);
        }

        Ok(schedule
            .time_slots
            .iter()
            .map(|s| BookableSlot {
                start_time: s.start_time,
                end_time: s.end_time,
                available: s.is_available,
            })
            .collect())
    }

    /// Delete a schedule, refusing while any non-terminal appointment still
    /// references it.
    pub fn delete(
        &self,
        schedule_id: Uuid,
        guard: &dyn BookingGuard,
    ) -> Result<(), ScheduleError> {
        let schedule = self.get_by_id(schedule_id)?;

        if guard.has_active_bookings(schedule.doctor_id, schedule.date) {
            warn!(
                "Refusing to delete schedule {}: active bookings on {} for doctor {}",
                schedule_id, schedule.date, schedule.doctor_id
            );
            return Err(ScheduleError::HasActiveBookings);
        }

        self.schedules
            .remove(&(schedule.doctor_id, schedule.date))
            .ok_or(ScheduleError::NotFound)?;
        info!("Schedule {} deleted", schedule_id);
        Ok(())
    }

    fn validate_config(
        working_hours: &WorkingHours,
        duration: i32,
        fee: f64,
        break_times: &[BreakTime],
    ) -> Result<(), ScheduleError> {
        if working_hours.end <= working_hours.start {
            return Err(ScheduleError::Configuration(
                "working hours end must be after start".to_string(),
            ));
        }
        if !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&duration) {
            return Err(ScheduleError::Configuration(format!(
                "slot duration must be between {} and {} minutes",
                MIN_SLOT_MINUTES, MAX_SLOT_MINUTES
            )));
        }
        if fee < 0.0 {
            return Err(ScheduleError::Configuration(
                "consultation fee must not be negative".to_string(),
            ));
        }
        for b in break_times {
            if b.end <= b.start {
                return Err(ScheduleError::Configuration(format!(
                    "break end {} must be after start {}",
                    b.end, b.start
                )));
            }
        }
        Ok(())
    }
}
