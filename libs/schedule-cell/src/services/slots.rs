// libs/schedule-cell/src/services/slots.rs
use chrono::Duration;

use crate::models::{AppointmentType, BreakTime, ScheduleError, TimeSlot, WorkingHours};

/// Produces the ordered slot grid for one calendar day.
pub struct SlotGridGenerator;

impl SlotGridGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Walk the working-hours window in fixed `duration_minutes` steps.
    ///
    /// The last slot is included only when it fits entirely before the end
    /// of the window; there is no short trailing slot. Every slot starts
    /// open with capacity 1.
    pub fn generate(
        &self,
        working_hours: &WorkingHours,
        duration_minutes: i32,
    ) -> Result<Vec<TimeSlot>, ScheduleError> {
        if duration_minutes <= 0 {
            return Err(ScheduleError::Configuration(format!(
                "slot duration must be positive, got {}",
                duration_minutes
            )));
        }
        if working_hours.end <= working_hours.start {
            return Err(ScheduleError::Configuration(format!(
                "working hours end {} must be after start {}",
                working_hours.end, working_hours.start
            )));
        }

        let step = Duration::minutes(duration_minutes as i64);
        let mut slots = Vec::new();
        let mut cursor = working_hours.start;

        loop {
            let (slot_end, wrapped) = cursor.overflowing_add_signed(step);
            if wrapped != 0 || slot_end > working_hours.end {
                break;
            }
            slots.push(TimeSlot {
                start_time: cursor,
                end_time: slot_end,
                max_patients: 1,
                current_patients: 0,
                is_available: true,
                appointment_type: AppointmentType::Consultation,
            });
            cursor = slot_end;
        }

        Ok(slots)
    }

    /// Soft-block every slot whose start falls inside a break window by
    /// saturating its occupancy. To the reservation engine a blocked slot is
    /// indistinguishable from a fully booked one.
    pub fn apply_breaks(&self, slots: &mut [TimeSlot], break_times: &[BreakTime]) {
        for slot in slots.iter_mut() {
            let in_break = break_times
                .iter()
                .any(|b| slot.start_time >= b.start && slot.start_time < b.end);
            if in_break {
                slot.current_patients = slot.max_patients;
                slot.is_available = false;
            }
        }
    }

    /// Full grid for a day: generate, then apply breaks.
    pub fn generate_with_breaks(
        &self,
        working_hours: &WorkingHours,
        duration_minutes: i32,
        break_times: &[BreakTime],
    ) -> Result<Vec<TimeSlot>, ScheduleError> {
        let mut slots = self.generate(working_hours, duration_minutes)?;
        self.apply_breaks(&mut slots, break_times);
        Ok(slots)
    }
}

impl Default for SlotGridGenerator {
    fn default() -> Self {
        Self::new()
    }
}
