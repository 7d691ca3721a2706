// libs/schedule-cell/src/services/reservation.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{ScheduleError, SlotRef};
use crate::services::schedule::ScheduleStore;

/// Sole owner of "is this slot still claimable" truth.
///
/// Both operations run their check-and-mutate inside a single store update,
/// so two concurrent claims on a slot with one remaining unit of capacity
/// resolve to exactly one success and one `SlotUnavailable`.
pub struct ReservationService {
    schedules: Arc<ScheduleStore>,
}

impl ReservationService {
    pub fn new(schedules: Arc<ScheduleStore>) -> Self {
        Self { schedules }
    }

    /// Reserve one unit of a slot's capacity.
    ///
    /// Returns a snapshot of the slot as claimed (capacity and fee at claim
    /// time) for the caller to freeze onto the appointment. Losing the race
    /// for the last unit surfaces as `SlotUnavailable`; callers must re-list
    /// slots rather than retry the same one.
    pub fn claim(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<SlotRef, ScheduleError> {
        debug!(
            "Claiming slot {} on {} for doctor {}",
            start_time, date, doctor_id
        );

        let outcome = self.schedules.update(&(doctor_id, date), |schedule| {
            if !schedule.is_bookable() {
                return Err(ScheduleError::NotBookable);
            }

            let fee = schedule.consultation_fee;
            let slot = schedule
                .slot_mut(start_time)
                .ok_or(ScheduleError::SlotNotFound)?;

            // Occupancy outside its bounds here means the store itself is
            // corrupt; that is a data-integrity bug, not an error path.
            assert!(
                slot.current_patients >= 0 && slot.current_patients <= slot.max_patients,
                "slot occupancy {} out of bounds for capacity {} (doctor {}, {} {})",
                slot.current_patients,
                slot.max_patients,
                doctor_id,
                date,
                start_time
            );

            if !slot.has_capacity() {
                return Err(ScheduleError::SlotUnavailable);
            }

            slot.current_patients += 1;
            slot.is_available = slot.current_patients < slot.max_patients;

            Ok(SlotRef {
                doctor_id,
                date,
                start_time: slot.start_time,
                end_time: slot.end_time,
                max_patients: slot.max_patients,
                consultation_fee: fee,
                appointment_type: slot.appointment_type.clone(),
            })
        });

        match outcome {
            Some(Ok(slot_ref)) => {
                info!(
                    "Slot {} on {} claimed for doctor {}",
                    start_time, date, doctor_id
                );
                Ok(slot_ref)
            }
            Some(Err(ScheduleError::SlotUnavailable)) => {
                warn!(
                    "Slot {} on {} for doctor {} has no remaining capacity",
                    start_time, date, doctor_id
                );
                Err(ScheduleError::SlotUnavailable)
            }
            Some(Err(e)) => Err(e),
            None => Err(ScheduleError::NotBookable),
        }
    }

    /// Return one unit of capacity to a slot.
    ///
    /// Floored at zero and idempotent: releasing an already-open slot is a
    /// no-op, not an error.
    pub fn release(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<(), ScheduleError> {
        debug!(
            "Releasing slot {} on {} for doctor {}",
            start_time, date, doctor_id
        );

        let outcome = self.schedules.update(&(doctor_id, date), |schedule| {
            let slot = schedule
                .slot_mut(start_time)
                .ok_or(ScheduleError::SlotNotFound)?;

            assert!(
                slot.current_patients >= 0 && slot.current_patients <= slot.max_patients,
                "slot occupancy {} out of bounds for capacity {} (doctor {}, {} {})",
                slot.current_patients,
                slot.max_patients,
                doctor_id,
                date,
                start_time
            );

            if slot.current_patients > 0 {
                slot.current_patients -= 1;
            }
            slot.is_available = slot.current_patients < slot.max_patients;
            Ok(())
        });

        match outcome {
            Some(result) => {
                if result.is_ok() {
                    info!(
                        "Slot {} on {} released for doctor {}",
                        start_time, date, doctor_id
                    );
                }
                result
            }
            None => Err(ScheduleError::NotFound),
        }
    }
}
