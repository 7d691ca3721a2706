use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentError, AppointmentStatus, BookAppointmentRequest, CancelledBy,
};
use appointment_cell::services::booking::{AppointmentService, AppointmentStore};
use schedule_cell::models::{ScheduleError, UpsertScheduleRequest, WorkingHours};
use schedule_cell::services::reservation::ReservationService;
use schedule_cell::services::schedule::{BookingGuard, ScheduleService, ScheduleStore};
use shared_models::auth::User;

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn user(id: Uuid, role: &str) -> User {
    User {
        id: id.to_string(),
        email: Some(format!("{}@example.com", role)),
        role: Some(role.to_string()),
        created_at: Some(Utc::now()),
    }
}

struct Clinic {
    schedule_store: Arc<ScheduleStore>,
    schedules: ScheduleService,
    appointments: Arc<AppointmentService>,
    doctor_id: Uuid,
    date: NaiveDate,
}

/// A published working day one month out: 09:00-17:00, 30-minute slots,
/// fee 150.
fn clinic() -> Clinic {
    let schedule_store = Arc::new(ScheduleStore::new());
    let appointment_store = Arc::new(AppointmentStore::new());
    let reservations = Arc::new(ReservationService::new(Arc::clone(&schedule_store)));
    let appointments = Arc::new(AppointmentService::new(
        appointment_store,
        Arc::clone(&reservations),
    ));
    let schedules = ScheduleService::new(Arc::clone(&schedule_store));

    let doctor_id = Uuid::new_v4();
    let date = Utc::now().date_naive() + Duration::days(30);

    schedules
        .create_or_update(UpsertScheduleRequest {
            doctor_id,
            date,
            working_hours: WorkingHours {
                start: t(9, 0),
                end: t(17, 0),
            },
            slot_duration_minutes: Some(30),
            consultation_fee: Some(150.0),
            break_times: None,
            is_working_day: None,
            status: None,
            is_recurring: None,
            recurring_pattern: None,
            recurring_days: None,
            recurring_end_date: None,
        })
        .unwrap();

    Clinic {
        schedule_store,
        schedules,
        appointments,
        doctor_id,
        date,
    }
}

impl Clinic {
    fn booking(&self, patient_id: Uuid, start: NaiveTime) -> BookAppointmentRequest {
        BookAppointmentRequest {
            patient_id,
            doctor_id: self.doctor_id,
            appointment_date: self.date,
            appointment_time: start,
            reason: "persistent headaches".to_string(),
            appointment_type: None,
            duration_minutes: None,
            notes: None,
            symptoms: None,
            backfill: false,
        }
    }

    fn occupancy_at(&self, start: NaiveTime) -> (i32, bool) {
        let schedule = self.schedules.get(self.doctor_id, self.date).unwrap();
        let slot = schedule.slot(start).unwrap();
        (slot.current_patients, slot.is_available)
    }

    /// Group-session shape: raise one slot's capacity above 1.
    fn widen_slot(&self, start: NaiveTime, capacity: i32) {
        self.schedule_store
            .update(&(self.doctor_id, self.date), |schedule| {
                let slot = schedule.slot_mut(start).unwrap();
                slot.max_patients = capacity;
                slot.is_available = slot.current_patients < slot.max_patients;
            })
            .unwrap();
    }
}

#[test]
fn booking_lifecycle_end_to_end() {
    let clinic = clinic();
    let patient_a = Uuid::new_v4();
    let patient_b = Uuid::new_v4();

    // Patient A books 10:00.
    let appointment = clinic
        .appointments
        .create(clinic.booking(patient_a, t(10, 0)))
        .unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Pending);
    assert_eq!(appointment.consultation_fee, 150.0);
    assert_eq!(clinic.occupancy_at(t(10, 0)), (1, false));

    // Patient B races for the same slot and loses.
    assert_matches!(
        clinic.appointments.create(clinic.booking(patient_b, t(10, 0))),
        Err(AppointmentError::Schedule(ScheduleError::SlotUnavailable))
    );

    // The doctor confirms; the slot stays consumed.
    let doctor = user(clinic.doctor_id, "doctor");
    let confirmed = clinic
        .appointments
        .transition(appointment.id, AppointmentStatus::Confirmed, &doctor, None)
        .unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    assert_eq!(clinic.occupancy_at(t(10, 0)), (1, false));

    // Patient A cancels; the slot opens back up.
    let patient = user(patient_a, "patient");
    let cancelled = clinic
        .appointments
        .transition(
            appointment.id,
            AppointmentStatus::Cancelled,
            &patient,
            Some("conflict at work".to_string()),
        )
        .unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.cancelled_by, Some(CancelledBy::Patient));
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("conflict at work"));
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(clinic.occupancy_at(t(10, 0)), (0, true));

    // Patient B can now take 10:00.
    let rebooked = clinic
        .appointments
        .create(clinic.booking(patient_b, t(10, 0)))
        .unwrap();
    assert_eq!(rebooked.status, AppointmentStatus::Pending);
    assert_eq!(clinic.occupancy_at(t(10, 0)), (1, false));
}

#[test]
fn booking_in_the_past_is_rejected() {
    let clinic = clinic();
    let mut request = clinic.booking(Uuid::new_v4(), t(10, 0));
    request.appointment_date = Utc::now().date_naive() - Duration::days(1);

    assert_matches!(
        clinic.appointments.create(request),
        Err(AppointmentError::TemporalViolation(_))
    );
    // The failed request must not have consumed the slot.
    assert_eq!(clinic.occupancy_at(t(10, 0)), (0, true));
}

#[test]
fn booking_beyond_the_horizon_is_rejected() {
    let clinic = clinic();
    let mut request = clinic.booking(Uuid::new_v4(), t(10, 0));
    request.appointment_date = Utc::now().date_naive() + Duration::days(200);

    assert_matches!(
        clinic.appointments.create(request),
        Err(AppointmentError::TemporalViolation(_))
    );
}

#[test]
fn backfilled_records_skip_the_past_check_and_complete() {
    let schedule_store = Arc::new(ScheduleStore::new());
    let reservations = Arc::new(ReservationService::new(Arc::clone(&schedule_store)));
    let appointments = Arc::new(AppointmentService::new(
        Arc::new(AppointmentStore::new()),
        Arc::clone(&reservations),
    ));
    let schedules = ScheduleService::new(schedule_store);

    let doctor_id = Uuid::new_v4();
    let past_date = Utc::now().date_naive() - Duration::days(7);
    schedules
        .create_or_update(UpsertScheduleRequest {
            doctor_id,
            date: past_date,
            working_hours: WorkingHours {
                start: t(9, 0),
                end: t(17, 0),
            },
            slot_duration_minutes: Some(30),
            consultation_fee: Some(150.0),
            break_times: None,
            is_working_day: None,
            status: None,
            is_recurring: None,
            recurring_pattern: None,
            recurring_days: None,
            recurring_end_date: None,
        })
        .unwrap();

    let request = BookAppointmentRequest {
        patient_id: Uuid::new_v4(),
        doctor_id,
        appointment_date: past_date,
        appointment_time: t(11, 0),
        reason: "migrated from paper records".to_string(),
        appointment_type: None,
        duration_minutes: None,
        notes: None,
        symptoms: None,
        backfill: true,
    };

    let appointment = appointments.create(request).unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Completed);

    // Historical visits keep their slot consumed.
    let schedule = schedules.get(doctor_id, past_date).unwrap();
    assert_eq!(schedule.slot(t(11, 0)).unwrap().current_patients, 1);
}

#[test]
fn empty_reason_is_rejected_before_any_claim() {
    let clinic = clinic();
    let mut request = clinic.booking(Uuid::new_v4(), t(10, 0));
    request.reason = "   ".to_string();

    assert_matches!(
        clinic.appointments.create(request),
        Err(AppointmentError::Validation(_))
    );
    assert_eq!(clinic.occupancy_at(t(10, 0)), (0, true));
}

#[test]
fn oversized_reason_and_duration_are_rejected() {
    let clinic = clinic();

    let mut request = clinic.booking(Uuid::new_v4(), t(10, 0));
    request.reason = "x".repeat(501);
    assert_matches!(
        clinic.appointments.create(request),
        Err(AppointmentError::Validation(_))
    );

    let mut request = clinic.booking(Uuid::new_v4(), t(10, 0));
    request.duration_minutes = Some(10);
    assert_matches!(
        clinic.appointments.create(request),
        Err(AppointmentError::Validation(_))
    );

    let mut request = clinic.booking(Uuid::new_v4(), t(10, 0));
    request.duration_minutes = Some(150);
    assert_matches!(
        clinic.appointments.create(request),
        Err(AppointmentError::Validation(_))
    );
}

#[test]
fn appointment_defaults_come_from_the_claimed_slot() {
    let clinic = clinic();

    let appointment = clinic
        .appointments
        .create(clinic.booking(Uuid::new_v4(), t(9, 30)))
        .unwrap();

    assert_eq!(appointment.duration_minutes, 30);
    assert_eq!(appointment.appointment_type.to_string(), "consultation");
}

#[test]
fn duplicate_confirm_is_a_noop_success() {
    let clinic = clinic();
    let doctor = user(clinic.doctor_id, "doctor");

    let appointment = clinic
        .appointments
        .create(clinic.booking(Uuid::new_v4(), t(10, 0)))
        .unwrap();

    clinic
        .appointments
        .transition(appointment.id, AppointmentStatus::Confirmed, &doctor, None)
        .unwrap();
    let again = clinic
        .appointments
        .transition(appointment.id, AppointmentStatus::Confirmed, &doctor, None)
        .unwrap();
    assert_eq!(again.status, AppointmentStatus::Confirmed);
}

#[test]
fn duplicate_cancel_never_double_releases() {
    let clinic = clinic();
    let doctor = user(clinic.doctor_id, "doctor");
    let patient_a = Uuid::new_v4();
    let patient_b = Uuid::new_v4();

    // Two patients share a capacity-2 slot.
    clinic.widen_slot(t(14, 0), 2);
    let appointment_a = clinic
        .appointments
        .create(clinic.booking(patient_a, t(14, 0)))
        .unwrap();
    clinic
        .appointments
        .create(clinic.booking(patient_b, t(14, 0)))
        .unwrap();
    assert_eq!(clinic.occupancy_at(t(14, 0)), (2, false));

    // Two concurrent duplicate cancellations of the same appointment.
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let appointments = Arc::clone(&clinic.appointments);
            let doctor = doctor.clone();
            let id = appointment_a.id;
            std::thread::spawn(move || {
                appointments.transition(id, AppointmentStatus::Cancelled, &doctor, None)
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    // Exactly one unit of capacity came back; patient B's booking is intact.
    assert_eq!(clinic.occupancy_at(t(14, 0)), (1, true));
}

#[test]
fn completed_appointments_keep_their_slot() {
    let clinic = clinic();
    let doctor = user(clinic.doctor_id, "doctor");

    let appointment = clinic
        .appointments
        .create(clinic.booking(Uuid::new_v4(), t(10, 0)))
        .unwrap();

    for status in [
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
    ] {
        clinic
            .appointments
            .transition(appointment.id, status, &doctor, None)
            .unwrap();
    }

    assert_eq!(clinic.occupancy_at(t(10, 0)), (1, false));
}

#[test]
fn no_show_releases_the_slot() {
    let clinic = clinic();
    let doctor = user(clinic.doctor_id, "doctor");

    let appointment = clinic
        .appointments
        .create(clinic.booking(Uuid::new_v4(), t(10, 0)))
        .unwrap();
    clinic
        .appointments
        .transition(appointment.id, AppointmentStatus::Confirmed, &doctor, None)
        .unwrap();
    clinic
        .appointments
        .transition(appointment.id, AppointmentStatus::NoShow, &doctor, None)
        .unwrap();

    assert_eq!(clinic.occupancy_at(t(10, 0)), (0, true));
}

#[test]
fn invalid_transitions_leave_everything_untouched() {
    let clinic = clinic();
    let doctor = user(clinic.doctor_id, "doctor");

    let appointment = clinic
        .appointments
        .create(clinic.booking(Uuid::new_v4(), t(10, 0)))
        .unwrap();

    assert_matches!(
        clinic
            .appointments
            .transition(appointment.id, AppointmentStatus::Completed, &doctor, None),
        Err(AppointmentError::InvalidTransition { .. })
    );

    let unchanged = clinic.appointments.get(appointment.id).unwrap();
    assert_eq!(unchanged.status, AppointmentStatus::Pending);
    assert_eq!(clinic.occupancy_at(t(10, 0)), (1, false));
}

#[test]
fn cancelled_terminal_state_rejects_reopening() {
    let clinic = clinic();
    let doctor = user(clinic.doctor_id, "doctor");

    let appointment = clinic
        .appointments
        .create(clinic.booking(Uuid::new_v4(), t(10, 0)))
        .unwrap();
    clinic
        .appointments
        .transition(appointment.id, AppointmentStatus::Cancelled, &doctor, None)
        .unwrap();

    assert_matches!(
        clinic
            .appointments
            .transition(appointment.id, AppointmentStatus::Confirmed, &doctor, None),
        Err(AppointmentError::InvalidTransition { .. })
    );
}

#[test]
fn schedule_deletion_respects_live_bookings() {
    let clinic = clinic();
    let doctor = user(clinic.doctor_id, "doctor");

    let schedule = clinic.schedules.get(clinic.doctor_id, clinic.date).unwrap();
    let appointment = clinic
        .appointments
        .create(clinic.booking(Uuid::new_v4(), t(10, 0)))
        .unwrap();

    let guard: &dyn BookingGuard = clinic.appointments.as_ref();
    assert_matches!(
        clinic.schedules.delete(schedule.id, guard),
        Err(ScheduleError::HasActiveBookings)
    );

    clinic
        .appointments
        .transition(appointment.id, AppointmentStatus::Cancelled, &doctor, None)
        .unwrap();

    clinic.schedules.delete(schedule.id, guard).unwrap();
}

#[test]
fn transition_of_unknown_appointment_is_not_found() {
    let clinic = clinic();
    let doctor = user(clinic.doctor_id, "doctor");

    assert_matches!(
        clinic
            .appointments
            .transition(Uuid::new_v4(), AppointmentStatus::Confirmed, &doctor, None),
        Err(AppointmentError::NotFound)
    );
}
