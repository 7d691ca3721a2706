// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{Months, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use schedule_cell::services::reservation::ReservationService;
use schedule_cell::services::schedule::BookingGuard;
use shared_models::auth::User;
use shared_store::Collection;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStats, AppointmentStatus,
    BookAppointmentRequest, BookingValidationRules, CancelledBy, PaymentStatus,
    UpdateDetailsRequest,
};
use crate::services::lifecycle::AppointmentLifecycleService;

pub type AppointmentStore = Collection<Uuid, Appointment>;

enum TransitionOutcome {
    /// Already in the requested state; nothing changed, no side effects.
    AlreadyThere(Appointment),
    /// The state moved; `releases_slot` side effect belongs to this caller.
    Applied(Appointment),
}

pub struct AppointmentService {
    appointments: Arc<AppointmentStore>,
    reservations: Arc<ReservationService>,
    lifecycle: AppointmentLifecycleService,
    rules: BookingValidationRules,
}

impl AppointmentService {
    pub fn new(appointments: Arc<AppointmentStore>, reservations: Arc<ReservationService>) -> Self {
        Self {
            appointments,
            reservations,
            lifecycle: AppointmentLifecycleService::new(),
            rules: BookingValidationRules::default(),
        }
    }

    /// Book an appointment: validate, claim the slot, persist.
    ///
    /// The claim happens last, after every validation, so a failed request
    /// never leaves a slot consumed. Claim failures propagate unchanged and
    /// no appointment is created.
    pub fn create(&self, request: BookAppointmentRequest) -> Result<Appointment, AppointmentError> {
        info!(
            "Booking appointment for patient {} with doctor {} at {} {}",
            request.patient_id, request.doctor_id, request.appointment_date, request.appointment_time
        );

        self.validate_booking_request(&request)?;
        self.validate_booking_window(&request)?;

        let slot_ref = self.reservations.claim(
            request.doctor_id,
            request.appointment_date,
            request.appointment_time,
        )?;

        let now = Utc::now();
        let status = if request.backfill {
            AppointmentStatus::Completed
        } else {
            AppointmentStatus::Pending
        };

        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            appointment_date: request.appointment_date,
            appointment_time: request.appointment_time,
            duration_minutes: request
                .duration_minutes
                .unwrap_or(self.rules.default_appointment_duration),
            status,
            appointment_type: request
                .appointment_type
                .unwrap_or(slot_ref.appointment_type),
            reason: request.reason,
            notes: request.notes,
            symptoms: request.symptoms,
            diagnosis: None,
            prescription: None,
            follow_up_date: None,
            follow_up_notes: None,
            consultation_fee: slot_ref.consultation_fee,
            payment_status: PaymentStatus::Pending,
            payment_method: None,
            cancelled_by: None,
            cancellation_reason: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };

        self.appointments.insert(appointment.id, appointment.clone());
        info!(
            "Appointment {} created ({}) for patient {}",
            appointment.id, appointment.status, appointment.patient_id
        );
        Ok(appointment)
    }

    /// Drive the status state machine.
    ///
    /// The status check-and-set runs atomically in the store, so concurrent
    /// duplicate requests are safe: a repeat that finds the appointment
    /// already in the target state is a no-op success, and the slot release
    /// fires only for the one request that actually moved the state.
    pub fn transition(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        actor: &User,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        debug!(
            "Transitioning appointment {} to {}",
            appointment_id, new_status
        );

        let outcome = self
            .appointments
            .update(&appointment_id, |appointment| {
                if appointment.status == new_status {
                    return Ok::<TransitionOutcome, AppointmentError>(
                        TransitionOutcome::AlreadyThere(appointment.clone()),
                    );
                }

                self.lifecycle
                    .validate_transition(&appointment.status, &new_status)?;

                appointment.status = new_status.clone();
                appointment.updated_at = Utc::now();

                if new_status == AppointmentStatus::Cancelled {
                    appointment.cancelled_by = Some(cancelled_by_role(actor));
                    appointment.cancellation_reason = reason.clone();
                    appointment.cancelled_at = Some(Utc::now());
                }

                Ok(TransitionOutcome::Applied(appointment.clone()))
            })
            .ok_or(AppointmentError::NotFound)??;

        match outcome {
            TransitionOutcome::AlreadyThere(appointment) => {
                debug!(
                    "Appointment {} already {}, treating as no-op",
                    appointment_id, appointment.status
                );
                Ok(appointment)
            }
            TransitionOutcome::Applied(appointment) => {
                if self.lifecycle.releases_slot(&appointment.status) {
                    // Release coordinates come from the appointment itself,
                    // never from a live schedule lookup.
                    if let Err(e) = self.reservations.release(
                        appointment.doctor_id,
                        appointment.appointment_date,
                        appointment.appointment_time,
                    ) {
                        warn!(
                            "Could not release slot {} {} for appointment {}: {}",
                            appointment.appointment_date,
                            appointment.appointment_time,
                            appointment.id,
                            e
                        );
                    }
                }
                info!(
                    "Appointment {} transitioned to {}",
                    appointment_id, appointment.status
                );
                Ok(appointment)
            }
        }
    }

    pub fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.appointments
            .get(&appointment_id)
            .ok_or(AppointmentError::NotFound)
    }

    /// Filtered listing, most recent first.
    pub fn search(&self, query: &AppointmentSearchQuery) -> Vec<Appointment> {
        let mut appointments = self.appointments.find(|a| {
            query.patient_id.is_none_or(|id| a.patient_id == id)
                && query.doctor_id.is_none_or(|id| a.doctor_id == id)
                && query.status.as_ref().is_none_or(|s| a.status == *s)
                && query.from_date.is_none_or(|d| a.appointment_date >= d)
                && query.to_date.is_none_or(|d| a.appointment_date <= d)
        });

        appointments.sort_by(|a, b| {
            (b.appointment_date, b.appointment_time).cmp(&(a.appointment_date, a.appointment_time))
        });

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(50);
        appointments.into_iter().skip(offset).take(limit).collect()
    }

    /// Active appointments from today onward, soonest first.
    pub fn upcoming(&self, patient_id: Option<Uuid>, doctor_id: Option<Uuid>) -> Vec<Appointment> {
        let today = Utc::now().date_naive();
        let mut appointments = self.appointments.find(|a| {
            patient_id.is_none_or(|id| a.patient_id == id)
                && doctor_id.is_none_or(|id| a.doctor_id == id)
                && a.appointment_date >= today
                && !a.status.is_terminal()
        });
        appointments.sort_by_key(|a| (a.appointment_date, a.appointment_time));
        appointments
    }

    /// Last-write-wins update of clinical and payment fields; these races
    /// are benign and carry no safety invariant.
    pub fn update_details(
        &self,
        appointment_id: Uuid,
        request: UpdateDetailsRequest,
    ) -> Result<Appointment, AppointmentError> {
        if let Some(notes) = &request.notes {
            if notes.len() > self.rules.max_notes_length {
                return Err(AppointmentError::Validation(format!(
                    "notes must not exceed {} characters",
                    self.rules.max_notes_length
                )));
            }
        }

        self.appointments
            .update(&appointment_id, |appointment| {
                if let Some(notes) = request.notes.clone() {
                    appointment.notes = Some(notes);
                }
                if let Some(symptoms) = request.symptoms.clone() {
                    appointment.symptoms = Some(symptoms);
                }
                if let Some(diagnosis) = request.diagnosis.clone() {
                    appointment.diagnosis = Some(diagnosis);
                }
                if let Some(prescription) = request.prescription.clone() {
                    appointment.prescription = Some(prescription);
                }
                if let Some(follow_up_date) = request.follow_up_date {
                    appointment.follow_up_date = Some(follow_up_date);
                }
                if let Some(follow_up_notes) = request.follow_up_notes.clone() {
                    appointment.follow_up_notes = Some(follow_up_notes);
                }
                if let Some(payment_status) = request.payment_status.clone() {
                    appointment.payment_status = payment_status;
                }
                if let Some(payment_method) = request.payment_method.clone() {
                    appointment.payment_method = Some(payment_method);
                }
                appointment.updated_at = Utc::now();
                appointment.clone()
            })
            .ok_or(AppointmentError::NotFound)
    }

    pub fn stats(&self, patient_id: Option<Uuid>, doctor_id: Option<Uuid>) -> AppointmentStats {
        let appointments = self.appointments.find(|a| {
            patient_id.is_none_or(|id| a.patient_id == id)
                && doctor_id.is_none_or(|id| a.doctor_id == id)
        });

        let count = |status: AppointmentStatus| {
            appointments.iter().filter(|a| a.status == status).count()
        };

        AppointmentStats {
            total_appointments: appointments.len(),
            pending: count(AppointmentStatus::Pending),
            confirmed: count(AppointmentStatus::Confirmed),
            in_progress: count(AppointmentStatus::InProgress),
            completed: count(AppointmentStatus::Completed),
            cancelled: count(AppointmentStatus::Cancelled),
            no_show: count(AppointmentStatus::NoShow),
        }
    }

    fn validate_booking_request(
        &self,
        request: &BookAppointmentRequest,
    ) -> Result<(), AppointmentError> {
        if request.reason.trim().is_empty() {
            return Err(AppointmentError::Validation(
                "reason is required".to_string(),
            ));
        }
        if request.reason.len() > self.rules.max_reason_length {
            return Err(AppointmentError::Validation(format!(
                "reason must not exceed {} characters",
                self.rules.max_reason_length
            )));
        }
        if let Some(notes) = &request.notes {
            if notes.len() > self.rules.max_notes_length {
                return Err(AppointmentError::Validation(format!(
                    "notes must not exceed {} characters",
                    self.rules.max_notes_length
                )));
            }
        }
        if let Some(duration) = request.duration_minutes {
            if duration < self.rules.min_appointment_duration
                || duration > self.rules.max_appointment_duration
            {
                return Err(AppointmentError::Validation(format!(
                    "appointment duration must be between {} and {} minutes",
                    self.rules.min_appointment_duration, self.rules.max_appointment_duration
                )));
            }
        }
        Ok(())
    }

    /// Not in the past (unless backfilled), not beyond the booking horizon.
    fn validate_booking_window(
        &self,
        request: &BookAppointmentRequest,
    ) -> Result<(), AppointmentError> {
        let starts_at = request.appointment_date.and_time(request.appointment_time);
        let now = Utc::now().naive_utc();

        if !request.backfill && starts_at <= now {
            return Err(AppointmentError::TemporalViolation(
                "appointment time is in the past".to_string(),
            ));
        }

        let horizon = now
            .checked_add_months(Months::new(self.rules.max_advance_booking_months))
            .unwrap_or(chrono::NaiveDateTime::MAX);
        if starts_at > horizon {
            return Err(AppointmentError::TemporalViolation(format!(
                "appointment cannot be booked more than {} months in advance",
                self.rules.max_advance_booking_months
            )));
        }

        Ok(())
    }
}

impl BookingGuard for AppointmentService {
    fn has_active_bookings(&self, doctor_id: Uuid, date: NaiveDate) -> bool {
        self.appointments
            .find_one(|a| {
                a.doctor_id == doctor_id && a.appointment_date == date && !a.status.is_terminal()
            })
            .is_some()
    }
}

fn cancelled_by_role(actor: &User) -> CancelledBy {
    match actor.role.as_deref() {
        Some("doctor") => CancelledBy::Doctor,
        Some("admin") => CancelledBy::Admin,
        _ => CancelledBy::Patient,
    }
}
