// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use schedule_cell::models::ScheduleError;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus,
    BookAppointmentRequest, UpdateDetailsRequest, UpdateStatusRequest,
};
use crate::AppointmentCellState;

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

/// Book an appointment: patients for themselves, doctors and admins for
/// anyone. Backfilled historical records are admin-only.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let is_own_booking = user.id == request.patient_id.to_string();
    if !(is_own_booking || user.is_admin() || user.is_doctor()) {
        return Err(AppError::Auth(
            "Not authorized to book appointment for this patient".to_string(),
        ));
    }
    if request.backfill && !user.is_admin() {
        return Err(AppError::Auth(
            "Only admins may backfill historical appointments".to_string(),
        ));
    }

    let appointment = state
        .appointments
        .create(request)
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .appointments
        .get(appointment_id)
        .map_err(map_appointment_error)?;

    authorize_participant(&user, &appointment)?;

    Ok(Json(json!({ "appointment": appointment })))
}

/// Drive the status state machine for one appointment.
#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .appointments
        .get(appointment_id)
        .map_err(map_appointment_error)?;

    authorize_status_change(&user, &appointment, &request.status)?;

    let updated = state
        .appointments
        .transition(appointment_id, request.status, &user, request.reason)
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": updated
    })))
}

/// Update clinical and payment details (doctor on own appointments, admin).
#[axum::debug_handler]
pub async fn update_appointment_details(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateDetailsRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .appointments
        .get(appointment_id)
        .map_err(map_appointment_error)?;

    let is_own_doctor = user.is_doctor() && user.id == appointment.doctor_id.to_string();
    if !(user.is_admin() || is_own_doctor) {
        return Err(AppError::Auth(
            "Not authorized to update this appointment".to_string(),
        ));
    }

    let updated = state
        .appointments
        .update_details(appointment_id, request)
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": updated
    })))
}

/// Search appointments. Non-admin callers are scoped to their own records.
#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Query(mut query): Query<AppointmentSearchQuery>,
) -> Result<Json<Value>, AppError> {
    scope_query_to_caller(&user, &mut query)?;

    let appointments = state.appointments.search(&query);
    let count = appointments.len();

    Ok(Json(json!({
        "appointments": appointments,
        "count": count
    })))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !(user.is_admin() || user.id == patient_id.to_string()) {
        return Err(AppError::Auth(
            "Not authorized to view this patient's appointments".to_string(),
        ));
    }

    let appointments = state.appointments.upcoming(Some(patient_id), None);
    let count = appointments.len();
    Ok(Json(json!({
        "appointments": appointments,
        "count": count
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !(user.is_admin() || user.id == doctor_id.to_string()) {
        return Err(AppError::Auth(
            "Not authorized to view this doctor's appointments".to_string(),
        ));
    }

    let appointments = state.appointments.upcoming(None, Some(doctor_id));
    let count = appointments.len();
    Ok(Json(json!({
        "appointments": appointments,
        "count": count
    })))
}

#[axum::debug_handler]
pub async fn get_appointment_stats(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let stats = if user.is_admin() {
        state.appointments.stats(None, None)
    } else if user.is_doctor() {
        let doctor_id = parse_caller_id(&user)?;
        state.appointments.stats(None, Some(doctor_id))
    } else {
        let patient_id = parse_caller_id(&user)?;
        state.appointments.stats(Some(patient_id), None)
    };

    Ok(Json(json!({ "stats": stats })))
}

// ==============================================================================
// AUTHORIZATION HELPERS
// ==============================================================================

fn authorize_participant(user: &User, appointment: &Appointment) -> Result<(), AppError> {
    let is_participant = user.id == appointment.patient_id.to_string()
        || user.id == appointment.doctor_id.to_string();
    if !(user.is_admin() || is_participant) {
        return Err(AppError::Auth(
            "Not authorized to view this appointment".to_string(),
        ));
    }
    Ok(())
}

/// Patients may only cancel their own appointments; every other transition
/// belongs to the appointment's doctor or an admin.
fn authorize_status_change(
    user: &User,
    appointment: &Appointment,
    new_status: &AppointmentStatus,
) -> Result<(), AppError> {
    if user.is_admin() {
        return Ok(());
    }

    let is_own_doctor = user.is_doctor() && user.id == appointment.doctor_id.to_string();
    if is_own_doctor {
        return Ok(());
    }

    let is_own_patient = user.id == appointment.patient_id.to_string();
    if is_own_patient && *new_status == AppointmentStatus::Cancelled {
        return Ok(());
    }

    Err(AppError::Auth(
        "Not authorized to change this appointment's status".to_string(),
    ))
}

fn scope_query_to_caller(
    user: &User,
    query: &mut AppointmentSearchQuery,
) -> Result<(), AppError> {
    if user.is_admin() {
        return Ok(());
    }
    let caller_id = parse_caller_id(user)?;
    if user.is_doctor() {
        query.doctor_id = Some(caller_id);
    } else {
        query.patient_id = Some(caller_id);
    }
    Ok(())
}

fn parse_caller_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Caller identity is not a valid id".to_string()))
}

pub(crate) fn map_appointment_error(error: AppointmentError) -> AppError {
    match error {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::Schedule(schedule_error) => match schedule_error {
            ScheduleError::Configuration(msg) => AppError::ValidationError(msg),
            ScheduleError::NotBookable => {
                AppError::BadRequest("Schedule is not open for booking".to_string())
            }
            ScheduleError::SlotNotFound => {
                AppError::NotFound("No slot exists at the requested time".to_string())
            }
            ScheduleError::SlotUnavailable => {
                AppError::Conflict("Slot no longer available, pick another".to_string())
            }
            ScheduleError::NotFound => AppError::NotFound("Schedule not found".to_string()),
            ScheduleError::HasActiveBookings => {
                AppError::Conflict("Schedule has active bookings".to_string())
            }
        },
        AppointmentError::InvalidTransition { from, to } => AppError::Conflict(format!(
            "Invalid status transition from {} to {}",
            from, to
        )),
        AppointmentError::TemporalViolation(msg) => AppError::BadRequest(msg),
        AppointmentError::Validation(msg) => AppError::ValidationError(msg),
    }
}
