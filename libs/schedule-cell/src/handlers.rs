// libs/schedule-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{ScheduleError, UpsertScheduleRequest};
use crate::ScheduleCellState;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SlotListQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

// ==============================================================================
// SCHEDULE HANDLERS
// ==============================================================================

/// Create or update a doctor's schedule for one day.
#[axum::debug_handler]
pub async fn upsert_schedule(
    State(state): State<Arc<ScheduleCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpsertScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let owns_schedule = user.id == request.doctor_id.to_string();
    if !(user.is_admin() || (user.is_doctor() && owns_schedule)) {
        return Err(AppError::Auth(
            "Not authorized to manage this doctor's schedule".to_string(),
        ));
    }

    let schedule = state
        .schedules
        .create_or_update(request)
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule
    })))
}

/// List a doctor's schedules. Patients only see bookable days; the owning
/// doctor and admins see everything.
#[axum::debug_handler]
pub async fn get_doctor_schedules(
    State(state): State<Arc<ScheduleCellState>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<ScheduleRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let owns_schedule = user.id == doctor_id.to_string();

    let schedules = if user.is_admin() || (user.is_doctor() && owns_schedule) {
        state.schedules.list_for_doctor(doctor_id)
    } else {
        let today = Utc::now().date_naive();
        let from = query.from.unwrap_or(today);
        let to = query.to.unwrap_or(today + Duration::days(60));
        state.schedules.find_bookable(doctor_id, from, to)
    };

    let count = schedules.len();
    Ok(Json(json!({
        "schedules": schedules,
        "count": count
    })))
}

/// Bookable slot listing for one day: what a patient picks from.
#[axum::debug_handler]
pub async fn list_bookable_slots(
    State(state): State<Arc<ScheduleCellState>>,
    Extension(_user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotListQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = state
        .schedules
        .list_bookable_slots(doctor_id, query.date)
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "slots": slots
    })))
}

/// Explicitly rebuild a day's slot grid after reshaping working hours.
#[axum::debug_handler]
pub async fn regenerate_slots(
    State(state): State<Arc<ScheduleCellState>>,
    Extension(user): Extension<User>,
    Path((doctor_id, date)): Path<(Uuid, NaiveDate)>,
) -> Result<Json<Value>, AppError> {
    let owns_schedule = user.id == doctor_id.to_string();
    if !(user.is_admin() || (user.is_doctor() && owns_schedule)) {
        return Err(AppError::Auth(
            "Not authorized to manage this doctor's schedule".to_string(),
        ));
    }

    let schedule = state
        .schedules
        .regenerate_slots(doctor_id, date)
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule
    })))
}

/// Delete a schedule. Refused while live bookings still reference it.
#[axum::debug_handler]
pub async fn delete_schedule(
    State(state): State<Arc<ScheduleCellState>>,
    Extension(user): Extension<User>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let schedule = state
        .schedules
        .get_by_id(schedule_id)
        .map_err(map_schedule_error)?;

    let owns_schedule = user.id == schedule.doctor_id.to_string();
    if !(user.is_admin() || (user.is_doctor() && owns_schedule)) {
        return Err(AppError::Auth(
            "Not authorized to manage this doctor's schedule".to_string(),
        ));
    }

    state
        .schedules
        .delete(schedule_id, state.guard.as_ref())
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "deleted": schedule_id
    })))
}

pub(crate) fn map_schedule_error(error: ScheduleError) -> AppError {
    match error {
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
            AppError::Conflict("Schedule has active bookings and cannot be deleted".to_string())
        }
    }
}
