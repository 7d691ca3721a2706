// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use schedule_cell::models::{AppointmentType, ScheduleError};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    /// Together with `appointment_time`, the logical reference to the
    /// schedule slot this booking consumed. The slot is re-derived from
    /// these on release, never from a live schedule lookup.
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub appointment_type: AppointmentType,
    pub reason: String,
    pub notes: Option<String>,
    pub symptoms: Option<String>,
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub follow_up_notes: Option<String>,
    /// Frozen from the schedule at booking time; later fee edits on the
    /// schedule do not reprice existing bookings.
    pub consultation_fee: f64,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub cancelled_by: Option<CancelledBy>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// No transition is defined out of a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Patient,
    Doctor,
    Admin,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub reason: String,
    /// Defaults to the claimed slot's own type tag when omitted.
    pub appointment_type: Option<AppointmentType>,
    pub duration_minutes: Option<i32>,
    pub notes: Option<String>,
    pub symptoms: Option<String>,
    /// Admin-only: create a historical record directly in `completed`,
    /// bypassing the not-in-the-past check.
    #[serde(default)]
    pub backfill: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDetailsRequest {
    pub notes: Option<String>,
    pub symptoms: Option<String>,
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub follow_up_notes: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentStats {
    pub total_appointments: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub no_show: usize,
}

// ==============================================================================
// VALIDATION RULES
// ==============================================================================

#[derive(Debug, Clone)]
pub struct BookingValidationRules {
    pub min_appointment_duration: i32,
    pub max_appointment_duration: i32,
    pub default_appointment_duration: i32,
    pub max_advance_booking_months: u32,
    pub max_reason_length: usize,
    pub max_notes_length: usize,
}

impl Default for BookingValidationRules {
    fn default() -> Self {
        Self {
            min_appointment_duration: 15,
            max_appointment_duration: 120,
            default_appointment_duration: 30,
            max_advance_booking_months: 6,
            max_reason_length: 500,
            max_notes_length: 1000,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    /// Claim/release failures propagate to callers unchanged.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Temporal violation: {0}")]
    TemporalViolation(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
