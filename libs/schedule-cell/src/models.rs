// libs/schedule-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const MIN_SLOT_MINUTES: i32 = 15;
pub const MAX_SLOT_MINUTES: i32 = 120;
pub const DEFAULT_SLOT_MINUTES: i32 = 30;

// ==============================================================================
// CORE SCHEDULE MODELS
// ==============================================================================

/// One doctor's published day: working hours, the generated slot grid, and
/// the booking policy for that calendar date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub working_hours: WorkingHours,
    pub slot_duration_minutes: i32,
    pub time_slots: Vec<TimeSlot>,
    pub break_times: Vec<BreakTime>,
    pub is_working_day: bool,
    pub consultation_fee: f64,
    pub status: ScheduleStatus,
    pub is_recurring: bool,
    pub recurring_pattern: Option<RecurringPattern>,
    pub recurring_days: Vec<i32>,
    pub recurring_end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Only active schedules on working days are discoverable for booking.
    pub fn is_bookable(&self) -> bool {
        self.status == ScheduleStatus::Active && self.is_working_day
    }

    pub fn slot(&self, start_time: NaiveTime) -> Option<&TimeSlot> {
        self.time_slots.iter().find(|s| s.start_time == start_time)
    }

    pub fn slot_mut(&mut self, start_time: NaiveTime) -> Option<&mut TimeSlot> {
        self.time_slots
            .iter_mut()
            .find(|s| s.start_time == start_time)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// A fixed-duration bookable window within a day's working hours.
///
/// `is_available` is strictly derived from the counters: it must be
/// recomputed on every write to `current_patients` and never set on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_patients: i32,
    pub current_patients: i32,
    pub is_available: bool,
    pub appointment_type: AppointmentType,
}

impl TimeSlot {
    pub fn has_capacity(&self) -> bool {
        self.current_patients < self.max_patients
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakTime {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Inactive,
    Cancelled,
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleStatus::Active => write!(f, "active"),
            ScheduleStatus::Inactive => write!(f, "inactive"),
            ScheduleStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Recurrence metadata only: nothing in this cell materializes future
/// schedules from it; a generator job would consume it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringPattern {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentType {
    Consultation,
    FollowUp,
    Emergency,
    RoutineCheckup,
    Specialist,
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::Consultation => write!(f, "consultation"),
            AppointmentType::FollowUp => write!(f, "follow-up"),
            AppointmentType::Emergency => write!(f, "emergency"),
            AppointmentType::RoutineCheckup => write!(f, "routine-checkup"),
            AppointmentType::Specialist => write!(f, "specialist"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertScheduleRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub working_hours: WorkingHours,
    pub slot_duration_minutes: Option<i32>,
    pub consultation_fee: Option<f64>,
    pub break_times: Option<Vec<BreakTime>>,
    pub is_working_day: Option<bool>,
    pub status: Option<ScheduleStatus>,
    pub is_recurring: Option<bool>,
    pub recurring_pattern: Option<RecurringPattern>,
    pub recurring_days: Option<Vec<i32>>,
    pub recurring_end_date: Option<NaiveDate>,
}

/// Listing view for patients picking a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookableSlot {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub available: bool,
}

/// Snapshot handed back by a successful claim, for the caller to freeze onto
/// the appointment it creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotRef {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_patients: i32,
    pub consultation_fee: f64,
    pub appointment_type: AppointmentType,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Invalid schedule configuration: {0}")]
    Configuration(String),

    #[error("Schedule is not open for booking")]
    NotBookable,

    #[error("No slot exists at the requested time")]
    SlotNotFound,

    #[error("Slot has no remaining capacity")]
    SlotUnavailable,

    #[error("Schedule not found")]
    NotFound,

    #[error("Schedule has active bookings")]
    HasActiveBookings,
}
