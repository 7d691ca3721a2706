// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// The appointment status state machine.
///
/// ```text
/// pending      --confirm-->   confirmed
/// pending      --cancel-->    cancelled    [releases slot]
/// confirmed    --start-->     in_progress
/// confirmed    --cancel-->    cancelled    [releases slot]
/// in_progress  --complete-->  completed    [slot stays consumed]
/// any non-terminal --no-show--> no_show    [releases slot]
/// ```
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn valid_transitions(&self, current: &AppointmentStatus) -> &'static [AppointmentStatus] {
        match current {
            AppointmentStatus::Pending => &[
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Confirmed => &[
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::InProgress => {
                &[AppointmentStatus::Completed, AppointmentStatus::NoShow]
            }
            // Terminal states
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => &[],
        }
    }

    pub fn validate_transition(
        &self,
        current: &AppointmentStatus,
        next: &AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition {} -> {}", current, next);

        if !self.valid_transitions(current).contains(next) {
            warn!("Invalid status transition attempted: {} -> {}", current, next);
            return Err(AppointmentError::InvalidTransition {
                from: current.clone(),
                to: next.clone(),
            });
        }

        Ok(())
    }

    /// Cancellation and no-show hand the slot back; completion keeps it
    /// consumed for the historical record.
    pub fn releases_slot(&self, status: &AppointmentStatus) -> bool {
        matches!(
            status,
            AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
