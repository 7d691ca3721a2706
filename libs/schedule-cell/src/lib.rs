pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

use std::sync::Arc;

use shared_config::AppConfig;

use crate::services::schedule::{BookingGuard, ScheduleService};

/// Shared state for the schedule cell's routes.
pub struct ScheduleCellState {
    pub config: Arc<AppConfig>,
    pub schedules: ScheduleService,
    pub guard: Arc<dyn BookingGuard>,
}
