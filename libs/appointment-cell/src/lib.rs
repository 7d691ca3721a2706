pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

use std::sync::Arc;

use shared_config::AppConfig;

use crate::services::booking::AppointmentService;

/// Shared state for the appointment cell's routes.
pub struct AppointmentCellState {
    pub config: Arc<AppConfig>,
    pub appointments: Arc<AppointmentService>,
}
